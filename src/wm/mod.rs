//! Window Manager Module
//!
//! `WindowManager` is the process object: it owns the display, the
//! process and display private tables, the loaded plugins and the
//! connection to the display server. Every core operation is a method on
//! it, grouped by concern in the submodules.

pub mod client;
pub mod client_flags;
pub mod display;
pub mod events;
pub mod ewmh;
pub mod focus;
pub mod hints;
pub mod hooks;
pub mod moveresize;
pub mod plugin;
pub mod screen;
pub mod server;
pub mod stacking;
pub mod transients;
pub mod window_match;
pub mod workspace;

#[cfg(test)]
pub(crate) mod testing;

use std::rc::Rc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info};

use crate::config::{Config, WorkspaceConfig};
use crate::core::privates::grow_all;
use crate::core::{ObjectBase, ObjectKind, ObjectRef, PrivateIndexTable, PrivateKey, ScreenId, WindowRef, Xid};
use crate::error::PrivateError;
use crate::wm::client::Client;
use crate::wm::display::Display;
use crate::wm::focus::FocusPolicy;
use crate::wm::hooks::CoreHooks;
use crate::wm::plugin::Plugin;
use crate::wm::screen::Screen;
use crate::wm::server::DisplayServer;

pub use events::ServerEvent;

/// The process object and owner of all window manager state
pub struct WindowManager {
    /// Process object (privates of kind `Process`)
    pub object: ObjectBase,

    process_privates: PrivateIndexTable,

    display_privates: PrivateIndexTable,

    pub display: Display,

    /// Object add/remove notification hooks
    pub hooks: CoreHooks,

    /// Loaded plugins, in load order
    plugins: Vec<Rc<dyn Plugin>>,

    server: Box<dyn DisplayServer>,

    /// Viewport grid and desktop count for new screens
    workspace: WorkspaceConfig,

    /// How long to wait for a client's sync acknowledgement
    sync_timeout: Duration,
}

impl WindowManager {
    /// Create the process and display objects
    pub fn new(server: Box<dyn DisplayServer>, display_name: &str, config: &Config) -> Self {
        info!("Initializing window manager core for display {}", display_name);

        let focus = FocusPolicy::from_config(&config.focus);
        let display_privates = PrivateIndexTable::new(ObjectKind::Display);
        let display = Display::new(display_name, display_privates.len(), focus);

        Self {
            object: ObjectBase::init(ObjectKind::Process, None, 0),
            process_privates: PrivateIndexTable::new(ObjectKind::Process),
            display_privates,
            display,
            hooks: CoreHooks::new(),
            plugins: Vec::new(),
            server,
            workspace: config.workspace.clone(),
            sync_timeout: Duration::from_millis(config.sync.timeout_ms),
        }
    }

    /// Add a screen to the display and announce it to plugins
    pub fn add_screen(&mut self, root: Xid, width: i32, height: i32) -> ScreenId {
        let id = self.display.screens.len();
        let screen = Screen::new(
            id,
            root,
            width,
            height,
            self.display.screen_privates_len(),
            &self.workspace,
        );
        self.display.screens.push(screen);
        info!("Added screen {} (root 0x{:x}, {}x{})", id, root, width, height);

        self.attach_object(ObjectRef::Screen(id));
        self.update_work_area(id);
        self.publish_desktop_hints(id);
        id
    }

    pub fn screen(&self, id: ScreenId) -> Option<&Screen> {
        self.display.screen(id)
    }

    pub fn screen_mut(&mut self, id: ScreenId) -> Option<&mut Screen> {
        self.display.screen_mut(id)
    }

    pub fn window(&self, w: WindowRef) -> Option<&Client> {
        self.display.window(w)
    }

    pub fn window_mut(&mut self, w: WindowRef) -> Option<&mut Client> {
        self.display.window_mut(w)
    }

    /// Locate a window by id on any screen
    pub fn find_window(&self, id: Xid) -> Option<WindowRef> {
        self.display.find_window(id)
    }

    pub fn sync_timeout(&self) -> Duration {
        self.sync_timeout
    }

    /// Run one outgoing request; failures are logged and otherwise ignored
    pub(crate) fn request<F>(&mut self, what: &str, f: F)
    where
        F: FnOnce(&mut dyn DisplayServer) -> Result<()>,
    {
        if let Err(e) = f(self.server.as_mut()) {
            debug!("{} failed: {:#}", what, e);
        }
    }

    pub(crate) fn server_mut(&mut self) -> &mut dyn DisplayServer {
        self.server.as_mut()
    }

    /// Push buffered requests to the server
    pub fn flush(&mut self) {
        self.request("Flush", |s| s.flush());
    }

    // ------------------------------------------------------------------
    // Object tree
    // ------------------------------------------------------------------

    pub fn object(&self, object: ObjectRef) -> Option<&ObjectBase> {
        match object {
            ObjectRef::Process => Some(&self.object),
            ObjectRef::Display => Some(&self.display.object),
            ObjectRef::Screen(s) => self.display.screen(s).map(|s| &s.object),
            ObjectRef::Window(w) => self.display.window(w).map(|c| &c.object),
        }
    }

    pub fn object_mut(&mut self, object: ObjectRef) -> Option<&mut ObjectBase> {
        match object {
            ObjectRef::Process => Some(&mut self.object),
            ObjectRef::Display => Some(&mut self.display.object),
            ObjectRef::Screen(s) => self.display.screen_mut(s).map(|s| &mut s.object),
            ObjectRef::Window(w) => self.display.window_mut(w).map(|c| &mut c.object),
        }
    }

    /// Children of `parent` of the given kind, in insertion order
    pub fn objects(&self, parent: ObjectRef, kind: ObjectKind) -> Vec<ObjectRef> {
        match (parent, kind) {
            (ObjectRef::Process, ObjectKind::Display) => vec![ObjectRef::Display],
            (ObjectRef::Display, ObjectKind::Screen) => {
                (0..self.display.screens.len()).map(ObjectRef::Screen).collect()
            }
            (ObjectRef::Screen(s), ObjectKind::Window) => match self.display.screen(s) {
                Some(screen) => screen
                    .creation_order()
                    .iter()
                    .map(|&id| ObjectRef::Window(WindowRef::new(s, id)))
                    .collect(),
                None => Vec::new(),
            },
            _ => Vec::new(),
        }
    }

    /// Visit children of `parent`; the visitor returns false to stop early
    ///
    /// Returns false if the walk was stopped.
    pub fn for_each_object<F>(&self, parent: ObjectRef, kind: ObjectKind, mut visitor: F) -> bool
    where
        F: FnMut(ObjectRef, &ObjectBase) -> bool,
    {
        for object in self.objects(parent, kind) {
            if let Some(base) = self.object(object) {
                if !visitor(object, base) {
                    return false;
                }
            }
        }
        true
    }

    /// Name used by `find_object`: "core", the display name, the screen
    /// number or the window id in decimal
    pub fn object_name(&self, object: ObjectRef) -> String {
        match object {
            ObjectRef::Process => "core".to_string(),
            ObjectRef::Display => self.display.name.clone(),
            ObjectRef::Screen(s) => s.to_string(),
            ObjectRef::Window(w) => w.id.to_string(),
        }
    }

    pub fn find_object(&self, parent: ObjectRef, kind: ObjectKind, name: &str) -> Option<ObjectRef> {
        self.objects(parent, kind)
            .into_iter()
            .find(|&object| self.object_name(object) == name)
    }

    /// Every live object, parents before children
    pub(crate) fn object_tree(&self) -> Vec<ObjectRef> {
        let mut tree = vec![ObjectRef::Process, ObjectRef::Display];
        for screen in self.objects(ObjectRef::Display, ObjectKind::Screen) {
            tree.push(screen);
            tree.extend(self.objects(screen, ObjectKind::Window));
        }
        tree
    }

    /// Announce a newly attached object to plugins, then to `object_add`
    pub(crate) fn attach_object(&mut self, object: ObjectRef) {
        for plugin in self.plugins.clone() {
            if let Err(e) = plugin.init_object(self, object) {
                tracing::warn!(
                    "Plugin {} failed to initialize {} {}: {:#}",
                    plugin.name(),
                    object.kind(),
                    self.object_name(object),
                    e
                );
            }
        }
        let chain = self.hooks.object_add.snapshot();
        chain.call(self, object);
    }

    /// Counterpart of `attach_object`, plugins are told in reverse load order
    pub(crate) fn detach_object(&mut self, object: ObjectRef) {
        let chain = self.hooks.object_remove.snapshot();
        chain.call(self, object);
        for plugin in self.plugins.clone().iter().rev() {
            plugin.fini_object(self, object);
        }
    }

    // ------------------------------------------------------------------
    // Private slots
    // ------------------------------------------------------------------

    pub fn allocate_process_private<T: 'static>(&mut self) -> Result<PrivateKey<T>, PrivateError> {
        let object = &mut self.object;
        let index = self.process_privates.allocate(|len| {
            grow_all(ObjectKind::Process, std::iter::once(object.privates_mut()), len)
        })?;
        Ok(PrivateKey::new(ObjectKind::Process, index))
    }

    pub fn free_process_private<T>(&mut self, key: PrivateKey<T>) {
        if self.process_privates.free(key.index()) {
            self.object.privates_mut().clear_index(key.index());
        }
    }

    pub fn allocate_display_private<T: 'static>(&mut self) -> Result<PrivateKey<T>, PrivateError> {
        let display = &mut self.display.object;
        let index = self.display_privates.allocate(|len| {
            grow_all(ObjectKind::Display, std::iter::once(display.privates_mut()), len)
        })?;
        Ok(PrivateKey::new(ObjectKind::Display, index))
    }

    pub fn free_display_private<T>(&mut self, key: PrivateKey<T>) {
        if self.display_privates.free(key.index()) {
            self.display.object.privates_mut().clear_index(key.index());
        }
    }

    pub fn allocate_screen_private<T: 'static>(&mut self) -> Result<PrivateKey<T>, PrivateError> {
        self.display.allocate_screen_private()
    }

    pub fn free_screen_private<T>(&mut self, key: PrivateKey<T>) {
        self.display.free_screen_private(key);
    }

    pub fn allocate_window_private<T: 'static>(
        &mut self,
        screen: ScreenId,
    ) -> Result<PrivateKey<T>, PrivateError> {
        match self.display.screen_mut(screen) {
            Some(s) => s.allocate_window_private(),
            None => Err(PrivateError::NoSuchObject(format!("screen {}", screen))),
        }
    }

    pub fn free_window_private<T>(&mut self, screen: ScreenId, key: PrivateKey<T>) {
        if let Some(s) = self.display.screen_mut(screen) {
            s.free_window_private(key);
        }
    }

    /// Cap the number of private slots objects of `kind` may have
    pub fn set_private_limit(&mut self, kind: ObjectKind, limit: usize) {
        match kind {
            ObjectKind::Process => self.process_privates.set_limit(limit),
            ObjectKind::Display => self.display_privates.set_limit(limit),
            ObjectKind::Screen => self.display.set_screen_private_limit(limit),
            ObjectKind::Window => self
                .display
                .screens
                .iter_mut()
                .for_each(|s| s.set_window_private_limit(limit)),
        }
    }

    pub fn private<T: 'static>(&self, object: ObjectRef, key: PrivateKey<T>) -> Option<&T> {
        if key.kind() != object.kind() {
            return None;
        }
        self.object(object)?.privates().get(key)
    }

    pub fn private_mut<T: 'static>(&mut self, object: ObjectRef, key: PrivateKey<T>) -> Option<&mut T> {
        if key.kind() != object.kind() {
            return None;
        }
        self.object_mut(object)?.privates_mut().get_mut(key)
    }

    pub fn set_private<T: 'static>(
        &mut self,
        object: ObjectRef,
        key: PrivateKey<T>,
        value: T,
    ) -> Result<(), PrivateError> {
        if key.kind() != object.kind() {
            return Err(PrivateError::WrongKind {
                expected: key.kind(),
                found: object.kind(),
            });
        }
        let name = self.object_name(object);
        self.object_mut(object)
            .ok_or(PrivateError::NoSuchObject(name))?
            .privates_mut()
            .set(key, value)
    }

    pub fn take_private<T: 'static>(&mut self, object: ObjectRef, key: PrivateKey<T>) -> Option<T> {
        if key.kind() != object.kind() {
            return None;
        }
        self.object_mut(object)?.privates_mut().take(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wm::testing::{manage, mapped_window, test_wm};

    #[test]
    fn test_object_walk_and_find() {
        let (mut wm, _log) = test_wm();
        let a = mapped_window(&mut wm, 0x100);
        let b = mapped_window(&mut wm, 0x200);
        manage(&mut wm, 0x50);

        let windows = wm.objects(ObjectRef::Screen(0), ObjectKind::Window);
        assert_eq!(
            windows,
            vec![
                ObjectRef::Window(a),
                ObjectRef::Window(b),
                ObjectRef::Window(WindowRef::new(0, 0x50)),
            ]
        );

        assert_eq!(
            wm.find_object(ObjectRef::Screen(0), ObjectKind::Window, "512"),
            Some(ObjectRef::Window(b))
        );
        assert_eq!(wm.find_object(ObjectRef::Display, ObjectKind::Screen, "0"), Some(ObjectRef::Screen(0)));
        assert_eq!(wm.find_object(ObjectRef::Process, ObjectKind::Display, ":9"), Some(ObjectRef::Display));
        assert_eq!(wm.find_object(ObjectRef::Process, ObjectKind::Window, "256"), None);

        let mut seen = 0;
        let finished = wm.for_each_object(ObjectRef::Screen(0), ObjectKind::Window, |_, base| {
            assert_eq!(base.kind(), ObjectKind::Window);
            seen += 1;
            seen < 2
        });
        assert!(!finished);
        assert_eq!(seen, 2);
    }

    #[test]
    fn test_window_private_grows_live_windows() {
        let (mut wm, _log) = test_wm();
        let a = mapped_window(&mut wm, 0x100);

        let first: PrivateKey<u32> = wm.allocate_window_private(0).unwrap();
        let second: PrivateKey<&'static str> = wm.allocate_window_private(0).unwrap();
        assert_eq!(wm.window(a).unwrap().object.privates().len(), 2);

        wm.set_private(a.into(), second, "tag").unwrap();
        assert_eq!(wm.private(a.into(), second), Some(&"tag"));
        assert_eq!(wm.private(a.into(), first), None);

        // Windows created later start at the current table size
        let b = mapped_window(&mut wm, 0x200);
        assert_eq!(wm.window(b).unwrap().object.privates().len(), 2);

        wm.free_window_private(0, second);
        assert_eq!(wm.private(a.into(), second), None);
        let reused: PrivateKey<u8> = wm.allocate_window_private(0).unwrap();
        assert_eq!(reused.index(), 1);
    }

    #[test]
    fn test_private_key_kind_is_checked() {
        let (mut wm, _log) = test_wm();
        let key: PrivateKey<u32> = wm.allocate_screen_private().unwrap();
        assert_eq!(
            wm.set_private(ObjectRef::Display, key, 1),
            Err(PrivateError::WrongKind {
                expected: ObjectKind::Screen,
                found: ObjectKind::Display,
            })
        );
        wm.set_private(ObjectRef::Screen(0), key, 7).unwrap();
        assert_eq!(wm.private(ObjectRef::Screen(0), key), Some(&7));
        *wm.private_mut(ObjectRef::Screen(0), key).unwrap() += 1;
        assert_eq!(wm.take_private(ObjectRef::Screen(0), key), Some(8));
    }

    #[test]
    fn test_exhausted_table_leaves_objects_untouched() {
        let (mut wm, _log) = test_wm();
        mapped_window(&mut wm, 0x100);
        wm.set_private_limit(ObjectKind::Window, 1);

        let _key: PrivateKey<u8> = wm.allocate_window_private(0).unwrap();
        let result: Result<PrivateKey<u8>, _> = wm.allocate_window_private(0);
        assert_eq!(result, Err(PrivateError::Exhausted { kind: ObjectKind::Window }));
        assert_eq!(wm.screen(0).unwrap().window_private_count(), 1);
        let a = WindowRef::new(0, 0x100);
        assert_eq!(wm.window(a).unwrap().object.privates().len(), 1);
    }

    #[test]
    fn test_unknown_screen_is_ignored() {
        let (mut wm, _log) = test_wm();
        let a = mapped_window(&mut wm, 0x100);
        assert!(wm.screen(3).is_none());
        assert!(wm.screen_mut(3).is_none());

        let stray = WindowRef::new(3, a.id);
        wm.raise_window(stray);
        wm.lower_window(stray);
        wm.restack_window_above(stray, a.id);
        assert!(!wm.restack_window(stray, None));
        wm.move_viewport(3, 1, 0);
        wm.set_current_desktop(3, 1);
        wm.focus_default_window(3);
        assert_eq!(wm.screen(0).unwrap().stacking_order(), vec![a.id]);
    }
}
