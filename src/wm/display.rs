//! Display Module
//!
//! The display object: its screens, the screen private table, the focus
//! policy and the active window bookkeeping shared by all screens.

use tracing::debug;

use crate::core::privates::grow_all;
use crate::core::{ObjectBase, ObjectKind, ObjectRef, PrivateIndexTable, PrivateKey, ScreenId, WindowRef, Xid};
use crate::error::PrivateError;
use crate::wm::client::Client;
use crate::wm::focus::FocusPolicy;
use crate::wm::hooks::DisplayHooks;
use crate::wm::screen::Screen;

/// Display state
pub struct Display {
    pub object: ObjectBase,

    /// Connection name, e.g. ":0"
    pub name: String,

    pub screens: Vec<Screen>,

    screen_privates: PrivateIndexTable,

    /// Window that currently has focus
    pub active_window: Option<Xid>,

    /// Window that had focus before `active_window`
    pub prev_active_window: Option<Xid>,

    /// Window we asked to take focus, until the server confirms it
    pub next_active_window: Option<Xid>,

    /// Activation counter, bumped every time a window becomes active
    active_num: u32,

    /// Server time of the last event that carried one
    pub last_event_time: u32,

    pub focus: FocusPolicy,

    pub hooks: DisplayHooks,
}

impl Display {
    pub fn new(name: &str, privates_len: usize, focus: FocusPolicy) -> Self {
        Self {
            object: ObjectBase::init(ObjectKind::Display, Some(ObjectRef::Process), privates_len),
            name: name.to_string(),
            screens: Vec::new(),
            screen_privates: PrivateIndexTable::new(ObjectKind::Screen),
            active_window: None,
            prev_active_window: None,
            next_active_window: None,
            active_num: 0,
            last_event_time: 0,
            focus,
            hooks: DisplayHooks::new(),
        }
    }

    pub fn screen(&self, id: ScreenId) -> Option<&Screen> {
        self.screens.get(id)
    }

    pub fn screen_mut(&mut self, id: ScreenId) -> Option<&mut Screen> {
        self.screens.get_mut(id)
    }

    pub fn window(&self, w: WindowRef) -> Option<&Client> {
        self.screens.get(w.screen)?.window(w.id)
    }

    pub fn window_mut(&mut self, w: WindowRef) -> Option<&mut Client> {
        self.screens.get_mut(w.screen)?.window_mut(w.id)
    }

    pub fn find_window(&self, id: Xid) -> Option<WindowRef> {
        self.screens
            .iter()
            .find(|s| s.window(id).is_some())
            .map(|s| WindowRef::new(s.id, id))
    }

    /// Screen whose root window is `root`
    pub fn screen_for_root(&self, root: Xid) -> Option<ScreenId> {
        self.screens.iter().find(|s| s.root == root).map(|s| s.id)
    }

    /// Next value of the activation counter
    pub(crate) fn next_active_num(&mut self) -> u32 {
        self.active_num += 1;
        self.active_num
    }

    pub(crate) fn screen_privates_len(&self) -> usize {
        self.screen_privates.len()
    }

    pub(crate) fn set_screen_private_limit(&mut self, limit: usize) {
        self.screen_privates.set_limit(limit);
    }

    pub(crate) fn allocate_screen_private<T: 'static>(&mut self) -> Result<PrivateKey<T>, PrivateError> {
        let screens = &mut self.screens;
        let index = self.screen_privates.allocate(|len| {
            grow_all(
                ObjectKind::Screen,
                screens.iter_mut().map(|s| s.object.privates_mut()),
                len,
            )
        })?;
        Ok(PrivateKey::new(ObjectKind::Screen, index))
    }

    pub(crate) fn free_screen_private<T>(&mut self, key: PrivateKey<T>) {
        if self.screen_privates.free(key.index()) {
            for screen in &mut self.screens {
                screen.object.privates_mut().clear_index(key.index());
            }
            debug!("Freed screen private {}", key.index());
        }
    }
}
