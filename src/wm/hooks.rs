//! Hook Sets
//!
//! The overridable operations of each object kind. Plugins wrap these;
//! the core always calls them through the helpers at the bottom of this
//! file so that the current chain runs.

use crate::core::{Hook, ObjectRef, ScreenId, WindowRef, Xid};
use crate::wm::WindowManager;
use crate::wm::client_flags::{GrabMask, WindowActions, WindowState};
use crate::wm::events::{self, ServerEvent};
use crate::wm::focus;

/// Window geometry changed size (and possibly position)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeNotify {
    pub window: WindowRef,
    pub dx: i32,
    pub dy: i32,
    pub dwidth: i32,
    pub dheight: i32,
}

/// Window moved without changing size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveNotify {
    pub window: WindowRef,
    pub dx: i32,
    pub dy: i32,
    /// Moved by the window manager itself rather than confirmed by the server
    pub immediate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrabNotify {
    pub window: WindowRef,
    pub x: i32,
    pub y: i32,
    pub mask: GrabMask,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChangeNotify {
    pub window: WindowRef,
    pub last_state: WindowState,
}

/// A window about to be raised; the answer is the window it goes
/// directly above, `None` for the bottom
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SiblingQuery {
    pub window: WindowRef,
    /// May go over fullscreen windows
    pub above_fullscreen: bool,
}

/// Adjustment a plugin makes to the core's allowed actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AllowedActions {
    pub set: WindowActions,
    pub clear: WindowActions,
}

/// Process hooks
pub struct CoreHooks {
    pub object_add: Hook<WindowManager, ObjectRef, ()>,
    pub object_remove: Hook<WindowManager, ObjectRef, ()>,
}

impl CoreHooks {
    pub fn new() -> Self {
        Self {
            object_add: Hook::new("object_add", notify_base),
            object_remove: Hook::new("object_remove", notify_base),
        }
    }
}

impl Default for CoreHooks {
    fn default() -> Self {
        Self::new()
    }
}

/// Display hooks
pub struct DisplayHooks {
    pub handle_event: Hook<WindowManager, ServerEvent, ()>,
}

impl DisplayHooks {
    pub fn new() -> Self {
        Self {
            handle_event: Hook::new("handle_event", events::handle_event_base),
        }
    }
}

impl Default for DisplayHooks {
    fn default() -> Self {
        Self::new()
    }
}

/// Screen hooks, shared by every window of the screen
pub struct ScreenHooks {
    pub paint_window: Hook<WindowManager, WindowRef, bool>,
    pub window_add_notify: Hook<WindowManager, WindowRef, ()>,
    pub window_resize_notify: Hook<WindowManager, ResizeNotify, ()>,
    pub window_move_notify: Hook<WindowManager, MoveNotify, ()>,
    pub window_grab_notify: Hook<WindowManager, GrabNotify, ()>,
    pub window_ungrab_notify: Hook<WindowManager, WindowRef, ()>,
    pub window_state_change_notify: Hook<WindowManager, StateChangeNotify, ()>,
    pub window_restack_notify: Hook<WindowManager, WindowRef, ()>,
    pub find_sibling_below: Hook<WindowManager, SiblingQuery, Option<Xid>>,
    pub focus_window: Hook<WindowManager, WindowRef, bool>,
    pub activate_window: Hook<WindowManager, WindowRef, ()>,
    pub allowed_actions: Hook<WindowManager, WindowRef, AllowedActions>,
}

impl ScreenHooks {
    pub fn new() -> Self {
        Self {
            paint_window: Hook::new("paint_window", paint_window_base),
            window_add_notify: Hook::new("window_add_notify", notify_base),
            window_resize_notify: Hook::new("window_resize_notify", notify_base),
            window_move_notify: Hook::new("window_move_notify", notify_base),
            window_grab_notify: Hook::new("window_grab_notify", notify_base),
            window_ungrab_notify: Hook::new("window_ungrab_notify", notify_base),
            window_state_change_notify: Hook::new("window_state_change_notify", notify_base),
            window_restack_notify: Hook::new("window_restack_notify", notify_base),
            find_sibling_below: Hook::new("find_sibling_below", find_sibling_below_base),
            focus_window: Hook::new("focus_window", focus::focus_window_base),
            activate_window: Hook::new("activate_window", focus::activate_window_base),
            allowed_actions: Hook::new("allowed_actions", allowed_actions_base),
        }
    }
}

impl Default for ScreenHooks {
    fn default() -> Self {
        Self::new()
    }
}

/// Notifications have no core behavior
fn notify_base<A>(_wm: &mut WindowManager, _args: A) {}

fn find_sibling_below_base(wm: &mut WindowManager, query: SiblingQuery) -> Option<Xid> {
    wm.screen(query.window.screen)?
        .find_sibling_below(query.window.id, query.above_fullscreen)
}

fn allowed_actions_base(_wm: &mut WindowManager, _window: WindowRef) -> AllowedActions {
    AllowedActions::default()
}

/// Nothing to draw for windows that are neither viewable nor shaded
fn paint_window_base(wm: &mut WindowManager, window: WindowRef) -> bool {
    wm.window(window)
        .is_some_and(|c| !c.destroyed && !c.hidden && (c.viewable || c.shaded))
}

impl WindowManager {
    fn screen_hooks(&self, screen: ScreenId) -> Option<&ScreenHooks> {
        self.display.screen(screen).map(|s| &s.hooks)
    }

    /// Ask the paint chain whether `window` should be drawn this frame
    pub fn paint_window(&mut self, window: WindowRef) -> bool {
        match self.screen_hooks(window.screen).map(|h| h.paint_window.snapshot()) {
            Some(chain) => chain.call(self, window),
            None => false,
        }
    }

    /// Dispatch one server event through the `handle_event` chain
    pub fn handle_event(&mut self, event: ServerEvent) {
        let chain = self.display.hooks.handle_event.snapshot();
        chain.call(self, event);
        self.flush_pending_destroys();
    }

    /// Focus `window` through the `focus_window` chain
    pub fn focus_window(&mut self, window: WindowRef) -> bool {
        match self.screen_hooks(window.screen).map(|h| h.focus_window.snapshot()) {
            Some(chain) => chain.call(self, window),
            None => false,
        }
    }

    /// Activate `window` through the `activate_window` chain
    pub fn activate_window(&mut self, window: WindowRef) {
        if let Some(chain) = self.screen_hooks(window.screen).map(|h| h.activate_window.snapshot()) {
            chain.call(self, window);
        }
    }

    pub(crate) fn window_add_notify(&mut self, window: WindowRef) {
        if let Some(chain) = self.screen_hooks(window.screen).map(|h| h.window_add_notify.snapshot()) {
            chain.call(self, window);
        }
    }

    pub(crate) fn window_resize_notify(&mut self, args: ResizeNotify) {
        if let Some(chain) = self.screen_hooks(args.window.screen).map(|h| h.window_resize_notify.snapshot()) {
            chain.call(self, args);
        }
    }

    pub(crate) fn window_move_notify(&mut self, args: MoveNotify) {
        if let Some(chain) = self.screen_hooks(args.window.screen).map(|h| h.window_move_notify.snapshot()) {
            chain.call(self, args);
        }
    }

    pub(crate) fn window_grab_notify(&mut self, args: GrabNotify) {
        if let Some(chain) = self.screen_hooks(args.window.screen).map(|h| h.window_grab_notify.snapshot()) {
            chain.call(self, args);
        }
    }

    pub(crate) fn window_ungrab_notify(&mut self, window: WindowRef) {
        if let Some(chain) = self.screen_hooks(window.screen).map(|h| h.window_ungrab_notify.snapshot()) {
            chain.call(self, window);
        }
    }

    pub(crate) fn window_state_change_notify(&mut self, args: StateChangeNotify) {
        if let Some(chain) = self.screen_hooks(args.window.screen).map(|h| h.window_state_change_notify.snapshot()) {
            chain.call(self, args);
        }
    }

    pub(crate) fn window_restack_notify(&mut self, window: WindowRef) {
        if let Some(chain) = self.screen_hooks(window.screen).map(|h| h.window_restack_notify.snapshot()) {
            chain.call(self, window);
        }
    }

    /// Raise target for a window, through the `find_sibling_below` chain
    pub(crate) fn sibling_below(&mut self, query: SiblingQuery) -> Option<Xid> {
        match self.screen_hooks(query.window.screen).map(|h| h.find_sibling_below.snapshot()) {
            Some(chain) => chain.call(self, query),
            None => None,
        }
    }

    pub(crate) fn allowed_actions(&mut self, window: WindowRef) -> AllowedActions {
        match self.screen_hooks(window.screen).map(|h| h.allowed_actions.snapshot()) {
            Some(chain) => chain.call(self, window),
            None => AllowedActions::default(),
        }
    }
}
