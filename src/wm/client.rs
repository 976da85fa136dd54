use std::rc::Rc;
use std::time::Instant;

use tracing::debug;

use crate::core::{ObjectBase, ObjectKind, ObjectRef, ScreenId, WindowRef, Xid};
use crate::shared::{FrameExtents, Geometry, Strut};
use crate::wm::WindowManager;
use crate::wm::client_flags::{ChangeMask, WindowActions, WindowState, WindowType};

/// Desktop value of windows shown on every desktop
pub const ALL_DESKTOPS: u32 = 0xFFFF_FFFF;

/// What the server reports about a window when we first learn of it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowAttributes {
    pub geometry: Geometry,
    pub border_width: i32,
    pub override_redirect: bool,
    /// Already mapped (start-up scan)
    pub viewable: bool,
}

/// `WM_NORMAL_HINTS` size limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SizeHints {
    pub min: Option<(i32, i32)>,
    pub max: Option<(i32, i32)>,
}

impl SizeHints {
    /// Minimum and maximum are both given and equal
    pub fn is_fixed(&self) -> bool {
        self.min.is_some() && self.min == self.max
    }

    pub fn constrain(&self, width: i32, height: i32) -> (i32, i32) {
        let (mut width, mut height) = (width, height);
        if let Some((max_w, max_h)) = self.max {
            width = width.min(max_w);
            height = height.min(max_h);
        }
        if let Some((min_w, min_h)) = self.min {
            width = width.max(min_w);
            height = height.max(min_h);
        }
        (width.max(1), height.max(1))
    }
}

/// Geometry to go back to when leaving maximized or fullscreen state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SavedGeometry {
    pub geometry: Geometry,
    pub border_width: i32,
    /// Which fields hold a saved value
    pub mask: ChangeMask,
}

/// A configure we are holding back until the client has redrawn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncWait {
    pub deadline: Instant,
    /// Latest server geometry received while waiting
    pub geometry: Option<(Geometry, i32)>,
}

/// `_NET_WM_SYNC_REQUEST` state
#[derive(Debug, Clone, Default)]
pub struct SyncState {
    pub counter: Option<u32>,
    pub value: u64,
    pub wait: Option<SyncWait>,
}

/// Windows sharing a `WM_HINTS` window group
#[derive(Debug, PartialEq, Eq)]
pub struct WindowGroup {
    pub leader: Xid,
}

/// One window known to a screen
#[derive(Debug)]
pub struct Client {
    pub object: ObjectBase,

    pub id: Xid,

    pub screen: ScreenId,

    /// Window directly below in the stacking order
    pub(crate) next: Option<Xid>,

    /// Window directly above in the stacking order
    pub(crate) prev: Option<Xid>,

    /// Geometry as currently rendered
    pub geometry: Geometry,
    pub border_width: i32,

    /// Last geometry sent to or confirmed by the server
    pub server_geometry: Geometry,
    pub server_border_width: i32,

    pub saved: SavedGeometry,

    /// Decoration extents around the client
    pub input: FrameExtents,

    /// Type the client asked for
    pub wm_type: WindowType,

    /// Effective type, see `effective_type`
    pub window_type: WindowType,

    pub state: WindowState,
    pub actions: WindowActions,
    pub size_hints: SizeHints,

    pub transient_for: Option<Xid>,
    pub client_leader: Option<Xid>,
    pub group: Option<Rc<WindowGroup>>,

    /// Desktop index or `ALL_DESKTOPS`
    pub desktop: u32,

    /// Map order, 0 while unmapped
    pub map_num: u32,

    /// Activation order, 0 if never activated
    pub active_num: u32,

    pub managed: bool,
    pub override_redirect: bool,
    pub viewable: bool,
    pub shaded: bool,
    pub hidden: bool,
    pub minimized: bool,
    pub placed: bool,
    pub grabbed: bool,

    /// Maps requested but not yet confirmed
    pub pending_maps: u32,
    /// Unmaps we issued ourselves
    pub pending_unmaps: u32,
    /// Restacks applied locally, still to be confirmed by the server
    pub pending_restacks: u32,

    /// `WM_HINTS` input field
    pub input_hint: bool,
    /// Supports `WM_TAKE_FOCUS`
    pub take_focus: bool,
    /// `_NET_WM_USER_TIME`
    pub user_time: Option<u32>,

    pub strut: Option<Strut>,

    /// `WM_CLASS` class part
    pub res_class: Option<String>,

    pub sync: SyncState,

    /// Holders keeping a destroyed window around
    pub destroy_refs: u32,
    pub destroyed: bool,
}

impl Client {
    pub fn new(id: Xid, screen: ScreenId, privates_len: usize, attrs: WindowAttributes) -> Self {
        Self {
            object: ObjectBase::init(ObjectKind::Window, Some(ObjectRef::Screen(screen)), privates_len),
            id,
            screen,
            next: None,
            prev: None,
            geometry: attrs.geometry,
            border_width: attrs.border_width,
            server_geometry: attrs.geometry,
            server_border_width: attrs.border_width,
            saved: SavedGeometry::default(),
            input: FrameExtents::default(),
            wm_type: WindowType::UNKNOWN,
            window_type: WindowType::UNKNOWN,
            state: WindowState::empty(),
            actions: WindowActions::empty(),
            size_hints: SizeHints::default(),
            transient_for: None,
            client_leader: None,
            group: None,
            desktop: 0,
            map_num: 0,
            active_num: 0,
            managed: false,
            override_redirect: attrs.override_redirect,
            viewable: attrs.viewable,
            shaded: false,
            hidden: false,
            minimized: false,
            placed: false,
            grabbed: false,
            pending_maps: 0,
            pending_unmaps: 0,
            pending_restacks: 0,
            input_hint: true,
            take_focus: false,
            user_time: None,
            strut: None,
            res_class: None,
            sync: SyncState::default(),
            destroy_refs: 0,
            destroyed: false,
        }
    }

    pub fn window_ref(&self) -> WindowRef {
        WindowRef::new(self.screen, self.id)
    }

    /// Window directly below this one
    pub fn below(&self) -> Option<Xid> {
        self.next
    }

    /// Window directly above this one
    pub fn above(&self) -> Option<Xid> {
        self.prev
    }

    pub fn is_mapped(&self) -> bool {
        self.map_num != 0
    }

    pub fn is_type(&self, mask: WindowType) -> bool {
        mask.intersects(self.window_type)
    }

    pub fn on_desktop(&self, desktop: u32) -> bool {
        self.desktop == desktop || self.desktop == ALL_DESKTOPS
    }

    /// Windows that stacking computations never use as a reference point
    pub fn avoid_stacking_relative_to(&self) -> bool {
        if self.override_redirect {
            return true;
        }
        !self.shaded && self.pending_maps == 0 && (!self.viewable || self.map_num == 0)
    }

    /// The type the window is treated as, derived from the requested type
    /// and state
    pub fn effective_type(&self) -> WindowType {
        let mut t = self.wm_type;
        if t == WindowType::UNKNOWN && !self.override_redirect {
            t = WindowType::NORMAL;
        }

        if self.state.contains(WindowState::FULLSCREEN) {
            t = WindowType::FULLSCREEN;
        }

        if t == WindowType::NORMAL && self.transient_for.is_some() {
            t = WindowType::DIALOG;
        }

        if t == WindowType::DOCK && self.state.contains(WindowState::BELOW) {
            t = WindowType::NORMAL;
        }

        if (t == WindowType::NORMAL || t == WindowType::DIALOG)
            && self.state.contains(WindowState::MODAL)
        {
            t = WindowType::MODAL_DIALOG;
        }
        t
    }

    /// Actions before plugin adjustments
    pub fn base_actions(&self) -> WindowActions {
        let mut actions = if self.is_type(WindowType::FULLSCREEN | WindowType::NORMAL) {
            WindowActions::MAXIMIZE_HORZ
                | WindowActions::MAXIMIZE_VERT
                | WindowActions::FULLSCREEN
                | WindowActions::MOVE
                | WindowActions::RESIZE
                | WindowActions::STICK
                | WindowActions::MINIMIZE
                | WindowActions::CLOSE
                | WindowActions::CHANGE_DESKTOP
        } else if self.is_type(WindowType::UTILITY | WindowType::MENU | WindowType::TOOLBAR) {
            WindowActions::MOVE
                | WindowActions::RESIZE
                | WindowActions::STICK
                | WindowActions::CLOSE
                | WindowActions::CHANGE_DESKTOP
        } else if self.is_type(WindowType::DIALOG | WindowType::MODAL_DIALOG) {
            let mut dialog = WindowActions::MAXIMIZE_HORZ
                | WindowActions::MAXIMIZE_VERT
                | WindowActions::MOVE
                | WindowActions::RESIZE
                | WindowActions::STICK
                | WindowActions::CLOSE
                | WindowActions::CHANGE_DESKTOP;
            // Transients minimize with their parent
            if self.transient_for.is_none() && !self.state.contains(WindowState::SKIP_TASKBAR) {
                dialog |= WindowActions::MINIMIZE;
            }
            dialog
        } else {
            WindowActions::empty()
        };

        if self.input.top != 0 {
            actions |= WindowActions::SHADE;
        }
        actions |= WindowActions::ABOVE | WindowActions::BELOW;

        if self.wm_type == WindowType::NORMAL {
            actions |= WindowActions::FULLSCREEN | WindowActions::MINIMIZE;
        }

        if self.size_hints.is_fixed() {
            actions.remove(
                WindowActions::RESIZE
                    | WindowActions::MAXIMIZE_HORZ
                    | WindowActions::MAXIMIZE_VERT
                    | WindowActions::FULLSCREEN,
            );
        }
        actions
    }
}

impl WindowManager {
    /// Recompute the effective type after a type, state or transient change
    pub fn recalc_window_type(&mut self, w: WindowRef) {
        let Some(client) = self.window_mut(w) else {
            return;
        };
        let window_type = client.effective_type();
        if window_type == client.window_type {
            return;
        }
        debug!(
            "Window 0x{:x} type {} -> {}",
            w.id,
            client.window_type.name(),
            window_type.name()
        );
        client.window_type = window_type;
        let mapped = client.is_mapped();

        self.recalc_window_actions(w);
        if mapped {
            self.update_window_attributes(w, crate::wm::stacking::StackingUpdateMode::Normal);
        }
    }

    /// Store the requested `_NET_WM_WINDOW_TYPE`
    pub fn set_window_type(&mut self, w: WindowRef, wm_type: WindowType) {
        let Some(client) = self.window_mut(w) else {
            return;
        };
        if client.wm_type == wm_type {
            return;
        }
        client.wm_type = wm_type;
        self.recalc_window_type(w);
    }

    /// Recompute allowed actions and publish them when they changed
    pub fn recalc_window_actions(&mut self, w: WindowRef) {
        let Some(client) = self.window(w) else {
            return;
        };
        let mut actions = client.base_actions();

        let adjust = self.allowed_actions(w);
        actions.remove(adjust.clear);
        actions.insert(adjust.set);

        let Some(client) = self.window_mut(w) else {
            return;
        };
        if client.actions != actions {
            client.actions = actions;
            self.request("Set allowed actions", |s| s.set_allowed_actions(w.id, actions));
        }
    }
}
