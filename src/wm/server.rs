//! Display Server Boundary
//!
//! The requests the core issues to the display server. The X11 driver in
//! `ewmh` implements this on top of x11rb; tests use a recording double.

use anyhow::Result;

use crate::core::Xid;
use crate::shared::Geometry;
use crate::wm::client_flags::{ChangeMask, WindowActions, WindowState};

/// Stack mode of a configure request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackMode {
    /// Directly above `sibling`, or on top without one
    Above,
    /// At the bottom (no sibling) or directly below `sibling`
    Below,
}

/// Configure request, only `Some` fields are changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowChanges {
    pub x: Option<i32>,
    pub y: Option<i32>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub border_width: Option<i32>,
    pub sibling: Option<Xid>,
    pub stack_mode: Option<StackMode>,
}

impl WindowChanges {
    pub fn above(sibling: Xid) -> Self {
        Self {
            sibling: Some(sibling),
            stack_mode: Some(StackMode::Above),
            ..Self::default()
        }
    }

    pub fn bottom() -> Self {
        Self {
            stack_mode: Some(StackMode::Below),
            ..Self::default()
        }
    }

    pub fn mask(&self) -> ChangeMask {
        let mut mask = ChangeMask::empty();
        mask.set(ChangeMask::X, self.x.is_some());
        mask.set(ChangeMask::Y, self.y.is_some());
        mask.set(ChangeMask::WIDTH, self.width.is_some());
        mask.set(ChangeMask::HEIGHT, self.height.is_some());
        mask.set(ChangeMask::BORDER_WIDTH, self.border_width.is_some());
        mask.set(ChangeMask::SIBLING, self.sibling.is_some());
        mask.set(ChangeMask::STACK_MODE, self.stack_mode.is_some());
        mask
    }

    pub fn is_empty(&self) -> bool {
        self.mask().is_empty()
    }

    /// Only the geometry part of the request
    pub fn geometry_only(&self) -> Self {
        Self {
            sibling: None,
            stack_mode: None,
            ..*self
        }
    }

    /// Apply the geometry part to `geometry` / `border_width`
    pub fn apply_to(&self, geometry: &mut Geometry, border_width: &mut i32) {
        if let Some(x) = self.x {
            geometry.x = x;
        }
        if let Some(y) = self.y {
            geometry.y = y;
        }
        if let Some(width) = self.width {
            geometry.width = width;
        }
        if let Some(height) = self.height {
            geometry.height = height;
        }
        if let Some(bw) = self.border_width {
            *border_width = bw;
        }
    }
}

/// Root window properties describing desktops and viewports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DesktopHints {
    pub desktop_count: u32,
    pub current_desktop: u32,
    /// Size of the whole virtual desktop in pixels
    pub virtual_width: i32,
    pub virtual_height: i32,
    /// Top-left of the current viewport in pixels
    pub viewport_x: i32,
    pub viewport_y: i32,
    pub work_area: Geometry,
}

/// Outgoing requests
///
/// Errors are reported to the caller, which logs them and carries on;
/// a window that vanished server-side is not a failure of the core.
pub trait DisplayServer {
    fn configure_window(&mut self, window: Xid, changes: &WindowChanges) -> Result<()>;

    fn map_window(&mut self, window: Xid) -> Result<()>;

    fn unmap_window(&mut self, window: Xid) -> Result<()>;

    /// Give keyboard focus to `window` (the root window for "none")
    fn set_input_focus(&mut self, window: Xid) -> Result<()>;

    /// Send `WM_TAKE_FOCUS`
    fn send_take_focus(&mut self, window: Xid, timestamp: u32) -> Result<()>;

    fn set_window_state(&mut self, window: Xid, state: WindowState) -> Result<()>;

    fn set_allowed_actions(&mut self, window: Xid, actions: WindowActions) -> Result<()>;

    fn set_window_desktop(&mut self, window: Xid, desktop: u32) -> Result<()>;

    /// `_NET_CLIENT_LIST` (map order) and `_NET_CLIENT_LIST_STACKING` (bottom to top)
    fn set_client_list(&mut self, root: Xid, mapped: &[Xid], stacking: &[Xid]) -> Result<()>;

    fn set_active_window(&mut self, root: Xid, window: Option<Xid>) -> Result<()>;

    fn set_desktop_hints(&mut self, root: Xid, hints: &DesktopHints) -> Result<()>;

    /// Ask the client to update its sync counter to `value` once it has
    /// redrawn. Returns true when an acknowledgement will be delivered as a
    /// `SyncAlarm` event.
    fn send_sync_request(&mut self, window: Xid, counter: u32, value: u64) -> Result<bool>;

    fn flush(&mut self) -> Result<()>;
}
