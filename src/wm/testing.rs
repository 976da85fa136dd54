//! Test support: a display server that records requests, and helpers that
//! bring windows into the state the tests need through the same events a
//! real server would send

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Result;

use crate::config::Config;
use crate::core::{WindowRef, Xid};
use crate::shared::Geometry;
use crate::wm::client::WindowAttributes;
use crate::wm::client_flags::{WindowActions, WindowState, WindowType};
use crate::wm::server::{DesktopHints, DisplayServer, WindowChanges};
use crate::wm::{ServerEvent, WindowManager};

/// Root window of the test screen
pub const ROOT: Xid = 1;

/// One request as the server saw it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Configure(Xid, WindowChanges),
    Map(Xid),
    Unmap(Xid),
    InputFocus(Xid),
    TakeFocus(Xid, u32),
    WindowState(Xid, WindowState),
    AllowedActions(Xid, WindowActions),
    Desktop(Xid, u32),
    ClientList(Xid, Vec<Xid>, Vec<Xid>),
    ActiveWindow(Xid, Option<Xid>),
    DesktopHints(Xid, DesktopHints),
    SyncRequest(Xid, u32, u64),
}

/// Shared view of what the recording server received
#[derive(Debug, Clone, Default)]
pub struct RequestLog(Rc<RefCell<Vec<Request>>>);

impl RequestLog {
    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }

    /// Requests since the last `take` or `clear`
    pub fn take(&self) -> Vec<Request> {
        std::mem::take(&mut *self.0.borrow_mut())
    }

    fn push(&self, request: Request) {
        self.0.borrow_mut().push(request);
    }
}

pub struct RecordingServer {
    log: RequestLog,
}

impl DisplayServer for RecordingServer {
    fn configure_window(&mut self, window: Xid, changes: &WindowChanges) -> Result<()> {
        self.log.push(Request::Configure(window, *changes));
        Ok(())
    }

    fn map_window(&mut self, window: Xid) -> Result<()> {
        self.log.push(Request::Map(window));
        Ok(())
    }

    fn unmap_window(&mut self, window: Xid) -> Result<()> {
        self.log.push(Request::Unmap(window));
        Ok(())
    }

    fn set_input_focus(&mut self, window: Xid) -> Result<()> {
        self.log.push(Request::InputFocus(window));
        Ok(())
    }

    fn send_take_focus(&mut self, window: Xid, timestamp: u32) -> Result<()> {
        self.log.push(Request::TakeFocus(window, timestamp));
        Ok(())
    }

    fn set_window_state(&mut self, window: Xid, state: WindowState) -> Result<()> {
        self.log.push(Request::WindowState(window, state));
        Ok(())
    }

    fn set_allowed_actions(&mut self, window: Xid, actions: WindowActions) -> Result<()> {
        self.log.push(Request::AllowedActions(window, actions));
        Ok(())
    }

    fn set_window_desktop(&mut self, window: Xid, desktop: u32) -> Result<()> {
        self.log.push(Request::Desktop(window, desktop));
        Ok(())
    }

    fn set_client_list(&mut self, root: Xid, mapped: &[Xid], stacking: &[Xid]) -> Result<()> {
        self.log.push(Request::ClientList(root, mapped.to_vec(), stacking.to_vec()));
        Ok(())
    }

    fn set_active_window(&mut self, root: Xid, window: Option<Xid>) -> Result<()> {
        self.log.push(Request::ActiveWindow(root, window));
        Ok(())
    }

    fn set_desktop_hints(&mut self, root: Xid, hints: &DesktopHints) -> Result<()> {
        self.log.push(Request::DesktopHints(root, *hints));
        Ok(())
    }

    fn send_sync_request(&mut self, window: Xid, counter: u32, value: u64) -> Result<bool> {
        self.log.push(Request::SyncRequest(window, counter, value));
        Ok(true)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Window manager on display ":9" with one 1024x768 screen (root 1) and
/// the default configuration
pub fn test_wm() -> (WindowManager, RequestLog) {
    let log = RequestLog::default();
    let server = RecordingServer { log: log.clone() };
    let mut wm = WindowManager::new(Box::new(server), ":9", &Config::default());
    wm.add_screen(ROOT, 1024, 768);
    (wm, log)
}

/// Create `id` on the test screen without mapping it
pub fn manage(wm: &mut WindowManager, id: Xid) -> WindowRef {
    wm.handle_event(ServerEvent::Create {
        window: id,
        parent: ROOT,
        attrs: WindowAttributes {
            geometry: Geometry::new(10, 10, 200, 150),
            ..WindowAttributes::default()
        },
    });
    WindowRef::new(0, id)
}

/// Create and map `id` with the given type, state and transient parent
///
/// The window is mapped the way a client would do it (map request, then
/// the server's map notification); focus is requested but never
/// confirmed, so no window is active afterwards unless one already was.
pub fn map_with(
    wm: &mut WindowManager,
    id: Xid,
    wm_type: WindowType,
    state: WindowState,
    parent: Option<Xid>,
) -> WindowRef {
    map_with_leader(wm, id, wm_type, state, parent, None)
}

/// `map_with` for a window that names a client leader
pub fn map_with_leader(
    wm: &mut WindowManager,
    id: Xid,
    wm_type: WindowType,
    state: WindowState,
    parent: Option<Xid>,
    leader: Option<Xid>,
) -> WindowRef {
    let w = manage(wm, id);
    wm.set_window_type(w, wm_type);
    if leader.is_some() {
        wm.set_client_leader(w, leader);
    }
    if parent.is_some() {
        wm.set_transient_for(w, parent);
    }
    if !state.is_empty() {
        wm.change_window_state(w, state);
    }
    wm.handle_event(ServerEvent::MapRequest { window: id });
    wm.handle_event(ServerEvent::Map { window: id });
    w
}

pub fn mapped_window(wm: &mut WindowManager, id: Xid) -> WindowRef {
    map_with(wm, id, WindowType::NORMAL, WindowState::empty(), None)
}

pub fn mapped_window_of_type(wm: &mut WindowManager, id: Xid, wm_type: WindowType) -> WindowRef {
    map_with(wm, id, wm_type, WindowState::empty(), None)
}
