//! EWMH (Extended Window Manager Hints) driver
//!
//! Interned atoms, the WM selection takeover and the x11rb implementation
//! of `DisplayServer`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use x11rb::connection::Connection;
use x11rb::protocol::sync::{self, ConnectionExt as _};
use x11rb::protocol::xproto::{
    Atom, AtomEnum, ChangeWindowAttributesAux, ClientMessageEvent, ConfigureWindowAux,
    ConnectionExt as _, CreateWindowAux, EventMask, InputFocus, PropMode, Window, WindowClass,
};
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as _;

use crate::core::Xid;
use crate::wm::client_flags::{WindowActions, WindowState, WindowType};
use crate::wm::server::{DesktopHints, DisplayServer, StackMode, WindowChanges};

const TYPE_ATOMS: &[(&str, WindowType)] = &[
    ("_NET_WM_WINDOW_TYPE_DESKTOP", WindowType::DESKTOP),
    ("_NET_WM_WINDOW_TYPE_DOCK", WindowType::DOCK),
    ("_NET_WM_WINDOW_TYPE_TOOLBAR", WindowType::TOOLBAR),
    ("_NET_WM_WINDOW_TYPE_MENU", WindowType::MENU),
    ("_NET_WM_WINDOW_TYPE_UTILITY", WindowType::UTILITY),
    ("_NET_WM_WINDOW_TYPE_SPLASH", WindowType::SPLASH),
    ("_NET_WM_WINDOW_TYPE_DIALOG", WindowType::DIALOG),
    ("_NET_WM_WINDOW_TYPE_NORMAL", WindowType::NORMAL),
    ("_NET_WM_WINDOW_TYPE_DROPDOWN_MENU", WindowType::DROPDOWN_MENU),
    ("_NET_WM_WINDOW_TYPE_POPUP_MENU", WindowType::POPUP_MENU),
    ("_NET_WM_WINDOW_TYPE_TOOLTIP", WindowType::TOOLTIP),
    ("_NET_WM_WINDOW_TYPE_NOTIFICATION", WindowType::NOTIFICATION),
    ("_NET_WM_WINDOW_TYPE_COMBO", WindowType::COMBO),
    ("_NET_WM_WINDOW_TYPE_DND", WindowType::DND),
];

const STATE_ATOMS: &[(&str, WindowState)] = &[
    ("_NET_WM_STATE_MODAL", WindowState::MODAL),
    ("_NET_WM_STATE_STICKY", WindowState::STICKY),
    ("_NET_WM_STATE_MAXIMIZED_VERT", WindowState::MAXIMIZED_VERT),
    ("_NET_WM_STATE_MAXIMIZED_HORZ", WindowState::MAXIMIZED_HORZ),
    ("_NET_WM_STATE_SHADED", WindowState::SHADED),
    ("_NET_WM_STATE_SKIP_TASKBAR", WindowState::SKIP_TASKBAR),
    ("_NET_WM_STATE_SKIP_PAGER", WindowState::SKIP_PAGER),
    ("_NET_WM_STATE_HIDDEN", WindowState::HIDDEN),
    ("_NET_WM_STATE_FULLSCREEN", WindowState::FULLSCREEN),
    ("_NET_WM_STATE_ABOVE", WindowState::ABOVE),
    ("_NET_WM_STATE_BELOW", WindowState::BELOW),
    ("_NET_WM_STATE_DEMANDS_ATTENTION", WindowState::DEMANDS_ATTENTION),
];

const ACTION_ATOMS: &[(&str, WindowActions)] = &[
    ("_NET_WM_ACTION_MOVE", WindowActions::MOVE),
    ("_NET_WM_ACTION_RESIZE", WindowActions::RESIZE),
    ("_NET_WM_ACTION_STICK", WindowActions::STICK),
    ("_NET_WM_ACTION_MINIMIZE", WindowActions::MINIMIZE),
    ("_NET_WM_ACTION_MAXIMIZE_HORZ", WindowActions::MAXIMIZE_HORZ),
    ("_NET_WM_ACTION_MAXIMIZE_VERT", WindowActions::MAXIMIZE_VERT),
    ("_NET_WM_ACTION_FULLSCREEN", WindowActions::FULLSCREEN),
    ("_NET_WM_ACTION_CLOSE", WindowActions::CLOSE),
    ("_NET_WM_ACTION_SHADE", WindowActions::SHADE),
    ("_NET_WM_ACTION_CHANGE_DESKTOP", WindowActions::CHANGE_DESKTOP),
    ("_NET_WM_ACTION_ABOVE", WindowActions::ABOVE),
    ("_NET_WM_ACTION_BELOW", WindowActions::BELOW),
];

/// Holds all interned atoms
#[derive(Debug)]
pub struct Atoms {
    pub net_supported: Atom,
    pub net_supporting_wm_check: Atom,
    pub net_client_list: Atom,
    pub net_client_list_stacking: Atom,
    pub net_number_of_desktops: Atom,
    pub net_current_desktop: Atom,
    pub net_desktop_geometry: Atom,
    pub net_desktop_viewport: Atom,
    pub net_workarea: Atom,
    pub net_active_window: Atom,
    pub net_wm_name: Atom,
    pub net_wm_desktop: Atom,
    pub net_wm_window_type: Atom,
    pub net_wm_state: Atom,
    pub net_wm_allowed_actions: Atom,
    pub net_frame_extents: Atom,
    pub net_wm_strut: Atom,
    pub net_wm_strut_partial: Atom,
    pub net_wm_user_time: Atom,
    pub net_wm_sync_request: Atom,
    pub net_wm_sync_request_counter: Atom,
    pub wm_protocols: Atom,
    pub wm_take_focus: Atom,
    pub wm_client_leader: Atom,
    pub utf8_string: Atom,

    types: Vec<(Atom, WindowType)>,
    states: Vec<(Atom, WindowState)>,
    actions: Vec<(Atom, WindowActions)>,
}

impl Atoms {
    /// Intern all required atoms
    pub fn new<C: Connection>(conn: &C) -> Result<Self> {
        let intern = |name: &str| -> Result<Atom> {
            Ok(conn
                .intern_atom(false, name.as_bytes())?
                .reply()
                .with_context(|| format!("Failed to intern {}", name))?
                .atom)
        };

        let types = TYPE_ATOMS
            .iter()
            .map(|&(name, t)| Ok((intern(name)?, t)))
            .collect::<Result<Vec<_>>>()?;
        let states = STATE_ATOMS
            .iter()
            .map(|&(name, st)| Ok((intern(name)?, st)))
            .collect::<Result<Vec<_>>>()?;
        let actions = ACTION_ATOMS
            .iter()
            .map(|&(name, a)| Ok((intern(name)?, a)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            net_supported: intern("_NET_SUPPORTED")?,
            net_supporting_wm_check: intern("_NET_SUPPORTING_WM_CHECK")?,
            net_client_list: intern("_NET_CLIENT_LIST")?,
            net_client_list_stacking: intern("_NET_CLIENT_LIST_STACKING")?,
            net_number_of_desktops: intern("_NET_NUMBER_OF_DESKTOPS")?,
            net_current_desktop: intern("_NET_CURRENT_DESKTOP")?,
            net_desktop_geometry: intern("_NET_DESKTOP_GEOMETRY")?,
            net_desktop_viewport: intern("_NET_DESKTOP_VIEWPORT")?,
            net_workarea: intern("_NET_WORKAREA")?,
            net_active_window: intern("_NET_ACTIVE_WINDOW")?,
            net_wm_name: intern("_NET_WM_NAME")?,
            net_wm_desktop: intern("_NET_WM_DESKTOP")?,
            net_wm_window_type: intern("_NET_WM_WINDOW_TYPE")?,
            net_wm_state: intern("_NET_WM_STATE")?,
            net_wm_allowed_actions: intern("_NET_WM_ALLOWED_ACTIONS")?,
            net_frame_extents: intern("_NET_FRAME_EXTENTS")?,
            net_wm_strut: intern("_NET_WM_STRUT")?,
            net_wm_strut_partial: intern("_NET_WM_STRUT_PARTIAL")?,
            net_wm_user_time: intern("_NET_WM_USER_TIME")?,
            net_wm_sync_request: intern("_NET_WM_SYNC_REQUEST")?,
            net_wm_sync_request_counter: intern("_NET_WM_SYNC_REQUEST_COUNTER")?,
            wm_protocols: intern("WM_PROTOCOLS")?,
            wm_take_focus: intern("WM_TAKE_FOCUS")?,
            wm_client_leader: intern("WM_CLIENT_LEADER")?,
            utf8_string: intern("UTF8_STRING")?,
            types,
            states,
            actions,
        })
    }

    /// Set up _NET_SUPPORTED on root window
    pub fn setup_supported<C: Connection>(&self, conn: &C, root: Window) -> Result<()> {
        let mut supported = vec![
            self.net_supported,
            self.net_supporting_wm_check,
            self.net_client_list,
            self.net_client_list_stacking,
            self.net_number_of_desktops,
            self.net_current_desktop,
            self.net_desktop_geometry,
            self.net_desktop_viewport,
            self.net_workarea,
            self.net_active_window,
            self.net_wm_name,
            self.net_wm_desktop,
            self.net_wm_window_type,
            self.net_wm_state,
            self.net_wm_allowed_actions,
            self.net_frame_extents,
            self.net_wm_strut,
            self.net_wm_strut_partial,
            self.net_wm_user_time,
            self.net_wm_sync_request,
            self.net_wm_sync_request_counter,
        ];
        supported.extend(self.types.iter().map(|&(atom, _)| atom));
        supported.extend(self.states.iter().map(|&(atom, _)| atom));
        supported.extend(self.actions.iter().map(|&(atom, _)| atom));

        conn.change_property32(
            PropMode::REPLACE,
            root,
            self.net_supported,
            AtomEnum::ATOM,
            &supported,
        )?;
        Ok(())
    }

    /// First type in `_NET_WM_WINDOW_TYPE` we know about
    pub fn window_type(&self, atoms: &[Atom]) -> WindowType {
        atoms
            .iter()
            .find_map(|atom| self.types.iter().find(|(a, _)| a == atom).map(|&(_, t)| t))
            .unwrap_or(WindowType::UNKNOWN)
    }

    pub fn window_state(&self, atoms: &[Atom]) -> WindowState {
        self.states
            .iter()
            .filter(|(a, _)| atoms.contains(a))
            .fold(WindowState::empty(), |acc, &(_, st)| acc | st)
    }

    pub fn state_atom(&self, atom: Atom) -> Option<WindowState> {
        self.states.iter().find(|(a, _)| *a == atom).map(|&(_, st)| st)
    }

    fn state_atoms(&self, state: WindowState) -> Vec<Atom> {
        self.states
            .iter()
            .filter(|(_, st)| state.contains(*st))
            .map(|&(a, _)| a)
            .collect()
    }

    fn action_atoms(&self, actions: WindowActions) -> Vec<Atom> {
        self.actions
            .iter()
            .filter(|(_, a)| actions.contains(*a))
            .map(|&(atom, _)| atom)
            .collect()
    }
}

/// Sync alarms we created, keyed by the window they watch
///
/// Shared between the server (which creates alarms) and the event
/// translator (which maps alarm events back to windows).
#[derive(Debug, Clone, Default)]
pub struct SyncAlarms(Rc<RefCell<HashMap<Xid, sync::Alarm>>>);

impl SyncAlarms {
    pub fn window_for_alarm(&self, alarm: sync::Alarm) -> Option<Xid> {
        self.0
            .borrow()
            .iter()
            .find(|&(_, &a)| a == alarm)
            .map(|(&w, _)| w)
    }

    fn alarm_for(&self, window: Xid) -> Option<sync::Alarm> {
        self.0.borrow().get(&window).copied()
    }

    fn insert(&self, window: Xid, alarm: sync::Alarm) {
        self.0.borrow_mut().insert(window, alarm);
    }

    /// Forget the alarm of a destroyed window, returning it for cleanup
    pub fn remove(&self, window: Xid) -> Option<sync::Alarm> {
        self.0.borrow_mut().remove(&window)
    }
}

/// Take over window management on `screen_num`
///
/// Acquires the ICCCM `WM_S{n}` selection (waiting for the previous owner
/// to go away when `replace` is set) and selects substructure redirection
/// on the root. Returns the selection owner window, which must stay alive
/// as long as we manage the screen.
pub fn acquire_wm_selection(
    conn: &RustConnection,
    atoms: &Atoms,
    screen_num: usize,
    replace: bool,
) -> Result<Window> {
    let screen = &conn.setup().roots[screen_num];
    let root = screen.root;

    let selection_name = format!("WM_S{}", screen_num);
    let selection = conn
        .intern_atom(false, selection_name.as_bytes())?
        .reply()
        .context("Failed to intern WM selection atom")?
        .atom;

    let current_owner = conn
        .get_selection_owner(selection)?
        .reply()
        .context("Failed to get current WM selection owner")?
        .owner;

    if current_owner != 0 {
        if !replace {
            anyhow::bail!(
                "Another window manager is already running (window 0x{:x}). \
                Use --replace to attempt to replace it.",
                current_owner
            );
        }
        info!("Existing WM detected (window 0x{:x}), attempting replace", current_owner);
        // Lets us notice when the previous owner window goes away
        let _ = conn.change_window_attributes(
            current_owner,
            &ChangeWindowAttributesAux::new().event_mask(EventMask::STRUCTURE_NOTIFY),
        );
    }

    let owner = conn.generate_id()?;
    conn.create_window(
        screen.root_depth,
        owner,
        root,
        -1000,
        -1000,
        1,
        1,
        0,
        WindowClass::INPUT_OUTPUT,
        0,
        &CreateWindowAux::new().override_redirect(1),
    )?;

    conn.set_selection_owner(owner, selection, x11rb::CURRENT_TIME)?
        .check()
        .context("Failed to set WM selection owner")?;
    let owner_after = conn
        .get_selection_owner(selection)?
        .reply()
        .context("Failed to verify WM selection ownership")?
        .owner;
    if owner_after != owner {
        anyhow::bail!(
            "Failed to acquire WM selection ownership (expected 0x{:x}, got 0x{:x})",
            owner,
            owner_after
        );
    }

    if current_owner != 0 {
        let timeout = Duration::from_secs(15);
        let start = Instant::now();
        while start.elapsed() < timeout {
            if conn.get_window_attributes(current_owner)?.reply().is_err() {
                info!("Previous WM exited");
                break;
            }
            std::thread::sleep(Duration::from_millis(100));
        }
        if start.elapsed() >= timeout {
            warn!("Timeout waiting for previous WM to exit, proceeding anyway");
        }
    }

    let root_attrs = conn
        .get_window_attributes(root)?
        .reply()
        .context("Failed to get root window attributes")?;
    let mask = root_attrs.your_event_mask
        | EventMask::SUBSTRUCTURE_REDIRECT
        | EventMask::SUBSTRUCTURE_NOTIFY
        | EventMask::PROPERTY_CHANGE
        | EventMask::FOCUS_CHANGE;
    conn.change_window_attributes(root, &ChangeWindowAttributesAux::new().event_mask(mask))?
        .check()
        .context("Failed to select events on root window - is another WM running?")?;

    atoms.setup_supported(conn, root)?;
    conn.change_property32(
        PropMode::REPLACE,
        root,
        atoms.net_supporting_wm_check,
        AtomEnum::WINDOW,
        &[owner],
    )?;
    conn.change_property32(
        PropMode::REPLACE,
        owner,
        atoms.net_supporting_wm_check,
        AtomEnum::WINDOW,
        &[owner],
    )?;
    conn.change_property8(
        PropMode::REPLACE,
        owner,
        atoms.net_wm_name,
        atoms.utf8_string,
        b"strata",
    )?;
    conn.flush()?;

    info!("Managing screen {} (root 0x{:x})", screen_num, root);
    Ok(owner)
}

/// `DisplayServer` on an x11rb connection
pub struct X11Server {
    conn: Arc<RustConnection>,
    atoms: Rc<Atoms>,
    alarms: SyncAlarms,
    /// Whether the server speaks the SYNC extension
    has_sync: bool,
}

impl X11Server {
    pub fn new(conn: Arc<RustConnection>, atoms: Rc<Atoms>, alarms: SyncAlarms) -> Self {
        let has_sync = match conn.sync_initialize(3, 1) {
            Ok(cookie) => cookie.reply().is_ok(),
            Err(_) => false,
        };
        if !has_sync {
            warn!("SYNC extension unavailable, resizes will not wait for clients");
        }
        Self {
            conn,
            atoms,
            alarms,
            has_sync,
        }
    }

    fn send_protocol_message(&self, window: Xid, data: [u32; 5]) -> Result<()> {
        let event = ClientMessageEvent::new(32, window, self.atoms.wm_protocols, data);
        self.conn
            .send_event(false, window, EventMask::NO_EVENT, event)
            .context("Failed to send WM_PROTOCOLS message")?;
        Ok(())
    }

    fn arm_alarm(&self, window: Xid, counter: u32, value: u64) -> Result<()> {
        let target = sync::Int64 {
            hi: (value >> 32) as i32,
            lo: value as u32,
        };
        let aux = sync::CreateAlarmAux::new()
            .counter(counter)
            .value_type(sync::VALUETYPE::ABSOLUTE)
            .value(target)
            .test_type(sync::TESTTYPE::POSITIVE_COMPARISON)
            .delta(sync::Int64 { hi: 0, lo: 1 })
            .events(1);

        match self.alarms.alarm_for(window) {
            Some(alarm) => {
                let change = sync::ChangeAlarmAux::new()
                    .counter(counter)
                    .value_type(sync::VALUETYPE::ABSOLUTE)
                    .value(target)
                    .test_type(sync::TESTTYPE::POSITIVE_COMPARISON)
                    .events(1);
                self.conn.sync_change_alarm(alarm, &change)?;
            }
            None => {
                let alarm = self.conn.generate_id()?;
                self.conn.sync_create_alarm(alarm, &aux)?;
                self.alarms.insert(window, alarm);
            }
        }
        Ok(())
    }
}

impl DisplayServer for X11Server {
    fn configure_window(&mut self, window: Xid, changes: &WindowChanges) -> Result<()> {
        let mut aux = ConfigureWindowAux::new();
        aux.x = changes.x;
        aux.y = changes.y;
        aux.width = changes.width.map(|w| w.max(1) as u32);
        aux.height = changes.height.map(|h| h.max(1) as u32);
        aux.border_width = changes.border_width.map(|bw| bw.max(0) as u32);
        aux.sibling = changes.sibling;
        aux.stack_mode = changes.stack_mode.map(|mode| match mode {
            StackMode::Above => x11rb::protocol::xproto::StackMode::ABOVE,
            StackMode::Below => x11rb::protocol::xproto::StackMode::BELOW,
        });
        self.conn.configure_window(window, &aux)?;
        Ok(())
    }

    fn map_window(&mut self, window: Xid) -> Result<()> {
        self.conn.map_window(window)?;
        Ok(())
    }

    fn unmap_window(&mut self, window: Xid) -> Result<()> {
        self.conn.unmap_window(window)?;
        Ok(())
    }

    fn set_input_focus(&mut self, window: Xid) -> Result<()> {
        self.conn
            .set_input_focus(InputFocus::POINTER_ROOT, window, x11rb::CURRENT_TIME)?;
        Ok(())
    }

    fn send_take_focus(&mut self, window: Xid, timestamp: u32) -> Result<()> {
        self.send_protocol_message(window, [self.atoms.wm_take_focus, timestamp, 0, 0, 0])
    }

    fn set_window_state(&mut self, window: Xid, state: WindowState) -> Result<()> {
        let atoms = self.atoms.state_atoms(state);
        self.conn.change_property32(
            PropMode::REPLACE,
            window,
            self.atoms.net_wm_state,
            AtomEnum::ATOM,
            &atoms,
        )?;
        Ok(())
    }

    fn set_allowed_actions(&mut self, window: Xid, actions: WindowActions) -> Result<()> {
        let atoms = self.atoms.action_atoms(actions);
        self.conn.change_property32(
            PropMode::REPLACE,
            window,
            self.atoms.net_wm_allowed_actions,
            AtomEnum::ATOM,
            &atoms,
        )?;
        Ok(())
    }

    fn set_window_desktop(&mut self, window: Xid, desktop: u32) -> Result<()> {
        self.conn.change_property32(
            PropMode::REPLACE,
            window,
            self.atoms.net_wm_desktop,
            AtomEnum::CARDINAL,
            &[desktop],
        )?;
        Ok(())
    }

    fn set_client_list(&mut self, root: Xid, mapped: &[Xid], stacking: &[Xid]) -> Result<()> {
        self.conn.change_property32(
            PropMode::REPLACE,
            root,
            self.atoms.net_client_list,
            AtomEnum::WINDOW,
            mapped,
        )?;
        self.conn.change_property32(
            PropMode::REPLACE,
            root,
            self.atoms.net_client_list_stacking,
            AtomEnum::WINDOW,
            stacking,
        )?;
        Ok(())
    }

    fn set_active_window(&mut self, root: Xid, window: Option<Xid>) -> Result<()> {
        self.conn.change_property32(
            PropMode::REPLACE,
            root,
            self.atoms.net_active_window,
            AtomEnum::WINDOW,
            &[window.unwrap_or(0)],
        )?;
        Ok(())
    }

    fn set_desktop_hints(&mut self, root: Xid, hints: &DesktopHints) -> Result<()> {
        let count = hints.desktop_count.max(1) as usize;
        let viewport = [hints.viewport_x as u32, hints.viewport_y as u32].repeat(count);
        let wa = hints.work_area;
        let work_area = [wa.x as u32, wa.y as u32, wa.width as u32, wa.height as u32].repeat(count);

        self.conn.change_property32(
            PropMode::REPLACE,
            root,
            self.atoms.net_number_of_desktops,
            AtomEnum::CARDINAL,
            &[hints.desktop_count],
        )?;
        self.conn.change_property32(
            PropMode::REPLACE,
            root,
            self.atoms.net_current_desktop,
            AtomEnum::CARDINAL,
            &[hints.current_desktop],
        )?;
        self.conn.change_property32(
            PropMode::REPLACE,
            root,
            self.atoms.net_desktop_geometry,
            AtomEnum::CARDINAL,
            &[hints.virtual_width as u32, hints.virtual_height as u32],
        )?;
        self.conn.change_property32(
            PropMode::REPLACE,
            root,
            self.atoms.net_desktop_viewport,
            AtomEnum::CARDINAL,
            &viewport,
        )?;
        self.conn.change_property32(
            PropMode::REPLACE,
            root,
            self.atoms.net_workarea,
            AtomEnum::CARDINAL,
            &work_area,
        )?;
        Ok(())
    }

    fn send_sync_request(&mut self, window: Xid, counter: u32, value: u64) -> Result<bool> {
        if !self.has_sync {
            return Ok(false);
        }
        self.arm_alarm(window, counter, value)?;
        self.send_protocol_message(
            window,
            [
                self.atoms.net_wm_sync_request,
                x11rb::CURRENT_TIME,
                value as u32,
                (value >> 32) as u32,
                0,
            ],
        )?;
        debug!("Sync request {} sent to 0x{:x}", value, window);
        Ok(true)
    }

    fn flush(&mut self) -> Result<()> {
        self.conn.flush()?;
        Ok(())
    }
}
