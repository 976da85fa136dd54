//! Events Module
//!
//! Incoming notifications from the display server, already decoded into
//! core terms. Every event goes through the display's `handle_event`
//! hook; `handle_event_base` at the bottom of the chain updates the
//! window registry and reacts the way a window manager must.

use tracing::debug;

use crate::core::{WindowRef, Xid};
use crate::shared::{FrameExtents, Geometry, Strut};
use crate::wm::WindowManager;
use crate::wm::client::{SizeHints, WindowAttributes};
use crate::wm::client_flags::{WindowState, WindowType};
use crate::wm::focus::{FocusResult, FocusSource};
use crate::wm::server::{StackMode, WindowChanges};
use crate::wm::stacking::StackingUpdateMode;

/// How a `_NET_WM_STATE` request combines with the current state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateAction {
    Remove,
    Add,
    Toggle,
}

impl StateAction {
    pub fn from_wire(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Remove),
            1 => Some(Self::Add),
            2 => Some(Self::Toggle),
            _ => None,
        }
    }

    pub fn apply(self, current: WindowState, states: WindowState) -> WindowState {
        match self {
            Self::Remove => current - states,
            Self::Add => current | states,
            Self::Toggle => current ^ states,
        }
    }
}

/// A client property the core tracks changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyChange {
    /// `_NET_WM_WINDOW_TYPE`
    WindowType(WindowType),
    /// `WM_TRANSIENT_FOR`
    TransientFor(Option<Xid>),
    /// `WM_CLIENT_LEADER`
    ClientLeader(Option<Xid>),
    /// `WM_HINTS` input field and window group
    Hints { input: bool, group: Option<Xid> },
    /// `WM_PROTOCOLS`, with the `_NET_WM_SYNC_REQUEST_COUNTER` if supported
    Protocols { take_focus: bool, sync_counter: Option<u32> },
    /// `WM_NORMAL_HINTS`
    NormalHints(SizeHints),
    /// `_NET_WM_STRUT_PARTIAL` or `_NET_WM_STRUT`
    Strut(Option<Strut>),
    /// `_NET_WM_USER_TIME`
    UserTime(u32),
    /// `WM_CLASS`
    Class(Option<String>),
    /// Decoration extents
    FrameExtents(FrameExtents),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// A top-level window was created under `parent` (a root window)
    Create {
        window: Xid,
        parent: Xid,
        attrs: WindowAttributes,
    },
    Destroy {
        window: Xid,
    },
    MapRequest {
        window: Xid,
    },
    Map {
        window: Xid,
    },
    Unmap {
        window: Xid,
    },
    /// The server's view of the window changed; `above_sibling` is the
    /// window now directly below it
    Configure {
        window: Xid,
        geometry: Geometry,
        border_width: i32,
        above_sibling: Option<Xid>,
        override_redirect: bool,
    },
    ConfigureRequest {
        window: Xid,
        changes: WindowChanges,
    },
    Property {
        window: Xid,
        change: PropertyChange,
    },
    /// Keyboard focus moved to `window` (a root window for "none")
    FocusIn {
        window: Xid,
    },
    /// `_NET_ACTIVE_WINDOW`
    ActivateRequest {
        window: Xid,
        source: FocusSource,
        timestamp: u32,
    },
    /// `_NET_WM_STATE`
    StateRequest {
        window: Xid,
        action: StateAction,
        states: WindowState,
    },
    /// `_NET_WM_DESKTOP`
    DesktopRequest {
        window: Xid,
        desktop: u32,
    },
    /// `_NET_CURRENT_DESKTOP`
    CurrentDesktopRequest {
        root: Xid,
        desktop: u32,
    },
    /// `_NET_DESKTOP_VIEWPORT`, in pixels
    ViewportRequest {
        root: Xid,
        x: i32,
        y: i32,
    },
    /// A sync counter reached the value we asked for
    SyncAlarm {
        window: Xid,
    },
}

impl ServerEvent {
    /// Window the event is about, root windows included
    pub fn window(&self) -> Xid {
        match self {
            Self::Create { window, .. }
            | Self::Destroy { window }
            | Self::MapRequest { window }
            | Self::Map { window }
            | Self::Unmap { window }
            | Self::Configure { window, .. }
            | Self::ConfigureRequest { window, .. }
            | Self::Property { window, .. }
            | Self::FocusIn { window }
            | Self::ActivateRequest { window, .. }
            | Self::StateRequest { window, .. }
            | Self::DesktopRequest { window, .. }
            | Self::SyncAlarm { window } => *window,
            Self::CurrentDesktopRequest { root, .. } | Self::ViewportRequest { root, .. } => *root,
        }
    }
}

pub(crate) fn handle_event_base(wm: &mut WindowManager, event: ServerEvent) {
    match event {
        ServerEvent::Create { window, parent, attrs } => {
            let Some(screen) = wm.display.screen_for_root(parent) else {
                debug!("CreateNotify for 0x{:x} under non-root 0x{:x}", window, parent);
                return;
            };
            wm.add_window(screen, window, attrs);
        }
        ServerEvent::Destroy { window } => {
            if let Some(w) = wm.find_window(window) {
                wm.destroy_window(w);
            }
        }
        ServerEvent::MapRequest { window } => match wm.find_window(window) {
            Some(w) => wm.handle_map_request(w),
            None => {
                debug!("MapRequest for unknown window 0x{:x}", window);
                wm.request("Map window", |s| s.map_window(window));
            }
        },
        ServerEvent::Map { window } => {
            if let Some(w) = wm.find_window(window) {
                wm.handle_map_notify(w);
            }
        }
        ServerEvent::Unmap { window } => {
            if let Some(w) = wm.find_window(window) {
                wm.handle_unmap_notify(w);
            }
        }
        ServerEvent::Configure {
            window,
            geometry,
            border_width,
            above_sibling,
            override_redirect,
        } => {
            let Some(w) = wm.find_window(window) else {
                return;
            };
            if let Some(c) = wm.window_mut(w) {
                c.override_redirect = override_redirect;
            }
            wm.handle_configure_notify(w, geometry, border_width, above_sibling);
        }
        ServerEvent::ConfigureRequest { window, changes } => wm.handle_configure_request(window, changes),
        ServerEvent::Property { window, change } => {
            if let Some(w) = wm.find_window(window) {
                wm.handle_property_change(w, change);
            }
        }
        ServerEvent::FocusIn { window } => {
            if wm.display.screen_for_root(window).is_some() {
                wm.set_active_window(None);
            } else if let Some(w) = wm.find_window(window) {
                wm.set_active_window(Some(w));
            }
        }
        ServerEvent::ActivateRequest {
            window,
            source,
            timestamp,
        } => {
            if let Some(w) = wm.find_window(window) {
                wm.handle_activate_request(w, source, timestamp);
            }
        }
        ServerEvent::StateRequest { window, action, states } => {
            let Some(w) = wm.find_window(window) else {
                return;
            };
            let Some(current) = wm.window(w).map(|c| c.state) else {
                return;
            };
            wm.request_window_state(w, action.apply(current, states));
        }
        ServerEvent::DesktopRequest { window, desktop } => {
            if let Some(w) = wm.find_window(window) {
                wm.set_window_desktop(w, desktop);
            }
        }
        ServerEvent::CurrentDesktopRequest { root, desktop } => {
            if let Some(screen) = wm.display.screen_for_root(root) {
                wm.set_current_desktop(screen, desktop);
            }
        }
        ServerEvent::ViewportRequest { root, x, y } => {
            let Some(screen) = wm.display.screen_for_root(root) else {
                return;
            };
            if let Some((vx, vy)) = wm.screen(screen).map(|s| (x.div_euclid(s.width), y.div_euclid(s.height))) {
                wm.set_viewport(screen, vx, vy);
            }
        }
        ServerEvent::SyncAlarm { window } => {
            if let Some(w) = wm.find_window(window) {
                wm.handle_sync_alarm(w);
            }
        }
    }
}

impl WindowManager {
    /// A client wants its window shown
    ///
    /// The window becomes managed, is stacked according to whether it may
    /// take focus, and is mapped unless it belongs to another desktop or
    /// is minimized.
    fn handle_map_request(&mut self, w: WindowRef) {
        let Some(s) = self.screen(w.screen) else {
            return;
        };
        let viewport = (s.x, s.y);
        let current_desktop = s.current_desktop;

        let Some(c) = self.window_mut(w) else {
            return;
        };
        if c.is_mapped() || c.destroyed {
            return;
        }
        c.managed = true;
        c.placed = true;

        let allow = self.allow_window_focus(w, WindowType::NO_FOCUS, viewport, None);
        debug!("MapRequest 0x{:x}: focus {:?}", w.id, allow);

        let Some(c) = self.window(w) else {
            return;
        };
        if allow != FocusResult::Allowed && !c.is_type(WindowType::NO_FOCUS) {
            let state = c.state | WindowState::DEMANDS_ATTENTION;
            self.change_window_state(w, state);
        }

        let Some(c) = self.window_mut(w) else {
            return;
        };
        if c.minimized || !c.on_desktop(current_desktop) {
            c.hidden = true;
            let state = c.state | WindowState::HIDDEN;
            self.change_window_state(w, state);
            return;
        }
        c.pending_maps += 1;

        let mode = if allow == FocusResult::Allowed {
            StackingUpdateMode::InitialMap
        } else {
            StackingUpdateMode::InitialMapDeniedFocus
        };
        self.update_window_attributes(w, mode);
        self.request("Map window", |s| s.map_window(w.id));

        if allow == FocusResult::Allowed {
            self.move_input_focus_to_window(w);
        }
    }

    fn handle_map_notify(&mut self, w: WindowRef) {
        let Some(s) = self.screen_mut(w.screen) else {
            return;
        };
        let map_num = s.next_map_num();
        let Some(c) = s.window_mut(w.id) else {
            return;
        };
        c.pending_maps = c.pending_maps.saturating_sub(1);
        c.map_num = map_num;
        c.viewable = true;
        c.hidden = false;
        let has_strut = c.strut.is_some();

        if has_strut {
            self.update_work_area(w.screen);
        }
        self.update_client_list(w.screen);
    }

    /// An unmap we did not ask for means the client withdrew the window
    fn handle_unmap_notify(&mut self, w: WindowRef) {
        let Some(c) = self.window_mut(w) else {
            return;
        };
        c.map_num = 0;
        c.viewable = false;
        if c.pending_unmaps > 0 {
            c.pending_unmaps -= 1;
        } else {
            debug!("Window 0x{:x} withdrawn", w.id);
            c.managed = false;
            c.placed = false;
            c.hidden = false;
            c.minimized = false;
        }
        let has_strut = c.strut.is_some();

        if has_strut {
            self.update_work_area(w.screen);
        }
        self.update_client_list(w.screen);
        if self.display.next_active_window == Some(w.id) {
            self.display.next_active_window = None;
        }
        if self.display.active_window == Some(w.id) {
            self.focus_default_window(w.screen);
        }
    }

    /// Local restacks were already applied when they were requested, so a
    /// notification for one of them only settles the count
    fn handle_configure_notify(&mut self, w: WindowRef, geometry: Geometry, border_width: i32, above: Option<Xid>) {
        let Some(c) = self.window_mut(w) else {
            return;
        };
        // Held back until the client has drawn at the new size
        let waiting = match c.sync.wait.as_mut() {
            Some(wait) => {
                wait.geometry = Some((geometry, border_width));
                true
            }
            None => false,
        };
        if !waiting {
            self.resize_window(w, geometry, border_width);
        }

        let Some(c) = self.window_mut(w) else {
            return;
        };
        if c.pending_restacks > 0 {
            c.pending_restacks -= 1;
        } else {
            self.restack_window(w, above);
        }
    }

    /// A client asked to move, resize or restack its window
    fn handle_configure_request(&mut self, window: Xid, changes: WindowChanges) {
        let Some(w) = self
            .find_window(window)
            .filter(|&w| self.window(w).is_some_and(|c| c.managed && !c.override_redirect))
        else {
            self.request("Configure window", |s| s.configure_window(window, &changes));
            return;
        };
        let Some(c) = self.window(w) else {
            return;
        };

        let mut geometry = changes.geometry_only();
        if c.is_type(WindowType::FULLSCREEN) {
            geometry = WindowChanges::default();
        }
        if c.state.contains(WindowState::MAXIMIZED_HORZ) {
            geometry.x = None;
            geometry.width = None;
        }
        if c.state.contains(WindowState::MAXIMIZED_VERT) {
            geometry.y = None;
            geometry.height = None;
        }
        if geometry.width.is_some() || geometry.height.is_some() {
            let (width, height) = c.size_hints.constrain(
                geometry.width.unwrap_or(c.server_geometry.width),
                geometry.height.unwrap_or(c.server_geometry.height),
            );
            geometry.width = geometry.width.map(|_| width);
            geometry.height = geometry.height.map(|_| height);
        }
        let mapped = c.is_mapped();

        if mapped && (geometry.width.is_some() || geometry.height.is_some()) {
            self.send_sync_request(w);
        }
        self.configure_x_window(w, &geometry);

        match (changes.stack_mode, changes.sibling) {
            (Some(StackMode::Above), Some(sibling)) => self.restack_window_above(w, sibling),
            (Some(StackMode::Below), Some(sibling)) => self.restack_window_below(w, sibling),
            (Some(StackMode::Below), None) => self.lower_window(w),
            (Some(StackMode::Above), None) => {
                let viewport = self.screen(w.screen).map_or((0, 0), |s| (s.x, s.y));
                if self.display.active_window == Some(w.id)
                    || self.allow_window_focus(w, WindowType::empty(), viewport, None) == FocusResult::Allowed
                {
                    self.raise_window(w);
                } else {
                    debug!("Not raising 0x{:x} above the active window", w.id);
                }
            }
            (None, _) => {}
        }
    }

    fn handle_property_change(&mut self, w: WindowRef, change: PropertyChange) {
        match change {
            PropertyChange::WindowType(t) => self.set_window_type(w, t),
            PropertyChange::TransientFor(parent) => self.set_transient_for(w, parent),
            PropertyChange::ClientLeader(leader) => self.set_client_leader(w, leader),
            PropertyChange::Hints { input, group } => {
                if let Some(c) = self.window_mut(w) {
                    c.input_hint = input;
                }
                self.set_window_group(w, group);
            }
            PropertyChange::Protocols {
                take_focus,
                sync_counter,
            } => {
                if let Some(c) = self.window_mut(w) {
                    c.take_focus = take_focus;
                    c.sync.counter = sync_counter;
                    if sync_counter.is_none() {
                        c.sync.wait = None;
                    }
                }
            }
            PropertyChange::NormalHints(hints) => {
                let Some(c) = self.window_mut(w) else {
                    return;
                };
                c.size_hints = hints;
                let mapped = c.is_mapped();
                self.recalc_window_actions(w);
                if mapped {
                    self.update_window_attributes(w, StackingUpdateMode::None);
                }
            }
            PropertyChange::Strut(strut) => {
                let Some(c) = self.window_mut(w) else {
                    return;
                };
                c.strut = strut;
                self.update_work_area(w.screen);
            }
            PropertyChange::UserTime(time) => {
                if let Some(c) = self.window_mut(w) {
                    c.user_time = Some(time);
                }
            }
            PropertyChange::Class(class) => {
                if let Some(c) = self.window_mut(w) {
                    c.res_class = class;
                }
            }
            PropertyChange::FrameExtents(extents) => {
                let Some(c) = self.window_mut(w) else {
                    return;
                };
                c.input = extents;
                self.recalc_window_actions(w);
            }
        }
    }

    /// Pagers always get their way; applications are subject to focus
    /// stealing prevention and only get attention when denied
    fn handle_activate_request(&mut self, w: WindowRef, source: FocusSource, timestamp: u32) {
        if source != FocusSource::Application {
            self.activate_window(w);
            return;
        }

        let viewport = self.screen(w.screen).map_or((0, 0), |s| (s.x, s.y));
        match self.allow_window_focus(w, WindowType::empty(), viewport, Some(timestamp)) {
            FocusResult::Allowed => self.activate_window(w),
            FocusResult::Denied => {
                let Some(state) = self.window(w).map(|c| c.state) else {
                    return;
                };
                self.change_window_state(w, state | WindowState::DEMANDS_ATTENTION);
            }
            FocusResult::Prevented => debug!("Activation of 0x{:x} prevented", w.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wm::testing::{Request, manage, mapped_window, mapped_window_of_type, test_wm};

    #[test]
    fn test_map_request_then_notify() {
        let (mut wm, log) = test_wm();
        let a = manage(&mut wm, 0x100);

        wm.handle_event(ServerEvent::MapRequest { window: a.id });
        let c = wm.window(a).unwrap();
        assert!(c.managed && c.placed);
        assert_eq!(c.pending_maps, 1);
        assert!(!c.is_mapped());
        let requests = log.take();
        assert!(requests.contains(&Request::Map(a.id)));
        assert!(requests.contains(&Request::InputFocus(a.id)));

        wm.handle_event(ServerEvent::Map { window: a.id });
        let c = wm.window(a).unwrap();
        assert_eq!(c.pending_maps, 0);
        assert!(c.is_mapped() && c.viewable);
        assert!(log.take().contains(&Request::ClientList(1, vec![a.id], vec![a.id])));
    }

    #[test]
    fn test_map_request_off_desktop_stays_hidden() {
        let (mut wm, log) = test_wm();
        wm.screen_mut(0).unwrap().desktop_count = 2;
        let a = manage(&mut wm, 0x100);
        wm.window_mut(a).unwrap().desktop = 1;

        wm.handle_event(ServerEvent::MapRequest { window: a.id });
        let c = wm.window(a).unwrap();
        assert!(c.hidden && c.state.contains(WindowState::HIDDEN));
        assert!(!log.take().contains(&Request::Map(a.id)));
    }

    #[test]
    fn test_denied_map_demands_attention() {
        let (mut wm, _log) = test_wm();
        let a = mapped_window(&mut wm, 0x100);
        wm.set_active_window(Some(a));
        wm.window_mut(a).unwrap().user_time = Some(500);

        let b = manage(&mut wm, 0x200);
        wm.window_mut(b).unwrap().user_time = Some(100);
        wm.handle_event(ServerEvent::MapRequest { window: b.id });
        wm.handle_event(ServerEvent::Map { window: b.id });

        assert!(wm.window(b).unwrap().state.contains(WindowState::DEMANDS_ATTENTION));
        assert_eq!(wm.screen(0).unwrap().stacking_order(), vec![a.id, b.id]);
        assert_eq!(wm.display.next_active_window, None);

        // Docks never take focus, but don't ask for attention either
        let dock = mapped_window_of_type(&mut wm, 0x300, WindowType::DOCK);
        assert!(!wm.window(dock).unwrap().state.contains(WindowState::DEMANDS_ATTENTION));
    }

    #[test]
    fn test_unmap_we_asked_for_keeps_window_managed() {
        let (mut wm, _log) = test_wm();
        let a = mapped_window(&mut wm, 0x100);
        wm.hide_window(a);
        wm.handle_event(ServerEvent::Unmap { window: a.id });
        let c = wm.window(a).unwrap();
        assert!(c.managed && c.hidden && !c.is_mapped());
        assert_eq!(c.pending_unmaps, 0);

        let b = mapped_window(&mut wm, 0x200);
        wm.handle_event(ServerEvent::Unmap { window: b.id });
        let c = wm.window(b).unwrap();
        assert!(!c.managed && !c.placed);
    }

    #[test]
    fn test_unmap_of_active_window_moves_focus() {
        let (mut wm, log) = test_wm();
        let a = mapped_window(&mut wm, 0x100);
        let b = mapped_window(&mut wm, 0x200);
        wm.handle_event(ServerEvent::FocusIn { window: b.id });
        assert_eq!(wm.display.active_window, Some(b.id));

        log.clear();
        wm.handle_event(ServerEvent::Unmap { window: b.id });
        assert!(log.take().contains(&Request::InputFocus(a.id)));

        wm.handle_event(ServerEvent::FocusIn { window: 1 });
        assert_eq!(wm.display.active_window, None);
        assert_eq!(wm.display.prev_active_window, Some(b.id));
    }

    #[test]
    fn test_configure_notify_settles_pending_restacks() {
        let (mut wm, _log) = test_wm();
        let a = mapped_window(&mut wm, 0x100);
        let b = mapped_window(&mut wm, 0x200);
        wm.raise_window(a);
        let pending = wm.window(a).unwrap().pending_restacks;
        assert!(pending > 0);
        let g = wm.window(a).unwrap().server_geometry;

        // Stale notification for the restack we already applied
        wm.handle_event(ServerEvent::Configure {
            window: a.id,
            geometry: g,
            border_width: 0,
            above_sibling: Some(b.id),
            override_redirect: false,
        });
        assert_eq!(wm.window(a).unwrap().pending_restacks, pending - 1);
        assert_eq!(wm.screen(0).unwrap().stacking_order(), vec![a.id, b.id]);

        // Someone else restacked b on top
        wm.window_mut(a).unwrap().pending_restacks = 0;
        let gb = wm.window(b).unwrap().server_geometry;
        wm.window_mut(b).unwrap().pending_restacks = 0;
        wm.handle_event(ServerEvent::Configure {
            window: b.id,
            geometry: gb,
            border_width: 0,
            above_sibling: Some(a.id),
            override_redirect: false,
        });
        assert_eq!(wm.screen(0).unwrap().stacking_order(), vec![b.id, a.id]);
    }

    #[test]
    fn test_configure_request_obeys_state_and_hints() {
        let (mut wm, log) = test_wm();
        let a = mapped_window(&mut wm, 0x100);
        wm.window_mut(a).unwrap().size_hints = SizeHints {
            min: None,
            max: Some((400, 400)),
        };

        log.clear();
        wm.handle_event(ServerEvent::ConfigureRequest {
            window: a.id,
            changes: WindowChanges {
                x: Some(30),
                width: Some(900),
                ..WindowChanges::default()
            },
        });
        let g = wm.window(a).unwrap().server_geometry;
        assert_eq!((g.x, g.width), (30, 400));

        wm.change_window_state(a, WindowState::MAXIMIZED_HORZ);
        let before = wm.window(a).unwrap().server_geometry;
        wm.handle_event(ServerEvent::ConfigureRequest {
            window: a.id,
            changes: WindowChanges {
                x: Some(70),
                ..WindowChanges::default()
            },
        });
        assert_eq!(wm.window(a).unwrap().server_geometry, before);

        // Unknown windows are passed through untouched
        let changes = WindowChanges {
            y: Some(3),
            ..WindowChanges::default()
        };
        log.clear();
        wm.handle_event(ServerEvent::ConfigureRequest { window: 0x999, changes });
        assert_eq!(log.take(), vec![Request::Configure(0x999, changes)]);
    }

    #[test]
    fn test_activate_request_sources() {
        let (mut wm, _log) = test_wm();
        let a = mapped_window(&mut wm, 0x100);
        let b = mapped_window(&mut wm, 0x200);
        wm.window_mut(a).unwrap().user_time = Some(1000);
        wm.set_active_window(Some(a));
        wm.display.next_active_window = None;

        wm.handle_event(ServerEvent::ActivateRequest {
            window: b.id,
            source: FocusSource::Application,
            timestamp: 10,
        });
        assert!(wm.window(b).unwrap().state.contains(WindowState::DEMANDS_ATTENTION));
        assert_eq!(wm.display.next_active_window, None);

        wm.handle_event(ServerEvent::ActivateRequest {
            window: b.id,
            source: FocusSource::Pager,
            timestamp: 0,
        });
        assert_eq!(wm.display.next_active_window, Some(b.id));
        assert_eq!(wm.screen(0).unwrap().top(), Some(b.id));
    }

    #[test]
    fn test_state_request_actions() {
        let (mut wm, _log) = test_wm();
        let a = mapped_window(&mut wm, 0x100);
        let request = |wm: &mut WindowManager, action, states| {
            wm.handle_event(ServerEvent::StateRequest { window: a.id, action, states });
            wm.window(a).unwrap().state
        };

        assert_eq!(request(&mut wm, StateAction::Add, WindowState::ABOVE), WindowState::ABOVE);
        assert_eq!(
            request(&mut wm, StateAction::Toggle, WindowState::ABOVE | WindowState::STICKY),
            WindowState::STICKY
        );
        assert_eq!(request(&mut wm, StateAction::Remove, WindowState::STICKY), WindowState::empty());
        assert_eq!(StateAction::from_wire(3), None);
    }

    #[test]
    fn test_property_changes() {
        let (mut wm, _log) = test_wm();
        let a = mapped_window(&mut wm, 0x100);
        let dock = mapped_window(&mut wm, 0x200);

        wm.handle_event(ServerEvent::Property {
            window: dock.id,
            change: PropertyChange::Strut(Some(Strut {
                top: 30,
                ..Strut::default()
            })),
        });
        assert_eq!(wm.screen(0).unwrap().work_area, Geometry::new(0, 30, 1024, 738));

        wm.handle_event(ServerEvent::Property {
            window: a.id,
            change: PropertyChange::UserTime(77),
        });
        wm.handle_event(ServerEvent::Property {
            window: a.id,
            change: PropertyChange::Protocols {
                take_focus: true,
                sync_counter: Some(5),
            },
        });
        let c = wm.window(a).unwrap();
        assert_eq!(c.user_time, Some(77));
        assert!(c.take_focus);
        assert_eq!(c.sync.counter, Some(5));
    }

    #[test]
    fn test_destroy_and_viewport_requests() {
        let (mut wm, _log) = test_wm();
        let a = mapped_window(&mut wm, 0x100);
        wm.handle_event(ServerEvent::Destroy { window: a.id });
        assert!(wm.window(a).is_none());

        wm.handle_event(ServerEvent::ViewportRequest {
            root: 1,
            x: 2 * 1024 + 5,
            y: 0,
        });
        assert_eq!((wm.screen(0).unwrap().x, wm.screen(0).unwrap().y), (2, 0));
    }
}
