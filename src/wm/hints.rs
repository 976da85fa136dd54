//! Hints Module
//!
//! Reads ICCCM/EWMH client properties and turns raw x11rb events into
//! `ServerEvent`s the core understands.

use std::rc::Rc;
use std::sync::Arc;

use anyhow::Result;
use tracing::debug;
use x11rb::protocol::Event;
use x11rb::protocol::sync::ConnectionExt as _;
use x11rb::protocol::xproto::{
    Atom, AtomEnum, ChangeWindowAttributesAux, ConfigWindow, ConfigureRequestEvent,
    ConnectionExt as _, EventMask, MapState, NotifyDetail, NotifyMode, StackMode as XStackMode,
    Window,
};
use x11rb::rust_connection::RustConnection;

use crate::core::Xid;
use crate::shared::{Geometry, Strut};
use crate::wm::ServerEvent;
use crate::wm::client::{SizeHints, WindowAttributes};
use crate::wm::events::{PropertyChange, StateAction};
use crate::wm::ewmh::{Atoms, SyncAlarms};
use crate::wm::focus::FocusSource;
use crate::wm::server::{StackMode, WindowChanges};

/// `WM_HINTS` flag bits
const INPUT_HINT: u32 = 1 << 0;
const WINDOW_GROUP_HINT: u32 = 1 << 6;

/// `WM_NORMAL_HINTS` flag bits
const P_MIN_SIZE: u32 = 1 << 4;
const P_MAX_SIZE: u32 = 1 << 5;

/// Input focus and window group from a `WM_HINTS` value
pub fn parse_wm_hints(values: &[u32]) -> (bool, Option<Xid>) {
    let Some(&flags) = values.first() else {
        return (true, None);
    };
    let input = if flags & INPUT_HINT != 0 {
        values.get(1).is_some_and(|&v| v != 0)
    } else {
        true
    };
    let group = if flags & WINDOW_GROUP_HINT != 0 {
        values.get(8).copied().filter(|&g| g != 0)
    } else {
        None
    };
    (input, group)
}

/// Minimum and maximum size from a `WM_NORMAL_HINTS` value
pub fn parse_size_hints(values: &[u32]) -> SizeHints {
    let Some(&flags) = values.first() else {
        return SizeHints::default();
    };
    let pair = |i: usize| match (values.get(i), values.get(i + 1)) {
        (Some(&w), Some(&h)) => Some((w as i32, h as i32)),
        _ => None,
    };
    SizeHints {
        min: if flags & P_MIN_SIZE != 0 { pair(5) } else { None },
        max: if flags & P_MAX_SIZE != 0 { pair(7) } else { None },
    }
}

/// Left, right, top and bottom reservation of `_NET_WM_STRUT(_PARTIAL)`
pub fn parse_strut(values: &[u32]) -> Option<Strut> {
    if values.len() < 4 {
        return None;
    }
    let strut = Strut {
        left: values[0] as i32,
        right: values[1] as i32,
        top: values[2] as i32,
        bottom: values[3] as i32,
    };
    (!strut.is_empty()).then_some(strut)
}

/// Class part of `WM_CLASS` ("instance\0class\0")
pub fn parse_class(bytes: &[u8]) -> Option<String> {
    let class = bytes.split(|&b| b == 0).nth(1)?;
    if class.is_empty() {
        return None;
    }
    Some(String::from_utf8_lossy(class).into_owned())
}

/// The parts of a configure request the client asked for
pub fn request_changes(e: &ConfigureRequestEvent) -> WindowChanges {
    let mask = e.value_mask;
    let has = |flag: ConfigWindow| mask.contains(flag);
    WindowChanges {
        x: has(ConfigWindow::X).then_some(i32::from(e.x)),
        y: has(ConfigWindow::Y).then_some(i32::from(e.y)),
        width: has(ConfigWindow::WIDTH).then_some(i32::from(e.width)),
        height: has(ConfigWindow::HEIGHT).then_some(i32::from(e.height)),
        border_width: has(ConfigWindow::BORDER_WIDTH).then_some(i32::from(e.border_width)),
        sibling: has(ConfigWindow::SIBLING).then_some(e.sibling),
        stack_mode: if has(ConfigWindow::STACK_MODE) {
            match e.stack_mode {
                XStackMode::ABOVE => Some(StackMode::Above),
                XStackMode::BELOW => Some(StackMode::Below),
                other => {
                    debug!("Ignoring stack mode {:?} from 0x{:x}", other, e.window);
                    None
                }
            }
        } else {
            None
        },
    }
}

/// Events translated from one x11rb event
#[derive(Debug, Default)]
pub struct Translated {
    pub events: Vec<ServerEvent>,
    /// Server time carried by the event, if any
    pub time: Option<u32>,
}

/// Turns x11rb events into core events, reading properties as needed
pub struct EventTranslator {
    conn: Arc<RustConnection>,
    atoms: Rc<Atoms>,
    alarms: SyncAlarms,
}

impl EventTranslator {
    pub fn new(conn: Arc<RustConnection>, atoms: Rc<Atoms>, alarms: SyncAlarms) -> Self {
        Self { conn, atoms, alarms }
    }

    pub fn translate(&self, event: Event) -> Result<Translated> {
        let mut out = Translated::default();
        match event {
            Event::CreateNotify(e) => {
                let attrs = WindowAttributes {
                    geometry: Geometry::new(
                        i32::from(e.x),
                        i32::from(e.y),
                        i32::from(e.width),
                        i32::from(e.height),
                    ),
                    border_width: i32::from(e.border_width),
                    override_redirect: e.override_redirect,
                    viewable: false,
                };
                out.events.push(ServerEvent::Create {
                    window: e.window,
                    parent: e.parent,
                    attrs,
                });
                if !e.override_redirect {
                    self.watch_client(e.window)?;
                    out.events.extend(self.initial_properties(e.window));
                }
            }
            Event::DestroyNotify(e) => {
                if let Some(alarm) = self.alarms.remove(e.window) {
                    let _ = self.conn.sync_destroy_alarm(alarm);
                }
                out.events.push(ServerEvent::Destroy { window: e.window });
            }
            Event::MapRequest(e) => out.events.push(ServerEvent::MapRequest { window: e.window }),
            Event::MapNotify(e) => out.events.push(ServerEvent::Map { window: e.window }),
            Event::UnmapNotify(e) => out.events.push(ServerEvent::Unmap { window: e.window }),
            Event::ConfigureNotify(e) => out.events.push(ServerEvent::Configure {
                window: e.window,
                geometry: Geometry::new(
                    i32::from(e.x),
                    i32::from(e.y),
                    i32::from(e.width),
                    i32::from(e.height),
                ),
                border_width: i32::from(e.border_width),
                above_sibling: (e.above_sibling != 0).then_some(e.above_sibling),
                override_redirect: e.override_redirect,
            }),
            Event::ConfigureRequest(e) => out.events.push(ServerEvent::ConfigureRequest {
                window: e.window,
                changes: request_changes(&e),
            }),
            Event::PropertyNotify(e) => {
                out.time = Some(e.time);
                if let Some(change) = self.read_property_change(e.window, e.atom) {
                    out.events.push(ServerEvent::Property {
                        window: e.window,
                        change,
                    });
                }
            }
            Event::FocusIn(e) => {
                let ignored = e.mode == NotifyMode::GRAB
                    || e.mode == NotifyMode::UNGRAB
                    || e.detail == NotifyDetail::POINTER
                    || e.detail == NotifyDetail::INFERIOR;
                if !ignored {
                    out.events.push(ServerEvent::FocusIn { window: e.event });
                }
            }
            Event::ClientMessage(e) => {
                let data = e.data.as_data32();
                if let Some(event) = self.client_message(e.window, e.type_, data) {
                    out.events.push(event);
                }
            }
            Event::SyncAlarmNotify(e) => match self.alarms.window_for_alarm(e.alarm) {
                Some(window) => out.events.push(ServerEvent::SyncAlarm { window }),
                None => debug!("Alarm 0x{:x} belongs to no window", e.alarm),
            },
            Event::KeyPress(e) => out.time = Some(e.time),
            Event::ButtonPress(e) => out.time = Some(e.time),
            Event::EnterNotify(e) => out.time = Some(e.time),
            _ => {}
        }
        Ok(out)
    }

    /// Create events for the children of `root` that exist already
    pub fn scan_existing(&self, root: Window) -> Result<Vec<ServerEvent>> {
        let tree = self.conn.query_tree(root)?.reply()?;
        let mut events = Vec::new();
        for &window in &tree.children {
            let Ok(attrs) = self.conn.get_window_attributes(window)?.reply() else {
                continue;
            };
            let Ok(geometry) = self.conn.get_geometry(window)?.reply() else {
                continue;
            };
            events.push(ServerEvent::Create {
                window,
                parent: root,
                attrs: WindowAttributes {
                    geometry: Geometry::new(
                        i32::from(geometry.x),
                        i32::from(geometry.y),
                        i32::from(geometry.width),
                        i32::from(geometry.height),
                    ),
                    border_width: i32::from(geometry.border_width),
                    override_redirect: attrs.override_redirect,
                    viewable: attrs.map_state == MapState::VIEWABLE,
                },
            });
            if !attrs.override_redirect {
                self.watch_client(window)?;
                events.extend(self.initial_properties(window));
            }
        }
        debug!("Found {} existing windows under 0x{:x}", tree.children.len(), root);
        Ok(events)
    }

    fn watch_client(&self, window: Window) -> Result<()> {
        self.conn.change_window_attributes(
            window,
            &ChangeWindowAttributesAux::new()
                .event_mask(EventMask::PROPERTY_CHANGE | EventMask::FOCUS_CHANGE),
        )?;
        Ok(())
    }

    fn initial_properties(&self, window: Window) -> Vec<ServerEvent> {
        let tracked = [
            self.atoms.net_wm_window_type,
            AtomEnum::WM_TRANSIENT_FOR.into(),
            self.atoms.wm_client_leader,
            AtomEnum::WM_HINTS.into(),
            self.atoms.wm_protocols,
            AtomEnum::WM_NORMAL_HINTS.into(),
            self.atoms.net_wm_strut_partial,
            self.atoms.net_wm_user_time,
            AtomEnum::WM_CLASS.into(),
        ];
        tracked
            .into_iter()
            .filter_map(|atom| self.read_property_change(window, atom))
            .map(|change| ServerEvent::Property { window, change })
            .collect()
    }

    fn read_u32s(&self, window: Window, property: Atom, type_: Atom, len: u32) -> Vec<u32> {
        let reply = match self.conn.get_property(false, window, property, type_, 0, len) {
            Ok(cookie) => cookie.reply(),
            Err(e) => {
                debug!("GetProperty {} on 0x{:x} failed: {}", property, window, e);
                return Vec::new();
            }
        };
        match reply {
            Ok(reply) => reply.value32().map(|v| v.collect()).unwrap_or_default(),
            Err(e) => {
                debug!("GetProperty {} on 0x{:x} failed: {}", property, window, e);
                Vec::new()
            }
        }
    }

    fn read_window(&self, window: Window, property: Atom) -> Option<Xid> {
        self.read_u32s(window, property, AtomEnum::WINDOW.into(), 1)
            .first()
            .copied()
            .filter(|&w| w != 0)
    }

    fn read_property_change(&self, window: Window, atom: Atom) -> Option<PropertyChange> {
        let a = &self.atoms;
        let change = if atom == a.net_wm_window_type {
            let types = self.read_u32s(window, atom, AtomEnum::ATOM.into(), 32);
            PropertyChange::WindowType(a.window_type(&types))
        } else if atom == u32::from(AtomEnum::WM_TRANSIENT_FOR) {
            PropertyChange::TransientFor(self.read_window(window, atom))
        } else if atom == a.wm_client_leader {
            PropertyChange::ClientLeader(self.read_window(window, atom))
        } else if atom == u32::from(AtomEnum::WM_HINTS) {
            let values = self.read_u32s(window, atom, AtomEnum::WM_HINTS.into(), 9);
            let (input, group) = parse_wm_hints(&values);
            PropertyChange::Hints { input, group }
        } else if atom == a.wm_protocols {
            let protocols = self.read_u32s(window, atom, AtomEnum::ATOM.into(), 32);
            let sync_counter = if protocols.contains(&a.net_wm_sync_request) {
                self.read_u32s(window, a.net_wm_sync_request_counter, AtomEnum::CARDINAL.into(), 1)
                    .first()
                    .copied()
                    .filter(|&c| c != 0)
            } else {
                None
            };
            PropertyChange::Protocols {
                take_focus: protocols.contains(&a.wm_take_focus),
                sync_counter,
            }
        } else if atom == u32::from(AtomEnum::WM_NORMAL_HINTS) {
            let values = self.read_u32s(window, atom, AtomEnum::WM_SIZE_HINTS.into(), 18);
            PropertyChange::NormalHints(parse_size_hints(&values))
        } else if atom == a.net_wm_strut_partial || atom == a.net_wm_strut {
            let partial = self.read_u32s(window, a.net_wm_strut_partial, AtomEnum::CARDINAL.into(), 12);
            let values = if partial.len() >= 4 {
                partial
            } else {
                self.read_u32s(window, a.net_wm_strut, AtomEnum::CARDINAL.into(), 4)
            };
            PropertyChange::Strut(parse_strut(&values))
        } else if atom == a.net_wm_user_time {
            let time = self.read_u32s(window, atom, AtomEnum::CARDINAL.into(), 1);
            PropertyChange::UserTime(*time.first()?)
        } else if atom == u32::from(AtomEnum::WM_CLASS) {
            let reply = self
                .conn
                .get_property(false, window, atom, AtomEnum::STRING, 0, 256)
                .ok()?
                .reply()
                .ok()?;
            PropertyChange::Class(parse_class(&reply.value))
        } else {
            return None;
        };
        Some(change)
    }

    fn client_message(&self, window: Window, type_: Atom, data: [u32; 5]) -> Option<ServerEvent> {
        let a = &self.atoms;
        let event = if type_ == a.net_active_window {
            ServerEvent::ActivateRequest {
                window,
                source: FocusSource::from_wire(data[0]),
                timestamp: data[1],
            }
        } else if type_ == a.net_wm_state {
            let Some(action) = StateAction::from_wire(data[0]) else {
                debug!("Bad _NET_WM_STATE action {} from 0x{:x}", data[0], window);
                return None;
            };
            let states = [data[1], data[2]]
                .iter()
                .filter_map(|&atom| a.state_atom(atom))
                .fold(Default::default(), |acc, st| acc | st);
            ServerEvent::StateRequest {
                window,
                action,
                states,
            }
        } else if type_ == a.net_wm_desktop {
            ServerEvent::DesktopRequest {
                window,
                desktop: data[0],
            }
        } else if type_ == a.net_current_desktop {
            ServerEvent::CurrentDesktopRequest {
                root: window,
                desktop: data[0],
            }
        } else if type_ == a.net_desktop_viewport {
            ServerEvent::ViewportRequest {
                root: window,
                x: data[0] as i32,
                y: data[1] as i32,
            }
        } else {
            return None;
        };
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wm_hints_input_defaults_to_true() {
        assert_eq!(parse_wm_hints(&[]), (true, None));
        assert_eq!(parse_wm_hints(&[0, 0, 0, 0, 0, 0, 0, 0, 0]), (true, None));
        assert_eq!(parse_wm_hints(&[INPUT_HINT, 0, 0, 0, 0, 0, 0, 0, 0]), (false, None));
        assert_eq!(
            parse_wm_hints(&[INPUT_HINT | WINDOW_GROUP_HINT, 1, 0, 0, 0, 0, 0, 0, 0x600]),
            (true, Some(0x600))
        );
    }

    #[test]
    fn test_size_hints_only_use_flagged_fields() {
        let mut values = [0u32; 18];
        values[5] = 80;
        values[6] = 40;
        values[7] = 400;
        values[8] = 300;

        assert_eq!(parse_size_hints(&values), SizeHints::default());

        values[0] = P_MIN_SIZE;
        let hints = parse_size_hints(&values);
        assert_eq!(hints.min, Some((80, 40)));
        assert_eq!(hints.max, None);

        values[0] = P_MIN_SIZE | P_MAX_SIZE;
        assert_eq!(parse_size_hints(&values).max, Some((400, 300)));
    }

    #[test]
    fn test_strut_and_class() {
        assert_eq!(parse_strut(&[0, 0, 0, 0]), None);
        assert_eq!(parse_strut(&[0, 0]), None);
        assert_eq!(
            parse_strut(&[0, 0, 30, 0, 0, 0, 0, 0, 0, 1023, 0, 0]),
            Some(Strut {
                top: 30,
                ..Strut::default()
            })
        );
        assert_eq!(parse_class(b"xterm\0XTerm\0"), Some("XTerm".to_string()));
        assert_eq!(parse_class(b"xterm\0"), None);
    }

    #[test]
    fn test_configure_request_mask() {
        let event = ConfigureRequestEvent {
            response_type: 23,
            stack_mode: XStackMode::BELOW,
            sequence: 0,
            parent: 1,
            window: 0x400,
            sibling: 0,
            x: 0,
            y: 0,
            width: 640,
            height: 480,
            border_width: 0,
            value_mask: ConfigWindow::WIDTH | ConfigWindow::STACK_MODE,
        };
        let changes = request_changes(&event);
        assert_eq!(changes.width, Some(640));
        assert_eq!(changes.height, None);
        assert_eq!(changes.sibling, None);
        assert_eq!(changes.stack_mode, Some(StackMode::Below));
    }
}
