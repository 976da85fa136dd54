//! MoveResize Module
//!
//! Window geometry: what the client asked for, what its state implies
//! (maximized, fullscreen, size hints) and what the server confirmed.
//!
//! Geometry a state change overrides is saved per field and restored when
//! the state is left. Resizes of clients that support
//! `_NET_WM_SYNC_REQUEST` are held back until the client acknowledges
//! that it has redrawn, or until the sync timeout passes.

use std::time::Instant;

use tracing::{debug, warn};

use crate::core::WindowRef;
use crate::shared::Geometry;
use crate::wm::WindowManager;
use crate::wm::client::{Client, SyncWait};
use crate::wm::client_flags::{ChangeMask, GrabMask, WindowActions, WindowState, WindowType};
use crate::wm::hooks::{GrabNotify, MoveNotify, ResizeNotify, StateChangeNotify};
use crate::wm::stacking::StackingUpdateMode;
use crate::wm::server::WindowChanges;

/// Drop states the window's allowed actions rule out
pub fn constrain_state(state: WindowState, actions: WindowActions) -> WindowState {
    let mut state = state;
    if !actions.contains(WindowActions::MAXIMIZE_HORZ) {
        state.remove(WindowState::MAXIMIZED_HORZ);
    }
    if !actions.contains(WindowActions::MAXIMIZE_VERT) {
        state.remove(WindowState::MAXIMIZED_VERT);
    }
    if !actions.contains(WindowActions::SHADE) {
        state.remove(WindowState::SHADED);
    }
    if !actions.contains(WindowActions::FULLSCREEN) {
        state.remove(WindowState::FULLSCREEN);
    }
    state
}

impl Client {
    /// Remember the server geometry for the fields in `mask` that are not
    /// saved yet; only windows that have been placed have anything to save
    pub fn save_geometry(&mut self, mask: ChangeMask) {
        if !self.placed {
            return;
        }
        let m = mask - self.saved.mask;
        let g = self.server_geometry;
        if m.contains(ChangeMask::X) {
            self.saved.geometry.x = g.x;
        }
        if m.contains(ChangeMask::Y) {
            self.saved.geometry.y = g.y;
        }
        if m.contains(ChangeMask::WIDTH) {
            self.saved.geometry.width = g.width;
        }
        if m.contains(ChangeMask::HEIGHT) {
            self.saved.geometry.height = g.height;
        }
        if m.contains(ChangeMask::BORDER_WIDTH) {
            self.saved.border_width = self.server_border_width;
        }
        self.saved.mask |= m;
    }

    /// Put the saved fields of `mask` into `changes` and forget them
    ///
    /// A restored size equal to the current one is shrunk slightly, so the
    /// change is still visible and resize notifications fire.
    pub fn restore_geometry(&mut self, mask: ChangeMask, changes: &mut WindowChanges) -> ChangeMask {
        let m = mask & self.saved.mask;
        let saved = self.saved.geometry;

        if m.contains(ChangeMask::X) {
            changes.x = Some(saved.x);
        }
        if m.contains(ChangeMask::Y) {
            changes.y = Some(saved.y);
        }
        if m.contains(ChangeMask::WIDTH) {
            let mut width = saved.width;
            if width == self.server_geometry.width {
                width -= 10;
                if let Some(x) = changes.x.as_mut().filter(|_| m.contains(ChangeMask::X)) {
                    *x += 5;
                }
            }
            changes.width = Some(width);
        }
        if m.contains(ChangeMask::HEIGHT) {
            let mut height = saved.height;
            if height == self.server_geometry.height {
                height -= 10;
                if let Some(y) = changes.y.as_mut().filter(|_| m.contains(ChangeMask::Y)) {
                    *y += 5;
                }
            }
            changes.height = Some(height);
        }
        if m.contains(ChangeMask::BORDER_WIDTH) {
            changes.border_width = Some(self.saved.border_width);
        }

        self.saved.mask.remove(mask);
        m
    }
}

impl WindowManager {
    /// Geometry changes implied by the window's type, state and size hints,
    /// relative to its server geometry
    ///
    /// Fullscreen windows cover the screen, maximized windows the work
    /// area of the viewport they are on.
    pub fn add_window_size_changes(&mut self, w: WindowRef) -> WindowChanges {
        let Some(screen) = self.screen(w.screen) else {
            return WindowChanges::default();
        };
        let Some(client) = screen.window(w.id) else {
            return WindowChanges::default();
        };
        let old = client.server_geometry;
        let old_border = client.server_border_width;
        let (vx, vy) = screen.viewport_for_geometry(old, old_border);
        let x = (vx - screen.x) * screen.width;
        let y = (vy - screen.y) * screen.height;
        let (screen_width, screen_height, work_area) = (screen.width, screen.height, screen.work_area);

        let Some(client) = self.window_mut(w) else {
            return WindowChanges::default();
        };
        let input = client.input;
        let state = client.state;
        let mut changes = WindowChanges::default();

        if client.is_type(WindowType::FULLSCREEN) {
            client.save_geometry(ChangeMask::GEOMETRY);
            changes.x = Some(x);
            changes.y = Some(y);
            changes.width = Some(screen_width);
            changes.height = Some(screen_height);
            changes.border_width = Some(0);
        } else {
            client.restore_geometry(ChangeMask::BORDER_WIDTH, &mut changes);

            if state.contains(WindowState::MAXIMIZED_VERT) {
                client.save_geometry(ChangeMask::Y | ChangeMask::HEIGHT);
                changes.height = Some(work_area.height - input.top - input.bottom - old_border * 2);
            } else {
                client.restore_geometry(ChangeMask::Y | ChangeMask::HEIGHT, &mut changes);
            }

            if state.contains(WindowState::MAXIMIZED_HORZ) {
                client.save_geometry(ChangeMask::X | ChangeMask::WIDTH);
                changes.width = Some(work_area.width - input.left - input.right - old_border * 2);
            } else {
                client.restore_geometry(ChangeMask::X | ChangeMask::WIDTH, &mut changes);
            }

            let hints = client.size_hints;
            if changes.width.is_none() || changes.height.is_none() {
                let (width, height) = hints.constrain(old.width, old.height);
                if changes.width.is_none() && width != old.width {
                    changes.width = Some(width);
                }
                if changes.height.is_none() && height != old.height {
                    changes.height = Some(height);
                }
            }

            if changes.width.is_some() || changes.height.is_some() {
                let (width, height) = hints.constrain(
                    changes.width.unwrap_or(old.width),
                    changes.height.unwrap_or(old.height),
                );
                if changes.width.is_some() || width != old.width {
                    changes.width = Some(width);
                }
                if changes.height.is_some() || height != old.height {
                    changes.height = Some(height);
                }

                if state.contains(WindowState::MAXIMIZED_VERT) {
                    let top = y + work_area.y + input.top;
                    let max = y + work_area.bottom();
                    let height = height + old_border * 2;
                    if old.y < top {
                        changes.y = Some(top);
                    } else if old.y + old.height + input.bottom > max {
                        changes.y = Some(max - height - input.bottom);
                    } else if old.y + height + input.bottom > max {
                        changes.y = Some(
                            y + work_area.y + (work_area.height - input.top - height - input.bottom) / 2 + input.top,
                        );
                    }
                }

                if state.contains(WindowState::MAXIMIZED_HORZ) {
                    let left = x + work_area.x + input.left;
                    let max = x + work_area.right();
                    let width = width + old_border * 2;
                    if old.x < left {
                        changes.x = Some(left);
                    } else if old.x + old.width + input.right > max {
                        changes.x = Some(max - width - input.right);
                    } else if old.x + width + input.right > max {
                        changes.x = Some(
                            x + work_area.x + (work_area.width - input.left - width - input.right) / 2 + input.left,
                        );
                    }
                }
            }
        }

        // Only what actually differs from the server
        changes.x = changes.x.filter(|&v| v != old.x);
        changes.y = changes.y.filter(|&v| v != old.y);
        changes.width = changes.width.filter(|&v| v != old.width);
        changes.height = changes.height.filter(|&v| v != old.height);
        changes.border_width = changes.border_width.filter(|&v| v != old_border);
        changes
    }

    /// Geometry confirmed by the server
    ///
    /// Fires `window_resize_notify`, or `window_move_notify` when only the
    /// position changed.
    pub fn resize_window(&mut self, w: WindowRef, geometry: Geometry, border_width: i32) {
        let Some(c) = self.window_mut(w) else {
            return;
        };
        c.server_geometry = geometry;
        c.server_border_width = border_width;
        if c.geometry == geometry && c.border_width == border_width {
            return;
        }

        let old = c.geometry;
        let dborder = border_width - c.border_width;
        c.geometry = geometry;
        c.border_width = border_width;

        let (dx, dy) = (geometry.x - old.x, geometry.y - old.y);
        let (dwidth, dheight) = (geometry.width - old.width, geometry.height - old.height);
        if dwidth != 0 || dheight != 0 || dborder != 0 {
            self.window_resize_notify(ResizeNotify {
                window: w,
                dx,
                dy,
                dwidth,
                dheight,
            });
        } else if dx != 0 || dy != 0 {
            self.window_move_notify(MoveNotify {
                window: w,
                dx,
                dy,
                immediate: false,
            });
        }
    }

    /// Move `w` by `(dx, dy)` right away and tell the server
    pub fn move_window(&mut self, w: WindowRef, dx: i32, dy: i32) {
        if dx == 0 && dy == 0 {
            return;
        }
        let Some(c) = self.window_mut(w) else {
            return;
        };
        c.geometry = c.geometry.translated(dx, dy);
        let target = c.server_geometry.translated(dx, dy);

        self.window_move_notify(MoveNotify {
            window: w,
            dx,
            dy,
            immediate: true,
        });

        let changes = WindowChanges {
            x: Some(target.x),
            y: Some(target.y),
            ..WindowChanges::default()
        };
        self.configure_x_window(w, &changes);
    }

    /// Ask a sync-capable client to acknowledge its next redraw
    pub fn send_sync_request(&mut self, w: WindowRef) {
        let deadline = Instant::now() + self.sync_timeout();
        let Some(c) = self.window_mut(w) else {
            return;
        };
        let Some(counter) = c.sync.counter else {
            return;
        };
        if c.sync.wait.is_some() {
            return;
        }
        c.sync.value += 1;
        let value = c.sync.value;

        match self.server_mut().send_sync_request(w.id, counter, value) {
            Ok(true) => {
                debug!("Waiting for 0x{:x} to reach sync value {}", w.id, value);
                if let Some(c) = self.window_mut(w) {
                    c.sync.wait = Some(SyncWait { deadline, geometry: None });
                }
            }
            Ok(false) => {}
            Err(e) => debug!("Sync request to 0x{:x} failed: {:#}", w.id, e),
        }
    }

    /// The client acknowledged its redraw; apply the geometry held back
    pub fn handle_sync_alarm(&mut self, w: WindowRef) {
        let Some(wait) = self.window_mut(w).and_then(|c| c.sync.wait.take()) else {
            return;
        };
        if let Some((geometry, border_width)) = wait.geometry {
            self.resize_window(w, geometry, border_width);
        }
    }

    /// Earliest pending sync deadline
    pub fn next_timeout(&self) -> Option<Instant> {
        self.display
            .screens
            .iter()
            .flat_map(|s| s.bottom_up())
            .filter_map(|c| c.sync.wait.map(|wait| wait.deadline))
            .min()
    }

    /// Give up on clients that did not acknowledge in time
    pub fn dispatch_timeouts(&mut self, now: Instant) {
        let expired: Vec<WindowRef> = self
            .display
            .screens
            .iter()
            .flat_map(|s| s.bottom_up())
            .filter(|c| c.sync.wait.is_some_and(|wait| wait.deadline <= now))
            .map(|c| c.window_ref())
            .collect();

        for w in expired {
            warn!("Window 0x{:x} did not acknowledge sync request in time", w.id);
            self.handle_sync_alarm(w);
        }
    }

    /// An interactive operation on `w` started at `(x, y)`
    pub fn grab_window(&mut self, w: WindowRef, x: i32, y: i32, mask: GrabMask) {
        let Some(c) = self.window_mut(w) else {
            return;
        };
        c.grabbed = true;
        self.window_grab_notify(GrabNotify { window: w, x, y, mask });
    }

    pub fn ungrab_window(&mut self, w: WindowRef) {
        let Some(c) = self.window_mut(w) else {
            return;
        };
        if !c.grabbed {
            return;
        }
        c.grabbed = false;
        self.window_ungrab_notify(w);
    }

    /// Set the `_NET_WM_STATE` of `w`
    pub fn change_window_state(&mut self, w: WindowRef, state: WindowState) {
        let Some(c) = self.window_mut(w) else {
            return;
        };
        if c.state == state {
            return;
        }
        let last_state = c.state;
        c.state = state;
        let managed = c.managed;
        debug!("Window 0x{:x} state {:?} -> {:?}", w.id, last_state, state);

        self.recalc_window_type(w);
        self.recalc_window_actions(w);
        if managed {
            self.request("Set window state", |s| s.set_window_state(w.id, state));
        }
        self.window_state_change_notify(StateChangeNotify {
            window: w,
            last_state,
        });

        if self.window(w).is_some_and(|c| c.is_mapped()) {
            self.update_window_attributes(w, StackingUpdateMode::Normal);
        }
    }

    pub fn set_fullscreen(&mut self, w: WindowRef, fullscreen: bool) {
        let Some(c) = self.window(w) else {
            return;
        };
        if fullscreen && !c.actions.contains(WindowActions::FULLSCREEN) {
            return;
        }
        let mut state = c.state;
        state.set(WindowState::FULLSCREEN, fullscreen);
        self.change_window_state(w, state);
    }

    /// Maximize `w` in the directions of `state` and restore the others
    pub fn maximize_window(&mut self, w: WindowRef, state: WindowState) {
        let Some(c) = self.window(w) else {
            return;
        };
        if c.override_redirect {
            return;
        }
        let maximized = constrain_state(state, c.actions) & WindowState::MAXIMIZED;
        if maximized == c.state & WindowState::MAXIMIZED {
            return;
        }
        let state = (c.state - WindowState::MAXIMIZED) | maximized;
        self.change_window_state(w, state);
    }

    /// Keep `w` above other windows of its layer
    pub fn set_above(&mut self, w: WindowRef, above: bool) {
        self.set_layer_state(w, WindowState::ABOVE, WindowState::BELOW, above);
    }

    /// Keep `w` below other windows of its layer
    pub fn set_below(&mut self, w: WindowRef, below: bool) {
        self.set_layer_state(w, WindowState::BELOW, WindowState::ABOVE, below);
    }

    fn set_layer_state(&mut self, w: WindowRef, flag: WindowState, opposite: WindowState, on: bool) {
        let Some(c) = self.window(w) else {
            return;
        };
        let mut state = c.state;
        state.set(flag, on);
        if on {
            state.remove(opposite);
        }
        self.change_window_state(w, state);
    }

    /// Apply a client's `_NET_WM_STATE` request
    ///
    /// States only the window manager sets are kept as they are.
    pub fn request_window_state(&mut self, w: WindowRef, requested: WindowState) {
        let Some(c) = self.window(w) else {
            return;
        };
        let wm_only = c.state & WindowState::WM_ONLY;
        let state = constrain_state(requested - WindowState::WM_ONLY, c.actions) | wm_only;
        self.change_window_state(w, state);
    }

    /// Saved geometry and which of its fields are set
    pub fn saved_geometry(&self, w: WindowRef) -> Option<(Geometry, ChangeMask)> {
        self.window(w).map(|c| (c.saved.geometry, c.saved.mask))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::FrameExtents;
    use crate::wm::client::SizeHints;
    use crate::wm::testing::{Request, mapped_window, test_wm};
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    fn place(wm: &mut WindowManager, w: WindowRef, g: Geometry) {
        let c = wm.window_mut(w).unwrap();
        c.geometry = g;
        c.server_geometry = g;
    }

    #[test]
    fn test_maximize_and_restore() {
        let (mut wm, _log) = test_wm();
        let a = mapped_window(&mut wm, 0x100);
        place(&mut wm, a, Geometry::new(100, 100, 300, 200));
        wm.window_mut(a).unwrap().input = FrameExtents {
            left: 2,
            right: 2,
            top: 20,
            bottom: 2,
        };

        wm.maximize_window(a, WindowState::MAXIMIZED);
        let c = wm.window(a).unwrap();
        // Too big to stay where it was, so it is centred in the work area
        assert_eq!(c.server_geometry, Geometry::new(2, 20, 1020, 746));
        assert_eq!(
            wm.saved_geometry(a),
            Some((Geometry::new(100, 100, 300, 200), ChangeMask::POSITION | ChangeMask::SIZE))
        );

        wm.maximize_window(a, WindowState::empty());
        let c = wm.window(a).unwrap();
        assert_eq!(c.server_geometry, Geometry::new(100, 100, 300, 200));
        assert!(c.saved.mask.is_empty());
    }

    #[test]
    fn test_restore_equal_size_is_perturbed() {
        let mut c = Client::new(1, 0, 0, Default::default());
        c.placed = true;
        c.server_geometry = Geometry::new(10, 10, 300, 200);
        c.save_geometry(ChangeMask::X | ChangeMask::WIDTH);

        let mut changes = WindowChanges::default();
        let m = c.restore_geometry(ChangeMask::X | ChangeMask::WIDTH, &mut changes);
        assert_eq!(m, ChangeMask::X | ChangeMask::WIDTH);
        assert_eq!(changes.width, Some(290));
        assert_eq!(changes.x, Some(15));

        // Unplaced windows have nothing worth saving
        let mut fresh = Client::new(2, 0, 0, Default::default());
        fresh.save_geometry(ChangeMask::GEOMETRY);
        assert!(fresh.saved.mask.is_empty());
    }

    #[test]
    fn test_fullscreen_covers_screen_and_restores() {
        let (mut wm, _log) = test_wm();
        let a = mapped_window(&mut wm, 0x100);
        place(&mut wm, a, Geometry::new(50, 60, 400, 300));
        wm.window_mut(a).unwrap().server_border_width = 1;

        wm.set_fullscreen(a, true);
        let c = wm.window(a).unwrap();
        assert_eq!(c.server_geometry, Geometry::new(0, 0, 1024, 768));
        assert_eq!(c.server_border_width, 0);

        wm.set_fullscreen(a, false);
        let c = wm.window(a).unwrap();
        assert_eq!(c.server_geometry, Geometry::new(50, 60, 400, 300));
        assert_eq!(c.server_border_width, 1);
    }

    #[test]
    fn test_size_hints_constrain() {
        let (mut wm, _log) = test_wm();
        let a = mapped_window(&mut wm, 0x100);
        place(&mut wm, a, Geometry::new(0, 0, 50, 50));
        assert!(wm.add_window_size_changes(a).is_empty());

        wm.window_mut(a).unwrap().size_hints = SizeHints {
            min: Some((80, 40)),
            max: None,
        };
        let changes = wm.add_window_size_changes(a);
        assert_eq!(changes.width, Some(80));
        assert_eq!(changes.height, None);
    }

    #[test]
    fn test_resize_notify_vs_move_notify() {
        let (mut wm, _log) = test_wm();
        let a = mapped_window(&mut wm, 0x100);
        let seen = Rc::new(RefCell::new(Vec::new()));

        let sink = seen.clone();
        wm.screen_mut(0).unwrap().hooks.window_resize_notify.wrap("observer", move |wm, args, next| {
            sink.borrow_mut().push(format!("resize {} {}", args.dwidth, args.dheight));
            next.call(wm, args)
        });
        let sink = seen.clone();
        wm.screen_mut(0).unwrap().hooks.window_move_notify.wrap("observer", move |wm, args, next| {
            sink.borrow_mut().push(format!("move {} {} {}", args.dx, args.dy, args.immediate));
            next.call(wm, args)
        });

        let g = wm.window(a).unwrap().geometry;
        wm.resize_window(a, g.translated(5, 0), 0);
        wm.resize_window(a, Geometry::new(g.x + 5, g.y, g.width + 10, g.height), 0);
        wm.resize_window(a, Geometry::new(g.x + 5, g.y, g.width + 10, g.height), 0);
        wm.move_window(a, 0, 7);

        assert_eq!(*seen.borrow(), vec!["move 5 0 false", "resize 10 0", "move 0 7 true"]);
    }

    #[test]
    fn test_sync_wait_holds_geometry_until_alarm() {
        let (mut wm, log) = test_wm();
        let a = mapped_window(&mut wm, 0x100);
        wm.window_mut(a).unwrap().sync.counter = Some(0x900);

        log.clear();
        wm.maximize_window(a, WindowState::MAXIMIZED_HORZ);
        assert!(log.take().contains(&Request::SyncRequest(a.id, 0x900, 1)));
        assert!(wm.window(a).unwrap().sync.wait.is_some());
        assert!(wm.next_timeout().is_some());

        let before = wm.window(a).unwrap().geometry;
        let confirmed = Geometry::new(before.x, before.y, 1024, before.height);
        wm.handle_event(crate::wm::ServerEvent::Configure {
            window: a.id,
            geometry: confirmed,
            border_width: 0,
            above_sibling: wm.window(a).unwrap().below(),
            override_redirect: false,
        });
        assert_eq!(wm.window(a).unwrap().geometry, before);

        wm.handle_event(crate::wm::ServerEvent::SyncAlarm { window: a.id });
        assert_eq!(wm.window(a).unwrap().geometry, confirmed);
        assert!(wm.next_timeout().is_none());
    }

    #[test]
    fn test_sync_timeout_fails_open() {
        let (mut wm, _log) = test_wm();
        let a = mapped_window(&mut wm, 0x100);
        wm.window_mut(a).unwrap().sync.counter = Some(0x900);
        wm.send_sync_request(a);
        let held = Geometry::new(1, 2, 3, 4);
        wm.window_mut(a).unwrap().sync.wait.as_mut().unwrap().geometry = Some((held, 0));

        wm.dispatch_timeouts(Instant::now());
        assert!(wm.window(a).unwrap().sync.wait.is_some());

        wm.dispatch_timeouts(Instant::now() + wm.sync_timeout() + Duration::from_millis(1));
        assert!(wm.window(a).unwrap().sync.wait.is_none());
        assert_eq!(wm.window(a).unwrap().geometry, held);
    }

    #[test]
    fn test_grab_notifications() {
        let (mut wm, _log) = test_wm();
        let a = mapped_window(&mut wm, 0x100);
        let seen = Rc::new(RefCell::new(Vec::new()));

        let sink = seen.clone();
        wm.screen_mut(0).unwrap().hooks.window_grab_notify.wrap("observer", move |wm, args, next| {
            sink.borrow_mut().push(args.mask);
            next.call(wm, args)
        });
        let sink = seen.clone();
        wm.screen_mut(0).unwrap().hooks.window_ungrab_notify.wrap("observer", move |wm, w, next| {
            sink.borrow_mut().push(GrabMask::empty());
            next.call(wm, w)
        });

        wm.grab_window(a, 10, 10, GrabMask::MOVE | GrabMask::BUTTON);
        assert!(wm.window(a).unwrap().grabbed);
        wm.ungrab_window(a);
        wm.ungrab_window(a);
        assert_eq!(*seen.borrow(), vec![GrabMask::MOVE | GrabMask::BUTTON, GrabMask::empty()]);
    }

    #[test]
    fn test_state_requests() {
        let (mut wm, _log) = test_wm();
        let a = mapped_window(&mut wm, 0x100);

        wm.set_above(a, true);
        wm.set_below(a, true);
        assert_eq!(wm.window(a).unwrap().state, WindowState::BELOW);

        // Clients can't hide themselves
        wm.request_window_state(a, WindowState::HIDDEN | WindowState::STICKY);
        assert_eq!(wm.window(a).unwrap().state, WindowState::STICKY);

        wm.window_mut(a).unwrap().size_hints = SizeHints {
            min: Some((10, 10)),
            max: Some((10, 10)),
        };
        wm.recalc_window_actions(a);
        wm.set_fullscreen(a, true);
        assert!(!wm.window(a).unwrap().state.contains(WindowState::FULLSCREEN));
    }
}
