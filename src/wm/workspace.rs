//! Workspace Module
//!
//! Virtual desktops, the viewport grid, and showing and hiding windows as
//! the current desktop changes.
//!
//! A screen is one viewport of a `hsize` x `vsize` grid. Switching
//! viewports moves every window that is not on all viewports by whole
//! screen sizes, wrapping around the edges of the grid.

use tracing::{debug, info};

use crate::core::{ScreenId, WindowRef};
use crate::shared::Geometry;
use crate::wm::WindowManager;
use crate::wm::client::{ALL_DESKTOPS, Client};
use crate::wm::client_flags::{ChangeMask, WindowState, WindowType};
use crate::wm::screen::Screen;
use crate::wm::server::{DesktopHints, WindowChanges};

impl Screen {
    /// Windows that stay put when the viewport changes
    pub fn window_on_all_viewports(&self, c: &Client) -> bool {
        c.override_redirect
            || (!c.managed && !c.viewable)
            || c.is_type(WindowType::DESKTOP | WindowType::DOCK)
            || c.state.contains(WindowState::STICKY)
    }

    /// Viewport that holds the center of `geometry`
    pub fn viewport_for_geometry(&self, geometry: Geometry, border_width: i32) -> (i32, i32) {
        let (cx, cy) = geometry.center(border_width);
        (
            (self.x + cx.div_euclid(self.width)).rem_euclid(self.hsize),
            (self.y + cy.div_euclid(self.height)).rem_euclid(self.vsize),
        )
    }

    /// The current viewport if any of the window shows on it, otherwise the
    /// viewport of its center
    pub fn default_viewport_for_window(&self, c: &Client) -> (i32, i32) {
        if c.server_geometry.overlaps_origin_area(self.width, self.height) {
            (self.x, self.y)
        } else {
            self.viewport_for_geometry(c.server_geometry, c.server_border_width)
        }
    }

    /// Offset to apply to `c` when every window moves by `(off_x, off_y)`
    ///
    /// Windows that would leave the virtual area come back in on the other
    /// side of the grid.
    pub fn movement_for_offset(&self, c: &Client, off_x: i32, off_y: i32) -> (i32, i32) {
        let g = c.server_geometry;
        let bw = c.server_border_width * 2;
        let v_width = self.width * self.hsize;
        let v_height = self.height * self.vsize;

        let mut dx = off_x;
        if self.hsize > 1 {
            let m = g.x + off_x;
            if m - c.input.left < self.width - v_width {
                dx = off_x + v_width;
            } else if m + g.width + bw + c.input.right > v_width {
                dx = off_x - v_width;
            }
        }

        let mut dy = off_y;
        if self.vsize > 1 {
            let m = g.y + off_y;
            if m - c.input.top < self.height - v_height {
                dy = off_y + v_height;
            } else if m + g.height + bw + c.input.bottom > v_height {
                dy = off_y - v_height;
            }
        }
        (dx, dy)
    }

    pub fn desktop_hints(&self) -> DesktopHints {
        DesktopHints {
            desktop_count: self.desktop_count,
            current_desktop: self.current_desktop,
            virtual_width: self.width * self.hsize,
            virtual_height: self.height * self.vsize,
            viewport_x: self.x * self.width,
            viewport_y: self.y * self.height,
            work_area: self.work_area,
        }
    }
}

impl WindowManager {
    /// Move the viewport by `dx` columns and `dy` rows, wrapping around the grid
    pub fn move_viewport(&mut self, screen: ScreenId, dx: i32, dy: i32) {
        let Some(s) = self.display.screen(screen) else {
            return;
        };
        let new_x = (s.x + dx.rem_euclid(s.hsize)).rem_euclid(s.hsize);
        let new_y = (s.y + dy.rem_euclid(s.vsize)).rem_euclid(s.vsize);
        if new_x == s.x && new_y == s.y {
            return;
        }

        let off_x = -(new_x - s.x) * s.width;
        let off_y = -(new_y - s.y) * s.height;
        let moves: Vec<(WindowRef, (i32, i32))> = s
            .bottom_up()
            .filter(|c| !c.destroyed && !s.window_on_all_viewports(c))
            .map(|c| (c.window_ref(), s.movement_for_offset(c, off_x, off_y)))
            .collect();

        debug!("Viewport on screen {}: ({}, {}) -> ({}, {})", screen, s.x, s.y, new_x, new_y);
        if let Some(s) = self.screen_mut(screen) {
            s.x = new_x;
            s.y = new_y;
        }

        for (w, (mx, my)) in moves {
            if let Some(c) = self.window_mut(w) {
                if c.saved.mask.contains(ChangeMask::X) {
                    c.saved.geometry.x += mx;
                }
                if c.saved.mask.contains(ChangeMask::Y) {
                    c.saved.geometry.y += my;
                }
            }
            self.move_window(w, mx, my);
        }

        self.publish_desktop_hints(screen);
    }

    /// Go to viewport `(x, y)`
    pub fn set_viewport(&mut self, screen: ScreenId, x: i32, y: i32) {
        let Some(s) = self.display.screen(screen) else {
            return;
        };
        let (dx, dy) = (x - s.x, y - s.y);
        self.move_viewport(screen, dx, dy);
    }

    /// Switch desktops, hiding windows of the old one and showing the new one's
    pub fn set_current_desktop(&mut self, screen: ScreenId, desktop: u32) {
        let Some(s) = self.display.screen(screen) else {
            return;
        };
        if desktop >= s.desktop_count || desktop == s.current_desktop {
            return;
        }
        info!("Switching screen {} to desktop {}", screen, desktop);

        let windows: Vec<(WindowRef, u32)> = s
            .bottom_up()
            .filter(|c| c.desktop != ALL_DESKTOPS)
            .map(|c| (c.window_ref(), c.desktop))
            .collect();
        if let Some(s) = self.screen_mut(screen) {
            s.current_desktop = desktop;
        }

        for (w, window_desktop) in windows {
            if window_desktop == desktop {
                self.show_window(w);
            } else {
                self.hide_window(w);
            }
        }
        self.publish_desktop_hints(screen);
    }

    /// Put `w` on `desktop` (or `ALL_DESKTOPS`)
    pub fn set_window_desktop(&mut self, w: WindowRef, desktop: u32) {
        let Some(client) = self.window(w) else {
            return;
        };
        let Some(s) = self.screen(w.screen) else {
            return;
        };
        if desktop != ALL_DESKTOPS
            && (client.is_type(WindowType::DESKTOP | WindowType::DOCK) || desktop >= s.desktop_count)
        {
            return;
        }
        if client.desktop == desktop {
            return;
        }
        let current = s.current_desktop;

        if let Some(c) = self.window_mut(w) {
            c.desktop = desktop;
        }
        if desktop == ALL_DESKTOPS || desktop == current {
            self.show_window(w);
        } else {
            self.hide_window(w);
        }
        self.request("Set window desktop", |s| s.set_window_desktop(w.id, desktop));
    }

    /// Publish desktop count, current desktop, viewport and work area
    pub fn publish_desktop_hints(&mut self, screen: ScreenId) {
        let Some(s) = self.display.screen(screen) else {
            return;
        };
        let (root, hints) = (s.root, s.desktop_hints());
        self.request("Set desktop hints", |srv| srv.set_desktop_hints(root, &hints));
    }

    /// Unmap a managed window the user should not see right now
    pub fn hide_window(&mut self, w: WindowRef) {
        let Some(c) = self.window_mut(w) else {
            return;
        };
        if !c.managed || c.hidden {
            return;
        }
        c.hidden = true;
        let state = c.state | WindowState::HIDDEN;
        if c.is_mapped() || c.pending_maps > 0 {
            c.pending_unmaps += 1;
            self.request("Unmap window", |s| s.unmap_window(w.id));
        }
        debug!("Hid window 0x{:x}", w.id);
        self.change_window_state(w, state);
    }

    /// Counterpart of `hide_window`; minimized windows and windows of
    /// other desktops stay hidden
    pub fn show_window(&mut self, w: WindowRef) {
        let Some(current) = self.screen(w.screen).map(|s| s.current_desktop) else {
            return;
        };
        let Some(c) = self.window_mut(w) else {
            return;
        };
        if !c.managed || !c.hidden || c.minimized || !c.on_desktop(current) {
            return;
        }
        c.hidden = false;
        c.pending_maps += 1;
        let state = c.state - WindowState::HIDDEN;
        self.request("Map window", |s| s.map_window(w.id));
        debug!("Showed window 0x{:x}", w.id);
        self.change_window_state(w, state);
    }

    /// Minimize `w` and its transients
    pub fn minimize_window(&mut self, w: WindowRef) {
        let Some(c) = self.window_mut(w) else {
            return;
        };
        if !c.managed || c.minimized {
            return;
        }
        c.minimized = true;
        for t in self.transients_of(w) {
            self.minimize_window(t);
        }
        self.hide_window(w);
    }

    pub fn unminimize_window(&mut self, w: WindowRef) {
        let Some(c) = self.window_mut(w) else {
            return;
        };
        if !c.minimized {
            return;
        }
        c.minimized = false;
        self.show_window(w);
        for t in self.transients_of(w) {
            self.unminimize_window(t);
        }
    }

    /// Direct transients of `w`, explicit or through its client leader
    fn transients_of(&self, w: WindowRef) -> Vec<WindowRef> {
        let Some(screen) = self.screen(w.screen) else {
            return Vec::new();
        };
        let Some(parent) = screen.window(w.id) else {
            return Vec::new();
        };
        let leader = screen.stacking_leader(parent);
        screen
            .bottom_up()
            .filter(|c| c.id != w.id)
            .filter(|c| c.transient_for == Some(w.id) || screen.is_group_transient(c, leader))
            .map(|c| c.window_ref())
            .collect()
    }

    /// Pull a window that is entirely outside the virtual desktop back in
    /// so that at least a strip of it can be reached
    pub fn ensure_window_visibility(&mut self, w: WindowRef) {
        let Some(c) = self.window(w) else {
            return;
        };
        if c.strut.is_some()
            || c.override_redirect
            || c.is_type(WindowType::DOCK | WindowType::FULLSCREEN | WindowType::UNKNOWN)
        {
            return;
        }
        let Some(s) = self.screen(w.screen) else {
            return;
        };
        let g = c.server_geometry;
        let width = g.width + c.server_border_width * 2;
        let height = g.height + c.server_border_width * 2;

        let x1 = s.work_area.x - s.width * s.x;
        let y1 = s.work_area.y - s.height * s.y;
        let x2 = x1 + s.work_area.width + s.hsize * s.width;
        let y2 = y1 + s.work_area.height + s.vsize * s.height;

        let dx = if g.x - c.input.left >= x2 {
            (x2 - 25) - g.x
        } else if g.x + width + c.input.right <= x1 {
            (x1 + 25) - (g.x + width)
        } else {
            0
        };
        let dy = if g.y - c.input.top >= y2 {
            (y2 - 25) - g.y
        } else if g.y + height + c.input.bottom <= y1 {
            (y1 + 25) - (g.y + height)
        } else {
            0
        };

        if dx != 0 || dy != 0 {
            debug!("Pulling 0x{:x} back on screen by ({}, {})", w.id, dx, dy);
            let changes = WindowChanges {
                x: Some(g.x + dx),
                y: Some(g.y + dy),
                ..WindowChanges::default()
            };
            self.configure_x_window(w, &changes);
        }
    }
}
