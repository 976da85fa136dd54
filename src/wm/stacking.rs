//! Stacking Module
//!
//! Window z-order: layers (desktop, normal, fullscreen and dock), the
//! above/below states, transient and group relationships.
//!
//! Every stacking operation is computed as a list of steps against the
//! current registry, then applied in order. Each step is sent to the
//! server and applied to the local registry at once; the server's
//! ConfigureNotify for it only settles the `pending_restacks` count.

use tracing::debug;

use crate::core::{WindowRef, Xid};
use crate::wm::WindowManager;
use crate::wm::client::Client;
use crate::wm::client_flags::{WindowState, WindowType};
use crate::wm::hooks::SiblingQuery;
use crate::wm::screen::Screen;
use crate::wm::server::{StackMode, WindowChanges};

/// How `update_window_attributes` may restack the window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackingUpdateMode {
    None,
    Normal,
    /// Above fullscreen windows of the same layer
    AboveFullscreen,
    /// First map of a window that may take focus
    InitialMap,
    /// First map of a window denied focus: keep it below the active window
    InitialMapDeniedFocus,
}

/// Where one window goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Directly above the sibling
    Above(Xid),
    Bottom,
}

impl Placement {
    pub fn changes(self) -> WindowChanges {
        match self {
            Placement::Above(sibling) => WindowChanges::above(sibling),
            Placement::Bottom => WindowChanges::bottom(),
        }
    }
}

/// One planned restack
pub type StackStep = (Xid, Placement);

/// Layer used for the "never below" rule of `find_lowest_sibling_below`
fn layer(c: &Client) -> u8 {
    let t = stacking_type(c);
    if t.contains(WindowType::DESKTOP) {
        0
    } else if t.intersects(WindowType::FULLSCREEN | WindowType::DOCK) {
        2
    } else {
        1
    }
}

/// Fullscreen windows in the below state stack like normal windows
fn stacking_type(c: &Client) -> WindowType {
    if c.is_type(WindowType::FULLSCREEN) && c.state.contains(WindowState::BELOW) {
        WindowType::NORMAL
    } else {
        c.window_type
    }
}

impl Screen {
    /// May `w` be stacked above `below`?
    pub fn stack_layer_check(&self, w: &Client, leader: Option<Xid>, below: &Client) -> bool {
        if self.is_ancestor_of(w.id, below.id) {
            return true;
        }
        if self.is_ancestor_of(below.id, w.id) {
            return false;
        }
        if leader.is_some() && below.client_leader == leader && self.is_group_transient(below, leader) {
            return false;
        }

        if w.state.contains(WindowState::ABOVE) {
            true
        } else if w.state.contains(WindowState::BELOW) {
            below.state.contains(WindowState::BELOW)
        } else {
            !below.state.contains(WindowState::ABOVE)
        }
    }

    /// Highest window `w` may sit directly above
    ///
    /// With `above_fullscreen` a fullscreen window may also go over other
    /// fullscreen windows and docks.
    pub fn find_sibling_below(&self, w: Xid, above_fullscreen: bool) -> Option<Xid> {
        let client = self.window(w)?;
        let below_mask = if above_fullscreen {
            WindowType::DOCK
        } else {
            WindowType::DOCK | WindowType::FULLSCREEN
        };
        let t = stacking_type(client);
        let leader = self.stacking_leader(client);

        for below in self.top_down() {
            if below.id == w || below.avoid_stacking_relative_to() {
                continue;
            }

            if below.is_type(WindowType::DESKTOP) {
                return Some(below.id);
            }

            if t.contains(WindowType::DESKTOP) {
                continue;
            }

            let top_layer = t.intersects(WindowType::FULLSCREEN | WindowType::DOCK);
            if t.contains(WindowType::FULLSCREEN) && above_fullscreen {
                return Some(below.id);
            }

            if top_layer {
                if !below.is_type(WindowType::FULLSCREEN | WindowType::DOCK)
                    || self.stack_layer_check(client, leader, below)
                {
                    return Some(below.id);
                }
            } else if !below.is_type(below_mask) && self.stack_layer_check(client, leader, below) {
                return Some(below.id);
            }
        }
        None
    }

    /// Highest window that must stay below `w`; `None` means the bottom
    ///
    /// A window is never put below a desktop window, and a desktop window
    /// always ends up at the bottom. Lowering a normal window passes over
    /// docks and fullscreen windows, except a fullscreen window it
    /// descends from: lowering stops directly above that one.
    pub fn find_lowest_sibling_below(&self, w: Xid) -> Option<Xid> {
        let client = self.window(w)?;
        let leader = self.stacking_leader(client);
        let w_layer = layer(client);

        for below in self.top_down() {
            if below.id == w || below.avoid_stacking_relative_to() {
                continue;
            }
            if w_layer == 0 {
                return None;
            }

            let b_layer = layer(below);
            if b_layer == 0 || w_layer > b_layer {
                return Some(below.id);
            }
            if w_layer < b_layer {
                // Otherwise stack_ancestors would drag the parent out of its layer
                if below.is_type(WindowType::FULLSCREEN) && self.descends_from(client, below) {
                    return Some(below.id);
                }
                continue;
            }
            if !self.stack_layer_check(below, leader, client) {
                return Some(below.id);
            }
        }
        None
    }

    /// `w` is a transient of `ancestor`, directly or further down, or a
    /// group transient of its client leader
    fn descends_from(&self, w: &Client, ancestor: &Client) -> bool {
        self.is_ancestor_of(w.id, ancestor.id)
            || (ancestor.transient_for.is_none() && self.is_group_transient(w, ancestor.client_leader))
    }

    /// May `w` sit directly above `sibling`?
    pub fn valid_sibling_below(&self, w: Xid, sibling: Xid) -> bool {
        let (Some(client), Some(below)) = (self.window(w), self.window(sibling)) else {
            return false;
        };
        if w == sibling || below.avoid_stacking_relative_to() {
            return false;
        }
        if below.is_type(WindowType::DESKTOP) {
            return true;
        }

        let t = stacking_type(client);
        let leader = self.stacking_leader(client);
        if t.contains(WindowType::DESKTOP) {
            false
        } else if t.intersects(WindowType::FULLSCREEN | WindowType::DOCK) {
            !below.is_type(WindowType::FULLSCREEN | WindowType::DOCK)
                || self.stack_layer_check(client, leader, below)
        } else {
            !below.is_type(WindowType::FULLSCREEN | WindowType::DOCK)
                && self.stack_layer_check(client, leader, below)
        }
    }

    /// Highest position for `w` below `sibling`
    ///
    /// `None` when `w` may not go below `sibling`, or when a window under
    /// `sibling` must stay above `w` before a valid position is reached.
    pub fn find_valid_stack_sibling_below(&self, w: Xid, sibling: Xid) -> Option<Placement> {
        let mut cursor = Some(sibling);
        while let Some(id) = cursor {
            let c = self.window(id)?;
            if !c.avoid_stacking_relative_to() {
                if !self.valid_sibling_below(id, w) {
                    return None;
                }
                break;
            }
            cursor = c.above();
        }

        let mut cursor = self.window(sibling)?.below();
        while let Some(id) = cursor {
            let c = self.window(id)?;
            cursor = c.below();
            if id == w || c.avoid_stacking_relative_to() {
                continue;
            }
            if self.valid_sibling_below(w, id) {
                return Some(Placement::Above(id));
            }
            if !self.valid_sibling_below(id, w) {
                return None;
            }
        }
        Some(Placement::Bottom)
    }

    /// Placement of `w` to end up directly above `sibling` (`None` = bottom),
    /// or `None` if it is already there
    pub fn stack_placement(&self, w: Xid, sibling: Option<Xid>) -> Option<Placement> {
        if sibling == Some(w) {
            return None;
        }
        let below = self.window(w)?.below();
        match (below, sibling) {
            (Some(_), None) => Some(Placement::Bottom),
            (Some(b), Some(s)) if b != s => Some(Placement::Above(s)),
            (None, Some(s)) => Some(Placement::Above(s)),
            _ => None,
        }
    }

    /// Docks at or below a fullscreen `sibling` that must be lifted when a
    /// normal window goes above it
    pub fn dock_steps(&self, w: Xid, sibling: Xid) -> Vec<StackStep> {
        let (Some(client), Some(sib)) = (self.window(w), self.window(sibling)) else {
            return Vec::new();
        };
        if sib.window_type != WindowType::FULLSCREEN
            || client.is_type(WindowType::FULLSCREEN | WindowType::DOCK)
            || self.is_ancestor_of(w, sibling)
        {
            return Vec::new();
        }
        self.top_down()
            .skip_while(|c| c.id != sibling)
            .filter(|c| c.is_type(WindowType::DOCK))
            .map(|c| (c.id, Placement::Above(sibling)))
            .collect()
    }

    /// Transients of `w` (explicit or group), placed before `w`
    ///
    /// Returns false to abort the whole restack.
    fn stack_transients(
        &self,
        w: Xid,
        avoid: Option<Xid>,
        placement: Placement,
        steps: &mut Vec<StackStep>,
        depth: usize,
    ) -> bool {
        let Some(client) = self.window(w) else {
            return true;
        };
        if depth > self.window_count() {
            return false;
        }
        let leader = self.stacking_leader(client);

        for t in self.top_down() {
            if t.id == w || Some(t.id) == avoid {
                continue;
            }
            if t.transient_for != Some(w) && !self.is_group_transient(t, leader) {
                continue;
            }
            if client.is_type(WindowType::DOCK) && !t.is_type(WindowType::DOCK) {
                return false;
            }
            if !self.stack_transients(t.id, avoid, placement, steps, depth + 1) {
                return false;
            }
            if placement == Placement::Above(t.id) {
                return false;
            }
            if t.is_mapped() || t.pending_maps > 0 {
                steps.push((t.id, placement));
            }
        }
        true
    }

    /// The transient parent with its other transients, or the windows of
    /// the group leader, placed after `w`
    fn stack_ancestors(&self, w: Xid, placement: Placement, steps: &mut Vec<StackStep>, depth: usize) {
        let Some(client) = self.window(w) else {
            return;
        };
        if depth > self.window_count() {
            return;
        }

        if let Some(parent) = client.transient_for {
            let Some(ancestor) = self.window(parent) else {
                return;
            };
            if placement == Placement::Above(parent) {
                return;
            }
            if !self.stack_transients(parent, Some(w), placement, steps, 0) {
                return;
            }
            if ancestor.is_type(WindowType::DESKTOP) {
                return;
            }
            if ancestor.is_type(WindowType::DOCK) && !client.is_type(WindowType::DOCK) {
                return;
            }
            if ancestor.is_mapped() || ancestor.pending_maps > 0 {
                steps.push((parent, placement));
            }
            self.stack_ancestors(parent, placement, steps, depth + 1);
        } else if self.is_group_transient(client, client.client_leader) {
            for a in self.top_down() {
                if a.client_leader != client.client_leader
                    || a.transient_for.is_some()
                    || self.is_group_transient(a, client.client_leader)
                {
                    continue;
                }
                if placement == Placement::Above(a.id) {
                    break;
                }
                if !self.stack_transients(a.id, Some(w), placement, steps, 0) {
                    break;
                }
                if a.is_type(WindowType::DESKTOP) {
                    continue;
                }
                if a.is_type(WindowType::DOCK) && !client.is_type(WindowType::DOCK) {
                    break;
                }
                if a.is_mapped() || a.pending_maps > 0 {
                    steps.push((a.id, placement));
                }
            }
        }
    }

    /// Every step needed to put `w` at `placement`: transients first, then
    /// `w`, then its ancestors
    pub fn plan_restack(&self, w: Xid, placement: Placement) -> Vec<StackStep> {
        let mut steps = Vec::new();
        if !self.stack_transients(w, None, placement, &mut steps, 0) {
            debug!("Restack of 0x{:x} aborted by a transient", w);
            return steps;
        }
        steps.push((w, placement));
        self.stack_ancestors(w, placement, &mut steps, 0);
        steps
    }
}

impl WindowManager {
    /// Send a configure and apply its stacking part locally
    pub(crate) fn configure_x_window(&mut self, w: WindowRef, changes: &WindowChanges) {
        if changes.is_empty() {
            return;
        }
        let id = w.id;
        self.request("Configure window", |s| s.configure_window(id, changes));

        let Some(client) = self.window_mut(w) else {
            return;
        };
        changes.apply_to(&mut client.server_geometry, &mut client.server_border_width);

        let Some(mode) = changes.stack_mode else {
            return;
        };
        client.pending_restacks += 1;
        let old_below = client.below();

        let Some(screen) = self.screen_mut(w.screen) else {
            return;
        };
        match (mode, changes.sibling) {
            (StackMode::Above, sibling) => {
                screen.insert_above(id, sibling);
            }
            (StackMode::Below, None) => {
                screen.insert_at_bottom(id);
            }
            (StackMode::Below, Some(sibling)) => match screen.window(sibling).and_then(|c| c.below()) {
                Some(under) => {
                    screen.insert_above(id, Some(under));
                }
                None => {
                    screen.insert_at_bottom(id);
                }
            },
        }

        if self.window(w).and_then(|c| c.below()) != old_below {
            self.window_restack_notify(w);
        }
    }

    /// Apply planned steps; `geometry` goes out with `w`'s own step
    fn apply_stack_steps(&mut self, w: WindowRef, steps: Vec<StackStep>, geometry: WindowChanges) {
        let mut geometry_sent = geometry.is_empty();
        for (id, placement) in steps {
            let mut changes = placement.changes();
            if id == w.id && !geometry_sent {
                changes = WindowChanges {
                    sibling: changes.sibling,
                    stack_mode: changes.stack_mode,
                    ..geometry
                };
                geometry_sent = true;
            }
            self.configure_x_window(WindowRef::new(w.screen, id), &changes);
        }
        if !geometry_sent {
            self.configure_x_window(w, &geometry);
        }
        self.update_client_list(w.screen);
    }

    /// Move `w` directly above `sibling` (`None` = bottom) with its
    /// transients and ancestors
    fn restack_to_sibling(&mut self, w: WindowRef, sibling: Option<Xid>, geometry: WindowChanges) {
        let Some(screen) = self.screen(w.screen) else {
            return;
        };
        let mut steps = Vec::new();
        if let Some(placement) = screen.stack_placement(w.id, sibling) {
            if let Some(sib) = sibling {
                steps.extend(screen.dock_steps(w.id, sib));
            }
            steps.extend(screen.plan_restack(w.id, placement));
        }
        self.apply_stack_steps(w, steps, geometry);
    }

    /// Raise `w` as far as its layer and state allow
    pub fn raise_window(&mut self, w: WindowRef) {
        let Some(client) = self.window(w) else {
            return;
        };
        let above_fs = client.is_type(WindowType::FULLSCREEN) && self.display.active_window == Some(w.id);
        let sibling = self.sibling_below(SiblingQuery {
            window: w,
            above_fullscreen: above_fs,
        });
        debug!("Raising 0x{:x} above {:?}", w.id, sibling);
        self.restack_to_sibling(w, sibling, WindowChanges::default());
    }

    /// Lower `w` as far as its layer and state allow
    pub fn lower_window(&mut self, w: WindowRef) {
        if self.window(w).is_none() {
            return;
        }
        let Some(sibling) = self.screen(w.screen).map(|s| s.find_lowest_sibling_below(w.id)) else {
            return;
        };
        debug!("Lowering 0x{:x} above {:?}", w.id, sibling);
        self.restack_to_sibling(w, sibling, WindowChanges::default());
    }

    /// Put `w` above `sibling`, or above the first window over it that is valid
    pub fn restack_window_above(&mut self, w: WindowRef, sibling: Xid) {
        let Some(screen) = self.screen(w.screen) else {
            return;
        };
        let mut cursor = Some(sibling);
        while let Some(id) = cursor {
            if screen.valid_sibling_below(w.id, id) {
                self.restack_to_sibling(w, Some(id), WindowChanges::default());
                return;
            }
            cursor = screen.window(id).and_then(|c| c.above());
        }
    }

    /// Put `w` below `sibling` if its layer and state allow it
    pub fn restack_window_below(&mut self, w: WindowRef, sibling: Xid) {
        match self.screen(w.screen).and_then(|s| s.find_valid_stack_sibling_below(w.id, sibling)) {
            Some(Placement::Above(p)) => self.restack_to_sibling(w, Some(p), WindowChanges::default()),
            Some(Placement::Bottom) => self.restack_to_sibling(w, None, WindowChanges::default()),
            None => debug!("0x{:x} may not go below 0x{:x}", w.id, sibling),
        }
    }

    /// Reconcile stacking and geometry with the window's type and state
    pub fn update_window_attributes(&mut self, w: WindowRef, mode: StackingUpdateMode) {
        let Some(client) = self.window(w) else {
            return;
        };
        let active = self.display.active_window;

        let mut sibling = None;
        let restack = mode != StackingUpdateMode::None;
        if restack {
            let above_fs = matches!(
                mode,
                StackingUpdateMode::AboveFullscreen | StackingUpdateMode::InitialMap
            ) || (client.is_type(WindowType::FULLSCREEN) && active == Some(w.id));

            sibling = self.sibling_below(SiblingQuery {
                window: w,
                above_fullscreen: above_fs,
            });

            let screen = self.screen(w.screen);
            if let (Some(sib), StackingUpdateMode::InitialMapDeniedFocus, Some(active), Some(screen)) =
                (sibling, mode, active, screen)
            {
                if active_at_or_below(screen, sib, active) && screen.valid_sibling_below(active, w.id) {
                    match screen.find_valid_stack_sibling_below(w.id, active) {
                        Some(Placement::Above(p)) => sibling = Some(p),
                        Some(Placement::Bottom) => sibling = None,
                        None => {}
                    }
                }
            }
        }

        let geometry = self.add_window_size_changes(w);
        let resized = geometry.width.is_some() || geometry.height.is_some();
        if resized && self.window(w).is_some_and(|c| c.is_mapped()) {
            self.send_sync_request(w);
        }

        if restack {
            self.restack_to_sibling(w, sibling, geometry);
        } else {
            self.configure_x_window(w, &geometry);
        }
    }

    /// Local restack reported by the server: `below` is the window now
    /// directly under `w`, `None` for the bottom
    ///
    /// Returns false when nothing changed or `below` is unknown.
    pub fn restack_window(&mut self, w: WindowRef, below: Option<Xid>) -> bool {
        let Some(screen) = self.screen_mut(w.screen) else {
            return false;
        };
        let Some(client) = screen.window(w.id) else {
            return false;
        };
        if client.below() == below {
            return false;
        }

        let moved = match below {
            None => screen.insert_at_bottom(w.id),
            Some(sibling) if !screen.is_linked(sibling) => false,
            Some(sibling) => screen.insert_above(w.id, Some(sibling)),
        };
        if moved {
            self.window_restack_notify(w);
            self.update_client_list(w.screen);
        }
        moved
    }
}

/// Is `active` at or below `sibling` in the stack?
fn active_at_or_below(screen: &Screen, sibling: Xid, active: Xid) -> bool {
    let mut cursor = Some(sibling);
    while let Some(id) = cursor {
        if id == active {
            return true;
        }
        cursor = screen.window(id).and_then(|c| c.below());
    }
    false
}
