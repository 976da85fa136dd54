//! Transients Module
//!
//! Transient-for relationships, implicit group transience through a
//! shared client leader, window groups and modal transient lookup.
//!
//! Transient hints are lookup keys into the registry. Cycles are refused
//! when the hint is set, but every walk is still bounded by the number of
//! windows on the screen.

use tracing::debug;

use crate::core::{WindowRef, Xid};
use crate::wm::WindowManager;
use crate::wm::client::Client;
use crate::wm::client_flags::{WindowState, WindowType};
use crate::wm::screen::Screen;

impl Screen {
    /// True when `ancestor` is reached by following `transient`'s
    /// transient-for chain
    pub fn is_ancestor_of(&self, transient: Xid, ancestor: Xid) -> bool {
        let mut cursor = self.window(transient).and_then(|c| c.transient_for);
        for _ in 0..=self.window_count() {
            match cursor {
                Some(id) if id == ancestor => return true,
                Some(id) => cursor = self.window(id).and_then(|c| c.transient_for),
                None => return false,
            }
        }
        false
    }

    /// `w` belongs to `leader`'s windows without an explicit transient hint
    pub fn is_group_transient(&self, w: &Client, leader: Option<Xid>) -> bool {
        let Some(leader) = leader else {
            return false;
        };
        w.transient_for.is_none()
            && w.is_type(WindowType::GROUP_TRANSIENT)
            && w.client_leader == Some(leader)
    }

    /// Client leader that `w` stacks together with, `None` for transients
    pub(crate) fn stacking_leader(&self, w: &Client) -> Option<Xid> {
        if w.transient_for.is_some() || self.is_group_transient(w, w.client_leader) {
            None
        } else {
            w.client_leader
        }
    }

    /// Mapped modal window that should get focus instead of `window`
    pub fn modal_transient(&self, window: Xid) -> Option<Xid> {
        let Some(origin) = self.window(window) else {
            return None;
        };

        let mut modal = window;
        'restart: for _ in 0..=self.window_count() {
            for c in self.top_down() {
                if c.id == modal || !c.is_mapped() {
                    continue;
                }
                if c.transient_for == Some(modal) && c.state.contains(WindowState::MODAL) {
                    modal = c.id;
                    continue 'restart;
                }
            }
            break;
        }

        if modal == window {
            // Group modals only apply to windows without a transient hint
            if origin.transient_for.is_some() {
                return None;
            }
            for c in self.top_down() {
                if c.id == window || !c.is_mapped() || self.is_ancestor_of(window, c.id) {
                    continue;
                }
                if self.is_group_transient(c, origin.client_leader) && c.state.contains(WindowState::MODAL) {
                    modal = self.modal_transient(c.id).unwrap_or(c.id);
                    break;
                }
            }
        }

        (modal != window).then_some(modal)
    }
}

impl WindowManager {
    /// Update `WM_TRANSIENT_FOR`; hints that would form a cycle are dropped
    pub fn set_transient_for(&mut self, w: WindowRef, parent: Option<Xid>) {
        let Some(screen) = self.screen(w.screen) else {
            return;
        };
        let root = screen.root;
        let parent = parent.filter(|&p| p != root && p != w.id);

        if let Some(p) = parent {
            if screen.is_ancestor_of(p, w.id) {
                debug!("Ignoring transient hint 0x{:x} -> 0x{:x}: cycle", w.id, p);
                return;
            }
        }

        let Some(client) = self.window_mut(w) else {
            return;
        };
        if client.transient_for == parent {
            return;
        }
        client.transient_for = parent;
        self.recalc_window_type(w);
        self.recalc_window_actions(w);
    }

    pub fn set_client_leader(&mut self, w: WindowRef, leader: Option<Xid>) {
        if let Some(client) = self.window_mut(w) {
            client.client_leader = leader;
        }
    }

    /// Join or leave the `WM_HINTS` window group
    pub fn set_window_group(&mut self, w: WindowRef, leader: Option<Xid>) {
        let group = match (leader, self.screen_mut(w.screen)) {
            (Some(l), Some(s)) => Some(s.group_for(l)),
            (Some(_), None) => return,
            (None, _) => None,
        };
        if let Some(client) = self.window_mut(w) {
            client.group = group;
        }
    }
}
