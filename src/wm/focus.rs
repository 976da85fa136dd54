//! Focus Module
//!
//! Input focus, the active window and focus stealing prevention.
//!
//! Activation requests from applications are judged against the active
//! window by comparing user interaction timestamps. How strict that
//! comparison is depends on the prevention level, and the prevention
//! match selects which windows it applies to at all.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::FocusConfig;
use crate::core::{ScreenId, WindowRef};
use crate::wm::WindowManager;
use crate::wm::client::ALL_DESKTOPS;
use crate::wm::client_flags::{WindowState, WindowType};
use crate::wm::stacking::StackingUpdateMode;
use crate::wm::window_match::WindowMatch;

/// Source of an activation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusSource {
    /// Application requested focus
    Application,
    /// Pager/panel requested focus
    Pager,
    /// Other source (user action, etc.)
    Other,
}

impl FocusSource {
    /// `_NET_ACTIVE_WINDOW` source indication
    pub fn from_wire(value: u32) -> Self {
        match value {
            1 => FocusSource::Application,
            2 => FocusSource::Pager,
            _ => FocusSource::Other,
        }
    }
}

/// How hard activation requests have to work to steal focus
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FocusPreventionLevel {
    None,
    #[default]
    Low,
    Normal,
    High,
    VeryHigh,
}

impl FocusPreventionLevel {
    pub const ALL: [Self; 5] = [Self::None, Self::Low, Self::Normal, Self::High, Self::VeryHigh];
}

/// Outcome of `allow_window_focus`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusResult {
    Allowed,
    /// The request is older than the user's last interaction with the
    /// active window; the window should ask for attention instead
    Denied,
    /// Never focus this window from a request
    Prevented,
}

/// Focus stealing prevention settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FocusPolicy {
    pub level: FocusPreventionLevel,
    /// Windows the prevention applies to
    pub matcher: WindowMatch,
}

impl FocusPolicy {
    pub fn new(level: FocusPreventionLevel, matcher: WindowMatch) -> Self {
        Self { level, matcher }
    }

    pub fn from_config(config: &FocusConfig) -> Self {
        let matcher = WindowMatch::parse(&config.prevention_match).unwrap_or_else(|e| {
            warn!(
                "Invalid focus prevention match {:?}: {}; applying to all windows",
                config.prevention_match, e
            );
            WindowMatch::Any
        });
        Self::new(config.prevention_level, matcher)
    }
}

impl Default for FocusPolicy {
    fn default() -> Self {
        Self::new(FocusPreventionLevel::default(), WindowMatch::Any)
    }
}

/// Server time `a` is before `b`, allowing for wraparound
///
/// A zero time is before everything; nothing is before a zero time.
pub fn time_is_before(a: u32, b: u32) -> bool {
    a == 0 || (time_is_before_real(a, b) && b != 0)
}

fn time_is_before_real(a: u32, b: u32) -> bool {
    (a < b && b - a < 0x7fff_ffff) || (a > b && a - b > 0x7fff_ffff)
}

impl WindowManager {
    /// Last user interaction with `w`, falling back to its transient parent
    pub fn usage_timestamp(&self, w: WindowRef) -> Option<u32> {
        let client = self.window(w)?;
        client.user_time.or_else(|| {
            let parent = client.transient_for?;
            self.screen(w.screen)?.window(parent)?.user_time
        })
    }

    /// Should `w` get focus from a request made at `timestamp`?
    ///
    /// `viewport` is the viewport the window would be shown on.
    pub fn allow_window_focus(
        &self,
        w: WindowRef,
        no_focus_mask: WindowType,
        viewport: (i32, i32),
        timestamp: Option<u32>,
    ) -> FocusResult {
        let Some(client) = self.window(w) else {
            return FocusResult::Prevented;
        };
        let policy = &self.display.focus;
        let level = policy.level;

        if level == FocusPreventionLevel::None {
            return FocusResult::Allowed;
        }
        if !policy.matcher.matches(client) {
            return FocusResult::Allowed;
        }
        if client.is_type(no_focus_mask) {
            return FocusResult::Prevented;
        }
        if !client.input_hint && !client.take_focus {
            return FocusResult::Prevented;
        }
        if level == FocusPreventionLevel::VeryHigh {
            return FocusResult::Prevented;
        }

        let timestamp = timestamp.filter(|&t| t != 0).or_else(|| self.usage_timestamp(w));
        if timestamp == Some(0) {
            return FocusResult::Denied;
        }

        let Some(screen) = self.screen(w.screen) else {
            return FocusResult::Prevented;
        };
        let active = self.display.active_window.and_then(|id| screen.window(id));
        let Some(active_client) = active.filter(|c| !c.is_type(WindowType::DESKTOP)) else {
            return FocusResult::Allowed;
        };

        if client.client_leader.is_some() && client.client_leader == active_client.client_leader {
            return FocusResult::Allowed;
        }
        if level == FocusPreventionLevel::High {
            return FocusResult::Prevented;
        }

        if !client.on_desktop(screen.current_desktop) || screen.default_viewport_for_window(client) != viewport {
            return FocusResult::Denied;
        }

        let Some(timestamp) = timestamp else {
            return if level == FocusPreventionLevel::Normal {
                FocusResult::Prevented
            } else {
                FocusResult::Allowed
            };
        };

        match self.usage_timestamp(active_client.window_ref()) {
            Some(active_time) if time_is_before(timestamp, active_time) => FocusResult::Denied,
            _ => FocusResult::Allowed,
        }
    }

    /// Hand input focus to `w`, or to the modal window that owns it
    pub fn move_input_focus_to_window(&mut self, w: WindowRef) {
        let Some(count) = self.screen(w.screen).map(|s| s.window_count()) else {
            return;
        };
        let mut target = w;
        for _ in 0..=count {
            let Some(client) = self.window(target) else {
                return;
            };
            let modal = self.screen(w.screen).and_then(|s| s.modal_transient(target.id));
            if let Some(modal) = modal {
                target = WindowRef::new(w.screen, modal);
                continue;
            }

            let id = target.id;
            let mut focused = false;
            if client.hidden {
                self.request("Set input focus", |s| s.set_input_focus(id));
                focused = true;
            } else {
                let (input_hint, take_focus) = (client.input_hint, client.take_focus);
                if input_hint {
                    self.request("Set input focus", |s| s.set_input_focus(id));
                    focused = true;
                }
                if take_focus {
                    let time = self.display.last_event_time;
                    self.request("Send WM_TAKE_FOCUS", |s| s.send_take_focus(id, time));
                    focused = true;
                }
            }

            if focused {
                debug!("Moving input focus to 0x{:x}", id);
                self.display.next_active_window = Some(id);
                return;
            }

            match self.window(target).and_then(|c| c.transient_for) {
                Some(parent) if parent != target.id => target = WindowRef::new(w.screen, parent),
                _ => return,
            }
        }
    }

    /// The server reported a focus change
    pub fn set_active_window(&mut self, w: Option<WindowRef>) {
        let Some(w) = w else {
            if self.display.active_window.is_some() {
                self.display.prev_active_window = self.display.active_window.take();
                for root in self.display.screens.iter().map(|s| s.root).collect::<Vec<_>>() {
                    self.request("Set active window", |s| s.set_active_window(root, None));
                }
            }
            return;
        };
        let Some(client) = self.window(w) else {
            return;
        };
        if !client.managed {
            return;
        }
        let state = client.state;

        if self.display.active_window != Some(w.id) {
            if self.display.next_active_window == Some(w.id) {
                self.display.next_active_window = None;
            }
            self.display.prev_active_window = self.display.active_window;
            self.display.active_window = Some(w.id);
            let num = self.display.next_active_num();
            if let Some(c) = self.window_mut(w) {
                c.active_num = num;
            }
            debug!("Active window is now 0x{:x}", w.id);

            if let Some(root) = self.screen(w.screen).map(|s| s.root) {
                self.request("Set active window", |s| s.set_active_window(root, Some(w.id)));
            }
        }

        self.change_window_state(w, state - WindowState::DEMANDS_ATTENTION);
    }

    /// Focus the most recently active focusable window, or the root
    pub fn focus_default_window(&mut self, screen: ScreenId) {
        let Some(s) = self.screen(screen) else {
            return;
        };
        let candidates: Vec<WindowRef> = s
            .top_down()
            .filter(|c| !c.is_type(WindowType::DOCK))
            .map(|c| c.window_ref())
            .collect();

        let mut focus: Option<WindowRef> = None;
        for w in candidates {
            if !self.focus_window(w) {
                continue;
            }
            let Some(client) = self.window(w) else {
                continue;
            };
            focus = match focus.and_then(|f| self.window(f)) {
                None => Some(w),
                Some(current)
                    if client.is_type(WindowType::NORMAL | WindowType::DIALOG | WindowType::MODAL_DIALOG)
                        && client.active_num > current.active_num =>
                {
                    Some(w)
                }
                Some(_) => focus,
            };
        }

        match focus {
            Some(w) if self.display.active_window != Some(w.id) => self.move_input_focus_to_window(w),
            Some(_) => {}
            None => {
                let Some(root) = self.screen(screen).map(|s| s.root) else {
                    return;
                };
                debug!("No window to focus on screen {}, focusing root", screen);
                self.request("Set input focus", |s| s.set_input_focus(root));
            }
        }
    }
}

/// Can `window` take focus at all?
pub(crate) fn focus_window_base(wm: &mut WindowManager, window: WindowRef) -> bool {
    let Some(client) = wm.window(window) else {
        return false;
    };
    let Some(screen) = wm.screen(window.screen) else {
        return false;
    };

    if client.override_redirect || !client.managed || client.destroyed {
        return false;
    }
    if !client.on_desktop(screen.current_desktop) {
        return false;
    }
    if !client.shaded && client.hidden {
        return false;
    }

    let g = client.server_geometry;
    let bw = client.server_border_width * 2;
    g.x + g.width + bw > 0 && g.y + g.height + bw > 0 && g.x < screen.width && g.y < screen.height
}

/// Bring `window` to the user: its desktop, its minimized ancestors,
/// the top of its layer and input focus
pub(crate) fn activate_window_base(wm: &mut WindowManager, window: WindowRef) {
    let Some(client) = wm.window(window) else {
        return;
    };
    let (desktop, parent) = (client.desktop, client.transient_for);
    if desktop != ALL_DESKTOPS {
        wm.set_current_desktop(window.screen, desktop);
    }

    let mut ancestors = Vec::new();
    let mut cursor = parent;
    let Some(screen) = wm.screen(window.screen) else {
        return;
    };
    while let Some(id) = cursor {
        if ancestors.contains(&id) || ancestors.len() > screen.window_count() {
            break;
        }
        ancestors.push(id);
        cursor = screen.window(id).and_then(|c| c.transient_for);
    }
    for id in ancestors {
        wm.unminimize_window(WindowRef::new(window.screen, id));
    }
    wm.unminimize_window(window);

    if wm.window(window).map_or(true, |c| c.hidden && !c.shaded) {
        return;
    }

    wm.ensure_window_visibility(window);
    wm.update_window_attributes(window, StackingUpdateMode::AboveFullscreen);
    wm.move_input_focus_to_window(window);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::Geometry;
    use crate::wm::testing::{Request, map_with, mapped_window, test_wm};
    use proptest::prelude::*;

    #[test]
    fn test_time_is_before() {
        assert!(time_is_before(0, 5));
        assert!(time_is_before(0, 0));
        assert!(!time_is_before(5, 0));
        assert!(time_is_before(1, 2));
        assert!(!time_is_before(2, 1));
        assert!(!time_is_before(7, 7));
        // Wrapped around
        assert!(time_is_before(0xFFFF_FFF0, 5));
        assert!(!time_is_before(5, 0xFFFF_FFF0));
    }

    /// Active window `a` used at time 100, candidate `b`
    fn focus_setup() -> (WindowManager, WindowRef, WindowRef) {
        let (mut wm, _log) = test_wm();
        let a = mapped_window(&mut wm, 0x100);
        let b = mapped_window(&mut wm, 0x200);
        wm.window_mut(a).unwrap().user_time = Some(100);
        wm.set_active_window(Some(a));
        (wm, a, b)
    }

    #[test]
    fn test_allow_focus_by_timestamp() {
        let (mut wm, _a, b) = focus_setup();
        let allow = |wm: &WindowManager, ts| wm.allow_window_focus(b, WindowType::empty(), (0, 0), ts);

        assert_eq!(allow(&wm, Some(50)), FocusResult::Denied);
        assert_eq!(allow(&wm, Some(150)), FocusResult::Allowed);
        assert_eq!(allow(&wm, None), FocusResult::Allowed);

        wm.window_mut(b).unwrap().user_time = Some(0);
        assert_eq!(allow(&wm, None), FocusResult::Denied);

        wm.window_mut(b).unwrap().user_time = Some(40);
        assert_eq!(allow(&wm, None), FocusResult::Denied);
        // Zero from the request means "no timestamp"
        assert_eq!(allow(&wm, Some(0)), FocusResult::Denied);
    }

    #[test]
    fn test_allow_focus_levels() {
        let (mut wm, _a, b) = focus_setup();
        let allow = |wm: &WindowManager| wm.allow_window_focus(b, WindowType::empty(), (0, 0), None);

        wm.display.focus.level = FocusPreventionLevel::Normal;
        assert_eq!(allow(&wm), FocusResult::Prevented);
        wm.display.focus.level = FocusPreventionLevel::High;
        assert_eq!(allow(&wm), FocusResult::Prevented);
        wm.display.focus.level = FocusPreventionLevel::VeryHigh;
        assert_eq!(allow(&wm), FocusResult::Prevented);
        wm.display.focus.level = FocusPreventionLevel::None;
        assert_eq!(allow(&wm), FocusResult::Allowed);

        // Outside the match the policy doesn't apply
        wm.display.focus.level = FocusPreventionLevel::VeryHigh;
        wm.display.focus.matcher = WindowMatch::parse("type=dialog").unwrap();
        assert_eq!(allow(&wm), FocusResult::Allowed);
    }

    #[test]
    fn test_allow_focus_exemptions() {
        let (mut wm, a, b) = focus_setup();

        assert_eq!(
            wm.allow_window_focus(b, WindowType::NORMAL, (0, 0), None),
            FocusResult::Prevented
        );

        wm.display.focus.level = FocusPreventionLevel::High;
        wm.set_client_leader(a, Some(0x100));
        wm.set_client_leader(b, Some(0x100));
        assert_eq!(
            wm.allow_window_focus(b, WindowType::empty(), (0, 0), None),
            FocusResult::Allowed
        );

        wm.window_mut(b).unwrap().input_hint = false;
        assert_eq!(
            wm.allow_window_focus(b, WindowType::empty(), (0, 0), None),
            FocusResult::Prevented
        );
    }

    #[test]
    fn test_allow_focus_other_viewport_denied() {
        let (mut wm, _a, b) = focus_setup();
        wm.window_mut(b).unwrap().user_time = Some(500);
        assert_eq!(
            wm.allow_window_focus(b, WindowType::empty(), (1, 0), None),
            FocusResult::Denied
        );
        wm.window_mut(b).unwrap().desktop = 3;
        assert_eq!(
            wm.allow_window_focus(b, WindowType::empty(), (0, 0), None),
            FocusResult::Denied
        );
    }

    #[test]
    fn test_transient_uses_parent_timestamp() {
        let (mut wm, a, b) = focus_setup();
        let c = map_with(&mut wm, 0x300, WindowType::NORMAL, WindowState::empty(), Some(b.id));
        wm.window_mut(b).unwrap().user_time = Some(20);
        assert_eq!(wm.usage_timestamp(c), Some(20));
        assert_eq!(wm.usage_timestamp(a), Some(100));
        assert_eq!(
            wm.allow_window_focus(c, WindowType::empty(), (0, 0), None),
            FocusResult::Denied
        );
    }

    #[test]
    fn test_move_focus_follows_modal_and_protocols() {
        let (mut wm, log) = test_wm();
        let a = mapped_window(&mut wm, 0x100);
        let d = map_with(&mut wm, 0x200, WindowType::DIALOG, WindowState::MODAL, Some(a.id));

        log.clear();
        wm.move_input_focus_to_window(a);
        assert_eq!(log.take(), vec![Request::InputFocus(d.id)]);
        assert_eq!(wm.display.next_active_window, Some(d.id));

        let t = mapped_window(&mut wm, 0x300);
        {
            let c = wm.window_mut(t).unwrap();
            c.input_hint = false;
            c.take_focus = true;
        }
        wm.display.last_event_time = 4242;
        log.clear();
        wm.move_input_focus_to_window(t);
        assert_eq!(log.take(), vec![Request::TakeFocus(t.id, 4242)]);

        // Neither input nor WM_TAKE_FOCUS: the parent gets it
        let p = mapped_window(&mut wm, 0x400);
        let n = map_with(&mut wm, 0x500, WindowType::UTILITY, WindowState::empty(), Some(p.id));
        wm.window_mut(n).unwrap().input_hint = false;
        log.clear();
        wm.move_input_focus_to_window(n);
        assert_eq!(log.take(), vec![Request::InputFocus(p.id)]);
    }

    #[test]
    fn test_set_active_window() {
        let (mut wm, log) = test_wm();
        let a = mapped_window(&mut wm, 0x100);
        let b = mapped_window(&mut wm, 0x200);
        wm.change_window_state(b, WindowState::DEMANDS_ATTENTION);

        wm.set_active_window(Some(a));
        log.clear();
        wm.set_active_window(Some(b));

        assert_eq!(wm.display.active_window, Some(b.id));
        assert_eq!(wm.display.prev_active_window, Some(a.id));
        assert!(wm.window(b).unwrap().active_num > wm.window(a).unwrap().active_num);
        assert!(!wm.window(b).unwrap().state.contains(WindowState::DEMANDS_ATTENTION));

        let requests = log.take();
        assert!(requests.contains(&Request::ActiveWindow(1, Some(b.id))));
        assert!(requests.contains(&Request::WindowState(b.id, WindowState::empty())));
    }

    #[test]
    fn test_focus_default_prefers_recently_active() {
        let (mut wm, log) = test_wm();
        let a = mapped_window(&mut wm, 0x100);
        let b = mapped_window(&mut wm, 0x200);
        let c = mapped_window(&mut wm, 0x300);
        wm.window_mut(a).unwrap().active_num = 5;
        wm.window_mut(b).unwrap().active_num = 2;
        assert_eq!(wm.screen(0).unwrap().top(), Some(c.id));

        log.clear();
        wm.focus_default_window(0);
        assert_eq!(log.take(), vec![Request::InputFocus(a.id)]);
    }

    #[test]
    fn test_focus_default_falls_back_to_root() {
        let (mut wm, log) = test_wm();
        let a = mapped_window(&mut wm, 0x100);
        wm.window_mut(a).unwrap().server_geometry = Geometry::new(2000, 0, 100, 100);
        assert!(!wm.focus_window(a));

        log.clear();
        wm.focus_default_window(0);
        assert_eq!(log.take(), vec![Request::InputFocus(1)]);
    }

    #[test]
    fn test_focus_window_rules() {
        let (mut wm, _log) = test_wm();
        let a = mapped_window(&mut wm, 0x100);
        assert!(wm.focus_window(a));

        wm.window_mut(a).unwrap().desktop = 1;
        assert!(!wm.focus_window(a));
        wm.window_mut(a).unwrap().desktop = ALL_DESKTOPS;
        assert!(wm.focus_window(a));

        wm.window_mut(a).unwrap().hidden = true;
        assert!(!wm.focus_window(a));
        wm.window_mut(a).unwrap().shaded = true;
        assert!(wm.focus_window(a));
    }

    #[test]
    fn test_policy_from_config() {
        let policy = FocusPolicy::from_config(&FocusConfig {
            prevention_level: FocusPreventionLevel::High,
            prevention_match: "((".into(),
        });
        assert_eq!(policy, FocusPolicy::new(FocusPreventionLevel::High, WindowMatch::Any));
    }

    proptest! {
        #[test]
        fn prop_focus_prevention_is_monotonic(
            candidate_time in prop::option::of(0u32..400),
            active_time in prop::option::of(0u32..400),
            request_time in prop::option::of(0u32..400),
            same_leader in any::<bool>(),
            input_hint in any::<bool>(),
            take_focus in any::<bool>(),
            viewport in (0i32..2, 0i32..2),
        ) {
            let (mut wm, a, b) = focus_setup();
            wm.window_mut(a).unwrap().user_time = active_time;
            {
                let c = wm.window_mut(b).unwrap();
                c.user_time = candidate_time;
                c.input_hint = input_hint;
                c.take_focus = take_focus;
            }
            if same_leader {
                wm.set_client_leader(a, Some(0x100));
                wm.set_client_leader(b, Some(0x100));
            }

            let results: Vec<FocusResult> = FocusPreventionLevel::ALL
                .iter()
                .map(|&level| {
                    wm.display.focus.level = level;
                    wm.allow_window_focus(b, WindowType::empty(), viewport, request_time)
                })
                .collect();

            for (i, result) in results.iter().enumerate() {
                if *result == FocusResult::Allowed {
                    for lower in &results[..i] {
                        prop_assert_eq!(*lower, FocusResult::Allowed);
                    }
                }
            }
        }
    }
}
