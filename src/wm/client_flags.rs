//! Client Flags
//!
//! Bitfield flags for window type, state, allowed actions, geometry
//! change masks and grabs.

use bitflags::bitflags;

bitflags! {
    /// Window type (`_NET_WM_WINDOW_TYPE`, plus the effective-only types)
    ///
    /// A window's effective type has exactly one bit set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct WindowType: u32 {
        const DESKTOP       = 1 << 0;
        const DOCK          = 1 << 1;
        const TOOLBAR       = 1 << 2;
        const MENU          = 1 << 3;
        const UTILITY       = 1 << 4;
        const SPLASH        = 1 << 5;
        const DIALOG        = 1 << 6;
        const NORMAL        = 1 << 7;
        const DROPDOWN_MENU = 1 << 8;
        const POPUP_MENU    = 1 << 9;
        const TOOLTIP       = 1 << 10;
        const NOTIFICATION  = 1 << 11;
        const COMBO         = 1 << 12;
        const DND           = 1 << 13;
        const MODAL_DIALOG  = 1 << 14;
        const FULLSCREEN    = 1 << 15;
        const UNKNOWN       = 1 << 16;
    }
}

impl WindowType {
    /// Types that can be implicit transients of their client leader's windows
    pub const GROUP_TRANSIENT: Self = Self::UTILITY
        .union(Self::TOOLBAR)
        .union(Self::MENU)
        .union(Self::DIALOG)
        .union(Self::MODAL_DIALOG);

    /// Types that never take focus from a map or activation request
    pub const NO_FOCUS: Self = Self::DESKTOP.union(Self::DOCK).union(Self::SPLASH);

    /// Name as used in match expressions
    pub fn name(self) -> &'static str {
        TYPE_NAMES
            .iter()
            .find(|(t, _)| *t == self)
            .map_or("unknown", |&(_, name)| name)
    }

    pub fn from_label(name: &str) -> Option<Self> {
        TYPE_NAMES
            .iter()
            .find(|(_, n)| n.eq_ignore_ascii_case(name))
            .map(|(t, _)| *t)
    }
}

const TYPE_NAMES: &[(WindowType, &str)] = &[
    (WindowType::DESKTOP, "desktop"),
    (WindowType::DOCK, "dock"),
    (WindowType::TOOLBAR, "toolbar"),
    (WindowType::MENU, "menu"),
    (WindowType::UTILITY, "utility"),
    (WindowType::SPLASH, "splash"),
    (WindowType::DIALOG, "dialog"),
    (WindowType::NORMAL, "normal"),
    (WindowType::DROPDOWN_MENU, "dropdownmenu"),
    (WindowType::POPUP_MENU, "popupmenu"),
    (WindowType::TOOLTIP, "tooltip"),
    (WindowType::NOTIFICATION, "notification"),
    (WindowType::COMBO, "combo"),
    (WindowType::DND, "dnd"),
    (WindowType::MODAL_DIALOG, "modaldialog"),
    (WindowType::FULLSCREEN, "fullscreen"),
    (WindowType::UNKNOWN, "unknown"),
];

impl Default for WindowType {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

bitflags! {
    /// Window state (`_NET_WM_STATE`)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct WindowState: u32 {
        const MODAL             = 1 << 0;
        const STICKY            = 1 << 1;
        const MAXIMIZED_VERT    = 1 << 2;
        const MAXIMIZED_HORZ    = 1 << 3;
        const SHADED            = 1 << 4;
        const SKIP_TASKBAR      = 1 << 5;
        const SKIP_PAGER        = 1 << 6;
        const HIDDEN            = 1 << 7;
        const FULLSCREEN        = 1 << 8;
        const ABOVE             = 1 << 9;
        const BELOW             = 1 << 10;
        const DEMANDS_ATTENTION = 1 << 11;
        const DISPLAY_MODAL     = 1 << 12;
    }
}

impl WindowState {
    pub const MAXIMIZED: Self = Self::MAXIMIZED_VERT.union(Self::MAXIMIZED_HORZ);

    /// States a client may not set on itself through a state request
    pub const WM_ONLY: Self = Self::HIDDEN;

    pub fn name(self) -> &'static str {
        STATE_NAMES
            .iter()
            .find(|(st, _)| *st == self)
            .map_or("", |&(_, name)| name)
    }

    pub fn from_label(name: &str) -> Option<Self> {
        STATE_NAMES
            .iter()
            .find(|(_, n)| n.eq_ignore_ascii_case(name))
            .map(|(st, _)| *st)
    }
}

const STATE_NAMES: &[(WindowState, &str)] = &[
    (WindowState::MODAL, "modal"),
    (WindowState::STICKY, "sticky"),
    (WindowState::MAXIMIZED_VERT, "maxvert"),
    (WindowState::MAXIMIZED_HORZ, "maxhorz"),
    (WindowState::SHADED, "shaded"),
    (WindowState::SKIP_TASKBAR, "skiptaskbar"),
    (WindowState::SKIP_PAGER, "skippager"),
    (WindowState::HIDDEN, "hidden"),
    (WindowState::FULLSCREEN, "fullscreen"),
    (WindowState::ABOVE, "above"),
    (WindowState::BELOW, "below"),
    (WindowState::DEMANDS_ATTENTION, "attention"),
    (WindowState::DISPLAY_MODAL, "displaymodal"),
];

bitflags! {
    /// Allowed actions (`_NET_WM_ALLOWED_ACTIONS`)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct WindowActions: u32 {
        const MOVE           = 1 << 0;
        const RESIZE         = 1 << 1;
        const STICK          = 1 << 2;
        const MINIMIZE       = 1 << 3;
        const MAXIMIZE_HORZ  = 1 << 4;
        const MAXIMIZE_VERT  = 1 << 5;
        const FULLSCREEN     = 1 << 6;
        const CLOSE          = 1 << 7;
        const SHADE          = 1 << 8;
        const CHANGE_DESKTOP = 1 << 9;
        const ABOVE          = 1 << 10;
        const BELOW          = 1 << 11;
    }
}

bitflags! {
    /// Which parts of a geometry change (mirrors the X configure value mask)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ChangeMask: u8 {
        const X            = 1 << 0;
        const Y            = 1 << 1;
        const WIDTH        = 1 << 2;
        const HEIGHT       = 1 << 3;
        const BORDER_WIDTH = 1 << 4;
        const SIBLING      = 1 << 5;
        const STACK_MODE   = 1 << 6;
    }
}

impl ChangeMask {
    pub const POSITION: Self = Self::X.union(Self::Y);
    pub const SIZE: Self = Self::WIDTH.union(Self::HEIGHT);
    pub const GEOMETRY: Self = Self::POSITION.union(Self::SIZE).union(Self::BORDER_WIDTH);
}

bitflags! {
    /// What a grab is for
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct GrabMask: u8 {
        const KEY    = 1 << 0;
        const BUTTON = 1 << 1;
        const MOVE   = 1 << 2;
        const RESIZE = 1 << 3;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names_round_trip() {
        for t in WindowType::all().iter() {
            assert_eq!(WindowType::from_label(t.name()), Some(t));
        }
        assert_eq!(WindowType::from_label("Dock"), Some(WindowType::DOCK));
        assert_eq!(WindowType::from_label("panel"), None);
    }

    #[test]
    fn test_state_names() {
        assert_eq!(WindowState::from_label("above"), Some(WindowState::ABOVE));
        assert_eq!(WindowState::from_label("nope"), None);
        assert!(WindowState::MAXIMIZED.contains(WindowState::MAXIMIZED_VERT));
    }

    #[test]
    fn test_labels_differ_from_flag_names() {
        assert_eq!(
            WindowType::from_label("modaldialog"),
            Some(WindowType::MODAL_DIALOG)
        );
        assert_eq!(
            WindowType::from_name("MODAL_DIALOG"),
            Some(WindowType::MODAL_DIALOG)
        );
        assert_eq!(WindowType::from_name("modaldialog"), None);
        assert_eq!(
            WindowState::from_label("attention"),
            Some(WindowState::DEMANDS_ATTENTION)
        );
        assert_eq!(WindowState::from_name("attention"), None);
    }
}
