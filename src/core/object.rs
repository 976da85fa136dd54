//! Object Module
//!
//! The four object kinds of the window manager tree (process, display,
//! screen, window). Every object carries a private slot array so plugins
//! can attach state without the core knowing about it. Parent links are
//! lookup keys resolved through the owning `WindowManager`, never owning
//! pointers.

use std::fmt;

use crate::core::privates::Privates;

/// X11 resource id
pub type Xid = u32;

/// Index of a screen within its display
pub type ScreenId = usize;

/// Object kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Process,
    Display,
    Screen,
    Window,
}

impl ObjectKind {
    /// Kind of the parent object, `None` for the process
    pub fn parent(self) -> Option<ObjectKind> {
        match self {
            ObjectKind::Process => None,
            ObjectKind::Display => Some(ObjectKind::Process),
            ObjectKind::Screen => Some(ObjectKind::Display),
            ObjectKind::Window => Some(ObjectKind::Screen),
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObjectKind::Process => "process",
            ObjectKind::Display => "display",
            ObjectKind::Screen => "screen",
            ObjectKind::Window => "window",
        };
        f.write_str(name)
    }
}

/// A window on a particular screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowRef {
    pub screen: ScreenId,
    pub id: Xid,
}

impl WindowRef {
    pub fn new(screen: ScreenId, id: Xid) -> Self {
        Self { screen, id }
    }
}

/// Lookup key for any object in the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectRef {
    Process,
    Display,
    Screen(ScreenId),
    Window(WindowRef),
}

impl ObjectRef {
    pub fn kind(&self) -> ObjectKind {
        match self {
            ObjectRef::Process => ObjectKind::Process,
            ObjectRef::Display => ObjectKind::Display,
            ObjectRef::Screen(_) => ObjectKind::Screen,
            ObjectRef::Window(_) => ObjectKind::Window,
        }
    }

    pub fn parent(&self) -> Option<ObjectRef> {
        match self {
            ObjectRef::Process => None,
            ObjectRef::Display => Some(ObjectRef::Process),
            ObjectRef::Screen(_) => Some(ObjectRef::Display),
            ObjectRef::Window(w) => Some(ObjectRef::Screen(w.screen)),
        }
    }
}

impl From<WindowRef> for ObjectRef {
    fn from(w: WindowRef) -> Self {
        ObjectRef::Window(w)
    }
}

/// State common to every object
#[derive(Debug)]
pub struct ObjectBase {
    kind: ObjectKind,
    parent: Option<ObjectRef>,
    privates: Privates,
}

impl ObjectBase {
    /// Initialize an object with `privates_len` empty slots
    ///
    /// This does not notify plugins; attaching the object to the tree does.
    pub fn init(kind: ObjectKind, parent: Option<ObjectRef>, privates_len: usize) -> Self {
        Self {
            kind,
            parent,
            privates: Privates::with_len(privates_len),
        }
    }

    /// Drop all private state. Slot storage keeps its size.
    pub fn fini(&mut self) {
        self.privates.clear();
        self.parent = None;
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn parent(&self) -> Option<ObjectRef> {
        self.parent
    }

    pub fn privates(&self) -> &Privates {
        &self.privates
    }

    pub fn privates_mut(&mut self) -> &mut Privates {
        &mut self.privates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_chain() {
        let w = ObjectRef::Window(WindowRef::new(1, 0x400001));
        assert_eq!(w.parent(), Some(ObjectRef::Screen(1)));
        assert_eq!(ObjectRef::Screen(1).parent(), Some(ObjectRef::Display));
        assert_eq!(ObjectRef::Display.parent(), Some(ObjectRef::Process));
        assert_eq!(ObjectRef::Process.parent(), None);

        assert_eq!(ObjectKind::Window.parent(), Some(ObjectKind::Screen));
        assert_eq!(w.kind().to_string(), "window");
    }

    #[test]
    fn test_init_fini() {
        let mut obj = ObjectBase::init(ObjectKind::Screen, Some(ObjectRef::Display), 3);
        assert_eq!(obj.privates().len(), 3);
        obj.fini();
        assert_eq!(obj.parent(), None);
        assert_eq!(obj.privates().len(), 3);
    }
}
