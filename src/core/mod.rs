//! Core object model: objects, private slots and interception hooks

pub mod hook;
pub mod object;
pub mod privates;

pub use hook::{Chain, Hook, Next, WrapToken};
pub use object::{ObjectBase, ObjectKind, ObjectRef, ScreenId, WindowRef, Xid};
pub use privates::{PrivateIndexTable, PrivateKey, Privates};
