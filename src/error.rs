//! Error types
//!
//! Typed failures of the object model and plugin stack. Everything that
//! talks to the display server uses `anyhow` instead.

use thiserror::Error;

use crate::core::object::ObjectKind;

/// Private slot allocation and access failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PrivateError {
    /// The index table for this kind cannot grow any further
    #[error("private index table for {kind} objects is exhausted")]
    Exhausted { kind: ObjectKind },

    /// A key was used on an object of another kind
    #[error("private key for {expected} objects used on a {found} object")]
    WrongKind { expected: ObjectKind, found: ObjectKind },

    /// The slot does not exist on this object
    #[error("private slot {index} is out of range ({len} slots)")]
    OutOfRange { index: usize, len: usize },

    /// The object the slot belongs to is not in the tree
    #[error("object {0} not found")]
    NoSuchObject(String),
}

/// Plugin stack failures
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("plugin {0} is already loaded")]
    AlreadyLoaded(String),

    #[error("plugin {0} is not loaded")]
    NotLoaded(String),

    /// `Plugin::init` failed; nothing of the plugin stays installed
    #[error("plugin {name} failed to initialize")]
    InitFailed {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    /// `Plugin::init_object` failed for one object; the plugin was rolled back
    #[error("plugin {name} failed to initialize object {object}")]
    InitObjectFailed {
        name: String,
        object: String,
        #[source]
        source: anyhow::Error,
    },

    /// A reorder request did not name every loaded plugin exactly once
    #[error("plugin order must name every loaded plugin exactly once")]
    BadOrder,
}

/// Window match expression parse failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MatchError {
    #[error("empty match expression")]
    Empty,

    #[error("unexpected end of match expression")]
    UnexpectedEnd,

    #[error("unexpected {found:?} at offset {offset}")]
    Unexpected { offset: usize, found: String },

    #[error("unknown match key {0:?}")]
    UnknownKey(String),

    #[error("bad value {value:?} for match key {key}")]
    BadValue { key: String, value: String },
}
