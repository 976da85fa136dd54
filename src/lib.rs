//! strata: core of a compositing window manager
//!
//! The object model (private slots and interception hooks), the window
//! registry, stacking, viewport math and focus-stealing prevention. The
//! `strata` binary drives it from an X11 connection.

pub mod config;
pub mod core;
pub mod error;
pub mod shared;
pub mod wm;
