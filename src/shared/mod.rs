//! Types shared between the core and the display-server driver

pub mod geometry;

pub use geometry::{FrameExtents, Geometry, Strut};
