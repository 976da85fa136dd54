//! Window geometry shared between the core and the X11 driver
//!
//! Width and height are kept signed so that offset arithmetic (viewport
//! moves, work area constraints) never has to cast back and forth.

/// Window geometry, excluding the border
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Geometry {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Geometry {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    /// Center point of the window including a border of `border_width`
    pub fn center(&self, border_width: i32) -> (i32, i32) {
        let width = self.width + border_width * 2;
        let height = self.height + border_width * 2;
        (self.x + (width >> 1), self.y + (height >> 1))
    }

    /// True when any part of `self` overlaps the `width` x `height` area at the origin
    pub fn overlaps_origin_area(&self, width: i32, height: i32) -> bool {
        self.x < width && self.right() > 0 && self.y < height && self.bottom() > 0
    }

    pub fn translated(&self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..*self
        }
    }
}

/// Size of the decorations around a client (`_NET_FRAME_EXTENTS`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameExtents {
    pub left: i32,
    pub right: i32,
    pub top: i32,
    pub bottom: i32,
}

/// Screen edges reserved by a dock or panel (`_NET_WM_STRUT`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Strut {
    pub left: i32,
    pub right: i32,
    pub top: i32,
    pub bottom: i32,
}

impl Strut {
    pub fn is_empty(&self) -> bool {
        self.left == 0 && self.right == 0 && self.top == 0 && self.bottom == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center_includes_border() {
        let g = Geometry::new(10, 20, 100, 50);
        assert_eq!(g.center(0), (60, 45));
        assert_eq!(g.center(2), (62, 47));
    }

    #[test]
    fn test_overlaps_origin_area() {
        assert!(Geometry::new(-10, -10, 20, 20).overlaps_origin_area(100, 100));
        assert!(!Geometry::new(100, 0, 20, 20).overlaps_origin_area(100, 100));
        assert!(!Geometry::new(-20, 0, 20, 20).overlaps_origin_area(100, 100));
    }
}
