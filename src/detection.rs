use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::utils::BoxVec;

/// Axis-aligned box in pixel coordinates, top-left + size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn from_tlwh(tlwh: &BoxVec) -> Self {
        Self::new(tlwh[0], tlwh[1], tlwh[2], tlwh[3])
    }

    pub fn from_tlbr(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self::new(x1, y1, x2 - x1, y2 - y1)
    }

    pub fn tlwh(&self) -> BoxVec {
        BoxVec::new(self.x, self.y, self.width, self.height)
    }

    pub fn tlbr(&self) -> BoxVec {
        BoxVec::new(self.x, self.y, self.x + self.width, self.y + self.height)
    }

    pub fn center(&self) -> Point2<f32> {
        Point2::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// Finite coordinates with a strictly positive size.
    pub fn is_valid(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.width > 0.0
            && self.height > 0.0
    }
}

/// A detected box, optionally carrying a head-center hint.
///
/// Downstream code that wants the anchor has to match on the variant,
/// so a missing hint is never mistaken for a present one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetBox {
    Plain(Rect),
    Anchored { rect: Rect, anchor: Point2<f32> },
}

impl TargetBox {
    pub fn rect(&self) -> &Rect {
        match self {
            TargetBox::Plain(rect) => rect,
            TargetBox::Anchored { rect, .. } => rect,
        }
    }

    pub fn anchor(&self) -> Option<Point2<f32>> {
        match self {
            TargetBox::Plain(_) => None,
            TargetBox::Anchored { anchor, .. } => Some(*anchor),
        }
    }

    /// The point a camera should follow: the anchor if present, else the box center.
    pub fn focus(&self) -> Point2<f32> {
        match self {
            TargetBox::Plain(rect) => rect.center(),
            TargetBox::Anchored { anchor, .. } => *anchor,
        }
    }

    /// Same variant with the box replaced.
    pub fn with_rect(&self, rect: Rect) -> Self {
        match self {
            TargetBox::Plain(_) => TargetBox::Plain(rect),
            TargetBox::Anchored { anchor, .. } => TargetBox::Anchored {
                rect,
                anchor: *anchor,
            },
        }
    }
}

/// A single detection result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: TargetBox,
    pub confidence: f32,
    pub class: String,
    pub class_id: i32,
}

impl Detection {
    pub fn new(bbox: TargetBox, confidence: f32, class: impl Into<String>, class_id: i32) -> Self {
        Self {
            bbox,
            confidence,
            class: class.into(),
            class_id,
        }
    }

    /// Detection without a head hint.
    pub fn plain(rect: Rect, confidence: f32, class_id: i32) -> Self {
        Self::new(TargetBox::Plain(rect), confidence, "", class_id)
    }

    pub fn rect(&self) -> &Rect {
        self.bbox.rect()
    }

    pub fn tlwh(&self) -> BoxVec {
        self.bbox.rect().tlwh()
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }
}

/// A tracked detection for one frame, as handed to the reframing layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub bbox: TargetBox,
    pub confidence: f32,
    pub class: String,
    pub class_id: i32,
    pub track_id: u64,
}

impl BoundingBox {
    pub fn rect(&self) -> &Rect {
        self.bbox.rect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_conversions() {
        let rect = Rect::new(10.0, 20.0, 30.0, 40.0);
        assert_eq!(rect.tlbr(), BoxVec::new(10.0, 20.0, 40.0, 60.0));
        assert_eq!(Rect::from_tlbr(10.0, 20.0, 40.0, 60.0), rect);
        assert_eq!(Rect::from_tlwh(&rect.tlwh()), rect);
        assert_eq!(rect.center(), Point2::new(25.0, 40.0));
        assert_eq!(rect.area(), 1200.0);
    }

    #[test]
    fn test_rect_validity() {
        assert!(Rect::new(0.0, 0.0, 1.0, 1.0).is_valid());
        assert!(!Rect::new(0.0, 0.0, 0.0, 1.0).is_valid());
        assert!(!Rect::new(0.0, 0.0, 5.0, -1.0).is_valid());
        assert!(!Rect::new(f32::NAN, 0.0, 5.0, 5.0).is_valid());
    }

    #[test]
    fn test_target_box_focus() {
        let rect = Rect::new(0.0, 0.0, 100.0, 200.0);
        let plain = TargetBox::Plain(rect);
        let anchored = TargetBox::Anchored {
            rect,
            anchor: Point2::new(50.0, 30.0),
        };

        assert_eq!(plain.focus(), Point2::new(50.0, 100.0));
        assert_eq!(plain.anchor(), None);
        assert_eq!(anchored.focus(), Point2::new(50.0, 30.0));

        let moved = anchored.with_rect(Rect::new(5.0, 5.0, 10.0, 10.0));
        assert_eq!(moved.anchor(), Some(Point2::new(50.0, 30.0)));
        assert_eq!(moved.rect().x, 5.0);
    }
}
