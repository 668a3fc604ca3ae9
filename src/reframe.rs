//! Crop geometry for reframing a source frame to a new aspect ratio.
//!
//! The crop size is computed once per subject from its representative box
//! size; per-frame work only moves the crop center.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::ReframingConfig;
use crate::error::{ReframeError, ReframeResult};

/// Smallest box-to-frame area ratio considered when sizing the padding.
const MIN_AREA_RATIO: f64 = 1e-4;
/// Box-to-frame area ratio that receives exactly the configured padding.
const REFERENCE_AREA_RATIO: f64 = 0.1;
const MIN_SIZE_BOOST: f64 = 0.75;
const MAX_SIZE_BOOST: f64 = 2.0;

/// Supported output aspect ratios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputRatio {
    #[serde(rename = "16:9")]
    Landscape16x9,
    #[serde(rename = "9:16")]
    Portrait9x16,
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "4:3")]
    Landscape4x3,
    #[serde(rename = "3:4")]
    Portrait3x4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Portrait,
    Landscape,
    Square,
}

impl OutputRatio {
    pub const ALL: [OutputRatio; 5] = [
        OutputRatio::Landscape16x9,
        OutputRatio::Portrait9x16,
        OutputRatio::Square,
        OutputRatio::Landscape4x3,
        OutputRatio::Portrait3x4,
    ];

    /// `(width, height)` terms of the ratio.
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            OutputRatio::Landscape16x9 => (16, 9),
            OutputRatio::Portrait9x16 => (9, 16),
            OutputRatio::Square => (1, 1),
            OutputRatio::Landscape4x3 => (4, 3),
            OutputRatio::Portrait3x4 => (3, 4),
        }
    }

    /// Returns width/height as float.
    pub fn ratio(&self) -> f64 {
        let (w, h) = self.dimensions();
        w as f64 / h as f64
    }

    pub fn orientation(&self) -> Orientation {
        let (w, h) = self.dimensions();
        match w.cmp(&h) {
            std::cmp::Ordering::Less => Orientation::Portrait,
            std::cmp::Ordering::Greater => Orientation::Landscape,
            std::cmp::Ordering::Equal => Orientation::Square,
        }
    }
}

impl fmt::Display for OutputRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (w, h) = self.dimensions();
        write!(f, "{}:{}", w, h)
    }
}

impl FromStr for OutputRatio {
    type Err = ReframeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        OutputRatio::ALL
            .iter()
            .copied()
            .find(|r| r.to_string() == trimmed)
            .ok_or_else(|| ReframeError::UnknownOutputRatio(s.to_string()))
    }
}

impl Orientation {
    /// Extra room given to each orientation; tall crops cut off more context.
    fn padding_factor(&self) -> f64 {
        match self {
            Orientation::Portrait => 1.15,
            Orientation::Square => 1.05,
            Orientation::Landscape => 1.0,
        }
    }
}

/// Crop size shared by every frame of one reframed sequence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropGeometry {
    pub width: f64,
    pub height: f64,
    /// Frame width over crop width
    pub scale: f64,
}

/// Camera state for one output frame, in source pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameTransform {
    /// Crop center
    pub x: f64,
    pub y: f64,
    pub scale: f64,
    /// Always 0 for now
    pub rotation: f64,
}

/// Axis-aligned crop rectangle, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl CropRect {
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// True if the rectangle lies inside `[0, w] x [0, h]`, up to `tolerance`.
    pub fn fits_within(&self, frame_width: f64, frame_height: f64, tolerance: f64) -> bool {
        self.x >= -tolerance
            && self.y >= -tolerance
            && self.right() <= frame_width + tolerance
            && self.bottom() <= frame_height + tolerance
    }
}

impl FrameTransform {
    /// Crop rectangle of size `geometry` centered on this transform.
    pub fn crop_rect(&self, geometry: &CropGeometry) -> CropRect {
        CropRect {
            x: self.x - geometry.width / 2.0,
            y: self.y - geometry.height / 2.0,
            width: geometry.width,
            height: geometry.height,
        }
    }
}

/// Move a crop center so that a `crop_w x crop_h` crop stays inside the frame.
pub fn clamp_center(
    x: f64,
    y: f64,
    crop_w: f64,
    crop_h: f64,
    frame_w: f64,
    frame_h: f64,
) -> (f64, f64) {
    let half_w = crop_w / 2.0;
    let half_h = crop_h / 2.0;
    let x = x.clamp(half_w, (frame_w - half_w).max(half_w));
    let y = y.clamp(half_h, (frame_h - half_h).max(half_h));
    (x, y)
}

/// Compute the crop for a subject of `target_size` (`[w, h]`) in a
/// `frame_size` (`(w, h)`) source.
///
/// Smaller subjects get proportionally more padding. The result matches
/// `ratio` exactly, fits inside the frame, and keeps `scale` within
/// `[min_zoom, max_zoom]` whenever the frame allows it.
pub fn calculate_crop(
    target_size: [f64; 2],
    frame_size: (u32, u32),
    ratio: OutputRatio,
    config: &ReframingConfig,
) -> ReframeResult<CropGeometry> {
    let (fw_px, fh_px) = frame_size;
    if fw_px == 0 || fh_px == 0 {
        return Err(ReframeError::InvalidFrameSize {
            width: fw_px,
            height: fh_px,
        });
    }
    let fw = fw_px as f64;
    let fh = fh_px as f64;
    let r = ratio.ratio();

    let sanitize = |v: f64, fallback: f64| if v.is_finite() && v > 0.0 { v.max(1.0) } else { fallback };
    let tw = sanitize(target_size[0], fw);
    let th = sanitize(target_size[1], fh);

    let area_ratio = (tw * th / (fw * fh)).clamp(MIN_AREA_RATIO, 1.0);
    let size_boost = (REFERENCE_AREA_RATIO / area_ratio)
        .sqrt()
        .clamp(MIN_SIZE_BOOST, MAX_SIZE_BOOST);
    let multiplier = (1.0 + 2.0 * config.padding * size_boost) * ratio.orientation().padding_factor();

    let padded_w = tw * multiplier;
    let padded_h = th * multiplier;

    // Smallest crop of the output ratio that contains the padded box
    let mut width = if padded_w / padded_h > r { padded_w } else { padded_h * r };

    // Largest crop of the output ratio that fits the frame
    let max_width = fw.min(fh * r);
    width = width.min(max_width);

    let min_feasible_scale = fw / max_width;
    let lo = config.min_zoom.max(min_feasible_scale);
    let hi = config.max_zoom.max(lo);
    let scale = (fw / width).clamp(lo, hi);

    let width = fw / scale;
    Ok(CropGeometry {
        width,
        height: width / r,
        scale,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn config(padding: f64) -> ReframingConfig {
        ReframingConfig {
            padding,
            ..ReframingConfig::default()
        }
    }

    #[test]
    fn test_output_ratio_parsing() {
        assert_eq!("9:16".parse::<OutputRatio>().unwrap(), OutputRatio::Portrait9x16);
        assert_eq!(" 4:3 ".parse::<OutputRatio>().unwrap(), OutputRatio::Landscape4x3);
        assert!(matches!(
            "21:9".parse::<OutputRatio>(),
            Err(ReframeError::UnknownOutputRatio(_))
        ));
        for r in OutputRatio::ALL {
            assert_eq!(r.to_string().parse::<OutputRatio>().unwrap(), r);
        }
        assert_eq!(OutputRatio::Square.orientation(), Orientation::Square);
        assert_eq!(OutputRatio::Portrait3x4.orientation(), Orientation::Portrait);
    }

    #[test]
    fn test_output_ratio_serde_uses_ratio_strings() {
        let json = serde_json::to_string(&OutputRatio::Landscape16x9).unwrap();
        assert_eq!(json, "\"16:9\"");
        let parsed: OutputRatio = serde_json::from_str("\"3:4\"").unwrap();
        assert_eq!(parsed, OutputRatio::Portrait3x4);
    }

    #[test]
    fn test_crop_matches_ratio_and_fits_frame() {
        let frame = (1920, 1080);
        for ratio in OutputRatio::ALL {
            for &size in &[[20.0, 40.0], [100.0, 200.0], [600.0, 900.0], [1920.0, 1080.0]] {
                for &padding in &[0.0, 0.2, 0.5] {
                    let crop = calculate_crop(size, frame, ratio, &config(padding)).unwrap();
                    assert_relative_eq!(crop.width / crop.height, ratio.ratio(), epsilon = 1e-2);
                    assert!(crop.width <= 1920.0 + 1e-9, "{:?} {:?}", ratio, size);
                    assert!(crop.height <= 1080.0 + 1e-9, "{:?} {:?}", ratio, size);
                    assert_relative_eq!(crop.scale, 1920.0 / crop.width, epsilon = 1e-9);
                }
            }
        }
    }

    #[test]
    fn test_zoom_is_clamped() {
        let cfg = ReframingConfig {
            output_ratio: OutputRatio::Landscape16x9,
            max_zoom: 3.0,
            ..ReframingConfig::default()
        };
        // A tiny subject would need a huge zoom
        let crop = calculate_crop([10.0, 10.0], (1920, 1080), OutputRatio::Landscape16x9, &cfg).unwrap();
        assert_relative_eq!(crop.scale, 3.0);
        assert_relative_eq!(crop.width, 640.0);
        assert_relative_eq!(crop.height, 360.0);

        // A full-frame subject is limited by the frame itself
        let crop = calculate_crop([1920.0, 1080.0], (1920, 1080), OutputRatio::Landscape16x9, &cfg).unwrap();
        assert_relative_eq!(crop.scale, 1.0);
    }

    #[test]
    fn test_portrait_ratio_lifts_min_zoom() {
        // A 9:16 crop can be at most 607.5 px wide in a 1920x1080 frame
        let crop = calculate_crop([1920.0, 1080.0], (1920, 1080), OutputRatio::Portrait9x16, &config(0.2)).unwrap();
        assert_relative_eq!(crop.height, 1080.0, epsilon = 1e-9);
        assert_relative_eq!(crop.width, 607.5, epsilon = 1e-9);
    }

    #[test]
    fn test_small_subjects_get_more_padding() {
        let cfg = ReframingConfig {
            max_zoom: 100.0,
            ..config(0.2)
        };
        let small = calculate_crop([40.0, 80.0], (1920, 1080), OutputRatio::Square, &cfg).unwrap();
        let large = calculate_crop([400.0, 800.0], (1920, 1080), OutputRatio::Square, &cfg).unwrap();
        assert!(small.height / 80.0 > large.height / 800.0);
    }

    #[test]
    fn test_calculate_crop_is_idempotent() {
        let cfg = config(0.3);
        let a = calculate_crop([123.4, 321.0], (1280, 720), OutputRatio::Portrait3x4, &cfg).unwrap();
        let b = calculate_crop([123.4, 321.0], (1280, 720), OutputRatio::Portrait3x4, &cfg).unwrap();
        assert_eq!(a.width.to_bits(), b.width.to_bits());
        assert_eq!(a.height.to_bits(), b.height.to_bits());
        assert_eq!(a.scale.to_bits(), b.scale.to_bits());
    }

    #[test]
    fn test_invalid_frame_size() {
        let err = calculate_crop([10.0, 10.0], (0, 1080), OutputRatio::Square, &config(0.2)).unwrap_err();
        assert!(matches!(err, ReframeError::InvalidFrameSize { width: 0, height: 1080 }));
    }

    #[test]
    fn test_clamp_center_keeps_crop_inside() {
        let (x, y) = clamp_center(10.0, 2000.0, 400.0, 300.0, 1920.0, 1080.0);
        assert_relative_eq!(x, 200.0);
        assert_relative_eq!(y, 930.0);

        let t = FrameTransform { x, y, scale: 4.8, rotation: 0.0 };
        let geometry = CropGeometry { width: 400.0, height: 300.0, scale: 4.8 };
        let rect = t.crop_rect(&geometry);
        assert!(rect.fits_within(1920.0, 1080.0, 1e-9));
        assert_relative_eq!(rect.bottom(), 1080.0);
    }
}
