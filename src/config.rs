use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{ReframeError, ReframeResult};
use crate::reframe::OutputRatio;

/// Top-level settings, usually loaded from a JSON file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tracker: TrackerConfig,
    pub reframing: ReframingConfig,
    pub smoother: SmootherConfig,
}

impl Config {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)?;
        let cfg: Config = serde_json::from_str(&data)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> ReframeResult<()> {
        self.tracker.validate()?;
        self.reframing.validate()?;
        self.smoother.validate()
    }
}

/// Association thresholds and lifecycle limits for the tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Detections at or above this score are high-confidence
    pub track_thresh: f32,
    /// Frames a lost track survives before removal (at 30 fps)
    pub track_buffer: u32,
    /// Gate for high-confidence and reactivation matching (fused cost)
    pub match_thresh: f32,
    /// Boxes smaller than this area are dropped
    pub min_box_area: f32,
    /// Detections below this score are dropped
    pub low_thresh: f32,
    /// Gate for matching against low-confidence detections
    pub second_match_thresh: f32,
    /// Gate for confirming `New` tracks
    pub unconfirmed_match_thresh: f32,
    /// Tracked pairs with `1 - IoU` below this are duplicates. The default
    /// 0.15 means an overlap above 0.85 IoU, not above 0.15 IoU.
    pub duplicate_iou_distance: f32,
    pub frame_rate: f32,
    /// Use `1 - IoU * score` instead of `1 - IoU` for high-confidence stages
    pub fuse_score: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            track_thresh: 0.5,
            track_buffer: 30,
            match_thresh: 0.8,
            min_box_area: 10.0,
            low_thresh: 0.1,
            second_match_thresh: 0.5,
            unconfirmed_match_thresh: 0.7,
            duplicate_iou_distance: 0.15,
            frame_rate: 30.0,
            fuse_score: true,
        }
    }
}

impl TrackerConfig {
    /// Lost-track lifetime in frames, scaled by frame rate.
    pub fn max_time_lost(&self) -> u64 {
        (self.frame_rate / 30.0 * self.track_buffer as f32).round() as u64
    }

    pub fn validate(&self) -> ReframeResult<()> {
        check_unit("track_thresh", self.track_thresh)?;
        check_unit("low_thresh", self.low_thresh)?;
        check_unit("match_thresh", self.match_thresh)?;
        check_unit("second_match_thresh", self.second_match_thresh)?;
        check_unit("unconfirmed_match_thresh", self.unconfirmed_match_thresh)?;
        check_unit("duplicate_iou_distance", self.duplicate_iou_distance)?;
        if self.low_thresh > self.track_thresh {
            return Err(ReframeError::config(
                "low_thresh",
                format!("must not exceed track_thresh ({})", self.track_thresh),
            ));
        }
        if !(self.min_box_area >= 0.0) {
            return Err(ReframeError::config("min_box_area", "must be non-negative"));
        }
        if !(self.frame_rate > 0.0) || !self.frame_rate.is_finite() {
            return Err(ReframeError::config("frame_rate", "must be positive"));
        }
        Ok(())
    }
}

/// Output framing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReframingConfig {
    pub output_ratio: OutputRatio,
    /// Extra room around the subject, fraction of its size, in [0, 0.5]
    pub padding: f64,
    /// 0 follows the subject tightly, 1 gives the calmest camera
    pub smoothness: f64,
    /// Zoom range, as frame width / crop width
    pub min_zoom: f64,
    pub max_zoom: f64,
    /// Fixed subject size `[w, h]` in source pixels
    pub manual_box_size: Option<[f64; 2]>,
    /// Constant shift `[dx, dy]` of the crop center
    pub manual_offset: Option<[f64; 2]>,
}

impl Default for ReframingConfig {
    fn default() -> Self {
        Self {
            output_ratio: OutputRatio::Portrait9x16,
            padding: 0.2,
            smoothness: 0.5,
            min_zoom: 1.0,
            max_zoom: 4.0,
            manual_box_size: None,
            manual_offset: None,
        }
    }
}

impl ReframingConfig {
    pub fn validate(&self) -> ReframeResult<()> {
        if !(0.0..=0.5).contains(&self.padding) {
            return Err(ReframeError::config("padding", "must be within [0, 0.5]"));
        }
        if !(0.0..=1.0).contains(&self.smoothness) {
            return Err(ReframeError::config("smoothness", "must be within [0, 1]"));
        }
        if !(self.min_zoom >= 1.0) || !self.min_zoom.is_finite() {
            return Err(ReframeError::config("min_zoom", "must be at least 1"));
        }
        if !(self.max_zoom >= self.min_zoom) || !self.max_zoom.is_finite() {
            return Err(ReframeError::config("max_zoom", "must be finite and not below min_zoom"));
        }
        if let Some([w, h]) = self.manual_box_size {
            if !(w > 0.0 && h > 0.0) || !w.is_finite() || !h.is_finite() {
                return Err(ReframeError::config("manual_box_size", "must be positive"));
            }
        }
        if let Some([dx, dy]) = self.manual_offset {
            if !dx.is_finite() || !dy.is_finite() {
                return Err(ReframeError::config("manual_offset", "must be finite"));
            }
        }
        Ok(())
    }
}

/// Tuning constants for the trajectory smoother.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmootherConfig {
    /// Catmull-Rom tension, 0.5 is the classic spline
    pub tension: f64,
    /// How far ahead of the subject the curve leans, in seconds
    pub lead_secs: f64,
    /// Key point spacing at smoothness 0 and 1
    pub min_key_interval_secs: f64,
    pub max_key_interval_secs: f64,
    /// Direction change that forces an early key point
    pub turn_angle_deg: f64,
    /// Speed relative to the average above which motion counts as fast
    pub fast_motion_ratio: f64,
    /// Speed relative to the average below which motion counts as static
    pub slow_motion_ratio: f64,
    /// Largest median window, in frames (odd)
    pub max_median_window: usize,
    /// Residual jitter relative to average motion that triggers Gaussian smoothing
    pub jitter_ratio: f64,
    pub gaussian_sigma: f64,
    /// Confidence multiplier per frame away from a real detection
    pub gap_confidence_decay: f64,
}

impl Default for SmootherConfig {
    fn default() -> Self {
        Self {
            tension: 0.5,
            lead_secs: 0.1,
            min_key_interval_secs: 0.5,
            max_key_interval_secs: 2.0,
            turn_angle_deg: 45.0,
            fast_motion_ratio: 1.5,
            slow_motion_ratio: 0.5,
            max_median_window: 9,
            jitter_ratio: 0.5,
            gaussian_sigma: 1.0,
            gap_confidence_decay: 0.9,
        }
    }
}

impl SmootherConfig {
    pub fn validate(&self) -> ReframeResult<()> {
        if !(0.0..=1.0).contains(&self.tension) {
            return Err(ReframeError::config("tension", "must be within [0, 1]"));
        }
        if !(self.lead_secs >= 0.0) || !self.lead_secs.is_finite() {
            return Err(ReframeError::config("lead_secs", "must be non-negative"));
        }
        if !(self.min_key_interval_secs > 0.0) || !(self.max_key_interval_secs >= self.min_key_interval_secs) {
            return Err(ReframeError::config(
                "max_key_interval_secs",
                "key intervals must be positive and ordered",
            ));
        }
        if !(self.turn_angle_deg > 0.0 && self.turn_angle_deg < 180.0) {
            return Err(ReframeError::config("turn_angle_deg", "must be within (0, 180)"));
        }
        if !(self.slow_motion_ratio > 0.0 && self.fast_motion_ratio > self.slow_motion_ratio) {
            return Err(ReframeError::config(
                "fast_motion_ratio",
                "must exceed slow_motion_ratio, both positive",
            ));
        }
        if self.max_median_window < 3 || self.max_median_window % 2 == 0 {
            return Err(ReframeError::config("max_median_window", "must be odd and at least 3"));
        }
        if !(self.jitter_ratio > 0.0) || !(self.gaussian_sigma > 0.0) {
            return Err(ReframeError::config("jitter_ratio", "jitter ratio and sigma must be positive"));
        }
        if !(self.gap_confidence_decay > 0.0 && self.gap_confidence_decay <= 1.0) {
            return Err(ReframeError::config("gap_confidence_decay", "must be within (0, 1]"));
        }
        Ok(())
    }
}

fn check_unit(field: &'static str, value: f32) -> ReframeResult<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ReframeError::config(field, "must be within [0, 1]"));
    }
    Ok(())
}
