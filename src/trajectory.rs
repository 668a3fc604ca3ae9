//! Camera path smoothing for one tracked subject.
//!
//! Turns the frame-by-frame detection history of a single track into one
//! [`FrameTransform`] per output frame:
//!
//! 1. fill frames without a detection (interpolate between known boxes,
//!    damped constant-velocity extrapolation before the first and after the
//!    last one)
//! 2. remove single-frame jitter with a 3-point median
//! 3. pick sparse key points, spaced by the smoothness setting and placed
//!    early on sharp turns
//! 4. join the key points with Catmull-Rom style cubic Bezier segments that
//!    lean slightly ahead of the motion
//! 5. stabilize the dense curve with a motion-adaptive median and a local
//!    Gaussian pass where jitter remains
//! 6. size one crop for the whole sequence and clamp every center so the
//!    crop stays inside the frame
//!
//! First and last frames are never smoothed.

use nalgebra::{Point2, Vector2};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::config::{ReframingConfig, SmootherConfig};
use crate::detection::BoundingBox;
use crate::error::{ReframeError, ReframeResult};
use crate::reframe::{calculate_crop, clamp_center, CropGeometry, FrameTransform};

/// Shorter moves do not count as a direction for turn detection (px)
const MIN_TURN_DISTANCE: f64 = 2.0;
/// Residual jitter below this never triggers Gaussian smoothing (px)
const MIN_JITTER: f64 = 0.5;
/// Longest clip a plan is built for, about 92 hours at 30 fps
pub const MAX_TOTAL_FRAMES: u64 = 10_000_000;
const FAST_MEDIAN_WINDOW: usize = 3;
const DEFAULT_MEDIAN_WINDOW: usize = 5;

/// One frame of the gap-filled subject track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackSample {
    /// Head anchor or box center
    pub position: Point2<f64>,
    /// Box width and height
    pub size: Vector2<f64>,
    pub confidence: f64,
    /// False for frames reconstructed from neighbouring detections
    pub observed: bool,
}

/// Smoothed path together with the crop size it was clamped for.
#[derive(Debug, Clone, PartialEq)]
pub struct ReframePlan {
    pub geometry: CropGeometry,
    pub transforms: BTreeMap<u64, FrameTransform>,
}

pub struct TrajectorySmoother {
    reframing: ReframingConfig,
    config: SmootherConfig,
}

impl TrajectorySmoother {
    pub fn new(reframing: ReframingConfig, config: SmootherConfig) -> ReframeResult<Self> {
        reframing.validate()?;
        config.validate()?;
        Ok(Self { reframing, config })
    }

    pub fn reframing(&self) -> &ReframingConfig {
        &self.reframing
    }

    pub fn config(&self) -> &SmootherConfig {
        &self.config
    }

    /// Per-frame transforms for every frame in `[0, total_frames)`.
    ///
    /// Returns an empty map when the history holds fewer than two
    /// detections inside that range.
    pub fn smooth(
        &self,
        history: &BTreeMap<u64, BoundingBox>,
        frame_size: (u32, u32),
        total_frames: u64,
        fps: f64,
        initial_target_size: Option<[f64; 2]>,
    ) -> ReframeResult<BTreeMap<u64, FrameTransform>> {
        Ok(self
            .plan(history, frame_size, total_frames, fps, initial_target_size)?
            .map(|plan| plan.transforms)
            .unwrap_or_default())
    }

    /// Like [`smooth`](Self::smooth), but also returns the crop geometry.
    pub fn plan(
        &self,
        history: &BTreeMap<u64, BoundingBox>,
        frame_size: (u32, u32),
        total_frames: u64,
        fps: f64,
        initial_target_size: Option<[f64; 2]>,
    ) -> ReframeResult<Option<ReframePlan>> {
        let (width, height) = frame_size;
        if width == 0 || height == 0 {
            return Err(ReframeError::InvalidFrameSize { width, height });
        }
        if !(fps > 0.0) || !fps.is_finite() {
            return Err(ReframeError::config("fps", "must be positive"));
        }
        if total_frames > MAX_TOTAL_FRAMES {
            return Err(ReframeError::config(
                "total_frames",
                format!("{} exceeds the limit of {}", total_frames, MAX_TOTAL_FRAMES),
            ));
        }

        let observed = history.range(..total_frames).count();
        if observed < 2 {
            warn!(observed, total_frames, "not enough detections to build a camera path");
            return Ok(None);
        }

        let samples = self.fill_gaps(history, total_frames);
        let raw: Vec<Point2<f64>> = samples.iter().map(|s| s.position).collect();
        let path = self.smooth_path(&raw, fps);

        let target_size = self
            .reframing
            .manual_box_size
            .or(initial_target_size)
            .unwrap_or_else(|| median_size(history, total_frames));
        let geometry = calculate_crop(target_size, frame_size, self.reframing.output_ratio, &self.reframing)?;
        debug!(
            crop_width = geometry.width,
            crop_height = geometry.height,
            scale = geometry.scale,
            "crop geometry"
        );

        let [dx, dy] = self.reframing.manual_offset.unwrap_or([0.0, 0.0]);
        let (fw, fh) = (width as f64, height as f64);
        let transforms: BTreeMap<u64, FrameTransform> = path
            .iter()
            .enumerate()
            .map(|(frame, p)| {
                let (x, y) = clamp_center(p.x + dx, p.y + dy, geometry.width, geometry.height, fw, fh);
                let transform = FrameTransform {
                    x,
                    y,
                    scale: geometry.scale,
                    rotation: 0.0,
                };
                (frame as u64, transform)
            })
            .collect();

        info!(
            frames = transforms.len(),
            observed,
            filled = samples.iter().filter(|s| !s.observed).count(),
            "camera path ready"
        );
        Ok(Some(ReframePlan { geometry, transforms }))
    }

    /// Dense per-frame samples for `[0, total_frames)`.
    ///
    /// The head anchor is followed only when every observed box has one.
    pub fn fill_gaps(&self, history: &BTreeMap<u64, BoundingBox>, total_frames: u64) -> Vec<TrackSample> {
        let use_anchor = history
            .range(..total_frames)
            .all(|(_, b)| b.bbox.anchor().is_some());
        let known: Vec<(u64, TrackSample)> = history
            .range(..total_frames)
            .map(|(&frame, b)| (frame, observed_sample(b, use_anchor)))
            .collect();
        if known.is_empty() {
            return Vec::new();
        }

        let decay = self.config.gap_confidence_decay;
        let mut samples = Vec::with_capacity(total_frames.min(MAX_TOTAL_FRAMES) as usize);
        let mut next = 0;
        for frame in 0..total_frames {
            while next < known.len() && known[next].0 < frame {
                next += 1;
            }
            let sample = if next < known.len() && known[next].0 == frame {
                known[next].1
            } else if known.len() == 1 {
                let edge = known[0];
                hold(edge.1, edge.0.abs_diff(frame), decay)
            } else if next == 0 {
                extrapolate(known[0], known[1], known[0].0 - frame, decay)
            } else if next == known.len() {
                let last = known.len() - 1;
                extrapolate(known[last], known[last - 1], frame - known[last].0, decay)
            } else {
                interpolate(known[next - 1], known[next], frame, decay)
            };
            samples.push(sample);
        }
        samples
    }

    /// Smoothing steps on a dense path, one point per frame.
    pub fn smooth_path(&self, raw: &[Point2<f64>], fps: f64) -> Vec<Point2<f64>> {
        if raw.len() < 3 {
            return raw.to_vec();
        }
        let filtered = median3(raw);
        let keys = self.key_points(&filtered, fps);
        debug!(frames = raw.len(), keys = keys.len(), "key points selected");
        let curve = self.bezier_path(&filtered, &keys, fps);
        self.stabilize(&curve)
    }

    /// Key frame indices, always including the first and last frame.
    fn key_points(&self, path: &[Point2<f64>], fps: f64) -> Vec<usize> {
        let n = path.len();
        let cfg = &self.config;
        let interval_secs = cfg.min_key_interval_secs
            + (cfg.max_key_interval_secs - cfg.min_key_interval_secs) * self.reframing.smoothness;
        let interval = ((interval_secs * fps).round() as usize).max(1);
        let span = (interval / 4).max(2);
        let turn_cos = cfg.turn_angle_deg.to_radians().cos();

        let mut keys = vec![0];
        let mut last = 0;
        for i in 1..n - 1 {
            if i - last >= interval {
                keys.push(i);
                last = i;
                continue;
            }
            if i - last < span || i < span || i + span > n - 1 {
                continue;
            }
            let incoming = path[i] - path[i - span];
            let outgoing = path[i + span] - path[i];
            let (a, b) = (incoming.norm(), outgoing.norm());
            if a > MIN_TURN_DISTANCE && b > MIN_TURN_DISTANCE && incoming.dot(&outgoing) / (a * b) < turn_cos {
                keys.push(i);
                last = i;
            }
        }
        if last != n - 1 {
            keys.push(n - 1);
        }
        keys
    }

    /// Evaluate the Bezier spline through the key points at every frame.
    fn bezier_path(&self, path: &[Point2<f64>], keys: &[usize], fps: f64) -> Vec<Point2<f64>> {
        let m = keys.len();
        let points: Vec<Point2<f64>> = keys.iter().map(|&k| path[k]).collect();

        // Catmull-Rom velocity at each key, px per frame
        let velocity: Vec<Vector2<f64>> = (0..m)
            .map(|k| {
                let (a, b) = if k == 0 {
                    (0, 1)
                } else if k == m - 1 {
                    (m - 2, m - 1)
                } else {
                    (k - 1, k + 1)
                };
                (points[b] - points[a]) / (keys[b] - keys[a]) as f64
            })
            .collect();

        // Interior keys lean ahead of the subject, at most halfway to a neighbour
        let lead_frames = self.config.lead_secs * fps;
        let anchors: Vec<Point2<f64>> = (0..m)
            .map(|k| {
                if k == 0 || k == m - 1 {
                    return points[k];
                }
                let mut shift = velocity[k] * lead_frames;
                let limit = 0.5 * (points[k] - points[k - 1]).norm().min((points[k + 1] - points[k]).norm());
                let len = shift.norm();
                if len > limit && len > 0.0 {
                    shift *= limit / len;
                }
                points[k] + shift
            })
            .collect();

        let tangents: Vec<Vector2<f64>> = velocity.iter().map(|v| v * (2.0 * self.config.tension)).collect();

        let mut out = path.to_vec();
        for s in 0..m - 1 {
            let (f0, f1) = (keys[s], keys[s + 1]);
            let span = (f1 - f0) as f64;
            let p0 = anchors[s];
            let p3 = anchors[s + 1];
            let c1 = p0 + tangents[s] * (span / 3.0);
            let c2 = p3 - tangents[s + 1] * (span / 3.0);
            for (frame, point) in out.iter_mut().enumerate().take(f1 + 1).skip(f0) {
                let t = (frame - f0) as f64 / span;
                *point = cubic_bezier(&p0, &c1, &c2, &p3, t);
            }
        }
        out
    }

    /// Motion-adaptive median, then Gaussian smoothing where jitter remains.
    fn stabilize(&self, curve: &[Point2<f64>]) -> Vec<Point2<f64>> {
        let n = curve.len();
        if n < 3 {
            return curve.to_vec();
        }

        let speeds = speeds(curve);
        let avg_speed = mean(&speeds);
        let mut medianed = curve.to_vec();
        for i in 1..n - 1 {
            let window = self.median_window(speeds[i], avg_speed);
            let half = (window / 2).min(i).min(n - 1 - i);
            let slice = &curve[i - half..=i + half];
            let xs: Vec<f64> = slice.iter().map(|p| p.x).collect();
            let ys: Vec<f64> = slice.iter().map(|p| p.y).collect();
            medianed[i] = Point2::new(median(&xs), median(&ys));
        }

        let motion = mean(&speeds_of(&medianed));
        let threshold = (self.config.jitter_ratio * motion).max(MIN_JITTER);
        let sigma = self.config.gaussian_sigma;
        let radius = (3.0 * sigma).ceil() as usize;

        let mut out = medianed.clone();
        let mut smoothed = 0usize;
        for i in 1..n - 1 {
            let jitter = (medianed[i - 1].coords - medianed[i].coords * 2.0 + medianed[i + 1].coords).norm();
            if jitter <= threshold {
                continue;
            }
            let r = radius.min(i).min(n - 1 - i);
            let mut acc = Vector2::zeros();
            let mut total = 0.0;
            for j in (i - r)..=(i + r) {
                let d = j as f64 - i as f64;
                let w = (-(d * d) / (2.0 * sigma * sigma)).exp();
                acc += medianed[j].coords * w;
                total += w;
            }
            out[i] = Point2::from(acc / total);
            smoothed += 1;
        }
        debug!(smoothed, threshold, "gaussian pass");
        out
    }

    fn median_window(&self, speed: f64, avg_speed: f64) -> usize {
        let max = self.config.max_median_window;
        if avg_speed < 1e-9 {
            return max;
        }
        let ratio = speed / avg_speed;
        if ratio > self.config.fast_motion_ratio {
            FAST_MEDIAN_WINDOW
        } else if ratio < self.config.slow_motion_ratio {
            max
        } else {
            DEFAULT_MEDIAN_WINDOW.min(max)
        }
    }
}

fn observed_sample(b: &BoundingBox, use_anchor: bool) -> TrackSample {
    let rect = b.rect();
    let focus = if use_anchor { b.bbox.focus() } else { rect.center() };
    TrackSample {
        position: Point2::new(focus.x as f64, focus.y as f64),
        size: Vector2::new(rect.width as f64, rect.height as f64),
        confidence: b.confidence as f64,
        observed: true,
    }
}

fn hold(sample: TrackSample, distance: u64, decay: f64) -> TrackSample {
    TrackSample {
        confidence: sample.confidence * decayed(decay, distance),
        observed: false,
        ..sample
    }
}

/// `decay^steps` without narrowing the exponent.
fn decayed(decay: f64, steps: u64) -> f64 {
    decay.powf(steps as f64)
}

/// Sum of `decay^1 + ... + decay^steps`: distance covered by a velocity that
/// shrinks by `decay` every frame.
fn damped_steps(decay: f64, steps: u64) -> f64 {
    if decay >= 1.0 {
        steps as f64
    } else {
        decay * (1.0 - decayed(decay, steps)) / (1.0 - decay)
    }
}

/// Continue away from `inner` past `edge` for `distance` frames.
fn extrapolate(edge: (u64, TrackSample), inner: (u64, TrackSample), distance: u64, decay: f64) -> TrackSample {
    let span = edge.0.abs_diff(inner.0) as f64;
    let velocity = (edge.1.position - inner.1.position) / span;
    TrackSample {
        position: edge.1.position + velocity * damped_steps(decay, distance),
        ..hold(edge.1, distance, decay)
    }
}

fn interpolate(a: (u64, TrackSample), b: (u64, TrackSample), frame: u64, decay: f64) -> TrackSample {
    let t = (frame - a.0) as f64 / (b.0 - a.0) as f64;
    let nearest = (frame - a.0).min(b.0 - frame);
    let confidence = a.1.confidence + (b.1.confidence - a.1.confidence) * t;
    TrackSample {
        position: a.1.position + (b.1.position - a.1.position) * t,
        size: a.1.size + (b.1.size - a.1.size) * t,
        confidence: confidence * decayed(decay, nearest),
        observed: false,
    }
}

fn median_size(history: &BTreeMap<u64, BoundingBox>, total_frames: u64) -> [f64; 2] {
    let (ws, hs): (Vec<f64>, Vec<f64>) = history
        .range(..total_frames)
        .map(|(_, b)| (b.rect().width as f64, b.rect().height as f64))
        .unzip();
    [median(&ws), median(&hs)]
}

/// Centered 3-point median; the end points are kept.
fn median3(path: &[Point2<f64>]) -> Vec<Point2<f64>> {
    let mut out = path.to_vec();
    for i in 1..path.len().saturating_sub(1) {
        let (a, b, c) = (path[i - 1], path[i], path[i + 1]);
        out[i] = Point2::new(median_of_three(a.x, b.x, c.x), median_of_three(a.y, b.y, c.y));
    }
    out
}

fn median_of_three(a: f64, b: f64, c: f64) -> f64 {
    a.min(b).max(a.max(b).min(c))
}

fn cubic_bezier(p0: &Point2<f64>, c1: &Point2<f64>, c2: &Point2<f64>, p3: &Point2<f64>, t: f64) -> Point2<f64> {
    let u = 1.0 - t;
    Point2::from(
        p0.coords * (u * u * u) + c1.coords * (3.0 * u * u * t) + c2.coords * (3.0 * u * t * t) + p3.coords * (t * t * t),
    )
}

/// Speed at every point, px per frame (central difference inside).
fn speeds(path: &[Point2<f64>]) -> Vec<f64> {
    let n = path.len();
    (0..n)
        .map(|i| {
            if i == 0 {
                (path[1] - path[0]).norm()
            } else if i == n - 1 {
                (path[n - 1] - path[n - 2]).norm()
            } else {
                (path[i + 1] - path[i - 1]).norm() / 2.0
            }
        })
        .collect()
}

fn speeds_of(path: &[Point2<f64>]) -> Vec<f64> {
    if path.len() < 2 {
        return vec![0.0; path.len()];
    }
    speeds(path)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{Rect, TargetBox};
    use crate::reframe::OutputRatio;
    use approx::assert_relative_eq;

    fn boxed(frame_center: (f32, f32), size: (f32, f32)) -> BoundingBox {
        let (cx, cy) = frame_center;
        let (w, h) = size;
        BoundingBox {
            bbox: TargetBox::Plain(Rect::new(cx - w / 2.0, cy - h / 2.0, w, h)),
            confidence: 0.9,
            class: "person".to_string(),
            class_id: 0,
            track_id: 1,
        }
    }

    fn smoother() -> TrajectorySmoother {
        TrajectorySmoother::new(ReframingConfig::default(), SmootherConfig::default()).unwrap()
    }

    fn linear_history(frames: u64, from: f32, to: f32, y: f32) -> BTreeMap<u64, BoundingBox> {
        (0..frames)
            .map(|f| {
                let x = from + (to - from) * f as f32 / (frames - 1) as f32;
                (f, boxed((x, y), (100.0, 200.0)))
            })
            .collect()
    }

    #[test]
    fn test_too_few_detections_gives_empty_map() {
        let s = smoother();
        let mut history = BTreeMap::new();
        assert!(s.smooth(&history, (1920, 1080), 30, 30.0, None).unwrap().is_empty());

        history.insert(3, boxed((500.0, 500.0), (100.0, 200.0)));
        assert!(s.smooth(&history, (1920, 1080), 30, 30.0, None).unwrap().is_empty());

        // Detections past the end of the clip do not count
        history.insert(40, boxed((520.0, 500.0), (100.0, 200.0)));
        assert!(s.smooth(&history, (1920, 1080), 30, 30.0, None).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_inputs_are_rejected() {
        let s = smoother();
        let history = linear_history(10, 800.0, 900.0, 540.0);
        assert!(matches!(
            s.smooth(&history, (0, 1080), 10, 30.0, None),
            Err(ReframeError::InvalidFrameSize { .. })
        ));
        assert!(matches!(
            s.smooth(&history, (1920, 1080), 10, 0.0, None),
            Err(ReframeError::InvalidConfig { field: "fps", .. })
        ));
        assert!(matches!(
            s.plan(&history, (1920, 1080), u64::MAX, 30.0, None),
            Err(ReframeError::InvalidConfig { field: "total_frames", .. })
        ));
    }

    #[test]
    fn test_long_gaps_never_raise_confidence() {
        let far = u32::MAX as u64 + 10;
        assert_eq!(decayed(0.9, far), 0.0);
        assert!(damped_steps(0.9, far) <= 0.9 / (1.0 - 0.9) + 1e-9);

        let sample = TrackSample {
            position: Point2::new(0.0, 0.0),
            size: Vector2::new(10.0, 10.0),
            confidence: 0.8,
            observed: true,
        };
        assert!(hold(sample, far, 0.9).confidence <= 0.8);
        assert_relative_eq!(hold(sample, 2, 0.9).confidence, 0.8 * 0.81, epsilon = 1e-12);
    }

    #[test]
    fn test_fill_gaps_interpolates_and_decays() {
        let s = smoother();
        let mut history = BTreeMap::new();
        history.insert(2, boxed((100.0, 50.0), (10.0, 20.0)));
        history.insert(12, boxed((200.0, 50.0), (30.0, 20.0)));

        let samples = s.fill_gaps(&history, 20);
        assert_eq!(samples.len(), 20);

        let mid = samples[7];
        assert!(!mid.observed);
        assert_relative_eq!(mid.position.x, 150.0, epsilon = 1e-4);
        assert_relative_eq!(mid.size.x, 20.0, epsilon = 1e-4);
        assert_relative_eq!(mid.confidence, 0.9f32 as f64 * 0.9f64.powi(5), epsilon = 1e-6);
        assert!(samples[2].observed);
        assert!(samples[3].confidence > samples[7].confidence);

        // Before the first detection: moves backwards along the velocity, damped
        assert!(samples[0].position.x < 100.0);
        assert!(samples[0].position.x > 80.0);

        // After the last one: keeps going, but slower than the observed 10 px/frame
        let tail = samples[19].position.x;
        assert!(tail > samples[18].position.x);
        assert!(tail < 200.0 + 7.0 * 10.0);
    }

    #[test]
    fn test_linear_motion_path() {
        let s = smoother();
        let history = linear_history(30, 100.0, 400.0, 100.0);
        let transforms = s.smooth(&history, (1920, 1080), 30, 30.0, None).unwrap();

        assert_eq!(transforms.len(), 30);
        assert_eq!(transforms.keys().copied().collect::<Vec<_>>(), (0..30).collect::<Vec<u64>>());

        let xs: Vec<f64> = transforms.values().map(|t| t.x).collect();
        assert!(xs.windows(2).all(|w| w[1] >= w[0] - 1e-9));
        assert!(xs[29] > xs[0]);
        assert_relative_eq!(xs[29], 400.0, epsilon = 1e-3);

        let scale = transforms[&0].scale;
        assert!(transforms.values().all(|t| t.scale == scale && t.rotation == 0.0));
    }

    #[test]
    fn test_edge_frames_keep_raw_positions() {
        let s = smoother();
        let history = linear_history(40, 800.0, 1100.0, 540.0);
        let transforms = s.smooth(&history, (1920, 1080), 40, 30.0, None).unwrap();
        assert_relative_eq!(transforms[&0].x, 800.0, epsilon = 1e-6);
        assert_relative_eq!(transforms[&39].x, 1100.0, epsilon = 1e-6);
        assert_relative_eq!(transforms[&20].y, 540.0, epsilon = 1e-6);
    }

    #[test]
    fn test_single_frame_spikes_are_removed() {
        let s = smoother();
        let history: BTreeMap<u64, BoundingBox> = (0..60u64)
            .map(|f| {
                let x = if f > 0 && f % 7 == 0 { 1000.0 } else { 960.0 };
                (f, boxed((x, 540.0), (100.0, 200.0)))
            })
            .collect();
        let transforms = s.smooth(&history, (1920, 1080), 60, 30.0, None).unwrap();
        for t in transforms.values() {
            assert_relative_eq!(t.x, 960.0, epsilon = 1e-6);
            assert_relative_eq!(t.y, 540.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_sharp_turn_gets_a_key_point() {
        let reframing = ReframingConfig {
            smoothness: 1.0,
            ..ReframingConfig::default()
        };
        let s = TrajectorySmoother::new(reframing, SmootherConfig::default()).unwrap();

        // Right for 60 frames, then straight down
        let path: Vec<Point2<f64>> = (0..120)
            .map(|f| {
                if f <= 60 {
                    Point2::new(200.0 + 5.0 * f as f64, 200.0)
                } else {
                    Point2::new(500.0, 200.0 + 5.0 * (f - 60) as f64)
                }
            })
            .collect();
        let keys = s.key_points(&path, 30.0);
        assert_eq!(keys[0], 0);
        assert_eq!(*keys.last().unwrap(), 119);
        assert!(keys.iter().any(|&k| (52..=68).contains(&k)), "keys: {:?}", keys);
    }

    #[test]
    fn test_straight_path_uses_interval_keys() {
        let s = smoother();
        let path: Vec<Point2<f64>> = (0..100).map(|f| Point2::new(f as f64 * 3.0, 10.0)).collect();
        // smoothness 0.5 gives 1.25 s, about 38 frames at 30 fps
        assert_eq!(s.key_points(&path, 30.0), vec![0, 38, 76, 99]);
    }

    #[test]
    fn test_manual_overrides() {
        let reframing = ReframingConfig {
            output_ratio: OutputRatio::Square,
            manual_box_size: Some([400.0, 400.0]),
            manual_offset: Some([25.0, -10.0]),
            ..ReframingConfig::default()
        };
        let s = TrajectorySmoother::new(reframing.clone(), SmootherConfig::default()).unwrap();
        let history = linear_history(20, 900.0, 1000.0, 540.0);
        let plan = s.plan(&history, (1920, 1080), 20, 30.0, Some([50.0, 50.0])).unwrap().unwrap();

        let expected = calculate_crop([400.0, 400.0], (1920, 1080), OutputRatio::Square, &reframing).unwrap();
        assert_eq!(plan.geometry, expected);
        assert_relative_eq!(plan.transforms[&0].x, 925.0, epsilon = 1e-6);
        assert_relative_eq!(plan.transforms[&0].y, 530.0, epsilon = 1e-6);
    }

    #[test]
    fn test_anchor_path_requires_every_box_anchored() {
        let s = smoother();
        let anchored = BoundingBox {
            bbox: TargetBox::Anchored {
                rect: Rect::new(900.0, 400.0, 100.0, 200.0),
                anchor: Point2::new(950.0, 430.0),
            },
            ..boxed((950.0, 500.0), (100.0, 200.0))
        };

        let mut history: BTreeMap<u64, BoundingBox> = (0..10).map(|f| (f, anchored.clone())).collect();
        let samples = s.fill_gaps(&history, 10);
        assert!(samples.iter().all(|p| p.position.y == 430.0));

        history.insert(10, boxed((950.0, 500.0), (100.0, 200.0)));
        let samples = s.fill_gaps(&history, 11);
        assert!(samples.iter().all(|p| p.position.y == 500.0));
    }

    #[test]
    fn test_crops_stay_inside_frame() {
        let s = smoother();
        // Subject runs off the left edge and back
        let history: BTreeMap<u64, BoundingBox> = (0..50u64)
            .map(|f| {
                let x = 300.0 - 15.0 * (25.0 - (f as f32 - 25.0).abs());
                (f, boxed((x, 900.0), (80.0, 160.0)))
            })
            .collect();
        let plan = s.plan(&history, (1920, 1080), 50, 30.0, None).unwrap().unwrap();
        for t in plan.transforms.values() {
            assert!(t.crop_rect(&plan.geometry).fits_within(1920.0, 1080.0, 1e-6));
        }
    }
}
