use anyhow::{bail, Context};
use clap::Parser;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use autoreframe::{
    BoundingBox, ByteTracker, Config, Detection, FrameTransform, Rect, TargetBox, TrackHistory,
    TrajectorySmoother,
};

/// Track subjects through per-frame detections and plan a reframed camera path.
#[derive(Parser)]
#[command(
    name = "autoreframe",
    about = "Multi-object tracking and smooth auto-reframing from detection logs",
    version
)]
struct Args {
    /// JSON file with per-frame detections
    #[arg(short, long)]
    input: PathBuf,

    /// Where to write the per-frame camera transforms
    #[arg(short, long, default_value = "transforms.json")]
    output: PathBuf,

    /// Path to configuration file (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    frame_width: u32,

    #[arg(long)]
    frame_height: u32,

    /// Frames per second of the source video
    #[arg(long, default_value_t = 30.0)]
    fps: f64,

    /// Number of frames to cover (defaults to the last input frame + 1)
    #[arg(long)]
    total_frames: Option<u64>,

    /// Track to follow (defaults to the longest-lived track)
    #[arg(long)]
    track_id: Option<u64>,

    /// Optional per-frame tracking log
    #[arg(long)]
    tracks_output: Option<PathBuf>,
}

#[derive(Deserialize, Debug)]
struct FrameInput {
    frame: u64,
    #[serde(default)]
    detections: Vec<DetectionInput>,
}

#[derive(Deserialize, Debug)]
struct DetectionInput {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    confidence: f32,
    #[serde(default)]
    class: String,
    #[serde(default)]
    class_id: i32,
    head_x: Option<f32>,
    head_y: Option<f32>,
}

impl From<&DetectionInput> for Detection {
    fn from(d: &DetectionInput) -> Self {
        let rect = Rect::new(d.x, d.y, d.width, d.height);
        let bbox = match (d.head_x, d.head_y) {
            (Some(hx), Some(hy)) => TargetBox::Anchored {
                rect,
                anchor: Point2::new(hx, hy),
            },
            _ => TargetBox::Plain(rect),
        };
        Detection::new(bbox, d.confidence, d.class.clone(), d.class_id)
    }
}

#[derive(Serialize, Debug)]
struct TrackLog {
    track_id: u64,
    bbox: [f32; 4], // [x, y, w, h]
    confidence: f32,
    class_id: i32,
    class_name: String,
}

#[derive(Serialize, Debug)]
struct FrameLog {
    frame: u64,
    tracks: Vec<TrackLog>,
}

impl From<&BoundingBox> for TrackLog {
    fn from(b: &BoundingBox) -> Self {
        let r = b.rect();
        TrackLog {
            track_id: b.track_id,
            bbox: [r.x, r.y, r.width, r.height],
            confidence: b.confidence,
            class_id: b.class_id,
            class_name: b.class.clone(),
        }
    }
}

#[derive(Serialize, Debug)]
struct ReframeOutput {
    track_id: u64,
    frame_width: u32,
    frame_height: u32,
    crop_width: f64,
    crop_height: f64,
    transforms: BTreeMap<u64, FrameTransform>,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("autoreframe=info"));
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("failed to write {:?}", path))?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing();

    let config = match &args.config {
        Some(path) => Config::from_file(path).with_context(|| format!("failed to load config {:?}", path))?,
        None => Config::default(),
    };

    let data = fs::read_to_string(&args.input).with_context(|| format!("failed to read {:?}", args.input))?;
    let mut frames: Vec<FrameInput> =
        serde_json::from_str(&data).with_context(|| format!("failed to parse {:?}", args.input))?;
    frames.sort_by_key(|f| f.frame);
    info!(frames = frames.len(), input = ?args.input, "loaded detections");

    let mut tracker = ByteTracker::new(config.tracker.clone())?;
    let mut history = TrackHistory::new();
    let mut tracking_log = Vec::new();

    for input in &frames {
        let detections: Vec<Detection> = input.detections.iter().map(Detection::from).collect();
        let tracked = tracker
            .update(input.frame, &detections)
            .with_context(|| format!("tracking failed at frame {}", input.frame))?;
        history.record(input.frame, &tracked);
        if args.tracks_output.is_some() {
            tracking_log.push(FrameLog {
                frame: input.frame,
                tracks: tracked.iter().map(TrackLog::from).collect(),
            });
        }
    }
    info!(
        tracks = history.len(),
        removed = tracker.removed_count(),
        "tracking finished"
    );

    if let Some(path) = &args.tracks_output {
        write_json(path, &tracking_log)?;
        info!(path = ?path, "tracking log written");
    }

    let track_id = match args.track_id.or_else(|| history.select_target()) {
        Some(id) => id,
        None => bail!("no confirmed tracks in {:?}", args.input),
    };
    let Some(track_history) = history.history(track_id) else {
        bail!("track {} was never confirmed", track_id);
    };

    let total_frames = args
        .total_frames
        .unwrap_or_else(|| frames.last().map_or(0, |f| f.frame.saturating_add(1)));
    let initial_size = history
        .initial_box(track_id)
        .map(|b| [b.rect().width as f64, b.rect().height as f64]);

    let smoother = TrajectorySmoother::new(config.reframing.clone(), config.smoother.clone())?;
    let frame_size = (args.frame_width, args.frame_height);
    let plan = smoother.plan(track_history, frame_size, total_frames, args.fps, initial_size)?;

    let output = match plan {
        Some(plan) => ReframeOutput {
            track_id,
            frame_width: args.frame_width,
            frame_height: args.frame_height,
            crop_width: plan.geometry.width,
            crop_height: plan.geometry.height,
            transforms: plan.transforms,
        },
        None => {
            warn!(track_id, "not enough detections, output falls back to the full frame");
            ReframeOutput {
                track_id,
                frame_width: args.frame_width,
                frame_height: args.frame_height,
                crop_width: args.frame_width as f64,
                crop_height: args.frame_height as f64,
                transforms: BTreeMap::new(),
            }
        }
    };

    write_json(&args.output, &output)?;
    info!(
        track_id,
        frames = output.transforms.len(),
        output = ?args.output,
        "transforms written"
    );
    Ok(())
}
