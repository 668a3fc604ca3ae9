pub mod config;
pub mod detection;
pub mod error;
pub mod history;
pub mod kalman_filter;
pub mod matching;
pub mod reframe;
pub mod track;
pub mod tracker;
pub mod trajectory;
pub mod utils;

// Re-export main types
pub use crate::config::{Config, ReframingConfig, SmootherConfig, TrackerConfig};
pub use crate::detection::{BoundingBox, Detection, Rect, TargetBox};
pub use crate::error::{ReframeError, ReframeResult};
pub use crate::history::TrackHistory;
pub use crate::reframe::{calculate_crop, CropGeometry, FrameTransform, OutputRatio};
pub use crate::track::{STrack, TrackState};
pub use crate::tracker::ByteTracker;
pub use crate::trajectory::{ReframePlan, TrajectorySmoother};
