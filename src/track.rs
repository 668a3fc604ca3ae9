use tracing::warn;

use crate::detection::{BoundingBox, Detection, Rect, TargetBox};
use crate::kalman_filter::{KalmanFilter, StateCovariance, StateMean};
use crate::utils::{tlwh_to_tlbr, tlwh_to_xyah, xyah_to_tlwh, BoxVec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackState {
    New,
    Tracked,
    Lost,
    Removed,
}

/// Hands out track ids for one tracker session, starting at 1.
#[derive(Debug, Clone)]
pub struct TrackIdGenerator {
    next: u64,
}

impl Default for TrackIdGenerator {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl TrackIdGenerator {
    pub fn next_id(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }

    /// Number of ids handed out so far.
    pub fn issued(&self) -> u64 {
        self.next - 1
    }
}

/// Single object track
#[derive(Debug, Clone)]
pub struct STrack {
    /// Kalman state (cx, cy, a, h, vcx, vcy, va, vh)
    mean: StateMean,
    covariance: StateCovariance,
    /// Bounding box in (tlwh) format
    tlwh: BoxVec,
    /// Last matched detection confidence
    pub score: f32,
    pub class: String,
    pub class_id: i32,
    /// Box variant of the last matched detection, carries the head hint
    target: TargetBox,
    /// 0 until the track is activated
    track_id: u64,
    pub state: TrackState,
    is_activated: bool,
    /// Frame of the last successful update
    frame_id: u64,
    start_frame: u64,
    /// Consecutive successful updates
    tracklet_len: u32,
}

impl STrack {
    /// Create an unactivated track from a detection.
    pub fn new(detection: &Detection, kalman: &KalmanFilter) -> Self {
        let tlwh = detection.tlwh();
        let (mean, covariance) = kalman.initiate(&tlwh_to_xyah(&tlwh));
        STrack {
            mean,
            covariance,
            tlwh,
            score: detection.confidence,
            class: detection.class.clone(),
            class_id: detection.class_id,
            target: detection.bbox,
            track_id: 0,
            state: TrackState::New,
            is_activated: false,
            frame_id: 0,
            start_frame: 0,
            tracklet_len: 0,
        }
    }

    /// Give the track its id and start its lifetime.
    ///
    /// Tracks born on the very first frame of a session are confirmed at once;
    /// any later one stays `New` until it is matched again.
    pub fn activate(&mut self, track_id: u64, frame_id: u64, first_frame: bool) {
        self.track_id = track_id;
        self.tracklet_len = 0;
        if first_frame {
            self.state = TrackState::Tracked;
            self.is_activated = true;
        } else {
            self.state = TrackState::New;
        }
        self.frame_id = frame_id;
        self.start_frame = frame_id;
    }

    /// Re-activate a lost track with a new detection.
    ///
    /// The id is kept unless `new_id` asks for a fresh one from `ids`.
    pub fn re_activate(
        &mut self,
        detection: &Detection,
        kalman: &KalmanFilter,
        frame_id: u64,
        ids: &mut TrackIdGenerator,
        new_id: bool,
    ) {
        self.correct(detection, kalman);
        if new_id {
            self.track_id = ids.next_id();
        }
        self.tracklet_len = 0;
        self.state = TrackState::Tracked;
        self.is_activated = true;
        self.frame_id = frame_id;
        self.absorb(detection);
    }

    /// Update a matched track with its detection.
    pub fn update(&mut self, detection: &Detection, kalman: &KalmanFilter, frame_id: u64) {
        self.correct(detection, kalman);
        self.frame_id = frame_id;
        self.tracklet_len += 1;
        self.state = TrackState::Tracked;
        self.is_activated = true;
        self.absorb(detection);
    }

    /// Kalman correction; on a numerical failure the predicted state stays.
    fn correct(&mut self, detection: &Detection, kalman: &KalmanFilter) {
        let measurement = tlwh_to_xyah(&detection.tlwh());
        match kalman.update(&self.mean, &self.covariance, &measurement) {
            Ok((mean, covariance)) => {
                self.mean = mean;
                self.covariance = covariance;
                self.refresh_tlwh();
            }
            Err(e) => {
                warn!(track_id = self.track_id, "kalman update skipped: {}", e);
            }
        }
    }

    fn refresh_tlwh(&mut self) {
        let xyah: BoxVec = self.mean.fixed_rows::<4>(0).clone_owned();
        self.tlwh = xyah_to_tlwh(&xyah);
    }

    fn absorb(&mut self, detection: &Detection) {
        self.score = detection.confidence;
        self.class_id = detection.class_id;
        self.class = detection.class.clone();
        self.target = detection.bbox;
    }

    /// Predict next state using the Kalman filter.
    pub fn predict(&mut self, kalman: &KalmanFilter) {
        let mut mean = self.mean;
        if self.state != TrackState::Tracked {
            // Freeze height velocity while the track is not being observed
            mean[7] = 0.0;
        }
        let (mean, covariance) = kalman.predict(&mean, &self.covariance);
        self.mean = mean;
        self.covariance = covariance;
        self.refresh_tlwh();
    }

    /// Mark this track as lost.
    pub fn mark_lost(&mut self) {
        self.state = TrackState::Lost;
    }

    /// Mark this track as removed.
    pub fn mark_removed(&mut self) {
        self.state = TrackState::Removed;
    }

    pub fn is_activated(&self) -> bool {
        self.is_activated
    }

    pub fn tlwh(&self) -> &BoxVec {
        &self.tlwh
    }

    pub fn tlbr(&self) -> BoxVec {
        tlwh_to_tlbr(&self.tlwh)
    }

    pub fn mean(&self) -> &StateMean {
        &self.mean
    }

    pub fn track_id(&self) -> u64 {
        self.track_id
    }

    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    pub fn start_frame(&self) -> u64 {
        self.start_frame
    }

    pub fn tracklet_len(&self) -> u32 {
        self.tracklet_len
    }

    /// Frames between the track's start and its last update.
    pub fn age(&self) -> u64 {
        self.frame_id - self.start_frame
    }

    pub fn to_bounding_box(&self) -> BoundingBox {
        BoundingBox {
            bbox: self.target.with_rect(Rect::from_tlwh(&self.tlwh)),
            confidence: self.score,
            class: self.class.clone(),
            class_id: self.class_id,
            track_id: self.track_id,
        }
    }
}
