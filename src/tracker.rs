use std::collections::HashSet;

use tracing::{debug, trace};

use crate::config::TrackerConfig;
use crate::detection::{BoundingBox, Detection};
use crate::error::{ReframeError, ReframeResult};
use crate::kalman_filter::KalmanFilter;
use crate::matching::{fuse_score, iou_distance, linear_assignment, Assignment};
use crate::track::{STrack, TrackIdGenerator, TrackState};
use crate::utils::BoxVec;

/// Two-stage multi-object tracker (high then low confidence association).
///
/// All tracks live in one arena; the tracked/lost pools are views over it,
/// selected by each track's `state`. Removed tracks are dropped from the
/// arena at the end of the frame that removed them.
pub struct ByteTracker {
    config: TrackerConfig,
    kalman: KalmanFilter,
    tracks: Vec<STrack>,
    ids: TrackIdGenerator,
    /// Frames a lost track survives before removal
    max_time_lost: u64,
    last_frame: Option<u64>,
    frame_count: u64,
    removed_count: usize,
}

impl ByteTracker {
    /// Create a tracker session. Fails if the config is out of range.
    pub fn new(config: TrackerConfig) -> ReframeResult<Self> {
        config.validate()?;
        let max_time_lost = config.max_time_lost();
        Ok(ByteTracker {
            config,
            kalman: KalmanFilter::new(),
            tracks: Vec::new(),
            ids: TrackIdGenerator::default(),
            max_time_lost,
            last_frame: None,
            frame_count: 0,
            removed_count: 0,
        })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Live tracks (tracked, lost and unconfirmed), in creation order.
    pub fn tracks(&self) -> &[STrack] {
        &self.tracks
    }

    pub fn tracked_count(&self) -> usize {
        self.count(TrackState::Tracked)
    }

    pub fn lost_count(&self) -> usize {
        self.count(TrackState::Lost)
    }

    /// Tracks removed so far in this session.
    pub fn removed_count(&self) -> usize {
        self.removed_count
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn last_frame(&self) -> Option<u64> {
        self.last_frame
    }

    /// Drop every track and restart id assignment at 1.
    pub fn reset(&mut self) {
        self.tracks.clear();
        self.ids = TrackIdGenerator::default();
        self.last_frame = None;
        self.frame_count = 0;
        self.removed_count = 0;
    }

    /// Process the detections of one frame and return the confirmed tracks.
    ///
    /// Frame numbers must strictly increase between calls. A gap behaves
    /// exactly like the same number of empty frames.
    pub fn update(&mut self, frame_id: u64, detections: &[Detection]) -> ReframeResult<Vec<BoundingBox>> {
        if let Some(last) = self.last_frame {
            if frame_id <= last {
                return Err(ReframeError::OutOfOrderFrame { last, got: frame_id });
            }
        }
        let skipped = self.last_frame.map_or(0, |last| frame_id - last - 1);
        let first_frame = self.last_frame.is_none();
        self.last_frame = Some(frame_id);
        self.frame_count += 1;

        // Split detections by confidence, dropping noise and degenerate boxes
        let mut high: Vec<&Detection> = Vec::new();
        let mut low: Vec<&Detection> = Vec::new();
        for det in detections {
            let rect = det.rect();
            if !rect.is_valid() || rect.area() < self.config.min_box_area || det.confidence < self.config.low_thresh {
                continue;
            }
            if det.confidence >= self.config.track_thresh {
                high.push(det);
            } else {
                low.push(det);
            }
        }

        for track in self.tracks.iter_mut() {
            if matches!(track.state, TrackState::Tracked | TrackState::Lost) {
                track.predict(&self.kalman);
            }
        }
        if skipped > 0 {
            self.skip_frames(frame_id, skipped);
        }

        // Stage 1: confirmed tracks against high-confidence detections
        let confirmed = self.indices(TrackState::Tracked);
        let all_high: Vec<usize> = (0..high.len()).collect();
        let first = self.associate(&confirmed, &high, &all_high, self.config.match_thresh, true);
        for &(t, d) in &first.matches {
            self.tracks[t].update(high[d], &self.kalman, frame_id);
        }
        trace!(
            frame_id,
            matched = first.matches.len(),
            unmatched_tracks = first.unmatched_tracks.len(),
            "stage 1"
        );

        // Stage 2: leftovers against low-confidence detections, IoU only
        let all_low: Vec<usize> = (0..low.len()).collect();
        let second = self.associate(
            &first.unmatched_tracks,
            &low,
            &all_low,
            self.config.second_match_thresh,
            false,
        );
        for &(t, d) in &second.matches {
            self.tracks[t].update(low[d], &self.kalman, frame_id);
        }
        for &t in &second.unmatched_tracks {
            self.tracks[t].mark_lost();
        }
        trace!(frame_id, matched = second.matches.len(), lost = second.unmatched_tracks.len(), "stage 2");

        // Stage 3: unconfirmed tracks get one chance at the remaining high detections
        let unconfirmed = self.indices(TrackState::New);
        let third = self.associate(
            &unconfirmed,
            &high,
            &first.unmatched_detections,
            self.config.unconfirmed_match_thresh,
            true,
        );
        for &(t, d) in &third.matches {
            self.tracks[t].update(high[d], &self.kalman, frame_id);
        }
        for &t in &third.unmatched_tracks {
            self.tracks[t].mark_removed();
        }
        trace!(frame_id, confirmed = third.matches.len(), dropped = third.unmatched_tracks.len(), "stage 3");

        // Reactivation: lost tracks, including those lost this frame
        let lost = self.indices(TrackState::Lost);
        let revived = self.associate(
            &lost,
            &high,
            &third.unmatched_detections,
            self.config.match_thresh,
            true,
        );
        for &(t, d) in &revived.matches {
            self.tracks[t].re_activate(high[d], &self.kalman, frame_id, &mut self.ids, false);
            debug!(frame_id, track_id = self.tracks[t].track_id(), "track reactivated");
        }

        // Every high-confidence detection still unclaimed starts a track
        for &d in &revived.unmatched_detections {
            let mut track = STrack::new(high[d], &self.kalman);
            let track_id = self.ids.next_id();
            track.activate(track_id, frame_id, first_frame);
            debug!(frame_id, track_id, score = high[d].confidence, "track started");
            self.tracks.push(track);
        }

        for track in self.tracks.iter_mut() {
            if track.state == TrackState::Lost && frame_id - track.frame_id() > self.max_time_lost {
                debug!(frame_id, track_id = track.track_id(), "lost track expired");
                track.mark_removed();
            }
        }

        self.remove_duplicate_tracks();

        let before = self.tracks.len();
        self.tracks.retain(|t| t.state != TrackState::Removed);
        self.removed_count += before - self.tracks.len();

        let output: Vec<BoundingBox> = self
            .tracks
            .iter()
            .filter(|t| t.state == TrackState::Tracked && t.is_activated())
            .map(STrack::to_bounding_box)
            .collect();

        debug!(
            frame_id,
            detections = detections.len(),
            high = high.len(),
            low = low.len(),
            tracked = output.len(),
            lost = self.lost_count(),
            "frame processed"
        );
        Ok(output)
    }

    /// Replay `skipped` missing frames before `frame_id`: unconfirmed tracks
    /// are dropped, tracked ones go lost, lost ones past the buffer expire and
    /// survivors coast one prediction per missing frame.
    fn skip_frames(&mut self, frame_id: u64, skipped: u64) {
        for track in self.tracks.iter_mut() {
            match track.state {
                TrackState::New => track.mark_removed(),
                TrackState::Tracked => track.mark_lost(),
                _ => {}
            }
            if track.state != TrackState::Lost {
                continue;
            }
            if frame_id - 1 - track.frame_id() > self.max_time_lost {
                debug!(frame_id, track_id = track.track_id(), "lost track expired during gap");
                track.mark_removed();
                continue;
            }
            // Bounded by max_time_lost for any track that survives
            for _ in 0..skipped {
                track.predict(&self.kalman);
            }
        }
        trace!(frame_id, skipped, "frames skipped");
    }

    fn count(&self, state: TrackState) -> usize {
        self.tracks.iter().filter(|t| t.state == state).count()
    }

    fn indices(&self, state: TrackState) -> Vec<usize> {
        (0..self.tracks.len()).filter(|&i| self.tracks[i].state == state).collect()
    }

    /// Match the arena tracks `tracks` against `pool[candidates]`.
    ///
    /// Indices in the returned assignment refer to the arena and to `pool`.
    fn associate(
        &self,
        tracks: &[usize],
        pool: &[&Detection],
        candidates: &[usize],
        thresh: f32,
        fuse: bool,
    ) -> Assignment {
        let track_boxes: Vec<BoxVec> = tracks.iter().map(|&i| self.tracks[i].tlbr()).collect();
        let det_boxes: Vec<BoxVec> = candidates.iter().map(|&j| pool[j].rect().tlbr()).collect();

        let mut cost = iou_distance(&track_boxes, &det_boxes);
        if fuse && self.config.fuse_score {
            let scores: Vec<f32> = candidates.iter().map(|&j| pool[j].confidence).collect();
            fuse_score(&mut cost, &scores);
        }

        let local = linear_assignment(&cost, thresh);
        Assignment {
            matches: local.matches.iter().map(|&(t, d)| (tracks[t], candidates[d])).collect(),
            unmatched_tracks: local.unmatched_tracks.iter().map(|&t| tracks[t]).collect(),
            unmatched_detections: local.unmatched_detections.iter().map(|&d| candidates[d]).collect(),
        }
    }

    /// Remove near-identical tracked boxes, keeping the older track.
    fn remove_duplicate_tracks(&mut self) {
        let tracked = self.indices(TrackState::Tracked);
        if tracked.len() < 2 {
            return;
        }
        let boxes: Vec<BoxVec> = tracked.iter().map(|&i| self.tracks[i].tlbr()).collect();
        let dist = iou_distance(&boxes, &boxes);

        let mut duplicates = HashSet::new();
        for a in 0..tracked.len() {
            for b in (a + 1)..tracked.len() {
                if dist[(a, b)] >= self.config.duplicate_iou_distance {
                    continue;
                }
                let (ta, tb) = (&self.tracks[tracked[a]], &self.tracks[tracked[b]]);
                // Younger goes; on equal age the later id goes
                let drop = if ta.age() > tb.age() || (ta.age() == tb.age() && ta.track_id() < tb.track_id()) {
                    tracked[b]
                } else {
                    tracked[a]
                };
                duplicates.insert(drop);
            }
        }

        for idx in duplicates {
            debug!(track_id = self.tracks[idx].track_id(), "duplicate track removed");
            self.tracks[idx].mark_removed();
        }
    }
}
