use std::collections::BTreeMap;

use crate::detection::BoundingBox;

/// Per-track record of tracker output over a whole clip.
///
/// Filled online, one frame at a time, and read back in batch by the
/// trajectory smoother.
#[derive(Debug, Clone, Default)]
pub struct TrackHistory {
    tracks: BTreeMap<u64, BTreeMap<u64, BoundingBox>>,
}

impl TrackHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the tracked boxes output for `frame`.
    pub fn record(&mut self, frame: u64, boxes: &[BoundingBox]) {
        for b in boxes {
            self.tracks
                .entry(b.track_id)
                .or_default()
                .insert(frame, b.clone());
        }
    }

    /// Ids of every track seen so far, ascending.
    pub fn track_ids(&self) -> Vec<u64> {
        self.tracks.keys().copied().collect()
    }

    /// Frame-ordered boxes of one track.
    pub fn history(&self, track_id: u64) -> Option<&BTreeMap<u64, BoundingBox>> {
        self.tracks.get(&track_id)
    }

    /// First recorded box of a track.
    pub fn initial_box(&self, track_id: u64) -> Option<&BoundingBox> {
        self.tracks.get(&track_id).and_then(|h| h.values().next())
    }

    /// Number of frames a track was observed in.
    pub fn frames_observed(&self, track_id: u64) -> usize {
        self.tracks.get(&track_id).map_or(0, BTreeMap::len)
    }

    /// Track seen in the most frames; ties go to the lowest id.
    pub fn select_target(&self) -> Option<u64> {
        self.tracks
            .iter()
            .max_by(|(id_a, a), (id_b, b)| a.len().cmp(&b.len()).then(id_b.cmp(id_a)))
            .map(|(&id, _)| id)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{Rect, TargetBox};

    fn tracked(track_id: u64, x: f32) -> BoundingBox {
        BoundingBox {
            bbox: TargetBox::Plain(Rect::new(x, 0.0, 10.0, 20.0)),
            confidence: 0.9,
            class: "person".to_string(),
            class_id: 0,
            track_id,
        }
    }

    #[test]
    fn test_record_groups_by_track() {
        let mut history = TrackHistory::new();
        history.record(0, &[tracked(1, 0.0), tracked(2, 50.0)]);
        history.record(1, &[tracked(1, 5.0)]);
        history.record(3, &[tracked(1, 15.0)]);

        assert_eq!(history.track_ids(), vec![1, 2]);
        assert_eq!(history.frames_observed(1), 3);
        let frames: Vec<u64> = history.history(1).unwrap().keys().copied().collect();
        assert_eq!(frames, vec![0, 1, 3]);
        assert_eq!(history.initial_box(1).unwrap().rect().x, 0.0);
        assert!(history.history(7).is_none());
    }

    #[test]
    fn test_select_target_prefers_longest_then_lowest_id() {
        let mut history = TrackHistory::new();
        assert_eq!(history.select_target(), None);

        history.record(0, &[tracked(4, 0.0), tracked(2, 50.0)]);
        history.record(1, &[tracked(4, 0.0), tracked(2, 50.0)]);
        assert_eq!(history.select_target(), Some(2));

        history.record(2, &[tracked(4, 0.0)]);
        assert_eq!(history.select_target(), Some(4));
    }
}
