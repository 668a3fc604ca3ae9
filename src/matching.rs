//! Cost matrices and optimal track-to-detection assignment.

use nalgebra::DMatrix;

use crate::utils::{iou_matrix, BoxVec};

/// Cost carried by padding cells and by gated pairs.
const SENTINEL_COST: f64 = 1e6;

/// Result of a gated linear assignment. Every index list is ascending.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assignment {
    /// `(track_idx, det_idx)` pairs
    pub matches: Vec<(usize, usize)>,
    pub unmatched_tracks: Vec<usize>,
    pub unmatched_detections: Vec<usize>,
}

/// `1 - IoU` between tlbr track boxes (rows) and detection boxes (columns).
pub fn iou_distance(tracks: &[BoxVec], detections: &[BoxVec]) -> DMatrix<f32> {
    iou_matrix(tracks, detections).map(|iou| 1.0 - iou)
}

/// Fold detection confidence into an IoU distance: `1 - IoU * score`.
pub fn fuse_score(cost: &mut DMatrix<f32>, scores: &[f32]) {
    debug_assert_eq!(cost.ncols(), scores.len());
    for (j, &score) in scores.iter().enumerate() {
        for i in 0..cost.nrows() {
            let iou = 1.0 - cost[(i, j)];
            cost[(i, j)] = 1.0 - iou * score;
        }
    }
}

/// Exact minimum-cost assignment (Hungarian / Kuhn-Munkres with potentials).
///
/// Rectangular inputs are padded to square with a sentinel cost. Returns,
/// for every row, the column assigned to it, or `None` if the row landed
/// on a padding column. Runs in O(n^3) with n = max(rows, cols); ties go to
/// the lowest column index.
pub fn hungarian(cost: &DMatrix<f32>) -> Vec<Option<usize>> {
    let rows = cost.nrows();
    let cols = cost.ncols();
    let n = rows.max(cols);
    if n == 0 {
        return Vec::new();
    }

    let at = |i: usize, j: usize| -> f64 {
        if i < rows && j < cols {
            cost[(i, j)] as f64
        } else {
            SENTINEL_COST
        }
    };

    // 1-based potentials; p[j] is the row matched to column j, 0 = free
    let mut u = vec![0.0f64; n + 1];
    let mut v = vec![0.0f64; n + 1];
    let mut p = vec![0usize; n + 1];
    let mut way = vec![0usize; n + 1];

    for i in 1..=n {
        p[0] = i;
        let mut j0 = 0usize;
        let mut minv = vec![f64::INFINITY; n + 1];
        let mut used = vec![false; n + 1];

        loop {
            used[j0] = true;
            let i0 = p[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0usize;

            for j in 1..=n {
                if used[j] {
                    continue;
                }
                let cur = at(i0 - 1, j - 1) - u[i0] - v[j];
                if cur < minv[j] {
                    minv[j] = cur;
                    way[j] = j0;
                }
                if minv[j] < delta {
                    delta = minv[j];
                    j1 = j;
                }
            }

            for j in 0..=n {
                if used[j] {
                    u[p[j]] += delta;
                    v[j] -= delta;
                } else {
                    minv[j] -= delta;
                }
            }

            j0 = j1;
            if p[j0] == 0 {
                break;
            }
        }

        // Augment along the alternating path
        loop {
            let j1 = way[j0];
            p[j0] = p[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut assignment = vec![None; rows];
    for j in 1..=n {
        let i = p[j];
        if i >= 1 && i <= rows && j <= cols {
            assignment[i - 1] = Some(j - 1);
        }
    }
    assignment
}

/// Solve the assignment with a distance gate.
///
/// Pairs costing more than `thresh` are gated out before solving and are
/// never returned as matches.
pub fn linear_assignment(cost: &DMatrix<f32>, thresh: f32) -> Assignment {
    let (rows, cols) = cost.shape();
    if rows == 0 || cols == 0 {
        return Assignment {
            matches: Vec::new(),
            unmatched_tracks: (0..rows).collect(),
            unmatched_detections: (0..cols).collect(),
        };
    }

    let gated = cost.map(|c| if c > thresh || !c.is_finite() { SENTINEL_COST as f32 } else { c });
    let solution = hungarian(&gated);

    let mut matches = Vec::new();
    let mut det_used = vec![false; cols];
    for (i, col) in solution.iter().enumerate() {
        if let Some(j) = *col {
            if cost[(i, j)] <= thresh {
                matches.push((i, j));
                det_used[j] = true;
            }
        }
    }

    let unmatched_tracks = (0..rows)
        .filter(|i| !matches.iter().any(|(t, _)| t == i))
        .collect();
    let unmatched_detections = (0..cols).filter(|&j| !det_used[j]).collect();

    Assignment {
        matches,
        unmatched_tracks,
        unmatched_detections,
    }
}
