//! Box geometry shared by the tracker and the matcher.
//!
//! Boxes travel as `SVector<f32, 4>` in one of three encodings:
//! tlwh `[x, y, w, h]`, tlbr `[x1, y1, x2, y2]` and xyah
//! `[cx, cy, w / h, h]` (the Kalman measurement space).

use nalgebra::{DMatrix, SVector};

pub type BoxVec = SVector<f32, 4>;

/// Convert tlwh to tlbr format.
pub fn tlwh_to_tlbr(tlwh: &BoxVec) -> BoxVec {
    let mut tlbr = *tlwh;
    tlbr[2] = tlwh[0] + tlwh[2];
    tlbr[3] = tlwh[1] + tlwh[3];
    tlbr
}

/// Convert tlbr to tlwh format.
pub fn tlbr_to_tlwh(tlbr: &BoxVec) -> BoxVec {
    let mut tlwh = *tlbr;
    tlwh[2] = tlbr[2] - tlbr[0];
    tlwh[3] = tlbr[3] - tlbr[1];
    tlwh
}

/// Convert tlwh to `[cx, cy, aspect, h]`.
pub fn tlwh_to_xyah(tlwh: &BoxVec) -> BoxVec {
    BoxVec::new(
        tlwh[0] + tlwh[2] / 2.0,
        tlwh[1] + tlwh[3] / 2.0,
        tlwh[2] / tlwh[3],
        tlwh[3],
    )
}

/// Convert `[cx, cy, aspect, h]` back to tlwh.
pub fn xyah_to_tlwh(xyah: &BoxVec) -> BoxVec {
    let w = xyah[2] * xyah[3];
    let h = xyah[3];
    BoxVec::new(xyah[0] - w / 2.0, xyah[1] - h / 2.0, w, h)
}

/// Compute IoU between two boxes in tlbr format.
///
/// Disjoint boxes and boxes with zero or negative area give 0.
pub fn iou(a: &BoxVec, b: &BoxVec) -> f32 {
    let a_area = (a[2] - a[0]) * (a[3] - a[1]);
    let b_area = (b[2] - b[0]) * (b[3] - b[1]);
    if !(a_area > 0.0) || !(b_area > 0.0) {
        return 0.0;
    }

    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter_area = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a_area + b_area - inter_area;
    if union <= 0.0 {
        return 0.0;
    }

    (inter_area / union).clamp(0.0, 1.0)
}

/// Pairwise IoU between two lists of tlbr boxes, `rows = a.len()`.
pub fn iou_matrix(a: &[BoxVec], b: &[BoxVec]) -> DMatrix<f32> {
    DMatrix::from_fn(a.len(), b.len(), |i, j| iou(&a[i], &b[j]))
}

/// Euclidean distance between the centers of two tlbr boxes.
pub fn center_distance(a: &BoxVec, b: &BoxVec) -> f32 {
    let dx = (a[0] + a[2]) / 2.0 - (b[0] + b[2]) / 2.0;
    let dy = (a[1] + a[3]) / 2.0 - (b[1] + b[3]) / 2.0;
    (dx * dx + dy * dy).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_iou_identity_and_symmetry() {
        let a = BoxVec::new(10.0, 10.0, 60.0, 110.0);
        let b = BoxVec::new(30.0, 40.0, 90.0, 100.0);

        assert_relative_eq!(iou(&a, &a), 1.0);
        assert_eq!(iou(&a, &b), iou(&b, &a));
        let v = iou(&a, &b);
        assert!(v > 0.0 && v < 1.0);
    }

    #[test]
    fn test_iou_known_value() {
        // 100x100 boxes offset by 50 in both axes: 2500 / 17500
        let a = BoxVec::new(0.0, 0.0, 100.0, 100.0);
        let b = BoxVec::new(50.0, 50.0, 150.0, 150.0);
        assert_relative_eq!(iou(&a, &b), 2500.0 / 17500.0, epsilon = 1e-6);
    }

    #[test]
    fn test_iou_disjoint_and_degenerate() {
        let a = BoxVec::new(0.0, 0.0, 10.0, 10.0);
        let far = BoxVec::new(20.0, 20.0, 30.0, 30.0);
        let flat = BoxVec::new(0.0, 0.0, 10.0, 0.0);

        assert_eq!(iou(&a, &far), 0.0);
        assert_eq!(iou(&a, &flat), 0.0);
        assert_eq!(iou(&flat, &flat), 0.0);
    }

    #[test]
    fn test_box_conversions_reversible() {
        let tlwh = BoxVec::new(12.5, 40.0, 32.0, 64.0);

        let tlbr = tlwh_to_tlbr(&tlwh);
        assert_eq!(tlbr, BoxVec::new(12.5, 40.0, 44.5, 104.0));
        assert_eq!(tlbr_to_tlwh(&tlbr), tlwh);

        let xyah = tlwh_to_xyah(&tlwh);
        assert_relative_eq!(xyah[0], 28.5);
        assert_relative_eq!(xyah[1], 72.0);
        assert_relative_eq!(xyah[2], 0.5);
        assert_relative_eq!(xyah[3], 64.0);

        let back = xyah_to_tlwh(&xyah);
        for i in 0..4 {
            assert_relative_eq!(back[i], tlwh[i], epsilon = 1e-4);
        }
    }

    #[test]
    fn test_iou_matrix_shape() {
        let a = vec![
            BoxVec::new(0.0, 0.0, 10.0, 10.0),
            BoxVec::new(100.0, 100.0, 110.0, 110.0),
        ];
        let b = vec![BoxVec::new(0.0, 0.0, 10.0, 10.0)];
        let m = iou_matrix(&a, &b);
        assert_eq!(m.shape(), (2, 1));
        assert_relative_eq!(m[(0, 0)], 1.0);
        assert_eq!(m[(1, 0)], 0.0);
    }

    #[test]
    fn test_center_distance() {
        let a = BoxVec::new(0.0, 0.0, 10.0, 10.0);
        let b = BoxVec::new(3.0, 4.0, 13.0, 14.0);
        assert_relative_eq!(center_distance(&a, &b), 5.0);
    }
}
