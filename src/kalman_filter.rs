use nalgebra::{SMatrix, SVector};

use crate::error::{ReframeError, ReframeResult};

pub type StateMean = SVector<f32, 8>;
pub type StateCovariance = SMatrix<f32, 8, 8>;
pub type Measurement = SVector<f32, 4>;

const NDIM: usize = 4;
const PIVOT_EPS: f32 = 1e-12;

/// Constant-velocity Kalman filter over `[cx, cy, a, h, vcx, vcy, va, vh]`.
///
/// Only `[cx, cy, a, h]` is observed. Noise on position and height is scaled
/// by the current box height; the aspect ratio gets small fixed variances.
#[derive(Debug, Clone)]
pub struct KalmanFilter {
    motion_mat: SMatrix<f32, 8, 8>, // F
    update_mat: SMatrix<f32, 4, 8>, // H
    std_weight_position: f32,
    std_weight_velocity: f32,
}

impl Default for KalmanFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl KalmanFilter {
    /// Initialize motion and update matrices.
    pub fn new() -> Self {
        let dt = 1.0;
        let mut motion_mat = SMatrix::<f32, 8, 8>::identity();
        for i in 0..NDIM {
            motion_mat[(i, NDIM + i)] = dt;
        }
        let update_mat = SMatrix::<f32, 4, 8>::identity();
        KalmanFilter {
            motion_mat,
            update_mat,
            std_weight_position: 1.0 / 20.0,
            std_weight_velocity: 1.0 / 160.0,
        }
    }

    /// Create track state from an xyah measurement, velocities zero.
    pub fn initiate(&self, measurement: &Measurement) -> (StateMean, StateCovariance) {
        let mut mean = StateMean::zeros();
        mean.fixed_rows_mut::<4>(0).copy_from(measurement);

        let h = measurement[3];
        let std = StateMean::from_column_slice(&[
            2.0 * self.std_weight_position * h,
            2.0 * self.std_weight_position * h,
            1e-2,
            2.0 * self.std_weight_position * h,
            10.0 * self.std_weight_velocity * h,
            10.0 * self.std_weight_velocity * h,
            1e-5,
            10.0 * self.std_weight_velocity * h,
        ]);
        let covariance = StateCovariance::from_diagonal(&std.component_mul(&std));
        (mean, covariance)
    }

    /// Predict step: x' = F x, P' = F P F^T + Q
    pub fn predict(&self, mean: &StateMean, covariance: &StateCovariance) -> (StateMean, StateCovariance) {
        let h = mean[3];
        let std = StateMean::from_column_slice(&[
            self.std_weight_position * h,
            self.std_weight_position * h,
            1e-2,
            self.std_weight_position * h,
            self.std_weight_velocity * h,
            self.std_weight_velocity * h,
            1e-5,
            self.std_weight_velocity * h,
        ]);
        let q = StateCovariance::from_diagonal(&std.component_mul(&std));

        let new_mean = self.motion_mat * mean;
        let new_cov = self.motion_mat * covariance * self.motion_mat.transpose() + q;
        (new_mean, new_cov)
    }

    /// Project state to measurement space: z = Hx, S = H P H^T + R
    pub fn project(&self, mean: &StateMean, covariance: &StateCovariance) -> (Measurement, SMatrix<f32, 4, 4>) {
        let h = mean[3];
        let std = Measurement::new(
            self.std_weight_position * h,
            self.std_weight_position * h,
            1e-1,
            self.std_weight_position * h,
        );
        let r = SMatrix::<f32, 4, 4>::from_diagonal(&std.component_mul(&std));

        let z_mean = self.update_mat * mean;
        let s_cov = self.update_mat * covariance * self.update_mat.transpose() + r;
        (z_mean, s_cov)
    }

    /// Correction step.
    ///
    /// Returns `SingularMatrix` when the innovation covariance cannot be
    /// inverted; callers keep their predicted state in that case.
    pub fn update(
        &self,
        mean: &StateMean,
        covariance: &StateCovariance,
        measurement: &Measurement,
    ) -> ReframeResult<(StateMean, StateCovariance)> {
        let (projected_mean, projected_cov) = self.project(mean, covariance);
        let s_inv = invert_gauss_jordan(&projected_cov).ok_or(ReframeError::SingularMatrix)?;

        // K = P H^T S^-1
        let kalman_gain = covariance * self.update_mat.transpose() * s_inv;
        let innovation = measurement - projected_mean;

        let new_mean = mean + kalman_gain * innovation;
        let new_cov = (StateCovariance::identity() - kalman_gain * self.update_mat) * covariance;

        if new_mean.iter().chain(new_cov.iter()).any(|v| !v.is_finite()) {
            return Err(ReframeError::SingularMatrix);
        }
        Ok((new_mean, new_cov))
    }
}

/// Invert a square matrix with Gauss-Jordan elimination and partial pivoting.
///
/// Returns `None` if a pivot is zero or not finite.
pub fn invert_gauss_jordan<const N: usize>(m: &SMatrix<f32, N, N>) -> Option<SMatrix<f32, N, N>> {
    let mut a = *m;
    let mut inv = SMatrix::<f32, N, N>::identity();

    for col in 0..N {
        let mut pivot_row = col;
        let mut pivot_abs = a[(col, col)].abs();
        for row in (col + 1)..N {
            let v = a[(row, col)].abs();
            if v > pivot_abs {
                pivot_abs = v;
                pivot_row = row;
            }
        }
        if !pivot_abs.is_finite() || pivot_abs < PIVOT_EPS {
            return None;
        }
        if pivot_row != col {
            a.swap_rows(pivot_row, col);
            inv.swap_rows(pivot_row, col);
        }

        let pivot = a[(col, col)];
        for j in 0..N {
            a[(col, j)] /= pivot;
            inv[(col, j)] /= pivot;
        }

        for row in 0..N {
            if row == col {
                continue;
            }
            let factor = a[(row, col)];
            if factor == 0.0 {
                continue;
            }
            for j in 0..N {
                a[(row, j)] -= factor * a[(col, j)];
                inv[(row, j)] -= factor * inv[(col, j)];
            }
        }
    }

    Some(inv)
}
