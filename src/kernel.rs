//! Cubic B-spline interpolation kernel with support `[0, 2)` cells.

use crate::Vec2;

pub const BSPLINE_EPSILON: f32 = 1e-6;

/// How near-zero slopes are snapped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SlopeClamp {
    /// Only magnitudes below `BSPLINE_EPSILON` snap to zero; negative slopes survive.
    #[default]
    Magnitude,
    /// Same signed clamp as the weight: every slope below `BSPLINE_EPSILON`
    /// (so every negative one) becomes zero, values above one become one.
    Legacy,
}

/// Kernel weight for a non-negative distance `x` in cell units.
pub fn bspline(x: f32) -> f32 {
    let w = if x < 1.0 {
        x * x * (x / 2.0 - 1.0) + 2.0 / 3.0
    } else if x < 2.0 {
        x * (x * (-x / 6.0 + 1.0) - 2.0) + 4.0 / 3.0
    } else {
        return 0.0;
    };
    if w < BSPLINE_EPSILON {
        return 0.0;
    }
    if w > 1.0 {
        return 1.0;
    }
    w
}

fn raw_slope(x: f32) -> f32 {
    if x < 1.0 {
        x * (1.5 * x - 2.0)
    } else if x < 2.0 {
        x * (2.0 - x / 2.0) - 2.0
    } else {
        0.0
    }
}

/// Derivative of [`bspline`] with respect to the distance.
pub fn bspline_slope(x: f32) -> f32 {
    let w = raw_slope(x);
    if w.abs() < BSPLINE_EPSILON {
        0.0
    } else {
        w
    }
}

pub fn bspline_slope_legacy(x: f32) -> f32 {
    let w = raw_slope(x);
    if w < BSPLINE_EPSILON {
        return 0.0;
    }
    if w > 1.0 {
        return 1.0;
    }
    w
}

impl SlopeClamp {
    pub fn slope(self, x: f32) -> f32 {
        match self {
            SlopeClamp::Magnitude => bspline_slope(x),
            SlopeClamp::Legacy => bspline_slope_legacy(x),
        }
    }
}

/// Separable 2-D weight for an offset (particle minus node) in cell units.
pub fn weight_2d(offset: Vec2) -> f32 {
    bspline(offset.x.abs()) * bspline(offset.y.abs())
}

/// World-space gradient of [`weight_2d`] with respect to the particle position.
pub fn weight_gradient_2d(offset: Vec2, cellsize: Vec2, clamp: SlopeClamp) -> Vec2 {
    let ax = offset.x.abs();
    let ay = offset.y.abs();
    let wx = bspline(ax);
    let wy = bspline(ay);
    let sx = offset.x.signum() * clamp.slope(ax);
    let sy = offset.y.signum() * clamp.slope(ay);
    Vec2::new(sx * wy / cellsize.x, wx * sy / cellsize.y)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f32, b: f32, tol: f32) {
        assert!(
            (a - b).abs() <= tol,
            "expected {a} to be within {tol} of {b}"
        );
    }

    #[test]
    fn bspline_exact_values() {
        assert_close(bspline(0.0), 2.0 / 3.0, 1e-6);
        assert_close(bspline(1.0), 1.0 / 6.0, 1e-6);
        assert_close(bspline(2.0), 0.0, 1e-6);
        assert_close(bspline(3.0), 0.0, 1e-6);
    }

    #[test]
    fn bspline_snaps_tail_to_zero() {
        // (2 - x)^3 / 6 drops below the epsilon just short of the support edge.
        assert_eq!(bspline(1.999), 0.0);
        assert!(bspline(1.9) > 0.0);
    }

    #[test]
    fn legacy_slope_zeroes_negative_values() {
        assert_eq!(bspline_slope_legacy(0.5), 0.0);
        assert_eq!(bspline_slope_legacy(1.5), 0.0);
        assert_eq!(SlopeClamp::Legacy.slope(0.5), 0.0);
    }

    #[test]
    fn magnitude_slope_keeps_sign() {
        assert_close(bspline_slope(0.5), -0.625, 1e-6);
        assert_close(bspline_slope(1.5), -0.125, 1e-6);
        assert_eq!(bspline_slope(0.0), 0.0);
        assert_eq!(bspline_slope(2.5), 0.0);
    }

    #[test]
    fn slope_matches_finite_difference() {
        let h = 1e-3;
        for &x in &[0.25_f32, 0.75, 1.25, 1.6] {
            let fd = (bspline(x + h) - bspline(x - h)) / (2.0 * h);
            assert_close(bspline_slope(x), fd, 1e-3);
        }
    }

    #[test]
    fn weights_partition_unity_along_axis() {
        for &frac in &[0.0_f32, 0.2, 0.5, 0.9] {
            let sum: f32 = (-1..=2).map(|i| bspline((frac - i as f32).abs())).sum();
            assert_close(sum, 1.0, 1e-5);
        }
    }

    #[test]
    fn gradient_points_away_from_node() {
        let cellsize = Vec2::new(0.5, 0.5);
        let grad = weight_gradient_2d(Vec2::new(0.5, 0.0), cellsize, SlopeClamp::Magnitude);
        // weight falls as the particle moves away in +x, so d/dx < 0
        assert!(grad.x < 0.0);
        assert_close(grad.y, 0.0, 1e-6);
        let grad = weight_gradient_2d(Vec2::new(-0.5, 0.0), cellsize, SlopeClamp::Magnitude);
        assert!(grad.x > 0.0);
    }
}
