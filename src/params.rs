use crate::{SnowError, SnowResult, SlopeClamp, Vec2};
use std::sync::OnceLock;

const PAR_THRESHOLD_DEFAULT: usize = 32_768;
const PAR_MIN_WORK_PER_THREAD: usize = 2048;

fn parallel_threshold() -> usize {
    static THRESHOLD: OnceLock<usize> = OnceLock::new();
    *THRESHOLD.get_or_init(|| {
        std::env::var("SIM_PAR_THRESHOLD")
            .ok()
            .and_then(|value| value.parse::<usize>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(PAR_THRESHOLD_DEFAULT)
    })
}

pub(crate) fn should_parallel(len: usize) -> bool {
    if len < parallel_threshold() {
        return false;
    }
    let threads = rayon::current_num_threads().max(1);
    len / threads >= PAR_MIN_WORK_PER_THREAD
}

pub const YOUNGS_MODULUS: f32 = 1.4e5;
pub const POISSONS_RATIO: f32 = 0.2;

/// Lamé parameters `(lambda, mu)` for a Young's modulus and Poisson ratio.
pub fn lame_parameters(youngs_modulus: f32, poissons_ratio: f32) -> (f32, f32) {
    let lambda = youngs_modulus * poissons_ratio
        / ((1.0 + poissons_ratio) * (1.0 - 2.0 * poissons_ratio));
    let mu = youngs_modulus / (2.0 * (1.0 + poissons_ratio));
    (lambda, mu)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimParams {
    pub dt: f32,
    pub gravity: Vec2,
    /// Blend between explicit (0) and fully implicit (1) force response.
    pub implicit_ratio: f32,
    pub solver_tolerance: f32,
    pub solver_max_iterations: usize,
    pub lambda: f32,
    pub mu: f32,
    pub critical_compression: f32,
    pub critical_stretch: f32,
    pub hardening: f32,
    pub slope_clamp: SlopeClamp,
}

impl Default for SimParams {
    fn default() -> Self {
        let (lambda, mu) = lame_parameters(YOUNGS_MODULUS, POISSONS_RATIO);
        Self {
            dt: 5e-4,
            gravity: Vec2::new(0.0, -9.8),
            implicit_ratio: 0.5,
            solver_tolerance: 1e-5,
            solver_max_iterations: 30,
            lambda,
            mu,
            critical_compression: 2.5e-2,
            critical_stretch: 7.5e-3,
            hardening: 10.0,
            slope_clamp: SlopeClamp::Magnitude,
        }
    }
}

impl SimParams {
    pub fn validate(&self) -> SnowResult<()> {
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(SnowError::config(format!("dt must be > 0, got {}", self.dt)));
        }
        if !self.gravity.is_finite() {
            return Err(SnowError::config("gravity must be finite"));
        }
        if !(0.0..=1.0).contains(&self.implicit_ratio) {
            return Err(SnowError::config(format!(
                "implicit_ratio must be within [0, 1], got {}",
                self.implicit_ratio
            )));
        }
        if !(self.solver_tolerance.is_finite() && self.solver_tolerance >= 0.0) {
            return Err(SnowError::config(format!(
                "solver_tolerance must be >= 0, got {}",
                self.solver_tolerance
            )));
        }
        let lame_ok = |value: f32| value.is_finite() && value >= 0.0;
        if !(lame_ok(self.lambda) && lame_ok(self.mu)) {
            return Err(SnowError::config(format!(
                "Lamé parameters must be finite and >= 0, got lambda={} mu={}",
                self.lambda, self.mu
            )));
        }
        if !(0.0..1.0).contains(&self.critical_compression) {
            return Err(SnowError::config(format!(
                "critical_compression must be within [0, 1), got {}",
                self.critical_compression
            )));
        }
        if !(self.critical_stretch.is_finite() && self.critical_stretch >= 0.0) {
            return Err(SnowError::config(format!(
                "critical_stretch must be >= 0, got {}",
                self.critical_stretch
            )));
        }
        if !self.hardening.is_finite() {
            return Err(SnowError::config("hardening must be finite"));
        }
        Ok(())
    }
}
