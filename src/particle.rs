use crate::{SimParams, Vec2};

/// Nodes in a particle's 4x4 kernel stencil.
pub const STENCIL_SIZE: usize = 16;

/// A Lagrangian material point.
///
/// `def_elastic` and `def_plastic` are the per-axis (diagonal) stretches of the
/// elastic and plastic parts of the deformation gradient; `(1, 1)` is
/// undeformed. `grid_position`, `weights` and `weight_gradients` are
/// interpolation caches refreshed by the grid each timestep, in stencil order
/// (row-major, bottom-left first).
#[derive(Clone, Debug, PartialEq)]
pub struct Particle {
    pub volume: f32,
    pub mass: f32,
    pub density: f32,
    pub position: Vec2,
    pub velocity: Vec2,
    pub lambda: f32,
    pub mu: f32,
    /// Hardening coefficient: Lamé parameters scale by `exp(hardening * (1 - Jp))`.
    pub hardening: f32,
    pub def_elastic: Vec2,
    pub def_plastic: Vec2,
    pub grid_position: Vec2,
    pub weights: [f32; STENCIL_SIZE],
    pub weight_gradients: [Vec2; STENCIL_SIZE],
}

impl Particle {
    /// Particle with the material constants from `params` and a unit volume
    /// placeholder until the grid estimates the real one.
    pub fn new(position: Vec2, velocity: Vec2, mass: f32, params: &SimParams) -> Self {
        Self {
            volume: 1.0,
            mass,
            density: mass,
            position,
            velocity,
            lambda: params.lambda,
            mu: params.mu,
            hardening: params.hardening,
            def_elastic: Vec2::splat(1.0),
            def_plastic: Vec2::splat(1.0),
            grid_position: Vec2::zero(),
            weights: [0.0; STENCIL_SIZE],
            weight_gradients: [Vec2::zero(); STENCIL_SIZE],
        }
    }

    pub fn with_lame(mut self, lambda: f32, mu: f32) -> Self {
        self.lambda = lambda;
        self.mu = mu;
        self
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
        self.density = self.mass / volume;
    }

    pub fn plastic_jacobian(&self) -> f32 {
        self.def_plastic.x * self.def_plastic.y
    }

    /// Lamé parameters after plastic hardening.
    pub fn hardened_lame(&self) -> (f32, f32) {
        let scale = (self.hardening * (1.0 - self.plastic_jacobian())).exp();
        (self.lambda * scale, self.mu * scale)
    }

    /// Diagonal of the Kirchhoff stress `P Feᵀ` for the fixed-corotated energy
    /// `mu * |Fe - I|² + lambda / 2 * (J - 1)²` restricted to diagonal `Fe`.
    pub fn stress_force(&self) -> Vec2 {
        let (lambda, mu) = self.hardened_lame();
        let f = self.def_elastic;
        let j = f.x * f.y;
        let piola = Vec2::new(
            2.0 * mu * (f.x - 1.0) + lambda * (j - 1.0) * f.y,
            2.0 * mu * (f.y - 1.0) + lambda * (j - 1.0) * f.x,
        );
        piola.mul_elem(f)
    }

    /// Change in [`Self::stress_force`] for a small change `d_def` of the
    /// elastic stretches, with `Fe` held fixed in the `Feᵀ` factor.
    pub fn stress_differential(&self, d_def: Vec2) -> Vec2 {
        let (lambda, mu) = self.hardened_lame();
        let f = self.def_elastic;
        let j = f.x * f.y;
        let h_xx = 2.0 * mu + lambda * f.y * f.y;
        let h_yy = 2.0 * mu + lambda * f.x * f.x;
        let h_xy = lambda * (2.0 * j - 1.0);
        let d_piola = Vec2::new(
            h_xx * d_def.x + h_xy * d_def.y,
            h_xy * d_def.x + h_yy * d_def.y,
        );
        d_piola.mul_elem(f)
    }

    /// Advances the deformation by the diagonal of the velocity gradient and
    /// pushes elastic stretch beyond the critical range into the plastic part.
    pub fn apply_velocity_gradient(&mut self, grad_diag: Vec2, params: &SimParams) {
        let step = Vec2::splat(1.0) + grad_diag * params.dt;
        let elastic = self.def_elastic.mul_elem(step);
        let total = elastic.mul_elem(self.def_plastic);
        let lo = 1.0 - params.critical_compression;
        let hi = 1.0 + params.critical_stretch;
        let clamped = Vec2::new(elastic.x.clamp(lo, hi), elastic.y.clamp(lo, hi));
        self.def_elastic = clamped;
        self.def_plastic = total.div_elem(clamped);
    }

    pub fn advance_position(&mut self, dt: f32) {
        self.position += self.velocity * dt;
    }
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

    fn particle() -> Particle {
        Particle::new(Vec2::zero(), Vec2::zero(), 1.0, &SimParams::default())
            .with_lame(2.0, 3.0)
    }

    #[test]
    fn rest_state_has_no_stress() {
        let p = particle();
        assert_eq!(p.stress_force(), Vec2::zero());
        assert_close(p.hardened_lame().0, 2.0, 1e-6);
    }

    #[test]
    fn stretch_gives_positive_stress() {
        let mut p = particle();
        p.def_elastic = Vec2::new(1.1, 1.0);
        let tau = p.stress_force();
        // P_x = 2*3*0.1 + 2*0.1*1.0 = 0.8, tau_x = 0.8 * 1.1
        assert_close(tau.x, 0.88, 1e-5);
        // P_y = 0 + 2*0.1*1.1 = 0.22
        assert_close(tau.y, 0.22, 1e-5);
    }

    #[test]
    fn stress_differential_matches_finite_difference() {
        let mut p = particle().with_lame(5.0, 2.0);
        p.def_elastic = Vec2::new(0.98, 1.004);
        let d = Vec2::new(1e-3, -5e-4);
        let base = p.stress_force();
        let analytic = p.stress_differential(d);
        let mut moved = p.clone();
        moved.def_elastic += d;
        // the Feᵀ factor moves too; compare against P only
        let p_base = base.div_elem(p.def_elastic);
        let p_moved = moved.stress_force().div_elem(moved.def_elastic);
        let fd = (p_moved - p_base).mul_elem(p.def_elastic);
        assert_close(analytic.x, fd.x, 2e-4);
        assert_close(analytic.y, fd.y, 2e-4);
    }

    #[test]
    fn plastic_compaction_hardens() {
        let mut p = particle();
        p.def_plastic = Vec2::new(0.9, 1.0);
        let (lambda, mu) = p.hardened_lame();
        let scale = (10.0_f32 * 0.1).exp();
        assert_close(lambda, 2.0 * scale, 1e-4);
        assert_close(mu, 3.0 * scale, 1e-4);
    }

    #[test]
    fn velocity_gradient_within_limits_stays_elastic() {
        let params = SimParams::default();
        let mut p = particle();
        let grad = Vec2::new(5.0, -10.0);
        p.apply_velocity_gradient(grad, &params);
        assert_close(p.def_elastic.x, 1.0 + 5.0 * params.dt, 1e-6);
        assert_close(p.def_elastic.y, 1.0 - 10.0 * params.dt, 1e-6);
        assert_eq!(p.def_plastic, Vec2::splat(1.0));
    }

    #[test]
    fn excess_stretch_moves_into_plastic_part() {
        let params = SimParams {
            dt: 1.0,
            ..SimParams::default()
        };
        let mut p = particle();
        p.apply_velocity_gradient(Vec2::new(0.1, -0.2), &params);
        assert_close(p.def_elastic.x, 1.0 + params.critical_stretch, 1e-6);
        assert_close(p.def_elastic.y, 1.0 - params.critical_compression, 1e-6);
        // total deformation is preserved
        assert_close(p.def_elastic.x * p.def_plastic.x, 1.1, 1e-5);
        assert_close(p.def_elastic.y * p.def_plastic.y, 0.8, 1e-5);
    }

    #[test]
    fn set_volume_keeps_density_in_sync() {
        let mut p = particle();
        p.mass = 2.0;
        p.set_volume(0.5);
        assert_close(p.density, 4.0, 1e-6);
    }
}
