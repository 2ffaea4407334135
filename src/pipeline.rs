use crate::solver::SolveReport;
use crate::{Grid, PointCloud, SimParams, SnowResult, Vec2};

/// What one call to [`step`] did.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepReport {
    pub solve: SolveReport,
    pub grid_width: usize,
    pub grid_height: usize,
    /// Mass deposited on the grid; matches the cloud's total mass.
    pub grid_mass: f32,
    pub max_speed: f32,
}

/// Advances `cloud` by one timestep on a fresh grid enclosing it.
///
/// Particle volumes are estimated only when `first_step` is set; later steps
/// keep the volumes from the first one.
pub fn step(
    cloud: &mut PointCloud,
    cellsize: Vec2,
    params: SimParams,
    first_step: bool,
) -> SnowResult<StepReport> {
    let (solve, grid_width, grid_height, grid_mass) = {
        let mut grid = Grid::enclosing(cloud, cellsize, params)?;
        grid.initialize_mass();
        grid.initialize_velocities();
        if first_step {
            grid.calculate_volumes();
        }
        grid.explicit_velocities(params.gravity);
        let solve = grid.implicit_velocities();
        grid.update_velocities();
        let lattice = grid.lattice();
        (solve, lattice.width(), lattice.height(), grid.total_mass())
    };
    cloud.advance_positions(params.dt);
    let max_speed = cloud.max_speed();
    if !max_speed.is_finite() {
        log::warn!("particle velocities are no longer finite");
    }
    log::debug!(
        "step: {} particles, grid {}x{}, max speed {:.4e}",
        cloud.len(),
        grid_width,
        grid_height,
        max_speed
    );
    Ok(StepReport {
        solve,
        grid_width,
        grid_height,
        grid_mass,
        max_speed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Particle, SnowError};

    fn assert_close(a: f32, b: f32, tol: f32) {
        assert!(
            (a - b).abs() <= tol,
            "expected {a} to be within {tol} of {b}"
        );
    }

    #[test]
    fn empty_cloud_is_an_error() {
        let mut cloud = PointCloud::new();
        let result = step(&mut cloud, Vec2::splat(0.1), SimParams::default(), true);
        assert_eq!(result, Err(SnowError::EmptyCloud));
    }

    #[test]
    fn invalid_params_are_rejected_before_touching_particles() {
        let params = SimParams {
            dt: -1.0,
            ..SimParams::default()
        };
        let mut cloud = PointCloud::from(vec![Particle::new(
            Vec2::new(1.0, 1.0),
            Vec2::new(1.0, 0.0),
            1.0,
            &params,
        )]);
        let result = step(&mut cloud, Vec2::splat(0.1), params, true);
        assert!(matches!(result, Err(SnowError::Configuration { .. })));
        assert_eq!(cloud.particles()[0].position, Vec2::new(1.0, 1.0));
    }

    #[test]
    fn lone_particle_falls_freely() {
        let params = SimParams::default();
        let mut cloud = PointCloud::from(vec![Particle::new(
            Vec2::new(0.52, 0.47),
            Vec2::zero(),
            0.2,
            &params,
        )]);
        let report = step(&mut cloud, Vec2::splat(0.05), params, true).unwrap();
        assert_close(report.grid_mass, 0.2, 1e-5);
        let p = &cloud.particles()[0];
        assert_close(p.velocity.x, 0.0, 1e-4);
        assert_close(p.velocity.y, params.gravity.y * params.dt, 1e-4);
        assert_close(p.position.y, 0.47 + p.velocity.y * params.dt, 1e-6);
    }
}
