use snow_mpm::{step, Particle, PointCloud, SimParams, SolveStatus, Vec2};

fn assert_close(a: f32, b: f32, tol: f32) {
    assert!(
        (a - b).abs() <= tol,
        "expected {a} to be within {tol} of {b}"
    );
}

fn snow_block(params: &SimParams) -> PointCloud {
    let spacing = 0.025;
    let mut cloud = PointCloud::with_capacity(12 * 8);
    for j in 0..8 {
        for i in 0..12 {
            let position = Vec2::new(0.5 + i as f32 * spacing, 0.8 + j as f32 * spacing);
            cloud.push(Particle::new(position, Vec2::zero(), 0.25, params));
        }
    }
    cloud
}

#[test]
fn first_step_estimates_volumes_and_conserves_mass() {
    let params = SimParams::default();
    let mut cloud = snow_block(&params);
    let total_mass = cloud.total_mass();
    let report = step(&mut cloud, Vec2::splat(0.05), params, true).unwrap();

    assert_close(report.grid_mass, total_mass, total_mass * 1e-4);
    assert_close(cloud.total_mass(), total_mass, 1e-6);
    for p in cloud.iter() {
        assert!(p.volume > 0.0 && p.volume != 1.0, "volume {}", p.volume);
        assert_close(p.density * p.volume, p.mass, 1e-4);
    }
}

#[test]
fn later_steps_keep_first_step_volumes() {
    let params = SimParams::default();
    let mut cloud = snow_block(&params);
    step(&mut cloud, Vec2::splat(0.05), params, true).unwrap();
    let volumes: Vec<f32> = cloud.iter().map(|p| p.volume).collect();
    step(&mut cloud, Vec2::splat(0.05), params, false).unwrap();
    for (p, volume) in cloud.iter().zip(volumes) {
        assert_eq!(p.volume, volume);
    }
}

#[test]
fn block_falls_under_gravity() {
    let params = SimParams::default();
    let mut cloud = snow_block(&params);
    let start_y: f32 = cloud.iter().map(|p| p.position.y).sum::<f32>() / cloud.len() as f32;
    let steps = 5;
    for n in 0..steps {
        let report = step(&mut cloud, Vec2::splat(0.05), params, n == 0).unwrap();
        assert_ne!(report.solve.status, SolveStatus::Stagnated);
        assert!(report.max_speed.is_finite());
    }

    // internal forces cancel, so the centre of mass follows gravity
    let velocity = cloud.total_momentum() * (1.0 / cloud.total_mass());
    let expected = params.gravity.y * params.dt * steps as f32;
    assert_close(velocity.y, expected, expected.abs() * 0.05);
    assert_close(velocity.x, 0.0, expected.abs() * 0.05);

    let end_y: f32 = cloud.iter().map(|p| p.position.y).sum::<f32>() / cloud.len() as f32;
    assert!(end_y < start_y);
    for p in cloud.iter() {
        assert!(p.velocity.is_finite());
        assert!(p.def_elastic.x >= 1.0 - params.critical_compression - 1e-6);
        assert!(p.def_elastic.x <= 1.0 + params.critical_stretch + 1e-6);
    }
}
