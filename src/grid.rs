//! Background grid: particle-to-grid transfer, explicit and implicit velocity
//! updates, and grid-to-particle scatter for one timestep.

use crate::kernel::{weight_2d, weight_gradient_2d};
use crate::params::should_parallel;
use crate::particle::STENCIL_SIZE;
use crate::solver::{solve_conjugate_residual, SolveReport};
use crate::{Lattice2, NodeField, Particle, PointCloud, SimParams, SnowError, SnowResult, Vec2};
use rayon::prelude::*;
use std::ops::AddAssign;

/// Kernel support in cells on each side of a particle.
pub const SUPPORT_RADIUS: f32 = 2.0;

/// Largest node count a grid may allocate.
pub const MAX_GRID_NODES: usize = 1 << 28;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GridNode {
    pub mass: f32,
    /// `mass > 0`, so `velocity` is meaningful.
    pub has_velocity: bool,
    pub force: Vec2,
    pub velocity: Vec2,
    pub velocity_new: Vec2,
}

pub struct Grid<'a> {
    origin: Vec2,
    size: Vec2,
    cellsize: Vec2,
    node_volume: f32,
    lattice: Lattice2,
    nodes: Vec<GridNode>,
    cloud: &'a mut PointCloud,
    params: SimParams,
}

impl<'a> Grid<'a> {
    /// Grid over `[origin, origin + size]`. Every particle's 4x4 kernel
    /// stencil must fall inside it.
    pub fn new(
        origin: Vec2,
        size: Vec2,
        cellsize: Vec2,
        cloud: &'a mut PointCloud,
        params: SimParams,
    ) -> SnowResult<Self> {
        params.validate()?;
        check_cellsize(cellsize)?;
        if !(origin.is_finite() && size.is_finite() && size.x >= 0.0 && size.y >= 0.0) {
            return Err(SnowError::config(format!(
                "grid size must be finite and >= 0, got ({}, {})",
                size.x, size.y
            )));
        }
        let width = (f64::from(size.x) / f64::from(cellsize.x)).round() + 1.0;
        let height = (f64::from(size.y) / f64::from(cellsize.y)).round() + 1.0;
        if !(width * height <= MAX_GRID_NODES as f64) {
            return Err(SnowError::config(format!(
                "grid of {width}x{height} nodes exceeds the limit of {MAX_GRID_NODES}"
            )));
        }
        let lattice = Lattice2::spanning(origin, size, cellsize);
        if let Some((index, particle)) = cloud
            .iter()
            .enumerate()
            .find(|(_, p)| !lattice.contains_stencil(lattice.to_grid(p.position)))
        {
            return Err(SnowError::config(format!(
                "particle {index} at ({}, {}) has kernel support outside the grid",
                particle.position.x, particle.position.y
            )));
        }
        log::debug!(
            "grid {}x{} nodes for {} particles",
            lattice.width(),
            lattice.height(),
            cloud.len()
        );
        Ok(Self {
            origin,
            size,
            cellsize,
            node_volume: lattice.cell_area(),
            lattice,
            nodes: vec![GridNode::default(); lattice.size()],
            cloud,
            params,
        })
    }

    /// Grid around the cloud's bounding box with room for the kernel support.
    pub fn enclosing(
        cloud: &'a mut PointCloud,
        cellsize: Vec2,
        params: SimParams,
    ) -> SnowResult<Self> {
        let bounds = cloud.bounds().ok_or(SnowError::EmptyCloud)?;
        check_cellsize(cellsize)?;
        let margin = cellsize * SUPPORT_RADIUS;
        let extent = bounds.max - bounds.min;
        let cells_x = (extent.x / cellsize.x).ceil() + 2.0 * SUPPORT_RADIUS;
        let cells_y = (extent.y / cellsize.y).ceil() + 2.0 * SUPPORT_RADIUS;
        let size = Vec2::new(cells_x * cellsize.x, cells_y * cellsize.y);
        Self::new(bounds.min - margin, size, cellsize, cloud, params)
    }

    pub fn origin(&self) -> Vec2 {
        self.origin
    }

    pub fn size(&self) -> Vec2 {
        self.size
    }

    pub fn cellsize(&self) -> Vec2 {
        self.cellsize
    }

    pub fn node_volume(&self) -> f32 {
        self.node_volume
    }

    pub fn lattice(&self) -> Lattice2 {
        self.lattice
    }

    pub fn params(&self) -> &SimParams {
        &self.params
    }

    pub fn nodes(&self) -> &[GridNode] {
        &self.nodes
    }

    pub fn node(&self, x: usize, y: usize) -> &GridNode {
        &self.nodes[self.lattice.idx(x, y)]
    }

    pub fn cloud(&self) -> &PointCloud {
        &*self.cloud
    }

    pub fn total_mass(&self) -> f32 {
        self.nodes.iter().map(|n| n.mass).sum()
    }

    pub fn total_momentum(&self) -> Vec2 {
        self.nodes.iter().map(|n| n.velocity * n.mass).sum()
    }

    /// Caches interpolation state on every particle and accumulates node mass.
    pub fn initialize_mass(&mut self) {
        let lattice = self.lattice;
        let clamp = self.params.slope_clamp;
        let particles = self.cloud.particles_mut();
        if should_parallel(particles.len()) {
            particles
                .par_iter_mut()
                .for_each(|p| bind_particle(lattice, clamp, p));
        } else {
            for p in particles.iter_mut() {
                bind_particle(lattice, clamp, p);
            }
        }
        let masses = scatter(self.cloud.particles(), lattice, |p, acc: &mut [f32]| {
            for (k, idx) in stencil(lattice, p.grid_position) {
                let w = p.weights[k];
                if w > 0.0 {
                    acc[idx] += w * p.mass;
                }
            }
        });
        for (node, mass) in self.nodes.iter_mut().zip(masses) {
            node.mass = mass;
        }
        log::debug!("initialized grid mass: {:.6e}", self.total_mass());
    }

    /// Accumulates momentum and turns it into node velocities.
    pub fn initialize_velocities(&mut self) {
        let lattice = self.lattice;
        let momentum = scatter(self.cloud.particles(), lattice, |p, acc: &mut [Vec2]| {
            let pm = p.velocity * p.mass;
            for (k, idx) in stencil(lattice, p.grid_position) {
                let w = p.weights[k];
                if w > 0.0 {
                    acc[idx] += pm * w;
                }
            }
        });
        let mut active = 0;
        for (node, momentum) in self.nodes.iter_mut().zip(momentum) {
            if node.mass > 0.0 {
                node.velocity = momentum * (1.0 / node.mass);
                node.has_velocity = true;
                active += 1;
            } else {
                node.velocity = Vec2::zero();
                node.has_velocity = false;
            }
            node.velocity_new = node.velocity;
        }
        log::debug!("{active} grid nodes carry velocity");
    }

    /// Estimates particle volumes from the grid density. Run once, on the
    /// first timestep, after [`Self::initialize_mass`].
    pub fn calculate_volumes(&mut self) {
        let lattice = self.lattice;
        let node_volume = self.node_volume;
        let nodes = &self.nodes;
        let estimate = |p: &mut Particle| {
            let mass: f32 = stencil(lattice, p.grid_position)
                .map(|(k, idx)| p.weights[k] * nodes[idx].mass)
                .sum();
            let density = mass / node_volume;
            if density > 0.0 {
                p.set_volume(p.mass / density);
                true
            } else {
                false
            }
        };
        let particles = self.cloud.particles_mut();
        let missing = if should_parallel(particles.len()) {
            particles
                .par_iter_mut()
                .map(|p| usize::from(!estimate(p)))
                .sum::<usize>()
        } else {
            particles
                .iter_mut()
                .map(|p| usize::from(!estimate(p)))
                .sum::<usize>()
        };
        if missing > 0 {
            log::warn!("{missing} particles saw no grid mass; volumes left unchanged");
        }
    }

    /// Forward-Euler node velocities from gravity and elastic stress.
    pub fn explicit_velocities(&mut self, gravity: Vec2) {
        let dt = self.params.dt;
        let internal = self.assemble_forces(|p| p.stress_force());
        for (node, internal) in self.nodes.iter_mut().zip(internal) {
            if node.mass > 0.0 {
                node.force = gravity * node.mass + internal;
                node.velocity_new = node.velocity + node.force * (dt / node.mass);
            } else {
                node.force = Vec2::zero();
                node.velocity_new = Vec2::zero();
            }
        }
    }

    /// Backward-Euler correction of `velocity_new`, solved matrix-free.
    pub fn implicit_velocities(&mut self) -> SolveReport {
        let lattice = self.lattice;
        let nodes: Vec<usize> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.mass > 0.0)
            .map(|(i, _)| i)
            .collect();
        let rhs = NodeField::from_fn(lattice, |i| {
            let node = &self.nodes[i];
            if node.mass > 0.0 {
                node.velocity_new
            } else {
                Vec2::zero()
            }
        });
        let masses: Vec<f32> = self.nodes.iter().map(|n| n.mass).collect();
        let mut x = rhs.clone();
        let report = {
            let this = &*self;
            solve_conjugate_residual(
                |input, out| this.apply_implicit_operator(input, out),
                &rhs,
                &mut x,
                &nodes,
                &masses,
                self.params.solver_tolerance,
                self.params.solver_max_iterations,
            )
        };
        for &i in &nodes {
            self.nodes[i].velocity_new = x.get(i);
        }
        if report.is_converged() {
            log::debug!(
                "implicit solve converged in {} iterations over {} nodes",
                report.iterations,
                report.nodes
            );
        } else {
            log::warn!(
                "implicit solve stopped ({:?}) after {} iterations, {} of {} nodes unconverged, residual {:.3e}",
                report.status,
                report.iterations,
                report.active_nodes,
                report.nodes,
                report.residual
            );
        }
        report
    }

    /// Force response to a trial node velocity field: the stress change
    /// caused by deforming every particle with that field over one timestep.
    pub fn recompute_implicit_forces(&self, velocities: &NodeField) -> NodeField {
        let dt = self.params.dt;
        let lattice = self.lattice;
        let forces = self.assemble_forces(|p| {
            let mut grad = Vec2::zero();
            for (k, idx) in stencil(lattice, p.grid_position) {
                if p.weights[k] > 0.0 {
                    grad += velocities.get(idx).mul_elem(p.weight_gradients[k]);
                }
            }
            let d_def = (grad * dt).mul_elem(p.def_elastic);
            p.stress_differential(d_def)
        });
        NodeField::from_data(lattice, forces)
    }

    /// `out = v - beta * dt * M^-1 * dF(v)` on nodes with mass, zero elsewhere.
    fn apply_implicit_operator(&self, input: &NodeField, out: &mut NodeField) {
        let scale = self.params.implicit_ratio * self.params.dt;
        let forces = self.recompute_implicit_forces(input);
        for (i, node) in self.nodes.iter().enumerate() {
            let value = if node.mass > 0.0 {
                input.get(i) - forces.get(i) * (scale / node.mass)
            } else {
                Vec2::zero()
            };
            out.set(i, value);
        }
    }

    /// Writes interpolated velocities and updated deformation back to particles.
    pub fn update_velocities(&mut self) {
        let lattice = self.lattice;
        let params = self.params;
        let nodes = &self.nodes;
        let gather = |p: &mut Particle| {
            let mut velocity = Vec2::zero();
            let mut grad_diag = Vec2::zero();
            for (k, idx) in stencil(lattice, p.grid_position) {
                let w = p.weights[k];
                if w > 0.0 {
                    let v = nodes[idx].velocity_new;
                    velocity += v * w;
                    grad_diag += v.mul_elem(p.weight_gradients[k]);
                }
            }
            p.velocity = velocity;
            p.apply_velocity_gradient(grad_diag, &params);
        };
        let particles = self.cloud.particles_mut();
        if should_parallel(particles.len()) {
            particles.par_iter_mut().for_each(gather);
        } else {
            particles.iter_mut().for_each(gather);
        }
    }

    /// Sums `-volume * stress(p) ⊙ ∇w` onto every node the particle touches.
    fn assemble_forces(&self, stress: impl Fn(&Particle) -> Vec2 + Sync) -> Vec<Vec2> {
        let lattice = self.lattice;
        scatter(self.cloud.particles(), lattice, |p, acc: &mut [Vec2]| {
            let tau = stress(p);
            for (k, idx) in stencil(lattice, p.grid_position) {
                if p.weights[k] > 0.0 {
                    acc[idx] -= tau.mul_elem(p.weight_gradients[k]) * p.volume;
                }
            }
        })
    }
}

fn check_cellsize(cellsize: Vec2) -> SnowResult<()> {
    if cellsize.is_finite() && cellsize.x > 0.0 && cellsize.y > 0.0 {
        Ok(())
    } else {
        Err(SnowError::config(format!(
            "cellsize must be > 0, got ({}, {})",
            cellsize.x, cellsize.y
        )))
    }
}

/// `(stencil slot, node index)` pairs for the 4x4 stencil around `grid_pos`,
/// skipping nodes outside the lattice.
fn stencil(lattice: Lattice2, grid_pos: Vec2) -> impl Iterator<Item = (usize, usize)> {
    let (bx, by) = lattice.stencil_base(grid_pos);
    (0..STENCIL_SIZE).filter_map(move |k| {
        let x = bx + (k % 4) as i32;
        let y = by + (k / 4) as i32;
        lattice.try_idx(x, y).map(|idx| (k, idx))
    })
}

fn bind_particle(lattice: Lattice2, clamp: crate::SlopeClamp, p: &mut Particle) {
    p.grid_position = lattice.to_grid(p.position);
    p.weights = [0.0; STENCIL_SIZE];
    p.weight_gradients = [Vec2::zero(); STENCIL_SIZE];
    for (k, idx) in stencil(lattice, p.grid_position) {
        let (x, y) = lattice.coords(idx);
        let offset = p.grid_position - Vec2::new(x as f32, y as f32);
        p.weights[k] = weight_2d(offset);
        p.weight_gradients[k] = weight_gradient_2d(offset, lattice.cellsize(), clamp);
    }
}

/// Particle-to-node reduction; threads fill private node arrays that are
/// summed afterwards.
fn scatter<T, F>(particles: &[Particle], lattice: Lattice2, f: F) -> Vec<T>
where
    T: Copy + Default + Send + AddAssign,
    F: Fn(&Particle, &mut [T]) + Sync,
{
    let len = lattice.size();
    if should_parallel(particles.len()) {
        particles
            .par_iter()
            .fold(
                || vec![T::default(); len],
                |mut acc, p| {
                    f(p, &mut acc);
                    acc
                },
            )
            .reduce(
                || vec![T::default(); len],
                |mut a, b| {
                    for (x, y) in a.iter_mut().zip(b) {
                        *x += y;
                    }
                    a
                },
            )
    } else {
        let mut acc = vec![T::default(); len];
        for p in particles {
            f(p, &mut acc);
        }
        acc
    }
}
