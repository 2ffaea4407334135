use crate::params::should_parallel;
use crate::{Particle, Vec2};
use rayon::prelude::*;

/// Ordered particle storage. Grids borrow it for one timestep; indices are
/// stable for as long as a grid holds the borrow.
#[derive(Clone, Debug, Default)]
pub struct PointCloud {
    particles: Vec<Particle>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CloudBounds {
    pub min: Vec2,
    pub max: Vec2,
}

impl PointCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            particles: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn push(&mut self, particle: Particle) {
        self.particles.push(particle);
    }

    pub fn get(&self, index: usize) -> Option<&Particle> {
        self.particles.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Particle> {
        self.particles.get_mut(index)
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// Mutable view of the particles. The slice cannot grow or shrink.
    pub fn particles_mut(&mut self) -> &mut [Particle] {
        &mut self.particles
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Particle> {
        self.particles.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Particle> {
        self.particles.iter_mut()
    }

    pub fn bounds(&self) -> Option<CloudBounds> {
        let first = self.particles.first()?;
        let mut min = first.position;
        let mut max = first.position;
        for p in &self.particles[1..] {
            min.x = min.x.min(p.position.x);
            min.y = min.y.min(p.position.y);
            max.x = max.x.max(p.position.x);
            max.y = max.y.max(p.position.y);
        }
        Some(CloudBounds { min, max })
    }

    pub fn total_mass(&self) -> f32 {
        self.particles.iter().map(|p| p.mass).sum()
    }

    pub fn total_momentum(&self) -> Vec2 {
        self.particles.iter().map(|p| p.velocity * p.mass).sum()
    }

    pub fn max_speed(&self) -> f32 {
        let mut max_sq = 0.0_f32;
        for p in &self.particles {
            if !p.velocity.is_finite() {
                return f32::INFINITY;
            }
            max_sq = max_sq.max(p.velocity.length_squared());
        }
        max_sq.sqrt()
    }

    pub fn advance_positions(&mut self, dt: f32) {
        if should_parallel(self.particles.len()) {
            self.particles
                .par_iter_mut()
                .for_each(|p| p.advance_position(dt));
        } else {
            for p in &mut self.particles {
                p.advance_position(dt);
            }
        }
    }
}

impl From<Vec<Particle>> for PointCloud {
    fn from(particles: Vec<Particle>) -> Self {
        Self { particles }
    }
}

impl<'a> IntoIterator for &'a PointCloud {
    type Item = &'a Particle;
    type IntoIter = std::slice::Iter<'a, Particle>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
