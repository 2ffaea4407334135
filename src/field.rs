use crate::params::should_parallel;
use crate::{Lattice2, Vec2};
use rayon::prelude::*;

/// One vector per lattice node.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeField {
    lattice: Lattice2,
    data: Vec<Vec2>,
}

impl NodeField {
    pub fn new(lattice: Lattice2, fill: Vec2) -> Self {
        let data = vec![fill; lattice.size()];
        Self { lattice, data }
    }

    pub fn from_fn(lattice: Lattice2, f: impl Fn(usize) -> Vec2 + Sync) -> Self {
        let mut data = vec![Vec2::zero(); lattice.size()];
        if should_parallel(data.len()) {
            data.par_iter_mut().enumerate().for_each(|(i, value)| {
                *value = f(i);
            });
        } else {
            for (i, value) in data.iter_mut().enumerate() {
                *value = f(i);
            }
        }
        Self { lattice, data }
    }

    pub fn from_data(lattice: Lattice2, data: Vec<Vec2>) -> Self {
        assert_eq!(data.len(), lattice.size(), "node field data mismatch");
        Self { lattice, data }
    }

    pub fn lattice(&self) -> Lattice2 {
        self.lattice
    }

    pub fn get(&self, idx: usize) -> Vec2 {
        self.data[idx]
    }

    pub fn set(&mut self, idx: usize, value: Vec2) {
        self.data[idx] = value;
    }

    pub fn as_mut_slice(&mut self) -> &mut [Vec2] {
        &mut self.data
    }

    pub fn clone_from(&mut self, other: &Self) {
        self.assert_same_lattice(other);
        self.data.clone_from(&other.data);
    }

    /// `self = other + scale * self`
    pub fn scale_and_add_in_place(&mut self, scale: f32, other: &Self) {
        self.assert_same_lattice(other);
        if should_parallel(self.data.len()) {
            self.data
                .par_iter_mut()
                .zip(other.data.par_iter())
                .for_each(|(value, o)| *value = *o + *value * scale);
        } else {
            for (value, o) in self.data.iter_mut().zip(other.data.iter()) {
                *value = *o + *value * scale;
            }
        }
    }

    /// `sum_i weights[i] * (self_i . other_i)`
    pub fn weighted_dot(&self, other: &Self, weights: &[f32]) -> f32 {
        self.assert_same_lattice(other);
        assert_eq!(weights.len(), self.data.len(), "weight length mismatch");
        if should_parallel(self.data.len()) {
            self.data
                .par_iter()
                .zip(other.data.par_iter())
                .zip(weights.par_iter())
                .map(|((a, b), w)| w * a.dot(*b))
                .sum()
        } else {
            self.data
                .iter()
                .zip(other.data.iter())
                .zip(weights.iter())
                .map(|((a, b), w)| w * a.dot(*b))
                .sum()
        }
    }

    pub fn max_norm(&self) -> f32 {
        self.data
            .iter()
            .map(|value| value.length())
            .fold(0.0_f32, f32::max)
    }

    fn assert_same_lattice(&self, other: &Self) {
        assert_eq!(self.lattice, other.lattice, "node field lattice mismatch");
    }
}
