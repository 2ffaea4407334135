//! Matrix-free conjugate-residual solve with a shrinking set of active nodes.

use crate::{Lattice2, NodeField, Vec2};

const STAGNATION_EPSILON: f32 = 1e-30;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolveStatus {
    Converged,
    MaxIterationsReached,
    /// A recurrence denominator vanished before every node converged.
    Stagnated,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SolveReport {
    pub status: SolveStatus,
    pub iterations: usize,
    /// Largest per-node residual norm when the solve stopped.
    pub residual: f32,
    /// Nodes taking part in the solve.
    pub nodes: usize,
    /// Nodes still unconverged when the solve stopped.
    pub active_nodes: usize,
}

impl SolveReport {
    pub fn is_converged(&self) -> bool {
        self.status == SolveStatus::Converged
    }
}

/// Unconverged node indices plus a lookup mask over the whole lattice.
#[derive(Clone, Debug)]
pub struct ActiveSet {
    indices: Vec<usize>,
    mask: Vec<bool>,
}

impl ActiveSet {
    pub fn new(lattice: Lattice2, indices: impl IntoIterator<Item = usize>) -> Self {
        let mut mask = vec![false; lattice.size()];
        let indices: Vec<usize> = indices.into_iter().collect();
        for &i in &indices {
            mask[i] = true;
        }
        Self { indices, mask }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Drops every index for which `converged` holds, returning the dropped ones.
    pub fn retire(&mut self, mut converged: impl FnMut(usize) -> bool) -> Vec<usize> {
        let mut retired = Vec::new();
        let mask = &mut self.mask;
        self.indices.retain(|&i| {
            if converged(i) {
                mask[i] = false;
                retired.push(i);
                false
            } else {
                true
            }
        });
        retired
    }

    /// Zeroes every entry of `field` outside the set.
    pub fn project(&self, field: &mut NodeField) {
        for (value, active) in field.as_mut_slice().iter_mut().zip(self.mask.iter()) {
            if !active {
                *value = Vec2::zero();
            }
        }
    }
}

/// Per-solve vectors; built at solve entry and dropped on return.
#[derive(Clone, Debug)]
pub struct ImplicitScratch {
    pub r: NodeField,
    pub p: NodeField,
    pub ep: NodeField,
    pub er: NodeField,
}

impl ImplicitScratch {
    pub fn new(lattice: Lattice2) -> Self {
        Self {
            r: NodeField::new(lattice, Vec2::zero()),
            p: NodeField::new(lattice, Vec2::zero()),
            ep: NodeField::new(lattice, Vec2::zero()),
            er: NodeField::new(lattice, Vec2::zero()),
        }
    }
}

/// Solves `E(x) = rhs` over `nodes`, starting from the contents of `x`.
///
/// `apply` writes `E(input)` into its output field for every node. Inner
/// products are weighted per node by `metric`; `E` must be self-adjoint
/// under that weighting (node masses for the implicit velocity system). Nodes
/// whose residual norm drops to `tolerance` leave the active set and are
/// frozen; the rest keep iterating until the set empties or
/// `max_iterations` is hit.
pub fn solve_conjugate_residual<A>(
    mut apply: A,
    rhs: &NodeField,
    x: &mut NodeField,
    nodes: &[usize],
    metric: &[f32],
    tolerance: f32,
    max_iterations: usize,
) -> SolveReport
where
    A: FnMut(&NodeField, &mut NodeField),
{
    let lattice = rhs.lattice();
    let dot = |a: &NodeField, b: &NodeField| a.weighted_dot(b, metric);
    let mut s = ImplicitScratch::new(lattice);
    apply(&*x, &mut s.er);
    for &i in nodes {
        s.r.set(i, rhs.get(i) - s.er.get(i));
    }
    let mut active = ActiveSet::new(
        lattice,
        nodes
            .iter()
            .copied()
            .filter(|&i| s.r.get(i).length() > tolerance),
    );
    active.project(&mut s.r);
    let report = |status, iterations, r: &NodeField, active: &ActiveSet| SolveReport {
        status,
        iterations,
        residual: r.max_norm(),
        nodes: nodes.len(),
        active_nodes: active.len(),
    };
    if active.is_empty() {
        return report(SolveStatus::Converged, 0, &s.r, &active);
    }

    s.p.clone_from(&s.r);
    apply(&s.r, &mut s.er);
    active.project(&mut s.er);
    s.ep.clone_from(&s.er);
    let mut r_er = dot(&s.r, &s.er);

    for iter in 0..max_iterations {
        let ep_ep = dot(&s.ep, &s.ep);
        if ep_ep.abs() < STAGNATION_EPSILON || r_er.abs() < STAGNATION_EPSILON {
            return report(SolveStatus::Stagnated, iter, &s.r, &active);
        }
        let alpha = r_er / ep_ep;
        for &i in active.indices() {
            x.set(i, x.get(i) + s.p.get(i) * alpha);
            s.r.set(i, s.r.get(i) - s.ep.get(i) * alpha);
        }
        let r = &s.r;
        let retired = active.retire(|i| r.get(i).length() <= tolerance);
        for i in retired {
            s.r.set(i, Vec2::zero());
            s.p.set(i, Vec2::zero());
            s.ep.set(i, Vec2::zero());
        }
        log::trace!(
            "implicit iter {}: {} active, residual = {:.6e}",
            iter + 1,
            active.len(),
            s.r.max_norm()
        );
        if active.is_empty() {
            return report(SolveStatus::Converged, iter + 1, &s.r, &active);
        }

        apply(&s.r, &mut s.er);
        active.project(&mut s.er);
        let r_er_new = dot(&s.r, &s.er);
        let beta = r_er_new / r_er;
        r_er = r_er_new;
        s.p.scale_and_add_in_place(beta, &s.r);
        s.ep.scale_and_add_in_place(beta, &s.er);
    }

    report(SolveStatus::MaxIterationsReached, max_iterations, &s.r, &active)
}
