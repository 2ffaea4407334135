mod cloud;
mod error;
mod field;
mod grid;
pub mod kernel;
mod lattice;
mod params;
mod particle;
mod pipeline;
pub mod solver;
mod vec2;

pub use cloud::{CloudBounds, PointCloud};
pub use error::{SnowError, SnowResult};
pub use field::NodeField;
pub use grid::{Grid, GridNode, MAX_GRID_NODES, SUPPORT_RADIUS};
pub use kernel::{bspline, bspline_slope, bspline_slope_legacy, SlopeClamp};
pub use lattice::Lattice2;
pub use params::{lame_parameters, SimParams, POISSONS_RATIO, YOUNGS_MODULUS};
pub use particle::{Particle, STENCIL_SIZE};
pub use pipeline::{step, StepReport};
pub use solver::{SolveReport, SolveStatus};
pub use vec2::Vec2;
