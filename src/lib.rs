//! # fluq-rs
//!
//! Discretised-generator core for stochastic fluid queues.
//!
//! A fluid queue is a two-dimensional Markov process (φ(t), X(t)): the
//! phase φ follows a finite continuous-time Markov chain with rate matrix
//! T, and the level X drifts at the phase-dependent rate c_φ between a
//! lower and an upper barrier. This crate builds the finite-dimensional
//! generator B of the process after the level has been discretised over a
//! mesh of cells, with either a discontinuous Galerkin polynomial basis or
//! a QBD-RAP / FRAP matrix-exponential basis per cell.
//!
//! The crate provides:
//! - the fluid-queue model (phases, rates, boundary memberships, optional
//!   boundary reflection) and the mesh (cells, basis count, scheme tag)
//! - the lazy generator: per-cell block recipes plus structured left/right
//!   multiply kernels and O(1) element access
//! - the materialised sparse generator and its arithmetic
//! - SSP-RK3 transient integration against the lazy operator
//! - the stationary distribution of a materialised generator

pub mod basis;
pub mod error;
pub mod generator;
pub mod me;
pub mod mesh;
pub mod model;
pub mod sparse;
pub mod stationary;
pub mod time;

pub use error::FluidQueueError;
pub use generator::{
    build_full_generator, build_lazy_generator, materialise, Blocks, BoundaryFlux, Coordinate,
    FluxVectors, FullGenerator, LazyGenerator,
};
pub use me::MeParams;
pub use mesh::{Mesh, Scheme};
pub use model::{DiscretisedFluidQueue, FluidQueue, PhaseSet, Reflection};
pub use sparse::CscMatrix;
pub use stationary::stationary_distribution;
pub use time::{compute_dt, run_transient, ssp_rk3_step};
