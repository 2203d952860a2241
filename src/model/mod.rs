//! Fluid-queue model: phase set, queue (with optional boundary reflection),
//! and the discretised queue pairing a model with a mesh.

mod phases;
mod queue;

pub use phases::PhaseSet;
pub use queue::{DiscretisedFluidQueue, FluidQueue, Reflection};
