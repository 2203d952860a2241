//! The discretised generator: block recipes, lazy operator, structured
//! multiply kernels and the materialised sparse form.

mod blocks;
mod full;
mod index;
mod lazy;
mod mul;

pub use blocks::{Blocks, BoundaryFlux, FluxVectors};
pub use full::{build_full_generator, materialise, FullGenerator};
pub use index::Coordinate;
pub use lazy::{build_lazy_generator, LazyGenerator};
