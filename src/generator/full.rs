//! Materialised generator.
//!
//! The full form is produced by applying the left-multiply kernel to the
//! sparse identity; afterwards all arithmetic forwards to the underlying
//! compressed-sparse-column matrix. Materialise only when a downstream
//! algorithm needs the explicit matrix (stationary solve, spectral work);
//! time integrators consume the lazy operator directly.

use std::ops::{Add, Mul, Sub};

use faer::Mat;

use crate::error::FluidQueueError;
use crate::generator::blocks::dg_recipes;
use crate::generator::lazy::{build_lazy_generator, LazyGenerator};
use crate::mesh::Scheme;
use crate::model::DiscretisedFluidQueue;
use crate::sparse::CscMatrix;

/// The materialised generator: an M×M sparse matrix.
#[derive(Clone)]
pub struct FullGenerator {
    matrix: CscMatrix,
}

impl FullGenerator {
    /// Wrap an explicit sparse matrix.
    pub fn from_matrix(matrix: CscMatrix) -> Self {
        Self { matrix }
    }

    /// The underlying sparse matrix.
    pub fn matrix(&self) -> &CscMatrix {
        &self.matrix
    }

    /// Mutable access; callers are responsible for synchronisation.
    pub fn matrix_mut(&mut self) -> &mut CscMatrix {
        &mut self.matrix
    }

    /// Shape (M, M).
    pub fn shape(&self) -> (usize, usize) {
        (self.matrix.nrows(), self.matrix.ncols())
    }

    /// Extent along one axis (0 = rows, 1 = cols).
    pub fn dim(&self, axis: usize) -> Result<usize, FluidQueueError> {
        match axis {
            0 => Ok(self.matrix.nrows()),
            1 => Ok(self.matrix.ncols()),
            _ => Err(FluidQueueError::OutOfRange {
                what: "axis",
                index: axis,
                limit: 2,
            }),
        }
    }

    /// Element read with bounds checking.
    pub fn get(&self, row: usize, col: usize) -> Result<f64, FluidQueueError> {
        if row >= self.matrix.nrows() {
            return Err(FluidQueueError::OutOfRange {
                what: "row",
                index: row,
                limit: self.matrix.nrows(),
            });
        }
        if col >= self.matrix.ncols() {
            return Err(FluidQueueError::OutOfRange {
                what: "col",
                index: col,
                limit: self.matrix.ncols(),
            });
        }
        Ok(self.matrix.get(row, col))
    }

    /// Row sums; zero for a conservative generator.
    pub fn row_sums(&self) -> Vec<f64> {
        self.matrix.row_sums()
    }

    /// Scalar multiple.
    pub fn scale(&self, alpha: f64) -> FullGenerator {
        FullGenerator {
            matrix: self.matrix.scale(alpha),
        }
    }

    /// Dense copy.
    pub fn to_dense(&self) -> Mat<f64> {
        self.matrix.to_dense()
    }
}

impl Add for &FullGenerator {
    type Output = FullGenerator;

    fn add(self, rhs: Self) -> FullGenerator {
        FullGenerator {
            matrix: self.matrix.add(&rhs.matrix).expect("operand shapes must match"),
        }
    }
}

impl Sub for &FullGenerator {
    type Output = FullGenerator;

    fn sub(self, rhs: Self) -> FullGenerator {
        FullGenerator {
            matrix: self.matrix.sub(&rhs.matrix).expect("operand shapes must match"),
        }
    }
}

impl Mul for &FullGenerator {
    type Output = FullGenerator;

    fn mul(self, rhs: Self) -> FullGenerator {
        FullGenerator {
            matrix: self.matrix.matmul(&rhs.matrix).expect("operand shapes must match"),
        }
    }
}

/// Materialise a lazy generator by applying its left-multiply kernel to the
/// sparse identity.
pub fn materialise(gen: &LazyGenerator<'_>) -> FullGenerator {
    let (m, _) = gen.shape();
    let id = CscMatrix::identity(m);
    FullGenerator {
        matrix: gen
            .mul_left_sparse(&id)
            .expect("identity operand always matches the operator shape"),
    }
}

/// Build the materialised generator for a discretised queue.
///
/// DG and FRAP meshes go through the lazy form; the finite-volume scheme
/// has no public lazy form but its order-1 upwind operator is the p = 1
/// block recipe, so it is assembled through a private lazy instance.
pub fn build_full_generator(
    dq: &DiscretisedFluidQueue,
) -> Result<FullGenerator, FluidQueueError> {
    match dq.mesh().scheme() {
        Scheme::Dg | Scheme::Frap(_) => Ok(materialise(&build_lazy_generator(dq)?)),
        Scheme::FiniteVolume => {
            let (blocks, flux, flip) = dg_recipes(1);
            let lazy = LazyGenerator::new(dq, blocks, flux, flip)?;
            Ok(materialise(&lazy))
        }
    }
}
