//! Matrix-exponential (ME) cell parameters for the FRAP scheme.
//!
//! An order-p ME representation (a, S) describes a cell density
//! f(x) = a·exp(Sx)·s with s = -S·1 the exit rate vector. The FRAP scheme
//! additionally needs the orientation-flip matrix: when a phase change
//! reverses the transport direction within a cell, the cell density is
//! re-expressed with respect to the opposite cell edge by the row-stochastic
//! matrix `flip`.
//!
//! The parameters normally come from an external ME library; `erlang`
//! provides the canonical in-crate instance.

use faer::Mat;

use crate::error::FluidQueueError;

const STOCHASTIC_TOL: f64 = 1e-10;

/// Order-p matrix-exponential parameters (a, S, s) plus the orientation
/// flip matrix.
#[derive(Clone)]
pub struct MeParams {
    a: Vec<f64>,
    s: Mat<f64>,
    exit: Vec<f64>,
    flip: Mat<f64>,
}

impl MeParams {
    /// Build ME parameters from an initial vector, generator-like matrix S
    /// and flip matrix. The exit vector s = -S·1 is derived.
    pub fn new(a: Vec<f64>, s: Mat<f64>, flip: Mat<f64>) -> Result<Self, FluidQueueError> {
        let p = a.len();
        if p == 0 {
            return Err(FluidQueueError::Domain("empty ME representation".to_string()));
        }
        if s.nrows() != p || s.ncols() != p {
            return Err(FluidQueueError::ShapeMismatch {
                what: "ME matrix S",
                expected: p,
                got: s.nrows().max(s.ncols()),
            });
        }
        if flip.nrows() != p || flip.ncols() != p {
            return Err(FluidQueueError::ShapeMismatch {
                what: "ME flip matrix",
                expected: p,
                got: flip.nrows().max(flip.ncols()),
            });
        }
        let a_sum: f64 = a.iter().sum();
        if (a_sum - 1.0).abs() > STOCHASTIC_TOL {
            return Err(FluidQueueError::Domain(format!(
                "ME initial vector sums to {}",
                a_sum
            )));
        }
        for i in 0..p {
            let row_sum: f64 = (0..p).map(|j| flip[(i, j)]).sum();
            if (row_sum - 1.0).abs() > STOCHASTIC_TOL {
                return Err(FluidQueueError::Domain(format!(
                    "row {} of the ME flip matrix sums to {}",
                    i, row_sum
                )));
            }
        }

        let exit = (0..p)
            .map(|i| -(0..p).map(|j| s[(i, j)]).sum::<f64>())
            .collect();

        Ok(Self { a, s, exit, flip })
    }

    /// Erlang(p, rate) representation: a = e₀, S bidiagonal with -rate on
    /// the diagonal and rate on the superdiagonal, flip the exchange matrix
    /// (reversing an Erlang clock reverses its stage order).
    pub fn erlang(order: usize, rate: f64) -> Self {
        assert!(order >= 1, "Erlang order must be positive");
        assert!(rate > 0.0, "Erlang rate must be positive");

        let mut a = vec![0.0; order];
        a[0] = 1.0;

        let mut s = Mat::zeros(order, order);
        for i in 0..order {
            s[(i, i)] = -rate;
            if i + 1 < order {
                s[(i, i + 1)] = rate;
            }
        }

        let mut flip = Mat::zeros(order, order);
        for i in 0..order {
            flip[(i, order - 1 - i)] = 1.0;
        }

        Self::new(a, s, flip).expect("Erlang parameters are always valid")
    }

    /// Order of the representation.
    pub fn order(&self) -> usize {
        self.a.len()
    }

    /// Initial distribution a.
    pub fn a(&self) -> &[f64] {
        &self.a
    }

    /// The matrix S.
    pub fn s(&self) -> &Mat<f64> {
        &self.s
    }

    /// Exit rate vector s = -S·1.
    pub fn exit(&self) -> &[f64] {
        &self.exit
    }

    /// Orientation flip matrix.
    pub fn flip(&self) -> &Mat<f64> {
        &self.flip
    }
}
