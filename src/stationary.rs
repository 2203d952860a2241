//! Stationary distribution of a materialised generator.
//!
//! Solves π·B = 0 with Σπ = 1 by a dense full-pivot LU on Bᵀ with the last
//! equation replaced by the normalisation. This is the one consumer in the
//! crate that genuinely needs the materialised form.

use faer::{linalg::solvers::Solve, Mat};

use crate::error::FluidQueueError;
use crate::generator::FullGenerator;

const RESIDUAL_TOL: f64 = 1e-8;

/// Stationary vector of the generator.
///
/// Fails with a domain error when the generator has no unique stationary
/// vector (reducible chain, singular replaced system).
pub fn stationary_distribution(gen: &FullGenerator) -> Result<Vec<f64>, FluidQueueError> {
    let (m, _) = gen.shape();
    let dense = gen.to_dense();

    // A = Bᵀ with the last row replaced by the normalisation Σπ = 1.
    let mut a = Mat::zeros(m, m);
    for i in 0..m {
        for j in 0..m {
            a[(i, j)] = dense[(j, i)];
        }
    }
    for j in 0..m {
        a[(m - 1, j)] = 1.0;
    }

    let mut rhs = Mat::zeros(m, 1);
    rhs[(m - 1, 0)] = 1.0;

    let lu = a.as_ref().full_piv_lu();
    let x = lu.solve(&rhs);
    let pi: Vec<f64> = (0..m).map(|i| x[(i, 0)]).collect();

    // Verify π B = 0; a singular replaced system produces garbage here.
    let mut residual = 0.0f64;
    for j in 0..m {
        let mut acc = 0.0;
        for i in 0..m {
            acc += pi[i] * dense[(i, j)];
        }
        residual = residual.max(acc.abs());
    }
    if !residual.is_finite() || residual > RESIDUAL_TOL {
        return Err(FluidQueueError::Domain(format!(
            "no unique stationary vector (residual {})",
            residual
        )));
    }

    Ok(pi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::build_full_generator;
    use crate::mesh::Mesh;
    use crate::model::{DiscretisedFluidQueue, FluidQueue, PhaseSet};

    fn two_phase(mesh: Mesh) -> DiscretisedFluidQueue {
        let mut t = Mat::zeros(2, 2);
        t[(0, 0)] = -1.0;
        t[(0, 1)] = 1.0;
        t[(1, 0)] = 2.0;
        t[(1, 1)] = -2.0;
        let phases = PhaseSet::with_default_membership(vec![1.0, -1.0], t).unwrap();
        DiscretisedFluidQueue::new(FluidQueue::new(phases), mesh)
    }

    #[test]
    fn test_stationary_of_upwind_chain() {
        // The finite-volume generator is a proper CTMC generator, so the
        // stationary vector exists, is unique and is non-negative.
        let dq = two_phase(Mesh::fv(vec![0.0, 1.0, 2.0, 3.0]).unwrap());
        let full = build_full_generator(&dq).unwrap();
        let pi = stationary_distribution(&full).unwrap();

        let sum: f64 = pi.iter().sum();
        assert!((sum - 1.0).abs() < 1e-10);
        for (i, &x) in pi.iter().enumerate() {
            assert!(x > -1e-10, "negative stationary mass {} at {}", x, i);
        }

        // Residual is checked internally; spot-check one balance equation.
        let dense = full.to_dense();
        let (m, _) = full.shape();
        for j in 0..m {
            let mut acc = 0.0;
            for i in 0..m {
                acc += pi[i] * dense[(i, j)];
            }
            assert!(acc.abs() < 1e-9);
        }
    }

    #[test]
    fn test_stationary_follows_mean_drift() {
        // T has phase distribution (1/3, 2/3), so the mean drift is
        // negative and the stationary mass piles up at the lower barrier.
        let mut t = Mat::zeros(2, 2);
        t[(0, 0)] = -2.0;
        t[(0, 1)] = 2.0;
        t[(1, 0)] = 1.0;
        t[(1, 1)] = -1.0;
        let phases = PhaseSet::with_default_membership(vec![1.0, -1.0], t).unwrap();
        let dq = DiscretisedFluidQueue::new(
            FluidQueue::new(phases),
            Mesh::fv(vec![0.0, 1.0, 2.0]).unwrap(),
        );
        let full = build_full_generator(&dq).unwrap();
        let pi = stationary_distribution(&full).unwrap();

        let m = pi.len();
        assert!(
            pi[0] > pi[m - 1],
            "lower point mass {} vs upper {}",
            pi[0],
            pi[m - 1]
        );
        assert!(pi[0] > 1e-3);
    }
}
