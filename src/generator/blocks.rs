//! Per-cell block recipes of the generator.
//!
//! The generator is assembled from four p×p blocks acting along the cell
//! axis of a single phase:
//!
//! - `diag_up` / `up`: diagonal and upper-diagonal blocks of up-drifting
//!   phases (mass moves with the drift, into the next cell),
//! - `diag_down` / `down`: diagonal and lower-diagonal blocks of
//!   down-drifting phases,
//!
//! plus per-boundary flux vectors (`inflow`: interior into the point mass,
//! `outflow`: point mass into the adjacent cell) and the orientation-flip
//! matrix applied to cross-phase coupling under the FRAP scheme.
//!
//! Coefficients are per-node masses, so conservation is the plain row-sum
//! identity `rowsum(diag) + rowsum(off-diag) = 0`, which both recipes
//! satisfy exactly.

use faer::Mat;

use crate::basis::{gll_differentiation, gll_nodes, gll_weights};
use crate::me::MeParams;

/// The four p×p cell blocks.
#[derive(Clone)]
pub struct Blocks {
    /// Lower-diagonal block of down-drifting phases.
    pub down: Mat<f64>,
    /// Diagonal block of up-drifting phases.
    pub diag_up: Mat<f64>,
    /// Diagonal block of down-drifting phases.
    pub diag_down: Mat<f64>,
    /// Upper-diagonal block of up-drifting phases.
    pub up: Mat<f64>,
}

impl Blocks {
    /// Block size p (all four blocks are p×p).
    pub fn n_bases(&self) -> usize {
        self.diag_up.nrows()
    }
}

/// Flux vectors of one boundary.
#[derive(Clone)]
pub struct FluxVectors {
    /// Basis weights with which the adjacent cell drains into the point
    /// mass; `rowsum(off-diag block)` by conservation.
    pub inflow: Vec<f64>,
    /// Distribution with which point-mass probability enters the adjacent
    /// cell; sums to one.
    pub outflow: Vec<f64>,
}

/// Flux vectors of both boundaries.
#[derive(Clone)]
pub struct BoundaryFlux {
    /// Lower barrier.
    pub lower: FluxVectors,
    /// Upper barrier.
    pub upper: FluxVectors,
}

fn row_sums(m: &Mat<f64>) -> Vec<f64> {
    (0..m.nrows())
        .map(|i| (0..m.ncols()).map(|j| m[(i, j)]).sum())
        .collect()
}

/// DG recipes for `n_bases` Lagrange basis functions on GLL nodes.
///
/// With D the GLL differentiation matrix and w the weights on [-1, 1]:
/// the upwind weak form in per-node mass coordinates gives
/// `diag_up = 2D - (2/w_last) E_(last,last)`, `up = (2/w_last) E_(last,0)`
/// and the mirrored pair for down-drifting phases. The flip matrix is the
/// identity: a membership change leaves polynomial coefficients intact.
pub(crate) fn dg_recipes(n_bases: usize) -> (Blocks, BoundaryFlux, Mat<f64>) {
    let order = n_bases - 1;
    let nodes = gll_nodes(order);
    let weights = gll_weights(order, &nodes);
    let d = gll_differentiation(order, &nodes);

    let p = n_bases;
    let last = p - 1;

    let mut diag_up = Mat::zeros(p, p);
    let mut diag_down = Mat::zeros(p, p);
    for i in 0..p {
        for j in 0..p {
            diag_up[(i, j)] = 2.0 * d[(i, j)];
            diag_down[(i, j)] = -2.0 * d[(i, j)];
        }
    }
    diag_up[(last, last)] -= 2.0 / weights[last];
    diag_down[(0, 0)] -= 2.0 / weights[0];

    let mut up = Mat::zeros(p, p);
    up[(last, 0)] = 2.0 / weights[last];
    let mut down = Mat::zeros(p, p);
    down[(0, last)] = 2.0 / weights[0];

    let mut lower_out = vec![0.0; p];
    lower_out[0] = 1.0;
    let mut upper_out = vec![0.0; p];
    upper_out[last] = 1.0;

    let flux = BoundaryFlux {
        lower: FluxVectors {
            inflow: row_sums(&down),
            outflow: lower_out,
        },
        upper: FluxVectors {
            inflow: row_sums(&up),
            outflow: upper_out,
        },
    };

    let mut flip = Mat::zeros(p, p);
    for i in 0..p {
        flip[(i, i)] = 1.0;
    }

    (
        Blocks {
            down,
            diag_up,
            diag_down,
            up,
        },
        flux,
        flip,
    )
}

/// FRAP recipes from an order-p matrix-exponential representation.
///
/// Both diagonal blocks are S; both off-diagonal blocks are the restart
/// product `exit · aᵀ` (absorb at one edge, restart at the other); the flux
/// vectors are the exit rates and the initial distribution; the flip matrix
/// comes from the ME parameters.
pub(crate) fn frap_recipes(me: &MeParams) -> (Blocks, BoundaryFlux, Mat<f64>) {
    let p = me.order();
    let a = me.a();
    let exit = me.exit();

    let mut restart = Mat::zeros(p, p);
    for i in 0..p {
        for j in 0..p {
            restart[(i, j)] = exit[i] * a[j];
        }
    }

    let flux = BoundaryFlux {
        lower: FluxVectors {
            inflow: exit.to_vec(),
            outflow: a.to_vec(),
        },
        upper: FluxVectors {
            inflow: exit.to_vec(),
            outflow: a.to_vec(),
        },
    };

    (
        Blocks {
            down: restart.clone(),
            diag_up: me.s().clone(),
            diag_down: me.s().clone(),
            up: restart,
        },
        flux,
        me.flip().clone(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_conservation(blocks: &Blocks, flux: &BoundaryFlux) {
        let p = blocks.n_bases();
        let up_sums = row_sums(&blocks.up);
        let diag_up_sums = row_sums(&blocks.diag_up);
        let down_sums = row_sums(&blocks.down);
        let diag_down_sums = row_sums(&blocks.diag_down);
        for q in 0..p {
            assert!(
                (diag_up_sums[q] + up_sums[q]).abs() < 1e-11,
                "up-phase row {} leaks {}",
                q,
                diag_up_sums[q] + up_sums[q]
            );
            assert!(
                (diag_down_sums[q] + down_sums[q]).abs() < 1e-11,
                "down-phase row {} leaks {}",
                q,
                diag_down_sums[q] + down_sums[q]
            );
            assert!((flux.upper.inflow[q] - up_sums[q]).abs() < 1e-12);
            assert!((flux.lower.inflow[q] - down_sums[q]).abs() < 1e-12);
        }
        let out_lwr: f64 = flux.lower.outflow.iter().sum();
        let out_upr: f64 = flux.upper.outflow.iter().sum();
        assert!((out_lwr - 1.0).abs() < 1e-12);
        assert!((out_upr - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_dg_conservation_identities() {
        for p in 1..=5 {
            let (blocks, flux, flip) = dg_recipes(p);
            assert_eq!(blocks.n_bases(), p);
            assert_conservation(&blocks, &flux);
            // DG flip is the identity.
            for i in 0..p {
                for j in 0..p {
                    let expected = if i == j { 1.0 } else { 0.0 };
                    assert!((flip[(i, j)] - expected).abs() < 1e-14);
                }
            }
        }
    }

    #[test]
    fn test_dg_order_one_is_upwind_finite_volume() {
        let (blocks, flux, _) = dg_recipes(1);
        assert!((blocks.diag_up[(0, 0)] + 1.0).abs() < 1e-14);
        assert!((blocks.up[(0, 0)] - 1.0).abs() < 1e-14);
        assert!((blocks.diag_down[(0, 0)] + 1.0).abs() < 1e-14);
        assert!((blocks.down[(0, 0)] - 1.0).abs() < 1e-14);
        assert!((flux.lower.inflow[0] - 1.0).abs() < 1e-14);
        assert!((flux.upper.outflow[0] - 1.0).abs() < 1e-14);
    }

    #[test]
    fn test_dg_transport_through_edges_only() {
        // Mass enters the next cell through the outflow edge node and the
        // inflow edge node only.
        let (blocks, _, _) = dg_recipes(4);
        let last = 3;
        for i in 0..4 {
            for j in 0..4 {
                if !(i == last && j == 0) {
                    assert!(blocks.up[(i, j)].abs() < 1e-14);
                }
                if !(i == 0 && j == last) {
                    assert!(blocks.down[(i, j)].abs() < 1e-14);
                }
            }
        }
    }

    #[test]
    fn test_frap_conservation_identities() {
        for p in 1..=4 {
            let me = MeParams::erlang(p, 1.5);
            let (blocks, flux, flip) = frap_recipes(&me);
            assert_eq!(blocks.n_bases(), p);
            assert_conservation(&blocks, &flux);
            // Erlang flip is the exchange matrix.
            for i in 0..p {
                assert!((flip[(i, p - 1 - i)] - 1.0).abs() < 1e-14);
            }
        }
    }

    #[test]
    fn test_frap_diagonal_blocks_coincide() {
        let me = MeParams::erlang(3, 2.0);
        let (blocks, _, _) = frap_recipes(&me);
        for i in 0..3 {
            for j in 0..3 {
                assert!((blocks.diag_up[(i, j)] - blocks.diag_down[(i, j)]).abs() < 1e-14);
                assert!((blocks.up[(i, j)] - blocks.down[(i, j)]).abs() < 1e-14);
            }
        }
    }
}
