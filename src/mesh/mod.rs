//! Level discretisation mesh.
//!
//! A mesh is a strictly increasing sequence of K+1 nodes defining K cells,
//! a per-cell basis count, and a scheme tag that selects the block recipes
//! used to build the generator: DG (polynomial basis), FRAP
//! (matrix-exponential basis) or finite volume (order-1 upwind, full
//! generator only).

use crate::error::FluidQueueError;
use crate::me::MeParams;

const UNIFORM_TOL: f64 = 1e-12;

/// Spatial discretisation scheme.
#[derive(Clone)]
pub enum Scheme {
    /// Discontinuous Galerkin on a nodal polynomial basis.
    Dg,
    /// QBD-RAP approximation with matrix-exponential cell densities.
    Frap(MeParams),
    /// First-order upwind finite volume.
    FiniteVolume,
}

/// A 1D mesh of the level domain.
#[derive(Clone)]
pub struct Mesh {
    nodes: Vec<f64>,
    n_bases: usize,
    scheme: Scheme,
}

impl Mesh {
    fn validate_nodes(nodes: &[f64]) -> Result<(), FluidQueueError> {
        if nodes.len() < 2 {
            return Err(FluidQueueError::Domain(
                "mesh needs at least two nodes".to_string(),
            ));
        }
        for k in 0..nodes.len() - 1 {
            if nodes[k + 1] <= nodes[k] {
                return Err(FluidQueueError::Domain(format!(
                    "cell {} has non-positive width: nodes {} and {}",
                    k,
                    nodes[k],
                    nodes[k + 1]
                )));
            }
        }
        Ok(())
    }

    /// DG mesh with `n_bases` Lagrange basis functions per cell.
    pub fn dg(nodes: Vec<f64>, n_bases: usize) -> Result<Self, FluidQueueError> {
        Self::validate_nodes(&nodes)?;
        if n_bases == 0 {
            return Err(FluidQueueError::Domain(
                "need at least one basis function per cell".to_string(),
            ));
        }
        Ok(Self {
            nodes,
            n_bases,
            scheme: Scheme::Dg,
        })
    }

    /// Uniform DG mesh of [a, b] with `k` cells.
    pub fn dg_uniform(a: f64, b: f64, k: usize, n_bases: usize) -> Result<Self, FluidQueueError> {
        if k == 0 || b <= a {
            return Err(FluidQueueError::Domain(format!(
                "invalid uniform mesh: [{}, {}] with {} cells",
                a, b, k
            )));
        }
        let h = (b - a) / k as f64;
        let nodes = (0..=k).map(|j| a + j as f64 * h).collect();
        Self::dg(nodes, n_bases)
    }

    /// FRAP mesh; the basis count is the order of the ME representation.
    pub fn frap(nodes: Vec<f64>, me: MeParams) -> Result<Self, FluidQueueError> {
        Self::validate_nodes(&nodes)?;
        let n_bases = me.order();
        Ok(Self {
            nodes,
            n_bases,
            scheme: Scheme::Frap(me),
        })
    }

    /// Finite-volume mesh: one (constant) basis function per cell.
    pub fn fv(nodes: Vec<f64>) -> Result<Self, FluidQueueError> {
        Self::validate_nodes(&nodes)?;
        Ok(Self {
            nodes,
            n_bases: 1,
            scheme: Scheme::FiniteVolume,
        })
    }

    /// The scheme tag.
    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    /// Number of cells K.
    pub fn n_cells(&self) -> usize {
        self.nodes.len() - 1
    }

    /// Basis functions per cell.
    pub fn n_bases(&self) -> usize {
        self.n_bases
    }

    /// Mesh nodes (K+1 of them, strictly increasing).
    pub fn nodes(&self) -> &[f64] {
        &self.nodes
    }

    /// Width of cell k.
    pub fn cell_width(&self, k: usize) -> f64 {
        self.nodes[k + 1] - self.nodes[k]
    }

    /// Smallest cell width.
    pub fn min_width(&self) -> f64 {
        (0..self.n_cells())
            .map(|k| self.cell_width(k))
            .fold(f64::INFINITY, f64::min)
    }

    /// Whether all cells share one width (enables the precomputed diagonal
    /// block fast path in the multiply kernels).
    pub fn is_uniform(&self) -> bool {
        let h0 = self.cell_width(0);
        (1..self.n_cells()).all(|k| (self.cell_width(k) - h0).abs() <= UNIFORM_TOL * h0.abs())
    }
}
