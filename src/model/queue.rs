//! Fluid queue and its discretised form.
//!
//! A `FluidQueue` is a phase set plus, optionally, boundary reflection
//! matrices (the bounded variant): on hitting a barrier in phase i the
//! process restarts in phase j with probability P[i, j], either into the
//! point mass of j (if j is a member of that barrier) or straight back into
//! the adjacent cell (if not).
//!
//! A `DiscretisedFluidQueue` pairs the queue with a mesh and fixes the
//! global coordinate layout
//! `[lower point masses | phase-major interior | upper point masses]`.

use faer::Mat;

use crate::error::FluidQueueError;
use crate::mesh::Mesh;
use crate::model::PhaseSet;

const STOCHASTIC_TOL: f64 = 1e-10;

/// Boundary reflection matrices of the bounded variant.
#[derive(Clone)]
pub struct Reflection {
    p_lwr: Mat<f64>,
    p_upr: Mat<f64>,
}

impl Reflection {
    /// Lower reflection probability P_lwr[i, j].
    pub fn lwr(&self, i: usize, j: usize) -> f64 {
        self.p_lwr[(i, j)]
    }

    /// Upper reflection probability P_upr[i, j].
    pub fn upr(&self, i: usize, j: usize) -> f64 {
        self.p_upr[(i, j)]
    }
}

/// A fluid queue: phases plus optional boundary reflection.
#[derive(Clone)]
pub struct FluidQueue {
    phases: PhaseSet,
    reflection: Option<Reflection>,
}

impl FluidQueue {
    /// Unbounded variant: mass reaching a barrier sticks in the point mass
    /// of the phase it arrived in.
    pub fn new(phases: PhaseSet) -> Self {
        Self {
            phases,
            reflection: None,
        }
    }

    /// Bounded variant with reflection matrices.
    ///
    /// `p_lwr` rows are read for down-drifting phases, `p_upr` rows for
    /// up-drifting phases; each such row must be a probability distribution
    /// over the destination phases.
    pub fn bounded(
        phases: PhaseSet,
        p_lwr: Mat<f64>,
        p_upr: Mat<f64>,
    ) -> Result<Self, FluidQueueError> {
        let n = phases.n_phases();
        for (name, p) in [("lower reflection matrix", &p_lwr), ("upper reflection matrix", &p_upr)]
        {
            if p.nrows() != n || p.ncols() != n {
                return Err(FluidQueueError::ShapeMismatch {
                    what: name,
                    expected: n,
                    got: p.nrows().max(p.ncols()),
                });
            }
        }
        for i in 0..n {
            let relevant_lwr = phases.rate(i) < 0.0;
            let relevant_upr = phases.rate(i) > 0.0;
            for (relevant, p, side) in
                [(relevant_lwr, &p_lwr, "lower"), (relevant_upr, &p_upr, "upper")]
            {
                if !relevant {
                    continue;
                }
                let mut row_sum = 0.0;
                for j in 0..n {
                    let pij = p[(i, j)];
                    if pij < 0.0 {
                        return Err(FluidQueueError::Domain(format!(
                            "negative {} reflection probability P[{},{}] = {}",
                            side, i, j, pij
                        )));
                    }
                    row_sum += pij;
                }
                if (row_sum - 1.0).abs() > STOCHASTIC_TOL {
                    return Err(FluidQueueError::Domain(format!(
                        "row {} of the {} reflection matrix sums to {}",
                        i, side, row_sum
                    )));
                }
            }
        }
        Ok(Self {
            phases,
            reflection: Some(Reflection { p_lwr, p_upr }),
        })
    }

    /// The phase set.
    pub fn phases(&self) -> &PhaseSet {
        &self.phases
    }

    /// Reflection matrices, if this is the bounded variant.
    pub fn reflection(&self) -> Option<&Reflection> {
        self.reflection.as_ref()
    }
}

/// A fluid queue discretised over a mesh.
pub struct DiscretisedFluidQueue {
    queue: FluidQueue,
    mesh: Mesh,
}

impl DiscretisedFluidQueue {
    /// Pair a queue with a mesh.
    pub fn new(queue: FluidQueue, mesh: Mesh) -> Self {
        Self { queue, mesh }
    }

    /// The queue.
    pub fn queue(&self) -> &FluidQueue {
        &self.queue
    }

    /// The phase set.
    pub fn phases(&self) -> &PhaseSet {
        self.queue.phases()
    }

    /// The mesh.
    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    /// Number of phases.
    pub fn n_phases(&self) -> usize {
        self.phases().n_phases()
    }

    /// Number of cells.
    pub fn n_cells(&self) -> usize {
        self.mesh.n_cells()
    }

    /// Basis functions per cell.
    pub fn n_bases(&self) -> usize {
        self.mesh.n_bases()
    }

    /// Number of lower-boundary point masses.
    pub fn n_lwr(&self) -> usize {
        self.phases().n_lwr()
    }

    /// Number of upper-boundary point masses.
    pub fn n_upr(&self) -> usize {
        self.phases().n_upr()
    }

    /// Length of the interior coordinate block, N·K·p.
    pub fn interior_len(&self) -> usize {
        self.n_phases() * self.n_cells() * self.n_bases()
    }

    /// Total operator dimension M = N₋ + N·K·p + N₊.
    pub fn order(&self) -> usize {
        self.n_lwr() + self.interior_len() + self.n_upr()
    }
}
