//! Global index layout of the generator coordinate space.
//!
//! A length-M vector acted on by the generator is laid out as
//! `[lower point masses | interior | upper point masses]` with the interior
//! phase-major: index `n_lwr + (i·K + k)·p + q` addresses phase i, cell k,
//! basis q. Boundary blocks are ordered by phase index among the members of
//! that boundary.

use crate::error::FluidQueueError;
use crate::model::DiscretisedFluidQueue;

/// A resolved global index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Coordinate {
    /// Point mass at the lower barrier for the given phase.
    LwrBoundary(usize),
    /// Interior coefficient (phase, cell, basis).
    Interior {
        /// Phase index.
        phase: usize,
        /// Cell index.
        cell: usize,
        /// Basis index within the cell.
        basis: usize,
    },
    /// Point mass at the upper barrier for the given phase.
    UprBoundary(usize),
}

impl DiscretisedFluidQueue {
    /// First global index of (phase, cell); no bounds checks.
    pub(crate) fn interior_base(&self, phase: usize, cell: usize) -> usize {
        self.n_lwr() + (phase * self.n_cells() + cell) * self.n_bases()
    }

    /// Global index of interior coefficient (phase, cell, basis).
    pub fn interior_index(
        &self,
        phase: usize,
        cell: usize,
        basis: usize,
    ) -> Result<usize, FluidQueueError> {
        if phase >= self.n_phases() {
            return Err(FluidQueueError::OutOfRange {
                what: "phase",
                index: phase,
                limit: self.n_phases(),
            });
        }
        if cell >= self.n_cells() {
            return Err(FluidQueueError::OutOfRange {
                what: "cell",
                index: cell,
                limit: self.n_cells(),
            });
        }
        if basis >= self.n_bases() {
            return Err(FluidQueueError::OutOfRange {
                what: "basis",
                index: basis,
                limit: self.n_bases(),
            });
        }
        Ok(self.interior_base(phase, cell) + basis)
    }

    /// Inverse of `interior_index`.
    pub fn from_interior(&self, n: usize) -> Result<(usize, usize, usize), FluidQueueError> {
        if n >= self.order() {
            return Err(FluidQueueError::OutOfRange {
                what: "global index",
                index: n,
                limit: self.order(),
            });
        }
        let lo = self.n_lwr();
        let hi = lo + self.interior_len();
        if n < lo || n >= hi {
            return Err(FluidQueueError::InvalidBoundary(format!(
                "index {} is not interior (interior span {}..{})",
                n, lo, hi
            )));
        }
        let m = n - lo;
        let per_phase = self.n_cells() * self.n_bases();
        let phase = m / per_phase;
        let rem = m % per_phase;
        Ok((phase, rem / self.n_bases(), rem % self.n_bases()))
    }

    /// Global index of the lower point mass of `phase`.
    pub fn boundary_index_lwr(&self, phase: usize) -> Result<usize, FluidQueueError> {
        if phase >= self.n_phases() {
            return Err(FluidQueueError::OutOfRange {
                what: "phase",
                index: phase,
                limit: self.n_phases(),
            });
        }
        if !self.phases().is_lwr_member(phase) {
            return Err(FluidQueueError::InvalidBoundary(format!(
                "phase {} is not a lower-boundary member",
                phase
            )));
        }
        Ok(self.phases().lwr_rank(phase))
    }

    /// Global index of the upper point mass of `phase`.
    pub fn boundary_index_upr(&self, phase: usize) -> Result<usize, FluidQueueError> {
        if phase >= self.n_phases() {
            return Err(FluidQueueError::OutOfRange {
                what: "phase",
                index: phase,
                limit: self.n_phases(),
            });
        }
        if !self.phases().is_upr_member(phase) {
            return Err(FluidQueueError::InvalidBoundary(format!(
                "phase {} is not an upper-boundary member",
                phase
            )));
        }
        Ok(self.n_lwr() + self.interior_len() + self.phases().upr_rank(phase))
    }

    /// Whether global index `n` addresses a boundary point mass.
    pub fn is_boundary(&self, n: usize) -> Result<bool, FluidQueueError> {
        if n >= self.order() {
            return Err(FluidQueueError::OutOfRange {
                what: "global index",
                index: n,
                limit: self.order(),
            });
        }
        Ok(n < self.n_lwr() || n >= self.n_lwr() + self.interior_len())
    }

    /// Resolve a global index into its coordinate.
    pub fn classify(&self, n: usize) -> Result<Coordinate, FluidQueueError> {
        if n >= self.order() {
            return Err(FluidQueueError::OutOfRange {
                what: "global index",
                index: n,
                limit: self.order(),
            });
        }
        let lo = self.n_lwr();
        let hi = lo + self.interior_len();
        if n < lo {
            let phase = self.nth_member(n, true);
            return Ok(Coordinate::LwrBoundary(phase));
        }
        if n >= hi {
            let phase = self.nth_member(n - hi, false);
            return Ok(Coordinate::UprBoundary(phase));
        }
        let (phase, cell, basis) = self.from_interior(n)?;
        Ok(Coordinate::Interior { phase, cell, basis })
    }

    /// Phase of the rank-th member of a boundary. Rank is valid by
    /// construction of the caller.
    fn nth_member(&self, rank: usize, lower: bool) -> usize {
        let mut seen = 0;
        for i in 0..self.n_phases() {
            let member = if lower {
                self.phases().is_lwr_member(i)
            } else {
                self.phases().is_upr_member(i)
            };
            if member {
                if seen == rank {
                    return i;
                }
                seen += 1;
            }
        }
        unreachable!("boundary rank {} exceeds member count", rank)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::Mesh;
    use crate::model::{FluidQueue, PhaseSet};
    use faer::Mat;

    fn dq() -> DiscretisedFluidQueue {
        let mut t = Mat::zeros(3, 3);
        for i in 0..3 {
            t[(i, i)] = -2.0;
            t[(i, (i + 1) % 3)] = 1.0;
            t[(i, (i + 2) % 3)] = 1.0;
        }
        let phases = PhaseSet::with_default_membership(vec![2.0, -1.0, 0.0], t).unwrap();
        let mesh = Mesh::dg_uniform(0.0, 4.0, 4, 2).unwrap();
        DiscretisedFluidQueue::new(FluidQueue::new(phases), mesh)
    }

    #[test]
    fn test_interior_roundtrip() {
        let dq = dq();
        for phase in 0..3 {
            for cell in 0..4 {
                for basis in 0..2 {
                    let n = dq.interior_index(phase, cell, basis).unwrap();
                    assert_eq!(dq.from_interior(n).unwrap(), (phase, cell, basis));
                    assert!(!dq.is_boundary(n).unwrap());
                }
            }
        }
    }

    #[test]
    fn test_boundary_indices() {
        let dq = dq();
        // Lower members: phases 1 and 2; upper members: phases 0 and 2.
        assert_eq!(dq.boundary_index_lwr(1).unwrap(), 0);
        assert_eq!(dq.boundary_index_lwr(2).unwrap(), 1);
        assert!(dq.boundary_index_lwr(0).is_err());
        let upr_base = 2 + 3 * 4 * 2;
        assert_eq!(dq.boundary_index_upr(0).unwrap(), upr_base);
        assert_eq!(dq.boundary_index_upr(2).unwrap(), upr_base + 1);
        assert!(dq.boundary_index_upr(1).is_err());
    }

    #[test]
    fn test_classify_partitions_index_space() {
        let dq = dq();
        let m = dq.order();
        let mut lwr = 0;
        let mut upr = 0;
        let mut interior = 0;
        for n in 0..m {
            match dq.classify(n).unwrap() {
                Coordinate::LwrBoundary(i) => {
                    lwr += 1;
                    assert_eq!(dq.boundary_index_lwr(i).unwrap(), n);
                }
                Coordinate::UprBoundary(i) => {
                    upr += 1;
                    assert_eq!(dq.boundary_index_upr(i).unwrap(), n);
                }
                Coordinate::Interior { phase, cell, basis } => {
                    interior += 1;
                    assert_eq!(dq.interior_index(phase, cell, basis).unwrap(), n);
                }
            }
        }
        assert_eq!(lwr, 2);
        assert_eq!(upr, 2);
        assert_eq!(interior, 24);
        assert!(dq.classify(m).is_err());
    }

    #[test]
    fn test_out_of_range_errors() {
        let dq = dq();
        assert!(dq.interior_index(3, 0, 0).is_err());
        assert!(dq.interior_index(0, 4, 0).is_err());
        assert!(dq.interior_index(0, 0, 2).is_err());
        assert!(dq.is_boundary(dq.order()).is_err());
        // Boundary index is not interior.
        assert!(dq.from_interior(0).is_err());
        assert!(dq.from_interior(dq.order() - 1).is_err());
    }
}
