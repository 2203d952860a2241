//! Lazy generator: the authoritative block-recipe representation.
//!
//! A `LazyGenerator` stores only the four p×p cell blocks, the boundary
//! flux vectors, the orientation-flip matrix and a working copy of the rate
//! matrix; the full operator exists only through `get`, the multiply
//! kernels, or materialisation. It borrows the discretised queue it was
//! built for; the queue must outlive it.

use faer::Mat;

use crate::error::FluidQueueError;
use crate::generator::blocks::{dg_recipes, frap_recipes, Blocks, BoundaryFlux};
use crate::generator::Coordinate;
use crate::mesh::Scheme;
use crate::model::DiscretisedFluidQueue;

/// Lazy form of the discretised generator.
pub struct LazyGenerator<'a> {
    pub(crate) dq: &'a DiscretisedFluidQueue,
    /// Working copy of the rate matrix; scaled by `scale`.
    pub(crate) t: Mat<f64>,
    pub(crate) blocks: Blocks,
    pub(crate) flux: BoundaryFlux,
    pub(crate) flip: Mat<f64>,
    /// Whether cross-phase coupling of opposite orientations passes through
    /// `flip` (FRAP scheme only; the DG flip is the identity).
    pub(crate) frap: bool,
}

fn check_square(m: &Mat<f64>, p: usize, what: &'static str) -> Result<(), FluidQueueError> {
    if m.nrows() != p || m.ncols() != p {
        return Err(FluidQueueError::ShapeMismatch {
            what,
            expected: p,
            got: m.nrows().max(m.ncols()),
        });
    }
    Ok(())
}

fn check_len(v: &[f64], p: usize, what: &'static str) -> Result<(), FluidQueueError> {
    if v.len() != p {
        return Err(FluidQueueError::ShapeMismatch {
            what,
            expected: p,
            got: v.len(),
        });
    }
    Ok(())
}

impl<'a> LazyGenerator<'a> {
    /// Assemble a lazy generator from explicit blocks and flux vectors.
    ///
    /// All blocks and the flip matrix must be p×p and the flux vectors of
    /// length p, with p the mesh basis count.
    pub fn new(
        dq: &'a DiscretisedFluidQueue,
        blocks: Blocks,
        flux: BoundaryFlux,
        flip: Mat<f64>,
    ) -> Result<Self, FluidQueueError> {
        let p = dq.n_bases();
        check_square(&blocks.down, p, "lower-diagonal block")?;
        check_square(&blocks.diag_up, p, "up-phase diagonal block")?;
        check_square(&blocks.diag_down, p, "down-phase diagonal block")?;
        check_square(&blocks.up, p, "upper-diagonal block")?;
        check_square(&flip, p, "flip matrix")?;
        check_len(&flux.lower.inflow, p, "lower inflow vector")?;
        check_len(&flux.lower.outflow, p, "lower outflow vector")?;
        check_len(&flux.upper.inflow, p, "upper inflow vector")?;
        check_len(&flux.upper.outflow, p, "upper outflow vector")?;

        Ok(Self {
            dq,
            t: dq.phases().generator().clone(),
            blocks,
            flux,
            flip,
            frap: matches!(dq.mesh().scheme(), Scheme::Frap(_)),
        })
    }

    /// Convenience constructor for schemes whose two diagonal blocks
    /// coincide (FRAP): expands (low, mid, up) to the four blocks.
    pub fn from_three_blocks(
        dq: &'a DiscretisedFluidQueue,
        low: Mat<f64>,
        mid: Mat<f64>,
        up: Mat<f64>,
        flux: BoundaryFlux,
        flip: Mat<f64>,
    ) -> Result<Self, FluidQueueError> {
        let blocks = Blocks {
            down: low,
            diag_up: mid.clone(),
            diag_down: mid,
            up,
        };
        Self::new(dq, blocks, flux, flip)
    }

    /// The queue this generator was built for.
    pub fn dq(&self) -> &'a DiscretisedFluidQueue {
        self.dq
    }

    /// Operator shape (M, M).
    pub fn shape(&self) -> (usize, usize) {
        let m = self.dq.order();
        (m, m)
    }

    /// Extent along one axis (0 = rows, 1 = cols).
    pub fn dim(&self, axis: usize) -> Result<usize, FluidQueueError> {
        if axis >= 2 {
            return Err(FluidQueueError::OutOfRange {
                what: "axis",
                index: axis,
                limit: 2,
            });
        }
        Ok(self.dq.order())
    }

    /// Scalar multiple of the operator.
    ///
    /// Scales the rate-carrying data (rate matrix copy, all four blocks,
    /// both inflow vectors); the outflow distributions and the flip matrix
    /// are left fixed so that every operator entry scales exactly once.
    pub fn scale(&self, alpha: f64) -> LazyGenerator<'a> {
        let scale_mat = |m: &Mat<f64>| {
            let mut out = m.clone();
            for i in 0..out.nrows() {
                for j in 0..out.ncols() {
                    out[(i, j)] *= alpha;
                }
            }
            out
        };
        let scale_vec = |v: &[f64]| v.iter().map(|&x| alpha * x).collect::<Vec<f64>>();

        LazyGenerator {
            dq: self.dq,
            t: scale_mat(&self.t),
            blocks: Blocks {
                down: scale_mat(&self.blocks.down),
                diag_up: scale_mat(&self.blocks.diag_up),
                diag_down: scale_mat(&self.blocks.diag_down),
                up: scale_mat(&self.blocks.up),
            },
            flux: BoundaryFlux {
                lower: crate::generator::FluxVectors {
                    inflow: scale_vec(&self.flux.lower.inflow),
                    outflow: self.flux.lower.outflow.clone(),
                },
                upper: crate::generator::FluxVectors {
                    inflow: scale_vec(&self.flux.upper.inflow),
                    outflow: self.flux.upper.outflow.clone(),
                },
            },
            flip: self.flip.clone(),
            frap: self.frap,
        }
    }

    /// Whether cross-phase coupling between phases i and j applies the
    /// flip matrix.
    pub(crate) fn uses_flip(&self, i: usize, j: usize) -> bool {
        let ps = self.dq.phases();
        self.frap && ps.drifts_down(i) != ps.drifts_down(j)
    }

    /// Single operator element, O(1) in the mesh size.
    pub fn get(&self, row: usize, col: usize) -> Result<f64, FluidQueueError> {
        let dq = self.dq;
        let ps = dq.phases();
        let k_cells = dq.n_cells();
        let last_cell = k_cells - 1;
        let refl = dq.queue().reflection();

        let row_c = dq.classify(row)?;
        let col_c = dq.classify(col)?;

        let mut val = 0.0;
        match (row_c, col_c) {
            // Point-mass exchange within one barrier follows the rate matrix.
            (Coordinate::LwrBoundary(i), Coordinate::LwrBoundary(j)) => {
                val = self.t[(i, j)];
            }
            (Coordinate::UprBoundary(i), Coordinate::UprBoundary(j)) => {
                val = self.t[(i, j)];
            }
            (Coordinate::LwrBoundary(_), Coordinate::UprBoundary(_))
            | (Coordinate::UprBoundary(_), Coordinate::LwrBoundary(_)) => {}

            // Point mass drains into non-member phases' adjacent cells.
            (Coordinate::LwrBoundary(i), Coordinate::Interior { phase, cell, basis }) => {
                if cell == 0 && !ps.is_lwr_member(phase) {
                    val = self.t[(i, phase)] * self.flux.lower.outflow[basis];
                }
            }
            (Coordinate::UprBoundary(i), Coordinate::Interior { phase, cell, basis }) => {
                if cell == last_cell && !ps.is_upr_member(phase) {
                    val = self.t[(i, phase)] * self.flux.upper.outflow[basis];
                }
            }

            // First/last cell drains into the point masses, routed through
            // the reflection matrix in the bounded variant.
            (Coordinate::Interior { phase, cell, basis }, Coordinate::LwrBoundary(j)) => {
                let c = ps.rate(phase);
                if c < 0.0 && cell == 0 {
                    let rate = -c * self.flux.lower.inflow[basis] / dq.mesh().cell_width(0);
                    val = match refl {
                        None => {
                            if phase == j {
                                rate
                            } else {
                                0.0
                            }
                        }
                        Some(r) => rate * r.lwr(phase, j),
                    };
                }
            }
            (Coordinate::Interior { phase, cell, basis }, Coordinate::UprBoundary(j)) => {
                let c = ps.rate(phase);
                if c > 0.0 && cell == last_cell {
                    let rate =
                        c * self.flux.upper.inflow[basis] / dq.mesh().cell_width(last_cell);
                    val = match refl {
                        None => {
                            if phase == j {
                                rate
                            } else {
                                0.0
                            }
                        }
                        Some(r) => rate * r.upr(phase, j),
                    };
                }
            }

            (
                Coordinate::Interior {
                    phase: i,
                    cell: k,
                    basis: q,
                },
                Coordinate::Interior {
                    phase: j,
                    cell: l,
                    basis: q2,
                },
            ) => {
                let c = ps.rate(i);
                let dk = dq.mesh().cell_width(k);
                if i == j {
                    if k == l {
                        if c > 0.0 {
                            val += c * self.blocks.diag_up[(q, q2)] / dk;
                        } else if c < 0.0 {
                            val += -c * self.blocks.diag_down[(q, q2)] / dk;
                        }
                        if q == q2 {
                            val += self.t[(i, i)];
                        }
                    } else if c > 0.0 && l == k + 1 {
                        val += c * self.blocks.up[(q, q2)] / dk;
                    } else if c < 0.0 && l + 1 == k {
                        val += -c * self.blocks.down[(q, q2)] / dk;
                    }
                } else if k == l {
                    if self.uses_flip(i, j) {
                        val += self.t[(i, j)] * self.flip[(q, q2)];
                    } else if q == q2 {
                        val += self.t[(i, j)];
                    }
                }
                // Bounded variant: instantaneous reflection back into the
                // interior of non-member phases.
                if let Some(r) = refl {
                    if c < 0.0 && k == 0 && l == 0 && !ps.is_lwr_member(j) {
                        val += -c * self.flux.lower.inflow[q] * r.lwr(i, j)
                            * self.flux.lower.outflow[q2]
                            / dq.mesh().cell_width(0);
                    }
                    if c > 0.0 && k == last_cell && l == last_cell && !ps.is_upr_member(j) {
                        val += c * self.flux.upper.inflow[q] * r.upr(i, j)
                            * self.flux.upper.outflow[q2]
                            / dq.mesh().cell_width(last_cell);
                    }
                }
            }
        }

        Ok(val)
    }

    /// Structural enumeration of one operator row: `(col, value)` pairs,
    /// zeros skipped. Columns may repeat where contributions overlap;
    /// consumers sum. Shared by the sparse kernels and materialisation.
    pub(crate) fn row_entries(&self, row: usize) -> Vec<(usize, f64)> {
        let dq = self.dq;
        let ps = dq.phases();
        let n = dq.n_phases();
        let p = dq.n_bases();
        let k_cells = dq.n_cells();
        let last_cell = k_cells - 1;
        let upr_base = dq.n_lwr() + dq.interior_len();
        let refl = dq.queue().reflection();

        let mut out: Vec<(usize, f64)> = Vec::new();
        let push = |out: &mut Vec<(usize, f64)>, col: usize, val: f64| {
            if val != 0.0 {
                out.push((col, val));
            }
        };

        match dq.classify(row).expect("row index validated by caller") {
            Coordinate::LwrBoundary(i) => {
                for j in 0..n {
                    let tij = self.t[(i, j)];
                    if ps.is_lwr_member(j) {
                        push(&mut out, ps.lwr_rank(j), tij);
                    } else {
                        let base = dq.interior_base(j, 0);
                        for q2 in 0..p {
                            push(&mut out, base + q2, tij * self.flux.lower.outflow[q2]);
                        }
                    }
                }
            }
            Coordinate::UprBoundary(i) => {
                for j in 0..n {
                    let tij = self.t[(i, j)];
                    if ps.is_upr_member(j) {
                        push(&mut out, upr_base + ps.upr_rank(j), tij);
                    } else {
                        let base = dq.interior_base(j, last_cell);
                        for q2 in 0..p {
                            push(&mut out, base + q2, tij * self.flux.upper.outflow[q2]);
                        }
                    }
                }
            }
            Coordinate::Interior {
                phase: i,
                cell: k,
                basis: q,
            } => {
                let c = ps.rate(i);
                let dk = dq.mesh().cell_width(k);
                let base = dq.interior_base(i, k);

                // Same-cell diagonal block plus the rate-matrix diagonal.
                if c > 0.0 {
                    for q2 in 0..p {
                        let mut v = c * self.blocks.diag_up[(q, q2)] / dk;
                        if q2 == q {
                            v += self.t[(i, i)];
                        }
                        push(&mut out, base + q2, v);
                    }
                } else if c < 0.0 {
                    for q2 in 0..p {
                        let mut v = -c * self.blocks.diag_down[(q, q2)] / dk;
                        if q2 == q {
                            v += self.t[(i, i)];
                        }
                        push(&mut out, base + q2, v);
                    }
                } else {
                    push(&mut out, base + q, self.t[(i, i)]);
                }

                // Transport out of the cell, with the drift.
                if c > 0.0 {
                    if k < last_cell {
                        let next = dq.interior_base(i, k + 1);
                        for q2 in 0..p {
                            push(&mut out, next + q2, c * self.blocks.up[(q, q2)] / dk);
                        }
                    } else {
                        let rate = c * self.flux.upper.inflow[q] / dk;
                        match refl {
                            None => push(&mut out, upr_base + ps.upr_rank(i), rate),
                            Some(r) => {
                                for j in 0..n {
                                    let w = rate * r.upr(i, j);
                                    if ps.is_upr_member(j) {
                                        push(&mut out, upr_base + ps.upr_rank(j), w);
                                    } else {
                                        let adj = dq.interior_base(j, last_cell);
                                        for q2 in 0..p {
                                            push(
                                                &mut out,
                                                adj + q2,
                                                w * self.flux.upper.outflow[q2],
                                            );
                                        }
                                    }
                                }
                            }
                        }
                    }
                } else if c < 0.0 {
                    if k > 0 {
                        let prev = dq.interior_base(i, k - 1);
                        for q2 in 0..p {
                            push(&mut out, prev + q2, -c * self.blocks.down[(q, q2)] / dk);
                        }
                    } else {
                        let rate = -c * self.flux.lower.inflow[q] / dk;
                        match refl {
                            None => push(&mut out, ps.lwr_rank(i), rate),
                            Some(r) => {
                                for j in 0..n {
                                    let w = rate * r.lwr(i, j);
                                    if ps.is_lwr_member(j) {
                                        push(&mut out, ps.lwr_rank(j), w);
                                    } else {
                                        let adj = dq.interior_base(j, 0);
                                        for q2 in 0..p {
                                            push(
                                                &mut out,
                                                adj + q2,
                                                w * self.flux.lower.outflow[q2],
                                            );
                                        }
                                    }
                                }
                            }
                        }
                    }
                }

                // Cross-phase coupling within the cell.
                for j in 0..n {
                    if j == i {
                        continue;
                    }
                    let tij = self.t[(i, j)];
                    if tij == 0.0 {
                        continue;
                    }
                    let other = dq.interior_base(j, k);
                    if self.uses_flip(i, j) {
                        for q2 in 0..p {
                            push(&mut out, other + q2, tij * self.flip[(q, q2)]);
                        }
                    } else {
                        push(&mut out, other + q, tij);
                    }
                }
            }
        }

        out
    }
}

/// Build the lazy generator for a discretised queue, dispatching on the
/// mesh scheme.
pub fn build_lazy_generator(
    dq: &DiscretisedFluidQueue,
) -> Result<LazyGenerator<'_>, FluidQueueError> {
    match dq.mesh().scheme() {
        Scheme::Dg => {
            let (blocks, flux, flip) = dg_recipes(dq.n_bases());
            LazyGenerator::new(dq, blocks, flux, flip)
        }
        Scheme::Frap(me) => {
            let (blocks, flux, flip) = frap_recipes(me);
            LazyGenerator::new(dq, blocks, flux, flip)
        }
        Scheme::FiniteVolume => Err(FluidQueueError::Unsupported("finite-volume")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::Mesh;
    use crate::model::{FluidQueue, PhaseSet};

    fn single_phase_dq() -> DiscretisedFluidQueue {
        // One up-drifting phase, two unit cells, one basis function.
        let phases =
            PhaseSet::with_default_membership(vec![1.0], Mat::zeros(1, 1)).unwrap();
        let mesh = Mesh::dg_uniform(0.0, 2.0, 2, 1).unwrap();
        DiscretisedFluidQueue::new(FluidQueue::new(phases), mesh)
    }

    #[test]
    fn test_single_phase_entries() {
        let dq = single_phase_dq();
        let gen = build_lazy_generator(&dq).unwrap();
        assert_eq!(gen.shape(), (3, 3));

        // Interior chain 0 -> 1 -> upper point mass at rate c/h = 1.
        assert!((gen.get(0, 0).unwrap() + 1.0).abs() < 1e-14);
        assert!((gen.get(0, 1).unwrap() - 1.0).abs() < 1e-14);
        assert!((gen.get(1, 1).unwrap() + 1.0).abs() < 1e-14);
        assert!((gen.get(1, 2).unwrap() - 1.0).abs() < 1e-14);
        // Absorbing upper point mass (T = 0).
        assert!((gen.get(2, 2).unwrap()).abs() < 1e-14);
        assert!((gen.get(2, 0).unwrap()).abs() < 1e-14);
        // No transport against the drift.
        assert!((gen.get(1, 0).unwrap()).abs() < 1e-14);
    }

    #[test]
    fn test_get_bounds_checked() {
        let dq = single_phase_dq();
        let gen = build_lazy_generator(&dq).unwrap();
        assert!(gen.get(3, 0).is_err());
        assert!(gen.get(0, 3).is_err());
        assert!(gen.dim(0).unwrap() == 3 && gen.dim(1).unwrap() == 3);
        assert!(gen.dim(2).is_err());
    }

    #[test]
    fn test_row_entries_match_get() {
        let dq = single_phase_dq();
        let gen = build_lazy_generator(&dq).unwrap();
        let (m, _) = gen.shape();
        for row in 0..m {
            let mut dense = vec![0.0; m];
            for (col, v) in gen.row_entries(row) {
                dense[col] += v;
            }
            for (col, &v) in dense.iter().enumerate() {
                let g = gen.get(row, col).unwrap();
                assert!(
                    (g - v).abs() < 1e-14,
                    "entry ({}, {}): get {} vs row {}",
                    row,
                    col,
                    g,
                    v
                );
            }
        }
    }

    #[test]
    fn test_scale_is_entrywise() {
        let dq = single_phase_dq();
        let gen = build_lazy_generator(&dq).unwrap();
        let scaled = gen.scale(2.5);
        let (m, _) = gen.shape();
        for row in 0..m {
            for col in 0..m {
                let expected = 2.5 * gen.get(row, col).unwrap();
                assert!((scaled.get(row, col).unwrap() - expected).abs() < 1e-13);
            }
        }
    }

    #[test]
    fn test_fv_scheme_unsupported() {
        let phases =
            PhaseSet::with_default_membership(vec![1.0], Mat::zeros(1, 1)).unwrap();
        let mesh = Mesh::fv(vec![0.0, 1.0, 2.0]).unwrap();
        let dq = DiscretisedFluidQueue::new(FluidQueue::new(phases), mesh);
        assert!(matches!(
            build_lazy_generator(&dq),
            Err(FluidQueueError::Unsupported(_))
        ));
    }

    #[test]
    fn test_block_shape_validated() {
        let dq = single_phase_dq();
        let (blocks, flux, _flip) = crate::generator::blocks::dg_recipes(1);
        let bad_flip = Mat::zeros(2, 2);
        assert!(LazyGenerator::new(&dq, blocks, flux, bad_flip).is_err());
    }
}
