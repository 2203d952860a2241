//! Structured multiply kernels of the lazy generator.
//!
//! Both kernels traverse the same seven additive contributions:
//!
//! 1. boundary-to-boundary (rate matrix restricted to each barrier),
//! 2. interior-to-lower-boundary flux in (reflection-routed when bounded),
//! 3. lower-boundary-to-interior flux out,
//! 4. interior-to-upper-boundary flux in,
//! 5. upper-boundary-to-interior flux out,
//! 6. same-phase cell tridiagonal (upwind blocks, drift-sign dispatch),
//! 7. cross-phase same-cell coupling (flip-routed under FRAP).
//!
//! The left kernel computes v = u·B one row of u at a time, so callers may
//! partition rows across threads (`mul_left_parallel`); the right kernel
//! computes v = B·u one column of u at a time. On uniform meshes the
//! combined diagonal block |c|·B_diag/Δ + T_ii·I and the scaled shift block
//! are precomputed once per phase.
//!
//! Cost is O(N·K·p²) per row/column of the operand, never O(M²).

use faer::Mat;

use crate::error::FluidQueueError;
use crate::generator::LazyGenerator;
use crate::sparse::CscMatrix;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Per-phase precomputed cell operators for uniform meshes.
struct DiagOps {
    /// |c|·B_diag/Δ + T_ii·I.
    diag: Mat<f64>,
    /// |c|·B_shift/Δ toward the drift direction; `None` for zero drift.
    shift: Option<Mat<f64>>,
}

impl<'a> LazyGenerator<'a> {
    fn uniform_ops(&self) -> Option<Vec<DiagOps>> {
        if !self.dq.mesh().is_uniform() {
            return None;
        }
        let h = self.dq.mesh().cell_width(0);
        let p = self.dq.n_bases();
        let ops = (0..self.dq.n_phases())
            .map(|i| {
                let c = self.dq.phases().rate(i);
                let tii = self.t[(i, i)];
                let mut diag = Mat::zeros(p, p);
                let mut shift = None;
                let (block, shift_block) = if c > 0.0 {
                    (Some(&self.blocks.diag_up), Some(&self.blocks.up))
                } else if c < 0.0 {
                    (Some(&self.blocks.diag_down), Some(&self.blocks.down))
                } else {
                    (None, None)
                };
                let s = c.abs() / h;
                if let Some(block) = block {
                    for q in 0..p {
                        for q2 in 0..p {
                            diag[(q, q2)] = s * block[(q, q2)];
                        }
                    }
                }
                for q in 0..p {
                    diag[(q, q)] += tii;
                }
                if let Some(sb) = shift_block {
                    let mut m = Mat::zeros(p, p);
                    for q in 0..p {
                        for q2 in 0..p {
                            m[(q, q2)] = s * sb[(q, q2)];
                        }
                    }
                    shift = Some(m);
                }
                DiagOps { diag, shift }
            })
            .collect();
        Some(ops)
    }

    /// Left multiply v = u·B for a dense operand u of shape m×M.
    pub fn mul_left(&self, u: &Mat<f64>) -> Result<Mat<f64>, FluidQueueError> {
        let (m_op, _) = self.shape();
        if u.ncols() != m_op {
            return Err(FluidQueueError::ShapeMismatch {
                what: "left operand cols",
                expected: m_op,
                got: u.ncols(),
            });
        }
        let ops = self.uniform_ops();
        let mut v = Mat::zeros(u.nrows(), m_op);
        let mut buf = vec![0.0; m_op];
        for r in 0..u.nrows() {
            buf.fill(0.0);
            self.left_row(u, r, &mut buf, ops.as_deref());
            for (c, &x) in buf.iter().enumerate() {
                v[(r, c)] = x;
            }
        }
        Ok(v)
    }

    /// Left multiply with the rows of u partitioned across threads.
    #[cfg(feature = "parallel")]
    pub fn mul_left_parallel(&self, u: &Mat<f64>) -> Result<Mat<f64>, FluidQueueError> {
        let (m_op, _) = self.shape();
        if u.ncols() != m_op {
            return Err(FluidQueueError::ShapeMismatch {
                what: "left operand cols",
                expected: m_op,
                got: u.ncols(),
            });
        }
        let ops = self.uniform_ops();
        let rows: Vec<Vec<f64>> = (0..u.nrows())
            .into_par_iter()
            .map(|r| {
                let mut buf = vec![0.0; m_op];
                self.left_row(u, r, &mut buf, ops.as_deref());
                buf
            })
            .collect();
        let mut v = Mat::zeros(u.nrows(), m_op);
        for (r, row) in rows.iter().enumerate() {
            for (c, &x) in row.iter().enumerate() {
                v[(r, c)] = x;
            }
        }
        Ok(v)
    }

    /// Right multiply v = B·u for a dense operand u of shape M×m.
    pub fn mul_right(&self, u: &Mat<f64>) -> Result<Mat<f64>, FluidQueueError> {
        let (m_op, _) = self.shape();
        if u.nrows() != m_op {
            return Err(FluidQueueError::ShapeMismatch {
                what: "right operand rows",
                expected: m_op,
                got: u.nrows(),
            });
        }
        let ops = self.uniform_ops();
        let mut v = Mat::zeros(m_op, u.ncols());
        let mut buf = vec![0.0; m_op];
        for cc in 0..u.ncols() {
            buf.fill(0.0);
            self.right_col(u, cc, &mut buf, ops.as_deref());
            for (r, &x) in buf.iter().enumerate() {
                v[(r, cc)] = x;
            }
        }
        Ok(v)
    }

    /// One row of the left multiply: out[col] += u[r, row]·B[row, col].
    fn left_row(&self, u: &Mat<f64>, r: usize, out: &mut [f64], ops: Option<&[DiagOps]>) {
        let dq = self.dq;
        let ps = dq.phases();
        let mesh = dq.mesh();
        let n = dq.n_phases();
        let p = dq.n_bases();
        let kc = dq.n_cells();
        let last = kc - 1;
        let upr_base = dq.n_lwr() + dq.interior_len();
        let refl = dq.queue().reflection();

        // 1. Boundary-to-boundary.
        for i in 0..n {
            if ps.is_lwr_member(i) {
                let ui = u[(r, ps.lwr_rank(i))];
                if ui != 0.0 {
                    for j in 0..n {
                        if ps.is_lwr_member(j) {
                            out[ps.lwr_rank(j)] += ui * self.t[(i, j)];
                        }
                    }
                }
            }
            if ps.is_upr_member(i) {
                let ui = u[(r, upr_base + ps.upr_rank(i))];
                if ui != 0.0 {
                    for j in 0..n {
                        if ps.is_upr_member(j) {
                            out[upr_base + ps.upr_rank(j)] += ui * self.t[(i, j)];
                        }
                    }
                }
            }
        }

        // 2. Interior to lower boundary (flux in).
        for i in 0..n {
            let c = ps.rate(i);
            if c >= 0.0 {
                continue;
            }
            let base = dq.interior_base(i, 0);
            let mut rho = 0.0;
            for q in 0..p {
                rho += u[(r, base + q)] * self.flux.lower.inflow[q];
            }
            rho *= -c / mesh.cell_width(0);
            if rho == 0.0 {
                continue;
            }
            match refl {
                None => out[ps.lwr_rank(i)] += rho,
                Some(refl) => {
                    for j in 0..n {
                        let w = rho * refl.lwr(i, j);
                        if w == 0.0 {
                            continue;
                        }
                        if ps.is_lwr_member(j) {
                            out[ps.lwr_rank(j)] += w;
                        } else {
                            let adj = dq.interior_base(j, 0);
                            for q2 in 0..p {
                                out[adj + q2] += w * self.flux.lower.outflow[q2];
                            }
                        }
                    }
                }
            }
        }

        // 3. Lower boundary to interior (flux out).
        for i in 0..n {
            if !ps.is_lwr_member(i) {
                continue;
            }
            let ui = u[(r, ps.lwr_rank(i))];
            if ui == 0.0 {
                continue;
            }
            for j in 0..n {
                if ps.is_lwr_member(j) {
                    continue;
                }
                let w = ui * self.t[(i, j)];
                if w == 0.0 {
                    continue;
                }
                let adj = dq.interior_base(j, 0);
                for q2 in 0..p {
                    out[adj + q2] += w * self.flux.lower.outflow[q2];
                }
            }
        }

        // 4. Interior to upper boundary (flux in).
        for i in 0..n {
            let c = ps.rate(i);
            if c <= 0.0 {
                continue;
            }
            let base = dq.interior_base(i, last);
            let mut rho = 0.0;
            for q in 0..p {
                rho += u[(r, base + q)] * self.flux.upper.inflow[q];
            }
            rho *= c / mesh.cell_width(last);
            if rho == 0.0 {
                continue;
            }
            match refl {
                None => out[upr_base + ps.upr_rank(i)] += rho,
                Some(refl) => {
                    for j in 0..n {
                        let w = rho * refl.upr(i, j);
                        if w == 0.0 {
                            continue;
                        }
                        if ps.is_upr_member(j) {
                            out[upr_base + ps.upr_rank(j)] += w;
                        } else {
                            let adj = dq.interior_base(j, last);
                            for q2 in 0..p {
                                out[adj + q2] += w * self.flux.upper.outflow[q2];
                            }
                        }
                    }
                }
            }
        }

        // 5. Upper boundary to interior (flux out).
        for i in 0..n {
            if !ps.is_upr_member(i) {
                continue;
            }
            let ui = u[(r, upr_base + ps.upr_rank(i))];
            if ui == 0.0 {
                continue;
            }
            for j in 0..n {
                if ps.is_upr_member(j) {
                    continue;
                }
                let w = ui * self.t[(i, j)];
                if w == 0.0 {
                    continue;
                }
                let adj = dq.interior_base(j, last);
                for q2 in 0..p {
                    out[adj + q2] += w * self.flux.upper.outflow[q2];
                }
            }
        }

        // 6. Same-phase cell tridiagonal.
        for i in 0..n {
            let c = ps.rate(i);
            if let Some(ops) = ops {
                let op = &ops[i];
                for k in 0..kc {
                    let base = dq.interior_base(i, k);
                    for q2 in 0..p {
                        let mut acc = 0.0;
                        for q in 0..p {
                            acc += u[(r, base + q)] * op.diag[(q, q2)];
                        }
                        out[base + q2] += acc;
                    }
                }
                if let Some(shift) = &op.shift {
                    if c > 0.0 {
                        for k in 0..last {
                            let src = dq.interior_base(i, k);
                            let dst = dq.interior_base(i, k + 1);
                            for q2 in 0..p {
                                let mut acc = 0.0;
                                for q in 0..p {
                                    acc += u[(r, src + q)] * shift[(q, q2)];
                                }
                                out[dst + q2] += acc;
                            }
                        }
                    } else {
                        for k in 1..kc {
                            let src = dq.interior_base(i, k);
                            let dst = dq.interior_base(i, k - 1);
                            for q2 in 0..p {
                                let mut acc = 0.0;
                                for q in 0..p {
                                    acc += u[(r, src + q)] * shift[(q, q2)];
                                }
                                out[dst + q2] += acc;
                            }
                        }
                    }
                }
                continue;
            }

            // Graded mesh: scale per cell.
            let tii = self.t[(i, i)];
            if c == 0.0 {
                for k in 0..kc {
                    let base = dq.interior_base(i, k);
                    for q in 0..p {
                        out[base + q] += tii * u[(r, base + q)];
                    }
                }
                continue;
            }
            let (block, shift_block) = if c > 0.0 {
                (&self.blocks.diag_up, &self.blocks.up)
            } else {
                (&self.blocks.diag_down, &self.blocks.down)
            };
            for k in 0..kc {
                let s = c.abs() / mesh.cell_width(k);
                let base = dq.interior_base(i, k);
                for q2 in 0..p {
                    let mut acc = 0.0;
                    for q in 0..p {
                        acc += u[(r, base + q)] * block[(q, q2)];
                    }
                    out[base + q2] += s * acc + tii * u[(r, base + q2)];
                }
                let dst = if c > 0.0 {
                    if k == last {
                        continue;
                    }
                    dq.interior_base(i, k + 1)
                } else {
                    if k == 0 {
                        continue;
                    }
                    dq.interior_base(i, k - 1)
                };
                for q2 in 0..p {
                    let mut acc = 0.0;
                    for q in 0..p {
                        acc += u[(r, base + q)] * shift_block[(q, q2)];
                    }
                    out[dst + q2] += s * acc;
                }
            }
        }

        // 7. Cross-phase same-cell coupling.
        for i in 0..n {
            for j in 0..n {
                if j == i {
                    continue;
                }
                let tij = self.t[(i, j)];
                if tij == 0.0 {
                    continue;
                }
                if self.uses_flip(i, j) {
                    for k in 0..kc {
                        let src = dq.interior_base(i, k);
                        let dst = dq.interior_base(j, k);
                        for q2 in 0..p {
                            let mut acc = 0.0;
                            for q in 0..p {
                                acc += u[(r, src + q)] * self.flip[(q, q2)];
                            }
                            out[dst + q2] += tij * acc;
                        }
                    }
                } else {
                    for k in 0..kc {
                        let src = dq.interior_base(i, k);
                        let dst = dq.interior_base(j, k);
                        for q in 0..p {
                            out[dst + q] += tij * u[(r, src + q)];
                        }
                    }
                }
            }
        }
    }

    /// One column of the right multiply: out[row] += B[row, col]·u[col, cc].
    fn right_col(&self, u: &Mat<f64>, cc: usize, out: &mut [f64], ops: Option<&[DiagOps]>) {
        let dq = self.dq;
        let ps = dq.phases();
        let mesh = dq.mesh();
        let n = dq.n_phases();
        let p = dq.n_bases();
        let kc = dq.n_cells();
        let last = kc - 1;
        let upr_base = dq.n_lwr() + dq.interior_len();
        let refl = dq.queue().reflection();

        // 1. Boundary-to-boundary.
        for i in 0..n {
            if ps.is_lwr_member(i) {
                let mut acc = 0.0;
                for j in 0..n {
                    if ps.is_lwr_member(j) {
                        acc += self.t[(i, j)] * u[(ps.lwr_rank(j), cc)];
                    }
                }
                out[ps.lwr_rank(i)] += acc;
            }
            if ps.is_upr_member(i) {
                let mut acc = 0.0;
                for j in 0..n {
                    if ps.is_upr_member(j) {
                        acc += self.t[(i, j)] * u[(upr_base + ps.upr_rank(j), cc)];
                    }
                }
                out[upr_base + ps.upr_rank(i)] += acc;
            }
        }

        // 2. Interior to lower boundary (flux in).
        for i in 0..n {
            let c = ps.rate(i);
            if c >= 0.0 {
                continue;
            }
            // Value received by the first cell of phase i per unit inflow.
            let received = match refl {
                None => u[(ps.lwr_rank(i), cc)],
                Some(refl) => {
                    let mut acc = 0.0;
                    for j in 0..n {
                        let pij = refl.lwr(i, j);
                        if pij == 0.0 {
                            continue;
                        }
                        if ps.is_lwr_member(j) {
                            acc += pij * u[(ps.lwr_rank(j), cc)];
                        } else {
                            let adj = dq.interior_base(j, 0);
                            for q2 in 0..p {
                                acc += pij * self.flux.lower.outflow[q2] * u[(adj + q2, cc)];
                            }
                        }
                    }
                    acc
                }
            };
            if received == 0.0 {
                continue;
            }
            let base = dq.interior_base(i, 0);
            let s = -c / mesh.cell_width(0);
            for q in 0..p {
                out[base + q] += s * self.flux.lower.inflow[q] * received;
            }
        }

        // 3. Lower boundary to interior (flux out).
        for i in 0..n {
            if !ps.is_lwr_member(i) {
                continue;
            }
            let mut acc = 0.0;
            for j in 0..n {
                if ps.is_lwr_member(j) {
                    continue;
                }
                let tij = self.t[(i, j)];
                if tij == 0.0 {
                    continue;
                }
                let adj = dq.interior_base(j, 0);
                for q2 in 0..p {
                    acc += tij * self.flux.lower.outflow[q2] * u[(adj + q2, cc)];
                }
            }
            out[ps.lwr_rank(i)] += acc;
        }

        // 4. Interior to upper boundary (flux in).
        for i in 0..n {
            let c = ps.rate(i);
            if c <= 0.0 {
                continue;
            }
            let received = match refl {
                None => u[(upr_base + ps.upr_rank(i), cc)],
                Some(refl) => {
                    let mut acc = 0.0;
                    for j in 0..n {
                        let pij = refl.upr(i, j);
                        if pij == 0.0 {
                            continue;
                        }
                        if ps.is_upr_member(j) {
                            acc += pij * u[(upr_base + ps.upr_rank(j), cc)];
                        } else {
                            let adj = dq.interior_base(j, last);
                            for q2 in 0..p {
                                acc += pij * self.flux.upper.outflow[q2] * u[(adj + q2, cc)];
                            }
                        }
                    }
                    acc
                }
            };
            if received == 0.0 {
                continue;
            }
            let base = dq.interior_base(i, last);
            let s = c / mesh.cell_width(last);
            for q in 0..p {
                out[base + q] += s * self.flux.upper.inflow[q] * received;
            }
        }

        // 5. Upper boundary to interior (flux out).
        for i in 0..n {
            if !ps.is_upr_member(i) {
                continue;
            }
            let mut acc = 0.0;
            for j in 0..n {
                if ps.is_upr_member(j) {
                    continue;
                }
                let tij = self.t[(i, j)];
                if tij == 0.0 {
                    continue;
                }
                let adj = dq.interior_base(j, last);
                for q2 in 0..p {
                    acc += tij * self.flux.upper.outflow[q2] * u[(adj + q2, cc)];
                }
            }
            out[upr_base + ps.upr_rank(i)] += acc;
        }

        // 6. Same-phase cell tridiagonal.
        for i in 0..n {
            let c = ps.rate(i);
            if let Some(ops) = ops {
                let op = &ops[i];
                for k in 0..kc {
                    let base = dq.interior_base(i, k);
                    for q in 0..p {
                        let mut acc = 0.0;
                        for q2 in 0..p {
                            acc += op.diag[(q, q2)] * u[(base + q2, cc)];
                        }
                        out[base + q] += acc;
                    }
                }
                if let Some(shift) = &op.shift {
                    if c > 0.0 {
                        for k in 0..last {
                            let base = dq.interior_base(i, k);
                            let next = dq.interior_base(i, k + 1);
                            for q in 0..p {
                                let mut acc = 0.0;
                                for q2 in 0..p {
                                    acc += shift[(q, q2)] * u[(next + q2, cc)];
                                }
                                out[base + q] += acc;
                            }
                        }
                    } else {
                        for k in 1..kc {
                            let base = dq.interior_base(i, k);
                            let prev = dq.interior_base(i, k - 1);
                            for q in 0..p {
                                let mut acc = 0.0;
                                for q2 in 0..p {
                                    acc += shift[(q, q2)] * u[(prev + q2, cc)];
                                }
                                out[base + q] += acc;
                            }
                        }
                    }
                }
                continue;
            }

            let tii = self.t[(i, i)];
            if c == 0.0 {
                for k in 0..kc {
                    let base = dq.interior_base(i, k);
                    for q in 0..p {
                        out[base + q] += tii * u[(base + q, cc)];
                    }
                }
                continue;
            }
            let (block, shift_block) = if c > 0.0 {
                (&self.blocks.diag_up, &self.blocks.up)
            } else {
                (&self.blocks.diag_down, &self.blocks.down)
            };
            for k in 0..kc {
                let s = c.abs() / mesh.cell_width(k);
                let base = dq.interior_base(i, k);
                for q in 0..p {
                    let mut acc = 0.0;
                    for q2 in 0..p {
                        acc += block[(q, q2)] * u[(base + q2, cc)];
                    }
                    out[base + q] += s * acc + tii * u[(base + q, cc)];
                }
                let neighbour = if c > 0.0 {
                    if k == last {
                        continue;
                    }
                    dq.interior_base(i, k + 1)
                } else {
                    if k == 0 {
                        continue;
                    }
                    dq.interior_base(i, k - 1)
                };
                for q in 0..p {
                    let mut acc = 0.0;
                    for q2 in 0..p {
                        acc += shift_block[(q, q2)] * u[(neighbour + q2, cc)];
                    }
                    out[base + q] += s * acc;
                }
            }
        }

        // 7. Cross-phase same-cell coupling.
        for i in 0..n {
            for j in 0..n {
                if j == i {
                    continue;
                }
                let tij = self.t[(i, j)];
                if tij == 0.0 {
                    continue;
                }
                if self.uses_flip(i, j) {
                    for k in 0..kc {
                        let row_base = dq.interior_base(i, k);
                        let col_base = dq.interior_base(j, k);
                        for q in 0..p {
                            let mut acc = 0.0;
                            for q2 in 0..p {
                                acc += self.flip[(q, q2)] * u[(col_base + q2, cc)];
                            }
                            out[row_base + q] += tij * acc;
                        }
                    }
                } else {
                    for k in 0..kc {
                        let row_base = dq.interior_base(i, k);
                        let col_base = dq.interior_base(j, k);
                        for q in 0..p {
                            out[row_base + q] += tij * u[(col_base + q, cc)];
                        }
                    }
                }
            }
        }
    }

    /// Left multiply for a sparse operand; the result stays sparse.
    pub fn mul_left_sparse(&self, u: &CscMatrix) -> Result<CscMatrix, FluidQueueError> {
        let (m_op, _) = self.shape();
        if u.ncols() != m_op {
            return Err(FluidQueueError::ShapeMismatch {
                what: "left operand cols",
                expected: m_op,
                got: u.ncols(),
            });
        }
        let mut triplets = Vec::new();
        for c in 0..m_op {
            let (rows, vals) = u.col(c);
            if rows.is_empty() {
                continue;
            }
            let entries = self.row_entries(c);
            for (&r, &urc) in rows.iter().zip(vals) {
                for &(j, b) in &entries {
                    triplets.push((r, j, urc * b));
                }
            }
        }
        CscMatrix::from_triplets(u.nrows(), m_op, triplets)
    }

    /// Right multiply for a sparse operand; the result stays sparse.
    pub fn mul_right_sparse(&self, u: &CscMatrix) -> Result<CscMatrix, FluidQueueError> {
        let (m_op, _) = self.shape();
        if u.nrows() != m_op {
            return Err(FluidQueueError::ShapeMismatch {
                what: "right operand rows",
                expected: m_op,
                got: u.nrows(),
            });
        }
        let rows: Vec<Vec<(usize, f64)>> = (0..m_op).map(|r| self.row_entries(r)).collect();
        let mut triplets = Vec::new();
        let mut x = vec![0.0; m_op];
        for cc in 0..u.ncols() {
            let (ridx, vals) = u.col(cc);
            if ridx.is_empty() {
                continue;
            }
            for (&c, &val) in ridx.iter().zip(vals) {
                x[c] = val;
            }
            for (r, entries) in rows.iter().enumerate() {
                let mut acc = 0.0;
                for &(c, b) in entries {
                    acc += b * x[c];
                }
                if acc != 0.0 {
                    triplets.push((r, cc, acc));
                }
            }
            for &c in ridx {
                x[c] = 0.0;
            }
        }
        CscMatrix::from_triplets(m_op, u.ncols(), triplets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::build_lazy_generator;
    use crate::mesh::Mesh;
    use crate::me::MeParams;
    use crate::model::{DiscretisedFluidQueue, FluidQueue, PhaseSet};

    fn three_phase_set() -> PhaseSet {
        let mut t = Mat::zeros(3, 3);
        t[(0, 0)] = -2.0;
        t[(0, 1)] = 1.5;
        t[(0, 2)] = 0.5;
        t[(1, 0)] = 1.0;
        t[(1, 1)] = -1.0;
        t[(2, 0)] = 0.25;
        t[(2, 1)] = 0.25;
        t[(2, 2)] = -0.5;
        PhaseSet::with_default_membership(vec![2.0, -1.0, 0.0], t).unwrap()
    }

    fn assert_get_matches_kernels(dq: &DiscretisedFluidQueue) {
        let gen = build_lazy_generator(dq).unwrap();
        let (m, _) = gen.shape();

        let mut id = Mat::zeros(m, m);
        for i in 0..m {
            id[(i, i)] = 1.0;
        }
        let left = gen.mul_left(&id).unwrap();
        let right = gen.mul_right(&id).unwrap();

        for row in 0..m {
            for col in 0..m {
                let g = gen.get(row, col).unwrap();
                assert!(
                    (left[(row, col)] - g).abs() < 1e-12,
                    "left kernel disagrees with get at ({}, {}): {} vs {}",
                    row,
                    col,
                    left[(row, col)],
                    g
                );
                assert!(
                    (right[(row, col)] - g).abs() < 1e-12,
                    "right kernel disagrees with get at ({}, {}): {} vs {}",
                    row,
                    col,
                    right[(row, col)],
                    g
                );
            }
        }
    }

    #[test]
    fn test_get_matches_kernels_dg_uniform() {
        let dq = DiscretisedFluidQueue::new(
            FluidQueue::new(three_phase_set()),
            Mesh::dg_uniform(0.0, 4.0, 4, 3).unwrap(),
        );
        assert_get_matches_kernels(&dq);
    }

    #[test]
    fn test_get_matches_kernels_dg_graded() {
        let dq = DiscretisedFluidQueue::new(
            FluidQueue::new(three_phase_set()),
            Mesh::dg(vec![0.0, 0.5, 1.5, 3.0, 4.0], 2).unwrap(),
        );
        assert_get_matches_kernels(&dq);
    }

    #[test]
    fn test_get_matches_kernels_frap() {
        let dq = DiscretisedFluidQueue::new(
            FluidQueue::new(three_phase_set()),
            Mesh::frap(vec![0.0, 1.0, 2.0, 3.0], MeParams::erlang(2, 2.0)).unwrap(),
        );
        assert_get_matches_kernels(&dq);
    }

    #[test]
    fn test_get_matches_kernels_bounded() {
        let n = 3;
        let mut p_lwr = Mat::zeros(n, n);
        // Down-drifting phase 1 reflects into phase 0 or sticks in phase 2.
        p_lwr[(1, 0)] = 0.6;
        p_lwr[(1, 2)] = 0.4;
        let mut p_upr = Mat::zeros(n, n);
        // Up-drifting phase 0 reflects into phase 1 or sticks in itself.
        p_upr[(0, 1)] = 0.7;
        p_upr[(0, 0)] = 0.3;
        let queue = FluidQueue::bounded(three_phase_set(), p_lwr, p_upr).unwrap();
        let dq = DiscretisedFluidQueue::new(
            queue,
            Mesh::dg(vec![0.0, 0.75, 2.0, 4.0], 2).unwrap(),
        );
        assert_get_matches_kernels(&dq);
    }

    #[test]
    fn test_sparse_kernels_match_dense() {
        let dq = DiscretisedFluidQueue::new(
            FluidQueue::new(three_phase_set()),
            Mesh::dg_uniform(0.0, 3.0, 3, 2).unwrap(),
        );
        let gen = build_lazy_generator(&dq).unwrap();
        let (m, _) = gen.shape();

        let id_sparse = CscMatrix::identity(m);
        let left_sparse = gen.mul_left_sparse(&id_sparse).unwrap().to_dense();
        let right_sparse = gen.mul_right_sparse(&id_sparse).unwrap().to_dense();

        let mut id = Mat::zeros(m, m);
        for i in 0..m {
            id[(i, i)] = 1.0;
        }
        let left = gen.mul_left(&id).unwrap();

        for row in 0..m {
            for col in 0..m {
                assert!((left_sparse[(row, col)] - left[(row, col)]).abs() < 1e-12);
                assert!((right_sparse[(row, col)] - left[(row, col)]).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let dq = DiscretisedFluidQueue::new(
            FluidQueue::new(three_phase_set()),
            Mesh::dg_uniform(0.0, 3.0, 3, 2).unwrap(),
        );
        let gen = build_lazy_generator(&dq).unwrap();
        let wrong = Mat::zeros(2, 7);
        assert!(gen.mul_left(&wrong).is_err());
        assert!(gen.mul_right(&wrong).is_err());
        assert!(gen.mul_left_sparse(&CscMatrix::identity(7)).is_err());
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_parallel_matches_serial() {
        let dq = DiscretisedFluidQueue::new(
            FluidQueue::new(three_phase_set()),
            Mesh::dg_uniform(0.0, 4.0, 8, 3).unwrap(),
        );
        let gen = build_lazy_generator(&dq).unwrap();
        let (m, _) = gen.shape();
        let mut u = Mat::zeros(4, m);
        for r in 0..4 {
            for c in 0..m {
                u[(r, c)] = ((r * m + c) % 7) as f64 - 3.0;
            }
        }
        let serial = gen.mul_left(&u).unwrap();
        let parallel = gen.mul_left_parallel(&u).unwrap();
        for r in 0..4 {
            for c in 0..m {
                assert!((serial[(r, c)] - parallel[(r, c)]).abs() < 1e-13);
            }
        }
    }
}
