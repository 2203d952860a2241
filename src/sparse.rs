//! Compressed sparse column storage for the materialised generator.
//!
//! # Layout
//!
//! For an `nrows × ncols` matrix with `nnz` stored entries:
//! - `col_ptr` has length `ncols + 1`
//! - `row_idx` and `values` each have length `nnz`
//! - column `j` spans `col_ptr[j]..col_ptr[j + 1]`, rows sorted ascending
//!
//! Construction goes through triplets; duplicates are summed, so assembly
//! code may push overlapping contributions freely.

use faer::Mat;

use crate::error::FluidQueueError;

/// Sparse matrix in compressed sparse column format.
#[derive(Clone, Debug)]
pub struct CscMatrix {
    nrows: usize,
    ncols: usize,
    col_ptr: Vec<usize>,
    row_idx: Vec<usize>,
    values: Vec<f64>,
}

impl CscMatrix {
    /// Build from (row, col, value) triplets. Duplicate positions are
    /// summed; entries may arrive in any order.
    pub fn from_triplets(
        nrows: usize,
        ncols: usize,
        mut triplets: Vec<(usize, usize, f64)>,
    ) -> Result<Self, FluidQueueError> {
        for &(r, c, _) in &triplets {
            if r >= nrows {
                return Err(FluidQueueError::OutOfRange {
                    what: "triplet row",
                    index: r,
                    limit: nrows,
                });
            }
            if c >= ncols {
                return Err(FluidQueueError::OutOfRange {
                    what: "triplet col",
                    index: c,
                    limit: ncols,
                });
            }
        }

        triplets.sort_unstable_by(|a, b| (a.1, a.0).cmp(&(b.1, b.0)));

        let mut col_ptr = vec![0usize; ncols + 1];
        let mut row_idx = Vec::with_capacity(triplets.len());
        let mut values: Vec<f64> = Vec::with_capacity(triplets.len());

        let mut last: Option<(usize, usize)> = None;
        for (r, c, v) in triplets {
            if last == Some((c, r)) {
                *values.last_mut().unwrap() += v;
            } else {
                row_idx.push(r);
                values.push(v);
                last = Some((c, r));
            }
            col_ptr[c + 1] = values.len();
        }

        // Columns without entries inherit the running pointer.
        for j in 0..ncols {
            if col_ptr[j + 1] < col_ptr[j] {
                col_ptr[j + 1] = col_ptr[j];
            }
        }

        Ok(Self {
            nrows,
            ncols,
            col_ptr,
            row_idx,
            values,
        })
    }

    /// Sparse identity of size n.
    pub fn identity(n: usize) -> Self {
        Self {
            nrows: n,
            ncols: n,
            col_ptr: (0..=n).collect(),
            row_idx: (0..n).collect(),
            values: vec![1.0; n],
        }
    }

    /// Number of rows.
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    /// Number of columns.
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Stored entry count.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Row indices and values of column j.
    pub fn col(&self, j: usize) -> (&[usize], &[f64]) {
        let span = self.col_ptr[j]..self.col_ptr[j + 1];
        (&self.row_idx[span.clone()], &self.values[span])
    }

    /// Element read; absent positions are zero.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        assert!(i < self.nrows && j < self.ncols, "index out of bounds");
        let (rows, vals) = self.col(j);
        match rows.binary_search(&i) {
            Ok(pos) => vals[pos],
            Err(_) => 0.0,
        }
    }

    /// Row sums, Σ_j A[i, j].
    pub fn row_sums(&self) -> Vec<f64> {
        let mut sums = vec![0.0; self.nrows];
        for j in 0..self.ncols {
            let (rows, vals) = self.col(j);
            for (&r, &v) in rows.iter().zip(vals) {
                sums[r] += v;
            }
        }
        sums
    }

    fn check_same_shape(&self, other: &Self) -> Result<(), FluidQueueError> {
        if self.nrows != other.nrows {
            return Err(FluidQueueError::ShapeMismatch {
                what: "sparse operand rows",
                expected: self.nrows,
                got: other.nrows,
            });
        }
        if self.ncols != other.ncols {
            return Err(FluidQueueError::ShapeMismatch {
                what: "sparse operand cols",
                expected: self.ncols,
                got: other.ncols,
            });
        }
        Ok(())
    }

    /// Entrywise sum.
    pub fn add(&self, other: &Self) -> Result<Self, FluidQueueError> {
        self.check_same_shape(other)?;
        Ok(self.merge(other, 1.0))
    }

    /// Entrywise difference.
    pub fn sub(&self, other: &Self) -> Result<Self, FluidQueueError> {
        self.check_same_shape(other)?;
        Ok(self.merge(other, -1.0))
    }

    fn merge(&self, other: &Self, beta: f64) -> Self {
        let mut col_ptr = vec![0usize; self.ncols + 1];
        let mut row_idx = Vec::with_capacity(self.nnz() + other.nnz());
        let mut values = Vec::with_capacity(self.nnz() + other.nnz());

        for j in 0..self.ncols {
            let (ra, va) = self.col(j);
            let (rb, vb) = other.col(j);
            let (mut ia, mut ib) = (0, 0);
            while ia < ra.len() || ib < rb.len() {
                let next_a = ra.get(ia).copied().unwrap_or(usize::MAX);
                let next_b = rb.get(ib).copied().unwrap_or(usize::MAX);
                if next_a < next_b {
                    row_idx.push(next_a);
                    values.push(va[ia]);
                    ia += 1;
                } else if next_b < next_a {
                    row_idx.push(next_b);
                    values.push(beta * vb[ib]);
                    ib += 1;
                } else {
                    row_idx.push(next_a);
                    values.push(va[ia] + beta * vb[ib]);
                    ia += 1;
                    ib += 1;
                }
            }
            col_ptr[j + 1] = values.len();
        }

        Self {
            nrows: self.nrows,
            ncols: self.ncols,
            col_ptr,
            row_idx,
            values,
        }
    }

    /// Sparse-sparse product, column-by-column with a dense accumulator.
    pub fn matmul(&self, other: &Self) -> Result<Self, FluidQueueError> {
        if self.ncols != other.nrows {
            return Err(FluidQueueError::ShapeMismatch {
                what: "sparse product inner dimension",
                expected: self.ncols,
                got: other.nrows,
            });
        }

        let mut col_ptr = vec![0usize; other.ncols + 1];
        let mut row_idx = Vec::new();
        let mut values = Vec::new();

        let mut acc = vec![0.0; self.nrows];
        let mut in_col = vec![false; self.nrows];
        let mut touched: Vec<usize> = Vec::new();

        for j in 0..other.ncols {
            let (rb, vb) = other.col(j);
            for (&k, &bkj) in rb.iter().zip(vb) {
                let (ra, va) = self.col(k);
                for (&r, &aik) in ra.iter().zip(va) {
                    if !in_col[r] {
                        in_col[r] = true;
                        touched.push(r);
                    }
                    acc[r] += aik * bkj;
                }
            }
            touched.sort_unstable();
            for &r in &touched {
                row_idx.push(r);
                values.push(acc[r]);
                acc[r] = 0.0;
                in_col[r] = false;
            }
            touched.clear();
            col_ptr[j + 1] = values.len();
        }

        Ok(Self {
            nrows: self.nrows,
            ncols: other.ncols,
            col_ptr,
            row_idx,
            values,
        })
    }

    /// Scalar multiple.
    pub fn scale(&self, alpha: f64) -> Self {
        let mut out = self.clone();
        for v in &mut out.values {
            *v *= alpha;
        }
        out
    }

    /// Dense copy.
    pub fn to_dense(&self) -> Mat<f64> {
        let mut dense = Mat::zeros(self.nrows, self.ncols);
        for j in 0..self.ncols {
            let (rows, vals) = self.col(j);
            for (&r, &v) in rows.iter().zip(vals) {
                dense[(r, j)] = v;
            }
        }
        dense
    }
}
