//! Time integration of the transient distribution.
//!
//! The coefficient row vector evolves as ȧ = a·B. The integrator consumes
//! the lazy operator directly (materialisation is never needed for
//! stepping) and uses SSP-RK3 in Shu-Osher form:
//!
//! a1    = a + dt · a·B
//! a2    = 3/4 a + 1/4 a1 + 1/4 dt · a1·B
//! a_new = 1/3 a + 2/3 a2 + 2/3 dt · a2·B
//!
//! Because every row of B sums to zero, each stage preserves the total
//! probability mass exactly in exact arithmetic.

use faer::Mat;

use crate::error::FluidQueueError;
use crate::generator::LazyGenerator;
use crate::mesh::Mesh;

fn axpy(y: &mut Mat<f64>, alpha: f64, x: &Mat<f64>) {
    for r in 0..y.nrows() {
        for c in 0..y.ncols() {
            y[(r, c)] += alpha * x[(r, c)];
        }
    }
}

fn scale(y: &mut Mat<f64>, alpha: f64) {
    for r in 0..y.nrows() {
        for c in 0..y.ncols() {
            y[(r, c)] *= alpha;
        }
    }
}

/// One SSP-RK3 step of ȧ = a·B.
///
/// `a` has shape m×M (each row an independent initial distribution).
pub fn ssp_rk3_step(
    a: &Mat<f64>,
    gen: &LazyGenerator<'_>,
    dt: f64,
) -> Result<Mat<f64>, FluidQueueError> {
    // Stage 1: a1 = a + dt * a B
    let l_a = gen.mul_left(a)?;
    let mut a1 = a.clone();
    axpy(&mut a1, dt, &l_a);

    // Stage 2: a2 = 3/4 a + 1/4 a1 + 1/4 dt * a1 B
    let l_a1 = gen.mul_left(&a1)?;
    let mut a2 = a.clone();
    scale(&mut a2, 0.75);
    axpy(&mut a2, 0.25, &a1);
    axpy(&mut a2, 0.25 * dt, &l_a1);

    // Stage 3: a_new = 1/3 a + 2/3 a2 + 2/3 dt * a2 B
    let l_a2 = gen.mul_left(&a2)?;
    let mut a_new = a.clone();
    scale(&mut a_new, 1.0 / 3.0);
    axpy(&mut a_new, 2.0 / 3.0, &a2);
    axpy(&mut a_new, 2.0 / 3.0 * dt, &l_a2);

    Ok(a_new)
}

/// Integrate ȧ = a·B from 0 to `t_final` with fixed step `dt` (the last
/// step is shortened to land on `t_final` exactly).
pub fn run_transient(
    a0: &Mat<f64>,
    gen: &LazyGenerator<'_>,
    t_final: f64,
    dt: f64,
) -> Result<Mat<f64>, FluidQueueError> {
    if dt <= 0.0 || t_final < 0.0 {
        return Err(FluidQueueError::Domain(format!(
            "invalid integration span: t_final {}, dt {}",
            t_final, dt
        )));
    }
    let mut a = a0.clone();
    let mut t = 0.0;
    while t < t_final {
        let step = dt.min(t_final - t);
        a = ssp_rk3_step(&a, gen, step)?;
        t += step;
    }
    Ok(a)
}

/// CFL-limited step size for the discretised generator.
///
/// dt ≤ cfl · Δ_min / (|c|_max · (2p - 1)); the order factor accounts for
/// the spectral growth of the cell blocks with the basis count.
pub fn compute_dt(mesh: &Mesh, rates: &[f64], cfl: f64) -> f64 {
    let c_max = rates.iter().fold(0.0f64, |m, &c| m.max(c.abs()));
    if c_max < 1e-14 {
        return f64::INFINITY;
    }
    let order_factor = (2 * mesh.n_bases() - 1) as f64;
    cfl * mesh.min_width() / (c_max * order_factor)
}
