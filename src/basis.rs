//! Local cell basis: Legendre polynomials and the Gauss-Lobatto-Legendre
//! (GLL) nodes, weights and differentiation matrix.
//!
//! The DG block recipes are built from a nodal Lagrange basis collocated at
//! the GLL points of the reference cell [-1, 1]. GLL collocation keeps the
//! mass matrix diagonal (M = diag(w)), so every recipe reduces to the
//! differentiation matrix plus rank-one edge terms.

use faer::Mat;
use std::f64::consts::PI;

/// Evaluate Legendre polynomial P_n(x) by the three-term recurrence
/// (n+1) P_{n+1} = (2n+1) x P_n - n P_{n-1}.
pub fn legendre(n: usize, x: f64) -> f64 {
    legendre_pair(n, x).0
}

/// Evaluate (P_n(x), P'_n(x)) in one recurrence pass.
///
/// The derivative uses P'_n = n (x P_n - P_{n-1}) / (x² - 1) away from the
/// endpoints and the exact endpoint values P'_n(±1) = (±1)^{n+1} n(n+1)/2.
pub fn legendre_pair(n: usize, x: f64) -> (f64, f64) {
    if n == 0 {
        return (1.0, 0.0);
    }
    if n == 1 {
        return (x, 1.0);
    }

    let mut p_prev = 1.0;
    let mut p_curr = x;
    for k in 1..n {
        let p_next = ((2 * k + 1) as f64 * x * p_curr - k as f64 * p_prev) / (k + 1) as f64;
        p_prev = p_curr;
        p_curr = p_next;
    }

    let dp = if (x - 1.0).abs() < 1e-14 {
        (n * (n + 1)) as f64 / 2.0
    } else if (x + 1.0).abs() < 1e-14 {
        let sign = if n % 2 == 0 { -1.0 } else { 1.0 };
        sign * (n * (n + 1)) as f64 / 2.0
    } else {
        n as f64 * (x * p_curr - p_prev) / (x * x - 1.0)
    };

    (p_curr, dp)
}

/// GLL nodes for polynomial order `order`: the `order + 1` roots of
/// (1 - x²) P'_N(x) in [-1, 1], endpoints included.
///
/// Interior roots are found by Newton iteration from Chebyshev-Lobatto
/// initial guesses; the update simplifies to
/// x ← x + (1 - x²) P'_N / (N(N+1) P_N).
pub fn gll_nodes(order: usize) -> Vec<f64> {
    let n = order;
    if n == 0 {
        return vec![0.0];
    }

    let mut nodes: Vec<f64> = (0..=n).map(|j| -(PI * j as f64 / n as f64).cos()).collect();
    nodes[0] = -1.0;
    nodes[n] = 1.0;

    for node in nodes.iter_mut().take(n).skip(1) {
        let mut x = *node;
        for _ in 0..100 {
            let (p, dp) = legendre_pair(n, x);
            let update = (1.0 - x * x) * dp / ((n * (n + 1)) as f64 * p);
            x += update;
            if update.abs() < 1e-15 {
                break;
            }
        }
        *node = x;
    }

    nodes
}

/// GLL quadrature weights w_j = 2 / (N(N+1) P_N(x_j)²).
pub fn gll_weights(order: usize, nodes: &[f64]) -> Vec<f64> {
    if order == 0 {
        return vec![2.0];
    }
    let denom = (order * (order + 1)) as f64;
    nodes
        .iter()
        .map(|&x| {
            let p = legendre(order, x);
            2.0 / (denom * p * p)
        })
        .collect()
}

/// Differentiation matrix of the Lagrange basis on the GLL nodes:
/// D[i, j] = l'_j(x_i), so (du/dr)_i = Σ_j D[i, j] u_j.
///
/// Closed form for GLL points:
/// D[i, j] = P_N(x_i) / (P_N(x_j) (x_i - x_j)) for i ≠ j,
/// D[0, 0] = -N(N+1)/4, D[N, N] = N(N+1)/4, other diagonals zero.
pub fn gll_differentiation(order: usize, nodes: &[f64]) -> Mat<f64> {
    let n = order + 1;
    let mut d = Mat::zeros(n, n);
    if order == 0 {
        return d;
    }

    let p_at: Vec<f64> = nodes.iter().map(|&x| legendre(order, x)).collect();
    let corner = (order * (order + 1)) as f64 / 4.0;

    for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }
            d[(i, j)] = p_at[i] / (p_at[j] * (nodes[i] - nodes[j]));
        }
    }
    d[(0, 0)] = -corner;
    d[(order, order)] = corner;

    d
}
