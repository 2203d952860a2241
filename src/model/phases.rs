//! Phase set of the modulating Markov chain.
//!
//! A fluid queue moves between a finite set of phases according to a
//! continuous-time Markov chain with rate matrix T; in phase i the level
//! drifts at rate c_i. Phases are additionally tagged with boundary
//! memberships: a phase that is a lower (upper) member owns a point mass at
//! the lower (upper) barrier.

use faer::Mat;

use crate::error::FluidQueueError;

const ROW_SUM_TOL: f64 = 1e-10;

/// Phases, drift rates, rate matrix and boundary memberships.
#[derive(Clone)]
pub struct PhaseSet {
    rates: Vec<f64>,
    generator: Mat<f64>,
    lwr_member: Vec<bool>,
    upr_member: Vec<bool>,
}

impl PhaseSet {
    /// Build a phase set with explicit boundary memberships.
    ///
    /// Validates that T is square with zero row sums and non-negative
    /// off-diagonals, and that memberships respect the drift signs: a phase
    /// with negative drift must be a lower member, positive drift an upper
    /// member, zero drift both.
    pub fn new(
        rates: Vec<f64>,
        generator: Mat<f64>,
        lwr_member: Vec<bool>,
        upr_member: Vec<bool>,
    ) -> Result<Self, FluidQueueError> {
        let n = rates.len();
        if n == 0 {
            return Err(FluidQueueError::Domain("empty phase set".to_string()));
        }
        if generator.nrows() != n || generator.ncols() != n {
            return Err(FluidQueueError::ShapeMismatch {
                what: "rate matrix",
                expected: n,
                got: generator.nrows().max(generator.ncols()),
            });
        }
        if lwr_member.len() != n {
            return Err(FluidQueueError::ShapeMismatch {
                what: "lower membership vector",
                expected: n,
                got: lwr_member.len(),
            });
        }
        if upr_member.len() != n {
            return Err(FluidQueueError::ShapeMismatch {
                what: "upper membership vector",
                expected: n,
                got: upr_member.len(),
            });
        }

        for i in 0..n {
            let mut row_sum = 0.0;
            for j in 0..n {
                let tij = generator[(i, j)];
                if i != j && tij < 0.0 {
                    return Err(FluidQueueError::Domain(format!(
                        "negative off-diagonal rate T[{},{}] = {}",
                        i, j, tij
                    )));
                }
                row_sum += tij;
            }
            if row_sum.abs() > ROW_SUM_TOL {
                return Err(FluidQueueError::Domain(format!(
                    "row {} of the rate matrix sums to {}",
                    i, row_sum
                )));
            }
        }

        for i in 0..n {
            if rates[i] < 0.0 && !lwr_member[i] {
                return Err(FluidQueueError::Domain(format!(
                    "phase {} drifts down but is not a lower-boundary member",
                    i
                )));
            }
            if rates[i] > 0.0 && !upr_member[i] {
                return Err(FluidQueueError::Domain(format!(
                    "phase {} drifts up but is not an upper-boundary member",
                    i
                )));
            }
            if rates[i] == 0.0 && !(lwr_member[i] && upr_member[i]) {
                return Err(FluidQueueError::Domain(format!(
                    "zero-drift phase {} must belong to both boundaries",
                    i
                )));
            }
        }

        Ok(Self {
            rates,
            generator,
            lwr_member,
            upr_member,
        })
    }

    /// Build a phase set with the default memberships implied by the drift
    /// signs: lower for c ≤ 0, upper for c ≥ 0.
    pub fn with_default_membership(
        rates: Vec<f64>,
        generator: Mat<f64>,
    ) -> Result<Self, FluidQueueError> {
        let lwr = rates.iter().map(|&c| c <= 0.0).collect();
        let upr = rates.iter().map(|&c| c >= 0.0).collect();
        Self::new(rates, generator, lwr, upr)
    }

    /// Number of phases.
    pub fn n_phases(&self) -> usize {
        self.rates.len()
    }

    /// Drift rate of phase i.
    pub fn rate(&self, i: usize) -> f64 {
        self.rates[i]
    }

    /// The rate matrix T.
    pub fn generator(&self) -> &Mat<f64> {
        &self.generator
    }

    /// Whether phase i owns a point mass at the lower barrier.
    pub fn is_lwr_member(&self, i: usize) -> bool {
        self.lwr_member[i]
    }

    /// Whether phase i owns a point mass at the upper barrier.
    pub fn is_upr_member(&self, i: usize) -> bool {
        self.upr_member[i]
    }

    /// Number of lower-boundary point masses.
    pub fn n_lwr(&self) -> usize {
        self.lwr_member.iter().filter(|&&m| m).count()
    }

    /// Number of upper-boundary point masses.
    pub fn n_upr(&self) -> usize {
        self.upr_member.iter().filter(|&&m| m).count()
    }

    /// Cell orientation of phase i: down-oriented iff the drift is negative.
    ///
    /// Cross-phase coupling between phases of differing orientation passes
    /// through the membership-change matrix under the FRAP scheme.
    pub fn drifts_down(&self, i: usize) -> bool {
        self.rates[i] < 0.0
    }

    /// Rank of phase i among the lower members (members with smaller index).
    pub fn lwr_rank(&self, i: usize) -> usize {
        self.lwr_member[..i].iter().filter(|&&m| m).count()
    }

    /// Rank of phase i among the upper members.
    pub fn upr_rank(&self, i: usize) -> usize {
        self.upr_member[..i].iter().filter(|&&m| m).count()
    }
}
