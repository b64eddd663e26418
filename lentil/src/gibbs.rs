//! Gibbs sweeps over gene -> module assignments.
//!
//! For each gene in index order, the row of the affinity matrix is turned
//! into a categorical distribution over modules, a module is drawn, and
//! the move (if any) is applied to the aggregates and the two affected
//! columns of the affinity matrix.

use crate::sampler_state::SamplerState;
use ndarray::ArrayView1;
use rand::rngs::SmallRng;
use rand::Rng;

/// Terms more than this many natural-log units below the row maximum
/// are set to zero before normalization.
pub const UNDERFLOW_LOG_ORDERS: f64 = 7.0;

/// Sequential Gibbs sampler over module assignments.
pub struct GibbsSampler<R: Rng = SmallRng> {
    rng: R,
    /// scratch space for the normalized distribution
    probs: Vec<f64>,
}

impl<R: Rng> GibbsSampler<R> {
    /// Create a new Gibbs sampler with the given RNG.
    pub fn new(rng: R) -> Self {
        GibbsSampler {
            rng,
            probs: Vec::new(),
        }
    }

    /// One full sweep over all genes.
    ///
    /// Each gene sees the moves made by earlier genes in the same sweep.
    /// Returns the number of genes that changed module.
    pub fn step(&mut self, state: &mut SamplerState) -> usize {
        let k = state.n_genes();
        let mut n_moves = 0;

        for gene in 0..k {
            adjust_log_probs(
                state.log_probs.row(gene),
                UNDERFLOW_LOG_ORDERS,
                &mut self.probs,
            );

            let curr_module = state.membership[gene];
            let new_module = sample_categorical(&self.probs, &mut self.rng);

            if new_module != curr_module {
                let old_module = state.move_gene(gene, new_module);
                state.refresh_columns_after_move(gene, old_module, new_module);
                n_moves += 1;
            }
        }

        n_moves
    }
}

/// Turn log-probabilities into a normalized distribution.
///
/// Shifts by the maximum, exponentiates, zeroes every term more than
/// `n_exp_orders` below the maximum, and rescales to sum to one. The
/// maximum itself always survives, so the sum is at least one before
/// rescaling.
///
/// * `log_probs` - unnormalized log-probabilities
/// * `n_exp_orders` - cutoff in natural-log units
/// * `probs` - output buffer, resized to `log_probs.len()`
pub fn adjust_log_probs(log_probs: ArrayView1<f64>, n_exp_orders: f64, probs: &mut Vec<f64>) {
    let max = log_probs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    probs.clear();
    probs.extend(log_probs.iter().map(|&lp| {
        let adj = lp - max;
        if adj >= -n_exp_orders {
            adj.exp()
        } else {
            0.0
        }
    }));

    let total: f64 = probs.iter().sum();
    probs.iter_mut().for_each(|p| *p /= total);
}

/// Draw an index from a normalized categorical distribution.
///
/// Zero-probability entries are never returned.
pub fn sample_categorical(probs: &[f64], rng: &mut impl Rng) -> usize {
    let u: f64 = rng.random::<f64>();
    let mut cum = 0.0;
    let mut last_positive = 0;
    for (i, &p) in probs.iter().enumerate() {
        if p > 0.0 {
            cum += p;
            last_positive = i;
            if u < cum {
                return i;
            }
        }
    }
    // rounding left the cumulative sum just below u
    last_positive
}
