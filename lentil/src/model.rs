//! Beta-Bernoulli co-occurrence scores.
//!
//! A module is summarized by its size `s` and, per sample `j`, the number
//! of member genes `c_j` with a one in that sample. The log-affinity of a
//! binary gene vector `x` to the module is
//!
//! ```text
//! r_j = (c_j + α/2) / (s + α)
//! score(x) = Σ_{x_j=1} ln r_j + Σ_{x_j=0} ln (1 - r_j) + ln(s + β_K)
//! ```
//!
//! with closed forms for singleton modules and a fixed baseline `p0` for
//! empty modules.

use crate::sampler_state::SamplerState;
use ndarray::{Array1, ArrayView1, ArrayView2};

/// Hyperparameters and the constants derived from them.
#[derive(Debug, Clone, PartialEq)]
pub struct BetaBernoulli {
    /// prior strength of the per-sample Beta(α/2, α/2)
    pub alpha: f64,
    /// prior on the number of modules
    pub beta_k: f64,
    /// number of samples `N`
    pub n_samples: usize,
    /// baseline score of an empty module: `N ln(0.5) + ln(β_K)`
    pub p0: f64,
    /// `ln((α/2 + 1) / α)`
    pub match_score: f64,
    /// `ln((α/2) / α)`
    pub mismatch_score: f64,
    /// `ln(1 + β_K)`
    pub bk_1: f64,
}

impl BetaBernoulli {
    pub fn new(alpha: f64, beta_k: f64, n_samples: usize) -> anyhow::Result<Self> {
        anyhow::ensure!(alpha > 0.0, "alpha must be positive: {}", alpha);
        anyhow::ensure!(beta_k > 0.0, "beta_k must be positive: {}", beta_k);

        Ok(Self {
            alpha,
            beta_k,
            n_samples,
            p0: n_samples as f64 * 0.5_f64.ln() + beta_k.ln(),
            match_score: ((alpha * 0.5 + 1.0) / alpha).ln(),
            mismatch_score: (alpha * 0.5 / alpha).ln(),
            bk_1: (1.0 + beta_k).ln(),
        })
    }

    /// Closed form for a module with exactly one member.
    ///
    /// * `n_matches` - number of samples where both the member and the
    ///   candidate gene have a one
    #[inline]
    pub fn singleton_score(&self, n_matches: f64) -> f64 {
        n_matches * self.match_score
            + (self.n_samples as f64 - n_matches) * self.mismatch_score
            + self.bk_1
    }

    /// Per-sample `(ln r, ln(1 - r))` for a module with `size >= 2`
    fn log_one_ratios(&self, one_counts: ArrayView1<f64>, size: f64) -> (Array1<f64>, Array1<f64>) {
        let denom = size + self.alpha;
        let half = self.alpha * 0.5;
        let log_one = one_counts.mapv(|c| ((c + half) / denom).ln());
        let log_zero = one_counts.mapv(|c| ((size - c + half) / denom).ln());
        (log_one, log_zero)
    }

    /// General score of one gene against a module with `size >= 2`
    pub fn general_score(
        &self,
        one_counts: ArrayView1<f64>,
        size: f64,
        gene: ArrayView1<f64>,
    ) -> f64 {
        let (log_one, log_zero) = self.log_one_ratios(one_counts, size);

        let matching: f64 = gene
            .iter()
            .zip(log_one.iter().zip(log_zero.iter()))
            .map(|(&x, (&l1, &l0))| if x > 0.0 { l1 } else { l0 })
            .sum();

        matching + (size + self.beta_k).ln()
    }

    /// General score of every gene (rows of `genes`) against a module
    /// with `size >= 2`, via two matrix-vector products folded into one:
    /// `X ln r + (1 - X) ln(1 - r) = X (ln r - ln(1 - r)) + Σ ln(1 - r)`
    pub fn general_column(
        &self,
        one_counts: ArrayView1<f64>,
        size: f64,
        genes: ArrayView2<f64>,
    ) -> Array1<f64> {
        let (log_one, log_zero) = self.log_one_ratios(one_counts, size);
        let offset = log_zero.sum() + (size + self.beta_k).ln();
        let log_odds = &log_one - &log_zero;
        genes.dot(&log_odds) + offset
    }

    /// Score of `gene` against a module summarized by `(one_counts, size)`
    /// with `size >= 1`
    fn score(&self, one_counts: ArrayView1<f64>, size: usize, gene: ArrayView1<f64>) -> f64 {
        debug_assert!(size >= 1);
        if size == 1 {
            self.singleton_score(one_counts.dot(&gene))
        } else {
            self.general_score(one_counts, size as f64, gene)
        }
    }
}

/// Log-affinity of `gene` joining `module` under the current aggregates.
///
/// If the gene is currently a member of the module, it is taken out
/// first; a module that would become empty scores the baseline `p0`.
pub fn affinity(state: &SamplerState, gene: usize, module: usize) -> f64 {
    let model = &state.model;
    let size = state.module_sizes[module];
    if size == 0 {
        return model.p0;
    }

    let x = state.gene_samples.row(gene);
    let counts = state.one_counts.row(module);

    if state.membership[gene] == module {
        if size == 1 {
            return model.p0;
        }
        let reduced = &counts - &x;
        return model.score(reduced.view(), size - 1, x);
    }

    model.score(counts, size, x)
}

/// Log-affinity of every gene to `module`.
///
/// The batched form does not take genes out of their own module; only
/// the diagonal entry `(module, module)` goes through [`affinity`].
pub fn affinity_column(state: &SamplerState, module: usize) -> Array1<f64> {
    let model = &state.model;
    let size = state.module_sizes[module];
    let genes = state.gene_samples.view();

    let mut column = match size {
        0 => Array1::from_elem(state.n_genes(), model.p0),
        1 => {
            let n_matches = genes.dot(&state.one_counts.row(module));
            n_matches.mapv(|m| model.singleton_score(m))
        }
        _ => model.general_column(state.one_counts.row(module), size as f64, genes),
    };

    column[module] = affinity(state, module, module);
    column
}
