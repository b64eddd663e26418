//! The single owned state of the module sampler.
//!
//! Tracks, for K genes and N samples,
//! - the gene-by-sample binary indicators (immutable),
//! - gene -> module membership,
//! - per-module sizes, ones per sample, and frequencies of ones,
//! - the K x K log-affinity matrix `log_probs[g, m]`.
//!
//! Modules share the gene index space: initially gene `g` sits alone
//! in module `g`. Emptied modules keep their index.

use crate::model::{affinity, affinity_column, BetaBernoulli};
use log::info;
use ndarray::{Array2, ArrayView2, Axis};
use rayon::prelude::*;

#[derive(Debug, Clone)]
pub struct SamplerState {
    /// Beta-Bernoulli constants
    pub model: BetaBernoulli,
    /// K x N binary indicators stored as 0.0/1.0
    pub gene_samples: Array2<f64>,
    /// gene -> module
    pub membership: Vec<usize>,
    /// number of genes in each module
    pub module_sizes: Vec<usize>,
    /// K x N: ones per sample summed over the member genes
    pub one_counts: Array2<f64>,
    /// fraction of ones in each module's block, 0 when empty
    pub one_freqs: Vec<f64>,
    /// K x K: log-affinity of gene `g` to module `m`
    pub log_probs: Array2<f64>,
}

impl SamplerState {
    /// Build the initial state: one gene per module and the full
    /// affinity matrix.
    ///
    /// * `gene_samples` - K x N matrix of zeros and ones
    /// * `alpha` - Beta prior strength
    /// * `beta_k` - prior on the number of modules
    pub fn new(gene_samples: ArrayView2<f64>, alpha: f64, beta_k: f64) -> anyhow::Result<Self> {
        let (k, n) = gene_samples.dim();
        anyhow::ensure!(k > 0 && n > 0, "empty input matrix: {} x {}", k, n);
        anyhow::ensure!(
            gene_samples.iter().all(|&x| x == 0.0 || x == 1.0),
            "the input matrix must be binary (0/1)"
        );

        let model = BetaBernoulli::new(alpha, beta_k, n)?;

        info!(
            "Initial state: K x N = {} x {}, p0 = {:.4}, match = {:.4}, mismatch = {:.4}",
            k, n, model.p0, model.match_score, model.mismatch_score
        );

        let one_freqs = gene_samples
            .sum_axis(Axis(1))
            .iter()
            .map(|&s| s / n as f64)
            .collect();

        let mut state = SamplerState {
            model,
            gene_samples: gene_samples.to_owned(),
            membership: (0..k).collect(),
            module_sizes: vec![1; k],
            one_counts: gene_samples.to_owned(),
            one_freqs,
            log_probs: Array2::zeros((0, 0)),
        };

        // the initial matrix is symmetric: fill the upper triangle in
        // parallel, then mirror it in place
        let mut log_probs = Array2::<f64>::zeros((k, k));
        log_probs
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(i, mut row)| {
                for j in i..k {
                    row[j] = affinity(&state, i, j);
                }
            });

        for i in 1..k {
            for j in 0..i {
                log_probs[[i, j]] = log_probs[[j, i]];
            }
        }

        state.log_probs = log_probs;
        Ok(state)
    }

    pub fn n_genes(&self) -> usize {
        self.gene_samples.nrows()
    }

    pub fn n_samples(&self) -> usize {
        self.gene_samples.ncols()
    }

    /// Move `gene` from its current module to `new_module`, updating
    /// membership and the module aggregates. The affinity matrix is
    /// left untouched.
    ///
    /// Returns the previous module.
    pub fn move_gene(&mut self, gene: usize, new_module: usize) -> usize {
        let old_module = self.membership[gene];
        if old_module == new_module {
            return old_module;
        }
        debug_assert!(self.module_sizes[old_module] > 0);

        self.membership[gene] = new_module;

        let x = self.gene_samples.row(gene);
        {
            let mut old_counts = self.one_counts.row_mut(old_module);
            old_counts -= &x;
        }
        {
            let mut new_counts = self.one_counts.row_mut(new_module);
            new_counts += &x;
        }
        self.module_sizes[old_module] -= 1;
        self.module_sizes[new_module] += 1;

        self.update_one_freq(old_module);
        self.update_one_freq(new_module);

        old_module
    }

    fn update_one_freq(&mut self, module: usize) {
        let size = self.module_sizes[module];
        self.one_freqs[module] = if size == 0 {
            0.0
        } else {
            self.one_counts.row(module).sum() / (size * self.n_samples()) as f64
        };
    }

    /// After `gene` moved from `old_module` to `new_module`, recompute
    /// both affected columns of the affinity matrix.
    ///
    /// The moved gene's own two entries keep their pre-move values; they
    /// are refreshed on its next turn. Recomputing them eagerly would
    /// change the sampled trajectories.
    pub fn refresh_columns_after_move(&mut self, gene: usize, old_module: usize, new_module: usize) {
        for module in [old_module, new_module] {
            let kept = self.log_probs[[gene, module]];
            let column = affinity_column(self, module);
            self.log_probs.column_mut(module).assign(&column);
            self.log_probs[[gene, module]] = kept;
        }
    }

    /// Check that module sizes and ones-per-sample agree with the
    /// current membership.
    pub fn verify_aggregates(&self) -> anyhow::Result<()> {
        let (k, n) = self.gene_samples.dim();

        let total: usize = self.module_sizes.iter().sum();
        anyhow::ensure!(total == k, "module sizes sum to {} != {}", total, k);

        let mut sizes = vec![0usize; k];
        let mut counts = Array2::<f64>::zeros((k, n));
        for (g, &m) in self.membership.iter().enumerate() {
            sizes[m] += 1;
            let mut row = counts.row_mut(m);
            row += &self.gene_samples.row(g);
        }

        anyhow::ensure!(sizes == self.module_sizes, "module sizes out of sync");
        anyhow::ensure!(counts == self.one_counts, "ones per sample out of sync");
        Ok(())
    }

    /// Genes of every non-empty module, in module order
    pub fn modules(&self) -> Vec<(usize, Vec<usize>)> {
        modules_of(&self.membership)
    }
}

/// Group genes by module, skipping empty modules
pub fn modules_of(membership: &[usize]) -> Vec<(usize, Vec<usize>)> {
    let k = membership.iter().max().map(|&m| m + 1).unwrap_or(0);
    let mut genes = vec![Vec::new(); k];
    for (g, &m) in membership.iter().enumerate() {
        genes[m].push(g);
    }
    genes
        .into_iter()
        .enumerate()
        .filter(|(_, gg)| !gg.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn toy() -> Array2<f64> {
        array![
            [1.0, 1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 1.0],
            [1.0, 0.0, 1.0, 0.0]
        ]
    }

    #[test]
    fn initial_state_is_one_gene_per_module() -> anyhow::Result<()> {
        let xx = toy();
        let state = SamplerState::new(xx.view(), 1.0, 1.0)?;

        assert_eq!(state.membership, vec![0, 1, 2, 3]);
        assert_eq!(state.module_sizes, vec![1; 4]);
        assert_eq!(state.one_counts, xx);
        assert_abs_diff_eq!(state.one_freqs[0], 0.5);
        state.verify_aggregates()?;

        // symmetric with the baseline on the diagonal
        for i in 0..4 {
            assert_abs_diff_eq!(state.log_probs[[i, i]], state.model.p0);
            for j in 0..4 {
                assert_abs_diff_eq!(state.log_probs[[i, j]], state.log_probs[[j, i]]);
            }
        }

        // genes 0 and 1 match on two samples
        let expected = state.model.singleton_score(2.0);
        assert_abs_diff_eq!(state.log_probs[[0, 1]], expected, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn initial_matrix_matches_every_pair() -> anyhow::Result<()> {
        let xx = Array2::from_shape_fn((40, 9), |(g, j)| ((g * 5 + j * 3) % 7 < 3) as u8 as f64);
        let state = SamplerState::new(xx.view(), 0.5, 2.0)?;

        assert_eq!(state.log_probs.dim(), (40, 40));
        for g in 0..40 {
            for m in 0..40 {
                assert_abs_diff_eq!(state.log_probs[[g, m]], affinity(&state, g, m), epsilon = 1e-12);
            }
        }
        Ok(())
    }

    #[test]
    fn rejects_non_binary_input() {
        let xx = array![[1.0, 0.5], [0.0, 1.0]];
        assert!(SamplerState::new(xx.view(), 1.0, 1.0).is_err());
        let empty = Array2::<f64>::zeros((0, 3));
        assert!(SamplerState::new(empty.view(), 1.0, 1.0).is_err());
    }

    #[test]
    fn moving_genes_keeps_aggregates_in_sync() -> anyhow::Result<()> {
        let mut state = SamplerState::new(toy().view(), 1.0, 1.0)?;

        assert_eq!(state.move_gene(1, 0), 1);
        assert_eq!(state.move_gene(3, 2), 3);
        state.verify_aggregates()?;
        assert_eq!(state.module_sizes, vec![2, 0, 2, 0]);
        assert_eq!(state.one_counts.row(0), array![2.0, 2.0, 0.0, 0.0]);
        assert_abs_diff_eq!(state.one_freqs[0], 0.5);
        assert_abs_diff_eq!(state.one_freqs[1], 0.0);

        // moving back and forth restores the aggregates
        state.move_gene(3, 0);
        state.move_gene(3, 3);
        state.verify_aggregates()?;
        assert_eq!(state.module_sizes, vec![2, 0, 1, 1]);

        assert_eq!(
            state.modules(),
            vec![(0, vec![0, 1]), (2, vec![2]), (3, vec![3])]
        );
        Ok(())
    }

    #[test]
    fn refresh_keeps_the_moved_gene_entries() -> anyhow::Result<()> {
        let mut state = SamplerState::new(toy().view(), 1.0, 1.0)?;
        let before = state.log_probs.clone();

        let old = state.move_gene(1, 0);
        state.refresh_columns_after_move(1, old, 0);

        assert_abs_diff_eq!(state.log_probs[[1, 0]], before[[1, 0]]);
        assert_abs_diff_eq!(state.log_probs[[1, 1]], before[[1, 1]]);

        // everyone else sees the new aggregates
        for g in [0, 2, 3] {
            assert_abs_diff_eq!(
                state.log_probs[[g, 0]],
                affinity(&state, g, 0),
                epsilon = 1e-10
            );
            assert_abs_diff_eq!(state.log_probs[[g, 1]], state.model.p0, epsilon = 1e-12);
        }
        Ok(())
    }
}
