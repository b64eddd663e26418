//! Module discovery: Gibbs steps until the transition tables settle,
//! then a consensus over the trailing window.

use crate::consensus::{build_consensus, ConsensusNote};
use crate::convergence::ConvergenceMonitor;
use crate::gibbs::GibbsSampler;
use crate::history::AssignmentHistory;
use crate::sampler_state::SamplerState;
use indicatif::{ProgressBar, ProgressDrawTarget};
use log::{debug, info, warn};
use ndarray::{Array2, ArrayView2};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

/// Options for module sampling.
#[derive(Debug, Clone)]
pub struct ModuleSamplerOptions {
    /// Beta prior strength. Default: 1.0
    pub alpha: f64,
    /// Prior on the number of modules. Default: 1.0
    pub beta_k: f64,
    /// Maximum number of Gibbs steps. Default: 100
    pub max_n_steps: usize,
    /// Snapshots per transition window. Default: 20
    pub n_steps_averaged: usize,
    /// Windows in the trend line. Default: 10
    pub n_points_fit: usize,
    /// Maximum absolute slope of a flat trend. Default: 0.05
    pub tol: f64,
    /// Consecutive flat steps before stopping. Default: 5
    pub n_steps_for_convergence: usize,
    /// Random seed. Default: 42
    pub seed: u64,
    /// Keep every snapshot instead of the trailing few. Default: false
    pub keep_trajectory: bool,
}

impl Default for ModuleSamplerOptions {
    fn default() -> Self {
        ModuleSamplerOptions {
            alpha: 1.0,
            beta_k: 1.0,
            max_n_steps: 100,
            n_steps_averaged: 20,
            n_points_fit: 10,
            tol: 0.05,
            n_steps_for_convergence: 5,
            seed: 42,
            keep_trajectory: false,
        }
    }
}

impl ModuleSamplerOptions {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.alpha > 0.0, "alpha must be positive: {}", self.alpha);
        anyhow::ensure!(self.beta_k > 0.0, "beta_k must be positive: {}", self.beta_k);
        anyhow::ensure!(
            self.n_points_fit >= 2,
            "n_points_fit must be at least 2: {}",
            self.n_points_fit
        );
        anyhow::ensure!(
            self.n_steps_averaged >= 2,
            "n_steps_averaged must be at least 2: {}",
            self.n_steps_averaged
        );
        anyhow::ensure!(
            self.n_steps_for_convergence > 0,
            "n_steps_for_convergence must be positive"
        );
        anyhow::ensure!(self.max_n_steps > 0, "max_n_steps must be positive");
        Ok(())
    }

    /// Number of trailing snapshots in the consensus vote
    pub fn consensus_window(&self) -> usize {
        self.n_points_fit + self.n_steps_for_convergence
    }

    /// Snapshots to retain for the monitor and the consensus
    pub fn history_capacity(&self) -> usize {
        (self.n_steps_averaged + 1).max(self.consensus_window())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConvergenceDiagnostics {
    /// skipping genes, one per window
    pub n_skipping_genes: Vec<usize>,
    /// RMS between consecutive windows' transition tables
    pub rms: Vec<f64>,
    /// trend slopes, one per evaluated step
    pub slopes: Vec<f64>,
    /// the step sampling stopped at
    pub final_step: usize,
    /// first and last snapshot index of the consensus vote
    pub consensus_window: (usize, usize),
    pub converged: bool,
    /// genes moved by the consensus
    pub n_changed: usize,
    /// genes without a strict majority
    pub notes: Vec<ConsensusNote>,
}

#[derive(Debug, Clone)]
pub struct ModuleFit {
    /// gene -> module after consensus
    pub membership: Vec<usize>,
    pub module_sizes: Vec<usize>,
    /// K x N ones per sample of each module
    pub one_counts: Array2<f64>,
    pub diagnostics: ConvergenceDiagnostics,
    /// every snapshot from the initial state, if requested
    pub trajectory: Option<Vec<Vec<usize>>>,
}

impl ModuleFit {
    /// Genes of every non-empty module, in module order
    pub fn modules(&self) -> Vec<(usize, Vec<usize>)> {
        crate::sampler_state::modules_of(&self.membership)
    }
}

pub struct ModuleSampler {
    options: ModuleSamplerOptions,
    show_progress: bool,
}

impl ModuleSampler {
    pub fn new(options: ModuleSamplerOptions) -> anyhow::Result<Self> {
        options.validate()?;
        Ok(ModuleSampler {
            options,
            show_progress: false,
        })
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn options(&self) -> &ModuleSamplerOptions {
        &self.options
    }

    /// Sample modules of a K x N binary matrix with the seeded RNG
    pub fn fit(&self, gene_samples: ArrayView2<f64>) -> anyhow::Result<ModuleFit> {
        let rng = SmallRng::seed_from_u64(self.options.seed);
        self.fit_with_rng(gene_samples, rng)
    }

    /// Sample modules of a K x N binary matrix with the given RNG
    pub fn fit_with_rng<R: Rng>(
        &self,
        gene_samples: ArrayView2<f64>,
        rng: R,
    ) -> anyhow::Result<ModuleFit> {
        let opts = &self.options;

        let mut state = SamplerState::new(gene_samples, opts.alpha, opts.beta_k)?;

        let mut history = if opts.keep_trajectory {
            AssignmentHistory::unbounded()
        } else {
            AssignmentHistory::bounded(opts.history_capacity())
        };
        history.push(state.membership.clone());

        let mut monitor = ConvergenceMonitor::new(
            opts.n_steps_averaged,
            opts.n_points_fit,
            opts.tol,
            opts.n_steps_for_convergence,
        );
        let mut gibbs = GibbsSampler::new(rng);

        info!(
            "Module sampling: K={}, N={}, max steps={}, W={}",
            state.n_genes(),
            state.n_samples(),
            opts.max_n_steps,
            opts.n_steps_averaged
        );

        let pb = ProgressBar::new(opts.max_n_steps as u64);
        if !self.show_progress {
            pb.set_draw_target(ProgressDrawTarget::hidden());
        }

        let mut final_step = 0;
        let mut converged = false;

        for step in 1..=opts.max_n_steps {
            let n_moves = gibbs.step(&mut state);
            history.push(state.membership.clone());
            debug!("step {}: {} moves", step, n_moves);

            monitor.observe(step, &history)?;
            pb.inc(1);
            final_step = step;

            if monitor.is_converged() {
                converged = true;
                break;
            }
        }
        pb.finish_and_clear();

        if converged {
            info!("Converged at step {}", final_step);
        } else {
            warn!(
                "Did not converge within {} steps; taking the consensus anyway",
                opts.max_n_steps
            );
        }

        let window_len = opts.consensus_window().min(history.retained_len());
        let window_last = history.total_len() - 1;
        let window_first = history.total_len() - window_len;

        let consensus = {
            let window = history.latest(window_len);
            build_consensus(&mut state, &window)?
        };

        info!(
            "Consensus over snapshots {}..={}: {} genes changed, {} without a strict majority",
            window_first,
            window_last,
            consensus.n_changed,
            consensus.notes.len()
        );

        let diagnostics = ConvergenceDiagnostics {
            n_skipping_genes: monitor.n_skipping_genes().to_vec(),
            rms: monitor.rms().to_vec(),
            slopes: monitor.slopes().to_vec(),
            final_step,
            consensus_window: (window_first, window_last),
            converged,
            n_changed: consensus.n_changed,
            notes: consensus.notes,
        };

        let trajectory = if opts.keep_trajectory {
            Some(history.into_snapshots())
        } else {
            None
        };

        Ok(ModuleFit {
            membership: consensus.membership,
            module_sizes: state.module_sizes,
            one_counts: state.one_counts,
            diagnostics,
            trajectory,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_are_valid() -> anyhow::Result<()> {
        let opts = ModuleSamplerOptions::default();
        opts.validate()?;
        assert_eq!(opts.consensus_window(), 15);
        assert_eq!(opts.history_capacity(), 21);
        Ok(())
    }

    #[test]
    fn invalid_options_are_rejected() {
        let bad = [
            ModuleSamplerOptions {
                alpha: 0.0,
                ..Default::default()
            },
            ModuleSamplerOptions {
                beta_k: -1.0,
                ..Default::default()
            },
            ModuleSamplerOptions {
                n_points_fit: 1,
                ..Default::default()
            },
            ModuleSamplerOptions {
                n_steps_averaged: 1,
                ..Default::default()
            },
            ModuleSamplerOptions {
                n_steps_for_convergence: 0,
                ..Default::default()
            },
            ModuleSamplerOptions {
                max_n_steps: 0,
                ..Default::default()
            },
        ];
        for opts in bad {
            assert!(ModuleSampler::new(opts).is_err());
        }
    }
}
