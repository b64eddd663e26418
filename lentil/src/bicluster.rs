//! Turn gene modules into biclusters.
//!
//! Within the expression of a module's genes, samples are split in two
//! by k-means. The higher (UP) or lower (DOWN) group becomes the
//! bicluster's sample set if both groups are large enough and the
//! genes' average signal-to-noise ratio is high enough.

use crate::sampler_state::modules_of;
use clap::ValueEnum;
use log::info;
use matrix_util::clustering::{Kmeans, KmeansArgs};
use matrix_util::ndarray_stat::RowPowerSums;
use matrix_util::traits::PowerSumOps;
use ndarray::{ArrayView2, Axis};
use rayon::prelude::*;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[clap(rename_all = "lowercase")]
pub enum Direction {
    /// samples with higher expression
    #[default]
    Up,
    /// samples with lower expression
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "UP"),
            Direction::Down => write!(f, "DOWN"),
        }
    }
}

impl FromStr for Direction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "UP" => Ok(Direction::Up),
            "DOWN" => Ok(Direction::Down),
            _ => Err(anyhow::anyhow!("unknown direction: {}", s)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BiclusterOptions {
    /// Minimum average SNR. Default: 0.5
    pub min_snr: f64,
    /// Minimum size of both sample groups. Default: 10
    pub min_n_samples: usize,
    /// Which sample group to report. Default: UP
    pub direction: Direction,
    /// Seed of the k-means sample split
    pub seed: u64,
}

impl Default for BiclusterOptions {
    fn default() -> Self {
        BiclusterOptions {
            min_snr: 0.5,
            min_n_samples: 10,
            direction: Direction::Up,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bicluster {
    pub id: usize,
    pub avg_snr: f64,
    pub direction: Direction,
    pub genes: Vec<usize>,
    pub samples: Vec<usize>,
}

impl Bicluster {
    pub fn n_genes(&self) -> usize {
        self.genes.len()
    }

    pub fn n_samples(&self) -> usize {
        self.samples.len()
    }
}

/// Why modules did or did not become biclusters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BiclusterSummary {
    pub n_empty: usize,
    pub n_single_gene: usize,
    pub n_wrong_sample_size: usize,
    pub n_low_snr: usize,
    pub n_passed: usize,
}

/// Average over `genes` of `|fg_mean - bg_mean| / (fg_std + bg_std)`
/// where the foreground is `samples` and the background the rest.
///
/// * `totals` - power sums of every row of `exprs` over all samples
pub fn calc_bic_snr(
    exprs: ArrayView2<f64>,
    totals: &RowPowerSums,
    genes: &[usize],
    samples: &[usize],
) -> f64 {
    if genes.is_empty() {
        return 0.0;
    }

    let fg = exprs.select(Axis(0), genes).row_power_sums(samples);
    let bg = &totals.select(genes) - &fg;

    let (fg_mean, fg_std) = fg.mean_std();
    let (bg_mean, bg_std) = bg.mean_std();

    let snr_sum: f64 = (0..genes.len())
        .map(|i| {
            let denom = fg_std[i] + bg_std[i];
            if denom > 0.0 {
                (fg_mean[i] - bg_mean[i]).abs() / denom
            } else {
                0.0
            }
        })
        .sum();

    snr_sum / genes.len() as f64
}

/// Split samples by k-means over the genes' expression and pick the
/// group along `direction`. `None` if either group is smaller than
/// `min_n_samples`.
pub fn identify_opt_sample_set(
    exprs: ArrayView2<f64>,
    totals: &RowPowerSums,
    genes: &[usize],
    options: &BiclusterOptions,
) -> anyhow::Result<Option<(Vec<usize>, f64)>> {
    let sub = exprs.select(Axis(0), genes);
    let labels = sub.kmeans_columns(&KmeansArgs::with_clusters(2).seed(options.seed))?;

    let (ndx1, ndx0): (Vec<usize>, Vec<usize>) = (0..labels.len()).partition(|&j| labels[j] == 1);

    if ndx0.len().min(ndx1.len()) < options.min_n_samples.max(1) {
        return Ok(None);
    }

    let (Some(mean0), Some(mean1)) = (
        sub.select(Axis(1), &ndx0).mean(),
        sub.select(Axis(1), &ndx1).mean(),
    ) else {
        return Ok(None);
    };

    let (hi, lo) = if mean1 > mean0 { (ndx1, ndx0) } else { (ndx0, ndx1) };
    let samples = match options.direction {
        Direction::Up => hi,
        Direction::Down => lo,
    };

    let avg_snr = calc_bic_snr(exprs, totals, genes, &samples);
    Ok(Some((samples, avg_snr)))
}

enum ModuleOutcome {
    WrongSampleSize,
    LowSnr,
    Passed(Bicluster),
}

/// Biclusters of every module with at least two genes.
///
/// * `exprs` - gene x sample expression, rows aligned with `membership`
/// * `membership` - gene -> module
pub fn extract_biclusters(
    exprs: ArrayView2<f64>,
    membership: &[usize],
    options: &BiclusterOptions,
) -> anyhow::Result<(Vec<Bicluster>, BiclusterSummary)> {
    anyhow::ensure!(
        exprs.nrows() == membership.len(),
        "{} expression rows for {} genes",
        exprs.nrows(),
        membership.len()
    );
    anyhow::ensure!(options.min_n_samples >= 1, "min_n_samples must be at least 1");

    let totals = exprs.row_power_sums_all();
    let modules = modules_of(membership);

    let mut summary = BiclusterSummary {
        n_empty: membership.len() - modules.len(),
        ..Default::default()
    };

    let multi: Vec<&(usize, Vec<usize>)> = modules.iter().filter(|(_, g)| g.len() > 1).collect();
    summary.n_single_gene = modules.len() - multi.len();

    let outcomes: Vec<ModuleOutcome> = multi
        .par_iter()
        .map(|(module, genes)| -> anyhow::Result<ModuleOutcome> {
            Ok(match identify_opt_sample_set(exprs, &totals, genes, options)? {
                None => ModuleOutcome::WrongSampleSize,
                Some((_, avg_snr)) if avg_snr < options.min_snr => ModuleOutcome::LowSnr,
                Some((samples, avg_snr)) => ModuleOutcome::Passed(Bicluster {
                    id: *module,
                    avg_snr,
                    direction: options.direction,
                    genes: genes.clone(),
                    samples,
                }),
            })
        })
        .collect::<anyhow::Result<_>>()?;

    let mut biclusters = vec![];
    for outcome in outcomes {
        match outcome {
            ModuleOutcome::WrongSampleSize => summary.n_wrong_sample_size += 1,
            ModuleOutcome::LowSnr => summary.n_low_snr += 1,
            ModuleOutcome::Passed(bic) => {
                summary.n_passed += 1;
                biclusters.push(bic);
            }
        }
    }

    info!(
        "{} biclusters: {} passed, {} empty, {} single-gene, {} wrong sample size, {} low SNR",
        options.direction,
        summary.n_passed,
        summary.n_empty,
        summary.n_single_gene,
        summary.n_wrong_sample_size,
        summary.n_low_snr
    );

    Ok((biclusters, summary))
}

/// Sort by average SNR, number of genes and number of samples, all
/// descending, then renumber from zero
pub fn sort_biclusters(biclusters: &mut [Bicluster]) {
    biclusters.sort_by(|a, b| {
        b.avg_snr
            .total_cmp(&a.avg_snr)
            .then(b.n_genes().cmp(&a.n_genes()))
            .then(b.n_samples().cmp(&a.n_samples()))
    });
    for (i, bic) in biclusters.iter_mut().enumerate() {
        bic.id = i;
    }
}
