//! Binarize expression rows into up- and down-regulated sample sets.
//!
//! Each row is split by a two-component 1-D Gaussian mixture. The
//! smaller component (and, when the split is not clear-cut, the larger
//! one as well) becomes a signal candidate, which is kept if its
//! signal-to-noise ratio against the remaining samples is large enough.

use log::{debug, info};
use matrix_util::clustering::{mixture_labels_1d, MixtureArgs};
use matrix_util::ndarray_io::NamedMatrix;
use ndarray::{Array2, Axis};
use rayon::prelude::*;

#[derive(Debug, Clone)]
pub struct BinarizeOptions {
    /// Minimum |SNR| of a signal candidate. Default: 0.5
    pub min_snr: f64,
    /// Minimum size of a signal candidate. Default: 10
    pub min_n_samples: usize,
    /// Seed of the mixture's k-means initialization
    pub seed: u64,
}

impl Default for BinarizeOptions {
    fn default() -> Self {
        BinarizeOptions {
            min_snr: 0.5,
            min_n_samples: 10,
            seed: 0,
        }
    }
}

impl BinarizeOptions {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.min_n_samples >= 1, "min_n_samples must be at least 1");
        anyhow::ensure!(self.min_snr >= 0.0, "min_snr must be non-negative");
        Ok(())
    }
}

/// Binary UP and DOWN matrices. Rows without any selected sample are
/// dropped from the corresponding matrix.
#[derive(Debug, Clone)]
pub struct Binarized {
    pub up: NamedMatrix<u8>,
    pub down: NamedMatrix<u8>,
    /// SNR between the two mixture components of every input row
    pub snrs: Vec<f64>,
    /// rows where both components were treated as signal candidates
    pub n_inexplicit: usize,
}

/// Result of one row
#[derive(Debug, Clone, PartialEq)]
pub struct RowSignal {
    pub pos: Vec<bool>,
    pub neg: Vec<bool>,
    pub snr: f64,
    pub inexplicit: bool,
}

fn mean_std(xs: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    let (n, s1, s2) = xs.fold((0usize, 0.0, 0.0), |(n, s1, s2), x| (n + 1, s1 + x, s2 + x * x));
    if n == 0 {
        return None;
    }
    let mean = s1 / n as f64;
    let var = (s2 / n as f64 - mean * mean).max(0.0);
    Some((mean, var.sqrt()))
}

/// `(mean(fg) - mean(bg)) / (std(fg) + std(bg))` with population
/// standard deviations. Zero if either side is empty or both are
/// constant.
pub fn calc_snr(row: &[f64], mask: &[bool]) -> f64 {
    let fg = mean_std(row.iter().zip(mask).filter(|(_, &m)| m).map(|(&x, _)| x));
    let bg = mean_std(row.iter().zip(mask).filter(|(_, &m)| !m).map(|(&x, _)| x));
    match (fg, bg) {
        (Some((mu_fg, sd_fg)), Some((mu_bg, sd_bg))) => {
            let denom = sd_fg + sd_bg;
            if denom > 0.0 {
                (mu_fg - mu_bg) / denom
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}

fn no_signal(n: usize) -> RowSignal {
    RowSignal {
        pos: vec![false; n],
        neg: vec![false; n],
        snr: 0.0,
        inexplicit: false,
    }
}

/// Split one expression row into positive and negative sample masks
pub fn select_pos_neg(row: &[f64], options: &BinarizeOptions) -> RowSignal {
    let n = row.len();
    let lo = row.iter().cloned().fold(f64::INFINITY, f64::min);
    let hi = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if n < 2 || !(hi > lo) {
        return no_signal(n);
    }

    let args = MixtureArgs {
        seed: options.seed,
        ..Default::default()
    };
    let mut labels = match mixture_labels_1d(row, &args) {
        Ok(labels) => labels,
        Err(e) => {
            debug!("no mixture for a row of {} samples: {}", n, e);
            return no_signal(n);
        }
    };

    let mask0: Vec<bool> = labels.iter().map(|&l| l == 0).collect();
    let snr = calc_snr(row, &mask0);

    // label 1 is the bigger group
    let n1 = labels.iter().filter(|&&l| l == 1).count();
    if n - n1 > n1 {
        labels.iter_mut().for_each(|l| *l = 1 - *l);
    }
    let n0 = labels.iter().filter(|&&l| l == 0).count();
    let n1 = n - n0;

    let min_diff_samples = 2 * options.min_n_samples;
    let mut candidates = vec![];
    let mut inexplicit = false;
    if options.min_n_samples < n0 {
        candidates.push(labels.iter().map(|&l| l == 0).collect::<Vec<_>>());
        if n1 - n0 < min_diff_samples {
            inexplicit = true;
            candidates.push(labels.iter().map(|&l| l == 1).collect::<Vec<_>>());
        }
    }

    let mut pos = vec![false; n];
    let mut neg = vec![false; n];
    for mask in candidates {
        let sig_snr = calc_snr(row, &mask);
        if sig_snr.abs() > options.min_snr {
            let target = if sig_snr > 0.0 { &mut pos } else { &mut neg };
            target.iter_mut().zip(&mask).for_each(|(t, &m)| *t |= m);
        }
    }

    RowSignal {
        pos,
        neg,
        snr,
        inexplicit,
    }
}

fn masks_to_matrix(
    exprs: &NamedMatrix<f64>,
    masks: &[&[bool]],
) -> anyhow::Result<NamedMatrix<u8>> {
    let keep: Vec<usize> = masks
        .iter()
        .enumerate()
        .filter(|(_, m)| m.iter().any(|&x| x))
        .map(|(i, _)| i)
        .collect();

    let n = exprs.ncols();
    let mut data = Array2::<u8>::zeros((keep.len(), n));
    for (mut row, &i) in data.axis_iter_mut(Axis(0)).zip(keep.iter()) {
        for (x, &m) in row.iter_mut().zip(masks[i].iter()) {
            *x = m as u8;
        }
    }

    NamedMatrix::new(
        keep.iter().map(|&i| exprs.row_names[i].clone()).collect(),
        exprs.column_names.clone(),
        data,
    )
}

/// Binarize every row of a gene x sample expression matrix
pub fn binarize(exprs: &NamedMatrix<f64>, options: &BinarizeOptions) -> anyhow::Result<Binarized> {
    options.validate()?;

    let signals: Vec<RowSignal> = (0..exprs.nrows())
        .into_par_iter()
        .map(|i| select_pos_neg(&exprs.data.row(i).to_vec(), options))
        .collect();

    let up = masks_to_matrix(exprs, &signals.iter().map(|s| s.pos.as_slice()).collect::<Vec<_>>())?;
    let down = masks_to_matrix(exprs, &signals.iter().map(|s| s.neg.as_slice()).collect::<Vec<_>>())?;
    let n_inexplicit = signals.iter().filter(|s| s.inexplicit).count();

    info!(
        "Genes passed SNR threshold of {:.2}: {} up, {} down, {} inexplicit (out of {})",
        options.min_snr,
        up.nrows(),
        down.nrows(),
        n_inexplicit,
        exprs.nrows()
    );

    Ok(Binarized {
        up,
        down,
        snrs: signals.into_iter().map(|s| s.snr).collect(),
        n_inexplicit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn bimodal(n_lo: usize, n_hi: usize, lo: f64, hi: f64) -> Vec<f64> {
        // deterministic jitter
        let jitter = |i: usize| ((i * 37) % 11) as f64 / 100.0 - 0.05;
        (0..n_lo)
            .map(|i| lo + jitter(i))
            .chain((0..n_hi).map(|i| hi + jitter(i + n_lo)))
            .collect()
    }

    #[test]
    fn snr_by_hand() {
        let row = [1.0, 3.0, 10.0, 10.0];
        let mask = [true, true, false, false];
        // means 2 vs 10, stds 1 vs 0
        assert_abs_diff_eq!(calc_snr(&row, &mask), -8.0);
        assert_abs_diff_eq!(calc_snr(&row, &[false; 4]), 0.0);
        assert_abs_diff_eq!(calc_snr(&[2.0, 2.0], &[true, false]), 0.0);
    }

    #[test]
    fn flat_rows_carry_no_signal() {
        let sig = select_pos_neg(&[3.0; 20], &BinarizeOptions::default());
        assert_eq!(sig, no_signal(20));
        assert!(select_pos_neg(&[], &BinarizeOptions::default()).pos.is_empty());
    }

    #[test]
    fn same_seed_same_signal() {
        let options = BinarizeOptions {
            min_n_samples: 5,
            seed: 11,
            ..Default::default()
        };
        let x = bimodal(25, 15, 0.0, 3.0);
        let first = select_pos_neg(&x, &options);
        for _ in 0..10 {
            assert_eq!(select_pos_neg(&x, &options), first);
        }
    }

    #[test]
    fn small_high_group_is_up() {
        let options = BinarizeOptions {
            min_n_samples: 5,
            ..Default::default()
        };
        // 12 high among 40: clear-cut split
        let x = bimodal(28, 12, 0.0, 5.0);
        let sig = select_pos_neg(&x, &options);
        assert!(!sig.inexplicit);
        assert_eq!(sig.pos.iter().filter(|&&p| p).count(), 12);
        assert!(sig.pos[28..].iter().all(|&p| p));
        assert!(sig.neg.iter().all(|&p| !p));

        // mirrored: the small group is low
        let y: Vec<f64> = x.iter().map(|v| -v).collect();
        let sig = select_pos_neg(&y, &options);
        assert!(sig.pos.iter().all(|&p| !p));
        assert!(sig.neg[28..].iter().all(|&p| p));
    }

    #[test]
    fn balanced_split_is_inexplicit() {
        let options = BinarizeOptions {
            min_n_samples: 5,
            ..Default::default()
        };
        let x = bimodal(20, 20, 0.0, 5.0);
        let sig = select_pos_neg(&x, &options);
        assert!(sig.inexplicit);
        // both halves are signal: the high one up, the low one down
        assert!(sig.pos[20..].iter().all(|&p| p));
        assert!(sig.neg[..20].iter().all(|&p| p));
    }

    #[test]
    fn too_small_groups_are_ignored() {
        let options = BinarizeOptions::default();
        let x = bimodal(34, 6, 0.0, 5.0);
        let sig = select_pos_neg(&x, &options);
        assert!(sig.pos.iter().all(|&p| !p));
        assert!(sig.neg.iter().all(|&p| !p));
    }

    #[test]
    fn binarize_drops_empty_rows() -> anyhow::Result<()> {
        let n = 40;
        let mut data = Array2::<f64>::zeros((3, n));
        let up_row = bimodal(28, 12, 0.0, 5.0);
        for j in 0..n {
            data[[0, j]] = up_row[j];
            data[[1, j]] = -up_row[j];
            data[[2, j]] = 1.0;
        }
        let exprs = NamedMatrix::new(
            vec!["a".into(), "b".into(), "c".into()],
            (0..n).map(|j| format!("s{}", j).into_boxed_str()).collect(),
            data,
        )?;

        let out = binarize(
            &exprs,
            &BinarizeOptions {
                min_n_samples: 5,
                ..Default::default()
            },
        )?;

        assert_eq!(out.up.row_names, vec![Box::from("a")]);
        assert_eq!(out.down.row_names, vec![Box::from("b")]);
        assert_eq!(out.up.data.row(0).iter().map(|&x| x as usize).sum::<usize>(), 12);
        assert_eq!(out.snrs.len(), 3);
        Ok(())
    }
}
