//! Convergence detection from the stability of per-gene transitions.
//!
//! Over a sliding window of `W` snapshots, every gene whose module label
//! is not constant ("skipping") gets an empirical transition table
//! `P(next | prev)`. Two signals are tracked window after window:
//!
//! 1. the number of skipping genes,
//! 2. the RMS difference between consecutive transition tables.
//!
//! A step is locally convergent when a line fitted to the last
//! `n_points_fit` skipping counts (rescaled to the observed range) is
//! flat. The sampler stops after `n_steps_for_convergence` locally
//! convergent steps in a row.

use crate::history::AssignmentHistory;
use fnv::FnvHashMap as HashMap;
use log::{debug, info};
use std::collections::{BTreeMap, BTreeSet};

/// `(prev module, next module) -> probability`
pub type TransitionTable = HashMap<(usize, usize), f64>;

/// gene -> transition table, only for skipping genes
pub type WindowTransitions = BTreeMap<usize, TransitionTable>;

/// Transition table of one gene's label sequence.
///
/// Every pair over the observed modules is present (zero if never
/// seen). Counts are normalized by how often `prev` occurs as a
/// predecessor. Returns `None` if the label never changes.
pub fn transition_table(states: &[usize]) -> Option<TransitionTable> {
    let unique: BTreeSet<usize> = states.iter().cloned().collect();
    if unique.len() < 2 {
        return None;
    }

    let mut counts: TransitionTable = HashMap::default();
    for &a in &unique {
        for &b in &unique {
            counts.insert((a, b), 0.0);
        }
    }

    let mut n_prev: HashMap<usize, f64> = HashMap::default();
    for pair in states.windows(2) {
        *counts.entry((pair[0], pair[1])).or_insert(0.0) += 1.0;
        *n_prev.entry(pair[0]).or_insert(0.0) += 1.0;
    }

    for ((a, _), v) in counts.iter_mut() {
        match n_prev.get(a) {
            Some(&n) if n > 0.0 => *v /= n,
            _ => *v = 0.0,
        }
    }

    Some(counts)
}

/// Transition tables of all skipping genes over a window of snapshots
/// (oldest first).
pub fn collect_transitions(window: &[&[usize]]) -> WindowTransitions {
    let n_genes = window.first().map(|x| x.len()).unwrap_or(0);
    let mut states = Vec::with_capacity(window.len());
    let mut ret = WindowTransitions::new();

    for gene in 0..n_genes {
        states.clear();
        states.extend(window.iter().map(|snapshot| snapshot[gene]));
        if let Some(table) = transition_table(&states) {
            ret.insert(gene, table);
        }
    }
    ret
}

fn identity_deviations(table: &TransitionTable, sq_diffs: &mut Vec<f64>) {
    for (&(a, b), &p) in table.iter() {
        let ident = if a == b { 1.0 } else { 0.0 };
        sq_diffs.push((p - ident).powi(2));
    }
}

/// RMS distance between the transition tables of two windows.
///
/// A gene skipping in only one window is compared against the identity
/// transition (probability 1 on `(x, x)`, 0 elsewhere) over that
/// table's pairs. For genes skipping in both, pairs present in both
/// tables contribute their squared difference, and pairs present in one
/// table contribute their squared value. Zero if nothing to compare.
pub fn transition_rmsd(curr: &WindowTransitions, prev: &WindowTransitions) -> f64 {
    let mut sq_diffs = vec![];

    for (gene, table) in curr.iter() {
        match prev.get(gene) {
            Some(prev_table) => {
                for (pair, &p) in table.iter() {
                    match prev_table.get(pair) {
                        Some(&q) => sq_diffs.push((p - q).powi(2)),
                        None => sq_diffs.push(p * p),
                    }
                }
                for (pair, &q) in prev_table.iter() {
                    if !table.contains_key(pair) {
                        sq_diffs.push(q * q);
                    }
                }
            }
            None => identity_deviations(table, &mut sq_diffs),
        }
    }

    for (gene, prev_table) in prev.iter() {
        if !curr.contains_key(gene) {
            identity_deviations(prev_table, &mut sq_diffs);
        }
    }

    if sq_diffs.is_empty() {
        0.0
    } else {
        (sq_diffs.iter().sum::<f64>() / sq_diffs.len() as f64).sqrt()
    }
}

/// Least-squares slope of `ys` against `x = 0, 1, ..., n-1`
pub fn fit_slope(ys: &[f64]) -> f64 {
    let n = ys.len();
    if n < 2 {
        return 0.0;
    }
    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = ys.iter().sum::<f64>() / n as f64;

    let (sxy, sxx) = ys
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(sxy, sxx), (i, &y)| {
            let dx = i as f64 - x_mean;
            (sxy + dx * (y - y_mean), sxx + dx * dx)
        });

    sxy / sxx
}

/// Slope of the last `n_points` counts after rescaling
/// `[min, max]` of all `counts` onto `[0, n_points]`.
/// A constant sequence rescales to zeros.
pub fn rescaled_slope(counts: &[usize], n_points: usize) -> f64 {
    let min = counts.iter().cloned().min().unwrap_or(0) as f64;
    let max = counts.iter().cloned().max().unwrap_or(0) as f64;
    let range = max - min;

    let tail = &counts[counts.len().saturating_sub(n_points)..];
    let scaled: Vec<f64> = tail
        .iter()
        .map(|&c| {
            if range > 0.0 {
                (c as f64 - min) / range * n_points as f64
            } else {
                0.0
            }
        })
        .collect();

    fit_slope(&scaled)
}

/// What one call to [`ConvergenceMonitor::observe`] found
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConvergenceCheck {
    /// not enough history to evaluate yet
    Warmup,
    /// the trend of skipping genes was evaluated
    Checked {
        slope: f64,
        locally_converged: bool,
        streak: usize,
    },
}

#[derive(Debug, Clone)]
pub struct ConvergenceMonitor {
    n_steps_averaged: usize,
    n_points_fit: usize,
    tol: f64,
    n_steps_for_convergence: usize,

    prev: Option<WindowTransitions>,
    n_skipping_genes: Vec<usize>,
    rms: Vec<f64>,
    slopes: Vec<f64>,
    streak: usize,
}

impl ConvergenceMonitor {
    /// * `n_steps_averaged` - window size `W`
    /// * `n_points_fit` - number of windows in the trend line
    /// * `tol` - maximum absolute slope of a flat trend
    /// * `n_steps_for_convergence` - consecutive flat steps required
    pub fn new(
        n_steps_averaged: usize,
        n_points_fit: usize,
        tol: f64,
        n_steps_for_convergence: usize,
    ) -> Self {
        Self {
            n_steps_averaged,
            n_points_fit,
            tol,
            n_steps_for_convergence,
            prev: None,
            n_skipping_genes: vec![],
            rms: vec![],
            slopes: vec![],
            streak: 0,
        }
    }

    /// Evaluate the window ending right before the snapshot of `step`,
    /// i.e., snapshots `step - W .. step`.
    pub fn observe(
        &mut self,
        step: usize,
        history: &AssignmentHistory,
    ) -> anyhow::Result<ConvergenceCheck> {
        let w = self.n_steps_averaged;
        if step < w {
            return Ok(ConvergenceCheck::Warmup);
        }

        let window = history.range(step - w, step)?;
        let curr = collect_transitions(&window);

        self.n_skipping_genes.push(curr.len());
        if let Some(prev) = self.prev.as_ref() {
            let rms = transition_rmsd(&curr, prev);
            debug!("step {}: RMS(P[n] - P[n-1]) = {:.5}", step, rms);
            self.rms.push(rms);
        }
        self.prev = Some(curr);

        if self.n_skipping_genes.len() < self.n_points_fit {
            return Ok(ConvergenceCheck::Warmup);
        }

        let slope = rescaled_slope(&self.n_skipping_genes, self.n_points_fit);
        self.slopes.push(slope);

        let locally_converged = slope.abs() < self.tol;
        if locally_converged {
            self.streak += 1;
        } else {
            self.streak = 0;
        }

        info!(
            "step {}: converged: {}, #skipping genes: {}, slope: {:.5}",
            step,
            locally_converged,
            self.n_skipping_genes.last().cloned().unwrap_or(0),
            slope
        );

        Ok(ConvergenceCheck::Checked {
            slope,
            locally_converged,
            streak: self.streak,
        })
    }

    /// True once enough consecutive steps were locally convergent
    pub fn is_converged(&self) -> bool {
        self.streak >= self.n_steps_for_convergence
    }

    pub fn n_skipping_genes(&self) -> &[usize] {
        &self.n_skipping_genes
    }

    pub fn rms(&self) -> &[f64] {
        &self.rms
    }

    pub fn slopes(&self) -> &[f64] {
        &self.slopes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn constant_labels_have_no_table() {
        assert!(transition_table(&[3, 3, 3, 3]).is_none());
    }

    #[test]
    fn transition_probabilities_by_hand() {
        // 0 -> 1 -> 0 -> 0 -> 1
        let table = transition_table(&[0, 1, 0, 0, 1]).unwrap();
        assert_eq!(table.len(), 4);
        // 0 is a predecessor three times: to 1 twice, to 0 once
        assert_abs_diff_eq!(table[&(0, 1)], 2.0 / 3.0);
        assert_abs_diff_eq!(table[&(0, 0)], 1.0 / 3.0);
        // 1 is a predecessor once
        assert_abs_diff_eq!(table[&(1, 0)], 1.0);
        assert_abs_diff_eq!(table[&(1, 1)], 0.0);
    }

    #[test]
    fn label_seen_only_last_has_zero_rows() {
        let table = transition_table(&[2, 2, 5]).unwrap();
        assert_abs_diff_eq!(table[&(2, 2)], 0.5);
        assert_abs_diff_eq!(table[&(2, 5)], 0.5);
        assert_abs_diff_eq!(table[&(5, 2)], 0.0);
        assert_abs_diff_eq!(table[&(5, 5)], 0.0);
    }

    #[test]
    fn window_transitions_skip_stable_genes() {
        let s0 = vec![0, 1, 2];
        let s1 = vec![0, 0, 2];
        let s2 = vec![0, 1, 2];
        let window: Vec<&[usize]> = vec![&s0[..], &s1[..], &s2[..]];
        let trans = collect_transitions(&window);
        assert_eq!(trans.keys().cloned().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn rmsd_of_identical_windows_is_zero() {
        let s0 = vec![0, 1];
        let s1 = vec![1, 1];
        let window: Vec<&[usize]> = vec![&s0[..], &s1[..], &s0[..]];
        let a = collect_transitions(&window);
        assert_abs_diff_eq!(transition_rmsd(&a, &a), 0.0);
        assert_abs_diff_eq!(transition_rmsd(&WindowTransitions::new(), &WindowTransitions::new()), 0.0);
    }

    #[test]
    fn one_sided_gene_is_compared_to_identity() {
        let mut curr = WindowTransitions::new();
        // 0 -> 1 -> 0
        curr.insert(4, transition_table(&[0, 1, 0]).unwrap());
        let prev = WindowTransitions::new();

        // table: (0,0)=0, (0,1)=1, (1,0)=1, (1,1)=0
        // identity: (0,0)=1, (1,1)=1 => every entry deviates by 1
        assert_abs_diff_eq!(transition_rmsd(&curr, &prev), 1.0);
        assert_abs_diff_eq!(transition_rmsd(&prev, &curr), 1.0);
    }

    #[test]
    fn shared_gene_with_disjoint_pairs() {
        let mut curr = WindowTransitions::new();
        let mut prev = WindowTransitions::new();
        // pairs over {0, 1}
        curr.insert(0, transition_table(&[0, 1, 1]).unwrap());
        // pairs over {1, 2}
        prev.insert(0, transition_table(&[1, 2, 2]).unwrap());

        // curr: (0,0)=0 (0,1)=1 (1,0)=0 (1,1)=1
        // prev: (1,1)=0 (1,2)=1 (2,1)=0 (2,2)=1
        // shared (1,1): (1-0)^2 = 1
        // curr only: 0, 1, 0 ; prev only: 1, 0, 1
        let expected = (4.0_f64 / 7.0).sqrt();
        assert_abs_diff_eq!(transition_rmsd(&curr, &prev), expected, epsilon = 1e-12);
    }

    #[test]
    fn slope_of_a_line() {
        assert_abs_diff_eq!(fit_slope(&[1.0, 3.0, 5.0, 7.0]), 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(fit_slope(&[4.0, 4.0, 4.0]), 0.0);
        assert_abs_diff_eq!(fit_slope(&[1.0]), 0.0);
    }

    #[test]
    fn rescaled_slope_uses_the_global_range() {
        // range 0..10 over everything, tail of 5 is flat
        let counts = vec![10, 0, 5, 5, 5, 5, 5];
        assert_abs_diff_eq!(rescaled_slope(&counts, 5), 0.0, epsilon = 1e-12);

        // decreasing tail: 4,3,2,1,0 -> scaled by 5/4 -> slope -1.25
        let counts = vec![4, 3, 2, 1, 0];
        assert_abs_diff_eq!(rescaled_slope(&counts, 5), -1.25, epsilon = 1e-12);

        // constant counts rescale to zeros
        assert_abs_diff_eq!(rescaled_slope(&[0, 0, 0], 3), 0.0);
    }

    #[test]
    fn constant_history_converges_immediately() -> anyhow::Result<()> {
        let (w, n_fit, n_conv) = (3, 2, 2);
        let mut monitor = ConvergenceMonitor::new(w, n_fit, 0.05, n_conv);
        let mut hist = AssignmentHistory::bounded(w + 1);
        hist.push(vec![0, 0, 2]);

        let mut first_check = None;
        for step in 1..=10 {
            hist.push(vec![0, 0, 2]);
            if let ConvergenceCheck::Checked {
                slope,
                locally_converged,
                ..
            } = monitor.observe(step, &hist)?
            {
                first_check.get_or_insert(step);
                assert_abs_diff_eq!(slope, 0.0);
                assert!(locally_converged);
            }
            if monitor.is_converged() {
                break;
            }
        }

        // counts start at step w; the fit needs n_fit of them
        assert_eq!(first_check, Some(w + n_fit - 1));
        assert!(monitor.is_converged());
        assert!(monitor.n_skipping_genes().iter().all(|&c| c == 0));
        assert!(monitor.rms().iter().all(|&r| r == 0.0));
        Ok(())
    }

    #[test]
    fn a_steep_trend_resets_the_streak() -> anyhow::Result<()> {
        let mut monitor = ConvergenceMonitor::new(2, 2, 0.05, 2);
        let mut hist = AssignmentHistory::unbounded();

        // gene 0 oscillates early, then settles
        let labels = [0, 1, 0, 1, 1, 1, 1, 1, 1];
        hist.push(vec![labels[0]]);
        let mut checks = vec![];
        for (step, &l) in labels.iter().enumerate().skip(1) {
            hist.push(vec![l]);
            checks.push(monitor.observe(step, &hist)?);
        }

        let flags: Vec<bool> = checks
            .iter()
            .filter_map(|c| match c {
                ConvergenceCheck::Checked {
                    locally_converged, ..
                } => Some(*locally_converged),
                _ => None,
            })
            .collect();

        // skipping counts per window (steps 2..=8): 1,1,1,0,0,0,0
        // slope over pairs: 0, 0, -2, 0, 0, 0
        assert_eq!(flags, vec![true, true, false, true, true, true]);
        assert_eq!(monitor.n_skipping_genes(), &[1, 1, 1, 0, 0, 0, 0]);
        assert!(monitor.is_converged());
        Ok(())
    }
}
