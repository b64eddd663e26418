//! Per-gene majority vote over the final window of snapshots.

use crate::sampler_state::SamplerState;
use fnv::FnvHashMap as HashMap;
use log::warn;
use serde::Serialize;

/// A gene whose majority module held no more than half of the window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsensusNote {
    pub gene: usize,
    /// `(module, occurrences)` sorted by module
    pub counts: Vec<(usize, usize)>,
    /// fraction of the window taken by the chosen module
    pub share: f64,
}

#[derive(Debug, Clone)]
pub struct Consensus {
    pub membership: Vec<usize>,
    /// genes whose consensus module differs from the last live module
    pub n_changed: usize,
    pub notes: Vec<ConsensusNote>,
}

/// Most frequent label; ties go to the lowest label.
///
/// Returns the label, the sorted label counts and the majority share.
pub fn majority_vote(labels: &[usize]) -> Option<(usize, Vec<(usize, usize)>, f64)> {
    if labels.is_empty() {
        return None;
    }

    let mut counts: HashMap<usize, usize> = HashMap::default();
    for &l in labels {
        *counts.entry(l).or_insert(0) += 1;
    }

    let mut counts: Vec<(usize, usize)> = counts.into_iter().collect();
    counts.sort_unstable();

    let mut best = counts[0];
    for &(l, c) in counts.iter().skip(1) {
        if c > best.1 {
            best = (l, c);
        }
    }

    let share = best.1 as f64 / labels.len() as f64;
    Some((best.0, counts, share))
}

/// Collapse `window` into one partition and move `state` onto it.
///
/// Aggregates follow the moves, the affinity matrix does not.
pub fn build_consensus(state: &mut SamplerState, window: &[&[usize]]) -> anyhow::Result<Consensus> {
    anyhow::ensure!(!window.is_empty(), "empty consensus window");
    let k = state.n_genes();
    anyhow::ensure!(
        window.iter().all(|s| s.len() == k),
        "snapshot length differs from the number of genes {}",
        k
    );

    let mut membership = Vec::with_capacity(k);
    let mut notes = vec![];
    let mut labels = Vec::with_capacity(window.len());

    for gene in 0..k {
        labels.clear();
        labels.extend(window.iter().map(|s| s[gene]));

        let (module, counts, share) =
            majority_vote(&labels).ok_or_else(|| anyhow::anyhow!("no labels for gene {}", gene))?;

        if share <= 0.5 {
            warn!(
                "gene {}: majority module {} holds only {:.1}% of the window {:?}",
                gene,
                module,
                share * 100.0,
                counts
            );
            notes.push(ConsensusNote {
                gene,
                counts,
                share,
            });
        }
        membership.push(module);
    }

    let mut n_changed = 0;
    for (gene, &module) in membership.iter().enumerate() {
        if state.membership[gene] != module {
            state.move_gene(gene, module);
            n_changed += 1;
        }
    }

    Ok(Consensus {
        membership,
        n_changed,
        notes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn majority_with_tie_takes_the_lower_module() {
        let (m, counts, share) = majority_vote(&[5, 2, 5, 2]).unwrap();
        assert_eq!(m, 2);
        assert_eq!(counts, vec![(2, 2), (5, 2)]);
        assert_abs_diff_eq!(share, 0.5);

        let (m, _, share) = majority_vote(&[1, 3, 3]).unwrap();
        assert_eq!(m, 3);
        assert_abs_diff_eq!(share, 2.0 / 3.0);

        assert!(majority_vote(&[]).is_none());
    }

    #[test]
    fn consensus_moves_aggregates_not_affinities() -> anyhow::Result<()> {
        let xx = array![[1.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]];
        let mut state = SamplerState::new(xx.view(), 1.0, 1.0)?;
        let lp_before = state.log_probs.clone();

        let s0 = vec![0, 0, 2];
        let s1 = vec![0, 1, 2];
        let s2 = vec![0, 0, 1];
        let s3 = vec![0, 1, 2];
        let window: Vec<&[usize]> = vec![&s0[..], &s1[..], &s2[..], &s3[..]];

        let consensus = build_consensus(&mut state, &window)?;

        // gene 1: tie between 0 and 1 -> 0
        // gene 2: 2 three times out of four
        assert_eq!(consensus.membership, vec![0, 0, 2]);
        assert_eq!(consensus.n_changed, 1);
        assert_eq!(consensus.notes.len(), 1);
        assert_eq!(consensus.notes[0].gene, 1);
        assert_eq!(consensus.notes[0].counts, vec![(0, 2), (1, 2)]);

        assert_eq!(state.membership, vec![0, 0, 2]);
        assert_eq!(state.module_sizes, vec![2, 0, 1]);
        state.verify_aggregates()?;
        assert_eq!(state.log_probs, lp_before);
        Ok(())
    }

    #[test]
    fn rejects_mismatched_windows() -> anyhow::Result<()> {
        let xx = array![[1.0, 0.0], [0.0, 1.0]];
        let mut state = SamplerState::new(xx.view(), 1.0, 1.0)?;
        let short = vec![0];
        assert!(build_consensus(&mut state, &[&short[..]]).is_err());
        assert!(build_consensus(&mut state, &[]).is_err());
        Ok(())
    }
}
