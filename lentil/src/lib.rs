//! Co-regulated gene modules and biclusters from binarized expression.
//!
//! Genes are grouped into modules by Gibbs sampling under a
//! Beta-Bernoulli co-occurrence model. Sampling stops once the per-gene
//! transition probabilities settle, and the modules are read off by a
//! majority vote over the last few steps.
//!
//! # Pipeline
//!
//! 1. [`binarize`]: expression rows to UP/DOWN binary matrices
//! 2. [`inference::ModuleSampler`]: binary matrix to gene modules
//! 3. [`bicluster`]: modules to gene x sample biclusters

/// Beta-Bernoulli affinity of a gene to a module
pub mod model;

/// Owned sampler state: aggregates and the affinity matrix
pub mod sampler_state;

/// Gibbs sweeps over module assignments
pub mod gibbs;

/// Bounded record of assignment snapshots
pub mod history;

/// Convergence from the stability of per-gene transitions
pub mod convergence;

/// Majority vote over the final snapshots
pub mod consensus;

/// The sampling loop with options and diagnostics
pub mod inference;

/// Two-component mixture binarization of expression rows
pub mod binarize;

/// Sample sets and SNR filtering of modules
pub mod bicluster;

/// Table readers and writers
pub mod io;


pub use bicluster::{Bicluster, BiclusterOptions, Direction};
pub use binarize::{BinarizeOptions, Binarized};
pub use inference::{ModuleFit, ModuleSampler, ModuleSamplerOptions};
