use anyhow::Result;
use clap::Args;
use log::info;

use lentil::inference::{ModuleFit, ModuleSampler, ModuleSamplerOptions};
use lentil::io::*;
use matrix_util::ndarray_io::NamedMatrix;

use crate::run_binarize::set_num_threads;

#[derive(Args, Debug, Clone)]
pub struct SamplerArgs {
    #[arg(long, default_value_t = 1.0, help = "Beta prior strength")]
    pub alpha: f64,

    #[arg(long, default_value_t = 1.0, help = "Prior on the number of modules")]
    pub beta_k: f64,

    #[arg(long, default_value_t = 100, help = "Maximum number of Gibbs steps")]
    pub max_n_steps: usize,

    #[arg(
        long,
        default_value_t = 20,
        help = "Snapshots per transition window",
        long_help = "Number of consecutive assignment snapshots used to estimate\n\
		     each gene's transition probabilities."
    )]
    pub n_steps_averaged: usize,

    #[arg(long, default_value_t = 10, help = "Windows in the convergence trend line")]
    pub n_points_fit: usize,

    #[arg(long, default_value_t = 0.05, help = "Maximum absolute slope of a flat trend")]
    pub tol: f64,

    #[arg(
        long,
        default_value_t = 5,
        help = "Consecutive flat steps required to stop"
    )]
    pub n_steps_for_convergence: usize,

    #[arg(long, default_value_t = 42, help = "Random seed")]
    pub seed: u64,

    #[arg(long, default_value_t = false, help = "Keep every snapshot and write it out")]
    pub keep_trajectory: bool,
}

impl SamplerArgs {
    pub fn options(&self) -> ModuleSamplerOptions {
        ModuleSamplerOptions {
            alpha: self.alpha,
            beta_k: self.beta_k,
            max_n_steps: self.max_n_steps,
            n_steps_averaged: self.n_steps_averaged,
            n_points_fit: self.n_points_fit,
            tol: self.tol,
            n_steps_for_convergence: self.n_steps_for_convergence,
            seed: self.seed,
            keep_trajectory: self.keep_trajectory,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ModulesArgs {
    #[arg(
        required = true,
        help = "Binary matrix (genes x samples, 0/1, tab-separated, optionally gzipped)"
    )]
    pub binary: Box<str>,

    #[arg(short, long, required = true, help = "Output prefix")]
    pub out: Box<str>,

    #[command(flatten)]
    pub sampler: SamplerArgs,

    #[arg(long, default_value_t = false, help = "Show a progress bar")]
    pub progress: bool,

    #[arg(long, default_value_t = num_cpus::get(), help = "Number of threads")]
    pub threads: usize,
}

/// Sample modules and write `{out}.modules.tsv`, `{out}.convergence.tsv`,
/// `{out}.diagnostics.json` and, if kept, `{out}.trajectory.tsv.gz`
pub fn fit_and_write_modules(
    binary: &NamedMatrix<u8>,
    sampler: &SamplerArgs,
    progress: bool,
    out: &str,
) -> Result<ModuleFit> {
    let xx = binary_to_f64(binary);
    let fit = ModuleSampler::new(sampler.options())?
        .with_progress(progress)
        .fit(xx.view())?;

    write_modules(&fit.membership, &binary.row_names, &format!("{}.modules.tsv", out))?;
    write_convergence_tsv(&fit.diagnostics, &format!("{}.convergence.tsv", out))?;
    write_diagnostics_json(&fit.diagnostics, &format!("{}.diagnostics.json", out))?;

    if let Some(trajectory) = fit.trajectory.as_ref() {
        let lines: Vec<String> = trajectory
            .iter()
            .map(|s| {
                s.iter()
                    .map(|m| m.to_string())
                    .collect::<Vec<_>>()
                    .join("\t")
            })
            .collect();
        matrix_util::common_io::write_lines(&lines, &format!("{}.trajectory.tsv.gz", out))?;
    }

    info!(
        "{} non-empty modules after {} steps (converged: {})",
        fit.modules().len(),
        fit.diagnostics.final_step,
        fit.diagnostics.converged
    );

    Ok(fit)
}

pub fn run_modules(args: &ModulesArgs) -> Result<()> {
    set_num_threads(args.threads)?;

    let binary = read_binary_matrix(&args.binary)?;
    info!(
        "Read {} genes x {} samples from {}",
        binary.nrows(),
        binary.ncols(),
        args.binary
    );

    fit_and_write_modules(&binary, &args.sampler, args.progress, &args.out)?;
    Ok(())
}
