use anyhow::Result;
use clap::Args;
use log::info;

use lentil::binarize::{binarize, BinarizeOptions};
use lentil::io::{read_expression, write_binary_matrix};

#[derive(Args, Debug, Clone)]
pub struct BinarizeArgs {
    #[arg(
        required = true,
        help = "Expression matrix (genes x samples, tab-separated, optionally gzipped)"
    )]
    pub expression: Box<str>,

    #[arg(short, long, required = true, help = "Output prefix")]
    pub out: Box<str>,

    #[arg(long, default_value_t = 0.5, help = "Minimum |SNR| of a signal sample set")]
    pub min_snr: f64,

    #[arg(long, default_value_t = 10, help = "Minimum number of samples in a signal set")]
    pub min_n_samples: usize,

    #[arg(long, default_value_t = 42, help = "Random seed of the mixture initialization")]
    pub seed: u64,

    #[arg(long, default_value_t = num_cpus::get(), help = "Number of threads")]
    pub threads: usize,
}

impl BinarizeArgs {
    pub fn options(&self) -> BinarizeOptions {
        BinarizeOptions {
            min_snr: self.min_snr,
            min_n_samples: self.min_n_samples,
            seed: self.seed,
        }
    }
}

pub fn set_num_threads(threads: usize) -> Result<()> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .build_global()
        .map_err(|e| anyhow::anyhow!("failed to set up {} threads: {}", threads, e))
}

pub fn run_binarize(args: &BinarizeArgs) -> Result<()> {
    set_num_threads(args.threads)?;

    let exprs = read_expression(&args.expression)?;
    info!(
        "Read {} genes x {} samples from {}",
        exprs.nrows(),
        exprs.ncols(),
        args.expression
    );

    let out = binarize(&exprs, &args.options())?;

    let up_file = format!("{}.up.tsv.gz", args.out);
    let down_file = format!("{}.down.tsv.gz", args.out);
    write_binary_matrix(&out.up, &up_file)?;
    write_binary_matrix(&out.down, &down_file)?;
    info!("Wrote {} and {}", up_file, down_file);

    Ok(())
}
