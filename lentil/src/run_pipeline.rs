use anyhow::Result;
use clap::Args;
use fnv::FnvHashMap as HashMap;
use log::{info, warn};

use lentil::bicluster::{extract_biclusters, sort_biclusters, Bicluster, BiclusterOptions, Direction};
use lentil::binarize::binarize;
use lentil::io::*;
use matrix_util::ndarray_io::NamedMatrix;

use crate::run_binarize::set_num_threads;
use crate::run_modules::{fit_and_write_modules, SamplerArgs};

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[arg(
        required = true,
        help = "Expression matrix (genes x samples, tab-separated, optionally gzipped)"
    )]
    pub expression: Box<str>,

    #[arg(short, long, required = true, help = "Output prefix")]
    pub out: Box<str>,

    #[arg(
        long,
        default_value_t = 0.5,
        help = "Minimum |SNR| for binarization and average SNR for biclusters"
    )]
    pub min_snr: f64,

    #[arg(
        long,
        default_value_t = 10,
        help = "Minimum number of samples in a signal set or bicluster"
    )]
    pub min_n_samples: usize,

    #[arg(
        long,
        value_enum,
        value_delimiter = ',',
        default_values_t = vec![Direction::Up, Direction::Down],
        help = "Directions to report"
    )]
    pub directions: Vec<Direction>,

    #[command(flatten)]
    pub sampler: SamplerArgs,

    #[arg(long, default_value_t = false, help = "Show progress bars")]
    pub progress: bool,

    #[arg(long, default_value_t = num_cpus::get(), help = "Number of threads")]
    pub threads: usize,
}

/// Modules and biclusters of one direction, with gene indices into
/// the rows of `exprs`
fn biclusters_in_direction(
    exprs: &NamedMatrix<f64>,
    binary: &NamedMatrix<u8>,
    direction: Direction,
    args: &RunArgs,
) -> Result<Vec<Bicluster>> {
    let tag = direction.to_string().to_lowercase();

    if binary.nrows() < 2 {
        warn!("{}: only {} binarized genes, skipping", direction, binary.nrows());
        return Ok(vec![]);
    }

    write_binary_matrix(binary, &format!("{}.{}.tsv.gz", args.out, tag))?;

    let fit = fit_and_write_modules(
        binary,
        &args.sampler,
        args.progress,
        &format!("{}.{}", args.out, tag),
    )?;

    let row_of: HashMap<&str, usize> = exprs
        .row_names
        .iter()
        .enumerate()
        .map(|(i, g)| (&**g, i))
        .collect();

    let rows = binary
        .row_names
        .iter()
        .map(|g| {
            row_of
                .get(&**g)
                .copied()
                .ok_or_else(|| anyhow::anyhow!("gene {} not in the expression matrix", g))
        })
        .collect::<Result<Vec<_>>>()?;

    let sub = exprs.select_rows(&rows);

    let options = BiclusterOptions {
        min_snr: args.min_snr,
        min_n_samples: args.min_n_samples,
        direction,
        seed: args.sampler.seed,
    };
    let (mut bics, _) = extract_biclusters(sub.data.view(), &fit.membership, &options)?;

    for bic in bics.iter_mut() {
        bic.genes.iter_mut().for_each(|g| *g = rows[*g]);
    }
    Ok(bics)
}

pub fn run_pipeline(args: &RunArgs) -> Result<()> {
    set_num_threads(args.threads)?;

    let exprs = read_expression(&args.expression)?;
    info!(
        "Read {} genes x {} samples from {}",
        exprs.nrows(),
        exprs.ncols(),
        args.expression
    );

    let binarized = binarize(
        &exprs,
        &lentil::BinarizeOptions {
            min_snr: args.min_snr,
            min_n_samples: args.min_n_samples,
            seed: args.sampler.seed,
        },
    )?;

    let mut bics = vec![];
    for &direction in args.directions.iter() {
        let binary = match direction {
            Direction::Up => &binarized.up,
            Direction::Down => &binarized.down,
        };
        bics.extend(biclusters_in_direction(&exprs, binary, direction, args)?);
    }

    sort_biclusters(&mut bics);

    let records = bics
        .iter()
        .map(|b| BiclusterRecord::from_bicluster(b, &exprs.row_names, &exprs.column_names))
        .collect::<Result<Vec<_>>>()?;

    let bic_file = format!("{}.biclusters.tsv", args.out);
    write_bicluster_table(&records, &bic_file)?;
    info!("Wrote {} biclusters to {}", records.len(), bic_file);

    Ok(())
}
