mod run_binarize;
mod run_modules;
mod run_pipeline;

use run_binarize::*;
use run_modules::*;
use run_pipeline::*;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "lentil")]
#[command(about = "Co-regulated gene modules and biclusters from binarized expression")]
struct Cli {
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Binarize expression rows into UP and DOWN sample sets
    Binarize(BinarizeArgs),
    /// Sample gene modules of a binary gene x sample matrix
    Modules(ModulesArgs),
    /// Binarize, sample modules and extract biclusters in both directions
    Run(RunArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    match &cli.commands {
        Commands::Binarize(args) => {
            run_binarize(args)?;
        }
        Commands::Modules(args) => {
            run_modules(args)?;
        }
        Commands::Run(args) => {
            run_pipeline(args)?;
        }
    }

    Ok(())
}
