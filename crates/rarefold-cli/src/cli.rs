use super::commands;
use clap::{Parser, Subcommand};
use rarefold_config::ModelVariant;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log every pipeline step
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the model variants
    Variants,
    /// Print a variant's resolved config as JSON
    Config {
        #[arg(short, long)]
        model: ModelVariant,
    },
    /// Prepare model input features from a JSON record
    Featurize {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        model: ModelVariant,
        #[arg(short, long, default_value_t = 0)]
        seed: u64,
        #[arg(short, long)]
        output: PathBuf,
        /// Go through the array path and drop the batch axis
        #[arg(long)]
        unbatched: bool,
    },
}

impl Cli {
    pub fn execute(self) -> anyhow::Result<()> {
        match self.command {
            Commands::Variants => commands::variants::execute(),
            Commands::Config { model } => commands::config::execute(model),
            Commands::Featurize {
                input,
                model,
                seed,
                output,
                unbatched,
            } => commands::featurize::execute(input, model, seed, output, unbatched),
        }
    }
}
