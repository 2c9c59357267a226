mod commands;
mod format;
mod source;
mod writer;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{convert::ConvertArgs, inspect::InspectArgs, schema::SchemaArgs};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "recdecode", about = "Decode TFRecord files into various formats")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert TFRecord files to jsonl/csv/parquet
    Convert(ConvertArgs),
    /// Print the Arrow schema records decode to
    Schema(SchemaArgs),
    /// Print the outputs of a saved decoder
    Inspect(InspectArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Convert(args) => args.run(),
        Commands::Schema(args) => args.run(),
        Commands::Inspect(args) => args.run(),
    }
}
