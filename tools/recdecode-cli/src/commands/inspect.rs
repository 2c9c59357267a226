use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use recdecode::core::{RecordDecoder, format_type_specs, load_decoder};

#[derive(Args)]
pub struct InspectArgs {
    /// Saved decoder directory
    decoder: PathBuf,
}

impl InspectArgs {
    pub fn run(self) -> Result<()> {
        let decoder = load_decoder(&self.decoder)
            .with_context(|| format!("failed to load decoder from {}", self.decoder.display()))?;
        println!("{}", format_type_specs(decoder.output_type_specs()?)?);
        match decoder.record_index_tensor_name() {
            Some(name) => println!("record index: {name}"),
            None => println!("record index: (none)"),
        }
        Ok(())
    }
}
