use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

use crate::{
    format::{BatchShaper, OutputFormat},
    source::SourceArgs,
    writer::{CsvWriter, JsonlWriter, ParquetWriter, RecordBatchWriter},
};

#[derive(Args)]
pub struct ConvertArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Jsonl)]
    format: OutputFormat,

    /// Output file path (stdout if not specified)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Records per decoded batch
    #[arg(long)]
    batch_size: Option<usize>,
}

impl ConvertArgs {
    pub fn run(self) -> Result<()> {
        let source = self.source.build()?;

        let mut writer: Box<dyn RecordBatchWriter> = match self.format {
            OutputFormat::Jsonl => Box::new(JsonlWriter::new(self.output.as_deref())?),
            OutputFormat::Csv => Box::new(CsvWriter::new(self.output.as_deref())?),
            OutputFormat::Parquet => {
                let path = self
                    .output
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("Parquet output requires -o <file>"))?;
                Box::new(ParquetWriter::new(path, source.arrow_schema().ok())?)
            }
        };

        let pb = ProgressBar::new(source.files().len() as u64);
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files ({msg})",
            )?
            .progress_chars("=>-"),
        );

        let mut rows = 0;
        let mut shaper = BatchShaper::new(self.format);
        for path in source.files() {
            debug!(path = %path.display(), "converting file");
            for batch in source.decode_file(path, self.batch_size)? {
                let (batch, dropped_columns) = shaper.prepare(batch)?;
                if !dropped_columns.is_empty() {
                    pb.suspend(|| {
                        eprintln!(
                            "Warning: {:?} output skipped columns: {}",
                            self.format,
                            dropped_columns.join(", ")
                        )
                    });
                }
                rows += batch.num_rows();
                writer.write_batch(batch)?;
            }
            pb.set_message(format!("{rows} rows"));
            pb.inc(1);
        }

        writer.finish()?;
        pb.finish_with_message(format!("{rows} rows, done"));
        Ok(())
    }
}
