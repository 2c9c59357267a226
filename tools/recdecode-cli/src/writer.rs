use std::{
    fs,
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{Result, bail};
use arrow::{datatypes::SchemaRef, record_batch::RecordBatch};
use parquet::{arrow::ArrowWriter, file::properties::WriterProperties};

pub trait RecordBatchWriter {
    fn write_batch(&mut self, batch: RecordBatch) -> Result<()>;
    fn finish(&mut self) -> Result<()>;
}

fn destination(output: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match output {
        Some(path) => Box::new(BufWriter::new(fs::File::create(path)?)),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    })
}

// --- JSON Lines ---

pub struct JsonlWriter {
    dest: Box<dyn Write>,
    flush_each_batch: bool,
}

impl JsonlWriter {
    pub fn new(output: Option<&Path>) -> Result<Self> {
        Ok(Self {
            dest: destination(output)?,
            flush_each_batch: output.is_none(),
        })
    }
}

impl RecordBatchWriter for JsonlWriter {
    fn write_batch(&mut self, batch: RecordBatch) -> Result<()> {
        let mut json_writer = arrow::json::LineDelimitedWriter::new(Vec::new());
        json_writer.write(&batch)?;
        json_writer.finish()?;
        self.dest.write_all(&json_writer.into_inner())?;
        if self.flush_each_batch {
            self.dest.flush()?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.dest.flush()?;
        Ok(())
    }
}

// --- CSV ---

pub struct CsvWriter {
    dest: Box<dyn Write>,
    header_written: bool,
    flush_each_batch: bool,
}

impl CsvWriter {
    pub fn new(output: Option<&Path>) -> Result<Self> {
        Ok(Self {
            dest: destination(output)?,
            header_written: false,
            flush_each_batch: output.is_none(),
        })
    }
}

impl RecordBatchWriter for CsvWriter {
    fn write_batch(&mut self, batch: RecordBatch) -> Result<()> {
        let mut csv_writer = arrow::csv::WriterBuilder::new()
            .with_header(!self.header_written)
            .build(&mut self.dest);
        csv_writer.write(&batch)?;
        drop(csv_writer);
        self.header_written = true;
        if self.flush_each_batch {
            self.dest.flush()?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.dest.flush()?;
        Ok(())
    }
}

// --- Parquet ---

pub struct ParquetWriter {
    output_path: PathBuf,
    inner: Option<ArrowWriter<fs::File>>,
}

impl ParquetWriter {
    /// The file is created up front so that inputs without records still
    /// produce a readable file with `schema`.
    pub fn new(output: &Path, schema: Option<SchemaRef>) -> Result<Self> {
        let inner = match schema {
            Some(schema) => Some(Self::open(output, schema)?),
            None => None,
        };
        Ok(Self {
            output_path: output.to_path_buf(),
            inner,
        })
    }

    fn open(path: &Path, schema: SchemaRef) -> Result<ArrowWriter<fs::File>> {
        let file = fs::File::create(path)?;
        let props = WriterProperties::builder().build();
        Ok(ArrowWriter::try_new(file, schema, Some(props))?)
    }
}

impl RecordBatchWriter for ParquetWriter {
    fn write_batch(&mut self, batch: RecordBatch) -> Result<()> {
        let writer = match self.inner.take() {
            Some(writer) => writer,
            None => Self::open(&self.output_path, batch.schema())?,
        };
        self.inner.insert(writer).write(&batch)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let Some(writer) = self.inner.take() else {
            bail!("No records found and no schema to write an empty file with");
        };
        writer.close()?;
        eprintln!("Written to {}", self.output_path.display());
        Ok(())
    }
}
