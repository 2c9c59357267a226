use std::{fmt::Write, fs, path::PathBuf};

use anyhow::Result;
use arrow::datatypes::Schema;
use clap::Args;

use crate::source::SourceArgs;

#[derive(Args)]
pub struct SchemaArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Output file path (stdout if not specified)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl SchemaArgs {
    pub fn run(self) -> Result<()> {
        let schema = self.source.build()?.arrow_schema()?;
        let text = format_arrow_schema(&schema)?;

        match self.output {
            Some(path) => fs::write(path, format!("{text}\n"))?,
            None => println!("{text}"),
        }
        Ok(())
    }
}

/// One `name: type` line per column, with `?` marking nullable columns.
fn format_arrow_schema(schema: &Schema) -> Result<String> {
    let mut text = String::new();
    for (i, field) in schema.fields().iter().enumerate() {
        if i > 0 {
            text.push('\n');
        }
        let nullable = if field.is_nullable() { "?" } else { "" };
        write!(text, "{}{nullable}: {}", field.name(), field.data_type())?;
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use arrow::datatypes::{DataType, Field};

    use super::*;

    #[test]
    fn one_line_per_field() {
        let schema = Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("raw", DataType::Binary, true),
        ]);
        assert_eq!(
            format_arrow_schema(&schema).unwrap(),
            "id: Int64\nraw?: Binary"
        );
    }
}
