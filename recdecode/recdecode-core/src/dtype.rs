use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Element types a tensor can hold.
///
/// `String` is an opaque byte string; no UTF-8 validity is implied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DType {
    Bool,
    Int32,
    Int64,
    Float32,
    Float64,
    String,
}

impl DType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::String => "string",
        }
    }

    pub fn is_integral(&self) -> bool {
        matches!(self, Self::Int32 | Self::Int64)
    }

    pub fn is_floating(&self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integral() || self.is_floating()
    }
}

impl FromStr for DType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bool" => Ok(Self::Bool),
            "int32" => Ok(Self::Int32),
            "int64" => Ok(Self::Int64),
            "float32" => Ok(Self::Float32),
            "float64" => Ok(Self::Float64),
            "string" => Ok(Self::String),
            other => Err(format!(
                "unknown dtype '{other}', expected one of: bool, int32, int64, float32, float64, string"
            )),
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
