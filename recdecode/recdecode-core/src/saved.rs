//! Saving and loading decoders.
//!
//! A saved decoder is a directory holding `saved_module.json`:
//!
//! ```json
//! {
//!   "format_version": 1,
//!   "functions": {
//!     "decode_fun": { ... },
//!     "record_index_tensor_name_fun": { ... }
//!   }
//! }
//! ```
//!
//! `decode_fun` is always present. `record_index_tensor_name_fun` is a
//! zero-argument function returning the record index tensor name as a string
//! constant, present only when the decoder declares one.

use std::{collections::BTreeMap, fs, path::Path};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    decoder::{RecordDecoder, dict_output_specs},
    error::{DecoderError, LoadError, SaveError},
    execution::{ExecutionMode, with_execution_mode},
    function::{ConcreteFunction, Structured},
    spec::TypeSpecs,
    tensor::{DenseTensor, Tensor, TensorData},
};

pub const SAVED_MODULE_FILE: &str = "saved_module.json";
pub const DECODE_FUN: &str = "decode_fun";
pub const RECORD_INDEX_TENSOR_NAME_FUN: &str = "record_index_tensor_name_fun";
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct SavedModule {
    format_version: u32,
    functions: BTreeMap<String, ConcreteFunction>,
}

/// Save `decoder` into the directory `path`, creating it if needed.
///
/// The record index declaration is checked before anything is written.
pub fn save_decoder(decoder: &dyn RecordDecoder, path: impl AsRef<Path>) -> Result<(), SaveError> {
    let path = path.as_ref();
    let mut functions = BTreeMap::new();
    functions.insert(
        DECODE_FUN.to_string(),
        decoder.concrete_decode_function()?.clone(),
    );

    if let Some(name) = decoder.record_index_tensor_name() {
        check_record_index(name, decoder.output_type_specs()?)?;
        let name_fun = ConcreteFunction::trace(RECORD_INDEX_TENSOR_NAME_FUN, &[], |tracer, _| {
            Ok(Structured::Tensor(
                tracer.constant(DenseTensor::scalar_string(name))?,
            ))
        })
        .map_err(DecoderError::from)?;
        functions.insert(RECORD_INDEX_TENSOR_NAME_FUN.to_string(), name_fun);
    }

    let module = SavedModule {
        format_version: FORMAT_VERSION,
        functions,
    };
    let bytes = serde_json::to_vec_pretty(&module)?;

    let io_error = |path: &Path| {
        let path = path.to_path_buf();
        move |source| SaveError::Io { path, source }
    };
    fs::create_dir_all(path).map_err(io_error(path))?;
    let target = path.join(SAVED_MODULE_FILE);
    let staging = path.join(format!("{SAVED_MODULE_FILE}.tmp"));
    fs::write(&staging, &bytes).map_err(io_error(&staging))?;
    fs::rename(&staging, &target).map_err(io_error(&target))?;

    info!(
        path = %path.display(),
        bytes = bytes.len(),
        record_index = decoder.record_index_tensor_name(),
        "saved decoder"
    );
    Ok(())
}

fn check_record_index(name: &str, specs: &TypeSpecs) -> Result<(), SaveError> {
    if name.is_empty() {
        return Err(SaveError::EmptyRecordIndexName);
    }
    let spec = specs
        .get(name)
        .ok_or_else(|| SaveError::RecordIndexNotInOutputs {
            name: name.to_string(),
            available: specs.keys().cloned().collect(),
        })?;
    if !spec.is_record_index_compatible() {
        return Err(SaveError::RecordIndexSpec {
            name: name.to_string(),
            spec: spec.clone(),
        });
    }
    Ok(())
}

/// Options for [`load_decoder_with_options`].
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Re-run shape inference over every loaded graph. Default: `true`.
    ///
    /// Node references are checked either way.
    pub validate: bool,
    /// Mode used to evaluate the record index name function. `None` (the
    /// default) uses the ambient mode of the calling thread.
    pub execution_mode: Option<ExecutionMode>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            validate: true,
            execution_mode: None,
        }
    }
}

impl LoadOptions {
    pub fn with_validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    pub fn with_execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = Some(mode);
        self
    }
}

pub fn load_decoder(path: impl AsRef<Path>) -> Result<LoadedDecoder, LoadError> {
    load_decoder_with_options(path, LoadOptions::default())
}

pub fn load_decoder_with_options(
    path: impl AsRef<Path>,
    options: LoadOptions,
) -> Result<LoadedDecoder, LoadError> {
    let path = path.as_ref();
    let file = path.join(SAVED_MODULE_FILE);
    let bytes = fs::read(&file).map_err(|source| LoadError::Io {
        path: file.clone(),
        source,
    })?;
    let mut module: SavedModule =
        serde_json::from_slice(&bytes).map_err(|source| LoadError::Deserialize {
            path: file.clone(),
            source,
        })?;
    if module.format_version != FORMAT_VERSION {
        return Err(LoadError::UnsupportedVersion {
            found: module.format_version,
            supported: FORMAT_VERSION,
        });
    }

    for (name, function) in &module.functions {
        let checked = if options.validate {
            function.validate()
        } else {
            function.check_structure()
        };
        checked.map_err(|source| LoadError::InvalidFunction {
            function: name.clone(),
            source,
        })?;
    }

    let decode_fun = module
        .functions
        .remove(DECODE_FUN)
        .ok_or_else(|| LoadError::NotADecoder {
            path: path.to_path_buf(),
            slot: DECODE_FUN,
        })?;
    let output_type_specs = dict_output_specs(&decode_fun)?;

    let record_index_tensor_name = match module.functions.remove(RECORD_INDEX_TENSOR_NAME_FUN) {
        Some(name_fun) => Some(eval_record_index_name(&name_fun, options.execution_mode)?),
        None => None,
    };

    info!(
        path = %path.display(),
        outputs = output_type_specs.len(),
        record_index = record_index_tensor_name.as_deref(),
        "loaded decoder"
    );
    Ok(LoadedDecoder {
        decode_fun,
        output_type_specs,
        record_index_tensor_name,
    })
}

fn eval_record_index_name(
    function: &ConcreteFunction,
    mode: Option<ExecutionMode>,
) -> Result<String, LoadError> {
    let call = || function.call(&[]);
    let output = match mode {
        Some(mode) => with_execution_mode(mode, call),
        None => call(),
    }
    .map_err(DecoderError::from)?;
    debug!(mode = ?mode, "evaluated record index name function");

    let bytes = match &output {
        Structured::Tensor(Tensor::Dense(t)) if t.rank() == 0 => match t.data() {
            TensorData::String(values) => values.first(),
            _ => None,
        },
        _ => None,
    }
    .ok_or_else(|| LoadError::RecordIndexName("expected a scalar string".to_string()))?;
    String::from_utf8(bytes.to_vec()).map_err(|e| LoadError::RecordIndexName(e.to_string()))
}

/// A decoder restored from a saved artifact.
///
/// Output specs and the record index name are read once at load time.
#[derive(Debug, Clone)]
pub struct LoadedDecoder {
    decode_fun: ConcreteFunction,
    output_type_specs: TypeSpecs,
    record_index_tensor_name: Option<String>,
}

impl RecordDecoder for LoadedDecoder {
    fn concrete_decode_function(&self) -> Result<&ConcreteFunction, DecoderError> {
        Ok(&self.decode_fun)
    }

    fn output_type_specs(&self) -> Result<&TypeSpecs, DecoderError> {
        Ok(&self.output_type_specs)
    }

    fn record_index_tensor_name(&self) -> Option<&str> {
        self.record_index_tensor_name.as_deref()
    }
}
