//! Batching policy for record decoding.

use crate::error::RecordIoError;

/// Batch size used when the caller does not choose one.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// How records are grouped before decoding.
///
/// An explicit batch size pins both bounds; otherwise batches hold up to
/// [`DEFAULT_BATCH_SIZE`] records. Records are grouped greedily, so only the
/// last batch may be smaller than `max_batch_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    pub min_batch_size: usize,
    pub max_batch_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            min_batch_size: 1,
            max_batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl BatchConfig {
    pub fn from_batch_size(batch_size: Option<usize>) -> Result<Self, RecordIoError> {
        match batch_size {
            None => Ok(Self::default()),
            Some(0) => Err(RecordIoError::InvalidBatchSize),
            Some(size) => Ok(Self {
                min_batch_size: size,
                max_batch_size: size,
            }),
        }
    }
}

/// Group `items` into batches of at most `config.max_batch_size`, in order.
pub fn batch_elements<'a, T>(items: &'a [T], config: &BatchConfig) -> Vec<&'a [T]> {
    items.chunks(config.max_batch_size.max(1)).collect()
}
