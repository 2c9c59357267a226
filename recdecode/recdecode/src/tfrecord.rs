//! Uncompressed TFRecord files.
//!
//! Each record is framed as
//!
//! ```text
//! u64 length (LE) | u32 masked_crc32c(length) | data | u32 masked_crc32c(data)
//! ```

use std::{
    fs,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use memmap2::Mmap;

use crate::error::RecordIoError;

const HEADER_LEN: usize = 12;
const FOOTER_LEN: usize = 4;
const MASK_DELTA: u32 = 0xa282_ead8;

const CRC32C_TABLE: [u32; 256] = crc32c_table();

const fn crc32c_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ 0x82f6_3b78
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// CRC-32C (Castagnoli).
pub fn crc32c(data: &[u8]) -> u32 {
    !data.iter().fold(!0u32, |crc, &byte| {
        CRC32C_TABLE[((crc ^ byte as u32) & 0xff) as usize] ^ (crc >> 8)
    })
}

/// The checksum TFRecord stores: CRC-32C rotated and offset so that
/// checksums of checksums stay well distributed.
pub fn masked_crc32c(data: &[u8]) -> u32 {
    crc32c(data).rotate_right(15).wrapping_add(MASK_DELTA)
}

/// A memory-mapped TFRecord file.
pub struct TfRecordFile {
    path: PathBuf,
    mmap: Option<Mmap>,
}

impl TfRecordFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RecordIoError> {
        let path = path.as_ref().to_path_buf();
        let io_err = |source| RecordIoError::Io {
            path: path.clone(),
            source,
        };
        let file = fs::File::open(&path).map_err(io_err)?;
        // Zero-length files cannot be mapped.
        let mmap = if file.metadata().map_err(io_err)?.len() == 0 {
            None
        } else {
            Some(unsafe { Mmap::map(&file) }.map_err(io_err)?)
        };
        Ok(Self { path, mmap })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Iterate over record payloads, verifying both checksums of every record.
    ///
    /// Iteration stops after the first error.
    pub fn records(&self) -> TfRecordIter<'_> {
        TfRecordIter {
            path: &self.path,
            data: self.mmap.as_deref().unwrap_or_default(),
            offset: 0,
            failed: false,
        }
    }
}

pub struct TfRecordIter<'a> {
    path: &'a Path,
    data: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> TfRecordIter<'a> {
    fn read_record(&mut self) -> Result<&'a [u8], RecordIoError> {
        let start = self.offset;
        let truncated = || RecordIoError::Truncated {
            path: self.path.to_path_buf(),
            offset: start,
        };
        let checksum = |part| RecordIoError::Checksum {
            path: self.path.to_path_buf(),
            offset: start,
            part,
        };

        let header = self.data.get(start..start + HEADER_LEN).ok_or_else(truncated)?;
        let (len_bytes, len_crc) = header.split_at(8);
        if masked_crc32c(len_bytes) != read_u32(len_crc) {
            return Err(checksum("length"));
        }
        let len = usize::try_from(u64::from_le_bytes(len_bytes.try_into().unwrap_or_default()))
            .map_err(|_| truncated())?;

        let data_start = start + HEADER_LEN;
        let data_end = data_start.checked_add(len).ok_or_else(truncated)?;
        let data = self.data.get(data_start..data_end).ok_or_else(truncated)?;
        let data_crc = self
            .data
            .get(data_end..data_end + FOOTER_LEN)
            .ok_or_else(truncated)?;
        if masked_crc32c(data) != read_u32(data_crc) {
            return Err(checksum("data"));
        }
        self.offset = data_end + FOOTER_LEN;
        Ok(data)
    }
}

impl<'a> Iterator for TfRecordIter<'a> {
    type Item = Result<&'a [u8], RecordIoError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.data.len() {
            return None;
        }
        let record = self.read_record();
        self.failed = record.is_err();
        Some(record)
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes(bytes.try_into().unwrap_or_default())
}

/// Read every record of one file into memory.
pub fn read_tfrecords(path: impl AsRef<Path>) -> Result<Vec<Vec<u8>>, RecordIoError> {
    read_tfrecord_files(&[path])
}

/// Read every record of `paths`, file by file.
pub fn read_tfrecord_files<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<Vec<u8>>, RecordIoError> {
    let mut records = Vec::new();
    for path in paths {
        let file = TfRecordFile::open(path)?;
        for record in file.records() {
            records.push(record?.to_vec());
        }
    }
    Ok(records)
}

/// Write `records` to a new TFRecord file at `path`.
pub fn write_tfrecords<B: AsRef<[u8]>>(
    path: impl AsRef<Path>,
    records: &[B],
) -> Result<(), RecordIoError> {
    let path = path.as_ref();
    let io_err = |source| RecordIoError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut out = BufWriter::new(fs::File::create(path).map_err(io_err)?);
    for record in records {
        let data = record.as_ref();
        let len = (data.len() as u64).to_le_bytes();
        out.write_all(&len).map_err(io_err)?;
        out.write_all(&masked_crc32c(&len).to_le_bytes()).map_err(io_err)?;
        out.write_all(data).map_err(io_err)?;
        out.write_all(&masked_crc32c(data).to_le_bytes()).map_err(io_err)?;
    }
    out.flush().map_err(io_err)
}
