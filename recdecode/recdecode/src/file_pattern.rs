//! File pattern resolution.
//!
//! Patterns may use `*` (any run of characters) and `?` (any single character)
//! in the final path component only, e.g. `data/train-*.tfrecord`.

use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::error::RecordIoError;

/// Files matching `pattern`, sorted by path.
///
/// With `validate`, a pattern that matches nothing is an error; otherwise it
/// resolves to an empty list.
pub fn resolve(pattern: &str, validate: bool) -> Result<Vec<PathBuf>, RecordIoError> {
    let path = Path::new(pattern);
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| RecordIoError::InvalidPattern {
            pattern: pattern.to_string(),
            detail: "pattern must end in a file name".to_string(),
        })?;
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    if has_wildcard(&dir.to_string_lossy()) {
        return Err(RecordIoError::InvalidPattern {
            pattern: pattern.to_string(),
            detail: "wildcards are only supported in the file name".to_string(),
        });
    }

    let mut files = if has_wildcard(file_name) {
        match_dir(dir, file_name, validate)?
    } else if path.is_file() {
        vec![path.to_path_buf()]
    } else {
        Vec::new()
    };
    if validate && files.is_empty() {
        return Err(RecordIoError::NoMatchingFiles {
            pattern: pattern.to_string(),
        });
    }
    files.sort();
    Ok(files)
}

fn match_dir(dir: &Path, file_pattern: &str, validate: bool) -> Result<Vec<PathBuf>, RecordIoError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) if !validate => return Ok(Vec::new()),
        Err(source) => {
            return Err(RecordIoError::Io {
                path: dir.to_path_buf(),
                source,
            });
        }
    };
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| RecordIoError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if wildcard_match(file_pattern.as_bytes(), name.as_bytes()) && entry.path().is_file() {
            files.push(entry.path());
        }
    }
    Ok(files)
}

fn has_wildcard(s: &str) -> bool {
    s.contains(['*', '?'])
}

/// Glob match with `*` and `?`, backtracking only to the last `*`.
fn wildcard_match(pattern: &[u8], name: &[u8]) -> bool {
    let (mut p, mut n) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while n < name.len() {
        match pattern.get(p) {
            Some(b'*') => {
                star = Some((p, n));
                p += 1;
            }
            Some(&c) if c == b'?' || c == name[n] => {
                p += 1;
                n += 1;
            }
            _ => match star {
                Some((sp, sn)) => {
                    p = sp + 1;
                    n = sn + 1;
                    star = Some((sp, sn + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == b'*')
}
