//! Master path parsing
//!
//! The master names files with slash-separated absolute paths (`/site/a.bin`).
//! On the slave every such path is relative to each root, so the leading
//! slash is dropped and anything that could climb out of a root is rejected.

use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Why a master path was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// Contains `..`, a drive prefix, or a NUL byte
    InvalidPath(String),
    /// Longer than the advertised maximum
    TooLong { len: usize, max: u32 },
    /// Names the root itself where a file is required
    Empty,
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPath(path) => write!(f, "invalid path: {path}"),
            Self::TooLong { len, max } => write!(f, "path length {len} exceeds maximum {max}"),
            Self::Empty => write!(f, "path names no file"),
        }
    }
}

impl std::error::Error for PathError {}

/// Parse a master path into a root-relative path (empty for `/`)
pub fn parse_relative(path: &str, max_len: u32) -> Result<PathBuf, PathError> {
    if path.len() > max_len as usize {
        return Err(PathError::TooLong {
            len: path.len(),
            max: max_len,
        });
    }
    if path.contains('\0') {
        return Err(PathError::InvalidPath(path.to_string()));
    }

    let trimmed = path.trim_start_matches('/');
    let mut relative = PathBuf::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(PathError::InvalidPath(path.to_string()));
            }
        }
    }
    Ok(relative)
}

/// Parse a master path that must name a file or directory, not the root
pub fn parse_entry(path: &str, max_len: u32) -> Result<PathBuf, PathError> {
    let relative = parse_relative(path, max_len)?;
    if relative.as_os_str().is_empty() {
        return Err(PathError::Empty);
    }
    Ok(relative)
}

/// Render a root-relative path the way the master writes it
pub fn master_path(relative: &Path) -> String {
    let mut out = String::from("/");
    let mut first = true;
    for component in relative.components() {
        if let Component::Normal(part) = component {
            if !first {
                out.push('/');
            }
            out.push_str(&part.to_string_lossy());
            first = false;
        }
    }
    out
}
