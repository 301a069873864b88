//! File operations on the roots
//!
//! This module handles everything a command does to stored files:
//! - Master path parsing with traversal checks
//! - Delete, rename, and CRC32 across every root
//! - SFV and ID3v1 metadata reads

mod id3;
mod operations;
mod path;
mod sfv;

use std::io;
use std::path::Path;

use silo_common::ErrorKind;
use thiserror::Error;

use crate::constants::{ERR_NO_ID3_TAG, ERR_PATH_EXISTS, ERR_PATH_NOT_FOUND};

pub use id3::{parse_id3, read_id3};
pub use operations::{checksum, crc32_file, delete, prune_empty_parents, remove_path, rename};
pub use path::{PathError, master_path, parse_entry, parse_relative};
pub use sfv::{parse_sfv, read_sfv};

/// File operation failures
#[derive(Debug, Error)]
pub enum FileError {
    #[error(transparent)]
    Path(#[from] PathError),

    #[error("{0}{suffix}", suffix = ERR_PATH_NOT_FOUND)]
    NotFound(String),

    #[error("{0}{suffix}", suffix = ERR_PATH_EXISTS)]
    Exists(String),

    #[error("permission denied: {path}: {source}")]
    Permission {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("{prefix}{0}", prefix = ERR_NO_ID3_TAG)]
    NoId3Tag(String),
}

impl FileError {
    /// Classify an OS error on `path`
    pub fn from_io(path: &Path, source: io::Error) -> Self {
        let path = path.display().to_string();
        match source.kind() {
            io::ErrorKind::PermissionDenied => Self::Permission { path, source },
            io::ErrorKind::NotFound => Self::NotFound(path),
            io::ErrorKind::AlreadyExists => Self::Exists(path),
            _ => Self::Io { path, source },
        }
    }

    /// Error kind reported to the master
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Path(_) => ErrorKind::Invalid,
            Self::NotFound(_) | Self::NoId3Tag(_) => ErrorKind::NotFound,
            Self::Exists(_) => ErrorKind::Exists,
            Self::Permission { .. } => ErrorKind::Permission,
            Self::Io { .. } => ErrorKind::IoError,
        }
    }
}
