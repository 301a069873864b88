//! Storage roots
//!
//! A slave spreads its files over one or more independent roots (usually one
//! per physical disk). The same relative path may exist in several roots at
//! once; listings merge them and lookups report every holder.

mod collection;
mod root;
mod selection;

use std::io;
use std::path::PathBuf;

use silo_common::ErrorKind;
use thiserror::Error;

pub use collection::{DirListing, RootCollection, RootLister, RootListing, RootOptions, list_root};
pub use root::{Root, system_time_millis};
pub use selection::{
    Candidate, DiskSelection, ExistingDir, MostFree, SelectionFactory, SelectionRegistry,
};

/// Root construction, validation, and placement failures
#[derive(Debug, Error)]
pub enum RootError {
    #[error("root {path} cannot be resolved: {source}")]
    Unresolvable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("root {0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("overlapping roots: {first} and {second}")]
    Overlap { first: PathBuf, second: PathBuf },

    #[error("roots {first} and {second} are on the same filesystem")]
    SharedMount { first: PathBuf, second: PathBuf },

    #[error("no roots configured")]
    Empty,

    #[error("unknown disk selection strategy '{0}'")]
    UnknownStrategy(String),

    #[error("no root available for {0}")]
    NoAvailableRoot(String),

    #[error("{0} does not exist on any root")]
    NotFound(String),
}

impl RootError {
    /// Error kind reported to the master
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoAvailableRoot(_) => ErrorKind::NoAvailableRoot,
            Self::NotFound(_) => ErrorKind::NotFound,
            _ => ErrorKind::Internal,
        }
    }
}
