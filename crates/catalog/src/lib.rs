pub mod fingerprint;
pub mod scan;
pub mod store;

pub use fingerprint::{fingerprint, Fingerprint};
pub use scan::{scan, ScanOptions, ScanSummary};
pub use store::CatalogStore;

use redb::{CommitError, DatabaseError, StorageError, TableError, TransactionError};

/// Store-level failures are fatal to the run; per-file failures are not and
/// never surface through this type.
#[derive(Debug)]
pub enum CatalogError {
    Io(std::io::Error),
    Redb(redb::Error),
    Bincode(Box<bincode::ErrorKind>),
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::Io(err) => write!(f, "io error: {}", err),
            CatalogError::Redb(err) => write!(f, "catalog error: {}", err),
            CatalogError::Bincode(err) => write!(f, "catalog encoding error: {}", err),
        }
    }
}

impl std::error::Error for CatalogError {}

impl From<std::io::Error> for CatalogError {
    fn from(err: std::io::Error) -> Self {
        CatalogError::Io(err)
    }
}

impl From<redb::Error> for CatalogError {
    fn from(err: redb::Error) -> Self {
        CatalogError::Redb(err)
    }
}

impl From<DatabaseError> for CatalogError {
    fn from(err: DatabaseError) -> Self {
        CatalogError::Redb(err.into())
    }
}

impl From<TableError> for CatalogError {
    fn from(err: TableError) -> Self {
        CatalogError::Redb(err.into())
    }
}

impl From<TransactionError> for CatalogError {
    fn from(err: TransactionError) -> Self {
        CatalogError::Redb(err.into())
    }
}

impl From<StorageError> for CatalogError {
    fn from(err: StorageError) -> Self {
        CatalogError::Redb(err.into())
    }
}

impl From<CommitError> for CatalogError {
    fn from(err: CommitError) -> Self {
        CatalogError::Redb(err.into())
    }
}

impl From<Box<bincode::ErrorKind>> for CatalogError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        CatalogError::Bincode(err)
    }
}
