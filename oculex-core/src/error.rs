use thiserror::Error;

/// Failures surfaced by the result store.
///
/// Every store operation catches these at its boundary and reports them to
/// the caller; none of them abort the hosting process.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
