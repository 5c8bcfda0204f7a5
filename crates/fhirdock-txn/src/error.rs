use fhirdock_storage::StorageError;

/// Errors the transaction/batch processor can surface. In a `transaction`
/// Bundle any of these aborts the whole bundle (spec.md §4.4
/// "Atomicity"); in a `batch` Bundle, [`EntryFailed`](Self::EntryFailed)
/// is caught per-entry and turned into a failed `response.status` instead
/// of propagating.
#[derive(Debug, thiserror::Error)]
pub enum TxnError {
    #[error("malformed transaction bundle: {0}")]
    MalformedBundle(String),

    #[error("entry {index}: {message}")]
    EntryFailed { index: usize, message: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl TxnError {
    pub fn malformed_entry(index: usize, message: impl Into<String>) -> Self {
        Self::EntryFailed { index, message: message.into() }
    }

    /// The entry index this error applies to, if any — used to address the
    /// right `response` slot when assembling a `batch` result.
    pub fn entry_index(&self) -> Option<usize> {
        match self {
            Self::EntryFailed { index, .. } => Some(*index),
            _ => None,
        }
    }
}
