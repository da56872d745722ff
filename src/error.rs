//! The crate's single error taxonomy.
//!
//! Every request-shaped operation resolves to `Result<T, SyncError>` and
//! never panics for a remote or reconciliation failure; only programming
//! errors (a reducer panicking, an invalid action type) propagate as Rust
//! panics, per spec's propagation policy.

/// Errors surfaced by the runtime.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SyncError {
    #[error("request timed out waiting for an acknowledgement")]
    RequestTimeout,

    #[error("checksum mismatch during reconciliation")]
    ChecksumMismatch,

    #[error("invalid resource identifier: {0}")]
    InvalidResourceIdentifier(String),

    #[error("state could not be serialized for checksumming: {0}")]
    StateNotSerializable(String),

    #[error("operation attempted on an already-destroyed resource")]
    AlreadyDestroyed,

    #[error("transport error: {0}")]
    Transport(String),

    /// A remote ack arrived with `{ok: false, val}`; `val` is carried here
    /// as its rendered form. The wrapper never treats this as a local
    /// failure (no panic, no retry) — it is handed to the caller verbatim.
    #[error("remote error: {0}")]
    Remote(String),
}
