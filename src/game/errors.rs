use thiserror::Error;

/// Errors raised by the reward, progression, quest and storage layers.
///
/// User mistakes (asking to open 0 boxes, not enough coins) are not errors: command
/// handlers turn those into reply lines. Everything here aborts the operation.
#[derive(Debug, Error)]
pub enum GameError {
    /// Wrapper around sled's error type.
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    /// Wrapper around bincode serialization and deserialization errors.
    #[error("serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// Wrapper around JSON errors (species catalog files).
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Wrapper around IO errors (directory creation, catalog reads).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Returned when fetching a record that is not present.
    #[error("record not found: {0}")]
    NotFound(String),

    /// Returned when deserializing a record with an unexpected schema version.
    #[error("schema mismatch for {entity}: expected {expected}, got {found}")]
    SchemaMismatch {
        entity: &'static str,
        expected: u8,
        found: u8,
    },

    /// Malformed reward table, species data, curve or template pool.
    #[error("configuration error: {0}")]
    Config(String),

    /// Caller passed a value the operation can never accept.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Not enough currency or boxes for the requested operation.
    #[error("insufficient balance: {0}")]
    InsufficientBalance(String),

    /// A direct message could not be delivered.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// Internal error (task join errors, unexpected conditions)
    #[error("internal error: {0}")]
    Internal(String),
}
