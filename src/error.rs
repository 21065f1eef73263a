//! Error types for the image agent.

use uuid::Uuid;

/// Top-level error type for the agent.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Remote service error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Connection-credential parse/validate errors. These fail fast; no retry.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("No credential supplied and no fallback environment value exists")]
    MissingCredential,

    #[error("Unrecognized credential format: {0}")]
    InvalidFormat(String),
}

/// Errors from the remote image-generation / file-storage services.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// Network or transport failure — the call never produced a usable response.
    #[error("Remote service unavailable: {0}")]
    Unavailable(String),

    /// The service answered but refused the call or returned a malformed payload.
    #[error("Remote service rejected the call: {0}")]
    Rejected(String),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Task lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Task {id} not found")]
    NotFound { id: Uuid },

    #[error("Task {id} in state {state} cannot transition to {target}")]
    InvalidTransition {
        id: Uuid,
        state: String,
        target: String,
    },

    #[error("Image prompt must not be empty")]
    EmptyPrompt,
}

/// Result type alias for the agent.
pub type Result<T> = std::result::Result<T, Error>;
