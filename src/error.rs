use thiserror::Error;

#[derive(Error, Debug)]
pub enum OneShotError {
    #[error("Failed to prepare a dedicated agent: {0}")]
    Provisioning(String),

    #[error("Agent launch failed: {0}")]
    Launch(String),

    #[error("Failed to deregister node {name}: {reason}")]
    Deregistration { name: String, reason: String },

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Node already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, OneShotError>;
