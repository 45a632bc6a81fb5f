use thiserror::Error;

use crate::chatty::database::DatabaseError;

pub type Result<T> = core::result::Result<T, ChattyError>;

#[derive(Error, Debug)]
pub enum ChattyError {
    #[error("Filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Group not found")]
    GroupNotFound,

    #[error("User not found")]
    UserNotFound,

    #[error("Message not found")]
    MessageNotFound,

    #[error("You are not a member of this group")]
    NotGroupMember,

    #[error("Only the group admin can perform this action")]
    NotGroupAdmin,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<Box<dyn std::error::Error + Send + Sync>> for ChattyError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        ChattyError::Other(anyhow::anyhow!(err.to_string()))
    }
}
