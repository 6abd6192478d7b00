use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConceptGraphError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Missing endpoint: {0}")]
    MissingEndpoint(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Graph error: {0}")]
    Graph(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

pub type Result<T> = std::result::Result<T, ConceptGraphError>;
