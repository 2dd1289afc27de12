use thiserror::Error;

/// Result type alias for every fallible storage operation.
pub type Result<T> = std::result::Result<T, BrickError>;

/// Failures reported by the ingestion pipeline, the container format and the read side.
#[derive(Error, Debug)]
pub enum BrickError {
    /// Unsupported element type, component count or geometry. Reported before any I/O happens.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Open, read, write or seek failure on a source, temporary or target file.
    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Corrupt or inconsistent persisted data, or bricks that do not line up with the requested geometry.
    #[error("integrity error: {0}")]
    Integrity(String),
}

impl BrickError {
    pub fn configuration(message: impl Into<String>) -> Self {
        BrickError::Configuration(message.into())
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        BrickError::Integrity(message.into())
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, BrickError::Configuration(_))
    }

    pub fn is_io(&self) -> bool {
        matches!(self, BrickError::Io { .. })
    }

    pub fn is_integrity(&self) -> bool {
        matches!(self, BrickError::Integrity(_))
    }
}

// Payloads are always decoded from in-memory buffers, so even an unexpected EOF means the container is damaged.
impl From<bincode::Error> for BrickError {
    fn from(e: bincode::Error) -> Self {
        BrickError::Integrity(format!("malformed payload: {}", e))
    }
}

/// Attaches a description of the failed operation to `std::io` results.
pub trait IoContext<T> {
    fn io_context(self, context: impl FnOnce() -> String) -> Result<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn io_context(self, context: impl FnOnce() -> String) -> Result<T> {
        self.map_err(|source| BrickError::Io {
            context: context(),
            source,
        })
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
