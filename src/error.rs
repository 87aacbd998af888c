use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Failure kinds surfaced by the chapter pipeline.
///
/// Every variant except `InvalidArgument` aborts the whole `process`/`extract`
/// call it occurred in. `chunk_index` is set by the block processor so a caller
/// can resume from its block cache instead of starting over.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("llm invocation failed{}: {source:#}", chunk_suffix(.chunk_index))]
    LlmInvocation {
        chunk_index: Option<usize>,
        #[source]
        source: anyhow::Error,
    },

    #[error("malformed llm response{}: {source}", chunk_suffix(.chunk_index))]
    MalformedResponse {
        chunk_index: Option<usize>,
        #[source]
        source: serde_json::Error,
    },

    #[error("llm response schema violation{}: {message}", chunk_suffix(.chunk_index))]
    SchemaViolation {
        chunk_index: Option<usize>,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    LlmInvocation,
    MalformedResponse,
    SchemaViolation,
}

impl PipelineError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn llm(source: anyhow::Error) -> Self {
        Self::LlmInvocation {
            chunk_index: None,
            source,
        }
    }

    pub fn malformed(source: serde_json::Error) -> Self {
        Self::MalformedResponse {
            chunk_index: None,
            source,
        }
    }

    pub fn schema(message: impl Into<String>) -> Self {
        Self::SchemaViolation {
            chunk_index: None,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::LlmInvocation { .. } => ErrorKind::LlmInvocation,
            Self::MalformedResponse { .. } => ErrorKind::MalformedResponse,
            Self::SchemaViolation { .. } => ErrorKind::SchemaViolation,
        }
    }

    pub fn chunk_index(&self) -> Option<usize> {
        match self {
            Self::InvalidArgument { .. } => None,
            Self::LlmInvocation { chunk_index, .. }
            | Self::MalformedResponse { chunk_index, .. }
            | Self::SchemaViolation { chunk_index, .. } => *chunk_index,
        }
    }

    /// Tags the error with the block it came from. Argument errors carry no block.
    pub fn at_chunk(mut self, index: usize) -> Self {
        match &mut self {
            Self::InvalidArgument { .. } => {}
            Self::LlmInvocation { chunk_index, .. }
            | Self::MalformedResponse { chunk_index, .. }
            | Self::SchemaViolation { chunk_index, .. } => *chunk_index = Some(index),
        }
        self
    }
}

fn chunk_suffix(chunk_index: &Option<usize>) -> String {
    match chunk_index {
        Some(index) => format!(" (chunk {index})"),
        None => String::new(),
    }
}
