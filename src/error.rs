use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// The three fatal error families of the pipeline. Each stage produces at
/// most one error and nothing downstream of a failed stage runs.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Lexical error: {message} at line {line}")]
    Lexical { message: String, line: usize },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Code generation error: {0}")]
    Codegen(String),
}

impl Error {
    pub(crate) fn lexical(message: impl Into<String>, line: usize) -> Error {
        Error::Lexical {
            message: message.into(),
            line,
        }
    }

    pub(crate) fn parse(message: impl Into<String>) -> Error {
        Error::Parse(message.into())
    }

    pub(crate) fn codegen(message: impl Into<String>) -> Error {
        Error::Codegen(message.into())
    }

    /// The source line the error occurred on, when the stage tracks lines.
    pub fn line(&self) -> Option<usize> {
        match self {
            Error::Lexical { line, .. } => Some(*line),
            _ => None,
        }
    }
}
