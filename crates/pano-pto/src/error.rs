use std::path::PathBuf;

/// Errors produced while reading or writing PTO documents.
#[derive(Debug, thiserror::Error)]
pub enum PtoError {
    /// A recognised line could not be interpreted.
    #[error("line {line}: {message}")]
    Parse {
        /// 1-based line number in the source text.
        line: usize,
        /// What was wrong with the line.
        message: String,
    },

    /// An image carries an optimisation variable with no PTO spelling.
    #[error("image {image} has an unknown optimisation variable")]
    UnknownOptimisationParameter {
        /// Index of the offending image.
        image: usize,
    },

    /// Reading or writing a file failed.
    #[error("{}: {source}", path.display())]
    Io {
        /// The file being read or written.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl PtoError {
    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }
}
