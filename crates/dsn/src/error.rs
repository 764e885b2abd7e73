use crate::address::TranscodeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DsnError {
    #[error("{0}")]
    Validation(&'static str),
    #[error("cannot convert {field} to a suitable representation: {source}")]
    Transcoding {
        field: String,
        #[source]
        source: TranscodeError,
    },
    #[error("failed to render notification: {0}")]
    Template(#[from] minijinja::Error),
    #[error("failed to write report: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to relay report: {0}")]
    Dispatch(#[from] rfc5321::ClientError),
}

impl DsnError {
    pub(crate) fn transcoding<F: Into<String>>(field: F) -> impl FnOnce(TranscodeError) -> Self {
        let field = field.into();
        move |source| Self::Transcoding { field, source }
    }
}

pub type Result<T> = std::result::Result<T, DsnError>;
