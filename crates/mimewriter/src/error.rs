use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum MimeWriterError {
    #[error("invalid header: {0}")]
    HeaderParse(String),
}
