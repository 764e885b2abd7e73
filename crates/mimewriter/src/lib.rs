//! Just enough of RFC 5322 and RFC 2046 to emit mail: an ordered header
//! map that tolerates repeated field names, and a multipart body writer
//! that allocates its own boundary.
mod error;
mod header;
mod headermap;
mod multipart;

pub use error::MimeWriterError;
pub type Result<T> = std::result::Result<T, MimeWriterError>;

pub use header::Header;
pub use headermap::*;
pub use multipart::*;
