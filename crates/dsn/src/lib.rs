//! Generation of RFC 3464/3462 delivery status notifications.
//!
//! A report is a `multipart/report` message made of a human-readable
//! notice, a machine-readable `message/delivery-status` part and the
//! header of the message that could not be delivered. Addresses and
//! domains are rendered either in their ASCII compatible (A-label)
//! form or, for internationalized reports, in NFC normalized Unicode.
//!
//! `generate_dsn` writes the report body to any `std::io::Write` and
//! returns the top level header; `send_dsn` additionally hands the
//! report to an SMTP relay.
pub mod address;
mod error;
pub mod fields;
mod relay;
mod report;
pub mod template;
mod types;

pub use address::{
    domain_to_ace, domain_to_unicode, select_domain_encoding, select_encoding, split, to_ace,
    to_unicode, AddressError, TranscodeError,
};
pub use error::{DsnError, Result};
pub use mimewriter::{Header, HeaderMap};
pub use relay::{send_dsn, RelayDispatcher, RelayOptions, MAILER_DAEMON};
pub use report::{generate_dsn, ReportAssembler, SUBJECT};
pub use rfc5321::SmtpClientTimeouts;
pub use types::*;
