//! A small SMTP client: enough of RFC 5321 to hand a single
//! message to a relay.
pub mod client;
pub mod client_types;
pub mod command;
pub mod traits;

pub use client::*;
pub use client_types::*;
pub use command::*;
pub use traits::*;
