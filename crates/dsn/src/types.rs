use chrono::{DateTime, Utc};
pub use rfc5321::EnhancedStatusCode as StatusCode;
use rfc5321::Response;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifies the report message itself, not the message that
/// could not be delivered
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub message_id: String,
    pub from: String,
    pub to: String,
}

/// Selects the representation used throughout a single report.
/// `Ascii` produces A-label domains and the `rfc822`/`dns` address
/// types; `Utf8` produces NFC normalized U-labels and the `utf8`
/// address type along with the `message/global-*` part types.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingMode {
    #[default]
    Ascii,
    Utf8,
}

impl EncodingMode {
    pub fn from_utf8(utf8: bool) -> Self {
        if utf8 {
            Self::Utf8
        } else {
            Self::Ascii
        }
    }

    pub fn is_utf8(self) -> bool {
        self == Self::Utf8
    }

    /// The address-type used in Final-Recipient and the sender field
    pub(crate) fn address_type(self) -> &'static str {
        match self {
            Self::Ascii => "rfc822",
            Self::Utf8 => "utf8",
        }
    }
}

/// Per-message fields of the delivery status report.
/// Empty strings and `None` dates denote absent fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingMtaInfo {
    pub reporting_mta: String,
    pub received_from_mta: String,
    /// Used to build the `X-<label>-Sender` and `X-<label>-MsgID`
    /// extension field names; `Godsn` when empty
    pub mta_label: String,
    pub sender_address: String,
    pub sender_message_id: String,
    pub arrival_date: Option<DateTime<Utc>>,
    pub last_attempt_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, Copy, Clone, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Failed,
    Delayed,
    Delivered,
    Relayed,
    Expanded,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Failed => "failed",
            Self::Delayed => "delayed",
            Self::Delivered => "delivered",
            Self::Relayed => "relayed",
            Self::Expanded => "expanded",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;
    fn from_str(input: &str) -> Result<Self, String> {
        Ok(match input {
            "failed" => Self::Failed,
            "delayed" => Self::Delayed,
            "delivered" => Self::Delivered,
            "relayed" => Self::Relayed,
            "expanded" => Self::Expanded,
            _ => return Err(format!("invalid action type {input}")),
        })
    }
}

/// The reason reported for a recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Diagnostic {
    /// A reply received from an SMTP server
    Smtp {
        code: u16,
        status: StatusCode,
        message: String,
    },
    /// Any other error description
    Plain(String),
}

impl Diagnostic {
    /// Build an SMTP diagnostic from a server reply.
    /// Replies without an enhanced status code report `0.0.0`.
    pub fn from_response(response: &Response) -> Self {
        Self::Smtp {
            code: response.code,
            status: response.enhanced_code.unwrap_or_default(),
            message: response.content.clone(),
        }
    }
}

impl From<&Response> for Diagnostic {
    fn from(response: &Response) -> Self {
        Self::from_response(response)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Smtp {
                code,
                status,
                message,
            } => write!(f, "{code} {status} {message}"),
            Self::Plain(message) => f.write_str(message),
        }
    }
}

/// Per-recipient fields of the delivery status report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientInfo {
    pub final_recipient: String,
    #[serde(default)]
    pub remote_mta: String,
    pub action: Option<Action>,
    pub status: StatusCode,
    #[serde(default)]
    pub diagnostic: Option<Diagnostic>,
}
