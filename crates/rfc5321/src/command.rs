use crate::client_types::SmtpClientTimeouts;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    pub local_part: String,
    pub domain: String,
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}@{}", self.local_part, self.domain)
    }
}

impl TryFrom<&str> for Mailbox {
    type Error = String;
    fn try_from(s: &str) -> Result<Self, Self::Error> {
        let (local_part, domain) = s
            .rsplit_once('@')
            .ok_or_else(|| format!("{s:?} has no @ sign"))?;
        if local_part.is_empty() || domain.is_empty() {
            return Err(format!("{s:?} has an empty local-part or domain"));
        }
        Ok(Self {
            local_part: local_part.to_string(),
            domain: domain.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReversePath {
    Path(Mailbox),
    /// The `<>` sender used for notifications that must never
    /// themselves generate a bounce
    NullSender,
}

impl TryFrom<&str> for ReversePath {
    type Error = String;
    fn try_from(s: &str) -> Result<Self, Self::Error> {
        if s.is_empty() {
            Ok(Self::NullSender)
        } else {
            Ok(Self::Path(Mailbox::try_from(s)?))
        }
    }
}

impl fmt::Display for ReversePath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Path(p) => p.fmt(f),
            Self::NullSender => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardPath {
    Path(Mailbox),
    Postmaster,
}

impl TryFrom<&str> for ForwardPath {
    type Error = String;
    fn try_from(s: &str) -> Result<Self, Self::Error> {
        if s.is_empty() {
            Err("cannot send to null sender".to_string())
        } else if s.eq_ignore_ascii_case("postmaster") {
            Ok(Self::Postmaster)
        } else {
            Ok(Self::Path(Mailbox::try_from(s)?))
        }
    }
}

impl fmt::Display for ForwardPath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Path(p) => p.fmt(f),
            Self::Postmaster => f.write_str("postmaster"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ehlo(String),
    Helo(String),
    MailFrom(ReversePath),
    RcptTo(ForwardPath),
    Data,
    DataDot,
    Quit,
}

impl Command {
    pub fn encode(&self) -> String {
        match self {
            Self::Ehlo(domain) => format!("EHLO {domain}\r\n"),
            Self::Helo(domain) => format!("HELO {domain}\r\n"),
            Self::MailFrom(address) => format!("MAIL FROM:<{address}>\r\n"),
            Self::RcptTo(address) => format!("RCPT TO:<{address}>\r\n"),
            Self::Data => "DATA\r\n".to_string(),
            Self::DataDot => ".\r\n".to_string(),
            Self::Quit => "QUIT\r\n".to_string(),
        }
    }

    /// Timeouts for reading the response
    pub fn reply_timeout(&self, timeouts: &SmtpClientTimeouts) -> Duration {
        match self {
            Self::Helo(_) | Self::Ehlo(_) => timeouts.ehlo,
            Self::MailFrom(_) => timeouts.mail_from,
            Self::RcptTo(_) => timeouts.rcpt_to,
            Self::Data => timeouts.data,
            Self::DataDot => timeouts.data_dot,
            Self::Quit => timeouts.quit,
        }
    }

    /// Timeouts for writing the request
    pub fn write_timeout(&self, timeouts: &SmtpClientTimeouts) -> Duration {
        let one_minute = Duration::from_secs(60);
        self.reply_timeout(timeouts).min(one_minute)
    }
}
