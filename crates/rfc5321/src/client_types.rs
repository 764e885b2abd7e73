use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// How long to wait for each step of a session.
/// Durations are written in humantime form, eg: `"30s"` or `"5m"`;
/// omitted fields take their default.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SmtpClientTimeouts {
    /// Establishing the TCP connection
    #[serde(with = "humantime_serde")]
    pub connect: Duration,
    /// Waiting for the 220 banner
    #[serde(with = "humantime_serde")]
    pub greeting: Duration,
    /// Waiting for the reply to EHLO or HELO
    #[serde(with = "humantime_serde")]
    pub ehlo: Duration,
    #[serde(with = "humantime_serde")]
    pub mail_from: Duration,
    #[serde(with = "humantime_serde")]
    pub rcpt_to: Duration,
    /// Waiting for the 354 that follows DATA, and for writing
    /// the message payload
    #[serde(with = "humantime_serde")]
    pub data: Duration,
    /// Waiting for the server to accept the payload
    #[serde(with = "humantime_serde")]
    pub data_dot: Duration,
    #[serde(with = "humantime_serde")]
    pub quit: Duration,
}

impl Default for SmtpClientTimeouts {
    fn default() -> Self {
        // RFC 5321 section 4.5.3.2
        let five_minutes = Duration::from_secs(300);
        Self {
            connect: Duration::from_secs(60),
            greeting: five_minutes,
            ehlo: five_minutes,
            mail_from: five_minutes,
            rcpt_to: five_minutes,
            data: Duration::from_secs(120),
            data_dot: Duration::from_secs(600),
            quit: Duration::from_secs(5),
        }
    }
}

impl SmtpClientTimeouts {
    /// Use the same `duration` for every step
    pub fn uniform(duration: Duration) -> Self {
        Self {
            connect: duration,
            greeting: duration,
            ehlo: duration,
            mail_from: duration,
            rcpt_to: duration,
            data: duration,
            data_dot: duration,
            quit: duration,
        }
    }
}

/// A complete, possibly multi-line, server reply
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, Clone, Hash)]
pub struct Response {
    pub code: u16,
    pub enhanced_code: Option<EnhancedStatusCode>,
    /// The reply text with the enhanced status code removed;
    /// the lines of a multi-line reply are separated by `\n`
    pub content: String,
    /// The command that this is a reply to
    pub command: Option<String>,
}

impl Response {
    /// Render the reply on a single line, suitable for logging
    pub fn to_single_line(&self) -> String {
        let text = self.content.lines().collect::<Vec<_>>().join(" ");
        match &self.enhanced_code {
            Some(status) => format!("{} {status} {text}", self.code),
            None => format!("{} {text}", self.code),
        }
    }

    pub fn is_transient(&self) -> bool {
        (400..500).contains(&self.code)
    }

    pub fn is_permanent(&self) -> bool {
        (500..600).contains(&self.code)
    }
}

/// The `class.subject.detail` triple from RFC 3463
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, Clone, Copy, Hash, Default)]
pub struct EnhancedStatusCode {
    pub class: u8,
    pub subject: u16,
    pub detail: u16,
}

impl EnhancedStatusCode {
    pub const fn new(class: u8, subject: u16, detail: u16) -> Self {
        Self {
            class,
            subject,
            detail,
        }
    }

    /// Split a leading status code, followed by a space, off `text`.
    /// Only the classes defined by RFC 3463 (2, 4 and 5) are recognized.
    pub(crate) fn strip_prefix(text: &str) -> Option<(Self, &str)> {
        let (code, rest) = text.split_once(' ')?;
        let mut numbers = code.split('.');
        let class: u8 = numbers.next()?.parse().ok()?;
        let subject: u16 = numbers.next()?.parse().ok()?;
        let detail: u16 = numbers.next()?.parse().ok()?;
        if numbers.next().is_some() || !matches!(class, 2 | 4 | 5) {
            return None;
        }
        Some((Self::new(class, subject, detail), rest))
    }
}

impl fmt::Display for EnhancedStatusCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}.{}", self.class, self.subject, self.detail)
    }
}

/// One line of a server reply: `250-text` or, for the last line, `250 text`
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ReplyLine<'a> {
    pub code: u16,
    pub last: bool,
    pub text: &'a str,
}

impl<'a> ReplyLine<'a> {
    pub fn parse(line: &'a str) -> Option<Self> {
        let code = line.get(0..3)?;
        if !code.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let last = match line.as_bytes().get(3) {
            Some(b' ') => true,
            Some(b'-') => false,
            // A bare code is a valid final line
            None => true,
            Some(_) => return None,
        };
        Some(Self {
            code: code.parse().ok()?,
            last,
            text: line.get(4..).unwrap_or(""),
        })
    }
}

/// Collects the lines of a multi-line reply
pub(crate) struct PendingReply {
    code: u16,
    enhanced_code: Option<EnhancedStatusCode>,
    lines: Vec<String>,
}

impl PendingReply {
    pub fn start(first: &ReplyLine) -> Self {
        let (enhanced_code, text) = match EnhancedStatusCode::strip_prefix(first.text) {
            Some((status, text)) => (Some(status), text),
            None => (None, first.text),
        };
        Self {
            code: first.code,
            enhanced_code,
            lines: vec![text.to_string()],
        }
    }

    /// Add a continuation line. Returns false if its reply code
    /// differs from that of the first line.
    pub fn push(&mut self, line: &ReplyLine) -> bool {
        if line.code != self.code {
            return false;
        }
        // Servers usually repeat the status on each line
        let text = self
            .enhanced_code
            .and_then(|status| {
                EnhancedStatusCode::strip_prefix(line.text)
                    .filter(|(repeated, _)| *repeated == status)
                    .map(|(_, text)| text)
            })
            .unwrap_or(line.text);
        self.lines.push(text.to_string());
        true
    }

    pub fn finish(self, command: Option<String>) -> Response {
        Response {
            code: self.code,
            enhanced_code: self.enhanced_code,
            content: self.lines.join("\n"),
            command,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reply_lines() {
        assert_eq!(
            ReplyLine::parse("220 woot"),
            Some(ReplyLine {
                code: 220,
                last: true,
                text: "woot"
            })
        );
        assert_eq!(
            ReplyLine::parse("250-PIPELINING"),
            Some(ReplyLine {
                code: 250,
                last: false,
                text: "PIPELINING"
            })
        );
        assert_eq!(
            ReplyLine::parse("354"),
            Some(ReplyLine {
                code: 354,
                last: true,
                text: ""
            })
        );
        assert_eq!(ReplyLine::parse("220_woot"), None);
        assert_eq!(ReplyLine::parse("2x0 woot"), None);
        assert_eq!(ReplyLine::parse("22"), None);
    }

    #[test]
    fn status_prefix() {
        assert_eq!(
            EnhancedStatusCode::strip_prefix("2.0.1 w00t"),
            Some((EnhancedStatusCode::new(2, 0, 1), "w00t"))
        );
        assert_eq!(EnhancedStatusCode::strip_prefix("3.0.0 w00t"), None);
        assert_eq!(EnhancedStatusCode::strip_prefix("2.0.0.1 w00t"), None);
        assert_eq!(EnhancedStatusCode::strip_prefix("2.0.0.1w00t"), None);
        assert_eq!(EnhancedStatusCode::strip_prefix("2.0.0"), None);
        assert_eq!(EnhancedStatusCode::new(5, 1, 1).to_string(), "5.1.1");
    }

    #[test]
    fn multi_line_reply() {
        let mut reply = PendingReply::start(&ReplyLine {
            code: 550,
            last: false,
            text: "5.1.1 no such user",
        });
        assert!(reply.push(&ReplyLine {
            code: 550,
            last: true,
            text: "5.1.1 try another",
        }));
        assert!(!reply.push(&ReplyLine {
            code: 250,
            last: true,
            text: "ok",
        }));
        let response = reply.finish(Some("RCPT TO:<a@example.com>\r\n".to_string()));
        assert_eq!(response.content, "no such user\ntry another");
        assert_eq!(
            response.to_single_line(),
            "550 5.1.1 no such user try another"
        );
        assert!(response.is_permanent());
        assert!(!response.is_transient());
    }

    #[test]
    fn timeouts_from_config() {
        let timeouts: SmtpClientTimeouts =
            serde_json::from_str(r#"{"connect": "5s", "data": "2m"}"#).unwrap();
        assert_eq!(timeouts.connect, Duration::from_secs(5));
        assert_eq!(timeouts.data, Duration::from_secs(120));
        assert_eq!(timeouts.ehlo, Duration::from_secs(300));
        assert_eq!(timeouts.quit, Duration::from_secs(5));
    }
}
