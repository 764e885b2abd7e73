//! The human-readable part of the report
use crate::error::Result;
use crate::fields::collapse_line_breaks;
use crate::types::{Diagnostic, RecipientInfo, ReportingMtaInfo};
use chrono::{DateTime, SubsecRound, Utc};
use minijinja::Environment;
use serde::Serialize;
use std::fmt::Write;

const TEMPLATE_NAME: &str = "notice.txt";

pub const DEFAULT_NOTICE: &str = "
This is the mail delivery system at {{ reporting_mta }}.

Unfortunately, your message could not be delivered to one or more
recipients. The usual cause of this problem is invalid
recipient address or maintenance at the recipient side.

Contact the postmaster for further assistance, provide the Message ID (below):

Message ID: {{ sender_message_id }}
Arrival: {{ arrival_date }}
Last delivery attempt: {{ last_attempt_date }}

";

/// Values available to the notice template
#[derive(Serialize, Debug)]
struct NoticeContext<'a> {
    reporting_mta: &'a str,
    sender_message_id: &'a str,
    arrival_date: String,
    last_attempt_date: String,
}

fn notice_time(date: Option<&DateTime<Utc>>) -> String {
    date.map(|date| {
        date.trunc_subsecs(0)
            .format("%Y-%m-%d %H:%M:%S %z %Z")
            .to_string()
    })
    .unwrap_or_default()
}

fn notice_diagnostic(diagnostic: Option<&Diagnostic>) -> String {
    match diagnostic {
        Some(diagnostic) => collapse_line_breaks(&diagnostic.to_string()),
        None => "(none)".to_string(),
    }
}

/// Renders the notification text: the template, followed by one
/// line per recipient describing why its delivery failed.
pub struct NoticeTemplate {
    env: Environment<'static>,
}

impl Default for NoticeTemplate {
    fn default() -> Self {
        let mut env = Self::environment();
        // A failure here resurfaces from `render`
        env.add_template(TEMPLATE_NAME, DEFAULT_NOTICE).ok();
        Self { env }
    }
}

impl NoticeTemplate {
    fn environment() -> Environment<'static> {
        let mut env = Environment::new();
        env.set_keep_trailing_newline(true);
        env
    }

    /// Use `source` in place of the default text.
    /// The template is compiled here so that syntax errors
    /// are reported before any report is generated.
    pub fn new<S: Into<String>>(source: S) -> std::result::Result<Self, minijinja::Error> {
        let mut env = Self::environment();
        env.add_template_owned(TEMPLATE_NAME, source.into())?;
        Ok(Self { env })
    }

    pub fn render(&self, info: &ReportingMtaInfo, recipients: &[RecipientInfo]) -> Result<String> {
        let context = NoticeContext {
            reporting_mta: &info.reporting_mta,
            sender_message_id: &info.sender_message_id,
            arrival_date: notice_time(info.arrival_date.as_ref()),
            last_attempt_date: notice_time(info.last_attempt_date.as_ref()),
        };

        let mut text = self.env.get_template(TEMPLATE_NAME)?.render(context)?;

        for rcpt in recipients {
            writeln!(
                text,
                "Delivery to {} failed with error: {}",
                rcpt.final_recipient,
                notice_diagnostic(rcpt.diagnostic.as_ref())
            )
            .ok();
        }

        Ok(text)
    }
}
