use crate::error::Result;
use crate::fields::{effective_mta_label, encode_recipient, encode_reporting_mta, format_date};
use crate::template::NoticeTemplate;
use crate::types::{EncodingMode, Envelope, RecipientInfo, ReportingMtaInfo};
use chrono::{DateTime, Utc};
use mimewriter::{HeaderMap, MultipartWriter};
use std::io::Write;

pub const SUBJECT: &str = "Undelivered Mail Returned to Sender";

/// Assembles `multipart/report` delivery status notifications.
///
/// The body always consists of three parts, in this order:
///
/// * the human-readable notification, rendered from a template
/// * the `message/delivery-status` (or `message/global-delivery-status`)
///   report built from the reporting MTA and recipient records
/// * the header of the message that could not be delivered
///
/// Every record is validated and encoded before anything is written,
/// so a report that cannot be generated leaves the sink untouched.
#[derive(Default)]
pub struct ReportAssembler {
    notice: NoticeTemplate,
}

impl ReportAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom notification template.
    /// The template can reference `reporting_mta`, `sender_message_id`,
    /// `arrival_date` and `last_attempt_date`.
    pub fn with_template<S: Into<String>>(source: S) -> std::result::Result<Self, minijinja::Error> {
        Ok(Self {
            notice: NoticeTemplate::new(source)?,
        })
    }

    /// Write the report body to `sink` and return the top level
    /// header of the report message.
    pub fn generate<W: Write>(
        &self,
        mode: EncodingMode,
        envelope: &Envelope,
        reporting: &ReportingMtaInfo,
        recipients: &[RecipientInfo],
        original_headers: &HeaderMap,
        sink: W,
    ) -> Result<HeaderMap> {
        self.generate_at(
            Utc::now(),
            mode,
            envelope,
            reporting,
            recipients,
            original_headers,
            sink,
        )
    }

    /// Like `generate`, but dated `now` rather than the current time
    #[allow(clippy::too_many_arguments)]
    pub fn generate_at<W: Write>(
        &self,
        now: DateTime<Utc>,
        mode: EncodingMode,
        envelope: &Envelope,
        reporting: &ReportingMtaInfo,
        recipients: &[RecipientInfo],
        original_headers: &HeaderMap,
        sink: W,
    ) -> Result<HeaderMap> {
        let label = effective_mta_label(&reporting.mta_label);

        let mut status = vec![];
        encode_reporting_mta(mode, reporting, label)?.write_to(&mut status)?;
        for rcpt in recipients {
            encode_recipient(mode, rcpt, label)?.write_to(&mut status)?;
        }

        let notice = self.notice.render(reporting, recipients)?;

        let mut parts = MultipartWriter::new(sink);
        let header = report_header(now, envelope, parts.boundary());

        parts
            .create_part(&notification_part_header())?
            .write_all(notice.as_bytes())?;
        parts
            .create_part(&status_part_header(mode))?
            .write_all(&status)?;
        original_headers.write_to(&mut parts.create_part(&headers_part_header(mode))?)?;
        parts.close()?;

        tracing::debug!(
            "generated {mode:?} report {} for {} recipient(s)",
            envelope.message_id,
            recipients.len()
        );

        Ok(header)
    }
}

/// Generate a report using the default notification text.
/// See `ReportAssembler::generate`.
pub fn generate_dsn<W: Write>(
    mode: EncodingMode,
    envelope: &Envelope,
    reporting: &ReportingMtaInfo,
    recipients: &[RecipientInfo],
    original_headers: &HeaderMap,
    sink: W,
) -> Result<HeaderMap> {
    ReportAssembler::new().generate(
        mode,
        envelope,
        reporting,
        recipients,
        original_headers,
        sink,
    )
}

fn report_header(now: DateTime<Utc>, envelope: &Envelope, boundary: &str) -> HeaderMap {
    let mut header = HeaderMap::default();
    header.add("Date", format_date(&now));
    header.add("Message-Id", envelope.message_id.clone());
    header.add("Content-Transfer-Encoding", "8bit");
    header.add(
        "Content-Type",
        format!("multipart/report; report-type=delivery-status; boundary={boundary}"),
    );
    header.add("MIME-Version", "1.0");
    header.add("Auto-Submitted", "auto-replied");
    header.add("To", envelope.to.clone());
    header.add("From", envelope.from.clone());
    header.add("Subject", SUBJECT);
    header
}

fn notification_part_header() -> HeaderMap {
    let mut header = HeaderMap::default();
    header.add("Content-Transfer-Encoding", "8bit");
    header.add("Content-Type", "text/plain; charset=\"utf-8\"");
    header.add("Content-Description", "Notification");
    header
}

fn status_part_header(mode: EncodingMode) -> HeaderMap {
    let mut header = HeaderMap::default();
    header.add(
        "Content-Type",
        match mode {
            EncodingMode::Utf8 => "message/global-delivery-status",
            EncodingMode::Ascii => "message/delivery-status",
        },
    );
    header.add("Content-Description", "Delivery report");
    header
}

fn headers_part_header(mode: EncodingMode) -> HeaderMap {
    let mut header = HeaderMap::default();
    header.add("Content-Description", "Undelivered message header");
    header.add(
        "Content-Type",
        match mode {
            EncodingMode::Utf8 => "message/global-headers",
            EncodingMode::Ascii => "message/rfc822-headers",
        },
    );
    header.add("Content-Transfer-Encoding", "8bit");
    header
}
