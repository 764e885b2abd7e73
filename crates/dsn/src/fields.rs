//! Encodes the per-message and per-recipient records as the
//! field blocks of a `message/delivery-status` body (RFC 3464
//! sections 2.2 and 2.3). Field order is fixed; some consumers
//! parse these blocks positionally.
use crate::address::{select_domain_encoding, select_encoding};
use crate::error::{DsnError, Result};
use crate::types::{Diagnostic, EncodingMode, RecipientInfo, ReportingMtaInfo};
use chrono::{DateTime, Utc};
use mimewriter::HeaderMap;

pub const DEFAULT_MTA_LABEL: &str = "Godsn";

/// RFC 2822 date-time, eg: `Thu, 2 Jan 2020 15:04:05 +0000`
pub(crate) const DATE_FORMAT: &str = "%a, %-d %b %Y %H:%M:%S %z";

pub(crate) fn format_date(date: &DateTime<Utc>) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Resolve the label used in the `X-<label>-...` extension fields
pub fn effective_mta_label(label: &str) -> &str {
    match label.trim() {
        "" => DEFAULT_MTA_LABEL,
        label => label,
    }
}

/// Field values cannot carry line breaks; each CR and each LF
/// is replaced by a space
pub(crate) fn collapse_line_breaks(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

pub fn encode_reporting_mta(
    mode: EncodingMode,
    info: &ReportingMtaInfo,
    label: &str,
) -> Result<HeaderMap> {
    let mut fields = HeaderMap::default();

    if info.reporting_mta.is_empty() {
        return Err(DsnError::Validation("Reporting-MTA field is mandatory"));
    }
    let reporting_mta = select_domain_encoding(mode, &info.reporting_mta)
        .map_err(DsnError::transcoding("Reporting-MTA"))?;
    fields.add("Reporting-MTA", format!("dns; {reporting_mta}"));

    if !info.received_from_mta.is_empty() {
        let received_from = select_domain_encoding(mode, &info.received_from_mta)
            .map_err(DsnError::transcoding("Received-From-MTA"))?;
        fields.add("Received-From-MTA", format!("dns; {received_from}"));
    }

    if !info.sender_address.is_empty() {
        let name = format!("X-{label}-Sender");
        let sender = select_encoding(mode, &info.sender_address)
            .map_err(DsnError::transcoding(name.clone()))?;
        fields.add(name, format!("{}; {sender}", mode.address_type()));
    }

    if !info.sender_message_id.is_empty() {
        fields.add(format!("X-{label}-MsgID"), info.sender_message_id.clone());
    }

    // Both dates are keyed off the arrival date
    if let Some(arrival) = &info.arrival_date {
        fields.add("Arrival-Date", format_date(arrival));
        let last_attempt = info.last_attempt_date.unwrap_or_default();
        fields.add("Last-Attempt-Date", format_date(&last_attempt));
    }

    Ok(fields)
}

pub fn encode_recipient(
    mode: EncodingMode,
    info: &RecipientInfo,
    label: &str,
) -> Result<HeaderMap> {
    let mut fields = HeaderMap::default();

    if info.final_recipient.is_empty() {
        return Err(DsnError::Validation("Final-Recipient is required"));
    }
    let final_recipient = select_encoding(mode, &info.final_recipient)
        .map_err(DsnError::transcoding("Final-Recipient"))?;
    fields.add(
        "Final-Recipient",
        format!("{}; {final_recipient}", mode.address_type()),
    );

    let action = info
        .action
        .ok_or(DsnError::Validation("Action is required"))?;
    fields.add("Action", action.as_str());

    if info.status.class == 0 {
        return Err(DsnError::Validation("Status is required"));
    }
    fields.add("Status", info.status.to_string());

    match &info.diagnostic {
        Some(Diagnostic::Smtp {
            code,
            status,
            message,
        }) => {
            fields.add(
                "Diagnostic-Code",
                format!("smtp; {code} {status} {}", collapse_line_breaks(message)),
            );
        }
        Some(Diagnostic::Plain(message)) if mode.is_utf8() => {
            fields.add(
                "Diagnostic-Code",
                format!("X-{label}; {}", collapse_line_breaks(message)),
            );
        }
        // There is no diagnostic-type for free text in a 7-bit report
        Some(Diagnostic::Plain(_)) | None => {}
    }

    if !info.remote_mta.is_empty() {
        let remote_mta = select_domain_encoding(mode, &info.remote_mta)
            .map_err(DsnError::transcoding("Remote-MTA"))?;
        fields.add("Remote-MTA", format!("dns; {remote_mta}"));
    }

    Ok(fields)
}
