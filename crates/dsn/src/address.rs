//! Conversion of mailboxes and domain names between their Unicode
//! (U-label) and ASCII compatible (A-label) representations.
//!
//! The splitting performed here is intentionally naive: the address
//! is only separated at its final `@` and is otherwise not validated.
use crate::types::EncodingMode;
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressError {
    #[error("missing at-sign")]
    MissingAtSign,
    #[error("empty local-part")]
    EmptyLocalPart,
    #[error("empty domain")]
    EmptyDomain,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranscodeError {
    #[error("{address}: cannot convert the Unicode local-part to the ACE form")]
    UnicodeLocalPart { address: String },
    #[error("{address}: {reason}")]
    Malformed {
        address: String,
        reason: AddressError,
        fallback: Option<String>,
    },
    #[error("{address}: IDNA conversion failed: {reason}")]
    DomainEncoding {
        address: String,
        reason: String,
        fallback: Option<String>,
    },
}

impl TranscodeError {
    /// The NFC normalized form of the input, present when the
    /// conversion was towards Unicode. Callers may use it in place
    /// of the failed conversion if a degraded value is acceptable.
    pub fn fallback(&self) -> Option<&str> {
        match self {
            Self::UnicodeLocalPart { .. } => None,
            Self::Malformed { fallback, .. } | Self::DomainEncoding { fallback, .. } => {
                fallback.as_deref()
            }
        }
    }
}

/// Split `address` into its local-part and domain at the last `@`.
/// The special `postmaster` forward-path (compared case-insensitively)
/// has no domain and is returned with an empty one.
pub fn split(address: &str) -> Result<(&str, &str), AddressError> {
    if address.eq_ignore_ascii_case("postmaster") {
        return Ok((address, ""));
    }

    let (local_part, domain) = address
        .rsplit_once('@')
        .ok_or(AddressError::MissingAtSign)?;
    if local_part.is_empty() {
        return Err(AddressError::EmptyLocalPart);
    }
    if domain.is_empty() {
        return Err(AddressError::EmptyDomain);
    }
    Ok((local_part, domain))
}

fn nfc(s: &str) -> String {
    s.nfc().collect()
}

fn has_ace_label(domain: &str) -> bool {
    domain.split('.').any(|label| {
        label
            .get(..4)
            .map(|prefix| prefix.eq_ignore_ascii_case("xn--"))
            .unwrap_or(false)
    })
}

/// Convert `domain` to its A-label form
pub fn domain_to_ace(domain: &str) -> Result<String, TranscodeError> {
    if domain.is_ascii() {
        return Ok(domain.to_string());
    }
    idna::domain_to_ascii(domain).map_err(|err| TranscodeError::DomainEncoding {
        address: domain.to_string(),
        reason: err.to_string(),
        fallback: None,
    })
}

/// Convert `domain` to its NFC normalized U-label form
pub fn domain_to_unicode(domain: &str) -> Result<String, TranscodeError> {
    if !has_ace_label(domain) {
        return Ok(nfc(domain));
    }
    let (unicode, result) = idna::domain_to_unicode(domain);
    match result {
        Ok(()) => Ok(nfc(&unicode)),
        Err(err) => Err(TranscodeError::DomainEncoding {
            address: domain.to_string(),
            reason: err.to_string(),
            fallback: Some(nfc(domain)),
        }),
    }
}

pub fn select_domain_encoding(mode: EncodingMode, domain: &str) -> Result<String, TranscodeError> {
    match mode {
        EncodingMode::Utf8 => domain_to_unicode(domain),
        EncodingMode::Ascii => domain_to_ace(domain),
    }
}

/// Convert the domain of `address` to its A-label form.
/// A local-part containing anything other than 7-bit ASCII has no
/// ACE representation and is rejected before the domain is examined.
pub fn to_ace(address: &str) -> Result<String, TranscodeError> {
    let (local_part, domain) = split(address).map_err(|reason| TranscodeError::Malformed {
        address: address.to_string(),
        reason,
        fallback: None,
    })?;

    if !local_part.is_ascii() {
        return Err(TranscodeError::UnicodeLocalPart {
            address: address.to_string(),
        });
    }

    if domain.is_empty() {
        return Ok(local_part.to_string());
    }

    let domain = domain_to_ace(domain).map_err(|err| match err {
        TranscodeError::DomainEncoding { reason, .. } => TranscodeError::DomainEncoding {
            address: address.to_string(),
            reason,
            fallback: None,
        },
        other => other,
    })?;

    Ok(format!("{local_part}@{domain}"))
}

/// Convert the domain of `address` to its NFC normalized U-label form.
/// The local-part is passed through unchanged.
pub fn to_unicode(address: &str) -> Result<String, TranscodeError> {
    let (local_part, domain) = split(address).map_err(|reason| TranscodeError::Malformed {
        address: address.to_string(),
        reason,
        fallback: Some(nfc(address)),
    })?;

    if domain.is_empty() {
        return Ok(local_part.to_string());
    }

    let domain = domain_to_unicode(domain).map_err(|err| match err {
        TranscodeError::DomainEncoding { reason, .. } => TranscodeError::DomainEncoding {
            address: address.to_string(),
            reason,
            fallback: Some(nfc(address)),
        },
        other => other,
    })?;

    Ok(format!("{local_part}@{domain}"))
}

pub fn select_encoding(mode: EncodingMode, address: &str) -> Result<String, TranscodeError> {
    match mode {
        EncodingMode::Utf8 => to_unicode(address),
        EncodingMode::Ascii => to_ace(address),
    }
}
