//! Classification of RFC 3464 delivery status notifications and RFC 5965
//! feedback reports.

use std::fmt;

use mailparse::{MailHeaderMap, MailParseError, ParsedMail, parse_headers, parse_mail};

use crate::error::ClassificationError;

/// What a report says happened to the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportKind {
    /// Feedback report with its `Feedback-Type` (`abuse`, `fraud`, ...)
    Complaint(String),
    /// Delivery status with a 5.x.x `Status`
    HardBounce(String),
    /// Delivery status with a 4.x.x `Status`
    SoftBounce(String),
    /// `multipart/report; report-type=feedback-report` without usable details
    GenericComplaint,
    /// `multipart/report; report-type=delivery-status` without usable details
    GenericBounce,
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Complaint(feedback_type) => write!(f, "Complaint: {feedback_type}"),
            Self::HardBounce(status) => write!(f, "Hard Bounce (Code: {status})"),
            Self::SoftBounce(status) => write!(f, "Soft Bounce (Code: {status})"),
            Self::GenericComplaint => f.write_str("Complaint (Generic)"),
            Self::GenericBounce => f.write_str("Bounce (Generic)"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub kinds: Vec<ReportKind>,
}

impl Classification {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Every kind found, joined with ` | `, or `None` if nothing was found.
    #[must_use]
    pub fn summary(&self) -> Option<String> {
        if self.kinds.is_empty() {
            return None;
        }

        Some(
            self.kinds
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" | "),
        )
    }
}

/// Classifies a bounce or complaint report.
///
/// Detailed kinds come from `message/feedback-report` and
/// `message/delivery-status` parts anywhere in the message; the generic kinds
/// implied by the top level `report-type` are used only when no part yielded
/// anything. A part that fails to decode is logged and skipped.
///
/// # Errors
/// If `raw` is not a parseable MIME message.
pub fn classify(raw: &[u8]) -> Result<Classification, ClassificationError> {
    let mail = parse_mail(raw)?;
    let mut classification = Classification::default();

    for part in descendants(&mail) {
        let kind = match part.ctype.mimetype.as_str() {
            "message/feedback-report" => feedback_report(part),
            "message/delivery-status" => delivery_status(part),
            _ => continue,
        };

        match kind {
            Ok(Some(kind)) => {
                crate::bounce!(level = INFO, %kind, "Classified report part");
                classification.kinds.push(kind);
            }
            Ok(None) => {}
            Err(err) => crate::bounce!(
                level = WARN,
                content_type = %part.ctype.mimetype,
                error = %err,
                "Skipping undecodable report part"
            ),
        }
    }

    if classification.is_empty()
        && let Some(kind) = generic_kind(&mail)
    {
        classification.kinds.push(kind);
    }

    Ok(classification)
}

fn generic_kind(mail: &ParsedMail<'_>) -> Option<ReportKind> {
    if mail.ctype.mimetype != "multipart/report" {
        return None;
    }

    let report_type = mail
        .ctype
        .params
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("report-type"))
        .map(|(_, value)| value.trim().to_ascii_lowercase())?;

    match report_type.as_str() {
        "feedback-report" => Some(ReportKind::GenericComplaint),
        "delivery-status" => Some(ReportKind::GenericBounce),
        _ => None,
    }
}

/// Every part below `mail`, depth first.
fn descendants<'a>(mail: &'a ParsedMail<'a>) -> Vec<&'a ParsedMail<'a>> {
    let mut parts = Vec::new();
    let mut stack: Vec<_> = mail.subparts.iter().rev().collect();

    while let Some(part) = stack.pop() {
        parts.push(part);
        stack.extend(part.subparts.iter().rev());
    }

    parts
}

fn feedback_report(part: &ParsedMail<'_>) -> Result<Option<ReportKind>, MailParseError> {
    let feedback_type = match part.headers.get_first_value("Feedback-Type") {
        Some(value) => Some(value),
        None => {
            let body = part.get_body()?;
            let (fields, _) = parse_headers(body.trim_start().as_bytes())?;
            fields.get_first_value("Feedback-Type")
        }
    };

    Ok(feedback_type
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(ReportKind::Complaint))
}

fn delivery_status(part: &ParsedMail<'_>) -> Result<Option<ReportKind>, MailParseError> {
    let body = part.get_body()?.replace("\r\n", "\n");

    // Per-message fields first, then one block per recipient.
    let mut status = None;
    for block in body.split("\n\n") {
        let (fields, _) = parse_headers(block.trim_start_matches('\n').as_bytes())?;
        if let Some(value) = fields.get_first_value("Status") {
            status = Some(value.trim().to_string());
            break;
        }
    }

    let Some(status) = status else {
        return Ok(None);
    };

    crate::bounce!(%status, "Delivery status found");

    Ok(match status.chars().next() {
        Some('5') => Some(ReportKind::HardBounce(status)),
        Some('4') => Some(ReportKind::SoftBounce(status)),
        _ => None,
    })
}
