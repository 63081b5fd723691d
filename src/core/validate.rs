use tracing::{info, warn};

use crate::core::config::DocumentLayout;
use crate::core::xml;

/// Structural observations about one staged message. Advisory only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub records: usize,
    pub headers: usize,
    pub bodies: usize,
    /// Character count of the payload, when there is exactly one body.
    pub body_chars: Option<usize>,
    pub destination: Option<String>,
    pub message_id: Option<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_well_formed(&self) -> bool {
        self.records == 1 && self.headers == 1 && self.bodies == 1
    }

    /// Writes the observations to the log.
    pub fn log(&self, ordinal: usize) {
        info!(
            "Message #{}: destination={} id={} payload={} chars",
            ordinal,
            self.destination.as_deref().unwrap_or("?"),
            self.message_id.as_deref().unwrap_or("?"),
            self.body_chars.unwrap_or(0)
        );
        if !self.is_well_formed() {
            warn!(
                "Message #{}: {} records, {} headers, {} bodies; sending anyway",
                ordinal, self.records, self.headers, self.bodies
            );
        }
        for w in &self.warnings {
            warn!("Message #{}: {}", ordinal, w);
        }
    }
}

pub fn validate(doc: &str, layout: &DocumentLayout) -> ValidationReport {
    let mut report = ValidationReport::default();
    let spans = match xml::scan(doc) {
        Ok(spans) => spans,
        Err(e) => {
            report.warnings.push(format!("document does not parse: {}", e));
            return report;
        }
    };

    let records = xml::find(&spans, &layout.record);
    let headers = xml::find(&spans, &layout.header);
    let bodies = xml::find(&spans, &layout.body);
    report.records = records.len();
    report.headers = headers.len();
    report.bodies = bodies.len();

    for (label, count) in [
        ("message records", report.records),
        ("headers", report.headers),
        ("bodies", report.bodies),
    ] {
        if count != 1 {
            report
                .warnings
                .push(format!("expected exactly one of {}, found {}", label, count));
        }
    }

    if let [body] = bodies.as_slice() {
        let chars = spans[*body].text.chars().count();
        report.body_chars = Some(chars);
        if chars == 0 {
            report.warnings.push("payload is empty".to_string());
        }
    }

    if let Some(&header) = headers.first() {
        let field = |name: &str| {
            xml::children(&spans, header, name)
                .next()
                .map(|(_, s)| s.text.trim().to_string())
        };
        report.destination = field(&layout.destination);
        report.message_id = field(&layout.message_id);
    }
    if report.destination.is_none() {
        report.warnings.push("header has no destination".to_string());
    }
    if report.message_id.is_none() {
        report.warnings.push("header has no message id".to_string());
    }

    report
}
