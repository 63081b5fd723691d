use std::ops::Range;
use tracing::{debug, info, warn};

use crate::core::config::DocumentLayout;
use crate::core::error::{MigrationError, Result};
use crate::core::store::StagedMessage;
use crate::core::xml;

/// Value written into empty allowlisted properties.
pub const NUMERIC_DEFAULT: &str = "0";

/// Rewrites empty numeric scheduling properties to `0`.
///
/// The broker client parses these as integers and rejects an empty string, so the
/// message would never be sent. Only properties named in `fields` are touched.
#[derive(Debug, Clone)]
pub struct FieldSanitizer {
    fields: Vec<String>,
    layout: DocumentLayout,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sanitized {
    pub document: String,
    /// Names of the properties that were rewritten, in document order.
    pub rewritten: Vec<String>,
}

impl FieldSanitizer {
    pub fn new(fields: Vec<String>, layout: DocumentLayout) -> Self {
        Self { fields, layout }
    }

    /// Best effort: on any problem the input comes back unchanged.
    pub fn sanitize(&self, doc: &str) -> Sanitized {
        let unchanged = || Sanitized {
            document: doc.to_string(),
            rewritten: Vec::new(),
        };

        let spans = match xml::scan(doc) {
            Ok(spans) => spans,
            Err(e) => {
                warn!("Skipping sanitize, document does not parse: {}", e);
                return unchanged();
            }
        };

        let mut edits: Vec<(Range<usize>, String, String)> = Vec::new();
        for prop in xml::find(&spans, &self.layout.property) {
            let name = xml::children(&spans, prop, &self.layout.property_name)
                .next()
                .map(|(_, s)| s.text.trim().to_string());
            let Some(name) = name else { continue };
            if !self.fields.iter().any(|f| *f == name) {
                continue;
            }
            for (_, value) in xml::children(&spans, prop, &self.layout.property_value) {
                if value.has_text() {
                    continue;
                }
                edits.push(fill_value(doc, value, name.clone()));
            }
        }

        if edits.is_empty() {
            return unchanged();
        }

        let mut out = doc.to_string();
        for (range, replacement, _) in edits.iter().rev() {
            out.replace_range(range.clone(), replacement);
        }
        if out.trim().is_empty() {
            warn!("Sanitize produced an empty document, keeping the original");
            return unchanged();
        }

        Sanitized {
            document: out,
            rewritten: edits.into_iter().map(|(_, _, name)| name).collect(),
        }
    }

    /// Sanitizes a staged message in place and checks the result still parses.
    pub async fn sanitize_staged(&self, staged: &mut StagedMessage) -> Result<Vec<String>> {
        let sanitized = self.sanitize(&staged.document);
        if let Err(e) = xml::scan(&sanitized.document) {
            return Err(MigrationError::Malformed {
                ordinal: staged.ordinal,
                detail: format!("after sanitize: {}", e),
                excerpt: xml::excerpt(&sanitized.document, 10),
            });
        }
        if sanitized.rewritten.is_empty() {
            debug!("Message #{}: nothing to sanitize", staged.ordinal);
            return Ok(Vec::new());
        }

        tokio::fs::write(&staged.path, &sanitized.document)
            .await
            .map_err(|e| MigrationError::io(format!("writing {}", staged.path.display()), e))?;
        info!(
            "Message #{}: set empty {} to {}",
            staged.ordinal,
            sanitized.rewritten.join(", "),
            NUMERIC_DEFAULT
        );
        staged.document = sanitized.document;
        Ok(sanitized.rewritten)
    }
}

/// Edit that puts the default into an empty value element. Tag name, prefix and
/// attributes stay as written; only the content changes.
fn fill_value(
    doc: &str,
    value: &xml::ElementSpan,
    name: String,
) -> (Range<usize>, String, String) {
    let self_closing = value.inner.start == value.outer.end;
    if !self_closing {
        return (value.inner.clone(), NUMERIC_DEFAULT.to_string(), name);
    }
    let tag = &doc[value.outer.clone()];
    let open = tag.strip_suffix("/>").unwrap_or(tag).trim_end();
    let qname = open
        .trim_start_matches('<')
        .split(|c: char| c.is_whitespace() || c == '/' || c == '>')
        .next()
        .unwrap_or_default();
    (
        value.outer.clone(),
        format!("{}>{}</{}>", open, NUMERIC_DEFAULT, qname),
        name,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::tests::{sample_document, sample_record};

    fn sanitizer() -> FieldSanitizer {
        FieldSanitizer::new(
            vec![
                "AMQ_SCHEDULED_DELAY".to_string(),
                "AMQ_SCHEDULED_PERIOD".to_string(),
                "AMQ_SCHEDULED_REPEAT".to_string(),
            ],
            DocumentLayout::default(),
        )
    }

    fn property(name: &str, value: &str) -> String {
        format!("<property><name>{}</name>{}</property>", name, value)
    }

    fn doc_with(props: &[String]) -> String {
        format!(
            "<jms-messages><jms-message><header/><properties>{}</properties><body/></jms-message></jms-messages>",
            props.concat()
        )
    }

    #[test]
    fn empty_scheduled_delay_becomes_zero() {
        let doc = sample_document(&[sample_record("queue://a", "ID:1", "x")]);
        let out = sanitizer().sanitize(&doc);
        assert_eq!(out.rewritten, vec!["AMQ_SCHEDULED_DELAY"]);
        assert!(
            out.document
                .contains("<name>AMQ_SCHEDULED_DELAY</name>\n        <value>0</value>")
        );
        assert!(out.document.contains("<value>acme</value>"));
    }

    #[test]
    fn all_empty_forms_are_rewritten() {
        let doc = doc_with(&[
            property("AMQ_SCHEDULED_DELAY", "<value/>"),
            property("AMQ_SCHEDULED_PERIOD", "<value></value>"),
            property("AMQ_SCHEDULED_REPEAT", "<value>  </value>"),
        ]);
        let out = sanitizer().sanitize(&doc);
        assert_eq!(out.rewritten.len(), 3);
        assert_eq!(out.document.matches("<value>0</value>").count(), 3);
    }

    #[test]
    fn typed_and_prefixed_values_keep_their_tags() {
        let doc = doc_with(&[
            property("AMQ_SCHEDULED_DELAY", r#"<value xsi:type="xs:long"/>"#),
            property("AMQ_SCHEDULED_PERIOD", r#"<ns:value xmlns:ns="urn:amq" />"#),
            property("AMQ_SCHEDULED_REPEAT", r#"<value xsi:type="xs:int"> </value>"#),
        ]);
        let out = sanitizer().sanitize(&doc);
        assert_eq!(out.rewritten.len(), 3);
        assert!(out.document.contains(r#"<value xsi:type="xs:long">0</value>"#));
        assert!(out.document.contains(r#"<ns:value xmlns:ns="urn:amq">0</ns:value>"#));
        assert!(out.document.contains(r#"<value xsi:type="xs:int">0</value>"#));
        assert!(xml::scan(&out.document).is_ok());
    }

    #[test]
    fn filled_and_unlisted_properties_are_untouched() {
        let doc = doc_with(&[
            property("AMQ_SCHEDULED_DELAY", "<value>5000</value>"),
            property("JMSXGroupSeq", "<value/>"),
            property("tenant", "<value></value>"),
        ]);
        let out = sanitizer().sanitize(&doc);
        assert!(out.rewritten.is_empty());
        assert_eq!(out.document, doc);
    }

    #[test]
    fn unparsable_document_is_returned_unchanged() {
        let doc = "<jms-messages><property><name>AMQ_SCHEDULED_DELAY</name><value/>";
        let out = sanitizer().sanitize(doc);
        assert_eq!(out.document, doc);
        assert!(out.rewritten.is_empty());
    }

    #[tokio::test]
    async fn sanitize_staged_rewrites_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("message_1.xml");
        let doc = doc_with(&[property("AMQ_SCHEDULED_DELAY", "<value/>")]);
        std::fs::write(&path, &doc).unwrap();
        let mut staged = StagedMessage {
            ordinal: 1,
            path: path.clone(),
            document: doc,
        };
        let rewritten = sanitizer().sanitize_staged(&mut staged).await.unwrap();
        assert_eq!(rewritten, vec!["AMQ_SCHEDULED_DELAY"]);
        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert!(on_disk.contains("<value>0</value>"));
        assert_eq!(on_disk, staged.document);
    }

    fn property_mixes() -> Vec<Vec<String>> {
        let names = [
            "AMQ_SCHEDULED_DELAY",
            "AMQ_SCHEDULED_PERIOD",
            "AMQ_SCHEDULED_REPEAT",
            "tenant",
        ];
        let values = ["<value/>", "<value></value>", "<value> </value>", "<value>250</value>"];
        let mut mixes = vec![Vec::new()];
        for (i, name) in names.iter().enumerate() {
            for (j, value) in values.iter().enumerate() {
                mixes.push(vec![property(name, value)]);
                let other = names[(i + 1) % names.len()];
                let other_value = values[(j + 1) % values.len()];
                mixes.push(vec![property(name, value), property(other, other_value)]);
            }
        }
        mixes
    }

    #[test]
    fn sanitize_is_idempotent() {
        for props in property_mixes() {
            let doc = doc_with(&props);
            let once = sanitizer().sanitize(&doc);
            let twice = sanitizer().sanitize(&once.document);
            assert_eq!(once.document, twice.document, "props: {:?}", props);
            assert!(twice.rewritten.is_empty());
        }
    }

    #[test]
    fn only_allowlisted_properties_change() {
        for props in property_mixes() {
            let doc = doc_with(&props);
            let out = sanitizer().sanitize(&doc);
            for p in props.iter().filter(|p| !p.contains("AMQ_SCHEDULED_")) {
                assert!(out.document.contains(p.as_str()));
            }
            assert!(out.rewritten.iter().all(|n| n.starts_with("AMQ_SCHEDULED_")));
        }
    }
}
