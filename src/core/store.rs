use std::path::{Path, PathBuf};
use tracing::debug;

use crate::core::config::DocumentLayout;
use crate::core::error::{MigrationError, Result};
use crate::core::workdir::RunDirectory;
use crate::core::xml::{self, ElementSpan};

const EXCERPT_LINES: usize = 10;

/// The exported message document. Loaded once, read by ordinal.
#[derive(Debug)]
pub struct SourceDocument {
    path: PathBuf,
    text: String,
    layout: DocumentLayout,
    records: Vec<ElementSpan>,
}

/// A single record wrapped in its own document and written to the run directory.
#[derive(Debug, Clone)]
pub struct StagedMessage {
    pub ordinal: usize,
    pub path: PathBuf,
    pub document: String,
}

impl SourceDocument {
    pub async fn open(path: &Path, layout: DocumentLayout) -> Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| MigrationError::io(format!("reading {}", path.display()), e))?;
        Self::from_text(path, text, layout)
    }

    pub fn from_text(path: &Path, text: String, layout: DocumentLayout) -> Result<Self> {
        let spans = xml::scan(&text).map_err(|e| MigrationError::Malformed {
            ordinal: 0,
            detail: format!("{}: {}", path.display(), e),
            excerpt: xml::excerpt(&text, EXCERPT_LINES),
        })?;
        let records = spans
            .into_iter()
            .filter(|s| s.name == layout.record)
            .collect::<Vec<_>>();
        debug!("{} holds {} records", path.display(), records.len());
        Ok(Self {
            path: path.to_path_buf(),
            text,
            layout,
            records,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn layout(&self) -> &DocumentLayout {
        &self.layout
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Wraps record `ordinal` (1-based) into a standalone document, without writing it.
    pub fn wrap(&self, ordinal: usize) -> Result<String> {
        let total = self.records.len();
        if ordinal == 0 || ordinal > total {
            return Err(MigrationError::NotFound { ordinal, total });
        }
        let record = &self.records[ordinal - 1];
        let raw = &self.text[record.outer.clone()];
        let document = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<{root}>\n{raw}\n</{root}>\n",
            root = self.layout.root,
            raw = raw
        );
        if let Err(e) = xml::scan(&document) {
            return Err(MigrationError::Malformed {
                ordinal,
                detail: e.to_string(),
                excerpt: xml::excerpt(&document, EXCERPT_LINES),
            });
        }
        Ok(document)
    }

    /// Extracts record `ordinal` and stages it under the run directory.
    pub async fn extract(&self, ordinal: usize, run_dir: &RunDirectory) -> Result<StagedMessage> {
        let document = self.wrap(ordinal)?;
        let path = run_dir.staged_path(ordinal);
        tokio::fs::write(&path, &document)
            .await
            .map_err(|e| MigrationError::io(format!("writing {}", path.display()), e))?;
        debug!("Staged message #{} at {}", ordinal, path.display());
        Ok(StagedMessage {
            ordinal,
            path,
            document,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_record(destination: &str, id: &str, body: &str) -> String {
        format!(
            "  <jms-message>\n    <header>\n      <destination>{destination}</destination>\n      <message-id>{id}</message-id>\n      <priority>4</priority>\n    </header>\n    <properties>\n      <property>\n        <name>AMQ_SCHEDULED_DELAY</name>\n        <value/>\n      </property>\n      <property>\n        <name>tenant</name>\n        <value>acme</value>\n      </property>\n    </properties>\n    <body><![CDATA[{body}]]></body>\n  </jms-message>\n"
        )
    }

    pub(crate) fn sample_document(records: &[String]) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<jms-messages>\n{}</jms-messages>\n",
            records.concat()
        )
    }

    fn source(records: usize) -> SourceDocument {
        let records: Vec<String> = (1..=records)
            .map(|i| {
                sample_record(
                    &format!("queue://orders.{}", i),
                    &format!("ID:msg-{}", i),
                    &format!("payload {}", i),
                )
            })
            .collect();
        SourceDocument::from_text(
            Path::new("export.xml"),
            sample_document(&records),
            DocumentLayout::default(),
        )
        .unwrap()
    }

    #[test]
    fn counts_records() {
        assert_eq!(source(3).record_count(), 3);
        assert_eq!(source(0).record_count(), 0);
    }

    #[test]
    fn wrap_selects_the_requested_record() {
        let source = source(4);
        for ordinal in 1..=4 {
            let doc = source.wrap(ordinal).unwrap();
            let spans = xml::scan(&doc).unwrap();
            assert_eq!(spans[0].name, "jms-messages");
            assert_eq!(xml::find(&spans, "jms-message").len(), 1);
            let id = &spans[xml::find(&spans, "message-id")[0]];
            assert_eq!(id.text, format!("ID:msg-{}", ordinal));
            let body = &spans[xml::find(&spans, "body")[0]];
            assert_eq!(body.text, format!("payload {}", ordinal));
            let destination = &spans[xml::find(&spans, "destination")[0]];
            assert_eq!(destination.text, format!("queue://orders.{}", ordinal));
        }
    }

    #[test]
    fn wrap_out_of_range_is_not_found() {
        let source = source(2);
        assert!(matches!(
            source.wrap(0),
            Err(MigrationError::NotFound { ordinal: 0, total: 2 })
        ));
        assert!(matches!(
            source.wrap(3),
            Err(MigrationError::NotFound { ordinal: 3, total: 2 })
        ));
    }

    #[test]
    fn malformed_source_is_rejected() {
        let err = SourceDocument::from_text(
            Path::new("broken.xml"),
            "<jms-messages><jms-message></jms-messages>".to_string(),
            DocumentLayout::default(),
        )
        .unwrap_err();
        assert!(matches!(err, MigrationError::Malformed { ordinal: 0, .. }));
    }

    #[tokio::test]
    async fn extract_writes_staged_file() {
        let root = tempfile::tempdir().unwrap();
        let run_dir = RunDirectory::create(root.path()).unwrap();
        let source = source(2);
        let staged = source.extract(2, &run_dir).await.unwrap();
        assert_eq!(staged.ordinal, 2);
        assert_eq!(staged.path, run_dir.staged_path(2));
        let on_disk = std::fs::read_to_string(&staged.path).unwrap();
        assert_eq!(on_disk, staged.document);
        assert!(on_disk.starts_with("<?xml"));
        assert!(on_disk.contains("ID:msg-2"));
        assert!(!on_disk.contains("ID:msg-1"));
    }
}
