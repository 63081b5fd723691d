//! Byte-span scanning of XML documents.
//!
//! The migration never rebuilds documents from a tree. It locates elements by their
//! byte ranges in the original text and copies or splices those ranges, so anything it
//! does not touch stays byte-identical.

use quick_xml::Reader;
use quick_xml::events::Event;
use std::ops::Range;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("not well-formed at byte {position}: {message}")]
pub struct XmlError {
    pub position: usize,
    pub message: String,
}

/// One element of a scanned document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementSpan {
    /// Local name, without namespace prefix.
    pub name: String,
    pub parent: Option<usize>,
    /// Whole element, from `<` of the start tag to `>` of the end tag.
    pub outer: Range<usize>,
    /// Everything between the tags. Empty and positioned at `outer.end` for `<x/>`.
    pub inner: Range<usize>,
    /// Direct text and CDATA children, unescaped and concatenated.
    pub text: String,
}

impl ElementSpan {
    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

fn err(position: usize, message: impl Into<String>) -> XmlError {
    XmlError {
        position,
        message: message.into(),
    }
}

/// Start of the tag that ends right before `end`.
fn tag_start(doc: &str, end: usize) -> usize {
    doc[..end].rfind('<').unwrap_or(0)
}

fn local_name(raw: &[u8]) -> String {
    let name = String::from_utf8_lossy(raw);
    match name.rsplit_once(':') {
        Some((_, local)) => local.to_string(),
        None => name.into_owned(),
    }
}

/// Scans `doc` and returns every element in document order.
///
/// Fails when the document is not well-formed: mismatched or unclosed tags, no root
/// element, several roots, or text outside the root.
pub fn scan(doc: &str) -> Result<Vec<ElementSpan>, XmlError> {
    let mut reader = Reader::from_str(doc);
    reader.config_mut().check_end_names = true;

    let mut spans: Vec<ElementSpan> = Vec::new();
    let mut open: Vec<usize> = Vec::new();
    let mut roots = 0usize;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| err(reader.buffer_position() as usize, e.to_string()))?;
        let after = reader.buffer_position() as usize;

        match event {
            Event::Start(e) | Event::Empty(e) if open.is_empty() && roots > 0 => {
                return Err(err(
                    tag_start(doc, after),
                    format!(
                        "second root element <{}>",
                        local_name(e.local_name().as_ref())
                    ),
                ));
            }
            Event::Start(e) => {
                if open.is_empty() {
                    roots += 1;
                }
                let start = tag_start(doc, after);
                spans.push(ElementSpan {
                    name: local_name(e.local_name().as_ref()),
                    parent: open.last().copied(),
                    outer: start..after,
                    inner: after..after,
                    text: String::new(),
                });
                open.push(spans.len() - 1);
            }
            Event::Empty(e) => {
                if open.is_empty() {
                    roots += 1;
                }
                let start = tag_start(doc, after);
                spans.push(ElementSpan {
                    name: local_name(e.local_name().as_ref()),
                    parent: open.last().copied(),
                    outer: start..after,
                    inner: after..after,
                    text: String::new(),
                });
            }
            Event::End(_) => {
                let Some(idx) = open.pop() else {
                    return Err(err(after, "end tag without matching start tag"));
                };
                let close = tag_start(doc, after);
                let span = &mut spans[idx];
                span.inner = span.inner.start..close;
                span.outer = span.outer.start..after;
            }
            Event::Text(t) => {
                let text = t
                    .unescape()
                    .map_err(|e| err(after, format!("bad text content: {}", e)))?;
                match open.last() {
                    Some(&idx) => spans[idx].text.push_str(&text),
                    None if !text.trim().is_empty() => {
                        return Err(err(after, "text outside the root element"));
                    }
                    None => {}
                }
            }
            Event::CData(c) => match open.last() {
                Some(&idx) => spans[idx]
                    .text
                    .push_str(&String::from_utf8_lossy(&c)),
                None => return Err(err(after, "CDATA outside the root element")),
            },
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(&idx) = open.last() {
        return Err(err(
            doc.len(),
            format!("element <{}> is never closed", spans[idx].name),
        ));
    }
    if roots == 0 {
        return Err(err(0, "document has no root element"));
    }
    Ok(spans)
}

/// Indices of the elements called `name`, in document order.
pub fn find(spans: &[ElementSpan], name: &str) -> Vec<usize> {
    spans
        .iter()
        .enumerate()
        .filter(|(_, s)| s.name == name)
        .map(|(i, _)| i)
        .collect()
}

/// Direct children of `parent` called `name`.
pub fn children<'a>(
    spans: &'a [ElementSpan],
    parent: usize,
    name: &'a str,
) -> impl Iterator<Item = (usize, &'a ElementSpan)> + 'a {
    spans
        .iter()
        .enumerate()
        .skip(parent + 1)
        .filter(move |(_, s)| s.parent == Some(parent) && s.name == name)
}

/// First `lines` lines of `doc`, for error reports.
pub fn excerpt(doc: &str, lines: usize) -> String {
    doc.lines().take(lines).collect::<Vec<_>>().join("\n")
}
