//! Source documents and the knowledge chunks derived from them

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DocumentError;

/// Page separator for plain-text sources
pub const PAGE_SEPARATOR: char = '\u{000C}';

/// Supported source formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Pdf,
    /// `.txt` and `.md`, pages separated by form feeds
    Text,
}

impl SourceFormat {
    /// Detect the format from a file extension (case-insensitive)
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(SourceFormat::Pdf),
            "txt" | "md" => Some(SourceFormat::Text),
            _ => None,
        }
    }
}

/// Page-addressable text of one source document
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub name: String,
    pub format: SourceFormat,
    /// Raw page texts in page order; index 0 is page 1
    pub pages: Vec<String>,
}

impl SourceDocument {
    pub fn from_bytes(
        name: impl Into<String>,
        format: SourceFormat,
        bytes: &[u8],
    ) -> Result<Self, DocumentError> {
        let pages = match format {
            SourceFormat::Pdf => pdf_pages(bytes)?,
            SourceFormat::Text => text_pages(bytes)?,
        };
        Ok(Self {
            name: name.into(),
            format,
            pages,
        })
    }

    /// Normalize every page and keep those that clear the noise threshold
    pub fn segments(&self, min_chars: usize, max_chars: usize) -> Vec<Segment> {
        self.pages
            .iter()
            .enumerate()
            .filter_map(|(index, raw)| {
                let text = normalize_page_text(raw);
                if text.chars().count() < min_chars {
                    return None;
                }
                Some(Segment {
                    source: self.name.clone(),
                    page: index as u32 + 1,
                    content: truncate_chars(&text, max_chars),
                })
            })
            .collect()
    }
}

fn pdf_pages(bytes: &[u8]) -> Result<Vec<String>, DocumentError> {
    let doc = lopdf::Document::load_mem(bytes).map_err(|e| DocumentError::Pdf(e.to_string()))?;
    if doc.is_encrypted() {
        return Err(DocumentError::Encrypted);
    }

    let pages = doc
        .get_pages()
        .keys()
        .map(|&number| match doc.extract_text(&[number]) {
            Ok(text) => text,
            Err(e) => {
                // A page without extractable text is noise, not a broken document
                tracing::debug!("No text on page {}: {}", number, e);
                String::new()
            }
        })
        .collect();

    Ok(pages)
}

fn text_pages(bytes: &[u8]) -> Result<Vec<String>, DocumentError> {
    let text = std::str::from_utf8(bytes).map_err(|_| DocumentError::Encoding)?;
    Ok(text.split(PAGE_SEPARATOR).map(str::to_string).collect())
}

/// Collapse line breaks and whitespace runs into single spaces
pub fn normalize_page_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => text[..byte_index].to_string(),
        None => text.to_string(),
    }
}

/// A page-level segment awaiting embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub source: String,
    pub page: u32,
    pub content: String,
}

/// One retrievable unit of the knowledge store
///
/// Immutable once created; the embedding always belongs to exactly this
/// content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    source: String,
    page: u32,
    content: String,
    embedding: Vec<f32>,
    ingested_at: DateTime<Utc>,
}

impl KnowledgeChunk {
    pub fn new(segment: Segment, embedding: Vec<f32>, ingested_at: DateTime<Utc>) -> Self {
        Self {
            source: segment.source,
            page: segment.page.max(1),
            content: segment.content,
            embedding,
            ingested_at,
        }
    }

    /// Document identifier (file name) this chunk was cut from
    pub fn source(&self) -> &str {
        &self.source
    }

    /// 1-based page number
    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn embedding(&self) -> &[f32] {
        &self.embedding
    }

    pub fn dimension(&self) -> usize {
        self.embedding.len()
    }

    pub fn ingested_at(&self) -> DateTime<Utc> {
        self.ingested_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{
        content::Content, content::Operation, dictionary, Dictionary, Document, Object, Stream,
    };
    use pretty_assertions::assert_eq;

    fn pdf_with_pages(texts: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids = Vec::new();
        for text in texts {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 700.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(Dictionary::new(), content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(612),
                    Object::Integer(792),
                ],
            });
            kids.push(Object::Reference(page_id));
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(
            SourceFormat::from_path(Path::new("EU_2024_1991.PDF")),
            Some(SourceFormat::Pdf)
        );
        assert_eq!(
            SourceFormat::from_path(Path::new("notes.md")),
            Some(SourceFormat::Text)
        );
        assert_eq!(SourceFormat::from_path(Path::new("image.png")), None);
        assert_eq!(SourceFormat::from_path(Path::new("README")), None);
    }

    #[test]
    fn test_text_pages_split_on_form_feed() {
        let doc = SourceDocument::from_bytes(
            "reg.txt",
            SourceFormat::Text,
            "first page\u{000C}second page\u{000C}third".as_bytes(),
        )
        .unwrap();
        assert_eq!(doc.pages.len(), 3);
        assert_eq!(doc.pages[1], "second page");
    }

    #[test]
    fn test_normalization_collapses_line_breaks() {
        assert_eq!(
            normalize_page_text("Article 4\n\nRestoration   targets\r\n apply "),
            "Article 4 Restoration targets apply"
        );
    }

    #[test]
    fn test_short_pages_are_noise() {
        let doc = SourceDocument {
            name: "reg.txt".to_string(),
            format: SourceFormat::Text,
            pages: vec![
                "Cover".to_string(),
                "Member States shall put in place restoration measures".to_string(),
                "   ".to_string(),
            ],
        };
        let segments = doc.segments(20, 4000);

        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].page, 2);
        assert_eq!(segments[0].source, "reg.txt");
    }

    #[test]
    fn test_long_pages_truncated_on_char_boundary() {
        let doc = SourceDocument {
            name: "reg.md".to_string(),
            format: SourceFormat::Text,
            pages: vec!["é".repeat(50)],
        };
        let segments = doc.segments(1, 10);
        assert_eq!(segments[0].content.chars().count(), 10);
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let err = SourceDocument::from_bytes("bad.txt", SourceFormat::Text, &[0xff, 0xfe, 0x00])
            .unwrap_err();
        assert!(matches!(err, DocumentError::Encoding));
    }

    #[test]
    fn test_invalid_pdf_rejected() {
        let err = SourceDocument::from_bytes("bad.pdf", SourceFormat::Pdf, b"not a pdf")
            .unwrap_err();
        assert!(matches!(err, DocumentError::Pdf(_)));
    }

    #[test]
    fn test_pdf_pages_in_order() {
        let bytes = pdf_with_pages(&["Restoration targets", "Monitoring obligations"]);
        let doc = SourceDocument::from_bytes("law.pdf", SourceFormat::Pdf, &bytes).unwrap();

        assert_eq!(doc.pages.len(), 2);
        assert!(doc.pages[0].contains("Restoration"));
        assert!(doc.pages[1].contains("Monitoring"));
    }

    #[test]
    fn test_chunk_page_is_one_based() {
        let chunk = KnowledgeChunk::new(
            Segment {
                source: "a.txt".to_string(),
                page: 0,
                content: "text".to_string(),
            },
            vec![1.0, 0.0],
            Utc::now(),
        );
        assert_eq!(chunk.page(), 1);
        assert_eq!(chunk.dimension(), 2);
    }
}
