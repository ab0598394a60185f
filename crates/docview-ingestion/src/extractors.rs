//! Format-specific text extractors
//!
//! Every extractor is pure: bytes in, UTF-8 text out. Internal encodings are
//! mapped to UTF-8 and binary artifacts are left for the preprocessor to
//! strip.

use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::Arc;
use tracing::debug;

use docview_core::FileType;

use crate::{IngestionError, Result};

/// Trait for document text extractors
pub trait Extractor: Send + Sync {
    /// Extract plain text from document bytes.
    fn extract(&self, blob: &[u8]) -> Result<String>;

    /// Get extractor name
    fn name(&self) -> &'static str;
}

/// Plain text extractor with a lossy Windows-1252 fallback for legacy files.
pub struct PlainTextExtractor;

impl Extractor for PlainTextExtractor {
    fn extract(&self, blob: &[u8]) -> Result<String> {
        let (text, encoding) = match std::str::from_utf8(blob) {
            Ok(s) => (s.to_string(), "utf-8"),
            Err(_) => {
                let (decoded, _, had_errors) = encoding_rs::WINDOWS_1252.decode(blob);
                let label = if had_errors { "windows-1252-lossy" } else { "windows-1252" };
                (decoded.into_owned(), label)
            }
        };

        debug!(encoding = %encoding, size = blob.len(), "extracted plain text");
        Ok(text)
    }

    fn name(&self) -> &'static str {
        "plain_text"
    }
}

/// Markdown extractor.
///
/// Markdown structure is kept intact: the segmenter relies on block
/// boundaries, so no syntax is stripped here.
pub struct MarkdownExtractor;

impl Extractor for MarkdownExtractor {
    fn extract(&self, blob: &[u8]) -> Result<String> {
        let text = std::str::from_utf8(blob)
            .map_err(|e| IngestionError::EncodingError(format!("invalid UTF-8 in markdown: {}", e)))?;
        Ok(text.to_string())
    }

    fn name(&self) -> &'static str {
        "markdown"
    }
}

/// PDF extractor backed by `pdf-extract`.
pub struct PdfExtractor;

impl Extractor for PdfExtractor {
    fn extract(&self, blob: &[u8]) -> Result<String> {
        let text = pdf_extract::extract_text_from_mem(blob)
            .map_err(|e| IngestionError::ExtractionFailed(format!("pdf: {}", e)))?;

        debug!(chars = text.len(), "extracted pdf text");
        Ok(text)
    }

    fn name(&self) -> &'static str {
        "pdf"
    }
}

/// DOCX extractor: reads `word/document.xml` from the OOXML archive and
/// collects text runs, mapping paragraph ends to newlines.
pub struct DocxExtractor;

impl Extractor for DocxExtractor {
    fn extract(&self, blob: &[u8]) -> Result<String> {
        let mut archive = zip::ZipArchive::new(Cursor::new(blob))
            .map_err(|e| IngestionError::FileCorrupted(format!("docx archive: {}", e)))?;

        let mut xml = String::new();
        archive
            .by_name("word/document.xml")
            .map_err(|e| IngestionError::FileCorrupted(format!("docx missing document.xml: {}", e)))?
            .read_to_string(&mut xml)
            .map_err(|e| IngestionError::FileCorrupted(format!("docx document.xml: {}", e)))?;

        let text = extract_ooxml_text(&xml, b"w:p", b"w:tab")?;

        debug!(chars = text.len(), "extracted docx text");
        Ok(text)
    }

    fn name(&self) -> &'static str {
        "docx"
    }
}

/// PPTX extractor: reads every `ppt/slides/slideN.xml` in slide order and
/// collects text runs, separating slides with a blank line.
pub struct PptxExtractor;

impl Extractor for PptxExtractor {
    fn extract(&self, blob: &[u8]) -> Result<String> {
        let mut archive = zip::ZipArchive::new(Cursor::new(blob))
            .map_err(|e| IngestionError::FileCorrupted(format!("pptx archive: {}", e)))?;

        let mut slide_names: Vec<String> = archive
            .file_names()
            .filter(|n| n.starts_with("ppt/slides/slide") && n.ends_with(".xml"))
            .map(String::from)
            .collect();
        slide_names.sort_by_key(|n| slide_number(n));

        if slide_names.is_empty() {
            return Err(IngestionError::FileCorrupted("pptx has no slides".to_string()));
        }

        let mut slides = Vec::with_capacity(slide_names.len());
        for name in &slide_names {
            let mut xml = String::new();
            archive
                .by_name(name)
                .map_err(|e| IngestionError::FileCorrupted(format!("pptx slide {}: {}", name, e)))?
                .read_to_string(&mut xml)
                .map_err(|e| IngestionError::FileCorrupted(format!("pptx slide {}: {}", name, e)))?;
            slides.push(extract_ooxml_text(&xml, b"a:p", b"a:tab")?);
        }

        debug!(slides = slides.len(), "extracted pptx text");
        Ok(slides.join("\n\n"))
    }

    fn name(&self) -> &'static str {
        "pptx"
    }
}

/// Collect character data from an OOXML part, emitting a newline at the end
/// of every paragraph element.
fn extract_ooxml_text(xml: &str, paragraph_tag: &[u8], tab_tag: &[u8]) -> Result<String> {
    let mut reader = Reader::from_reader(xml.as_bytes());

    let mut out = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Text(t)) => {
                let piece = t
                    .unescape()
                    .map_err(|e| IngestionError::FileCorrupted(format!("ooxml text: {}", e)))?;
                out.push_str(&piece);
            }
            Ok(Event::Empty(e)) if e.name().as_ref() == tab_tag => out.push('\t'),
            Ok(Event::End(e)) if e.name().as_ref() == paragraph_tag => out.push('\n'),
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(IngestionError::FileCorrupted(format!("ooxml parse: {}", e)));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(out)
}

fn slide_number(name: &str) -> u32 {
    name.trim_start_matches("ppt/slides/slide")
        .trim_end_matches(".xml")
        .parse()
        .unwrap_or(u32::MAX)
}

/// Registry of text extractors keyed by detected file type.
pub struct ExtractorRegistry {
    extractors: HashMap<FileType, Arc<dyn Extractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self {
            extractors: HashMap::new(),
        }
    }

    /// Create with all supported format extractors registered.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(FileType::Pdf, Arc::new(PdfExtractor));
        registry.register(FileType::Docx, Arc::new(DocxExtractor));
        registry.register(FileType::Pptx, Arc::new(PptxExtractor));
        registry.register(FileType::Markdown, Arc::new(MarkdownExtractor));
        registry.register(FileType::Text, Arc::new(PlainTextExtractor));
        registry
    }

    pub fn register(&mut self, file_type: FileType, extractor: Arc<dyn Extractor>) {
        self.extractors.insert(file_type, extractor);
    }

    /// Extract text for a detected file type.
    pub fn extract(&self, file_type: FileType, blob: &[u8]) -> Result<String> {
        let extractor = self
            .extractors
            .get(&file_type)
            .ok_or_else(|| IngestionError::UnsupportedType(file_type.to_string()))?;
        extractor.extract(blob)
    }

    pub fn supports(&self, file_type: FileType) -> bool {
        self.extractors.contains_key(&file_type)
    }

    pub fn list(&self) -> Vec<&'static str> {
        self.extractors.values().map(|e| e.name()).collect()
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_extractor_utf8() {
        let result = PlainTextExtractor.extract("Hello, world!".as_bytes()).unwrap();
        assert_eq!(result, "Hello, world!");
    }

    #[test]
    fn test_plain_text_extractor_latin1_fallback() {
        // "café" in Windows-1252
        let bytes = [0x63, 0x61, 0x66, 0xE9];
        let result = PlainTextExtractor.extract(&bytes).unwrap();
        assert_eq!(result, "caf\u{e9}");
    }

    #[test]
    fn test_markdown_extractor_preserves_structure() {
        let content = "# Heading\n\nSome *text* here.\n";
        let result = MarkdownExtractor.extract(content.as_bytes()).unwrap();
        assert_eq!(result, content);
    }

    #[test]
    fn test_markdown_extractor_rejects_invalid_utf8() {
        let result = MarkdownExtractor.extract(&[0xFF, 0xFE, 0x00]);
        assert!(matches!(result, Err(IngestionError::EncodingError(_))));
    }

    #[test]
    fn test_docx_extractor_rejects_non_archive() {
        let result = DocxExtractor.extract(b"not a zip file");
        assert!(matches!(result, Err(IngestionError::FileCorrupted(_))));
    }

    #[test]
    fn test_pptx_extractor_rejects_non_archive() {
        let result = PptxExtractor.extract(b"not a zip file");
        assert!(matches!(result, Err(IngestionError::FileCorrupted(_))));
    }

    #[test]
    fn test_ooxml_text_collection() {
        let xml = r#"<w:document xmlns:w="ns"><w:body>
            <w:p><w:r><w:t>First paragraph</w:t></w:r></w:p>
            <w:p><w:r><w:t>Second</w:t></w:r><w:r><w:t> paragraph</w:t></w:r></w:p>
        </w:body></w:document>"#;
        let text = extract_ooxml_text(xml, b"w:p", b"w:tab").unwrap();
        assert!(text.contains("First paragraph\n"));
        assert!(text.contains("Second paragraph\n"));
    }

    #[test]
    fn test_slide_ordering() {
        let mut names = vec![
            "ppt/slides/slide10.xml".to_string(),
            "ppt/slides/slide2.xml".to_string(),
            "ppt/slides/slide1.xml".to_string(),
        ];
        names.sort_by_key(|n| slide_number(n));
        assert_eq!(names[0], "ppt/slides/slide1.xml");
        assert_eq!(names[2], "ppt/slides/slide10.xml");
    }

    #[test]
    fn test_registry_dispatch_and_unsupported() {
        let registry = ExtractorRegistry::with_defaults();
        assert!(registry.supports(FileType::Pdf));
        assert_eq!(registry.list().len(), 5);

        let text = registry.extract(FileType::Text, b"hello").unwrap();
        assert_eq!(text, "hello");

        let empty = ExtractorRegistry::new();
        let result = empty.extract(FileType::Pdf, b"%PDF-1.4");
        assert!(matches!(result, Err(IngestionError::UnsupportedType(_))));
    }
}
