use crate::error::IngestError;
use crate::metadata::DocumentFormat;
use lopdf::Document;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

/// Full extracted text of one source document.
#[derive(Debug, Clone)]
pub struct ParsedText {
    pub source: PathBuf,
    pub format: DocumentFormat,
    pub pages: Vec<PageText>,
    pub text: String,
}

pub trait DocumentParser {
    fn parse(&self, path: &Path) -> Result<ParsedText, IngestError>;
}

#[derive(Default)]
pub struct LopdfExtractor;

impl DocumentParser for LopdfExtractor {
    fn parse(&self, path: &Path) -> Result<ParsedText, IngestError> {
        let document = Document::load(path).map_err(|error| IngestError::parse(path, error))?;

        let mut pages = Vec::new();
        let mut text = String::new();
        for (page_no, _page_id) in document.get_pages() {
            let page_text = document.extract_text(&[page_no]).map_err(|error| {
                IngestError::parse(path, format!("page {page_no}: {error}"))
            })?;

            text.push_str(&page_text);
            text.push('\n');
            pages.push(PageText {
                number: page_no,
                text: page_text,
            });
        }

        finish(path, DocumentFormat::Pdf, pages, text)
    }
}

#[derive(Default)]
pub struct PlainTextParser;

impl DocumentParser for PlainTextParser {
    fn parse(&self, path: &Path) -> Result<ParsedText, IngestError> {
        let bytes = std::fs::read(path).map_err(|error| IngestError::parse(path, error))?;
        let text = String::from_utf8(bytes)
            .map_err(|error| IngestError::parse(path, format!("not valid utf-8: {error}")))?;
        let format = DocumentFormat::from_path(path)?;

        let pages = vec![PageText {
            number: 1,
            text: text.clone(),
        }];
        finish(path, format, pages, text)
    }
}

fn finish(
    path: &Path,
    format: DocumentFormat,
    pages: Vec<PageText>,
    text: String,
) -> Result<ParsedText, IngestError> {
    if text.trim().is_empty() {
        return Err(IngestError::parse(path, "document has no extractable text"));
    }

    Ok(ParsedText {
        source: path.to_path_buf(),
        format,
        pages,
        text,
    })
}

/// Picks the parser from the file extension; unknown extensions are rejected.
pub fn parse_document(path: &Path) -> Result<ParsedText, IngestError> {
    match DocumentFormat::from_path(path)? {
        DocumentFormat::Pdf => LopdfExtractor.parse(path),
        DocumentFormat::PlainText | DocumentFormat::Markdown => PlainTextParser.parse(path),
    }
}
