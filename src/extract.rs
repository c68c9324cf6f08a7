//! Local text extraction for binary office documents.
//!
//! Used by [`crate::parser::LocalParser`] when no cloud parser is
//! configured. Each format is split into [`Section`]s the way a reader would
//! page through it: one per slide for PPTX, one per worksheet for XLSX, and a
//! single section for PDF and DOCX.
//!
//! Legacy binary formats (`.doc`, `.ppt`) are not supported locally.

use std::io::Read;

use quick_xml::events::Event;
use thiserror::Error;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_PPTX: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";
pub const MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

const XLSX_MAX_SHEETS: usize = 100;
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
/// Zip-bomb guard: maximum decompressed bytes read from one archive entry.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
}

fn ooxml(e: impl std::fmt::Display) -> ExtractError {
    ExtractError::Ooxml(e.to_string())
}

/// Formats the local extractor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Docx,
    Pptx,
    Xlsx,
}

impl DocumentKind {
    /// Map a lowercase file extension (without the dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "pptx" => Some(Self::Pptx),
            "xlsx" => Some(Self::Xlsx),
            _ => None,
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            Self::Pdf => MIME_PDF,
            Self::Docx => MIME_DOCX,
            Self::Pptx => MIME_PPTX,
            Self::Xlsx => MIME_XLSX,
        }
    }
}

/// A labelled run of extracted text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// `"slide 3"`, `"sheet 1"`; `None` for whole-document formats.
    pub label: Option<String>,
    pub text: String,
}

/// Extract the text of `bytes` as a list of sections. Sections with no text
/// are dropped.
pub fn extract_sections(bytes: &[u8], kind: DocumentKind) -> Result<Vec<Section>, ExtractError> {
    let sections = match kind {
        DocumentKind::Pdf => vec![Section {
            label: None,
            text: pdf_extract::extract_text_from_mem(bytes)
                .map_err(|e| ExtractError::Pdf(e.to_string()))?,
        }],
        DocumentKind::Docx => {
            let mut archive = open_archive(bytes)?;
            let xml = read_entry(&mut archive, "word/document.xml")?;
            vec![Section {
                label: None,
                text: paragraph_text(&xml)?,
            }]
        }
        DocumentKind::Pptx => {
            let mut archive = open_archive(bytes)?;
            let mut out = Vec::new();
            for (n, name) in numbered_entries(&archive, "ppt/slides/slide") {
                let xml = read_entry(&mut archive, &name)?;
                out.push(Section {
                    label: Some(format!("slide {}", n)),
                    text: paragraph_text(&xml)?,
                });
            }
            out
        }
        DocumentKind::Xlsx => {
            let mut archive = open_archive(bytes)?;
            let shared = shared_strings(&mut archive)?;
            let mut out = Vec::new();
            for (n, name) in numbered_entries(&archive, "xl/worksheets/sheet")
                .into_iter()
                .take(XLSX_MAX_SHEETS)
            {
                let xml = read_entry(&mut archive, &name)?;
                out.push(Section {
                    label: Some(format!("sheet {}", n)),
                    text: sheet_text(&xml, &shared)?,
                });
            }
            out
        }
    };

    Ok(sections
        .into_iter()
        .filter(|s| !s.text.trim().is_empty())
        .collect())
}

type Archive<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

fn open_archive(bytes: &[u8]) -> Result<Archive<'_>, ExtractError> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(ooxml)
}

fn read_entry(archive: &mut Archive<'_>, name: &str) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(ooxml)?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Ooxml(format!(
            "{} exceeds size limit ({} bytes)",
            name, MAX_XML_ENTRY_BYTES
        )));
    }
    Ok(out)
}

/// Entries named `{prefix}{n}.xml`, sorted by `n`.
fn numbered_entries(archive: &Archive<'_>, prefix: &str) -> Vec<(u32, String)> {
    let mut entries: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| {
            let n = name
                .strip_prefix(prefix)?
                .strip_suffix(".xml")?
                .parse::<u32>()
                .ok()?;
            Some((n, name.to_string()))
        })
        .collect();
    entries.sort();
    entries
}

/// Text of every `<*:t>` element, with a newline at the end of each `<*:p>`.
/// Works for both WordprocessingML and DrawingML.
fn paragraph_text(xml: &[u8]) -> Result<String, ExtractError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut out = String::new();
    let mut in_t = false;

    loop {
        match reader.read_event_into(&mut buf).map_err(ooxml)? {
            Event::Start(e) if e.local_name().as_ref() == b"t" => in_t = true,
            Event::Text(te) if in_t => {
                out.push_str(&te.unescape().map_err(ooxml)?);
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"p" => {
                    if !out.is_empty() && !out.ends_with('\n') {
                        out.push('\n');
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}

fn shared_strings(archive: &mut Archive<'_>) -> Result<Vec<String>, ExtractError> {
    // Workbooks with only numeric cells have no shared string table.
    if archive.by_name("xl/sharedStrings.xml").is_err() {
        return Ok(Vec::new());
    }
    let xml = read_entry(archive, "xl/sharedStrings.xml")?;
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;

    loop {
        match reader.read_event_into(&mut buf).map_err(ooxml)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_t = true,
                _ => {}
            },
            Event::Text(te) if in_t => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&te.unescape().map_err(ooxml)?);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"si" => strings.extend(current.take()),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Cell values of one worksheet, space-separated. Shared-string cells are
/// resolved; numeric and inline values are kept as written.
fn sheet_text(xml: &[u8], shared: &[String]) -> Result<String, ExtractError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut cells: Vec<String> = Vec::new();
    let mut cell_is_shared = false;
    let mut in_value = false;

    loop {
        if cells.len() >= XLSX_MAX_CELLS_PER_SHEET {
            break;
        }
        match reader.read_event_into(&mut buf).map_err(ooxml)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"c" => {
                    cell_is_shared = e.attributes().flatten().any(|a| {
                        a.key.local_name().as_ref() == b"t" && a.value.as_ref() == b"s"
                    });
                }
                b"v" | b"t" => in_value = true,
                _ => {}
            },
            Event::Text(te) if in_value => {
                let raw = te.unescape().map_err(ooxml)?;
                let value = raw.trim();
                if value.is_empty() {
                    // whitespace between tags
                } else if cell_is_shared {
                    if let Some(s) = value.parse::<usize>().ok().and_then(|i| shared.get(i)) {
                        cells.push(s.clone());
                    }
                } else {
                    cells.push(value.to_string());
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => cell_is_shared = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(cells.join(" "))
}
