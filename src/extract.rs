//! Multi-format text extraction.
//!
//! Converts one file of a known format into a sequence of
//! [`DocumentRecord`]s. Dispatch happens over the closed
//! [`DocumentFormat`] enum so adding a format is a compile-time concern;
//! unknown extensions yield an empty sequence rather than an error.
//!
//! PDF pages are extracted individually (one record per non-empty page)
//! and any embedded JPEG/JPEG-2000 image on a page is run through the
//! [`OcrEngine`], its text appended to that page's record. Standalone
//! image files go straight to OCR. Spreadsheets and CSV render row-wise
//! with a `" | "` cell delimiter so tabular context survives chunking.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::DocumentRecord;
use crate::ocr::OcrEngine;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb
/// protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;
/// Maximum sheets to process in an xlsx.
const XLSX_MAX_SHEETS: usize = 100;
/// Maximum cells to process per sheet (avoids unbounded memory).
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
/// Maximum embedded images OCR'd per PDF.
const PDF_MAX_OCR_IMAGES: usize = 50;
/// Embedded images narrower or shorter than this are decorative; skip them.
const PDF_MIN_IMAGE_DIM: i64 = 32;

/// Cell delimiter for spreadsheet and CSV rows.
const CELL_DELIMITER: &str = " | ";

/// Extraction error. Callers isolate these: batch ingestion logs and
/// skips the file, session ingestion logs and proceeds with zero records.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
    #[error("delimited text is not valid UTF-8")]
    CsvEncoding,
    #[error("OCR failed: {0}")]
    Ocr(String),
}

/// The closed set of supported file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Xlsx,
    Csv,
    Text,
    Markdown,
    Png,
    Jpeg,
    Webp,
}

impl DocumentFormat {
    /// Map a file path to its format by extension. `None` means the
    /// format is unsupported and extraction will produce no records.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "xlsx" => Some(Self::Xlsx),
            "csv" => Some(Self::Csv),
            "txt" => Some(Self::Text),
            "md" | "markdown" => Some(Self::Markdown),
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "webp" => Some(Self::Webp),
            _ => None,
        }
    }

    fn image_mime(self) -> Option<&'static str> {
        match self {
            Self::Png => Some("image/png"),
            Self::Jpeg => Some("image/jpeg"),
            Self::Webp => Some("image/webp"),
            _ => None,
        }
    }
}

/// True when the path's extension belongs to a supported format.
pub fn is_supported(path: &Path) -> bool {
    DocumentFormat::from_path(path).is_some()
}

/// Extract records from a file on disk. `source_path` is the label
/// recorded on every chunk (a bare filename for uploads, a relative path
/// for corpus documents).
pub async fn extract_file(
    path: &Path,
    source_path: &str,
    ocr: &dyn OcrEngine,
) -> Result<Vec<DocumentRecord>, ExtractError> {
    let Some(format) = DocumentFormat::from_path(path) else {
        return Ok(Vec::new());
    };
    let bytes = std::fs::read(path)?;
    extract_bytes(format, &bytes, source_path, ocr).await
}

/// Extract records from in-memory file content.
pub async fn extract_bytes(
    format: DocumentFormat,
    bytes: &[u8],
    source_path: &str,
    ocr: &dyn OcrEngine,
) -> Result<Vec<DocumentRecord>, ExtractError> {
    match format {
        DocumentFormat::Pdf => extract_pdf(bytes, source_path, ocr).await,
        DocumentFormat::Docx => Ok(single_record(extract_docx(bytes)?, source_path)),
        DocumentFormat::Xlsx => Ok(single_record(extract_xlsx(bytes)?, source_path)),
        DocumentFormat::Csv => Ok(single_record(extract_csv(bytes)?, source_path)),
        DocumentFormat::Text | DocumentFormat::Markdown => {
            let text = String::from_utf8(bytes.to_vec())
                .map_err(|e| ExtractError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
            Ok(single_record(text, source_path))
        }
        DocumentFormat::Png | DocumentFormat::Jpeg | DocumentFormat::Webp => {
            let mime = format.image_mime().unwrap_or("application/octet-stream");
            let text = ocr
                .recognize(bytes, mime)
                .await
                .map_err(|e| ExtractError::Ocr(e.to_string()))?;
            Ok(single_record(text, source_path))
        }
    }
}

/// Wrap trimmed content in a single page-less record, or none if empty.
fn single_record(content: String, source_path: &str) -> Vec<DocumentRecord> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        Vec::new()
    } else {
        vec![DocumentRecord {
            content: trimmed.to_string(),
            source_path: source_path.to_string(),
            page: None,
        }]
    }
}

// --- PDF ---

struct PageImage {
    bytes: Vec<u8>,
    mime: &'static str,
}

async fn extract_pdf(
    bytes: &[u8],
    source_path: &str,
    ocr: &dyn OcrEngine,
) -> Result<Vec<DocumentRecord>, ExtractError> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;

    // Image extraction is best-effort: a PDF whose image streams cannot be
    // walked still yields its page text.
    let mut images_by_page = collect_page_images(bytes);

    let mut records = Vec::new();
    for (i, page_text) in pages.into_iter().enumerate() {
        let mut content = page_text;
        // lopdf page numbers are 1-based.
        for image in images_by_page.remove(&(i as u32 + 1)).unwrap_or_default() {
            match ocr.recognize(&image.bytes, image.mime).await {
                Ok(text) if !text.trim().is_empty() => {
                    content.push('\n');
                    content.push_str(text.trim());
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(page = i, error = %e, "OCR failed for embedded image, skipping it");
                }
            }
        }
        let trimmed = content.trim();
        if !trimmed.is_empty() {
            records.push(DocumentRecord {
                content: trimmed.to_string(),
                source_path: source_path.to_string(),
                page: Some(i as u32),
            });
        }
    }
    Ok(records)
}

fn collect_page_images(bytes: &[u8]) -> HashMap<u32, Vec<PageImage>> {
    let doc = match lopdf::Document::load_mem(bytes) {
        Ok(d) => d,
        Err(e) => {
            debug!(error = %e, "could not walk PDF image streams");
            return HashMap::new();
        }
    };

    let mut map: HashMap<u32, Vec<PageImage>> = HashMap::new();
    let mut count = 0usize;

    for (page_num, page_id) in doc.get_pages() {
        if count >= PDF_MAX_OCR_IMAGES {
            break;
        }
        let page_images = match doc.get_page_images(page_id) {
            Ok(v) => v,
            Err(e) => {
                debug!(page = page_num, error = %e, "failed to get page images");
                continue;
            }
        };
        for image in page_images {
            if count >= PDF_MAX_OCR_IMAGES {
                break;
            }
            if image.width < PDF_MIN_IMAGE_DIM || image.height < PDF_MIN_IMAGE_DIM {
                continue;
            }
            let filters = image.filters.clone().unwrap_or_default();
            // DCTDecode streams are raw JPEG, JPXDecode raw JPEG 2000;
            // both can be handed to OCR as-is. Anything else would need
            // pixel decoding, which this pipeline does not do.
            let mime = if filters.iter().any(|f| f == "DCTDecode") {
                "image/jpeg"
            } else if filters.iter().any(|f| f == "JPXDecode") {
                "image/jp2"
            } else {
                debug!(page = page_num, ?filters, "skipping image with unsupported encoding");
                continue;
            };
            map.entry(page_num).or_default().push(PageImage {
                bytes: image.content.to_vec(),
                mime,
            });
            count += 1;
        }
    }
    map
}

// --- OOXML helpers ---

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= max_bytes {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

fn attr_value(e: &BytesStart, key: &[u8]) -> Option<String> {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == key {
            return String::from_utf8(attr.value.to_vec()).ok();
        }
    }
    None
}

// --- DOCX ---

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let has_document = archive.file_names().any(|n| n == "word/document.xml");
    if !has_document {
        return Err(ExtractError::Ooxml(
            "word/document.xml not found".to_string(),
        ));
    }
    let xml = read_zip_entry_bounded(&mut archive, "word/document.xml", MAX_XML_ENTRY_BYTES)?;
    extract_docx_paragraphs(&xml)
}

/// Collect `<w:t>` run text per paragraph, paragraphs joined by newlines.
fn extract_docx_paragraphs(xml: &[u8]) -> Result<String, ExtractError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut paragraphs: Vec<String> = Vec::new();
    let mut para = String::new();
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_t = true;
                }
            }
            Ok(Event::Text(te)) if in_t => {
                para.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"p" => paragraphs.push(std::mem::take(&mut para)),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    if !para.is_empty() {
        paragraphs.push(para);
    }
    Ok(paragraphs.join("\n"))
}

// --- XLSX ---

fn extract_xlsx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let has_shared = archive.file_names().any(|n| n == "xl/sharedStrings.xml");
    let shared_strings = if has_shared {
        read_shared_strings(&mut archive)?
    } else {
        Vec::new()
    };
    let sheet_names = list_worksheet_names(&mut archive);
    let mut lines: Vec<String> = Vec::new();
    for name in sheet_names.into_iter().take(XLSX_MAX_SHEETS) {
        let sheet_xml = read_zip_entry_bounded(&mut archive, &name, MAX_XML_ENTRY_BYTES)?;
        lines.extend(extract_sheet_rows(&sheet_xml, &shared_strings)?);
    }
    Ok(lines.join("\n"))
}

fn read_shared_strings(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
) -> Result<Vec<String>, ExtractError> {
    let xml = read_zip_entry_bounded(archive, "xl/sharedStrings.xml", MAX_XML_ENTRY_BYTES)?;
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" if current.is_some() => in_t = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_t => {
                if let Some(s) = current.as_mut() {
                    s.push_str(te.unescape().unwrap_or_default().as_ref());
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"si" => strings.push(current.take().unwrap_or_default()),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

fn list_worksheet_names(archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches("xl/worksheets/sheet")
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

#[derive(Clone, Copy, PartialEq)]
enum CellKind {
    Shared,
    Inline,
    Raw,
}

fn cell_kind(e: &BytesStart) -> CellKind {
    match attr_value(e, b"t").as_deref() {
        Some("s") => CellKind::Shared,
        Some("inlineStr") => CellKind::Inline,
        _ => CellKind::Raw,
    }
}

/// 0-based column index from a cell reference like `B2` or `AA10`.
fn column_index(reference: &str) -> Option<usize> {
    let mut col = 0usize;
    let mut seen = false;
    for c in reference.chars() {
        if c.is_ascii_alphabetic() {
            col = col * 26 + (c.to_ascii_uppercase() as usize - 'A' as usize + 1);
            seen = true;
        } else {
            break;
        }
    }
    if seen {
        Some(col - 1)
    } else {
        None
    }
}

/// Render one worksheet as lines of `" | "`-joined cell values. Cells
/// absent from the XML render as empty strings, keyed off the cell
/// reference attribute.
fn extract_sheet_rows(xml: &[u8], shared_strings: &[String]) -> Result<Vec<String>, ExtractError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut lines: Vec<String> = Vec::new();
    let mut cells: Vec<String> = Vec::new();
    let mut pending: Option<String> = None;
    let mut kind = CellKind::Raw;
    let mut in_v = false;
    let mut in_inline_t = false;
    let mut cell_count = 0usize;

    loop {
        if cell_count >= XLSX_MAX_CELLS_PER_SHEET {
            break;
        }
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"row" => cells.clear(),
                b"c" => {
                    if let Some(col) = attr_value(&e, b"r").as_deref().and_then(column_index) {
                        while cells.len() < col {
                            cells.push(String::new());
                        }
                    }
                    kind = cell_kind(&e);
                    pending = Some(String::new());
                }
                b"v" => in_v = true,
                b"t" if pending.is_some() && kind == CellKind::Inline => in_inline_t = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"c" => {
                    if let Some(col) = attr_value(&e, b"r").as_deref().and_then(column_index) {
                        while cells.len() < col {
                            cells.push(String::new());
                        }
                    }
                    cells.push(String::new());
                    cell_count += 1;
                }
                b"row" => lines.push(String::new()),
                _ => {}
            },
            Ok(Event::Text(te)) => {
                let value = te.unescape().unwrap_or_default();
                if in_v {
                    if let Some(p) = pending.as_mut() {
                        match kind {
                            CellKind::Shared => {
                                if let Ok(i) = value.trim().parse::<usize>() {
                                    if let Some(s) = shared_strings.get(i) {
                                        p.push_str(s);
                                    }
                                }
                            }
                            _ => p.push_str(value.as_ref()),
                        }
                    }
                } else if in_inline_t {
                    if let Some(p) = pending.as_mut() {
                        p.push_str(value.as_ref());
                    }
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" => in_v = false,
                b"t" => in_inline_t = false,
                b"c" => {
                    if let Some(p) = pending.take() {
                        cells.push(p);
                        cell_count += 1;
                    }
                }
                b"row" => lines.push(cells.join(CELL_DELIMITER)),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(lines)
}

// --- CSV ---

fn extract_csv(bytes: &[u8]) -> Result<String, ExtractError> {
    let text = std::str::from_utf8(bytes).map_err(|_| ExtractError::CsvEncoding)?;
    let lines: Vec<String> = csv_rows(text)
        .into_iter()
        .map(|row| row.join(CELL_DELIMITER))
        .collect();
    Ok(lines.join("\n"))
}

/// Minimal quote-aware CSV row parser: `""` escapes a quote inside a
/// quoted field, newlines inside quotes are preserved, CRLF line endings
/// are handled.
fn csv_rows(text: &str) -> Vec<Vec<String>> {
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                _ => field.push(c),
            }
        } else {
            match c {
                '"' => in_quotes = true,
                ',' => row.push(std::mem::take(&mut field)),
                '\r' => {}
                '\n' => {
                    row.push(std::mem::take(&mut field));
                    rows.push(std::mem::take(&mut row));
                }
                _ => field.push(c),
            }
        }
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::DisabledOcr;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn build_zip(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut cursor);
            for (name, content) in entries {
                writer
                    .start_file(name.to_string(), SimpleFileOptions::default())
                    .unwrap();
                writer.write_all(content.as_bytes()).unwrap();
            }
            writer.finish().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn format_dispatch_by_extension() {
        assert_eq!(
            DocumentFormat::from_path(Path::new("a/report.PDF")),
            Some(DocumentFormat::Pdf)
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("notes.md")),
            Some(DocumentFormat::Markdown)
        );
        assert_eq!(DocumentFormat::from_path(Path::new("archive.tar.gz")), None);
        assert_eq!(DocumentFormat::from_path(Path::new("no_extension")), None);
    }

    #[tokio::test]
    async fn plain_text_yields_one_record() {
        let records = extract_bytes(
            DocumentFormat::Text,
            b"  invoice total: 42 dollars  \n",
            "invoice.txt",
            &DisabledOcr,
        )
        .await
        .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].content, "invoice total: 42 dollars");
        assert_eq!(records[0].source_path, "invoice.txt");
        assert_eq!(records[0].page, None);
    }

    #[tokio::test]
    async fn empty_text_yields_no_records() {
        let records = extract_bytes(DocumentFormat::Text, b"   \n\t ", "blank.txt", &DisabledOcr)
            .await
            .unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn image_without_ocr_yields_no_records() {
        let records = extract_bytes(
            DocumentFormat::Png,
            &[0x89, 0x50, 0x4E, 0x47],
            "scan.png",
            &DisabledOcr,
        )
        .await
        .unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn invalid_pdf_is_an_error() {
        let err = extract_bytes(DocumentFormat::Pdf, b"not a pdf", "bad.pdf", &DisabledOcr)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[tokio::test]
    async fn docx_paragraphs_join_with_newlines() {
        let xml = r#"<?xml version="1.0"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>First paragraph.</w:t></w:r></w:p>
    <w:p><w:r><w:t>Second</w:t></w:r><w:r><w:t> half.</w:t></w:r></w:p>
  </w:body>
</w:document>"#;
        let bytes = build_zip(&[("word/document.xml", xml)]);
        let records = extract_bytes(DocumentFormat::Docx, &bytes, "memo.docx", &DisabledOcr)
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].content, "First paragraph.\nSecond half.");
    }

    #[tokio::test]
    async fn docx_without_document_xml_is_an_error() {
        let bytes = build_zip(&[("word/other.xml", "<a/>")]);
        let err = extract_bytes(DocumentFormat::Docx, &bytes, "memo.docx", &DisabledOcr)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Ooxml(_)));
    }

    #[tokio::test]
    async fn xlsx_rows_join_cells_with_delimiter() {
        let shared = r#"<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
<si><t>name</t></si><si><t>total</t></si></sst>"#;
        let sheet = r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
<sheetData>
  <row r="1"><c r="A1" t="s"><v>0</v></c><c r="C1" t="s"><v>1</v></c></row>
  <row r="2"><c r="A2"><v>42</v></c><c r="B2" t="inlineStr"><is><t>hello</t></is></c></row>
</sheetData></worksheet>"#;
        let bytes = build_zip(&[
            ("xl/sharedStrings.xml", shared),
            ("xl/worksheets/sheet1.xml", sheet),
        ]);
        let records = extract_bytes(DocumentFormat::Xlsx, &bytes, "book.xlsx", &DisabledOcr)
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        // B1 is absent from the XML and renders as an empty cell.
        assert_eq!(records[0].content, "name |  | total\n42 | hello");
    }

    #[tokio::test]
    async fn xlsx_without_shared_strings_still_extracts() {
        let sheet = r#"<worksheet><sheetData>
  <row r="1"><c r="A1"><v>1</v></c><c r="B1"><v>2</v></c></row>
</sheetData></worksheet>"#;
        let bytes = build_zip(&[("xl/worksheets/sheet1.xml", sheet)]);
        let records = extract_bytes(DocumentFormat::Xlsx, &bytes, "book.xlsx", &DisabledOcr)
            .await
            .unwrap();
        assert_eq!(records[0].content, "1 | 2");
    }

    #[tokio::test]
    async fn empty_xlsx_yields_no_records() {
        let sheet = r#"<worksheet><sheetData/></worksheet>"#;
        let bytes = build_zip(&[("xl/worksheets/sheet1.xml", sheet)]);
        let records = extract_bytes(DocumentFormat::Xlsx, &bytes, "book.xlsx", &DisabledOcr)
            .await
            .unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn csv_rows_join_with_delimiter() {
        let csv = "name,qty,price\nwidget,2,\"1,000.50\"\n\"say \"\"hi\"\"\",,3\n";
        let records = extract_bytes(
            DocumentFormat::Csv,
            csv.as_bytes(),
            "items.csv",
            &DisabledOcr,
        )
        .await
        .unwrap();
        assert_eq!(
            records[0].content,
            "name | qty | price\nwidget | 2 | 1,000.50\nsay \"hi\" |  | 3"
        );
    }

    #[tokio::test]
    async fn binary_csv_is_an_error() {
        let err = extract_bytes(
            DocumentFormat::Csv,
            &[0xff, 0xfe, 0x00],
            "items.csv",
            &DisabledOcr,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ExtractError::CsvEncoding));
    }

    #[test]
    fn csv_parser_handles_quotes_and_crlf() {
        let rows = csv_rows("a,\"b\r\nc\",d\r\ne,f\r\n");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], vec!["a", "b\r\nc", "d"]);
        assert_eq!(rows[1], vec!["e", "f"]);
    }

    #[test]
    fn column_references_parse_to_indices() {
        assert_eq!(column_index("A1"), Some(0));
        assert_eq!(column_index("B2"), Some(1));
        assert_eq!(column_index("Z9"), Some(25));
        assert_eq!(column_index("AA10"), Some(26));
        assert_eq!(column_index("10"), None);
    }
}
