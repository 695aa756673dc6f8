//! Text extraction from PDF, plain text, DOCX and PPTX sources.
//!
//! Extraction is synchronous and CPU-bound; the orchestrator runs it on the
//! blocking pool. Every failure is a typed [`RagError`] so a bad file can be
//! reported without aborting the rest of a batch.

use std::io::{Cursor, Read};

use tracing::{debug, warn};

use crate::document::{DocumentFormat, SourceFile, extension_of};
use crate::error::{RagError, Result};

/// Plain text extracted from one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    /// The detected source format.
    pub format: DocumentFormat,
    /// The extracted text.
    pub text: String,
    /// Pages (PDF), slides (PPTX) or paragraphs (DOCX); `1` for plain text.
    pub sections: usize,
}

/// Extract text from `file`, dispatching on its extension.
///
/// # Errors
///
/// * [`RagError::UnsupportedFormat`] for unknown extensions
/// * [`RagError::Decode`] for plain text that is not UTF-8
/// * [`RagError::ExtractionFailure`] when a container cannot be opened
pub fn extract(file: &SourceFile) -> Result<ExtractedText> {
    let format = DocumentFormat::from_filename(&file.filename).ok_or_else(|| {
        RagError::UnsupportedFormat {
            filename: file.filename.clone(),
            extension: extension_of(&file.filename).to_string(),
        }
    })?;

    debug!(filename = %file.filename, %format, bytes = file.bytes.len(), "extracting text");

    let extracted = match format {
        DocumentFormat::PlainText => extract_plain_text(file),
        DocumentFormat::Pdf => extract_pdf(file),
        DocumentFormat::WordProcessor => extract_docx(file),
        DocumentFormat::Presentation => extract_pptx(file),
    }?;

    debug!(
        filename = %file.filename,
        chars = extracted.text.chars().count(),
        sections = extracted.sections,
        "extracted text"
    );
    Ok(extracted)
}

fn extract_plain_text(file: &SourceFile) -> Result<ExtractedText> {
    let text = std::str::from_utf8(&file.bytes).map_err(|e| RagError::Decode {
        filename: file.filename.clone(),
        message: e.to_string(),
    })?;
    Ok(ExtractedText { format: DocumentFormat::PlainText, text: text.to_string(), sections: 1 })
}

// ── PDF ─────────────────────────────────────────────────────────────

fn extract_pdf(file: &SourceFile) -> Result<ExtractedText> {
    if file.bytes.is_empty() {
        return Ok(ExtractedText { format: DocumentFormat::Pdf, text: String::new(), sections: 0 });
    }

    // pdf-extract handles font encodings better than lopdf but can panic on
    // malformed input.
    let primary = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(&file.bytes)
    }));

    let pages = match primary {
        Ok(Ok(pages)) => pages,
        Ok(Err(e)) => {
            warn!(filename = %file.filename, error = %e, "pdf-extract failed, falling back to lopdf");
            extract_pdf_pages_lopdf(file)?
        }
        Err(_) => {
            warn!(filename = %file.filename, "pdf-extract panicked, falling back to lopdf");
            extract_pdf_pages_lopdf(file)?
        }
    };

    Ok(ExtractedText { format: DocumentFormat::Pdf, sections: pages.len(), text: pages.join("\n") })
}

/// Page-by-page extraction where an unreadable page contributes an empty string.
fn extract_pdf_pages_lopdf(file: &SourceFile) -> Result<Vec<String>> {
    let doc = lopdf::Document::load_mem(&file.bytes).map_err(|e| RagError::ExtractionFailure {
        filename: file.filename.clone(),
        message: format!("cannot open PDF: {e}"),
    })?;

    let pages = doc
        .get_pages()
        .into_keys()
        .map(|page_number| match doc.extract_text(&[page_number]) {
            Ok(text) => text,
            Err(e) => {
                warn!(filename = %file.filename, page_number, error = %e, "page yielded no text");
                String::new()
            }
        })
        .collect();

    Ok(pages)
}

// ── Office Open XML ─────────────────────────────────────────────────

fn open_archive(file: &SourceFile) -> Result<zip::ZipArchive<Cursor<&[u8]>>> {
    zip::ZipArchive::new(Cursor::new(file.bytes.as_slice())).map_err(|e| {
        RagError::ExtractionFailure {
            filename: file.filename.clone(),
            message: format!("invalid Office archive: {e}"),
        }
    })
}

fn read_archive_entry(
    archive: &mut zip::ZipArchive<Cursor<&[u8]>>,
    name: &str,
    filename: &str,
) -> Result<String> {
    let mut entry = archive.by_name(name).map_err(|_| RagError::ExtractionFailure {
        filename: filename.to_string(),
        message: format!("archive has no {name}"),
    })?;
    let mut xml = String::new();
    entry.read_to_string(&mut xml).map_err(|e| RagError::ExtractionFailure {
        filename: filename.to_string(),
        message: format!("cannot read {name}: {e}"),
    })?;
    Ok(xml)
}

fn extract_docx(file: &SourceFile) -> Result<ExtractedText> {
    if file.bytes.is_empty() {
        return Ok(ExtractedText {
            format: DocumentFormat::WordProcessor,
            text: String::new(),
            sections: 0,
        });
    }

    let mut archive = open_archive(file)?;
    let xml = read_archive_entry(&mut archive, "word/document.xml", &file.filename)?;
    let paragraphs = xml_paragraphs(&xml, "w:p", "w:t");

    Ok(ExtractedText {
        format: DocumentFormat::WordProcessor,
        sections: paragraphs.len(),
        text: paragraphs.join("\n"),
    })
}

fn extract_pptx(file: &SourceFile) -> Result<ExtractedText> {
    if file.bytes.is_empty() {
        return Ok(ExtractedText {
            format: DocumentFormat::Presentation,
            text: String::new(),
            sections: 0,
        });
    }

    let mut archive = open_archive(file)?;

    let mut slides: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| slide_number(name).map(|n| (n, name.to_string())))
        .collect();
    slides.sort_by_key(|(n, _)| *n);

    let mut texts = Vec::with_capacity(slides.len());
    for (_, name) in &slides {
        let xml = read_archive_entry(&mut archive, name, &file.filename)?;
        texts.push(xml_paragraphs(&xml, "a:p", "a:t").join("\n"));
    }

    Ok(ExtractedText {
        format: DocumentFormat::Presentation,
        sections: texts.len(),
        text: texts.join("\n\n"),
    })
}

/// `ppt/slides/slide12.xml` → `Some(12)`.
fn slide_number(name: &str) -> Option<u32> {
    name.strip_prefix("ppt/slides/slide")?.strip_suffix(".xml")?.parse().ok()
}

/// Collect the text runs (`text_tag`) of each paragraph (`para_tag`) in an
/// Office XML part. Empty paragraphs are dropped.
fn xml_paragraphs(xml: &str, para_tag: &str, text_tag: &str) -> Vec<String> {
    let close_text = format!("/{text_tag}");
    let close_para = format!("/{para_tag}");
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    let mut rest = xml;

    while let Some(open) = rest.find('<') {
        if in_text {
            current.push_str(&rest[..open]);
        }
        let Some(close) = rest[open..].find('>') else {
            break;
        };
        let tag = &rest[open + 1..open + close];
        let name = tag.split(|c: char| c.is_whitespace() || c == '/').next().unwrap_or("");
        let self_closing = tag.ends_with('/');

        if tag == close_text {
            in_text = false;
        } else if tag == close_para {
            flush_paragraph(&mut current, &mut paragraphs);
        } else if name == text_tag && !self_closing {
            in_text = true;
        } else if name == "w:tab" || name == "a:tab" {
            current.push('\t');
        } else if name == "w:br" || name == "a:br" {
            current.push('\n');
        }

        rest = &rest[open + close + 1..];
    }
    flush_paragraph(&mut current, &mut paragraphs);

    paragraphs
}

fn flush_paragraph(current: &mut String, paragraphs: &mut Vec<String>) {
    let text = decode_entities(current.trim());
    if !text.is_empty() {
        paragraphs.push(text);
    }
    current.clear();
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
