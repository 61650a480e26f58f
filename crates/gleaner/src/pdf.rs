//! Plain text extraction from PDF payloads.

use lopdf::Document;

use super::*;

/// Turns a persisted payload into text for the summarizer.
pub trait Extractor: Send + Sync {
  /// Extracts the text of every page, in page order.
  fn extract(&self, data: &[u8]) -> Result<String>;
}

/// [`Extractor`] built on `lopdf`.
///
/// Pages whose text cannot be decoded are skipped with a warning; a document where no page yields
/// text is an error.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractor;

impl PdfExtractor {
  /// Creates an extractor.
  pub fn new() -> Self { Self }
}

impl Extractor for PdfExtractor {
  fn extract(&self, data: &[u8]) -> Result<String> {
    let doc = Document::load_mem(data)?;
    if doc.is_encrypted() {
      return Err(GleanerError::Extraction("document is encrypted".into()));
    }

    let pages = doc.get_pages();
    if let Some(title) = document_title(&doc) {
      debug!("Extracting {} page(s) of {title:?}", pages.len());
    }

    let mut text = Vec::with_capacity(pages.len());
    for page_number in pages.keys() {
      match doc.extract_text(&[*page_number]) {
        Ok(page) => text.push(page),
        Err(e) => warn!("Skipping page {page_number}: {e}"),
      }
    }

    let text = text.join(" ");
    if text.trim().is_empty() {
      return Err(GleanerError::Extraction(format!(
        "no text found in {} page(s)",
        pages.len()
      )));
    }
    trace!("Extracted {} characters (~{} tokens)", text.len(), text.len() / 4);
    Ok(text)
  }
}

/// `Title` entry of the document information dictionary.
fn document_title(doc: &Document) -> Option<String> {
  let info = doc.trailer.get(b"Info").ok()?.as_reference().ok()?;
  let bytes = doc.get_object(info).and_then(|obj| obj.as_dict()).ok()?.get(b"Title").ok()?;
  let bytes = bytes.as_str().ok()?;

  // Text strings are either PDFDocEncoding or UTF-16BE with a byte order mark.
  let title = match bytes.strip_prefix(&[0xFE, 0xFF]) {
    Some(utf16) => {
      let units: Vec<u16> =
        utf16.chunks_exact(2).map(|pair| u16::from_be_bytes([pair[0], pair[1]])).collect();
      String::from_utf16_lossy(&units)
    },
    None => String::from_utf8_lossy(bytes).into_owned(),
  };
  Some(title).filter(|title| !title.trim().is_empty())
}
