//! Text and metadata extraction from source files.
//!
//! PDF extraction combines `lopdf` (page count and the Info dictionary) with
//! `pdf-extract` (text content). EML extraction uses `mail-parser` and
//! produces a header block followed by the message body. Extraction is pure
//! with respect to the library: nothing here touches the store or index.

use std::path::Path;

use mail_parser::MessageParser;

use crate::error::{Result, ShelfError};
use crate::models::{DocumentMetadata, ExtractedDocument};

/// Extracts a source file, dispatching on its extension (`.pdf` / `.eml`,
/// case-insensitive).
pub fn extract(path: &Path) -> Result<ExtractedDocument> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_lowercase();
    if name.ends_with(".pdf") {
        extract_pdf(path)
    } else if name.ends_with(".eml") {
        extract_eml(path)
    } else {
        Err(ShelfError::Extraction(format!(
            "unsupported file type: {}",
            path.display()
        )))
    }
}

/// Extracts text and metadata from a PDF file.
pub fn extract_pdf(path: &Path) -> Result<ExtractedDocument> {
    if !path.exists() {
        return Err(ShelfError::Extraction(format!(
            "file not found: {}",
            path.display()
        )));
    }

    let document = lopdf::Document::load(path)
        .map_err(|e| ShelfError::Extraction(format!("failed to open PDF: {}", e)))?;
    let page_count = document.get_pages().len() as u32;
    let metadata = pdf_metadata(&document);

    let text = pdf_extract::extract_text(path)
        .map_err(|e| ShelfError::Extraction(format!("failed to extract PDF text: {}", e)))?;

    if text.trim().is_empty() {
        return Err(ShelfError::NoExtractableText);
    }

    Ok(build_extracted(text, metadata, page_count, path))
}

/// Extracts text and metadata from an EML file. The text is a header block
/// (From/To/Cc/Date/Subject) followed by the message body; HTML-only
/// messages fall back to the HTML part converted to text.
pub fn extract_eml(path: &Path) -> Result<ExtractedDocument> {
    if !path.exists() {
        return Err(ShelfError::Extraction(format!(
            "file not found: {}",
            path.display()
        )));
    }

    let bytes = std::fs::read(path)
        .map_err(|e| ShelfError::Extraction(format!("failed to read EML: {}", e)))?;
    let message = MessageParser::default()
        .parse(&bytes)
        .ok_or_else(|| ShelfError::Extraction("failed to parse EML".to_string()))?;

    let subject = message.subject().unwrap_or("").trim().to_string();
    let from = format_address(message.from());
    let date = message
        .date()
        .map(|d| d.to_rfc3339())
        .unwrap_or_default();
    let creator = message
        .header_raw("X-Mailer")
        .unwrap_or("")
        .trim()
        .to_string();

    let metadata = DocumentMetadata {
        title: subject.clone(),
        author: from.clone(),
        subject: "Email".to_string(),
        keywords: String::new(),
        creator,
        creation_date: date.clone(),
    };

    let mut header_lines = Vec::new();
    for (label, value) in [
        ("From", from),
        ("To", format_address(message.to())),
        ("Cc", format_address(message.cc())),
        ("Date", date),
        ("Subject", subject),
    ] {
        if !value.is_empty() {
            header_lines.push(format!("{}: {}", label, value));
        }
    }
    let header_block = header_lines.join("\n");

    let body = message
        .body_text(0)
        .or_else(|| message.body_html(0))
        .map(|b| b.trim().to_string())
        .unwrap_or_default();

    let text = [header_block, body]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

    if text.is_empty() {
        return Err(ShelfError::Extraction(
            "no readable text content found in EML".to_string(),
        ));
    }

    Ok(build_extracted(text, metadata, 1, path))
}

fn build_extracted(
    text: String,
    metadata: DocumentMetadata,
    page_count: u32,
    path: &Path,
) -> ExtractedDocument {
    let source_path = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let char_count = text.chars().count();
    ExtractedDocument {
        text,
        metadata,
        page_count,
        source_path,
        char_count,
    }
}

fn pdf_metadata(document: &lopdf::Document) -> DocumentMetadata {
    let info = document
        .trailer
        .get(b"Info")
        .and_then(|obj| match obj {
            lopdf::Object::Reference(id) => document.get_object(*id),
            other => Ok(other),
        })
        .and_then(|obj| obj.as_dict());

    let Ok(info) = info else {
        return DocumentMetadata::default();
    };

    let field = |key: &[u8]| {
        info.get(key)
            .ok()
            .and_then(|obj| match obj {
                lopdf::Object::String(bytes, _) => Some(decode_pdf_string(bytes)),
                _ => None,
            })
            .unwrap_or_default()
    };

    DocumentMetadata {
        title: field(b"Title"),
        author: field(b"Author"),
        subject: field(b"Subject"),
        keywords: field(b"Keywords"),
        creator: field(b"Creator"),
        creation_date: field(b"CreationDate"),
    }
}

/// PDF text strings are either UTF-16BE with a BOM or a latin-ish byte
/// encoding; anything undecodable is replaced, never fatal.
fn decode_pdf_string(bytes: &[u8]) -> String {
    if bytes.starts_with(&[0xFE, 0xFF]) {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

fn format_address(address: Option<&mail_parser::Address>) -> String {
    let Some(address) = address else {
        return String::new();
    };
    address
        .iter()
        .map(|addr| {
            let name = addr.name().unwrap_or("").trim();
            let email = addr.address().unwrap_or("").trim();
            match (name.is_empty(), email.is_empty()) {
                (false, false) => format!("{} <{}>", name, email),
                (false, true) => name.to_string(),
                (true, false) => email.to_string(),
                (true, true) => String::new(),
            }
        })
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE_EML: &str = "From: Jamie Rivera <jamie@example.com>\r\n\
To: Docs Team <docs@example.com>\r\n\
Subject: Budget approval\r\n\
Date: Mon, 3 Jun 2024 10:00:00 +0000\r\n\
X-Mailer: TestMailer 1.0\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Please find the approved budget attached.\r\n";

    #[test]
    fn dispatch_rejects_unknown_extensions() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("notes.txt");
        std::fs::write(&path, "hello").unwrap();
        let err = extract(&path).unwrap_err();
        assert!(matches!(err, ShelfError::Extraction(_)));
    }

    #[test]
    fn missing_pdf_is_extraction_error() {
        let err = extract_pdf(Path::new("/nonexistent/file.pdf")).unwrap_err();
        assert!(matches!(err, ShelfError::Extraction(_)));
    }

    #[test]
    fn garbage_pdf_is_extraction_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.pdf");
        std::fs::write(&path, "this is not a pdf").unwrap();
        let err = extract_pdf(&path).unwrap_err();
        assert!(matches!(err, ShelfError::Extraction(_)));
    }

    #[test]
    fn eml_extracts_headers_metadata_and_body() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("mail.eml");
        std::fs::write(&path, SAMPLE_EML).unwrap();

        let doc = extract(&path).unwrap();
        assert_eq!(doc.metadata.title, "Budget approval");
        assert_eq!(doc.metadata.author, "Jamie Rivera <jamie@example.com>");
        assert_eq!(doc.metadata.subject, "Email");
        assert_eq!(doc.metadata.creator, "TestMailer 1.0");
        assert_eq!(doc.page_count, 1);

        assert!(doc.text.contains("From: Jamie Rivera <jamie@example.com>"));
        assert!(doc.text.contains("To: Docs Team <docs@example.com>"));
        assert!(doc.text.contains("Subject: Budget approval"));
        assert!(doc.text.contains("Please find the approved budget"));
        assert_eq!(doc.char_count, doc.text.chars().count());
    }

    #[test]
    fn eml_without_any_text_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("empty.eml");
        std::fs::write(&path, "\r\n").unwrap();
        assert!(extract_eml(&path).is_err());
    }

    #[test]
    fn pdf_string_decoding_handles_utf16be_bom() {
        let mut bytes = vec![0xFE, 0xFF];
        for unit in "財務".encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        assert_eq!(decode_pdf_string(&bytes), "財務");
        assert_eq!(decode_pdf_string(b"Plain Title"), "Plain Title");
    }
}
