//! Plain-text extraction for uploaded study material.
//!
//! `.pdf` files go through `pdf-extract`; everything else must be UTF-8
//! text. Extraction never panics: a bad upload is an [`ExtractError`] and
//! nothing is indexed.

use std::path::Path;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("file is not valid UTF-8 text")]
    NotUtf8,

    #[error("no text could be extracted from file")]
    Empty,
}

/// Whether `path` is handled as a PDF.
pub fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

/// Read `path` and return its text. Whitespace-only results are rejected.
pub fn extract_file(path: &Path) -> Result<String, ExtractError> {
    let bytes = std::fs::read(path).map_err(|source| ExtractError::Io {
        path: path.display().to_string(),
        source,
    })?;
    extract_bytes(&bytes, is_pdf(path))
}

pub fn extract_bytes(bytes: &[u8], pdf: bool) -> Result<String, ExtractError> {
    let text = if pdf {
        pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))?
    } else {
        String::from_utf8(bytes.to_vec()).map_err(|_| ExtractError::NotUtf8)?
    };

    if text.trim().is_empty() {
        return Err(ExtractError::Empty);
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_passes_through() {
        let text = extract_bytes("Mitochondria make ATP.".as_bytes(), false).unwrap();
        assert_eq!(text, "Mitochondria make ATP.");
    }

    #[test]
    fn test_whitespace_only_rejected() {
        assert!(matches!(
            extract_bytes(b"  \n\t ", false),
            Err(ExtractError::Empty)
        ));
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        assert!(matches!(
            extract_bytes(&[0xff, 0xfe, 0x00], false),
            Err(ExtractError::NotUtf8)
        ));
    }

    #[test]
    fn test_invalid_pdf_returns_error() {
        assert!(matches!(
            extract_bytes(b"not a pdf", true),
            Err(ExtractError::Pdf(_))
        ));
    }

    #[test]
    fn test_pdf_detection_by_extension() {
        assert!(is_pdf(Path::new("notes/Chapter1.PDF")));
        assert!(!is_pdf(Path::new("notes/chapter1.txt")));
        assert!(!is_pdf(Path::new("README")));
    }
}
