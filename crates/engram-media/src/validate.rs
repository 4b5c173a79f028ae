//! Pre-extraction validation: format allowlist and size window.
//!
//! PDF page counting needs the document opened first, so the page cap is
//! enforced in [`crate::pdf`].

use crate::error::MediaError;
use crate::types::{IncomingFile, MediaKind};

pub const MIME_JPEG: &str = "image/jpeg";
pub const MIME_PNG: &str = "image/png";
pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Check format and size. Returns the media kind plus the canonical file
/// extension for the retained copy.
///
/// Boundary: a file of exactly `max_bytes` is accepted; one byte over is
/// rejected. Zero-length files are rejected outright.
pub fn validate(file: &IncomingFile, max_bytes: u64) -> Result<(MediaKind, &'static str), MediaError> {
    let resolved = kind_from_mime(&file.mime)
        .or_else(|| file.file_name.as_deref().and_then(kind_from_extension));
    let (kind, ext) = match resolved {
        Some(k) => k,
        None => {
            return Err(MediaError::UnsupportedFormat(file.mime.clone()));
        }
    };

    let size = file.bytes.len() as u64;
    if size == 0 {
        return Err(MediaError::FileEmpty);
    }
    if size > max_bytes {
        return Err(MediaError::FileTooLarge {
            size,
            max: max_bytes,
        });
    }

    Ok((kind, ext))
}

fn kind_from_mime(mime: &str) -> Option<(MediaKind, &'static str)> {
    // parameters like "; charset=binary" are not part of the media type
    let essence = mime.split(';').next().unwrap_or(mime).trim();
    match essence {
        MIME_JPEG => Some((MediaKind::Image, "jpg")),
        MIME_PNG => Some((MediaKind::Image, "png")),
        MIME_PDF => Some((MediaKind::Pdf, "pdf")),
        MIME_DOCX => Some((MediaKind::Docx, "docx")),
        _ => None,
    }
}

fn kind_from_extension(name: &str) -> Option<(MediaKind, &'static str)> {
    let ext = name.rsplit('.').next()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some((MediaKind::Image, "jpg")),
        "png" => Some((MediaKind::Image, "png")),
        "pdf" => Some((MediaKind::Pdf, "pdf")),
        "docx" => Some((MediaKind::Docx, "docx")),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(mime: &str, len: usize) -> IncomingFile {
        IncomingFile {
            bytes: vec![0u8; len],
            mime: mime.to_string(),
            file_name: None,
            sender_phone: "15550001234".into(),
        }
    }

    #[test]
    fn size_boundaries() {
        let max = 1024;
        assert!(validate(&file(MIME_PDF, 1024), max).is_ok(), "exactly max accepted");
        assert!(matches!(
            validate(&file(MIME_PDF, 1025), max),
            Err(MediaError::FileTooLarge { .. })
        ));
        assert!(matches!(
            validate(&file(MIME_PDF, 0), max),
            Err(MediaError::FileEmpty)
        ));
    }

    #[test]
    fn unsupported_mime_is_rejected() {
        assert!(matches!(
            validate(&file("video/mp4", 10), 1024),
            Err(MediaError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn extension_fallback_for_generic_mime() {
        let mut f = file("application/octet-stream", 10);
        f.file_name = Some("scan.PDF".into());
        let (kind, ext) = validate(&f, 1024).unwrap();
        assert_eq!(kind, MediaKind::Pdf);
        assert_eq!(ext, "pdf");
    }

    #[test]
    fn mime_parameters_are_ignored() {
        let (kind, ext) = validate(&file("image/jpeg; charset=binary", 10), 1024).unwrap();
        assert_eq!(kind, MediaKind::Image);
        assert_eq!(ext, "jpg");
    }
}
