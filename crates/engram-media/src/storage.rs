//! Retention of accepted originals and their extracted text.
//!
//! Layout: `<media root>/DD-<phone>-<uuid>.<ext>` with the extracted text
//! beside it as `DD-<phone>-<uuid>.<ext>.rawtext` (UTF-8, no BOM, LF).
//! Retention is indefinite.

use std::path::{Path, PathBuf};

use chrono::{Datelike, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;

/// Persist the accepted original under the media root. Returns the full path.
pub fn store_original(root: &Path, sender_phone: &str, ext: &str, bytes: &[u8]) -> Result<PathBuf> {
    std::fs::create_dir_all(root)?;
    let name = format!(
        "{:02}-{}-{}.{}",
        Utc::now().day(),
        sanitize_phone(sender_phone),
        Uuid::new_v4(),
        ext
    );
    let path = root.join(name);
    std::fs::write(&path, bytes)?;
    debug!(path = %path.display(), bytes = bytes.len(), "original retained");
    Ok(path)
}

/// Write the extracted text as the `.rawtext` sibling of the original.
pub fn write_rawtext(original: &Path, text: &str) -> Result<PathBuf> {
    let mut name = original
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(".rawtext");
    let path = original.with_file_name(name);
    std::fs::write(&path, normalize_text(text))?;
    Ok(path)
}

/// Unix line endings, no BOM.
fn normalize_text(text: &str) -> String {
    text.trim_start_matches('\u{feff}')
        .replace("\r\n", "\n")
        .replace('\r', "\n")
}

fn sanitize_phone(phone: &str) -> String {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        "unknown".to_string()
    } else {
        digits
    }
}
