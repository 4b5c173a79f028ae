//! Prompt templates loaded once at startup.

use std::path::Path;

use crate::config::EngramConfig;
use crate::error::{EngramError, Result};

/// The behavioural preamble plus every document-processing prompt, loaded
/// from the files named in the config. Immutable after startup.
#[derive(Debug, Clone)]
pub struct PromptSet {
    /// Static behavioural policy prepended to every completion request.
    pub system_preamble: String,
    /// Vision prompt asking for verbatim text in original reading direction.
    pub image_ocr: String,
    /// Text prompt classifying extracted text into a document type.
    pub classification: String,
    /// Text prompt producing a short natural-language document summary.
    pub summary: String,
    pub extraction_contract: String,
    pub extraction_receipt: String,
    pub extraction_invoice: String,
    pub extraction_court_resolution: String,
}

impl PromptSet {
    pub fn load(config: &EngramConfig) -> Result<Self> {
        Ok(Self {
            system_preamble: read_template(&config.system_preamble_path)?,
            image_ocr: read_template(&config.prompts.image_ocr)?,
            classification: read_template(&config.prompts.classification)?,
            summary: read_template(&config.prompts.summary)?,
            extraction_contract: read_template(&config.prompts.extraction_contract)?,
            extraction_receipt: read_template(&config.prompts.extraction_receipt)?,
            extraction_invoice: read_template(&config.prompts.extraction_invoice)?,
            extraction_court_resolution: read_template(&config.prompts.extraction_court_resolution)?,
        })
    }
}

fn read_template(path: &Path) -> Result<String> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        EngramError::Prompt(format!("cannot read template {}: {e}", path.display()))
    })?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(EngramError::Prompt(format!(
            "template {} is empty",
            path.display()
        )));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_template_is_rejected() {
        let f = tempfile::NamedTempFile::new().unwrap();
        assert!(read_template(f.path()).is_err());
    }

    #[test]
    fn template_is_trimmed() {
        let f = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(f.path(), "  classify this \n\n").unwrap();
        assert_eq!(read_template(f.path()).unwrap(), "classify this");
    }
}
