//! Ingestion orchestration: validate → retain → extract → classify →
//! metadata → summary.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use engram_core::prompts::PromptSet;
use engram_llm::{Completer, CompletionParams};

use crate::classify::{classify_document, extract_metadata, summarise_document};
use crate::error::{MediaError, Result};
use crate::extract::extract_text;
use crate::storage::{store_original, write_rawtext};
use crate::types::{DocumentArtifact, DocumentType, ExtractionQuality, IncomingFile, MediaKind};
use crate::validate::validate;

#[derive(Debug, Clone)]
pub struct MediaSettings {
    pub storage_root: PathBuf,
    pub max_bytes: u64,
    pub max_pdf_pages: usize,
    /// Params for classification / extraction / summary text calls.
    pub completion: CompletionParams,
    /// Model used for the vision OCR calls.
    pub vision_model: String,
}

pub struct MediaIngestor {
    completer: Arc<dyn Completer>,
    prompts: Arc<PromptSet>,
    settings: MediaSettings,
}

impl MediaIngestor {
    pub fn new(
        completer: Arc<dyn Completer>,
        prompts: Arc<PromptSet>,
        settings: MediaSettings,
    ) -> Self {
        Self {
            completer,
            prompts,
            settings,
        }
    }

    /// Turn an inbound attachment into a [`DocumentArtifact`].
    ///
    /// Validation failures (`UnsupportedFormat`, `FileTooLarge`, `FileEmpty`,
    /// `TooManyPages`) surface as errors for the pipeline to phrase to the
    /// user. A failing OCR call yields a `Failed` artifact; an extraction
    /// that finds no text yields `Poor`. In both cases the original is
    /// already retained.
    pub async fn ingest(&self, file: IncomingFile) -> Result<DocumentArtifact> {
        let (kind, ext) = validate(&file, self.settings.max_bytes)?;
        let storage_path =
            store_original(&self.settings.storage_root, &file.sender_phone, ext, &file.bytes)?;

        let extracted = match extract_text(
            kind,
            &file,
            self.completer.as_ref(),
            &self.prompts.image_ocr,
            &self.settings.vision_model,
            self.settings.max_pdf_pages,
        )
        .await
        {
            Ok(text) => text,
            Err(e) if e.is_rejection() => return Err(e),
            Err(MediaError::Provider(e)) => {
                warn!(error = %e, path = %storage_path.display(), "extraction call failed");
                write_rawtext(&storage_path, "")?;
                return Ok(DocumentArtifact {
                    media_kind: kind,
                    storage_path,
                    extracted_text: String::new(),
                    document_type: DocumentType::Generic,
                    summary: String::new(),
                    metadata_fields: BTreeMap::new(),
                    quality: ExtractionQuality::Failed,
                    warnings: vec![format!("text extraction failed: {e}")],
                });
            }
            Err(e) => return Err(e),
        };

        write_rawtext(&storage_path, &extracted)?;

        if extracted.trim().is_empty() {
            return Ok(DocumentArtifact {
                media_kind: kind,
                storage_path,
                extracted_text: extracted,
                document_type: DocumentType::Generic,
                summary: String::new(),
                metadata_fields: BTreeMap::new(),
                quality: ExtractionQuality::Poor,
                warnings: vec!["no readable text found".to_string()],
            });
        }

        let mut warnings = Vec::new();
        let params = &self.settings.completion;

        let (document_type, notes) = classify_document(
            self.completer.as_ref(),
            params,
            &self.prompts.classification,
            &extracted,
        )
        .await;
        if let Some(notes) = notes {
            warnings.push(notes);
        }

        let metadata_fields = match self.extraction_prompt(document_type) {
            Some(prompt) => {
                let (fields, warning) =
                    extract_metadata(self.completer.as_ref(), params, prompt, &extracted).await;
                if let Some(w) = warning {
                    warnings.push(w);
                }
                fields
            }
            None => BTreeMap::new(),
        };

        let (summary, warning) =
            summarise_document(self.completer.as_ref(), params, &self.prompts.summary, &extracted)
                .await;
        if let Some(w) = warning {
            warnings.push(w);
        }

        let artifact = DocumentArtifact {
            media_kind: kind,
            storage_path,
            quality: assess_quality(&extracted),
            extracted_text: extracted,
            document_type,
            summary,
            metadata_fields,
            warnings,
        };
        info!(
            kind = %artifact.media_kind,
            doc_type = %artifact.document_type,
            quality = ?artifact.quality,
            fields = artifact.metadata_fields.len(),
            "document ingested"
        );
        Ok(artifact)
    }

    /// The type-specific extraction prompt; `Generic` has none.
    fn extraction_prompt(&self, doc_type: DocumentType) -> Option<&str> {
        match doc_type {
            DocumentType::Contract => Some(&self.prompts.extraction_contract),
            DocumentType::Receipt => Some(&self.prompts.extraction_receipt),
            DocumentType::Invoice => Some(&self.prompts.extraction_invoice),
            DocumentType::CourtResolution => Some(&self.prompts.extraction_court_resolution),
            DocumentType::Generic => None,
        }
    }
}

/// Rough usefulness grade of the extracted text.
pub fn assess_quality(text: &str) -> ExtractionQuality {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        ExtractionQuality::Poor
    } else if trimmed.len() < 80 {
        ExtractionQuality::Fair
    } else {
        ExtractionQuality::Good
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use engram_core::MessageRole;
    use engram_llm::{ChatTurn, CompletionOutcome, ProviderError};
    use std::io::Write;

    struct StubCompleter;

    #[async_trait]
    impl Completer for StubCompleter {
        fn name(&self) -> &str {
            "stub"
        }
        async fn complete(
            &self,
            turns: &[ChatTurn],
            _params: &CompletionParams,
        ) -> std::result::Result<CompletionOutcome, ProviderError> {
            let content = turns
                .iter()
                .find(|t| matches!(t.role, MessageRole::User))
                .map(|t| t.content.as_str())
                .unwrap_or("");
            let text = if content.starts_with("CLASSIFY") {
                "invoice".to_string()
            } else if content.starts_with("EXTRACT") {
                r#"{"amount": "1200", "date": "2026-06-01", "client_name": ""}"#.to_string()
            } else {
                "An invoice for services.".to_string()
            };
            Ok(CompletionOutcome {
                text,
                tokens_used: 5,
                finish_reason: "stop".into(),
            })
        }
        async fn complete_vision(
            &self,
            _prompt: &str,
            _image: &[u8],
            _mime: &str,
            _model: &str,
        ) -> std::result::Result<String, ProviderError> {
            Ok("INVOICE #441 total 1200 due 2026-06-01 for legal services rendered in May".into())
        }
    }

    fn prompts() -> Arc<PromptSet> {
        Arc::new(PromptSet {
            system_preamble: "be helpful".into(),
            image_ocr: "OCR".into(),
            classification: "CLASSIFY".into(),
            summary: "SUMMARISE".into(),
            extraction_contract: "EXTRACT contract".into(),
            extraction_receipt: "EXTRACT receipt".into(),
            extraction_invoice: "EXTRACT invoice".into(),
            extraction_court_resolution: "EXTRACT court".into(),
        })
    }

    fn ingestor(root: &std::path::Path) -> MediaIngestor {
        MediaIngestor::new(
            Arc::new(StubCompleter),
            prompts(),
            MediaSettings {
                storage_root: root.to_path_buf(),
                max_bytes: 10 * 1024 * 1024,
                max_pdf_pages: 10,
                completion: CompletionParams {
                    model: "stub".into(),
                    max_tokens: 256,
                    temperature: 0.0,
                },
                vision_model: "stub".into(),
            },
        )
    }

    fn docx_bytes() -> Vec<u8> {
        let mut buf = std::io::Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buf);
            writer
                .start_file("word/document.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            writer
                .write_all(
                    br#"<w:document xmlns:w="x"><w:body><w:p><w:r><w:t>Invoice 441 for legal services. Amount due: 1200. Payable by 2026-06-01.</w:t></w:r></w:p></w:body></w:document>"#,
                )
                .unwrap();
            writer.finish().unwrap();
        }
        buf.into_inner()
    }

    #[tokio::test]
    async fn docx_ingestion_classifies_and_extracts() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = ingestor(dir.path())
            .ingest(IncomingFile {
                bytes: docx_bytes(),
                mime: crate::validate::MIME_DOCX.to_string(),
                file_name: Some("invoice.docx".into()),
                sender_phone: "15550001234".into(),
            })
            .await
            .unwrap();

        assert_eq!(artifact.media_kind, MediaKind::Docx);
        assert_eq!(artifact.document_type, DocumentType::Invoice);
        assert_eq!(artifact.quality, ExtractionQuality::Good);
        assert_eq!(artifact.metadata_fields.get("amount").unwrap(), "1200");
        assert!(
            !artifact.metadata_fields.contains_key("client_name"),
            "empty extraction fields stay unset"
        );
        assert_eq!(artifact.summary, "An invoice for services.");

        // original and rawtext retained side by side
        assert!(artifact.storage_path.exists());
        let raw = artifact
            .storage_path
            .with_file_name(format!(
                "{}.rawtext",
                artifact.storage_path.file_name().unwrap().to_string_lossy()
            ));
        assert!(raw.exists());
        assert!(std::fs::read_to_string(raw).unwrap().contains("Invoice 441"));
    }

    #[tokio::test]
    async fn image_ingestion_uses_vision_text() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = ingestor(dir.path())
            .ingest(IncomingFile {
                bytes: vec![0xFF, 0xD8, 0xFF, 0xE0],
                mime: "image/jpeg".into(),
                file_name: None,
                sender_phone: "15550001234".into(),
            })
            .await
            .unwrap();
        assert_eq!(artifact.media_kind, MediaKind::Image);
        assert!(artifact.extracted_text.contains("INVOICE #441"));
        assert_eq!(artifact.document_type, DocumentType::Invoice);
    }

    #[tokio::test]
    async fn oversized_file_is_rejected_before_any_call() {
        let dir = tempfile::tempdir().unwrap();
        let mut ingestor = ingestor(dir.path());
        ingestor.settings.max_bytes = 4;
        let err = ingestor
            .ingest(IncomingFile {
                bytes: vec![0u8; 5],
                mime: "image/png".into(),
                file_name: None,
                sender_phone: "1".into(),
            })
            .await
            .unwrap_err();
        assert!(err.is_rejection());
    }

    #[test]
    fn quality_grades() {
        assert_eq!(assess_quality(""), ExtractionQuality::Poor);
        assert_eq!(assess_quality("   \n"), ExtractionQuality::Poor);
        assert_eq!(assess_quality("short note"), ExtractionQuality::Fair);
        assert_eq!(assess_quality(&"long text ".repeat(20)), ExtractionQuality::Good);
    }
}
