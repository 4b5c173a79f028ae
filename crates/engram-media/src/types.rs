use std::collections::BTreeMap;
use std::path::PathBuf;

/// An inbound attachment as handed over by the transport adapter.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub bytes: Vec<u8>,
    pub mime: String,
    pub file_name: Option<String>,
    /// Sender phone digits, used in the retained file name.
    pub sender_phone: String,
}

/// Accepted attachment families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Pdf,
    Docx,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Image => write!(f, "image"),
            Self::Pdf => write!(f, "pdf"),
            Self::Docx => write!(f, "docx"),
        }
    }
}

/// Classified document category. Anything the classifier is unsure about
/// stays `Generic`; a specific type is never guessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocumentType {
    Contract,
    Receipt,
    Invoice,
    CourtResolution,
    #[default]
    Generic,
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Contract => write!(f, "contract"),
            Self::Receipt => write!(f, "receipt"),
            Self::Invoice => write!(f, "invoice"),
            Self::CourtResolution => write!(f, "court_resolution"),
            Self::Generic => write!(f, "generic"),
        }
    }
}

impl std::str::FromStr for DocumentType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "contract" => Ok(Self::Contract),
            "receipt" => Ok(Self::Receipt),
            "invoice" => Ok(Self::Invoice),
            "court_resolution" => Ok(Self::CourtResolution),
            "generic" => Ok(Self::Generic),
            other => Err(format!("unknown document type: {other}")),
        }
    }
}

/// How much usable text the extraction produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionQuality {
    Good,
    Fair,
    Poor,
    Failed,
}

/// The result of one ingestion, borrowed by the pipeline for a single turn.
/// The retained original and its `.rawtext` sibling outlive it indefinitely.
#[derive(Debug, Clone)]
pub struct DocumentArtifact {
    pub media_kind: MediaKind,
    pub storage_path: PathBuf,
    pub extracted_text: String,
    pub document_type: DocumentType,
    pub summary: String,
    pub metadata_fields: BTreeMap<String, String>,
    pub quality: ExtractionQuality,
    pub warnings: Vec<String>,
}

impl DocumentArtifact {
    /// Compact block embedded into the user turn's session content.
    pub fn session_summary(&self) -> String {
        let mut out = format!(
            "[attached {}: type {}, quality {:?}]",
            self.media_kind, self.document_type, self.quality
        );
        if !self.summary.is_empty() {
            out.push('\n');
            out.push_str(&self.summary);
        }
        if !self.metadata_fields.is_empty() {
            let fields: Vec<String> = self
                .metadata_fields
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            out.push('\n');
            out.push_str(&fields.join("; "));
        }
        out
    }

    /// Facts worth keeping in long-term memory (contact and transaction
    /// details). Empty when nothing concrete was extracted; data is never
    /// invented.
    pub fn fact_lines(&self) -> Vec<String> {
        if self.metadata_fields.is_empty() {
            return Vec::new();
        }
        let fields: Vec<String> = self
            .metadata_fields
            .iter()
            .map(|(k, v)| format!("{k}: {v}"))
            .collect();
        vec![format!(
            "{} document received ({})",
            self.document_type,
            fields.join(", ")
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_type_roundtrip() {
        for t in [
            DocumentType::Contract,
            DocumentType::Receipt,
            DocumentType::Invoice,
            DocumentType::CourtResolution,
            DocumentType::Generic,
        ] {
            assert_eq!(t.to_string().parse::<DocumentType>().unwrap(), t);
        }
    }

    #[test]
    fn fact_lines_require_extracted_fields() {
        let mut artifact = DocumentArtifact {
            media_kind: MediaKind::Pdf,
            storage_path: PathBuf::from("/tmp/x.pdf"),
            extracted_text: "text".into(),
            document_type: DocumentType::Invoice,
            summary: "An invoice".into(),
            metadata_fields: BTreeMap::new(),
            quality: ExtractionQuality::Good,
            warnings: vec![],
        };
        assert!(artifact.fact_lines().is_empty());

        artifact
            .metadata_fields
            .insert("amount".into(), "1200".into());
        let facts = artifact.fact_lines();
        assert_eq!(facts.len(), 1);
        assert!(facts[0].contains("invoice"));
        assert!(facts[0].contains("amount: 1200"));
    }
}
