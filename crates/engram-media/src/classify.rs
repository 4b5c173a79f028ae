//! Document classification and type-specific metadata extraction.
//!
//! Both are single text completions over the extracted text. The reply
//! scraping is forgiving: classifiers get wordy, and extraction replies may
//! wrap their JSON in prose or a code fence. Anything unparseable degrades
//! to `Generic` / an empty field map, never invented data.

use std::collections::BTreeMap;

use tracing::warn;

use engram_core::MessageRole;
use engram_llm::{with_retry, ChatTurn, Completer, CompletionParams};

use crate::types::DocumentType;

/// Cap on the extracted text sent along with classification/extraction
/// prompts. Documents are short; this is a guard against OCR noise blowups.
const EXCERPT_CHARS: usize = 4000;

/// Ask the completer which document type the text is. Unrecognised or
/// low-confidence replies default to `Generic`. The classifier's extra
/// commentary, if any, is returned as a confidence note.
pub async fn classify_document(
    completer: &dyn Completer,
    params: &CompletionParams,
    prompt: &str,
    text: &str,
) -> (DocumentType, Option<String>) {
    let turns = [ChatTurn::new(
        MessageRole::User,
        format!("{prompt}\n\n{}", excerpt(text)),
    )];
    match with_retry("classify", || completer.complete(&turns, params)).await {
        Ok(outcome) => parse_document_type(&outcome.text),
        Err(e) => {
            warn!(error = %e, "classification call failed, defaulting to generic");
            (DocumentType::Generic, Some(format!("classification failed: {e}")))
        }
    }
}

/// Fill `metadata_fields` with the type-specific extraction prompt.
/// Missing fields stay unset.
pub async fn extract_metadata(
    completer: &dyn Completer,
    params: &CompletionParams,
    prompt: &str,
    text: &str,
) -> (BTreeMap<String, String>, Option<String>) {
    let turns = [ChatTurn::new(
        MessageRole::User,
        format!("{prompt}\n\n{}", excerpt(text)),
    )];
    match with_retry("extract-metadata", || completer.complete(&turns, params)).await {
        Ok(outcome) => match scrape_json_object(&outcome.text) {
            Some(fields) => (fields, None),
            None => {
                warn!("metadata extraction reply had no JSON object");
                (
                    BTreeMap::new(),
                    Some("metadata extraction returned no usable fields".to_string()),
                )
            }
        },
        Err(e) => {
            warn!(error = %e, "metadata extraction call failed");
            (BTreeMap::new(), Some(format!("metadata extraction failed: {e}")))
        }
    }
}

/// Produce the short natural-language summary for the artifact.
pub async fn summarise_document(
    completer: &dyn Completer,
    params: &CompletionParams,
    prompt: &str,
    text: &str,
) -> (String, Option<String>) {
    let turns = [ChatTurn::new(
        MessageRole::User,
        format!("{prompt}\n\n{}", excerpt(text)),
    )];
    match with_retry("summarise-document", || completer.complete(&turns, params)).await {
        Ok(outcome) => (outcome.text.trim().to_string(), None),
        Err(e) => {
            warn!(error = %e, "document summary call failed");
            (String::new(), Some(format!("summary failed: {e}")))
        }
    }
}

/// Map a classifier reply to a document type. The first line carries the
/// verdict; later lines are treated as confidence notes.
pub fn parse_document_type(reply: &str) -> (DocumentType, Option<String>) {
    let mut lines = reply.trim().lines();
    let verdict = lines.next().unwrap_or("").to_lowercase();

    let doc_type = if verdict.contains("court") {
        DocumentType::CourtResolution
    } else if verdict.contains("contract") {
        DocumentType::Contract
    } else if verdict.contains("receipt") {
        DocumentType::Receipt
    } else if verdict.contains("invoice") {
        DocumentType::Invoice
    } else {
        DocumentType::Generic
    };

    let notes: String = lines.collect::<Vec<_>>().join(" ").trim().to_string();
    (doc_type, (!notes.is_empty()).then_some(notes))
}

/// Pull the first `{…}` object out of a reply and keep its scalar fields.
/// Nulls and empty strings are dropped; absent data stays absent.
pub fn scrape_json_object(reply: &str) -> Option<BTreeMap<String, String>> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end < start {
        return None;
    }
    let object: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(&reply[start..=end]).ok()?;

    let mut fields = BTreeMap::new();
    for (key, value) in object {
        let rendered = match value {
            serde_json::Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::Bool(b) => b.to_string(),
            _ => continue,
        };
        fields.insert(key, rendered);
    }
    Some(fields)
}

fn excerpt(text: &str) -> String {
    if text.chars().count() <= EXCERPT_CHARS {
        return text.to_string();
    }
    text.chars().take(EXCERPT_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_keywords_map_to_types() {
        assert_eq!(parse_document_type("invoice").0, DocumentType::Invoice);
        assert_eq!(
            parse_document_type("This is a COURT RESOLUTION").0,
            DocumentType::CourtResolution
        );
        assert_eq!(parse_document_type("Receipt.").0, DocumentType::Receipt);
        assert_eq!(parse_document_type("no idea").0, DocumentType::Generic);
        assert_eq!(parse_document_type("").0, DocumentType::Generic);
    }

    #[test]
    fn trailing_lines_become_confidence_notes() {
        let (t, notes) = parse_document_type("contract\nlow confidence: partial scan");
        assert_eq!(t, DocumentType::Contract);
        assert_eq!(notes.unwrap(), "low confidence: partial scan");
    }

    #[test]
    fn json_scrape_ignores_wrapping_and_empties() {
        let reply = r#"Here you go:
```json
{"merchant": "Blue Cafe", "total": 42.5, "date": "", "note": null}
```"#;
        let fields = scrape_json_object(reply).unwrap();
        assert_eq!(fields.get("merchant").unwrap(), "Blue Cafe");
        assert_eq!(fields.get("total").unwrap(), "42.5");
        assert!(!fields.contains_key("date"), "empty strings are not data");
        assert!(!fields.contains_key("note"));
    }

    #[test]
    fn scrape_without_json_is_none() {
        assert!(scrape_json_object("sorry, nothing here").is_none());
    }
}
