//! Per-kind text extraction strategies.

use tracing::debug;

use engram_llm::{with_retry, Completer};

use crate::docx::extract_docx_text;
use crate::error::Result;
use crate::pdf::rasterise_pdf;
use crate::types::{IncomingFile, MediaKind};

/// Inserted between concatenated page texts of a multi-page PDF.
pub const PAGE_SEPARATOR: &str = "\n\n--- page break ---\n\n";

/// Turn an accepted file into text.
///
/// Images go through the vision model; PDFs are rasterised page by page and
/// each page goes through the image strategy; DOCX is parsed structurally
/// with no AI call.
pub async fn extract_text(
    kind: MediaKind,
    file: &IncomingFile,
    completer: &dyn Completer,
    image_ocr_prompt: &str,
    vision_model: &str,
    max_pdf_pages: usize,
) -> Result<String> {
    match kind {
        MediaKind::Image => {
            ocr_image(completer, image_ocr_prompt, &file.bytes, &file.mime, vision_model).await
        }
        MediaKind::Pdf => {
            let pages = rasterise_pdf(&file.bytes, max_pdf_pages)?;
            let mut texts = Vec::with_capacity(pages.len());
            for (i, png) in pages.iter().enumerate() {
                let text =
                    ocr_image(completer, image_ocr_prompt, png, "image/png", vision_model).await?;
                debug!(page = i + 1, chars = text.len(), "page OCR complete");
                texts.push(text);
            }
            Ok(texts.join(PAGE_SEPARATOR))
        }
        MediaKind::Docx => extract_docx_text(&file.bytes),
    }
}

async fn ocr_image(
    completer: &dyn Completer,
    prompt: &str,
    image: &[u8],
    mime: &str,
    model: &str,
) -> Result<String> {
    let text = with_retry("vision-ocr", || {
        completer.complete_vision(prompt, image, mime, model)
    })
    .await?;
    Ok(text)
}
