//! PDF rasterisation for page-as-image OCR.
//!
//! Each page is rendered at [`RASTER_DPI`] (PDF points are 1/72 inch) and
//! encoded as PNG for the vision model. The page budget is enforced after
//! the document is opened, before any rendering work.

use std::io::Cursor;

use pdfium_render::prelude::*;
use tracing::debug;

use crate::error::{MediaError, Result};

pub const RASTER_DPI: f32 = 150.0;

/// Reject documents over the page budget. Boundary: exactly `max_pages`
/// is accepted, one more is rejected.
pub fn ensure_page_budget(pages: usize, max_pages: usize) -> Result<()> {
    if pages > max_pages {
        return Err(MediaError::TooManyPages {
            pages,
            max: max_pages,
        });
    }
    Ok(())
}

/// Open `bytes` as a PDF and render every page to PNG.
pub fn rasterise_pdf(bytes: &[u8], max_pages: usize) -> Result<Vec<Vec<u8>>> {
    let bindings = Pdfium::bind_to_system_library()
        .map_err(|e| MediaError::Pdf(format!("pdfium unavailable: {e}")))?;
    let pdfium = Pdfium::new(bindings);

    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| MediaError::Pdf(format!("cannot open document: {e}")))?;

    let pages = document.pages();
    let page_count = pages.len() as usize;
    ensure_page_budget(page_count, max_pages)?;

    let mut rendered = Vec::with_capacity(page_count);
    for (i, page) in pages.iter().enumerate() {
        let target_width = (page.width().value * RASTER_DPI / 72.0).ceil() as i32;
        let config = PdfRenderConfig::new().set_target_width(target_width);
        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| MediaError::Pdf(format!("render failed on page {}: {e}", i + 1)))?;

        let mut png = Vec::new();
        bitmap
            .as_image()
            .map_err(|e| MediaError::Pdf(format!("bitmap conversion failed on page {}: {e}", i + 1)))?
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .map_err(|e| MediaError::Pdf(format!("PNG encode failed on page {}: {e}", i + 1)))?;
        debug!(page = i + 1, width_px = target_width, bytes = png.len(), "page rasterised");
        rendered.push(png);
    }

    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_budget_boundary_is_inclusive() {
        assert!(ensure_page_budget(10, 10).is_ok());
        assert!(matches!(
            ensure_page_budget(11, 10),
            Err(MediaError::TooManyPages { pages: 11, max: 10 })
        ));
        assert!(ensure_page_budget(0, 10).is_ok());
    }
}
