//! DOCX text extraction: paragraphs and table cells, no AI involved.
//!
//! A DOCX file is a zip archive; the body lives in `word/document.xml`.
//! We walk the XML and collect the text runs (`w:t`), emitting a newline at
//! each paragraph end (`w:p`) and a tab between table cells (`w:tc`). That
//! covers both plain paragraphs and table content in one pass.

use std::io::{Cursor, Read};

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{MediaError, Result};

pub fn extract_docx_text(bytes: &[u8]) -> Result<String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| MediaError::Docx(format!("not a zip archive: {e}")))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| MediaError::Docx(format!("missing word/document.xml: {e}")))?
        .read_to_string(&mut xml)
        .map_err(|e| MediaError::Docx(format!("document.xml is not UTF-8: {e}")))?;

    parse_document_xml(&xml)
}

fn parse_document_xml(xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut out = String::new();
    let mut in_text_run = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text_run = true,
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text_run = false,
                b"p" => out.push('\n'),
                b"tc" => out.push('\t'),
                _ => {}
            },
            Ok(Event::Text(t)) if in_text_run => {
                let text = t
                    .unescape()
                    .map_err(|e| MediaError::Docx(format!("bad entity: {e}")))?;
                out.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(MediaError::Docx(format!("malformed XML: {e}"))),
            _ => {}
        }
    }

    Ok(out.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn docx_with_body(body_xml: &str) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buf);
            writer
                .start_file("word/document.xml", SimpleFileOptions::default())
                .unwrap();
            let doc = format!(
                r#"<?xml version="1.0" encoding="UTF-8"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
<w:body>{body_xml}</w:body></w:document>"#
            );
            writer.write_all(doc.as_bytes()).unwrap();
            writer.finish().unwrap();
        }
        buf.into_inner()
    }

    #[test]
    fn paragraphs_and_tables_are_extracted() {
        let bytes = docx_with_body(
            "<w:p><w:r><w:t>Service agreement</w:t></w:r></w:p>\
             <w:tbl><w:tr>\
               <w:tc><w:p><w:r><w:t>Amount</w:t></w:r></w:p></w:tc>\
               <w:tc><w:p><w:r><w:t>1200</w:t></w:r></w:p></w:tc>\
             </w:tr></w:tbl>",
        );
        let text = extract_docx_text(&bytes).unwrap();
        assert!(text.starts_with("Service agreement"));
        assert!(text.contains("Amount"));
        assert!(text.contains("1200"));
    }

    #[test]
    fn entities_are_unescaped() {
        let bytes = docx_with_body("<w:p><w:r><w:t>Smith &amp; Co</w:t></w:r></w:p>");
        assert_eq!(extract_docx_text(&bytes).unwrap(), "Smith & Co");
    }

    #[test]
    fn non_zip_input_is_rejected() {
        assert!(matches!(
            extract_docx_text(b"plain text"),
            Err(MediaError::Docx(_))
        ));
    }

    #[test]
    fn zip_without_document_xml_is_rejected() {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buf);
            writer
                .start_file("other.txt", SimpleFileOptions::default())
                .unwrap();
            writer.write_all(b"x").unwrap();
            writer.finish().unwrap();
        }
        assert!(matches!(
            extract_docx_text(&buf.into_inner()),
            Err(MediaError::Docx(_))
        ));
    }
}
