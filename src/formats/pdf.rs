use crate::error::{AppError, Result};
use crate::formats::{Extraction, FormatHandler, Metadata, PageSource};
use lopdf::{Document, Object};
use std::path::Path;

/// Handler for PDF files.
pub struct PdfHandler;

impl PdfHandler {
    fn load(path: &Path) -> Result<Document> {
        Document::load(path).map_err(|e| AppError::Pdf(format!("{}: {}", path.display(), e)))
    }

    /// Decode a PDF info dictionary value.
    fn decode_text(obj: &Object) -> Option<String> {
        match obj {
            Object::String(bytes, _) => {
                // Try UTF-16BE first (starts with BOM)
                if bytes.starts_with(&[0xFE, 0xFF]) {
                    let utf16: Vec<u16> = bytes[2..]
                        .chunks(2)
                        .map(|chunk| {
                            u16::from_be_bytes([chunk[0], chunk.get(1).copied().unwrap_or(0)])
                        })
                        .collect();
                    String::from_utf16(&utf16).ok()
                } else {
                    // UTF-8, else Latin-1
                    Some(
                        String::from_utf8(bytes.clone())
                            .unwrap_or_else(|_| bytes.iter().map(|&b| b as char).collect()),
                    )
                }
            }
            Object::Name(name) => String::from_utf8(name.clone()).ok(),
            _ => None,
        }
    }

    /// Read one trimmed entry of the Info dictionary.
    fn info_entry(doc: &Document, key: &[u8]) -> Option<String> {
        let info = match doc.trailer.get(b"Info").ok()? {
            Object::Reference(r) => doc.get_dictionary(*r).ok()?,
            Object::Dictionary(d) => d,
            _ => return None,
        };

        let text = Self::decode_text(info.get(key).ok()?)?;
        let trimmed = text.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }

    fn metadata(doc: &Document) -> Metadata {
        Metadata {
            title: Self::info_entry(doc, b"Title").unwrap_or_default(),
            author: Self::info_entry(doc, b"Author").unwrap_or_default(),
        }
    }

    /// Find the first decodable image on the first page.
    fn first_page_image(doc: &Document) -> Option<Vec<u8>> {
        let pages = doc.get_pages();
        let &first_page_id = pages.values().next()?;
        let page = doc.get_dictionary(first_page_id).ok()?;

        let resources = match page.get(b"Resources") {
            Ok(Object::Reference(r)) => doc.get_dictionary(*r).ok(),
            Ok(Object::Dictionary(d)) => Some(d),
            _ => None,
        }?;

        let xobjects = match resources.get(b"XObject") {
            Ok(Object::Reference(r)) => doc.get_dictionary(*r).ok(),
            Ok(Object::Dictionary(d)) => Some(d),
            _ => None,
        }?;

        for (_name, obj) in xobjects.iter() {
            let Object::Reference(xobj_ref) = obj else {
                continue;
            };

            let Ok(Object::Stream(stream)) = doc.get_object(*xobj_ref) else {
                continue;
            };

            let is_image = matches!(
                stream.dict.get(b"Subtype"),
                Ok(Object::Name(n)) if n == b"Image"
            );
            if !is_image {
                continue;
            }

            let is_dct = match stream.dict.get(b"Filter") {
                Ok(Object::Name(n)) => n == b"DCTDecode",
                Ok(Object::Array(arr)) => arr
                    .iter()
                    .any(|item| matches!(item, Object::Name(n) if n == b"DCTDecode")),
                _ => false,
            };

            // JPEG streams are stored as-is
            if is_dct && stream.content.starts_with(&[0xFF, 0xD8, 0xFF]) {
                return Some(stream.content.clone());
            }

            let Ok(data) = stream.decompressed_content() else {
                continue;
            };

            if data.starts_with(&[0xFF, 0xD8, 0xFF]) || data.starts_with(&[0x89, b'P', b'N', b'G'])
            {
                return Some(data);
            }

            // Raw 8-bit RGB samples
            let dimension = |key: &[u8]| match stream.dict.get(key) {
                Ok(Object::Integer(i)) if *i > 0 => Some(*i as u32),
                _ => None,
            };

            if let (Some(w), Some(h)) = (dimension(b"Width"), dimension(b"Height"))
                && let Some(img) = image::RgbImage::from_raw(w, h, data)
            {
                let mut png_data = Vec::new();
                if image::DynamicImage::ImageRgb8(img)
                    .write_to(
                        &mut std::io::Cursor::new(&mut png_data),
                        image::ImageFormat::Png,
                    )
                    .is_ok()
                {
                    return Some(png_data);
                }
            }
        }

        None
    }
}

impl FormatHandler for PdfHandler {
    fn extract_metadata(&self, path: &Path) -> Result<Metadata> {
        Ok(Self::metadata(&Self::load(path)?))
    }

    fn extract_cover(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        let doc = Self::load(path)?;
        Ok(Self::first_page_image(&doc))
    }

    fn extract_text(&self, path: &Path) -> Result<String> {
        Ok(PdfPages::new(Self::load(path)?).full_text(path))
    }

    fn extract(&self, path: &Path) -> Result<Extraction> {
        let doc = Self::load(path)?;
        let metadata = Self::metadata(&doc);
        let cover = Self::first_page_image(&doc);
        let text = PdfPages::new(doc).full_text(path);

        Ok(Extraction {
            metadata,
            cover,
            text,
        })
    }

    fn open_pages(&self, path: &Path) -> Result<Box<dyn PageSource>> {
        Ok(Box::new(PdfPages::new(Self::load(path)?)))
    }
}

/// Pages of a loaded PDF document.
struct PdfPages {
    doc: Document,
    numbers: Vec<u32>,
}

impl PdfPages {
    fn new(doc: Document) -> Self {
        let numbers = doc.get_pages().keys().copied().collect();
        Self { doc, numbers }
    }

    /// Text of every page, one line break between pages.
    ///
    /// Unreadable pages are left empty.
    fn full_text(&self, path: &Path) -> String {
        let mut text = Vec::with_capacity(self.numbers.len());

        for index in 0..self.page_count() {
            match self.page_text(index) {
                Ok(page) => text.push(page),
                Err(e) => {
                    tracing::debug!(path = %path.display(), page = index, error = %e, "Skipping unreadable page");
                    text.push(String::new());
                }
            }
        }

        text.join("\n")
    }
}

impl PageSource for PdfPages {
    fn page_count(&self) -> u32 {
        self.numbers.len() as u32
    }

    fn page_text(&self, index: u32) -> Result<String> {
        let number = self
            .numbers
            .get(index as usize)
            .copied()
            .ok_or_else(|| AppError::NotFound(format!("page {}", index)))?;

        self.doc
            .extract_text(&[number])
            .map_err(|e| AppError::Pdf(format!("page {}: {}", number, e)))
    }
}
