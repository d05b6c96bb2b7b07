//! EPUB format handler.

use crate::error::{AppError, Result};
use crate::formats::{Extraction, FormatHandler, Metadata, PageSource};
use roxmltree::Document;
use scraper::{Html, Selector};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use zip::ZipArchive;

/// Handler for EPUB files.
pub struct EpubHandler;

/// Manifest entry of the OPF package.
#[derive(Debug, Clone)]
struct ManifestItem {
    id: String,
    href: String,
    media_type: String,
    properties: String,
}

impl ManifestItem {
    fn is_image(&self) -> bool {
        self.media_type.starts_with("image/")
    }

    fn is_xhtml(&self) -> bool {
        self.media_type == "application/xhtml+xml" || self.media_type == "text/html"
    }
}

/// The parts of an OPF package document we use.
#[derive(Debug, Default)]
struct Package {
    title: String,
    author: String,
    cover_id: Option<String>,
    manifest: Vec<ManifestItem>,
    spine: Vec<String>,
}

impl Package {
    /// Pick the cover image item.
    fn cover_item(&self) -> Option<&ManifestItem> {
        let images = || self.manifest.iter().filter(|i| i.is_image());

        if let Some(ref id) = self.cover_id
            && let Some(item) = images().find(|i| &i.id == id)
        {
            return Some(item);
        }

        images()
            .find(|i| i.properties.split_whitespace().any(|p| p == "cover-image"))
            .or_else(|| {
                images().find(|i| {
                    i.href.to_lowercase().contains("cover") || i.id.to_lowercase().contains("cover")
                })
            })
            .or_else(|| images().next())
    }

    /// XHTML documents in reading order, falling back to manifest order.
    fn text_documents(&self) -> Vec<&ManifestItem> {
        let from_spine: Vec<&ManifestItem> = self
            .spine
            .iter()
            .filter_map(|idref| self.manifest.iter().find(|i| &i.id == idref))
            .filter(|i| i.is_xhtml())
            .collect();

        if from_spine.is_empty() {
            self.manifest.iter().filter(|i| i.is_xhtml()).collect()
        } else {
            from_spine
        }
    }
}

/// An opened EPUB archive with its parsed package.
struct Epub {
    archive: ZipArchive<File>,
    opf_dir: String,
    package: Package,
}

impl Epub {
    fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mut archive = ZipArchive::new(file)?;

        let opf_path = find_opf_path(&mut archive)?;
        let opf_dir = opf_path
            .rsplit_once('/')
            .map(|(dir, _)| dir.to_string())
            .unwrap_or_default();

        let opf = read_entry(&mut archive, &opf_path)?;
        let package = parse_opf(&String::from_utf8_lossy(&opf))?;

        Ok(Self {
            archive,
            opf_dir,
            package,
        })
    }

    /// Read a manifest item, resolving its href against the OPF directory.
    fn read_item(&mut self, href: &str) -> Result<Vec<u8>> {
        let full = resolve_href(&self.opf_dir, href);

        let exists = self.archive.file_names().any(|n| n == full);
        read_entry(&mut self.archive, if exists { &full } else { href })
    }

    fn metadata(&self) -> Metadata {
        Metadata {
            title: self.package.title.clone(),
            author: self.package.author.clone(),
        }
    }

    fn cover(&mut self) -> Result<Option<Vec<u8>>> {
        let Some(href) = self.package.cover_item().map(|i| i.href.clone()) else {
            return Ok(None);
        };

        Ok(Some(self.read_item(&href)?))
    }

    /// Visible text of every XHTML document, in reading order.
    fn chapters(&mut self) -> Result<Vec<String>> {
        let hrefs: Vec<String> = self
            .package
            .text_documents()
            .into_iter()
            .map(|i| i.href.clone())
            .collect();

        let mut chapters = Vec::with_capacity(hrefs.len());
        for href in hrefs {
            let content = self.read_item(&href)?;
            chapters.push(html_to_text(&String::from_utf8_lossy(&content)));
        }
        Ok(chapters)
    }
}

/// Find the OPF file path from container.xml.
fn find_opf_path(archive: &mut ZipArchive<File>) -> Result<String> {
    let content = read_entry(archive, "META-INF/container.xml")?;
    let content = String::from_utf8_lossy(&content);
    let doc = Document::parse(&content)?;

    doc.descendants()
        .find(|n| n.has_tag_name("rootfile"))
        .and_then(|n| n.attribute("full-path"))
        .map(String::from)
        .ok_or_else(|| AppError::InvalidFormat("No rootfile in container.xml".into()))
}

/// Archive entry name of a manifest href.
///
/// The href is percent-decoded, stripped of any fragment and joined to the
/// OPF directory, with `.` and `..` segments resolved.
fn resolve_href(opf_dir: &str, href: &str) -> String {
    let href = href.split('#').next().unwrap_or(href);
    let decoded = urlencoding::decode(href)
        .map(|d| d.into_owned())
        .unwrap_or_else(|_| href.to_string());

    let mut segments: Vec<&str> = if decoded.starts_with('/') {
        Vec::new()
    } else {
        opf_dir.split('/').filter(|s| !s.is_empty()).collect()
    };

    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            name => segments.push(name),
        }
    }

    segments.join("/")
}

fn read_entry(archive: &mut ZipArchive<File>, name: &str) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    archive.by_name(name)?.read_to_end(&mut data)?;
    Ok(data)
}

/// Parse the OPF package document.
fn parse_opf(content: &str) -> Result<Package> {
    let doc = Document::parse(content)?;
    let mut package = Package::default();

    for node in doc.descendants().filter(|n| n.is_element()) {
        match node.tag_name().name() {
            "title" if package.title.is_empty() => {
                if let Some(text) = node.text() {
                    package.title = text.trim().to_string();
                }
            }
            "creator" if package.author.is_empty() => {
                if let Some(text) = node.text() {
                    package.author = text.trim().to_string();
                }
            }
            "meta" => {
                if node.attribute("name") == Some("cover") {
                    package.cover_id = node.attribute("content").map(String::from);
                }
            }
            "item" => {
                if let (Some(id), Some(href)) = (node.attribute("id"), node.attribute("href")) {
                    package.manifest.push(ManifestItem {
                        id: id.to_string(),
                        href: href.to_string(),
                        media_type: node.attribute("media-type").unwrap_or_default().to_string(),
                        properties: node.attribute("properties").unwrap_or_default().to_string(),
                    });
                }
            }
            "itemref" => {
                if let Some(idref) = node.attribute("idref") {
                    package.spine.push(idref.to_string());
                }
            }
            _ => {}
        }
    }

    Ok(package)
}

/// Visible text of an (X)HTML document, one trimmed line per text line.
fn html_to_text(content: &str) -> String {
    let html = Html::parse_document(content);

    let raw: String = match Selector::parse("body") {
        Ok(body) => match html.select(&body).next() {
            Some(el) => el.text().collect(),
            None => html.root_element().text().collect(),
        },
        Err(_) => html.root_element().text().collect(),
    };

    raw.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

impl FormatHandler for EpubHandler {
    fn extract_metadata(&self, path: &Path) -> Result<Metadata> {
        Ok(Epub::open(path)?.metadata())
    }

    fn extract_cover(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        Epub::open(path)?.cover()
    }

    fn extract_text(&self, path: &Path) -> Result<String> {
        Ok(Epub::open(path)?.chapters()?.join("\n"))
    }

    fn extract(&self, path: &Path) -> Result<Extraction> {
        let mut epub = Epub::open(path)?;

        Ok(Extraction {
            metadata: epub.metadata(),
            cover: epub.cover()?,
            text: epub.chapters()?.join("\n"),
        })
    }

    fn open_pages(&self, path: &Path) -> Result<Box<dyn PageSource>> {
        let chapters = Epub::open(path)?.chapters()?;
        Ok(Box::new(EpubPages { chapters }))
    }
}

/// EPUB pages: one per XHTML document.
struct EpubPages {
    chapters: Vec<String>,
}

impl PageSource for EpubPages {
    fn page_count(&self) -> u32 {
        self.chapters.len() as u32
    }

    fn page_text(&self, index: u32) -> Result<String> {
        self.chapters
            .get(index as usize)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("page {}", index)))
    }
}
