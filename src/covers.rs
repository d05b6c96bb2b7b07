//! Cover thumbnails.
//!
//! Thumbnails are PNG files named after a UUID v5 of the book path, so the
//! same book always maps to the same file. Books without an embedded image
//! get a generated cover coloured from their title.

use crate::error::{AppError, Result};
use image::{DynamicImage, ImageReader, Rgba, RgbaImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Deterministic thumbnail location for a book.
pub fn thumbnail_path(dir: &Path, book_path: &Path) -> PathBuf {
    let id = Uuid::new_v5(&Uuid::NAMESPACE_URL, book_path.to_string_lossy().as_bytes());
    dir.join(format!("{}.png", id))
}

/// Shrink an image to fit inside `max_width` x `max_height`, as PNG.
///
/// Aspect ratio is preserved and small images are never enlarged.
pub fn make_thumbnail(data: &[u8], max_width: u32, max_height: u32) -> Result<Vec<u8>> {
    let img = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| AppError::Internal(format!("Failed to read image: {}", e)))?
        .decode()?;

    let img = if img.width() > max_width || img.height() > max_height {
        img.resize(
            max_width.max(1),
            max_height.max(1),
            image::imageops::FilterType::Lanczos3,
        )
    } else {
        img
    };

    encode_png(&img)
}

/// Generate a simple cover for a book without one.
pub fn default_cover(title: &str, width: u32, height: u32) -> Result<Vec<u8>> {
    let width = width.max(1);
    let height = height.max(1);

    // Colour derived from the title
    let hash = title
        .bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));
    let hue = (hash % 360) as f32;
    let (r, g, b) = hsv_to_rgb(hue, 0.4, 0.5);

    let mut img = RgbaImage::new(width, height);
    for y in 0..height {
        let factor = y as f32 / height as f32;
        let shade = |c: u8| (c as f32 * (1.0 - factor * 0.3)) as u8;
        let pixel = Rgba([shade(r), shade(g), shade(b), 255]);
        for x in 0..width {
            img.put_pixel(x, y, pixel);
        }
    }

    encode_png(&DynamicImage::ImageRgba8(img))
}

fn encode_png(img: &DynamicImage) -> Result<Vec<u8>> {
    let mut png_data = Vec::new();
    img.write_to(&mut Cursor::new(&mut png_data), image::ImageFormat::Png)?;
    Ok(png_data)
}

/// Convert HSV to RGB.
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> (u8, u8, u8) {
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;

    let (r, g, b) = match (h / 60.0) as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };

    (
        ((r + m) * 255.0) as u8,
        ((g + m) * 255.0) as u8,
        ((b + m) * 255.0) as u8,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(image::RgbImage::new(width, height));
        encode_png(&img).unwrap()
    }

    fn dimensions(data: &[u8]) -> (u32, u32) {
        let img = image::load_from_memory(data).unwrap();
        (img.width(), img.height())
    }

    #[test]
    fn test_thumbnail_fits_box_and_keeps_ratio() {
        let thumb = make_thumbnail(&png(600, 800), 300, 400).unwrap();
        assert_eq!(dimensions(&thumb), (300, 400));

        let wide = make_thumbnail(&png(800, 200), 200, 300).unwrap();
        assert_eq!(dimensions(&wide), (200, 50));
    }

    #[test]
    fn test_thumbnail_never_upscales() {
        let thumb = make_thumbnail(&png(50, 60), 300, 400).unwrap();
        assert_eq!(dimensions(&thumb), (50, 60));
    }

    #[test]
    fn test_default_cover_is_png_of_requested_size() {
        let cover = default_cover("Some Title", 200, 300).unwrap();
        assert!(cover.starts_with(&[0x89, b'P', b'N', b'G']));
        assert_eq!(dimensions(&cover), (200, 300));
    }

    #[test]
    fn test_thumbnail_path_is_deterministic() {
        let dir = Path::new("/thumbs");
        let a = thumbnail_path(dir, Path::new("/books/a.pdf"));
        let b = thumbnail_path(dir, Path::new("/books/a.pdf"));
        let c = thumbnail_path(dir, Path::new("/books/a.epub"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.extension().unwrap(), "png");
    }

    #[test]
    fn test_garbage_is_an_error() {
        assert!(make_thumbnail(b"not an image", 10, 10).is_err());
    }
}
