//! Screenshot post-processing: downscale oversized captures and store them.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::{GenericImageView, ImageOutputFormat};

/// Longest edge kept for stored screenshots.
pub const MAX_EDGE: u32 = 2000;

/// A PNG ready to be written to disk.
#[derive(Debug)]
pub struct Processed {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub resized: bool,
}

/// Shrinks `png` to fit within `MAX_EDGE` x `MAX_EDGE`, keeping aspect
/// ratio. Images already within bounds are passed through untouched.
pub fn fit_png(png: Vec<u8>) -> Result<Processed, String> {
    let img = image::load_from_memory(&png).map_err(|e| format!("Invalid PNG data: {e}"))?;
    let (width, height) = img.dimensions();
    if width <= MAX_EDGE && height <= MAX_EDGE {
        return Ok(Processed {
            png,
            width,
            height,
            resized: false,
        });
    }

    let resized = img.resize(MAX_EDGE, MAX_EDGE, FilterType::Lanczos3);
    let mut out = Vec::new();
    resized
        .write_to(&mut Cursor::new(&mut out), ImageOutputFormat::Png)
        .map_err(|e| format!("Failed to encode PNG: {e}"))?;
    Ok(Processed {
        png: out,
        width: resized.width(),
        height: resized.height(),
        resized: true,
    })
}

/// `screenshot-<UTC timestamp>.png` under `dir`.
pub fn screenshot_path(dir: &Path) -> PathBuf {
    let stamp = chrono::Utc::now().format("%Y-%m-%dT%H-%M-%S-%3fZ");
    dir.join(format!("screenshot-{stamp}.png"))
}

#[cfg(test)]
mod tests {
    use image::{ImageBuffer, Rgb};

    use super::*;

    fn png_of(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_pixel(width, height, Rgb([200u8, 10, 10]));
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png)
            .expect("encode");
        buf
    }

    #[test]
    fn small_images_pass_through() {
        let png = png_of(640, 480);
        let original_len = png.len();
        let out = fit_png(png).expect("fit");
        assert!(!out.resized);
        assert_eq!((out.width, out.height), (640, 480));
        assert_eq!(out.png.len(), original_len);
    }

    #[test]
    fn tall_pages_are_scaled_inside_bounds() {
        let out = fit_png(png_of(1000, 4000)).expect("fit");
        assert!(out.resized);
        assert_eq!((out.width, out.height), (500, 2000));
        let decoded = image::load_from_memory(&out.png).expect("decode");
        assert_eq!(decoded.dimensions(), (500, 2000));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(fit_png(b"not a png".to_vec()).is_err());
    }

    #[test]
    fn screenshot_names_are_timestamped_png() {
        let path = screenshot_path(Path::new("/w/browser_screenshots"));
        let name = path.file_name().and_then(|n| n.to_str()).expect("name");
        assert!(name.starts_with("screenshot-"));
        assert!(name.ends_with("Z.png"));
        assert!(!name.contains(':'));
    }
}
