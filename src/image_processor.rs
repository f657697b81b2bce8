use image::ImageFormat;
use std::io::Cursor;
use std::path::Path;

use crate::errors::AppResult;
use crate::security::InputValidator;

/// Content type used for the file part when the bytes are not recognized.
pub const FALLBACK_MIME_TYPE: &str = "image/jpeg";

/// Detect the image format from magic bytes.
pub fn sniff_format(data: &[u8]) -> Option<ImageFormat> {
    image::guess_format(data).ok()
}

/// MIME type for the upload part, falling back to JPEG like the mobile client did.
pub fn mime_type_for(data: &[u8]) -> &'static str {
    sniff_format(data)
        .map(|format| format.to_mime_type())
        .unwrap_or(FALLBACK_MIME_TYPE)
}

pub fn extension_for(format: ImageFormat) -> &'static str {
    format.extensions_str().first().copied().unwrap_or("img")
}

/// Name used when the photo source does not provide one.
pub fn generate_filename(data: &[u8]) -> String {
    let extension = sniff_format(data).map(extension_for).unwrap_or("jpg");
    format!(
        "vecpic_{}.{}",
        chrono::Local::now().format("%Y%m%d_%H%M%S"),
        extension
    )
}

/// Name sent to the backend: sanitized, generated when missing, and always
/// carrying an extension because the server filters uploads on it.
pub fn upload_filename(filename: Option<&str>, data: &[u8]) -> String {
    let sanitized = filename
        .map(InputValidator::sanitize_filename)
        .unwrap_or_default();

    if sanitized.is_empty() {
        return generate_filename(data);
    }

    if Path::new(&sanitized).extension().is_some() {
        sanitized
    } else {
        let extension = sniff_format(data).map(extension_for).unwrap_or("jpg");
        format!("{}.{}", sanitized, extension)
    }
}

/// File stem used to name exported results.
pub fn result_stem(filename: &str) -> String {
    let stem = Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let stem = InputValidator::sanitize_filename(&stem);

    if stem.is_empty() {
        "vecpic_result".to_string()
    } else {
        stem
    }
}

/// Width and height of an in-memory image.
pub fn get_image_info(data: &[u8]) -> AppResult<(u32, u32)> {
    let reader = image::ImageReader::new(Cursor::new(data)).with_guessed_format()?;
    let dimensions = reader.into_dimensions()?;
    Ok(dimensions)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_1X1: &[u8] = &[
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, // PNG signature
        0x00, 0x00, 0x00, 0x0D, // IHDR chunk length
        0x49, 0x48, 0x44, 0x52, // IHDR
        0x00, 0x00, 0x00, 0x01, // width = 1
        0x00, 0x00, 0x00, 0x01, // height = 1
        0x08, 0x02, 0x00, 0x00, 0x00, // bit depth = 8, color type = 2 (RGB)
        0x90, 0x77, 0x53, 0xDE, // IHDR CRC
        0x00, 0x00, 0x00, 0x0C, // IDAT chunk length
        0x49, 0x44, 0x41, 0x54, // IDAT
        0x08, 0x99, 0x01, 0x01, 0x00, 0x00, 0x00, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x02, 0x00,
        0x01, // IDAT data
        0x00, 0x00, 0x00, 0x00, // IEND chunk length
        0x49, 0x45, 0x4E, 0x44, // IEND
        0xAE, 0x42, 0x60, 0x82, // IEND CRC
    ];

    #[test]
    fn test_sniff_and_mime() {
        assert_eq!(sniff_format(PNG_1X1), Some(ImageFormat::Png));
        assert_eq!(mime_type_for(PNG_1X1), "image/png");
        assert_eq!(mime_type_for(&[0xFF, 0xD8, 0xFF, 0xE0]), "image/jpeg");
        assert_eq!(mime_type_for(b"abc"), FALLBACK_MIME_TYPE);
    }

    #[test]
    fn test_upload_filename() {
        assert_eq!(upload_filename(Some("x.jpg"), b"abc"), "x.jpg");
        assert_eq!(upload_filename(Some("holiday"), PNG_1X1), "holiday.png");
        assert_eq!(upload_filename(Some("a/b.png"), PNG_1X1), "a_b.png");

        let generated = upload_filename(None, PNG_1X1);
        assert!(generated.starts_with("vecpic_"));
        assert!(generated.ends_with(".png"));

        let blank = upload_filename(Some("   "), b"abc");
        assert!(blank.ends_with(".jpg"));
    }

    #[test]
    fn test_result_stem() {
        assert_eq!(result_stem("IMG_0042.HEIC.jpg"), "IMG_0042.HEIC");
        assert_eq!(result_stem(""), "vecpic_result");
    }

    #[test]
    fn test_get_image_info() {
        assert_eq!(get_image_info(PNG_1X1).unwrap(), (1, 1));
        assert!(get_image_info(b"not an image").is_err());
    }
}
