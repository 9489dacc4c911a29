//! Content-type detection for uploads.

use image::ImageFormat;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SniffError {
    #[error("payload is not a supported image")]
    NotAnImage,
    #[error("file name `{filename}` declares `{declared}` but the payload is an image")]
    Mismatch { filename: String, declared: String },
}

/// Detect the MIME type of an uploaded image from its leading bytes.
///
/// Only JPEG, PNG, WebP and GIF are accepted. When the file name carries an
/// extension it must map to some `image/*` type.
pub fn sniff_image_type(bytes: &[u8], filename: &str) -> Result<&'static str, SniffError> {
    let format = image::guess_format(bytes).map_err(|_| SniffError::NotAnImage)?;
    let content_type = match format {
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::Png => "image/png",
        ImageFormat::WebP => "image/webp",
        ImageFormat::Gif => "image/gif",
        _ => return Err(SniffError::NotAnImage),
    };

    if let Some(declared) = mime_guess::from_path(filename).first()
        && declared.type_() != mime_guess::mime::IMAGE
    {
        return Err(SniffError::Mismatch {
            filename: filename.to_string(),
            declared: declared.essence_str().to_string(),
        });
    }

    Ok(content_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
    const GIF_MAGIC: &[u8] = b"GIF89a\x01\0\x01\0";

    #[test]
    fn magic_bytes_win_over_extension() {
        assert_eq!(sniff_image_type(PNG_MAGIC, "photo.jpg"), Ok("image/png"));
        assert_eq!(sniff_image_type(GIF_MAGIC, "anim"), Ok("image/gif"));
    }

    #[test]
    fn non_image_extension_is_rejected() {
        let err = sniff_image_type(PNG_MAGIC, "index.html").expect_err("mismatch");
        assert!(matches!(err, SniffError::Mismatch { .. }));
    }

    #[test]
    fn text_payload_is_not_an_image() {
        assert_eq!(
            sniff_image_type(b"<svg xmlns=\"http://www.w3.org/2000/svg\"/>", "x.svg"),
            Err(SniffError::NotAnImage)
        );
    }
}
