//! Responsive variant generation.
//!
//! Takes the bytes of an uploaded image and produces one JPEG per breakpoint,
//! never wider than the source. The pipeline is:
//!
//! 1. probe the header with `imagesize` and enforce the pixel ceiling, so an
//!    oversized upload is rejected before any pixel buffer is allocated;
//! 2. decode with the `image` crate and read the EXIF orientation the decoder
//!    reports;
//! 3. for each breakpoint (ascending width) resize with Lanczos3, apply the
//!    orientation to the smaller buffer, flatten any alpha onto white and
//!    encode baseline JPEG.
//!
//! The JPEG encoder writes no EXIF or IPTC segments, so variants never carry
//! the original's metadata.

use std::io::Cursor;
use std::time::Instant;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{
    DynamicImage, ExtendedColorType, ImageDecoder, ImageEncoder, ImageError, ImageReader, Rgb,
    RgbImage,
};
use imagesize::ImageSize;
use metrics::histogram;
use thiserror::Error;
use tracing::debug;

use super::breakpoints::{BreakpointSpec, Quality, VariantLimits};

pub const VARIANT_CONTENT_TYPE: &str = "image/jpeg";

const METRIC_GENERATE_MS: &str = "lectern_variant_generate_ms";

#[derive(Debug, Error)]
pub enum VariantError {
    #[error("image is {width}x{height} which exceeds the {max_pixels} pixel limit")]
    ImageTooLarge {
        width: u64,
        height: u64,
        max_pixels: u64,
    },
    #[error("failed to decode image: {message}")]
    DecodeFailure { message: String },
    #[error("failed to encode variant `{variant}`")]
    EncodeFailure {
        variant: String,
        #[source]
        source: ImageError,
    },
    #[error("image format is not supported")]
    UnsupportedFormat,
    #[error("no breakpoints configured")]
    NoBreakpoints,
    #[error("variant worker stopped: {message}")]
    Interrupted { message: String },
}

impl VariantError {
    fn decode(message: impl Into<String>) -> Self {
        Self::DecodeFailure {
            message: message.into(),
        }
    }

    fn from_decoder(err: ImageError) -> Self {
        match err {
            ImageError::Unsupported(_) => Self::UnsupportedFormat,
            other => Self::decode(other.to_string()),
        }
    }
}

/// One encoded rendition of the source image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub bytes: Bytes,
    pub content_type: &'static str,
    pub quality: Quality,
}

/// Generate the ordered set of variants for `bytes`.
///
/// Variants come back sorted by ascending width. Generation stops after the
/// first breakpoint whose clamped width equals the source width, so the
/// largest variant is never an upscale and never duplicated.
pub fn generate_variants(
    bytes: &[u8],
    breakpoints: &[BreakpointSpec],
    limits: &VariantLimits,
) -> Result<Vec<Variant>, VariantError> {
    if breakpoints.is_empty() {
        return Err(VariantError::NoBreakpoints);
    }

    let started = Instant::now();
    let probed = probe(bytes)?;
    enforce_pixel_limit(&probed, limits)?;

    let (image, orientation) = decode(bytes)?;
    let (source_width, source_height) = source_dimensions(&image, orientation)?;

    let mut ordered: Vec<&BreakpointSpec> = breakpoints.iter().collect();
    ordered.sort_by_key(|spec| spec.width);

    let mut variants = Vec::with_capacity(ordered.len());
    for spec in ordered {
        let width = spec.width.clamp(1, source_width);
        let height = scaled_height(source_width, source_height, width);

        let mut rendition = if width == source_width {
            image.clone()
        } else if swaps_axes(orientation) {
            image.resize_exact(height, width, FilterType::Lanczos3)
        } else {
            image.resize_exact(width, height, FilterType::Lanczos3)
        };
        rendition.apply_orientation(orientation);

        let encoded = encode_jpeg(&rendition, spec.quality).map_err(|source| {
            VariantError::EncodeFailure {
                variant: spec.name.clone(),
                source,
            }
        })?;

        debug!(
            variant = %spec.name,
            width,
            height,
            size_bytes = encoded.len(),
            "encoded responsive variant"
        );

        variants.push(Variant {
            name: spec.name.clone(),
            width,
            height,
            bytes: encoded,
            content_type: VARIANT_CONTENT_TYPE,
            quality: spec.quality,
        });

        if width == source_width {
            break;
        }
    }

    histogram!(METRIC_GENERATE_MS).record(started.elapsed().as_secs_f64() * 1000.0);
    Ok(variants)
}

/// Run [`generate_variants`] on the blocking pool.
pub async fn generate_variants_blocking(
    bytes: Bytes,
    breakpoints: Vec<BreakpointSpec>,
    limits: VariantLimits,
) -> Result<Vec<Variant>, VariantError> {
    tokio::task::spawn_blocking(move || generate_variants(&bytes, &breakpoints, &limits))
        .await
        .map_err(|err| VariantError::Interrupted {
            message: err.to_string(),
        })?
}

/// Width and height as displayed once `orientation` is applied.
pub fn oriented_dimensions(width: u32, height: u32, orientation: Orientation) -> (u32, u32) {
    if swaps_axes(orientation) {
        (height, width)
    } else {
        (width, height)
    }
}

fn source_dimensions(
    image: &DynamicImage,
    orientation: Orientation,
) -> Result<(u32, u32), VariantError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(VariantError::decode("image has no pixels"));
    }
    Ok(oriented_dimensions(image.width(), image.height(), orientation))
}

/// Height preserving the source aspect ratio at `target_width`. Never zero.
pub fn scaled_height(source_width: u32, source_height: u32, target_width: u32) -> u32 {
    if source_width == 0 {
        return 1;
    }
    let scaled = f64::from(source_height) * f64::from(target_width) / f64::from(source_width);
    (scaled.round() as u32).max(1)
}

fn swaps_axes(orientation: Orientation) -> bool {
    matches!(
        orientation,
        Orientation::Rotate90
            | Orientation::Rotate270
            | Orientation::Rotate90FlipH
            | Orientation::Rotate270FlipH
    )
}

fn probe(bytes: &[u8]) -> Result<ImageSize, VariantError> {
    match imagesize::blob_size(bytes) {
        Ok(size) => Ok(size),
        Err(imagesize::ImageError::NotSupported) => Err(VariantError::UnsupportedFormat),
        Err(imagesize::ImageError::CorruptedImage) => Err(VariantError::decode("corrupted image")),
        Err(imagesize::ImageError::IoError(err)) => Err(VariantError::decode(err.to_string())),
    }
}

fn enforce_pixel_limit(size: &ImageSize, limits: &VariantLimits) -> Result<(), VariantError> {
    let width = size.width as u64;
    let height = size.height as u64;
    if width.saturating_mul(height) > limits.max_pixels {
        return Err(VariantError::ImageTooLarge {
            width,
            height,
            max_pixels: limits.max_pixels,
        });
    }
    Ok(())
}

fn decode(bytes: &[u8]) -> Result<(DynamicImage, Orientation), VariantError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|err| VariantError::decode(err.to_string()))?;
    if reader.format().is_none() {
        return Err(VariantError::UnsupportedFormat);
    }

    let mut decoder = reader.into_decoder().map_err(VariantError::from_decoder)?;
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let image = DynamicImage::from_decoder(decoder).map_err(VariantError::from_decoder)?;
    Ok((image, orientation))
}

fn encode_jpeg(image: &DynamicImage, quality: Quality) -> Result<Bytes, ImageError> {
    let rgb = flatten_onto_white(image);
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality.value()).write_image(
        rgb.as_raw(),
        rgb.width(),
        rgb.height(),
        ExtendedColorType::Rgb8,
    )?;
    Ok(Bytes::from(out))
}

/// JPEG has no alpha channel; composite translucent pixels over white.
fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }
    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let blend = |channel: u8| {
            let alpha = u16::from(a);
            ((u16::from(channel) * alpha + 255 * (255 - alpha) + 127) / 255) as u8
        };
        Rgb([blend(r), blend(g), blend(b)])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quarter_turns_swap_axes() {
        assert_eq!(
            oriented_dimensions(4000, 3000, Orientation::Rotate90),
            (3000, 4000)
        );
        assert_eq!(
            oriented_dimensions(4000, 3000, Orientation::Rotate270FlipH),
            (3000, 4000)
        );
        assert_eq!(
            oriented_dimensions(4000, 3000, Orientation::Rotate180),
            (4000, 3000)
        );
        assert_eq!(
            oriented_dimensions(4000, 3000, Orientation::FlipHorizontal),
            (4000, 3000)
        );
    }

    #[test]
    fn scaled_height_rounds_and_never_hits_zero() {
        assert_eq!(scaled_height(3000, 2000, 320), 213);
        assert_eq!(scaled_height(1000, 1, 320), 1);
        assert_eq!(scaled_height(0, 100, 10), 1);
    }

    #[test]
    fn pixel_limit_counts_area() {
        let size = ImageSize {
            width: 5000,
            height: 5000,
        };
        let err = enforce_pixel_limit(
            &size,
            &VariantLimits {
                max_pixels: 24_999_999,
            },
        )
        .expect_err("over limit");
        assert!(matches!(err, VariantError::ImageTooLarge { .. }));
        enforce_pixel_limit(
            &size,
            &VariantLimits {
                max_pixels: 25_000_000,
            },
        )
        .expect("at limit");
    }

    #[test]
    fn zero_sized_decodes_are_a_decode_failure() {
        let empty = DynamicImage::new_rgb8(0, 10);
        let err = source_dimensions(&empty, Orientation::NoTransforms).expect_err("no pixels");
        assert!(matches!(err, VariantError::DecodeFailure { .. }));
        assert_eq!(
            source_dimensions(&DynamicImage::new_rgb8(4, 2), Orientation::Rotate90)
                .expect("dimensions"),
            (2, 4)
        );
    }

    #[test]
    fn alpha_is_flattened_onto_white() {
        let rgba = image::RgbaImage::from_fn(3, 1, |x, _| match x {
            0 => image::Rgba([0, 0, 0, 0]),
            1 => image::Rgba([0, 0, 0, 255]),
            _ => image::Rgba([0, 0, 0, 128]),
        });
        let flat = flatten_onto_white(&DynamicImage::ImageRgba8(rgba));
        assert_eq!(flat.get_pixel(0, 0).0, [255, 255, 255]);
        assert_eq!(flat.get_pixel(1, 0).0, [0, 0, 0]);
        assert_eq!(flat.get_pixel(2, 0).0, [127, 127, 127]);
    }

    #[test]
    fn empty_breakpoints_are_rejected_before_probing() {
        let err = generate_variants(b"not an image", &[], &VariantLimits::default())
            .expect_err("no breakpoints");
        assert!(matches!(err, VariantError::NoBreakpoints));
    }

    #[test]
    fn unknown_bytes_are_unsupported() {
        let err = generate_variants(
            b"definitely not an image",
            &[BreakpointSpec::new("small", 640, 80)],
            &VariantLimits::default(),
        )
        .expect_err("unsupported");
        assert!(matches!(err, VariantError::UnsupportedFormat));
    }
}
