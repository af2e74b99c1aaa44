use std::io::Cursor;

use image::{DynamicImage, ImageFormat, ImageReader, Limits};
use tracing::{debug, warn};

use super::operations;
use crate::modules::jobs::{JobError, Operation};

pub const OUTPUT_FORMAT: ImageFormat = ImageFormat::Png;
pub const OUTPUT_CONTENT_TYPE: &str = "image/png";

/// Sources wider or taller than this are refused at decode time.
pub const MAX_SOURCE_DIMENSION: u32 = 16_384;
/// Upper bound on what the decoder may allocate for one source image.
pub const MAX_DECODE_ALLOC: u64 = 512 * 1024 * 1024;

/// Decodes source bytes, applies operations in order and re-encodes as PNG.
///
/// Pure: the same input bytes and operations always produce the same output.
#[derive(Clone, Copy, Debug, Default)]
pub struct TransformEngine;

impl TransformEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn apply(&self, source: &[u8], ops: &[Operation]) -> Result<Vec<u8>, JobError> {
        validate(ops)?;

        let mut img = decode(source)?;
        debug!(width = img.width(), height = img.height(), "Decoded source image");

        for (index, op) in ops.iter().enumerate() {
            img = match op {
                Operation::Resize { width, height } => operations::resize(img, *width, *height)?,
                Operation::Rotate { degrees } => operations::rotate(img, *degrees)?,
                Operation::Grayscale => operations::grayscale(img),
                Operation::Unsupported(_) => {
                    warn!(index, operation = op.name(), "Skipping unsupported operation");
                    img
                }
            };
        }

        encode(img)
    }

    /// Runs [`apply`](Self::apply) on the blocking pool.
    pub async fn apply_blocking(
        &self,
        source: bytes::Bytes,
        ops: Vec<Operation>,
    ) -> Result<Vec<u8>, JobError> {
        let engine = *self;
        tokio::task::spawn_blocking(move || engine.apply(&source, &ops)).await?
    }
}

/// Rejects bad parameters before any decoding work.
fn validate(ops: &[Operation]) -> Result<(), JobError> {
    for op in ops {
        if let Operation::Resize { width, height } = op {
            operations::checked_dimensions(*width, *height)?;
        }
    }
    Ok(())
}

fn decode(source: &[u8]) -> Result<DynamicImage, JobError> {
    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_SOURCE_DIMENSION);
    limits.max_image_height = Some(MAX_SOURCE_DIMENSION);
    limits.max_alloc = Some(MAX_DECODE_ALLOC);

    let mut reader = ImageReader::new(Cursor::new(source))
        .with_guessed_format()
        .map_err(|e| JobError::Decode(e.to_string()))?;
    reader.limits(limits);
    reader.decode().map_err(|e| JobError::Decode(e.to_string()))
}

fn encode(img: DynamicImage) -> Result<Vec<u8>, JobError> {
    // PNG has no float channel layouts.
    let img = match img {
        DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_) => {
            DynamicImage::ImageRgba8(img.to_rgba8())
        }
        other => other,
    };

    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), OUTPUT_FORMAT)
        .map_err(|e| JobError::Encode(e.to_string()))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb, RgbImage, Rgba, RgbaImage};
    use serde_json::json;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x * 7) as u8, (y * 13) as u8, 90]));
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    fn jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([120, 30, 200]));
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
            .unwrap();
        buf
    }

    fn decode_png(bytes: &[u8]) -> DynamicImage {
        assert_eq!(image::guess_format(bytes).unwrap(), ImageFormat::Png);
        image::load_from_memory(bytes).unwrap()
    }

    #[test]
    fn empty_operation_list_round_trips_pixels() {
        let source = png(12, 9);
        let out = TransformEngine::new().apply(&source, &[]).unwrap();

        assert_eq!(decode_png(&out), image::load_from_memory(&source).unwrap());
    }

    #[test]
    fn output_is_png_even_for_jpeg_input() {
        let out = TransformEngine::new().apply(&jpeg(8, 8), &[]).unwrap();
        assert_eq!(decode_png(&out).dimensions(), (8, 8));
    }

    #[test]
    fn resize_yields_exact_raster() {
        let out = TransformEngine::new()
            .apply(&png(300, 120), &[Operation::Resize { width: 100, height: 100 }])
            .unwrap();
        assert_eq!(decode_png(&out).dimensions(), (100, 100));
    }

    #[test]
    fn operations_apply_left_to_right() {
        let engine = TransformEngine::new();
        let source = png(40, 20);

        let resize_then_rotate = engine
            .apply(
                &source,
                &[Operation::Resize { width: 10, height: 30 }, Operation::Rotate { degrees: 90 }],
            )
            .unwrap();
        let rotate_then_resize = engine
            .apply(
                &source,
                &[Operation::Rotate { degrees: 90 }, Operation::Resize { width: 10, height: 30 }],
            )
            .unwrap();

        assert_eq!(decode_png(&resize_then_rotate).dimensions(), (30, 10));
        assert_eq!(decode_png(&rotate_then_resize).dimensions(), (10, 30));
    }

    #[test]
    fn rotate_full_turn_matches_no_rotation() {
        let engine = TransformEngine::new();
        let source = png(16, 5);

        let zero = engine.apply(&source, &[Operation::Rotate { degrees: 0 }]).unwrap();
        let full = engine.apply(&source, &[Operation::Rotate { degrees: 360 }]).unwrap();

        assert_eq!(decode_png(&zero), decode_png(&full));
    }

    #[test]
    fn rgba_source_resized_then_grayscaled_is_single_channel() {
        let img = RgbaImage::from_fn(64, 64, |x, y| Rgba([x as u8, y as u8, 40, 200]));
        let mut source = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut source), ImageFormat::Png)
            .unwrap();

        let out = TransformEngine::new()
            .apply(
                &source,
                &[Operation::Resize { width: 50, height: 50 }, Operation::Grayscale],
            )
            .unwrap();
        let img = decode_png(&out);

        assert_eq!(img.dimensions(), (50, 50));
        assert_eq!(img.color(), image::ColorType::L8);
    }

    #[test]
    fn resize_then_grayscale_is_single_channel() {
        let out = TransformEngine::new()
            .apply(
                &png(64, 64),
                &[Operation::Resize { width: 50, height: 50 }, Operation::Grayscale],
            )
            .unwrap();
        let img = decode_png(&out);

        assert_eq!(img.dimensions(), (50, 50));
        assert_eq!(img.color(), image::ColorType::L8);
    }

    #[test]
    fn unsupported_operations_are_skipped() {
        let source = png(6, 6);
        let out = TransformEngine::new()
            .apply(
                &source,
                &[
                    Operation::Unsupported(json!({"operation": "sepia", "strength": 3})),
                    Operation::Unsupported(json!({"operation": "blur"})),
                ],
            )
            .unwrap();
        assert_eq!(decode_png(&out), image::load_from_memory(&source).unwrap());
    }

    #[test]
    fn garbage_bytes_are_a_decode_error() {
        let err = TransformEngine::new().apply(b"definitely not an image", &[]).unwrap_err();
        assert!(matches!(err, JobError::Decode(_)));
    }

    #[test]
    fn invalid_parameters_fail_before_decoding() {
        let err = TransformEngine::new()
            .apply(b"not even an image", &[Operation::Resize { width: 0, height: 10 }])
            .unwrap_err();
        assert!(matches!(err, JobError::InvalidOperation(_)));
    }

    #[test]
    fn oversized_resize_fails_before_decoding() {
        let err = TransformEngine::new()
            .apply(b"not even an image", &[Operation::Resize { width: 100_000, height: 100_000 }])
            .unwrap_err();
        assert!(matches!(err, JobError::InvalidOperation(_)));
    }

    #[test]
    fn sources_beyond_decode_limits_are_decode_errors() {
        let err = TransformEngine::new()
            .apply(&png(MAX_SOURCE_DIMENSION + 1, 1), &[])
            .unwrap_err();
        assert!(matches!(err, JobError::Decode(_)), "{err:?}");
    }

    #[tokio::test]
    async fn blocking_wrapper_matches_direct_call() {
        let engine = TransformEngine::new();
        let source = png(20, 10);
        let ops = vec![Operation::Grayscale];

        let direct = engine.apply(&source, &ops).unwrap();
        let pooled = engine
            .apply_blocking(bytes::Bytes::from(source), ops)
            .await
            .unwrap();

        assert_eq!(direct, pooled);
    }
}
