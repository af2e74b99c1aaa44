//! Raster operations. Each one consumes the image and returns the transformed one.

use image::imageops::FilterType;
use image::{DynamicImage, ImageBuffer, Pixel};

use crate::modules::jobs::JobError;

/// Largest raster any operation may produce (64 megapixels).
pub const MAX_OUTPUT_PIXELS: u64 = 64 * 1024 * 1024;

pub fn resize(img: DynamicImage, width: i64, height: i64) -> Result<DynamicImage, JobError> {
    let (width, height) = checked_dimensions(width, height)?;
    Ok(img.resize_exact(width, height, FilterType::Lanczos3))
}

/// Accepts strictly positive dimensions that fit in `u32` and in the pixel budget.
pub fn checked_dimensions(width: i64, height: i64) -> Result<(u32, u32), JobError> {
    let convert = |value: i64, name: &str| -> Result<u32, JobError> {
        if value <= 0 {
            return Err(JobError::InvalidOperation(format!(
                "resize {} must be positive, got {}",
                name, value
            )));
        }
        u32::try_from(value).map_err(|_| {
            JobError::InvalidOperation(format!("resize {} too large: {}", name, value))
        })
    };
    let (width, height) = (convert(width, "width")?, convert(height, "height")?);
    check_pixel_budget(width, height)?;
    Ok((width, height))
}

pub fn check_pixel_budget(width: u32, height: u32) -> Result<(), JobError> {
    let pixels = u64::from(width) * u64::from(height);
    if pixels > MAX_OUTPUT_PIXELS {
        return Err(JobError::InvalidOperation(format!(
            "{}x{} output exceeds the {} pixel limit",
            width, height, MAX_OUTPUT_PIXELS
        )));
    }
    Ok(())
}

pub fn normalize_degrees(degrees: i64) -> u32 {
    degrees.rem_euclid(360) as u32
}

/// Counter-clockwise rotation. The canvas grows to the rotated bounding box.
pub fn rotate(img: DynamicImage, degrees: i64) -> Result<DynamicImage, JobError> {
    Ok(match normalize_degrees(degrees) {
        0 => img,
        // imageops rotates clockwise
        90 => img.rotate270(),
        180 => img.rotate180(),
        270 => img.rotate90(),
        angle => {
            let radians = (angle as f64).to_radians();
            let (out_w, out_h) = rotated_dimensions(img.width(), img.height(), radians);
            check_pixel_budget(out_w, out_h)?;
            rotate_arbitrary(img, radians)
        }
    })
}

/// Bounding box of a `width` x `height` raster turned by `radians`.
pub fn rotated_dimensions(width: u32, height: u32, radians: f64) -> (u32, u32) {
    let (w, h) = (width as f64, height as f64);
    let (sin, cos) = radians.sin_cos();
    // Trim float noise so e.g. 45 degrees on a square does not gain an extra column.
    let span = |v: f64| ((v - 1e-9).ceil().max(1.0)) as u32;
    (
        span(w * cos.abs() + h * sin.abs()),
        span(w * sin.abs() + h * cos.abs()),
    )
}

fn rotate_arbitrary(img: DynamicImage, radians: f64) -> DynamicImage {
    match img {
        DynamicImage::ImageLuma8(buf) => DynamicImage::ImageLuma8(rotate_buffer(&buf, radians)),
        DynamicImage::ImageLumaA8(buf) => DynamicImage::ImageLumaA8(rotate_buffer(&buf, radians)),
        DynamicImage::ImageRgb8(buf) => DynamicImage::ImageRgb8(rotate_buffer(&buf, radians)),
        DynamicImage::ImageRgba8(buf) => DynamicImage::ImageRgba8(rotate_buffer(&buf, radians)),
        DynamicImage::ImageLuma16(buf) => DynamicImage::ImageLuma16(rotate_buffer(&buf, radians)),
        DynamicImage::ImageLumaA16(buf) => {
            DynamicImage::ImageLumaA16(rotate_buffer(&buf, radians))
        }
        DynamicImage::ImageRgb16(buf) => DynamicImage::ImageRgb16(rotate_buffer(&buf, radians)),
        DynamicImage::ImageRgba16(buf) => DynamicImage::ImageRgba16(rotate_buffer(&buf, radians)),
        other => DynamicImage::ImageRgba8(rotate_buffer(&other.to_rgba8(), radians)),
    }
}

/// Nearest-neighbour inverse mapping about the image centre.
fn rotate_buffer<P>(
    src: &ImageBuffer<P, Vec<P::Subpixel>>,
    radians: f64,
) -> ImageBuffer<P, Vec<P::Subpixel>>
where
    P: Pixel,
{
    let (w, h) = (src.width() as f64, src.height() as f64);
    let (sin, cos) = radians.sin_cos();
    let (out_w, out_h) = rotated_dimensions(src.width(), src.height(), radians);

    let mut out: ImageBuffer<P, Vec<P::Subpixel>> = ImageBuffer::new(out_w, out_h);
    let (src_cx, src_cy) = (w / 2.0, h / 2.0);
    let (dst_cx, dst_cy) = (out_w as f64 / 2.0, out_h as f64 / 2.0);

    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let dx = x as f64 + 0.5 - dst_cx;
        let dy = y as f64 + 0.5 - dst_cy;
        // Image y grows downwards, so a visual counter-clockwise turn maps back through this.
        let sx = dx * cos - dy * sin + src_cx;
        let sy = dx * sin + dy * cos + src_cy;
        if sx >= 0.0 && sy >= 0.0 && sx < w && sy < h {
            *pixel = *src.get_pixel(sx as u32, sy as u32);
        }
    }
    out
}

/// Single-channel luminance. Alpha is discarded; 16-bit sources stay 16-bit.
pub fn grayscale(img: DynamicImage) -> DynamicImage {
    match img {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageLuma16(_) => img,
        DynamicImage::ImageLumaA16(_)
        | DynamicImage::ImageRgb16(_)
        | DynamicImage::ImageRgba16(_) => DynamicImage::ImageLuma16(img.to_luma16()),
        other => DynamicImage::ImageLuma8(other.to_luma8()),
    }
}
