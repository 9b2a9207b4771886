//! Frame handling for the punch pipeline
//!
//! Orientation-corrected decoding, padded face crops, and JPEG re-encoding.
//! All pure image work lives here so the pipeline stays orchestration-only.

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, ImageReader};

use crate::error::{AppError, AppResult};
use crate::external::face::BoundingBox;

/// Padding applied around a detected face before cropping, as a fraction of
/// the box size on each side
const CROP_PADDING: f32 = 0.25;

/// Edge length the gallery-search crops are standardised to
pub const CROP_SIZE: u32 = 600;

/// Decode image bytes and apply the EXIF orientation, returning an
/// upright pixel buffer
pub fn normalise(bytes: &[u8]) -> AppResult<DynamicImage> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| AppError::ValidationError(format!("Unreadable image: {}", e)))?;

    let mut decoder = reader
        .into_decoder()
        .map_err(|e| AppError::ValidationError(format!("Invalid image: {}", e)))?;

    let orientation = image::ImageDecoder::orientation(&mut decoder)
        .unwrap_or(image::metadata::Orientation::NoTransforms);

    let mut img = DynamicImage::from_decoder(decoder)
        .map_err(|e| AppError::ValidationError(format!("Invalid image: {}", e)))?;
    img.apply_orientation(orientation);

    Ok(img)
}

/// Encode a frame as JPEG
pub fn encode_jpeg(img: &DynamicImage) -> AppResult<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, ImageFormat::Jpeg)
        .map_err(|e| AppError::Internal(format!("JPEG encode failed: {}", e)))?;
    Ok(buffer.into_inner())
}

/// Pixel crop rectangle for a detected face: the normalised bounding box,
/// padded by 25% on each side and clipped to the frame
pub fn padded_crop_box(bb: &BoundingBox, width: u32, height: u32) -> (u32, u32, u32, u32) {
    let (w, h) = (width as f32, height as f32);

    let pad_x = bb.width * CROP_PADDING;
    let pad_y = bb.height * CROP_PADDING;

    let left = ((bb.left - pad_x) * w).max(0.0);
    let top = ((bb.top - pad_y) * h).max(0.0);
    let right = ((bb.left + bb.width + pad_x) * w).min(w);
    let bottom = ((bb.top + bb.height + pad_y) * h).min(h);

    let x = left as u32;
    let y = top as u32;
    let crop_w = (right - left).max(1.0) as u32;
    let crop_h = (bottom - top).max(1.0) as u32;

    (x, y, crop_w.max(1), crop_h.max(1))
}

/// Cut a padded face crop out of the frame and re-encode it at the
/// standard gallery-search size
pub fn face_crop(frame: &DynamicImage, bb: &BoundingBox) -> AppResult<Vec<u8>> {
    let (x, y, w, h) = padded_crop_box(bb, frame.width(), frame.height());
    let crop = frame
        .crop_imm(x, y, w, h)
        .resize_exact(CROP_SIZE, CROP_SIZE, image::imageops::FilterType::Triangle);
    encode_jpeg(&crop)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bb(left: f32, top: f32, width: f32, height: f32) -> BoundingBox {
        BoundingBox {
            left,
            top,
            width,
            height,
        }
    }

    #[test]
    fn test_centre_box_gets_symmetric_padding() {
        // 200x200 box centred in a 1000x1000 frame
        let (x, y, w, h) = padded_crop_box(&bb(0.4, 0.4, 0.2, 0.2), 1000, 1000);
        assert_eq!((x, y), (350, 350));
        assert_eq!((w, h), (300, 300));
    }

    #[test]
    fn test_corner_box_clips_to_frame() {
        let (x, y, w, h) = padded_crop_box(&bb(0.0, 0.0, 0.2, 0.2), 1000, 1000);
        assert_eq!((x, y), (0, 0));
        // Left/top padding is clipped away, right/bottom keeps its 25%
        assert_eq!((w, h), (250, 250));
    }

    #[test]
    fn test_box_at_far_edge_clips() {
        let (x, y, w, h) = padded_crop_box(&bb(0.85, 0.85, 0.15, 0.15), 1000, 1000);
        assert!(x >= 800 && y >= 800);
        assert!(x + w <= 1000);
        assert!(y + h <= 1000);
    }

    #[test]
    fn test_degenerate_box_stays_nonzero() {
        let (_, _, w, h) = padded_crop_box(&bb(0.5, 0.5, 0.0, 0.0), 1000, 1000);
        assert!(w >= 1 && h >= 1);
    }

    #[test]
    fn test_normalise_decodes_plain_png() {
        let img = DynamicImage::new_rgb8(8, 6);
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, ImageFormat::Png).unwrap();

        let decoded = normalise(buffer.get_ref()).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 6));
    }

    #[test]
    fn test_normalise_rejects_garbage() {
        assert!(normalise(b"not an image").is_err());
    }

    #[test]
    fn test_face_crop_is_square_jpeg() {
        let frame = DynamicImage::new_rgb8(1000, 800);
        let crop = face_crop(&frame, &bb(0.3, 0.3, 0.2, 0.2)).unwrap();
        let decoded = image::load_from_memory(&crop).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (CROP_SIZE, CROP_SIZE));
    }
}
