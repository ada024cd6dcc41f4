use anyhow::{Context, Result, anyhow};
use fast_image_resize as fir;
use ndarray::Array4;
use rayon::prelude::*;

use crate::types::{Frame, NUM_LANDMARKS};

pub const INPUT_SIZE: u32 = 224;
pub const PALM_INPUT_SIZE: u32 = 192;

#[derive(Clone, Debug)]
pub struct LetterboxInfo {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub orig_w: u32,
    pub orig_h: u32,
}

#[derive(Clone, Debug)]
pub struct CropTransform {
    pub center: (f32, f32),
    pub side: f32,
    pub angle: f32,
    pub output_size: u32,
    pub orig_w: u32,
    pub orig_h: u32,
}

fn check_frame(frame: &Frame) -> Result<()> {
    let expected_len = (frame.width as usize)
        .saturating_mul(frame.height as usize)
        .saturating_mul(4);
    if frame.rgba.len() != expected_len || expected_len == 0 {
        return Err(anyhow!(
            "frame buffer size mismatch: got {}, expected {}",
            frame.rgba.len(),
            expected_len
        ));
    }
    Ok(())
}

/// Letterboxes the frame into a `target_size` square NHWC tensor in [0, 1].
pub fn prepare_frame_with_size(
    frame: &Frame,
    target_size: u32,
) -> Result<(Array4<f32>, LetterboxInfo)> {
    check_frame(frame)?;

    let scale = target_size as f32 / (frame.width.max(frame.height) as f32);
    let new_w = (frame.width as f32 * scale).round().max(1.0) as u32;
    let new_h = (frame.height as f32 * scale).round().max(1.0) as u32;

    let src_image = fir::images::Image::from_vec_u8(
        frame.width,
        frame.height,
        frame.rgba.clone(),
        fir::PixelType::U8x4,
    )?;
    let mut dst_image = fir::images::Image::new(new_w, new_h, fir::PixelType::U8x4);
    let resize_options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
    fir::Resizer::new()
        .resize(&src_image, &mut dst_image, Some(&resize_options))
        .context("fast resize failed")?;
    let resized = dst_image.into_vec();

    let pad_x = ((target_size as i64 - new_w as i64) / 2).max(0) as usize;
    let pad_y = ((target_size as i64 - new_h as i64) / 2).max(0) as usize;
    let side = target_size as usize;
    let mut canvas = vec![0.0f32; side * side * 3];
    let src_stride = new_w as usize * 4;
    canvas
        .par_chunks_mut(side * 3)
        .enumerate()
        .skip(pad_y)
        .take(new_h as usize)
        .for_each(|(row, dst)| {
            let src = &resized[(row - pad_y) * src_stride..(row - pad_y + 1) * src_stride];
            for (x, px) in src.chunks_exact(4).enumerate() {
                let offset = (pad_x + x) * 3;
                dst[offset] = px[0] as f32 / 255.0;
                dst[offset + 1] = px[1] as f32 / 255.0;
                dst[offset + 2] = px[2] as f32 / 255.0;
            }
        });

    let input = Array4::<f32>::from_shape_vec((1, side, side, 3), canvas)
        .map_err(|err| anyhow!("failed to build input tensor: {err}"))?;

    let letterbox = LetterboxInfo {
        scale,
        pad_x: pad_x as f32,
        pad_y: pad_y as f32,
        orig_w: frame.width,
        orig_h: frame.height,
    };

    Ok((input, letterbox))
}

pub fn decode_landmarks(flat: &[f32]) -> Result<[[f32; 3]; NUM_LANDMARKS]> {
    if flat.len() < NUM_LANDMARKS * 3 {
        return Err(anyhow!(
            "unexpected landmarks length: got {}, need {}",
            flat.len(),
            NUM_LANDMARKS * 3
        ));
    }

    let mut landmarks = [[0.0; 3]; NUM_LANDMARKS];
    for (dst, chunk) in landmarks.iter_mut().zip(flat.chunks_exact(3)) {
        *dst = [chunk[0], chunk[1], chunk[2]];
    }
    Ok(landmarks)
}

/// Samples a rotated square of `side` pixels around `center` into an
/// `output_size` tensor, the input layout the hand-landmark model expects.
pub fn prepare_rotated_crop(
    frame: &Frame,
    center: (f32, f32),
    side: f32,
    angle: f32,
    output_size: u32,
) -> Result<(Array4<f32>, CropTransform)> {
    check_frame(frame)?;

    let transform = CropTransform {
        center,
        side,
        angle,
        output_size,
        orig_w: frame.width,
        orig_h: frame.height,
    };

    let size = output_size as usize;
    let mut data = vec![0.0f32; size * size * 3];
    data.par_chunks_mut(size * 3)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..size {
                let (src_x, src_y) = transform.to_frame(x as f32 + 0.5, y as f32 + 0.5);
                row[x * 3..x * 3 + 3].copy_from_slice(&sample_rgb(frame, src_x, src_y));
            }
        });

    let array = Array4::<f32>::from_shape_vec((1, size, size, 3), data)
        .map_err(|err| anyhow!("failed to build rotated crop tensor: {err}"))?;

    Ok((array, transform))
}

impl CropTransform {
    fn crop_scale(&self) -> f32 {
        self.side / self.output_size as f32
    }

    /// Maps a point in crop space to (unclamped) frame pixels.
    pub fn to_frame(&self, x: f32, y: f32) -> (f32, f32) {
        let half = self.output_size as f32 / 2.0;
        let scale = self.crop_scale();
        let dx = (x - half) * scale;
        let dy = (y - half) * scale;
        let (sin, cos) = self.angle.sin_cos();
        (
            self.center.0 + dx * cos - dy * sin,
            self.center.1 + dx * sin + dy * cos,
        )
    }

    /// Projects crop-space landmarks into the frame and normalizes them by
    /// frame size. Depth is scaled by the same factor as x.
    pub fn normalize(&self, landmarks: &[[f32; 3]; NUM_LANDMARKS]) -> [[f32; 3]; NUM_LANDMARKS] {
        let w = self.orig_w.max(1) as f32;
        let h = self.orig_h.max(1) as f32;
        let z_scale = self.crop_scale() / w;
        landmarks.map(|[x, y, z]| {
            let (px, py) = self.to_frame(x, y);
            [
                (px / w).clamp(0.0, 1.0),
                (py / h).clamp(0.0, 1.0),
                z * z_scale,
            ]
        })
    }
}

fn sample_rgb(frame: &Frame, x: f32, y: f32) -> [f32; 3] {
    if x.is_nan() || y.is_nan() {
        return [0.0, 0.0, 0.0];
    }
    let x0 = x.floor();
    let y0 = y.floor();

    let (w, h) = (frame.width as i32, frame.height as i32);
    let fetch = |cx: f32, cy: f32| -> [f32; 3] {
        let ix = cx as i32;
        let iy = cy as i32;
        if ix < 0 || iy < 0 || ix >= w || iy >= h {
            return [0.0, 0.0, 0.0];
        }
        let idx = ((iy as u32 * frame.width + ix as u32) as usize) * 4;
        [
            frame.rgba[idx] as f32 / 255.0,
            frame.rgba[idx + 1] as f32 / 255.0,
            frame.rgba[idx + 2] as f32 / 255.0,
        ]
    };

    let fx = x - x0;
    let fy = y - y0;
    let c00 = fetch(x0, y0);
    let c10 = fetch(x0 + 1.0, y0);
    let c01 = fetch(x0, y0 + 1.0);
    let c11 = fetch(x0 + 1.0, y0 + 1.0);

    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    std::array::from_fn(|c| lerp(lerp(c00[c], c10[c], fx), lerp(c01[c], c11[c], fx), fy))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(width: u32, height: u32, rgb: [u8; 3]) -> Frame {
        let mut rgba = Vec::with_capacity((width * height * 4) as usize);
        for _ in 0..width * height {
            rgba.extend_from_slice(&[rgb[0], rgb[1], rgb[2], 255]);
        }
        Frame::new(rgba, width, height)
    }

    #[test]
    fn letterbox_pads_the_short_side() {
        let frame = solid_frame(64, 32, [255, 255, 255]);
        let (input, letterbox) = prepare_frame_with_size(&frame, 32).unwrap();
        assert_eq!(input.shape(), &[1, 32, 32, 3]);
        assert_eq!(letterbox.pad_x, 0.0);
        assert_eq!(letterbox.pad_y, 8.0);
        assert_eq!(input[[0, 0, 0, 0]], 0.0);
        assert!((input[[0, 16, 16, 0]] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn mismatched_buffers_are_rejected() {
        let frame = Frame::new(vec![0; 10], 4, 4);
        assert!(prepare_frame_with_size(&frame, 32).is_err());
        assert!(prepare_rotated_crop(&frame, (2.0, 2.0), 4.0, 0.0, 8).is_err());
    }

    #[test]
    fn crop_center_maps_to_palm_center() {
        let transform = CropTransform {
            center: (320.0, 240.0),
            side: 200.0,
            angle: 0.7,
            output_size: INPUT_SIZE,
            orig_w: 640,
            orig_h: 480,
        };
        let half = INPUT_SIZE as f32 / 2.0;
        let (x, y) = transform.to_frame(half, half);
        assert!((x - 320.0).abs() < 1e-3 && (y - 240.0).abs() < 1e-3);

        let mut landmarks = [[half, half, 0.0]; NUM_LANDMARKS];
        landmarks[1] = [half, half, 10.0];
        let normalized = transform.normalize(&landmarks);
        assert!((normalized[0][0] - 0.5).abs() < 1e-4);
        assert!((normalized[0][1] - 0.5).abs() < 1e-4);
        assert!(normalized[1][2] > 0.0);
    }

    #[test]
    fn short_landmark_output_is_an_error() {
        assert!(decode_landmarks(&[0.0; 10]).is_err());
        let flat: Vec<f32> = (0..63).map(|v| v as f32).collect();
        let decoded = decode_landmarks(&flat).unwrap();
        assert_eq!(decoded[20], [60.0, 61.0, 62.0]);
    }
}
