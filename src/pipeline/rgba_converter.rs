use anyhow::{Result, anyhow};
#[cfg(feature = "camera-nokhwa")]
use nokhwa::{Buffer, utils::FrameFormat};
use rayon::prelude::*;
use yuv::{
    YuvBiPlanarImage, YuvConversionMode, YuvPackedImage, YuvRange, YuvStandardMatrix,
    yuv_nv12_to_rgba, yuyv422_to_rgba,
};
use zune_jpeg::{
    JpegDecoder,
    zune_core::{bytestream::ZCursor, colorspace::ColorSpace, options::DecoderOptions},
};

use crate::types::Frame;

/// Decodes whatever the camera delivered into an RGBA [`Frame`].
#[cfg(feature = "camera-nokhwa")]
pub fn camera_buffer_to_frame(buffer: &Buffer) -> Result<Frame> {
    let resolution = buffer.resolution();
    let (width, height) = (resolution.width_x, resolution.height_y);
    let data = buffer.buffer();

    let (rgba, width, height) = match buffer.source_frame_format() {
        FrameFormat::MJPEG => mjpeg_to_rgba(data, width, height)?,
        FrameFormat::NV12 => (nv12_to_rgba(data, width, height)?, width, height),
        FrameFormat::YUYV => (yuyv_to_rgba(data, width, height)?, width, height),
        FrameFormat::RAWRGB => (packed_rgb_to_rgba(data, width, height, false)?, width, height),
        FrameFormat::RAWBGR => (packed_rgb_to_rgba(data, width, height, true)?, width, height),
        FrameFormat::GRAY => (gray_to_rgba(data, width, height)?, width, height),
    };

    Ok(Frame::new(rgba, width, height))
}

fn ensure_len(kind: &str, data: &[u8], expected: usize) -> Result<()> {
    if data.len() < expected {
        return Err(anyhow!(
            "{kind} buffer too small: got {}, expected {expected}",
            data.len()
        ));
    }
    Ok(())
}

fn nv12_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let y_len = width as usize * height as usize;
    let uv_len = y_len / 2;
    ensure_len("NV12", data, y_len + uv_len)?;

    let image = YuvBiPlanarImage {
        y_plane: &data[..y_len],
        y_stride: width,
        uv_plane: &data[y_len..y_len + uv_len],
        uv_stride: width,
        width,
        height,
    };
    let mut rgba = vec![0u8; y_len * 4];
    yuv_nv12_to_rgba(
        &image,
        &mut rgba,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
        YuvConversionMode::Balanced,
    )
    .map_err(|err| anyhow!("NV12 to RGBA failed: {err:?}"))?;
    Ok(rgba)
}

fn yuyv_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let pixels = width as usize * height as usize;
    ensure_len("YUYV", data, pixels * 2)?;

    let packed = YuvPackedImage {
        yuy: data,
        yuy_stride: width * 2,
        width,
        height,
    };
    let mut rgba = vec![0u8; pixels * 4];
    yuyv422_to_rgba(
        &packed,
        &mut rgba,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
    )
    .map_err(|err| anyhow!("YUYV to RGBA failed: {err:?}"))?;
    Ok(rgba)
}

// The JPEG header is authoritative; some drivers report a stale resolution.
fn mjpeg_to_rgba(data: &[u8], width: u32, height: u32) -> Result<(Vec<u8>, u32, u32)> {
    let options = DecoderOptions::default().jpeg_set_out_colorspace(ColorSpace::RGBA);
    let mut decoder = JpegDecoder::new_with_options(ZCursor::new(data), options);
    let rgba = decoder
        .decode()
        .map_err(|err| anyhow!("MJPEG decode failed: {err:?}"))?;

    let (w, h) = match decoder.info() {
        Some(info) => (
            u32::try_from(info.width).map_err(|_| anyhow!("MJPEG width does not fit u32"))?,
            u32::try_from(info.height).map_err(|_| anyhow!("MJPEG height does not fit u32"))?,
        ),
        None => (width, height),
    };
    let expected = w as usize * h as usize * 4;
    if rgba.len() < expected {
        return Err(anyhow!(
            "MJPEG decode produced too few bytes: got {}, expected {expected}",
            rgba.len()
        ));
    }
    Ok((rgba, w, h))
}

/// Expands packed 24-bit pixels to RGBA, optionally swapping red and blue.
pub fn packed_rgb_to_rgba(data: &[u8], width: u32, height: u32, swap_rb: bool) -> Result<Vec<u8>> {
    let pixels = width as usize * height as usize;
    ensure_len(if swap_rb { "BGR" } else { "RGB" }, data, pixels * 3)?;

    let mut rgba = vec![0u8; pixels * 4];
    rgba.par_chunks_mut(4)
        .zip(data.par_chunks_exact(3))
        .for_each(|(dst, src)| {
            let (r, b) = if swap_rb { (src[2], src[0]) } else { (src[0], src[2]) };
            dst.copy_from_slice(&[r, src[1], b, 255]);
        });
    Ok(rgba)
}

fn gray_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let pixels = width as usize * height as usize;
    ensure_len("GRAY", data, pixels)?;

    let mut rgba = vec![0u8; pixels * 4];
    rgba.par_chunks_mut(4)
        .zip(data.par_iter().copied())
        .for_each(|(dst, value)| dst.copy_from_slice(&[value, value, value, 255]));
    Ok(rgba)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bgr_is_swapped_to_rgb() {
        let rgba = packed_rgb_to_rgba(&[10, 20, 30, 40, 50, 60], 2, 1, true).unwrap();
        assert_eq!(rgba, vec![30, 20, 10, 255, 60, 50, 40, 255]);
    }

    #[test]
    fn short_buffers_are_rejected() {
        assert!(packed_rgb_to_rgba(&[1, 2, 3], 2, 1, false).is_err());
        assert!(gray_to_rgba(&[1], 2, 1).is_err());
    }

    #[test]
    fn gray_expands_to_opaque_rgba() {
        assert_eq!(gray_to_rgba(&[7, 9], 2, 1).unwrap(), vec![7, 7, 7, 255, 9, 9, 9, 255]);
    }
}
