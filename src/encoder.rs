// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Encoder adapter: turns any captured frame into JPEG bytes.
//!
//! A frame that is already JPEG is passed through without a copy and stays on
//! loan from the driver until the [`EncodedFrame`] is dropped. Anything else is
//! compressed with turbojpeg into a fresh buffer and the source frame goes
//! back to the driver straight away.

use crate::{
    config::PixelFormat,
    driver::FrameBuffer,
    error::ConversionError,
    gate::Frame,
};
use std::fmt;
use turbojpeg::{OwnedBuf, Subsamp};

/// JPEG bytes ready for the wire.
pub enum EncodedFrame<'a> {
    /// Bytes alias the driver buffer, returned to the driver on drop.
    Aliased(Frame<'a>),
    /// Bytes live in an encoder allocation, freed on drop.
    Converted(OwnedBuf),
}

impl EncodedFrame<'_> {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            EncodedFrame::Aliased(frame) => frame.data(),
            EncodedFrame::Converted(buf) => &buf[..],
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    pub fn is_aliased(&self) -> bool {
        matches!(self, EncodedFrame::Aliased(_))
    }

    /// Releases the frame resources now instead of at end of scope.
    pub fn release(self) {
        drop(self)
    }
}

impl fmt::Debug for EncodedFrame<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EncodedFrame::Aliased(frame) => f.debug_tuple("Aliased").field(frame).finish(),
            EncodedFrame::Converted(buf) => f.debug_tuple("Converted").field(&buf.len()).finish(),
        }
    }
}

/// Produces JPEG bytes for `frame`.
///
/// `quality` is the codec quality, 1-100. When a conversion happens the frame
/// is returned to the driver before this function returns, whether or not the
/// conversion succeeded.
pub fn to_encoded(frame: Frame<'_>, quality: i32) -> Result<EncodedFrame<'_>, ConversionError> {
    if frame.format() == PixelFormat::Jpeg {
        return Ok(EncodedFrame::Aliased(frame));
    }
    let result = compress(&frame, quality);
    frame.release();
    result.map(EncodedFrame::Converted)
}

/// Compresses a raw frame buffer to JPEG.
pub fn compress(fb: &FrameBuffer, quality: i32) -> Result<OwnedBuf, ConversionError> {
    let format = fb.format();
    let bpp = format
        .bytes_per_pixel()
        .ok_or(ConversionError::UnsupportedFormat(format))?;
    // YUYV pairs share chroma, so pixels come in twos
    if format == PixelFormat::Yuyv && fb.width() % 2 != 0 {
        return Err(ConversionError::OddWidth {
            format,
            width: fb.width(),
        });
    }
    let width = fb.width() as usize;
    let height = fb.height() as usize;
    let expected = width * height * bpp;
    if expected == 0 || fb.len() < expected {
        return Err(ConversionError::Truncated {
            width: fb.width(),
            height: fb.height(),
            expected,
            actual: fb.len(),
        });
    }
    let pixels = &fb.data()[..expected];

    let quality = quality.clamp(1, 100);
    match format {
        PixelFormat::Rgb888 => encode_rgb(pixels, width, height, quality),
        PixelFormat::Yuyv => encode_rgb(&yuyv_to_rgb(pixels), width, height, quality),
        PixelFormat::Rgb565 => encode_rgb(&rgb565_to_rgb(pixels), width, height, quality),
        PixelFormat::Grayscale => {
            let image = turbojpeg::Image {
                pixels,
                width,
                pitch: width,
                height,
                format: turbojpeg::PixelFormat::GRAY,
            };
            Ok(turbojpeg::compress(image, quality, Subsamp::Gray)?)
        }
        PixelFormat::Jpeg => Err(ConversionError::UnsupportedFormat(format)),
    }
}

fn encode_rgb(
    pixels: &[u8],
    width: usize,
    height: usize,
    quality: i32,
) -> Result<OwnedBuf, ConversionError> {
    let image = turbojpeg::Image {
        pixels,
        width,
        pitch: width * 3,
        height,
        format: turbojpeg::PixelFormat::RGB,
    };
    Ok(turbojpeg::compress(image, quality, Subsamp::Sub2x2)?)
}

/// Converts packed YUYV (BT.601, studio swing) to RGB888.
pub fn yuyv_to_rgb(src: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(src.len() / 2 * 3);
    for px in src.chunks_exact(4) {
        let d = px[1] as i32 - 128;
        let e = px[3] as i32 - 128;
        for y in [px[0], px[2]] {
            let c = y as i32 - 16;
            rgb.push(clamp_u8((298 * c + 409 * e + 128) >> 8));
            rgb.push(clamp_u8((298 * c - 100 * d - 208 * e + 128) >> 8));
            rgb.push(clamp_u8((298 * c + 516 * d + 128) >> 8));
        }
    }
    rgb
}

/// Expands little-endian RGB565 to RGB888.
pub fn rgb565_to_rgb(src: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(src.len() / 2 * 3);
    for px in src.chunks_exact(2) {
        let v = u16::from_le_bytes([px[0], px[1]]);
        let r = ((v >> 11) & 0x1f) as u8;
        let g = ((v >> 5) & 0x3f) as u8;
        let b = (v & 0x1f) as u8;
        rgb.push((r << 3) | (r >> 2));
        rgb.push((g << 2) | (g >> 4));
        rgb.push((b << 3) | (b >> 2));
    }
    rgb
}

fn clamp_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn yuyv_mid_gray() {
        let rgb = yuyv_to_rgb(&[128, 128, 128, 128]);
        assert_eq!(rgb, vec![130; 6]);
    }

    #[test]
    fn yuyv_black_and_white() {
        let rgb = yuyv_to_rgb(&[16, 128, 235, 128]);
        assert_eq!(&rgb[..3], &[0, 0, 0]);
        assert_eq!(&rgb[3..], &[255, 255, 255]);
    }

    #[test]
    fn yuyv_odd_width_rejected() {
        let yuyv = |width: u32| {
            let len = (width * 2 * 2) as usize;
            FrameBuffer::new(0, vec![128; len], PixelFormat::Yuyv, width, 2, 1, Duration::ZERO)
        };

        assert!(matches!(
            compress(&yuyv(3), 80),
            Err(ConversionError::OddWidth { width: 3, .. })
        ));
        let jpeg = compress(&yuyv(4), 80).unwrap();
        assert_eq!(&jpeg[..2], &[0xff, 0xd8]);
    }

    #[test]
    fn rgb565_extremes() {
        assert_eq!(rgb565_to_rgb(&[0xff, 0xff]), vec![255, 255, 255]);
        assert_eq!(rgb565_to_rgb(&[0x00, 0xf8]), vec![255, 0, 0]);
        assert_eq!(rgb565_to_rgb(&[0x1f, 0x00]), vec![0, 0, 255]);
    }
}
