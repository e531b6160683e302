//! Video frame data structures
//!
//! `VideoFrame` is what a camera track publishes; `FrameBuffer` is the
//! sampler-owned luma buffer every decode attempt reads from.

use bytes::Bytes;
use std::time::Instant;
use turbojpeg::{Decompressor, Image, PixelFormat as TJPixelFormat};

use super::format::{LumaLayout, PixelFormat, Resolution};
use crate::error::{AppError, Result};

/// A raw video frame with metadata
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Raw frame data
    data: Bytes,
    /// Frame resolution
    pub resolution: Resolution,
    /// Pixel format
    pub format: PixelFormat,
    /// Stride (bytes per line of the luma plane)
    pub stride: u32,
    /// Frame sequence number
    pub sequence: u64,
    /// Timestamp when frame was captured
    pub capture_ts: Instant,
}

impl VideoFrame {
    /// Create a new video frame
    pub fn new(
        data: Bytes,
        resolution: Resolution,
        format: PixelFormat,
        stride: u32,
        sequence: u64,
    ) -> Self {
        Self {
            data,
            resolution,
            format,
            stride,
            sequence,
            capture_ts: Instant::now(),
        }
    }

    /// Create a frame from a Vec<u8>
    pub fn from_vec(
        data: Vec<u8>,
        resolution: Resolution,
        format: PixelFormat,
        stride: u32,
        sequence: u64,
    ) -> Self {
        Self::new(Bytes::from(data), resolution, format, stride, sequence)
    }

    /// Create a grayscale frame with a tight stride
    pub fn grey(data: Vec<u8>, width: u32, height: u32, sequence: u64) -> Self {
        Self::from_vec(
            data,
            Resolution::new(width, height),
            PixelFormat::Grey,
            width,
            sequence,
        )
    }

    /// Get frame data as bytes slice
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get data length
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if frame is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get width
    pub fn width(&self) -> u32 {
        self.resolution.width
    }

    /// Get height
    pub fn height(&self) -> u32 {
        self.resolution.height
    }

    /// Get age of this frame (time since capture)
    pub fn age(&self) -> std::time::Duration {
        self.capture_ts.elapsed()
    }
}

/// Borrowed 8-bit grayscale image, row-major with a tight stride
#[derive(Debug, Clone, Copy)]
pub struct GrayImage<'a> {
    pixels: &'a [u8],
    width: usize,
    height: usize,
}

impl<'a> GrayImage<'a> {
    /// Wrap a pixel slice; `None` if the slice is too short for the dimensions
    pub fn new(pixels: &'a [u8], width: usize, height: usize) -> Option<Self> {
        let needed = width.checked_mul(height)?;
        if pixels.len() < needed {
            return None;
        }
        Some(Self {
            pixels: &pixels[..needed],
            width,
            height,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> &'a [u8] {
        self.pixels
    }

    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> u8 {
        self.pixels[y * self.width + x]
    }
}

/// Reusable luma buffer sized to the current video resolution
///
/// The backing storage is only re-allocated when the resolution changes;
/// every other fill writes in place.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    pixels: Vec<u8>,
    resolution: Option<Resolution>,
    allocations: u64,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolution of the data currently held
    pub fn resolution(&self) -> Option<Resolution> {
        self.resolution
    }

    /// Number of times the backing storage was (re)allocated
    pub fn allocations(&self) -> u64 {
        self.allocations
    }

    /// Grayscale view of the last filled frame
    pub fn image(&self) -> Option<GrayImage<'_>> {
        let res = self.resolution?;
        GrayImage::new(&self.pixels, res.width as usize, res.height as usize)
    }

    fn ensure(&mut self, resolution: Resolution) {
        if self.resolution == Some(resolution) && self.pixels.len() == resolution.pixels() {
            return;
        }
        self.pixels = vec![0u8; resolution.pixels()];
        self.resolution = Some(resolution);
        self.allocations += 1;
    }

    /// Reduce a raw frame to luma, writing into this buffer
    pub fn fill_from(&mut self, frame: &VideoFrame) -> Result<()> {
        if frame.resolution.is_empty() {
            return Err(AppError::FrameError("frame has zero dimensions".to_string()));
        }

        match frame.format.luma_layout() {
            LumaLayout::Compressed => self.fill_from_jpeg(frame.data()),
            LumaLayout::Packed { offset, step } => {
                self.fill_strided(frame, offset, step)
            }
            LumaLayout::Planar => self.fill_strided(frame, 0, 1),
        }
    }

    fn fill_strided(&mut self, frame: &VideoFrame, offset: usize, step: usize) -> Result<()> {
        let width = frame.width() as usize;
        let height = frame.height() as usize;
        let stride = if frame.stride == 0 {
            frame.format.default_stride(frame.width()) as usize
        } else {
            frame.stride as usize
        };

        let row_bytes = offset + (width - 1) * step + 1;
        if stride < row_bytes {
            return Err(AppError::FrameError(format!(
                "stride {} too small for {} {}",
                stride, frame.format, frame.resolution
            )));
        }
        let needed = (height - 1) * stride + row_bytes;
        let data = frame.data();
        if data.len() < needed {
            return Err(AppError::FrameError(format!(
                "short {} frame: {} bytes, need {}",
                frame.format,
                data.len(),
                needed
            )));
        }

        self.ensure(frame.resolution);
        for (y, dst_row) in self.pixels.chunks_exact_mut(width).enumerate() {
            let line = &data[y * stride..];
            if step == 1 {
                dst_row.copy_from_slice(&line[offset..offset + width]);
            } else {
                for (x, dst) in dst_row.iter_mut().enumerate() {
                    *dst = line[offset + x * step];
                }
            }
        }
        Ok(())
    }

    fn fill_from_jpeg(&mut self, jpeg: &[u8]) -> Result<()> {
        let mut decompressor = Decompressor::new().map_err(|e| {
            AppError::FrameError(format!("Failed to create turbojpeg decoder: {}", e))
        })?;
        let header = decompressor
            .read_header(jpeg)
            .map_err(|e| AppError::FrameError(format!("turbojpeg read_header failed: {}", e)))?;

        let resolution = Resolution::new(header.width as u32, header.height as u32);
        if resolution.is_empty() {
            return Err(AppError::FrameError("jpeg has zero dimensions".to_string()));
        }
        self.ensure(resolution);

        let image = Image {
            pixels: self.pixels.as_mut_slice(),
            width: header.width,
            pitch: header.width,
            height: header.height,
            format: TJPixelFormat::GRAY,
        };
        decompressor
            .decompress(jpeg, image)
            .map_err(|e| AppError::FrameError(format!("turbojpeg decode failed: {}", e)))?;
        Ok(())
    }
}
