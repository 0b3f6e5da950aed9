//! Frames flowing through the pipeline
//!
//! A `Frame` owns its pixel buffer. Ownership moves from stage to stage;
//! a frame is never shared between two stages at once.

pub mod pool;

use std::time::Instant;

use crate::error::{PipelineError, Result};

pub use pool::{FrameBufferPool, PoolStats, PooledBuffer};

/// Pixel layout of a frame buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 8-bit RGBA, 4 bytes per pixel
    Rgba8,
    /// 8-bit BGRA, 4 bytes per pixel (common camera output)
    Bgra8,
    /// 8-bit RGB, 3 bytes per pixel
    Rgb8,
    /// Planar YUV 4:2:0; recognised but not processed
    Nv12,
}

impl PixelFormat {
    /// Bytes per pixel for packed formats
    pub fn bytes_per_pixel(self) -> Option<usize> {
        match self {
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => Some(4),
            PixelFormat::Rgb8 => Some(3),
            PixelFormat::Nv12 => None,
        }
    }

    /// Byte offsets of the red, green and blue channels within a pixel
    pub fn rgb_offsets(self) -> Option<[usize; 3]> {
        match self {
            PixelFormat::Rgba8 | PixelFormat::Rgb8 => Some([0, 1, 2]),
            PixelFormat::Bgra8 => Some([2, 1, 0]),
            PixelFormat::Nv12 => None,
        }
    }

    /// Whether the pipeline can process this format
    pub fn is_supported(self) -> bool {
        self.bytes_per_pixel().is_some()
    }
}

/// Camera frame
pub struct Frame {
    /// Pixel data
    pub data: PooledBuffer,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Pixel layout
    pub format: PixelFormat,
    /// Capture timestamp
    pub timestamp: Instant,
    /// Capture sequence number
    pub sequence: u64,
}

impl Frame {
    /// Wrap a buffer as a frame captured now
    pub fn new(data: PooledBuffer, width: u32, height: u32, format: PixelFormat, sequence: u64) -> Self {
        Self {
            data,
            width,
            height,
            format,
            timestamp: Instant::now(),
            sequence,
        }
    }

    /// Build a frame from raw RGBA bytes that do not belong to a pool
    pub fn from_rgba(data: Vec<u8>, width: u32, height: u32, sequence: u64) -> Self {
        Self::new(PooledBuffer::detached(data), width, height, PixelFormat::Rgba8, sequence)
    }

    /// Copy an RGBA image into a pooled frame
    pub fn from_rgba_image(pool: &FrameBufferPool, image: &image::RgbaImage, sequence: u64) -> Result<Self> {
        let data = pool.acquire_copy(image.as_raw())?;
        Ok(Self::new(data, image.width(), image.height(), PixelFormat::Rgba8, sequence))
    }

    /// Export the frame as an RGBA image (used for still capture)
    pub fn to_rgba_image(&self) -> Result<image::RgbaImage> {
        self.validate()?;
        let bpp = self.bytes_per_pixel()?;
        let [r, g, b] = self.rgb_offsets()?;

        let mut rgba = Vec::with_capacity(self.pixel_count() * 4);
        for px in self.data.chunks_exact(bpp) {
            let alpha = if bpp == 4 { px[3] } else { 255 };
            rgba.extend_from_slice(&[px[r], px[g], px[b], alpha]);
        }

        image::RgbaImage::from_raw(self.width, self.height, rgba)
            .ok_or_else(|| PipelineError::InvalidFrame("buffer does not match dimensions".into()))
    }

    /// Number of pixels
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Bytes per pixel, failing for unsupported formats
    pub fn bytes_per_pixel(&self) -> Result<usize> {
        self.format
            .bytes_per_pixel()
            .ok_or_else(|| PipelineError::InvalidFrame(format!("unsupported pixel format {:?}", self.format)))
    }

    /// Channel offsets, failing for unsupported formats
    pub fn rgb_offsets(&self) -> Result<[usize; 3]> {
        self.format
            .rgb_offsets()
            .ok_or_else(|| PipelineError::InvalidFrame(format!("unsupported pixel format {:?}", self.format)))
    }

    /// Check the frame is non-empty, supported, and its buffer matches its size
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(PipelineError::InvalidFrame(format!(
                "empty frame {}x{}",
                self.width, self.height
            )));
        }
        let bpp = self.bytes_per_pixel()?;
        let expected = self.pixel_count() * bpp;
        if self.data.len() != expected {
            return Err(PipelineError::InvalidFrame(format!(
                "buffer holds {} bytes, {}x{} {:?} needs {}",
                self.data.len(),
                self.width,
                self.height,
                self.format,
                expected
            )));
        }
        Ok(())
    }

    /// Read a pixel as normalized RGB
    #[inline]
    pub fn rgb_at(&self, x: u32, y: u32, bpp: usize, offsets: [usize; 3]) -> [f32; 3] {
        let idx = (y as usize * self.width as usize + x as usize) * bpp;
        [
            self.data[idx + offsets[0]] as f32 / 255.0,
            self.data[idx + offsets[1]] as f32 / 255.0,
            self.data[idx + offsets[2]] as f32 / 255.0,
        ]
    }

    /// Downscale to packed RGB floats in `[0, 1]` (HWC layout).
    ///
    /// `region` is `(x, y, width, height)` in frame pixels; pass the whole
    /// frame to scale everything.
    pub fn sample_rgb(&self, region: (u32, u32, u32, u32), target_width: u32, target_height: u32) -> Result<Vec<f32>> {
        self.validate()?;
        let bpp = self.bytes_per_pixel()?;
        let offsets = self.rgb_offsets()?;
        let (rx, ry, rw, rh) = region;

        let mut output = vec![0.0f32; (target_width * target_height * 3) as usize];
        if rw == 0 || rh == 0 {
            return Ok(output);
        }
        let x_ratio = rw as f32 / target_width as f32;
        let y_ratio = rh as f32 / target_height as f32;

        for y in 0..target_height {
            let src_y = (ry + (y as f32 * y_ratio) as u32).min(self.height - 1);
            for x in 0..target_width {
                let src_x = (rx + (x as f32 * x_ratio) as u32).min(self.width - 1);
                let rgb = self.rgb_at(src_x, src_y, bpp, offsets);
                let out_idx = ((y * target_width + x) * 3) as usize;
                output[out_idx..out_idx + 3].copy_from_slice(&rgb);
            }
        }

        Ok(output)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("sequence", &self.sequence)
            .finish()
    }
}

/// Axis-aligned pixel rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Exclusive right edge
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    /// Normalized vertical position of row `y` within the region
    pub fn vertical_t(&self, y: u32) -> f32 {
        if self.height <= 1 {
            return 0.0;
        }
        let offset = y.saturating_sub(self.y) as f32;
        (offset / (self.height - 1) as f32).clamp(0.0, 1.0)
    }
}

/// Per-pixel depth from a depth-capable camera, in meters
#[derive(Debug, Clone)]
pub struct DepthHint {
    /// Depth map width
    pub width: u32,
    /// Depth map height
    pub height: u32,
    /// Row-major depth values; `<= 0` or non-finite means no reading
    pub depth: Vec<f32>,
}

impl DepthHint {
    /// Depth at normalized coordinates, if there is a valid reading
    pub fn sample(&self, x: f32, y: f32) -> Option<f32> {
        if self.width == 0 || self.height == 0 {
            return None;
        }
        let px = ((x * self.width as f32) as u32).min(self.width - 1);
        let py = ((y * self.height as f32) as u32).min(self.height - 1);
        let value = *self.depth.get((py * self.width + px) as usize)?;
        (value.is_finite() && value > 0.0).then_some(value)
    }
}
