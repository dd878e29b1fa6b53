//! BGR24 frame types
//!
//! [`Frame`] is a borrowed view over caller memory with a declared shape, the
//! form in which frames cross into the camera. [`FrameBuffer`] is an owned
//! image used by the receiver and by test pattern generators.

use crate::error::{Result, VcamError};
use crate::types::{CHANNELS, validate_dimensions};

/// Row order and padding of an image copied out of the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RowLayout {
    /// Rows top to bottom, tightly packed
    #[default]
    TopDown,
    /// Rows bottom to top, each row padded to a multiple of 4 bytes
    BottomUpPadded,
}

impl RowLayout {
    /// Bytes per row for an image `width` pixels wide
    pub fn stride(&self, width: usize) -> usize {
        let row = width * CHANNELS;
        match self {
            Self::TopDown => row,
            Self::BottomUpPadded => (row + 3) & !3,
        }
    }

    /// Bytes needed to hold a `width` x `height` image
    pub fn buffer_size(&self, width: usize, height: usize) -> usize {
        self.stride(width) * height
    }
}

/// Copy a tightly packed BGR image into `out` using `layout`
///
/// `out` must hold at least `layout.buffer_size(width, height)` bytes.
pub(crate) fn copy_image(
    src: &[u8],
    width: usize,
    height: usize,
    out: &mut [u8],
    layout: RowLayout,
) -> Result<()> {
    let row = width * CHANNELS;
    let needed = layout.buffer_size(width, height);
    if src.len() < row * height {
        return Err(VcamError::invalid_frame(format!(
            "source holds {} bytes, expected {}",
            src.len(),
            row * height
        )));
    }
    if out.len() < needed {
        return Err(VcamError::invalid_argument(format!(
            "output buffer holds {} bytes, {:?} needs {}",
            out.len(),
            layout,
            needed
        )));
    }

    match layout {
        RowLayout::TopDown => out[..needed].copy_from_slice(&src[..needed]),
        RowLayout::BottomUpPadded => {
            let stride = layout.stride(width);
            for (y, src_row) in src.chunks_exact(row).take(height).enumerate() {
                let dst = &mut out[(height - 1 - y) * stride..][..stride];
                dst[..row].copy_from_slice(src_row);
                dst[row..].fill(0);
            }
        }
    }
    Ok(())
}

/// A borrowed image with a declared shape
///
/// The shape is whatever the caller claims, e.g. `[240, 320, 3]`. It is only
/// checked against the camera geometry when the frame is submitted.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    data: &'a [u8],
    shape: &'a [usize],
}

impl<'a> Frame<'a> {
    /// Wrap raw pixel data with its declared (height, width, channels) shape
    pub fn new(data: &'a [u8], shape: &'a [usize]) -> Self {
        Self { data, shape }
    }

    /// Wrap packed BGR24 pixel data of a known size
    pub fn bgr(data: &'a [u8], width: usize, height: usize) -> BgrFrame<'a> {
        BgrFrame {
            data,
            shape: [height, width, CHANNELS],
        }
    }

    /// Raw pixel data
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Declared shape
    pub fn shape(&self) -> &'a [usize] {
        self.shape
    }

    /// Check the frame is exactly `(height, width, 3)` with matching data
    pub fn validate_against(&self, width: u32, height: u32) -> Result<()> {
        let expected = [height as usize, width as usize, CHANNELS];
        if self.shape != expected.as_slice() {
            return Err(VcamError::invalid_frame(format!(
                "expected shape {:?}, got {:?}",
                expected, self.shape
            )));
        }
        let size = expected.iter().product::<usize>();
        if self.data.len() != size {
            return Err(VcamError::invalid_frame(format!(
                "shape {:?} needs {} bytes, got {}",
                self.shape,
                size,
                self.data.len()
            )));
        }
        Ok(())
    }
}

/// A packed BGR frame that owns its shape array
///
/// Returned by [`Frame::bgr`]; call [`BgrFrame::as_frame`] to submit it.
#[derive(Debug, Clone, Copy)]
pub struct BgrFrame<'a> {
    data: &'a [u8],
    shape: [usize; 3],
}

impl<'a> BgrFrame<'a> {
    /// Borrow as a [`Frame`]
    pub fn as_frame(&self) -> Frame<'_> {
        Frame::new(self.data, &self.shape)
    }
}

/// Owned BGR24 image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    shape: [usize; 3],
    data: Vec<u8>,
}

impl FrameBuffer {
    /// Create a black image
    pub fn new(width: u32, height: u32) -> Result<Self> {
        validate_dimensions(width as i64, height as i64)?;
        let size = width as usize * height as usize * CHANNELS;
        Ok(Self {
            width,
            height,
            shape: [height as usize, width as usize, CHANNELS],
            data: vec![0; size],
        })
    }

    /// Take ownership of packed BGR24 data
    pub fn from_vec(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        validate_dimensions(width as i64, height as i64)?;
        let size = width as usize * height as usize * CHANNELS;
        if data.len() != size {
            return Err(VcamError::invalid_frame(format!(
                "{}x{} BGR image needs {} bytes, got {}",
                width,
                height,
                size,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            shape: [height as usize, width as usize, CHANNELS],
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes per row
    pub fn stride(&self) -> usize {
        self.width as usize * CHANNELS
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// (B, G, R) at `(x, y)`, or `None` outside the image
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        let offset = self.offset(x, y)?;
        let px = &self.data[offset..offset + CHANNELS];
        Some([px[0], px[1], px[2]])
    }

    /// Set (B, G, R) at `(x, y)`; writes outside the image are ignored
    pub fn set_pixel(&mut self, x: u32, y: u32, bgr: [u8; 3]) {
        if let Some(offset) = self.offset(x, y) {
            self.data[offset..offset + CHANNELS].copy_from_slice(&bgr);
        }
    }

    /// Paint the whole image one colour
    pub fn fill(&mut self, bgr: [u8; 3]) {
        for px in self.data.chunks_exact_mut(CHANNELS) {
            px.copy_from_slice(&bgr);
        }
    }

    /// Quarter every channel value
    ///
    /// Used to mark the last image as stale once the producer goes away.
    pub fn darken(&mut self) {
        for b in &mut self.data {
            *b /= 4;
        }
    }

    /// Borrow as a submittable [`Frame`]
    pub fn as_frame(&self) -> Frame<'_> {
        Frame::new(&self.data, &self.shape)
    }

    /// Copy into `out` using the given row layout
    pub fn copy_rows_into(&self, out: &mut [u8], layout: RowLayout) -> Result<()> {
        copy_image(
            &self.data,
            self.width as usize,
            self.height as usize,
            out,
            layout,
        )
    }

    fn offset(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some((y as usize * self.width as usize + x as usize) * CHANNELS)
    }
}
