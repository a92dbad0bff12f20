use std::sync::Arc;

/// Pixel layout of a decoded [`Frame`]'s pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb24,
    Bgr24,
    Yuv420p,
    Nv12,
}

/// A single decoded video frame flowing Source -> Analyzer -> Encoder.
///
/// `pixels` is shared (`Arc<[u8]>`) so a Source can hand the same buffer to
/// multiple subscribers (fan-out) without copying; a Renderer that needs to
/// draw on top of a frame clones the `Arc` and makes its own owned copy only
/// when it actually mutates pixels.
#[derive(Debug, Clone)]
pub struct Frame {
    pub pixels: Arc<[u8]>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub pts_us: i64,
}

impl Frame {
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, format: PixelFormat, pts_us: i64) -> Self {
        Self {
            pixels: Arc::from(pixels),
            width,
            height,
            format,
            pts_us,
        }
    }

    /// Returns a mutable owned copy of the pixel buffer, cloning only if
    /// another owner currently shares the same allocation.
    pub fn into_owned_pixels(self) -> Vec<u8> {
        match Arc::try_unwrap(self.pixels) {
            Ok(boxed) => boxed.into_vec(),
            Err(shared) => shared.to_vec(),
        }
    }
}

/// A borrowed, row-major view over planar or packed tensor data handed to a
/// [`crate::contracts::Preprocessor`]/[`crate::contracts::ModelSession`] pair.
/// Carries shape and dtype but never owns the backing buffer, mirroring the
/// way the inference runtime's ORT/ndarray boundary is crossed without a copy.
#[derive(Debug, Clone, Copy)]
pub struct TensorView<'a> {
    pub data: &'a [f32],
    pub shape: &'a [usize],
}

impl<'a> TensorView<'a> {
    pub fn new(data: &'a [f32], shape: &'a [usize]) -> Self {
        Self { data, shape }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Letterbox placement computed by a preprocessor when resizing a frame into
/// a model's fixed input resolution. Kept alongside the tensor so the
/// postprocessor can map detection boxes back into original-frame pixel
/// coordinates without recomputing scale/pad.
#[derive(Debug, Clone, Copy)]
pub struct LetterboxMeta {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub net_width: u32,
    pub net_height: u32,
    pub orig_width: u32,
    pub orig_height: u32,
}

impl LetterboxMeta {
    /// Maps a box in net (model input) pixel coordinates back to original
    /// frame pixel coordinates.
    pub fn unletterbox(&self, x: f32, y: f32, w: f32, h: f32) -> (f32, f32, f32, f32) {
        let ux = (x - self.pad_x) / self.scale;
        let uy = (y - self.pad_y) / self.scale;
        let uw = w / self.scale;
        let uh = h / self.scale;
        (ux, uy, uw, uh)
    }
}
