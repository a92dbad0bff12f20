use vidanalyze_core::{Frame, LetterboxMeta, PixelFormat, Preprocessor, Result};

/// Letterbox resize into a fixed square net input, padding with mid-gray
/// (114) and normalizing to planar (CHW) float32 in `[0, 1]`.
pub struct LetterboxPreprocessor {
    net_size: u32,
    shape: [usize; 4],
}

impl LetterboxPreprocessor {
    pub fn new(net_size: u32) -> Self {
        Self {
            net_size,
            shape: [1, 3, net_size as usize, net_size as usize],
        }
    }
}

impl Preprocessor for LetterboxPreprocessor {
    fn prepare(&self, frame: &Frame) -> Result<(Vec<f32>, LetterboxMeta)> {
        let net = self.net_size;
        let scale = (net as f32 / frame.width as f32).min(net as f32 / frame.height as f32);
        let scaled_w = (frame.width as f32 * scale).round() as u32;
        let scaled_h = (frame.height as f32 * scale).round() as u32;
        let pad_x = ((net - scaled_w) / 2) as f32;
        let pad_y = ((net - scaled_h) / 2) as f32;

        let channels = match frame.format {
            PixelFormat::Rgb24 | PixelFormat::Bgr24 => 3,
            PixelFormat::Yuv420p | PixelFormat::Nv12 => 3,
        };

        let mut chw = vec![114.0f32 / 255.0; (net * net) as usize * 3];
        // Nearest-neighbor resize directly into the padded canvas; the
        // source is assumed packed RGB/BGR24 (the Source is responsible for
        // decoding into one of these before handing frames to the Analyzer).
        for dy in 0..scaled_h {
            let src_y = ((dy as f32 / scale) as u32).min(frame.height.saturating_sub(1));
            for dx in 0..scaled_w {
                let src_x = ((dx as f32 / scale) as u32).min(frame.width.saturating_sub(1));
                let src_idx = (src_y * frame.width + src_x) as usize * channels;
                if src_idx + 2 >= frame.pixels.len() {
                    continue;
                }
                let out_y = dy + pad_y as u32;
                let out_x = dx + pad_x as u32;
                let plane_stride = (net * net) as usize;
                let pixel_idx = (out_y * net + out_x) as usize;

                let (r, g, b) = match frame.format {
                    PixelFormat::Bgr24 => (
                        frame.pixels[src_idx + 2],
                        frame.pixels[src_idx + 1],
                        frame.pixels[src_idx],
                    ),
                    _ => (
                        frame.pixels[src_idx],
                        frame.pixels[src_idx + 1],
                        frame.pixels[src_idx + 2],
                    ),
                };

                chw[pixel_idx] = r as f32 / 255.0;
                chw[plane_stride + pixel_idx] = g as f32 / 255.0;
                chw[plane_stride * 2 + pixel_idx] = b as f32 / 255.0;
            }
        }

        let meta = LetterboxMeta {
            scale,
            pad_x,
            pad_y,
            net_width: net,
            net_height: net,
            orig_width: frame.width,
            orig_height: frame.height,
        };

        Ok((chw, meta))
    }

    fn input_shape(&self) -> &[usize] {
        &self.shape
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidanalyze_core::Frame;

    #[test]
    fn letterbox_pads_non_square_input() {
        let frame = Frame::new(vec![200u8; 320 * 240 * 3], 320, 240, PixelFormat::Rgb24, 0);
        let pre = LetterboxPreprocessor::new(640);
        let (tensor, meta) = pre.prepare(&frame).unwrap();
        assert_eq!(tensor.len(), 640 * 640 * 3);
        assert!(meta.pad_y > 0.0);
        assert_eq!(meta.pad_x, 0.0);
    }
}
