use vidanalyze_core::{AnalysisResult, Frame, PixelFormat, Renderer};

/// Returns the frame unmodified, used when `FilterConfig::draw_overlay` is
/// false.
pub struct PassthroughRenderer;

impl Renderer for PassthroughRenderer {
    fn render(&self, frame: Frame, _result: &AnalysisResult) -> Frame {
        frame
    }
}

/// Draws detection bounding boxes, a `"<class>: <pct>%"` label above each
/// box, and, for segmentation results, an alpha-blended colored mask --
/// directly onto the frame's pixel buffer. No image/font crate: labels use
/// a tiny built-in 3x5 dot-matrix glyph table (`glyph`, below) rather than
/// rasterizing a real typeface, since nothing else in this runtime loads
/// font assets.
pub struct BoxOverlayRenderer {
    pub line_thickness: u32,
    pub color: [u8; 3],
    /// Blend weight for the segmentation mask overlay, matching the
    /// original system's `addWeighted(frame, 0.7, mask, 0.3)`.
    pub mask_alpha: f32,
}

impl Default for BoxOverlayRenderer {
    fn default() -> Self {
        Self {
            line_thickness: 2,
            color: [0, 255, 0],
            mask_alpha: 0.3,
        }
    }
}

impl Renderer for BoxOverlayRenderer {
    fn render(&self, frame: Frame, result: &AnalysisResult) -> Frame {
        if result.detections.is_empty() && result.segmentations.is_empty() {
            return frame;
        }

        let width = frame.width;
        let height = frame.height;
        let format = frame.format;
        let pts_us = frame.pts_us;
        let mut pixels = frame.into_owned_pixels();
        let channels = match format {
            PixelFormat::Rgb24 | PixelFormat::Bgr24 => 3,
            PixelFormat::Yuv420p | PixelFormat::Nv12 => 3,
        };
        let (r, g, b) = match format {
            PixelFormat::Bgr24 => (self.color[2], self.color[1], self.color[0]),
            _ => (self.color[0], self.color[1], self.color[2]),
        };

        for segmentation in &result.segmentations {
            if segmentation.width == width && segmentation.height == height {
                blend_mask(&mut pixels, segmentation, channels, format, self.mask_alpha);
            }
        }

        for detection in &result.detections {
            let x0 = detection.bbox.x.max(0.0) as u32;
            let y0 = detection.bbox.y.max(0.0) as u32;
            let x1 = ((detection.bbox.x + detection.bbox.width) as u32).min(width.saturating_sub(1));
            let y1 = ((detection.bbox.y + detection.bbox.height) as u32).min(height.saturating_sub(1));

            for t in 0..self.line_thickness {
                draw_hline(&mut pixels, width, channels, x0, x1, y0.saturating_add(t), r, g, b);
                draw_hline(&mut pixels, width, channels, x0, x1, y1.saturating_sub(t), r, g, b);
                draw_vline(&mut pixels, width, height, channels, y0, y1, x0.saturating_add(t), r, g, b);
                draw_vline(&mut pixels, width, height, channels, y0, y1, x1.saturating_sub(t), r, g, b);
            }

            let label = format!("{}: {}%", detection.class_name, (detection.confidence * 100.0) as i32);
            let label_y = y0.saturating_sub(GLYPH_HEIGHT as u32 + 2);
            draw_text(&mut pixels, width, height, channels, x0, label_y, &label, r, g, b);
        }

        Frame::new(pixels, width, height, format, pts_us)
    }
}

/// Alpha-blends a per-pixel class-id mask onto `pixels` with weight `alpha`,
/// coloring each class id via [`mask_color`]. Mirrors the original system's
/// `applyColorMap` + `addWeighted(0.7, 0.3)` composite.
fn blend_mask(
    pixels: &mut [u8],
    mask: &vidanalyze_core::Segmentation,
    channels: usize,
    format: PixelFormat,
    alpha: f32,
) {
    for (i, &class_id) in mask.class_ids.iter().enumerate() {
        let idx = i * channels;
        if idx + 2 >= pixels.len() {
            break;
        }
        let (mr, mg, mb) = mask_color(class_id, format);
        pixels[idx] = blend_channel(pixels[idx], mr, alpha);
        pixels[idx + 1] = blend_channel(pixels[idx + 1], mg, alpha);
        pixels[idx + 2] = blend_channel(pixels[idx + 2], mb, alpha);
    }
}

fn blend_channel(base: u8, overlay: u8, alpha: f32) -> u8 {
    (base as f32 * (1.0 - alpha) + overlay as f32 * alpha).round().clamp(0.0, 255.0) as u8
}

/// Deterministic, distinct color per class id; background (id 0) maps to
/// black so it contributes no tint once blended.
fn mask_color(class_id: u8, format: PixelFormat) -> (u8, u8, u8) {
    if class_id == 0 {
        return (0, 0, 0);
    }
    const PALETTE: [[u8; 3]; 6] = [
        [220, 20, 60],
        [60, 180, 75],
        [0, 130, 200],
        [245, 130, 48],
        [145, 30, 180],
        [255, 225, 25],
    ];
    let [r, g, b] = PALETTE[class_id as usize % PALETTE.len()];
    match format {
        PixelFormat::Bgr24 => (b, g, r),
        _ => (r, g, b),
    }
}

fn draw_hline(pixels: &mut [u8], width: u32, channels: usize, x0: u32, x1: u32, y: u32, r: u8, g: u8, b: u8) {
    for x in x0..=x1 {
        set_pixel(pixels, width, channels, x, y, r, g, b);
    }
}

fn draw_vline(pixels: &mut [u8], width: u32, height: u32, channels: usize, y0: u32, y1: u32, x: u32, r: u8, g: u8, b: u8) {
    if x >= width {
        return;
    }
    for y in y0..=y1.min(height.saturating_sub(1)) {
        set_pixel(pixels, width, channels, x, y, r, g, b);
    }
}

fn set_pixel(pixels: &mut [u8], width: u32, channels: usize, x: u32, y: u32, r: u8, g: u8, b: u8) {
    let idx = (y * width + x) as usize * channels;
    if idx + 2 < pixels.len() {
        pixels[idx] = r;
        pixels[idx + 1] = g;
        pixels[idx + 2] = b;
    }
}

const GLYPH_WIDTH: usize = 3;
const GLYPH_HEIGHT: usize = 5;

/// A minimal 3x5 dot-matrix glyph table covering the characters a detection
/// label can contain (digits, uppercase letters, space, `:`, `%`). Each row
/// is one byte, bit `4-i` (MSB first) set means "lit" for column `i`.
fn glyph(c: char) -> [u8; GLYPH_HEIGHT] {
    match c.to_ascii_uppercase() {
        'A' => [0b010, 0b101, 0b111, 0b101, 0b101],
        'B' => [0b110, 0b101, 0b110, 0b101, 0b110],
        'C' => [0b011, 0b100, 0b100, 0b100, 0b011],
        'D' => [0b110, 0b101, 0b101, 0b101, 0b110],
        'E' => [0b111, 0b100, 0b110, 0b100, 0b111],
        'F' => [0b111, 0b100, 0b110, 0b100, 0b100],
        'G' => [0b011, 0b100, 0b101, 0b101, 0b011],
        'H' => [0b101, 0b101, 0b111, 0b101, 0b101],
        'I' => [0b111, 0b010, 0b010, 0b010, 0b111],
        'J' => [0b001, 0b001, 0b001, 0b101, 0b010],
        'K' => [0b101, 0b101, 0b110, 0b101, 0b101],
        'L' => [0b100, 0b100, 0b100, 0b100, 0b111],
        'M' => [0b101, 0b111, 0b111, 0b101, 0b101],
        'N' => [0b101, 0b111, 0b111, 0b111, 0b101],
        'O' => [0b010, 0b101, 0b101, 0b101, 0b010],
        'P' => [0b110, 0b101, 0b110, 0b100, 0b100],
        'Q' => [0b010, 0b101, 0b101, 0b111, 0b011],
        'R' => [0b110, 0b101, 0b110, 0b101, 0b101],
        'S' => [0b011, 0b100, 0b010, 0b001, 0b110],
        'T' => [0b111, 0b010, 0b010, 0b010, 0b010],
        'U' => [0b101, 0b101, 0b101, 0b101, 0b011],
        'V' => [0b101, 0b101, 0b101, 0b101, 0b010],
        'W' => [0b101, 0b101, 0b111, 0b111, 0b101],
        'X' => [0b101, 0b101, 0b010, 0b101, 0b101],
        'Y' => [0b101, 0b101, 0b010, 0b010, 0b010],
        'Z' => [0b111, 0b001, 0b010, 0b100, 0b111],
        '0' => [0b111, 0b101, 0b101, 0b101, 0b111],
        '1' => [0b010, 0b110, 0b010, 0b010, 0b111],
        '2' => [0b111, 0b001, 0b111, 0b100, 0b111],
        '3' => [0b111, 0b001, 0b111, 0b001, 0b111],
        '4' => [0b101, 0b101, 0b111, 0b001, 0b001],
        '5' => [0b111, 0b100, 0b111, 0b001, 0b111],
        '6' => [0b111, 0b100, 0b111, 0b101, 0b111],
        '7' => [0b111, 0b001, 0b001, 0b001, 0b001],
        '8' => [0b111, 0b101, 0b111, 0b101, 0b111],
        '9' => [0b111, 0b101, 0b111, 0b001, 0b111],
        ':' => [0b000, 0b010, 0b000, 0b010, 0b000],
        '%' => [0b101, 0b001, 0b010, 0b100, 0b101],
        '-' => [0b000, 0b000, 0b111, 0b000, 0b000],
        '_' => [0b000, 0b000, 0b000, 0b000, 0b111],
        '.' => [0b000, 0b000, 0b000, 0b000, 0b010],
        _ => [0b000, 0b000, 0b000, 0b000, 0b000],
    }
}

/// Draws `text` left-to-right starting at `(x, y)` using [`glyph`], one
/// pixel of spacing between characters. Clips silently at the frame edge.
fn draw_text(
    pixels: &mut [u8],
    width: u32,
    height: u32,
    channels: usize,
    x: u32,
    y: u32,
    text: &str,
    r: u8,
    g: u8,
    b: u8,
) {
    let mut cursor = x;
    for c in text.chars() {
        let rows = glyph(c);
        for (row, bits) in rows.iter().enumerate() {
            let py = y + row as u32;
            if py >= height {
                continue;
            }
            for col in 0..GLYPH_WIDTH {
                if bits & (1 << (GLYPH_WIDTH - 1 - col)) != 0 {
                    let px = cursor + col as u32;
                    if px < width {
                        set_pixel(pixels, width, channels, px, py, r, g, b);
                    }
                }
            }
        }
        cursor += GLYPH_WIDTH as u32 + 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidanalyze_core::{BoundingBox, Detection, Segmentation};

    #[test]
    fn passthrough_returns_same_dimensions() {
        let frame = Frame::new(vec![0u8; 10 * 10 * 3], 10, 10, PixelFormat::Rgb24, 0);
        let out = PassthroughRenderer.render(frame.clone(), &AnalysisResult::default());
        assert_eq!(out.width, frame.width);
    }

    #[test]
    fn overlay_mutates_pixels_inside_box() {
        let frame = Frame::new(vec![0u8; 20 * 20 * 3], 20, 20, PixelFormat::Rgb24, 0);
        let result = AnalysisResult {
            detections: vec![Detection {
                class_id: 0,
                class_name: "x".into(),
                confidence: 0.9,
                bbox: BoundingBox {
                    x: 2.0,
                    y: 2.0,
                    width: 5.0,
                    height: 5.0,
                },
            }],
            ..Default::default()
        };
        let renderer = BoxOverlayRenderer::default();
        let out = renderer.render(frame, &result);
        let idx = (2 * 20 + 2) * 3;
        assert_eq!(out.pixels[idx], 0);
        assert_eq!(out.pixels[idx + 1], 255);
    }

    #[test]
    fn overlay_draws_a_label_above_the_box() {
        let frame = Frame::new(vec![0u8; 40 * 40 * 3], 40, 40, PixelFormat::Rgb24, 0);
        let result = AnalysisResult {
            detections: vec![Detection {
                class_id: 0,
                class_name: "cat".into(),
                confidence: 0.875,
                bbox: BoundingBox {
                    x: 10.0,
                    y: 10.0,
                    width: 8.0,
                    height: 8.0,
                },
            }],
            ..Default::default()
        };
        let out = BoxOverlayRenderer::default().render(frame, &result);
        let label_row_start = ((10u32.saturating_sub(GLYPH_HEIGHT as u32 + 2)) * 40) as usize * 3;
        let lit = out.pixels[label_row_start..label_row_start + GLYPH_HEIGHT * 40 * 3]
            .iter()
            .any(|&byte| byte != 0);
        assert!(lit, "expected some lit pixels in the label region");
    }

    #[test]
    fn segmentation_mask_blends_toward_the_palette_color() {
        let frame = Frame::new(vec![0u8; 2 * 2 * 3], 2, 2, PixelFormat::Rgb24, 0);
        let result = AnalysisResult {
            segmentations: vec![Segmentation {
                width: 2,
                height: 2,
                class_ids: vec![1, 0, 0, 0],
            }],
            ..Default::default()
        };
        let out = BoxOverlayRenderer::default().render(frame, &result);
        assert_eq!(out.pixels[0], (220.0 * 0.3).round() as u8);
        assert_eq!(out.pixels[3], 0);
    }
}
