use ac_ffmpeg::codec::video::{frame::VideoFrameMut, PixelFormat as AcPixelFormat, VideoEncoder as AcVideoEncoder};
use ac_ffmpeg::codec::Encoder as AcEncoder;
use ac_ffmpeg::time::Timestamp;
use tracing::{info, warn};
use vidanalyze_core::{Encoder, EncoderConfig, Error, Frame, PixelFormat, Result};

/// Packet encoder backed by FFmpeg's libx264 wrapper (via `ac-ffmpeg`).
/// `reconfigure` rebuilds the underlying encoder in place so a bitrate/GOP
/// change doesn't require tearing down the owning Pipeline.
pub struct FfmpegEncoder {
    encoder: Option<AcVideoEncoder>,
    config: Option<EncoderConfig>,
}

impl FfmpegEncoder {
    pub fn new() -> Self {
        Self {
            encoder: None,
            config: None,
        }
    }

    fn build_encoder(config: &EncoderConfig) -> Result<AcVideoEncoder> {
        let mut builder = AcVideoEncoder::builder(&config.codec)
            .map_err(|e| Error::EncoderOpenFailed(e.to_string()))?
            .pixel_format(AcPixelFormat::from_str("yuv420p").map_err(|e| Error::EncoderOpenFailed(e.to_string()))?)
            .width(config.width as usize)
            .height(config.height as usize)
            .time_base(ac_ffmpeg::time::TimeBase::new(1, config.fps as i32))
            .bit_rate(config.bitrate_kbps as u64 * 1000);

        if let Some(profile) = &config.profile {
            builder = builder
                .set_option("profile", profile.as_str())
                .map_err(|e| Error::EncoderOpenFailed(e.to_string()))?;
        }
        if let Some(tune) = &config.tune {
            builder = builder
                .set_option("tune", tune.as_str())
                .map_err(|e| Error::EncoderOpenFailed(e.to_string()))?;
        }
        builder = builder
            .set_option("preset", config.preset.as_str())
            .map_err(|e| Error::EncoderOpenFailed(e.to_string()))?
            .set_option("g", config.gop.to_string().as_str())
            .map_err(|e| Error::EncoderOpenFailed(e.to_string()))?
            .set_option("bf", config.b_frames.to_string().as_str())
            .map_err(|e| Error::EncoderOpenFailed(e.to_string()))?;

        if config.zero_latency {
            builder = builder
                .set_option("tune", "zerolatency")
                .map_err(|e| Error::EncoderOpenFailed(e.to_string()))?;
        }

        builder.build().map_err(|e| Error::EncoderOpenFailed(e.to_string()))
    }
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder for FfmpegEncoder {
    fn open(&mut self, config: &EncoderConfig) -> Result<()> {
        let encoder = Self::build_encoder(config)?;
        info!(codec = %config.codec, width = config.width, height = config.height, "opened encoder");
        self.encoder = Some(encoder);
        self.config = Some(config.clone());
        Ok(())
    }

    fn encode(&mut self, frame: &Frame) -> Result<Vec<u8>> {
        let encoder = self
            .encoder
            .as_mut()
            .ok_or_else(|| Error::EncoderEncodeFailed("encoder not open".into()))?;
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| Error::EncoderEncodeFailed("encoder not open".into()))?;

        let mut video_frame = VideoFrameMut::black(
            AcPixelFormat::from_str("yuv420p").map_err(|e| Error::EncoderEncodeFailed(e.to_string()))?,
            config.width as usize,
            config.height as usize,
        )
        .with_pts(Timestamp::new(frame.pts_us, ac_ffmpeg::time::TimeBase::new(1, 1_000_000)));

        write_rgb_to_yuv420p(&mut video_frame, frame);

        encoder
            .push(video_frame.freeze())
            .map_err(|e| Error::EncoderEncodeFailed(e.to_string()))?;

        let mut packet_bytes = Vec::new();
        while let Some(packet) = encoder
            .take()
            .map_err(|e| Error::EncoderEncodeFailed(e.to_string()))?
        {
            packet_bytes.extend_from_slice(packet.data());
        }

        Ok(packet_bytes)
    }

    fn reconfigure(&mut self, config: &EncoderConfig) -> Result<()> {
        warn!("reconfiguring encoder in place");
        self.open(config)
    }

    fn close(&mut self) -> Result<()> {
        self.encoder = None;
        self.config = None;
        Ok(())
    }
}

/// Naive RGB24 -> planar YUV420p conversion using BT.601 coefficients. Not
/// performance-tuned (no SIMD); correctness over throughput, matching the
/// rest of this runtime's "build first" per-frame loop.
fn write_rgb_to_yuv420p(video_frame: &mut VideoFrameMut, frame: &Frame) {
    let width = frame.width as usize;
    let height = frame.height as usize;
    let channels = match frame.format {
        PixelFormat::Rgb24 | PixelFormat::Bgr24 => 3,
        PixelFormat::Yuv420p | PixelFormat::Nv12 => 3,
    };

    let planes = video_frame.planes_mut();
    let (y_plane, rest) = planes.split_at_mut(1);
    let (u_plane, v_plane) = rest.split_at_mut(1);

    for y in 0..height {
        for x in 0..width {
            let idx = (y * width + x) * channels;
            if idx + 2 >= frame.pixels.len() {
                continue;
            }
            let (r, g, b) = match frame.format {
                PixelFormat::Bgr24 => (
                    frame.pixels[idx + 2] as f32,
                    frame.pixels[idx + 1] as f32,
                    frame.pixels[idx] as f32,
                ),
                _ => (
                    frame.pixels[idx] as f32,
                    frame.pixels[idx + 1] as f32,
                    frame.pixels[idx + 2] as f32,
                ),
            };

            let y_val = 0.299 * r + 0.587 * g + 0.114 * b;
            y_plane[0].data_mut()[y * width + x] = y_val as u8;

            if y % 2 == 0 && x % 2 == 0 {
                let u_val = -0.169 * r - 0.331 * g + 0.5 * b + 128.0;
                let v_val = 0.5 * r - 0.419 * g - 0.081 * b + 128.0;
                let chroma_idx = (y / 2) * (width / 2) + (x / 2);
                if let Some(slot) = u_plane[0].data_mut().get_mut(chroma_idx) {
                    *slot = u_val as u8;
                }
                if let Some(slot) = v_plane[0].data_mut().get_mut(chroma_idx) {
                    *slot = v_val as u8;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_before_open_is_rejected() {
        let mut encoder = FfmpegEncoder::new();
        let frame = Frame::new(vec![0u8; 3], 1, 1, PixelFormat::Rgb24, 0);
        let err = encoder.encode(&frame).unwrap_err();
        assert!(matches!(err, Error::EncoderEncodeFailed(_)));
    }
}
