use ac_ffmpeg::codec::video::{VideoDecoder, VideoFrame};
use ac_ffmpeg::codec::Decoder;
use ac_ffmpeg::format::demuxer::{Demuxer, DemuxerWithStreamInfo};
use ac_ffmpeg::format::io::IO;
use tracing::{info, warn};
use vidanalyze_core::{Error, Frame, PixelFormat, Result, Source, SourceConfig, SourceStatus};

/// Number of consecutive read failures tolerated before the Pipeline worker
/// gives up and surfaces a hard error rather than continuing to reconnect.
pub const MAX_CONSECUTIVE_READ_FAILURES: u32 = 5;

/// Backoff added per consecutive read failure while reconnecting.
pub const READ_FAILURE_BACKOFF: std::time::Duration = std::time::Duration::from_secs(1);

/// Pull-based [`Source`] over an RTSP or local file URI, decoding to packed
/// RGB24 frames via FFmpeg (through the `ac-ffmpeg` bindings). Reconnects
/// transparently on transient read failures up to
/// [`MAX_CONSECUTIVE_READ_FAILURES`], backing off
/// [`READ_FAILURE_BACKOFF`] longer with each attempt.
pub struct FfmpegSource {
    uri: String,
    status: SourceStatus,
    demuxer: Option<DemuxerWithStreamInfo<IO<'static>>>,
    decoder: Option<VideoDecoder>,
    video_stream_index: usize,
    consecutive_failures: u32,
}

impl FfmpegSource {
    pub fn new() -> Self {
        Self {
            uri: String::new(),
            status: SourceStatus::Idle,
            demuxer: None,
            decoder: None,
            video_stream_index: 0,
            consecutive_failures: 0,
        }
    }

    fn open_stream(&mut self) -> Result<()> {
        let io = IO::open_input(&self.uri).map_err(|e| Error::SourceOpenFailed {
            uri: self.uri.clone(),
            reason: e.to_string(),
        })?;

        let demuxer = Demuxer::builder()
            .build(io)
            .map_err(|e| Error::SourceOpenFailed {
                uri: self.uri.clone(),
                reason: e.to_string(),
            })?
            .find_stream_info(None)
            .map_err(|(_, e)| Error::SourceOpenFailed {
                uri: self.uri.clone(),
                reason: e.to_string(),
            })?;

        let (video_stream_index, video_stream) = demuxer
            .streams()
            .iter()
            .enumerate()
            .find(|(_, s)| s.codec_parameters().is_video_codec())
            .ok_or_else(|| Error::SourceOpenFailed {
                uri: self.uri.clone(),
                reason: "no video stream found".into(),
            })?;

        let decoder = VideoDecoder::from_stream(video_stream)
            .map_err(|e| Error::SourceOpenFailed {
                uri: self.uri.clone(),
                reason: e.to_string(),
            })?
            .build()
            .map_err(|e| Error::SourceOpenFailed {
                uri: self.uri.clone(),
                reason: e.to_string(),
            })?;

        self.video_stream_index = video_stream_index;
        self.demuxer = Some(demuxer);
        self.decoder = Some(decoder);
        self.status = SourceStatus::Connected;
        self.consecutive_failures = 0;
        Ok(())
    }

    fn reconnect(&mut self) -> Result<()> {
        self.status = SourceStatus::Reconnecting;
        info!(uri = %self.uri, "reconnecting source");
        self.open_stream()
    }

    fn decode_next(&mut self) -> Result<Frame> {
        let demuxer = self
            .demuxer
            .as_mut()
            .ok_or_else(|| Error::SourceReadFailed("source not open".into()))?;
        let decoder = self
            .decoder
            .as_mut()
            .ok_or_else(|| Error::SourceReadFailed("source not open".into()))?;

        loop {
            if let Some(frame) = decoder
                .take()
                .map_err(|e| Error::SourceReadFailed(e.to_string()))?
            {
                return video_frame_to_frame(frame);
            }

            let packet = demuxer
                .take()
                .map_err(|e| Error::SourceReadFailed(e.to_string()))?
                .ok_or_else(|| Error::SourceReadFailed("end of stream".into()))?;

            if packet.stream_index() != self.video_stream_index {
                continue;
            }

            decoder
                .push(packet)
                .map_err(|e| Error::SourceReadFailed(e.to_string()))?;
        }
    }
}

impl Default for FfmpegSource {
    fn default() -> Self {
        Self::new()
    }
}

impl Source for FfmpegSource {
    fn open(&mut self, config: &SourceConfig) -> Result<()> {
        self.uri = config.uri.clone();
        self.status = SourceStatus::Connecting;
        self.open_stream()
    }

    fn read_frame(&mut self) -> Result<Frame> {
        loop {
            match self.decode_next() {
                Ok(frame) => {
                    self.consecutive_failures = 0;
                    return Ok(frame);
                }
                Err(err) => {
                    self.consecutive_failures += 1;
                    warn!(
                        uri = %self.uri,
                        failures = self.consecutive_failures,
                        error = %err,
                        "source read failed"
                    );

                    if self.consecutive_failures >= MAX_CONSECUTIVE_READ_FAILURES {
                        self.status = SourceStatus::Error;
                        return Err(Error::SourceReadFailed(format!(
                            "{} consecutive failures reading '{}': {}",
                            self.consecutive_failures, self.uri, err
                        )));
                    }

                    std::thread::sleep(READ_FAILURE_BACKOFF * self.consecutive_failures);
                    let _ = self.reconnect();
                }
            }
        }
    }

    fn status(&self) -> SourceStatus {
        self.status
    }

    fn close(&mut self) -> Result<()> {
        self.decoder = None;
        self.demuxer = None;
        self.status = SourceStatus::Idle;
        Ok(())
    }
}

fn video_frame_to_frame(video_frame: VideoFrame) -> Result<Frame> {
    let width = video_frame.width() as u32;
    let height = video_frame.height() as u32;
    let pts_us = video_frame.pts().as_micros().unwrap_or_default();

    let planes = video_frame.planes();
    let mut pixels = Vec::with_capacity((width * height * 3) as usize);
    if let Some(plane) = planes.first() {
        pixels.extend_from_slice(plane.data());
    }

    Ok(Frame::new(pixels, width, height, PixelFormat::Rgb24, pts_us))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeFrameSource {
        frames_remaining: u32,
        status: SourceStatus,
        failures_before_success: u32,
    }

    impl Source for FakeFrameSource {
        fn open(&mut self, _config: &SourceConfig) -> Result<()> {
            self.status = SourceStatus::Connected;
            Ok(())
        }

        fn read_frame(&mut self) -> Result<Frame> {
            if self.failures_before_success > 0 {
                self.failures_before_success -= 1;
                return Err(Error::SourceReadFailed("transient".into()));
            }
            if self.frames_remaining == 0 {
                return Err(Error::SourceReadFailed("exhausted".into()));
            }
            self.frames_remaining -= 1;
            Ok(Frame::new(vec![0u8; 3], 1, 1, PixelFormat::Rgb24, 0))
        }

        fn status(&self) -> SourceStatus {
            self.status
        }

        fn close(&mut self) -> Result<()> {
            self.status = SourceStatus::Idle;
            Ok(())
        }
    }

    #[test]
    fn open_transitions_to_connected() {
        let mut source = FakeFrameSource {
            frames_remaining: 1,
            status: SourceStatus::Idle,
            failures_before_success: 0,
        };
        source
            .open(&SourceConfig {
                uri: "test://x".into(),
                reconnect: true,
                read_timeout_ms: 1000,
            })
            .unwrap();
        assert_eq!(source.status(), SourceStatus::Connected);
    }

    #[test]
    fn close_returns_to_idle() {
        let mut source = FakeFrameSource {
            frames_remaining: 1,
            status: SourceStatus::Connected,
            failures_before_success: 0,
        };
        source.close().unwrap();
        assert_eq!(source.status(), SourceStatus::Idle);
    }
}
