use super::frame::{EncodedFrame, VideoFrame};
use super::source::{FrameSlot, SourceStatus};
use crate::error::EncodeError;
use image::RgbImage;
use image::codecs::jpeg::JpegEncoder;
use std::sync::Arc;
use tokio::sync::watch;

/// Rasterizes the most recent live frame and compresses it to JPEG.
#[derive(Clone)]
pub struct FrameEncoder {
    frames: FrameSlot,
    status: watch::Receiver<SourceStatus>,
    quality: u8,
}

impl FrameEncoder {
    pub const DEFAULT_QUALITY: u8 = 90;

    pub fn new(frames: FrameSlot, status: watch::Receiver<SourceStatus>, quality: u8) -> Self {
        Self {
            frames,
            status,
            quality: quality.clamp(1, 100),
        }
    }

    /// Encode whatever frame is current right now.
    ///
    /// Blocks until the source has produced its first frame, since the
    /// native resolution is unknown before then. Fails if the source is torn
    /// down or errors while waiting.
    pub async fn encode_latest(&mut self) -> Result<EncodedFrame, EncodeError> {
        let frame = self.latest_frame().await?;
        let quality = self.quality;
        tokio::task::spawn_blocking(move || encode(&frame, quality)).await?
    }

    async fn latest_frame(&mut self) -> Result<Arc<VideoFrame>, EncodeError> {
        tokio::select! {
            biased;

            current = self.frames.wait_for(|f| f.is_some()) => {
                let current = current.map_err(|_| EncodeError::SourceClosed)?;
                current.clone().ok_or(EncodeError::SourceClosed)
            }

            _ = self.status.wait_for(SourceStatus::is_terminal) => {
                Err(EncodeError::SourceClosed)
            }
        }
    }
}

/// Copy the frame onto an off-screen surface at native resolution.
fn rasterize(frame: &VideoFrame) -> Result<RgbImage, EncodeError> {
    let (width, height) = (frame.width(), frame.height());
    if width == 0 || height == 0 {
        return Err(EncodeError::EmptyRaster);
    }
    let mut surface = RgbImage::new(width, height);
    image::imageops::replace(&mut surface, &frame.image, 0, 0);
    Ok(surface)
}

fn encode(frame: &VideoFrame, quality: u8) -> Result<EncodedFrame, EncodeError> {
    let surface = rasterize(frame)?;

    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality).encode_image(&surface)?;
    if bytes.is_empty() {
        return Err(EncodeError::EmptyRaster);
    }

    Ok(EncodedFrame {
        bytes,
        width: surface.width(),
        height: surface.height(),
        sequence: frame.sequence,
    })
}
