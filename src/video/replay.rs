use super::frame::VideoFrame;
use super::source::{Camera, MediaStream};
use crate::error::DeviceError;
use async_trait::async_trait;
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};

const EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Camera backed by a still image or a directory of frames.
///
/// Frames are decoded once on open and replayed in file-name order at a
/// fixed rate, looping forever, so downstream code sees an ordinary live
/// stream.
pub struct ImageSequenceCamera {
    path: PathBuf,
    fps: u32,
}

impl ImageSequenceCamera {
    pub fn new(path: impl Into<PathBuf>, fps: u32) -> Self {
        Self {
            path: path.into(),
            fps: fps.max(1),
        }
    }
}

#[async_trait]
impl Camera for ImageSequenceCamera {
    async fn open(&self) -> Result<Box<dyn MediaStream>, DeviceError> {
        let path = self.path.clone();
        let frames = tokio::task::spawn_blocking(move || load_frames(&path))
            .await
            .map_err(|e| DeviceError::Unavailable(format!("loader task failed: {}", e)))??;

        tracing::info!(
            "Opened replay camera {:?}: {} frame(s) at {} fps",
            self.path,
            frames.len(),
            self.fps
        );

        let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / self.fps as f64));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        Ok(Box::new(ReplayStream {
            frames: frames.into_iter().map(Arc::new).collect(),
            ticker,
            sequence: 0,
            stopped: false,
        }))
    }
}

struct ReplayStream {
    frames: Vec<Arc<RgbImage>>,
    ticker: Interval,
    sequence: u64,
    stopped: bool,
}

#[async_trait]
impl MediaStream for ReplayStream {
    async fn next_frame(&mut self) -> Result<VideoFrame, DeviceError> {
        if self.stopped {
            return Err(DeviceError::Unavailable("stream stopped".to_string()));
        }
        self.ticker.tick().await;

        let image = &self.frames[(self.sequence % self.frames.len() as u64) as usize];
        self.sequence += 1;
        Ok(VideoFrame::new(image.as_ref().clone(), self.sequence))
    }

    fn stop_tracks(&mut self) {
        self.stopped = true;
        self.frames.clear();
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

fn decode(path: &Path) -> Result<RgbImage, DeviceError> {
    image::open(path)
        .map(|img| img.to_rgb8())
        .map_err(|e| DeviceError::Unavailable(format!("{}: {}", path.display(), e)))
}

fn load_frames(path: &Path) -> Result<Vec<RgbImage>, DeviceError> {
    let metadata = std::fs::metadata(path).map_err(|e| DeviceError::from_io(path, &e))?;

    if metadata.is_file() {
        return Ok(vec![decode(path)?]);
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(path)
        .map_err(|e| DeviceError::from_io(path, &e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| is_image(p))
        .collect();
    paths.sort();

    if paths.is_empty() {
        return Err(DeviceError::NotFound(format!(
            "{}: no image frames",
            path.display()
        )));
    }

    paths.iter().map(|p| decode(p)).collect()
}
