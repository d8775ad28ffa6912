use super::frame::VideoFrame;
use crate::error::DeviceError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;

/// A camera device that can be opened into a live stream.
#[async_trait]
pub trait Camera: Send + Sync {
    async fn open(&self) -> Result<Box<dyn MediaStream>, DeviceError>;
}

/// A live stream of frames backed by one or more device tracks.
#[async_trait]
pub trait MediaStream: Send {
    /// Wait for the next frame from the device.
    async fn next_frame(&mut self) -> Result<VideoFrame, DeviceError>;

    /// Release the underlying tracks.
    fn stop_tracks(&mut self);
}

/// Owned stream whose tracks are stopped exactly once, on `stop` or on drop.
struct StreamHandle {
    inner: Box<dyn MediaStream>,
    stopped: bool,
}

impl StreamHandle {
    fn new(inner: Box<dyn MediaStream>) -> Self {
        Self {
            inner,
            stopped: false,
        }
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.inner.stop_tracks();
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SourceStatus {
    Inactive,
    Acquiring,
    Live { width: u32, height: u32 },
    Error(DeviceError),
    Closed,
}

impl SourceStatus {
    /// No frames will arrive without another `activate`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SourceStatus::Error(_) | SourceStatus::Closed)
    }
}

pub type FrameSlot = watch::Receiver<Option<Arc<VideoFrame>>>;

/// Owns the camera stream for one session.
///
/// `activate` acquires the stream in the background; `teardown` is the single
/// release path. A stream that finishes opening after teardown (or after a
/// newer activation) is stopped instead of attached. Each activation is
/// identified by a generation number so stale acquisitions can tell they are
/// no longer wanted.
pub struct FrameSource {
    camera: Arc<dyn Camera>,
    generation: watch::Sender<u64>,
    frames: Arc<watch::Sender<Option<Arc<VideoFrame>>>>,
    status: Arc<watch::Sender<SourceStatus>>,
}

impl FrameSource {
    pub fn new(camera: Arc<dyn Camera>) -> Self {
        let (generation, _) = watch::channel(0);
        let (frames, _) = watch::channel(None);
        let (status, _) = watch::channel(SourceStatus::Inactive);
        Self {
            camera,
            generation,
            frames: Arc::new(frames),
            status: Arc::new(status),
        }
    }

    pub fn frames(&self) -> FrameSlot {
        self.frames.subscribe()
    }

    pub fn status(&self) -> watch::Receiver<SourceStatus> {
        self.status.subscribe()
    }

    /// Start acquiring the camera. No-op while acquiring or live; from
    /// `Error` or `Closed` this is the user's retry.
    pub fn activate(&self) {
        let busy = matches!(
            *self.status.borrow(),
            SourceStatus::Acquiring | SourceStatus::Live { .. }
        );
        if busy {
            tracing::debug!("Frame source already active");
            return;
        }

        self.generation.send_modify(|g| *g += 1);
        let generation = *self.generation.borrow();
        self.status.send_replace(SourceStatus::Acquiring);

        tracing::info!("Acquiring camera");
        tokio::spawn(acquire_and_pump(
            self.camera.clone(),
            generation,
            self.generation.subscribe(),
            self.frames.clone(),
            self.status.clone(),
        ));
    }

    /// Release the camera. Safe to call any number of times, including while
    /// acquisition is still pending.
    pub fn teardown(&self) {
        if *self.status.borrow() == SourceStatus::Closed {
            return;
        }
        self.generation.send_modify(|g| *g += 1);
        self.frames.send_replace(None);
        self.status.send_replace(SourceStatus::Closed);
        tracing::info!("Frame source closed");
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.teardown();
    }
}

async fn acquire_and_pump(
    camera: Arc<dyn Camera>,
    generation: u64,
    mut generation_rx: watch::Receiver<u64>,
    frames: Arc<watch::Sender<Option<Arc<VideoFrame>>>>,
    status: Arc<watch::Sender<SourceStatus>>,
) {
    let opened = camera.open().await;

    if *generation_rx.borrow_and_update() != generation {
        if let Ok(stream) = opened {
            tracing::debug!("Camera resolved after teardown, stopping it");
            StreamHandle::new(stream).stop();
        }
        return;
    }

    let mut stream = match opened {
        Ok(stream) => StreamHandle::new(stream),
        Err(e) => {
            tracing::error!("Camera unavailable: {}", e);
            status.send_replace(SourceStatus::Error(e));
            return;
        }
    };

    loop {
        tokio::select! {
            biased;

            changed = generation_rx.changed() => {
                if changed.is_err() || *generation_rx.borrow_and_update() != generation {
                    break;
                }
            }

            frame = stream.inner.next_frame() => match frame {
                Ok(frame) => {
                    if *generation_rx.borrow() != generation {
                        break;
                    }
                    let live = SourceStatus::Live {
                        width: frame.width(),
                        height: frame.height(),
                    };
                    status.send_if_modified(|current| {
                        if *current == live {
                            return false;
                        }
                        tracing::info!("Camera live at {}x{}", frame.width(), frame.height());
                        *current = live;
                        true
                    });
                    frames.send_replace(Some(Arc::new(frame)));
                }
                Err(e) => {
                    if *generation_rx.borrow() == generation {
                        tracing::error!("Camera stream failed: {}", e);
                        frames.send_replace(None);
                        status.send_replace(SourceStatus::Error(e));
                    }
                    break;
                }
            }
        }
    }

    stream.stop();
    tracing::debug!("Camera tracks stopped");
}
