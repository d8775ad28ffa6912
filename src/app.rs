use crate::annotations::AnnotationSet;
use crate::catalog::{SongCatalog, SongId};
use crate::config::Config;
use crate::controls::{self, Control};
use crate::error::SequenceEmpty;
use crate::messages::{CaptureState, CaptureStatus};
use crate::overlay::{OverlayRenderer, OverlayTask, RenderedFrame};
use crate::sequence::{FrameContext, PlayerView};
use crate::services::{CaptureHandle, CaptureScheduler, PlayerHandle, PlayerService};
use crate::transport::HttpTransport;
use crate::video::{FrameEncoder, FrameSource, ImageSequenceCamera, SourceStatus};

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// One practice session: camera, capture loop, sequencer and overlay.
///
/// Construction mounts everything except the capture timer, which waits for
/// the user's start action. `run` returns after unmount teardown.
pub struct App {
    config: Config,
    source: FrameSource,
    source_status: watch::Receiver<SourceStatus>,
    capture: CaptureHandle,
    capture_state: watch::Receiver<CaptureState>,
    player: PlayerHandle,
    player_view: watch::Receiver<PlayerView>,
    rendered: watch::Receiver<Option<Arc<RenderedFrame>>>,
    _overlay: OverlayTask,
    control_rx: mpsc::Receiver<Control>,
    last_status: CaptureStatus,
    last_chord: Option<usize>,
}

impl App {
    pub async fn new(config: Config) -> Result<Self> {
        let camera = ImageSequenceCamera::new(&config.camera_path, config.camera_fps);
        let source = FrameSource::new(Arc::new(camera));
        source.activate();

        let (player, player_view, context) = Self::setup_player();
        let (capture, capture_state, annotations) =
            Self::setup_capture(&config, &source, context)?;

        let renderer = OverlayRenderer::new(source.frames(), annotations, config.refresh_rate_hz);
        let rendered = renderer.output();
        let overlay = renderer.spawn();

        if let Err(e) = Self::load_song(&config, &player).await {
            tracing::warn!("No chord sequence loaded ({:#}); fretboard shows N/A", e);
        }

        let control_rx = Self::setup_controls();
        tracing::info!("Ready! {}", controls::HELP);

        Ok(Self {
            config,
            source_status: source.status(),
            source,
            capture,
            capture_state,
            player,
            player_view,
            rendered,
            _overlay: overlay,
            control_rx,
            last_status: CaptureStatus::Idle,
            last_chord: None,
        })
    }

    pub async fn run(mut self) -> Result<()> {
        loop {
            tracing::debug!("Main loop: waiting for event");
            tokio::select! {
                Some(control) = self.control_rx.recv() => {
                    if control == Control::Quit {
                        break;
                    }
                    if let Err(e) = self.handle_control(control).await {
                        tracing::error!("Error handling {:?}: {}", control, e);
                    }
                }
                Ok(()) = self.capture_state.changed() => self.report_capture(),
                Ok(()) = self.source_status.changed() => self.report_source(),
                Ok(()) = self.player_view.changed() => self.report_player(),
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received Ctrl+C, shutting down");
                    break;
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    async fn handle_control(&mut self, control: Control) -> Result<()> {
        match control {
            Control::ToggleCapture => {
                if self.capture_state.borrow().running {
                    self.capture.pause().await?;
                } else {
                    if self.source_status.borrow().is_terminal() {
                        tracing::info!("Retrying camera");
                        self.source.activate();
                    }
                    self.capture.start().await?;
                }
            }
            Control::TogglePlayback => {
                if self.player_view.borrow().playing {
                    self.player.pause().await?;
                } else {
                    self.player.start().await?;
                }
            }
            Control::Next => self.player.next().await?,
            Control::Prev => self.player.prev().await?,
            Control::Snapshot => self.save_snapshot().await?,
            Control::Quit => {}
        }
        Ok(())
    }

    fn report_capture(&mut self) {
        let status = self.capture_state.borrow_and_update().last_status;
        if status == self.last_status {
            return;
        }
        self.last_status = status;

        match status {
            CaptureStatus::Error => {
                tracing::warn!("Capture status: {} (retrying on next tick)", status)
            }
            _ => tracing::debug!("Capture status: {}", status),
        }
    }

    fn report_source(&mut self) {
        let status = self.source_status.borrow_and_update().clone();
        match status {
            SourceStatus::Error(e) => {
                tracing::error!("Camera error: {}. Press c to retry.", e)
            }
            SourceStatus::Live { width, height } => {
                tracing::info!("Camera connected ({}x{})", width, height)
            }
            other => tracing::debug!("Camera status: {:?}", other),
        }
    }

    fn report_player(&mut self) {
        let view = self.player_view.borrow_and_update().clone();
        if view.index == self.last_chord {
            return;
        }
        self.last_chord = view.index;
        tracing::info!("Chord @ {:.1}s: {}", view.current_time, view);
    }

    async fn save_snapshot(&self) -> Result<()> {
        let rendered = self
            .rendered
            .borrow()
            .clone()
            .context("No overlay frame rendered yet")?;
        let path = PathBuf::from(&self.config.snapshot_path);

        let target = path.clone();
        let image = rendered.clone();
        tokio::task::spawn_blocking(move || {
            image
                .image
                .save(&target)
                .with_context(|| format!("Failed to write snapshot: {:?}", target))
        })
        .await
        .context("spawn_blocking failed")??;

        tracing::info!(
            "Saved frame #{} with {} position(s), {} corner(s) to {:?}",
            rendered.sequence,
            rendered.positions,
            rendered.corners,
            path
        );
        Ok(())
    }

    async fn shutdown(self) {
        tracing::info!("Tearing down session");
        if let Err(e) = self.capture.shutdown().await {
            tracing::debug!("Capture already stopped: {}", e);
        }
        self.source.teardown();
    }

    async fn load_song(config: &Config, player: &PlayerHandle) -> Result<()> {
        let catalog = SongCatalog::new(&config.catalog_url, config.request_timeout())?;

        let song_id = match &config.song_id {
            Some(id) => SongId::Text(id.clone()),
            None => {
                let songs = catalog.list_songs().await?;
                let song = songs.first().context("Song catalog is empty")?;
                tracing::info!("Practising {}", song);
                if let Some(img) = &song.img {
                    tracing::debug!("Cover art: {}", img);
                }
                song.id.clone()
            }
        };

        let chords = catalog.chords(&song_id).await?;
        if chords.is_empty() {
            return Err(SequenceEmpty {
                song: song_id.to_string(),
            }
            .into());
        }

        player.load(chords).await
    }

    fn setup_player() -> (
        PlayerHandle,
        watch::Receiver<PlayerView>,
        watch::Receiver<FrameContext>,
    ) {
        let (player_tx, player_rx) = mpsc::channel(10);
        let service = PlayerService::new(player_rx);
        let view = service.view();
        let context = service.context();
        tokio::spawn(service.run());

        (PlayerHandle::new(player_tx), view, context)
    }

    fn setup_capture(
        config: &Config,
        source: &FrameSource,
        context: watch::Receiver<FrameContext>,
    ) -> Result<(
        CaptureHandle,
        watch::Receiver<CaptureState>,
        watch::Receiver<AnnotationSet>,
    )> {
        let transport = HttpTransport::new(
            &config.analysis_url,
            config.fields(),
            config.request_timeout(),
        )?;
        let encoder = FrameEncoder::new(source.frames(), source.status(), config.jpeg_quality);

        let (capture_tx, capture_rx) = mpsc::channel(10);
        let scheduler = CaptureScheduler::new(
            config.capture_rate_hz,
            capture_rx,
            encoder,
            Arc::new(transport),
            context,
        );
        let state = scheduler.state();
        let annotations = scheduler.annotations();
        tokio::spawn(scheduler.run());

        Ok((CaptureHandle::new(capture_tx), state, annotations))
    }

    fn setup_controls() -> mpsc::Receiver<Control> {
        let (control_tx, control_rx) = mpsc::channel(10);
        tokio::spawn(async move {
            if let Err(e) = controls::monitor_stdin(control_tx).await {
                tracing::error!("Control input stopped: {}", e);
            }
        });
        control_rx
    }
}
