use crate::annotations::{self, AnnotationSet};
use crate::error::CycleError;
use crate::messages::{CaptureCommand, CaptureState, CaptureStatus};
use crate::sequence::FrameContext;
use crate::transport::{AnalysisReply, AnalysisTransport};
use crate::video::FrameEncoder;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Fires encode-and-send cycles at a fixed rate
///
/// This service:
/// - Owns the capture timer (created on Start, dropped on Pause)
/// - Allows at most one cycle in flight; ticks that find one running are dropped
/// - Publishes the canonical annotation set and the capture state
///
/// Pausing only cancels the timer. A cycle already in flight runs to
/// completion and its result is still applied.
pub struct CaptureScheduler {
    period: Duration,
    cmd_rx: mpsc::Receiver<CaptureCommand>,
    encoder: FrameEncoder,
    transport: Arc<dyn AnalysisTransport>,
    context: watch::Receiver<FrameContext>,
    annotations: Arc<watch::Sender<AnnotationSet>>,
    state: Arc<watch::Sender<CaptureState>>,
    ticker: Option<Interval>,
}

impl CaptureScheduler {
    pub fn new(
        rate_hz: f64,
        cmd_rx: mpsc::Receiver<CaptureCommand>,
        encoder: FrameEncoder,
        transport: Arc<dyn AnalysisTransport>,
        context: watch::Receiver<FrameContext>,
    ) -> Self {
        let (annotations, _) = watch::channel(AnnotationSet::default());
        let (state, _) = watch::channel(CaptureState::default());

        Self {
            period: Duration::from_secs_f64(1.0 / rate_hz),
            cmd_rx,
            encoder,
            transport,
            context,
            annotations: Arc::new(annotations),
            state: Arc::new(state),
            ticker: None,
        }
    }

    pub fn annotations(&self) -> watch::Receiver<AnnotationSet> {
        self.annotations.subscribe()
    }

    pub fn state(&self) -> watch::Receiver<CaptureState> {
        self.state.subscribe()
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(CaptureCommand::Start) => self.start(),
                    Some(CaptureCommand::Pause) => self.pause(),
                    Some(CaptureCommand::Shutdown) | None => {
                        self.pause();
                        break;
                    }
                },

                _ = next_tick(&mut self.ticker) => self.on_tick(),
            }
        }
        tracing::debug!("Capture scheduler stopped");
    }

    fn start(&mut self) {
        if self.ticker.is_some() {
            tracing::debug!("Capture already running");
            return;
        }

        // First cycle fires one period after start.
        let mut ticker = tokio::time::interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.ticker = Some(ticker);

        self.state.send_modify(|state| state.running = true);
        tracing::info!("Capture started every {:?}", self.period);
    }

    fn pause(&mut self) {
        if self.ticker.take().is_none() {
            return;
        }
        self.state.send_modify(|state| state.running = false);
        tracing::info!("Capture paused");
    }

    fn on_tick(&self) {
        let claimed = self.state.send_if_modified(|state| {
            if state.in_flight {
                return false;
            }
            state.in_flight = true;
            state.last_status = CaptureStatus::Sending;
            true
        });

        if !claimed {
            tracing::debug!("Capture tick dropped: previous cycle still in flight");
            return;
        }

        let guard = InFlight::new(self.state.clone());
        tokio::spawn(run_cycle(
            self.encoder.clone(),
            self.transport.clone(),
            self.context.borrow().clone(),
            self.annotations.clone(),
            guard,
        ));
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Clears the in-flight flag when the cycle ends, however it ends.
struct InFlight {
    state: Arc<watch::Sender<CaptureState>>,
    outcome: CaptureStatus,
}

impl InFlight {
    fn new(state: Arc<watch::Sender<CaptureState>>) -> Self {
        Self {
            state,
            outcome: CaptureStatus::Error,
        }
    }

    fn finish(mut self, outcome: CaptureStatus) {
        self.outcome = outcome;
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let outcome = self.outcome;
        self.state.send_modify(|state| {
            state.in_flight = false;
            state.last_status = outcome;
        });
    }
}

async fn capture_once(
    encoder: &mut FrameEncoder,
    transport: &dyn AnalysisTransport,
    context: &FrameContext,
) -> Result<AnalysisReply, CycleError> {
    let frame = encoder.encode_latest().await?;
    Ok(transport.send(&frame, context).await?)
}

async fn run_cycle(
    mut encoder: FrameEncoder,
    transport: Arc<dyn AnalysisTransport>,
    context: FrameContext,
    annotations: Arc<watch::Sender<AnnotationSet>>,
    guard: InFlight,
) {
    let outcome = match capture_once(&mut encoder, transport.as_ref(), &context).await {
        Ok(reply) => {
            let set = annotations::normalize(reply.body());
            tracing::debug!(
                "Received {} position(s), {} corner(s)",
                set.positions.len(),
                set.present_corners().count()
            );
            annotations.send_replace(set);
            CaptureStatus::Received
        }
        Err(e) => {
            tracing::warn!("Capture cycle failed: {}", e);
            CaptureStatus::Error
        }
    };
    guard.finish(outcome);
}

/// Handle for communicating with the CaptureScheduler
#[derive(Clone)]
pub struct CaptureHandle {
    tx: mpsc::Sender<CaptureCommand>,
}

impl CaptureHandle {
    pub fn new(tx: mpsc::Sender<CaptureCommand>) -> Self {
        Self { tx }
    }

    pub async fn start(&self) -> Result<()> {
        self.send(CaptureCommand::Start).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.send(CaptureCommand::Pause).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(CaptureCommand::Shutdown).await
    }

    async fn send(&self, cmd: CaptureCommand) -> Result<()> {
        self.tx
            .send(cmd)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to send capture command: {}", e))
    }
}
