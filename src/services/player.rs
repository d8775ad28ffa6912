use crate::messages::PlayerCommand;
use crate::sequence::{ChordEvent, FrameContext, PlayerView, SequencePlayer};
use anyhow::Result;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};

const CLOCK_RESOLUTION: Duration = Duration::from_millis(50);

/// Drives a SequencePlayer on the event loop
///
/// While playing, the clock advances by real elapsed time (one unit per
/// second). Every change republishes the frame context consumed by capture
/// and the view consumed by the fretboard display.
pub struct PlayerService {
    player: SequencePlayer,
    cmd_rx: mpsc::Receiver<PlayerCommand>,
    context: watch::Sender<FrameContext>,
    view: watch::Sender<PlayerView>,
    clock: Interval,
    last_tick: Instant,
}

impl PlayerService {
    pub fn new(cmd_rx: mpsc::Receiver<PlayerCommand>) -> Self {
        let player = SequencePlayer::new(Vec::new());
        let (context, _) = watch::channel(player.context());
        let (view, _) = watch::channel(player.view());

        let mut clock = tokio::time::interval(CLOCK_RESOLUTION);
        clock.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            player,
            cmd_rx,
            context,
            view,
            clock,
            last_tick: Instant::now(),
        }
    }

    pub fn context(&self) -> watch::Receiver<FrameContext> {
        self.context.subscribe()
    }

    pub fn view(&self) -> watch::Receiver<PlayerView> {
        self.view.subscribe()
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },

                now = self.clock.tick(), if self.player.is_playing() => {
                    let elapsed = now.saturating_duration_since(self.last_tick);
                    self.last_tick = now;
                    self.player.advance(elapsed.as_secs_f64());
                    self.publish();
                }
            }
        }
        tracing::debug!("Player service stopped");
    }

    fn handle_command(&mut self, cmd: PlayerCommand) {
        match cmd {
            PlayerCommand::Load(sequence) => {
                tracing::info!("Loaded sequence of {} chord(s)", sequence.len());
                self.player = SequencePlayer::new(sequence);
            }
            PlayerCommand::Start => self.start(),
            PlayerCommand::Pause => self.pause(),
            PlayerCommand::Next => self.player.next(),
            PlayerCommand::Prev => self.player.prev(),
        }
        self.publish();
    }

    fn start(&mut self) {
        if self.player.is_playing() {
            return;
        }
        if !self.player.start() {
            tracing::warn!("Nothing to play: sequence is empty");
            return;
        }
        self.last_tick = Instant::now();
        self.clock.reset();
        tracing::info!("Playback started at t={:.2}", self.player.state().current_time);
    }

    fn pause(&mut self) {
        if !self.player.is_playing() {
            return;
        }
        self.player.pause();
        tracing::info!("Playback paused at t={:.2}", self.player.state().current_time);
    }

    fn publish(&self) {
        let view = self.player.view();
        self.view.send_if_modified(|current| {
            if *current == view {
                return false;
            }
            *current = view;
            true
        });

        let context = self.player.context();
        self.context.send_if_modified(|current| {
            if *current == context {
                return false;
            }
            *current = context;
            true
        });
    }
}

/// Handle for communicating with the PlayerService
#[derive(Clone)]
pub struct PlayerHandle {
    tx: mpsc::Sender<PlayerCommand>,
}

impl PlayerHandle {
    pub fn new(tx: mpsc::Sender<PlayerCommand>) -> Self {
        Self { tx }
    }

    pub async fn load(&self, sequence: Vec<ChordEvent>) -> Result<()> {
        self.send(PlayerCommand::Load(sequence)).await
    }

    pub async fn start(&self) -> Result<()> {
        self.send(PlayerCommand::Start).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.send(PlayerCommand::Pause).await
    }

    pub async fn next(&self) -> Result<()> {
        self.send(PlayerCommand::Next).await
    }

    pub async fn prev(&self) -> Result<()> {
        self.send(PlayerCommand::Prev).await
    }

    async fn send(&self, cmd: PlayerCommand) -> Result<()> {
        self.tx
            .send(cmd)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to send player command: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::NotePosition;

    fn sequence() -> Vec<ChordEvent> {
        [("C", 0.0), ("G", 4.0), ("Am", 8.0)]
            .into_iter()
            .map(|(name, beat_time)| ChordEvent {
                chord_name: name.to_string(),
                beat_time,
                exact_notes: vec![NotePosition { string: 1, fret: 3 }],
                variation: None,
            })
            .collect()
    }

    fn spawn_player() -> (PlayerHandle, watch::Receiver<PlayerView>, watch::Receiver<FrameContext>) {
        let (tx, rx) = mpsc::channel(10);
        let service = PlayerService::new(rx);
        let view = service.view();
        let context = service.context();
        tokio::spawn(service.run());
        (PlayerHandle::new(tx), view, context)
    }

    async fn sleep_ms(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_driven_progression() {
        let (player, view, context) = spawn_player();
        player.load(sequence()).await.unwrap();
        player.start().await.unwrap();

        sleep_ms(5_000).await;
        {
            let view = view.borrow();
            assert!(view.playing);
            assert_eq!(view.index, Some(1));
            assert!(view.current_time >= 4.9 && view.current_time <= 5.1);
        }
        assert_eq!(context.borrow().chord_name.as_deref(), Some("G"));

        sleep_ms(5_000).await;
        assert_eq!(view.borrow().index, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_freezes_clock() {
        let (player, view, _context) = spawn_player();
        player.load(sequence()).await.unwrap();
        player.start().await.unwrap();
        sleep_ms(2_000).await;

        player.pause().await.unwrap();
        sleep_ms(10).await;
        let frozen = view.borrow().current_time;

        sleep_ms(10_000).await;
        let view = view.borrow();
        assert!(!view.playing);
        assert_eq!(view.current_time, frozen);
        assert_eq!(view.index, Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_steps_sync_time() {
        let (player, view, context) = spawn_player();
        player.load(sequence()).await.unwrap();

        player.prev().await.unwrap();
        sleep_ms(1).await;
        assert_eq!(view.borrow().index, Some(2));
        assert_eq!(view.borrow().current_time, 8.0);

        player.next().await.unwrap();
        player.next().await.unwrap();
        sleep_ms(1).await;
        assert_eq!(view.borrow().index, Some(1));
        assert_eq!(context.borrow().chord_name.as_deref(), Some("G"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_sequence_never_plays() {
        let (player, view, context) = spawn_player();
        player.load(Vec::new()).await.unwrap();
        player.start().await.unwrap();
        sleep_ms(1_000).await;

        assert!(!view.borrow().playing);
        assert_eq!(view.borrow().to_string(), "N/A");
        assert_eq!(*context.borrow(), FrameContext::default());
    }
}
