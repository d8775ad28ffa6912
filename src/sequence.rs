use serde::{Deserialize, Serialize};
use std::fmt;

/// Display names for tab slots, low string first.
const STRING_NAMES: [&str; 6] = ["E", "A", "D", "G", "B", "e"];
const OPEN: &str = "0";
const MUTED: &str = "X";

/// Expected finger placement for one string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct NotePosition {
    /// String number, 1 (high e) through 6 (low E).
    pub string: u8,
    /// Fret number; negative means the string is muted.
    pub fret: i32,
}

/// One step of a song's practice sequence.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChordEvent {
    #[serde(alias = "chord_name")]
    pub chord_name: String,
    #[serde(alias = "beat_time")]
    pub beat_time: f64,
    #[serde(default, alias = "exact_notes")]
    pub exact_notes: Vec<NotePosition>,
    #[serde(default)]
    pub variation: Option<String>,
}

/// Six fret symbols in display order: slot 0 is string 6, slot 5 is string 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tab(pub [String; 6]);

impl Tab {
    pub fn from_notes(notes: &[NotePosition]) -> Self {
        let mut slots: [String; 6] = std::array::from_fn(|_| OPEN.to_string());
        for note in notes {
            if !(1..=6).contains(&note.string) {
                tracing::debug!("Ignoring note on string {}", note.string);
                continue;
            }
            let slot = 6 - note.string as usize;
            slots[slot] = if note.fret < 0 {
                MUTED.to_string()
            } else {
                note.fret.to_string()
            };
        }
        Self(slots)
    }
}

impl fmt::Display for Tab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, fret)) in STRING_NAMES.iter().zip(self.0.iter()).enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}|{}", name, fret)?;
        }
        Ok(())
    }
}

/// What the user is expected to be playing when a frame is captured.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameContext {
    pub chord_name: Option<String>,
    pub tab: Option<Tab>,
    pub variation_label: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    Stopped,
    Playing,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequenceState {
    pub index: usize,
    pub current_time: f64,
    pub playing: bool,
}

/// Snapshot of the player for the fretboard display.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerView {
    pub index: Option<usize>,
    pub chord_name: Option<String>,
    pub tab: Option<Tab>,
    pub current_time: f64,
    pub playing: bool,
}

impl fmt::Display for PlayerView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.chord_name, &self.tab) {
            (Some(name), Some(tab)) => write!(f, "{:<6} {}", name, tab),
            _ => f.write_str("N/A"),
        }
    }
}

/// Active event for `current_time`: the greatest `i` whose beat has started
/// and whose successor (if any) has not. Falls back to the last index when no
/// event qualifies, including times before the first beat.
pub fn resolve_index(sequence: &[ChordEvent], current_time: f64) -> Option<usize> {
    let len = sequence.len();
    if len == 0 {
        return None;
    }

    let found = (0..len).rev().find(|&i| {
        sequence[i].beat_time <= current_time
            && (i + 1 == len || sequence[i + 1].beat_time > current_time)
    });
    Some(found.unwrap_or(len - 1))
}

/// Walks a chord sequence either on real time or by manual steps.
#[derive(Debug, Clone)]
pub struct SequencePlayer {
    sequence: Vec<ChordEvent>,
    index: usize,
    current_time: f64,
    state: PlayState,
}

impl SequencePlayer {
    pub fn new(sequence: Vec<ChordEvent>) -> Self {
        let current_time = sequence.first().map_or(0.0, |event| event.beat_time);
        Self {
            sequence,
            index: 0,
            current_time,
            state: PlayState::Stopped,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlayState::Playing
    }

    pub fn state(&self) -> SequenceState {
        SequenceState {
            index: self.index,
            current_time: self.current_time,
            playing: self.is_playing(),
        }
    }

    /// Returns false when there is nothing to play.
    pub fn start(&mut self) -> bool {
        if self.sequence.is_empty() {
            return false;
        }
        self.state = PlayState::Playing;
        true
    }

    pub fn pause(&mut self) {
        self.state = PlayState::Stopped;
    }

    /// Advance the clock by `elapsed` seconds (one time unit per second).
    pub fn advance(&mut self, elapsed: f64) {
        if !self.is_playing() || elapsed.is_nan() || elapsed <= 0.0 {
            return;
        }
        self.current_time += elapsed;
        self.resolve();
    }

    pub fn next(&mut self) {
        let len = self.sequence.len();
        if len == 0 {
            return;
        }
        self.select((self.index + 1) % len);
    }

    pub fn prev(&mut self) {
        let len = self.sequence.len();
        if len == 0 {
            return;
        }
        self.select((self.index + len - 1) % len);
    }

    pub fn current(&self) -> Option<&ChordEvent> {
        self.sequence.get(self.index)
    }

    pub fn tab(&self) -> Option<Tab> {
        self.current().map(|event| Tab::from_notes(&event.exact_notes))
    }

    pub fn context(&self) -> FrameContext {
        match self.current() {
            Some(event) => FrameContext {
                chord_name: Some(event.chord_name.clone()),
                tab: Some(Tab::from_notes(&event.exact_notes)),
                variation_label: event.variation.clone(),
            },
            None => FrameContext::default(),
        }
    }

    pub fn view(&self) -> PlayerView {
        let state = self.state();
        PlayerView {
            index: self.current().map(|_| state.index),
            chord_name: self.current().map(|event| event.chord_name.clone()),
            tab: self.tab(),
            current_time: state.current_time,
            playing: state.playing,
        }
    }

    fn select(&mut self, index: usize) {
        self.index = index;
        self.current_time = self.sequence[index].beat_time;
    }

    fn resolve(&mut self) {
        if let Some(index) = resolve_index(&self.sequence, self.current_time) {
            self.index = index;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(name: &str, beat_time: f64) -> ChordEvent {
        ChordEvent {
            chord_name: name.to_string(),
            beat_time,
            exact_notes: Vec::new(),
            variation: None,
        }
    }

    fn three() -> Vec<ChordEvent> {
        vec![event("C", 0.0), event("G", 4.0), event("Am", 8.0)]
    }

    #[test]
    fn test_resolve_index() {
        let seq = three();
        assert_eq!(resolve_index(&seq, 0.0), Some(0));
        assert_eq!(resolve_index(&seq, 5.0), Some(1));
        assert_eq!(resolve_index(&seq, 8.0), Some(2));
        assert_eq!(resolve_index(&seq, 10.0), Some(2));
        // Before the first beat nothing qualifies, so the last index wins.
        assert_eq!(resolve_index(&seq, -1.0), Some(2));
        assert_eq!(resolve_index(&[], 3.0), None);
    }

    #[test]
    fn test_circular_navigation() {
        let mut player = SequencePlayer::new(three());

        player.next();
        player.next();
        assert_eq!(player.state().index, 2);
        player.next();
        assert_eq!(player.state().index, 0);

        player.prev();
        assert_eq!(player.state().index, 2);
        assert_eq!(player.state().current_time, 8.0);
    }

    #[test]
    fn test_manual_step_syncs_time_and_keeps_state() {
        let mut player = SequencePlayer::new(three());
        assert!(player.start());

        player.next();
        let state = player.state();
        assert_eq!(state.index, 1);
        assert_eq!(state.current_time, 4.0);
        assert!(state.playing);

        player.pause();
        player.prev();
        assert_eq!(player.state().index, 0);
        assert!(!player.state().playing);
    }

    #[test]
    fn test_advance_only_while_playing() {
        let mut player = SequencePlayer::new(three());
        player.advance(5.0);
        assert_eq!(player.state().current_time, 0.0);

        player.start();
        player.advance(5.0);
        assert_eq!(player.state().index, 1);

        player.pause();
        player.advance(10.0);
        let state = player.state();
        assert_eq!(state.current_time, 5.0);
        assert_eq!(state.index, 1);
    }

    #[test]
    fn test_empty_sequence() {
        let mut player = SequencePlayer::new(Vec::new());
        assert!(!player.start());
        assert!(!player.is_playing());

        player.next();
        player.prev();
        assert!(player.current().is_none());
        assert_eq!(player.context(), FrameContext::default());
        assert_eq!(player.view().to_string(), "N/A");
    }

    #[test]
    fn test_tab_projection() {
        let notes = [
            NotePosition { string: 1, fret: 3 },
            NotePosition { string: 6, fret: 0 },
        ];
        let tab = Tab::from_notes(&notes);
        assert_eq!(tab.0[0], "0");
        assert_eq!(tab.0[5], "3");
        assert!(tab.0[1..5].iter().all(|s| s == "0"));
    }

    #[test]
    fn test_tab_muted_and_out_of_range() {
        let notes = [
            NotePosition { string: 5, fret: -1 },
            NotePosition { string: 2, fret: 1 },
            NotePosition { string: 7, fret: 9 },
            NotePosition { string: 0, fret: 9 },
        ];
        let tab = Tab::from_notes(&notes);
        assert_eq!(tab.to_string(), "E|0 A|X D|0 G|0 B|1 e|0");
    }

    #[test]
    fn test_context_carries_current_chord() {
        let mut seq = three();
        seq[1].variation = Some("Major".to_string());
        seq[1].exact_notes = vec![NotePosition { string: 1, fret: 3 }];

        let mut player = SequencePlayer::new(seq);
        player.next();

        let context = player.context();
        assert_eq!(context.chord_name.as_deref(), Some("G"));
        assert_eq!(context.variation_label.as_deref(), Some("Major"));
        assert_eq!(context.tab.unwrap().0[5], "3");
    }

    #[test]
    fn test_chord_event_accepts_both_key_styles() {
        let camel: ChordEvent = serde_json::from_str(
            r#"{"chordName":"C","beatTime":2,"exactNotes":[{"string":2,"fret":1}]}"#,
        )
        .unwrap();
        let snake: ChordEvent = serde_json::from_str(
            r#"{"chord_name":"C","beat_time":2,"exact_notes":[{"string":2,"fret":1}]}"#,
        )
        .unwrap();
        assert_eq!(camel, snake);
    }

    #[test]
    fn test_context_serializes_camel_case() {
        let context = FrameContext {
            chord_name: Some("D".to_string()),
            tab: Some(Tab::from_notes(&[])),
            variation_label: None,
        };
        let json = serde_json::to_value(&context).unwrap();
        assert_eq!(json["chordName"], "D");
        assert_eq!(json["tab"].as_array().unwrap().len(), 6);
        assert!(json["variationLabel"].is_null());
    }
}
