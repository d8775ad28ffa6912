use crate::sequence::ChordEvent;
use std::fmt;

/// Commands for the CaptureScheduler service
#[derive(Debug)]
pub enum CaptureCommand {
    Start,
    Pause,
    Shutdown,
}

/// Commands for the Player service
#[derive(Debug)]
pub enum PlayerCommand {
    Load(Vec<ChordEvent>),
    Start,
    Pause,
    Next,
    Prev,
}

/// Outcome of the most recent capture cycle
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CaptureStatus {
    #[default]
    Idle,
    Sending,
    Received,
    Error,
}

impl fmt::Display for CaptureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CaptureStatus::Idle => "Idle",
            CaptureStatus::Sending => "Sending",
            CaptureStatus::Received => "Received",
            CaptureStatus::Error => "Error",
        };
        f.write_str(label)
    }
}

/// Capture state (observable via watch channel)
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CaptureState {
    pub running: bool,
    pub in_flight: bool,
    pub last_status: CaptureStatus,
}
