pub mod capture;
pub mod player;

pub use capture::{CaptureHandle, CaptureScheduler};
pub use player::{PlayerHandle, PlayerService};
