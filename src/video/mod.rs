pub mod encoder;
pub mod frame;
pub mod replay;
pub mod source;

pub use encoder::FrameEncoder;
pub use frame::{EncodedFrame, VideoFrame};
pub use replay::ImageSequenceCamera;
pub use source::{FrameSource, SourceStatus};
