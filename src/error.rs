/// Camera could not be acquired. Terminal for the source until the user
/// retries the start action.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeviceError {
    #[error("camera access denied: {0}")]
    Denied(String),

    #[error("no camera found: {0}")]
    NotFound(String),

    #[error("camera unavailable: {0}")]
    Unavailable(String),
}

impl DeviceError {
    pub fn from_io(path: &std::path::Path, err: &std::io::Error) -> Self {
        let reason = format!("{}: {}", path.display(), err);
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(reason),
            std::io::ErrorKind::PermissionDenied => Self::Denied(reason),
            _ => Self::Unavailable(reason),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("frame source closed before a frame was available")]
    SourceClosed,

    #[error("raster surface yielded no data")]
    EmptyRaster,

    #[error("failed to encode frame: {0}")]
    Image(#[from] image::ImageError),

    #[error("encoder task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// A single capture cycle failed to reach the Analysis service. Transient:
/// the next scheduler tick is the retry.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("analysis service returned HTTP {0}")]
    Status(u16),

    #[error("analysis request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("failed to serialize frame context: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A 2xx body that could not be decoded as structured data.
///
/// Never raised: the transport hands it back inside its reply so the
/// pipeline can degrade to an empty annotation set.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("malformed analysis response: {reason}")]
pub struct MalformedResponse {
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("no chord data for song {song}")]
pub struct SequenceEmpty {
    pub song: String,
}

/// Anything that can end a capture cycle early.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
