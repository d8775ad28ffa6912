use image::RgbImage;

/// One decoded frame of the live stream at native resolution.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub image: RgbImage,
    pub sequence: u64,
}

impl VideoFrame {
    pub fn new(image: RgbImage, sequence: u64) -> Self {
        Self { image, sequence }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Compressed still ready to ship to the Analysis service.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub sequence: u64,
}

impl EncodedFrame {
    pub const MIME: &'static str = "image/jpeg";
    pub const FILE_NAME: &'static str = "captured-frame.jpeg";
}
