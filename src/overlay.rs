use crate::annotations::{Annotation, AnnotationSet};
use crate::video::VideoFrame;
use crate::video::source::FrameSlot;
use image::{DynamicImage, Rgba, RgbImage, RgbaImage, imageops};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Marker sizes as a fraction of the surface's shorter side.
const NOTE_RADIUS: f32 = 0.03;
const CORNER_HALF_SIDE: f32 = 0.025;

const NOTE_COLOR: Rgba<u8> = Rgba([255, 0, 0, 153]);
const CORNER_COLOR: Rgba<u8> = Rgba([0, 212, 255, 230]);
const CLEAR: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Transparent drawing surface kept at the video's native resolution.
pub struct OverlaySurface {
    canvas: RgbaImage,
}

impl Default for OverlaySurface {
    fn default() -> Self {
        Self::new()
    }
}

impl OverlaySurface {
    pub fn new() -> Self {
        Self {
            canvas: RgbaImage::new(0, 0),
        }
    }

    pub fn canvas(&self) -> &RgbaImage {
        &self.canvas
    }

    /// Resize to `width`x`height` if needed. Returns true when resized.
    pub fn fit(&mut self, width: u32, height: u32) -> bool {
        if self.canvas.dimensions() == (width, height) {
            return false;
        }
        self.canvas = RgbaImage::new(width, height);
        true
    }

    pub fn clear(&mut self) {
        for pixel in self.canvas.pixels_mut() {
            *pixel = CLEAR;
        }
    }

    fn scale(&self) -> f32 {
        self.canvas.width().min(self.canvas.height()) as f32
    }

    pub fn note_radius(&self) -> f32 {
        (self.scale() * NOTE_RADIUS).max(1.0)
    }

    pub fn corner_half_side(&self) -> f32 {
        (self.scale() * CORNER_HALF_SIDE).max(1.0)
    }

    pub fn paint(&mut self, annotations: &AnnotationSet) {
        let radius = self.note_radius();
        for position in &annotations.positions {
            self.fill_circle(position, radius, NOTE_COLOR);
        }

        let half = self.corner_half_side();
        let thickness = (half / 4.0).max(1.0);
        for (_, corner) in annotations.present_corners() {
            self.stroke_square(corner, half, thickness, CORNER_COLOR);
        }
    }

    fn fill_circle(&mut self, center: &Annotation, radius: f32, color: Rgba<u8>) {
        let (cx, cy) = (center.x as f32, center.y as f32);
        self.fill_where(cx, cy, radius, color, |dx, dy| dx * dx + dy * dy <= radius * radius);
    }

    fn stroke_square(&mut self, center: &Annotation, half: f32, thickness: f32, color: Rgba<u8>) {
        let (cx, cy) = (center.x as f32, center.y as f32);
        let inner = half - thickness;
        self.fill_where(cx, cy, half, color, |dx, dy| {
            dx.abs().max(dy.abs()) > inner
        });
    }

    /// Set every pixel within `extent` of the center that satisfies `inside`.
    fn fill_where(
        &mut self,
        cx: f32,
        cy: f32,
        extent: f32,
        color: Rgba<u8>,
        inside: impl Fn(f32, f32) -> bool,
    ) {
        let (width, height) = self.canvas.dimensions();
        if width == 0 || height == 0 {
            return;
        }

        let x0 = (cx - extent).floor().max(0.0) as u32;
        let y0 = (cy - extent).floor().max(0.0) as u32;
        let x1 = (cx + extent).ceil().min((width - 1) as f32);
        let y1 = (cy + extent).ceil().min((height - 1) as f32);
        if x1 < 0.0 || y1 < 0.0 {
            return;
        }

        for y in y0..=y1 as u32 {
            for x in x0..=x1 as u32 {
                if inside(x as f32 - cx, y as f32 - cy) {
                    self.canvas.put_pixel(x, y, color);
                }
            }
        }
    }
}

/// Blend the overlay onto the video frame and mirror the result, so the
/// markers stay over the hand the user sees.
pub fn composite(frame: &RgbImage, overlay: &RgbaImage) -> RgbaImage {
    let mut base = DynamicImage::ImageRgb8(frame.clone()).to_rgba8();
    imageops::overlay(&mut base, overlay, 0, 0);
    imageops::flip_horizontal(&base)
}

/// One presented frame: mirrored video with annotations painted over it.
#[derive(Debug, Clone)]
pub struct RenderedFrame {
    pub image: RgbaImage,
    pub sequence: u64,
    pub positions: usize,
    pub corners: usize,
}

/// Redraws the overlay whenever the video frame or the annotation set
/// changes, at most once per display refresh.
///
/// Each pass rereads the latest video frame and annotation set; it never
/// waits on the network. Compositing runs off the event loop.
pub struct OverlayRenderer {
    frames: FrameSlot,
    annotations: watch::Receiver<AnnotationSet>,
    output: watch::Sender<Option<Arc<RenderedFrame>>>,
    surface: OverlaySurface,
    refresh: Duration,
}

impl OverlayRenderer {
    pub fn new(
        frames: FrameSlot,
        annotations: watch::Receiver<AnnotationSet>,
        refresh_rate_hz: f64,
    ) -> Self {
        let (output, _) = watch::channel(None);
        Self {
            frames,
            annotations,
            output,
            surface: OverlaySurface::new(),
            refresh: Duration::from_secs_f64(1.0 / refresh_rate_hz),
        }
    }

    pub fn output(&self) -> watch::Receiver<Option<Arc<RenderedFrame>>> {
        self.output.subscribe()
    }

    /// Run one redraw pass. Returns None until the first video frame exists.
    pub fn redraw(&mut self) -> Option<RenderedFrame> {
        let (frame, annotations) = self.latest()?;
        Some(render(&mut self.surface, &frame, &annotations))
    }

    /// Start the redraw loop. The loop lives as long as the returned task.
    pub fn spawn(self) -> OverlayTask {
        OverlayTask {
            handle: tokio::spawn(self.run()),
        }
    }

    fn latest(&mut self) -> Option<(Arc<VideoFrame>, AnnotationSet)> {
        let annotations = self.annotations.borrow_and_update().clone();
        let frame = self.frames.borrow_and_update().clone()?;
        Some((frame, annotations))
    }

    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.refresh);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            if let Some((frame, annotations)) = self.latest() {
                let mut surface = std::mem::take(&mut self.surface);
                let pass = tokio::task::spawn_blocking(move || {
                    let rendered = render(&mut surface, &frame, &annotations);
                    (surface, rendered)
                })
                .await;

                match pass {
                    Ok((surface, rendered)) => {
                        self.surface = surface;
                        self.output.send_replace(Some(Arc::new(rendered)));
                    }
                    Err(e) => tracing::error!("Overlay redraw failed: {}", e),
                }
            }

            tokio::select! {
                changed = self.frames.changed() => if changed.is_err() { break },
                changed = self.annotations.changed() => if changed.is_err() { break },
            }
        }
        tracing::debug!("Overlay renderer stopped");
    }
}

fn render(
    surface: &mut OverlaySurface,
    frame: &VideoFrame,
    annotations: &AnnotationSet,
) -> RenderedFrame {
    if surface.fit(frame.width(), frame.height()) {
        tracing::debug!("Overlay resized to {}x{}", frame.width(), frame.height());
    }
    surface.clear();
    surface.paint(annotations);

    RenderedFrame {
        image: composite(&frame.image, surface.canvas()),
        sequence: frame.sequence,
        positions: annotations.positions.len(),
        corners: annotations.present_corners().count(),
    }
}

/// Owns the redraw loop; dropping it stops the loop.
pub struct OverlayTask {
    handle: JoinHandle<()>,
}

impl Drop for OverlayTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::CornerSet;
    use image::Rgb;

    fn set(positions: Vec<Annotation>, corners: &[(&str, Option<Annotation>)]) -> AnnotationSet {
        AnnotationSet {
            positions,
            corners: corners
                .iter()
                .map(|(name, point)| (name.to_string(), point.clone()))
                .collect::<CornerSet>(),
        }
    }

    #[test]
    fn test_marker_size_scales_with_short_side() {
        let mut surface = OverlaySurface::new();
        surface.fit(640, 360);
        let small = surface.note_radius();
        surface.fit(1280, 720);
        let large = surface.note_radius();

        assert!((small - 10.8).abs() < 1e-3);
        assert!((large - 2.0 * small).abs() < 1e-3);

        surface.fit(360, 1280);
        assert!((surface.note_radius() - small).abs() < 1e-3);
    }

    #[test]
    fn test_fit_only_on_change() {
        let mut surface = OverlaySurface::new();
        assert!(surface.fit(100, 50));
        assert!(!surface.fit(100, 50));
        assert!(surface.fit(50, 100));
        assert_eq!(surface.canvas().dimensions(), (50, 100));
    }

    #[test]
    fn test_paints_notes_and_present_corners() {
        let mut surface = OverlaySurface::new();
        surface.fit(100, 100);
        surface.paint(&set(
            vec![Annotation::new(10.0, 20.0)],
            &[("tl", Some(Annotation::new(50.0, 50.0))), ("br", None)],
        ));

        let canvas = surface.canvas();
        assert_eq!(*canvas.get_pixel(10, 20), NOTE_COLOR);
        assert_eq!(*canvas.get_pixel(90, 90), CLEAR);

        let half = surface.corner_half_side() as u32;
        assert_eq!(*canvas.get_pixel(50 + half, 50), CORNER_COLOR);
        assert_eq!(*canvas.get_pixel(50, 50), CLEAR);
    }

    #[test]
    fn test_markers_near_edges_are_clipped() {
        let mut surface = OverlaySurface::new();
        surface.fit(40, 30);
        surface.paint(&set(
            vec![Annotation::new(-2.0, -2.0), Annotation::new(39.0, 29.0), Annotation::new(500.0, 500.0)],
            &[],
        ));
        assert_eq!(*surface.canvas().get_pixel(39, 29), NOTE_COLOR);
    }

    #[test]
    fn test_clear_discards_previous_markers() {
        let mut surface = OverlaySurface::new();
        surface.fit(50, 50);
        surface.paint(&set(vec![Annotation::new(25.0, 25.0)], &[]));
        surface.clear();
        surface.paint(&AnnotationSet::default());
        assert!(surface.canvas().pixels().all(|p| *p == CLEAR));
    }

    #[test]
    fn test_composite_is_mirrored() {
        let frame = RgbImage::from_pixel(100, 50, Rgb([0, 0, 0]));
        let mut surface = OverlaySurface::new();
        surface.fit(100, 50);
        surface.paint(&set(vec![Annotation::new(10.0, 20.0)], &[]));

        let out = composite(&frame, surface.canvas());
        assert_eq!(out.dimensions(), (100, 50));
        assert!(out.get_pixel(89, 20)[0] > 0);
        assert_eq!(out.get_pixel(10, 20)[0], 0);
    }

    #[test]
    fn test_redraw_follows_latest_state() {
        let (frames_tx, frames_rx) = watch::channel(None);
        let (annotations_tx, annotations_rx) = watch::channel(AnnotationSet::default());
        let mut renderer = OverlayRenderer::new(frames_rx, annotations_rx, 60.0);

        assert!(renderer.redraw().is_none());

        frames_tx.send_replace(Some(Arc::new(VideoFrame::new(RgbImage::new(64, 48), 3))));
        annotations_tx.send_replace(set(vec![Annotation::new(5.0, 5.0), Annotation::new(9.0, 9.0)], &[]));
        let rendered = renderer.redraw().unwrap();
        assert_eq!(rendered.image.dimensions(), (64, 48));
        assert_eq!((rendered.sequence, rendered.positions, rendered.corners), (3, 2, 0));

        frames_tx.send_replace(Some(Arc::new(VideoFrame::new(RgbImage::new(32, 32), 4))));
        annotations_tx.send_replace(AnnotationSet::default());
        let rendered = renderer.redraw().unwrap();
        assert_eq!(rendered.image.dimensions(), (32, 32));
        assert_eq!(rendered.positions, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_publishes_until_dropped() {
        let frame = VideoFrame::new(RgbImage::new(16, 16), 1);
        let (_frames_tx, frames_rx) = watch::channel(Some(Arc::new(frame)));
        let (_annotations_tx, annotations_rx) = watch::channel(AnnotationSet::default());
        let renderer = OverlayRenderer::new(frames_rx, annotations_rx, 60.0);
        let mut output = renderer.output();

        let task = renderer.spawn();
        output.wait_for(|o| o.is_some()).await.unwrap();
        drop(task);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(output.changed().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_redraws_only_on_change() {
        let frame = VideoFrame::new(RgbImage::new(32, 24), 1);
        let (frames_tx, frames_rx) = watch::channel(Some(Arc::new(frame)));
        let (annotations_tx, annotations_rx) = watch::channel(AnnotationSet::default());
        let renderer = OverlayRenderer::new(frames_rx, annotations_rx, 60.0);
        let mut output = renderer.output();

        let _task = renderer.spawn();
        output.wait_for(|o| o.is_some()).await.unwrap();
        output.borrow_and_update();

        // Nothing new upstream: several refresh periods pass without a redraw.
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!output.has_changed().unwrap());

        annotations_tx.send_replace(set(vec![Annotation::new(4.0, 4.0)], &[]));
        output.changed().await.unwrap();
        assert_eq!(output.borrow_and_update().as_ref().unwrap().positions, 1);

        frames_tx.send_replace(Some(Arc::new(VideoFrame::new(RgbImage::new(32, 24), 2))));
        output.changed().await.unwrap();
        let rendered = output.borrow_and_update().clone().unwrap();
        assert_eq!((rendered.sequence, rendered.positions), (2, 1));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!output.has_changed().unwrap());
    }
}
