use image::{ImageBuffer, Rgb};
use imageproc::drawing::{draw_text_mut, text_size};
use rusttype::{Font, Scale};

use crate::frame::RawFrame;

const SHADOW: Rgb<u8> = Rgb([0, 0, 0]);
const FOREGROUND: Rgb<u8> = Rgb([0, 255, 0]);

/// Common install locations for a monospace TTF, checked in order. The
/// overlay needs some real font on disk; unlike the OpenCV original (which
/// ships Hershey vector fonts internally) there is no bundled fallback here.
pub const DEFAULT_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSansMono.ttf",
    "/usr/share/fonts/TTF/DejaVuSansMono.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationMono-Regular.ttf",
];

/// Draws camera name, date, time and optional measured FPS onto a frame.
/// A pure function of its inputs so an alternative renderer can be swapped
/// in without touching the `Dispatcher` loop.
pub trait FrameAnnotator: Send + Sync {
    fn annotate(&self, frame: &RawFrame, camera_name: &str, show_fps: bool) -> RawFrame;
}

pub struct DefaultAnnotator {
    font: Font<'static>,
    scale: Scale,
}

impl DefaultAnnotator {
    pub fn from_bytes(font_bytes: Vec<u8>) -> Option<Self> {
        let font = Font::try_from_vec(font_bytes)?;
        Some(Self {
            font,
            scale: Scale { x: 18.0, y: 18.0 },
        })
    }

    /// Tries each of `DEFAULT_FONT_CANDIDATES` in turn and loads the first
    /// one that exists and parses.
    pub fn from_system_font() -> crate::Result<Self> {
        for path in DEFAULT_FONT_CANDIDATES {
            if let Ok(bytes) = std::fs::read(path) {
                if let Some(annotator) = Self::from_bytes(bytes) {
                    return Ok(annotator);
                }
            }
        }
        Err(crate::CameraHubError::Config(
            "no usable monospace font found; set a font path explicitly".into(),
        ))
    }

    fn draw_with_shadow(&self, img: &mut ImageBuffer<Rgb<u8>, Vec<u8>>, x: i32, y: i32, text: &str) {
        draw_text_mut(img, SHADOW, x + 1, y + 1, self.scale, &self.font, text);
        draw_text_mut(img, FOREGROUND, x, y, self.scale, &self.font, text);
    }
}

impl FrameAnnotator for DefaultAnnotator {
    fn annotate(&self, frame: &RawFrame, camera_name: &str, show_fps: bool) -> RawFrame {
        let mut img: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_raw(frame.width, frame.height, frame.data.clone())
                .expect("raw frame buffer size must match width*height*3");

        let now = chrono::Local::now();
        let date_str = now.format("%d-%m-%Y").to_string();
        let time_str = now.format("%H:%M:%S%.3f").to_string();

        let (_, text_h) = text_size(self.scale, &self.font, &time_str);
        let margin = 10i32;

        self.draw_with_shadow(&mut img, margin, margin, camera_name);

        let (date_w, _) = text_size(self.scale, &self.font, &date_str);
        let (time_w, _) = text_size(self.scale, &self.font, &time_str);
        let bottom = frame.height as i32 - margin - text_h;
        self.draw_with_shadow(
            &mut img,
            frame.width as i32 - date_w - margin,
            bottom - text_h,
            &date_str,
        );
        self.draw_with_shadow(
            &mut img,
            frame.width as i32 - time_w - margin,
            bottom,
            &time_str,
        );

        if show_fps {
            if let Some(fps) = frame.measured_fps {
                let fps_str = format!("{fps:.1} fps");
                let (fps_w, _) = text_size(self.scale, &self.font, &fps_str);
                self.draw_with_shadow(&mut img, frame.width as i32 - fps_w - margin, margin, &fps_str);
            }
        }

        RawFrame {
            width: frame.width,
            height: frame.height,
            data: img.into_raw(),
            capture_time: frame.capture_time,
            measured_fps: frame.measured_fps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_annotator() -> Option<DefaultAnnotator> {
        DefaultAnnotator::from_system_font().ok()
    }

    #[test]
    fn annotate_preserves_dimensions() {
        let Some(annotator) = test_annotator() else {
            eprintln!("skipping: no system monospace font available in this environment");
            return;
        };
        let frame = RawFrame::new(64, 48, vec![10u8; 64 * 48 * 3], 0.0);
        let out = annotator.annotate(&frame, "Front Door", true);
        assert_eq!(out.width, 64);
        assert_eq!(out.height, 48);
        assert_eq!(out.data.len(), 64 * 48 * 3);
    }
}
