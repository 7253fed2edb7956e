//! Draws accepted detections onto an image.

use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::detection::Annotation;
use crate::error::{Error, Result};

pub const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const TEXT_COLOR: Rgb<u8> = Rgb([0, 0, 0]);
pub const BOX_THICKNESS: u32 = 2;

// Glyph metrics used to size the label background when no font is loaded.
const FALLBACK_CHAR_WIDTH: u32 = 7;
const FALLBACK_TEXT_HEIGHT: u32 = 12;
const BASELINE: u32 = 3;

pub struct Renderer {
    font: Option<FontVec>,
    scale: PxScale,
}

impl Renderer {
    /// Renderer that draws boxes and label backgrounds only.
    pub fn new() -> Self {
        Self {
            font: None,
            scale: PxScale::from(16.0),
        }
    }

    /// Renderer that also writes label text with a TrueType/OpenType font.
    pub fn with_font_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| Error::io(path, e))?;
        let font = FontVec::try_from_vec(bytes).map_err(|e| {
            Error::Configuration(format!("'{}' is not a usable font: {}", path.display(), e))
        })?;
        Ok(Self {
            font: Some(font),
            scale: PxScale::from(16.0),
        })
    }

    /// Font renderer when a font is given, otherwise the text-less one.
    pub fn for_font(font: Option<&Path>) -> Result<Self> {
        match font {
            Some(path) => Self::with_font_file(path),
            None => {
                log::warn!("no font configured, label backgrounds are drawn without text");
                Ok(Self::new())
            }
        }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Width and height of the rendered label text.
    pub fn label_size(&self, label: &str) -> (u32, u32) {
        match &self.font {
            Some(font) => text_size(self.scale, font, label),
            None => (
                FALLBACK_CHAR_WIDTH * label.chars().count() as u32,
                FALLBACK_TEXT_HEIGHT,
            ),
        }
    }

    /// Draw every annotation: a box outline and a filled label background
    /// sitting on top of the box's top-left corner.
    pub fn draw(&self, image: &mut RgbImage, annotations: &[Annotation]) {
        for annotation in annotations {
            self.draw_one(image, annotation);
        }
    }

    fn draw_one(&self, image: &mut RgbImage, annotation: &Annotation) {
        let bbox = annotation.bbox.clamp(image.width(), image.height());

        for inset in 0..BOX_THICKNESS as i32 {
            let w = bbox.width() as i32 - 2 * inset;
            let h = bbox.height() as i32 - 2 * inset;
            if w <= 0 || h <= 0 {
                break;
            }
            let rect = Rect::at(bbox.x1 + inset, bbox.y1 + inset).of_size(w as u32, h as u32);
            draw_hollow_rect_mut(image, rect, BOX_COLOR);
        }

        let (text_w, text_h) = self.label_size(&annotation.label);
        if text_w == 0 {
            return;
        }
        let bg_h = text_h + BASELINE;
        let bg_top = bbox.y1 - bg_h as i32;
        let background = Rect::at(bbox.x1, bg_top).of_size(text_w, bg_h);
        draw_filled_rect_mut(image, background, BOX_COLOR);

        if let Some(font) = &self.font {
            draw_text_mut(
                image,
                TEXT_COLOR,
                bbox.x1,
                bg_top,
                self.scale,
                font,
                &annotation.label,
            );
        }
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BoundingBox;

    #[test]
    fn draws_outline_and_label_background() {
        let mut img = RgbImage::from_pixel(100, 100, Rgb([255, 255, 255]));
        let annotation = Annotation {
            bbox: BoundingBox::new(20, 40, 60, 80),
            label: "One Dollar: 0.90".to_string(),
        };
        Renderer::new().draw(&mut img, &[annotation]);

        // outline, two pixels thick
        assert_eq!(*img.get_pixel(20, 60), BOX_COLOR);
        assert_eq!(*img.get_pixel(21, 60), BOX_COLOR);
        // interior untouched
        assert_eq!(*img.get_pixel(40, 60), Rgb([255, 255, 255]));
        // label background above the top-left corner
        assert_eq!(*img.get_pixel(22, 35), BOX_COLOR);
        // nothing below the box
        assert_eq!(*img.get_pixel(40, 90), Rgb([255, 255, 255]));
    }

    #[test]
    fn boxes_past_the_edge_are_clipped() {
        let mut img = RgbImage::new(50, 50);
        let annotation = Annotation {
            bbox: BoundingBox::new(-10, 5, 80, 60),
            label: "x".to_string(),
        };
        Renderer::new().draw(&mut img, &[annotation]);
        assert_eq!(*img.get_pixel(0, 20), BOX_COLOR);
    }

    #[test]
    fn for_font_without_a_font_draws_no_text() {
        let renderer = Renderer::for_font(None).unwrap();
        assert!(!renderer.has_font());
        assert_eq!(renderer.label_size("abc"), (21, 12));
    }

    #[test]
    fn for_font_rejects_a_file_that_is_not_a_font() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"plain text").unwrap();
        let result = Renderer::for_font(Some(file.path()));
        assert!(matches!(result, Err(Error::Configuration(_))));
    }
}
