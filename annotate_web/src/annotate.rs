use crate::{config::AnnotationConfig, detection::LabeledDetection};
use ab_glyph::{FontArc, PxScale};
use image::{ImageFormat, Rgb, RgbImage};
use imageproc::{
    drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
    rect::Rect,
};
use std::io::Cursor;
use thiserror::Error;

const LABEL_TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const LABEL_PADDING: u32 = 2;

static BUNDLED_FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

#[derive(Error, Debug)]
pub enum AnnotateError {
    #[error("Failed to read font {path:?}: {source}")]
    FontRead {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid font {path:?}: {source}")]
    InvalidFont {
        path: std::path::PathBuf,
        source: ab_glyph::InvalidFont,
    },
    #[error("Bundled font is invalid: {0}")]
    BundledFont(ab_glyph::InvalidFont),
    #[error("Failed to decode image: {0}")]
    Decode(image::ImageError),
    #[error("Failed to encode image: {0}")]
    Encode(image::ImageError),
}

pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage, AnnotateError> {
    let image = image::load_from_memory(bytes).map_err(AnnotateError::Decode)?;
    Ok(image.to_rgb8())
}

pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>, AnnotateError> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(AnnotateError::Encode)?;
    Ok(buffer.into_inner())
}

/// Draws detection boxes and their labels onto an image.
#[derive(Clone)]
pub struct Annotator {
    font: FontArc,
    scale: PxScale,
    thickness: u32,
}

impl Annotator {
    pub fn new(config: &AnnotationConfig) -> Result<Self, AnnotateError> {
        let font = match &config.font_path {
            Some(path) => {
                let data = std::fs::read(path).map_err(|source| AnnotateError::FontRead {
                    path: path.clone(),
                    source,
                })?;
                let font =
                    FontArc::try_from_vec(data).map_err(|source| AnnotateError::InvalidFont {
                        path: path.clone(),
                        source,
                    })?;
                tracing::info!("Loaded annotation font from {:?}", path);
                font
            }
            None => FontArc::try_from_slice(BUNDLED_FONT).map_err(AnnotateError::BundledFont)?,
        };

        Ok(Self {
            font,
            scale: PxScale::from(config.font_size),
            thickness: config.line_thickness.max(1),
        })
    }

    pub fn font(&self) -> &FontArc {
        &self.font
    }

    pub fn annotate(&self, image: &mut RgbImage, detections: &[LabeledDetection]) {
        for detection in detections {
            self.draw_detection(image, detection);
        }
    }

    fn draw_detection(&self, image: &mut RgbImage, detection: &LabeledDetection) {
        let (w, h) = (image.width() as i32, image.height() as i32);
        if w == 0 || h == 0 {
            return;
        }

        let x_min = (detection.x1.floor() as i32).clamp(0, w - 1);
        let y_min = (detection.y1.floor() as i32).clamp(0, h - 1);
        let x_max = (detection.x2.ceil() as i32).clamp(0, w - 1);
        let y_max = (detection.y2.ceil() as i32).clamp(0, h - 1);

        if x_min >= x_max || y_min >= y_max {
            return;
        }

        let color = Rgb(detection.color);
        for inset in 0..self.thickness as i32 {
            let width = x_max - x_min - 2 * inset + 1;
            let height = y_max - y_min - 2 * inset + 1;
            if width <= 0 || height <= 0 {
                break;
            }
            let rect = Rect::at(x_min + inset, y_min + inset).of_size(width as u32, height as u32);
            draw_hollow_rect_mut(image, rect, color);
        }

        let font = &self.font;
        let label = format!("{} {:.2}", detection.class_label, detection.confidence);
        let (text_width, text_height) = text_size(self.scale, font, &label);
        let label_width = (text_width + 2 * LABEL_PADDING).min((w - x_min) as u32);
        let label_height = text_height + 2 * LABEL_PADDING;
        let label_y = (y_min - label_height as i32).max(0);

        if label_width == 0 || label_height == 0 {
            return;
        }

        let background = Rect::at(x_min, label_y).of_size(label_width, label_height);
        draw_filled_rect_mut(image, background, color);
        draw_text_mut(
            image,
            LABEL_TEXT_COLOR,
            x_min + LABEL_PADDING as i32,
            label_y + LABEL_PADDING as i32,
            self.scale,
            font,
            &label,
        );
    }
}
