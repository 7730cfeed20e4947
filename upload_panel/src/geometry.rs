use crate::api::Detection;

/// Size of the image as laid out on the page against its intrinsic size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageMetrics {
    pub rendered_width: f64,
    pub rendered_height: f64,
    pub natural_width: f64,
    pub natural_height: f64,
}

impl ImageMetrics {
    /// `None` until the image has loaded and has a natural size.
    pub fn scale(&self) -> Option<(f64, f64)> {
        if self.natural_width <= 0.0 || self.natural_height <= 0.0 {
            return None;
        }
        Some((
            self.rendered_width / self.natural_width,
            self.rendered_height / self.natural_height,
        ))
    }
}

/// An absolutely positioned highlight over the displayed original image.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayBox {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
    pub label: String,
}

pub fn overlay_label(detection: &Detection) -> String {
    format!("{} ({}%)", detection.class_name, detection.confidence)
}

pub fn overlay_for(detection: &Detection, metrics: &ImageMetrics) -> Option<OverlayBox> {
    let (scale_x, scale_y) = metrics.scale()?;
    let coords = &detection.coordinates;

    Some(OverlayBox {
        left: coords.x1 * scale_x,
        top: coords.y1 * scale_y,
        width: coords.width() * scale_x,
        height: coords.height() * scale_y,
        label: overlay_label(detection),
    })
}
