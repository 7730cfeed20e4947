use upload_panel::api::{Coordinates, Detection};

/// A detection with its class name and drawing color resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledDetection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub class_label: String,
    pub color: [u8; 3],
    /// Model score in `0..=1`.
    pub confidence: f32,
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

impl LabeledDetection {
    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// Percentage confidence with two decimals and whole-pixel corners.
    pub fn to_wire(&self) -> Detection {
        Detection {
            class_name: self.class_label.clone(),
            confidence: round_to(self.confidence as f64 * 100.0, 2),
            coordinates: Coordinates {
                x1: (self.x1 as f64).round(),
                y1: (self.y1 as f64).round(),
                x2: (self.x2 as f64).round(),
                y2: (self.y2 as f64).round(),
            },
        }
    }
}
