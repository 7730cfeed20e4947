use crate::{
    annotate::{encode_png, AnnotateError},
    detection::LabeledDetection,
};
use ab_glyph::{FontArc, PxScale};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{Rgb, RgbImage};
use imageproc::{
    drawing::{draw_filled_rect_mut, draw_line_segment_mut, draw_text_mut, text_size},
    rect::Rect,
};

pub const HISTOGRAM_BINS: usize = 10;

const CANVAS_WIDTH: u32 = 1500;
const CANVAS_HEIGHT: u32 = 1000;
const COLUMNS: u32 = 3;
const ROWS: u32 = 2;

const MARGIN_LEFT: i32 = 60;
const MARGIN_RIGHT: i32 = 20;
const MARGIN_TOP: i32 = 50;
const MARGIN_BOTTOM: i32 = 60;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS: Rgb<u8> = Rgb([40, 40, 40]);
const TEXT: Rgb<u8> = Rgb([20, 20, 20]);

const SKY_BLUE: Rgb<u8> = Rgb([135, 206, 235]);
const ORANGE: Rgb<u8> = Rgb([255, 165, 0]);
const LIGHT_GREEN: Rgb<u8> = Rgb([144, 238, 144]);
const SALMON: Rgb<u8> = Rgb([250, 128, 114]);
const LIGHT_BLUE: Rgb<u8> = Rgb([173, 216, 230]);

/// Counts `values` into `bins` equal-width bins spanning `[lo, hi]`. The top
/// edge belongs to the last bin. When the range is empty every value lands in
/// the first bin.
pub fn histogram(values: &[f64], bins: usize, lo: f64, hi: f64) -> Vec<usize> {
    let mut counts = vec![0; bins];
    if bins == 0 {
        return counts;
    }
    let width = (hi - lo) / bins as f64;

    for &value in values {
        let bin = if width > 0.0 {
            (((value - lo) / width).floor().max(0.0) as usize).min(bins - 1)
        } else {
            0
        };
        counts[bin] += 1;
    }
    counts
}

/// Histogram over the observed range of `values`.
fn observed_histogram(values: &[f64]) -> Histogram {
    let lo = values.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !lo.is_finite() || !hi.is_finite() {
        return Histogram {
            lo: 0.0,
            hi: 0.0,
            counts: vec![0; HISTOGRAM_BINS],
        };
    }
    Histogram {
        lo,
        hi,
        counts: histogram(values, HISTOGRAM_BINS, lo, hi),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    pub lo: f64,
    pub hi: f64,
    pub counts: Vec<usize>,
}

/// Counts of box centers per image quadrant. Q1 is bottom right in image
/// coordinates, then counter-clockwise.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Quadrants {
    pub q1: usize,
    pub q2: usize,
    pub q3: usize,
    pub q4: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionStats {
    /// Confidence percentages over `0..=100`.
    pub confidence: Histogram,
    /// Sorted by descending count, then name.
    pub class_counts: Vec<(String, usize)>,
    pub area: Histogram,
    /// Width over height.
    pub aspect_ratio: Histogram,
    pub quadrants: Quadrants,
    /// In first-seen class order.
    pub mean_area_by_class: Vec<(String, f64)>,
}

impl DetectionStats {
    pub fn from_detections(
        detections: &[LabeledDetection],
        image_width: u32,
        image_height: u32,
    ) -> Self {
        let confidences: Vec<f64> = detections
            .iter()
            .map(|d| d.confidence as f64 * 100.0)
            .collect();

        let mut class_counts: Vec<(String, usize)> = Vec::new();
        let mut class_areas: Vec<(String, f64, usize)> = Vec::new();
        let mut areas = Vec::with_capacity(detections.len());
        let mut aspect_ratios = Vec::with_capacity(detections.len());
        let mut quadrants = Quadrants::default();

        let (mid_x, mid_y) = (image_width as f64 / 2.0, image_height as f64 / 2.0);

        for detection in detections {
            let width = detection.width() as f64;
            let height = detection.height() as f64;
            let area = width * height;
            areas.push(area);
            if height > 0.0 {
                aspect_ratios.push(width / height);
            }

            match class_counts
                .iter_mut()
                .find(|(name, _)| *name == detection.class_label)
            {
                Some((_, count)) => *count += 1,
                None => class_counts.push((detection.class_label.clone(), 1)),
            }
            match class_areas
                .iter_mut()
                .find(|(name, _, _)| *name == detection.class_label)
            {
                Some((_, total, count)) => {
                    *total += area;
                    *count += 1;
                }
                None => class_areas.push((detection.class_label.clone(), area, 1)),
            }

            let center_x = (detection.x1 + detection.x2) as f64 / 2.0;
            let center_y = (detection.y1 + detection.y2) as f64 / 2.0;
            match (center_x > mid_x, center_y > mid_y) {
                (true, true) => quadrants.q1 += 1,
                (false, true) => quadrants.q2 += 1,
                (false, false) => quadrants.q3 += 1,
                (true, false) => quadrants.q4 += 1,
            }
        }

        class_counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        Self {
            confidence: Histogram {
                lo: 0.0,
                hi: 100.0,
                counts: histogram(&confidences, HISTOGRAM_BINS, 0.0, 100.0),
            },
            class_counts,
            area: observed_histogram(&areas),
            aspect_ratio: observed_histogram(&aspect_ratios),
            quadrants,
            mean_area_by_class: class_areas
                .into_iter()
                .map(|(name, total, count)| (name, total / count as f64))
                .collect(),
        }
    }
}

struct BarPanel {
    title: &'static str,
    bars: Vec<(String, f64)>,
    color: Rgb<u8>,
}

fn histogram_bars(histogram: &Histogram, decimals: usize) -> Vec<(String, f64)> {
    let width = (histogram.hi - histogram.lo) / histogram.counts.len().max(1) as f64;
    histogram
        .counts
        .iter()
        .enumerate()
        .map(|(i, &count)| {
            (
                format!("{:.*}", decimals, histogram.lo + width * i as f64),
                count as f64,
            )
        })
        .collect()
}

fn panels(stats: &DetectionStats) -> Vec<BarPanel> {
    vec![
        BarPanel {
            title: "Confidence (%)",
            bars: histogram_bars(&stats.confidence, 0),
            color: SKY_BLUE,
        },
        BarPanel {
            title: "Detections per class",
            bars: stats
                .class_counts
                .iter()
                .map(|(name, count)| (name.clone(), *count as f64))
                .collect(),
            color: ORANGE,
        },
        BarPanel {
            title: "Box area (px)",
            bars: histogram_bars(&stats.area, 0),
            color: LIGHT_GREEN,
        },
        BarPanel {
            title: "Aspect ratio (w/h)",
            bars: histogram_bars(&stats.aspect_ratio, 1),
            color: SALMON,
        },
        BarPanel {
            title: "Detections per quadrant",
            bars: vec![
                ("Q1".to_string(), stats.quadrants.q1 as f64),
                ("Q2".to_string(), stats.quadrants.q2 as f64),
                ("Q3".to_string(), stats.quadrants.q3 as f64),
                ("Q4".to_string(), stats.quadrants.q4 as f64),
            ],
            color: LIGHT_BLUE,
        },
        BarPanel {
            title: "Mean box area per class (px)",
            bars: stats.mean_area_by_class.clone(),
            color: LIGHT_GREEN,
        },
    ]
}

fn draw_panel(
    canvas: &mut RgbImage,
    origin: (i32, i32),
    size: (i32, i32),
    panel: &BarPanel,
    font: &FontArc,
) {
    let (left, top) = (origin.0 + MARGIN_LEFT, origin.1 + MARGIN_TOP);
    let plot_width = size.0 - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_height = size.1 - MARGIN_TOP - MARGIN_BOTTOM;
    let baseline = top + plot_height;

    draw_line_segment_mut(
        canvas,
        (left as f32, top as f32),
        (left as f32, baseline as f32),
        AXIS,
    );
    draw_line_segment_mut(
        canvas,
        (left as f32, baseline as f32),
        ((left + plot_width) as f32, baseline as f32),
        AXIS,
    );

    let max = panel.bars.iter().map(|(_, v)| *v).fold(0.0, f64::max);
    let slot = plot_width / panel.bars.len().max(1) as i32;
    let bar_width = (slot * 4 / 5).max(1) as u32;

    for (i, (_, value)) in panel.bars.iter().enumerate() {
        if max <= 0.0 || *value <= 0.0 {
            continue;
        }
        let bar_height = ((value / max) * plot_height as f64).round() as u32;
        if bar_height == 0 {
            continue;
        }
        let x = left + slot * i as i32 + slot / 10 + 1;
        let rect = Rect::at(x, baseline - bar_height as i32).of_size(bar_width, bar_height);
        draw_filled_rect_mut(canvas, rect, panel.color);
    }

    let title_scale = PxScale::from(22.0);
    let (title_width, _) = text_size(title_scale, font, panel.title);
    draw_text_mut(
        canvas,
        TEXT,
        origin.0 + (size.0 - title_width as i32).max(0) / 2,
        origin.1 + 12,
        title_scale,
        font,
        panel.title,
    );

    let tick_scale = PxScale::from(14.0);
    draw_text_mut(
        canvas,
        TEXT,
        origin.0 + 8,
        top,
        tick_scale,
        font,
        &format!("{:.0}", max),
    );
    for (i, (label, _)) in panel.bars.iter().enumerate() {
        let (label_width, _) = text_size(tick_scale, font, label);
        if label_width as i32 > slot {
            continue;
        }
        let x = left + slot * i as i32 + (slot - label_width as i32) / 2;
        draw_text_mut(canvas, TEXT, x, baseline + 8, tick_scale, font, label);
    }
}

pub fn render_chart(stats: &DetectionStats, font: &FontArc) -> RgbImage {
    let mut canvas = RgbImage::from_pixel(CANVAS_WIDTH, CANVAS_HEIGHT, BACKGROUND);
    let cell = (
        (CANVAS_WIDTH / COLUMNS) as i32,
        (CANVAS_HEIGHT / ROWS) as i32,
    );

    for (i, panel) in panels(stats).iter().enumerate() {
        let (column, row) = (i as i32 % COLUMNS as i32, i as i32 / COLUMNS as i32);
        draw_panel(
            &mut canvas,
            (column * cell.0, row * cell.1),
            cell,
            panel,
            font,
        );
    }
    canvas
}

/// PNG chart as a `data:` URL, or `None` when there is nothing to plot.
pub fn chart_data_url(
    detections: &[LabeledDetection],
    image_width: u32,
    image_height: u32,
    font: &FontArc,
) -> Result<Option<String>, AnnotateError> {
    if detections.is_empty() {
        return Ok(None);
    }

    let stats = DetectionStats::from_detections(detections, image_width, image_height);
    let png = encode_png(&render_chart(&stats, font))?;
    Ok(Some(format!("data:image/png;base64,{}", STANDARD.encode(png))))
}
