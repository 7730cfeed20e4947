use crate::{
    config::{ModelConfig, Validatable},
    model_service::ModelService,
};
use detect_proto::{BoundingBox, DetectionBatch, ImageFrame};
use image::{imageops::FilterType, GenericImageView};
use ndarray::{s, Array, ArrayD, ArrayViewD, Axis, Ix4};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use tonic::{async_trait, Status};

const INPUT_SIZE: u32 = 640;

fn intersection(box1: &BoundingBox, box2: &BoundingBox) -> f32 {
    let width = (box1.x2.min(box2.x2) - box1.x1.max(box2.x1)).max(0.0);
    let height = (box1.y2.min(box2.y2) - box1.y1.max(box2.y1)).max(0.0);
    width * height
}

fn union(box1: &BoundingBox, box2: &BoundingBox) -> f32 {
    ((box1.x2 - box1.x1) * (box1.y2 - box1.y1)) + ((box2.x2 - box2.x1) * (box2.y2 - box2.y1))
        - intersection(box1, box2)
}

fn iou(box1: &BoundingBox, box2: &BoundingBox) -> f32 {
    let union = union(box1, box2);
    if union <= 0.0 {
        return 0.0;
    }
    intersection(box1, box2) / union
}

fn transform_image_frame(image_frame: &ImageFrame) -> Result<(Array<f32, Ix4>, u32, u32), String> {
    let image_data = &image_frame.image_data;

    let image_reader = image::ImageReader::new(std::io::Cursor::new(image_data))
        .with_guessed_format()
        .map_err(|e| format!("Error decoding image: {}", e))?;

    let original_img = image_reader
        .decode()
        .map_err(|e| format!("Error decoding image: {}", e))?;

    let (img_width, img_height) = original_img.dimensions();
    let img = original_img.resize_exact(INPUT_SIZE, INPUT_SIZE, FilterType::CatmullRom);

    let size = INPUT_SIZE as usize;
    let mut input = Array::zeros((1, 3, size, size));
    for pixel in img.pixels() {
        let x = pixel.0 as _;
        let y = pixel.1 as _;
        let [r, g, b, _] = pixel.2 .0;
        input[[0, 0, y, x]] = (r as f32) / 255.;
        input[[0, 1, y, x]] = (g as f32) / 255.;
        input[[0, 2, y, x]] = (b as f32) / 255.;
    }

    Ok((input, img_height, img_width))
}

/// Decodes a `[1, 4 + classes, anchors]` output into boxes in original
/// image pixels, clamped to the image.
fn extract_boxes(
    output: ArrayViewD<f32>,
    img_width: u32,
    img_height: u32,
    min_probability: f32,
) -> Result<Vec<BoundingBox>, String> {
    if output.ndim() != 3 {
        return Err(format!("unexpected output rank {}", output.ndim()));
    }

    let width = img_width as f32;
    let height = img_height as f32;
    let scale_x = width / INPUT_SIZE as f32;
    let scale_y = height / INPUT_SIZE as f32;

    let transposed = output.t();
    let anchors = transposed.slice(s![.., .., 0]);

    let mut boxes = Vec::new();
    for row in anchors.axis_iter(Axis(0)) {
        let row: Vec<_> = row.iter().copied().collect();
        if row.len() <= 4 {
            return Err(format!("anchor row too short: {}", row.len()));
        }
        let Some((class_id, prob)) = row
            .iter()
            .skip(4)
            .copied()
            .enumerate()
            .reduce(|accum, row| if row.1 > accum.1 { row } else { accum })
        else {
            continue;
        };

        if prob < min_probability {
            continue;
        }

        let xc = row[0] * scale_x;
        let yc = row[1] * scale_y;
        let w = row[2] * scale_x;
        let h = row[3] * scale_y;

        boxes.push(BoundingBox {
            class_id: class_id as u32,
            confidence: prob,
            x1: (xc - w / 2.).clamp(0., width),
            y1: (yc - h / 2.).clamp(0., height),
            x2: (xc + w / 2.).clamp(0., width),
            y2: (yc + h / 2.).clamp(0., height),
        });
    }

    Ok(boxes)
}

/// Class-agnostic NMS, highest confidence first.
fn non_maximum_suppression(mut boxes: Vec<BoundingBox>, iou_threshold: f32) -> Vec<BoundingBox> {
    boxes.sort_by(|box1, box2| box2.confidence.total_cmp(&box1.confidence));
    let mut result = Vec::new();

    while !boxes.is_empty() {
        let best = boxes.remove(0);
        boxes.retain(|candidate| iou(&best, candidate) < iou_threshold);
        result.push(best);
    }

    result
}

#[derive(Clone)]
pub struct OrtModelService {
    sessions: Arc<Vec<Arc<Mutex<Session>>>>,
    counter: Arc<AtomicUsize>,
    min_probability: f32,
    iou_threshold: f32,
}

impl OrtModelService {
    pub fn new(model_config: &ModelConfig) -> Result<Self, Box<dyn std::error::Error>> {
        #[cfg(feature = "tensorrt")]
        ort::init()
            .with_execution_providers([
                ort::execution_providers::TensorRTExecutionProvider::default()
                    .with_engine_cache(true)
                    .build(),
            ])
            .commit()?;

        let num_instances = model_config.num_instances.max(1);
        let sessions = (0..num_instances)
            .map(|_| {
                let session = Session::builder()?
                    .with_optimization_level(GraphOptimizationLevel::Level3)?
                    .commit_from_file(model_config.get_path())?;
                Ok(Arc::new(Mutex::new(session)))
            })
            .collect::<Result<Vec<_>, ort::Error>>()?;

        tracing::info!("Created {} ONNX sessions", num_instances);

        Ok(Self {
            counter: Arc::new(AtomicUsize::new(0)),
            sessions: Arc::new(sessions),
            min_probability: model_config.min_probability,
            iou_threshold: model_config.iou_threshold,
        })
    }

    pub fn run_inference(&self, input: &Array<f32, Ix4>) -> Result<ArrayD<f32>, Status> {
        let index = self.counter.fetch_add(1, Ordering::SeqCst) % self.sessions.len();
        let session_arc = &self.sessions[index];
        let mut session = session_arc
            .lock()
            .map_err(|e| Status::internal(format!("session mutex poisoned: {}", e)))?;

        tracing::debug!("Handling request with session {}", index);
        let owned_buffer;
        let input_view = if input.view().is_standard_layout() {
            input.view()
        } else {
            owned_buffer = input.as_standard_layout().to_owned();
            owned_buffer.view()
        };

        let tensor_ref = TensorRef::from_array_view(input_view)
            .map_err(|e| Status::internal(format!("failed to build tensor: {}", e)))?;

        let outputs = session
            .run(ort::inputs![tensor_ref])
            .map_err(|e| Status::internal(format!("inference failed: {}", e)))?;

        let (shape, data) = outputs["output0"]
            .try_extract_tensor::<f32>()
            .map_err(|e| Status::internal(format!("failed to extract tensor: {}", e)))?;

        let ix = shape.to_ixdyn();
        ArrayD::from_shape_vec(ix, data.to_vec())
            .map_err(|e| Status::internal(format!("invalid tensor shape: {}", e)))
    }

    fn predict_blocking(&self, frame: &ImageFrame) -> Result<DetectionBatch, Status> {
        let (input, img_height, img_width) = transform_image_frame(frame).map_err(|err| {
            Status::invalid_argument(format!("Image transformation error: {}", err))
        })?;

        let outputs = self.run_inference(&input)?;
        let boxes = extract_boxes(outputs.view(), img_width, img_height, self.min_probability)
            .map_err(|e| Status::internal(format!("failed to decode output: {}", e)))?;

        Ok(DetectionBatch {
            detections: non_maximum_suppression(boxes, self.iou_threshold),
            timestamp: frame.timestamp,
            image_width: img_width,
            image_height: img_height,
        })
    }
}

#[async_trait]
impl ModelService for OrtModelService {
    async fn predict(&self, frame: ImageFrame) -> Result<DetectionBatch, Status> {
        let service = self.clone();
        tokio::task::spawn_blocking(move || service.predict_blocking(&frame))
            .await
            .map_err(|e| Status::internal(format!("inference task failed: {}", e)))?
    }
}
