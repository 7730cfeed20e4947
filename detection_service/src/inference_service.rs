use crate::{model_service::ModelService, state::State};
use detect_proto::{detector_server::Detector, ClassLabels, DetectionBatch, Empty, ImageFrame};
use std::sync::Arc;
use tonic::{async_trait, Request, Response, Status};

#[derive(Debug)]
pub struct InferenceService<M: ModelService, S: State> {
    model_service: Arc<M>,
    service_state: Arc<S>,
}

impl<M: ModelService, S: State> InferenceService<M, S> {
    pub fn new(model_service: M, state: S) -> Self {
        Self {
            model_service: Arc::new(model_service),
            service_state: Arc::new(state),
        }
    }
}

#[async_trait]
impl<M: ModelService, S: State> Detector for InferenceService<M, S> {
    async fn detect(
        &self,
        request: Request<ImageFrame>,
    ) -> Result<Response<DetectionBatch>, Status> {
        let image_frame = request.into_inner();
        if image_frame.image_data.is_empty() {
            return Err(Status::invalid_argument("image_data is empty"));
        }

        let model_service = self.model_service.clone();
        let batch = model_service.predict(image_frame).await?;

        tracing::debug!(
            "Returning {} detections for a {}x{} image",
            batch.detections.len(),
            batch.image_width,
            batch.image_height
        );
        for (i, detection) in batch.detections.iter().enumerate() {
            tracing::debug!(
                "Detection {}: class_id={}, confidence={:.3}, bbox=({:.1}, {:.1}, {:.1}, {:.1})",
                i,
                detection.class_id,
                detection.confidence,
                detection.x1,
                detection.y1,
                detection.x2,
                detection.y2
            );
        }

        Ok(Response::new(batch))
    }

    async fn get_class_labels(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<ClassLabels>, Status> {
        let labels = self.service_state.get_labels().clone();
        let response = ClassLabels {
            class_labels: labels,
        };

        Ok(Response::new(response))
    }
}
