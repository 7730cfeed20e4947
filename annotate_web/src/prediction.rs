use crate::config::PredictionServiceConfig;
use crate::detection::LabeledDetection;
use detect_proto::{detector_client::DetectorClient, BoundingBox, ColorLabel, Empty, ImageFrame};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::time::{sleep, timeout, Duration};
use tonic::{
    async_trait,
    transport::{Channel, Error},
    Request, Status,
};
use tracing::instrument;

#[derive(Error, Debug)]
pub enum PredictionServiceError {
    #[error("Failed to connect to gRPC server: {0}")]
    ConnectionFailed(#[from] Error),
    #[error("Maximum connection retries exceeded.")]
    MaxRetriesExceeded,
    #[error("gRPC request failed: {0}")]
    GrpcRequestFailed(#[from] Status),
}

/// Where `/predict` gets its detections from.
#[async_trait]
pub trait DetectionBackend: Send + Sync + 'static {
    async fn detect(
        &self,
        image_data: Vec<u8>,
    ) -> Result<Vec<LabeledDetection>, PredictionServiceError>;

    /// Known class names, indexed by class id.
    fn class_names(&self) -> Vec<String>;
}

pub struct PredictionService {
    client: DetectorClient<Channel>,
    class_labels: Vec<ColorLabel>,
}

impl PredictionService {
    pub async fn new(
        prediction_config: &PredictionServiceConfig,
    ) -> Result<Self, PredictionServiceError> {
        let mut client =
            Self::get_client(prediction_config.get_address(), prediction_config.max_retries)
                .await?;

        let labels = client
            .get_class_labels(Request::new(Empty {}))
            .await?
            .into_inner();
        tracing::info!("Fetched {} class labels", labels.class_labels.len());

        Ok(Self {
            client,
            class_labels: labels.class_labels,
        })
    }

    async fn get_client(
        address: String,
        max_retries: u32,
    ) -> Result<DetectorClient<Channel>, PredictionServiceError> {
        let mut retry_delay = Duration::from_millis(50);
        let max_retry_delay = Duration::from_secs(1);
        let mut retry_count = 0;

        while retry_count < max_retries {
            match timeout(
                Duration::from_secs(1),
                DetectorClient::connect(address.clone()),
            )
            .await
            {
                Ok(Ok(client)) => return Ok(client),
                Ok(Err(e)) => {
                    tracing::error!("Failed to connect to gRPC server: {:?}", e);
                }
                Err(_) => {
                    tracing::error!("Connection timeout");
                }
            }

            retry_count += 1;
            let jitter = rand::random::<f32>() * 0.2 + 0.9;
            sleep(retry_delay.mul_f32(jitter)).await;
            retry_delay = (retry_delay * 2).min(max_retry_delay);
        }

        Err(PredictionServiceError::MaxRetriesExceeded)
    }
}

pub fn label_detections(
    detections: Vec<BoundingBox>,
    class_labels: &[ColorLabel],
) -> Vec<LabeledDetection> {
    detections
        .into_iter()
        .map(|bbox| {
            let (class_label, color) = match class_labels.get(bbox.class_id as usize) {
                Some(color_label) => (
                    color_label.label.clone(),
                    [
                        color_label.red.min(255) as u8,
                        color_label.green.min(255) as u8,
                        color_label.blue.min(255) as u8,
                    ],
                ),
                None => (format!("Unknown class {}", bbox.class_id), [0, 0, 0]),
            };
            LabeledDetection {
                x1: bbox.x1,
                y1: bbox.y1,
                x2: bbox.x2,
                y2: bbox.y2,
                class_label,
                color,
                confidence: bbox.confidence,
            }
        })
        .collect()
}

#[async_trait]
impl DetectionBackend for PredictionService {
    #[instrument(skip(self, image_data))]
    async fn detect(
        &self,
        image_data: Vec<u8>,
    ) -> Result<Vec<LabeledDetection>, PredictionServiceError> {
        let mut client = self.client.clone();

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64;

        let request = Request::new(ImageFrame {
            image_data,
            timestamp,
        });

        let batch = client.detect(request).await?.into_inner();
        tracing::debug!(
            "Received {} detections for a {}x{} image",
            batch.detections.len(),
            batch.image_width,
            batch.image_height
        );

        Ok(label_detections(batch.detections, &self.class_labels))
    }

    fn class_names(&self) -> Vec<String> {
        self.class_labels
            .iter()
            .map(|label| label.label.clone())
            .collect()
    }
}
