use crate::{
    annotate::{decode_rgb, encode_png, AnnotateError, Annotator},
    charts::chart_data_url,
    prediction::{DetectionBackend, PredictionServiceError},
    uploads::{StorageError, UploadStore},
};
use axum::body::Bytes;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;
use upload_panel::api::PredictionResponse;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Uploaded file is not a valid image: {0}")]
    InvalidImage(AnnotateError),
    #[error("Prediction service failed: {0}")]
    Inference(#[from] PredictionServiceError),
    #[error("Storage failed: {0}")]
    Storage(#[from] StorageError),
    #[error("Annotation failed: {0}")]
    Annotation(AnnotateError),
    #[error("Image task failed: {0}")]
    Blocking(#[from] tokio::task::JoinError),
}

/// One uploaded file as received from the client.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub bytes: Bytes,
}

/// Everything `/predict` needs to turn an upload into a response.
pub struct Pipeline {
    pub backend: Arc<dyn DetectionBackend>,
    pub store: UploadStore,
    pub annotator: Annotator,
}

impl Pipeline {
    pub fn new(backend: Arc<dyn DetectionBackend>, store: UploadStore, annotator: Annotator) -> Self {
        Self {
            backend,
            store,
            annotator,
        }
    }

    /// Decodes, stores, detects, annotates and charts one upload.
    #[instrument(skip(self, upload), fields(file_name = %upload.file_name, size = upload.bytes.len()))]
    pub async fn process(&self, upload: UploadedFile) -> Result<PredictionResponse, PipelineError> {
        let names = self.store.names_for(&upload.file_name);

        let bytes = upload.bytes.clone();
        let image = tokio::task::spawn_blocking(move || decode_rgb(&bytes))
            .await?
            .map_err(PipelineError::InvalidImage)?;
        let (width, height) = image.dimensions();

        let original_image_url = self.store.save(&names.original, &upload.bytes).await?;

        let detections = self.backend.detect(upload.bytes.to_vec()).await?;
        tracing::info!(
            "Detected {} objects in a {}x{} image",
            detections.len(),
            width,
            height
        );

        let annotator = self.annotator.clone();
        let drawn = detections.clone();
        let (marked_png, graph_url) = tokio::task::spawn_blocking(move || {
            let mut marked = image;
            annotator.annotate(&mut marked, &drawn);
            let marked_png = encode_png(&marked)?;
            let graph_url = chart_data_url(&drawn, width, height, annotator.font())?;
            Ok::<_, AnnotateError>((marked_png, graph_url))
        })
        .await?
        .map_err(PipelineError::Annotation)?;

        let marked_image_url = self.store.save(&names.marked, &marked_png).await?;

        Ok(PredictionResponse {
            predictions: detections.iter().map(|d| d.to_wire()).collect(),
            original_image_url,
            marked_image_url,
            graph_url,
            error: None,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{config::AnnotationConfig, detection::LabeledDetection};
    use image::RgbImage;
    use tonic::{async_trait, Status};

    pub struct MockBackend {
        pub detections: Vec<LabeledDetection>,
        pub fail: bool,
    }

    #[async_trait]
    impl DetectionBackend for MockBackend {
        async fn detect(
            &self,
            _image_data: Vec<u8>,
        ) -> Result<Vec<LabeledDetection>, PredictionServiceError> {
            if self.fail {
                return Err(PredictionServiceError::GrpcRequestFailed(Status::internal(
                    "model exploded",
                )));
            }
            Ok(self.detections.clone())
        }

        fn class_names(&self) -> Vec<String> {
            vec!["cat".to_string(), "dog".to_string()]
        }
    }

    pub fn cat() -> LabeledDetection {
        LabeledDetection {
            x1: 10.2,
            y1: 10.0,
            x2: 50.0,
            y2: 59.7,
            class_label: "cat".to_string(),
            color: [255, 0, 0],
            confidence: 0.9123,
        }
    }

    pub fn png_bytes() -> Bytes {
        Bytes::from(encode_png(&RgbImage::new(100, 80)).unwrap())
    }

    pub async fn pipeline(dir: &std::path::Path, backend: MockBackend) -> Pipeline {
        Pipeline::new(
            Arc::new(backend),
            UploadStore::new(dir).await.unwrap(),
            Annotator::new(&AnnotationConfig::default()).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_process_stores_images_and_reports_detections() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(
            dir.path(),
            MockBackend {
                detections: vec![cat()],
                fail: false,
            },
        )
        .await;

        let response = pipeline
            .process(UploadedFile {
                file_name: "my cat.png".to_string(),
                bytes: png_bytes(),
            })
            .await
            .unwrap();

        assert_eq!(response.predictions.len(), 1);
        let prediction = &response.predictions[0];
        assert_eq!(prediction.class_name, "cat");
        assert_eq!(prediction.confidence, 91.23);
        assert_eq!(prediction.coordinates.x1, 10.0);
        assert_eq!(prediction.coordinates.y2, 60.0);

        assert!(response.original_image_url.starts_with("/uploads/original_"));
        assert!(response.original_image_url.ends_with("_my_cat.png"));
        assert!(response.marked_image_url.starts_with("/uploads/marked_"));
        assert!(response.marked_image_url.ends_with("_my_cat.png"));
        assert!(response
            .graph_url
            .as_deref()
            .unwrap()
            .starts_with("data:image/png;base64,"));
        assert!(response.error.is_none());

        let stored: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(stored.len(), 2);

        let marked_name = response.marked_image_url.trim_start_matches("/uploads/");
        let marked = image::open(dir.path().join(marked_name)).unwrap();
        assert_eq!((marked.width(), marked.height()), (100, 80));
    }

    #[tokio::test]
    async fn test_process_without_detections_has_no_chart() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(
            dir.path(),
            MockBackend {
                detections: vec![],
                fail: false,
            },
        )
        .await;

        let response = pipeline
            .process(UploadedFile {
                file_name: "empty.png".to_string(),
                bytes: png_bytes(),
            })
            .await
            .unwrap();

        assert!(response.predictions.is_empty());
        assert!(response.graph_url.is_none());
    }

    #[tokio::test]
    async fn test_process_rejects_non_images_before_storing() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(
            dir.path(),
            MockBackend {
                detections: vec![],
                fail: false,
            },
        )
        .await;

        let result = pipeline
            .process(UploadedFile {
                file_name: "notes.png".to_string(),
                bytes: Bytes::from_static(b"not an image at all"),
            })
            .await;

        assert!(matches!(result, Err(PipelineError::InvalidImage(_))));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_process_surfaces_backend_failures() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(
            dir.path(),
            MockBackend {
                detections: vec![],
                fail: true,
            },
        )
        .await;

        let result = pipeline
            .process(UploadedFile {
                file_name: "cat.png".to_string(),
                bytes: png_bytes(),
            })
            .await;

        assert!(matches!(result, Err(PipelineError::Inference(_))));
    }
}
