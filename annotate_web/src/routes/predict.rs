use crate::{
    pipeline::{PipelineError, UploadedFile},
    server::SharedState,
};
use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use std::time::Instant;
use thiserror::Error;
use tracing::instrument;
use upload_panel::{api::ErrorBody, api::PredictionResponse, upload::FILE_FIELD};

#[derive(Error, Debug)]
pub enum PredictError {
    #[error("File not found")]
    FileNotFound,
    #[error("No file selected")]
    NoFileSelected,
    #[error("Failed to read upload: {0}")]
    Multipart(#[from] MultipartError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl PredictError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            PredictError::FileNotFound => (StatusCode::BAD_REQUEST, self.to_string()),
            PredictError::NoFileSelected => (StatusCode::BAD_REQUEST, self.to_string()),
            PredictError::Multipart(e) => (e.status(), e.body_text()),
            PredictError::Pipeline(PipelineError::InvalidImage(_)) => (
                StatusCode::BAD_REQUEST,
                "Uploaded file is not a valid image".to_string(),
            ),
            PredictError::Pipeline(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "An error occurred while processing the image".to_string(),
            ),
        }
    }
}

impl IntoResponse for PredictError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        if status.is_server_error() {
            tracing::error!("Prediction failed: {}", self);
        } else {
            tracing::warn!("Rejected upload: {}", self);
        }
        (status, Json(ErrorBody::new(message))).into_response()
    }
}

/// Pulls the `file` field out of the form. Other fields are skipped.
pub async fn read_file_field(multipart: &mut Multipart) -> Result<UploadedFile, PredictError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        if file_name.is_empty() {
            return Err(PredictError::NoFileSelected);
        }
        let bytes = field.bytes().await?;
        return Ok(UploadedFile { file_name, bytes });
    }
    Err(PredictError::FileNotFound)
}

#[instrument(skip(state, multipart))]
pub async fn predict(
    State(state): State<SharedState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictionResponse>, PredictError> {
    state.metrics.record_request("/predict");
    let started = Instant::now();

    let mut multipart = multipart.map_err(|rejection| {
        tracing::debug!("Request is not a multipart form: {}", rejection.body_text());
        PredictError::FileNotFound
    })?;
    let upload = read_file_field(&mut multipart).await?;
    let response = state.pipeline.process(upload).await?;

    state
        .metrics
        .record_prediction_duration(started.elapsed().as_millis() as u64, "/predict");
    state.metrics.record_detections(response.predictions.len());

    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tests::{cat, pipeline, png_bytes, MockBackend};
    use axum::{
        body::{to_bytes, Body},
        extract::FromRequest,
        http::{header::CONTENT_TYPE, Request},
    };

    const BOUNDARY: &str = "annotate-boundary";

    async fn multipart(parts: &[(&str, Option<&str>, &[u8])]) -> Multipart {
        let mut body = Vec::new();
        for (name, file_name, content) in parts {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            match file_name {
                Some(file_name) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                        name, file_name
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)
                        .as_bytes(),
                ),
            }
            body.extend_from_slice(content);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        let request = Request::builder()
            .method("POST")
            .uri("/predict")
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap();
        Multipart::from_request(request, &()).await.unwrap()
    }

    async fn error_body(error: PredictError) -> (StatusCode, ErrorBody) {
        let response = error.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_read_file_field_skips_other_fields() {
        let mut form = multipart(&[
            ("note", None, &b"hello"[..]),
            ("file", Some("cat.png"), &b"pixels"[..]),
        ])
        .await;

        let upload = read_file_field(&mut form).await.unwrap();

        assert_eq!(upload.file_name, "cat.png");
        assert_eq!(&upload.bytes[..], &b"pixels"[..]);
    }

    #[tokio::test]
    async fn test_missing_file_field_is_file_not_found() {
        let mut form = multipart(&[("note", None, &b"hello"[..])]).await;

        let error = read_file_field(&mut form).await.unwrap_err();
        let (status, body) = error_body(error).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "File not found");
    }

    #[tokio::test]
    async fn test_empty_file_name_is_no_file_selected() {
        let mut form = multipart(&[("file", Some(""), &b""[..])]).await;

        let error = read_file_field(&mut form).await.unwrap_err();
        let (status, body) = error_body(error).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "No file selected");
    }

    #[tokio::test]
    async fn test_invalid_image_is_a_client_error() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(
            dir.path(),
            MockBackend {
                detections: vec![cat()],
                fail: false,
            },
        )
        .await;
        let mut form = multipart(&[("file", Some("cat.png"), &b"garbage"[..])]).await;

        let upload = read_file_field(&mut form).await.unwrap();
        let error: PredictError = pipeline.process(upload).await.unwrap_err().into();
        let (status, body) = error_body(error).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "Uploaded file is not a valid image");
    }

    #[tokio::test]
    async fn test_backend_failure_hides_details() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(
            dir.path(),
            MockBackend {
                detections: vec![],
                fail: true,
            },
        )
        .await;
        let png = png_bytes();
        let mut form = multipart(&[("file", Some("cat.png"), &png[..])]).await;

        let upload = read_file_field(&mut form).await.unwrap();
        let error: PredictError = pipeline.process(upload).await.unwrap_err().into();
        let (status, body) = error_body(error).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error, "An error occurred while processing the image");
    }
}
