//! Wire format of `POST /predict`, shared by the panel and the web front.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Box corners in pixels of the original, unscaled image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl Coordinates {
    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(rename = "class")]
    pub class_name: String,
    /// Percentage in `0..=100`.
    pub confidence: f64,
    pub coordinates: Coordinates,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub predictions: Vec<Detection>,
    pub original_image_url: String,
    pub marked_image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Body of every failed `/predict` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("Request failed: {0}")]
    Transport(String),
    #[error("Invalid response body: {0}")]
    InvalidBody(String),
    #[error("Server reported an error: {0}")]
    Server(String),
}

/// Parses a `/predict` body. A body carrying `error` is a failure whatever
/// the HTTP status was. Anything else must be a complete response.
pub fn parse_prediction_body(body: &str) -> Result<PredictionResponse, ApiError> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| ApiError::InvalidBody(e.to_string()))?;

    if let Some(error) = value.get("error").filter(|error| !error.is_null()) {
        let message = match error.as_str() {
            Some(message) => message.to_string(),
            None => error.to_string(),
        };
        return Err(ApiError::Server(message));
    }

    serde_json::from_value(value).map_err(|e| ApiError::InvalidBody(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_success_body() {
        let body = r#"{
            "predictions": [
                {"class": "cat", "confidence": 91, "coordinates": {"x1": 10, "y1": 10, "x2": 50, "y2": 60}}
            ],
            "original_image_url": "/uploads/original_cat.jpg",
            "marked_image_url": "/uploads/marked_cat.png",
            "graph_url": "data:image/png;base64,AAAA"
        }"#;

        let response = parse_prediction_body(body).unwrap();

        assert_eq!(response.predictions.len(), 1);
        assert_eq!(response.predictions[0].class_name, "cat");
        assert_eq!(response.predictions[0].confidence, 91.0);
        assert_eq!(response.predictions[0].coordinates.width(), 40.0);
        assert_eq!(response.predictions[0].coordinates.height(), 50.0);
        assert_eq!(response.graph_url.as_deref(), Some("data:image/png;base64,AAAA"));
    }

    #[test]
    fn test_parse_error_field_is_failure() {
        let err = parse_prediction_body(r#"{"error": "model failed"}"#).unwrap_err();
        assert_eq!(err, ApiError::Server("model failed".to_string()));
    }

    #[test]
    fn test_parse_rejects_objects_missing_required_fields() {
        for body in [r#"{}"#, r#"{"detail": "Not Found"}"#, r#"{"predictions": []}"#] {
            let err = parse_prediction_body(body).unwrap_err();
            assert!(matches!(err, ApiError::InvalidBody(_)), "{} gave {:?}", body, err);
        }
    }

    #[test]
    fn test_parse_null_error_with_full_body_is_success() {
        let body = r#"{
            "predictions": [],
            "original_image_url": "/uploads/original_a.png",
            "marked_image_url": "/uploads/marked_a.png",
            "error": null
        }"#;

        let response = parse_prediction_body(body).unwrap();

        assert!(response.predictions.is_empty());
        assert!(response.graph_url.is_none());
    }

    #[test]
    fn test_parse_rejects_non_json() {
        let err = parse_prediction_body("<html>502 Bad Gateway</html>").unwrap_err();
        assert!(matches!(err, ApiError::InvalidBody(_)));
    }

    #[test]
    fn test_serialized_response_uses_wire_names() {
        let response = PredictionResponse {
            predictions: vec![Detection {
                class_name: "dog".to_string(),
                confidence: 87.5,
                coordinates: Coordinates {
                    x1: 1.0,
                    y1: 2.0,
                    x2: 3.0,
                    y2: 4.0,
                },
            }],
            original_image_url: "/uploads/original_a.png".to_string(),
            marked_image_url: "/uploads/marked_a.png".to_string(),
            graph_url: None,
            error: None,
        };

        let value = serde_json::to_value(&response).unwrap();

        assert_eq!(value["predictions"][0]["class"], "dog");
        assert!(value.get("graph_url").is_none());
        assert!(value.get("error").is_none());
    }
}
