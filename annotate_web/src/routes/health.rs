use crate::server::SharedState;
use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};

const AVAILABLE: &str = "Available";

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct Health {
    status: String,
}

impl Health {
    fn available() -> Self {
        Self {
            status: AVAILABLE.to_string(),
        }
    }
}

pub async fn healthcheck(State(state): State<SharedState>) -> Json<Health> {
    state.metrics.record_request("/health");
    Json(Health::available())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_body() {
        let body = serde_json::to_string(&Health::available()).unwrap();

        assert_eq!(body, r#"{"status":"Available"}"#);
    }
}
