use crate::{page::index_page, server::SharedState};
use axum::{extract::State, response::Html};
use tracing::instrument;

#[instrument(skip(state))]
pub async fn index(State(state): State<SharedState>) -> Html<String> {
    state.metrics.record_request("/");
    let class_names = state.pipeline.backend.class_names();
    Html(index_page(&class_names))
}
