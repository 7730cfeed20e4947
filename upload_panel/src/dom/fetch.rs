use crate::{
    api::{parse_prediction_body, ApiError, PredictionResponse},
    upload::{FILE_FIELD, PREDICT_ENDPOINT},
};
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{AbortSignal, File, FormData, Request, RequestInit, Response};

fn transport(err: JsValue) -> ApiError {
    ApiError::Transport(format!("{:?}", err))
}

/// POSTs `file` as multipart field `file` and parses whatever comes back,
/// whatever the status code.
pub async fn post_image(
    file: &File,
    signal: &AbortSignal,
) -> Result<PredictionResponse, ApiError> {
    let window = web_sys::window().ok_or_else(|| ApiError::Transport("no window".into()))?;

    let form = FormData::new().map_err(transport)?;
    form.append_with_blob_and_filename(FILE_FIELD, file, &file.name())
        .map_err(transport)?;

    let init = RequestInit::new();
    init.set_method("POST");
    init.set_body(&form.into());
    init.set_signal(Some(signal));

    let request = Request::new_with_str_and_init(PREDICT_ENDPOINT, &init).map_err(transport)?;
    let response: Response = JsFuture::from(window.fetch_with_request(&request))
        .await
        .map_err(transport)?
        .dyn_into()
        .map_err(transport)?;

    if !response.ok() {
        tracing::warn!("{} answered with status {}", PREDICT_ENDPOINT, response.status());
    }

    let body = JsFuture::from(response.text().map_err(transport)?)
        .await
        .map_err(transport)?
        .as_string()
        .ok_or_else(|| ApiError::InvalidBody("body is not text".into()))?;

    parse_prediction_body(&body)
}
