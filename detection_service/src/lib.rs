//! gRPC object detection service backed by ONNX Runtime.

mod inference_service;
mod model_service;
mod ort_service;
mod server;
mod state;

pub mod config;

pub use model_service::ModelService;
pub use server::start_server;
