mod annotate;
mod charts;
mod detection;
mod page;
mod pipeline;
mod prediction;
mod routes;
mod server;
mod telemetry;
mod uploads;

pub mod app;
pub mod config;

pub use app::start_app;
