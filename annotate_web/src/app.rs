use crate::{
    annotate::Annotator, config::Config, pipeline::Pipeline, prediction::PredictionService,
    server::HttpServer, uploads::UploadStore,
};
use std::sync::Arc;
use tokio::{signal, sync::broadcast};

pub async fn start_app(config: Config) -> anyhow::Result<()> {
    let prediction_service = match PredictionService::new(&config.prediction_service).await {
        Ok(service) => Arc::new(service),
        Err(e) => {
            tracing::error!("Failed to initialize prediction service: {:?}", e);
            return Err(e.into());
        }
    };

    let store = UploadStore::new(&config.uploads.directory).await?;
    let annotator = Annotator::new(&config.annotation)?;
    let pipeline = Arc::new(Pipeline::new(prediction_service, store, annotator));

    let server = HttpServer::new(pipeline, &config).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let server_handle = server.run(shutdown_tx.subscribe()).await?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    let _ = shutdown_tx.send(());
    server_handle.await??;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {:?}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {:?}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
