// Maternal health risk prediction service

mod config;
mod http;
mod model;
mod predict;
mod types;

use std::sync::Arc;

use tokio::sync::oneshot;

use crate::config::ServiceConfig;
use crate::http::ApiState;
use crate::model::{load_model, Classifier};
use crate::predict::PredictionService;

fn main() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();

    if let Err(error) = run_console() {
        log::error!("[RISK] {}", error);
        std::process::exit(1);
    }
}

fn run_console() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServiceConfig::from_env();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            if let Err(error) = tokio::signal::ctrl_c().await {
                log::error!("[RISK] Failed to listen for shutdown: {}", error);
            }
            let _ = shutdown_tx.send(());
        });

        let state = ApiState {
            service: Arc::new(PredictionService::new(initial_model(&config))),
            config: Arc::new(config),
        };

        crate::http::serve(state, async move {
            let _ = shutdown_rx.await;
            log::info!("[RISK] Shutting down gracefully...");
        })
        .await
    })
}

/// Loads the classifier once; a failure leaves the service running without one.
fn initial_model(config: &ServiceConfig) -> Option<Arc<dyn Classifier>> {
    match load_model(&config.model_path) {
        Ok(model) => {
            log::info!(
                "[MODEL] Loaded {} with {} classes from {}",
                model.kind(),
                model.labels().len(),
                config.model_path.display()
            );
            Some(Arc::new(model))
        }
        Err(error) => {
            log::error!("[MODEL] Error loading model: {}", error);
            None
        }
    }
}
