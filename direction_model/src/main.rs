use anyhow::Result;
use data_ingestion::logger::init_logger;
use data_ingestion::{AppConfig, CandleStore};
use direction_model::server::{AppState, Server};
use direction_model::scheduler::run_refresh_loop;
use direction_model::{PipelineOutput, run_pipeline};
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

fn report(output: &PipelineOutput) {
    output.report.log();
    match &output.prediction {
        Some(p) => info!(
            "{} as of {}: P(up on {}) = {:.4} -> {:?}",
            p.symbol, p.as_of, p.target_date, p.p_up, p.direction
        ),
        None => warn!("No closed day without a label; nothing to forecast"),
    }
}

struct Pipeline {
    config: AppConfig,
    store: CandleStore,
    state: AppState,
}

impl Pipeline {
    fn new(config: AppConfig) -> Result<Self> {
        let store = CandleStore::new(&config)?;
        Ok(Self {
            config,
            store,
            state: AppState::default(),
        })
    }

    async fn refresh(&self, fresh: bool) -> Result<()> {
        let output = run_pipeline(&self.config, &self.store, fresh).await?;
        report(&output);
        output.artifact.save(&self.config.model.artifact_path)?;
        self.state.update(output.prediction, output.report);
        Ok(())
    }

    async fn serve(self: Arc<Self>) -> Result<()> {
        let server = Server::init(self.state.clone(), self.config.server.bind.clone());
        let mut server_task = tokio::spawn(async move { server.run().await });

        let period = Duration::from_secs(self.config.server.refresh_interval_seconds.max(1));
        let pipeline = self.clone();
        let refresh = move || {
            let pipeline = pipeline.clone();
            async move { pipeline.refresh(true).await }
        };
        let shutdown = async {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {:?}", e);
            }
            info!("Received shutdown signal, initiating graceful shutdown");
        };

        tokio::select! {
            // Scheduled refreshes until Ctrl-C
            _ = run_refresh_loop(period, refresh, shutdown) => {
                server_task.abort();
            }
            // API Server
            res = &mut server_task => {
                match res {
                    Ok(Err(e)) => error!("Server failed: {:?}", e),
                    Err(e) => error!("Server task aborted: {:?}", e),
                    Ok(Ok(())) => info!("Server stopped"),
                }
            }
        }

        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logger();

    let config = AppConfig::from_env()?;
    let serve = config.server.enabled;
    let pipeline = Arc::new(Pipeline::new(config)?);

    pipeline.refresh(false).await?;

    if serve {
        pipeline.serve().await?;
        info!("Pipeline has been shut down gracefully");
    }

    Ok(())
}
