use anyhow::Result;
use log::{error, info, warn};
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Runs `refresh` every `period` on its own task until `shutdown` resolves.
///
/// A tick that arrives while the previous refresh is still running is
/// skipped. On shutdown the in-flight refresh is aborted, so a long fetch
/// never delays exit.
pub async fn run_refresh_loop<F, Fut, S>(period: Duration, refresh: F, shutdown: S)
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<()>> + Send + 'static,
    S: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(period);
    // first tick fires immediately
    ticker.tick().await;

    tokio::pin!(shutdown);
    let mut in_flight: Option<JoinHandle<()>> = None;

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                if let Some(task) = in_flight.take() {
                    if !task.is_finished() {
                        info!("Aborting refresh in progress");
                        task.abort();
                    }
                }
                break;
            }
            _ = ticker.tick() => {
                if in_flight.as_ref().is_some_and(|t| !t.is_finished()) {
                    warn!("Previous refresh still running, skipping this tick");
                    continue;
                }
                let run = refresh();
                in_flight = Some(tokio::spawn(async move {
                    if let Err(e) = run.await {
                        error!("Refresh failed, keeping previous results: {:?}", e);
                    }
                }));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{sleep, timeout};

    #[tokio::test]
    async fn test_refreshes_on_each_tick() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();

        run_refresh_loop(
            Duration::from_millis(10),
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
            sleep(Duration::from_millis(120)),
        )
        .await;

        assert!(runs.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_shutdown_is_not_blocked_by_slow_refresh() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();

        let finished = timeout(
            Duration::from_secs(2),
            run_refresh_loop(
                Duration::from_millis(10),
                move || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        sleep(Duration::from_secs(60)).await;
                        Ok(())
                    }
                },
                sleep(Duration::from_millis(100)),
            ),
        )
        .await;

        assert!(finished.is_ok());
        // later ticks were skipped while the first refresh ran
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_refresh_does_not_stop_the_loop() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();

        run_refresh_loop(
            Duration::from_millis(10),
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(anyhow::anyhow!("exchange unavailable"))
                }
            },
            sleep(Duration::from_millis(120)),
        )
        .await;

        assert!(runs.load(Ordering::SeqCst) >= 2);
    }
}
