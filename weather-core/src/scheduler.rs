//! Background polling of a fixed city list.
//!
//! The first tick fires as soon as the task starts and always runs, even if
//! the scheduler is stopped before the task is first polled. Later ticks follow
//! the configured period measured from tick start and never burst to catch up.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::coordinator::FetchCoordinator;
use crate::error::WeatherError;

/// Outcome of one pass over the configured cities.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub refreshed: Vec<String>,
    /// City and error message for every failed refresh.
    pub failed: Vec<(String, String)>,
}

/// Handle to a running polling task. Stopping is terminal.
pub struct PollingScheduler {
    cities: Arc<[String]>,
    period: Duration,
    shutdown: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PollingScheduler {
    /// Spawn the polling task on the current tokio runtime.
    pub fn start(
        coordinator: Arc<FetchCoordinator>,
        cities: Vec<String>,
        period: Duration,
    ) -> Result<Self, WeatherError> {
        if period.is_zero() {
            return Err(WeatherError::Config("polling period must be > 0".into()));
        }

        let cities: Arc<[String]> = cities.into();
        let (shutdown, rx) = watch::channel(false);
        let handle = tokio::spawn(poll_loop(coordinator, cities.clone(), period, rx));

        info!(
            cities = cities.len(),
            period_secs = period.as_secs(),
            "polling started"
        );

        Ok(Self {
            cities,
            period,
            shutdown,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Prevent any further ticks. A tick already in progress may finish.
    /// Calling this more than once is a no-op.
    pub fn stop(&self) {
        let already_stopped = self.shutdown.send_replace(true);
        if !already_stopped {
            info!("polling stopped");
        }
    }

    /// Stop and wait for the polling task to exit.
    pub async fn shutdown(&self) {
        self.stop();
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "polling task ended abnormally");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        !*self.shutdown.borrow()
    }

    pub fn cities(&self) -> &[String] {
        &self.cities
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl Drop for PollingScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn poll_loop(
    coordinator: Arc<FetchCoordinator>,
    cities: Arc<[String]>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // The first tick completes immediately and always runs, even when stop()
    // raced ahead of the task's first poll.
    interval.tick().await;
    log_tick(&run_tick(&coordinator, &cities).await);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = interval.tick() => {}
        }
        if *shutdown.borrow() {
            break;
        }

        log_tick(&run_tick(&coordinator, &cities).await);
    }

    debug!("polling loop exited");
}

fn log_tick(report: &TickReport) {
    info!(
        refreshed = report.refreshed.len(),
        failed = report.failed.len(),
        "polling tick complete"
    );
}

/// Refresh every city in order. Failures are logged and collected; they never
/// stop the pass.
pub(crate) async fn run_tick(coordinator: &FetchCoordinator, cities: &[String]) -> TickReport {
    let mut report = TickReport::default();

    for city in cities {
        match coordinator.refresh(city).await {
            Ok(_) => {
                debug!(city = %city, "polling refreshed");
                report.refreshed.push(city.clone());
            }
            Err(e) => {
                warn!(city = %city, error = %e, "polling refresh failed");
                report.failed.push((city.clone(), e.to_string()));
            }
        }
    }

    report
}

// ------------------------------------------------------------------ //
//  Tests                                                              //
// ------------------------------------------------------------------ //
