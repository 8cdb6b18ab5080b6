use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

use crate::logging::Logger;
use crate::orchestrator::{RunReport, ScrapeOrchestrator, StationRegistry};
use crate::report::ReportSource;
use crate::upsert::ReadingStore;

/// Runs immediately, then once per `every`, until `shutdown` resolves.
///
/// A run is always awaited before the next tick is taken, so runs never
/// overlap; ticks missed while a run was in progress are dropped. Shutdown is
/// only observed between runs. Returns the number of runs started.
pub async fn run_schedule<R, F, S>(
    orchestrator: &ScrapeOrchestrator<R, F, S>,
    every: Duration,
    shutdown: impl Future<Output = ()>,
) -> usize
where
    R: StationRegistry,
    F: ReportSource,
    S: ReadingStore,
{
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    let mut runs = 0usize;
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                Logger::new().count(runs).info("scheduler.stopped", "Shutdown requested");
                break;
            }
            _ = ticker.tick() => {}
        }

        runs += 1;
        run_and_log(orchestrator).await;
    }
    runs
}

/// One full run; a run-level failure is logged, never propagated.
pub async fn run_and_log<R, F, S>(orchestrator: &ScrapeOrchestrator<R, F, S>) -> Option<RunReport>
where
    R: StationRegistry,
    F: ReportSource,
    S: ReadingStore,
{
    match orchestrator.run_once().await {
        Ok(report) => Some(report),
        Err(err) => {
            Logger::new().error("run.aborted", &err, "Scrape run aborted");
            None
        }
    }
}
