pub mod sort;
pub mod stats;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::tracer::IpFamily;

use self::sort::SortSpec;
use self::stats::{AtomicTable, ConnStats, TableWriter};

/// Callback invoked with each tick's snapshot.
pub type SnapshotFn = Box<dyn Fn(Vec<ConnStats>) + Send + Sync>;

/// Validated sampler configuration.
///
/// Construction is the Stopped -> Configured transition: every parameter
/// arrives in the host framework's string form and bad values are rejected
/// here, never at tick time.
#[derive(Debug, Clone)]
pub struct TopConfig {
    pub max_rows: usize,
    pub interval: Duration,
    pub sort: SortSpec,
    /// Restrict the snapshot to one process. `None` = unfiltered.
    pub target_pid: Option<u32>,
    /// Restrict the snapshot to one IP family. `None` = unfiltered.
    pub target_family: Option<IpFamily>,
}

impl TopConfig {
    /// Validate raw parameter values. `target_pid` 0 and an empty
    /// `target_family` mean unfiltered.
    pub fn new(
        max_rows: usize,
        interval: Duration,
        sort_by: &str,
        target_pid: u32,
        target_family: &str,
    ) -> Result<Self> {
        if max_rows == 0 {
            bail!("max-rows must be greater than 0");
        }

        if interval.is_zero() {
            bail!("interval must be greater than 0");
        }

        let sort = SortSpec::parse(sort_by).context("parsing sort-by")?;
        let target_family =
            IpFamily::parse_param(target_family).context("parsing target family")?;

        Ok(Self {
            max_rows,
            interval,
            sort,
            target_pid: (target_pid != 0).then_some(target_pid),
            target_family,
        })
    }
}

struct Running {
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

/// Periodic top-K sampler over a live per-connection counter table.
///
/// Owns the table; the tracer side writes through a [`TableWriter`]. Each
/// timer tick atomically rotates the table (non-cumulative: "top over this
/// interval"), filters, sorts, truncates to `max_rows`, and hands the
/// snapshot to the configured callback.
pub struct TopSampler {
    cfg: TopConfig,
    table: Arc<AtomicTable>,
    running: parking_lot::Mutex<Option<Running>>,
}

impl TopSampler {
    /// Create a configured sampler.
    pub fn new(cfg: TopConfig) -> Self {
        Self {
            cfg,
            table: Arc::new(AtomicTable::new()),
            running: parking_lot::Mutex::new(None),
        }
    }

    /// Writer handle for the tracer side.
    pub fn writer(&self) -> TableWriter {
        TableWriter::new(Arc::clone(&self.table))
    }

    /// Arm the repeating tick timer (Configured -> Running). Rejected if
    /// already running.
    pub fn start(&self, ctx: CancellationToken, on_snapshot: SnapshotFn) -> Result<()> {
        let mut running = self.running.lock();
        if running.is_some() {
            bail!("sampler already running");
        }

        let cancel = ctx.child_token();
        let table = Arc::clone(&self.table);
        let cfg = self.cfg.clone();

        info!(
            max_rows = cfg.max_rows,
            interval = ?cfg.interval,
            target_pid = ?cfg.target_pid,
            target_family = ?cfg.target_family,
            "sampler started",
        );

        let tick_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cfg.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // Consume the immediate first tick; the first snapshot should
            // cover one full interval.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = tick_cancel.cancelled() => {
                        debug!("sampler tick loop stopped");
                        return;
                    }
                    _ = ticker.tick() => {
                        let snapshot = take_snapshot(&table, &cfg);
                        on_snapshot(snapshot);
                    }
                }
            }
        });

        *running = Some(Running { cancel, task });

        Ok(())
    }

    /// Disarm the timer and release the live table (Running -> Stopped).
    ///
    /// Waits for the tick task to finish, so no tick fires after this
    /// returns. Safe to call from any task; idempotent.
    pub async fn stop(&self) {
        let running = { self.running.lock().take() };

        let Some(running) = running else {
            return;
        };

        running.cancel.cancel();
        if let Err(e) = running.task.await {
            tracing::warn!(error = %e, "sampler task join failed");
        }

        self.table.take();
        info!("sampler stopped");
    }

    /// Perform one sampling pass immediately, outside the timer.
    pub fn sample_now(&self) -> Vec<ConnStats> {
        take_snapshot(&self.table, &self.cfg)
    }
}

/// Rotate the live table and build the sorted, filtered, truncated snapshot.
fn take_snapshot(table: &AtomicTable, cfg: &TopConfig) -> Vec<ConnStats> {
    let Some(old) = table.rotate() else {
        return Vec::new();
    };

    let mut rows = old.to_stats();

    rows.retain(|row| {
        if let Some(pid) = cfg.target_pid {
            if row.pid != pid {
                return false;
            }
        }
        if let Some(family) = cfg.target_family {
            if row.family != family {
                return false;
            }
        }
        true
    });

    cfg.sort.sort(&mut rows);
    rows.truncate(cfg.max_rows);

    rows
}
