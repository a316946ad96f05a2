//! Bulk history synchronization.
//!
//! A sync task owns a half-open range `[b, e)`; `e == 0` means follow the
//! tip (task 0 only). A task whose remaining workload exceeds the configured
//! maximum splits off the head as a new forked task and keeps only the tail
//! inline; this load-balancing fork bounds per-task memory and time and is
//! distinct from the fetcher's retry fork. Windows of `bulk_fetch_limit`
//! blocks are pulled, stored, and verified for completeness; a window that
//! cannot be completed after the verification budget is redone from scratch
//! with fresh connections, a bounded number of times.

use super::config;
use super::verify::{expected_ids, verify_and_store};
use super::SyncError;
use crate::client::{ClientPool, NodeClient, NodeRole};
use crate::governor::{Governor, QuiescenceSampler};
use futures::future::BoxFuture;
use metrics::SharedMetrics;
use std::sync::Arc;
use std::time::Duration;
use store::DurableStore;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Clone, Copy, Debug)]
pub struct SyncConfig {
    pub bulk_fetch_limit: u64,
    /// Task error ceiling; reaching it redoes the current window with fresh
    /// connections.
    pub max_task_errors: u32,
    /// Remaining workload above which the head range is forked off.
    pub max_workload: u64,
    /// Full-task redos before giving up.
    pub max_task_restarts: u32,
    pub tip_poll_interval: Duration,
    pub quiescent_samples: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            bulk_fetch_limit: config::BULK_FETCH_LIMIT,
            max_task_errors: config::MAX_TASK_ERRORS,
            max_workload: config::DEFAULT_MAX_WORKLOAD,
            max_task_restarts: config::MAX_TASK_RESTARTS,
            tip_poll_interval: config::TIP_POLL_INTERVAL,
            quiescent_samples: config::QUIESCENT_SAMPLES,
        }
    }
}

pub struct SyncDriver {
    pool: Arc<dyn ClientPool>,
    store: Arc<dyn DurableStore>,
    governor: Governor,
    config: SyncConfig,
    metrics: SharedMetrics,
}

impl SyncDriver {
    pub fn new(
        pool: Arc<dyn ClientPool>,
        store: Arc<dyn DurableStore>,
        governor: Governor,
        config: SyncConfig,
        metrics: SharedMetrics,
    ) -> Arc<Self> {
        Arc::new(Self {
            pool,
            store,
            governor,
            config,
            metrics,
        })
    }

    pub fn governor(&self) -> &Governor {
        &self.governor
    }

    /// Fire-and-forget entry point; failures are logged.
    pub fn spawn_range(self: &Arc<Self>, task_id: u32, start: u64, end: u64) {
        let driver = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = driver.run_range(task_id, start, end).await {
                error!(task_id, %err, "sync task failed");
            }
        });
    }

    /// Sync `[start, end)`, or follow the tip when `end == 0`.
    ///
    /// Boxed so the load-balancing fork can spawn the driver recursively, the
    /// same way fetcher branches fork themselves.
    pub fn run_range(
        self: Arc<Self>,
        task_id: u32,
        start: u64,
        end: u64,
    ) -> BoxFuture<'static, Result<(), SyncError>> {
        Box::pin(async move {
            let _slot = self.governor.enter();
            let started = Instant::now();
            let first_block = start;
            let mut b = start;
            let mut restarts: u32 = 0;

            'task: loop {
                // Fresh connections per attempt; a redo must not reuse the
                // endpoints that just failed it.
                let client = self.pool.random_client(NodeRole::Raw);
                let solid = self.pool.random_client(NodeRole::Solid);

                let mut tip = match solid.fetch_tip_info().await {
                    Ok(tip) if tip.number > 0 => tip.number,
                    _ => {
                        restarts += 1;
                        if restarts > self.config.max_task_restarts {
                            return Err(SyncError::TaskExhausted { task_id });
                        }
                        tokio::time::sleep(config::backoff_delay(restarts)).await;
                        continue 'task;
                    }
                };

                b = self.check_fork(task_id, tip, b, end);
                info!(task_id, b, end, tip, "sync task running");

                let mut err_cnt: u32 = 0;
                let mut sampler = QuiescenceSampler::new(self.config.quiescent_samples);

                loop {
                    if err_cnt >= self.config.max_task_errors {
                        restarts += 1;
                        if restarts > self.config.max_task_restarts {
                            return Err(SyncError::TaskExhausted { task_id });
                        }
                        warn!(task_id, b, restarts, "error ceiling reached, redoing window");
                        tokio::time::sleep(config::backoff_delay(restarts)).await;
                        continue 'task;
                    }

                    if end > 0 && b >= end {
                        break;
                    }

                    if end == 0 && b >= tip {
                        // Caught up: poll the tip and finish only once no
                        // other sync task has been active for several
                        // consecutive samples.
                        tokio::time::sleep(self.config.tip_poll_interval).await;
                        match solid.fetch_tip_info().await {
                            Ok(info) if info.number > 0 => tip = info.number,
                            _ => err_cnt += 1,
                        }
                        if b < tip {
                            sampler.reset();
                            continue;
                        }
                        if sampler.observe(self.governor.current_load()) {
                            info!(task_id, b, "caught up and quiescent");
                            break;
                        }
                        continue;
                    }

                    let window_end = (b + self.config.bulk_fetch_limit)
                        .min(if end > 0 { end } else { tip });

                    let window_started = Instant::now();
                    match client.fetch_block_range(b, window_end).await {
                        Err(err) => {
                            warn!(task_id, b, window_end, %err, "bulk fetch failed");
                            err_cnt += 1;
                        }
                        Ok(blocks) if blocks.is_empty() => {
                            // A node that answers with nothing is as useless
                            // as one that errors; do not spin on it.
                            warn!(task_id, b, window_end, "bulk fetch returned no blocks");
                            err_cnt += 1;
                        }
                        Ok(blocks) => {
                            let budget = self.config.max_task_errors.saturating_sub(err_cnt);
                            match verify_and_store(
                                &self.store,
                                &client,
                                &self.metrics,
                                blocks,
                                expected_ids(b, window_end),
                                budget,
                            )
                            .await
                            {
                                Ok(()) => {
                                    self.metrics.observe_bulk_window_time(
                                        window_started.elapsed().as_secs_f64(),
                                    );
                                    debug!(task_id, from = b, to = window_end, "window verified");
                                    b = window_end;
                                }
                                Err(err) => {
                                    warn!(task_id, b, window_end, %err, "window verification failed");
                                    err_cnt = self.config.max_task_errors;
                                }
                            }
                        }
                    }
                }

                info!(
                    task_id,
                    first_block,
                    last_block = b,
                    elapsed = ?started.elapsed(),
                    "sync task finished"
                );
                return Ok(());
            }
        })
    }

    /// Split off the head range as a forked task when the remaining workload
    /// is too large, returning the new inline starting point.
    fn check_fork(self: &Arc<Self>, task_id: u32, tip: u64, b: u64, e: u64) -> u64 {
        let bound = if e == 0 {
            if task_id != 0 {
                // Only the root task follows the tip.
                return b;
            }
            tip
        } else {
            e
        };

        if bound > b && bound - b > self.config.max_workload {
            let new_b = bound - self.config.max_workload;
            info!(
                task_id,
                head_start = b,
                head_end = new_b,
                "remaining workload too large, forking head range"
            );
            self.spawn_range(task_id + 1, b, new_b);
            return new_b;
        }
        b
    }
}
