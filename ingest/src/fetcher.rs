//! Chunked self-forking fetcher.
//!
//! Pulls a large, sparse item set from rotating remote endpoints. A branch
//! that receives more items than its ceiling forks the head off as a new
//! concurrent branch and scans only the ceiling-sized tail inline. Failed
//! items accumulate in a `rest` list; when a branch's consecutive-error
//! ceiling is exceeded the whole remaining tail is bulk-failed so one wedged
//! endpoint cannot stall the scan item by item. A non-empty `rest` re-forks
//! as a fresh branch with a fresh randomly drawn client, which is also how
//! endpoint rotation happens at this layer.
//!
//! Item errors never abort the overall fetch. Completion is detected by
//! governor quiescence sampling, since retry forks mean no branch knows its
//! descendant count. Each root task carries a [`TaskControl`] bounding the
//! fan-out: a cancelled, past-deadline, or out-of-budget branch routes its
//! remaining items to a terminal `unresolved` list instead of forking again.

use crate::client::{ClientError, ClientHandle, ClientPool, NodeRole};
use crate::governor::{Governor, SAMPLES_NEEDED, SAMPLE_INTERVAL};
use async_trait::async_trait;
use futures::future::BoxFuture;
use metrics::SharedMetrics;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// One kind of fetchable item: which role serves it, how to validate it, and
/// how to pull one item through a client handle.
#[async_trait]
pub trait ItemSource: Send + Sync + 'static {
    type Item: Clone + Send + Sync + 'static;
    type Output: Send + 'static;

    fn role(&self) -> NodeRole;

    /// Metric label for this item kind.
    fn kind(&self) -> &'static str;

    /// Structural validation. Items failing this are permanent per-item
    /// failures, reported separately and never retried.
    fn validate(&self, _item: &Self::Item) -> bool {
        true
    }

    async fn fetch(
        &self,
        client: &ClientHandle,
        item: &Self::Item,
    ) -> Result<Self::Output, ClientError>;
}

/// Per-branch limits.
#[derive(Clone, Copy, Debug)]
pub struct FetchLimits {
    /// Items a branch processes inline; anything above forks.
    pub branch_items: usize,
    /// Errors a branch tolerates before bulk-failing its remaining tail.
    pub error_ceiling: u32,
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self {
            branch_items: 1000,
            error_ceiling: 10,
        }
    }
}

/// Root-task bounds, threaded through every branch.
#[derive(Debug)]
pub struct TaskControl {
    cancelled: AtomicBool,
    deadline: Option<Instant>,
    retry_forks: AtomicI64,
}

impl TaskControl {
    pub fn new(deadline: Option<Duration>, retry_forks: i64) -> Arc<Self> {
        Arc::new(Self {
            cancelled: AtomicBool::new(false),
            deadline: deadline.map(|d| Instant::now() + d),
            retry_forks: AtomicI64::new(retry_forks),
        })
    }

    /// No deadline, effectively unlimited retry forks.
    pub fn unbounded() -> Arc<Self> {
        Self::new(None, i64::MAX)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.cancelled.load(Ordering::Acquire) {
            return true;
        }
        match self.deadline {
            Some(deadline) => Instant::now() >= deadline,
            None => false,
        }
    }

    /// Claim permission for one retry fork.
    fn take_retry_token(&self) -> bool {
        !self.is_cancelled() && self.retry_forks.fetch_sub(1, Ordering::AcqRel) > 0
    }
}

/// Final tally of one fetch task. `done`, `bad` and `unresolved` together
/// partition the input set.
#[derive(Debug)]
pub struct FetchReport<I, O> {
    pub done: Vec<O>,
    /// Malformed inputs, never retried.
    pub bad: Vec<I>,
    /// Items abandoned because the task was cancelled, timed out, or ran out
    /// of retry-fork budget.
    pub unresolved: Vec<I>,
}

#[derive(Debug)]
struct FetchSink<I, O> {
    done: Vec<O>,
    bad: Vec<I>,
    unresolved: Vec<I>,
}

impl<I, O> Default for FetchSink<I, O> {
    fn default() -> Self {
        Self {
            done: Vec::new(),
            bad: Vec::new(),
            unresolved: Vec::new(),
        }
    }
}

pub struct Fetcher<S: ItemSource> {
    source: Arc<S>,
    pool: Arc<dyn ClientPool>,
    governor: Governor,
    limits: FetchLimits,
    metrics: SharedMetrics,
}

impl<S: ItemSource> Fetcher<S> {
    pub fn new(
        source: Arc<S>,
        pool: Arc<dyn ClientPool>,
        governor: Governor,
        limits: FetchLimits,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            source,
            pool,
            governor,
            limits,
            metrics,
        }
    }

    /// Run one fetch task to completion and collect the tally.
    ///
    /// The caller holds its own governor slot while sampling for quiescence,
    /// so a load of one means every forked branch has finished.
    pub async fn run(
        &self,
        items: Vec<S::Item>,
        control: Arc<TaskControl>,
    ) -> FetchReport<S::Item, S::Output> {
        let sink = Arc::new(Mutex::new(FetchSink::default()));
        let branch = Arc::new(Branch {
            source: Arc::clone(&self.source),
            pool: Arc::clone(&self.pool),
            governor: self.governor.clone(),
            limits: self.limits,
            metrics: Arc::clone(&self.metrics),
            control,
            sink: Arc::clone(&sink),
        });

        let _slot = self.governor.enter();
        branch.run(items).await;
        self.governor
            .wait_quiescent(SAMPLE_INTERVAL, SAMPLES_NEEDED)
            .await;

        let mut sink = sink.lock();
        FetchReport {
            done: std::mem::take(&mut sink.done),
            bad: std::mem::take(&mut sink.bad),
            unresolved: std::mem::take(&mut sink.unresolved),
        }
    }
}

struct Branch<S: ItemSource> {
    source: Arc<S>,
    pool: Arc<dyn ClientPool>,
    governor: Governor,
    limits: FetchLimits,
    metrics: SharedMetrics,
    control: Arc<TaskControl>,
    sink: Arc<Mutex<FetchSink<S::Item, S::Output>>>,
}

impl<S: ItemSource> Branch<S> {
    /// One branch of the fan-out. Boxed so a branch can spawn itself for the
    /// oversize split and for the rest-retry fork.
    fn run(self: Arc<Self>, mut items: Vec<S::Item>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let _slot = self.governor.enter();

            if items.len() > self.limits.branch_items {
                let tail = items.split_off(items.len() - self.limits.branch_items);
                let head = std::mem::replace(&mut items, tail);
                debug!(
                    kind = self.source.kind(),
                    forked = head.len(),
                    inline = items.len(),
                    "branch over ceiling, forking head"
                );
                tokio::spawn(Arc::clone(&self).run(head));
            }

            if self.control.is_cancelled() {
                self.sink.lock().unresolved.extend(items);
                return;
            }

            let role = self.source.role();
            let client = self.pool.random_client(role);
            let mut errors: u32 = 0;
            let mut done = Vec::with_capacity(items.len());
            let mut bad = Vec::new();
            let mut rest = Vec::new();
            let mut abandoned = Vec::new();

            for (idx, item) in items.iter().enumerate() {
                if self.control.is_cancelled() {
                    abandoned.extend(items[idx..].iter().cloned());
                    break;
                }
                if !self.source.validate(item) {
                    self.metrics.inc_fetch_item(self.source.kind(), "bad");
                    bad.push(item.clone());
                    continue;
                }
                match self.source.fetch(&client, item).await {
                    Ok(output) => {
                        self.metrics.inc_fetch_item(self.source.kind(), "ok");
                        done.push(output);
                    }
                    Err(err) => {
                        errors += 1;
                        self.metrics.inc_fetch_item(self.source.kind(), "error");
                        rest.push(item.clone());
                        if errors > self.limits.error_ceiling {
                            // Endpoint considered wedged: fail the remaining
                            // tail wholesale instead of grinding item by item
                            // against a dead node. The retry fork draws a
                            // fresh client, which is the rotation.
                            warn!(
                                kind = self.source.kind(),
                                endpoint = client.endpoint(),
                                errors,
                                remaining = items.len() - idx - 1,
                                %err,
                                "error ceiling exceeded, bulk-failing remaining tail"
                            );
                            self.metrics.inc_node_rotation(role.as_str());
                            rest.extend(items[idx + 1..].iter().cloned());
                            break;
                        }
                    }
                }
            }

            // The sink and this merge are the only cross-branch shared state.
            {
                let mut sink = self.sink.lock();
                sink.done.append(&mut done);
                sink.bad.append(&mut bad);
                sink.unresolved.append(&mut abandoned);
            }

            if !rest.is_empty() {
                if self.control.take_retry_token() {
                    debug!(
                        kind = self.source.kind(),
                        rest = rest.len(),
                        "re-forking failed items"
                    );
                    tokio::spawn(Arc::clone(&self).run(rest));
                } else {
                    warn!(
                        kind = self.source.kind(),
                        rest = rest.len(),
                        "retry budget exhausted, abandoning failed items"
                    );
                    self.sink.lock().unresolved.append(&mut rest);
                }
            }
        })
    }
}
