//! Node client pool seam.
//!
//! Every remote interaction goes through a [`NodeClient`] bound to a single
//! endpoint of a single role. Clients are handed out by a [`ClientPool`] and
//! are owned by whichever fetch branch currently holds them; a branch that
//! gives up on an endpoint asks the pool for a fresh handle rather than
//! repairing the old one.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use records::{AccountRecord, Address, BlockRecord, NetUsage, TipInfo};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error talking to {endpoint}: {message}")]
    Transport { endpoint: String, message: String },
    #[error("node {endpoint} returned a malformed response")]
    Malformed { endpoint: String },
    #[error("item not available on {endpoint}")]
    NotFound { endpoint: String },
}

/// The chain view a node serves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeRole {
    /// Solid-state view: confirmed history only.
    Solid,
    /// Latest view: most advanced, possibly unconfirmed, chain state.
    Latest,
    /// Raw block view used for bulk history pulls.
    Raw,
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Solid => "solid",
            NodeRole::Latest => "latest",
            NodeRole::Raw => "raw",
        }
    }
}

/// One remote endpoint of one role.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Endpoint label for logs and error messages.
    fn endpoint(&self) -> &str;

    async fn fetch_account(&self, address: &Address) -> Result<AccountRecord, ClientError>;

    async fn fetch_account_net(&self, address: &Address) -> Result<NetUsage, ClientError>;

    async fn fetch_block_by_number(&self, number: u64) -> Result<BlockRecord, ClientError>;

    /// Fetch the half-open range `[start, end)`. Nodes may return fewer
    /// blocks than requested; completeness is the caller's problem.
    async fn fetch_block_range(&self, start: u64, end: u64)
        -> Result<Vec<BlockRecord>, ClientError>;

    async fn fetch_tip_info(&self) -> Result<TipInfo, ClientError>;
}

pub type ClientHandle = Arc<dyn NodeClient>;

/// Hands out clients bound to randomly chosen healthy endpoints.
pub trait ClientPool: Send + Sync {
    fn random_client(&self, role: NodeRole) -> ClientHandle;
}

/// Pool over a fixed set of endpoints per role.
pub struct StaticClientPool {
    solid: Vec<ClientHandle>,
    latest: Vec<ClientHandle>,
    raw: Vec<ClientHandle>,
}

impl StaticClientPool {
    /// Panics if any role has no endpoints; a pool that cannot serve a role
    /// is a deployment error, not a runtime condition.
    pub fn new(solid: Vec<ClientHandle>, latest: Vec<ClientHandle>, raw: Vec<ClientHandle>) -> Self {
        assert!(!solid.is_empty(), "no solid-view endpoints configured");
        assert!(!latest.is_empty(), "no latest-view endpoints configured");
        assert!(!raw.is_empty(), "no raw-view endpoints configured");
        Self { solid, latest, raw }
    }
}

impl ClientPool for StaticClientPool {
    fn random_client(&self, role: NodeRole) -> ClientHandle {
        let set = match role {
            NodeRole::Solid => &self.solid,
            NodeRole::Latest => &self.latest,
            NodeRole::Raw => &self.raw,
        };
        set.choose(&mut rand::thread_rng())
            .expect("role sets are non-empty by construction")
            .clone()
    }
}
