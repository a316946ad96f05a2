use serde::{Deserialize, Serialize};

/// A node's self-reported chain tip.
///
/// The meaning of `number` depends on the role of the reporting node: a solid
/// view reports its highest confirmed block, a latest view its highest known
/// (possibly unconfirmed) block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TipInfo {
    pub number: u64,
    /// Node-local observation time, epoch milliseconds.
    pub observed_at: i64,
}
