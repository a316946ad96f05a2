use crate::Address;
use serde::{Deserialize, Serialize};

/// A block as the explorer caches it, keyed by `number`.
///
/// `number` is immutable once assigned. `confirmed` transitions false -> true
/// exactly once and never reverts; `confirm()` is the only path that flips it.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRecord {
    pub number: u64,
    pub hash: String,
    pub parent_hash: String,
    pub size: u64,
    /// Block creation time, epoch milliseconds as reported by the node.
    pub created_at: i64,
    pub tx_count: u64,
    pub producer_address: Address,
    /// Display name of the producer, resolved from the producer directory.
    /// Empty until attached.
    #[serde(default)]
    pub producer_name: String,
    pub confirmed: bool,
}

impl BlockRecord {
    /// Mark the block as accepted by the solid view. Idempotent.
    pub fn confirm(&mut self) {
        self.confirmed = true;
    }

    /// Whether this record may overwrite `current` in a number-keyed upsert.
    ///
    /// Writes are idempotent by number; the only forbidden overwrite is
    /// demoting a confirmed record back to unconfirmed.
    pub fn supersedes(&self, current: &BlockRecord) -> bool {
        debug_assert_eq!(self.number, current.number);
        self.confirmed || !current.confirmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn block(number: u64, confirmed: bool) -> BlockRecord {
        BlockRecord {
            number,
            hash: format!("{number:016x}"),
            confirmed,
            ..Default::default()
        }
    }

    #[test]
    fn confirm_is_one_way() {
        let mut b = block(7, false);
        b.confirm();
        assert!(b.confirmed);
        b.confirm();
        assert!(b.confirmed);
    }

    #[test]
    fn confirmed_record_is_never_demoted() {
        let confirmed = block(7, true);
        let unconfirmed = block(7, false);
        assert!(!unconfirmed.supersedes(&confirmed));
        assert!(confirmed.supersedes(&unconfirmed));
        assert!(confirmed.supersedes(&confirmed));
        assert!(unconfirmed.supersedes(&unconfirmed));
    }

    #[test]
    fn round_trips_through_json() {
        let b = block(42, true);
        let json = serde_json::to_string(&b).unwrap();
        let back: BlockRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(b, back);
    }
}
