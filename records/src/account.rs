use crate::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One vote cast by an account for a producer candidate.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub to_address: Address,
    pub count: i64,
}

/// Bandwidth accounting reported by the latest view for one account.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetUsage {
    pub free_net_limit: i64,
    pub net_used: i64,
    pub net_limit: i64,
    pub total_net_limit: i64,
    pub total_net_weight: i64,
    /// Per-asset usage, serialized as JSON when persisted.
    #[serde(default)]
    pub asset_net_used: BTreeMap<String, i64>,
    #[serde(default)]
    pub asset_net_limit: BTreeMap<String, i64>,
}

/// An account as fetched from the solid view, optionally enriched with
/// bandwidth usage from the latest view before persistence.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRecord {
    pub address: Address,
    pub name: String,
    pub balance: i64,
    pub created_at: i64,
    pub is_witness: bool,
    /// Frozen balance entries, kept opaque (JSON) the way the durable store
    /// receives them.
    #[serde(default)]
    pub frozen: String,
    pub allowance: i64,
    #[serde(default)]
    pub asset_balances: BTreeMap<String, i64>,
    #[serde(default)]
    pub votes: Vec<Vote>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net: Option<NetUsage>,
}

impl AccountRecord {
    /// Attach bandwidth usage. Later attachments overwrite earlier ones.
    pub fn set_net(&mut self, net: NetUsage) {
        self.net = Some(net);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn net_usage_attaches_once_and_overwrites() {
        let mut acc = AccountRecord {
            address: Address::new("TAbcdefghij1234567890AbcdefghiJ123"),
            ..Default::default()
        };
        assert!(acc.net.is_none());

        acc.set_net(NetUsage {
            net_used: 10,
            ..Default::default()
        });
        acc.set_net(NetUsage {
            net_used: 20,
            ..Default::default()
        });
        assert_eq!(acc.net.unwrap().net_used, 20);
    }

    #[test]
    fn serializes_without_net_when_absent() {
        let acc = AccountRecord::default();
        let json = serde_json::to_string(&acc).unwrap();
        assert!(!json.contains("\"net\""));
    }
}
