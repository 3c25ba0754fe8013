//! RelayDB: persisted channel/user link tables (spec §4.7, §5).
//!
//! Grounded in the teacher's `redb`/`rmp-serde` pairing for append-safe
//! snapshots (Cargo.toml's "Relay DB persistence" comment). A single
//! `rmp-serde`-encoded blob is stored under one constant key in one `redb`
//! table rather than one row per channel/user: `relay_channels`'s key is a
//! `(String, String)` tuple, which `serde_json` can't use as a map key but
//! `rmp-serde` (MessagePack) has no trouble with, and the whole table is
//! small enough that save-the-world-on-every-change is cheap.

use crate::error::{PylinkError, Result};
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

const TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("relay");
const BLOB_KEY: &str = "db";

/// One relayed channel's home-side record (spec §4.7).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayChannelEntry {
    /// Other (network, channel) pairs linked to this home channel.
    pub leaves: HashSet<(String, String)>,
    /// Networks allowed to CLAIM ops here; empty means claim is disabled.
    pub claim_nets: HashSet<String>,
    /// LINKACL mode: `true` = whitelist (only `linkacl_set` passes),
    /// `false` = blacklist (everything but `linkacl_set` passes).
    pub linkacl_mode: bool,
    pub linkacl_set: HashSet<char>,
    /// Per-leaf-network mode overrides applied on top of the home side's
    /// modes before relaying out (spec §4.7's MODEDELTA).
    pub modedelta: HashMap<String, Vec<(char, Option<String>)>>,
    pub chandesc: Option<String>,
    pub created_ts: i64,
}

/// Persisted relay state: home channels and which network each home user's
/// puppets live on (spec §4.7 "RelayDB").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayDbData {
    pub relay_channels: HashMap<(String, String), RelayChannelEntry>,
    /// (home_network, home_uid) -> { leaf_network -> spawned puppet UID }
    pub relay_users: HashMap<(String, String), HashMap<String, String>>,
}

/// Wraps [`RelayDbData`] with `redb` persistence. The in-memory
/// `puppet_index` (spawned UID -> owning home user) is a pure derivative of
/// `relay_users` kept for O(1) reverse lookups on inbound lines; it is never
/// persisted and is rebuilt by [`RelayDb::load`].
pub struct RelayDb {
    db: Database,
    pub data: RelayDbData,
    pub puppet_index: HashMap<(String, String), (String, String)>,
}

impl RelayDb {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PylinkError::RelayDb(e.to_string()))?;
        }
        let db = Database::create(path).map_err(|e| PylinkError::RelayDb(e.to_string()))?;
        let data = Self::read_blob(&db)?.unwrap_or_default();
        let puppet_index = build_puppet_index(&data);
        Ok(Self { db, data, puppet_index })
    }

    fn read_blob(db: &Database) -> Result<Option<RelayDbData>> {
        let txn = db.begin_read().map_err(|e| PylinkError::RelayDb(e.to_string()))?;
        let table = match txn.open_table(TABLE) {
            Ok(t) => t,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(PylinkError::RelayDb(e.to_string())),
        };
        let Some(bytes) = table.get(BLOB_KEY).map_err(|e| PylinkError::RelayDb(e.to_string()))? else {
            return Ok(None);
        };
        let data = rmp_serde::from_slice(bytes.value()).map_err(|e| PylinkError::RelayDb(e.to_string()))?;
        Ok(Some(data))
    }

    /// Persist the current in-memory state (spec §4.7's periodic save plus
    /// the explicit `savedb` service command).
    pub fn save(&self) -> Result<()> {
        let encoded = rmp_serde::to_vec(&self.data).map_err(|e| PylinkError::RelayDb(e.to_string()))?;
        let txn = self.db.begin_write().map_err(|e| PylinkError::RelayDb(e.to_string()))?;
        {
            let mut table = txn.open_table(TABLE).map_err(|e| PylinkError::RelayDb(e.to_string()))?;
            table.insert(BLOB_KEY, encoded.as_slice()).map_err(|e| PylinkError::RelayDb(e.to_string()))?;
        }
        txn.commit().map_err(|e| PylinkError::RelayDb(e.to_string()))?;
        Ok(())
    }

    pub fn channel(&self, home_net: &str, home_chan: &str) -> Option<&RelayChannelEntry> {
        self.data.relay_channels.get(&(home_net.to_string(), home_chan.to_string()))
    }

    pub fn create_channel(&mut self, home_net: &str, home_chan: &str) {
        self.data
            .relay_channels
            .entry((home_net.to_string(), home_chan.to_string()))
            .or_insert_with(|| RelayChannelEntry { created_ts: crate::hooks::now_ts(), ..Default::default() });
    }

    pub fn destroy_channel(&mut self, home_net: &str, home_chan: &str) {
        let key = (home_net.to_string(), home_chan.to_string());
        self.data.relay_channels.remove(&key);
        for ((hn, huid), leaves) in self.data.relay_users.iter_mut() {
            if hn == home_net {
                leaves.remove(home_chan);
                let _ = huid;
            }
        }
        self.puppet_index = build_puppet_index(&self.data);
    }

    pub fn link(&mut self, home_net: &str, home_chan: &str, leaf_net: &str, leaf_chan: &str) -> bool {
        let Some(entry) = self.data.relay_channels.get_mut(&(home_net.to_string(), home_chan.to_string())) else {
            return false;
        };
        entry.leaves.insert((leaf_net.to_string(), leaf_chan.to_string()))
    }

    pub fn delink(&mut self, home_net: &str, home_chan: &str, leaf_net: &str, leaf_chan: &str) -> bool {
        let Some(entry) = self.data.relay_channels.get_mut(&(home_net.to_string(), home_chan.to_string())) else {
            return false;
        };
        entry.leaves.remove(&(leaf_net.to_string(), leaf_chan.to_string()))
    }

    /// Every (network, channel) a given channel participates in, home
    /// channel first (spec §4.7's `linked` listing).
    pub fn linked_set(&self, home_net: &str, home_chan: &str) -> Vec<(String, String)> {
        let Some(entry) = self.channel(home_net, home_chan) else { return Vec::new() };
        let mut out = vec![(home_net.to_string(), home_chan.to_string())];
        out.extend(entry.leaves.iter().cloned());
        out
    }

    /// Resolve any (network, channel) pair — home or leaf — to its home
    /// pair, used so Relay only ever needs to look up one
    /// `RelayChannelEntry` per logical channel.
    pub fn home_of(&self, net: &str, chan: &str) -> Option<(String, String)> {
        let key = (net.to_string(), chan.to_string());
        if self.data.relay_channels.contains_key(&key) {
            return Some(key);
        }
        self.data
            .relay_channels
            .iter()
            .find(|(_, entry)| entry.leaves.contains(&key))
            .map(|(home, _)| home.clone())
    }

    pub fn puppet_uid(&self, home_net: &str, home_uid: &str, leaf_net: &str) -> Option<&str> {
        self.data
            .relay_users
            .get(&(home_net.to_string(), home_uid.to_string()))?
            .get(leaf_net)
            .map(String::as_str)
    }

    pub fn record_puppet(&mut self, home_net: &str, home_uid: &str, leaf_net: &str, puppet_uid: &str) {
        self.data
            .relay_users
            .entry((home_net.to_string(), home_uid.to_string()))
            .or_default()
            .insert(leaf_net.to_string(), puppet_uid.to_string());
        self.puppet_index
            .insert((leaf_net.to_string(), puppet_uid.to_string()), (home_net.to_string(), home_uid.to_string()));
    }

    pub fn forget_puppet(&mut self, leaf_net: &str, puppet_uid: &str) {
        if let Some((home_net, home_uid)) = self.puppet_index.remove(&(leaf_net.to_string(), puppet_uid.to_string())) {
            if let Some(leaves) = self.data.relay_users.get_mut(&(home_net, home_uid)) {
                leaves.remove(leaf_net);
            }
        }
    }

    /// Reverse-lookup: is `uid` on `network` a puppet, and if so whose?
    pub fn owner_of_puppet(&self, network: &str, uid: &str) -> Option<&(String, String)> {
        self.puppet_index.get(&(network.to_string(), uid.to_string()))
    }
}

fn build_puppet_index(data: &RelayDbData) -> HashMap<(String, String), (String, String)> {
    let mut index = HashMap::new();
    for ((home_net, home_uid), leaves) in &data.relay_users {
        for (leaf_net, puppet_uid) in leaves {
            index.insert((leaf_net.clone(), puppet_uid.clone()), (home_net.clone(), home_uid.clone()));
        }
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_link_delink_destroy_round_trip() {
        let dir = tempdir().unwrap();
        let mut db = RelayDb::open(dir.path().join("relay.db")).unwrap();
        db.create_channel("home", "#chan");
        assert!(db.link("home", "#chan", "leaf", "#chan"));
        assert_eq!(db.linked_set("home", "#chan").len(), 2);
        assert!(db.delink("home", "#chan", "leaf", "#chan"));
        assert_eq!(db.linked_set("home", "#chan").len(), 1);
        db.destroy_channel("home", "#chan");
        assert!(db.channel("home", "#chan").is_none());
    }

    #[test]
    fn puppet_index_resolves_owner_and_survives_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("relay.db");
        {
            let mut db = RelayDb::open(&path).unwrap();
            db.record_puppet("home", "100AAAAAA", "leaf", "200BBBBBB");
            db.save().unwrap();
        }
        let db = RelayDb::open(&path).unwrap();
        assert_eq!(
            db.owner_of_puppet("leaf", "200BBBBBB"),
            Some(&("home".to_string(), "100AAAAAA".to_string()))
        );
        assert_eq!(db.puppet_uid("home", "100AAAAAA", "leaf"), Some("200BBBBBB"));
    }

    #[test]
    fn home_of_resolves_both_home_and_leaf_pairs() {
        let dir = tempdir().unwrap();
        let mut db = RelayDb::open(dir.path().join("relay.db")).unwrap();
        db.create_channel("home", "#chan");
        db.link("home", "#chan", "leaf", "#other");
        assert_eq!(db.home_of("home", "#chan"), Some(("home".to_string(), "#chan".to_string())));
        assert_eq!(db.home_of("leaf", "#other"), Some(("home".to_string(), "#chan".to_string())));
        assert_eq!(db.home_of("nowhere", "#x"), None);
    }
}
