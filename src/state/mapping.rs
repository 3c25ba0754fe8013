//! Per-network user table with a casefolded nick->UID secondary index
//! (spec §4.2).
//!
//! Kept consistent on every nick mutation: a nick maps to multiple UIDs
//! only when the protocol advertises `freeform-nicks` (spec §3).

use super::user::User;
use crate::casemap::{case_fold, Casemap};
use crate::error::{PylinkError, Result};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct UserMapping {
    users: HashMap<String, User>,
    nick_index: HashMap<String, HashSet<String>>,
    casemap: Casemap,
}

impl UserMapping {
    pub fn new(casemap: Casemap) -> Self {
        Self {
            users: HashMap::new(),
            nick_index: HashMap::new(),
            casemap,
        }
    }

    fn fold(&self, nick: &str) -> String {
        case_fold(nick, self.casemap)
    }

    pub fn insert(&mut self, user: User) {
        let key = self.fold(&user.nick);
        let uid = user.uid.clone();
        self.nick_index.entry(key).or_default().insert(uid.clone());
        self.users.insert(uid, user);
    }

    pub fn remove(&mut self, uid: &str) -> Option<User> {
        let user = self.users.remove(uid)?;
        let key = self.fold(&user.nick);
        if let Some(set) = self.nick_index.get_mut(&key) {
            set.remove(uid);
            if set.is_empty() {
                self.nick_index.remove(&key);
            }
        }
        Some(user)
    }

    pub fn get(&self, uid: &str) -> Option<&User> {
        self.users.get(uid)
    }

    pub fn get_mut(&mut self, uid: &str) -> Option<&mut User> {
        self.users.get_mut(uid)
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.users.contains_key(uid)
    }

    pub fn iter(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// UIDs currently using `nick` (more than one only under `freeform-nicks`).
    pub fn by_nick(&self, nick: &str) -> Vec<&str> {
        self.nick_index
            .get(&self.fold(nick))
            .map(|set| set.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Rename `uid` to `newnick`, updating the index. Rejects the rename
    /// with `NotFound` if `uid` isn't known; collision enforcement (when
    /// `freeform-nicks` is absent) is the caller's (adapter's) job since it
    /// also needs to decide kill/bounce policy.
    pub fn rename(&mut self, uid: &str, newnick: &str, ts: i64) -> Result<String> {
        let old_nick = {
            let user = self
                .users
                .get(uid)
                .ok_or_else(|| PylinkError::NotFound(format!("user {uid}")))?;
            user.nick.clone()
        };
        let old_key = self.fold(&old_nick);
        if let Some(set) = self.nick_index.get_mut(&old_key) {
            set.remove(uid);
            if set.is_empty() {
                self.nick_index.remove(&old_key);
            }
        }
        let new_key = self.fold(newnick);
        self.nick_index.entry(new_key).or_default().insert(uid.to_string());
        let user = self.users.get_mut(uid).expect("checked above");
        user.nick = newnick.to_string();
        user.nick_ts = ts;
        Ok(old_nick)
    }

    /// Invariant check used by tests: every UID's folded nick is present in
    /// the index, and every indexed UID exists in the user table.
    #[cfg(test)]
    pub fn check_invariant(&self) -> bool {
        for (uid, user) in &self.users {
            let key = self.fold(&user.nick);
            if !self.nick_index.get(&key).is_some_and(|s| s.contains(uid)) {
                return false;
            }
        }
        for (key, uids) in &self.nick_index {
            for uid in uids {
                match self.users.get(uid) {
                    Some(u) if &self.fold(&u.nick) == key => {}
                    _ => return false,
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_remove_rename_keep_index_consistent() {
        let mut m = UserMapping::new(Casemap::Rfc1459);
        m.insert(User::new("1AAAAAAAA", "Alice", "1AA", 1000));
        assert!(m.check_invariant());
        m.rename("1AAAAAAAA", "Bob", 1001).unwrap();
        assert!(m.check_invariant());
        assert_eq!(m.by_nick("bob"), vec!["1AAAAAAAA"]);
        assert!(m.by_nick("alice").is_empty());
        m.remove("1AAAAAAAA");
        assert!(m.check_invariant());
        assert!(m.is_empty());
    }

    #[test]
    fn freeform_nicks_allow_multiple_uids_per_nick() {
        let mut m = UserMapping::new(Casemap::Rfc1459);
        m.insert(User::new("u1", "dupe", "sid", 1));
        m.insert(User::new("u2", "dupe", "sid", 2));
        let mut uids = m.by_nick("DUPE");
        uids.sort();
        assert_eq!(uids, vec!["u1", "u2"]);
        assert!(m.check_invariant());
    }
}
