//! The `Channel` entity, mode application, and TS reconciliation
//! (spec §3, §4.3 "TS reconciliation").

use crate::modes::{ModeClass, ModeTable, ParsedMode, PrefixRank};
use std::collections::{HashMap, HashSet};

/// Minimum valid creation TS (spec §3 invariant).
pub const MIN_VALID_TS: i64 = 750_000;

/// A non-virtual channel's creation TS must exceed [`MIN_VALID_TS`]; lower
/// values are rejected as bogus (spec §3).
pub fn is_valid_creation_ts(ts: i64) -> bool {
    ts > MIN_VALID_TS
}

#[derive(Debug, Clone, Default)]
pub struct Channel {
    pub name: String,
    pub ts: i64,
    pub topic: Option<String>,
    pub topic_set: bool,
    pub topic_setter: Option<String>,
    /// Non-list mode state: B/C/D classes keyed by char.
    pub modes: HashMap<char, Option<String>>,
    /// List mode state (bans, exceptions, invite-exceptions, quiets, ...).
    pub list_modes: HashMap<char, Vec<String>>,
    /// Prefix rank -> member UIDs holding it.
    pub prefixes: HashMap<PrefixRank, HashSet<String>>,
    pub members: HashSet<String>,
}

impl Channel {
    pub fn new(name: impl Into<String>, ts: i64) -> Self {
        Self {
            name: name.into(),
            ts,
            ..Default::default()
        }
    }

    /// Every rank held by `uid`, highest first.
    pub fn ranks_of(&self, uid: &str) -> Vec<PrefixRank> {
        PrefixRank::ALL
            .into_iter()
            .filter(|r| self.prefixes.get(r).is_some_and(|s| s.contains(uid)))
            .collect()
    }

    /// Apply a parsed mode list, mutating state and returning the entries
    /// actually applied (duplicates against current state are skipped,
    /// per spec §4.1).
    pub fn apply_modes(&mut self, table: &ModeTable, parsed: &[ParsedMode]) -> Vec<ParsedMode> {
        let mut applied = Vec::new();
        for m in parsed {
            let Some(class) = table.chan_class(m.ch) else {
                continue;
            };
            match class {
                ModeClass::Prefix(rank) => {
                    let Some(uid) = &m.arg else { continue };
                    if !self.members.contains(uid) {
                        continue; // invariant: target must be a member
                    }
                    let set = self.prefixes.entry(rank).or_default();
                    let changed = if m.plus {
                        set.insert(uid.clone())
                    } else {
                        set.remove(uid)
                    };
                    if changed {
                        applied.push(m.clone());
                    }
                }
                ModeClass::ListA => {
                    let Some(arg) = &m.arg else { continue };
                    let list = self.list_modes.entry(m.ch).or_default();
                    if m.plus {
                        if !list.iter().any(|e| e.eq_ignore_ascii_case(arg)) {
                            list.push(arg.clone());
                            applied.push(m.clone());
                        }
                    } else if let Some(pos) = list.iter().position(|e| e.eq_ignore_ascii_case(arg)) {
                        list.remove(pos);
                        applied.push(m.clone());
                    }
                }
                ModeClass::AlwaysArgB | ModeClass::SetArgC => {
                    if m.plus {
                        if self.modes.get(&m.ch).and_then(|v| v.as_ref()) != m.arg.as_ref() {
                            self.modes.insert(m.ch, m.arg.clone());
                            applied.push(m.clone());
                        }
                    } else if self.modes.remove(&m.ch).is_some() {
                        applied.push(m.clone());
                    }
                }
                ModeClass::NoArgD => {
                    if m.plus {
                        if self.modes.insert(m.ch, None).is_none() {
                            applied.push(m.clone());
                        }
                    } else if self.modes.remove(&m.ch).is_some() {
                        applied.push(m.clone());
                    }
                }
            }
        }
        applied
    }

    /// Compute the inverse of `parsed` against current state: for each
    /// entry that is *currently reflected* in target state (i.e. it took
    /// effect, whether just now or previously), emit its inversion; entries
    /// that never took effect (deduped no-ops, invalid targets) are
    /// skipped — there's nothing to bounce (spec §4.1 `reverse_modes`).
    pub fn reverse_modes(&self, table: &ModeTable, parsed: &[ParsedMode]) -> Vec<ParsedMode> {
        let mut out = Vec::new();
        for m in parsed {
            let Some(class) = table.chan_class(m.ch) else {
                continue;
            };
            let currently_set = match class {
                ModeClass::Prefix(rank) => match &m.arg {
                    Some(uid) => self.prefixes.get(&rank).is_some_and(|s| s.contains(uid)),
                    None => continue,
                },
                ModeClass::ListA => match &m.arg {
                    Some(arg) => self
                        .list_modes
                        .get(&m.ch)
                        .is_some_and(|l| l.iter().any(|e| e.eq_ignore_ascii_case(arg))),
                    None => continue,
                },
                ModeClass::AlwaysArgB | ModeClass::SetArgC | ModeClass::NoArgD => {
                    self.modes.contains_key(&m.ch)
                }
            };
            if m.plus == currently_set {
                out.push(ParsedMode::new(!m.plus, m.ch, m.arg.clone()));
            }
        }
        out
    }

    /// TS reconciliation on SJOIN/BURST (spec §4.3).
    ///
    /// - `their_ts < our_ts`: adopt their TS, wipe our modes and prefix
    ///   assignments, apply theirs.
    /// - `their_ts == our_ts`: merge both mode sets.
    /// - `their_ts > our_ts`: drop their modes entirely.
    pub fn update_ts(&mut self, table: &ModeTable, their_ts: i64, their_modes: &[ParsedMode]) {
        use std::cmp::Ordering;
        match their_ts.cmp(&self.ts) {
            Ordering::Less => {
                self.ts = their_ts;
                self.modes.clear();
                self.list_modes.clear();
                self.prefixes.clear();
                self.apply_modes(table, their_modes);
            }
            Ordering::Equal => {
                self.apply_modes(table, their_modes);
            }
            Ordering::Greater => {
                // their modes dropped; TS stays ours (the min of the two).
            }
        }
        self.ts = self.ts.min(their_ts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts6_table() -> ModeTable {
        ModeTable::from_isupport("eIb,k,l,imnpst", "(ov)@+")
    }

    #[test]
    fn apply_modes_dedupes_existing_toggle() {
        let table = ts6_table();
        let mut chan = Channel::new("#test", 1_000_000);
        let applied = chan.apply_modes(&table, &[ParsedMode::new(true, 'n', None)]);
        assert_eq!(applied.len(), 1);
        let applied_again = chan.apply_modes(&table, &[ParsedMode::new(true, 'n', None)]);
        assert!(applied_again.is_empty());
    }

    #[test]
    fn ban_list_dedupes_case_insensitively() {
        let table = ts6_table();
        let mut chan = Channel::new("#test", 1_000_000);
        chan.apply_modes(&table, &[ParsedMode::new(true, 'b', Some("*!*@BAD.com".into()))]);
        let applied = chan.apply_modes(&table, &[ParsedMode::new(true, 'b', Some("*!*@bad.com".into()))]);
        assert!(applied.is_empty());
        assert_eq!(chan.list_modes[&'b'].len(), 1);
    }

    #[test]
    fn update_ts_lower_wipes_and_adopts() {
        let table = ts6_table();
        let mut chan = Channel::new("#test", 2_000_000);
        chan.apply_modes(&table, &[ParsedMode::new(true, 's', None)]);
        chan.update_ts(&table, 1_000_000, &[ParsedMode::new(true, 'n', None)]);
        assert_eq!(chan.ts, 1_000_000);
        assert!(!chan.modes.contains_key(&'s'));
        assert!(chan.modes.contains_key(&'n'));
    }

    #[test]
    fn update_ts_higher_drops_their_modes() {
        let table = ts6_table();
        let mut chan = Channel::new("#test", 1_000_000);
        chan.apply_modes(&table, &[ParsedMode::new(true, 'n', None)]);
        chan.update_ts(&table, 2_000_000, &[ParsedMode::new(true, 's', None)]);
        assert_eq!(chan.ts, 1_000_000);
        assert!(chan.modes.contains_key(&'n'));
        assert!(!chan.modes.contains_key(&'s'));
    }

    #[test]
    fn update_ts_equal_merges_both() {
        let table = ts6_table();
        let mut chan = Channel::new("#test", 1_000_000);
        chan.apply_modes(&table, &[ParsedMode::new(true, 'n', None)]);
        chan.update_ts(&table, 1_000_000, &[ParsedMode::new(true, 's', None)]);
        assert!(chan.modes.contains_key(&'n'));
        assert!(chan.modes.contains_key(&'s'));
    }

    #[test]
    fn reverse_modes_computes_inverse_of_applied_change() {
        let table = ts6_table();
        let mut chan = Channel::new("#test", 1_000_000);
        chan.members.insert("UID1".into());
        let requested = vec![ParsedMode::new(true, 'o', Some("UID1".into()))];
        chan.apply_modes(&table, &requested);
        // The +o took effect, so reversing it should yield -o.
        let bounced = chan.reverse_modes(&table, &requested);
        assert_eq!(bounced, vec![ParsedMode::new(false, 'o', Some("UID1".into()))]);
        // Applying the bounce actually removes the op.
        chan.apply_modes(&table, &bounced);
        assert!(!chan.ranks_of("UID1").contains(&PrefixRank::Op));
    }

    #[test]
    fn reverse_modes_skips_changes_that_never_took_effect() {
        let table = ts6_table();
        let chan = Channel::new("#test", 1_000_000);
        // UID2 isn't a member, so +o UID2 never applies; nothing to bounce.
        let bounced = chan.reverse_modes(&table, &[ParsedMode::new(true, 'o', Some("UID2".into()))]);
        assert!(bounced.is_empty());
    }
}
