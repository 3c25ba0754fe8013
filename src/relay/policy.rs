//! Pure decision functions for CLAIM, LINKACL, MODEDELTA, and the nick-tag
//! scheme (spec §4.7). Kept free of any network I/O so the CLAIM/LINKACL
//! testable properties (spec §8) can be exercised directly.

use super::db::RelayChannelEntry;
use crate::modes::ParsedMode;
use std::collections::HashSet;

/// Whether `network` may set/unset prefix (op/voice/...) modes on a
/// claimed channel without being bounced (spec §4.7: "CLAIM restricts
/// which networks may grant/revoke op-level status"). Claim is disabled
/// entirely when `claim_nets` is empty.
pub fn claim_permits(entry: &RelayChannelEntry, network: &str) -> bool {
    entry.claim_nets.is_empty() || entry.claim_nets.contains(network)
}

/// Split `modes` into (allowed, rejected) against CLAIM: prefix-mode
/// entries from a non-claiming network are rejected; everything else
/// (topic, +m, bans, ...) always passes CLAIM (it only gates status).
pub fn apply_claim<'a>(entry: &RelayChannelEntry, source_network: &str, modes: &'a [ParsedMode], is_prefix: impl Fn(char) -> bool) -> (Vec<ParsedMode>, Vec<ParsedMode>) {
    if claim_permits(entry, source_network) {
        return (modes.to_vec(), Vec::new());
    }
    let mut allowed = Vec::new();
    let mut rejected = Vec::new();
    for m in modes {
        if is_prefix(m.ch) {
            rejected.push(m.clone());
        } else {
            allowed.push(m.clone());
        }
    }
    (allowed, rejected)
}

/// Filter `modes` for relaying onward to one leaf, per LINKACL (spec
/// §4.7): whitelist mode keeps only chars in `linkacl_set`, blacklist mode
/// drops chars in `linkacl_set` and keeps everything else.
pub fn apply_linkacl(entry: &RelayChannelEntry, modes: &[ParsedMode]) -> Vec<ParsedMode> {
    modes
        .iter()
        .filter(|m| {
            let listed = entry.linkacl_set.contains(&m.ch);
            if entry.linkacl_mode {
                listed
            } else {
                !listed
            }
        })
        .cloned()
        .collect()
}

/// Append `leaf_net`'s MODEDELTA overrides (spec §4.7) to a relayed change
/// set, after LINKACL filtering.
pub fn apply_modedelta(entry: &RelayChannelEntry, leaf_net: &str, modes: Vec<ParsedMode>) -> Vec<ParsedMode> {
    let mut out = modes;
    if let Some(delta) = entry.modedelta.get(leaf_net) {
        for (ch, arg) in delta {
            out.push(ParsedMode::new(true, *ch, arg.clone()));
        }
    }
    out
}

/// Build nick-tag candidates for a home user's puppet on a leaf network,
/// in the order Relay should try them (spec §4.7: "nick collisions force
/// a fallback tag, then a transliterated fallback for leaves without
/// freeform nicks"). `taken` is the leaf's casefolded-in-use nick set.
pub fn tag_nick_candidates(nick: &str, home_network: &str) -> Vec<String> {
    vec![
        format!("{nick}/{home_network}"),
        format!("{nick}|{home_network}"),
        {
            use confusables::Confusable;
            format!("{}/{home_network}", nick.detect_replace_confusable())
        },
    ]
}

pub fn pick_untaken_nick(candidates: &[String], taken: &HashSet<String>) -> Option<String> {
    candidates.iter().find(|c| !taken.contains(&c.to_ascii_lowercase())).cloned()
}

/// Whether a real S2S KILL of a puppet on `leaf_net` (home `home_net`) is
/// honored rather than treated as something to recover from, per the
/// configured kill-share pools (spec §4.7).
pub fn kill_is_authoritative(kill_pools: &std::collections::HashMap<String, String>, home_net: &str, leaf_net: &str, leaf_has_kill: bool) -> bool {
    if !leaf_has_kill {
        return false;
    }
    match (kill_pools.get(home_net), kill_pools.get(leaf_net)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_with_claim(nets: &[&str]) -> RelayChannelEntry {
        RelayChannelEntry {
            claim_nets: nets.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn claim_disabled_when_empty_permits_everyone() {
        let entry = entry_with_claim(&[]);
        assert!(claim_permits(&entry, "anynet"));
    }

    #[test]
    fn claim_rejects_prefix_modes_from_non_claiming_network() {
        let entry = entry_with_claim(&["home"]);
        let modes = vec![ParsedMode::new(true, 'o', Some("UID1".into())), ParsedMode::new(true, 'm', None)];
        let (allowed, rejected) = apply_claim(&entry, "leaf", &modes, |c| c == 'o');
        assert_eq!(allowed, vec![ParsedMode::new(true, 'm', None)]);
        assert_eq!(rejected, vec![ParsedMode::new(true, 'o', Some("UID1".into()))]);
    }

    #[test]
    fn linkacl_whitelist_keeps_only_listed_chars() {
        let entry = RelayChannelEntry {
            linkacl_mode: true,
            linkacl_set: HashSet::from(['m', 's']),
            ..Default::default()
        };
        let modes = vec![ParsedMode::new(true, 'm', None), ParsedMode::new(true, 'b', Some("*!*@x".into()))];
        let filtered = apply_linkacl(&entry, &modes);
        assert_eq!(filtered, vec![ParsedMode::new(true, 'm', None)]);
    }

    #[test]
    fn linkacl_blacklist_drops_listed_chars() {
        let entry = RelayChannelEntry {
            linkacl_mode: false,
            linkacl_set: HashSet::from(['b']),
            ..Default::default()
        };
        let modes = vec![ParsedMode::new(true, 'm', None), ParsedMode::new(true, 'b', Some("*!*@x".into()))];
        let filtered = apply_linkacl(&entry, &modes);
        assert_eq!(filtered, vec![ParsedMode::new(true, 'm', None)]);
    }

    #[test]
    fn tag_nick_candidates_fall_back_in_order() {
        let taken = HashSet::from(["alice/home".to_string()]);
        let candidates = tag_nick_candidates("alice", "home");
        let picked = pick_untaken_nick(&candidates, &taken).unwrap();
        assert_eq!(picked, "alice|home");
    }

    #[test]
    fn kill_authoritative_requires_shared_pool_and_kill_capability() {
        let mut pools = std::collections::HashMap::new();
        pools.insert("home".to_string(), "clusterA".to_string());
        pools.insert("leaf".to_string(), "clusterA".to_string());
        assert!(kill_is_authoritative(&pools, "home", "leaf", true));
        assert!(!kill_is_authoritative(&pools, "home", "leaf", false));

        let mut disjoint = std::collections::HashMap::new();
        disjoint.insert("home".to_string(), "clusterA".to_string());
        disjoint.insert("leaf".to_string(), "clusterB".to_string());
        assert!(!kill_is_authoritative(&disjoint, "home", "leaf", true));
    }
}
