//! Process-wide permission checking (spec §4.6).
//!
//! Out of scope in the distilled spec is "the embedded permissions store";
//! what that leaves in scope, and what this module builds, is the `check()`
//! call and the exttarget-matching grammar service-bot commands gate on. The
//! backing map is a `DashMap` rather than the teacher's config-file-backed
//! store (that lives in [`crate::config`]) since plugins mutate it at
//! runtime (register on load, remove on unload) independent of any file.
//!
//! Deliberately separate from [`crate::modes::glob::match_host`]: that
//! function only understands plain `nick!user@host` globs plus CIDR, which
//! is exactly right for Relay's CLAIM/LINKACL masks but not rich enough for
//! exttargets (`$account`, `$ircop`, `$and:(...)`, ...). Rather than bolt
//! exttarget syntax onto the generic glob matcher, [`match_target`] here
//! wraps it: plain masks fall through to `match_host` unchanged, and `$`
//! prefixed targets get their own parsing.

use crate::modes::{match_host, match_text, HostmaskSubject, PrefixRank};
use crate::error::{PylinkError, Result};
use dashmap::DashMap;
use std::collections::HashMap;

/// Rank weight so `$channel:#chan:op` means "at least op", not "exactly
/// op" — `PrefixRank`'s derived `Ord` instead orders by declaration (Owner
/// lowest), which is right for display sorting but wrong for this.
fn rank_weight(rank: PrefixRank) -> u8 {
    match rank {
        PrefixRank::Owner => 5,
        PrefixRank::Admin => 4,
        PrefixRank::Op => 3,
        PrefixRank::Halfop => 2,
        PrefixRank::Voice => 1,
    }
}

fn parse_rank(s: &str) -> Option<PrefixRank> {
    match s.to_ascii_lowercase().as_str() {
        "owner" => Some(PrefixRank::Owner),
        "admin" => Some(PrefixRank::Admin),
        "op" => Some(PrefixRank::Op),
        "halfop" => Some(PrefixRank::Halfop),
        "voice" => Some(PrefixRank::Voice),
        _ => None,
    }
}

/// Everything [`match_target`] needs to know about the subject of a check,
/// gathered by the caller (usually via [`crate::network::NetworkHandle::query_user`])
/// since this module has no access to any network's live state itself.
pub struct PermissionSubject<'a> {
    pub host: HostmaskSubject<'a>,
    pub account: Option<&'a str>,
    pub is_ircop: bool,
    pub opertype: Option<&'a str>,
    pub network: &'a str,
    pub server_name: &'a str,
    pub server_sid: &'a str,
    pub pylink_login: Option<&'a str>,
    /// channel name -> highest rank held there, if any.
    pub channel_ranks: HashMap<String, PrefixRank>,
}

/// Match one target string (a plain hostmask or a `$`-prefixed exttarget,
/// optionally negated with a leading `!`) against `subject` (spec §4.6).
pub fn match_target(target: &str, subject: &PermissionSubject<'_>) -> bool {
    let (negate, rest) = match target.strip_prefix('!') {
        Some(r) => (true, r),
        None => (false, target),
    };
    match_target_positive(rest, subject) != negate
}

fn match_target_positive(target: &str, subject: &PermissionSubject<'_>) -> bool {
    if let Some(rest) = target.strip_prefix("$account") {
        let Some(account) = subject.account else { return false };
        if rest.is_empty() {
            return true;
        }
        let rest = rest.strip_prefix(':').unwrap_or(rest);
        let mut parts = rest.splitn(2, ':');
        let acct_glob = parts.next().unwrap_or("");
        let net_glob = parts.next();
        if !acct_glob.is_empty() && !match_text(acct_glob, account) {
            return false;
        }
        if let Some(ng) = net_glob {
            if !match_text(ng, subject.network) {
                return false;
            }
        }
        true
    } else if let Some(rest) = target.strip_prefix("$ircop") {
        if !subject.is_ircop {
            return false;
        }
        match rest.strip_prefix(':') {
            None => true,
            Some(type_glob) => subject.opertype.is_some_and(|t| match_text(type_glob, t)),
        }
    } else if let Some(rest) = target.strip_prefix("$server:") {
        match_text(rest, subject.server_name) || match_text(rest, subject.server_sid)
    } else if let Some(rest) = target.strip_prefix("$channel:") {
        let (chan, rank_glob) = match rest.split_once(':') {
            Some((c, r)) => (c, Some(r)),
            None => (rest, None),
        };
        let Some(have) = subject.channel_ranks.get(chan) else { return false };
        match rank_glob.and_then(parse_rank) {
            None => true,
            Some(want) => rank_weight(*have) >= rank_weight(want),
        }
    } else if let Some(rest) = target.strip_prefix("$pylinkacc") {
        let Some(login) = subject.pylink_login else { return false };
        match rest.strip_prefix(':') {
            None => true,
            Some(want) => match_text(want, login),
        }
    } else if let Some(rest) = target.strip_prefix("$network:") {
        match_text(rest, subject.network)
    } else if let Some(rest) = target.strip_prefix("$and:(").and_then(|r| r.strip_suffix(')')) {
        rest.split('+').all(|t| match_target(t, subject))
    } else {
        match_host(target, &subject.host)
    }
}

/// The process-wide `mask-or-exttarget -> [permission-glob]` map (spec
/// §4.6, §9 `world.permissions`). Config-loaded entries are kept apart from
/// plugin-registered defaults so that defaults never clobber an explicit
/// config entry for the same mask string, matching "defaults are
/// overridden by explicit configuration".
pub struct Permissions {
    explicit: DashMap<String, Vec<String>>,
    defaults: DashMap<(&'static str, String), Vec<String>>,
}

impl Default for Permissions {
    fn default() -> Self {
        Self::new()
    }
}

impl Permissions {
    pub fn new() -> Self {
        Self { explicit: DashMap::new(), defaults: DashMap::new() }
    }

    /// Replace the explicit (config-loaded) entries wholesale; called on
    /// load and REHASH.
    pub fn load_explicit(&self, entries: HashMap<String, Vec<String>>) {
        self.explicit.clear();
        for (mask, globs) in entries {
            self.explicit.insert(mask, globs);
        }
    }

    /// A plugin registers its default grants on load (spec §4.6).
    pub fn register_defaults(&self, plugin: &'static str, mask: impl Into<String>, globs: Vec<String>) {
        self.defaults.insert((plugin, mask.into()), globs);
    }

    /// Remove every default a plugin registered, called on unload.
    pub fn remove_defaults(&self, plugin: &'static str) {
        self.defaults.retain(|(p, _), _| *p != plugin);
    }

    /// Returns `Ok(())` if any entry whose mask matches `subject` grants a
    /// glob matching one of `required_nodes`, else `Err(NotAuthorized)`
    /// (spec §4.6).
    pub fn check(&self, subject: &PermissionSubject<'_>, required_nodes: &[&str]) -> Result<()> {
        for entry in self.explicit.iter() {
            if match_target(entry.key(), subject) && grants(entry.value(), required_nodes) {
                return Ok(());
            }
        }
        for entry in self.defaults.iter() {
            let mask = &entry.key().1;
            if self.explicit.contains_key(mask) {
                continue; // explicit config overrides a plugin default for this exact mask
            }
            if match_target(mask, subject) && grants(entry.value(), required_nodes) {
                return Ok(());
            }
        }
        Err(PylinkError::NotAuthorized(required_nodes.join(", ")))
    }
}

fn grants(globs: &[String], required_nodes: &[&str]) -> bool {
    globs.iter().any(|glob| required_nodes.iter().any(|node| match_text(glob, node)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::IpAddr;

    fn subject<'a>(host: &'a str, ident: &'a str, nick: &'a str, ircop: bool, account: Option<&'a str>) -> PermissionSubject<'a> {
        PermissionSubject {
            host: HostmaskSubject { nick, ident, host, ip: None::<IpAddr> },
            account,
            is_ircop: ircop,
            opertype: None,
            network: "testnet",
            server_name: "services.example",
            server_sid: "1AA",
            pylink_login: None,
            channel_ranks: HashMap::new(),
        }
    }

    #[test]
    fn and_target_matches_host_and_not_ircop() {
        let target = "$and:(*!*@example.com+!$ircop)";
        let non_op = subject("example.com", "user", "alice", false, None);
        assert!(match_target(target, &non_op));
        let op = subject("example.com", "user", "bob", true, None);
        assert!(!match_target(target, &op));
        let wrong_host = subject("other.com", "user", "carol", false, None);
        assert!(!match_target(target, &wrong_host));
    }

    #[test]
    fn account_exttarget_matches_account_and_optional_network() {
        let s = subject("host", "ident", "nick", false, Some("alice"));
        assert!(match_target("$account", &s));
        assert!(match_target("$account:alice", &s));
        assert!(!match_target("$account:bob", &s));
        assert!(match_target("$account:alice:testnet", &s));
        assert!(!match_target("$account:alice:othernet", &s));
    }

    #[test]
    fn permissions_check_honors_explicit_override_of_plugin_default() {
        let perms = Permissions::new();
        perms.register_defaults("relay", "*!*@*", vec!["relay.*".to_string()]);
        perms.load_explicit(HashMap::from([("*!*@*".to_string(), vec!["nothing.allowed".to_string()])]));
        let s = subject("host", "ident", "nick", false, None);
        assert!(perms.check(&s, &["relay.create"]).is_err());
    }

    #[test]
    fn permissions_check_falls_back_to_plugin_default() {
        let perms = Permissions::new();
        perms.register_defaults("relay", "*!*@*", vec!["relay.*".to_string()]);
        let s = subject("host", "ident", "nick", false, None);
        assert!(perms.check(&s, &["relay.create"]).is_ok());
    }
}
