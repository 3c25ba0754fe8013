//! Generic glob and hostmask matching (spec §4.1).

use ipnet::IpNet;
use std::net::IpAddr;

/// Generic `?`/`*` glob matcher (case-insensitive, IRC casefold not applied
/// here — callers casefold both sides first when that matters).
pub fn match_text(glob: &str, text: &str) -> bool {
    let g: Vec<char> = glob.chars().collect();
    let t: Vec<char> = text.chars().collect();
    match_rec(&g, &t)
}

fn match_rec(g: &[char], t: &[char]) -> bool {
    match g.first() {
        None => t.is_empty(),
        Some('*') => {
            // Collapse consecutive '*' and try every split point.
            if match_rec(&g[1..], t) {
                return true;
            }
            !t.is_empty() && match_rec(g, &t[1..])
        }
        Some('?') => !t.is_empty() && match_rec(&g[1..], &t[1..]),
        Some(gc) => match t.first() {
            Some(tc) if gc.eq_ignore_ascii_case(tc) => match_rec(&g[1..], &t[1..]),
            _ => false,
        },
    }
}

/// A minimal view of a user, enough to evaluate a hostmask.
pub struct HostmaskSubject<'a> {
    pub nick: &'a str,
    pub ident: &'a str,
    pub host: &'a str,
    pub ip: Option<IpAddr>,
}

/// Match `nick!user@host` globs (with `?`/`*`), CIDR in the host portion,
/// and a leading `!` for negation (spec §4.1).
pub fn match_host(mask: &str, user: &HostmaskSubject<'_>) -> bool {
    let (negate, mask) = match mask.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, mask),
    };
    let result = match_host_positive(mask, user);
    result != negate
}

fn match_host_positive(mask: &str, user: &HostmaskSubject<'_>) -> bool {
    // nick!user@host, or a bare host/CIDR mask.
    let (nick_mask, rest) = match mask.split_once('!') {
        Some((n, r)) => (Some(n), r),
        None => (None, mask),
    };
    let (ident_mask, host_mask) = match rest.split_once('@') {
        Some((i, h)) => (Some(i), h),
        None => (None, rest),
    };

    if let Some(nm) = nick_mask
        && !match_text(nm, user.nick)
    {
        return false;
    }
    if let Some(im) = ident_mask
        && !match_text(im, user.ident)
    {
        return false;
    }

    if let Ok(net) = host_mask.parse::<IpNet>() {
        return user.ip.is_some_and(|ip| net.contains(&ip));
    }
    match_text(host_mask, user.host) || user.ip.is_some_and(|ip| match_text(host_mask, &ip.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject<'a>(nick: &'a str, ident: &'a str, host: &'a str, ip: Option<IpAddr>) -> HostmaskSubject<'a> {
        HostmaskSubject { nick, ident, host, ip }
    }

    #[test]
    fn plain_glob_matches() {
        assert!(match_text("*bad*", "this-is-bad-host"));
        assert!(!match_text("*bad*", "fine-host"));
        assert!(match_text("a?c", "abc"));
    }

    #[test]
    fn full_mask_matches() {
        let u = subject("alice", "alice", "example.com", None);
        assert!(match_host("alice!*@example.com", &u));
        assert!(!match_host("bob!*@example.com", &u));
    }

    #[test]
    fn negated_mask_inverts() {
        let u = subject("alice", "alice", "example.com", None);
        assert!(!match_host("!alice!*@example.com", &u));
        assert!(match_host("!bob!*@example.com", &u));
    }

    #[test]
    fn cidr_host_matches() {
        let ip: IpAddr = "192.168.1.42".parse().unwrap();
        let u = subject("alice", "alice", "some.host", Some(ip));
        assert!(match_host("*!*@192.168.1.0/24", &u));
        assert!(!match_host("*!*@10.0.0.0/8", &u));
    }
}
