//! Stateless mode-string parsing and (re)serialization (spec §4.1).
//!
//! `apply_modes`/`reverse_modes`, which need current target state, live as
//! methods on [`crate::state::channel::Channel`] and
//! [`crate::state::user::User`] — this module only covers the parts that
//! don't need a target: tokenizing `+o-b nick mask` into [`ParsedMode`]s and
//! re-serializing a parsed list back into wire lines.

use super::types::{ModeClass, ModeTable, ParsedMode, PrefixRank};

/// Parse a mode-change token list (`["+o-b", "nick", "mask"]`) against
/// `table`. `resolve_uid` normalizes a prefix-mode argument (a nick or
/// already-a-UID) to a UID; it returns `None` for an unknown target, which
/// drops that entry (spec §4.1: "invalid entries ... nonexistent target for
/// prefix modes").
pub fn parse_modes(
    tokens: &[&str],
    table: &ModeTable,
    mut resolve_uid: impl FnMut(&str) -> Option<String>,
) -> Vec<ParsedMode> {
    let mut out = Vec::new();
    let Some((mode_str, rest)) = tokens.split_first() else {
        return out;
    };
    let mut args = rest.iter().copied();
    let mut plus = true;

    for c in mode_str.chars() {
        match c {
            '+' => plus = true,
            '-' => plus = false,
            _ => {
                let Some(class) = table.chan_class(c).or_else(|| table.user_class(c)) else {
                    // Unknown mode character: ignored per-protocol rather
                    // than rejecting the whole line.
                    continue;
                };
                let takes_arg = if plus {
                    class.takes_arg_on_set()
                } else {
                    class.takes_arg_on_unset()
                };

                let arg = if takes_arg {
                    match args.next() {
                        Some(a) => Some(a.to_string()),
                        None => continue, // missing argument: drop entry
                    }
                } else {
                    None
                };

                let arg = if let ModeClass::Prefix(_) = class {
                    match arg.and_then(|a| resolve_uid(&a)) {
                        Some(uid) => Some(uid),
                        None => continue, // nonexistent target
                    }
                } else {
                    arg
                };

                out.push(ParsedMode::new(plus, c, arg));
            }
        }
    }
    out
}

/// Sort order used for display: prefix modes high->low rank, then other
/// modes alphabetically (spec §4.1).
fn sort_key(table: &ModeTable, m: &ParsedMode) -> (u8, char) {
    match table.chan_class(m.ch) {
        Some(ModeClass::Prefix(rank)) => (prefix_rank_order(rank), m.ch),
        _ => (u8::MAX, m.ch),
    }
}

fn prefix_rank_order(rank: PrefixRank) -> u8 {
    match rank {
        PrefixRank::Owner => 0,
        PrefixRank::Admin => 1,
        PrefixRank::Op => 2,
        PrefixRank::Halfop => 3,
        PrefixRank::Voice => 4,
    }
}

/// Serialize a parsed mode list into one or more wire lines, each at most
/// `max_modes_per_line` mode changes, e.g. `["+ntb *!*@bad.host"]`.
///
/// When `use_sorting` is set, entries are ordered per [`sort_key`] before
/// chunking (spec §4.1: "used for display").
pub fn join_modes(parsed: &[ParsedMode], table: &ModeTable, use_sorting: bool) -> Vec<String> {
    if parsed.is_empty() {
        return Vec::new();
    }
    let mut entries: Vec<&ParsedMode> = parsed.iter().collect();
    if use_sorting {
        entries.sort_by_key(|m| sort_key(table, m));
    }

    let max = table.max_modes_per_line.max(1);
    entries
        .chunks(max)
        .map(|chunk| {
            let mut chars = String::new();
            let mut args = Vec::new();
            let mut last_plus: Option<bool> = None;
            for m in chunk {
                if last_plus != Some(m.plus) {
                    chars.push(if m.plus { '+' } else { '-' });
                    last_plus = Some(m.plus);
                }
                chars.push(m.ch);
                if let Some(arg) = &m.arg {
                    args.push(arg.clone());
                }
            }
            if args.is_empty() {
                chars
            } else {
                format!("{chars} {}", args.join(" "))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts6_table() -> ModeTable {
        ModeTable::from_isupport("eIb,k,l,imnpst", "(ov)@+")
    }

    #[test]
    fn parses_ban_and_toggle_modes() {
        let table = ts6_table();
        let parsed = parse_modes(&["+nt"], &table, |_| None);
        assert_eq!(parsed, vec![ParsedMode::new(true, 'n', None), ParsedMode::new(true, 't', None)]);
    }

    #[test]
    fn combined_plus_minus_same_mask_kept_as_two_entries() {
        let table = ts6_table();
        let parsed = parse_modes(
            &["+b-b", "*!*@x", "*!*@x"],
            &table,
            |_| None,
        );
        assert_eq!(parsed.len(), 2);
        assert!(parsed[0].plus);
        assert!(!parsed[1].plus);
        assert_eq!(parsed[0].arg.as_deref(), Some("*!*@x"));
        assert_eq!(parsed[1].arg.as_deref(), Some("*!*@x"));
    }

    #[test]
    fn prefix_mode_resolves_nick_to_uid() {
        let table = ts6_table();
        let parsed = parse_modes(&["+o", "alice"], &table, |n| {
            (n == "alice").then(|| "1AAAAAAAA".to_string())
        });
        assert_eq!(parsed, vec![ParsedMode::new(true, 'o', Some("1AAAAAAAA".into()))]);
    }

    #[test]
    fn prefix_mode_drops_nonexistent_target() {
        let table = ts6_table();
        let parsed = parse_modes(&["+o", "ghost"], &table, |_| None);
        assert!(parsed.is_empty());
    }

    #[test]
    fn set_arg_mode_has_no_arg_when_unset() {
        let table = ts6_table();
        // -l takes no argument, +l does.
        let parsed = parse_modes(&["-l"], &table, |_| None);
        assert_eq!(parsed, vec![ParsedMode::new(false, 'l', None)]);
    }

    #[test]
    fn join_modes_respects_max_per_line() {
        let mut table = ts6_table();
        table.max_modes_per_line = 2;
        let parsed = vec![
            ParsedMode::new(true, 'o', Some("1AAAAAAAA".into())),
            ParsedMode::new(true, 'o', Some("1AAAAAAAB".into())),
            ParsedMode::new(true, 'v', Some("1AAAAAAAC".into())),
        ];
        let lines = join_modes(&parsed, &table, false);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "+oo 1AAAAAAAA 1AAAAAAAB");
        assert_eq!(lines[1], "+v 1AAAAAAAC");
    }

    #[test]
    fn join_modes_sorts_prefix_modes_high_to_low() {
        let table = ts6_table();
        let parsed = vec![
            ParsedMode::new(true, 'v', Some("u2".into())),
            ParsedMode::new(true, 'o', Some("u1".into())),
            ParsedMode::new(true, 'n', None),
        ];
        let lines = join_modes(&parsed, &table, true);
        assert_eq!(lines, vec!["+ovn u1 u2"]);
    }

    #[test]
    fn roundtrip_through_join_and_parse() {
        let table = ts6_table();
        let parsed = parse_modes(&["+nt"], &table, |_| None);
        let joined = join_modes(&parsed, &table, true);
        let tokens: Vec<&str> = joined[0].split(' ').collect();
        let reparsed = parse_modes(&tokens, &table, |_| None);
        assert_eq!(parsed, reparsed);
    }
}
