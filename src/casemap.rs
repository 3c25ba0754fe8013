//! IRC case-folding (spec §4.1).
//!
//! `slirc-proto::casemap` only implements RFC1459. PyLink needs all three
//! ISUPPORT `CASEMAPPING` variants because each uplink network declares its
//! own, so this is reimplemented here over a runtime-selected [`Casemap`]
//! rather than hardcoded to one mapping.

use serde::{Deserialize, Serialize};

/// The casemapping a network advertises via ISUPPORT `CASEMAPPING`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Casemap {
    /// Lowercases ASCII and maps `[]\~` to `{}|^`.
    #[default]
    Rfc1459,
    /// Like RFC1459 but leaves `^` alone (ratbox/charybdis/TS6 default).
    StrictRfc1459,
    /// Plain ASCII case-folding only.
    Ascii,
}

impl Casemap {
    /// Parse an ISUPPORT `CASEMAPPING` token value.
    pub fn from_isupport(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "ascii" => Self::Ascii,
            "strict-rfc1459" => Self::StrictRfc1459,
            _ => Self::Rfc1459,
        }
    }
}

/// Case-fold a single character under `casemap`.
pub fn fold_char(c: char, casemap: Casemap) -> char {
    match casemap {
        Casemap::Ascii => c.to_ascii_lowercase(),
        Casemap::Rfc1459 => match c {
            '[' => '{',
            ']' => '}',
            '\\' => '|',
            '^' => '~',
            _ => c.to_ascii_lowercase(),
        },
        Casemap::StrictRfc1459 => match c {
            '[' => '{',
            ']' => '}',
            '\\' => '|',
            _ => c.to_ascii_lowercase(),
        },
    }
}

/// Case-fold an entire string under `casemap` (used as the canonical key
/// for nick/channel indices).
pub fn case_fold(text: &str, casemap: Casemap) -> String {
    text.chars().map(|c| fold_char(c, casemap)).collect()
}

/// Case-insensitive equality under `casemap`.
pub fn case_eq(a: &str, b: &str, casemap: Casemap) -> bool {
    case_fold(a, casemap) == case_fold(b, casemap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc1459_maps_tilde_and_caret() {
        assert_eq!(case_fold("Nick^Away", Casemap::Rfc1459), "nick~away");
        assert_eq!(case_fold("[Bracket]", Casemap::Rfc1459), "{bracket}");
    }

    #[test]
    fn strict_rfc1459_leaves_caret() {
        assert_eq!(case_fold("Nick^Away", Casemap::StrictRfc1459), "nick^away");
    }

    #[test]
    fn ascii_leaves_special_chars() {
        assert_eq!(case_fold("[Nick]", Casemap::Ascii), "[nick]");
    }

    #[test]
    fn from_isupport_defaults_to_rfc1459() {
        assert_eq!(Casemap::from_isupport("bogus"), Casemap::Rfc1459);
        assert_eq!(Casemap::from_isupport("ASCII"), Casemap::Ascii);
    }
}
