//! Mode tables and parsed-mode types (spec §4.1, §4.2).
//!
//! Unlike the teacher's fixed `ChannelMode`/`UserMode` enums, every uplink
//! family here can have a different mode alphabet (ISUPPORT `CHANMODES`,
//! `PREFIX`), so modes are addressed by `char` against a per-network
//! [`ModeTable`] built once at connection registration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// CHANMODES argument class (ISUPPORT `CHANMODES=A,B,C,D`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModeClass {
    /// List mode (e.g. `+b`): always takes an arg when set *or* unset,
    /// multiple values coexist.
    ListA,
    /// Always takes an arg, not a list (e.g. `+k`).
    AlwaysArgB,
    /// Takes an arg only when setting (e.g. `+l`).
    SetArgC,
    /// Never takes an arg (e.g. `+n`).
    NoArgD,
    /// A prefix (rank) mode; arg is always a nick/UID.
    Prefix(PrefixRank),
}

impl ModeClass {
    /// Whether setting (`+`) this mode consumes an argument.
    pub fn takes_arg_on_set(self) -> bool {
        !matches!(self, ModeClass::NoArgD)
    }

    /// Whether unsetting (`-`) this mode consumes an argument.
    pub fn takes_arg_on_unset(self) -> bool {
        matches!(
            self,
            ModeClass::ListA | ModeClass::AlwaysArgB | ModeClass::Prefix(_)
        )
    }

    /// Whether this mode's applied entries are a list (dedup key includes arg).
    pub fn is_list(self) -> bool {
        matches!(self, ModeClass::ListA | ModeClass::Prefix(_))
    }
}

/// Channel membership rank, ordered high to low for display sorting
/// (spec §4.1: "prefix modes high→low").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PrefixRank {
    /// `~` owner
    Owner,
    /// `&` admin
    Admin,
    /// `@` op
    Op,
    /// `%` halfop
    Halfop,
    /// `+` voice
    Voice,
}

impl PrefixRank {
    /// All ranks, highest first.
    pub const ALL: [PrefixRank; 5] = [
        PrefixRank::Owner,
        PrefixRank::Admin,
        PrefixRank::Op,
        PrefixRank::Halfop,
        PrefixRank::Voice,
    ];
}

/// Per-network mode alphabet, built from ISUPPORT tokens or a protocol's
/// hardcoded defaults at connection registration.
#[derive(Debug, Clone, Default)]
pub struct ModeTable {
    /// Channel mode char -> class, including prefix modes.
    pub chanmodes: HashMap<char, ModeClass>,
    /// User mode char -> class (almost always `NoArgD`, a few protocols add
    /// argument-taking umodes such as InspIRCd's snomask `+s <mask>`).
    pub umodes: HashMap<char, ModeClass>,
    /// PREFIX mode char -> display symbol, e.g. `('o', '@')`.
    pub prefix_symbols: HashMap<char, char>,
    /// Maximum number of mode changes the protocol allows per line.
    pub max_modes_per_line: usize,
}

impl ModeTable {
    /// Look up a channel mode's class.
    pub fn chan_class(&self, c: char) -> Option<ModeClass> {
        self.chanmodes.get(&c).copied()
    }

    /// Look up a user mode's class.
    pub fn user_class(&self, c: char) -> Option<ModeClass> {
        self.umodes.get(&c).copied()
    }

    /// Parse an ISUPPORT `CHANMODES=eIb,k,l,imnpst` token into A/B/C/D
    /// classes, then overlay `PREFIX=(ov)@+` ranks on top.
    pub fn from_isupport(chanmodes_token: &str, prefix_token: &str) -> Self {
        let mut table = ModeTable {
            max_modes_per_line: 4,
            ..Default::default()
        };
        let groups: Vec<&str> = chanmodes_token.split(',').collect();
        let classes = [
            ModeClass::ListA,
            ModeClass::AlwaysArgB,
            ModeClass::SetArgC,
            ModeClass::NoArgD,
        ];
        for (group, class) in groups.into_iter().zip(classes.into_iter()) {
            for c in group.chars() {
                table.chanmodes.insert(c, class);
            }
        }
        table.apply_prefix_token(prefix_token);
        table
    }

    /// Reverse-lookup a PREFIX display symbol (e.g. `@`) back to its mode
    /// char and rank, used when parsing SJOIN-style `@+UID` membership
    /// tokens off the wire.
    pub fn mode_for_symbol(&self, symbol: char) -> Option<(char, PrefixRank)> {
        let letter = self.prefix_symbols.iter().find(|(_, s)| **s == symbol).map(|(c, _)| *c)?;
        match self.chanmodes.get(&letter) {
            Some(ModeClass::Prefix(rank)) => Some((letter, *rank)),
            _ => None,
        }
    }

    /// Overlay a `PREFIX=(ohv)@%+`-style token. Rank order follows the
    /// letter order given (first letter = highest rank).
    pub fn apply_prefix_token(&mut self, prefix_token: &str) {
        let Some(rest) = prefix_token.strip_prefix('(') else {
            return;
        };
        let Some((letters, symbols)) = rest.split_once(')') else {
            return;
        };
        let ranks = PrefixRank::ALL;
        for (i, (letter, symbol)) in letters.chars().zip(symbols.chars()).enumerate() {
            let rank = ranks.get(i).copied().unwrap_or(PrefixRank::Voice);
            self.chanmodes.insert(letter, ModeClass::Prefix(rank));
            self.prefix_symbols.insert(letter, symbol);
        }
    }
}

/// A single parsed mode change, e.g. `+o` with arg `UID123`, or `-b` with
/// arg `*!*@bad.host`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedMode {
    /// `true` for `+`, `false` for `-`.
    pub plus: bool,
    /// The mode character.
    pub ch: char,
    /// The argument, if any (already normalized nick->UID for prefix modes
    /// by the caller).
    pub arg: Option<String>,
}

impl ParsedMode {
    /// Construct a `+`/`-` entry.
    pub fn new(plus: bool, ch: char, arg: Option<String>) -> Self {
        Self { plus, ch, arg }
    }

    /// The inverse of this change (`+o X` <-> `-o X`), same arg.
    pub fn inverted(&self) -> Self {
        Self {
            plus: !self.plus,
            ch: self.ch,
            arg: self.arg.clone(),
        }
    }
}
