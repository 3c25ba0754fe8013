//! The `User` entity (spec §3).

use std::collections::HashSet;
use std::net::IpAddr;

/// TLS-secure tri-state reported by some protocols (spec §3's `secure`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Secure {
    #[default]
    Unknown,
    Plain,
    Tls,
}

/// A user known to a network, keyed by its network-scoped UID.
#[derive(Debug, Clone)]
pub struct User {
    pub uid: String,
    pub nick: String,
    pub ident: String,
    pub host: String,
    pub realhost: String,
    pub cloaked_host: String,
    pub ip: Option<IpAddr>,
    pub realname: String,
    pub signon_ts: i64,
    pub nick_ts: i64,
    pub opered: bool,
    pub opertype: Option<String>,
    pub services_account: Option<String>,
    pub away: Option<String>,
    pub secure: Secure,
    pub channels: HashSet<String>,
    pub modes: HashSet<char>,
    pub manipulatable: bool,
    pub server_sid: String,
}

impl User {
    pub fn new(uid: impl Into<String>, nick: impl Into<String>, server_sid: impl Into<String>, ts: i64) -> Self {
        let nick = nick.into();
        Self {
            uid: uid.into(),
            nick,
            ident: String::new(),
            host: String::new(),
            realhost: String::new(),
            cloaked_host: String::new(),
            ip: None,
            realname: String::new(),
            signon_ts: ts,
            nick_ts: ts,
            opered: false,
            opertype: None,
            services_account: None,
            away: None,
            secure: Secure::Unknown,
            channels: HashSet::new(),
            modes: HashSet::new(),
            manipulatable: false,
            server_sid: server_sid.into(),
        }
    }

    pub fn is_away(&self) -> bool {
        self.away.is_some()
    }

    pub fn set_away(&mut self, text: Option<String>) {
        self.away = text.filter(|t| !t.is_empty());
    }
}
