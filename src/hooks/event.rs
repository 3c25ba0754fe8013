//! Normalized hook event vocabulary (spec §6.2).
//!
//! The teacher's source (PyLink) models hook args as a loosely-typed dict;
//! per spec §9 ("sum-typed hook payloads rather than a single dict") this is
//! a proper Rust enum, one variant per command, each carrying only the
//! fields that command actually has.

use crate::modes::ParsedMode;
use std::collections::HashMap;

/// A snapshot of a user, attached to KILL/QUIT hooks so handlers can see
/// what was destroyed without a live lookup racing the removal.
#[derive(Debug, Clone)]
pub struct UserSnapshot {
    pub uid: String,
    pub nick: String,
    pub ident: String,
    pub host: String,
    pub channels: Vec<String>,
}

/// A pre-change snapshot of a channel, attached to MODE hooks.
#[derive(Debug, Clone)]
pub struct ChannelSnapshot {
    pub name: String,
    pub ts: i64,
    pub modes: Vec<ParsedMode>,
}

/// One variant per §6.2 command. `ts` lives on the wrapping [`super::HookEvent`].
#[derive(Debug, Clone)]
pub enum HookPayload {
    Join {
        channel: String,
        users: Vec<String>,
        modes: Vec<ParsedMode>,
    },
    Part {
        channels: Vec<String>,
        text: Option<String>,
    },
    Kick {
        channel: String,
        target: String,
        text: Option<String>,
    },
    Kill {
        target: String,
        text: String,
        userdata: Option<UserSnapshot>,
    },
    Quit {
        text: String,
        userdata: Option<UserSnapshot>,
    },
    Nick {
        newnick: String,
        oldnick: String,
    },
    Notice {
        target: String,
        text: String,
    },
    Privmsg {
        target: String,
        text: String,
    },
    Mode {
        target: String,
        modes: Vec<ParsedMode>,
        channeldata: Option<ChannelSnapshot>,
    },
    Topic {
        channel: String,
        setter: String,
        text: String,
        oldtopic: Option<String>,
    },
    Uid {
        uid: String,
        nick: String,
        realhost: String,
        host: String,
        ident: String,
        ip: Option<String>,
        secure: Option<bool>,
    },
    Squit {
        target: String,
        users: Vec<String>,
        name: String,
        uplink: Option<String>,
        nicks: HashMap<String, Vec<String>>,
        affected_servers: Vec<String>,
    },
    Chghost {
        target: String,
        newhost: String,
    },
    Chgident {
        target: String,
        newident: String,
    },
    Chgname {
        target: String,
        newgecos: String,
    },
    Invite {
        target: String,
        channel: String,
    },
    Knock {
        channel: String,
        text: String,
    },
    Save {
        target: String,
        oldnick: String,
    },
    Svsnick {
        target: String,
        newnick: String,
    },
    Away {
        text: Option<String>,
    },
    Version,
    Whois {
        target: String,
    },
    ClientServicesLogin {
        text: Option<String>,
    },
    ClientOpered {
        text: String,
    },
    PylinkNewService {
        name: String,
    },
    PylinkCustomWhois {
        target: String,
        server: String,
    },
    PylinkDisconnect {
        was_successful: bool,
    },
    Endburst,
}

impl HookPayload {
    /// The §6.2 command name this payload represents.
    pub fn command_name(&self) -> &'static str {
        match self {
            Self::Join { .. } => "JOIN",
            Self::Part { .. } => "PART",
            Self::Kick { .. } => "KICK",
            Self::Kill { .. } => "KILL",
            Self::Quit { .. } => "QUIT",
            Self::Nick { .. } => "NICK",
            Self::Notice { .. } => "NOTICE",
            Self::Privmsg { .. } => "PRIVMSG",
            Self::Mode { .. } => "MODE",
            Self::Topic { .. } => "TOPIC",
            Self::Uid { .. } => "UID",
            Self::Squit { .. } => "SQUIT",
            Self::Chghost { .. } => "CHGHOST",
            Self::Chgident { .. } => "CHGIDENT",
            Self::Chgname { .. } => "CHGNAME",
            Self::Invite { .. } => "INVITE",
            Self::Knock { .. } => "KNOCK",
            Self::Save { .. } => "SAVE",
            Self::Svsnick { .. } => "SVSNICK",
            Self::Away { .. } => "AWAY",
            Self::Version => "VERSION",
            Self::Whois { .. } => "WHOIS",
            Self::ClientServicesLogin { .. } => "CLIENT_SERVICES_LOGIN",
            Self::ClientOpered { .. } => "CLIENT_OPERED",
            Self::PylinkNewService { .. } => "PYLINK_NEW_SERVICE",
            Self::PylinkCustomWhois { .. } => "PYLINK_CUSTOM_WHOIS",
            Self::PylinkDisconnect { .. } => "PYLINK_DISCONNECT",
            Self::Endburst => "ENDBURST",
        }
    }
}

/// A dispatched hook: network, source (UID/SID), command, `ts`, and payload.
#[derive(Debug, Clone)]
pub struct HookEvent {
    pub network: String,
    pub source: String,
    pub ts: i64,
    pub payload: HookPayload,
}

impl HookEvent {
    pub fn command(&self) -> &'static str {
        self.payload.command_name()
    }
}
