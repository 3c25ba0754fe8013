//! Generic S2S wire-line parsing shared across protocol adapters (spec §4.3).
//!
//! slirc-proto's [`slirc_proto::Message`]/`Command` enum bakes in a single
//! client-facing protocol (it hardcodes e.g. a TS6-shaped `PassTs6` variant)
//! and doesn't fit six heterogeneous S2S dialects, so S2S lines are framed
//! here as an untyped `prefix COMMAND args... :trailing` tuple and each
//! adapter in `protocols/` interprets its own command set.

use std::fmt;

/// One decoded S2S line. Shaped like an IRC line in general (RFC 1459 §2.3.1)
/// but without any protocol-specific command vocabulary attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Leading `:prefix`, if any (a SID, UID, or full nick!user@host).
    pub prefix: Option<String>,
    pub command: String,
    pub args: Vec<String>,
}

impl RawMessage {
    pub fn new(prefix: Option<impl Into<String>>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            prefix: prefix.map(Into::into),
            command: command.into(),
            args,
        }
    }

    pub fn arg(&self, i: usize) -> Option<&str> {
        self.args.get(i).map(String::as_str)
    }

    /// Parse a single line with CRLF/LF already stripped.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return None;
        }
        let mut rest = line;

        let prefix = if let Some(stripped) = rest.strip_prefix(':') {
            let (p, r) = stripped.split_once(' ').unwrap_or((stripped, ""));
            rest = r;
            Some(p.to_string())
        } else {
            None
        };

        let (body, trailing) = match rest.split_once(" :") {
            Some((b, t)) => (b, Some(t)),
            None => (rest, None),
        };

        let mut args: Vec<String> = body.split(' ').filter(|s| !s.is_empty()).map(String::from).collect();
        if args.is_empty() && trailing.is_none() {
            return None;
        }
        let command = if args.is_empty() {
            // a bare `:prefix :trailing` with no command is malformed; treat
            // trailing (if any) as belonging to a missing command instead
            String::new()
        } else {
            args.remove(0)
        };
        if command.is_empty() {
            return None;
        }
        if let Some(t) = trailing {
            args.push(t.to_string());
        }

        Some(Self { prefix, command: command.to_ascii_uppercase(), args })
    }
}

impl fmt::Display for RawMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(p) = &self.prefix {
            write!(f, ":{p} ")?;
        }
        write!(f, "{}", self.command)?;
        if let Some((last, rest)) = self.args.split_last() {
            for a in rest {
                write!(f, " {a}")?;
            }
            if last.is_empty() || last.contains(' ') || last.starts_with(':') {
                write!(f, " :{last}")?;
            } else {
                write!(f, " {last}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prefixed_command_with_trailing() {
        let msg = RawMessage::parse(":1AA UID Alice 1 1700000000 ~alice host.example 1AAAAAAAA + :Alice Example").unwrap();
        assert_eq!(msg.prefix.as_deref(), Some("1AA"));
        assert_eq!(msg.command, "UID");
        assert_eq!(msg.args[0], "Alice");
        assert_eq!(msg.args.last().unwrap(), "Alice Example");
    }

    #[test]
    fn parses_command_with_no_prefix_no_trailing() {
        let msg = RawMessage::parse("PING :1AA").unwrap();
        assert_eq!(msg.prefix, None);
        assert_eq!(msg.command, "PING");
        assert_eq!(msg.args, vec!["1AA".to_string()]);
    }

    #[test]
    fn roundtrips_through_display() {
        let msg = RawMessage::new(Some("1AA"), "SJOIN", vec!["1700000000".into(), "#chan".into(), "+nt".into(), "1AAAAAAAA".into()]);
        let rendered = msg.to_string();
        let reparsed = RawMessage::parse(&rendered).unwrap();
        assert_eq!(msg, reparsed);
    }

    #[test]
    fn empty_line_yields_none() {
        assert!(RawMessage::parse("").is_none());
        assert!(RawMessage::parse("\r\n").is_none());
    }
}
