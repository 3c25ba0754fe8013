//! Reply wrapping and the shared `list` handler (spec §4.5).

use super::bot::{CommandContext, ServiceBot};
use futures_util::future::BoxFuture;
use std::sync::Arc;

/// `Fn(ctx) -> Vec<String>` reply lines, boxed so `ServiceBot` commands can
/// be async (a relay command typically needs to query or mutate live
/// network state before it can answer).
pub type CommandHandler = Arc<dyn Fn(CommandContext) -> BoxFuture<'static, Vec<String>> + Send + Sync>;

/// One entry in a bot's command table (spec §4.5: "handler, optional
/// aliases, permission node, a `featured` flag for the default listing").
pub struct CommandEntry {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub permission_node: Option<&'static str>,
    pub featured: bool,
    pub handler: CommandHandler,
}

/// Word-wrap `text` into lines of at most 400 bytes, splitting on
/// whitespace (spec §4.5). A single word longer than the limit is hard-cut
/// rather than left to overflow the line.
pub fn wrap_reply(text: &str) -> Vec<String> {
    const MAX: usize = 400;
    if text.len() <= MAX {
        return vec![text.to_string()];
    }
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split(' ') {
        let extra = usize::from(!current.is_empty());
        if current.len() + extra + word.len() > MAX {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let mut rest = word;
            while rest.len() > MAX {
                let (head, tail) = rest.split_at(MAX);
                lines.push(head.to_string());
                rest = tail;
            }
            current = rest.to_string();
        } else {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// A default `list` command builder every bot registers, showing every
/// `featured` entry in its own table (spec §4.5's "featured flag for
/// default LIST").
pub fn list_handler(bot: Arc<ServiceBot>) -> CommandHandler {
    Arc::new(move |_ctx: CommandContext| {
        let bot = Arc::clone(&bot);
        Box::pin(async move {
            let mut names = bot.list_featured();
            names.sort_unstable();
            if names.is_empty() {
                vec!["No commands available.".to_string()]
            } else {
                vec![format!("Available commands: {}", names.join(", "))]
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_line() {
        assert_eq!(wrap_reply("hello world"), vec!["hello world".to_string()]);
    }

    #[test]
    fn long_text_wraps_under_400_bytes() {
        let word = "a".repeat(50);
        let text = vec![word; 20].join(" ");
        let lines = wrap_reply(&text);
        assert!(lines.len() > 1);
        for line in &lines {
            assert!(line.len() <= 400);
        }
        assert_eq!(lines.join(" "), text);
    }

    #[test]
    fn oversized_single_word_is_hard_cut() {
        let word = "x".repeat(900);
        let lines = wrap_reply(&word);
        assert!(lines.len() >= 3);
        assert!(lines.iter().all(|l| l.len() <= 400));
    }
}
