//! The Relay bot's command table (spec §4.7): CREATE/DESTROY/LINK/DELINK/
//! LINKED/CLAIM/LINKACL/CHANDESC/SAVEDB, each gated on its own permission
//! node. Grounded in the reply shape `services/bot.rs` already establishes;
//! every handler here just validates args and calls straight through to
//! [`RelayEngine`]'s synchronous methods.

use super::engine::RelayEngine;
use crate::services::{CommandContext, CommandEntry, ServiceBot};
use std::collections::HashSet;
use std::sync::Arc;

fn entry(
    name: &'static str,
    aliases: &'static [&'static str],
    permission_node: &'static str,
    featured: bool,
    handler: impl Fn(CommandContext) -> futures_util::future::BoxFuture<'static, Vec<String>> + Send + Sync + 'static,
) -> CommandEntry {
    CommandEntry {
        name,
        aliases,
        permission_node: Some(permission_node),
        featured,
        handler: Arc::new(handler),
    }
}

pub fn register(bot: &Arc<ServiceBot>, engine: Arc<RelayEngine>) {
    bot.add_command(entry("create", &[], "relay.create", true, {
        let engine = Arc::clone(&engine);
        move |ctx: CommandContext| {
            let engine = Arc::clone(&engine);
            Box::pin(async move {
                let Some(channel) = ctx.args.first() else {
                    return vec!["Usage: CREATE #channel".to_string()];
                };
                if !channel.starts_with('#') {
                    return vec!["Channel names must start with '#'.".to_string()];
                }
                engine.create_channel(&ctx.network, channel);
                vec![format!("Created relay channel {channel} on {}.", ctx.network)]
            })
        }
    }));

    bot.add_command(entry("destroy", &[], "relay.destroy", true, {
        let engine = Arc::clone(&engine);
        move |ctx: CommandContext| {
            let engine = Arc::clone(&engine);
            Box::pin(async move {
                let Some(channel) = ctx.args.first() else {
                    return vec!["Usage: DESTROY #channel".to_string()];
                };
                engine.destroy_channel(&ctx.network, channel);
                vec![format!("Destroyed relay channel {channel}.")]
            })
        }
    }));

    bot.add_command(entry("link", &[], "relay.link", true, {
        let engine = Arc::clone(&engine);
        move |ctx: CommandContext| {
            let engine = Arc::clone(&engine);
            Box::pin(async move {
                let [home_net, home_chan, leaf_chan] = match ctx.args.as_slice() {
                    [a, b, c] => [a.clone(), b.clone(), c.clone()],
                    _ => return vec!["Usage: LINK homenetwork #homechannel #leafchannel".to_string()],
                };
                if engine.link(&home_net, &home_chan, &ctx.network, &leaf_chan) {
                    vec![format!("Linked {leaf_chan} on {} to {home_chan} on {home_net}.", ctx.network)]
                } else {
                    vec![format!("{home_chan} on {home_net} is not a relay channel.")]
                }
            })
        }
    }));

    bot.add_command(entry("delink", &[], "relay.delink", true, {
        let engine = Arc::clone(&engine);
        move |ctx: CommandContext| {
            let engine = Arc::clone(&engine);
            Box::pin(async move {
                let Some(channel) = ctx.args.first() else {
                    return vec!["Usage: DELINK #channel [homenetwork]".to_string()];
                };
                let Some((home_net, home_chan)) = engine.channel_entry_home(&ctx.network, channel) else {
                    return vec![format!("{channel} is not linked to anything.")];
                };
                if engine.delink(&home_net, &home_chan, &ctx.network, channel) {
                    vec![format!("Delinked {channel}.")]
                } else {
                    vec![format!("{channel} is not linked to anything.")]
                }
            })
        }
    }));

    bot.add_command(entry("linked", &["links"], "relay.linked", true, {
        let engine = Arc::clone(&engine);
        move |ctx: CommandContext| {
            let engine = Arc::clone(&engine);
            Box::pin(async move {
                let Some(channel) = ctx.args.first() else {
                    return vec!["Usage: LINKED #channel".to_string()];
                };
                let Some((home_net, home_chan)) = engine.channel_entry_home(&ctx.network, channel) else {
                    return vec![format!("{channel} is not a relay channel.")];
                };
                let set = engine.linked_set(&home_net, &home_chan);
                let rendered: Vec<String> = set.iter().map(|(n, c)| format!("{c}@{n}")).collect();
                vec![format!("Channels linked to {home_chan}@{home_net}: {}", rendered.join(", "))]
            })
        }
    }));

    bot.add_command(entry("claim", &[], "relay.claim", true, {
        let engine = Arc::clone(&engine);
        move |ctx: CommandContext| {
            let engine = Arc::clone(&engine);
            Box::pin(async move {
                let Some(channel) = ctx.args.first() else {
                    return vec!["Usage: CLAIM #channel [net1,net2,...|-]".to_string()];
                };
                let Some((home_net, home_chan)) = engine.channel_entry_home(&ctx.network, channel) else {
                    return vec![format!("{channel} is not a relay channel.")];
                };
                let nets: HashSet<String> = match ctx.args.get(1) {
                    None => {
                        let entry = engine.channel_entry(&home_net, &home_chan).unwrap_or_default();
                        return vec![if entry.claim_nets.is_empty() {
                            format!("CLAIM is not set for {channel}.")
                        } else {
                            let mut nets: Vec<_> = entry.claim_nets.into_iter().collect();
                            nets.sort();
                            format!("Networks allowed to CLAIM {channel}: {}", nets.join(", "))
                        }];
                    }
                    Some(list) if list.as_str() == "-" => HashSet::new(),
                    Some(list) => list.split(',').map(String::from).collect(),
                };
                engine.set_claim(&home_net, &home_chan, nets);
                vec![format!("Updated CLAIM for {channel}.")]
            })
        }
    }));

    bot.add_command(entry("linkacl", &[], "relay.linkacl", true, {
        let engine = Arc::clone(&engine);
        move |ctx: CommandContext| {
            let engine = Arc::clone(&engine);
            Box::pin(async move {
                let [channel, mode, chars] = match ctx.args.as_slice() {
                    [a, b, c] => [a.clone(), b.clone(), c.clone()],
                    _ => return vec!["Usage: LINKACL #channel <WHITELIST|BLACKLIST> <modechars>".to_string()],
                };
                let Some((home_net, home_chan)) = engine.channel_entry_home(&ctx.network, &channel) else {
                    return vec![format!("{channel} is not a relay channel.")];
                };
                let whitelist = match mode.to_ascii_uppercase().as_str() {
                    "WHITELIST" => true,
                    "BLACKLIST" => false,
                    _ => return vec!["Mode must be WHITELIST or BLACKLIST.".to_string()],
                };
                engine.set_linkacl(&home_net, &home_chan, whitelist, chars.chars().collect());
                vec![format!("Updated LINKACL for {channel}.")]
            })
        }
    }));

    bot.add_command(entry("chandesc", &[], "relay.chandesc", false, {
        let engine = Arc::clone(&engine);
        move |ctx: CommandContext| {
            let engine = Arc::clone(&engine);
            Box::pin(async move {
                let Some(channel) = ctx.args.first() else {
                    return vec!["Usage: CHANDESC #channel [text|-]".to_string()];
                };
                let Some((home_net, home_chan)) = engine.channel_entry_home(&ctx.network, channel) else {
                    return vec![format!("{channel} is not a relay channel.")];
                };
                let text = ctx.args.get(1..).filter(|rest| !rest.is_empty()).map(|rest| rest.join(" "));
                let cleared = matches!(text.as_deref(), Some("-"));
                engine.set_chandesc(&home_net, &home_chan, if cleared { None } else { text });
                vec![format!("Updated description for {channel}.")]
            })
        }
    }));

    bot.add_command(entry("savedb", &[], "relay.savedb", false, {
        let engine = Arc::clone(&engine);
        move |_ctx: CommandContext| {
            let engine = Arc::clone(&engine);
            Box::pin(async move {
                match engine.save() {
                    Ok(()) => vec!["Relay database saved.".to_string()],
                    Err(e) => vec![e.to_user_notice()],
                }
            })
        }
    }));

    bot.add_command(CommandEntry {
        name: "list",
        aliases: &["help"],
        permission_node: None,
        featured: false,
        handler: crate::services::list_handler(Arc::clone(bot)),
    });
}
