//! Service-bot runtime (spec §4.5): pseudo-client command dispatch, shared
//! by every bot the process runs (the Relay bot being the one built-in
//! consumer). Grounded in the teacher's `services/` split between a
//! framework module and per-service command sets.

mod bot;
mod command;

pub use bot::{CommandContext, Origin, ServiceBot};
pub use command::{list_handler, wrap_reply, CommandEntry, CommandHandler};
