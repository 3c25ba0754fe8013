//! State containers and indices (spec §3, §4.2).

pub mod channel;
pub mod mapping;
pub mod network_state;
pub mod server;
pub mod user;

pub use channel::Channel;
pub use mapping::UserMapping;
pub use network_state::{Capabilities, IsupportTokens, NetworkState};
pub use server::{descendant_sids, Server};
pub use user::User;
