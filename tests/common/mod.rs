//! Shared black-box test infrastructure: spawns the built `pylinkd` binary
//! against a generated config and talks to it over a plain TCP socket
//! playing the role of the remote peer, mirroring the teacher's own
//! `tests/common` (`TestServer` + a raw line client) rather than reaching
//! into crate internals — `pylinkd` has no library target, only a binary.

pub mod peer;
pub mod server;

#[allow(unused_imports)]
pub use peer::Peer;
pub use server::TestServer;
