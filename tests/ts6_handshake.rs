//! End-to-end: `pylinkd` dials out to a TS6 peer and performs the
//! Connecting -> Registering -> Bursting -> Ready sequence (spec §4.3,
//! §5), exercised black-box since the crate exposes no library target.

mod common;

use common::{Peer, TestServer};
use std::net::TcpListener;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);

#[test]
fn registers_bursts_and_answers_ping_after_peer_ends_burst() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let port = listener.local_addr().unwrap().port();

    let dir = tempfile::tempdir().expect("tempdir");
    let config_path = dir.path().join("pylink.toml");
    let relay_db = dir.path().join("relay.db");
    std::fs::write(
        &config_path,
        format!(
            r#"
[server]
name = "test.pylink"
pid_file_enabled = false

[relay]
db_path = {relay_db:?}

[networks.leaf]
protocol = "ts6"
hostname = "127.0.0.1"
port = {port}
sid = "1AA"
nick = "PyLink"
sendpass = "sekrit"
"#,
        ),
    )
    .expect("write test config");

    let _server = TestServer::spawn(&config_path).expect("spawn pylinkd");

    let (stream, _) = listener.accept().expect("pylinkd did not connect");
    let mut peer = Peer::new(stream);

    let pass = peer.read_line(TIMEOUT).expect("PASS line");
    assert!(pass.starts_with("PASS sekrit TS 6 1AA"), "unexpected PASS line: {pass}");

    let capab = peer.read_line(TIMEOUT).expect("CAPAB line");
    assert!(capab.starts_with("CAPAB "), "unexpected CAPAB line: {capab}");

    let server_line = peer.read_line(TIMEOUT).expect("SERVER line");
    assert!(server_line.starts_with("SERVER test.pylink 1"), "unexpected SERVER line: {server_line}");

    let svinfo = peer.read_line(TIMEOUT).expect("SVINFO line");
    assert!(svinfo.starts_with("SVINFO 6 6 0"), "unexpected SVINFO line: {svinfo}");

    // pylinkd queues its own (empty) burst immediately; drain its EOB
    // before ending ours, same order a real link negotiation follows.
    let own_eob = peer.read_line(TIMEOUT).expect("pylinkd's own EOB");
    assert!(own_eob.contains("EOB"), "expected pylinkd to end its burst, got: {own_eob}");

    // End our side's burst so pylinkd's lifecycle advances to Ready.
    peer.send_line(":2AA EOB");

    // A Ready link still answers PING, proving the main select loop kept
    // running past burst completion rather than wedging.
    peer.send_line("PING :2AA");
    let pong = peer.read_line(TIMEOUT).expect("PONG reply after burst");
    assert!(pong.contains("PONG"), "expected a PONG reply, got: {pong}");
}
