//! A termination signal stops a running relay the same way `quit` does.
//!
//! Kept in its own test binary: the signal handler is process-wide and can
//! only be installed once.
#![cfg(unix)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::process::{self, Command};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use callrelay::log::NoopLogSink;
use callrelay::signaling::protocol::{ServerMsg, decode_server_msg};
use callrelay::signaling::run::shutdown_on_signals;
use callrelay::signaling::{RelayConfig, SignalingServer};
use tungstenite::Message;
use tungstenite::protocol::frame::coding::CloseCode;
use tungstenite::stream::MaybeTlsStream;

#[test]
fn sigterm_closes_clients_and_stops_the_relay() {
    let cfg = RelayConfig {
        host: "127.0.0.1".into(),
        port: 0,
        ..RelayConfig::default()
    };
    let server = SignalingServer::bind(cfg, Arc::new(NoopLogSink)).unwrap();
    let addr = server.local_addr();
    let stop = server.shutdown_handle();
    shutdown_on_signals(stop.clone()).unwrap();
    let runner = thread::spawn(move || server.run());

    let (mut ws, _) = tungstenite::connect(format!("ws://{addr}/")).unwrap();
    if let MaybeTlsStream::Plain(s) = ws.get_ref() {
        s.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    }
    match ws.read().unwrap() {
        Message::Text(t) => assert!(matches!(
            decode_server_msg(&t).unwrap(),
            ServerMsg::ConnectionEstablished { .. }
        )),
        other => panic!("expected connection-established, got {other:?}"),
    }

    let status = Command::new("kill")
        .args(["-TERM", &process::id().to_string()])
        .status()
        .unwrap();
    assert!(status.success());

    let mut close_code = None;
    loop {
        match ws.read() {
            Ok(Message::Close(frame)) => close_code = frame.map(|f| f.code),
            Ok(_) => {}
            Err(_) => break,
        }
    }
    assert_eq!(close_code, Some(CloseCode::Away));
    assert!(stop.is_requested());
    runner.join().unwrap().unwrap();
}
