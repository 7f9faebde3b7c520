use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use spyglass_core::LogicalFileId;
use spyglass_debugger::{DebugSession, MemoryStorage, SerializedBreakpoint, SessionDriver, SessionOptions};
use spyglass_protocol::{ChannelTransport, Command, Event, Incoming, Outgoing};
use spyglass_sourcemap::LocalFetcher;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::support::script;

const MAP: &str = r#"{"version":3,"sources":["a.ts"],"mappings":"AAAA"}"#;

async fn next_command(outgoing: &mut mpsc::UnboundedReceiver<Outgoing>) -> Command {
    tokio::time::timeout(Duration::from_secs(5), outgoing.recv())
        .await
        .expect("timed out waiting for a command")
        .expect("transport closed")
        .command
}

#[tokio::test]
async fn inline_source_map_binds_restored_breakpoint() {
    let (transport, mut outgoing) = ChannelTransport::new();
    let storage = MemoryStorage::with_breakpoints(vec![SerializedBreakpoint {
        source_file_id: "http://a/a.ts".into(),
        line_number: 0,
        condition: String::new(),
        enabled: true,
    }]);
    let mut session = DebugSession::new(transport, storage, SessionOptions::default());
    session.restore_breakpoints().unwrap();

    let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let driver = SessionDriver::new(session, incoming_rx, Arc::new(LocalFetcher), cancel.clone());
    let handle = tokio::spawn(driver.run());

    let encoded = base64::engine::general_purpose::STANDARD.encode(MAP);
    let mut compiled = script("1", "http://a/app.js", (0, 0), 10);
    compiled.source_map_url = Some(format!("data:application/json;base64,{encoded}"));
    incoming_tx
        .send(Incoming::Event(Event::DebuggerWasEnabled))
        .unwrap();
    incoming_tx
        .send(Incoming::Event(Event::ScriptParsed(compiled)))
        .unwrap();

    assert_eq!(
        next_command(&mut outgoing).await,
        Command::SetBreakpointByUrl {
            url: "http://a/app.js".into(),
            line_number: 0,
            column_number: 0,
            condition: String::new(),
        }
    );

    cancel.cancel();
    let session = handle.await.unwrap();
    let breakpoint = session
        .find_breakpoint(&LogicalFileId::new("http://a/a.ts"), 0)
        .unwrap();
    assert!(breakpoint.bound());
}

#[tokio::test]
async fn driver_stops_when_the_backend_goes_away() {
    let (transport, _outgoing) = ChannelTransport::new();
    let session = DebugSession::new(transport, MemoryStorage::new(), SessionOptions::default());
    let (incoming_tx, incoming_rx) = mpsc::unbounded_channel::<Incoming>();
    let driver = SessionDriver::new(
        session,
        incoming_rx,
        Arc::new(LocalFetcher),
        CancellationToken::new(),
    );
    let handle = tokio::spawn(driver.run());

    incoming_tx
        .send(Incoming::Event(Event::ScriptParsed(script(
            "1",
            "http://a/x.js",
            (0, 0),
            3,
        ))))
        .unwrap();
    drop(incoming_tx);

    let session = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("driver should stop")
        .unwrap();
    assert!(session.logical_file_for_url("http://a/x.js").is_some());
}
