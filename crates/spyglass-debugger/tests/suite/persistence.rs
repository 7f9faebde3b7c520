use spyglass_config::SpyglassConfig;
use spyglass_core::{LogicalFile, LogicalFileId, RawLocation};
use spyglass_debugger::{
    BreakpointStorage, DebugError, DebugSession, JsonFileStorage, MemoryStorage, SerializedBreakpoint,
    SessionOptions,
};
use spyglass_protocol::MockTransport;
use tempfile::TempDir;

use super::support::*;

fn tuples(records: &[SerializedBreakpoint]) -> Vec<(String, u32, String, bool)> {
    let mut tuples: Vec<_> = records
        .iter()
        .map(|r| {
            (
                r.source_file_id.clone(),
                r.line_number,
                r.condition.clone(),
                r.enabled,
            )
        })
        .collect();
    tuples.sort();
    tuples
}

#[test]
fn persistent_subset_survives_a_restart() {
    let temp = TempDir::new().expect("tempdir");
    let path = temp.path().join("breakpoints.json");

    let mut first = DebugSession::new(
        MockTransport::new(),
        JsonFileStorage::new(&path),
        SessionOptions::default(),
    );
    first.handle_message(spyglass_protocol::Incoming::Event(
        spyglass_protocol::Event::ScriptParsed(script("1", "http://a/x.js", (0, 0), 100)),
    ));
    first.handle_message(spyglass_protocol::Incoming::Event(
        spyglass_protocol::Event::ScriptParsed(script("2", "", (0, 0), 10)),
    ));
    let named = first.logical_file_for_url("http://a/x.js").cloned().unwrap();
    let anonymous = LogicalFile::new("2", None);
    first.set_breakpoint(&named, 3, "", true);
    first.set_breakpoint(&named, 9, "i > 2", false);
    first.set_breakpoint(&anonymous, 1, "", true);

    let saved = JsonFileStorage::new(&path).load().expect("load saved breakpoints");
    assert_eq!(
        tuples(&saved),
        vec![
            ("http://a/x.js".to_owned(), 3, String::new(), true),
            ("http://a/x.js".to_owned(), 9, "i > 2".to_owned(), false),
        ]
    );

    let mut second = DebugSession::new(
        MockTransport::new(),
        JsonFileStorage::new(&path),
        SessionOptions::default(),
    );
    assert_eq!(second.restore_breakpoints().unwrap(), 2);
    let restored = second.breakpoints_for_file(&LogicalFileId::new("http://a/x.js"));
    assert_eq!(restored.len(), 2);
    assert!(restored.iter().all(|breakpoint| !breakpoint.bound()));
    assert_eq!(restored[1].condition(), "i > 2");
    assert!(!restored[1].enabled());
}

#[test]
fn restored_breakpoints_materialize_when_their_file_appears() {
    let storage = MemoryStorage::with_breakpoints(vec![SerializedBreakpoint {
        source_file_id: "http://a/x.js".into(),
        line_number: 4,
        condition: String::new(),
        enabled: true,
    }]);
    let mut session = session_with(storage, SessionOptions::default());
    session.restore_breakpoints().unwrap();
    assert_eq!(set_requests(&mut session), 0);

    let file = named_file(&mut session, "1", "http://a/x.js");
    assert_eq!(set_requests(&mut session), 1);
    let request = last_set_request(&mut session);
    reply_set(&mut session, request, "r", vec![RawLocation::new("1", 4, 0)]);
    assert!(session.find_breakpoint(&file.id, 4).unwrap().is_materialized());
}

#[test]
fn restoring_after_the_file_appeared_materializes_at_once() {
    let storage = MemoryStorage::with_breakpoints(vec![SerializedBreakpoint {
        source_file_id: "http://a/x.js".into(),
        line_number: 4,
        condition: String::new(),
        enabled: true,
    }]);
    let mut session = session_with(storage, SessionOptions::default());
    let file = named_file(&mut session, "1", "http://a/x.js");
    assert_eq!(set_requests(&mut session), 0);

    assert_eq!(session.restore_breakpoints().unwrap(), 1);
    assert_eq!(set_requests(&mut session), 1);
    let request = last_set_request(&mut session);
    reply_set(&mut session, request, "r", vec![RawLocation::new("1", 4, 0)]);
    assert!(session.find_breakpoint(&file.id, 4).unwrap().is_materialized());
}

#[test]
fn moves_and_edits_are_written_back() {
    let mut session = session();
    let file = named_file(&mut session, "1", "http://a/x.js");
    session.set_breakpoint(&file, 2, "", true);
    let request = last_set_request(&mut session);
    reply_set(&mut session, request, "m", vec![RawLocation::new("1", 5, 0)]);
    session.set_breakpoint_condition(&file.id, 5, "ready");
    session.toggle_all_breakpoints(false);

    let stored = session.breakpoint_manager().storage().breakpoints().to_vec();
    assert_eq!(
        tuples(&stored),
        vec![("http://a/x.js".to_owned(), 5, "ready".to_owned(), false)]
    );
}

#[test]
fn session_from_config_uses_the_configured_file() {
    let temp = TempDir::new().expect("tempdir");
    let path = temp.path().join("bps.json");
    std::fs::write(
        &path,
        r#"[{"sourceFileId":"http://a/x.js","lineNumber":1,"condition":"","enabled":true}]"#,
    )
    .unwrap();
    let config = SpyglassConfig::load_from_str(&format!(
        "[breakpoints]\nstorage_path = {:?}\n",
        path.display().to_string()
    ))
    .unwrap();

    let session = DebugSession::from_config(MockTransport::new(), &config).unwrap();
    assert!(session
        .find_breakpoint(&LogicalFileId::new("http://a/x.js"), 1)
        .is_some());
}

#[test]
fn session_from_workspace_reads_the_discovered_config() {
    let temp = TempDir::new().expect("tempdir");
    let storage = temp.path().join("bps.json");
    std::fs::write(
        &storage,
        r#"[{"sourceFileId":"http://a/x.js","lineNumber":2,"condition":"","enabled":true}]"#,
    )
    .unwrap();
    std::fs::write(
        temp.path().join("spyglass.toml"),
        format!("[breakpoints]\nstorage_path = {:?}\n", storage.display().to_string()),
    )
    .unwrap();

    let session = DebugSession::from_workspace(MockTransport::new(), temp.path()).unwrap();
    assert!(session
        .find_breakpoint(&LogicalFileId::new("http://a/x.js"), 2)
        .is_some());
}

#[test]
fn malformed_workspace_config_is_a_config_error() {
    let temp = TempDir::new().expect("tempdir");
    std::fs::write(temp.path().join("spyglass.toml"), "[breakpoints\n").unwrap();

    let err = DebugSession::from_workspace(MockTransport::new(), temp.path())
        .err()
        .expect("malformed config should fail");
    assert!(matches!(err, DebugError::Config(_)));
}
