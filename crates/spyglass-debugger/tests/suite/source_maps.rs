use spyglass_core::{LogicalFileId, RawLocation, UiLocation};
use spyglass_protocol::Command;
use spyglass_sourcemap::FetchError;

use super::support::*;

#[test]
fn original_files_become_available() {
    let session = compiled_session();
    let a = session.logical_file_for_url("http://a/src/a.ts").unwrap();
    assert!(a.is_persistent());
    assert!(session.logical_file_for_url("http://a/src/b.ts").is_some());
    assert_eq!(
        session.content(&LogicalFileId::new("http://a/src/a.ts")).as_deref(),
        Some("let a = 1;")
    );
}

#[test]
fn resolved_breakpoints_map_back_to_the_requested_file() {
    let mut session = compiled_session();
    let original = session
        .logical_file_for_url("http://a/src/a.ts")
        .cloned()
        .unwrap();

    session.set_breakpoint(&original, 3, "", true);
    let sent = session.transport_mut().commands().last().cloned().unwrap();
    assert_eq!(
        sent,
        Command::SetBreakpointByUrl {
            url: "http://a/app.js".into(),
            line_number: 2,
            column_number: 0,
            condition: String::new(),
        }
    );

    let request = last_set_request(&mut session);
    reply_set(&mut session, request, "sm", vec![RawLocation::new("1", 2, 0)]);

    let ui = session.raw_to_ui(&RawLocation::new("1", 2, 0)).unwrap();
    assert_eq!(ui.file, original.id);
    // The backend resolved to original line 4; the breakpoint followed it.
    let breakpoint = session.find_breakpoint(&original.id, 4).unwrap();
    assert!(breakpoint.is_materialized());
}

#[test]
fn compiled_scripts_use_only_the_map() {
    let session = compiled_session();
    assert_eq!(
        session.raw_to_ui(&RawLocation::new("1", 3, 5)),
        Some(UiLocation::new("http://a/src/b.ts", 1, 0))
    );
    // Line 1 has no segments; the lookup falls back to the line 0 entry.
    assert_eq!(
        session.raw_to_ui(&RawLocation::new("1", 1, 0)),
        Some(UiLocation::new("http://a/src/a.ts", 0, 0))
    );
}

#[test]
fn failed_loads_leave_generated_coordinates() {
    let mut session = session();
    let mut compiled = script("1", "http://a/app.js", (0, 0), 10);
    compiled.source_map_url = Some("app.js.map".into());
    parse(&mut session, compiled);

    let fetch = session.take_source_map_fetches().remove(0);
    session.source_map_loaded(&fetch, Err(FetchError::UnsupportedScheme("https".into())));

    assert!(session.logical_file_for_url("http://a/src/a.ts").is_none());
    assert_eq!(
        session.raw_to_ui(&RawLocation::new("1", 2, 0)),
        Some(UiLocation::new("http://a/app.js", 2, 0))
    );
}

#[test]
fn scripts_sharing_a_map_share_one_load() {
    let mut session = session();
    for id in ["1", "2"] {
        let mut compiled = script(id, "http://a/app.js", (0, 0), 10);
        compiled.source_map_url = Some("app.js.map".into());
        parse(&mut session, compiled);
    }
    let fetches = session.take_source_map_fetches();
    assert_eq!(fetches.len(), 1);
    session.source_map_loaded(&fetches[0], Ok(MAP.to_owned()));

    assert_eq!(
        session.raw_to_ui(&RawLocation::new("2", 0, 0)),
        Some(UiLocation::new("http://a/src/a.ts", 0, 0))
    );
}
