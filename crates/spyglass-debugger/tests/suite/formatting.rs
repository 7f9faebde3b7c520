use spyglass_core::{BackendId, LogicalFile, LogicalFileId, RawLocation, UiLocation};
use spyglass_debugger::mapping::{FormattedContent, FormatterMapping, ScriptFormatter};
use spyglass_debugger::{MemoryStorage, SessionOptions};
use spyglass_protocol::{Command, Incoming, Response};

use super::support::*;

/// Puts every statement on its own line.
struct SplitStatements;

impl ScriptFormatter for SplitStatements {
    fn format(&self, content: &str) -> Option<FormattedContent> {
        let mut formatted = String::new();
        let mut mapping = FormatterMapping::default();
        let mut offset = 0;
        for statement in content.split_inclusive(';') {
            if !formatted.is_empty() {
                formatted.push('\n');
            }
            mapping.original.push(offset);
            mapping.formatted.push(formatted.len());
            formatted.push_str(statement);
            offset += statement.len();
        }
        Some(FormattedContent {
            content: formatted,
            mapping,
        })
    }
}

const FORMATTED: &str = "deobfuscated:http://a/m.js";

fn answer_source(session: &mut TestSession, source: &str) {
    let request = session
        .transport_mut()
        .last_request(|command| matches!(command, Command::GetScriptSource { .. }))
        .unwrap();
    session.handle_message(Incoming::Response {
        id: request,
        result: Ok(Response::ScriptSource {
            source: source.to_owned(),
        }),
    });
}

#[test]
fn formatting_swaps_the_logical_file() {
    let mut session = session().with_formatter(SplitStatements);
    parse(&mut session, script("1", "http://a/m.js", (0, 0), 0));
    let plain = session.logical_file_for_url("http://a/m.js").cloned().unwrap();

    session.set_breakpoint(&plain, 0, "", true);
    let request = last_set_request(&mut session);
    reply_set(&mut session, request, "plain", vec![RawLocation::new("1", 0, 0)]);

    assert_eq!(session.request_content(&plain.id), 1);
    answer_source(&mut session, "a();b();");
    assert_eq!(session.set_format_source(true), 1);

    let formatted = session.logical_file_for_url("http://a/m.js").cloned().unwrap();
    assert_eq!(formatted.id, LogicalFileId::new(FORMATTED));
    assert_eq!(session.content(&formatted.id).as_deref(), Some("a();\nb();"));
    assert_eq!(removed_ids(&mut session), vec![BackendId::new("plain")]);
    assert!(!session.find_breakpoint(&plain.id, 0).unwrap().bound());

    assert_eq!(
        session.ui_to_raw(&UiLocation::new(FORMATTED, 1, 0)),
        Some(RawLocation::new("1", 0, 4))
    );
    assert_eq!(
        session.raw_to_ui(&RawLocation::new("1", 0, 4)),
        Some(UiLocation::new(FORMATTED, 1, 0))
    );

    session.set_breakpoint(&formatted, 1, "", true);
    let sent = session.transport_mut().commands().last().cloned().unwrap();
    assert_eq!(
        sent,
        Command::SetBreakpointByUrl {
            url: "http://a/m.js".into(),
            line_number: 0,
            column_number: 4,
            condition: String::new(),
        }
    );
}

#[test]
fn turning_formatting_off_rebinds_plain_breakpoints() {
    let mut session = session().with_formatter(SplitStatements);
    parse(&mut session, script("1", "http://a/m.js", (0, 0), 0));
    let plain = session.logical_file_for_url("http://a/m.js").cloned().unwrap();
    session.request_content(&plain.id);
    answer_source(&mut session, "a();b();");
    session.set_breakpoint(&plain, 0, "", true);
    session.set_format_source(true);

    let before = set_requests(&mut session);
    assert_eq!(session.set_format_source(false), 1);
    assert_eq!(
        session.logical_file_for_url("http://a/m.js").map(|file| file.id.clone()),
        Some(plain.id.clone())
    );
    assert_eq!(set_requests(&mut session), before + 1);
    assert!(session.find_breakpoint(&plain.id, 0).unwrap().bound());
}

#[test]
fn formatting_toggle_keeps_anonymous_breakpoints() {
    let mut session = session().with_formatter(SplitStatements);
    parse(&mut session, script("42", "", (0, 0), 0));
    let anonymous = LogicalFile::new("42", None);
    assert!(!anonymous.is_persistent());

    session.request_content(&anonymous.id);
    answer_source(&mut session, "a();b();");
    session.set_breakpoint(&anonymous, 0, "", true);
    let request = last_set_request(&mut session);
    reply_set(&mut session, request, "anon", vec![RawLocation::new("42", 0, 0)]);

    assert_eq!(session.set_format_source(true), 1);
    let unbound = session.find_breakpoint(&anonymous.id, 0).unwrap();
    assert!(!unbound.bound());
    assert!(!unbound.is_materialized());
    assert_eq!(removed_ids(&mut session), vec![BackendId::new("anon")]);

    let before = set_requests(&mut session);
    assert_eq!(session.set_format_source(false), 1);
    assert!(session.find_breakpoint(&anonymous.id, 0).unwrap().bound());
    assert_eq!(set_requests(&mut session), before + 1);
}

#[test]
fn new_scripts_are_formatted_once_their_source_arrives() {
    let options = SessionOptions {
        format_source: true,
        ..SessionOptions::default()
    };
    let mut session = session_with(MemoryStorage::new(), options).with_formatter(SplitStatements);
    parse(&mut session, script("1", "http://a/m.js", (0, 0), 0));
    assert_eq!(
        session
            .logical_file_for_url("http://a/m.js")
            .map(|file| file.id.clone()),
        Some(LogicalFileId::new("http://a/m.js"))
    );

    answer_source(&mut session, "a();b();");
    assert_eq!(
        session
            .logical_file_for_url("http://a/m.js")
            .map(|file| file.id.clone()),
        Some(LogicalFileId::new(FORMATTED))
    );
}
