use spyglass_core::{LogicalFileId, UiLocation};
use spyglass_protocol::{Command, Incoming, Response};

use super::support::*;

fn inline_document(session: &mut TestSession, second_line: u32) -> LogicalFileId {
    parse(session, script("1", "http://a/index.html", (0, 8), 0));
    parse(session, script("2", "http://a/index.html", (second_line, 8), second_line));
    session
        .logical_file_for_url("http://a/index.html")
        .map(|file| file.id.clone())
        .unwrap()
}

#[test]
fn query_selects_the_nearest_preceding_fragment() {
    let mut session = session();
    let file = inline_document(&mut session, 50);

    let raw = session
        .ui_to_raw(&UiLocation::new(file.clone(), 52, 0))
        .unwrap();
    assert_eq!(raw.script_id.as_str(), "2");
    assert_eq!((raw.line, raw.column), (52, 0));

    let raw = session.ui_to_raw(&UiLocation::new(file, 10, 0)).unwrap();
    assert_eq!(raw.script_id.as_str(), "1");
}

#[test]
fn query_before_every_fragment_uses_the_first() {
    let mut session = session();
    parse(&mut session, script("1", "http://a/page.html", (3, 8), 3));
    parse(&mut session, script("2", "http://a/page.html", (9, 8), 9));

    let raw = session
        .ui_to_raw(&UiLocation::new("http://a/page.html", 0, 0))
        .unwrap();
    assert_eq!(raw.script_id.as_str(), "1");
}

#[test]
fn breakpoint_column_snaps_to_the_script_start() {
    let mut session = session();
    inline_document(&mut session, 50);
    let file = session
        .logical_file_for_url("http://a/index.html")
        .cloned()
        .unwrap();

    session.set_breakpoint(&file, 50, "", true);
    let sent = session.transport_mut().commands().last().cloned().unwrap();
    assert_eq!(
        sent,
        Command::SetBreakpointByUrl {
            url: "http://a/index.html".into(),
            line_number: 50,
            column_number: 8,
            condition: String::new(),
        }
    );
}

#[test]
fn content_is_reconstructed_with_exact_offsets() {
    let mut session = session();
    let file = inline_document(&mut session, 2);
    assert_eq!(session.content(&file), None);

    assert_eq!(session.request_content(&file), 2);
    for (script_id, source) in [("1", "a()"), ("2", "b()")] {
        let request = session
            .transport_mut()
            .last_request(|command| {
                matches!(command, Command::GetScriptSource { script_id: id } if id.as_str() == script_id)
            })
            .unwrap();
        session.handle_message(Incoming::Response {
            id: request,
            result: Ok(Response::ScriptSource {
                source: source.to_owned(),
            }),
        });
    }

    let content = session.content(&file).unwrap();
    assert_eq!(content, "<script>a()</script>\n\n<script>b()</script>");
    assert_eq!(content.lines().count(), 3);
    assert_eq!(session.request_content(&file), 0);
}
