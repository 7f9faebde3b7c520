use spyglass_core::{RawLocation, UiLocation};
use spyglass_debugger::{BreakpointEvent, DebugError, DebuggerState, RawSourceId};
use spyglass_protocol::{
    CallFrame, Command, ConsoleMessage, Event, Incoming, MessageLevel, PausedDetails,
    ProtocolError, ScriptFailedToParse,
};

use super::support::*;

#[test]
fn call_frames_map_to_ui_locations() {
    let mut session = session();
    named_file(&mut session, "1", "http://a/x.js");
    session.handle_message(Incoming::Event(Event::Paused(PausedDetails {
        call_frames: vec![
            CallFrame {
                call_frame_id: "0".into(),
                function_name: "inner".into(),
                location: RawLocation::new("1", 3, 2),
            },
            CallFrame {
                call_frame_id: "1".into(),
                function_name: "gone".into(),
                location: RawLocation::new("404", 0, 0),
            },
        ],
        reason: "breakpoint".into(),
    })));

    assert_eq!(session.model().state(), DebuggerState::Paused);
    assert_eq!(
        session.call_frame_locations(),
        vec![Some(UiLocation::new("http://a/x.js", 3, 2)), None]
    );

    session.handle_message(Incoming::Event(Event::Resumed));
    assert!(session.call_frame_locations().is_empty());
}

#[test]
fn continue_to_location_targets_the_raw_script() {
    let mut session = session();
    named_file(&mut session, "7", "http://a/x.js");
    assert!(session
        .continue_to_location(&UiLocation::new("http://a/x.js", 12, 1))
        .is_some());
    assert_eq!(
        session.transport_mut().commands().last(),
        Some(&Command::ContinueToLocation {
            location: RawLocation::new("7", 12, 1)
        })
    );
    assert!(session
        .continue_to_location(&UiLocation::new("http://a/unknown.js", 1, 0))
        .is_none());
}

#[test]
fn diagnostics_attach_to_raw_sources() {
    let mut session = session();
    named_file(&mut session, "1", "http://a/x.js");
    session.handle_message(Incoming::Event(Event::ConsoleMessageAdded(ConsoleMessage {
        url: "http://a/x.js".into(),
        line: 2,
        level: MessageLevel::Warning,
        text: "deprecated".into(),
    })));
    session.handle_message(Incoming::Event(Event::ScriptFailedToParse(
        ScriptFailedToParse {
            script: script("2", "http://a/broken.js", (0, 0), 1),
            error_line: 1,
            error_message: "Unexpected token".into(),
        },
    )));

    let x = session
        .bindings()
        .raw_source(&RawSourceId::new("http://a/x.js"))
        .unwrap();
    assert_eq!(x.messages().len(), 1);
    assert_eq!(x.messages()[0].level, MessageLevel::Warning);

    let broken = session
        .bindings()
        .raw_source(&RawSourceId::new("http://a/broken.js"))
        .unwrap();
    assert_eq!(broken.messages()[0].text, "Unexpected token");
    assert!(session.logical_file_for_url("http://a/broken.js").is_some());
}

#[test]
fn deactivating_breakpoints_reaches_the_backend() {
    let mut session = session();
    let mut events = session.subscribe();
    session.set_breakpoints_active(false);

    assert_eq!(
        session.transport_mut().commands().last(),
        Some(&Command::SetBreakpointsActive { active: false })
    );
    assert!(matches!(
        events.try_recv(),
        Ok(BreakpointEvent::ActiveChanged(false))
    ));
}

#[test]
fn enabling_without_a_connection_fails() {
    let mut session = session();
    session.transport_mut().set_disconnected(true);
    let err = session.enable().unwrap_err();
    assert!(matches!(
        err,
        DebugError::Protocol(ProtocolError::NotConnected)
    ));
}

#[test]
fn logging_from_config_can_be_installed_repeatedly() {
    let config = spyglass_config::SpyglassConfig::load_from_str(
        "[logging]\nlevel = \"spyglass.breakpoints=debug\"\n",
    )
    .unwrap();
    spyglass_config::init_tracing(&config.logging);
    spyglass_config::init_tracing(&config.logging);

    let mut session = session();
    let file = named_file(&mut session, "1", "http://a/x.js");
    session.set_breakpoint(&file, 1, "", true);
    let request = last_set_request(&mut session);
    reply_refused(&mut session, request);
    assert!(session.find_breakpoint(&file.id, 1).is_none());
}
