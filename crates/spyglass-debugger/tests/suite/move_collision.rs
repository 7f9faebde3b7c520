use spyglass_core::{BackendId, RawLocation};
use spyglass_debugger::BreakpointEvent;

use super::support::*;

#[test]
fn resolution_onto_an_occupied_line_removes_the_mover() {
    let mut session = session();
    let file = named_file(&mut session, "1", "http://a/x.js");

    session.set_breakpoint(&file, 8, "incumbent", true);
    let incumbent = last_set_request(&mut session);
    reply_set(&mut session, incumbent, "c", vec![RawLocation::new("1", 8, 0)]);

    session.set_breakpoint(&file, 5, "", true);
    let mover = last_set_request(&mut session);
    reply_set(&mut session, mover, "a", vec![RawLocation::new("1", 8, 2)]);

    assert_eq!(removed_ids(&mut session), vec![BackendId::new("a")]);
    let breakpoints = session.breakpoints_for_file(&file.id);
    assert_eq!(breakpoints.len(), 1);
    assert_eq!(breakpoints[0].line(), 8);
    assert_eq!(breakpoints[0].condition(), "incumbent");
    assert_eq!(breakpoints[0].backend_id(), Some(&BackendId::new("c")));
}

#[test]
fn source_mapped_resolution_onto_an_occupied_line_removes_the_mover() {
    let mut session = compiled_session();
    let original = session
        .logical_file_for_url("http://a/src/a.ts")
        .cloned()
        .unwrap();

    session.set_breakpoint(&original, 4, "incumbent", true);
    let incumbent = last_set_request(&mut session);
    reply_set(&mut session, incumbent, "c", vec![RawLocation::new("1", 2, 0)]);

    // Original line 1 has no mapping of its own; the backend places it at
    // generated 2:3, which the map attributes to original line 4.
    session.set_breakpoint(&original, 1, "", true);
    let mover = last_set_request(&mut session);
    reply_set(&mut session, mover, "a", vec![RawLocation::new("1", 2, 3)]);

    assert_eq!(removed_ids(&mut session), vec![BackendId::new("a")]);
    let breakpoints = session.breakpoints_for_file(&original.id);
    assert_eq!(breakpoints.len(), 1);
    assert_eq!(breakpoints[0].line(), 4);
    assert_eq!(breakpoints[0].condition(), "incumbent");
    assert_eq!(breakpoints[0].backend_id(), Some(&BackendId::new("c")));
}

#[test]
fn resolution_onto_a_free_line_moves_atomically() {
    let mut session = session();
    let file = named_file(&mut session, "1", "http://a/x.js");
    let mut events = session.subscribe();

    session.set_breakpoint(&file, 5, "", true);
    let request = last_set_request(&mut session);
    reply_set(&mut session, request, "a", vec![RawLocation::new("1", 7, 4)]);

    assert!(session.find_breakpoint(&file.id, 5).is_none());
    assert!(session.find_breakpoint(&file.id, 7).is_some());

    let mut moves = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let BreakpointEvent::Moved { from, to, .. } = event {
            moves.push((from, to));
        }
    }
    assert_eq!(moves, vec![(5, 7)]);
}

#[test]
fn late_resolution_can_move_a_breakpoint() {
    let mut session = session();
    let file = named_file(&mut session, "1", "http://a/x.js");

    session.set_breakpoint(&file, 20, "", true);
    let request = last_set_request(&mut session);
    reply_set(&mut session, request, "u", Vec::new());
    assert!(session.find_breakpoint(&file.id, 20).unwrap().is_materialized());

    session.handle_message(spyglass_protocol::Incoming::Event(
        spyglass_protocol::Event::BreakpointResolved {
            breakpoint_id: BackendId::new("u"),
            location: RawLocation::new("1", 22, 0),
        },
    ));
    let moved = session.find_breakpoint(&file.id, 22).unwrap();
    assert_eq!(moved.backend_locations(), &[RawLocation::new("1", 22, 0)]);
}
