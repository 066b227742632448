use super::*;
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::state::{
    ConfirmReason, ErrorDetails, GateOutcome, GateState, Response, ResponsePart, ResponseState,
    ToolInvocation, ToolResult,
};
use crate::types::TurnId;
use serde_json::json;
use std::path::Path;

fn session() -> Session {
    Session::new(SessionConfig::default())
}

fn concurrent_session() -> Session {
    Session::new(SessionConfig {
        allow_concurrent_turns: true,
        ..SessionConfig::default()
    })
}

fn messages(session: &Session) -> Vec<String> {
    session
        .turns()
        .iter()
        .map(|turn| turn.request().message.clone())
        .collect()
}

fn submit_completed(session: &mut Session, text: &str) -> TurnId {
    let turn_id = session.submit(text, Vec::new()).expect("submit");
    let response = session.response_mut(&turn_id).expect("response");
    response
        .append_part(ResponsePart::markdown(format!("re: {text}")))
        .expect("append");
    response.mark_complete();
    turn_id
}

#[test]
fn test_session_module_structure() {
    let _ = std::any::TypeId::of::<Session>();
    let _ = std::any::TypeId::of::<SessionEvent>();
    let _ = std::any::TypeId::of::<SessionSnapshot>();

    assert!(Path::new("src/state/session/state.rs").exists());
    assert!(Path::new("src/state/session/turn_log.rs").exists());
    assert!(Path::new("src/state/session/checkpoint.rs").exists());
    assert!(Path::new("src/state/session/snapshot.rs").exists());
}

#[test]
fn test_fix_bug_scenario() {
    let mut session = session();
    let turn_id = session.add_request("Fix bug", Vec::new()).expect("add");
    session
        .attach_response(&turn_id, Response::new())
        .expect("attach");

    let response = session.response_mut(&turn_id).expect("response");
    response
        .append_part(ResponsePart::markdown("Looking..."))
        .expect("append text");
    response
        .append_part(ResponsePart::ToolInvocation(ToolInvocation::new(
            "call_search",
            "search",
            json!({"query": "bug"}),
        )))
        .expect("append tool");
    assert_eq!(
        response
            .tool_invocation("call_search")
            .map(ToolInvocation::state),
        Some(GateState::WaitingForConfirmation)
    );

    response
        .confirm_tool("call_search", ConfirmReason::UserAction)
        .expect("confirm");
    assert_eq!(
        response
            .tool_invocation("call_search")
            .map(ToolInvocation::state),
        Some(GateState::Confirmed)
    );

    response
        .append_part(ResponsePart::markdown("Found it"))
        .expect("append text");
    response.mark_complete();

    let turns = session.turns();
    assert_eq!(turns.len(), 1);
    let response = turns[0].response().expect("response");
    assert!(response.is_complete());
    assert_eq!(response.to_plain_text(), "Looking...Found it");
}

#[test]
fn test_turns_are_returned_in_insertion_order() {
    let mut session = session();
    for text in ["one", "two", "three"] {
        submit_completed(&mut session, text);
    }
    assert_eq!(messages(&session), vec!["one", "two", "three"]);
}

#[test]
fn test_remove_middle_turn_truncates_tail() {
    let mut session = session();
    let first = submit_completed(&mut session, "one");
    let second = submit_completed(&mut session, "two");
    let third = submit_completed(&mut session, "three");

    let removed = session.remove_turn(&second).expect("remove");

    let removed_ids: Vec<&TurnId> = removed.iter().map(Turn::id).collect();
    assert_eq!(removed_ids, vec![&second, &third]);
    let remaining: Vec<&TurnId> = session.turns().into_iter().map(Turn::id).collect();
    assert_eq!(remaining, vec![&first]);
}

#[test]
fn test_remove_unknown_turn_is_not_found() {
    let mut session = session();
    submit_completed(&mut session, "one");
    let result = session.remove_turn(&TurnId::from_raw("request_missing"));
    assert!(matches!(result, Err(SessionError::NotFound { kind: "turn", .. })));
    assert_eq!(session.turns().len(), 1);
}

#[test]
fn test_edit_request_replaces_turn_and_everything_after() {
    let mut session = session();
    let first = submit_completed(&mut session, "one");
    let second = session
        .add_request("two", vec![Variable::new("file", json!("src/lib.rs"))])
        .expect("add");
    session
        .attach_response(&second, Response::new())
        .expect("attach");
    session.response_mut(&second).expect("response").mark_complete();
    let third = submit_completed(&mut session, "three");
    session.begin_edit(&second).expect("begin edit");

    let edited = session.edit_request(&second, "two, revised").expect("edit");

    let turns = session.turns();
    let ids: Vec<&TurnId> = turns.iter().map(|turn| turn.id()).collect();
    assert_eq!(ids, vec![&first, &edited]);
    assert!(!ids.contains(&&second));
    assert!(!ids.contains(&&third));
    assert_eq!(messages(&session), vec!["one", "two, revised"]);

    let edited_turn = session.turn(&edited).expect("edited turn");
    assert_eq!(edited_turn.request().variables.len(), 1);
    assert!(edited_turn.response().is_none());
    assert_eq!(session.editing(), None);
}

#[test]
fn test_edit_first_turn_leaves_single_new_turn() {
    let mut session = session();
    let first = submit_completed(&mut session, "one");
    submit_completed(&mut session, "two");

    let edited = session.edit_request(&first, "zero").expect("edit");

    assert_eq!(messages(&session), vec!["zero"]);
    assert_eq!(session.turns()[0].id(), &edited);
}

#[test]
fn test_regenerate_bumps_attempt() {
    let mut session = session();
    let first = submit_completed(&mut session, "one");

    let second = session.regenerate(&first).expect("regenerate");
    let third = session.regenerate(&second).expect("regenerate again");

    let turn = session.turn(&third).expect("turn");
    assert_eq!(turn.request().message, "one");
    assert_eq!(turn.request().attempt, 2);
    assert_eq!(session.turns().len(), 1);
}

#[test]
fn test_add_request_rejected_while_previous_response_streams() {
    let mut session = session();
    let streaming = session.submit("one", Vec::new()).expect("submit");

    let result = session.add_request("two", Vec::new());
    assert!(matches!(result, Err(SessionError::InvalidState(_))));
    assert_eq!(session.turns().len(), 1);

    session.cancel_turn(&streaming).expect("cancel");
    session.add_request("two", Vec::new()).expect("add after cancel");
    assert_eq!(messages(&session), vec!["one", "two"]);
}

#[test]
fn test_concurrent_turns_allowed_by_config() {
    let mut session = concurrent_session();
    session.submit("one", Vec::new()).expect("submit");
    session.submit("two", Vec::new()).expect("second submit");
    assert_eq!(session.turns().len(), 2);
}

#[test]
fn test_turns_without_response_do_not_block_new_requests() {
    let mut session = session();
    session.add_request("one", Vec::new()).expect("add");
    session.add_request("two", Vec::new()).expect("add");
    assert_eq!(session.turns().len(), 2);
}

#[test]
fn test_second_streaming_response_cannot_be_attached() {
    let mut session = session();
    let first = session.add_request("a", Vec::new()).expect("add");
    let second = session.add_request("b", Vec::new()).expect("add");
    session
        .attach_response(&first, Response::new())
        .expect("attach first");

    let result = session.attach_response(&second, Response::new());
    assert!(matches!(result, Err(SessionError::InvalidState(_))));
    assert!(session.turn(&second).expect("turn").response().is_none());
    let streaming = session
        .turns()
        .iter()
        .filter(|turn| turn.response().is_some_and(|r| !r.is_complete()))
        .count();
    assert_eq!(streaming, 1);

    session.cancel_turn(&first).expect("cancel");
    session
        .attach_response(&second, Response::new())
        .expect("attach after cancel");
}

#[test]
fn test_finished_response_attaches_next_to_streaming_turn() {
    let mut session = session();
    let first = session.add_request("a", Vec::new()).expect("add");
    let second = session.add_request("b", Vec::new()).expect("add");
    session
        .attach_response(&first, Response::new())
        .expect("attach first");

    let mut done = Response::new();
    done.append_part(ResponsePart::markdown("imported"))
        .expect("append");
    done.mark_complete();
    session
        .attach_response(&second, done)
        .expect("attach finished response");
    assert_eq!(
        session.response(&second).expect("response").to_plain_text(),
        "imported"
    );
}

#[test]
fn test_concurrent_config_allows_two_streaming_attachments() {
    let mut session = concurrent_session();
    let first = session.add_request("a", Vec::new()).expect("add");
    let second = session.add_request("b", Vec::new()).expect("add");
    session
        .attach_response(&first, Response::new())
        .expect("attach");
    session
        .attach_response(&second, Response::new())
        .expect("attach");
    assert!(!session.response(&second).expect("response").is_complete());
}

#[test]
fn test_closed_session_rejects_attach() {
    let mut session = session();
    let turn_id = session.add_request("one", Vec::new()).expect("add");
    session.close();

    let result = session.attach_response(&turn_id, Response::new());
    assert!(matches!(result, Err(SessionError::InvalidState(_))));
    assert!(session.turn(&turn_id).expect("turn").response().is_none());
}

#[test]
fn test_edit_cancels_streaming_response_it_removes() {
    let mut session = session();
    let streaming = session.submit("one", Vec::new()).expect("submit");
    let mut events = session
        .response_mut(&streaming)
        .expect("response")
        .subscribe();

    session.edit_request(&streaming, "one again").expect("edit");

    assert_eq!(
        events.drain(),
        vec![crate::state::ResponseEvent::StateChanged(
            ResponseState::Canceled
        )]
    );
}

#[test]
fn test_attach_response_exactly_once() {
    let mut session = session();
    let turn_id = session.add_request("one", Vec::new()).expect("add");
    session
        .attach_response(&turn_id, Response::new())
        .expect("attach");

    let result = session.attach_response(&turn_id, Response::new());
    assert_eq!(
        result,
        Err(SessionError::DuplicateResponse(turn_id.to_string()))
    );

    let missing = session.attach_response(&TurnId::from_raw("request_x"), Response::new());
    assert!(matches!(missing, Err(SessionError::NotFound { .. })));
}

#[test]
fn test_response_lookup_distinguishes_missing_turn_and_missing_response() {
    let mut session = session();
    let turn_id = session.add_request("one", Vec::new()).expect("add");
    assert!(matches!(
        session.response(&turn_id),
        Err(SessionError::NotFound {
            kind: "response",
            ..
        })
    ));
    assert!(matches!(
        session.response(&TurnId::from_raw("request_x")),
        Err(SessionError::NotFound { kind: "turn", .. })
    ));
}

#[test]
fn test_hidden_turns_are_excluded_and_dropped_on_next_send() {
    let mut session = session();
    let first = submit_completed(&mut session, "one");
    let second = submit_completed(&mut session, "two");

    session.set_hidden(&[second.clone()]).expect("hide");
    assert_eq!(messages(&session), vec!["one"]);
    assert_eq!(session.all_turns().len(), 2);
    assert!(session.turn(&second).expect("hidden turn").is_hidden());

    session.add_request("three", Vec::new()).expect("add");
    assert_eq!(messages(&session), vec!["one", "three"]);
    assert_eq!(session.all_turns().len(), 2);
    assert!(session.turn(&first).is_ok());
    assert!(session.turn(&second).is_err());
}

#[test]
fn test_set_hidden_rejects_unknown_turns() {
    let mut session = session();
    let first = submit_completed(&mut session, "one");
    let result = session.set_hidden(&[first.clone(), TurnId::from_raw("request_x")]);
    assert!(result.is_err());
    assert!(!session.turn(&first).expect("turn").is_hidden());
}

#[test]
fn test_checkpoint_blocks_turns_from_checkpoint_onward() {
    let mut session = session();
    let first = submit_completed(&mut session, "one");
    let second = submit_completed(&mut session, "two");
    let third = submit_completed(&mut session, "three");
    let mut events = session.subscribe();

    session.set_checkpoint(Some(&second));

    assert_eq!(session.checkpoint(), Some(&second));
    assert!(!session.turn(&first).expect("first").is_blocked());
    assert!(session.turn(&second).expect("second").is_blocked());
    assert!(session.turn(&third).expect("third").is_blocked());
    assert_eq!(
        events.drain(),
        vec![SessionEvent::CheckpointChanged {
            checkpoint: Some(second.clone()),
            blocked: vec![second.clone(), third.clone()],
        }]
    );

    session.set_checkpoint(None);
    assert_eq!(session.checkpoint(), None);
    assert!(session.turns().iter().all(|turn| !turn.is_blocked()));
}

#[test]
fn test_checkpoint_with_unknown_id_is_ignored() {
    let mut session = session();
    let first = submit_completed(&mut session, "one");
    session.set_checkpoint(Some(&first));
    session.set_checkpoint(Some(&TurnId::from_raw("request_x")));
    assert_eq!(session.checkpoint(), Some(&first));
}

#[test]
fn test_restore_checkpoint_rolls_back_and_clears_cursor() {
    let mut session = session();
    let first = submit_completed(&mut session, "one");
    let second = submit_completed(&mut session, "two");
    submit_completed(&mut session, "three");
    session.set_checkpoint(Some(&second));

    let removed = session.restore_checkpoint().expect("restore");

    assert_eq!(removed.len(), 2);
    assert_eq!(session.turns()[0].id(), &first);
    assert_eq!(session.turns().len(), 1);
    assert_eq!(session.checkpoint(), None);
    assert!(matches!(
        session.restore_checkpoint(),
        Err(SessionError::InvalidState(_))
    ));
}

#[test]
fn test_reset_checkpoint_keeps_cursor() {
    let mut session = session();
    let first = submit_completed(&mut session, "one");
    session.set_checkpoint(Some(&first));
    session.reset_checkpoint();
    assert_eq!(session.checkpoint(), Some(&first));
    assert!(!session.turn(&first).expect("turn").is_blocked());
}

#[test]
fn test_reset_checkpoint_publishes_unblocked_state() {
    let mut session = session();
    let first = submit_completed(&mut session, "one");
    session.set_checkpoint(Some(&first));
    let mut events = session.subscribe();

    session.reset_checkpoint();

    assert_eq!(
        events.drain(),
        vec![SessionEvent::CheckpointChanged {
            checkpoint: Some(first),
            blocked: Vec::new(),
        }]
    );
}

#[test]
fn test_restore_with_dangling_checkpoint_unblocks_turns() {
    let mut session = session();
    let first = submit_completed(&mut session, "one");
    let second = submit_completed(&mut session, "two");
    session.set_checkpoint(Some(&first));

    let mut snapshot = session.snapshot();
    assert!(snapshot.turns.iter().all(|turn| turn.blocked));
    snapshot.checkpoint = Some(TurnId::from_raw("request_gone"));
    let restored = Session::restore(snapshot, SessionConfig::default());

    assert_eq!(restored.checkpoint(), None);
    assert!(!restored.turn(&first).expect("turn").is_blocked());
    assert!(!restored.turn(&second).expect("turn").is_blocked());
}

#[test]
fn test_edit_before_checkpoint_drops_checkpoint() {
    let mut session = session();
    let first = submit_completed(&mut session, "one");
    let second = submit_completed(&mut session, "two");
    session.set_checkpoint(Some(&second));

    session.edit_request(&first, "uno").expect("edit");
    assert_eq!(session.checkpoint(), None);
}

#[test]
fn test_edit_after_checkpoint_keeps_checkpoint() {
    let mut session = session();
    let first = submit_completed(&mut session, "one");
    let second = submit_completed(&mut session, "two");
    session.set_checkpoint(Some(&first));

    session.edit_request(&second, "dos").expect("edit");
    assert_eq!(session.checkpoint(), Some(&first));
}

#[test]
fn test_begin_edit_requires_known_turn() {
    let mut session = session();
    assert!(session.begin_edit(&TurnId::from_raw("request_x")).is_err());
    let first = submit_completed(&mut session, "one");
    session.begin_edit(&first).expect("begin edit");
    assert_eq!(session.editing(), Some(&first));
    session.cancel_edit();
    assert_eq!(session.editing(), None);
}

#[test]
fn test_confirm_first_pending_resolves_oldest_call_only() {
    let mut session = concurrent_session();
    let first = session.submit("one", Vec::new()).expect("submit");
    let second = session.submit("two", Vec::new()).expect("submit");
    for (turn_id, call_id) in [(&first, "call_a"), (&second, "call_b")] {
        session
            .response_mut(turn_id)
            .expect("response")
            .append_part(ResponsePart::ToolInvocation(ToolInvocation::new(
                call_id,
                "run_in_terminal",
                json!({"command": "ls"}),
            )))
            .expect("append");
    }
    assert_eq!(session.pending_confirmations().len(), 2);

    let resolved = session
        .confirm_first_pending(ConfirmReason::UserAction)
        .expect("confirm");
    assert_eq!(
        resolved,
        Some((
            first.clone(),
            "call_a".to_string(),
            GateOutcome::Transitioned(GateState::Confirmed)
        ))
    );
    assert_eq!(
        session.pending_confirmations(),
        vec![(second.clone(), "call_b".to_string())]
    );

    session
        .confirm_first_pending(ConfirmReason::Skipped)
        .expect("confirm");
    assert_eq!(
        session
            .confirm_first_pending(ConfirmReason::UserAction)
            .expect("nothing pending"),
        None
    );
}

#[test]
fn test_close_denies_pending_gates_and_rejects_new_requests() {
    let mut session = session();
    let turn_id = session.submit("one", Vec::new()).expect("submit");
    {
        let response = session.response_mut(&turn_id).expect("response");
        response
            .append_part(ResponsePart::ToolInvocation(ToolInvocation::new(
                "call_1",
                "install_extension",
                json!({"id": "ext.sample"}),
            )))
            .expect("append");
        response.mark_complete();
    }
    let mut events = session.subscribe();

    session.close();
    session.close();

    let response = session.response(&turn_id).expect("response");
    assert_eq!(
        response.tool_invocation("call_1").map(ToolInvocation::state),
        Some(GateState::Denied)
    );
    assert_eq!(response.state(), ResponseState::Complete);
    assert_eq!(events.drain(), vec![SessionEvent::Closed]);
    assert!(matches!(
        session.add_request("two", Vec::new()),
        Err(SessionError::InvalidState(_))
    ));
}

#[test]
fn test_session_events_follow_turn_lifecycle() {
    let mut session = session();
    let mut events = session.subscribe();
    let first = submit_completed(&mut session, "one");
    let second = submit_completed(&mut session, "two");
    session.remove_turn(&second).expect("remove");

    assert_eq!(
        events.drain(),
        vec![
            SessionEvent::TurnAdded {
                turn_id: first.clone()
            },
            SessionEvent::ResponseAttached {
                turn_id: first.clone()
            },
            SessionEvent::TurnAdded {
                turn_id: second.clone()
            },
            SessionEvent::ResponseAttached {
                turn_id: second.clone()
            },
            SessionEvent::TurnsRemoved {
                turn_ids: vec![second.clone()],
                reason: RemovalReason::Removal,
            },
        ]
    );
}

#[test]
fn test_snapshot_round_trip_preserves_log_and_settles_streaming_state() {
    let mut session = concurrent_session();
    let first = submit_completed(&mut session, "one");
    let second = session.submit("two", Vec::new()).expect("submit");
    {
        let response = session.response_mut(&second).expect("response");
        response
            .append_part(ResponsePart::markdown("partial"))
            .expect("append");
        response
            .append_part(ResponsePart::ToolInvocation(ToolInvocation::new(
                "call_1",
                "search",
                json!({}),
            )))
            .expect("append");
    }
    session
        .response_mut(&first)
        .expect("response")
        .set_vote(crate::state::Vote::Up);
    session.set_checkpoint(Some(&second));

    let json = serde_json::to_string(&session.snapshot()).expect("serialize");
    let snapshot: SessionSnapshot = serde_json::from_str(&json).expect("deserialize");
    let restored = Session::restore(snapshot, SessionConfig::default());

    assert_eq!(restored.id(), session.id());
    assert_eq!(messages(&restored), vec!["one", "two"]);
    assert_eq!(restored.checkpoint(), Some(&second));
    assert_eq!(
        restored.response(&first).expect("first").vote(),
        Some(crate::state::Vote::Up)
    );
    let second_response = restored.response(&second).expect("second");
    assert_eq!(second_response.state(), ResponseState::Canceled);
    assert_eq!(second_response.to_plain_text(), "partial");
    assert!(restored.pending_confirmations().is_empty());
}

#[test]
fn test_failed_response_keeps_partial_content_in_log() {
    let mut session = session();
    let turn_id = session.submit("explain", Vec::new()).expect("submit");
    {
        let response = session.response_mut(&turn_id).expect("response");
        response
            .append_part(ResponsePart::markdown("The first half"))
            .expect("append");
        response.fail(ErrorDetails::new("connection reset"));
    }

    let response = session.turns()[0].response().expect("response");
    assert_eq!(response.to_plain_text(), "The first half");
    assert_eq!(
        response.error_details().map(|d| d.message.as_str()),
        Some("connection reset")
    );
    session.add_request("again", Vec::new()).expect("add after failure");
}

#[test]
fn test_post_approval_flow_through_session() {
    let mut session = session();
    let turn_id = session.submit("fetch docs", Vec::new()).expect("submit");
    let response = session.response_mut(&turn_id).expect("response");
    response
        .append_part(ResponsePart::ToolInvocation(ToolInvocation::new(
            "call_fetch",
            "fetch_page",
            json!({"url": "https://example.com"}),
        )))
        .expect("append");

    response
        .confirm_tool("call_fetch", ConfirmReason::UserAction)
        .expect("confirm");
    response.begin_tool_execution("call_fetch").expect("begin");
    response
        .complete_tool_execution(
            "call_fetch",
            ToolResult {
                output: "<html>".to_string(),
                is_error: false,
            },
            true,
        )
        .expect("finish");
    assert!(response.has_pending_confirmation());
    assert_eq!(
        session.pending_confirmations(),
        vec![(turn_id.clone(), "call_fetch".to_string())]
    );

    session
        .confirm_first_pending(ConfirmReason::Skipped)
        .expect("post skip");
    let invocation = session
        .response(&turn_id)
        .expect("response")
        .tool_invocation("call_fetch")
        .expect("invocation")
        .clone();
    assert_eq!(invocation.state(), GateState::PostSkipped);
    assert_eq!(invocation.gate().pending_reason(), Some(&ConfirmReason::Skipped));
}
