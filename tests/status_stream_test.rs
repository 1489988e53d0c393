//! Integration tests for status streams: rendering, triggers, stacktraces.

mod common;

use std::sync::Arc;

use common::*;
use wepp_status::control::Attachment;
use wepp_status::status_stream::{StatusStream, StatusStreamOptions, StreamEvent};
use wepp_status::traits::HttpError;
use wepp_status::websocket::ConnectionState;

fn attach(hub: &wepp_status::ChannelHub, panel: &RecordingPanel, channel: &str) -> StatusStream {
    StatusStream::attach(
        hub,
        StatusStreamOptions::new(Arc::new(panel.clone()), "run-1", channel),
    )
    .expect("attach status stream")
}

#[tokio::test]
async fn test_lines_render_into_log_and_status() {
    let connector = MockConnector::new();
    let hub = test_hub(&connector);
    let panel = RecordingPanel::new();
    let _stream = attach(&hub, &panel, "wepp");

    let server = connector.wait_for_connection(0).await;
    server.send_status("rq:1 building climate\nrq:1 building soils");

    let record = panel.wait_until(|r| r.renders >= 2).await;
    assert_eq!(record.log_text, "rq:1 building climate\nrq:1 building soils");
    assert_eq!(record.statuses.last().unwrap(), "rq:1 building soils");
    assert!(record.scrolls >= 2);
}

#[tokio::test]
async fn test_soft_connection_status() {
    let connector = MockConnector::new();
    let hub = test_hub(&connector);
    let panel = RecordingPanel::new();
    let stream = attach(&hub, &panel, "wepp");

    connector.wait_for_connection(0).await;
    let record = panel
        .wait_until(|r| r.statuses.iter().any(|s| s == "Connected"))
        .await;
    assert!(record.statuses.iter().all(|s| s == "Connecting..." || s == "Connected"));
    assert!(stream.is_connected());
}

#[tokio::test]
async fn test_command_bar_result_becomes_status() {
    let connector = MockConnector::new();
    let hub = test_hub(&connector);
    let panel = RecordingPanel::new();
    let _stream = attach(&hub, &panel, "wepp");

    let server = connector.wait_for_connection(0).await;
    server.send_status("rq:1 COMMAND_BAR_RESULT  Channels delineated ");

    let record = panel
        .wait_until(|r| r.statuses.iter().any(|s| s == "Channels delineated"))
        .await;
    assert_eq!(record.log_text, "rq:1 COMMAND_BAR_RESULT  Channels delineated ");
}

#[tokio::test]
async fn test_long_line_is_truncated_for_status_only() {
    let connector = MockConnector::new();
    let hub = test_hub(&connector);
    let panel = RecordingPanel::new();
    let _stream = attach(&hub, &panel, "wepp");

    let long = "a".repeat(300);
    let server = connector.wait_for_connection(0).await;
    server.send_status(&long);

    let record = panel.wait_until(|r| r.renders >= 1).await;
    assert_eq!(record.log_text, long);
    let status = panel
        .wait_until(|r| r.statuses.iter().any(|s| s.starts_with('a')))
        .await
        .statuses
        .into_iter()
        .find(|s| s.starts_with('a'))
        .unwrap();
    assert_eq!(status.chars().count(), 123);
    assert!(status.ends_with("..."));
}

#[tokio::test]
async fn test_trigger_event_emitted_only_for_own_channel() {
    let connector = MockConnector::new();
    let hub = test_hub(&connector);
    let panel = RecordingPanel::new();
    let stream = attach(&hub, &panel, "wepp");
    let controller = RecordingController::new();
    stream.attach_control(Attachment::events(&controller));
    let mut events = stream.subscribe();

    let server = connector.wait_for_connection(0).await;
    server.send_status("rq:1 TRIGGER fork FORK_COMPLETE\nrq:1 TRIGGER wepp WEPP_RUN_TASK_COMPLETED");

    let mut triggers = Vec::new();
    let mut appends = 0;
    while triggers.is_empty() {
        match events.recv().await.unwrap() {
            StreamEvent::Append(_) => appends += 1,
            StreamEvent::Trigger(trigger) => triggers.push(trigger),
        }
    }

    assert_eq!(appends, 2);
    assert_eq!(triggers.len(), 1);
    assert_eq!(triggers[0].event, "WEPP_RUN_TASK_COMPLETED");
    assert_eq!(triggers[0].channel, "wepp");
    assert_eq!(controller.event_names(), vec!["WEPP_RUN_TASK_COMPLETED"]);
}

#[tokio::test]
async fn test_on_trigger_panic_is_contained() {
    let connector = MockConnector::new();
    let hub = test_hub(&connector);
    let panel = RecordingPanel::new();
    let stream = StatusStream::attach(
        &hub,
        StatusStreamOptions::new(Arc::new(panel.clone()), "run-1", "wepp")
            .on_trigger(|_| panic!("listener bug")),
    )
    .unwrap();
    let mut events = stream.subscribe();

    let server = connector.wait_for_connection(0).await;
    server.send_status("TRIGGER wepp WEPP_RUN_TASK_COMPLETED");
    server.send_status("rq:1 still streaming");

    let mut seen = Vec::new();
    while seen.len() < 3 {
        seen.push(events.recv().await.unwrap());
    }
    assert!(matches!(&seen[1], StreamEvent::Trigger(_)));
    assert_eq!(seen[2], StreamEvent::Append("rq:1 still streaming".to_string()));
}

#[tokio::test]
async fn test_duplicate_exception_fetches_once() {
    let connector = MockConnector::new();
    let hub = test_hub(&connector);
    let panel = RecordingPanel::new();
    let stack_panel = RecordingPanel::new();
    let fetcher = Arc::new(GatedFetcher::succeeding("Traceback: run_wepp failed"));

    let _stream = StatusStream::attach(
        &hub,
        StatusStreamOptions::new(Arc::new(panel.clone()), "run-1", "wepp")
            .with_stacktrace(Arc::new(stack_panel.clone()), fetcher.clone()),
    )
    .unwrap();

    let server = connector.wait_for_connection(0).await;
    server.send_status("JID123 EXCEPTION Failure");
    server.send_status("JID123 EXCEPTION Failure");
    panel.wait_until(|r| r.renders >= 2).await;
    fetcher.wait_for_calls(1).await;

    fetcher.release();
    let record = stack_panel.wait_until(|r| !r.bodies.is_empty()).await;

    assert_eq!(fetcher.calls(), vec!["123".to_string()]);
    assert_eq!(record.reveals, 1);
    assert_eq!(record.bodies, vec!["Traceback: run_wepp failed"]);

    // Already displayed: a later line does not fetch again.
    server.send_status("JID123 EXCEPTION Failure");
    panel.wait_until(|r| r.renders >= 3).await;
    assert_eq!(fetcher.calls().len(), 1);
}

#[tokio::test]
async fn test_distinct_exceptions_fetch_separately() {
    let connector = MockConnector::new();
    let hub = test_hub(&connector);
    let stack_panel = RecordingPanel::new();
    let fetcher = Arc::new(GatedFetcher::succeeding("detail"));
    fetcher.release();

    let _stream = StatusStream::attach(
        &hub,
        StatusStreamOptions::new(Arc::new(RecordingPanel::new()), "run-1", "wepp")
            .with_stacktrace(Arc::new(stack_panel.clone()), fetcher.clone()),
    )
    .unwrap();

    let server = connector.wait_for_connection(0).await;
    server.send_status("JID123 EXCEPTION Failure\nJID456 EXCEPTION Failure");

    stack_panel.wait_until(|r| r.bodies.len() >= 2).await;
    let mut calls = fetcher.calls();
    calls.sort();
    assert_eq!(calls, vec!["123", "456"]);
}

#[tokio::test]
async fn test_failed_fetch_leaves_panel_hidden() {
    let connector = MockConnector::new();
    let hub = test_hub(&connector);
    let panel = RecordingPanel::new();
    let stack_panel = RecordingPanel::new();
    let fetcher = Arc::new(GatedFetcher::failing(HttpError::ServerError {
        status: 500,
        message: "boom".to_string(),
    }));
    fetcher.release();

    let _stream = StatusStream::attach(
        &hub,
        StatusStreamOptions::new(Arc::new(panel.clone()), "run-1", "wepp")
            .with_stacktrace(Arc::new(stack_panel.clone()), fetcher.clone()),
    )
    .unwrap();

    let server = connector.wait_for_connection(0).await;
    server.send_status("JID123 EXCEPTION Failure");
    fetcher.wait_for_calls(1).await;

    // The stream keeps working after the failure.
    server.send_status("rq:1 next line");
    panel.wait_until(|r| r.log_text.ends_with("next line")).await;
    assert_eq!(stack_panel.record().reveals, 0);
    assert!(stack_panel.record().bodies.is_empty());
}

#[tokio::test]
async fn test_streams_on_same_address_share_socket() {
    let connector = MockConnector::new();
    let hub = test_hub(&connector);
    let first_panel = RecordingPanel::new();
    let second_panel = RecordingPanel::new();
    let first = attach(&hub, &first_panel, "wepp");
    let second = attach(&hub, &second_panel, "wepp");

    assert!(Arc::ptr_eq(first.socket(), second.socket()));
    assert_ne!(first.id(), second.id());

    let server = connector.wait_for_connection(0).await;
    server.send_status("rq:1 shared line");

    first_panel.wait_until(|r| r.renders >= 1).await;
    second_panel.wait_until(|r| r.renders >= 1).await;
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test]
async fn test_log_limit_keeps_most_recent() {
    let connector = MockConnector::new();
    let hub = test_hub(&connector);
    let panel = RecordingPanel::new();
    let stream = StatusStream::attach(
        &hub,
        StatusStreamOptions::new(Arc::new(panel.clone()), "run-1", "wepp").with_log_limit(3),
    )
    .unwrap();

    let server = connector.wait_for_connection(0).await;
    server.send_status("one\ntwo\nthree\nfour\nfive");
    panel.wait_until(|r| r.renders >= 5).await;

    let texts: Vec<String> = stream.log_entries().into_iter().map(|e| e.text).collect();
    assert_eq!(texts, vec!["three", "four", "five"]);
}

#[tokio::test]
async fn test_disconnect_stops_stream_socket() {
    let connector = MockConnector::new();
    let hub = test_hub(&connector);
    let panel = RecordingPanel::new();
    let stream = attach(&hub, &panel, "wepp");

    let server = connector.wait_for_connection(0).await;
    stream.disconnect();
    server.wait_closed().await;
    wait_for_state(stream.socket(), ConnectionState::Closed).await;
    assert!(!stream.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_reattach_after_disconnect_reconnects_shared_socket() {
    let connector = MockConnector::new();
    let hub = test_hub(&connector);
    let first_panel = RecordingPanel::new();
    let first = attach(&hub, &first_panel, "wepp");
    let first_server = connector.wait_for_connection(0).await;
    wait_for_state(first.socket(), ConnectionState::Open).await;

    // A finished run tears its stream down, then a re-run attaches again.
    first.disconnect();
    drop(first);
    let panel = RecordingPanel::new();
    let second = attach(&hub, &panel, "wepp");

    first_server.wait_closed().await;
    let server = connector.wait_for_connection(1).await;
    wait_for_state(second.socket(), ConnectionState::Open).await;
    assert!(second.is_connected());

    server.send_status("rq:1 second run");
    let record = panel.wait_until(|r| r.renders >= 1).await;
    assert_eq!(record.log_text, "rq:1 second run");
}

#[tokio::test]
async fn test_dropping_last_stream_closes_socket() {
    let connector = MockConnector::new();
    let hub = test_hub(&connector);
    let first = attach(&hub, &RecordingPanel::new(), "wepp");
    let second = attach(&hub, &RecordingPanel::new(), "wepp");
    let socket = first.socket().clone();
    let server = connector.wait_for_connection(0).await;
    assert_eq!(socket.holders(), 2);

    drop(first);
    assert!(socket.should_reconnect());

    drop(second);
    server.wait_closed().await;
    wait_for_state(&socket, ConnectionState::Closed).await;
    assert_eq!(connector.attempts(), 1);
}
