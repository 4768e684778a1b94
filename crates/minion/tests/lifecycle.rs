//! Lifecycle manager against real subprocesses.

#![cfg(unix)]

mod common;

use minion::daemon::events::EventSink;
use minion::daemon::runner::Params;
use minion::daemon::stats::StatsPublisher;
use minion::daemon::ErrorKind;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[tokio::test]
async fn test_install_list_and_remove() {
    let fixture = common::fixture();
    let manager = fixture.manager();
    let layout = fixture.layout();

    let out = manager
        .install("echo", "example/echo", &Params::new())
        .await
        .unwrap();
    assert_eq!(out, "ok");
    assert_eq!(
        manager.list(),
        HashMap::from([("echo".to_string(), "example/echo".to_string())])
    );
    assert!(layout.executable("echo").is_file());

    let out = manager.remove("echo").await.unwrap();
    assert_eq!(out, "removed echo\n");
    assert!(!manager.exists("echo"));
    assert!(!layout.service_dir("echo").exists());
}

#[tokio::test]
async fn test_install_params_reach_the_service() {
    let fixture = common::fixture();
    let manager = fixture.manager();

    let mut params = Params::new();
    params.insert("port".to_string(), serde_json::json!(3000));
    manager.install("echo", "example/echo", &params).await.unwrap();

    let written =
        std::fs::read_to_string(fixture.layout().service_dir("echo").join("params.json")).unwrap();
    assert_eq!(written, r#"{"port":3000}"#);
}

#[tokio::test]
async fn test_status_sees_identity_and_empty_params() {
    let fixture = common::fixture();
    let manager = fixture.manager();
    manager
        .install("echo", "example/echo", &Params::new())
        .await
        .unwrap();

    let out = manager.status("echo").await.unwrap();
    assert_eq!(out, "echo example/echo {}");

    let out = manager.start("echo").await.unwrap();
    assert_eq!(out, "started echo\n");
}

#[tokio::test]
async fn test_stop_failure_carries_exact_output() {
    let fixture = common::fixture();
    let manager = fixture.manager();
    manager
        .install("echo", "example/echo", &Params::new())
        .await
        .unwrap();

    let err = manager.stop("echo").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SubprocessFailure);
    assert_eq!(err.output(), Some("not running\n"));
}

#[tokio::test]
async fn test_stats_typed_and_parse_failure() {
    let fixture = common::fixture();
    let manager = fixture.manager();
    for id in ["echo", "garbled"] {
        manager
            .install(id, &format!("example/{id}"), &Params::new())
            .await
            .unwrap();
    }

    let stats = manager.stats("echo").await.unwrap();
    assert_eq!(stats.get("ops"), Some(&42));

    let err = manager.stats("garbled").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ParseFailure);
}

#[tokio::test]
async fn test_failed_build_registers_nothing() {
    let fixture = common::failing_build_fixture();
    let manager = fixture.manager();

    let err = manager
        .install("echo", "example/echo", &Params::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExternalToolFailure);
    assert_eq!(err.output(), Some("cannot build example/echo\n"));
    assert!(!manager.exists("echo"));
    assert!(manager.list().is_empty());
}

#[tokio::test]
async fn test_unregistered_id_is_not_found() {
    let fixture = common::fixture();
    let manager = fixture.manager();

    for result in [
        manager.status("ghost").await,
        manager.start("ghost").await,
        manager.stop("ghost").await,
        manager.remove("ghost").await,
    ] {
        assert_eq!(result.unwrap_err().kind(), ErrorKind::NotFound);
    }
    assert!(!fixture.layout().service_dir("ghost").exists());
}

#[tokio::test]
async fn test_concurrent_installs_of_distinct_ids() {
    let fixture = common::fixture();
    let manager = fixture.manager();

    let tasks: Vec<_> = ["alpha", "beta", "gamma"]
        .into_iter()
        .map(|id| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                manager
                    .install(id, &format!("example/{id}"), &Params::new())
                    .await
            })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), "ok");
    }
    assert_eq!(manager.list().len(), 3);
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<(String, String, String)>>,
}

impl EventSink for Recorder {
    fn send_event_message(&self, data: &str, event: &str, id: &str) {
        self.events
            .lock()
            .unwrap()
            .push((data.to_string(), event.to_string(), id.to_string()));
    }
}

#[tokio::test]
async fn test_publisher_skips_failing_service() {
    let fixture = common::fixture();
    let manager = fixture.manager();
    for id in ["echo", "broken"] {
        manager
            .install(id, &format!("example/{id}"), &Params::new())
            .await
            .unwrap();
    }

    let recorder = Arc::new(Recorder::default());
    let publisher = StatsPublisher::new(
        Arc::clone(&manager),
        Arc::clone(&recorder),
        Duration::from_millis(100),
    );

    assert_eq!(publisher.publish_once().await, 1);
    assert_eq!(publisher.publish_once().await, 1);

    let events = recorder.events.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            (
                r#"{"ops":42}"#.to_string(),
                "stats:echo".to_string(),
                String::new()
            );
            2
        ]
    );
}
