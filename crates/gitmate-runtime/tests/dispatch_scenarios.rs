//! End-to-end dispatch through the queue-backed runtime.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Map, Value, json};

use gitmate_core::{
    Comment, CommentKind, EventArg, EventKind, Hoster, IssueAction, MergeRequest,
    MergeRequestAction, MergeRequestState, Repository, RepositoryHandle, User,
};
use gitmate_framework::{
    BoxError, DEFAULT_SIGNATURE, InvocationError, InvocationHandle, Plugin, Responder,
    ResponderContext, ResponderRegistry, Schedule, Signature,
};
use gitmate_runtime::{
    GitmateConfig, GitmateRuntime, MemoryQueue, MemoryRepositoryStore, QueueBackend, WorkQueue,
    tick,
};

const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
struct Call {
    responder: String,
    args: Vec<EventArg>,
    options: Map<String, Value>,
}

type Calls = Arc<Mutex<Vec<Call>>>;

fn recorder(name: &str, calls: &Calls) -> Responder {
    let calls = Arc::clone(calls);
    let tag = name.to_string();
    Responder::new(name, move |ctx: ResponderContext| {
        let calls = Arc::clone(&calls);
        let tag = tag.clone();
        async move {
            calls.lock().push(Call {
                responder: tag,
                args: ctx.args().to_vec(),
                options: ctx.options().clone(),
            });
            Ok::<_, BoxError>(())
        }
    })
}

fn map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected an object"),
    }
}

fn handle(name: &str, id: u64) -> RepositoryHandle {
    RepositoryHandle::new(Hoster::GitHub, name, id)
}

fn merge_request() -> MergeRequest {
    MergeRequest {
        repository: handle("gitmate/test", 1),
        number: 42,
        title: "Add retry to the webhook client".into(),
        state: MergeRequestState::Open,
        labels: BTreeSet::new(),
        head_sha: "3f2a9c1".into(),
    }
}

fn comment(body: &str) -> EventArg {
    Comment {
        repository: handle("gitmate/test", 1),
        kind: CommentKind::Issue,
        number: 7,
        author: User {
            hoster: Hoster::GitHub,
            username: "someone".into(),
        },
        body: body.into(),
    }
    .into()
}

async fn start(builder: gitmate_framework::RegistryBuilder) -> GitmateRuntime {
    let mut config = GitmateConfig::default();
    config.scheduler.enabled = false;
    let runtime = GitmateRuntime::builder()
        .config(config)
        .registry(builder.build())
        .build()
        .unwrap();
    runtime.start().await.unwrap();
    runtime
}

async fn settle(handles: Vec<InvocationHandle>) {
    for handle in handles {
        handle.get(Some(WAIT)).await.unwrap();
    }
}

#[tokio::test]
async fn test_only_enabled_plugins_are_selected() {
    let calls = Calls::default();
    let mut builder = ResponderRegistry::builder();
    builder
        .install(
            Plugin::new("welcome_commenter")
                .responder([MergeRequestAction::Opened], recorder("greet", &calls)),
        )
        .unwrap();
    builder
        .install(
            Plugin::new("auto_label")
                .responder([MergeRequestAction::Opened], recorder("label", &calls)),
        )
        .unwrap();
    let runtime = start(builder).await;

    let repo = Repository::new("gitmate/test").with_plugin("welcome_commenter");
    let handles = runtime
        .dispatcher()
        .respond(
            &MergeRequestAction::Opened.into(),
            vec![merge_request().into()],
            Some(&repo),
        )
        .await;
    assert_eq!(handles.len(), 1);
    assert_eq!(handles[0].responder(), "welcome_commenter.greet");
    settle(handles).await;

    let calls = calls.lock();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].responder, "greet");

    drop(calls);
    runtime.stop().await.unwrap();
}

#[tokio::test]
async fn test_same_option_name_resolves_per_plugin() {
    let calls = Calls::default();
    let stale = |plugin: &str, name: &str, default: &str| {
        Plugin::new(plugin).setting("stale_label", default).responder(
            [MergeRequestAction::Synchronized],
            recorder(name, &calls)
                .signature(Signature::new().arg("pr").option("stale_label", "stale")),
        )
    };
    let mut builder = ResponderRegistry::builder();
    builder
        .install(stale("pr_stale_reminder", "pr", "status/stale"))
        .unwrap();
    builder
        .install(stale("issue_stale_reminder", "issue", "stale"))
        .unwrap();
    let runtime = start(builder).await;

    let repo = Repository::new("gitmate/test")
        .with_plugin("pr_stale_reminder")
        .with_plugin("issue_stale_reminder")
        .with_settings("pr_stale_reminder", map(json!({"stale_label": "pr: stale"})))
        .with_settings("issue_stale_reminder", map(json!({"stale_label": "issue: stale"})));
    let handles = runtime
        .dispatcher()
        .respond(
            &MergeRequestAction::Synchronized.into(),
            vec![merge_request().into()],
            Some(&repo),
        )
        .await;
    assert_eq!(handles.len(), 2);
    settle(handles).await;

    let mut calls = calls.lock().clone();
    calls.sort_by(|a, b| a.responder.cmp(&b.responder));
    assert_eq!(calls[0].responder, "issue");
    assert_eq!(calls[0].options, map(json!({"stale_label": "issue: stale"})));
    assert_eq!(calls[1].responder, "pr");
    assert_eq!(calls[1].options, map(json!({"stale_label": "pr: stale"})));

    runtime.stop().await.unwrap();
}

#[tokio::test]
async fn test_bot_comments_are_not_dispatched() {
    let calls = Calls::default();
    let mut builder = ResponderRegistry::builder();
    builder
        .install(
            Plugin::new("ack")
                .responder([IssueAction::Commented], recorder("ack", &calls))
                .responder([IssueAction::Commented], recorder("react", &calls)),
        )
        .unwrap();
    let runtime = start(builder).await;
    let repo = Repository::new("gitmate/test").with_plugin("ack");
    let kind = EventKind::from(IssueAction::Commented);

    let body = format!("Labels updated.\n\n({DEFAULT_SIGNATURE}(https://gitmate.io))");
    let handles = runtime
        .dispatcher()
        .respond(&kind, vec![comment(&body)], Some(&repo))
        .await;
    assert!(handles.is_empty());

    let handles = runtime
        .dispatcher()
        .respond(&kind, vec![comment("ack please")], Some(&repo))
        .await;
    assert_eq!(handles.len(), 2);
    settle(handles).await;
    assert_eq!(calls.lock().len(), 2);

    runtime.stop().await.unwrap();
}

#[tokio::test]
async fn test_disabled_plugin_stops_receiving_events() {
    let calls = Calls::default();
    let mut builder = ResponderRegistry::builder();
    builder
        .install(
            Plugin::new("auto_label").responder([IssueAction::Opened], recorder("label", &calls)),
        )
        .unwrap();
    let runtime = start(builder).await;

    let store = MemoryRepositoryStore::new();
    store.insert(Repository::new("gitmate/test").with_plugin("auto_label"));
    let kind = EventKind::from(IssueAction::Opened);

    let repo = store.get("gitmate/test").unwrap();
    let handles = runtime
        .dispatcher()
        .respond(&kind, Vec::new(), Some(&*repo))
        .await;
    assert_eq!(handles.len(), 1);
    settle(handles).await;

    store
        .update("gitmate/test", |r| r.disable_plugin("auto_label"))
        .unwrap();
    let repo = store.get("gitmate/test").unwrap();
    let handles = runtime
        .dispatcher()
        .respond(&kind, Vec::new(), Some(&*repo))
        .await;
    assert!(handles.is_empty());
    assert_eq!(calls.lock().len(), 1);

    runtime.stop().await.unwrap();
}

#[tokio::test]
async fn test_failing_responder_does_not_affect_the_others() {
    let calls = Calls::default();
    let failing = Responder::new("broken", |_ctx: ResponderContext| async move {
        Err::<(), BoxError>("label service returned 502".into())
    });
    let mut builder = ResponderRegistry::builder();
    builder
        .install(
            Plugin::new("triage")
                .responder([IssueAction::Labeled], recorder("first", &calls))
                .responder([IssueAction::Labeled], failing)
                .responder([IssueAction::Labeled], recorder("third", &calls)),
        )
        .unwrap();
    let runtime = start(builder).await;
    let repo = Repository::new("gitmate/test").with_plugin("triage");

    let handles = runtime
        .dispatcher()
        .respond(&IssueAction::Labeled.into(), vec!["bug".into()], Some(&repo))
        .await;
    assert_eq!(handles.len(), 3);

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.get(Some(WAIT)).await);
    }
    assert_eq!(results[0], Ok(Value::Null));
    assert!(
        matches!(&results[1], Err(InvocationError::Failed(message)) if message.contains("502"))
    );
    assert_eq!(results[2], Ok(Value::Null));

    let mut seen: Vec<_> = calls.lock().iter().map(|c| c.responder.clone()).collect();
    seen.sort();
    assert_eq!(seen, vec!["first", "third"]);

    runtime.stop().await.unwrap();
}

#[tokio::test]
async fn test_scheduled_broadcast_reaches_each_enabled_repository() {
    let calls = Calls::default();
    let mut builder = ResponderRegistry::builder();
    builder
        .install(Plugin::new("issue_stale_reminder").scheduled_responder(
            recorder("sweep", &calls),
            Schedule::every(Duration::from_secs(86_400)),
        ))
        .unwrap();
    let store: MemoryRepositoryStore = [
        Repository::new("gitmate/alpha")
            .with_handle(handle("gitmate/alpha", 1))
            .with_plugin("issue_stale_reminder"),
        Repository::new("gitmate/beta").with_handle(handle("gitmate/beta", 2)),
        Repository::new("gitmate/gamma")
            .with_handle(handle("gitmate/gamma", 3))
            .with_plugin("issue_stale_reminder"),
    ]
    .into_iter()
    .collect();

    let mut config = GitmateConfig::default();
    config.scheduler.enabled = false;
    let runtime = GitmateRuntime::builder()
        .config(config)
        .registry(builder.build())
        .repositories(Arc::new(store))
        .build()
        .unwrap();
    runtime.start().await.unwrap();

    let entry = runtime.registry().schedules()[0].clone();
    let handles = tick(runtime.dispatcher(), runtime.repositories().as_ref(), &entry).await;
    assert_eq!(handles.len(), 2);
    settle(handles).await;

    let mut repositories: Vec<_> = calls
        .lock()
        .iter()
        .map(|call| {
            assert_eq!(call.args.len(), 1);
            call.args[0].as_repository().unwrap().full_name.clone()
        })
        .collect();
    repositories.sort();
    assert_eq!(repositories, vec!["gitmate/alpha", "gitmate/gamma"]);

    runtime.stop().await.unwrap();
}

#[tokio::test]
async fn test_stored_settings_reach_the_responder() {
    let calls = Calls::default();
    let kind: EventKind = "pr.opened".parse().unwrap();
    let mut builder = ResponderRegistry::builder();
    builder
        .install(
            Plugin::new("p").responder(
                [kind.clone()],
                recorder("h", &calls)
                    .signature(Signature::new().arg("pr").option("greeting", "hi")),
            ),
        )
        .unwrap();
    let runtime = start(builder).await;

    let repo = Repository::new("R1")
        .with_plugin("p")
        .with_settings("p", map(json!({"greeting": "hello"})));
    let pr: EventArg = merge_request().into();
    let handles = runtime
        .dispatcher()
        .dispatch(&kind, vec![pr.clone()], Some(&repo), None)
        .await;
    assert_eq!(handles.len(), 1);
    settle(handles).await;

    let calls = calls.lock();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].args, vec![pr]);
    assert_eq!(calls[0].options, map(json!({"greeting": "hello"})));

    drop(calls);
    runtime.stop().await.unwrap();
}

#[tokio::test]
async fn test_submission_failure_is_not_fatal() {
    let calls = Calls::default();
    let mut builder = ResponderRegistry::builder();
    builder
        .install(
            Plugin::new("auto_label").responder([IssueAction::Opened], recorder("label", &calls)),
        )
        .unwrap();
    let registry = Arc::new(builder.build());

    let queue = Arc::new(MemoryQueue::new(8, Duration::from_millis(50)));
    queue.close();
    let backend = QueueBackend::new(Arc::clone(&registry), queue);
    let dispatcher = gitmate_framework::Dispatcher::new(registry, Arc::new(backend.clone()));

    let repo = Repository::new("gitmate/test").with_plugin("auto_label");
    let handles = dispatcher
        .respond(&IssueAction::Opened.into(), Vec::new(), Some(&repo))
        .await;
    assert!(handles.is_empty());
    assert!(backend.pending().is_empty());
    assert!(calls.lock().is_empty());
}
