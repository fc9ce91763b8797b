//! End-to-end scenarios: raw transport messages through the dispatcher
//! into the flow store.

use flowwatch_core::ports::BuildCause;
use flowwatch_core::{BuildRef, BuildStatus, EventKind, RawEvent, RunState};
use flowwatch_engine::testing::FakeCi;
use flowwatch_engine::{CausalityResolver, Dispatcher, FlowStore, MetricsSnapshot, RenderedFlow};
use flowwatch_topology::Loader;
use pretty_assertions::assert_eq;
use std::sync::Arc;

const FLOWS: &str = r#"
flows:
  - name: release
    jobs:
      - serial:
          - name: build
          - name: test
      - parallel:
          - name: deploy-eu
          - name: deploy-us
          - name: smoke
            label: true
  - name: smoke
    label: true
    jobs:
      - serial:
          - name: probe
"#;

fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,flowwatch_engine=debug")),
        )
        .with_test_writer()
        .try_init();
}

fn started(name: &str, number: u64) -> String {
    RawEvent::new(EventKind::Started, name, BuildRef::new(number)).to_message()
}

fn finalized(name: &str, number: u64, status: &str) -> String {
    RawEvent::new(
        EventKind::Finalized,
        name,
        BuildRef::new(number).with_status(status),
    )
    .to_message()
}

/// Feed `messages` to a fresh dispatcher and wait for every task.
async fn replay(ci: FakeCi, store: &Arc<FlowStore>, messages: Vec<String>) -> MetricsSnapshot {
    init_test_logging();
    let resolver = Arc::new(CausalityResolver::new(Arc::new(ci)));
    let (dispatcher, handle) = Dispatcher::new("scenario", resolver, Arc::clone(store), 8);
    let metrics = dispatcher.metrics();

    for message in messages {
        handle.submit(message).unwrap();
    }
    handle.stop();
    dispatcher.run().await;
    metrics.snapshot()
}

fn store() -> Arc<FlowStore> {
    Arc::new(FlowStore::new(Loader::from_yaml(FLOWS).unwrap().load()))
}

fn state(flow: &RenderedFlow, key: &str) -> Option<(u64, BuildStatus)> {
    flow.jobs[key].state.as_ref().map(|s| (s.number(), s.status))
}

fn flow_state(flow: &RenderedFlow) -> Option<(u64, BuildStatus)> {
    flow.state.as_ref().map(|s: &RunState| (s.number(), s.status))
}

#[tokio::test]
async fn test_release_scenario() {
    let store = store();
    let ci = FakeCi::new()
        .flow("release")
        .cause("build", 12, BuildCause::upstream("release", 5));

    let metrics = replay(
        ci,
        &store,
        vec![
            started("release", 5),
            finalized("build", 12, "SUCCESS"),
            finalized("release", 4, "FAILURE"),
        ],
    )
    .await;

    let release = store.render("release").await.unwrap();
    assert_eq!(flow_state(&release), Some((5, BuildStatus::Running)));
    assert_eq!(state(&release, "build#0"), Some((12, BuildStatus::Success)));
    assert_eq!(state(&release, "test#1"), None);
    assert_eq!(metrics.stale, 1);
    assert_eq!(metrics.updated, 2);
}

#[tokio::test]
async fn test_new_root_build_resets_descendants_first() {
    let store = store();
    let ci = FakeCi::new()
        .flow("release")
        .flow("smoke")
        .cause("build", 1, BuildCause::upstream("release", 1))
        .cause("smoke", 3, BuildCause::upstream("release", 1))
        .cause("probe", 7, BuildCause::upstream("smoke", 3))
        .cause("test", 2, BuildCause::upstream("release", 2));

    replay(
        ci,
        &store,
        vec![
            started("release", 1),
            finalized("build", 1, "SUCCESS"),
            finalized("probe", 7, "ABORTED"),
            started("release", 2),
            started("test", 2),
        ],
    )
    .await;

    let release = store.render("release").await.unwrap();
    assert_eq!(flow_state(&release), Some((2, BuildStatus::Running)));
    assert_eq!(state(&release, "build#0"), None);
    assert_eq!(state(&release, "probe#4"), None);
    assert_eq!(state(&release, "test#1"), Some((2, BuildStatus::Running)));
}

#[tokio::test]
async fn test_increasing_builds_end_on_latest() {
    let store = store();
    let ci = FakeCi::new().flow("release");

    let mut messages = Vec::new();
    for number in 1..=5 {
        messages.push(started("release", number));
        messages.push(finalized("release", number, "SUCCESS"));
    }
    messages.push(started("release", 6));
    messages.push(finalized("release", 6, "FAILURE"));

    replay(ci, &store, messages).await;

    let release = store.render("release").await.unwrap();
    assert_eq!(flow_state(&release), Some((6, BuildStatus::Failure)));
}

#[tokio::test]
async fn test_older_builds_never_change_state() {
    let store = store();
    let ci = || {
        let mut ci = FakeCi::new()
            .flow("release")
            .cause("build", 50, BuildCause::upstream("release", 5));
        for number in 1..5 {
            ci = ci.cause("build", number * 10, BuildCause::upstream("release", number));
        }
        ci
    };

    replay(
        ci(),
        &store,
        vec![started("release", 5), finalized("build", 50, "SUCCESS")],
    )
    .await;
    let before = store.render("release").await.unwrap();

    let mut late = Vec::new();
    for number in 1..5 {
        late.push(finalized("release", number, "ABORTED"));
        late.push(finalized("build", number * 10, "FAILURE"));
    }
    let metrics = replay(ci(), &store, late).await;

    assert_eq!(store.render("release").await.unwrap(), before);
    assert_eq!(metrics.stale, 8);
    assert_eq!(metrics.updated, 0);
}

#[tokio::test]
async fn test_ambiguous_causes_leave_state_unchanged() {
    let store = store();
    let ci = FakeCi::new()
        .flow("release")
        .cause("build", 3, BuildCause::upstream("release", 1))
        .cause("build", 3, BuildCause::upstream("hotfix", 9));

    let metrics = replay(
        ci,
        &store,
        vec![started("release", 1), finalized("build", 3, "SUCCESS")],
    )
    .await;

    let release = store.render("release").await.unwrap();
    assert_eq!(state(&release, "build#0"), None);
    assert_eq!(metrics.skipped, 1);
}

#[tokio::test]
async fn test_subflow_updates_its_entry_in_the_parent() {
    let store = Arc::new(FlowStore::new(
        Loader::from_yaml(
            r#"
flows:
  - name: nightly
    jobs:
      - serial:
          - name: compile
          - name: release
"#,
        )
        .unwrap()
        .load(),
    ));
    let ci = FakeCi::new()
        .flow("nightly")
        .flow("release")
        .cause("release", 8, BuildCause::upstream("nightly", 2));

    replay(
        ci,
        &store,
        vec![started("nightly", 2), finalized("release", 8, "SUCCESS")],
    )
    .await;

    let nightly = store.render("nightly").await.unwrap();
    assert_eq!(state(&nightly, "release#1"), Some((8, BuildStatus::Success)));
}

#[tokio::test]
async fn test_labeled_subflow_jobs_update_the_including_flow() {
    let store = store();
    let ci = FakeCi::new()
        .flow("release")
        .flow("smoke")
        .cause("smoke", 3, BuildCause::upstream("release", 1))
        .cause("probe", 9, BuildCause::upstream("smoke", 3))
        .cause("smoke", 4, BuildCause::upstream("release", 2))
        .cause("probe", 10, BuildCause::upstream("smoke", 4));

    let metrics = replay(
        ci,
        &store,
        vec![
            started("release", 1),
            started("smoke", 3),
            finalized("probe", 9, "SUCCESS"),
        ],
    )
    .await;

    let release = store.render("release").await.unwrap();
    assert_eq!(state(&release, "probe#4"), Some((9, BuildStatus::Success)));
    assert_eq!(release.jobs["probe#4"].labeled_by.as_deref(), Some("smoke"));
    assert_eq!(metrics.updated, 2);
    assert_eq!(metrics.skipped, 1);

    let metrics = replay(
        FakeCi::new()
            .flow("release")
            .flow("smoke")
            .cause("smoke", 3, BuildCause::upstream("release", 1))
            .cause("probe", 9, BuildCause::upstream("smoke", 3))
            .cause("smoke", 4, BuildCause::upstream("release", 2))
            .cause("probe", 10, BuildCause::upstream("smoke", 4)),
        &store,
        vec![
            started("release", 2),
            finalized("probe", 9, "FAILURE"),
            started("probe", 10),
        ],
    )
    .await;

    let release = store.render("release").await.unwrap();
    assert_eq!(state(&release, "probe#4"), Some((10, BuildStatus::Running)));
    assert_eq!(metrics.stale, 1);
}

#[tokio::test]
async fn test_bad_events_fail_alone() {
    let store = store();
    let ci = FakeCi::new()
        .flow("release")
        .cause("build", 2, BuildCause::upstream("release", 1))
        .cause("test", 3, BuildCause::upstream("release", 1));

    let metrics = replay(
        ci,
        &store,
        vec![
            started("release", 1),
            "onFinalized".to_string(),
            finalized("build", 2, "UNSTABLE"),
            finalized("test", 3, "SUCCESS"),
        ],
    )
    .await;

    let release = store.render("release").await.unwrap();
    assert_eq!(state(&release, "build#0"), None);
    assert_eq!(state(&release, "test#1"), Some((3, BuildStatus::Success)));
    assert_eq!(metrics.malformed, 1);
    assert_eq!(metrics.failed, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_jobs_under_one_flow() {
    let store = store();
    let jobs = ["build", "test", "deploy-eu", "deploy-us", "probe"];
    let mut ci = FakeCi::new().flow("release");
    for (i, job) in jobs.iter().enumerate() {
        ci = ci.cause(*job, 100 + i as u64, BuildCause::upstream("release", 1));
    }

    let mut messages = vec![started("release", 1)];
    for (i, job) in jobs.iter().enumerate() {
        messages.push(started(job, 100 + i as u64));
        messages.push(finalized(job, 100 + i as u64, "SUCCESS"));
    }
    replay(ci, &store, messages).await;

    let release = store.render("release").await.unwrap();
    for job in release.jobs.values() {
        let state = job.state.as_ref().unwrap();
        assert_eq!(state.build.number, 100 + jobs.iter().position(|j| *j == job.name).unwrap() as u64);
    }
}
