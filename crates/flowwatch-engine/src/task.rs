//! Per-event processing.
//!
//! Started and finalized events share one update algorithm and differ only
//! in how the new status is derived ([`StatusRule`]) and in the reset a
//! started root flow performs on its tree.

use crate::causality::{CausalityResolver, Classification};
use crate::store::FlowStore;
use flowwatch_core::{
    BuildRef, BuildStatus, Error, EventKind, Flow, RawEvent, Result, RunState, UpstreamCause,
};
use tracing::{debug, error, info, warn};

/// How the status recorded for an event is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusRule {
    /// Always `running`; resets a root flow's tree first.
    Started,
    /// Mapped from the build's raw result.
    Finalized,
}

impl StatusRule {
    /// Rule for an event kind; completed events carry no update.
    pub fn for_kind(kind: EventKind) -> Option<Self> {
        match kind {
            EventKind::Started => Some(StatusRule::Started),
            EventKind::Finalized => Some(StatusRule::Finalized),
            EventKind::Completed => None,
        }
    }

    pub fn resolve(&self, build: &BuildRef) -> Result<BuildStatus> {
        match self {
            StatusRule::Started => Ok(BuildStatus::Running),
            StatusRule::Finalized => {
                let raw = build
                    .status
                    .as_deref()
                    .ok_or(Error::MissingBuildStatus(build.number))?;
                BuildStatus::from_raw(raw)
            }
        }
    }

    pub fn resets_flow(&self) -> bool {
        matches!(self, StatusRule::Started)
    }
}

/// What applying an event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Updated,
    /// Older than what is recorded; dropped.
    Stale,
    /// Plain job with no flow ancestry.
    Untracked,
    /// Flow (or upstream flow) not in the topology.
    UnknownFlow,
    /// Upstream flow has no resolved job tree.
    NoJobs,
    /// No job of that name accepts the build's parameters.
    NoMatchingJob,
}

/// One started or finalized event, ready to be applied.
#[derive(Debug, Clone)]
pub struct EventTask {
    name: String,
    build: BuildRef,
    rule: StatusRule,
    status: BuildStatus,
}

impl EventTask {
    /// Fails when a finalized build carries an unknown result.
    pub fn new(name: impl Into<String>, build: BuildRef, rule: StatusRule) -> Result<Self> {
        let status = rule.resolve(&build)?;
        Ok(Self {
            name: name.into(),
            build,
            rule,
            status,
        })
    }

    /// Task for a decoded event, `None` for kinds that are not tracked.
    pub fn from_event(event: RawEvent) -> Result<Option<Self>> {
        match StatusRule::for_kind(event.kind) {
            Some(rule) => Self::new(event.name, event.build, rule).map(Some),
            None => Ok(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn build(&self) -> &BuildRef {
        &self.build
    }

    pub fn rule(&self) -> StatusRule {
        self.rule
    }

    pub fn status(&self) -> BuildStatus {
        self.status
    }

    pub async fn classify(&self, resolver: &CausalityResolver) -> Result<Classification> {
        resolver.classify(&self.name, self.build.number).await
    }

    /// Classify and apply.
    pub async fn run(&self, resolver: &CausalityResolver, store: &FlowStore) -> Result<Outcome> {
        info!(name = %self.name, build = self.build.number, "Start to update flow/job status");
        let classification = self.classify(resolver).await?;
        Ok(self.apply(&classification, store).await)
    }

    /// Apply the event to the store.
    pub async fn apply(&self, classification: &Classification, store: &FlowStore) -> Outcome {
        match classification {
            Classification::Subflow(causes) | Classification::Job(causes) => {
                match owning_cause(causes, store) {
                    Some(upstream) => self.update_job(upstream, store).await,
                    None => Outcome::Untracked,
                }
            }
            Classification::RootFlow => self.update_root_flow(store).await,
            Classification::Untracked => {
                debug!(job = %self.name, "Job has no upstream flow");
                Outcome::Untracked
            }
        }
    }

    async fn update_job(&self, upstream: &UpstreamCause, store: &FlowStore) -> Outcome {
        let Some(mut flow) = store.write(&upstream.project).await else {
            error!(
                job = %self.name,
                upstream = %upstream.project,
                "Unable to find job's upstream project in the configuration"
            );
            return Outcome::UnknownFlow;
        };
        debug!(job = %self.name, flow = %flow.name, "Job acquires the lock");

        if flow.jobs.is_none() {
            error!(
                job = %self.name,
                upstream = %upstream.project,
                "Job's upstream project has no jobs in the configuration"
            );
            return Outcome::NoJobs;
        }

        if is_job_event_outdated(&flow, upstream) {
            debug!(job = %self.name, upstream = %upstream, "Event is out-dated, ignoring it");
            return Outcome::Stale;
        }

        let parameters = self.build.parameters.as_ref();
        let mut candidates: Vec<_> = flow
            .find_jobs_mut(&self.name)
            .into_iter()
            .filter(|job| job.accepts(parameters))
            .collect();

        if candidates.len() > 1 {
            warn!(
                job = %self.name,
                flow = %upstream.project,
                matches = candidates.len(),
                "Several jobs match the event, updating the first in topology order"
            );
        }

        match candidates.first_mut() {
            Some(job) => {
                job.state = Some(RunState::new(self.build.clone(), self.status));
                debug!(job = %self.name, key = %job.key, status = %self.status, "Updated job status");
                Outcome::Updated
            }
            None => {
                error!(job = %self.name, flow = %upstream.project, "No matching job in the configuration");
                Outcome::NoMatchingJob
            }
        }
    }

    async fn update_root_flow(&self, store: &FlowStore) -> Outcome {
        let Some(mut flow) = store.write(&self.name).await else {
            debug!(flow = %self.name, "Unable to find flow in the configuration");
            return Outcome::UnknownFlow;
        };
        debug!(flow = %self.name, "Flow acquires the lock");

        if is_flow_event_outdated(&flow, self.build.number) {
            debug!(flow = %self.name, build = self.build.number, "Event is out-dated, ignoring it");
            return Outcome::Stale;
        }

        if self.rule.resets_flow() {
            flow.reset();
            debug!(flow = %self.name, "Cleaned up all the downstream jobs");
        }
        flow.state = Some(RunState::new(self.build.clone(), self.status));
        debug!(flow = %self.name, build = self.build.number, status = %self.status, "Updated flow status");
        Outcome::Updated
    }
}

/// The ancestor whose flow holds the job: the topmost tracked one.
///
/// Labeled sub-flows are inlined into the flow that includes them and are
/// not tracked on their own, so the walk starts at the top of the chain.
/// Falls back to the topmost cause when no ancestor is tracked.
pub fn owning_cause<'a>(causes: &'a [UpstreamCause], store: &FlowStore) -> Option<&'a UpstreamCause> {
    causes
        .iter()
        .find(|cause| store.contains(&cause.project))
        .or_else(|| causes.first())
}

/// A root flow event is stale when it is older than the recorded build.
pub fn is_flow_event_outdated(flow: &Flow, build: u64) -> bool {
    match flow.build_number() {
        Some(current) => build < current,
        None => false,
    }
}

/// A job event is stale when its upstream flow build is older than the one
/// recorded for that flow.
pub fn is_job_event_outdated(flow: &Flow, upstream: &UpstreamCause) -> bool {
    match flow.build_number() {
        Some(current) => upstream.build < current,
        None => {
            debug!(flow = %flow.name, "No build recorded for upstream flow");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeCi;
    use flowwatch_core::ports::BuildCause;
    use flowwatch_topology::Loader;
    use std::sync::Arc;

    const FLOWS: &str = r#"
flows:
  - name: release
    jobs:
      - serial:
          - name: build
          - name: test
      - parallel:
          - name: deploy
            identifier:
              REGION: eu
          - name: deploy
            identifier:
              REGION: us
"#;

    fn store() -> FlowStore {
        FlowStore::new(Loader::from_yaml(FLOWS).unwrap().load())
    }

    fn started(name: &str, number: u64) -> EventTask {
        EventTask::new(name, BuildRef::new(number), StatusRule::Started).unwrap()
    }

    fn finalized(name: &str, build: BuildRef) -> EventTask {
        EventTask::new(name, build, StatusRule::Finalized).unwrap()
    }

    fn job_state(flow: &Flow, key: &str) -> Option<RunState> {
        flow.jobs
            .as_ref()
            .unwrap()
            .jobs()
            .into_iter()
            .find(|j| j.key == key)
            .and_then(|j| j.state.clone())
    }

    #[test]
    fn test_finalized_status_rule() {
        let task = finalized("x", BuildRef::new(1).with_status("ABORTED"));
        assert_eq!(task.status(), BuildStatus::Aborted);

        let err = EventTask::new("x", BuildRef::new(1).with_status("WEIRD"), StatusRule::Finalized)
            .unwrap_err();
        assert!(matches!(err, Error::UnknownBuildStatus(_)));

        let err = EventTask::new("x", BuildRef::new(1), StatusRule::Finalized).unwrap_err();
        assert!(matches!(err, Error::MissingBuildStatus(1)));
    }

    #[test]
    fn test_completed_events_make_no_task() {
        let event = RawEvent::new(EventKind::Completed, "x", BuildRef::new(1));
        assert!(EventTask::from_event(event).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_root_flow_started_resets_tree() {
        let store = store();
        let upstream = UpstreamCause::new("release", 4);
        finalized("build", BuildRef::new(11).with_status("SUCCESS"))
            .apply(&Classification::Job(vec![upstream]), &store)
            .await;

        let outcome = started("release", 5)
            .apply(&Classification::RootFlow, &store)
            .await;

        assert_eq!(outcome, Outcome::Updated);
        let flow = store.snapshot("release").await.unwrap();
        let state = flow.state.clone().unwrap();
        assert_eq!((state.number(), state.status), (5, BuildStatus::Running));
        assert!(job_state(&flow, "build#0").is_none());
    }

    #[tokio::test]
    async fn test_root_flow_stale_event_is_dropped() {
        let store = store();
        started("release", 5).apply(&Classification::RootFlow, &store).await;

        let outcome = finalized("release", BuildRef::new(4).with_status("FAILURE"))
            .apply(&Classification::RootFlow, &store)
            .await;

        assert_eq!(outcome, Outcome::Stale);
        let state = store.snapshot("release").await.unwrap().state.unwrap();
        assert_eq!((state.number(), state.status), (5, BuildStatus::Running));
    }

    #[tokio::test]
    async fn test_job_event_from_older_flow_run_is_stale() {
        let store = store();
        started("release", 5).apply(&Classification::RootFlow, &store).await;

        let outcome = finalized("build", BuildRef::new(10).with_status("SUCCESS"))
            .apply(&Classification::Job(vec![UpstreamCause::new("release", 4)]), &store)
            .await;

        assert_eq!(outcome, Outcome::Stale);
        let flow = store.snapshot("release").await.unwrap();
        assert!(job_state(&flow, "build#0").is_none());
    }

    #[tokio::test]
    async fn test_identifier_selects_instance() {
        let store = store();
        let classification = Classification::Job(vec![UpstreamCause::new("release", 1)]);

        let outcome = finalized(
            "deploy",
            BuildRef::new(3).with_status("SUCCESS").with_parameter("REGION", "us"),
        )
        .apply(&classification, &store)
        .await;

        assert_eq!(outcome, Outcome::Updated);
        let flow = store.snapshot("release").await.unwrap();
        assert!(job_state(&flow, "deploy#2").is_none());
        assert_eq!(job_state(&flow, "deploy#3").unwrap().status, BuildStatus::Success);

        let outcome = finalized(
            "deploy",
            BuildRef::new(4).with_status("SUCCESS").with_parameter("REGION", "ap"),
        )
        .apply(&classification, &store)
        .await;
        assert_eq!(outcome, Outcome::NoMatchingJob);
    }

    #[tokio::test]
    async fn test_ambiguous_match_takes_first_in_topology_order() {
        let store = FlowStore::new(
            Loader::from_yaml(
                r#"
flows:
  - name: f
    jobs:
      - parallel:
          - name: same
          - name: same
"#,
            )
            .unwrap()
            .load(),
        );

        let outcome = started("same", 1)
            .apply(&Classification::Job(vec![UpstreamCause::new("f", 1)]), &store)
            .await;

        assert_eq!(outcome, Outcome::Updated);
        let flow = store.snapshot("f").await.unwrap();
        assert!(job_state(&flow, "same#0").is_some());
        assert!(job_state(&flow, "same#1").is_none());
    }

    #[tokio::test]
    async fn test_unknown_upstream_and_unresolved_flow() {
        let store = FlowStore::new(
            Loader::from_yaml(
                r#"
flows:
  - name: broken
    jobs:
      - serial:
          - name: missing-label
            label: true
"#,
            )
            .unwrap()
            .load(),
        );

        let outcome = started("x", 1)
            .apply(&Classification::Job(vec![UpstreamCause::new("elsewhere", 1)]), &store)
            .await;
        assert_eq!(outcome, Outcome::UnknownFlow);

        let outcome = started("x", 1)
            .apply(&Classification::Job(vec![UpstreamCause::new("broken", 1)]), &store)
            .await;
        assert_eq!(outcome, Outcome::NoJobs);

        let outcome = started("nowhere", 1).apply(&Classification::RootFlow, &store).await;
        assert_eq!(outcome, Outcome::UnknownFlow);
    }

    #[tokio::test]
    async fn test_job_under_untracked_subflow_updates_top_flow() {
        let store = store();
        let chain = vec![UpstreamCause::new("release", 3), UpstreamCause::new("smoke", 8)];
        assert_eq!(owning_cause(&chain, &store), Some(&chain[0]));

        let outcome = finalized("test", BuildRef::new(20).with_status("SUCCESS"))
            .apply(&Classification::Job(chain.clone()), &store)
            .await;
        assert_eq!(outcome, Outcome::Updated);

        started("release", 4).apply(&Classification::RootFlow, &store).await;
        let outcome = finalized("test", BuildRef::new(21).with_status("FAILURE"))
            .apply(&Classification::Job(chain), &store)
            .await;
        assert_eq!(outcome, Outcome::Stale);

        let outer = vec![UpstreamCause::new("nightly", 1), UpstreamCause::new("release", 4)];
        assert_eq!(owning_cause(&outer, &store), Some(&outer[1]));
        assert_eq!(owning_cause(&[], &store), None);
    }

    #[tokio::test]
    async fn test_run_resolves_through_ci() {
        let store = store();
        let ci = FakeCi::new()
            .flow("release")
            .cause("test", 2, BuildCause::upstream("release", 7));
        let resolver = CausalityResolver::new(Arc::new(ci));

        assert_eq!(started("release", 7).run(&resolver, &store).await.unwrap(), Outcome::Updated);
        assert_eq!(started("test", 2).run(&resolver, &store).await.unwrap(), Outcome::Updated);
        assert_eq!(started("lonely", 1).run(&resolver, &store).await.unwrap(), Outcome::Untracked);

        let flow = store.snapshot("release").await.unwrap();
        assert_eq!(job_state(&flow, "test#1").unwrap().status, BuildStatus::Running);
    }
}
