//! Flow definition loader.
//!
//! Reading happens in three passes: parse the YAML definitions, substitute
//! label references (reshape), then generate the render map for every
//! resolved flow. A flow whose reshape fails is kept with an empty job tree
//! and no render map; other flows are unaffected.

use crate::definition::{FlowSpec, FlowsFile, GroupKind};
use crate::error::TopologyError;
use crate::render::RenderMap;
use flowwatch_core::{Flow, Job, JobNode};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, error, info, warn};

/// Resolved flows and their render maps.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    pub flows: BTreeMap<String, Flow>,
    pub maps: BTreeMap<String, RenderMap>,
    /// Flows whose reshape failed, with the reason.
    pub unresolved: BTreeMap<String, String>,
}

impl Topology {
    /// Load and merge several definition files.
    ///
    /// Labels are resolved per file; later files override flows of the same
    /// name from earlier ones.
    pub fn load_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self, TopologyError> {
        let mut topology = Topology::default();
        for path in paths {
            let loaded = Loader::from_file(path)?.load();
            topology.merge(loaded);
        }
        Ok(topology)
    }

    pub fn merge(&mut self, other: Topology) {
        for (name, flow) in other.flows {
            if self.flows.contains_key(&name) {
                warn!(flow = %name, "Flow defined more than once, keeping the latest definition");
            }
            self.maps.remove(&name);
            self.unresolved.remove(&name);
            self.flows.insert(name, flow);
        }
        self.maps.extend(other.maps);
        self.unresolved.extend(other.unresolved);
    }

    pub fn flow_names(&self) -> impl Iterator<Item = &str> {
        self.flows.keys().map(String::as_str)
    }
}

/// Reads one definition file.
#[derive(Debug, Clone)]
pub struct Loader {
    source: String,
    file: FlowsFile,
}

impl Loader {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TopologyError> {
        let path = path.as_ref();
        info!(path = %path.display(), "Reading flow definitions");
        let content = std::fs::read_to_string(path)?;
        let file: FlowsFile = serde_yaml::from_str(&content)?;
        Ok(Self {
            source: path.display().to_string(),
            file,
        })
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, TopologyError> {
        Ok(Self {
            source: "<inline>".to_string(),
            file: serde_yaml::from_str(yaml)?,
        })
    }

    pub fn from_definitions(file: FlowsFile) -> Self {
        Self {
            source: "<memory>".to_string(),
            file,
        }
    }

    /// Resolve every non-label flow.
    pub fn load(&self) -> Topology {
        let mut definitions: BTreeMap<&str, &FlowSpec> = BTreeMap::new();
        for spec in &self.file.flows {
            if definitions.insert(spec.name.as_str(), spec).is_some() {
                warn!(
                    source = %self.source,
                    flow = %spec.name,
                    "Flow defined more than once, keeping the latest definition"
                );
            }
        }

        let mut topology = Topology::default();
        for spec in definitions.values().filter(|spec| !spec.label) {
            match reshape(&definitions, spec, &mut Vec::new()) {
                Ok(groups) => {
                    let mut root = JobNode::Serial(groups);
                    assign_keys(&mut root);
                    let map = RenderMap::generate(&mut root);
                    debug!(flow = %spec.name, jobs = map.len(), "Flow resolved");
                    topology.maps.insert(spec.name.clone(), map);
                    topology
                        .flows
                        .insert(spec.name.clone(), Flow::new(spec.name.clone(), Some(root)));
                }
                Err(e) => {
                    error!(source = %self.source, flow = %spec.name, error = %e, "Unable to reshape flow");
                    topology.unresolved.insert(spec.name.clone(), e.to_string());
                    topology
                        .flows
                        .insert(spec.name.clone(), Flow::new(spec.name.clone(), None));
                }
            }
        }
        topology
    }
}

/// Build the job groups of `spec`, inlining label references.
fn reshape(
    definitions: &BTreeMap<&str, &FlowSpec>,
    spec: &FlowSpec,
    stack: &mut Vec<String>,
) -> Result<Vec<JobNode>, TopologyError> {
    let labeled_by = spec.label.then(|| spec.name.clone());
    let mut groups = Vec::with_capacity(spec.jobs.len());

    for group in &spec.jobs {
        let (kind, members) = group.members(&spec.name)?;
        let mut children = Vec::with_capacity(members.len());

        for member in members {
            if !member.label {
                children.push(JobNode::Job(Job {
                    description: member.description.clone(),
                    identifier: member.identifier.clone(),
                    labeled_by: labeled_by.clone(),
                    ..Job::new(String::new(), member.name.clone())
                }));
                continue;
            }

            let label = definitions
                .get(member.name.as_str())
                .filter(|def| def.label)
                .ok_or_else(|| TopologyError::UnknownLabel(member.name.clone()))?;
            if stack.iter().any(|name| name == &label.name) {
                return Err(TopologyError::LabelCycle(label.name.clone()));
            }

            stack.push(label.name.clone());
            let mut inlined = reshape(definitions, label, stack)?;
            stack.pop();

            let count = inlined.len();
            let inner = match inlined.pop() {
                Some(inner) if count == 1 => inner,
                _ => {
                    return Err(TopologyError::UnsupportedLabel {
                        label: label.name.clone(),
                        groups: count,
                    });
                }
            };

            match (kind, inner) {
                (GroupKind::Serial, JobNode::Serial(nodes))
                | (GroupKind::Parallel, JobNode::Parallel(nodes)) => children.extend(nodes),
                (_, other) => children.push(other),
            }
        }

        groups.push(match kind {
            GroupKind::Serial => JobNode::Serial(children),
            GroupKind::Parallel => JobNode::Parallel(children),
        });
    }

    Ok(groups)
}

fn assign_keys(root: &mut JobNode) {
    for (position, job) in root.jobs_mut().into_iter().enumerate() {
        job.key = format!("{}#{}", job.name, position);
    }
}
