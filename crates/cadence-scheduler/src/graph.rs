//! Pipeline dependency graph.
//!
//! Pipelines are nodes; every dependency material adds an edge from the
//! upstream pipeline to the pipeline declaring it. The graph is built once per
//! configuration version and never mutated afterwards.

use cadence_core::pipeline::PipelineConfig;
use cadence_core::{ConfigError, ConfigErrorKind, PipelineName, StageName};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{BTreeSet, HashMap};

/// Edge from an upstream pipeline to a downstream one.
#[derive(Debug, Clone)]
pub struct DependencyEdge {
    /// Index of the dependency material in the downstream pipeline.
    pub material_index: usize,
    pub stage: StageName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VisitState {
    Visiting,
    Visited,
}

/// One node on the depth-first stack.
struct Frame {
    node: NodeIndex,
    /// Material index on the previous frame's pipeline that led here.
    via: Option<usize>,
    edges: Vec<(usize, NodeIndex)>,
    next: usize,
}

impl Frame {
    fn new(node: NodeIndex, via: Option<usize>, edges: Vec<(usize, NodeIndex)>) -> Self {
        Self {
            node,
            via,
            edges,
            next: 0,
        }
    }
}

/// Immutable adjacency structure over pipeline names.
#[derive(Debug)]
pub struct DependencyGraph {
    graph: DiGraph<PipelineConfig, DependencyEdge>,
    name_to_index: HashMap<PipelineName, NodeIndex>,
    /// Errors found while building (duplicates, dangling references).
    build_errors: Vec<ConfigError>,
}

impl DependencyGraph {
    /// Build the graph. Never fails: problems are collected and reported by
    /// [`DependencyGraph::validate`].
    pub fn build(pipelines: &[PipelineConfig]) -> Self {
        let mut graph = DiGraph::new();
        let mut name_to_index = HashMap::new();
        let mut build_errors = Vec::new();

        for pipeline in pipelines {
            if name_to_index.contains_key(&pipeline.name) {
                build_errors.push(ConfigError::on_pipeline(
                    pipeline.name.clone(),
                    ConfigErrorKind::DuplicatePipeline,
                ));
                continue;
            }
            let idx = graph.add_node(pipeline.clone());
            name_to_index.insert(pipeline.name.clone(), idx);
        }

        let nodes: Vec<NodeIndex> = graph.node_indices().collect();
        for downstream_idx in nodes {
            let downstream = graph[downstream_idx].name.clone();
            let declared: Vec<(usize, PipelineName, StageName)> = graph[downstream_idx]
                .dependency_materials()
                .map(|(i, p, s)| (i, p.clone(), s.clone()))
                .collect();

            for (material_index, upstream, stage) in declared {
                let Some(&upstream_idx) = name_to_index.get(&upstream) else {
                    build_errors.push(ConfigError::on_material(
                        downstream.clone(),
                        material_index,
                        ConfigErrorKind::MissingUpstreamPipeline { upstream },
                    ));
                    continue;
                };
                if !graph[upstream_idx].has_stage(&stage) {
                    build_errors.push(ConfigError::on_material(
                        downstream.clone(),
                        material_index,
                        ConfigErrorKind::MissingUpstreamStage {
                            upstream,
                            stage: stage.clone(),
                        },
                    ));
                }
                graph.add_edge(
                    upstream_idx,
                    downstream_idx,
                    DependencyEdge {
                        material_index,
                        stage,
                    },
                );
            }
        }

        Self {
            graph,
            name_to_index,
            build_errors,
        }
    }

    pub fn contains(&self, pipeline: &PipelineName) -> bool {
        self.name_to_index.contains_key(pipeline)
    }

    pub fn pipeline(&self, name: &PipelineName) -> Option<&PipelineConfig> {
        self.name_to_index.get(name).map(|&idx| &self.graph[idx])
    }

    pub fn pipelines(&self) -> impl Iterator<Item = &PipelineConfig> {
        self.graph.node_weights()
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Pipelines with a dependency material pointing at `pipeline`.
    pub fn downstream_of(&self, pipeline: &PipelineName) -> BTreeSet<PipelineName> {
        self.neighbors(pipeline, Direction::Outgoing)
    }

    /// Pipelines `pipeline` has a dependency material on.
    pub fn upstream_of(&self, pipeline: &PipelineName) -> BTreeSet<PipelineName> {
        self.neighbors(pipeline, Direction::Incoming)
    }

    fn neighbors(&self, pipeline: &PipelineName, direction: Direction) -> BTreeSet<PipelineName> {
        self.name_to_index
            .get(pipeline)
            .map(|&idx| {
                self.graph
                    .neighbors_directed(idx, direction)
                    .map(|n| self.graph[n].name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Upstream edges of a node in material declaration order.
    fn upstream_edges(&self, idx: NodeIndex) -> Vec<(usize, NodeIndex)> {
        let mut edges: Vec<_> = self
            .graph
            .edges_directed(idx, Direction::Incoming)
            .map(|e| (e.weight().material_index, e.source()))
            .collect();
        edges.sort_by_key(|(material_index, _)| *material_index);
        edges
    }

    /// Validate the whole graph, collecting every error.
    ///
    /// Every pipeline that lies on a cycle gets one error on its own
    /// dependency material, rendered from that pipeline: `A <- B <- C <- A`
    /// means B depends on A, C on B and A on C.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = self.build_errors.clone();

        for root in self.graph.node_indices() {
            if let Some(error) = self.find_cycle_through(root) {
                errors.push(error);
            }
        }

        errors
    }

    /// Depth-first search over upstream edges starting at `root`, stopping at
    /// the first path that returns to `root`. Uses an explicit stack so long
    /// dependency chains cannot exhaust the thread stack.
    fn find_cycle_through(&self, root: NodeIndex) -> Option<ConfigError> {
        let mut state: HashMap<NodeIndex, VisitState> = HashMap::new();
        let mut frames = vec![Frame::new(root, None, self.upstream_edges(root))];
        state.insert(root, VisitState::Visiting);

        while let Some(frame) = frames.last_mut() {
            let Some(&(material_index, upstream)) = frame.edges.get(frame.next) else {
                state.insert(frame.node, VisitState::Visited);
                frames.pop();
                continue;
            };
            frame.next += 1;

            match state.get(&upstream) {
                None => {
                    state.insert(upstream, VisitState::Visiting);
                    let edges = self.upstream_edges(upstream);
                    frames.push(Frame::new(upstream, Some(material_index), edges));
                }
                Some(VisitState::Visiting) if upstream == root => {
                    let visiting: Vec<_> = frames.iter().map(|f| (f.node, f.via)).collect();
                    return Some(self.cycle_error(root, material_index, &visiting));
                }
                // A cycle that does not pass through root belongs to its own members.
                Some(_) => {}
            }
        }

        None
    }

    fn cycle_error(
        &self,
        root: NodeIndex,
        closing_material: usize,
        visiting: &[(NodeIndex, Option<usize>)],
    ) -> ConfigError {
        let root_name = self.graph[root].name.clone();
        let mut path = vec![root_name.clone()];
        path.extend(visiting.iter().rev().map(|(idx, _)| self.graph[*idx].name.clone()));

        // The material on root that starts the path; a self-dependency closes
        // on root directly.
        let material_index = visiting
            .get(1)
            .and_then(|(_, via)| *via)
            .unwrap_or(closing_material);

        ConfigError::on_material(
            root_name,
            material_index,
            ConfigErrorKind::CircularDependency { path },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::material::MaterialConfig;
    use pretty_assertions::assert_eq;

    fn pipeline(name: &str, depends_on: &[&str]) -> PipelineConfig {
        let mut config = PipelineConfig::new(name)
            .with_material(MaterialConfig::git(format!("https://example.com/{}.git", name)))
            .with_stage("stage");
        for upstream in depends_on {
            config = config.with_material(MaterialConfig::dependency(*upstream, "stage"));
        }
        config
    }

    fn messages(errors: &[ConfigError]) -> Vec<String> {
        errors.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_downstream_of() {
        let graph = DependencyGraph::build(&[
            pipeline("up", &[]),
            pipeline("down1", &["up"]),
            pipeline("down2", &["up"]),
        ]);

        let downstream: Vec<_> = graph.downstream_of(&"up".into()).into_iter().collect();
        assert_eq!(downstream, vec![PipelineName::new("down1"), PipelineName::new("down2")]);
        assert!(graph.downstream_of(&"down1".into()).is_empty());
        assert_eq!(graph.upstream_of(&"down2".into()).len(), 1);
        assert!(graph.validate().is_empty());
    }

    #[test]
    fn test_self_dependency() {
        let graph = DependencyGraph::build(&[pipeline("A", &["A"])]);
        let errors = graph.validate();
        assert_eq!(messages(&errors), vec!["Circular dependency: A <- A"]);
        assert_eq!(errors[0].material_index, Some(1));
    }

    #[test]
    fn test_three_pipeline_cycle_reported_on_each() {
        // p2 depends on p1, p3 on p2, p1 on p3
        let graph = DependencyGraph::build(&[
            pipeline("p1", &["p3"]),
            pipeline("p2", &["p1"]),
            pipeline("p3", &["p2"]),
        ]);
        let errors = graph.validate();

        assert_eq!(
            messages(&errors),
            vec![
                "Circular dependency: p1 <- p2 <- p3 <- p1",
                "Circular dependency: p2 <- p3 <- p1 <- p2",
                "Circular dependency: p3 <- p1 <- p2 <- p3",
            ]
        );
        for error in &errors {
            assert_eq!(error.material_index, Some(1));
        }
        let owners: Vec<_> = errors.iter().map(|e| e.pipeline.as_str()).collect();
        assert_eq!(owners, vec!["p1", "p2", "p3"]);
    }

    #[test]
    fn test_two_pipelines_depending_on_each_other() {
        let graph = DependencyGraph::build(&[
            pipeline("pipeline1", &["pipeline2"]),
            pipeline("pipeline2", &["pipeline1"]),
        ]);
        let errors = graph.validate();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(ConfigError::is_cycle));
    }

    #[test]
    fn test_downstream_of_cycle_is_not_flagged() {
        let graph = DependencyGraph::build(&[
            pipeline("a", &["b"]),
            pipeline("b", &["a"]),
            pipeline("c", &["a"]),
        ]);
        let errors = graph.validate();
        let owners: Vec<_> = errors.iter().map(|e| e.pipeline.as_str()).collect();
        assert_eq!(owners, vec!["a", "b"]);
    }

    #[test]
    fn test_dangling_reference_reported_once() {
        let graph = DependencyGraph::build(&[
            pipeline("pipeline1", &["invalid"]),
            pipeline("pipeline2", &["pipeline1"]),
        ]);
        let errors = graph.validate();

        assert_eq!(
            messages(&errors),
            vec!["Pipeline 'invalid' does not exist. It is used from pipeline 'pipeline1'."]
        );
        assert!(!errors[0].is_cycle());
        assert_eq!(errors[0].material_index, Some(1));
    }

    #[test]
    fn test_missing_upstream_stage() {
        let down = PipelineConfig::new("down")
            .with_material(MaterialConfig::dependency("up", "deploy"))
            .with_stage("test");
        let graph = DependencyGraph::build(&[pipeline("up", &[]), down]);

        assert_eq!(
            messages(&graph.validate()),
            vec!["Stage with name 'deploy' does not exist on pipeline 'up', it is being referred to from pipeline 'down'."]
        );
    }

    #[test]
    fn test_duplicate_pipeline_names() {
        let graph = DependencyGraph::build(&[pipeline("dup", &[]), pipeline("DUP", &[])]);
        let errors = graph.validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ConfigErrorKind::DuplicatePipeline);
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_independent_cycles_each_reported() {
        let graph = DependencyGraph::build(&[
            pipeline("a", &["b"]),
            pipeline("b", &["a"]),
            pipeline("x", &["x"]),
        ]);
        let errors = graph.validate();
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[2].to_string(), "Circular dependency: x <- x");
    }

    #[test]
    fn test_long_dependency_chain() {
        let mut pipelines = vec![pipeline("p0", &[])];
        for i in 1..1000 {
            let upstream = format!("p{}", i - 1);
            pipelines.push(pipeline(&format!("p{}", i), &[upstream.as_str()]));
        }
        let graph = DependencyGraph::build(&pipelines);
        assert!(graph.validate().is_empty());

        // Close the chain into one long cycle.
        pipelines[0] = pipeline("p0", &["p999"]);
        let graph = DependencyGraph::build(&pipelines);
        let errors = graph.validate();
        assert_eq!(errors.len(), 1000);
        assert!(errors.iter().all(ConfigError::is_cycle));
    }
}
