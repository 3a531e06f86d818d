/// One stage of the upstream workflow.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowNode {
    pub id: String,
    pub title: String,
    /// Relative share of the run; never negative once inside a [`NodeGraph`].
    pub weight: f64,
    /// Display grouping; does not affect weights.
    pub phase: u32,
}

impl WorkflowNode {
    pub fn new(id: impl Into<String>, title: impl Into<String>, weight: f64, phase: u32) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            weight,
            phase,
        }
    }
}

/// The known node set and its weights.
///
/// Must mirror the upstream workflow's own node graph. The table is supplied
/// by configuration; nothing here hard-codes node ids.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodeGraph {
    nodes: Vec<WorkflowNode>,
    total_weight: f64,
}

impl NodeGraph {
    /// Builds a graph, keeping the first occurrence of a duplicated id and
    /// clamping negative or non-finite weights to zero.
    pub fn new(nodes: impl IntoIterator<Item = WorkflowNode>) -> Self {
        let mut kept: Vec<WorkflowNode> = Vec::new();
        for mut node in nodes {
            if kept.iter().any(|existing| existing.id == node.id) {
                continue;
            }
            if !node.weight.is_finite() || node.weight < 0.0 {
                node.weight = 0.0;
            }
            kept.push(node);
        }
        let total_weight = kept.iter().map(|node| node.weight).sum();
        Self {
            nodes: kept,
            total_weight,
        }
    }

    pub fn nodes(&self) -> &[WorkflowNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Weight of `id`, or zero when the id is not part of the graph.
    pub fn weight_of(&self, id: &str) -> f64 {
        self.get(id).map_or(0.0, |node| node.weight)
    }

    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    pub fn nodes_in_phase(&self, phase: u32) -> impl Iterator<Item = &WorkflowNode> {
        self.nodes.iter().filter(move |node| node.phase == phase)
    }

    /// Distinct phases in ascending order.
    pub fn phases(&self) -> Vec<u32> {
        let mut phases: Vec<u32> = self.nodes.iter().map(|node| node.phase).collect();
        phases.sort_unstable();
        phases.dedup();
        phases
    }
}

/// Human readable label for a phase number.
pub fn phase_description(phase: u32) -> String {
    match phase {
        0 => "Initialize".to_string(),
        1 => "Data collection".to_string(),
        2 => "Deep analysis".to_string(),
        3 => "Report writing".to_string(),
        4 => "Format conversion".to_string(),
        5 => "Output".to_string(),
        other => format!("Phase {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> NodeGraph {
        NodeGraph::new(vec![
            WorkflowNode::new("start", "Start", 0.5, 0),
            WorkflowNode::new("fetch", "Fetch", 2.0, 1),
            WorkflowNode::new("plan", "Plan", 1.5, 1),
            WorkflowNode::new("write", "Write", 4.0, 3),
        ])
    }

    #[test]
    fn total_weight_sums_all_nodes() {
        assert_eq!(graph().total_weight(), 8.0);
    }

    #[test]
    fn unknown_ids_weigh_nothing() {
        let graph = graph();
        assert_eq!(graph.weight_of("fetch"), 2.0);
        assert_eq!(graph.weight_of("missing"), 0.0);
        assert!(!graph.contains("missing"));
    }

    #[test]
    fn duplicates_and_negative_weights_are_sanitized() {
        let graph = NodeGraph::new(vec![
            WorkflowNode::new("a", "A", 1.0, 0),
            WorkflowNode::new("a", "A again", 9.0, 0),
            WorkflowNode::new("b", "B", -3.0, 1),
            WorkflowNode::new("c", "C", f64::NAN, 1),
        ]);
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.get("a").map(|n| n.title.as_str()), Some("A"));
        assert_eq!(graph.weight_of("b"), 0.0);
        assert_eq!(graph.weight_of("c"), 0.0);
        assert_eq!(graph.total_weight(), 1.0);
    }

    #[test]
    fn phases_are_sorted_and_distinct() {
        let graph = graph();
        assert_eq!(graph.phases(), vec![0, 1, 3]);
        let ids: Vec<_> = graph.nodes_in_phase(1).map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["fetch", "plan"]);
    }

    #[test]
    fn phase_descriptions_fall_back_to_number() {
        assert_eq!(phase_description(2), "Deep analysis");
        assert_eq!(phase_description(9), "Phase 9");
    }
}
