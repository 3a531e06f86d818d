use crate::RunStatus;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProgressView {
    pub status: RunStatus,
    pub percentage: u8,
    pub current_node_title: Option<String>,
    /// Completed nodes that belong to the graph.
    pub completed_nodes: usize,
    pub total_nodes: usize,
    pub eta_seconds: Option<u64>,
    pub elapsed_seconds: u64,
    pub error: Option<String>,
}
