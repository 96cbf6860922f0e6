//! Minimal directed state graph driving the classification workflow.
//!
//! The surface is deliberately small: named nodes, edges optionally guarded
//! by a predicate over the current state, one entry, one exit. Execution is
//! single-threaded at the graph level — one node runs at a time and hands its
//! output state to the next node. Concurrency lives *inside* nodes (render
//! and inference fan-outs), never between them.
//!
//! Edge evaluation is deterministic: outbound edges are considered in
//! insertion order, the first edge whose predicate returns `true` wins, and
//! an unguarded edge is unconditional. On any node error execution halts and
//! the error propagates; the partially-updated state is discarded by the
//! caller.

use std::collections::HashMap;

use futures::future::BoxFuture;
use thiserror::Error;

use crate::error::HeraldError;
use crate::state::WorkflowState;

/// Future returned by a node invocation.
pub type NodeFuture = BoxFuture<'static, Result<WorkflowState, HeraldError>>;
/// A node is a function from state to a new state.
pub type NodeFn = Box<dyn Fn(WorkflowState) -> NodeFuture + Send + Sync>;
/// Guard over an edge; `true` selects the edge.
pub type EdgePredicate = Box<dyn Fn(&WorkflowState) -> bool + Send + Sync>;

/// Structural errors raised when assembling or validating a graph.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("graph entry node is not set")]
    MissingEntry,
    #[error("graph exit node is not set")]
    MissingExit,
    #[error("node '{0}' added more than once")]
    DuplicateNode(String),
    #[error("edge references unknown node '{0}'")]
    UnknownNode(String),
    #[error("graph contains a cycle through '{0}'")]
    Cycle(String),
    #[error("exit node '{0}' is not reachable from the entry")]
    UnreachableExit(String),
    #[error("node '{0}' has no matching outbound edge")]
    NoRoute(String),
}

struct Edge {
    from: String,
    to: String,
    predicate: Option<EdgePredicate>,
}

/// Builder for a workflow graph. Compile with [`StateGraph::compile`] to
/// validate the structure before running.
#[derive(Default)]
pub struct StateGraph {
    nodes: HashMap<String, NodeFn>,
    duplicates: Vec<String>,
    edges: Vec<Edge>,
    entry: Option<String>,
    exit: Option<String>,
}

impl StateGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node<F>(mut self, name: impl Into<String>, node: F) -> Self
    where
        F: Fn(WorkflowState) -> NodeFuture + Send + Sync + 'static,
    {
        let name = name.into();
        if self.nodes.insert(name.clone(), Box::new(node)).is_some() {
            self.duplicates.push(name);
        }
        self
    }

    /// Unconditional edge. Matches whenever reached in evaluation order.
    pub fn add_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edges.push(Edge {
            from: from.into(),
            to: to.into(),
            predicate: None,
        });
        self
    }

    /// Guarded edge. Selected only when `predicate` returns `true`.
    pub fn add_conditional_edge<P>(
        mut self,
        from: impl Into<String>,
        to: impl Into<String>,
        predicate: P,
    ) -> Self
    where
        P: Fn(&WorkflowState) -> bool + Send + Sync + 'static,
    {
        self.edges.push(Edge {
            from: from.into(),
            to: to.into(),
            predicate: Some(Box::new(predicate)),
        });
        self
    }

    pub fn set_entry(mut self, name: impl Into<String>) -> Self {
        self.entry = Some(name.into());
        self
    }

    pub fn set_exit(mut self, name: impl Into<String>) -> Self {
        self.exit = Some(name.into());
        self
    }

    /// Validate the structure: known endpoints, exactly one entry, a
    /// reachable exit, and no cycles.
    pub fn compile(self) -> Result<CompiledGraph, GraphError> {
        if let Some(name) = self.duplicates.into_iter().next() {
            return Err(GraphError::DuplicateNode(name));
        }
        let entry = self.entry.ok_or(GraphError::MissingEntry)?;
        let exit = self.exit.ok_or(GraphError::MissingExit)?;

        for name in [&entry, &exit] {
            if !self.nodes.contains_key(name) {
                return Err(GraphError::UnknownNode(name.clone()));
            }
        }
        for edge in &self.edges {
            for name in [&edge.from, &edge.to] {
                if !self.nodes.contains_key(name) {
                    return Err(GraphError::UnknownNode(name.clone()));
                }
            }
        }

        // DFS from the entry over all edges (guards ignored): detects
        // cycles and proves the exit is reachable at all.
        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        for edge in &self.edges {
            adjacency
                .entry(edge.from.as_str())
                .or_default()
                .push(edge.to.as_str());
        }
        let mut visiting: Vec<&str> = Vec::new();
        let mut visited: Vec<&str> = Vec::new();
        dfs(entry.as_str(), &adjacency, &mut visiting, &mut visited)?;
        if !visited.contains(&exit.as_str()) {
            return Err(GraphError::UnreachableExit(exit));
        }

        Ok(CompiledGraph {
            nodes: self.nodes,
            edges: self.edges,
            entry,
            exit,
        })
    }
}

fn dfs<'a>(
    node: &'a str,
    adjacency: &HashMap<&'a str, Vec<&'a str>>,
    visiting: &mut Vec<&'a str>,
    visited: &mut Vec<&'a str>,
) -> Result<(), GraphError> {
    if visiting.contains(&node) {
        return Err(GraphError::Cycle(node.to_string()));
    }
    if visited.contains(&node) {
        return Ok(());
    }
    visiting.push(node);
    if let Some(next) = adjacency.get(node) {
        for &target in next {
            dfs(target, adjacency, visiting, visited)?;
        }
    }
    visiting.pop();
    visited.push(node);
    Ok(())
}

/// A validated graph ready for execution.
pub struct CompiledGraph {
    nodes: HashMap<String, NodeFn>,
    edges: Vec<Edge>,
    entry: String,
    exit: String,
}

impl CompiledGraph {
    /// Run the graph from the entry node to the exit node.
    pub async fn run(&self, state: WorkflowState) -> Result<WorkflowState, HeraldError> {
        let mut current = self.entry.clone();
        let mut state = state;
        loop {
            let node = self
                .nodes
                .get(&current)
                .ok_or_else(|| GraphError::UnknownNode(current.clone()))?;
            tracing::debug!(node = %current, "running workflow node");
            state = node(state).await?;
            if current == self.exit {
                return Ok(state);
            }
            current = self.route(&current, &state)?;
        }
    }

    /// First matching outbound edge wins, in insertion order.
    fn route(&self, from: &str, state: &WorkflowState) -> Result<String, GraphError> {
        for edge in self.edges.iter().filter(|e| e.from == from) {
            match &edge.predicate {
                Some(guard) if !guard(state) => continue,
                _ => return Ok(edge.to.clone()),
            }
        }
        Err(GraphError::NoRoute(from.to_string()))
    }
}
