use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::EngineError;

/// Dependency structure of a loaded flow, derived from each node's input ids.
#[derive(Debug, Clone, Default)]
pub struct Graph {
  /// Node ids in load order.
  order: Vec<String>,
  /// node_id -> resolved, deduplicated upstream ids.
  upstream: HashMap<String, Vec<String>>,
  /// node_id -> downstream ids in load order.
  downstream: HashMap<String, Vec<String>>,
  /// Nodes with no declared inputs, in load order.
  entry_points: Vec<String>,
  /// (node_id, input_id) pairs whose input is not in the flow.
  unresolved: Vec<(String, String)>,
}

impl Graph {
  /// Build from `(node_id, inputs)` pairs given in load order.
  pub fn new<'a, I>(nodes: I) -> Self
  where
    I: IntoIterator<Item = (&'a str, &'a [String])>,
  {
    let nodes: Vec<(&str, &[String])> = nodes.into_iter().collect();
    let known: HashSet<&str> = nodes.iter().map(|(id, _)| *id).collect();

    let mut graph = Self::default();
    for (id, inputs) in &nodes {
      graph.order.push(id.to_string());
      graph.downstream.entry(id.to_string()).or_default();
      if inputs.is_empty() {
        graph.entry_points.push(id.to_string());
      }

      let mut resolved: Vec<String> = Vec::with_capacity(inputs.len());
      for input in inputs.iter() {
        if !known.contains(input.as_str()) {
          graph.unresolved.push((id.to_string(), input.clone()));
        } else if !resolved.contains(input) {
          resolved.push(input.clone());
        }
      }
      graph.upstream.insert(id.to_string(), resolved);
    }

    for id in &graph.order {
      for input in &graph.upstream[id] {
        graph.downstream.entry(input.clone()).or_default().push(id.clone());
      }
    }
    graph
  }

  pub fn len(&self) -> usize {
    self.order.len()
  }

  pub fn is_empty(&self) -> bool {
    self.order.is_empty()
  }

  pub fn entry_points(&self) -> &[String] {
    &self.entry_points
  }

  pub fn upstream(&self, node_id: &str) -> &[String] {
    self.upstream.get(node_id).map(|v| v.as_slice()).unwrap_or(&[])
  }

  pub fn downstream(&self, node_id: &str) -> &[String] {
    self.downstream.get(node_id).map(|v| v.as_slice()).unwrap_or(&[])
  }

  pub fn unresolved(&self) -> &[(String, String)] {
    &self.unresolved
  }

  /// Number of resolved inputs per node; the scheduler counts these down.
  pub fn in_degrees(&self) -> HashMap<String, usize> {
    self
      .order
      .iter()
      .map(|id| (id.clone(), self.upstream(id).len()))
      .collect()
  }

  /// Nodes that can never become ready, in load order. Empty when acyclic.
  pub fn blocked(&self) -> Vec<String> {
    let mut remaining = self.in_degrees();
    let mut queue: VecDeque<&str> = self
      .order
      .iter()
      .filter(|id| remaining[*id] == 0)
      .map(String::as_str)
      .collect();

    while let Some(id) = queue.pop_front() {
      for next in self.downstream(id) {
        if let Some(count) = remaining.get_mut(next) {
          *count -= 1;
          if *count == 0 {
            queue.push_back(next);
          }
        }
      }
    }

    self.order.iter().filter(|id| remaining[*id] > 0).cloned().collect()
  }

  /// Check that the flow can be walked to completion. An empty graph has no
  /// entry nodes.
  pub fn check(&self) -> Result<(), EngineError> {
    if self.entry_points.is_empty() {
      return Err(EngineError::NoEntryNodes);
    }
    if let Some((node_id, input_id)) = self.unresolved.first() {
      return Err(EngineError::UnresolvedInput {
        node_id: node_id.clone(),
        input_id: input_id.clone(),
      });
    }
    let blocked = self.blocked();
    if !blocked.is_empty() {
      return Err(EngineError::Cycle { nodes: blocked });
    }
    Ok(())
  }
}
