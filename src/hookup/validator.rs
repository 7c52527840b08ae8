//! Cycle detection over declared hooks.
//!
//! Edges go from a source operation to every target hooked on it, for any
//! event. The search walks the graph depth-first with the current path held
//! in a plain `Vec`, so the first cycle found is returned as that path.

use std::collections::{BTreeMap, BTreeSet};

use super::dsl::HookMap;
use crate::framework::OpError;

pub fn validate(hooks: &HookMap) -> Result<(), OpError> {
    match find_cycle(hooks) {
        Some(cycle) => Err(OpError::HookupCycle {
            trace: cycle.join(" ~> "),
        }),
        None => Ok(()),
    }
}

/// The first cycle found, starting and ending with the same operation.
pub fn find_cycle(hooks: &HookMap) -> Option<Vec<String>> {
    let mut graph: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (source, events) in hooks {
        let targets = graph.entry(source.as_str()).or_default();
        for hook in events.values().flatten() {
            if !targets.contains(&hook.target()) {
                targets.push(hook.target());
            }
        }
    }

    let mut done = BTreeSet::new();
    for &start in graph.keys() {
        let mut path = Vec::new();
        if let Some(cycle) = walk(&graph, start, &mut path, &mut done) {
            return Some(cycle.into_iter().map(str::to_string).collect());
        }
    }
    None
}

fn walk<'a>(
    graph: &BTreeMap<&'a str, Vec<&'a str>>,
    node: &'a str,
    path: &mut Vec<&'a str>,
    done: &mut BTreeSet<&'a str>,
) -> Option<Vec<&'a str>> {
    if let Some(pos) = path.iter().position(|&visited| visited == node) {
        let mut cycle = path[pos..].to_vec();
        cycle.push(node);
        return Some(cycle);
    }
    if done.contains(node) {
        return None;
    }

    path.push(node);
    for &target in graph.get(node).into_iter().flatten() {
        if let Some(cycle) = walk(graph, target, path, done) {
            return Some(cycle);
        }
    }
    path.pop();
    done.insert(node);
    None
}
