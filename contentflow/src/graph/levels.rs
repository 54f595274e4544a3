//! Groups stages into ordered execution levels.
//!
//! A stage's depth is 0 when it has no dependencies and otherwise one more
//! than the deepest dependency. Stages sharing a depth form a level; every
//! dependency of a stage therefore lives in a strictly earlier level.

use super::StageGraph;
use crate::core::StageId;
use crate::errors::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A set of stages that may run concurrently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionLevel {
    /// Zero-based position of the level.
    pub level: usize,
    /// Stages in this level, in ascending order.
    pub stages: Vec<StageId>,
}

/// Which part of the graph a run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LevelScope {
    /// Every stage in the graph.
    #[default]
    All,
    /// The target stage and its upstream chain.
    UpTo(StageId),
}

/// Builds execution levels for the given scope.
///
/// Depths are computed over the whole graph so a cycle anywhere is reported,
/// even for partial runs.
///
/// # Errors
///
/// Returns [`ConfigurationError::CycleDetected`] if the graph is cyclic and
/// [`ConfigurationError::UnknownStage`] if a partial-run target is not declared.
pub fn build_levels(
    graph: &StageGraph,
    scope: LevelScope,
) -> Result<Vec<ExecutionLevel>, ConfigurationError> {
    let mut depths = HashMap::with_capacity(graph.len());
    let mut visiting = Vec::new();
    for stage in graph.stages() {
        depth_of(stage, graph, &mut depths, &mut visiting)?;
    }

    let in_scope: BTreeSet<StageId> = match scope {
        LevelScope::All => graph.stages().collect(),
        LevelScope::UpTo(target) => {
            if !graph.contains(target) {
                return Err(ConfigurationError::UnknownStage { stage: target });
            }
            graph.ancestors(target)
        }
    };

    let mut grouped: BTreeMap<usize, Vec<StageId>> = BTreeMap::new();
    for stage in in_scope {
        let depth = depths.get(&stage).copied().unwrap_or_default();
        grouped.entry(depth).or_default().push(stage);
    }

    Ok(grouped
        .into_values()
        .enumerate()
        .map(|(level, stages)| ExecutionLevel { level, stages })
        .collect())
}

fn depth_of(
    stage: StageId,
    graph: &StageGraph,
    depths: &mut HashMap<StageId, usize>,
    visiting: &mut Vec<StageId>,
) -> Result<usize, ConfigurationError> {
    if let Some(&depth) = depths.get(&stage) {
        return Ok(depth);
    }
    if let Some(start) = visiting.iter().position(|s| *s == stage) {
        let mut path = visiting[start..].to_vec();
        path.push(stage);
        return Err(ConfigurationError::CycleDetected { path });
    }

    visiting.push(stage);
    let mut depth = 0;
    for &dep in graph.dependencies(stage) {
        depth = depth.max(depth_of(dep, graph, depths, visiting)? + 1);
    }
    visiting.pop();

    depths.insert(stage, depth);
    Ok(depth)
}
