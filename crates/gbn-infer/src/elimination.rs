//! Node elimination.
//!
//! Large circuits are evaluated by repeatedly folding a small neighborhood into
//! a single factor until every remaining factor only touches terminals, and
//! then marginalizing what is left.

use std::collections::{BTreeSet, VecDeque};

use tracing::{debug, trace};

use crate::config::{EliminationStrategy, EngineConfig};
use crate::error::{GbnError, Result};
use crate::evaluation::{evaluate, evaluate_gbn};
use crate::graph::{Gbn, Port, VertexId};
use crate::matrix::{Matrix, MatrixKind};
use crate::simplification::{local_simplification, simplify_with, Rule};
use crate::subgbn::SubGbn;
use crate::wires::WireStructure;

/// Add every factor lying on a directed path between two members of `set`.
///
/// Merging a set that is not closed this way would create a cycle through the
/// merged vertex.
pub fn convex_closure(gbn: &Gbn, set: &BTreeSet<VertexId>) -> BTreeSet<VertexId> {
    let forward = reachable(gbn, set, |v| gbn.successors(v));
    let backward = reachable(gbn, set, |v| gbn.predecessors(v));
    let mut closed = set.clone();
    closed.extend(forward.intersection(&backward).copied());
    closed
}

fn reachable<F>(gbn: &Gbn, start: &BTreeSet<VertexId>, next: F) -> BTreeSet<VertexId>
where
    F: Fn(VertexId) -> Vec<VertexId>,
{
    let mut seen: BTreeSet<VertexId> = BTreeSet::new();
    let mut queue: VecDeque<VertexId> = start.iter().copied().collect();
    while let Some(v) = queue.pop_front() {
        for u in next(v) {
            if gbn.is_node(u) && seen.insert(u) {
                queue.push_back(u);
            }
        }
    }
    seen
}

/// Number of boundary ports of the sub-circuit spanned by `set`.
pub fn boundary_width(gbn: &Gbn, set: &BTreeSet<VertexId>) -> Result<usize> {
    let vertices: Vec<VertexId> = set.iter().copied().collect();
    let sub = SubGbn::from_vertices(gbn, &vertices)?;
    Ok(sub.n() + sub.m())
}

/// Number of wires enumerated when evaluating `set` by brute force.
pub fn elimination_width(gbn: &Gbn, set: &BTreeSet<VertexId>) -> Result<usize> {
    let vertices: Vec<VertexId> = set.iter().copied().collect();
    let sub = SubGbn::from_vertices(gbn, &vertices)?;
    Ok(WireStructure::build(&sub)?.independent_count())
}

/// Close `vertices` under paths and absorb enclosed neighbors.
///
/// A neighbor is enclosed when all of its predecessors, or all of its
/// successors, already belong to the set. It is absorbed when that does not
/// increase the [`elimination_width`] of the set.
pub fn path_closing(gbn: &Gbn, vertices: &[VertexId]) -> Result<Vec<VertexId>> {
    let start: BTreeSet<VertexId> = vertices.iter().copied().collect();
    let mut set = convex_closure(gbn, &start);
    let mut width = elimination_width(gbn, &set)?;

    loop {
        let candidates: BTreeSet<VertexId> = set
            .iter()
            .flat_map(|&v| gbn.neighbors(v))
            .filter(|u| !set.contains(u))
            .collect();

        let mut absorbed = false;
        for u in candidates {
            let predecessors = gbn.predecessors(u);
            let successors = gbn.successors(u);
            let enclosed = (!predecessors.is_empty()
                && predecessors.iter().all(|p| set.contains(p)))
                || (!successors.is_empty() && successors.iter().all(|s| set.contains(s)));
            if !enclosed {
                continue;
            }

            let mut extended = set.clone();
            extended.insert(u);
            let extended = convex_closure(gbn, &extended);
            let extended_width = elimination_width(gbn, &extended)?;
            if extended_width <= width {
                trace!(vertex = %u, width = extended_width, "absorbing enclosed neighbor");
                set = extended;
                width = extended_width;
                absorbed = true;
                break;
            }
        }
        if !absorbed {
            break;
        }
    }

    Ok(set.into_iter().collect())
}

/// Replace `vertices` by one factor equal to their joint evaluation.
///
/// Boundary edges keep their equivalence classes. The graph is left untouched
/// if evaluation fails.
pub fn merge_vertices(gbn: &mut Gbn, vertices: &[VertexId], label: &str) -> Result<VertexId> {
    let (matrix, inputs, outputs) = {
        let sub = SubGbn::from_vertices(gbn, vertices)?;
        let matrix = evaluate(&sub)?;

        let inside = sub.inside();
        let mut inputs: Vec<(Port, usize)> = Vec::with_capacity(sub.n());
        for &port in sub.input_ports() {
            let eq_class = gbn
                .edges_from(port)
                .into_iter()
                .filter_map(|e| gbn.edge(e).ok())
                .find(|edge| inside.contains(&edge.to.vertex))
                .map(|edge| edge.eq_class)
                .ok_or_else(|| {
                    GbnError::integrity(format!("boundary port {} feeds nothing inside", port))
                })?;
            inputs.push((port, eq_class));
        }

        let mut outputs: Vec<Vec<(Port, usize)>> = Vec::with_capacity(sub.m());
        for group in sub.output_ports() {
            let mut sinks = Vec::with_capacity(group.len());
            for &port in group {
                let edge = gbn.edge(gbn.edge_into(port)?)?;
                sinks.push((port, edge.eq_class));
            }
            outputs.push(sinks);
        }
        (matrix, inputs, outputs)
    };

    let label = if matrix.kind() == MatrixKind::Diagonal {
        "diagonal"
    } else {
        label
    };

    let unique: BTreeSet<VertexId> = vertices.iter().copied().collect();
    for &v in &unique {
        gbn.remove_vertex(v)?;
    }
    let merged = gbn.add_vertex(matrix, label);
    for (i_port, (port, eq_class)) in inputs.into_iter().enumerate() {
        gbn.add_edge(port, Port::new(merged, i_port), eq_class)?;
    }
    for (i_port, sinks) in outputs.into_iter().enumerate() {
        for (port, eq_class) in sinks {
            gbn.add_edge(Port::new(merged, i_port), port, eq_class)?;
        }
    }

    debug!(merged = %merged, count = unique.len(), "merged vertices");
    Ok(merged)
}

fn adjacent_candidates(gbn: &Gbn, candidates: &BTreeSet<VertexId>, v: VertexId) -> Vec<VertexId> {
    gbn.neighbors(v)
        .into_iter()
        .filter(|u| candidates.contains(u))
        .collect()
}

fn pair_width(gbn: &Gbn, v: VertexId, u: VertexId) -> Result<usize> {
    let pair: BTreeSet<VertexId> = [v, u].into_iter().collect();
    elimination_width(gbn, &convex_closure(gbn, &pair))
}

fn cheapest_neighbor(
    gbn: &Gbn,
    candidates: &BTreeSet<VertexId>,
    v: VertexId,
) -> Result<Option<(usize, VertexId)>> {
    let mut best: Option<(usize, VertexId)> = None;
    for u in adjacent_candidates(gbn, candidates, v) {
        let width = pair_width(gbn, v, u)?;
        if best.map_or(true, |(w, _)| width < w) {
            best = Some((width, u));
        }
    }
    Ok(best)
}

/// Pick the next pair of adjacent candidates to merge.
pub fn select_pair(
    gbn: &Gbn,
    candidates: &[VertexId],
    strategy: EliminationStrategy,
) -> Result<(VertexId, VertexId)> {
    let set: BTreeSet<VertexId> = candidates.iter().copied().collect();

    for &v in &set {
        for u in adjacent_candidates(gbn, &set, v) {
            if gbn.matrix(u)?.kind() == MatrixKind::Terminator {
                return Ok((v, u));
            }
        }
    }

    for &v in &set {
        if gbn.in_edges(v).is_empty() {
            if let Some((_, u)) = cheapest_neighbor(gbn, &set, v)? {
                return Ok((v, u));
            }
        }
    }

    let pair = match strategy {
        EliminationStrategy::MinWidth => {
            let mut best: Option<(usize, VertexId, VertexId)> = None;
            for &v in &set {
                for u in adjacent_candidates(gbn, &set, v).into_iter().filter(|&u| u > v) {
                    let width = pair_width(gbn, v, u)?;
                    if best.map_or(true, |(w, _, _)| width < w) {
                        best = Some((width, v, u));
                    }
                }
            }
            best.map(|(_, v, u)| (v, u))
        }
        EliminationStrategy::MinDegree => {
            let v = set
                .iter()
                .copied()
                .filter(|&v| !adjacent_candidates(gbn, &set, v).is_empty())
                .min_by_key(|&v| gbn.degree(v));
            v.and_then(|v| {
                let neighbors = adjacent_candidates(gbn, &set, v);
                let tight = neighbors.iter().copied().filter(|&u| {
                    let pair: BTreeSet<VertexId> = [v, u].into_iter().collect();
                    convex_closure(gbn, &pair).len() == 2
                });
                tight
                    .min_by_key(|&u| gbn.degree(u))
                    .or_else(|| neighbors.iter().copied().min_by_key(|&u| gbn.degree(u)))
                    .map(|u| (v, u))
            })
        }
    };
    pair.ok_or_else(|| GbnError::InvalidArgument("no adjacent pair among candidates".to_string()))
}

/// One elimination step: select a pair among `candidates`, close it and merge it.
pub fn node_elimination(
    gbn: &mut Gbn,
    candidates: &[VertexId],
    strategy: EliminationStrategy,
) -> Result<VertexId> {
    let (v, u) = select_pair(gbn, candidates, strategy)?;
    let closed = path_closing(gbn, &[v, u])?;
    debug!(
        first = %v,
        second = %u,
        size = closed.len(),
        ?strategy,
        "eliminating neighborhood"
    );
    merge_vertices(gbn, &closed, "merged")
}

fn touches_factor(gbn: &Gbn, v: VertexId) -> bool {
    gbn.predecessors(v)
        .into_iter()
        .chain(gbn.successors(v))
        .any(|u| u != v && gbn.is_node(u))
}

/// Evaluate the whole graph by node elimination.
///
/// Works on a copy; the argument is not modified.
pub fn evaluate_stepwise(gbn: &Gbn, config: &EngineConfig) -> Result<Matrix> {
    let mut work = gbn.clone();
    if config.pre_simplify {
        local_simplification(&mut work, config, None)?;
    }
    eliminate_all(&mut work, config.elimination_strategy)?;
    evaluate_gbn(&work)
}

/// Eliminate until no factor is adjacent to another factor.
pub fn eliminate_all(gbn: &mut Gbn, strategy: EliminationStrategy) -> Result<usize> {
    let mut steps = 0;
    loop {
        let candidates: Vec<VertexId> = gbn
            .inside_vertices()
            .into_iter()
            .filter(|&v| touches_factor(gbn, v))
            .collect();
        if candidates.is_empty() {
            break;
        }
        node_elimination(gbn, &candidates, strategy)?;
        steps += 1;
    }
    debug!(steps, remaining = gbn.inside_vertices().len(), "elimination finished");
    Ok(steps)
}

/// Evaluate only the part of the circuit that feeds output `place`.
///
/// Every other output is terminated and stochastic factors that only feed
/// terminators are pruned before stepwise evaluation. The result has a single
/// output.
pub fn evaluate_specific_place(place: usize, gbn: &Gbn, config: &EngineConfig) -> Result<Matrix> {
    let mut work = gbn.clone();
    work.restrict_outputs(&[place])?;
    simplify_with(&mut work, &[Rule::CoUnit, Rule::F2], config, None)?;
    debug!(
        place,
        remaining = work.inside_vertices().len(),
        "pruned circuit for output place"
    );
    evaluate_stepwise(&work, config)
}
