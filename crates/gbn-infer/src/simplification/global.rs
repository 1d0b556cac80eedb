//! Rewrites that fold several factors together.
//!
//! These rules merge a vertex with part of its neighborhood, so they are
//! bounded by [`EngineConfig::max_merge_width`]: a merge that would enumerate
//! more wires is skipped.

use std::collections::{BTreeSet, VecDeque};

use tracing::trace;

use crate::bits::MAX_PLACES;
use crate::config::EngineConfig;
use crate::elimination::{convex_closure, merge_vertices, path_closing};
use crate::error::Result;
use crate::graph::{Gbn, Port, VertexId, VertexKind};
use crate::matrix::{normalize_columns, Matrix, MatrixKind};
use crate::simplification::local::in_edge_list;
use crate::subgbn::SubGbn;
use crate::wires::WireStructure;

fn within_limits(gbn: &Gbn, set: &[VertexId], config: &EngineConfig) -> Result<bool> {
    let sub = SubGbn::from_vertices(gbn, set)?;
    if sub.n() > MAX_PLACES || sub.m() > MAX_PLACES {
        return Ok(false);
    }
    Ok(WireStructure::build(&sub)?.independent_count() <= config.max_merge_width)
}

fn is_filter_like(gbn: &Gbn, v: VertexId) -> bool {
    gbn.matrix(v).map(Matrix::is_filter_like).unwrap_or(false)
}

/// Merge a connected group of filter and diagonal gates into one diagonal.
pub fn merge_filters(gbn: &mut Gbn, v: VertexId, config: &EngineConfig) -> Result<bool> {
    if !is_filter_like(gbn, v) {
        return Ok(false);
    }

    let mut set: BTreeSet<VertexId> = BTreeSet::from([v]);
    let mut queue: VecDeque<VertexId> = VecDeque::from([v]);
    while let Some(u) = queue.pop_front() {
        for w in gbn.neighbors(u) {
            if set.contains(&w) || !is_filter_like(gbn, w) {
                continue;
            }
            let mut extended = set.clone();
            extended.insert(w);
            let extended = convex_closure(gbn, &extended);
            if extended.iter().all(|&x| is_filter_like(gbn, x)) {
                queue.extend(extended.difference(&set).copied());
                set = extended;
            }
        }
    }
    if set.len() < 2 {
        return Ok(false);
    }

    let members: Vec<VertexId> = set.into_iter().collect();
    if !within_limits(gbn, &members, config)? {
        return Ok(false);
    }
    let merged = merge_vertices(gbn, &members, "diagonal")?;
    trace!(merged = %merged, count = members.len(), "merged filter gates");
    Ok(true)
}

/// Push a stochastic factor that feeds no output terminal into its consumers.
///
/// A stochastic factor without any output ports always evaluates to one and
/// is replaced by terminators on its inputs.
pub fn eliminate_stochastic_without_outputs(
    gbn: &mut Gbn,
    v: VertexId,
    config: &EngineConfig,
) -> Result<bool> {
    let matrix = match gbn.matrix(v) {
        Ok(m) if m.is_stochastic() && m.kind() != MatrixKind::Terminator => m,
        _ => return Ok(false),
    };

    if matrix.m() == 0 {
        let preds = in_edge_list(gbn, v);
        gbn.remove_vertex(v)?;
        for edge in preds {
            let t = gbn.add_vertex(Matrix::terminator(), "T");
            gbn.add_edge(edge.from, Port::new(t, 0), edge.eq_class)?;
        }
        return Ok(true);
    }

    let successors = gbn.successors(v);
    if successors.is_empty()
        || successors
            .iter()
            .any(|&s| gbn.kind(s) == Some(VertexKind::Output))
    {
        return Ok(false);
    }

    let mut group = successors;
    group.push(v);
    let closed = path_closing(gbn, &group)?;
    if !within_limits(gbn, &closed, config)? {
        return Ok(false);
    }
    let merged = merge_vertices(gbn, &closed, "merged")?;
    trace!(vertex = %v, merged = %merged, "pushed stochastic factor forward");
    Ok(true)
}

/// Merge a substochastic factor with its factor predecessors, moving it
/// towards the inputs.
pub fn switch_substoch_to_front(gbn: &mut Gbn, v: VertexId, config: &EngineConfig) -> Result<bool> {
    if gbn.matrix(v).map(Matrix::is_stochastic).unwrap_or(true) {
        return Ok(false);
    }
    let preds: Vec<VertexId> = gbn
        .predecessors(v)
        .into_iter()
        .filter(|&p| gbn.is_node(p))
        .collect();
    if preds.is_empty() {
        return Ok(false);
    }

    let mut group = preds;
    group.push(v);
    let closed = path_closing(gbn, &group)?;
    if !within_limits(gbn, &closed, config)? {
        return Ok(false);
    }
    let merged = merge_vertices(gbn, &closed, "merged")?;
    trace!(vertex = %v, merged = %merged, "moved substochastic factor to the front");
    Ok(true)
}

/// Renormalize a substochastic source.
///
/// This changes the circuit's semantics by a constant factor: the result is
/// only equal to the input circuit up to normalization.
pub fn normalize_substoch_front(
    gbn: &mut Gbn,
    v: VertexId,
    config: &EngineConfig,
) -> Result<bool> {
    let matrix = match gbn.matrix(v) {
        Ok(m) if !m.is_stochastic() && m.kind() != MatrixKind::Zero && m.n() == 0 => m.clone(),
        _ => return Ok(false),
    };
    if !gbn.in_edges(v).is_empty() {
        return Ok(false);
    }

    let entries = matrix.nonzero_entries();
    let replacement = match entries.as_slice() {
        [] => Matrix::zero(0, matrix.m())?,
        [(to, _, _)] if matrix.m() == 1 => Matrix::one_b(to.get(0)),
        _ => {
            let mut normalized = matrix.to_dynamic()?;
            normalize_columns(&mut normalized, config.stochastic_tolerance)?;
            normalized.set_stochastic(true);
            normalized
        }
    };
    trace!(vertex = %v, kind = replacement.kind().name(), "normalized source");
    gbn.replace_matrix(v, replacement)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::Bits;
    use crate::evaluation::{evaluate_gbn, normalize_result};
    use crate::matrix::matrices_equal;

    fn wire(gbn: &mut Gbn, from: (VertexId, usize), to: (VertexId, usize)) {
        let class = gbn.next_eq_class();
        gbn.add_edge(Port::new(from.0, from.1), Port::new(to.0, to.1), class)
            .unwrap();
    }

    #[test]
    fn test_merge_filter_chain() {
        let mut gbn = Gbn::new(1, 1);
        let (i, o) = (gbn.inputs()[0], gbn.outputs()[0]);
        let f1 = gbn.add_vertex(Matrix::filter(1, true).unwrap(), "F");
        let f2 = gbn.add_vertex(Matrix::filter(1, false).unwrap(), "F");
        wire(&mut gbn, (i, 0), (f1, 0));
        wire(&mut gbn, (f1, 0), (f2, 0));
        wire(&mut gbn, (f2, 0), (o, 0));
        let before = evaluate_gbn(&gbn).unwrap();

        assert!(merge_filters(&mut gbn, f1, &EngineConfig::default()).unwrap());
        let inside = gbn.inside_vertices();
        assert_eq!(inside.len(), 1);
        assert_eq!(gbn.matrix(inside[0]).unwrap().kind(), MatrixKind::Diagonal);
        assert!(matrices_equal(&before, &evaluate_gbn(&gbn).unwrap(), 1e-12));
    }

    #[test]
    fn test_single_filter_is_left_alone() {
        let mut gbn = Gbn::new(1, 1);
        let (i, o) = (gbn.inputs()[0], gbn.outputs()[0]);
        let f = gbn.add_vertex(Matrix::filter(1, true).unwrap(), "F");
        wire(&mut gbn, (i, 0), (f, 0));
        wire(&mut gbn, (f, 0), (o, 0));
        assert!(!merge_filters(&mut gbn, f, &EngineConfig::default()).unwrap());
    }

    #[test]
    fn test_stochastic_factor_pushed_forward() {
        let mut gbn = Gbn::new(0, 1);
        let o = gbn.outputs()[0];
        let source = gbn.add_vertex(Matrix::bernoulli(0.3, 0.7), "coin");
        let not = gbn.add_vertex(
            Matrix::dynamic_from_rows(1, 1, &[vec![0.0, 1.0], vec![1.0, 0.0]]).unwrap(),
            "not",
        );
        wire(&mut gbn, (source, 0), (not, 0));
        wire(&mut gbn, (not, 0), (o, 0));
        let before = evaluate_gbn(&gbn).unwrap();

        let config = EngineConfig::default();
        assert!(eliminate_stochastic_without_outputs(&mut gbn, source, &config).unwrap());
        assert_eq!(gbn.inside_vertices().len(), 1);
        assert!(matrices_equal(&before, &evaluate_gbn(&gbn).unwrap(), 1e-12));
    }

    #[test]
    fn test_factor_feeding_output_stays() {
        let mut gbn = Gbn::independent(&[(0.4, 0.6)]);
        let v = gbn.inside_vertices()[0];
        let config = EngineConfig::default();
        assert!(!eliminate_stochastic_without_outputs(&mut gbn, v, &config).unwrap());
    }

    #[test]
    fn test_substochastic_factor_moves_to_front() {
        let mut gbn = Gbn::new(0, 1);
        let o = gbn.outputs()[0];
        let source = gbn.add_vertex(Matrix::bernoulli(0.5, 0.5), "coin");
        let f = gbn.add_vertex(Matrix::filter(1, true).unwrap(), "F");
        wire(&mut gbn, (source, 0), (f, 0));
        wire(&mut gbn, (f, 0), (o, 0));
        let before = evaluate_gbn(&gbn).unwrap();

        let config = EngineConfig::default();
        assert!(switch_substoch_to_front(&mut gbn, f, &config).unwrap());
        let inside = gbn.inside_vertices();
        assert_eq!(inside.len(), 1);
        assert!(!gbn.matrix(inside[0]).unwrap().is_stochastic());
        assert!(matrices_equal(&before, &evaluate_gbn(&gbn).unwrap(), 1e-12));

        assert!(normalize_substoch_front(&mut gbn, inside[0], &config).unwrap());
        let after = evaluate_gbn(&gbn).unwrap();
        assert!(matrices_equal(
            &normalize_result(&before).unwrap(),
            &normalize_result(&after).unwrap(),
            1e-12
        ));
        assert_eq!(
            gbn.matrix(gbn.inside_vertices()[0]).unwrap().kind(),
            MatrixKind::OneB
        );
    }

    #[test]
    fn test_normalize_scales_columns() {
        let mut gbn = Gbn::new(0, 1);
        let o = gbn.outputs()[0];
        let mut m = Matrix::dynamic_from_rows(0, 1, &[vec![0.1], vec![0.3]]).unwrap();
        m.set_stochastic(false);
        let v = gbn.add_vertex(m, "half");
        wire(&mut gbn, (v, 0), (o, 0));
        assert!(normalize_substoch_front(&mut gbn, v, &EngineConfig::default()).unwrap());
        let normalized = gbn.matrix(v).unwrap();
        assert!(normalized.is_stochastic());
        approx::assert_abs_diff_eq!(normalized.get(Bits::new(1), Bits::ZERO), 0.75, epsilon = 1e-12);
    }
}
