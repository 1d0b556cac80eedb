//! Local rewrite rules.
//!
//! Every rule inspects one vertex and its direct neighborhood, computes the
//! complete rewrite first and only then mutates the graph, so a rule that
//! fails leaves the graph as it was.

use std::collections::{BTreeMap, BTreeSet};

use tracing::trace;

use crate::bits::{all_assignments, Bits};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::graph::{Edge, Gbn, Port, VertexId};
use crate::matrix::{Matrix, MatrixKind};

/// Absolute tolerance when testing whether a table factorizes.
const FACTORIZATION_TOLERANCE: f64 = 1e-10;

pub(crate) fn in_edge_list(gbn: &Gbn, v: VertexId) -> Vec<Edge> {
    let mut edges: Vec<Edge> = gbn.incoming(v).map(|(_, e)| e).collect();
    edges.sort_by_key(|e| (e.to.index, e.from));
    edges
}

pub(crate) fn out_edge_list(gbn: &Gbn, v: VertexId) -> Vec<Edge> {
    let mut edges: Vec<Edge> = gbn.outgoing(v).map(|(_, e)| e).collect();
    edges.sort_by_key(|e| (e.from.index, e.to));
    edges
}

fn kind_of(gbn: &Gbn, v: VertexId) -> Option<MatrixKind> {
    gbn.matrix(v).ok().map(Matrix::kind)
}

/// Drop a terminator whose source port already feeds another consumer.
pub fn co_unit(gbn: &mut Gbn, v: VertexId) -> Result<bool> {
    if kind_of(gbn, v) != Some(MatrixKind::Terminator) {
        return Ok(false);
    }
    let source = gbn.source_of(Port::new(v, 0))?;
    if gbn.edges_from(source).len() <= 1 {
        return Ok(false);
    }
    gbn.remove_vertex(v)?;
    Ok(true)
}

/// Give every consumer of a constant source its own copy.
pub fn f1(gbn: &mut Gbn, v: VertexId) -> Result<bool> {
    let b = match gbn.matrix(v) {
        Ok(Matrix::OneB(b)) => *b,
        _ => return Ok(false),
    };
    let sinks = out_edge_list(gbn, v);
    if sinks.len() <= 1 {
        return Ok(false);
    }

    gbn.remove_vertex(v)?;
    for edge in sinks {
        let copy = gbn.add_vertex(Matrix::one_b(b), format!("1_{}", u8::from(b)));
        gbn.add_edge(Port::new(copy, 0), edge.to, edge.eq_class)?;
    }
    Ok(true)
}

/// A stochastic factor whose outputs are all discarded is discarded itself.
pub fn f2(gbn: &mut Gbn, v: VertexId) -> Result<bool> {
    if !gbn.matrix(v).map(Matrix::is_stochastic).unwrap_or(false) {
        return Ok(false);
    }
    let outs = out_edge_list(gbn, v);
    if outs.is_empty() {
        return Ok(false);
    }
    if !outs
        .iter()
        .all(|e| kind_of(gbn, e.to.vertex) == Some(MatrixKind::Terminator))
    {
        return Ok(false);
    }
    let preds = in_edge_list(gbn, v);

    let terminators: BTreeSet<VertexId> = outs.iter().map(|e| e.to.vertex).collect();
    for t in terminators {
        gbn.remove_vertex(t)?;
    }
    gbn.remove_vertex(v)?;
    for edge in preds {
        let t = gbn.add_vertex(Matrix::terminator(), "T");
        gbn.add_edge(edge.from, Port::new(t, 0), edge.eq_class)?;
    }
    Ok(true)
}

/// Consumers of a filter's input that also follow the filter read the
/// filtered wire instead.
pub fn f3(gbn: &mut Gbn, v: VertexId) -> Result<bool> {
    if !gbn.matrix(v).map(Matrix::is_filter_like).unwrap_or(false) {
        return Ok(false);
    }
    let input_index: BTreeMap<Port, usize> = in_edge_list(gbn, v)
        .into_iter()
        .map(|e| (e.from, e.to.index))
        .collect();
    let successors: BTreeSet<VertexId> = gbn
        .successors(v)
        .into_iter()
        .filter(|&s| s != v)
        .collect();

    let mut plan = Vec::new();
    for &s in &successors {
        for (e, edge) in gbn.incoming(s) {
            if let Some(&index) = input_index.get(&edge.from) {
                plan.push((e, Port::new(v, index)));
            }
        }
    }
    if plan.is_empty() {
        return Ok(false);
    }
    for (e, from) in plan {
        gbn.redirect_source(e, from)?;
    }
    Ok(true)
}

/// The single consumer of `1_b` if it is an `F` gate, with the port it enters.
fn oneb_into_filter(gbn: &Gbn, v: VertexId) -> Option<(bool, VertexId, usize, usize, bool)> {
    let b = match gbn.matrix(v) {
        Ok(Matrix::OneB(b)) => *b,
        _ => return None,
    };
    let outs = out_edge_list(gbn, v);
    if outs.len() != 1 {
        return None;
    }
    let target = outs[0].to;
    match gbn.matrix(target.vertex) {
        Ok(Matrix::F { k, b: fb }) => Some((b, target.vertex, target.index, *k, *fb)),
        _ => None,
    }
}

/// `1_b` into `F(k, b)`: the gate loses that wire, which carries `b` onward;
/// for `k = 1` the circuit is impossible.
pub fn f4(gbn: &mut Gbn, v: VertexId) -> Result<bool> {
    let (b, f, port, k, fb) = match oneb_into_filter(gbn, v) {
        Some(found) if found.4 == found.0 => found,
        _ => return Ok(false),
    };
    debug_assert_eq!(b, fb);

    let ins = in_edge_list(gbn, f);
    let outs = out_edge_list(gbn, f);

    if k == 1 {
        gbn.remove_vertex(v)?;
        gbn.remove_vertex(f)?;
        let zero = gbn.add_vertex(Matrix::zero(0, 1)?, "0");
        for edge in outs.into_iter().filter(|e| e.from.index == port) {
            gbn.add_edge(Port::new(zero, 0), edge.to, edge.eq_class)?;
        }
        return Ok(true);
    }

    let reduced = Matrix::filter(k - 1, b)?;
    let shift = |i: usize| if i > port { i - 1 } else { i };

    gbn.clear_vertex(f)?;
    gbn.replace_matrix(f, reduced)?;
    for edge in ins.into_iter().filter(|e| e.to.index != port) {
        gbn.add_edge(edge.from, Port::new(f, shift(edge.to.index)), edge.eq_class)?;
    }
    for edge in outs {
        if edge.from.index == port {
            gbn.add_edge(Port::new(v, 0), edge.to, edge.eq_class)?;
        } else {
            gbn.add_edge(Port::new(f, shift(edge.from.index)), edge.to, edge.eq_class)?;
        }
    }
    Ok(true)
}

/// `1_b` into `F(k, ¬b)`: the blocked assignment can never occur, so the
/// gate is bypassed.
pub fn f5(gbn: &mut Gbn, v: VertexId) -> Result<bool> {
    let (_, f, port, k, _) = match oneb_into_filter(gbn, v) {
        Some(found) if found.4 != found.0 => found,
        _ => return Ok(false),
    };

    let mut sources = vec![Port::new(v, 0); k];
    for edge in in_edge_list(gbn, f) {
        if edge.to.index != port && edge.to.index < k {
            sources[edge.to.index] = edge.from;
        }
    }
    let outs = out_edge_list(gbn, f);

    gbn.remove_vertex(f)?;
    for edge in outs {
        let from = if edge.from.index == port {
            Port::new(v, 0)
        } else {
            sources[edge.from.index]
        };
        gbn.add_edge(from, edge.to, edge.eq_class)?;
    }
    Ok(true)
}

/// Remove a bit from `x`, shifting the higher bits down.
fn remove_bit(x: Bits, bit: usize) -> Bits {
    let value = x.value();
    let low = value & ((1u64 << bit) - 1);
    let high = if bit + 1 >= 64 { 0 } else { (value >> (bit + 1)) << bit };
    Bits::new(low | high)
}

/// Keep the bits listed in `keep` (in order) as the new low bits.
fn select_bits(x: Bits, keep: &[usize]) -> Bits {
    keep.iter()
        .enumerate()
        .fold(Bits::ZERO, |acc, (i, &old)| acc.with(i, x.get(old)))
}

/// Split off diagonal dimensions the values do not depend on.
pub fn reduce_diagonal(gbn: &mut Gbn, v: VertexId, config: &EngineConfig) -> Result<bool> {
    let (k, entries) = match gbn.matrix(v) {
        Ok(m @ Matrix::Diagonal(_)) => (m.n(), m.nonzero_entries()),
        _ => return Ok(false),
    };
    let ins = in_edge_list(gbn, v);
    let outs = out_edge_list(gbn, v);

    if entries.is_empty() {
        gbn.remove_vertex(v)?;
        for edge in &ins {
            let t = gbn.add_vertex(Matrix::terminator(), "T");
            gbn.add_edge(edge.from, Port::new(t, 0), edge.eq_class)?;
            let port_outs: Vec<&Edge> = outs
                .iter()
                .filter(|e| e.from.index == edge.to.index)
                .collect();
            if !port_outs.is_empty() {
                let zero = gbn.add_vertex(Matrix::zero(0, 1)?, "0");
                for out in port_outs {
                    gbn.add_edge(Port::new(zero, 0), out.to, out.eq_class)?;
                }
            }
        }
        return Ok(true);
    }
    if entries.len() % 2 != 0 {
        return Ok(false);
    }

    let value_at: BTreeMap<Bits, f64> = entries.iter().map(|&(x, _, val)| (x, val)).collect();
    let independent: Vec<usize> = (0..k)
        .filter(|&i| {
            entries.iter().all(|&(x, _, val)| {
                let mut y = x;
                y.flip(i);
                value_at.get(&y).copied().unwrap_or(0.0) == val
            })
        })
        .collect();
    if independent.is_empty() {
        return Ok(false);
    }

    let kept: Vec<usize> = (0..k).filter(|i| !independent.contains(i)).collect();
    let reduced = if kept.is_empty() {
        None
    } else {
        let mut m = Matrix::diagonal(kept.len())?;
        for &(x, _, val) in &entries {
            let y = select_bits(x, &kept);
            m.set(y, y, val)?;
        }
        m.refresh_stochastic(config.stochastic_tolerance);
        Some(m)
    };
    let constant = entries[0].2;
    let source_of: BTreeMap<usize, Edge> = ins.iter().map(|e| (e.to.index, *e)).collect();

    gbn.remove_vertex(v)?;
    for &i in &independent {
        if let Some(input) = source_of.get(&i) {
            for out in outs.iter().filter(|e| e.from.index == i) {
                gbn.add_edge(input.from, out.to, input.eq_class)?;
            }
        }
    }
    match reduced {
        Some(m) => {
            let new_index = |old: usize| kept.iter().position(|&i| i == old);
            let d = gbn.add_vertex(m, "diagonal");
            for edge in &ins {
                if let Some(i) = new_index(edge.to.index) {
                    gbn.add_edge(edge.from, Port::new(d, i), edge.eq_class)?;
                }
            }
            for edge in &outs {
                if let Some(i) = new_index(edge.from.index) {
                    gbn.add_edge(Port::new(d, i), edge.to, edge.eq_class)?;
                }
            }
        }
        None if constant != 1.0 => {
            let mut scalar = Matrix::dynamic(0, 0)?;
            scalar.set(Bits::ZERO, Bits::ZERO, constant)?;
            scalar.set_stochastic(false);
            gbn.add_vertex(scalar, "scalar");
        }
        None => {}
    }
    trace!(vertex = %v, removed = independent.len(), "reduced diagonal");
    Ok(true)
}

/// Collapse input ports fed by the same source port into one.
pub fn duplicate_inputs(gbn: &mut Gbn, v: VertexId) -> Result<bool> {
    let ins = in_edge_list(gbn, v);
    let mut groups: BTreeMap<Port, Vec<usize>> = BTreeMap::new();
    let mut eq_classes: BTreeMap<Port, usize> = BTreeMap::new();
    for edge in &ins {
        groups.entry(edge.from).or_default().push(edge.to.index);
        eq_classes.entry(edge.from).or_insert(edge.eq_class);
    }
    if groups.values().all(|g| g.len() <= 1) {
        return Ok(false);
    }

    let group_list: Vec<(Port, Vec<usize>)> = groups.into_iter().collect();
    let n_new = group_list.len();
    let mut group_of = BTreeMap::new();
    for (gi, (_, ports)) in group_list.iter().enumerate() {
        for &p in ports {
            group_of.insert(p, gi);
        }
    }
    let expand = |x: Bits| -> Bits {
        group_list
            .iter()
            .enumerate()
            .fold(Bits::ZERO, |acc, (gi, (_, ports))| {
                ports.iter().fold(acc, |acc, &p| acc.with(p, x.get(gi)))
            })
    };
    let compress = |x: Bits| -> Option<Bits> {
        let y = group_list
            .iter()
            .enumerate()
            .fold(Bits::ZERO, |acc, (gi, (_, ports))| acc.with(gi, x.get(ports[0])));
        (expand(y) == x).then_some(y)
    };

    let old = gbn.matrix(v)?.clone();
    let (matrix, remap_outputs) = match &old {
        Matrix::Dynamic(_) => {
            let mut m = Matrix::dynamic(n_new, old.m())?;
            for (to, from, val) in old.nonzero_entries() {
                if let Some(from) = compress(from) {
                    m.set(to, from, val)?;
                }
            }
            m.set_stochastic(old.is_stochastic());
            (m, false)
        }
        Matrix::Diagonal(_) => {
            let mut m = Matrix::diagonal(n_new)?;
            for (x, _, val) in old.nonzero_entries() {
                if let Some(y) = compress(x) {
                    m.set(y, y, val)?;
                }
            }
            m.set_stochastic(old.is_stochastic());
            (m, true)
        }
        Matrix::F { b, .. } => (Matrix::filter(n_new, *b)?, true),
        Matrix::Zero { m, .. } => (Matrix::zero(n_new, *m)?, false),
        Matrix::OneB(_) | Matrix::Terminator => return Ok(false),
    };
    let outs = if remap_outputs {
        out_edge_list(gbn, v)
    } else {
        Vec::new()
    };

    let mut stale: Vec<_> = gbn.in_edges(v).to_vec();
    if remap_outputs {
        stale.extend_from_slice(gbn.out_edges(v));
    }
    for e in stale {
        gbn.remove_edge(e)?;
    }
    gbn.replace_matrix(v, matrix)?;
    for (gi, (port, _)) in group_list.iter().enumerate() {
        gbn.add_edge(*port, Port::new(v, gi), eq_classes[port])?;
    }
    for edge in outs {
        let gi = group_of.get(&edge.from.index).copied().unwrap_or(0);
        gbn.add_edge(Port::new(v, gi), edge.to, edge.eq_class)?;
    }
    Ok(true)
}

/// Sum out every output not listed in `keep`.
fn marginal(matrix: &Matrix, keep: &[usize]) -> Result<Matrix> {
    let mut m = Matrix::dynamic(matrix.n(), keep.len())?;
    for (to, from, val) in matrix.nonzero_entries() {
        m.add(select_bits(to, keep), from, val)?;
    }
    Ok(m)
}

/// Inputs the table actually depends on.
fn used_inputs(matrix: &Matrix) -> Vec<usize> {
    (0..matrix.n())
        .filter(|&j| {
            matrix.nonzero_entries().iter().any(|&(to, from, val)| {
                let mut other = from;
                other.flip(j);
                (matrix.get(to, other) - val).abs() > FACTORIZATION_TOLERANCE
            })
        })
        .collect()
}

/// Restrict a table to the inputs in `keep` (assumed to be the only ones it
/// depends on).
fn project_inputs(matrix: &Matrix, keep: &[usize]) -> Result<Matrix> {
    let mut m = Matrix::dynamic(keep.len(), matrix.m())?;
    for (to, from, val) in matrix.nonzero_entries() {
        m.set(to, select_bits(from, keep), val)?;
    }
    m.set_stochastic(matrix.is_stochastic());
    Ok(m)
}

fn factorizes(matrix: &Matrix, i: usize) -> Result<Option<(Matrix, Matrix)>> {
    let m = matrix.m();
    let rest: Vec<usize> = (0..m).filter(|&j| j != i).collect();
    let single = marginal(matrix, &[i])?;
    let others = marginal(matrix, &rest)?;
    for from in all_assignments(matrix.n()) {
        for to in all_assignments(m) {
            let expected = single.get(select_bits(to, &[i]), from)
                * others.get(select_bits(to, &rest), from);
            if (matrix.get(to, from) - expected).abs() > FACTORIZATION_TOLERANCE {
                return Ok(None);
            }
        }
    }
    Ok(Some((single, others)))
}

/// Canonicalize a stochastic factor with several outputs.
///
/// Outputs that always equal another output are fused into one port, and an
/// output that is conditionally independent of the others is split into its
/// own factor. Pieces are only wired to the inputs they depend on.
pub fn split_multiple_outputs(gbn: &mut Gbn, v: VertexId, config: &EngineConfig) -> Result<bool> {
    let matrix = match gbn.matrix(v) {
        Ok(m @ Matrix::Dynamic(_)) if m.is_stochastic() && m.m() > 1 => m.clone(),
        _ => return Ok(false),
    };
    let (n, m) = (matrix.n(), matrix.m());
    if n + m > config.max_merge_width {
        return Ok(false);
    }
    let ins = in_edge_list(gbn, v);
    let outs = out_edge_list(gbn, v);
    let entries = matrix.nonzero_entries();

    // outputs that are copies of each other
    for i in 0..m {
        for j in (i + 1)..m {
            if entries.iter().all(|&(to, _, _)| to.get(i) == to.get(j)) {
                let mut fused = Matrix::dynamic(n, m - 1)?;
                for &(to, from, val) in &entries {
                    fused.add(remove_bit(to, j), from, val)?;
                }
                fused.refresh_stochastic(config.stochastic_tolerance);

                gbn.clear_vertex(v)?;
                gbn.replace_matrix(v, fused)?;
                for edge in &ins {
                    gbn.add_edge(edge.from, edge.to, edge.eq_class)?;
                }
                for edge in &outs {
                    let port = match edge.from.index {
                        p if p == j => i,
                        p if p > j => p - 1,
                        p => p,
                    };
                    gbn.add_edge(Port::new(v, port), edge.to, edge.eq_class)?;
                }
                trace!(vertex = %v, kept = i, fused = j, "fused duplicate outputs");
                return Ok(true);
            }
        }
    }

    for i in 0..m {
        let (single, others) = match factorizes(&matrix, i)? {
            Some(pieces) => pieces,
            None => continue,
        };
        let single_inputs = used_inputs(&single);
        let other_inputs = used_inputs(&others);
        let mut single = project_inputs(&single, &single_inputs)?;
        let mut others = project_inputs(&others, &other_inputs)?;
        single.refresh_stochastic(config.stochastic_tolerance);
        others.refresh_stochastic(config.stochastic_tolerance);
        let source_of: BTreeMap<usize, Edge> = ins.iter().map(|e| (e.to.index, *e)).collect();

        gbn.remove_vertex(v)?;
        let a = gbn.add_vertex(single, "split");
        let b = gbn.add_vertex(others, "split");
        for (k, &j) in single_inputs.iter().enumerate() {
            if let Some(edge) = source_of.get(&j) {
                gbn.add_edge(edge.from, Port::new(a, k), edge.eq_class)?;
            }
        }
        for (k, &j) in other_inputs.iter().enumerate() {
            if let Some(edge) = source_of.get(&j) {
                gbn.add_edge(edge.from, Port::new(b, k), edge.eq_class)?;
            }
        }
        for (j, edge) in &source_of {
            if !single_inputs.contains(j) && !other_inputs.contains(j) {
                let t = gbn.add_vertex(Matrix::terminator(), "T");
                gbn.add_edge(edge.from, Port::new(t, 0), edge.eq_class)?;
            }
        }
        for edge in &outs {
            match edge.from.index {
                p if p == i => gbn.add_edge(Port::new(a, 0), edge.to, edge.eq_class)?,
                p if p > i => gbn.add_edge(Port::new(b, p - 1), edge.to, edge.eq_class)?,
                p => gbn.add_edge(Port::new(b, p), edge.to, edge.eq_class)?,
            };
        }
        trace!(vertex = %v, output = i, "split independent output");
        return Ok(true);
    }
    Ok(false)
}
