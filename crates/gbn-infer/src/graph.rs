//! The GBN multigraph.
//!
//! Vertices live in an arena of optional slots. Removing a vertex frees its
//! slot and the smallest free slot is handed out by the next
//! [`Gbn::add_vertex`]. Edges connect a source port `(vertex, output index)`
//! to a target port `(vertex, input index)`; several edges may leave the same
//! source port (fan-out), but every target port has exactly one predecessor.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::{GbnError, Result};
use crate::matrix::Matrix;

/// Index of a vertex slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexId(pub usize);

impl VertexId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Index of an edge slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(pub usize);

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// One input or output terminal of a vertex.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Port {
    pub vertex: VertexId,
    pub index: usize,
}

impl Port {
    pub fn new(vertex: VertexId, index: usize) -> Self {
        Self { vertex, index }
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.vertex, self.index)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VertexKind {
    /// External input terminal with a single output port.
    Input,
    /// External output terminal with a single input port.
    Output,
    /// Factor vertex owning a matrix.
    Node,
}

/// Directed wire segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Edge {
    pub from: Port,
    pub to: Port,
    /// Identity of the external wire this edge descends from.
    pub eq_class: usize,
}

#[derive(Clone, Debug)]
struct VertexRecord {
    kind: VertexKind,
    label: String,
    matrix: Option<Matrix>,
    in_edges: Vec<EdgeId>,
    out_edges: Vec<EdgeId>,
}

/// Generalized Bayesian network.
#[derive(Clone, Debug, Default)]
pub struct Gbn {
    vertices: Vec<Option<VertexRecord>>,
    free_vertices: BTreeSet<usize>,
    edges: Vec<Option<Edge>>,
    free_edges: Vec<usize>,
    inputs: Vec<VertexId>,
    outputs: Vec<VertexId>,
    next_eq_class: usize,
}

impl Gbn {
    /// Graph with `n_inputs` input and `n_outputs` output terminals and no edges.
    pub fn new(n_inputs: usize, n_outputs: usize) -> Self {
        let mut gbn = Self::default();
        for i in 0..n_inputs {
            let v = gbn.insert_record(VertexKind::Input, format!("i_{}", i), None);
            gbn.inputs.push(v);
        }
        for i in 0..n_outputs {
            let v = gbn.insert_record(VertexKind::Output, format!("o_{}", i), None);
            gbn.outputs.push(v);
        }
        gbn
    }

    /// `n` independent fair coins, one per output.
    pub fn uniform_independent(n: usize) -> Self {
        let dists = vec![(0.5, 0.5); n];
        Self::independent(&dists)
    }

    /// One independent source per `(P(0), P(1))` pair, each feeding its own output.
    pub fn independent(dists: &[(f64, f64)]) -> Self {
        let mut gbn = Self::new(0, dists.len());
        for (i, &(p0, p1)) in dists.iter().enumerate() {
            let v = gbn.add_vertex(Matrix::bernoulli(p0, p1), format!("v_{}", i));
            let eq_class = gbn.next_eq_class();
            let out = gbn.outputs[i];
            gbn.connect(Port::new(v, 0), Port::new(out, 0), eq_class);
        }
        gbn
    }

    /// Identity circuit: input `i` wired straight to output `i`.
    pub fn without_knowledge(n: usize) -> Self {
        let mut gbn = Self::new(n, n);
        for i in 0..n {
            let eq_class = gbn.next_eq_class();
            let (input, output) = (gbn.inputs[i], gbn.outputs[i]);
            gbn.connect(Port::new(input, 0), Port::new(output, 0), eq_class);
        }
        gbn
    }

    fn insert_record(&mut self, kind: VertexKind, label: String, matrix: Option<Matrix>) -> VertexId {
        let record = VertexRecord {
            kind,
            label,
            matrix,
            in_edges: Vec::new(),
            out_edges: Vec::new(),
        };
        match self.free_vertices.pop_first() {
            Some(slot) => {
                self.vertices[slot] = Some(record);
                VertexId(slot)
            }
            None => {
                self.vertices.push(Some(record));
                VertexId(self.vertices.len() - 1)
            }
        }
    }

    fn record(&self, v: VertexId) -> Result<&VertexRecord> {
        self.vertices
            .get(v.0)
            .and_then(Option::as_ref)
            .ok_or(GbnError::VertexNotFound(v))
    }

    fn record_mut(&mut self, v: VertexId) -> Result<&mut VertexRecord> {
        self.vertices
            .get_mut(v.0)
            .and_then(Option::as_mut)
            .ok_or(GbnError::VertexNotFound(v))
    }

    /// Insert a factor vertex, reusing the smallest free id.
    pub fn add_vertex(&mut self, matrix: Matrix, label: impl Into<String>) -> VertexId {
        self.insert_record(VertexKind::Node, label.into(), Some(matrix))
    }

    /// Detach and remove a factor vertex, handing back its matrix.
    pub fn remove_vertex(&mut self, v: VertexId) -> Result<Matrix> {
        if self.record(v)?.kind != VertexKind::Node {
            return Err(GbnError::InvalidArgument(format!(
                "{} is a terminal and cannot be removed",
                v
            )));
        }
        self.clear_vertex(v)?;
        let record = self.vertices[v.0].take().ok_or(GbnError::VertexNotFound(v))?;
        self.free_vertices.insert(v.0);
        record
            .matrix
            .ok_or_else(|| GbnError::integrity(format!("factor {} has no matrix", v)))
    }

    /// Remove every edge touching `v`.
    pub fn clear_vertex(&mut self, v: VertexId) -> Result<()> {
        let record = self.record(v)?;
        let mut incident: Vec<EdgeId> = record.in_edges.clone();
        incident.extend(record.out_edges.iter().copied());
        incident.sort();
        incident.dedup();
        for e in incident {
            self.remove_edge(e)?;
        }
        Ok(())
    }

    pub fn contains(&self, v: VertexId) -> bool {
        self.record(v).is_ok()
    }

    pub fn kind(&self, v: VertexId) -> Option<VertexKind> {
        self.record(v).ok().map(|r| r.kind)
    }

    pub fn is_node(&self, v: VertexId) -> bool {
        self.kind(v) == Some(VertexKind::Node)
    }

    pub fn label(&self, v: VertexId) -> Option<&str> {
        self.record(v).ok().map(|r| r.label.as_str())
    }

    pub fn set_label(&mut self, v: VertexId, label: impl Into<String>) -> Result<()> {
        self.record_mut(v)?.label = label.into();
        Ok(())
    }

    /// Matrix of a factor vertex.
    pub fn matrix(&self, v: VertexId) -> Result<&Matrix> {
        self.record(v)?
            .matrix
            .as_ref()
            .ok_or_else(|| GbnError::InvalidArgument(format!("{} is a terminal", v)))
    }

    /// Swap the matrix of a factor vertex, returning the old one.
    pub fn replace_matrix(&mut self, v: VertexId, matrix: Matrix) -> Result<Matrix> {
        let record = self.record_mut(v)?;
        match record.matrix.as_mut() {
            Some(slot) => Ok(std::mem::replace(slot, matrix)),
            None => Err(GbnError::InvalidArgument(format!("{} is a terminal", v))),
        }
    }

    pub fn inputs(&self) -> &[VertexId] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[VertexId] {
        &self.outputs
    }

    /// Position of an input or output terminal in its terminal list.
    pub fn terminal_index(&self, v: VertexId) -> Option<usize> {
        match self.kind(v)? {
            VertexKind::Input => self.inputs.iter().position(|&x| x == v),
            VertexKind::Output => self.outputs.iter().position(|&x| x == v),
            VertexKind::Node => None,
        }
    }

    /// Live vertices in increasing id order.
    pub fn all_vertices(&self) -> Vec<VertexId> {
        self.vertices
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_some())
            .map(|(i, _)| VertexId(i))
            .collect()
    }

    /// Factor vertices in increasing id order.
    pub fn inside_vertices(&self) -> Vec<VertexId> {
        self.vertices
            .iter()
            .enumerate()
            .filter(|(_, r)| matches!(r, Some(r) if r.kind == VertexKind::Node))
            .map(|(i, _)| VertexId(i))
            .collect()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.iter().filter(|r| r.is_some()).count()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.iter().filter(|e| e.is_some()).count()
    }

    /// Fresh equivalence class tag.
    pub fn next_eq_class(&mut self) -> usize {
        let class = self.next_eq_class;
        self.next_eq_class += 1;
        class
    }

    pub fn add_edge(&mut self, from: Port, to: Port, eq_class: usize) -> Result<EdgeId> {
        self.validate_endpoints(from, to)?;
        Ok(self.connect(from, to, eq_class))
    }

    fn validate_endpoints(&self, from: Port, to: Port) -> Result<()> {
        match self.record(from.vertex)?.kind {
            VertexKind::Output => {
                return Err(GbnError::InvalidArgument(format!(
                    "edge cannot leave output terminal {}",
                    from.vertex
                )))
            }
            VertexKind::Input if from.index != 0 => {
                return Err(GbnError::InvalidArgument(format!(
                    "input terminal {} has a single port",
                    from.vertex
                )))
            }
            _ => {}
        }
        match self.record(to.vertex)?.kind {
            VertexKind::Input => {
                return Err(GbnError::InvalidArgument(format!(
                    "edge cannot enter input terminal {}",
                    to.vertex
                )))
            }
            VertexKind::Output if to.index != 0 => {
                return Err(GbnError::InvalidArgument(format!(
                    "output terminal {} has a single port",
                    to.vertex
                )))
            }
            _ => {}
        }
        Ok(())
    }

    /// Insert an edge between two live vertices without validation.
    fn connect(&mut self, from: Port, to: Port, eq_class: usize) -> EdgeId {
        let edge = Edge { from, to, eq_class };
        let id = match self.free_edges.pop() {
            Some(slot) => {
                self.edges[slot] = Some(edge);
                EdgeId(slot)
            }
            None => {
                self.edges.push(Some(edge));
                EdgeId(self.edges.len() - 1)
            }
        };
        if let Some(Some(r)) = self.vertices.get_mut(from.vertex.0) {
            r.out_edges.push(id);
        }
        if let Some(Some(r)) = self.vertices.get_mut(to.vertex.0) {
            r.in_edges.push(id);
        }
        id
    }

    pub fn remove_edge(&mut self, e: EdgeId) -> Result<Edge> {
        let edge = self
            .edges
            .get_mut(e.0)
            .and_then(Option::take)
            .ok_or_else(|| GbnError::EdgeNotFound(e.to_string()))?;
        self.free_edges.push(e.0);
        if let Ok(r) = self.record_mut(edge.from.vertex) {
            r.out_edges.retain(|&x| x != e);
        }
        if let Ok(r) = self.record_mut(edge.to.vertex) {
            r.in_edges.retain(|&x| x != e);
        }
        Ok(edge)
    }

    pub fn edge(&self, e: EdgeId) -> Result<&Edge> {
        self.edges
            .get(e.0)
            .and_then(Option::as_ref)
            .ok_or_else(|| GbnError::EdgeNotFound(e.to_string()))
    }

    /// All live edges in increasing id order.
    pub fn edges(&self) -> impl Iterator<Item = (EdgeId, &Edge)> {
        self.edges
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|e| (EdgeId(i), e)))
    }

    /// Incoming edges of `v` (empty for unknown vertices).
    pub fn in_edges(&self, v: VertexId) -> &[EdgeId] {
        self.record(v).map(|r| r.in_edges.as_slice()).unwrap_or(&[])
    }

    /// Outgoing edges of `v` (empty for unknown vertices).
    pub fn out_edges(&self, v: VertexId) -> &[EdgeId] {
        self.record(v).map(|r| r.out_edges.as_slice()).unwrap_or(&[])
    }

    /// Incoming edges as `(id, edge)` pairs.
    pub fn incoming(&self, v: VertexId) -> impl Iterator<Item = (EdgeId, Edge)> + '_ {
        self.in_edges(v)
            .iter()
            .filter_map(move |&e| self.edge(e).ok().map(|edge| (e, *edge)))
    }

    /// Outgoing edges as `(id, edge)` pairs.
    pub fn outgoing(&self, v: VertexId) -> impl Iterator<Item = (EdgeId, Edge)> + '_ {
        self.out_edges(v)
            .iter()
            .filter_map(move |&e| self.edge(e).ok().map(|edge| (e, *edge)))
    }

    /// Edges leaving one source port, in id order.
    pub fn edges_from(&self, port: Port) -> Vec<EdgeId> {
        let mut out: Vec<EdgeId> = self
            .outgoing(port.vertex)
            .filter(|(_, edge)| edge.from.index == port.index)
            .map(|(e, _)| e)
            .collect();
        out.sort();
        out
    }

    /// The unique edge entering a target port.
    pub fn edge_into(&self, port: Port) -> Result<EdgeId> {
        let mut found = self
            .incoming(port.vertex)
            .filter(|(_, edge)| edge.to.index == port.index)
            .map(|(e, _)| e);
        let first = found
            .next()
            .ok_or_else(|| GbnError::integrity(format!("no predecessor at port {}", port)))?;
        if found.next().is_some() {
            return Err(GbnError::integrity(format!(
                "more than one predecessor at port {}",
                port
            )));
        }
        Ok(first)
    }

    /// Source port feeding a target port.
    pub fn source_of(&self, port: Port) -> Result<Port> {
        let e = self.edge_into(port)?;
        Ok(self.edge(e)?.from)
    }

    /// The edge feeding output terminal number `place`.
    pub fn output_predecessor(&self, place: usize) -> Result<(EdgeId, Edge)> {
        let out = *self.outputs.get(place).ok_or_else(|| {
            GbnError::InvalidArgument(format!(
                "output place {} out of range ({} outputs)",
                place,
                self.outputs.len()
            ))
        })?;
        let e = self.edge_into(Port::new(out, 0))?;
        Ok((e, *self.edge(e)?))
    }

    /// Move the source end of an edge to another port.
    pub fn redirect_source(&mut self, e: EdgeId, from: Port) -> Result<()> {
        let edge = *self.edge(e)?;
        self.validate_endpoints(from, edge.to)?;
        self.remove_edge(e)?;
        let new_id = self.connect(from, edge.to, edge.eq_class);
        debug_assert_eq!(new_id, e);
        Ok(())
    }

    /// Move the target end of an edge to another port.
    pub fn redirect_target(&mut self, e: EdgeId, to: Port) -> Result<()> {
        let edge = *self.edge(e)?;
        self.validate_endpoints(edge.from, to)?;
        self.remove_edge(e)?;
        let new_id = self.connect(edge.from, to, edge.eq_class);
        debug_assert_eq!(new_id, e);
        Ok(())
    }

    /// Incoming edges plus distinct output ports with at least one edge.
    pub fn degree(&self, v: VertexId) -> usize {
        let out_ports: BTreeSet<usize> = self.outgoing(v).map(|(_, e)| e.from.index).collect();
        self.in_edges(v).len() + out_ports.len()
    }

    /// Distinct factor vertices adjacent to `v`.
    pub fn neighbors(&self, v: VertexId) -> Vec<VertexId> {
        let set: BTreeSet<VertexId> = self
            .all_neighbors(v)
            .into_iter()
            .filter(|&u| self.is_node(u))
            .collect();
        set.into_iter().collect()
    }

    /// Distinct vertices of any kind adjacent to `v`.
    pub fn all_neighbors(&self, v: VertexId) -> Vec<VertexId> {
        let set: BTreeSet<VertexId> = self
            .outgoing(v)
            .map(|(_, e)| e.to.vertex)
            .chain(self.incoming(v).map(|(_, e)| e.from.vertex))
            .filter(|&u| u != v)
            .collect();
        set.into_iter().collect()
    }

    /// Distinct successors of `v`.
    pub fn successors(&self, v: VertexId) -> Vec<VertexId> {
        let set: BTreeSet<VertexId> = self.outgoing(v).map(|(_, e)| e.to.vertex).collect();
        set.into_iter().collect()
    }

    /// Distinct predecessors of `v`.
    pub fn predecessors(&self, v: VertexId) -> Vec<VertexId> {
        let set: BTreeSet<VertexId> = self.incoming(v).map(|(_, e)| e.from.vertex).collect();
        set.into_iter().collect()
    }

    /// Verify port arities against matrices and the single-predecessor rule.
    pub fn check_integrity(&self) -> Result<()> {
        for v in self.all_vertices() {
            let record = self.record(v)?;
            let (n, m) = match (record.kind, record.matrix.as_ref()) {
                (VertexKind::Input, _) => (0, 1),
                (VertexKind::Output, _) => (1, 0),
                (VertexKind::Node, Some(matrix)) => (matrix.n(), matrix.m()),
                (VertexKind::Node, None) => {
                    return Err(GbnError::integrity(format!("factor {} has no matrix", v)))
                }
            };

            let mut in_counts: BTreeMap<usize, usize> = BTreeMap::new();
            for (e, edge) in self.incoming(v) {
                if !self.contains(edge.from.vertex) {
                    return Err(GbnError::integrity(format!("{} starts at a removed vertex", e)));
                }
                *in_counts.entry(edge.to.index).or_insert(0) += 1;
            }
            for port in 0..n {
                match in_counts.get(&port).copied().unwrap_or(0) {
                    1 => {}
                    0 => {
                        return Err(GbnError::integrity(format!(
                            "no predecessor at port {}",
                            Port::new(v, port)
                        )))
                    }
                    k => {
                        return Err(GbnError::integrity(format!(
                            "{} predecessors at port {}",
                            k,
                            Port::new(v, port)
                        )))
                    }
                }
            }
            if let Some((&port, _)) = in_counts.iter().find(|(&p, _)| p >= n) {
                return Err(GbnError::integrity(format!(
                    "edge into port {} beyond arity {} of {}",
                    port, n, v
                )));
            }

            let mut out_ports: BTreeSet<usize> = BTreeSet::new();
            for (e, edge) in self.outgoing(v) {
                if !self.contains(edge.to.vertex) {
                    return Err(GbnError::integrity(format!("{} ends at a removed vertex", e)));
                }
                out_ports.insert(edge.from.index);
            }
            if let Some(&port) = out_ports.iter().find(|&&p| p >= m) {
                return Err(GbnError::integrity(format!(
                    "edge from port {} beyond arity {} of {}",
                    port, m, v
                )));
            }
            if record.kind == VertexKind::Node && out_ports.len() != m {
                return Err(GbnError::integrity(format!(
                    "{} of {} output ports of {} are connected",
                    out_ports.len(),
                    m,
                    v
                )));
            }
        }
        Ok(())
    }

    /// Keep only the listed output places; every other output is terminated.
    ///
    /// Kept outputs are renumbered in the order given. The slots of dropped
    /// output terminals are retired, not recycled.
    pub fn restrict_outputs(&mut self, keep: &[usize]) -> Result<()> {
        if let Some(&bad) = keep.iter().find(|&&p| p >= self.outputs.len()) {
            return Err(GbnError::InvalidArgument(format!(
                "output place {} out of range ({} outputs)",
                bad,
                self.outputs.len()
            )));
        }
        let mut seen = BTreeSet::new();
        if let Some(&repeated) = keep.iter().find(|&&p| !seen.insert(p)) {
            return Err(GbnError::InvalidArgument(format!(
                "output place {} kept twice",
                repeated
            )));
        }
        let mut plan = Vec::new();
        for place in 0..self.outputs.len() {
            if !keep.contains(&place) {
                let (e, edge) = self.output_predecessor(place)?;
                plan.push((self.outputs[place], e, edge));
            }
        }

        let kept: Vec<VertexId> = keep.iter().map(|&p| self.outputs[p]).collect();
        for (out, e, edge) in plan {
            self.remove_edge(e)?;
            let t = self.add_vertex(Matrix::terminator(), "T");
            self.add_edge(edge.from, Port::new(t, 0), edge.eq_class)?;
            self.vertices[out.0] = None;
        }
        self.outputs = kept;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_id_reuse() {
        let mut gbn = Gbn::new(1, 1);
        let a = gbn.add_vertex(Matrix::terminator(), "a");
        let b = gbn.add_vertex(Matrix::terminator(), "b");
        gbn.remove_vertex(a).unwrap();
        let c = gbn.add_vertex(Matrix::one_b(true), "c");
        assert_eq!(a, c);
        assert_ne!(b, c);
        assert_eq!(gbn.label(c), Some("c"));
    }

    #[test]
    fn test_remove_vertex_clears_edges() {
        let mut gbn = Gbn::new(0, 1);
        let s = gbn.add_vertex(Matrix::one_b(true), "s");
        let out = gbn.outputs()[0];
        gbn.add_edge(Port::new(s, 0), Port::new(out, 0), 0).unwrap();
        let matrix = gbn.remove_vertex(s).unwrap();
        assert_eq!(matrix, Matrix::one_b(true));
        assert_eq!(gbn.edge_count(), 0);
        assert!(gbn.in_edges(out).is_empty());
        assert!(matches!(
            gbn.remove_vertex(s),
            Err(GbnError::VertexNotFound(_))
        ));
    }

    #[test]
    fn test_terminals_cannot_be_removed() {
        let mut gbn = Gbn::new(1, 1);
        let input = gbn.inputs()[0];
        assert!(gbn.remove_vertex(input).is_err());
    }

    #[test]
    fn test_degree_counts_output_ports_once() {
        let mut gbn = Gbn::new(1, 2);
        let f = gbn.add_vertex(Matrix::filter(1, true).unwrap(), "f");
        let (i, o0, o1) = (gbn.inputs()[0], gbn.outputs()[0], gbn.outputs()[1]);
        gbn.add_edge(Port::new(i, 0), Port::new(f, 0), 0).unwrap();
        gbn.add_edge(Port::new(f, 0), Port::new(o0, 0), 0).unwrap();
        gbn.add_edge(Port::new(f, 0), Port::new(o1, 0), 0).unwrap();
        assert_eq!(gbn.degree(f), 2);
        assert!(gbn.neighbors(f).is_empty());
        assert_eq!(gbn.all_neighbors(f), vec![i, o0, o1]);
        gbn.check_integrity().unwrap();
    }

    #[test]
    fn test_integrity_rejects_double_predecessor() {
        let mut gbn = Gbn::new(2, 1);
        let (i0, i1, o) = (gbn.inputs()[0], gbn.inputs()[1], gbn.outputs()[0]);
        gbn.add_edge(Port::new(i0, 0), Port::new(o, 0), 0).unwrap();
        gbn.add_edge(Port::new(i1, 0), Port::new(o, 0), 1).unwrap();
        assert!(matches!(
            gbn.check_integrity(),
            Err(GbnError::Integrity(_))
        ));
        assert!(gbn.output_predecessor(0).is_err());
    }

    #[test]
    fn test_integrity_rejects_arity_mismatch() {
        let mut gbn = Gbn::new(1, 1);
        let d = gbn.add_vertex(Matrix::dynamic(2, 1).unwrap(), "d");
        let (i, o) = (gbn.inputs()[0], gbn.outputs()[0]);
        gbn.add_edge(Port::new(i, 0), Port::new(d, 0), 0).unwrap();
        gbn.add_edge(Port::new(d, 0), Port::new(o, 0), 0).unwrap();
        assert!(gbn.check_integrity().is_err());
    }

    #[test]
    fn test_builders() {
        let gbn = Gbn::uniform_independent(3);
        assert_eq!(gbn.inside_vertices().len(), 3);
        assert_eq!(gbn.outputs().len(), 3);
        gbn.check_integrity().unwrap();

        let gbn = Gbn::without_knowledge(2);
        assert!(gbn.inside_vertices().is_empty());
        let (_, edge) = gbn.output_predecessor(1).unwrap();
        assert_eq!(edge.from.vertex, gbn.inputs()[1]);
        gbn.check_integrity().unwrap();
    }

    #[test]
    fn test_restrict_outputs() {
        let mut gbn = Gbn::uniform_independent(3);
        let kept = gbn.outputs()[2];
        gbn.restrict_outputs(&[2]).unwrap();
        assert_eq!(gbn.outputs(), &[kept]);
        assert_eq!(gbn.inside_vertices().len(), 5);
        gbn.check_integrity().unwrap();
    }

    #[test]
    fn test_restrict_outputs_retires_terminal_ids() {
        let mut gbn = Gbn::uniform_independent(2);
        let dropped = gbn.outputs()[0];
        gbn.restrict_outputs(&[1]).unwrap();
        assert!(!gbn.contains(dropped));
        let v = gbn.add_vertex(Matrix::terminator(), "T");
        assert_ne!(v, dropped);
        assert!(!gbn.contains(dropped));
    }

    #[test]
    fn test_restrict_outputs_rejects_repeated_place() {
        let mut gbn = Gbn::uniform_independent(2);
        let (outputs, vertices) = (gbn.outputs().to_vec(), gbn.vertex_count());
        let err = gbn.restrict_outputs(&[0, 0]).unwrap_err();
        assert!(matches!(err, GbnError::InvalidArgument(_)));
        assert_eq!(gbn.outputs(), outputs.as_slice());
        assert_eq!(gbn.vertex_count(), vertices);
    }

    #[test]
    fn test_redirect_keeps_eq_class() {
        let mut gbn = Gbn::without_knowledge(1);
        let (e, edge) = gbn.output_predecessor(0).unwrap();
        let f = gbn.add_vertex(Matrix::filter(1, true).unwrap(), "f");
        gbn.redirect_target(e, Port::new(f, 0)).unwrap();
        gbn.add_edge(Port::new(f, 0), Port::new(gbn.outputs()[0], 0), edge.eq_class)
            .unwrap();
        assert_eq!(gbn.edge(e).unwrap().eq_class, edge.eq_class);
        gbn.check_integrity().unwrap();
    }
}
