//! Boundary-delimited views over a vertex subset.

use std::collections::BTreeSet;

use crate::error::{GbnError, Result};
use crate::graph::{Gbn, Port, VertexId};

/// Read-only view of a set of factor vertices and the ports crossing its boundary.
///
/// Input bit `i` of the view is the value of the external source port
/// `input_ports()[i]`. Output bit `j` is the value delivered to every external
/// sink port in `output_ports()[j]`.
#[derive(Clone, Debug)]
pub struct SubGbn<'a> {
    gbn: &'a Gbn,
    inside: BTreeSet<VertexId>,
    inputs: Vec<Port>,
    outputs: Vec<Vec<Port>>,
}

impl<'a> SubGbn<'a> {
    /// The entire graph, bounded by its input and output terminals.
    pub fn whole(gbn: &'a Gbn) -> Self {
        Self {
            gbn,
            inside: gbn.inside_vertices().into_iter().collect(),
            inputs: gbn.inputs().iter().map(|&v| Port::new(v, 0)).collect(),
            outputs: gbn
                .outputs()
                .iter()
                .map(|&v| vec![Port::new(v, 0)])
                .collect(),
        }
    }

    /// View over `vertices`.
    ///
    /// Boundary inputs are ordered by the first inside port they feed (vertices
    /// ascending, then port index); boundary outputs are grouped by inside
    /// source port in the same order.
    pub fn from_vertices(gbn: &'a Gbn, vertices: &[VertexId]) -> Result<Self> {
        let inside: BTreeSet<VertexId> = vertices.iter().copied().collect();
        for &v in &inside {
            if !gbn.contains(v) {
                return Err(GbnError::VertexNotFound(v));
            }
            if !gbn.is_node(v) {
                return Err(GbnError::InvalidArgument(format!(
                    "terminal {} cannot be part of a sub-circuit",
                    v
                )));
            }
        }

        let mut inputs: Vec<Port> = Vec::new();
        let mut outputs: Vec<Vec<Port>> = Vec::new();
        let mut output_sources: Vec<Port> = Vec::new();

        for &v in &inside {
            let mut incoming: Vec<_> = gbn.incoming(v).map(|(_, e)| e).collect();
            incoming.sort_by_key(|e| e.to.index);
            for edge in incoming {
                if !inside.contains(&edge.from.vertex) && !inputs.contains(&edge.from) {
                    inputs.push(edge.from);
                }
            }

            let mut outgoing: Vec<_> = gbn.outgoing(v).collect();
            outgoing.sort_by_key(|(e, edge)| (edge.from.index, *e));
            for (_, edge) in outgoing {
                if inside.contains(&edge.to.vertex) {
                    continue;
                }
                match output_sources.iter().position(|&p| p == edge.from) {
                    Some(i) => outputs[i].push(edge.to),
                    None => {
                        output_sources.push(edge.from);
                        outputs.push(vec![edge.to]);
                    }
                }
            }
        }

        Ok(Self {
            gbn,
            inside,
            inputs,
            outputs,
        })
    }

    pub fn graph(&self) -> &'a Gbn {
        self.gbn
    }

    pub fn inside(&self) -> &BTreeSet<VertexId> {
        &self.inside
    }

    pub fn input_ports(&self) -> &[Port] {
        &self.inputs
    }

    pub fn output_ports(&self) -> &[Vec<Port>] {
        &self.outputs
    }

    /// Number of boundary inputs.
    pub fn n(&self) -> usize {
        self.inputs.len()
    }

    /// Number of boundary outputs.
    pub fn m(&self) -> usize {
        self.outputs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::Matrix;

    /// i0 -> f -> d -> o0, with d also feeding o1.
    fn chain() -> (Gbn, VertexId, VertexId) {
        let mut gbn = Gbn::new(1, 2);
        let (i, o0, o1) = (gbn.inputs()[0], gbn.outputs()[0], gbn.outputs()[1]);
        let f = gbn.add_vertex(Matrix::filter(1, true).unwrap(), "f");
        let d = gbn.add_vertex(Matrix::dynamic(1, 1).unwrap(), "d");
        gbn.add_edge(Port::new(i, 0), Port::new(f, 0), 0).unwrap();
        gbn.add_edge(Port::new(f, 0), Port::new(d, 0), 0).unwrap();
        gbn.add_edge(Port::new(d, 0), Port::new(o0, 0), 0).unwrap();
        gbn.add_edge(Port::new(d, 0), Port::new(o1, 0), 0).unwrap();
        (gbn, f, d)
    }

    #[test]
    fn test_whole_view() {
        let (gbn, _, _) = chain();
        let sub = SubGbn::whole(&gbn);
        assert_eq!(sub.n(), 1);
        assert_eq!(sub.m(), 2);
        assert_eq!(sub.inside().len(), 2);
    }

    #[test]
    fn test_boundary_of_single_vertex() {
        let (gbn, f, d) = chain();
        let sub = SubGbn::from_vertices(&gbn, &[d]).unwrap();
        assert_eq!(sub.input_ports(), &[Port::new(f, 0)]);
        assert_eq!(sub.m(), 1);
        assert_eq!(sub.output_ports()[0].len(), 2);

        let sub = SubGbn::from_vertices(&gbn, &[f, d]).unwrap();
        assert_eq!(sub.input_ports(), &[Port::new(gbn.inputs()[0], 0)]);
    }

    #[test]
    fn test_terminals_rejected() {
        let (gbn, _, _) = chain();
        assert!(SubGbn::from_vertices(&gbn, &[gbn.inputs()[0]]).is_err());
    }
}
