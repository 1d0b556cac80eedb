//! Wire dependency analysis.
//!
//! Every source port of a sub-circuit drives one wire. A wire leaving a filter
//! or diagonal gate always carries the same value as the corresponding input
//! of that gate (every other assignment has probability zero), so it is
//! slaved to the independent wire found by walking back through the chain of
//! such gates. Only independent wires are enumerated during evaluation.

use std::collections::{HashMap, HashSet};

use crate::bits::Bits;
use crate::error::{GbnError, Result};
use crate::graph::{Port, VertexId};
use crate::subgbn::SubGbn;

/// A bit in one of the per-vertex buffers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VertexBit {
    /// Dense index of the vertex inside the wire structure.
    pub slot: usize,
    pub bit: usize,
}

#[derive(Clone, Debug)]
pub struct Wire {
    pub source: Port,
    /// Output bit of an inside source vertex, if the source is inside.
    pub source_bit: Option<VertexBit>,
    /// Input bits of inside consumers.
    pub sinks: Vec<VertexBit>,
    /// Boundary input bit, if the source lies outside.
    pub input_bit: Option<usize>,
    /// Boundary output bits fed by this wire.
    pub output_bits: Vec<usize>,
    pub independent: bool,
    /// Index of the independent wire determining this one.
    pub master: Option<usize>,
    active: bool,
}

impl Wire {
    fn new(source: Port) -> Self {
        Self {
            source,
            source_bit: None,
            sinks: Vec::new(),
            input_bit: None,
            output_bits: Vec::new(),
            independent: true,
            master: None,
            active: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

/// Wires of a sub-circuit together with the bit buffers they drive.
#[derive(Clone, Debug)]
pub struct WireStructure {
    vertices: Vec<VertexId>,
    vertex_inputs: Vec<Bits>,
    vertex_outputs: Vec<Bits>,
    input: Bits,
    output: Bits,
    wires: Vec<Wire>,
    dependents: Vec<Vec<usize>>,
}

impl WireStructure {
    /// Group the edges of `sub` into wires and resolve master wires.
    pub fn build(sub: &SubGbn<'_>) -> Result<Self> {
        let gbn = sub.graph();
        let vertices: Vec<VertexId> = sub.inside().iter().copied().collect();
        let slot_of: HashMap<VertexId, usize> =
            vertices.iter().enumerate().map(|(i, &v)| (v, i)).collect();

        let mut output_bit_of: HashMap<Port, usize> = HashMap::new();
        for (bit, sinks) in sub.output_ports().iter().enumerate() {
            for &p in sinks {
                output_bit_of.insert(p, bit);
            }
        }

        let mut wires: Vec<Wire> = Vec::new();
        let mut wire_of_source: HashMap<Port, usize> = HashMap::new();

        let attach_sinks = |wire: &mut Wire, source: Port| {
            for e in gbn.edges_from(source) {
                if let Ok(edge) = gbn.edge(e) {
                    if let Some(&slot) = slot_of.get(&edge.to.vertex) {
                        wire.sinks.push(VertexBit {
                            slot,
                            bit: edge.to.index,
                        });
                    } else if let Some(&bit) = output_bit_of.get(&edge.to) {
                        wire.output_bits.push(bit);
                    }
                }
            }
        };

        for (bit, &source) in sub.input_ports().iter().enumerate() {
            let mut wire = Wire::new(source);
            wire.input_bit = Some(bit);
            attach_sinks(&mut wire, source);
            wire_of_source.insert(source, wires.len());
            wires.push(wire);
        }

        for (slot, &v) in vertices.iter().enumerate() {
            let matrix = gbn.matrix(v)?;
            for index in 0..matrix.m() {
                let source = Port::new(v, index);
                let mut wire = Wire::new(source);
                wire.source_bit = Some(VertexBit { slot, bit: index });
                wire.independent = !matrix.is_filter_like();
                attach_sinks(&mut wire, source);
                wire_of_source.insert(source, wires.len());
                wires.push(wire);
            }
        }

        let mut dependents = vec![Vec::new(); wires.len()];
        for i_wire in 0..wires.len() {
            if wires[i_wire].independent {
                continue;
            }
            let master = Self::resolve_master(sub, &wires, &wire_of_source, wires[i_wire].source)?;
            wires[i_wire].master = Some(master);
            dependents[master].push(i_wire);
        }

        Ok(Self {
            vertex_inputs: vec![Bits::ZERO; vertices.len()],
            vertex_outputs: vec![Bits::ZERO; vertices.len()],
            vertices,
            input: Bits::ZERO,
            output: Bits::ZERO,
            wires,
            dependents,
        })
    }

    /// Walk back through filter/diagonal gates until an independent wire is found.
    fn resolve_master(
        sub: &SubGbn<'_>,
        wires: &[Wire],
        wire_of_source: &HashMap<Port, usize>,
        start: Port,
    ) -> Result<usize> {
        let gbn = sub.graph();
        let mut visited: HashSet<Port> = HashSet::new();
        let mut port = start;
        loop {
            if !visited.insert(port) {
                return Err(GbnError::CyclicDependency(port.vertex));
            }
            let upstream = gbn.source_of(Port::new(port.vertex, port.index))?;
            let i_wire = *wire_of_source.get(&upstream).ok_or_else(|| {
                GbnError::integrity(format!(
                    "port {} feeds the sub-circuit but is not on its boundary",
                    upstream
                ))
            })?;
            if wires[i_wire].independent {
                return Ok(i_wire);
            }
            port = upstream;
        }
    }

    pub fn wires(&self) -> &[Wire] {
        &self.wires
    }

    pub fn independent_count(&self) -> usize {
        self.wires.iter().filter(|w| w.independent).count()
    }

    pub fn vertices(&self) -> &[VertexId] {
        &self.vertices
    }

    /// Current `(to, from)` assignment seen by the vertex in `slot`.
    pub fn vertex_assignment(&self, slot: usize) -> (Bits, Bits) {
        (self.vertex_outputs[slot], self.vertex_inputs[slot])
    }

    /// Current `(to, from)` assignment on the boundary.
    pub fn boundary_assignment(&self) -> (Bits, Bits) {
        (self.output, self.input)
    }

    fn flip_single(&mut self, i_wire: usize, touched: &mut Vec<usize>) {
        let wire = &mut self.wires[i_wire];
        wire.active = !wire.active;
        let active = wire.active;
        if let Some(VertexBit { slot, bit }) = wire.source_bit {
            self.vertex_outputs[slot].set(bit, active);
            touched.push(slot);
        }
        for &VertexBit { slot, bit } in &wire.sinks {
            self.vertex_inputs[slot].set(bit, active);
            touched.push(slot);
        }
        if let Some(bit) = wire.input_bit {
            self.input.set(bit, active);
        }
        for &bit in &wire.output_bits {
            self.output.set(bit, active);
        }
    }

    /// Flip an independent wire and every wire slaved to it.
    ///
    /// Returns whether the wire is now set; the slots of touched vertices are
    /// appended to `touched`.
    pub fn flip(&mut self, i_wire: usize, touched: &mut Vec<usize>) -> bool {
        self.flip_single(i_wire, touched);
        for k in 0..self.dependents[i_wire].len() {
            let dependent = self.dependents[i_wire][k];
            self.flip_single(dependent, touched);
        }
        self.wires[i_wire].active
    }
}
