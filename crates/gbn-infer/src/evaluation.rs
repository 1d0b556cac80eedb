//! Brute-force evaluation of a sub-circuit into a single matrix.

use tracing::{debug, trace};

use crate::bits::{all_assignments, Bits};
use crate::error::Result;
use crate::graph::Gbn;
use crate::matrix::{normalize_columns, Matrix, STOCHASTIC_TOLERANCE};
use crate::subgbn::SubGbn;
use crate::wires::WireStructure;

/// Running product of per-vertex probabilities.
///
/// Zero factors are counted instead of multiplied in, so a vertex moving away
/// from probability zero does not require recomputing the whole product.
#[derive(Clone, Debug)]
pub struct ProbabilityBookkeeper {
    values: Vec<f64>,
    product: f64,
    zeros: usize,
}

impl ProbabilityBookkeeper {
    /// Every slot starts at probability one.
    pub fn new(slots: usize) -> Self {
        Self {
            values: vec![1.0; slots],
            product: 1.0,
            zeros: 0,
        }
    }

    pub fn update(&mut self, slot: usize, p: f64) {
        let old = self.values[slot];
        if old == 0.0 {
            self.zeros -= 1;
        } else {
            self.product /= old;
        }
        if p == 0.0 {
            self.zeros += 1;
        } else {
            self.product *= p;
        }
        self.values[slot] = p;
    }

    pub fn product(&self) -> f64 {
        if self.zeros > 0 {
            0.0
        } else {
            self.product
        }
    }
}

/// Marginalize the independent wires of `sub`.
///
/// The returned matrix maps boundary input assignments to boundary output
/// assignments. It is diagonal when the view only contains filter/diagonal
/// gates, has as many inputs as outputs and every produced entry lies on the
/// diagonal; otherwise it is dynamic.
pub fn evaluate(sub: &SubGbn<'_>) -> Result<Matrix> {
    let gbn = sub.graph();
    let mut wires = WireStructure::build(sub)?;
    let mut result = Matrix::dynamic(sub.n(), sub.m())?;

    let matrices: Vec<&Matrix> = wires
        .vertices()
        .iter()
        .map(|&v| gbn.matrix(v))
        .collect::<Result<_>>()?;

    debug!(
        vertices = matrices.len(),
        wires = wires.wires().len(),
        independent = wires.independent_count(),
        n = sub.n(),
        m = sub.m(),
        "evaluating sub-circuit"
    );

    let mut bookkeeper = ProbabilityBookkeeper::new(matrices.len());
    for (slot, matrix) in matrices.iter().enumerate() {
        let (to, from) = wires.vertex_assignment(slot);
        bookkeeper.update(slot, matrix.get(to, from));
    }
    let (to, from) = wires.boundary_assignment();
    result.add(to, from, bookkeeper.product())?;

    let independent: Vec<usize> = wires
        .wires()
        .iter()
        .enumerate()
        .filter(|(_, w)| w.independent)
        .map(|(i, _)| i)
        .collect();

    let mut touched: Vec<usize> = Vec::new();
    let mut i = 0;
    while i < independent.len() {
        if !wires.flip(independent[i], &mut touched) {
            // carry
            i += 1;
            continue;
        }
        touched.sort_unstable();
        touched.dedup();
        for &slot in &touched {
            let (to, from) = wires.vertex_assignment(slot);
            bookkeeper.update(slot, matrices[slot].get(to, from));
        }
        touched.clear();
        let (to, from) = wires.boundary_assignment();
        result.add(to, from, bookkeeper.product())?;
        i = 0;
    }

    let stochastic = matrices.iter().all(|m| m.is_stochastic());
    let filter_only = matrices.iter().all(|m| m.is_filter_like());
    let mut result = if filter_only && sub.n() == sub.m() {
        into_diagonal_if_possible(result)?
    } else {
        result
    };
    result.set_stochastic(stochastic);

    trace!(kind = result.kind().name(), stochastic, "evaluation finished");
    Ok(result)
}

fn into_diagonal_if_possible(dynamic: Matrix) -> Result<Matrix> {
    let entries = dynamic.nonzero_entries();
    if entries.iter().any(|&(to, from, _)| to != from) {
        return Ok(dynamic);
    }
    let mut diagonal = Matrix::diagonal(dynamic.n())?;
    for (to, from, v) in entries {
        diagonal.set(to, from, v)?;
    }
    Ok(diagonal)
}

/// Brute-force evaluation of the whole graph.
pub fn evaluate_gbn(gbn: &Gbn) -> Result<Matrix> {
    evaluate(&SubGbn::whole(gbn))
}

/// Dynamic copy of `matrix` whose non-zero columns sum to one.
///
/// Used to compare conditional distributions of circuits that only agree up
/// to a per-input normalization.
pub fn normalize_result(matrix: &Matrix) -> Result<Matrix> {
    let mut out = matrix.to_dynamic()?;
    normalize_columns(&mut out, STOCHASTIC_TOLERANCE)?;
    Ok(out)
}

/// Total probability mass of column `from`.
pub fn column_mass(matrix: &Matrix, from: Bits) -> f64 {
    all_assignments(matrix.m())
        .map(|to| matrix.get(to, from))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Port;
    use crate::matrix::MatrixKind;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_bookkeeper_tracks_zeros() {
        let mut bk = ProbabilityBookkeeper::new(2);
        bk.update(0, 0.5);
        bk.update(1, 0.0);
        assert_eq!(bk.product(), 0.0);
        bk.update(1, 0.25);
        assert_abs_diff_eq!(bk.product(), 0.125);
        bk.update(0, 1.0);
        assert_abs_diff_eq!(bk.product(), 0.25);
    }

    #[test]
    fn test_uniform_sources() {
        let gbn = Gbn::uniform_independent(3);
        let m = evaluate_gbn(&gbn).unwrap();
        assert_eq!((m.n(), m.m()), (0, 3));
        for to in all_assignments(3) {
            assert_abs_diff_eq!(m.get(to, Bits::ZERO), 0.125, epsilon = 1e-12);
        }
        assert!(m.is_stochastic());
    }

    #[test]
    fn test_identity_is_diagonal() {
        let gbn = Gbn::without_knowledge(2);
        let m = evaluate_gbn(&gbn).unwrap();
        assert_eq!(m.kind(), MatrixKind::Diagonal);
        for x in all_assignments(2) {
            assert_eq!(m.get(x, x), 1.0);
        }
    }

    #[test]
    fn test_crossed_wires_stay_dynamic() {
        let mut gbn = Gbn::new(2, 2);
        let (i0, i1) = (gbn.inputs()[0], gbn.inputs()[1]);
        let (o0, o1) = (gbn.outputs()[0], gbn.outputs()[1]);
        gbn.add_edge(Port::new(i0, 0), Port::new(o1, 0), 0).unwrap();
        gbn.add_edge(Port::new(i1, 0), Port::new(o0, 0), 1).unwrap();
        let m = evaluate_gbn(&gbn).unwrap();
        assert_eq!(m.kind(), MatrixKind::Dynamic);
        assert_eq!(m.get(Bits::new(0b10), Bits::new(0b01)), 1.0);
    }

    #[test]
    fn test_filter_blocks_assignment() {
        let mut gbn = Gbn::new(1, 1);
        let (i, o) = (gbn.inputs()[0], gbn.outputs()[0]);
        let f = gbn.add_vertex(Matrix::filter(1, true).unwrap(), "f");
        gbn.add_edge(Port::new(i, 0), Port::new(f, 0), 0).unwrap();
        gbn.add_edge(Port::new(f, 0), Port::new(o, 0), 0).unwrap();
        let m = evaluate_gbn(&gbn).unwrap();
        assert_eq!(m.kind(), MatrixKind::Diagonal);
        assert_eq!(m.get(Bits::new(0), Bits::new(0)), 1.0);
        assert_eq!(m.get(Bits::new(1), Bits::new(1)), 0.0);
        assert!(!m.is_stochastic());
    }

    #[test]
    fn test_conditional_then_terminate() {
        let mut gbn = Gbn::new(1, 1);
        let (i, o) = (gbn.inputs()[0], gbn.outputs()[0]);
        let flip = Matrix::dynamic_from_rows(1, 1, &[vec![0.0, 1.0], vec![1.0, 0.0]]).unwrap();
        let d = gbn.add_vertex(flip, "not");
        gbn.add_edge(Port::new(i, 0), Port::new(d, 0), 0).unwrap();
        gbn.add_edge(Port::new(d, 0), Port::new(o, 0), 0).unwrap();
        let m = evaluate_gbn(&gbn).unwrap();
        assert_eq!(m.get(Bits::new(1), Bits::new(0)), 1.0);
        assert_eq!(m.get(Bits::new(0), Bits::new(1)), 1.0);
        assert_abs_diff_eq!(column_mass(&m, Bits::new(1)), 1.0);
    }

    #[test]
    fn test_normalize_result() {
        let m = Matrix::dynamic_from_rows(0, 1, &[vec![0.1], vec![0.3]]).unwrap();
        let n = normalize_result(&m).unwrap();
        assert_abs_diff_eq!(n.get(Bits::new(1), Bits::ZERO), 0.75);
    }
}
