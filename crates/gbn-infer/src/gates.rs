//! Gate vocabulary for splicing new factors onto output places.
//!
//! A place is the index of an OUTPUT terminal. Every operation first looks up
//! the unique predecessor of each place it touches and validates its
//! arguments, so a rejected request leaves the graph unchanged. Wires entering
//! a gate keep their equivalence class; wires carrying a fresh value get a new
//! one.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::bits::{all_assignments, Bits};
use crate::config::EngineConfig;
use crate::error::{GbnError, Result};
use crate::graph::{Edge, EdgeId, Gbn, Port};
use crate::matrix::{normalize_columns, Matrix};

/// Predecessor edge of every place, rejecting repeated places.
fn predecessors(gbn: &Gbn, places: &[usize]) -> Result<Vec<(EdgeId, Edge)>> {
    let mut seen = BTreeSet::new();
    places
        .iter()
        .map(|&place| {
            if !seen.insert(place) {
                return Err(GbnError::InvalidArgument(format!(
                    "place {} listed twice",
                    place
                )));
            }
            gbn.output_predecessor(place)
        })
        .collect()
}

fn check_mass(probabilities: &[f64], config: &EngineConfig) -> Result<()> {
    let sum: f64 = probabilities.iter().sum();
    if (sum - 1.0).abs() > config.probability_mass_tolerance {
        return Err(GbnError::ProbabilityMass { sum });
    }
    Ok(())
}

/// Feed `output_edge`'s terminal from `from` on a wire with a new class.
fn feed_fresh(gbn: &mut Gbn, output_edge: EdgeId, from: Port) -> Result<()> {
    let edge = gbn.remove_edge(output_edge)?;
    let class = gbn.next_eq_class();
    gbn.add_edge(from, edge.to, class)?;
    Ok(())
}

/// Discard the current value of each place and replace it with `source`.
fn replace_sources<F>(gbn: &mut Gbn, places: &[usize], mut source: F) -> Result<()>
where
    F: FnMut() -> Result<(Matrix, String)>,
{
    let preds = predecessors(gbn, places)?;
    let sources = (0..places.len())
        .map(|_| source())
        .collect::<Result<Vec<_>>>()?;

    for ((e, edge), (matrix, label)) in preds.into_iter().zip(sources) {
        let t = gbn.add_vertex(Matrix::terminator(), "T");
        gbn.add_edge(edge.from, Port::new(t, 0), edge.eq_class)?;
        let s = gbn.add_vertex(matrix, label);
        feed_fresh(gbn, e, Port::new(s, 0))?;
    }
    Ok(())
}

/// Insert one `k`-ary gate across `places`, port `i` serving `places[i]`.
fn splice_gate(
    gbn: &mut Gbn,
    places: &[usize],
    matrix: Matrix,
    label: &str,
    keep_classes: bool,
) -> Result<()> {
    let preds = predecessors(gbn, places)?;
    let gate = gbn.add_vertex(matrix, label);
    for (i, (e, edge)) in preds.into_iter().enumerate() {
        gbn.add_edge(edge.from, Port::new(gate, i), edge.eq_class)?;
        if keep_classes {
            gbn.redirect_source(e, Port::new(gate, i))?;
        } else {
            feed_fresh(gbn, e, Port::new(gate, i))?;
        }
    }
    debug!(gate = label, places = ?places, "spliced gate");
    Ok(())
}

/// Force every place to `b`.
pub fn set(gbn: &mut Gbn, places: &[usize], b: bool) -> Result<()> {
    replace_sources(gbn, places, || {
        Ok((Matrix::one_b(b), format!("1_{}", u8::from(b))))
    })
}

/// Condition on every place being `b`, one filter per place.
pub fn assert(gbn: &mut Gbn, places: &[usize], b: bool) -> Result<()> {
    let preds = predecessors(gbn, places)?;
    let gate = Matrix::filter(1, !b)?;
    for (e, edge) in preds {
        let f = gbn.add_vertex(gate.clone(), gate.label());
        gbn.add_edge(edge.from, Port::new(f, 0), edge.eq_class)?;
        gbn.redirect_source(e, Port::new(f, 0))?;
    }
    Ok(())
}

/// Condition on the places not all being `b`.
pub fn nassert(gbn: &mut Gbn, places: &[usize], b: bool) -> Result<()> {
    let gate = Matrix::filter(places.len(), b)?;
    let label = gate.label();
    splice_gate(gbn, places, gate, &label, true)
}

/// Replace every place with a fresh source that is one with probability `p`.
pub fn setp(gbn: &mut Gbn, places: &[usize], p: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&p) {
        return Err(GbnError::InvalidArgument(format!(
            "{} is not a probability",
            p
        )));
    }
    replace_sources(gbn, places, || {
        Ok((Matrix::bernoulli(1.0 - p, p), format!("{},{}", p, 1.0 - p)))
    })
}

/// Whether no place is fed by a constant other than `condition`.
pub fn validate_transition(gbn: &Gbn, places: &[usize], condition: bool) -> Result<bool> {
    for &place in places {
        let (_, edge) = gbn.output_predecessor(place)?;
        if let Matrix::OneB(b) = gbn.matrix(edge.from.vertex)? {
            if *b != condition {
                return Ok(false);
            }
        }
    }
    Ok(true)
}

/// Place `i` of `places` as a bit index of the choice matrix.
fn bit_positions(places: &BTreeSet<usize>) -> BTreeMap<usize, usize> {
    places.iter().enumerate().map(|(i, &p)| (p, i)).collect()
}

/// Every assignment of `size` bits with the bits in `fixed` set to `value`.
fn assignments_with(size: usize, fixed: &BTreeSet<usize>, value: bool) -> Vec<Bits> {
    let free: Vec<usize> = (0..size).filter(|i| !fixed.contains(i)).collect();
    all_assignments(free.len())
        .map(|a| {
            let base = fixed.iter().fold(Bits::ZERO, |acc, &i| acc.with(i, value));
            free.iter()
                .enumerate()
                .fold(base, |acc, (j, &i)| acc.with(i, a.get(j)))
        })
        .collect()
}

struct Transition {
    pre: BTreeSet<usize>,
    post: BTreeSet<usize>,
    probability: f64,
}

fn enabled_transitions(
    gbn: &Gbn,
    pre_places: &[Vec<usize>],
    post_places: &[Vec<usize>],
    probabilities: &[f64],
    config: &EngineConfig,
) -> Result<Vec<(usize, f64)>> {
    if pre_places.len() != probabilities.len() || post_places.len() != probabilities.len() {
        return Err(GbnError::InvalidArgument(format!(
            "{} pre-place sets and {} post-place sets for {} probabilities",
            pre_places.len(),
            post_places.len(),
            probabilities.len()
        )));
    }
    check_mass(probabilities, config)?;

    let mut enabled = Vec::new();
    for (i, pre) in pre_places.iter().enumerate() {
        if validate_transition(gbn, pre, true)? {
            enabled.push((i, probabilities[i]));
        }
    }
    Ok(enabled)
}

/// Matrix moving tokens from pre-places to post-places of one chosen transition.
fn choice_matrix(places: &BTreeSet<usize>, transitions: &[Transition]) -> Result<Matrix> {
    let position = bit_positions(places);
    let size = places.len();
    let normalizer: f64 = transitions.iter().map(|t| t.probability).sum();

    let mut matrix = Matrix::dynamic(size, size)?;
    for t in transitions {
        let pre: BTreeSet<usize> = t.pre.iter().map(|p| position[p]).collect();
        let post: BTreeSet<usize> = t.post.iter().map(|p| position[p]).collect();
        let p = if normalizer > 0.0 {
            t.probability / normalizer
        } else {
            0.0
        };
        for from in assignments_with(size, &pre, true) {
            let mut to = from;
            for &i in &pre {
                to.set(i, false);
            }
            for &i in &post {
                to.set(i, true);
            }
            matrix.add(to, from, p)?;
        }
    }
    matrix.set_stochastic(false);
    Ok(matrix)
}

fn fire_weighted(
    gbn: &mut Gbn,
    pre_places: &[Vec<usize>],
    post_places: &[Vec<usize>],
    probabilities: &[f64],
    config: &EngineConfig,
    label: &str,
    normalize: bool,
) -> Result<()> {
    let enabled = enabled_transitions(gbn, pre_places, post_places, probabilities, config)?;
    match enabled.as_slice() {
        [] => return Ok(()),
        [(i, _)] => {
            let (pre, post) = (&pre_places[*i], &post_places[*i]);
            predecessors(gbn, pre)?;
            predecessors(gbn, post)?;
            assert(gbn, pre, true)?;
            set(gbn, pre, false)?;
            return set(gbn, post, true);
        }
        _ => {}
    }

    let transitions: Vec<Transition> = enabled
        .iter()
        .map(|&(i, probability)| Transition {
            pre: pre_places[i].iter().copied().collect(),
            post: post_places[i].iter().copied().collect(),
            probability,
        })
        .collect();
    let places: BTreeSet<usize> = transitions
        .iter()
        .flat_map(|t| t.pre.iter().chain(t.post.iter()).copied())
        .collect();

    let mut matrix = choice_matrix(&places, &transitions)?;
    if normalize {
        normalize_columns(&mut matrix, config.stochastic_tolerance)?;
    }
    let places: Vec<usize> = places.into_iter().collect();
    splice_gate(gbn, &places, matrix, label, false)
}

/// Fire one of several transitions, chosen with the given probabilities.
///
/// Transitions with a pre-place known to be empty are dropped and the rest
/// renormalized. Assignments enabling none of them get probability zero.
pub fn successp(
    gbn: &mut Gbn,
    pre_places: &[Vec<usize>],
    post_places: &[Vec<usize>],
    probabilities: &[f64],
    config: &EngineConfig,
) -> Result<()> {
    fire_weighted(gbn, pre_places, post_places, probabilities, config, "successp", false)
}

/// Like [`successp`], but every enabled assignment's column is normalized so
/// the enabled transitions share the whole probability mass.
pub fn success_stoch(
    gbn: &mut Gbn,
    pre_places: &[Vec<usize>],
    post_places: &[Vec<usize>],
    probabilities: &[f64],
    config: &EngineConfig,
) -> Result<()> {
    fire_weighted(gbn, pre_places, post_places, probabilities, config, "success_stoch", true)
}

/// Weight the outcome in which transition `i` fails to fire because one of
/// its pre-places is empty by `probabilities[i]`.
pub fn failp(
    gbn: &mut Gbn,
    pre_places: &[Vec<usize>],
    probabilities: &[f64],
    config: &EngineConfig,
) -> Result<()> {
    if pre_places.len() != probabilities.len() {
        return Err(GbnError::InvalidArgument(format!(
            "{} pre-place sets for {} probabilities",
            pre_places.len(),
            probabilities.len()
        )));
    }
    check_mass(probabilities, config)?;

    let places: BTreeSet<usize> = pre_places.iter().flatten().copied().collect();
    let position = bit_positions(&places);
    let size = places.len();
    let mut matrix = Matrix::diagonal(size)?;
    for (pre, &p) in pre_places.iter().zip(probabilities) {
        let involved: BTreeSet<usize> = pre.iter().map(|q| position[q]).collect();
        for x in assignments_with(size, &involved, false) {
            matrix.add(x, x, p)?;
        }
    }
    matrix.set_stochastic(false);

    let places: Vec<usize> = places.into_iter().collect();
    splice_gate(gbn, &places, matrix, "failp", true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::evaluate_gbn;
    use approx::assert_abs_diff_eq;

    fn constants(values: &[bool]) -> Gbn {
        let mut gbn = Gbn::new(0, values.len());
        for (i, &b) in values.iter().enumerate() {
            let s = gbn.add_vertex(Matrix::one_b(b), "1_b");
            let o = gbn.outputs()[i];
            let class = gbn.next_eq_class();
            gbn.add_edge(Port::new(s, 0), Port::new(o, 0), class).unwrap();
        }
        gbn
    }

    #[test]
    fn test_set_fixes_place() {
        let mut gbn = Gbn::uniform_independent(2);
        set(&mut gbn, &[0], true).unwrap();
        gbn.check_integrity().unwrap();
        let m = evaluate_gbn(&gbn).unwrap();
        assert_abs_diff_eq!(m.get(Bits::new(0b01), Bits::ZERO), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(m.get(Bits::new(0b11), Bits::ZERO), 0.5, epsilon = 1e-12);
        assert_eq!(m.get(Bits::new(0b00), Bits::ZERO), 0.0);
    }

    #[test]
    fn test_assert_filters_place() {
        let mut gbn = Gbn::uniform_independent(1);
        assert(&mut gbn, &[0], true).unwrap();
        gbn.check_integrity().unwrap();
        let m = evaluate_gbn(&gbn).unwrap();
        assert_abs_diff_eq!(m.get(Bits::new(1), Bits::ZERO), 0.5, epsilon = 1e-12);
        assert_eq!(m.get(Bits::new(0), Bits::ZERO), 0.0);
    }

    #[test]
    fn test_nassert_blocks_all_ones() {
        let mut gbn = Gbn::uniform_independent(2);
        nassert(&mut gbn, &[0, 1], true).unwrap();
        gbn.check_integrity().unwrap();
        let m = evaluate_gbn(&gbn).unwrap();
        assert_eq!(m.get(Bits::new(0b11), Bits::ZERO), 0.0);
        assert_abs_diff_eq!(m.get(Bits::new(0b10), Bits::ZERO), 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_setp() {
        let mut gbn = constants(&[false]);
        setp(&mut gbn, &[0], 0.3).unwrap();
        let m = evaluate_gbn(&gbn).unwrap();
        assert_abs_diff_eq!(m.get(Bits::new(1), Bits::ZERO), 0.3, epsilon = 1e-12);
        assert!(setp(&mut gbn, &[0], 1.5).is_err());
    }

    #[test]
    fn test_repeated_place_rejected() {
        let mut gbn = Gbn::uniform_independent(2);
        let edges = gbn.edge_count();
        assert!(set(&mut gbn, &[1, 1], false).is_err());
        assert_eq!(gbn.edge_count(), edges);
    }

    #[test]
    fn test_validate_transition() {
        let gbn = constants(&[true, false]);
        assert!(validate_transition(&gbn, &[0], true).unwrap());
        assert!(!validate_transition(&gbn, &[0, 1], true).unwrap());
    }

    #[test]
    fn test_successp_single_enabled_transition() {
        let mut gbn = constants(&[true, false, false]);
        let config = EngineConfig::default();
        // the second transition needs a token on place 1 and is dropped
        successp(
            &mut gbn,
            &[vec![0], vec![1]],
            &[vec![2], vec![0]],
            &[0.5, 0.5],
            &config,
        )
        .unwrap();
        gbn.check_integrity().unwrap();
        let m = evaluate_gbn(&gbn).unwrap();
        assert_abs_diff_eq!(m.get(Bits::new(0b100), Bits::ZERO), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_successp_weighted_choice() {
        let mut gbn = Gbn::independent(&[(0.0, 1.0), (1.0, 0.0), (1.0, 0.0)]);
        let config = EngineConfig::default();
        successp(
            &mut gbn,
            &[vec![0], vec![0]],
            &[vec![1], vec![2]],
            &[0.25, 0.75],
            &config,
        )
        .unwrap();
        gbn.check_integrity().unwrap();
        let m = evaluate_gbn(&gbn).unwrap();
        assert_abs_diff_eq!(m.get(Bits::new(0b010), Bits::ZERO), 0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(m.get(Bits::new(0b100), Bits::ZERO), 0.75, epsilon = 1e-12);
    }

    #[test]
    fn test_probability_mass_rejected_before_mutation() {
        let mut gbn = Gbn::uniform_independent(2);
        let vertices = gbn.vertex_count();
        let err = successp(
            &mut gbn,
            &[vec![0], vec![1]],
            &[vec![1], vec![0]],
            &[0.5, 0.4],
            &EngineConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, GbnError::ProbabilityMass { .. }));
        assert_eq!(gbn.vertex_count(), vertices);
    }

    #[test]
    fn test_success_stoch_renormalizes_columns() {
        let mut gbn = Gbn::uniform_independent(2);
        let config = EngineConfig::default();
        success_stoch(
            &mut gbn,
            &[vec![0], vec![1]],
            &[vec![1], vec![0]],
            &[0.5, 0.5],
            &config,
        )
        .unwrap();
        gbn.check_integrity().unwrap();
        let m = evaluate_gbn(&gbn).unwrap();
        // a single token moves to the other place; two tokens pick a move
        assert_abs_diff_eq!(m.get(Bits::new(0b10), Bits::ZERO), 0.375, epsilon = 1e-12);
        assert_abs_diff_eq!(m.get(Bits::new(0b01), Bits::ZERO), 0.375, epsilon = 1e-12);
        assert_eq!(m.get(Bits::new(0b11), Bits::ZERO), 0.0);
    }

    #[test]
    fn test_failp_weights_empty_pre_places() {
        let mut gbn = Gbn::uniform_independent(2);
        failp(&mut gbn, &[vec![0]], &[1.0], &EngineConfig::default()).unwrap();
        gbn.check_integrity().unwrap();
        let m = evaluate_gbn(&gbn).unwrap();
        assert_abs_diff_eq!(m.get(Bits::new(0b00), Bits::ZERO), 0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(m.get(Bits::new(0b10), Bits::ZERO), 0.25, epsilon = 1e-12);
        assert_eq!(m.get(Bits::new(0b01), Bits::ZERO), 0.0);
    }
}
