//! Property-based tests for evaluation and rewriting.
//!
//! Random small circuits are built from up to two input terminals, sources,
//! noisy copies, deterministic gates, filters and diagonal weights. Node
//! elimination and every rewrite preset must agree with brute-force
//! evaluation.

use gbn_infer::{
    evaluate_gbn, evaluate_stepwise, local_simplification, matrices_equal,
    non_normalizing_simplification, normalize_result, simplification, EliminationStrategy,
    EngineConfig, Gbn, Matrix, MatrixTable, Port,
};
use proptest::prelude::*;

// ============================================================================
// Helper Functions
// ============================================================================

#[derive(Clone, Debug)]
enum GateSpec {
    NoisyCopy { input: usize, p: f64 },
    And { a: usize, b: usize },
    Filter { input: usize, b: bool },
    PairFilter { a: usize, b: usize, bit: bool },
    Constant { b: bool },
    Weight { input: usize, w0: f64, w1: f64 },
    Fork { input: usize, p: f64 },
}

fn gate_strategy() -> impl Strategy<Value = GateSpec> {
    prop_oneof![
        (any::<usize>(), 0.05f64..0.95).prop_map(|(input, p)| GateSpec::NoisyCopy { input, p }),
        (any::<usize>(), any::<usize>()).prop_map(|(a, b)| GateSpec::And { a, b }),
        (any::<usize>(), any::<bool>()).prop_map(|(input, b)| GateSpec::Filter { input, b }),
        (any::<usize>(), any::<usize>(), any::<bool>())
            .prop_map(|(a, b, bit)| GateSpec::PairFilter { a, b, bit }),
        any::<bool>().prop_map(|b| GateSpec::Constant { b }),
        (any::<usize>(), 0.1f64..1.0, 0.1f64..1.0)
            .prop_map(|(input, w0, w1)| GateSpec::Weight { input, w0, w1 }),
        (any::<usize>(), 0.05f64..0.95).prop_map(|(input, p)| GateSpec::Fork { input, p }),
    ]
}

/// Build a circuit with `n_inputs` input terminals and two outputs.
fn build_circuit(n_inputs: usize, sources: &[f64], gates: &[GateSpec]) -> Gbn {
    let mut gbn = Gbn::new(n_inputs, 2);
    let mut ports: Vec<Port> = gbn.inputs().iter().map(|&v| Port::new(v, 0)).collect();
    let mut used: Vec<bool> = vec![false; ports.len()];

    for (i, &p) in sources.iter().enumerate() {
        let v = gbn.add_vertex(Matrix::bernoulli(1.0 - p, p), format!("s_{}", i));
        ports.push(Port::new(v, 0));
        used.push(false);
    }

    fn connect(gbn: &mut Gbn, used: &mut [bool], from: usize, ports: &[Port], to: Port) {
        let class = gbn.next_eq_class();
        gbn.add_edge(ports[from], to, class).unwrap();
        used[from] = true;
    }

    for gate in gates {
        let len = ports.len();
        let (matrix, inputs): (Matrix, Vec<usize>) = match *gate {
            GateSpec::NoisyCopy { input, p } => (
                Matrix::dynamic_from_rows(1, 1, &[vec![1.0 - p, p], vec![p, 1.0 - p]]).unwrap(),
                vec![input % len],
            ),
            GateSpec::And { a, b } => (
                Matrix::dynamic_from_rows(
                    2,
                    1,
                    &[vec![1.0, 1.0, 1.0, 0.0], vec![0.0, 0.0, 0.0, 1.0]],
                )
                .unwrap(),
                vec![a % len, b % len],
            ),
            GateSpec::Filter { input, b } => (Matrix::filter(1, b).unwrap(), vec![input % len]),
            GateSpec::PairFilter { a, b, bit } => {
                (Matrix::filter(2, bit).unwrap(), vec![a % len, b % len])
            }
            GateSpec::Constant { b } => (Matrix::one_b(b), Vec::new()),
            GateSpec::Weight { input, w0, w1 } => (
                Matrix::diagonal_from_values(1, &[w0, w1]).unwrap(),
                vec![input % len],
            ),
            GateSpec::Fork { input, p } => (
                // two outputs: a copy of the input and an independent coin
                Matrix::dynamic_from_rows(
                    1,
                    2,
                    &[
                        vec![1.0 - p, 0.0],
                        vec![0.0, 1.0 - p],
                        vec![p, 0.0],
                        vec![0.0, p],
                    ],
                )
                .unwrap(),
                vec![input % len],
            ),
        };
        let m = matrix.m();
        let v = gbn.add_vertex(matrix, "gate");
        for (i, &from) in inputs.iter().enumerate() {
            connect(&mut gbn, &mut used, from, &ports, Port::new(v, i));
        }
        for j in 0..m {
            ports.push(Port::new(v, j));
            used.push(false);
        }
    }

    let n = ports.len();
    let outputs = [gbn.outputs()[0], gbn.outputs()[1]];
    connect(&mut gbn, &mut used, n - 1, &ports, Port::new(outputs[0], 0));
    connect(&mut gbn, &mut used, n - 2, &ports, Port::new(outputs[1], 0));
    for i in 0..n {
        if !used[i] {
            let t = gbn.add_vertex(Matrix::terminator(), "T");
            connect(&mut gbn, &mut used, i, &ports, Port::new(t, 0));
        }
    }
    gbn.check_integrity().unwrap();
    gbn
}

fn circuit_strategy() -> impl Strategy<Value = Gbn> {
    sized_circuit_strategy(0..3)
}

/// Circuits with at least one input terminal.
fn circuit_with_inputs_strategy() -> impl Strategy<Value = Gbn> {
    sized_circuit_strategy(1..3)
}

fn sized_circuit_strategy(inputs: std::ops::Range<usize>) -> impl Strategy<Value = Gbn> {
    (
        inputs,
        prop::collection::vec(0.05f64..0.95, 2..4),
        prop::collection::vec(gate_strategy(), 1..6),
    )
        .prop_map(|(n_inputs, sources, gates)| build_circuit(n_inputs, &sources, &gates))
}

// ============================================================================
// Evaluation Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: node elimination agrees with brute force for both strategies
    #[test]
    fn stepwise_matches_brute_force(gbn in circuit_strategy(), min_degree in any::<bool>()) {
        let strategy = if min_degree {
            EliminationStrategy::MinDegree
        } else {
            EliminationStrategy::MinWidth
        };
        let config = EngineConfig::default().with_strategy(strategy);
        let brute = evaluate_gbn(&gbn).unwrap();
        let stepwise = evaluate_stepwise(&gbn, &config).unwrap();
        prop_assert!(
            matrices_equal(&brute, &stepwise, 1e-7),
            "{}\nvs\n{}",
            MatrixTable(&brute),
            MatrixTable(&stepwise)
        );
    }

    /// Property: elimination and exact rewrites agree with brute force on
    /// circuits with input terminals
    #[test]
    fn input_wires_survive_elimination_and_rewrites(gbn in circuit_with_inputs_strategy()) {
        prop_assert!(gbn.inputs().len() >= 1);
        let config = EngineConfig::default();
        let brute = evaluate_gbn(&gbn).unwrap();
        prop_assert_eq!(brute.n(), gbn.inputs().len());

        let stepwise = evaluate_stepwise(&gbn, &config).unwrap();
        prop_assert!(matrices_equal(&brute, &stepwise, 1e-7));

        let mut work = gbn.clone();
        non_normalizing_simplification(&mut work, &config, None).unwrap();
        prop_assert!(work.check_integrity().is_ok());
        prop_assert!(matrices_equal(&brute, &evaluate_gbn(&work).unwrap(), 1e-7));
    }

    /// Property: a product of stochastic factors is stochastic
    #[test]
    fn stochastic_flag_matches_factors(gbn in circuit_strategy()) {
        let all_stochastic = gbn
            .inside_vertices()
            .into_iter()
            .all(|v| gbn.matrix(v).unwrap().is_stochastic());
        let m = evaluate_gbn(&gbn).unwrap();
        prop_assert_eq!(m.is_stochastic(), all_stochastic);
        if all_stochastic {
            prop_assert!(gbn_infer::check_stochastic(&m, 1e-9));
        }
    }
}

// ============================================================================
// Rewrite Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: local rules keep the evaluated matrix
    #[test]
    fn local_simplification_is_exact(gbn in circuit_strategy()) {
        let before = evaluate_gbn(&gbn).unwrap();
        let mut work = gbn.clone();
        local_simplification(&mut work, &EngineConfig::default(), None).unwrap();
        prop_assert!(work.check_integrity().is_ok());
        let after = evaluate_gbn(&work).unwrap();
        prop_assert!(matrices_equal(&before, &after, 1e-7));
    }

    /// Property: the non-normalizing preset keeps the evaluated matrix
    #[test]
    fn non_normalizing_simplification_is_exact(gbn in circuit_strategy()) {
        let before = evaluate_gbn(&gbn).unwrap();
        let mut work = gbn.clone();
        let report =
            non_normalizing_simplification(&mut work, &EngineConfig::default(), None).unwrap();
        prop_assert!(report.converged);
        prop_assert!(work.check_integrity().is_ok());
        let after = evaluate_gbn(&work).unwrap();
        prop_assert!(matrices_equal(&before, &after, 1e-7));
    }

    /// Property: the full preset keeps the matrix up to normalization
    #[test]
    fn simplification_preserves_conditional(gbn in circuit_strategy()) {
        let before = normalize_result(&evaluate_gbn(&gbn).unwrap()).unwrap();
        let mut work = gbn.clone();
        simplification(&mut work, &EngineConfig::default(), None).unwrap();
        prop_assert!(work.check_integrity().is_ok());
        let after = normalize_result(&evaluate_gbn(&work).unwrap()).unwrap();
        prop_assert!(matrices_equal(&before, &after, 1e-7));
    }
}
