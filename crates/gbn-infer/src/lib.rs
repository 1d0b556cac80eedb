//! Exact inference and algebraic simplification for Generalized Bayesian Networks.
//!
//! A GBN is a directed acyclic circuit of factor vertices, each carrying a
//! bit-indexed conditional probability table ([`Matrix`]). Evaluating the
//! circuit marginalizes every internal wire and yields one matrix mapping
//! input assignments to output assignments.
//!
//! # Core Concepts
//!
//! - **Matrices**: dynamic tables plus compact special forms (diagonal
//!   weights, filter gates, constants, terminators, zero)
//! - **Wires**: edges sharing a value; wires behind filter gates are slaved to
//!   an upstream wire and never enumerated
//! - **Node elimination**: fold neighborhoods into single factors to keep the
//!   enumerated width small
//! - **Simplification**: semantics-preserving graph rewrites run to a fixed point
//!
//! # Architecture
//!
//! ```text
//! Gbn ──► SubGbn ──► WireStructure ──► evaluate ──► Matrix
//!  │                                      ▲
//!  ├──► simplification (rules) ───────────┤
//!  └──► elimination (merge pairs) ────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use gbn_infer::{evaluate_stepwise, gates, Bits, EngineConfig, Gbn};
//!
//! let mut gbn = Gbn::uniform_independent(2);
//! gates::nassert(&mut gbn, &[0, 1], true).unwrap();
//! let m = evaluate_stepwise(&gbn, &EngineConfig::default()).unwrap();
//! assert_eq!(m.get(Bits::new(0b11), Bits::ZERO), 0.0);
//! ```

mod bits;
mod config;
mod elimination;
mod error;
mod evaluation;
pub mod gates;
mod graph;
#[cfg(feature = "structured-logging")]
pub mod logging;
mod matrix;
mod matrix_io;
pub mod simplification;
mod subgbn;
mod wires;

pub use bits::{all_assignments, assignment_count, Bits, MAX_PLACES};
pub use config::{EliminationStrategy, EngineConfig, CONFIG_ENV_VAR};
pub use elimination::{
    boundary_width, convex_closure, eliminate_all, elimination_width, evaluate_specific_place,
    evaluate_stepwise, merge_vertices, node_elimination, path_closing, select_pair,
};
pub use error::{GbnError, Result};
pub use evaluation::{
    column_mass, evaluate, evaluate_gbn, normalize_result, ProbabilityBookkeeper,
};
pub use graph::{Edge, EdgeId, Gbn, Port, VertexId, VertexKind};
pub use matrix::{
    check_stochastic, matrices_equal, normalize_columns, DiagonalMatrix, DynamicMatrix, Matrix,
    MatrixKind, MatrixTable, STOCHASTIC_TOLERANCE,
};
pub use matrix_io::{agree_everywhere, parse_matrices, parse_matrix, parse_probability};
pub use simplification::{
    local_simplification, non_normalizing_simplification, simplification, simplify_with, Rule,
    SimplificationReport,
};
pub use subgbn::SubGbn;
pub use wires::{VertexBit, Wire, WireStructure};
