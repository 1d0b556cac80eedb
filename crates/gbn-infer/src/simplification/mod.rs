//! Graph rewriting to a fixed point.
//!
//! A driver pass visits every factor once and applies the first rule of its
//! list that changes something there. Passes repeat until one changes nothing
//! or [`EngineConfig::max_simplification_passes`] is reached.
//!
//! The rule lists [`SIMPLIFICATION_RULES`] and [`LOCAL_RULES`] preserve the
//! evaluated matrix exactly, except that the full list renormalizes
//! substochastic sources; [`NON_NORMALIZING_RULES`] never does.

pub mod global;
pub mod local;

use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, trace, warn};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::graph::{Gbn, VertexId};

/// A single rewrite rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Rule {
    /// Drop redundant terminators.
    CoUnit,
    /// Copy a constant source per consumer.
    F1,
    /// Drop stochastic factors whose outputs are all discarded.
    F2,
    /// Route consumers of a filter input through the filter.
    F3,
    /// Constant into a filter blocking that constant.
    F4,
    /// Constant into a filter blocking the other value.
    F5,
    ReduceDiagonal,
    SplitMultipleOutputs,
    DuplicateInputs,
    MergeFilters,
    EliminateStochasticWithoutOutputs,
    SwitchSubstochToFront,
    NormalizeSubstochFront,
}

impl Rule {
    pub fn name(self) -> &'static str {
        match self {
            Rule::CoUnit => "co_unit",
            Rule::F1 => "f1",
            Rule::F2 => "f2",
            Rule::F3 => "f3",
            Rule::F4 => "f4",
            Rule::F5 => "f5",
            Rule::ReduceDiagonal => "reduce_diagonal",
            Rule::SplitMultipleOutputs => "split_multiple_outputs",
            Rule::DuplicateInputs => "duplicate_inputs",
            Rule::MergeFilters => "merge_filters",
            Rule::EliminateStochasticWithoutOutputs => "eliminate_stochastic_without_outputs",
            Rule::SwitchSubstochToFront => "switch_substoch_to_front",
            Rule::NormalizeSubstochFront => "normalize_substoch_front",
        }
    }

    /// Whether the rule may rescale the circuit's matrix.
    pub fn is_normalizing(self) -> bool {
        matches!(self, Rule::NormalizeSubstochFront)
    }

    /// Try the rule at `v`; returns whether the graph changed.
    pub fn apply(self, gbn: &mut Gbn, v: VertexId, config: &EngineConfig) -> Result<bool> {
        if !gbn.is_node(v) {
            return Ok(false);
        }
        match self {
            Rule::CoUnit => local::co_unit(gbn, v),
            Rule::F1 => local::f1(gbn, v),
            Rule::F2 => local::f2(gbn, v),
            Rule::F3 => local::f3(gbn, v),
            Rule::F4 => local::f4(gbn, v),
            Rule::F5 => local::f5(gbn, v),
            Rule::ReduceDiagonal => local::reduce_diagonal(gbn, v, config),
            Rule::SplitMultipleOutputs => local::split_multiple_outputs(gbn, v, config),
            Rule::DuplicateInputs => local::duplicate_inputs(gbn, v),
            Rule::MergeFilters => global::merge_filters(gbn, v, config),
            Rule::EliminateStochasticWithoutOutputs => {
                global::eliminate_stochastic_without_outputs(gbn, v, config)
            }
            Rule::SwitchSubstochToFront => global::switch_substoch_to_front(gbn, v, config),
            Rule::NormalizeSubstochFront => global::normalize_substoch_front(gbn, v, config),
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Full rule list, including renormalization of substochastic sources.
pub const SIMPLIFICATION_RULES: &[Rule] = &[
    Rule::CoUnit,
    Rule::F1,
    Rule::F2,
    Rule::F3,
    Rule::F4,
    Rule::F5,
    Rule::ReduceDiagonal,
    Rule::SplitMultipleOutputs,
    Rule::DuplicateInputs,
    Rule::EliminateStochasticWithoutOutputs,
    Rule::SwitchSubstochToFront,
    Rule::NormalizeSubstochFront,
];

/// Full rule list without the rules that rescale the circuit.
pub const NON_NORMALIZING_RULES: &[Rule] = &[
    Rule::CoUnit,
    Rule::F1,
    Rule::F2,
    Rule::F3,
    Rule::F4,
    Rule::F5,
    Rule::SplitMultipleOutputs,
    Rule::DuplicateInputs,
    Rule::EliminateStochasticWithoutOutputs,
    Rule::SwitchSubstochToFront,
];

/// Rules that only look at a vertex and its direct neighbors.
pub const LOCAL_RULES: &[Rule] = &[
    Rule::CoUnit,
    Rule::F1,
    Rule::F2,
    Rule::F3,
    Rule::F4,
    Rule::F5,
    Rule::ReduceDiagonal,
    Rule::DuplicateInputs,
];

/// Outcome of a simplification run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SimplificationReport {
    pub passes: usize,
    pub applied: BTreeMap<Rule, usize>,
    /// False if the pass limit stopped the run before a fixed point.
    pub converged: bool,
}

impl SimplificationReport {
    pub fn total_rewrites(&self) -> usize {
        self.applied.values().sum()
    }

    pub fn count(&self, rule: Rule) -> usize {
        self.applied.get(&rule).copied().unwrap_or(0)
    }
}

/// Callback invoked after every successful rewrite.
pub type Observer<'a> = Option<&'a mut dyn FnMut(&Gbn, Rule)>;

/// Apply `rules` until nothing changes.
pub fn simplify_with(
    gbn: &mut Gbn,
    rules: &[Rule],
    config: &EngineConfig,
    mut observer: Observer<'_>,
) -> Result<SimplificationReport> {
    let mut report = SimplificationReport::default();

    loop {
        if report.passes >= config.max_simplification_passes {
            warn!(
                passes = report.passes,
                rewrites = report.total_rewrites(),
                "simplification stopped before reaching a fixed point"
            );
            return Ok(report);
        }
        report.passes += 1;

        let mut changed = false;
        for v in gbn.inside_vertices() {
            for &rule in rules {
                if rule.apply(gbn, v, config)? {
                    trace!(rule = rule.name(), vertex = %v, "rewrite applied");
                    *report.applied.entry(rule).or_insert(0) += 1;
                    if let Some(observer) = observer.as_deref_mut() {
                        observer(gbn, rule);
                    }
                    changed = true;
                    break;
                }
            }
        }
        if !changed {
            break;
        }
    }

    report.converged = true;
    debug!(
        passes = report.passes,
        rewrites = report.total_rewrites(),
        vertices = gbn.inside_vertices().len(),
        "simplification finished"
    );
    Ok(report)
}

/// Run [`SIMPLIFICATION_RULES`].
pub fn simplification(
    gbn: &mut Gbn,
    config: &EngineConfig,
    observer: Observer<'_>,
) -> Result<SimplificationReport> {
    simplify_with(gbn, SIMPLIFICATION_RULES, config, observer)
}

/// Run [`NON_NORMALIZING_RULES`].
pub fn non_normalizing_simplification(
    gbn: &mut Gbn,
    config: &EngineConfig,
    observer: Observer<'_>,
) -> Result<SimplificationReport> {
    simplify_with(gbn, NON_NORMALIZING_RULES, config, observer)
}

/// Run [`LOCAL_RULES`].
pub fn local_simplification(
    gbn: &mut Gbn,
    config: &EngineConfig,
    observer: Observer<'_>,
) -> Result<SimplificationReport> {
    simplify_with(gbn, LOCAL_RULES, config, observer)
}
