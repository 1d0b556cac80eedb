//! Bit-indexed conditional probability tables.
//!
//! A matrix of shape `(n, m)` maps an input assignment `from` over `n` wires
//! and an output assignment `to` over `m` wires to the probability
//! `P(to | from)`. Rows are indexed by `to`, columns by `from`.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::bits::{all_assignments, Bits, MAX_PLACES};
use crate::error::{GbnError, Result};

/// Default tolerance for column sums of stochastic matrices.
pub const STOCHASTIC_TOLERANCE: f64 = 1e-5;

/// Discriminant of a [`Matrix`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MatrixKind {
    Dynamic,
    Diagonal,
    F,
    OneB,
    Terminator,
    Zero,
}

impl MatrixKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Dynamic => "dynamic",
            Self::Diagonal => "diagonal",
            Self::F => "F",
            Self::OneB => "one-b",
            Self::Terminator => "terminator",
            Self::Zero => "zero",
        }
    }
}

/// General sparse table; unspecified entries are zero.
#[derive(Clone, Debug, PartialEq)]
pub struct DynamicMatrix {
    n: usize,
    m: usize,
    entries: HashMap<(Bits, Bits), f64>,
    stochastic: bool,
}

impl DynamicMatrix {
    fn get(&self, to: Bits, from: Bits) -> f64 {
        self.entries.get(&(to, from)).copied().unwrap_or(0.0)
    }

    fn set(&mut self, to: Bits, from: Bits, val: f64) {
        if val == 0.0 {
            self.entries.remove(&(to, from));
        } else {
            self.entries.insert((to, from), val);
        }
    }

    fn add(&mut self, to: Bits, from: Bits, val: f64) {
        let sum = self.get(to, from) + val;
        self.set(to, from, sum);
    }
}

/// Square matrix whose only non-zero entries satisfy `to == from`.
#[derive(Clone, Debug, PartialEq)]
pub struct DiagonalMatrix {
    k: usize,
    entries: HashMap<Bits, f64>,
    stochastic: bool,
}

impl DiagonalMatrix {
    fn get(&self, to: Bits, from: Bits) -> f64 {
        if to != from {
            return 0.0;
        }
        self.entries.get(&to).copied().unwrap_or(0.0)
    }

    fn set(&mut self, to: Bits, val: f64) {
        if val == 0.0 {
            self.entries.remove(&to);
        } else {
            self.entries.insert(to, val);
        }
    }

    /// Number of explicitly stored (non-zero) diagonal values.
    pub fn stored_len(&self) -> usize {
        self.entries.len()
    }
}

/// A factor of the network.
#[derive(Clone, Debug, PartialEq)]
pub enum Matrix {
    Dynamic(DynamicMatrix),
    Diagonal(DiagonalMatrix),
    /// Filter gate: identity on `k` wires except that the all-`b` assignment
    /// (all ones for `b = true`, all zeros for `b = false`) is blocked.
    F { k: usize, b: bool },
    /// Source without inputs producing the constant bit `b`.
    OneB(bool),
    /// Sink consuming one wire without constraining it.
    Terminator,
    /// Impossible branch.
    Zero { n: usize, m: usize },
}

fn check_dimensions(n: usize, m: usize) -> Result<()> {
    if n > MAX_PLACES || m > MAX_PLACES {
        return Err(GbnError::DimensionOverflow {
            n,
            m,
            max: MAX_PLACES,
        });
    }
    Ok(())
}

impl Matrix {
    /// Empty dynamic matrix. Claims to be stochastic until told otherwise.
    pub fn dynamic(n: usize, m: usize) -> Result<Self> {
        check_dimensions(n, m)?;
        Ok(Self::Dynamic(DynamicMatrix {
            n,
            m,
            entries: HashMap::new(),
            stochastic: true,
        }))
    }

    /// Dynamic matrix filled from dense rows: `rows[to][from]`.
    pub fn dynamic_from_rows(n: usize, m: usize, rows: &[Vec<f64>]) -> Result<Self> {
        let mut matrix = Self::dynamic(n, m)?;
        if rows.len() as u128 != 1u128 << m {
            return Err(GbnError::InvalidArgument(format!(
                "expected {} rows, got {}",
                1u128 << m,
                rows.len()
            )));
        }
        for (i_row, row) in rows.iter().enumerate() {
            if row.len() as u128 != 1u128 << n {
                return Err(GbnError::InvalidArgument(format!(
                    "row {} has {} columns, expected {}",
                    i_row,
                    row.len(),
                    1u128 << n
                )));
            }
            for (i_col, &val) in row.iter().enumerate() {
                matrix.set(Bits::new(i_row as u64), Bits::new(i_col as u64), val)?;
            }
        }
        matrix.refresh_stochastic(STOCHASTIC_TOLERANCE);
        Ok(matrix)
    }

    /// Source distribution `(P(0), P(1))` without inputs.
    pub fn bernoulli(p0: f64, p1: f64) -> Self {
        let mut entries = HashMap::new();
        if p0 != 0.0 {
            entries.insert((Bits::new(0), Bits::ZERO), p0);
        }
        if p1 != 0.0 {
            entries.insert((Bits::new(1), Bits::ZERO), p1);
        }
        Self::Dynamic(DynamicMatrix {
            n: 0,
            m: 1,
            entries,
            stochastic: ((p0 + p1) - 1.0).abs() <= STOCHASTIC_TOLERANCE,
        })
    }

    /// Empty diagonal matrix over `k` wires.
    pub fn diagonal(k: usize) -> Result<Self> {
        check_dimensions(k, k)?;
        Ok(Self::Diagonal(DiagonalMatrix {
            k,
            entries: HashMap::new(),
            stochastic: false,
        }))
    }

    /// Diagonal matrix from its `2^k` diagonal values.
    pub fn diagonal_from_values(k: usize, values: &[f64]) -> Result<Self> {
        let mut matrix = Self::diagonal(k)?;
        if values.len() as u128 != 1u128 << k {
            return Err(GbnError::InvalidArgument(format!(
                "expected {} diagonal values, got {}",
                1u128 << k,
                values.len()
            )));
        }
        for (i, &val) in values.iter().enumerate() {
            let x = Bits::new(i as u64);
            matrix.set(x, x, val)?;
        }
        matrix.refresh_stochastic(STOCHASTIC_TOLERANCE);
        Ok(matrix)
    }

    pub fn filter(k: usize, b: bool) -> Result<Self> {
        check_dimensions(k, k)?;
        Ok(Self::F { k, b })
    }

    pub fn one_b(b: bool) -> Self {
        Self::OneB(b)
    }

    pub fn terminator() -> Self {
        Self::Terminator
    }

    pub fn zero(n: usize, m: usize) -> Result<Self> {
        check_dimensions(n, m)?;
        Ok(Self::Zero { n, m })
    }

    pub fn kind(&self) -> MatrixKind {
        match self {
            Self::Dynamic(_) => MatrixKind::Dynamic,
            Self::Diagonal(_) => MatrixKind::Diagonal,
            Self::F { .. } => MatrixKind::F,
            Self::OneB(_) => MatrixKind::OneB,
            Self::Terminator => MatrixKind::Terminator,
            Self::Zero { .. } => MatrixKind::Zero,
        }
    }

    /// Number of input wires.
    pub fn n(&self) -> usize {
        match self {
            Self::Dynamic(d) => d.n,
            Self::Diagonal(d) => d.k,
            Self::F { k, .. } => *k,
            Self::OneB(_) => 0,
            Self::Terminator => 1,
            Self::Zero { n, .. } => *n,
        }
    }

    /// Number of output wires.
    pub fn m(&self) -> usize {
        match self {
            Self::Dynamic(d) => d.m,
            Self::Diagonal(d) => d.k,
            Self::F { k, .. } => *k,
            Self::OneB(_) => 1,
            Self::Terminator => 0,
            Self::Zero { m, .. } => *m,
        }
    }

    /// Cached claim that every column sums to one.
    pub fn is_stochastic(&self) -> bool {
        match self {
            Self::Dynamic(d) => d.stochastic,
            Self::Diagonal(d) => d.stochastic,
            Self::F { .. } | Self::Zero { .. } => false,
            Self::OneB(_) | Self::Terminator => true,
        }
    }

    /// Overwrite the cached stochastic flag. Fixed variants ignore the call.
    pub fn set_stochastic(&mut self, stochastic: bool) {
        match self {
            Self::Dynamic(d) => d.stochastic = stochastic,
            Self::Diagonal(d) => d.stochastic = stochastic,
            _ => {}
        }
    }

    /// Recompute the stochastic flag from the entries.
    pub fn refresh_stochastic(&mut self, tolerance: f64) {
        let stochastic = check_stochastic(self, tolerance);
        self.set_stochastic(stochastic);
    }

    /// Filter or diagonal gate: output bits always equal input bits.
    pub fn is_filter_like(&self) -> bool {
        matches!(self, Self::F { .. } | Self::Diagonal(_))
    }

    pub fn get(&self, to: Bits, from: Bits) -> f64 {
        match self {
            Self::Dynamic(d) => d.get(to, from),
            Self::Diagonal(d) => d.get(to, from),
            Self::F { k, b } => {
                if to != from {
                    return 0.0;
                }
                let blocked = if *b {
                    to.is_all_ones(*k)
                } else {
                    to.truncate(*k).is_none()
                };
                if blocked {
                    0.0
                } else {
                    1.0
                }
            }
            Self::OneB(b) => {
                if to.get(0) == *b {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Terminator => 1.0,
            Self::Zero { .. } => 0.0,
        }
    }

    pub fn set(&mut self, to: Bits, from: Bits, val: f64) -> Result<()> {
        match self {
            Self::Dynamic(d) => {
                d.set(to, from, val);
                Ok(())
            }
            Self::Diagonal(d) => {
                if to != from {
                    return Err(GbnError::InvalidArgument(format!(
                        "off-diagonal entry ({}, {}) of a diagonal matrix",
                        to, from
                    )));
                }
                d.set(to, val);
                Ok(())
            }
            other => Err(GbnError::UnsupportedMutation {
                kind: other.kind().name(),
            }),
        }
    }

    pub fn add(&mut self, to: Bits, from: Bits, val: f64) -> Result<()> {
        match self {
            Self::Dynamic(d) => {
                d.add(to, from, val);
                Ok(())
            }
            Self::Diagonal(_) => {
                let sum = self.get(to, from) + val;
                self.set(to, from, sum)
            }
            other => Err(GbnError::UnsupportedMutation {
                kind: other.kind().name(),
            }),
        }
    }

    /// All non-zero entries as `(to, from, value)`.
    ///
    /// Sparse variants only report stored entries; fixed variants are enumerated.
    pub fn nonzero_entries(&self) -> Vec<(Bits, Bits, f64)> {
        match self {
            Self::Dynamic(d) => d
                .entries
                .iter()
                .filter(|(_, &v)| v != 0.0)
                .map(|(&(to, from), &v)| (to, from, v))
                .collect(),
            Self::Diagonal(d) => d
                .entries
                .iter()
                .filter(|(_, &v)| v != 0.0)
                .map(|(&x, &v)| (x, x, v))
                .collect(),
            Self::F { k, .. } => all_assignments(*k)
                .filter_map(|x| {
                    let v = self.get(x, x);
                    (v != 0.0).then_some((x, x, v))
                })
                .collect(),
            Self::OneB(b) => vec![(Bits::ZERO.with(0, *b), Bits::ZERO, 1.0)],
            Self::Terminator => vec![
                (Bits::ZERO, Bits::new(0), 1.0),
                (Bits::ZERO, Bits::new(1), 1.0),
            ],
            Self::Zero { .. } => Vec::new(),
        }
    }

    /// Short human readable name used as default vertex label.
    pub fn label(&self) -> String {
        match self {
            Self::Dynamic(_) => "dynamic".to_string(),
            Self::Diagonal(_) => "diagonal".to_string(),
            Self::F { k, b } => format!("F_{{{},{}}}", k, u8::from(*b)),
            Self::OneB(b) => format!("1_{}", u8::from(*b)),
            Self::Terminator => "T".to_string(),
            Self::Zero { .. } => "0".to_string(),
        }
    }

    /// Convert to an equivalent dynamic matrix.
    pub fn to_dynamic(&self) -> Result<Matrix> {
        let mut out = Matrix::dynamic(self.n(), self.m())?;
        for (to, from, v) in self.nonzero_entries() {
            out.set(to, from, v)?;
        }
        out.set_stochastic(self.is_stochastic());
        Ok(out)
    }
}

/// Exhaustive check that every input column sums to one within `tolerance`.
pub fn check_stochastic(matrix: &Matrix, tolerance: f64) -> bool {
    match matrix {
        Matrix::OneB(_) | Matrix::Terminator => true,
        Matrix::Zero { .. } => false,
        Matrix::F { .. } => false,
        _ => {
            let mut column_sums: HashMap<Bits, f64> = HashMap::new();
            for (_, from, v) in matrix.nonzero_entries() {
                *column_sums.entry(from).or_insert(0.0) += v;
            }
            if (column_sums.len() as u128) < (1u128 << matrix.n()) {
                return false;
            }
            column_sums
                .values()
                .all(|sum| (1.0 - sum).abs() <= tolerance)
        }
    }
}

/// Rescale every non-zero column of a sparse matrix to sum to one.
///
/// The stochastic flag is recomputed with `tolerance`; a matrix with an
/// all-zero column stays substochastic.
pub fn normalize_columns(matrix: &mut Matrix, tolerance: f64) -> Result<()> {
    let entries = matrix.nonzero_entries();
    let mut column_sums: HashMap<Bits, f64> = HashMap::new();
    for &(_, from, v) in &entries {
        *column_sums.entry(from).or_insert(0.0) += v;
    }
    for (to, from, v) in entries {
        let sum = column_sums[&from];
        if sum > 0.0 {
            matrix.set(to, from, v / sum)?;
        }
    }
    matrix.refresh_stochastic(tolerance);
    Ok(())
}

/// Entry-wise comparison of two matrices of equal shape.
pub fn matrices_equal(a: &Matrix, b: &Matrix, tolerance: f64) -> bool {
    if a.n() != b.n() || a.m() != b.m() {
        return false;
    }
    let mut keys: BTreeSet<(Bits, Bits)> = BTreeSet::new();
    keys.extend(a.nonzero_entries().into_iter().map(|(t, f, _)| (t, f)));
    keys.extend(b.nonzero_entries().into_iter().map(|(t, f, _)| (t, f)));
    keys.into_iter()
        .all(|(to, from)| (a.get(to, from) - b.get(to, from)).abs() <= tolerance)
}

/// Display adapter rendering a matrix as a table (inputs as columns).
pub struct MatrixTable<'a>(pub &'a Matrix);

impl fmt::Display for MatrixTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let matrix = self.0;
        let (n, m) = (matrix.n(), matrix.m());
        writeln!(f, "n: {} m: {}", n, m)?;

        write!(f, "{:width$}", "", width = m + 3)?;
        for from in all_assignments(n) {
            write!(f, "{:>6} ", from.to_bit_string(n))?;
        }
        writeln!(f)?;

        for to in all_assignments(m) {
            write!(f, "{} | ", to.to_bit_string(m))?;
            for from in all_assignments(n) {
                write!(f, "{:>6.4} ", matrix.get(to, from))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
