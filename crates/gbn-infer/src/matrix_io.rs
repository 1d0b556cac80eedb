//! Text format for matrices.
//!
//! ```text
//! dynamic <n> <m> [<row>;<row>;...]   rows by output assignment, columns by input assignment
//! diagonal <k> [<v0>,<v1>,...]
//! F_{k,b}
//! 1_b
//! T
//! 0_{n,m}
//! ```
//!
//! Probabilities accept decimal literals or `a/b` rationals.

use std::fmt;
use std::str::FromStr;

use crate::bits::{all_assignments, Bits};
use crate::error::{GbnError, Result};
use crate::matrix::{Matrix, STOCHASTIC_TOLERANCE};

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matrix::Dynamic(_) => {
                let (n, m) = (self.n(), self.m());
                write!(f, "dynamic {} {} [", n, m)?;
                for (i_row, to) in all_assignments(m).enumerate() {
                    if i_row > 0 {
                        write!(f, ";")?;
                    }
                    for (i_col, from) in all_assignments(n).enumerate() {
                        if i_col > 0 {
                            write!(f, ",")?;
                        }
                        write!(f, "{}", self.get(to, from))?;
                    }
                }
                write!(f, "]")
            }
            Matrix::Diagonal(_) => {
                let k = self.n();
                write!(f, "diagonal {} [", k)?;
                for (i, x) in all_assignments(k).enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", self.get(x, x))?;
                }
                write!(f, "]")
            }
            Matrix::F { k, b } => write!(f, "F_{{{},{}}}", k, u8::from(*b)),
            Matrix::OneB(b) => write!(f, "1_{}", u8::from(*b)),
            Matrix::Terminator => write!(f, "T"),
            Matrix::Zero { n, m } => write!(f, "0_{{{},{}}}", n, m),
        }
    }
}

impl FromStr for Matrix {
    type Err = GbnError;

    fn from_str(s: &str) -> Result<Self> {
        parse_line(s, 1)
    }
}

/// Parse the first non-empty line of `text` as a matrix.
pub fn parse_matrix(text: &str) -> Result<Matrix> {
    text.lines()
        .enumerate()
        .find(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| parse_line(line, i + 1))
        .unwrap_or_else(|| Err(GbnError::parse(1, "no matrix found in empty input")))
}

/// Parse one matrix per non-empty line.
pub fn parse_matrices(text: &str) -> Result<Vec<Matrix>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| parse_line(line, i + 1))
        .collect()
}

/// Read a probability literal: decimal (`0.25`) or rational (`1/4`).
pub fn parse_probability(s: &str) -> std::result::Result<f64, String> {
    let s = s.trim();
    match s.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num
                .trim()
                .parse()
                .map_err(|_| format!("invalid numerator '{}'", num))?;
            let den: f64 = den
                .trim()
                .parse()
                .map_err(|_| format!("invalid denominator '{}'", den))?;
            if den == 0.0 {
                return Err(format!("zero denominator in '{}'", s));
            }
            Ok(num / den)
        }
        None => s
            .parse()
            .map_err(|_| format!("invalid probability '{}'", s)),
    }
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() >= prefix.len()
        && s.is_char_boundary(prefix.len())
        && s[..prefix.len()].eq_ignore_ascii_case(prefix)
    {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

fn parse_usize(s: &str, what: &str, line: usize) -> Result<usize> {
    s.trim()
        .parse()
        .map_err(|_| GbnError::parse(line, format!("invalid {} '{}'", what, s.trim())))
}

/// Splits `"<a> <b> ... [body]"` into the header words and the bracket body.
fn split_header_body(rest: &str, line: usize) -> Result<(Vec<&str>, Option<&str>)> {
    match rest.find('[') {
        Some(open) => {
            let header = rest[..open].split_whitespace().collect();
            let body = rest[open + 1..]
                .trim_end()
                .strip_suffix(']')
                .ok_or_else(|| GbnError::parse(line, "missing closing ']'"))?;
            Ok((header, Some(body.trim())))
        }
        None => Ok((rest.split_whitespace().collect(), None)),
    }
}

/// Splits `"{a,b}"` or `"a,b"` into two numbers.
fn parse_pair(rest: &str, line: usize) -> Result<(usize, usize)> {
    let inner = rest.trim();
    let inner = inner.strip_prefix('{').unwrap_or(inner);
    let inner = inner.strip_suffix('}').unwrap_or(inner);
    let (a, b) = inner
        .split_once(',')
        .ok_or_else(|| GbnError::parse(line, format!("expected two indices in '{}'", rest)))?;
    Ok((parse_usize(a, "index", line)?, parse_usize(b, "index", line)?))
}

fn parse_bit(s: &str, line: usize) -> Result<bool> {
    match s.trim() {
        "0" => Ok(false),
        "1" => Ok(true),
        other => Err(GbnError::parse(line, format!("'{}' is not a bit", other))),
    }
}

fn with_line(err: GbnError, line: usize) -> GbnError {
    match err {
        GbnError::Parse { .. } | GbnError::DimensionOverflow { .. } => err,
        other => GbnError::parse(line, other.to_string()),
    }
}

fn parse_line(raw: &str, line: usize) -> Result<Matrix> {
    let s = raw.trim();

    if let Some(rest) = strip_prefix_ignore_case(s, "dynamic") {
        return parse_dynamic(rest, line);
    }
    if let Some(rest) = strip_prefix_ignore_case(s, "diagonal") {
        return parse_diagonal(rest, line);
    }
    if let Some(rest) = strip_prefix_ignore_case(s, "F_") {
        let (k, b) = parse_pair(rest, line)?;
        let b = match b {
            0 => false,
            1 => true,
            other => return Err(GbnError::parse(line, format!("'{}' is not a bit", other))),
        };
        return Matrix::filter(k, b);
    }
    if let Some(rest) = s.strip_prefix("1_") {
        let rest = rest.trim();
        let rest = rest.strip_prefix('{').unwrap_or(rest);
        let rest = rest.strip_suffix('}').unwrap_or(rest);
        return Ok(Matrix::one_b(parse_bit(rest, line)?));
    }
    if let Some(rest) = s.strip_prefix("0_") {
        let (n, m) = parse_pair(rest, line)?;
        return Matrix::zero(n, m);
    }
    if s.eq_ignore_ascii_case("T") {
        return Ok(Matrix::terminator());
    }

    Err(GbnError::parse(line, format!("unrecognized matrix '{}'", s)))
}

fn parse_dynamic(rest: &str, line: usize) -> Result<Matrix> {
    let (header, body) = split_header_body(rest, line)?;
    if header.len() != 2 {
        return Err(GbnError::parse(line, "expected 'dynamic <n> <m> [...]'"));
    }
    let n = parse_usize(header[0], "input count", line)?;
    let m = parse_usize(header[1], "output count", line)?;
    let mut matrix = Matrix::dynamic(n, m)?;

    if let Some(body) = body.filter(|b| !b.is_empty()) {
        let rows: Vec<&str> = body.split(';').collect();
        if rows.len() as u128 != 1u128 << m {
            return Err(GbnError::parse(
                line,
                format!("{} rows given, expected {}", rows.len(), 1u128 << m),
            ));
        }
        for (to, row) in all_assignments(m).zip(rows) {
            let values: Vec<&str> = row.trim_matches(|c| c == ' ' || c == ',').split(',').collect();
            if values.len() as u128 != 1u128 << n {
                return Err(GbnError::parse(
                    line,
                    format!(
                        "row {} has {} columns, expected {}",
                        to.value(),
                        values.len(),
                        1u128 << n
                    ),
                ));
            }
            for (from, value) in all_assignments(n).zip(values) {
                let p = parse_probability(value).map_err(|e| GbnError::parse(line, e))?;
                matrix.set(to, from, p).map_err(|e| with_line(e, line))?;
            }
        }
    }

    matrix.refresh_stochastic(STOCHASTIC_TOLERANCE);
    Ok(matrix)
}

fn parse_diagonal(rest: &str, line: usize) -> Result<Matrix> {
    let (header, body) = split_header_body(rest, line)?;
    if header.len() != 1 {
        return Err(GbnError::parse(line, "expected 'diagonal <k> [...]'"));
    }
    let k = parse_usize(header[0], "dimension", line)?;
    let mut matrix = Matrix::diagonal(k)?;

    if let Some(body) = body.filter(|b| !b.is_empty()) {
        let values: Vec<&str> = body.split(',').collect();
        if values.len() as u128 != 1u128 << k {
            return Err(GbnError::parse(
                line,
                format!("{} values given, expected {}", values.len(), 1u128 << k),
            ));
        }
        for (x, value) in all_assignments(k).zip(values) {
            let p = parse_probability(value).map_err(|e| GbnError::parse(line, e))?;
            matrix.set(x, x, p).map_err(|e| with_line(e, line))?;
        }
    }

    matrix.refresh_stochastic(STOCHASTIC_TOLERANCE);
    Ok(matrix)
}

/// Compare two matrices on every `(to, from)` pair of their shape.
///
/// Exhaustive over `2^(n+m)` entries; intended for small matrices.
pub fn agree_everywhere(a: &Matrix, b: &Matrix) -> bool {
    if a.n() != b.n() || a.m() != b.m() {
        return false;
    }
    all_assignments(a.m()).all(|to: Bits| {
        all_assignments(a.n()).all(|from| a.get(to, from) == b.get(to, from))
    })
}
