#![forbid(unsafe_code)]

//! JSON problem and solution files. Numbers are strings so that values such as `0.1`
//! or `1/3` load exactly.

use anyhow::{anyhow, Context, Result};
use irlp_core::problem::{Column, LinearProgram, ObjSense, Row, SparseVector};
use irlp_core::rational::{format_rational, parse_rational, ExactInfinity, Rational};
use irlp_core::solution::{Solution, Status};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

fn zero() -> String {
    "0".into()
}

fn pos_inf() -> String {
    "inf".into()
}

fn neg_inf() -> String {
    "-inf".into()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonCol {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default = "zero")]
    pub obj: String,
    #[serde(default = "zero")]
    pub lower: String,
    #[serde(default = "pos_inf")]
    pub upper: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default = "neg_inf")]
    pub lhs: String,
    /// `(column index, coefficient)` pairs.
    pub coeffs: Vec<(usize, String)>,
    #[serde(default = "pos_inf")]
    pub rhs: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonProblem {
    #[serde(default)]
    pub sense: ObjSense,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<String>,
    pub cols: Vec<JsonCol>,
    #[serde(default)]
    pub rows: Vec<JsonRow>,
}

fn number(text: &str, inf: &ExactInfinity, what: &str) -> Result<Rational> {
    parse_rational(text, inf).with_context(|| format!("invalid number for {what}"))
}

fn text(value: &Rational, inf: &ExactInfinity) -> String {
    if inf.is_pos_infinite(value) {
        pos_inf()
    } else if inf.is_neg_infinite(value) {
        neg_inf()
    } else {
        format_rational(value)
    }
}

impl JsonProblem {
    pub fn to_lp(&self, inf: &ExactInfinity) -> Result<LinearProgram<Rational>> {
        let mut lp = LinearProgram::new(self.sense);
        if let Some(offset) = &self.offset {
            lp.set_obj_offset(number(offset, inf, "objective offset")?);
        }
        for (j, col) in self.cols.iter().enumerate() {
            let label = col.name.clone().unwrap_or_else(|| format!("column {j}"));
            lp.add_col(Column::new(
                number(&col.obj, inf, &label)?,
                SparseVector::new(),
                number(&col.lower, inf, &label)?,
                number(&col.upper, inf, &label)?,
            ))
            .with_context(|| format!("failed to add {label}"))?;
        }
        for (i, row) in self.rows.iter().enumerate() {
            let label = row.name.clone().unwrap_or_else(|| format!("row {i}"));
            let coeffs = row
                .coeffs
                .iter()
                .map(|(j, v)| Ok((*j, number(v, inf, &label)?)))
                .collect::<Result<SparseVector<Rational>>>()?;
            lp.add_row(Row::new(
                number(&row.lhs, inf, &label)?,
                coeffs,
                number(&row.rhs, inf, &label)?,
            ))
            .with_context(|| format!("failed to add {label}"))?;
        }
        lp.validate().context("problem validation failed")?;
        Ok(lp)
    }

    pub fn from_lp(lp: &LinearProgram<Rational>, inf: &ExactInfinity) -> Self {
        let offset = lp.obj_offset();
        Self {
            sense: lp.sense(),
            offset: (!num_traits::Zero::is_zero(offset)).then(|| format_rational(offset)),
            cols: lp
                .cols()
                .map(|(_, col)| JsonCol {
                    name: None,
                    obj: text(&col.obj, inf),
                    lower: text(&col.lower, inf),
                    upper: text(&col.upper, inf),
                })
                .collect(),
            rows: lp
                .rows()
                .map(|(_, row)| JsonRow {
                    name: None,
                    lhs: text(&row.lhs, inf),
                    coeffs: row.coeffs.iter().map(|(j, v)| (j, format_rational(v))).collect(),
                    rhs: text(&row.rhs, inf),
                })
                .collect(),
        }
    }
}

/// A solve result with exact numbers as strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonSolution {
    pub status: Status,
    pub verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primal: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slacks: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primal_ray: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dual: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reduced_costs: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dual_farkas: Option<Vec<String>>,
}

impl JsonSolution {
    pub fn new(status: Status, solution: &Solution<Rational>) -> Self {
        let strings = |values: Option<&[Rational]>| {
            values.map(|v| v.iter().map(format_rational).collect::<Vec<_>>())
        };
        Self {
            status,
            verified: solution.verified,
            objective: solution.objective.as_ref().map(format_rational),
            primal: strings(solution.primal()),
            slacks: strings(solution.slacks()),
            primal_ray: strings(solution.primal_ray()),
            dual: strings(solution.dual()),
            reduced_costs: strings(solution.reduced_costs()),
            dual_farkas: strings(solution.dual_farkas()),
        }
    }
}

pub fn parse_json_problem(contents: &str) -> Result<JsonProblem> {
    match serde_json::from_str::<JsonProblem>(contents) {
        Ok(problem) => Ok(problem),
        Err(parse_err) => {
            if serde_json::from_str::<JsonSolution>(contents).is_ok() {
                Err(anyhow!(
                    "JSON file contains a solution, but a problem (with a 'cols' field) was expected."
                ))
            } else {
                Err(parse_err).context("failed to parse JSON problem")
            }
        }
    }
}

pub fn read_json_problem<P: AsRef<Path>>(path: P) -> Result<JsonProblem> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("failed to open {:?}", path))?;
    let mut reader = BufReader::new(file);
    let mut contents = String::new();
    reader
        .read_to_string(&mut contents)
        .with_context(|| format!("failed to read {:?}", path))?;
    parse_json_problem(&contents)
}

pub fn write_json_problem<P: AsRef<Path>>(path: P, problem: &JsonProblem) -> Result<()> {
    let file = File::create(path.as_ref())
        .with_context(|| format!("failed to create {:?}", path.as_ref()))?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, problem).context("failed to serialise problem")?;
    Ok(())
}

pub fn write_solution<P: AsRef<Path>>(path: P, solution: &JsonSolution) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create parent directory {:?}", parent))?;
        }
    }

    let file = File::create(path).with_context(|| format!("failed to create {:?}", path))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, solution).context("failed to serialise solution")?;
    writer
        .flush()
        .with_context(|| format!("failed to write solution into {:?}", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use irlp_core::rational::rational_from_int;
    use num_bigint::BigInt;

    const SAMPLE: &str = r#"{
        "sense": "Maximize",
        "cols": [
            {"name": "x", "obj": "0.1"},
            {"name": "y", "obj": "1/3", "upper": "2.5"}
        ],
        "rows": [
            {"name": "cap", "coeffs": [[0, "1"], [1, "1"]], "rhs": "10"}
        ]
    }"#;

    #[test]
    fn decimals_load_exactly() {
        let inf = ExactInfinity::default();
        let lp = parse_json_problem(SAMPLE).unwrap().to_lp(&inf).unwrap();
        assert_eq!(lp.sense(), ObjSense::Maximize);
        assert_eq!(*lp.obj(0).unwrap(), Rational::new(BigInt::from(1), BigInt::from(10)));
        assert_eq!(*lp.obj(1).unwrap(), Rational::new(BigInt::from(1), BigInt::from(3)));
        assert_eq!(*lp.upper(1).unwrap(), Rational::new(BigInt::from(5), BigInt::from(2)));
        assert!(inf.is_pos_infinite(lp.upper(0).unwrap()));
        assert!(inf.is_neg_infinite(lp.lhs(0).unwrap()));
        assert_eq!(*lp.rhs(0).unwrap(), rational_from_int(10));
    }

    #[test]
    fn written_problem_reads_back() {
        let inf = ExactInfinity::default();
        let lp = parse_json_problem(SAMPLE).unwrap().to_lp(&inf).unwrap();
        let json = serde_json::to_string(&JsonProblem::from_lp(&lp, &inf)).unwrap();
        let again = parse_json_problem(&json).unwrap().to_lp(&inf).unwrap();
        assert_eq!(again.num_rows(), 1);
        assert_eq!(again.obj(1).unwrap(), lp.obj(1).unwrap());
        assert!(inf.is_pos_infinite(again.upper(0).unwrap()));
    }

    #[test]
    fn bad_number_names_its_row() {
        let inf = ExactInfinity::default();
        let input = r#"{"cols": [{"obj": "1"}], "rows": [{"name": "r7", "coeffs": [[0, "1.2.3"]]}]}"#;
        let err = parse_json_problem(input).unwrap().to_lp(&inf).unwrap_err();
        assert!(format!("{err:#}").contains("r7"));
    }

    #[test]
    fn solution_is_not_a_problem() {
        let solution = JsonSolution::new(Status::Infeasible, &Solution::empty());
        let json = serde_json::to_string(&solution).unwrap();
        assert!(parse_json_problem(&json).is_err());
    }
}
