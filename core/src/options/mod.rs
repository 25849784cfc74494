//! # Option Trees
//!
//! Configuration and results share one structure: an [`OptionsList`] maps keys to
//! tagged [`OptionValue`] nodes, and a node may itself be a nested list. Paths such as
//! `"paramsel.lambdas"` walk the nesting left to right.
//!
//! ```rust
//! use bigrls::options::{OptionValue, OptionsList};
//!
//! let mut paramsel = OptionsList::new("paramsel");
//! paramsel.add("lambdas", OptionValue::NumberList(vec![0.1, 0.2])).unwrap();
//!
//! let mut opt = OptionsList::new("experiment");
//! opt.add("paramsel", paramsel).unwrap();
//!
//! assert_eq!(opt.get_number_list("paramsel.lambdas").unwrap(), &[0.1, 0.2]);
//! assert!(opt.get("paramsel.sigma").is_err());
//! ```

use crate::big::PartitionedRef;
use crate::matrix::{AnyMatrix, Matrix, MatrixElem};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod archive;
pub mod list;
pub mod sequence;

pub use archive::ArchiveFormat;
pub use list::OptionsList;
pub use sequence::{Action, ProcessPlan, TaskDescriptor, TaskKind, TaskSequence};

/// A named reduction over a list of numbers, such as the rule that turns one lambda per
/// class into a single lambda.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Function {
    Mean,
    Median,
    Min,
    Max,
}

impl Function {
    pub const fn name(self) -> &'static str {
        match self {
            Function::Mean => "mean",
            Function::Median => "median",
            Function::Min => "min",
            Function::Max => "max",
        }
    }

    /// Applies the reduction. `None` for an empty input.
    pub fn apply(self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        let result = match self {
            Function::Mean => values.iter().sum::<f64>() / values.len() as f64,
            Function::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Function::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Function::Median => {
                let mut sorted = values.to_vec();
                sorted.sort_by(f64::total_cmp);
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 0 {
                    (sorted[mid - 1] + sorted[mid]) / 2.0
                } else {
                    sorted[mid]
                }
            }
        };
        Some(result)
    }
}

impl FromStr for Function {
    type Err = crate::error::RlsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mean" => Ok(Function::Mean),
            "median" => Ok(Function::Median),
            "min" => Ok(Function::Min),
            "max" => Ok(Function::Max),
            other => Err(crate::error::RlsError::Config(format!("unknown function '{other}'"))),
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A matrix held by an option node: either in memory or a handle to partitioned storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MatrixNode {
    Local(AnyMatrix),
    Partitioned(PartitionedRef),
}

impl MatrixNode {
    pub fn shape(&self) -> [usize; 2] {
        match self {
            MatrixNode::Local(m) => m.shape(),
            MatrixNode::Partitioned(r) => r.shape(),
        }
    }
}

/// One node of an option tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OptionValue {
    String(String),
    Number(#[serde(with = "crate::matrix::float_serde::scalar")] f64),
    StringList(Vec<String>),
    NumberList(#[serde(with = "crate::matrix::float_serde::seq")] Vec<f64>),
    List(OptionsList),
    Matrix(MatrixNode),
    Function(Function),
    TaskSequence(TaskSequence),
    Process(ProcessPlan),
}

impl OptionValue {
    /// Name of the node's tag, as reported by `IllegalCast`.
    pub const fn tag(&self) -> &'static str {
        match self {
            OptionValue::String(_) => "string",
            OptionValue::Number(_) => "number",
            OptionValue::StringList(_) => "string list",
            OptionValue::NumberList(_) => "number list",
            OptionValue::List(_) => "list",
            OptionValue::Matrix(MatrixNode::Local(_)) => "matrix",
            OptionValue::Matrix(MatrixNode::Partitioned(_)) => "partitioned matrix",
            OptionValue::Function(_) => "function",
            OptionValue::TaskSequence(_) => "task sequence",
            OptionValue::Process(_) => "process",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            OptionValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_string_list(&self) -> Option<&[String]> {
        match self {
            OptionValue::StringList(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_number_list(&self) -> Option<&[f64]> {
        match self {
            OptionValue::NumberList(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&OptionsList> {
        match self {
            OptionValue::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut OptionsList> {
        match self {
            OptionValue::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_matrix(&self) -> Option<&MatrixNode> {
        match self {
            OptionValue::Matrix(m) => Some(m),
            _ => None,
        }
    }

    /// Borrows a local matrix of element type `T`.
    pub fn as_local_matrix<T: MatrixElem>(&self) -> Option<&Matrix<T>> {
        match self {
            OptionValue::Matrix(MatrixNode::Local(m)) => m.downcast_ref(),
            _ => None,
        }
    }

    pub fn as_partitioned(&self) -> Option<&PartitionedRef> {
        match self {
            OptionValue::Matrix(MatrixNode::Partitioned(r)) => Some(r),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<Function> {
        match self {
            OptionValue::Function(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&TaskSequence> {
        match self {
            OptionValue::TaskSequence(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_process(&self) -> Option<&ProcessPlan> {
        match self {
            OptionValue::Process(p) => Some(p),
            _ => None,
        }
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::String(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        OptionValue::String(value)
    }
}

impl From<f64> for OptionValue {
    fn from(value: f64) -> Self {
        OptionValue::Number(value)
    }
}

impl From<Vec<f64>> for OptionValue {
    fn from(value: Vec<f64>) -> Self {
        OptionValue::NumberList(value)
    }
}

impl From<Vec<String>> for OptionValue {
    fn from(value: Vec<String>) -> Self {
        OptionValue::StringList(value)
    }
}

impl From<OptionsList> for OptionValue {
    fn from(value: OptionsList) -> Self {
        OptionValue::List(value)
    }
}

impl<T: MatrixElem> From<Matrix<T>> for OptionValue {
    fn from(value: Matrix<T>) -> Self {
        OptionValue::Matrix(MatrixNode::Local(value.into()))
    }
}

impl From<PartitionedRef> for OptionValue {
    fn from(value: PartitionedRef) -> Self {
        OptionValue::Matrix(MatrixNode::Partitioned(value))
    }
}

impl From<Function> for OptionValue {
    fn from(value: Function) -> Self {
        OptionValue::Function(value)
    }
}

impl From<TaskSequence> for OptionValue {
    fn from(value: TaskSequence) -> Self {
        OptionValue::TaskSequence(value)
    }
}

impl From<ProcessPlan> for OptionValue {
    fn from(value: ProcessPlan) -> Self {
        OptionValue::Process(value)
    }
}

fn write_joined<I, D>(f: &mut fmt::Formatter<'_>, items: I) -> fmt::Result
where
    I: IntoIterator<Item = D>,
    D: fmt::Display,
{
    f.write_str("(")?;
    for (i, item) in items.into_iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    f.write_str(")")
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::String(s) => f.write_str(s),
            OptionValue::Number(n) => write!(f, "{n}"),
            OptionValue::StringList(v) => write_joined(f, v),
            OptionValue::NumberList(v) => write_joined(f, v),
            OptionValue::List(l) => write!(f, "{l}"),
            OptionValue::Matrix(MatrixNode::Local(m)) => {
                let [rows, cols] = m.shape();
                write!(f, "<{} matrix {rows}x{cols}>", m.dtype())
            }
            OptionValue::Matrix(MatrixNode::Partitioned(r)) => {
                write!(f, "<{} partitioned {}x{} at {}>", r.dtype, r.rows, r.cols, r.path.display())
            }
            OptionValue::Function(func) => write!(f, "@{func}"),
            OptionValue::TaskSequence(s) => write_joined(f, s.iter()),
            OptionValue::Process(p) => write_joined(f, p.iter().map(|a| a.name())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_apply() {
        let values = [3.0, 1.0, 2.0, 10.0];
        assert_eq!(Function::Mean.apply(&values), Some(4.0));
        assert_eq!(Function::Median.apply(&values), Some(2.5));
        assert_eq!(Function::Median.apply(&values[..3]), Some(2.0));
        assert_eq!(Function::Min.apply(&values), Some(1.0));
        assert_eq!(Function::Max.apply(&values), Some(10.0));
        assert_eq!(Function::Mean.apply(&[]), None);
    }

    #[test]
    fn test_function_parse() {
        assert_eq!("median".parse::<Function>().unwrap(), Function::Median);
        assert!("mode".parse::<Function>().is_err());
    }

    #[test]
    fn test_safe_accessors() {
        let node = OptionValue::from(2.5);
        assert_eq!(node.as_number(), Some(2.5));
        assert_eq!(node.as_str(), None);
        assert_eq!(node.tag(), "number");

        let node = OptionValue::from(Matrix::<f64>::identity(2));
        assert!(node.as_local_matrix::<f64>().is_some());
        assert!(node.as_local_matrix::<f32>().is_none());
        assert!(node.as_partitioned().is_none());
    }

    #[test]
    fn test_display() {
        assert_eq!(OptionValue::from(vec![1.0, 2.5]).to_string(), "(1, 2.5)");
        assert_eq!(
            OptionValue::from(vec!["a".to_string(), "b".to_string()]).to_string(),
            "(a, b)"
        );
        assert_eq!(OptionValue::from(Function::Median).to_string(), "@median");

        let plan: ProcessPlan = [Action::Compute, Action::ComputeAndPersist].into_iter().collect();
        assert_eq!(OptionValue::from(plan).to_string(), "(Compute, ComputeNsave)");
    }
}
