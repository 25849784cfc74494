use super::{ArchiveFormat, Function, MatrixNode, OptionValue, ProcessPlan, TaskSequence};
use crate::big::PartitionedRef;
use crate::error::{Result, RlsError};
use crate::matrix::{Matrix, MatrixElem};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A named map from keys to option nodes.
///
/// Methods taking a `path` split it on `.` and descend through nested lists. Every
/// intermediate segment must name a list; otherwise the path is `NotDefined`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionsList {
    name: String,
    table: BTreeMap<String, OptionValue>,
}

impl OptionsList {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: BTreeMap::new(),
        }
    }

    /// An experiment tree pre-filled with the stock defaults.
    pub fn with_defaults(name: impl Into<String>) -> Self {
        let name = name.into();
        let mut opt = Self::new(name.clone());

        let mut set = |key: &str, value: OptionValue| {
            opt.table.insert(key.to_string(), value);
        };

        set("name", name.as_str().into());
        set(
            "savefile",
            format!("{name}.{}", ArchiveFormat::default().extension()).into(),
        );
        set("tmpdir", name.as_str().into());
        set("combineclasses", Function::Mean.into());
        set("singlelambda", Function::Median.into());
        set("predbagmethod", "vote".into());
        set("smallnumber", 1e-8.into());
        set("lambda", 1e-3.into());
        set("savekernel", 1.0.into());
        set("saveanalysis", 1.0.into());
        set("ploteval", "acc".into());
        set("perfeval", "acc".into());
        set("nholdouts", 1.0.into());
        set("hoproportion", 0.2.into());
        set("hoperf", "macroavg".into());
        set("nsigma", 25.0.into());
        set("nlambda", 20.0.into());
        set("eig_percentage", 5.0.into());
        set("subsize", 50.0.into());
        set("calibfile", "foo".into());
        set("epochs", 4.0.into());
        set("verbose", 1.0.into());
        set("version", "2.0".into());

        let mut randfeats = OptionsList::new("randfeats");
        randfeats.table.insert("D".to_string(), 500.0.into());
        randfeats.table.insert("samplesize".to_string(), 100.0.into());
        set("randfeats", randfeats.into());

        opt
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Top-level entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.table.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Resolves `path`, failing `NotDefined` if any segment is missing.
    pub fn get(&self, path: &str) -> Result<&OptionValue> {
        let mut segments = path.split('.');
        let first = segments.next().unwrap_or_default();
        let mut node = self
            .table
            .get(first)
            .ok_or_else(|| RlsError::NotDefined(path.to_string()))?;

        for segment in segments {
            node = node
                .as_list()
                .and_then(|list| list.table.get(segment))
                .ok_or_else(|| RlsError::NotDefined(path.to_string()))?;
        }
        Ok(node)
    }

    pub fn get_mut(&mut self, path: &str) -> Result<&mut OptionValue> {
        let (parent, key) = self.parent_mut(path)?;
        parent
            .table
            .get_mut(key)
            .ok_or_else(|| RlsError::NotDefined(path.to_string()))
    }

    pub fn has(&self, path: &str) -> bool {
        self.get(path).is_ok()
    }

    /// Inserts a new node. The parent of a dotted path must already exist.
    ///
    /// # Errors
    ///
    /// `AlreadyDefined` if the key is taken at that level.
    pub fn add(&mut self, path: &str, value: impl Into<OptionValue>) -> Result<()> {
        let (parent, key) = self.parent_mut(path)?;
        if parent.table.contains_key(key) {
            return Err(RlsError::AlreadyDefined(path.to_string()));
        }
        parent.table.insert(key.to_string(), value.into());
        Ok(())
    }

    /// Inserts or replaces a node, returning the previous one.
    pub fn set(
        &mut self,
        path: &str,
        value: impl Into<OptionValue>,
    ) -> Result<Option<OptionValue>> {
        let (parent, key) = self.parent_mut(path)?;
        Ok(parent.table.insert(key.to_string(), value.into()))
    }

    /// Removes and returns a node. Missing paths are not an error.
    pub fn remove(&mut self, path: &str) -> Option<OptionValue> {
        let (parent, key) = self.parent_mut(path).ok()?;
        parent.table.remove(key)
    }

    /// Deep-copies the node at `path` in `from` into the same path here.
    ///
    /// # Errors
    ///
    /// `NotDefined` if `from` lacks the path, `AlreadyDefined` if `self` already has it.
    pub fn copy_from(&mut self, path: &str, from: &OptionsList) -> Result<()> {
        let node = from.get(path)?.clone();
        self.add(path, node)
    }

    fn parent_mut<'a>(&mut self, path: &'a str) -> Result<(&mut OptionsList, &'a str)> {
        let (parents, key) = match path.rsplit_once('.') {
            Some((parents, key)) => (Some(parents), key),
            None => (None, path),
        };

        let mut list = self;
        if let Some(parents) = parents {
            for segment in parents.split('.') {
                list = list
                    .table
                    .get_mut(segment)
                    .and_then(OptionValue::as_list_mut)
                    .ok_or_else(|| RlsError::NotDefined(path.to_string()))?;
            }
        }
        Ok((list, key))
    }

    fn cast<'a, R>(
        &'a self,
        path: &str,
        expected: &'static str,
        accessor: impl FnOnce(&'a OptionValue) -> Option<R>,
    ) -> Result<R> {
        let node = self.get(path)?;
        accessor(node).ok_or(RlsError::IllegalCast {
            expected,
            found: node.tag(),
        })
    }

    pub fn get_string(&self, path: &str) -> Result<&str> {
        self.cast(path, "string", OptionValue::as_str)
    }

    pub fn get_number(&self, path: &str) -> Result<f64> {
        self.cast(path, "number", OptionValue::as_number)
    }

    pub fn get_string_list(&self, path: &str) -> Result<&[String]> {
        self.cast(path, "string list", OptionValue::as_string_list)
    }

    pub fn get_number_list(&self, path: &str) -> Result<&[f64]> {
        self.cast(path, "number list", OptionValue::as_number_list)
    }

    pub fn get_list(&self, path: &str) -> Result<&OptionsList> {
        self.cast(path, "list", OptionValue::as_list)
    }

    pub fn get_matrix(&self, path: &str) -> Result<&MatrixNode> {
        self.cast(path, "matrix", OptionValue::as_matrix)
    }

    /// Borrows an in-memory matrix of element type `T`.
    pub fn get_local_matrix<T: MatrixElem>(&self, path: &str) -> Result<&Matrix<T>> {
        let node = self.get(path)?;
        node.as_local_matrix().ok_or(RlsError::IllegalCast {
            expected: T::DTYPE.name(),
            found: match node {
                OptionValue::Matrix(MatrixNode::Local(m)) => m.dtype().name(),
                other => other.tag(),
            },
        })
    }

    pub fn get_partitioned(&self, path: &str) -> Result<&PartitionedRef> {
        self.cast(path, "partitioned matrix", OptionValue::as_partitioned)
    }

    pub fn get_function(&self, path: &str) -> Result<Function> {
        self.cast(path, "function", OptionValue::as_function)
    }

    pub fn get_sequence(&self, path: &str) -> Result<&TaskSequence> {
        self.cast(path, "task sequence", OptionValue::as_sequence)
    }

    pub fn get_process(&self, path: &str) -> Result<&ProcessPlan> {
        self.cast(path, "process", OptionValue::as_process)
    }
}

impl fmt::Display for OptionsList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "~~~~~~~ OptionsList: {}", self.name)?;
        for (key, value) in &self.table {
            writeln!(f, "\t[ {key} ] = {value}")?;
        }
        write!(f, "~~~~~~~")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nested() -> OptionsList {
        let mut c = OptionsList::new("b");
        c.add("c", 5.0).unwrap();
        let mut b = OptionsList::new("a");
        b.add("b", c).unwrap();
        let mut a = OptionsList::new("root");
        a.add("a", b).unwrap();
        a
    }

    #[test]
    fn test_add_get_remove() {
        let mut opt = OptionsList::new("exp");
        opt.add("lambda", 0.5).unwrap();
        assert_eq!(opt.get_number("lambda").unwrap(), 0.5);

        assert!(matches!(
            opt.add("lambda", 1.0),
            Err(RlsError::AlreadyDefined(_))
        ));

        assert!(opt.remove("lambda").is_some());
        assert!(matches!(opt.get("lambda"), Err(RlsError::NotDefined(_))));

        // Removing again is a no-op.
        assert!(opt.remove("lambda").is_none());
        assert!(opt.remove("missing.parent").is_none());
    }

    #[test]
    fn test_path_resolution() {
        let opt = nested();
        assert_eq!(opt.get_number("a.b.c").unwrap(), 5.0);
        assert!(matches!(opt.get("a.x"), Err(RlsError::NotDefined(_))));
        // Descending through a non-list fails.
        assert!(matches!(opt.get("a.b.c.d"), Err(RlsError::NotDefined(_))));
        assert!(opt.has("a.b"));
        assert!(!opt.has("b"));
    }

    #[test]
    fn test_dotted_add_and_set() {
        let mut opt = nested();
        opt.add("a.b.d", "hello").unwrap();
        assert_eq!(opt.get_string("a.b.d").unwrap(), "hello");

        let old = opt.set("a.b.c", 6.0).unwrap();
        assert_eq!(old, Some(OptionValue::Number(5.0)));
        assert_eq!(opt.get_number("a.b.c").unwrap(), 6.0);

        assert!(matches!(
            opt.add("missing.key", 1.0),
            Err(RlsError::NotDefined(_))
        ));

        if let OptionValue::Number(n) = opt.get_mut("a.b.c").unwrap() {
            *n += 1.0;
        }
        assert_eq!(opt.get_number("a.b.c").unwrap(), 7.0);
    }

    #[test]
    fn test_illegal_cast() {
        let opt = nested();
        assert!(matches!(
            opt.get_string("a.b.c"),
            Err(RlsError::IllegalCast {
                expected: "string",
                found: "number"
            })
        ));
        assert!(matches!(
            opt.get_number("a"),
            Err(RlsError::IllegalCast { found: "list", .. })
        ));
    }

    #[test]
    fn test_local_matrix_dtype_checked() {
        let mut opt = OptionsList::new("exp");
        opt.add("W", Matrix::<f32>::zeros(2, 2)).unwrap();
        assert!(opt.get_local_matrix::<f32>("W").is_ok());
        assert!(matches!(
            opt.get_local_matrix::<f64>("W"),
            Err(RlsError::IllegalCast {
                expected: "f64",
                found: "f32"
            })
        ));
    }

    #[test]
    fn test_copy_is_deep() {
        let source = nested();
        let mut target = OptionsList::new("target");
        target.copy_from("a", &source).unwrap();
        assert_eq!(target.get("a").unwrap(), source.get("a").unwrap());

        // Mutating the copy leaves the source untouched.
        target.set("a.b.c", 42.0).unwrap();
        assert_eq!(source.get_number("a.b.c").unwrap(), 5.0);

        assert!(matches!(
            target.copy_from("a", &source),
            Err(RlsError::AlreadyDefined(_))
        ));
        assert!(matches!(
            target.copy_from("zzz", &source),
            Err(RlsError::NotDefined(_))
        ));
    }

    #[test]
    fn test_defaults() {
        let opt = OptionsList::with_defaults("exp");
        assert_eq!(opt.name(), "exp");
        assert_eq!(opt.get_function("singlelambda").unwrap(), Function::Median);
        assert_eq!(opt.get_number("hoproportion").unwrap(), 0.2);
        assert_eq!(opt.get_number("randfeats.D").unwrap(), 500.0);
        assert!(opt.get_string("savefile").unwrap().starts_with("exp."));
    }

    #[test]
    fn test_display_lists_entries() {
        let text = nested().to_string();
        assert!(text.contains("~~~~~~~ OptionsList: root"));
        assert!(text.contains("[ c ] = 5"));
    }
}
