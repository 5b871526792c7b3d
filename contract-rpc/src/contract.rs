//! Contract registry
//!
//! A contract is the schema-level declaration of every procedure: its path in
//! the tree, its input schema and its output schema. The same [`Contract`] value
//! is built by the server (to implement it) and by clients (to call it), so the
//! two sides can only disagree if they were compiled against different
//! contract crates.
//!
//! # Example
//!
//! ```rust,ignore
//! use contract_rpc::{define_contract, oc, ContractTree};
//!
//! let contract = define_contract(
//!     ContractTree::new()
//!         .nest(
//!             "users",
//!             ContractTree::new()
//!                 .procedure("get", oc().input::<GetUserInput>().output::<User>())
//!                 .procedure("list", oc().output::<Vec<User>>()),
//!         ),
//! )?;
//!
//! let get_user = contract.procedure::<GetUserInput, User>("users.get")?;
//! ```

use crate::error::ContractError;
use crate::schema::{SchemaDescriptor, SchemaType};
use crate::types::NoInput;
use crate::validation::Validate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, LazyLock};

static KEY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").expect("key pattern is a valid regex")
});

/// Check that a key can be used as a path segment.
pub fn validate_key(key: &str) -> Result<(), ContractError> {
    if KEY_PATTERN.is_match(key) {
        Ok(())
    } else {
        Err(ContractError::InvalidKey(key.to_string()))
    }
}

pub(crate) fn join_path(segments: &[String]) -> String {
    segments.join(".")
}

/// How a procedure's input is read from a request body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyFormat {
    /// JSON document
    #[default]
    Json,
    /// `application/x-www-form-urlencoded` fields, read as a flat JSON object
    Form,
    /// Plain text, read as a JSON string
    Text,
}

/// A procedure declaration at a fixed position in a contract.
#[derive(Debug)]
pub struct ContractLeaf {
    path: Vec<String>,
    input: SchemaDescriptor,
    output: SchemaDescriptor,
    body_format: BodyFormat,
}

impl ContractLeaf {
    /// Path segments from the root.
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Dotted path (`public.greeting`).
    pub fn dotted_path(&self) -> String {
        join_path(&self.path)
    }

    /// Input schema.
    pub fn input(&self) -> &SchemaDescriptor {
        &self.input
    }

    /// Output schema.
    pub fn output(&self) -> &SchemaDescriptor {
        &self.output
    }

    /// Body format the input is read from.
    pub fn body_format(&self) -> BodyFormat {
        self.body_format
    }

    /// Whether two leaves declare the same procedure.
    pub(crate) fn same_declaration(&self, other: &ContractLeaf) -> bool {
        self.path == other.path
            && self.input.type_name() == other.input.type_name()
            && self.output.type_name() == other.output.type_name()
            && self.body_format == other.body_format
    }
}

/// A node of a defined contract.
#[derive(Debug, Clone)]
pub enum ContractNode {
    /// A procedure
    Procedure(Arc<ContractLeaf>),
    /// A namespace of further nodes
    Tree(BTreeMap<String, ContractNode>),
}

/// Builder for a single procedure declaration.
///
/// Start one with [`oc`]. Without `.input()` a procedure takes [`NoInput`];
/// without `.output()` it may return any JSON value.
pub struct ProcedureContractBuilder<I, O> {
    input: SchemaDescriptor,
    output: SchemaDescriptor,
    body_format: BodyFormat,
    _marker: PhantomData<fn(I) -> O>,
}

/// Start declaring a procedure.
pub fn oc() -> ProcedureContractBuilder<NoInput, serde_json::Value> {
    ProcedureContractBuilder {
        input: SchemaDescriptor::of::<NoInput>(),
        output: SchemaDescriptor::of::<serde_json::Value>(),
        body_format: BodyFormat::Json,
        _marker: PhantomData,
    }
}

impl<I, O> ProcedureContractBuilder<I, O> {
    /// Set the input schema.
    pub fn input<T: SchemaType>(self) -> ProcedureContractBuilder<T, O> {
        self.with_input(SchemaDescriptor::of::<T>())
    }

    /// Set an input schema whose [`Validate`] rules also run.
    pub fn validated_input<T: SchemaType + Validate>(self) -> ProcedureContractBuilder<T, O> {
        self.with_input(SchemaDescriptor::validated::<T>())
    }

    /// Set the output schema.
    pub fn output<T: SchemaType>(self) -> ProcedureContractBuilder<I, T> {
        self.with_output(SchemaDescriptor::of::<T>())
    }

    /// Set an output schema whose [`Validate`] rules also run.
    pub fn validated_output<T: SchemaType + Validate>(self) -> ProcedureContractBuilder<I, T> {
        self.with_output(SchemaDescriptor::validated::<T>())
    }

    /// Read the input from request bodies in `format` instead of JSON.
    pub fn body_format(mut self, format: BodyFormat) -> Self {
        self.body_format = format;
        self
    }

    fn with_input<T>(self, input: SchemaDescriptor) -> ProcedureContractBuilder<T, O> {
        ProcedureContractBuilder {
            input,
            output: self.output,
            body_format: self.body_format,
            _marker: PhantomData,
        }
    }

    fn with_output<T>(self, output: SchemaDescriptor) -> ProcedureContractBuilder<I, T> {
        ProcedureContractBuilder {
            input: self.input,
            output,
            body_format: self.body_format,
            _marker: PhantomData,
        }
    }
}

struct LeafSpec {
    input: SchemaDescriptor,
    output: SchemaDescriptor,
    body_format: BodyFormat,
}

enum TreeEntry {
    Procedure(LeafSpec),
    Tree(ContractTree),
}

/// Undefined contract tree, turned into a [`Contract`] by [`define_contract`].
#[derive(Default)]
pub struct ContractTree {
    entries: Vec<(String, TreeEntry)>,
}

impl ContractTree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a procedure under `key`.
    #[must_use = "This method returns a new ContractTree and does not modify self"]
    pub fn procedure<I, O>(mut self, key: impl Into<String>, spec: ProcedureContractBuilder<I, O>) -> Self {
        self.entries.push((
            key.into(),
            TreeEntry::Procedure(LeafSpec {
                input: spec.input,
                output: spec.output,
                body_format: spec.body_format,
            }),
        ));
        self
    }

    /// Nest a sub-tree under `key`.
    #[must_use = "This method returns a new ContractTree and does not modify self"]
    pub fn nest(mut self, key: impl Into<String>, tree: ContractTree) -> Self {
        self.entries.push((key.into(), TreeEntry::Tree(tree)));
        self
    }

    fn define(self, prefix: &[String]) -> Result<BTreeMap<String, ContractNode>, ContractError> {
        if self.entries.is_empty() {
            let name = if prefix.is_empty() {
                "<root>".to_string()
            } else {
                join_path(prefix)
            };
            return Err(ContractError::EmptyTree(name));
        }

        let mut nodes = BTreeMap::new();
        for (key, entry) in self.entries {
            validate_key(&key)?;
            let mut path = prefix.to_vec();
            path.push(key.clone());

            if nodes.contains_key(&key) {
                return Err(ContractError::DuplicateKey(join_path(&path)));
            }

            let node = match entry {
                TreeEntry::Procedure(spec) => ContractNode::Procedure(Arc::new(ContractLeaf {
                    path,
                    input: spec.input,
                    output: spec.output,
                    body_format: spec.body_format,
                })),
                TreeEntry::Tree(tree) => ContractNode::Tree(tree.define(&path)?),
            };
            nodes.insert(key, node);
        }
        Ok(nodes)
    }
}

/// Define a contract, checking keys and path uniqueness.
///
/// Every failure here is a start-up failure: nothing about a contract is
/// decided per request.
pub fn define_contract(tree: ContractTree) -> Result<Contract, ContractError> {
    let root = tree.define(&[])?;
    let contract = Contract {
        root: Arc::new(root),
    };
    tracing::debug!(procedures = contract.paths().len(), "Contract defined");
    Ok(contract)
}

/// An immutable, defined contract.
///
/// Cloning is cheap; all clones share the same tree.
#[derive(Debug, Clone)]
pub struct Contract {
    root: Arc<BTreeMap<String, ContractNode>>,
}

impl Contract {
    /// Top-level nodes.
    pub fn root(&self) -> &BTreeMap<String, ContractNode> {
        &self.root
    }

    /// Look up a node by path segments.
    pub fn node<S: AsRef<str>>(&self, segments: &[S]) -> Option<&ContractNode> {
        let (first, rest) = segments.split_first()?;
        let mut node = self.root.get(first.as_ref())?;
        for segment in rest {
            match node {
                ContractNode::Tree(children) => node = children.get(segment.as_ref())?,
                ContractNode::Procedure(_) => return None,
            }
        }
        Some(node)
    }

    /// Look up a procedure by dotted path.
    pub fn leaf(&self, path: &str) -> Option<&Arc<ContractLeaf>> {
        let segments: Vec<&str> = path.split('.').collect();
        match self.node(&segments)? {
            ContractNode::Procedure(leaf) => Some(leaf),
            ContractNode::Tree(_) => None,
        }
    }

    /// Typed handle to the procedure at `path`.
    ///
    /// Fails if the path is not a procedure or if `I`/`O` are not the types
    /// the procedure was declared with.
    pub fn procedure<I: 'static, O: 'static>(
        &self,
        path: &str,
    ) -> Result<ContractProcedure<I, O>, ContractError> {
        let leaf = self
            .leaf(path)
            .ok_or_else(|| ContractError::UnknownProcedure(path.to_string()))?;

        if !leaf.input.is::<I>() || !leaf.output.is::<O>() {
            return Err(ContractError::SchemaMismatch {
                path: path.to_string(),
                expected: format!("{} -> {}", leaf.input.type_name(), leaf.output.type_name()),
                found: format!(
                    "{} -> {}",
                    std::any::type_name::<I>(),
                    std::any::type_name::<O>()
                ),
            });
        }

        Ok(ContractProcedure {
            leaf: Arc::clone(leaf),
            _marker: PhantomData,
        })
    }

    /// Every procedure leaf, in path order.
    pub fn leaves(&self) -> Vec<Arc<ContractLeaf>> {
        fn collect(nodes: &BTreeMap<String, ContractNode>, out: &mut Vec<Arc<ContractLeaf>>) {
            for node in nodes.values() {
                match node {
                    ContractNode::Procedure(leaf) => out.push(Arc::clone(leaf)),
                    ContractNode::Tree(children) => collect(children, out),
                }
            }
        }

        let mut leaves = Vec::new();
        collect(&self.root, &mut leaves);
        leaves
    }

    /// Every procedure path, sorted.
    pub fn paths(&self) -> Vec<String> {
        self.leaves().iter().map(|leaf| leaf.dotted_path()).collect()
    }

    /// Serializable description of the contract.
    pub fn describe(&self) -> ContractSchema {
        ContractSchema {
            procedures: self
                .leaves()
                .iter()
                .map(|leaf| ProcedureSchema {
                    path: leaf.dotted_path(),
                    input: leaf.input.type_name().to_string(),
                    output: leaf.output.type_name().to_string(),
                    validated_input: leaf.input.is_validated(),
                    validated_output: leaf.output.is_validated(),
                    body_format: leaf.body_format,
                })
                .collect(),
        }
    }
}

/// Typed reference to one procedure of a contract.
pub struct ContractProcedure<I, O> {
    leaf: Arc<ContractLeaf>,
    _marker: PhantomData<fn(I) -> O>,
}

impl<I, O> ContractProcedure<I, O> {
    /// The underlying leaf.
    pub fn leaf(&self) -> &Arc<ContractLeaf> {
        &self.leaf
    }

    /// Path segments from the root.
    pub fn path(&self) -> &[String] {
        self.leaf.path()
    }

    /// Dotted path.
    pub fn dotted_path(&self) -> String {
        self.leaf.dotted_path()
    }
}

impl<I, O> Clone for ContractProcedure<I, O> {
    fn clone(&self) -> Self {
        Self {
            leaf: Arc::clone(&self.leaf),
            _marker: PhantomData,
        }
    }
}

impl<I, O> fmt::Debug for ContractProcedure<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ContractProcedure")
            .field(&self.leaf.dotted_path())
            .finish()
    }
}

/// Description of one procedure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcedureSchema {
    /// Dotted path
    pub path: String,
    /// Input type name
    pub input: String,
    /// Output type name
    pub output: String,
    /// Whether input validation rules run
    pub validated_input: bool,
    /// Whether output validation rules run
    pub validated_output: bool,
    /// Body format of the input
    pub body_format: BodyFormat,
}

/// Description of a whole contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractSchema {
    /// Procedures in path order
    pub procedures: Vec<ProcedureSchema>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ContractTree {
        ContractTree::new()
            .procedure("health", oc().output::<String>())
            .nest(
                "users",
                ContractTree::new()
                    .procedure("get", oc().input::<u32>().output::<String>())
                    .procedure("list", oc().output::<Vec<String>>()),
            )
    }

    #[test]
    fn defines_nested_paths() {
        let contract = define_contract(sample()).unwrap();
        assert_eq!(contract.paths(), vec!["health", "users.get", "users.list"]);
        assert!(contract.leaf("users.get").is_some());
        assert!(contract.leaf("users").is_none());
        assert!(contract.leaf("users.get.extra").is_none());
    }

    #[test]
    fn duplicate_keys_fail_at_definition() {
        let tree = ContractTree::new()
            .procedure("greeting", oc())
            .procedure("greeting", oc().output::<String>());
        assert_eq!(
            define_contract(tree).unwrap_err(),
            ContractError::DuplicateKey("greeting".into())
        );

        let nested = ContractTree::new()
            .nest("a", ContractTree::new().procedure("b", oc()))
            .procedure("a", oc());
        assert_eq!(
            define_contract(nested).unwrap_err(),
            ContractError::DuplicateKey("a".into())
        );
    }

    #[test]
    fn invalid_and_empty_trees_fail() {
        let invalid = ContractTree::new().procedure("has/slash", oc());
        assert!(matches!(
            define_contract(invalid),
            Err(ContractError::InvalidKey(_))
        ));

        let empty = ContractTree::new().nest("ns", ContractTree::new());
        assert_eq!(
            define_contract(empty).unwrap_err(),
            ContractError::EmptyTree("ns".into())
        );
    }

    #[test]
    fn typed_handles_check_schema_types() {
        let contract = define_contract(sample()).unwrap();

        let get = contract.procedure::<u32, String>("users.get").unwrap();
        assert_eq!(get.path(), ["users".to_string(), "get".to_string()]);

        assert!(matches!(
            contract.procedure::<String, String>("users.get"),
            Err(ContractError::SchemaMismatch { .. })
        ));
        assert_eq!(
            contract.procedure::<u32, String>("users.missing").unwrap_err(),
            ContractError::UnknownProcedure("users.missing".into())
        );
    }

    #[test]
    fn describe_lists_types() {
        let contract = define_contract(sample()).unwrap();
        let schema = contract.describe();
        assert_eq!(schema.procedures.len(), 3);
        assert_eq!(schema.procedures[1].path, "users.get");
        assert_eq!(schema.procedures[1].input, "u32");
        assert_eq!(schema.procedures[0].body_format, BodyFormat::Json);
    }
}
