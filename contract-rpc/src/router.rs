//! Router: the implemented mirror of a contract
//!
//! A router is a nested mapping from key to [`Procedure`] or sub-router. It
//! must have exactly the contract's shape: the same keys at every level, a
//! procedure wherever the contract has a leaf, and each procedure mounted at
//! the position of the leaf it implements. [`RouterTree::build`] checks all
//! of this once, at start-up.
//!
//! ```rust,ignore
//! let router = RouterTree::new()
//!     .nest("public", RouterTree::new().procedure("greeting", public_greeting))
//!     .nest("private", RouterTree::new().procedure("greeting", private_greeting))
//!     .build(&contract)?;
//!
//! let output = router.call("public.greeting", Context::new(), json!({})).await?;
//! ```

use crate::context::Context;
use crate::contract::{Contract, ContractNode, join_path, validate_key};
use crate::error::{ContractError, RpcError, RpcResult};
use crate::middleware::Response;
use crate::procedure::Procedure;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, trace};

enum TreeEntry {
    Procedure(Procedure),
    Tree(RouterTree),
}

/// Unchecked router tree, turned into a [`Router`] by [`RouterTree::build`].
#[derive(Default)]
pub struct RouterTree {
    entries: Vec<(String, TreeEntry)>,
}

impl RouterTree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount `procedure` under `key`.
    #[must_use = "This method returns a new RouterTree and does not modify self"]
    pub fn procedure(mut self, key: impl Into<String>, procedure: Procedure) -> Self {
        self.entries.push((key.into(), TreeEntry::Procedure(procedure)));
        self
    }

    /// Mount a sub-router under `key`.
    #[must_use = "This method returns a new RouterTree and does not modify self"]
    pub fn nest(mut self, key: impl Into<String>, tree: RouterTree) -> Self {
        self.entries.push((key.into(), TreeEntry::Tree(tree)));
        self
    }

    /// Check the tree against `contract` and build the router.
    pub fn build(self, contract: &Contract) -> Result<Router, ContractError> {
        let root = self.check(contract.root(), &[])?;
        let router = Router {
            root: Arc::new(root),
            contract: contract.clone(),
        };
        info!(procedures = router.procedures().len(), "Router built");
        Ok(router)
    }

    fn check(
        self,
        contract: &BTreeMap<String, ContractNode>,
        prefix: &[String],
    ) -> Result<BTreeMap<String, RouterNode>, ContractError> {
        let mut entries = BTreeMap::new();
        for (key, entry) in self.entries {
            validate_key(&key)?;
            if entries.contains_key(&key) {
                let mut path = prefix.to_vec();
                path.push(key);
                return Err(ContractError::DuplicateKey(join_path(&path)));
            }
            entries.insert(key, entry);
        }

        let keys: BTreeSet<String> = contract.keys().chain(entries.keys()).cloned().collect();
        let mut nodes = BTreeMap::new();

        for key in keys {
            let mut path = prefix.to_vec();
            path.push(key.clone());

            let declared = contract.get(&key);
            let Some(entry) = entries.remove(&key) else {
                return Err(ContractError::MissingKey(join_path(&path)));
            };
            let Some(declared) = declared else {
                return Err(ContractError::UnexpectedKey(join_path(&path)));
            };

            let node = match (declared, entry) {
                (ContractNode::Procedure(leaf), TreeEntry::Procedure(procedure)) => {
                    let implemented = procedure.leaf();
                    if implemented.path() != path.as_slice() {
                        return Err(ContractError::MisplacedProcedure {
                            implemented: implemented.dotted_path(),
                            mounted: join_path(&path),
                        });
                    }
                    if !implemented.same_declaration(leaf) {
                        return Err(ContractError::SchemaMismatch {
                            path: join_path(&path),
                            expected: format!(
                                "{} -> {}",
                                leaf.input().type_name(),
                                leaf.output().type_name()
                            ),
                            found: format!(
                                "{} -> {}",
                                implemented.input().type_name(),
                                implemented.output().type_name()
                            ),
                        });
                    }
                    RouterNode::Procedure(procedure)
                }
                (ContractNode::Tree(children), TreeEntry::Tree(tree)) => {
                    RouterNode::Tree(tree.check(children, &path)?)
                }
                (ContractNode::Procedure(_), TreeEntry::Tree(_)) => {
                    return Err(ContractError::ShapeMismatch {
                        path: join_path(&path),
                        expected: "procedure",
                        found: "router",
                    });
                }
                (ContractNode::Tree(_), TreeEntry::Procedure(_)) => {
                    return Err(ContractError::ShapeMismatch {
                        path: join_path(&path),
                        expected: "router",
                        found: "procedure",
                    });
                }
            };
            nodes.insert(key, node);
        }

        Ok(nodes)
    }
}

/// A node of a built router.
#[derive(Clone, Debug)]
pub enum RouterNode {
    /// A procedure
    Procedure(Procedure),
    /// A namespace of further nodes
    Tree(BTreeMap<String, RouterNode>),
}

/// A router whose shape matches its contract.
///
/// Immutable after [`RouterTree::build`]; cloning is cheap.
#[derive(Clone, Debug)]
pub struct Router {
    root: Arc<BTreeMap<String, RouterNode>>,
    contract: Contract,
}

impl Router {
    /// The contract this router implements.
    pub fn contract(&self) -> &Contract {
        &self.contract
    }

    /// Find the procedure at `segments`, or NOT_FOUND.
    pub fn resolve<S: AsRef<str>>(&self, segments: &[S]) -> RpcResult<&Procedure> {
        let not_found = || {
            let path = segments
                .iter()
                .map(|segment| segment.as_ref())
                .collect::<Vec<_>>()
                .join(".");
            debug!(path = %path, "Procedure not found");
            RpcError::procedure_not_found(&path)
        };

        let (first, rest) = segments.split_first().ok_or_else(not_found)?;
        let mut node = self.root.get(first.as_ref()).ok_or_else(not_found)?;
        for segment in rest {
            node = match node {
                RouterNode::Tree(children) => children.get(segment.as_ref()).ok_or_else(not_found)?,
                RouterNode::Procedure(_) => return Err(not_found()),
            };
        }

        match node {
            RouterNode::Procedure(procedure) => {
                trace!(path = %procedure.path(), "Procedure resolved");
                Ok(procedure)
            }
            RouterNode::Tree(_) => Err(not_found()),
        }
    }

    /// List all procedure paths, sorted
    pub fn procedures(&self) -> Vec<String> {
        fn collect(nodes: &BTreeMap<String, RouterNode>, out: &mut Vec<String>) {
            for node in nodes.values() {
                match node {
                    RouterNode::Procedure(procedure) => out.push(procedure.path()),
                    RouterNode::Tree(children) => collect(children, out),
                }
            }
        }

        let mut paths = Vec::new();
        collect(&self.root, &mut paths);
        paths.sort();
        paths
    }

    /// Call a procedure in-process by dotted path.
    pub async fn call(&self, path: &str, ctx: Context, input: serde_json::Value) -> RpcResult<Response> {
        let segments: Vec<&str> = path.split('.').collect();
        let procedure = self.resolve(&segments)?;
        procedure.call(ctx, input, None).await
    }
}
