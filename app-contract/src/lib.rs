//! # app-contract
//!
//! The application's RPC contract, shared verbatim by the server and every
//! client.
//!
//! ```text
//! public
//! └── greeting   GreetingInput -> GreetingOutput
//! private
//! └── greeting   GreetingInput -> GreetingOutput   (session required)
//! ```
//!
//! The server implements [`AppContract`] with `contract_rpc::implement`;
//! clients wrap a link in [`AppClient`], whose fields mirror the tree.

use contract_rpc::{
    Contract, ContractClient, ContractError, ContractProcedure, ContractTree, Link,
    ProcedureClient, Validate, ValidationResult, ValidationRules, define_contract, oc,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// =============================================================================
// Types
// =============================================================================

/// Input of both greeting procedures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GreetingInput {
    /// Who to greet; `Anonymous` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl GreetingInput {
    /// Greet `name`.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
        }
    }
}

impl Validate for GreetingInput {
    fn validate(&self) -> ValidationResult {
        let name = self.name.as_deref();
        ValidationRules::new()
            .required_if_present("name", name)
            .max_length("name", name.unwrap_or_default(), MAX_NAME_LENGTH)
            .build()
    }
}

/// Longest accepted `name`, in characters.
pub const MAX_NAME_LENGTH: usize = 64;

/// Output of both greeting procedures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GreetingOutput {
    /// The greeting
    pub text: String,
}

// =============================================================================
// Contract
// =============================================================================

/// Typed handle to a greeting procedure.
pub type GreetingProcedure = ContractProcedure<GreetingInput, GreetingOutput>;

/// The application contract and typed handles to its procedures.
#[derive(Debug, Clone)]
pub struct AppContract {
    contract: Contract,
    /// `public.greeting`
    pub public_greeting: GreetingProcedure,
    /// `private.greeting`
    pub private_greeting: GreetingProcedure,
}

impl AppContract {
    /// Define the contract.
    pub fn new() -> Result<Self, ContractError> {
        let greeting = || oc().validated_input::<GreetingInput>().output::<GreetingOutput>();
        let contract = define_contract(
            ContractTree::new()
                .nest("public", ContractTree::new().procedure("greeting", greeting()))
                .nest("private", ContractTree::new().procedure("greeting", greeting())),
        )?;

        Ok(Self {
            public_greeting: contract.procedure("public.greeting")?,
            private_greeting: contract.procedure("private.greeting")?,
            contract,
        })
    }

    /// The untyped contract tree.
    pub fn contract(&self) -> &Contract {
        &self.contract
    }
}

// =============================================================================
// Client
// =============================================================================

/// Client of a namespace holding a `greeting` procedure.
#[derive(Debug, Clone)]
pub struct GreetingClient {
    /// `<namespace>.greeting`
    pub greeting: ProcedureClient<GreetingInput, GreetingOutput>,
}

/// Typed client mirroring the contract tree.
///
/// ```rust,ignore
/// let client = AppClient::new(&contract, FetchLink::new("http://localhost:3000/rpc"));
/// let output = client.public.greeting.call(&GreetingInput::named("Ada")).await?;
/// ```
#[derive(Debug, Clone)]
pub struct AppClient {
    /// `public.*`
    pub public: GreetingClient,
    /// `private.*`
    pub private: GreetingClient,
}

impl AppClient {
    /// Client over `link`.
    pub fn new<L: Link>(contract: &AppContract, link: L) -> Self {
        Self::from_client(contract, &ContractClient::new(link))
    }

    /// Client over an already shared link.
    pub fn from_shared(contract: &AppContract, link: Arc<dyn Link>) -> Self {
        Self::from_client(contract, &ContractClient::from_shared(link))
    }

    fn from_client(contract: &AppContract, client: &ContractClient) -> Self {
        Self {
            public: GreetingClient {
                greeting: client.procedure(&contract.public_greeting),
            },
            private: GreetingClient {
                greeting: client.procedure(&contract.private_greeting),
            },
        }
    }
}
