//! Router shape checks and resolution

use crate::prelude::*;
use crate::tests::fixtures::{
    CallCounter, GreetingInput, GreetingOutput, greeting_contract, greeting_procedure, greeting_router,
};
use crate::ContractError;
use proptest::prelude::*;
use serde_json::{Value, json};

fn public_greeting(contract: &Contract) -> Procedure {
    let declared = contract.procedure("public.greeting").unwrap();
    greeting_procedure(&implement(contract), &declared, "public", CallCounter::default())
}

fn private_greeting(contract: &Contract) -> Procedure {
    let declared = contract.procedure("private.greeting").unwrap();
    greeting_procedure(&implement(contract), &declared, "private", CallCounter::default())
}

// =============================================================================
// Shape checks
// =============================================================================

#[test]
fn matching_router_builds() {
    let contract = greeting_contract();
    let router = greeting_router(&contract, CallCounter::default(), CallCounter::default());
    assert_eq!(router.procedures(), vec!["private.greeting", "public.greeting"]);
    assert_eq!(router.contract().paths(), router.procedures());
}

#[test]
fn missing_procedure_is_rejected() {
    let contract = greeting_contract();
    let err = RouterTree::new()
        .nest("public", RouterTree::new().procedure("greeting", public_greeting(&contract)))
        .build(&contract)
        .unwrap_err();
    assert_eq!(err, ContractError::MissingKey("private".into()));

    let err = RouterTree::new()
        .nest("public", RouterTree::new().procedure("greeting", public_greeting(&contract)))
        .nest("private", RouterTree::new())
        .build(&contract)
        .unwrap_err();
    assert_eq!(err, ContractError::MissingKey("private.greeting".into()));
}

#[test]
fn extra_procedure_is_rejected() {
    let contract = greeting_contract();
    let err = RouterTree::new()
        .nest(
            "public",
            RouterTree::new()
                .procedure("greeting", public_greeting(&contract))
                .procedure("farewell", public_greeting(&contract)),
        )
        .nest("private", RouterTree::new().procedure("greeting", private_greeting(&contract)))
        .build(&contract)
        .unwrap_err();
    assert_eq!(err, ContractError::UnexpectedKey("public.farewell".into()));
}

#[test]
fn procedure_in_place_of_tree_is_rejected() {
    let contract = greeting_contract();
    let err = RouterTree::new()
        .procedure("public", public_greeting(&contract))
        .nest("private", RouterTree::new().procedure("greeting", private_greeting(&contract)))
        .build(&contract)
        .unwrap_err();
    assert_eq!(
        err,
        ContractError::ShapeMismatch {
            path: "public".into(),
            expected: "router",
            found: "procedure",
        }
    );
}

#[test]
fn procedure_mounted_at_another_leaf_is_rejected() {
    let contract = greeting_contract();
    let err = RouterTree::new()
        .nest("public", RouterTree::new().procedure("greeting", private_greeting(&contract)))
        .nest("private", RouterTree::new().procedure("greeting", public_greeting(&contract)))
        .build(&contract)
        .unwrap_err();
    assert_eq!(
        err,
        ContractError::MisplacedProcedure {
            implemented: "public.greeting".into(),
            mounted: "private.greeting".into(),
        }
    );
}

#[test]
fn procedure_of_another_contract_is_rejected() {
    let contract = greeting_contract();
    let other = define_contract(
        ContractTree::new()
            .nest("public", ContractTree::new().procedure("greeting", oc().output::<String>()))
            .nest(
                "private",
                ContractTree::new()
                    .procedure("greeting", oc().input::<GreetingInput>().output::<GreetingOutput>()),
            ),
    )
    .unwrap();

    let declared = other.procedure::<NoInput, String>("public.greeting").unwrap();
    let foreign = implement(&other)
        .procedure(&declared)
        .handler(|_ctx: Context, _input: NoInput| async { Ok::<_, RpcError>("hi".to_string()) });

    let err = RouterTree::new()
        .nest("public", RouterTree::new().procedure("greeting", foreign))
        .nest("private", RouterTree::new().procedure("greeting", private_greeting(&contract)))
        .build(&contract)
        .unwrap_err();
    assert!(matches!(err, ContractError::SchemaMismatch { ref path, .. } if path == "public.greeting"));
}

#[test]
fn duplicate_router_keys_are_rejected() {
    let contract = greeting_contract();
    let err = RouterTree::new()
        .nest("public", RouterTree::new().procedure("greeting", public_greeting(&contract)))
        .nest("public", RouterTree::new().procedure("greeting", public_greeting(&contract)))
        .build(&contract)
        .unwrap_err();
    assert_eq!(err, ContractError::DuplicateKey("public".into()));
}

#[test]
fn typed_lookup_checks_schemas() {
    let contract = greeting_contract();
    assert!(matches!(
        contract.procedure::<NoInput, GreetingOutput>("public.greeting"),
        Err(ContractError::SchemaMismatch { .. })
    ));
    assert!(matches!(
        contract.procedure::<GreetingInput, GreetingOutput>("public"),
        Err(ContractError::UnknownProcedure(_))
    ));
}

// =============================================================================
// Resolution
// =============================================================================

#[test]
fn resolve_finds_leaves_only() {
    let contract = greeting_contract();
    let router = greeting_router(&contract, CallCounter::default(), CallCounter::default());

    assert_eq!(router.resolve(&["public", "greeting"]).unwrap().path(), "public.greeting");

    let unresolvable: [&[&str]; 4] = [&["public"], &["public", "greeting", "extra"], &["nope"], &[]];
    for path in unresolvable {
        let err = router.resolve(path).unwrap_err();
        assert_eq!(err.kind, RpcErrorKind::NotFound);
    }
}

#[tokio::test]
async fn unknown_dotted_path_is_not_found() {
    let contract = greeting_contract();
    let router = greeting_router(&contract, CallCounter::default(), CallCounter::default());
    let err = router.call("public.farewell", Context::new(), Value::Null).await.unwrap_err();
    assert_eq!(err.kind, RpcErrorKind::NotFound);
    assert!(err.message.contains("public.farewell"));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(30))]

    /// Registration order does not change the built router.
    #[test]
    fn prop_registration_order_is_irrelevant(
        keys in prop::collection::btree_set("[a-z]{1,6}", 1..6),
        reverse in any::<bool>(),
    ) {
        let tree = keys.iter().fold(ContractTree::new(), |tree, key| tree.procedure(key.as_str(), oc()));
        let contract = define_contract(tree).unwrap();

        let mut ordered: Vec<_> = keys.iter().cloned().collect();
        if reverse {
            ordered.reverse();
        }

        let echo = implement(&contract);
        let router = ordered
            .iter()
            .fold(RouterTree::new(), |router, key| {
                let declared = contract.procedure::<NoInput, Value>(key).unwrap();
                let procedure = echo
                    .procedure(&declared)
                    .handler(|_ctx: Context, _input: NoInput| async { Ok::<_, RpcError>(json!(null)) });
                router.procedure(key.as_str(), procedure)
            })
            .build(&contract)
            .unwrap();

        let expected: Vec<String> = keys.into_iter().collect();
        prop_assert_eq!(router.procedures(), expected);
    }
}
