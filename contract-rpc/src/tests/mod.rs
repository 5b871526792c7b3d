//! Test module for contract-rpc
//!
//! Scenario and property-based tests (proptest) covering the contract,
//! middleware chain, router, dispatcher and client.






#[cfg(test)]
pub mod router_tests;

#[cfg(test)]
pub mod dispatch_tests;
