//! Adapters for the external chain collaborators
//!
//! The bot never speaks RPC directly: everything on-chain goes through the
//! [`ChainClient`] trait (data and subscriptions) or the [`TxSigner`] trait
//! (signing and submission). Live implementations live outside this crate;
//! tests use the generated mocks and the binary wires the inert stubs for
//! dry runs.

pub mod chain_client;
pub mod signer;
pub mod stub;

pub use chain_client::{
    ChainClient, LogEvent, LogFilter, PendingTransaction, ReorgNotice, SwapSide,
    TokenOnchainStatus,
};
pub use signer::{ConfirmationStatus, SwapOrder, TxSigner};
pub use stub::{StubChainClient, StubSigner};
