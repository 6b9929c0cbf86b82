//! dio-deposit - deposit orchestration for on-chain yield strategies.
//!
//! This crate drives a strategy contract through approve → deposit → verify,
//! either on a local fork with impersonated accounts or on a live network
//! with a locally held key.

pub mod account;
pub mod contracts;
mod error;
pub mod faucet;
pub mod network;
pub mod orchestrator;
pub mod rpc;
pub mod signer;
pub mod status;

pub use account::{AccountMode, FundingAccount, ImpersonatedAccount, LiveAccount, acquire};
pub use contracts::{
    ContractHandle, IFundingToken, IStrategy, InterfaceDescriptor, bind, bind_address,
    parse_address,
};
pub use error::{DepositError, Result};
pub use faucet::{FundingRequest, FundingResult, fund};
pub use network::{
    CONFIG_FILENAME, Credential, GasPolicy, NetworkKind, NetworkProfile, NetworkRegistry,
    SigningRequirement,
};
pub use orchestrator::{
    DepositOrchestrator, DepositReport, DepositRequest, DepositState, FailureReason, Phase,
};
pub use rpc::{HttpTransport, InclusionPolicy, Transport, TxReceipt};
pub use signer::{SignerHandle, TxRequest};
pub use status::{StatusReport, account_status};

pub use alloy_core::primitives::{Address, TxHash, U256};
