//! In-memory JSON-RPC node used by the integration tests.
//!
//! Simulates one ERC-20 funding token and any number of strategies with
//! identity accounting (`totalDeposits` grows by exactly the deposited
//! amount). Every request advances a logical clock; submissions and observed
//! inclusions are recorded against it.

#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
    time::Duration,
};

use alloy_consensus::TxEnvelope;
use alloy_core::primitives::{Address, Bytes, TxHash, TxKind, U256, keccak256};
use alloy_eips::eip2718::Decodable2718;
use alloy_sol_types::{SolCall, SolValue};
use dio_deposit::{
    DepositError, IFundingToken, IStrategy, InclusionPolicy, NetworkKind, NetworkProfile,
    Transport,
};
use serde_json::{Value, json};

pub const CHAIN_ID: u64 = 31337;

/// First Anvil dev key and its address.
pub const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const DEV_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

pub fn one_ether() -> U256 {
    U256::from(1_000_000_000_000_000_000u128)
}

pub fn token() -> Address {
    Address::repeat_byte(0x70)
}

pub fn strategy() -> Address {
    Address::repeat_byte(0x5a)
}

pub fn funder() -> Address {
    Address::repeat_byte(0xf0)
}

pub fn fast_inclusion() -> InclusionPolicy {
    InclusionPolicy {
        timeout: Duration::from_millis(200),
        poll_interval: Duration::from_millis(1),
    }
}

pub fn rehearsal_profile() -> NetworkProfile {
    NetworkProfile {
        identifier: "localhost".to_string(),
        kind: NetworkKind::Rehearsal,
        rpc_url: "http://127.0.0.1:8545".parse().unwrap(),
        signing_credential: None,
        gas: Default::default(),
        chain_id: None,
        explorer_api_key: None,
    }
}

pub fn live_profile() -> NetworkProfile {
    NetworkProfile {
        identifier: "goerli".to_string(),
        kind: NetworkKind::Live,
        rpc_url: "https://eth-goerli.example.org".parse().unwrap(),
        signing_credential: Some(dio_deposit::Credential::new(DEV_KEY)),
        gas: Default::default(),
        chain_id: Some(CHAIN_ID),
        explorer_api_key: None,
    }
}

/// Where a reverting transaction is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevertMode {
    /// The node refuses the submission (gas estimation fails).
    AtSubmission,
    /// The transaction is mined with status 0.
    InReceipt,
}

/// Something the node observed, stamped with the logical clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Submitted { at: u64, method: &'static str, tx_hash: TxHash },
    Included { at: u64, method: &'static str, tx_hash: TxHash },
    Rejected { at: u64, method: &'static str },
}

struct PendingTx {
    method: &'static str,
    success: bool,
    block_number: u64,
    polls_left: usize,
    observed: bool,
}

#[derive(Default)]
struct ChainState {
    clock: u64,
    block: u64,
    nonce: u64,
    balances: HashMap<Address, U256>,
    allowances: HashMap<(Address, Address), U256>,
    totals: HashMap<Address, U256>,
    impersonated: HashSet<Address>,
    unlocked: Vec<Address>,
    txs: HashMap<TxHash, PendingTx>,
    events: Vec<Event>,
    methods: Vec<String>,
    raw_senders: Vec<Address>,
    dropped_receipt_polls: usize,
}

/// A scripted node. Configure with the builder-style setters, then share it
/// behind an `Arc`.
pub struct FakeChain {
    state: Mutex<ChainState>,
    strategies: HashSet<Address>,
    pending_polls: usize,
    revert_mode: RevertMode,
    never_include: bool,
    broken_accounting: bool,
    refuse_impersonation: bool,
}

impl FakeChain {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ChainState::default()),
            strategies: HashSet::from([strategy()]),
            pending_polls: 2,
            revert_mode: RevertMode::AtSubmission,
            never_include: false,
            broken_accounting: false,
            refuse_impersonation: false,
        }
    }

    pub fn with_strategy(mut self, strategy: Address) -> Self {
        self.strategies.insert(strategy);
        self
    }

    pub fn with_balance(self, owner: Address, amount: U256) -> Self {
        self.state.lock().unwrap().balances.insert(owner, amount);
        self
    }

    pub fn with_unlocked(self, account: Address) -> Self {
        self.state.lock().unwrap().unlocked.push(account);
        self
    }

    pub fn with_revert_mode(mut self, revert_mode: RevertMode) -> Self {
        self.revert_mode = revert_mode;
        self
    }

    pub fn never_include(mut self) -> Self {
        self.never_include = true;
        self
    }

    pub fn with_broken_accounting(mut self) -> Self {
        self.broken_accounting = true;
        self
    }

    pub fn refusing_impersonation(mut self) -> Self {
        self.refuse_impersonation = true;
        self
    }

    /// Fail the next `count` receipt polls as if the connection dropped.
    pub fn dropping_receipt_polls(self, count: usize) -> Self {
        self.state.lock().unwrap().dropped_receipt_polls = count;
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn balance(&self, owner: Address) -> U256 {
        self.state.lock().unwrap().balances.get(&owner).copied().unwrap_or_default()
    }

    pub fn allowance(&self, owner: Address, spender: Address) -> U256 {
        self.state
            .lock()
            .unwrap()
            .allowances
            .get(&(owner, spender))
            .copied()
            .unwrap_or_default()
    }

    pub fn total_deposits(&self, strategy: Address) -> U256 {
        self.state.lock().unwrap().totals.get(&strategy).copied().unwrap_or_default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.lock().unwrap().events.clone()
    }

    /// Every RPC method received, in order.
    pub fn methods(&self) -> Vec<String> {
        self.state.lock().unwrap().methods.clone()
    }

    /// Signers recovered from every raw transaction received.
    pub fn raw_senders(&self) -> Vec<Address> {
        self.state.lock().unwrap().raw_senders.clone()
    }

    pub fn submissions(&self) -> Vec<&'static str> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Submitted { method, .. } => Some(method),
                _ => None,
            })
            .collect()
    }

    fn handle(&self, method: &str, params: Vec<Value>) -> Result<Value, DepositError> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        state.clock += 1;
        state.methods.push(method.to_string());

        match method {
            "eth_chainId" => Ok(json!(format!("0x{CHAIN_ID:x}"))),
            "eth_gasPrice" => Ok(json!("0x3b9aca00")),
            "eth_estimateGas" => Ok(json!("0x186a0")),
            "eth_getTransactionCount" => Ok(json!(format!("0x{:x}", state.nonce))),
            "eth_accounts" => Ok(json!(state.unlocked)),
            "hardhat_impersonateAccount" => {
                if self.refuse_impersonation {
                    return Err(rpc_error(method, "impersonation is not supported"));
                }
                let address: Address = param(method, &params, 0)?;
                state.impersonated.insert(address);
                Ok(Value::Null)
            }
            "hardhat_setBalance" => Ok(Value::Null),
            "eth_sendTransaction" => {
                let tx = params.first().ok_or_else(|| rpc_error(method, "missing transaction"))?;
                let from: Address = field(method, tx, "from")?;
                let to: Address = field(method, tx, "to")?;
                let data: Bytes = field(method, tx, "data")?;
                if !state.impersonated.contains(&from) && !state.unlocked.contains(&from) {
                    return Err(rpc_error(method, &format!("no signer available for {from}")));
                }
                self.submit(state, from, to, &data)
            }
            "eth_sendRawTransaction" => {
                let raw: Bytes = param(method, &params, 0)?;
                let envelope = TxEnvelope::decode_2718(&mut raw.as_ref())
                    .map_err(|e| rpc_error(method, &e.to_string()))?;
                let TxEnvelope::Legacy(signed) = envelope else {
                    return Err(rpc_error(method, "expected a legacy transaction"));
                };
                let tx = signed.tx();
                if tx.chain_id != Some(CHAIN_ID) {
                    return Err(rpc_error(method, "wrong chain id"));
                }
                let TxKind::Call(to) = tx.to else {
                    return Err(rpc_error(method, "contract creation not expected"));
                };
                let from = signed
                    .signature()
                    .recover_address_from_prehash(&signed.signature_hash())
                    .map_err(|e| rpc_error(method, &format!("invalid signature: {e}")))?;
                state.raw_senders.push(from);
                let data = tx.input.clone();
                self.submit(state, from, to, &data)
            }
            "eth_getTransactionReceipt" => {
                let tx_hash: TxHash = param(method, &params, 0)?;
                if state.dropped_receipt_polls > 0 {
                    state.dropped_receipt_polls -= 1;
                    return Err(rpc_error(method, "connection reset"));
                }
                if self.never_include {
                    return Ok(Value::Null);
                }
                let at = state.clock;
                let Some(tx) = state.txs.get_mut(&tx_hash) else {
                    return Ok(Value::Null);
                };
                if tx.polls_left > 0 {
                    tx.polls_left -= 1;
                    return Ok(Value::Null);
                }
                let receipt = json!({
                    "transactionHash": tx_hash,
                    "blockNumber": format!("0x{:x}", tx.block_number),
                    "status": if tx.success { "0x1" } else { "0x0" },
                });
                if !tx.observed {
                    tx.observed = true;
                    let method = tx.method;
                    state.events.push(Event::Included { at, method, tx_hash });
                }
                Ok(receipt)
            }
            "eth_call" => {
                let call = params.first().ok_or_else(|| rpc_error(method, "missing call"))?;
                let to: Address = field(method, call, "to")?;
                let data: Bytes = field(method, call, "data")?;
                let output = self.view(state, to, &data)?;
                Ok(json!(Bytes::from(output)))
            }
            other => Err(rpc_error(other, "method not found")),
        }
    }

    /// Execute a state-changing call and queue its receipt.
    fn submit(
        &self,
        state: &mut ChainState,
        from: Address,
        to: Address,
        data: &[u8],
    ) -> Result<Value, DepositError> {
        let (method, outcome) = self.execute(state, from, to, data);

        if outcome.is_err() && self.revert_mode == RevertMode::AtSubmission {
            let at = state.clock;
            state.events.push(Event::Rejected { at, method });
            return Err(rpc_error("eth_sendTransaction", "execution reverted"));
        }

        state.nonce += 1;
        state.block += 1;
        let tx_hash = keccak256(state.nonce.to_be_bytes());
        let block_number = state.block;
        state.txs.insert(
            tx_hash,
            PendingTx {
                method,
                success: outcome.is_ok(),
                block_number,
                polls_left: self.pending_polls,
                observed: false,
            },
        );
        let at = state.clock;
        state.events.push(Event::Submitted { at, method, tx_hash });

        Ok(json!(tx_hash))
    }

    fn execute(
        &self,
        state: &mut ChainState,
        from: Address,
        to: Address,
        data: &[u8],
    ) -> (&'static str, Result<(), ()>) {
        if to == token() {
            if let Ok(call) = IFundingToken::approveCall::abi_decode(data) {
                state.allowances.insert((from, call.spender), call.amount);
                return ("approve", Ok(()));
            }
            if let Ok(call) = IFundingToken::transferCall::abi_decode(data) {
                let balance = state.balances.get(&from).copied().unwrap_or_default();
                if balance < call.amount {
                    return ("transfer", Err(()));
                }
                state.balances.insert(from, balance - call.amount);
                *state.balances.entry(call.to).or_default() += call.amount;
                return ("transfer", Ok(()));
            }
            return ("unknown", Err(()));
        }

        if self.strategies.contains(&to) {
            if let Ok(call) = IStrategy::depositFundsCall::abi_decode(data) {
                let balance = state.balances.get(&from).copied().unwrap_or_default();
                let allowance = state.allowances.get(&(from, to)).copied().unwrap_or_default();
                if balance < call.amount || allowance < call.amount {
                    return ("depositFunds", Err(()));
                }
                state.balances.insert(from, balance - call.amount);
                *state.balances.entry(to).or_default() += call.amount;
                state.allowances.insert((from, to), allowance - call.amount);
                *state.totals.entry(to).or_default() += call.amount;
                return ("depositFunds", Ok(()));
            }
        }

        ("unknown", Err(()))
    }

    fn view(&self, state: &ChainState, to: Address, data: &[u8]) -> Result<Vec<u8>, DepositError> {
        if to == token() {
            if let Ok(call) = IFundingToken::balanceOfCall::abi_decode(data) {
                let balance = state.balances.get(&call.owner).copied().unwrap_or_default();
                return Ok(balance.abi_encode());
            }
            if let Ok(call) = IFundingToken::allowanceCall::abi_decode(data) {
                let allowance = state
                    .allowances
                    .get(&(call.owner, call.spender))
                    .copied()
                    .unwrap_or_default();
                return Ok(allowance.abi_encode());
            }
        }

        if self.strategies.contains(&to) && IStrategy::totalDepositsCall::abi_decode(data).is_ok() {
            if self.broken_accounting {
                return Err(rpc_error("eth_call", "execution reverted"));
            }
            let total = state.totals.get(&to).copied().unwrap_or_default();
            return Ok(total.abi_encode());
        }

        Err(rpc_error("eth_call", "execution reverted"))
    }
}

impl std::fmt::Debug for FakeChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeChain")
            .field("strategies", &self.strategies)
            .field("revert_mode", &self.revert_mode)
            .finish_non_exhaustive()
    }
}

impl Transport for FakeChain {
    async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value, DepositError> {
        self.handle(method, params)
    }
}

fn rpc_error(method: &str, message: &str) -> DepositError {
    DepositError::RemoteCall {
        method: method.to_string(),
        message: message.to_string(),
    }
}

fn param<T: serde::de::DeserializeOwned>(
    method: &str,
    params: &[Value],
    index: usize,
) -> Result<T, DepositError> {
    let value = params
        .get(index)
        .cloned()
        .ok_or_else(|| rpc_error(method, "missing parameter"))?;
    serde_json::from_value(value).map_err(|e| rpc_error(method, &e.to_string()))
}

fn field<T: serde::de::DeserializeOwned>(
    method: &str,
    object: &Value,
    name: &str,
) -> Result<T, DepositError> {
    let value = object
        .get(name)
        .cloned()
        .ok_or_else(|| rpc_error(method, &format!("missing field {name}")))?;
    serde_json::from_value(value).map_err(|e| rpc_error(method, &e.to_string()))
}
