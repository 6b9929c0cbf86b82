//! Account provisioning: who pays for and authorises the workflow's
//! transactions.

use std::sync::Arc;

use alloy_core::primitives::Address;
use alloy_signer_local::PrivateKeySigner;
use serde_json::Value;

use crate::{
    error::{DepositError, Result},
    network::NetworkProfile,
    rpc::{self, Transport},
    signer::SignerHandle,
};

/// How the funding account is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum AccountMode {
    /// Sign with the key configured for the network.
    Live,
    /// Let a fork authorise transactions for an account we hold no key for.
    Rehearsal,
}

/// An account whose key we hold.
#[derive(Debug, Clone)]
pub struct LiveAccount {
    signer: PrivateKeySigner,
}

impl LiveAccount {
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub(crate) fn signer(&self) -> &PrivateKeySigner {
        &self.signer
    }
}

/// An account the execution environment has agreed to act for.
///
/// Only [`acquire`] can create one, and only against a rehearsal profile.
/// The grant is never revoked by this crate: it lasts until the fork resets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImpersonatedAccount {
    address: Address,
}

impl ImpersonatedAccount {
    pub fn address(&self) -> Address {
        self.address
    }
}

/// The account a deposit is funded from.
#[derive(Debug, Clone)]
pub enum FundingAccount {
    Live(LiveAccount),
    Impersonated(ImpersonatedAccount),
}

impl FundingAccount {
    pub fn address(&self) -> Address {
        match self {
            FundingAccount::Live(account) => account.address(),
            FundingAccount::Impersonated(account) => account.address(),
        }
    }

    pub fn is_impersonated(&self) -> bool {
        matches!(self, FundingAccount::Impersonated(_))
    }
}

/// Obtain a signer for `profile`.
///
/// - [`AccountMode::Live`] derives the signer from the profile's key. An
///   explicit `address` must match the key.
/// - [`AccountMode::Rehearsal`] with an `address` asks the node to
///   impersonate it and only returns once the node has acknowledged. Without
///   an address the node's first unlocked account is used.
///
/// Rehearsal is refused outright on a live profile, before any request.
pub async fn acquire<T: Transport>(
    profile: &NetworkProfile,
    transport: Arc<T>,
    mode: AccountMode,
    address: Option<Address>,
) -> Result<SignerHandle<T>> {
    let account = match mode {
        AccountMode::Live => FundingAccount::Live(live_account(profile, address)?),
        AccountMode::Rehearsal => {
            FundingAccount::Impersonated(impersonate(profile, transport.as_ref(), address).await?)
        }
    };

    tracing::info!(
        network = %profile.identifier,
        %mode,
        address = %account.address(),
        "Funding account acquired"
    );

    Ok(SignerHandle::new(transport, account, profile.gas, profile.chain_id))
}

fn live_account(profile: &NetworkProfile, address: Option<Address>) -> Result<LiveAccount> {
    let key = profile.signing_credential.as_ref().ok_or_else(|| {
        DepositError::Credential(format!(
            "no private key configured for network '{}'",
            profile.identifier
        ))
    })?;

    let signer: PrivateKeySigner = key
        .expose()
        .trim()
        .parse()
        .map_err(|_| DepositError::Credential("configured private key is not a valid secp256k1 key".to_string()))?;

    if let Some(expected) = address {
        if expected != signer.address() {
            return Err(DepositError::Credential(format!(
                "configured key controls {}, not {}",
                signer.address(),
                expected
            )));
        }
    }

    Ok(LiveAccount { signer })
}

async fn impersonate<T: Transport>(
    profile: &NetworkProfile,
    transport: &T,
    address: Option<Address>,
) -> Result<ImpersonatedAccount> {
    if !profile.is_rehearsal() {
        return Err(DepositError::Impersonation {
            address: address.unwrap_or(Address::ZERO),
            reason: format!(
                "network '{}' is {}, impersonation is only available on a rehearsal fork",
                profile.identifier, profile.kind
            ),
        });
    }

    let Some(address) = address else {
        let accounts: Vec<Address> = rpc::json_rpc_call(transport, "eth_accounts", vec![])
            .await
            .map_err(|e| DepositError::Impersonation {
                address: Address::ZERO,
                reason: e.to_string(),
            })?;

        let address = accounts.first().copied().ok_or(DepositError::Impersonation {
            address: Address::ZERO,
            reason: "node exposes no unlocked accounts".to_string(),
        })?;

        return Ok(ImpersonatedAccount { address });
    };

    // Hardhat answers `true`, Anvil answers `null`.
    let acknowledgement = transport
        .request("hardhat_impersonateAccount", vec![serde_json::json!(address)])
        .await
        .map_err(|e| DepositError::Impersonation {
            address,
            reason: e.to_string(),
        })?;

    if acknowledgement == Value::Bool(false) {
        return Err(DepositError::Impersonation {
            address,
            reason: "node declined the impersonation request".to_string(),
        });
    }

    tracing::debug!(%address, "Impersonation acknowledged");

    Ok(ImpersonatedAccount { address })
}
