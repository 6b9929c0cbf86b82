//! Rehearsal faucet: move funding tokens from an impersonated holder to the
//! account that will make the deposit.

use std::sync::Arc;

use alloy_core::primitives::{Address, TxHash, U256};

use crate::{
    account::{AccountMode, acquire},
    contracts::{IFundingToken, InterfaceDescriptor, bind_address, call_view},
    error::{DepositError, Result},
    network::NetworkProfile,
    rpc::{self, InclusionPolicy, Transport},
};

/// A token transfer from a holder on a fork.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundingRequest {
    pub token: Address,
    /// Account that holds the tokens and will be impersonated.
    pub holder: Address,
    pub recipient: Address,
    pub amount: U256,
    /// Native balance to give the holder first so it can pay for gas.
    pub gas_stipend: Option<U256>,
}

/// Result of a faucet transfer.
#[derive(Debug)]
pub struct FundingResult {
    pub tx_hash: TxHash,
    pub block_number: u64,
    /// Recipient token balance after the transfer.
    pub recipient_balance: U256,
}

/// Transfer `request.amount` of the token from the holder to the recipient.
///
/// Only works on a rehearsal profile: the holder is impersonated.
pub async fn fund<T: Transport>(
    profile: &NetworkProfile,
    transport: Arc<T>,
    request: &FundingRequest,
    inclusion: InclusionPolicy,
) -> Result<FundingResult> {
    if request.amount.is_zero() {
        return Err(DepositError::InvalidRequest("amount must be greater than zero".to_string()));
    }

    let signer = acquire(
        profile,
        Arc::clone(&transport),
        AccountMode::Rehearsal,
        Some(request.holder),
    )
    .await?;

    if let Some(stipend) = request.gas_stipend {
        // Anvil accepts the hardhat_ alias as well.
        transport
            .request(
                "hardhat_setBalance",
                vec![serde_json::json!(request.holder), serde_json::json!(stipend)],
            )
            .await?;
        tracing::debug!(holder = %request.holder, %stipend, "Holder native balance topped up");
    }

    let token = bind_address(request.token, InterfaceDescriptor::funding_token(), signer);

    let tx_hash = token
        .send(&IFundingToken::transferCall {
            to: request.recipient,
            amount: request.amount,
        })
        .await?;

    tracing::info!(%tx_hash, holder = %request.holder, recipient = %request.recipient, "Funding transfer sent");

    let receipt = rpc::wait_for_receipt(transport.as_ref(), tx_hash, inclusion).await?;
    if !receipt.succeeded() {
        return Err(DepositError::remote(
            "transfer",
            format!("transfer {} reverted in block {}", tx_hash, receipt.block_number),
        ));
    }

    let recipient_balance = call_view(
        transport.as_ref(),
        None,
        request.token,
        &IFundingToken::balanceOfCall {
            owner: request.recipient,
        },
    )
    .await?;

    tracing::info!(recipient = %request.recipient, balance = %recipient_balance, "Recipient funded");

    Ok(FundingResult {
        tx_hash,
        block_number: receipt.block_number,
        recipient_balance,
    })
}
