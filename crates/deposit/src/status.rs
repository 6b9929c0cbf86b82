//! Read-only snapshot of an account's position in a token/strategy pair.

use alloy_core::primitives::{Address, U256};

use crate::{
    contracts::{IFundingToken, IStrategy, call_view},
    error::Result,
    rpc::Transport,
};

/// Balances and allowance relevant to a deposit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub account: Address,
    pub token: Address,
    pub strategy: Address,
    pub token_balance: U256,
    /// Allowance granted by `account` to `strategy`.
    pub allowance: U256,
    pub total_deposits: U256,
}

impl StatusReport {
    /// Largest deposit that would currently pass both balance and allowance.
    pub fn depositable(&self) -> U256 {
        self.token_balance.min(self.allowance)
    }
}

/// Query token balance, allowance and strategy total at the latest block.
pub async fn account_status<T: Transport>(
    transport: &T,
    token: Address,
    strategy: Address,
    account: Address,
) -> Result<StatusReport> {
    let token_balance = call_view(
        transport,
        None,
        token,
        &IFundingToken::balanceOfCall { owner: account },
    )
    .await?;

    let allowance = call_view(
        transport,
        None,
        token,
        &IFundingToken::allowanceCall {
            owner: account,
            spender: strategy,
        },
    )
    .await?;

    let total_deposits = call_view(transport, None, strategy, &IStrategy::totalDepositsCall {}).await?;

    Ok(StatusReport {
        account,
        token,
        strategy,
        token_balance,
        allowance,
        total_deposits,
    })
}
