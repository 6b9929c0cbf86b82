//! The approve → deposit → verify workflow.
//!
//! Each attempt is a small state machine. Approval must be *included* before
//! the deposit is submitted; nothing is batched or speculated. A failure after
//! approval leaves the allowance in place, and the report says so.

use std::fmt;

use alloy_core::primitives::{Address, TxHash, U256};
use alloy_sol_types::SolCall;

use crate::{
    contracts::{ContractHandle, IFundingToken, IStrategy, InterfaceDescriptor, bind_address},
    error::{DepositError, Result},
    rpc::{self, InclusionPolicy, Transport, TxReceipt},
    signer::SignerHandle,
};

/// What to deposit, from which token, into which strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositRequest {
    /// Amount in the token's smallest unit.
    pub amount: U256,
    /// Flag forwarded to the strategy's `depositFunds`.
    pub auto_compound: bool,
    pub funding_token: Address,
    pub strategy: Address,
}

impl DepositRequest {
    /// Local checks. Balance sufficiency is left to the token contract.
    pub fn validate(&self) -> Result<()> {
        if self.amount.is_zero() {
            return Err(DepositError::InvalidRequest("amount must be greater than zero".to_string()));
        }
        if self.funding_token.is_zero() {
            return Err(DepositError::InvalidAddress {
                address: self.funding_token.to_string(),
                reason: "funding token cannot be the zero address".to_string(),
            });
        }
        if self.strategy.is_zero() {
            return Err(DepositError::InvalidAddress {
                address: self.strategy.to_string(),
                reason: "strategy cannot be the zero address".to_string(),
            });
        }
        if self.funding_token == self.strategy {
            return Err(DepositError::InvalidRequest(
                "funding token and strategy must be different contracts".to_string(),
            ));
        }
        Ok(())
    }
}

/// A non-terminal step of the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum Phase {
    Approving,
    Depositing,
    Verifying,
}

/// Why an attempt ended in [`DepositState::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum FailureReason {
    /// Approval was rejected or reverted. Nothing changed on chain.
    ApprovalFailed,
    /// Deposit was rejected or reverted. The allowance stays granted.
    DepositFailed,
    /// The deposit was included but the accounting read failed.
    VerificationFailed,
}

/// Position of an attempt in the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepositState {
    Idle,
    Approving,
    Depositing,
    Verifying,
    Completed,
    Failed(FailureReason),
    /// Inclusion was not observed in time. The transaction may still land.
    TimedOut(Phase),
}

impl DepositState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DepositState::Completed | DepositState::Failed(_) | DepositState::TimedOut(_)
        )
    }
}

impl From<Phase> for DepositState {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::Approving => DepositState::Approving,
            Phase::Depositing => DepositState::Depositing,
            Phase::Verifying => DepositState::Verifying,
        }
    }
}

impl fmt::Display for DepositState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DepositState::Idle => write!(f, "Idle"),
            DepositState::Approving => write!(f, "Approving"),
            DepositState::Depositing => write!(f, "Depositing"),
            DepositState::Verifying => write!(f, "Verifying"),
            DepositState::Completed => write!(f, "Completed"),
            DepositState::Failed(reason) => write!(f, "Failed({reason})"),
            DepositState::TimedOut(phase) => write!(f, "TimedOut({phase})"),
        }
    }
}

/// Outcome of one attempt. Always returned once the request is valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositReport {
    pub state: DepositState,
    /// Hash of the approval once the node accepted it, included or not.
    pub approval_tx: Option<TxHash>,
    pub approval: Option<TxReceipt>,
    /// Hash of the deposit once the node accepted it, included or not.
    pub deposit_tx: Option<TxHash>,
    pub deposit: Option<TxReceipt>,
    /// `totalDeposits()` read after the deposit was included.
    pub total_deposits: Option<U256>,
    /// Human-readable explanation of a non-completed outcome.
    pub detail: Option<String>,
}

impl DepositReport {
    fn new() -> Self {
        Self {
            state: DepositState::Idle,
            approval_tx: None,
            approval: None,
            deposit_tx: None,
            deposit: None,
            total_deposits: None,
            detail: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.state == DepositState::Completed
    }

    /// Whether an approval was included without a matching deposit: the
    /// strategy still holds an allowance over the funding account.
    pub fn has_residual_allowance(&self) -> bool {
        matches!(
            self.state,
            DepositState::Failed(FailureReason::DepositFailed)
                | DepositState::TimedOut(Phase::Depositing)
        )
    }
}

/// Runs deposit attempts for one funding account.
///
/// Attempts share nothing but the signer's transport, so several can run
/// concurrently against different strategies.
#[derive(Debug)]
pub struct DepositOrchestrator<T> {
    signer: SignerHandle<T>,
    inclusion: InclusionPolicy,
}

impl<T: Transport> DepositOrchestrator<T> {
    pub fn new(signer: SignerHandle<T>) -> Self {
        Self {
            signer,
            inclusion: InclusionPolicy::default(),
        }
    }

    pub fn with_inclusion_policy(mut self, inclusion: InclusionPolicy) -> Self {
        self.inclusion = inclusion;
        self
    }

    /// Run one attempt from Idle to a terminal state.
    ///
    /// Only request validation errors are returned as `Err`; they are raised
    /// before anything is submitted. Every remote failure ends up in the
    /// report.
    pub async fn start(&self, request: &DepositRequest) -> Result<DepositReport> {
        request.validate()?;

        let token = bind_address(
            request.funding_token,
            InterfaceDescriptor::funding_token(),
            self.signer.clone(),
        );
        let strategy = bind_address(
            request.strategy,
            InterfaceDescriptor::strategy(),
            self.signer.clone(),
        );

        let mut report = DepositReport::new();

        tracing::info!(
            account = %self.signer.address(),
            token = %request.funding_token,
            strategy = %request.strategy,
            amount = %request.amount,
            auto_compound = request.auto_compound,
            "Starting deposit attempt"
        );

        // Approving
        transition(&mut report, DepositState::Approving);
        let approve = IFundingToken::approveCall {
            spender: request.strategy,
            amount: request.amount,
        };
        match self.include(&token, &approve, &mut report.approval_tx).await {
            Ok(receipt) if receipt.succeeded() => report.approval = Some(receipt),
            Ok(receipt) => {
                let detail = format!(
                    "approval transaction {} reverted in block {}",
                    receipt.transaction_hash, receipt.block_number
                );
                report.approval = Some(receipt);
                return Ok(fail(report, FailureReason::ApprovalFailed, detail));
            }
            Err(err) => return Ok(abort(report, Phase::Approving, err)),
        }

        // Depositing
        transition(&mut report, DepositState::Depositing);
        let deposit = IStrategy::depositFundsCall {
            amount: request.amount,
            autoCompound: request.auto_compound,
        };
        match self.include(&strategy, &deposit, &mut report.deposit_tx).await {
            Ok(receipt) if receipt.succeeded() => report.deposit = Some(receipt),
            Ok(receipt) => {
                let detail = format!(
                    "deposit transaction {} reverted in block {}",
                    receipt.transaction_hash, receipt.block_number
                );
                report.deposit = Some(receipt);
                return Ok(fail(report, FailureReason::DepositFailed, detail));
            }
            Err(err) => return Ok(abort(report, Phase::Depositing, err)),
        }

        // Verifying
        transition(&mut report, DepositState::Verifying);
        match strategy.read(&IStrategy::totalDepositsCall {}).await {
            Ok(total) => report.total_deposits = Some(total),
            Err(err) => return Ok(abort(report, Phase::Verifying, err)),
        }

        transition(&mut report, DepositState::Completed);
        tracing::info!(
            total_deposits = ?report.total_deposits,
            "Deposit completed"
        );

        Ok(report)
    }

    /// Submit `call` through `handle`, record its hash in `submitted`, and
    /// wait for its receipt.
    async fn include<C: SolCall>(
        &self,
        handle: &ContractHandle<T>,
        call: &C,
        submitted: &mut Option<TxHash>,
    ) -> Result<TxReceipt> {
        let tx_hash = handle.send(call).await?;
        *submitted = Some(tx_hash);
        tracing::debug!(%tx_hash, method = C::SIGNATURE, "Waiting for inclusion");
        rpc::wait_for_receipt(self.signer.transport(), tx_hash, self.inclusion).await
    }
}

fn transition(report: &mut DepositReport, next: DepositState) {
    tracing::debug!(from = %report.state, to = %next, "Deposit state transition");
    report.state = next;
}

fn fail(mut report: DepositReport, reason: FailureReason, detail: String) -> DepositReport {
    let detail = match reason {
        FailureReason::ApprovalFailed => detail,
        FailureReason::DepositFailed => format!(
            "{detail}; the approval granted to the strategy remains outstanding until \
             overwritten by a later attempt or revoked"
        ),
        FailureReason::VerificationFailed => format!(
            "{detail}; the deposit was included and likely succeeded, but the \
             resulting total could not be confirmed"
        ),
    };

    tracing::error!(%reason, detail = %detail, "Deposit attempt failed");

    transition(&mut report, DepositState::Failed(reason));
    report.detail = Some(detail);
    report
}

/// Translate an error raised during `phase` into the matching terminal state.
fn abort(mut report: DepositReport, phase: Phase, err: DepositError) -> DepositReport {
    if let DepositError::Timeout { .. } = err {
        let detail = format!("{err}; the transaction may still be included later");
        tracing::warn!(%phase, detail = %detail, "Deposit attempt timed out");
        transition(&mut report, DepositState::TimedOut(phase));
        report.detail = Some(detail);
        return report;
    }

    let reason = match phase {
        Phase::Approving => FailureReason::ApprovalFailed,
        Phase::Depositing => FailureReason::DepositFailed,
        Phase::Verifying => FailureReason::VerificationFailed,
    };
    fail(report, reason, err.to_string())
}
