//! Transaction submission on behalf of a funding account.

use std::sync::Arc;

use alloy_consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy_core::primitives::{Address, Bytes, TxHash, TxKind, U256};
use alloy_eips::eip2718::Encodable2718;
use alloy_network::TxSignerSync;
use serde_json::Value;

use crate::{
    account::FundingAccount,
    error::{DepositError, Result},
    network::GasPolicy,
    rpc::{self, Transport},
};

/// A contract call to be submitted as a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRequest {
    pub from: Address,
    pub to: Address,
    pub data: Bytes,
}

/// A funding account together with the connection it sends through.
#[derive(Debug)]
pub struct SignerHandle<T> {
    transport: Arc<T>,
    account: FundingAccount,
    gas: GasPolicy,
    chain_id: Option<u64>,
}

impl<T> Clone for SignerHandle<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            account: self.account.clone(),
            gas: self.gas,
            chain_id: self.chain_id,
        }
    }
}

impl<T: Transport> SignerHandle<T> {
    pub(crate) fn new(
        transport: Arc<T>,
        account: FundingAccount,
        gas: GasPolicy,
        chain_id: Option<u64>,
    ) -> Self {
        Self {
            transport,
            account,
            gas,
            chain_id,
        }
    }

    pub fn address(&self) -> Address {
        self.account.address()
    }

    pub fn account(&self) -> &FundingAccount {
        &self.account
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Refuse to act for any address other than our own.
    pub fn ensure_controls(&self, address: Address) -> Result<()> {
        if address == self.address() {
            Ok(())
        } else {
            Err(DepositError::Impersonation {
                address,
                reason: format!("signer is bound to {}", self.address()),
            })
        }
    }

    /// Submit `tx` and return its hash once the node has accepted it.
    pub async fn send_transaction(&self, tx: TxRequest) -> Result<TxHash> {
        self.ensure_controls(tx.from)?;

        let tx_hash = match &self.account {
            FundingAccount::Impersonated(_) => self.send_unsigned(&tx).await?,
            FundingAccount::Live(live) => self.send_signed(live.signer(), &tx).await?,
        };

        tracing::info!(
            %tx_hash,
            from = %tx.from,
            to = %tx.to,
            impersonated = self.account.is_impersonated(),
            "Transaction submitted"
        );

        Ok(tx_hash)
    }

    /// Let the node sign: only valid for accounts it has been told to trust.
    async fn send_unsigned(&self, tx: &TxRequest) -> Result<TxHash> {
        let mut request = serde_json::json!({
            "from": tx.from,
            "to": tx.to,
            "data": tx.data,
        });
        if let GasPolicy::Fixed(limit) = self.gas {
            request["gas"] = Value::String(format!("0x{limit:x}"));
        }

        rpc::json_rpc_call(self.transport.as_ref(), "eth_sendTransaction", vec![request]).await
    }

    /// Build, sign locally, and broadcast a legacy EIP-155 transaction.
    async fn send_signed(
        &self,
        signer: &alloy_signer_local::PrivateKeySigner,
        tx: &TxRequest,
    ) -> Result<TxHash> {
        let nonce = self.quantity(
            "eth_getTransactionCount",
            vec![serde_json::json!(tx.from), serde_json::json!("pending")],
        )
        .await?;
        let gas_price = self.quantity("eth_gasPrice", vec![]).await?;
        let gas_limit = match self.gas {
            GasPolicy::Fixed(limit) => limit,
            GasPolicy::Auto => {
                let estimate = self
                    .quantity(
                        "eth_estimateGas",
                        vec![serde_json::json!({
                            "from": tx.from,
                            "to": tx.to,
                            "data": tx.data,
                        })],
                    )
                    .await?;
                u64::try_from(estimate)
                    .map_err(|_| DepositError::unexpected("eth_estimateGas", "estimate exceeds u64"))?
            }
        };
        let chain_id = match self.chain_id {
            Some(chain_id) => chain_id,
            None => {
                let chain_id = self.quantity("eth_chainId", vec![]).await?;
                u64::try_from(chain_id)
                    .map_err(|_| DepositError::unexpected("eth_chainId", "chain id exceeds u64"))?
            }
        };
        let nonce = u64::try_from(nonce)
            .map_err(|_| DepositError::unexpected("eth_getTransactionCount", "nonce exceeds u64"))?;

        let mut legacy = TxLegacy {
            chain_id: Some(chain_id),
            nonce,
            gas_price,
            gas_limit,
            to: TxKind::Call(tx.to),
            value: U256::ZERO,
            input: tx.data.clone(),
        };

        let signature = signer
            .sign_transaction_sync(&mut legacy)
            .map_err(|e| DepositError::Credential(format!("failed to sign transaction: {e}")))?;
        let envelope = TxEnvelope::from(legacy.into_signed(signature));
        let raw = format!("0x{}", hex::encode(envelope.encoded_2718()));

        tracing::debug!(nonce, gas_limit, gas_price, chain_id, "Broadcasting signed transaction");

        rpc::json_rpc_call(
            self.transport.as_ref(),
            "eth_sendRawTransaction",
            vec![Value::String(raw)],
        )
        .await
    }

    async fn quantity(&self, method: &str, params: Vec<Value>) -> Result<u128> {
        let quantity: String = rpc::json_rpc_call(self.transport.as_ref(), method, params).await?;
        rpc::parse_quantity(method, &quantity)
    }
}
