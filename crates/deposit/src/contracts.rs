//! Contract bindings: minimal interfaces and signer-bound handles.

use std::str::FromStr;

use alloy_core::primitives::{Address, Bytes, TxHash};
use alloy_sol_types::{SolCall, sol};
use derive_more::Deref;

use crate::{
    error::{DepositError, Result},
    rpc::{self, Transport},
    signer::{SignerHandle, TxRequest},
};

sol! {
    /// The subset of ERC-20 the workflow touches.
    interface IFundingToken {
        function approve(address spender, uint256 amount) external returns (bool);
        function balanceOf(address owner) external view returns (uint256);
        function transfer(address to, uint256 amount) external returns (bool);
        function allowance(address owner, address spender) external view returns (uint256);
    }

    /// Deposit entry point and accounting accessor of a yield strategy.
    interface IStrategy {
        function depositFunds(uint256 amount, bool autoCompound) external returns (uint256, uint256, uint256, uint256);
        function totalDeposits() external view returns (uint256);
    }
}

/// Ordered set of method signatures a handle is allowed to call.
#[derive(Debug, Clone, PartialEq, Eq, Deref)]
pub struct InterfaceDescriptor {
    #[deref]
    signatures: Vec<&'static str>,
    name: &'static str,
}

impl InterfaceDescriptor {
    pub fn new(name: &'static str) -> Self {
        Self {
            signatures: Vec::new(),
            name,
        }
    }

    /// Add the method of `C`. Duplicates are ignored.
    pub fn with<C: SolCall>(mut self) -> Self {
        if !self.signatures.contains(&C::SIGNATURE) {
            self.signatures.push(C::SIGNATURE);
        }
        self
    }

    /// Funding token: approve, balanceOf, transfer, allowance.
    pub fn funding_token() -> Self {
        Self::new("funding token")
            .with::<IFundingToken::approveCall>()
            .with::<IFundingToken::balanceOfCall>()
            .with::<IFundingToken::transferCall>()
            .with::<IFundingToken::allowanceCall>()
    }

    /// Strategy: depositFunds, totalDeposits.
    pub fn strategy() -> Self {
        Self::new("strategy")
            .with::<IStrategy::depositFundsCall>()
            .with::<IStrategy::totalDepositsCall>()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn supports(&self, signature: &str) -> bool {
        self.signatures.iter().any(|s| *s == signature)
    }
}

/// Parse an account identifier: `0x` followed by 40 hex characters.
///
/// Mixed-case input must carry a valid EIP-55 checksum; all-lowercase or
/// all-uppercase input is accepted as is.
pub fn parse_address(addr: &str) -> Result<Address> {
    let invalid = |reason: &str| DepositError::InvalidAddress {
        address: addr.to_string(),
        reason: reason.to_string(),
    };

    let Some(digits) = addr.strip_prefix("0x") else {
        return Err(invalid("expected 0x prefix"));
    };
    if digits.len() != 40 {
        return Err(invalid(&format!("expected 40 hex characters, got {}", digits.len())));
    }
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid("contains non-hex characters"));
    }

    let address = Address::from_str(addr).map_err(|e| invalid(&e.to_string()))?;

    let has_upper = digits.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = digits.chars().any(|c| c.is_ascii_lowercase());
    if has_upper && has_lower && address.to_checksum(None) != addr {
        return Err(invalid("checksum mismatch"));
    }

    Ok(address)
}

/// Resolve a handle for the contract at `address`.
pub fn bind<T: Transport>(
    address: &str,
    interface: InterfaceDescriptor,
    signer: SignerHandle<T>,
) -> Result<ContractHandle<T>> {
    Ok(bind_address(parse_address(address)?, interface, signer))
}

/// Same as [`bind`] for an address that is already parsed.
pub fn bind_address<T: Transport>(
    address: Address,
    interface: InterfaceDescriptor,
    signer: SignerHandle<T>,
) -> ContractHandle<T> {
    tracing::debug!(
        %address,
        interface = interface.name(),
        signer = %signer.address(),
        "Bound contract handle"
    );

    ContractHandle {
        address,
        interface,
        signer,
    }
}

/// Execute a view call against `to` at the latest block and decode the result.
pub async fn call_view<T, C>(transport: &T, from: Option<Address>, to: Address, call: &C) -> Result<C::Return>
where
    T: Transport,
    C: SolCall,
{
    let mut request = serde_json::json!({
        "to": to,
        "data": Bytes::from(call.abi_encode()),
    });
    if let Some(from) = from {
        request["from"] = serde_json::json!(from);
    }

    let output: Bytes =
        rpc::json_rpc_call(transport, "eth_call", vec![request, serde_json::json!("latest")]).await?;

    C::abi_decode_returns(&output).map_err(|e| {
        DepositError::unexpected("eth_call", format!("cannot decode {} output: {e}", C::SIGNATURE))
    })
}

/// A contract address bound to an interface and a signer.
#[derive(Debug)]
pub struct ContractHandle<T> {
    address: Address,
    interface: InterfaceDescriptor,
    signer: SignerHandle<T>,
}

impl<T: Transport> ContractHandle<T> {
    pub fn address(&self) -> Address {
        self.address
    }

    fn ensure_supported<C: SolCall>(&self) -> Result<()> {
        if self.interface.supports(C::SIGNATURE) {
            Ok(())
        } else {
            Err(DepositError::UnsupportedMethod {
                signature: C::SIGNATURE,
                address: self.address,
            })
        }
    }

    /// Submit `call` as a transaction from the bound signer.
    ///
    /// Returns as soon as the node acknowledges the submission; inclusion is
    /// the caller's business.
    pub async fn send<C: SolCall>(&self, call: &C) -> Result<TxHash> {
        self.ensure_supported::<C>()?;

        self.signer
            .send_transaction(TxRequest {
                from: self.signer.address(),
                to: self.address,
                data: call.abi_encode().into(),
            })
            .await
    }

    /// Read `call` at the latest block.
    pub async fn read<C: SolCall>(&self, call: &C) -> Result<C::Return> {
        self.ensure_supported::<C>()?;
        call_view(
            self.signer.transport(),
            Some(self.signer.address()),
            self.address,
            call,
        )
        .await
    }
}
