// src/builder.rs
use std::sync::Arc;

use ethers::providers::Middleware;
use ethers::types::{Address, Bytes, U256};
use tracing::debug;

use crate::error::ClientError;
use crate::types::UserOperation;

// Gas limit policy used when the caller supplies nothing. These are generous
// placeholders, not estimates; real deployments should size them per target.
pub const DEFAULT_CALL_GAS_LIMIT: u64 = 100_000;
pub const DEFAULT_VERIFICATION_GAS_LIMIT: u64 = 400_000;
pub const DEFAULT_PRE_VERIFICATION_GAS: u64 = 50_000;

/// Assembles the unsigned user operation: sender and init code from the
/// deriver, opaque call data from the caller, policy gas limits, and fee
/// fields sourced from a live gas price query. No gas estimation happens here.
pub struct UserOperationBuilder<M: Middleware> {
    eth_client: Arc<M>,
    sender: Address,
    init_code: Bytes,
    call_data: Bytes,
    nonce: Option<U256>,
    call_gas_limit: U256,
    verification_gas_limit: U256,
    pre_verification_gas: U256,
}

impl<M: Middleware> UserOperationBuilder<M> {
    pub fn new(eth_client: Arc<M>, sender: Address, init_code: Bytes, call_data: Bytes) -> Self {
        Self {
            eth_client,
            sender,
            init_code,
            call_data,
            nonce: None,
            call_gas_limit: DEFAULT_CALL_GAS_LIMIT.into(),
            verification_gas_limit: DEFAULT_VERIFICATION_GAS_LIMIT.into(),
            pre_verification_gas: DEFAULT_PRE_VERIFICATION_GAS.into(),
        }
    }

    /// Use an explicit nonce instead of querying the chain.
    pub fn nonce(mut self, nonce: U256) -> Self {
        self.nonce = Some(nonce);
        self
    }

    pub fn gas_limits(
        mut self,
        call_gas_limit: U256,
        verification_gas_limit: U256,
        pre_verification_gas: U256,
    ) -> Self {
        self.call_gas_limit = call_gas_limit;
        self.verification_gas_limit = verification_gas_limit;
        self.pre_verification_gas = pre_verification_gas;
        self
    }

    /// Produces the unsigned operation. Queries the nonce (unless supplied)
    /// and the current gas price; `paymaster_and_data` and `signature` stay
    /// empty for the co-sign and sign stages.
    pub async fn build(&self) -> Result<UserOperation, ClientError> {
        let nonce = match self.nonce {
            Some(nonce) => nonce,
            None => self
                .eth_client
                .get_transaction_count(self.sender, None)
                .await
                .map_err(|e| ClientError::Rpc(e.to_string()))?,
        };

        let gas_price = self
            .eth_client
            .get_gas_price()
            .await
            .map_err(|e| ClientError::Rpc(e.to_string()))?;
        debug!("building operation with nonce {nonce} and gas price {gas_price}");

        Ok(UserOperation {
            sender: self.sender,
            nonce,
            init_code: self.init_code.clone(),
            call_data: self.call_data.clone(),
            call_gas_limit: self.call_gas_limit,
            verification_gas_limit: self.verification_gas_limit,
            pre_verification_gas: self.pre_verification_gas,
            max_fee_per_gas: gas_price,
            max_priority_fee_per_gas: gas_price,
            paymaster_and_data: Bytes::default(),
            signature: Bytes::default(),
        })
    }
}
