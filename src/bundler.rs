// src/bundler.rs
use std::time::Duration;

use ethers::types::{Address, Log, TransactionReceipt, H256, U256};
use jsonrpsee::core::RpcResult;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::proc_macros::rpc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ClientError;
use crate::types::UserOperation;

/// ERC-4337 `eth` namespace exposed by bundlers. The server half is compiled
/// for tests only, where it backs the mock bundler.
#[cfg_attr(not(test), rpc(client, namespace = "eth"))]
#[cfg_attr(test, rpc(client, server, namespace = "eth"))]
pub trait BundlerApi {
    /// Submits a signed user operation; returns the operation hash, not a
    /// transaction hash.
    #[method(name = "sendUserOperation")]
    async fn send_user_operation(
        &self,
        user_operation: UserOperation,
        entry_point: Address,
    ) -> RpcResult<H256>;

    /// Receipt of an included user operation, or null while pending.
    #[method(name = "getUserOperationReceipt")]
    async fn get_user_operation_receipt(
        &self,
        user_operation_hash: H256,
    ) -> RpcResult<Option<UserOperationReceipt>>;
}

/// Receipt returned by `eth_getUserOperationReceipt`, wrapping the receipt of
/// the bundle transaction the operation landed in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationReceipt {
    #[serde(rename = "userOpHash")]
    pub user_operation_hash: H256,
    pub sender: Address,
    pub nonce: U256,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paymaster: Option<Address>,
    pub actual_gas_cost: U256,
    pub actual_gas_used: U256,
    pub success: bool,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub logs: Vec<Log>,
    #[serde(rename = "receipt")]
    pub tx_receipt: TransactionReceipt,
}

/// Result of a single receipt poll.
#[derive(Debug)]
pub enum PollStatus {
    Pending,
    Included(Box<UserOperationReceipt>),
}

/// Client for the bundler endpoint: submission plus bounded receipt polling.
pub struct BundlerClient {
    client: HttpClient,
    entry_point: Address,
    poll_interval: Duration,
    max_polls: u32,
}

impl BundlerClient {
    pub fn new(
        url: &str,
        entry_point: Address,
        poll_interval: Duration,
        max_polls: u32,
    ) -> Result<Self, ClientError> {
        let client = HttpClientBuilder::default().build(url)?;
        Ok(Self { client, entry_point, poll_interval, max_polls })
    }

    pub async fn submit(&self, op: &UserOperation) -> Result<H256, ClientError> {
        let hash = self
            .client
            .send_user_operation(op.clone(), self.entry_point)
            .await?;
        info!("submitted user operation {hash:?}");
        Ok(hash)
    }

    pub async fn poll_once(&self, op_hash: H256) -> Result<PollStatus, ClientError> {
        Ok(match self.client.get_user_operation_receipt(op_hash).await? {
            Some(receipt) => PollStatus::Included(Box::new(receipt)),
            None => PollStatus::Pending,
        })
    }

    /// Polls for the receipt until inclusion or until `max_polls` attempts
    /// are spent, with a fixed delay between attempts.
    pub async fn wait_for_inclusion(
        &self,
        op_hash: H256,
    ) -> Result<UserOperationReceipt, ClientError> {
        for attempt in 1..=self.max_polls {
            match self.poll_once(op_hash).await? {
                PollStatus::Included(receipt) => {
                    info!("user operation included after {attempt} poll(s)");
                    return Ok(*receipt);
                }
                PollStatus::Pending => {
                    debug!("receipt not available (attempt {attempt}/{})", self.max_polls);
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
        Err(ClientError::TimedOut { attempts: self.max_polls })
    }
}
