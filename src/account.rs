// src/account.rs
use std::sync::Arc;

use ethers::abi::{AbiDecode, AbiEncode};
use ethers::contract::{ContractError, EthError};
use ethers::providers::Middleware;
use ethers::types::{Address, Bytes, U256};
use tracing::debug;

use crate::contracts::account_factory_api::CreateAccountCall;
use crate::contracts::entry_point_api::{
    EntryPointAPI, EntryPointAPIErrors, SenderAddressResult,
};
use crate::contracts::simple_account_api::ExecuteCall;
use crate::error::ClientError;

/// Builds `initCode`: the factory address followed by the encoded
/// `createAccount(owner, salt)` call the EntryPoint uses to deploy the account.
pub fn build_init_code(factory: Address, owner: Address, salt: U256) -> Bytes {
    let mut init_code = factory.as_bytes().to_vec();
    init_code.extend(CreateAccountCall { owner, salt }.encode());
    Bytes::from(init_code)
}

/// Encodes the account's `execute(dest, value, func)` call.
pub fn build_execute_call(dest: Address, value: U256, func: Bytes) -> Bytes {
    Bytes::from(ExecuteCall { dest, value, func }.encode())
}

/// Derives the counterfactual account address without deploying anything.
pub struct AddressDeriver<M: Middleware> {
    entry_point: EntryPointAPI<M>,
}

impl<M: Middleware> AddressDeriver<M> {
    pub fn new(eth_client: Arc<M>, entry_point: Address) -> Self {
        Self { entry_point: EntryPointAPI::new(entry_point, eth_client) }
    }

    /// `getSenderAddress` is built to always revert with the derived address
    /// embedded in the revert payload, so a successful call means the
    /// EntryPoint broke its own contract.
    pub async fn derive_sender(&self, init_code: Bytes) -> Result<Address, ClientError> {
        match self.entry_point.get_sender_address(init_code).call().await {
            Ok(_) => Err(ClientError::AddressDerivation(
                "getSenderAddress did not revert".into(),
            )),
            Err(ContractError::Revert(payload)) => sender_from_revert(&payload),
            Err(err) => {
                // Some nodes bury the revert payload inside the error message
                // instead of the structured data field.
                let message = err.to_string();
                if let Some(sender) = sender_from_message(&message) {
                    debug!("recovered sender address from error message");
                    return Ok(sender);
                }
                Err(ClientError::Rpc(message))
            }
        }
    }
}

fn sender_from_revert(payload: &Bytes) -> Result<Address, ClientError> {
    match EntryPointAPIErrors::decode(payload.as_ref()) {
        Ok(EntryPointAPIErrors::SenderAddressResult(result)) => Ok(result.sender),
        Ok(other) => Err(ClientError::AddressDerivation(format!(
            "unexpected revert: {other:?}"
        ))),
        Err(err) => Err(ClientError::AddressDerivation(format!(
            "revert payload could not be decoded: {err}"
        ))),
    }
}

/// Scans an error message for the `SenderAddressResult` selector and decodes
/// the address word that follows it.
fn sender_from_message(message: &str) -> Option<Address> {
    let selector = format!("0x{}", hex::encode(SenderAddressResult::selector()));
    let start = message.find(&selector)? + selector.len();
    let word: String = message[start..]
        .chars()
        .take_while(char::is_ascii_hexdigit)
        .collect();
    if word.len() < 64 {
        return None;
    }
    let address_bytes = hex::decode(&word[24..64]).ok()?;
    Some(Address::from_slice(&address_bytes))
}
