// src/error.rs
use ethers::signers::WalletError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Address derivation failed: {0}")]
    AddressDerivation(String),

    #[error("Invalid signature length: expected 65 bytes, got {0}")]
    InvalidSignatureLength(usize),

    #[error("RPC failure: {0}")]
    Rpc(String),

    #[error("Receipt polling timed out after {attempts} attempts")]
    TimedOut { attempts: u32 },

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),
}

impl From<WalletError> for ClientError {
    fn from(err: WalletError) -> Self {
        ClientError::Rpc(err.to_string())
    }
}

impl From<jsonrpsee::core::Error> for ClientError {
    fn from(err: jsonrpsee::core::Error) -> Self {
        ClientError::Rpc(err.to_string())
    }
}
