// src/signer.rs
use clap::ValueEnum;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Bytes, H256, U256};
use tracing::debug;

use crate::error::ClientError;
use crate::types::{UserOperation, SIGNATURE_LENGTH};

/// Owner signature convention.
///
/// `Canonical` signs the EntryPoint operation hash as a personal message; the
/// hash already commits to the EntryPoint address and chain id. `Tagged`
/// re-packs the hash with both before signing, for bundlers that expect that
/// legacy convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SigningScheme {
    Canonical,
    Tagged,
}

/// Byte payload handed to the personal-message signer for a given scheme.
pub fn signing_payload(
    hash: H256,
    scheme: SigningScheme,
    entry_point: &Address,
    chain_id: u64,
) -> Vec<u8> {
    match scheme {
        SigningScheme::Canonical => hash.as_bytes().to_vec(),
        SigningScheme::Tagged => {
            let mut payload = hash.as_bytes().to_vec();
            payload.extend_from_slice(entry_point.as_bytes());
            let mut word = [0u8; 32];
            U256::from(chain_id).to_big_endian(&mut word);
            payload.extend_from_slice(&word);
            payload
        }
    }
}

/// Signs the operation with the owner key and sets its `signature` field.
/// Must run after the paymaster co-signature is in place: the operation hash
/// domain includes `paymaster_and_data`.
pub async fn sign_user_operation(
    wallet: &LocalWallet,
    op: UserOperation,
    entry_point: &Address,
    chain_id: u64,
    scheme: SigningScheme,
) -> Result<UserOperation, ClientError> {
    let hash = op.hash(entry_point, chain_id);
    debug!("signing operation hash {hash:?}");

    let payload = signing_payload(hash, scheme, entry_point, chain_id);
    let signature = Bytes::from(wallet.sign_message(payload).await?.to_vec());
    if signature.len() != SIGNATURE_LENGTH {
        return Err(ClientError::InvalidSignatureLength(signature.len()));
    }

    Ok(UserOperation { signature, ..op })
}
