// src/paymaster.rs
use std::sync::Arc;

use ethers::providers::Middleware;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Bytes, H256};
use tracing::debug;

use crate::contracts::verifying_paymaster_api::VerifyingPaymasterAPI;
use crate::error::ClientError;
use crate::types::{PaymasterAndData, UserOperation, ValidityWindow, SIGNATURE_LENGTH};

/// Produces the paymaster co-signature for a user operation: fetches the
/// paymaster's hash of (operation, window) from the contract, signs it with
/// the paymaster key, and packs the result into `paymasterAndData`.
pub struct PaymasterSigner<M: Middleware> {
    wallet: LocalWallet,
    contract: VerifyingPaymasterAPI<M>,
    paymaster: Address,
}

impl<M: Middleware> PaymasterSigner<M> {
    pub fn new(eth_client: Arc<M>, paymaster: Address, signing_key: LocalWallet) -> Self {
        Self {
            wallet: signing_key,
            contract: VerifyingPaymasterAPI::new(paymaster, eth_client),
            paymaster,
        }
    }

    pub async fn co_sign(
        &self,
        op: &UserOperation,
        window: ValidityWindow,
    ) -> Result<Bytes, ClientError> {
        self.validate(op)?;

        let hash = self.paymaster_hash(op, window).await?;
        debug!("paymaster hash {hash:?}");

        let signature = self.sign_hash(hash).await?;

        PaymasterAndData {
            paymaster: self.paymaster,
            valid_until: window.valid_until,
            valid_after: window.valid_after,
            signature,
        }
        .pack()
    }

    fn validate(&self, op: &UserOperation) -> Result<(), ClientError> {
        if op.max_fee_per_gas.is_zero() || op.max_priority_fee_per_gas.is_zero() {
            return Err(ClientError::InvalidParameters(
                "gas price cannot be zero".into(),
            ));
        }
        Ok(())
    }

    /// The hash the paymaster verifies on-chain; its formula belongs to the
    /// paymaster contract, so it is always fetched from the view function.
    async fn paymaster_hash(
        &self,
        op: &UserOperation,
        window: ValidityWindow,
    ) -> Result<H256, ClientError> {
        let hash = self
            .contract
            .get_hash(op.into(), window.valid_until, window.valid_after)
            .call()
            .await
            .map_err(|e| ClientError::Rpc(e.to_string()))?;
        Ok(H256::from(hash))
    }

    /// Standard signed-message (EIP-191) signature over the paymaster hash.
    async fn sign_hash(&self, hash: H256) -> Result<Bytes, ClientError> {
        let signature = Bytes::from(self.wallet.sign_message(hash.as_bytes()).await?.to_vec());
        if signature.len() != SIGNATURE_LENGTH {
            return Err(ClientError::InvalidSignatureLength(signature.len()));
        }
        Ok(signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::{encode_packed, Token};
    use ethers::providers::Provider;
    use ethers::types::{Signature, U256};
    use ethers::utils::keccak256;

    const PAYMASTER: &str = "0x4ed8A35E1dF2Fa4F675371F2f1cD716273a033Cd";
    const SIGNER_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn unsigned_op() -> UserOperation {
        UserOperation {
            sender: "0x9c5754De1443984659E1b3a8d1931D83475ba29C".parse().unwrap(),
            max_fee_per_gas: U256::from(1_000_000_000_u64),
            max_priority_fee_per_gas: U256::from(1_000_000_000_u64),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn co_sign_produces_exact_packed_bytes() {
        let (provider, mock) = Provider::mocked();
        let hash = H256::from(keccak256(b"fixed operation"));
        mock.push::<Bytes, _>(Bytes::from(hash.as_bytes().to_vec())).unwrap();

        let wallet: LocalWallet = SIGNER_KEY.parse().unwrap();
        let signer =
            PaymasterSigner::new(Arc::new(provider), PAYMASTER.parse().unwrap(), wallet.clone());
        let window = ValidityWindow::new(0x0000_0000_0000_1234, 0x0000_0000_dead_beef).unwrap();

        let packed = signer.co_sign(&unsigned_op(), window).await.unwrap();

        // Composed independently: paymaster || packed(validUntil, validAfter, sig).
        let signature = wallet.sign_message(hash.as_bytes()).await.unwrap().to_vec();
        let expected = [
            PAYMASTER.parse::<Address>().unwrap().as_bytes().to_vec(),
            encode_packed(&[
                Token::Uint(U256::from(0x0000_0000_dead_beef_u64)),
                Token::Uint(U256::from(0x0000_0000_0000_1234_u64)),
                Token::Bytes(signature),
            ])
            .unwrap(),
        ]
        .concat();
        assert_eq!(packed.to_vec(), expected);
    }

    #[tokio::test]
    async fn co_signature_recovers_to_paymaster_signer() {
        let (provider, mock) = Provider::mocked();
        let hash = H256::from(keccak256(b"another operation"));
        mock.push::<Bytes, _>(Bytes::from(hash.as_bytes().to_vec())).unwrap();

        let wallet: LocalWallet = SIGNER_KEY.parse().unwrap();
        let signer =
            PaymasterSigner::new(Arc::new(provider), PAYMASTER.parse().unwrap(), wallet.clone());
        let window = ValidityWindow::starting_now(3600).unwrap();

        let packed = signer.co_sign(&unsigned_op(), window).await.unwrap();
        let decoded = PaymasterAndData::unpack(&packed).unwrap();

        assert_eq!(decoded.paymaster, PAYMASTER.parse::<Address>().unwrap());
        assert_eq!(decoded.valid_until, window.valid_until);
        assert_eq!(decoded.valid_after, window.valid_after);

        let signature = Signature::try_from(decoded.signature.as_ref()).unwrap();
        assert_eq!(signature.recover(hash.as_bytes()).unwrap(), wallet.address());
    }

    #[tokio::test]
    async fn rejects_zero_gas_price() {
        let (provider, _mock) = Provider::mocked();
        let signer = PaymasterSigner::new(
            Arc::new(provider),
            PAYMASTER.parse().unwrap(),
            SIGNER_KEY.parse::<LocalWallet>().unwrap(),
        );

        let op = UserOperation::default();
        let window = ValidityWindow::starting_now(3600).unwrap();
        assert!(matches!(
            signer.co_sign(&op, window).await,
            Err(ClientError::InvalidParameters(_))
        ));
    }
}
