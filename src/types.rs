// src/types.rs
use std::ops::Deref;
use std::time::{SystemTime, UNIX_EPOCH};

use ethers::abi::AbiEncode;
use ethers::contract::{EthAbiCodec, EthAbiType};
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::keccak256;
use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// Length of a packed ECDSA signature (r || s || v).
pub const SIGNATURE_LENGTH: usize = 65;

/// ERC-4337 user operation as submitted to the bundler (EntryPoint v0.6 layout).
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    /// The smart account the operation executes from (derived, never chosen).
    pub sender: Address,

    /// Anti-replay counter, assigned before signing.
    pub nonce: U256,

    /// Factory address + creation call data; empty once the account is deployed.
    pub init_code: Bytes,

    /// Encoded call the account executes.
    pub call_data: Bytes,

    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,

    /// Paymaster address + validity window + paymaster signature; empty until co-signed.
    pub paymaster_and_data: Bytes,

    /// Owner signature over the operation hash; empty until signed.
    pub signature: Bytes,
}

/// Helper for packing the user operation without its signature, with the
/// dynamic byte fields replaced by their hashes (the EntryPoint hash domain).
#[derive(EthAbiCodec, EthAbiType)]
struct UserOperationNoSignature {
    pub sender: Address,
    pub nonce: U256,
    pub init_code: H256,
    pub call_data: H256,
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub paymaster_and_data: H256,
}

impl From<&UserOperation> for UserOperationNoSignature {
    fn from(value: &UserOperation) -> Self {
        Self {
            sender: value.sender,
            nonce: value.nonce,
            init_code: keccak256(value.init_code.deref()).into(),
            call_data: keccak256(value.call_data.deref()).into(),
            call_gas_limit: value.call_gas_limit,
            verification_gas_limit: value.verification_gas_limit,
            pre_verification_gas: value.pre_verification_gas,
            max_fee_per_gas: value.max_fee_per_gas,
            max_priority_fee_per_gas: value.max_priority_fee_per_gas,
            paymaster_and_data: keccak256(value.paymaster_and_data.deref()).into(),
        }
    }
}

impl UserOperation {
    /// Packs the operation for hashing (every field except the signature).
    pub fn pack_without_signature(&self) -> Bytes {
        UserOperationNoSignature::from(self).encode().into()
    }

    /// Canonical operation hash as defined by the EntryPoint contract:
    /// `keccak256(abi.encode(keccak256(pack(op)), entryPoint, chainId))`.
    /// The domain covers `paymaster_and_data`, so this must be computed after
    /// the paymaster co-signature is in place.
    pub fn hash(&self, entry_point: &Address, chain_id: u64) -> H256 {
        H256::from_slice(
            keccak256(
                [
                    keccak256(self.pack_without_signature().deref()).to_vec(),
                    entry_point.encode(),
                    U256::from(chain_id).encode(),
                ]
                .concat(),
            )
            .as_slice(),
        )
    }
}

/// Time range in which the paymaster co-signature is honored.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ValidityWindow {
    pub valid_after: u64,
    pub valid_until: u64,
}

impl ValidityWindow {
    pub fn new(valid_after: u64, valid_until: u64) -> Result<Self, ClientError> {
        if valid_after >= valid_until {
            return Err(ClientError::InvalidParameters(format!(
                "validAfter ({valid_after}) must precede validUntil ({valid_until})"
            )));
        }
        Ok(Self { valid_after, valid_until })
    }

    /// Window opening now and closing after `valid_for` seconds.
    pub fn starting_now(valid_for: u64) -> Result<Self, ClientError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| ClientError::InvalidParameters(e.to_string()))?
            .as_secs();
        Self::new(now, now + valid_for)
    }
}

/// Decoded form of the `paymasterAndData` field:
/// paymaster address (20) || validUntil (32) || validAfter (32) || signature (65).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymasterAndData {
    pub paymaster: Address,
    pub valid_until: u64,
    pub valid_after: u64,
    pub signature: Bytes,
}

impl PaymasterAndData {
    /// Packs into the byte layout the verifying paymaster decodes on-chain.
    pub fn pack(&self) -> Result<Bytes, ClientError> {
        if self.signature.len() != SIGNATURE_LENGTH {
            return Err(ClientError::InvalidSignatureLength(self.signature.len()));
        }

        let mut data = Vec::with_capacity(20 + 64 + SIGNATURE_LENGTH);
        data.extend_from_slice(self.paymaster.as_bytes());

        let mut word = [0u8; 32];
        U256::from(self.valid_until).to_big_endian(&mut word);
        data.extend_from_slice(&word);
        U256::from(self.valid_after).to_big_endian(&mut word);
        data.extend_from_slice(&word);

        data.extend_from_slice(&self.signature);

        Ok(Bytes::from(data))
    }

    /// Decodes a packed `paymasterAndData` byte string back into its parts.
    pub fn unpack(data: &Bytes) -> Result<Self, ClientError> {
        if data.len() < 84 {
            return Err(ClientError::InvalidParameters(format!(
                "paymasterAndData too short: {} bytes",
                data.len()
            )));
        }

        let signature_length = data.len() - 84;
        if signature_length != SIGNATURE_LENGTH {
            return Err(ClientError::InvalidSignatureLength(signature_length));
        }

        Ok(Self {
            paymaster: Address::from_slice(&data[..20]),
            valid_until: word_to_u64(&data[20..52])?,
            valid_after: word_to_u64(&data[52..84])?,
            signature: Bytes::from(data[84..].to_vec()),
        })
    }
}

fn word_to_u64(word: &[u8]) -> Result<u64, ClientError> {
    let value = U256::from_big_endian(word);
    if value > U256::from(u64::MAX) {
        return Err(ClientError::InvalidParameters(
            "validity timestamp overflows u64".into(),
        ));
    }
    Ok(value.as_u64())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENTRY_POINT: &str = "0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789";
    const CHAIN_ID: u64 = 80_001;

    fn counterfactual_transfer_op() -> UserOperation {
        UserOperation {
            sender: "0x9c5754De1443984659E1b3a8d1931D83475ba29C".parse().unwrap(),
            nonce: U256::zero(),
            init_code: "0x9406cc6185a346906296840746125a0e449764545fbfb9cf000000000000000000000000ce0fefa6f7979c4c9b5373e0f5105b7259092c6d0000000000000000000000000000000000000000000000000000000000000000".parse().unwrap(),
            call_data: "0xb61d27f60000000000000000000000009c5754de1443984659e1b3a8d1931d83475ba29c00000000000000000000000000000000000000000000000000005af3107a400000000000000000000000000000000000000000000000000000000000000000600000000000000000000000000000000000000000000000000000000000000000".parse().unwrap(),
            call_gas_limit: 33_100.into(),
            verification_gas_limit: 361_460.into(),
            pre_verification_gas: 44_980.into(),
            max_fee_per_gas: 1_695_000_030_u64.into(),
            max_priority_fee_per_gas: 1_695_000_000.into(),
            paymaster_and_data: Bytes::default(),
            signature: "0xebfd4657afe1f1c05c1ec65f3f9cc992a3ac083c424454ba61eab93152195e1400d74df01fc9fa53caadcb83a891d478b713016bcc0c64307c1ad3d7ea2e2d921b".parse().unwrap(),
        }
    }

    #[test]
    fn operation_hash_known_vectors() {
        let simple = UserOperation {
            verification_gas_limit: 100_000.into(),
            pre_verification_gas: 21_000.into(),
            max_priority_fee_per_gas: 1_000_000_000.into(),
            ..Default::default()
        };
        assert_eq!(
            simple.hash(&ENTRY_POINT.parse().unwrap(), CHAIN_ID),
            "0x95418c07086df02ff6bc9e8bdc150b380cb761beecc098630440bcec6e862702"
                .parse::<H256>()
                .unwrap()
        );

        assert_eq!(
            counterfactual_transfer_op().hash(&ENTRY_POINT.parse().unwrap(), CHAIN_ID),
            "0x7c1b8c9df49a9e09ecef0f0fe6841d895850d29820f9a4b494097764085dcd7e"
                .parse::<H256>()
                .unwrap()
        );
    }

    #[test]
    fn operation_hash_deterministic_and_field_sensitive() {
        let op = counterfactual_transfer_op();
        let entry_point = ENTRY_POINT.parse().unwrap();

        assert_eq!(op.hash(&entry_point, CHAIN_ID), op.hash(&entry_point, CHAIN_ID));

        let mut sponsored = op.clone();
        sponsored.paymaster_and_data = "0x1f".parse().unwrap();
        assert_ne!(op.hash(&entry_point, CHAIN_ID), sponsored.hash(&entry_point, CHAIN_ID));

        let mut bumped = op.clone();
        bumped.nonce = op.nonce + U256::one();
        assert_ne!(op.hash(&entry_point, CHAIN_ID), bumped.hash(&entry_point, CHAIN_ID));

        // The signature is outside the hash domain.
        let mut resigned = op.clone();
        resigned.signature = Bytes::default();
        assert_eq!(op.hash(&entry_point, CHAIN_ID), resigned.hash(&entry_point, CHAIN_ID));
    }

    #[test]
    fn operation_serializes_camel_case() {
        let json = serde_json::to_value(UserOperation::default()).unwrap();
        let object = json.as_object().unwrap();
        for key in [
            "sender",
            "nonce",
            "initCode",
            "callData",
            "callGasLimit",
            "verificationGasLimit",
            "preVerificationGas",
            "maxFeePerGas",
            "maxPriorityFeePerGas",
            "paymasterAndData",
            "signature",
        ] {
            assert!(object.contains_key(key), "missing key {key}");
        }
    }

    #[test]
    fn paymaster_and_data_round_trip() {
        let original = PaymasterAndData {
            paymaster: "0x4ed8A35E1dF2Fa4F675371F2f1cD716273a033Cd".parse().unwrap(),
            valid_until: 0x0000_0000_dead_beef,
            valid_after: 0x0000_0000_0000_1234,
            signature: Bytes::from(vec![0xab; SIGNATURE_LENGTH]),
        };

        let packed = original.pack().unwrap();
        assert_eq!(packed.len(), 20 + 32 + 32 + SIGNATURE_LENGTH);

        let decoded = PaymasterAndData::unpack(&packed).unwrap();
        assert_eq!(decoded.paymaster, original.paymaster);
        assert_eq!(decoded.valid_until, original.valid_until);
        assert_eq!(decoded.valid_after, original.valid_after);
        assert_eq!(decoded.signature, original.signature);
    }

    #[test]
    fn paymaster_and_data_layout() {
        let paymaster: Address = "0x4ed8A35E1dF2Fa4F675371F2f1cD716273a033Cd".parse().unwrap();
        let packed = PaymasterAndData {
            paymaster,
            valid_until: 0x0000_0000_dead_beef,
            valid_after: 0x0000_0000_0000_1234,
            signature: Bytes::from(vec![0xcd; SIGNATURE_LENGTH]),
        }
        .pack()
        .unwrap();

        assert_eq!(&packed[..20], paymaster.as_bytes());
        assert_eq!(U256::from_big_endian(&packed[20..52]), U256::from(0xdead_beef_u64));
        assert_eq!(U256::from_big_endian(&packed[52..84]), U256::from(0x1234_u64));
        assert_eq!(&packed[84..], &[0xcd; SIGNATURE_LENGTH][..]);
    }

    #[test]
    fn paymaster_and_data_rejects_bad_signature_length() {
        let bad = PaymasterAndData {
            paymaster: Address::zero(),
            valid_until: 2,
            valid_after: 1,
            signature: Bytes::from(vec![0u8; 64]),
        };
        assert!(matches!(bad.pack(), Err(ClientError::InvalidSignatureLength(64))));

        let packed = Bytes::from(vec![0u8; 20 + 64 + 66]);
        assert!(matches!(
            PaymasterAndData::unpack(&packed),
            Err(ClientError::InvalidSignatureLength(66))
        ));

        let truncated = Bytes::from(vec![0u8; 40]);
        assert!(matches!(
            PaymasterAndData::unpack(&truncated),
            Err(ClientError::InvalidParameters(_))
        ));
    }

    #[test]
    fn validity_window_invariant() {
        assert!(ValidityWindow::new(0x1234, 0xdead_beef).is_ok());
        assert!(matches!(
            ValidityWindow::new(100, 100),
            Err(ClientError::InvalidParameters(_))
        ));
        assert!(matches!(
            ValidityWindow::new(200, 100),
            Err(ClientError::InvalidParameters(_))
        ));

        let window = ValidityWindow::starting_now(3600).unwrap();
        assert_eq!(window.valid_until - window.valid_after, 3600);
    }
}
