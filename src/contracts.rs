// src/contracts.rs
//
// Generated bindings for the on-chain collaborators: the EntryPoint subset the
// flow touches, the account factory and account call encoders, and the
// verifying paymaster hash function (EntryPoint v0.6 operation layout).
use ethers::contract::abigen;

use crate::types::UserOperation;

abigen!(
    EntryPointAPI,
    r#"[
        function getSenderAddress(bytes memory initCode) external
        error SenderAddressResult(address sender)
        error FailedOp(uint256 opIndex, string reason)
    ]"#
);

abigen!(
    AccountFactoryAPI,
    r#"[
        function createAccount(address owner, uint256 salt) external returns (address)
    ]"#
);

abigen!(
    SimpleAccountAPI,
    r#"[
        function execute(address dest, uint256 value, bytes calldata func) external
    ]"#
);

abigen!(
    VerifyingPaymasterAPI,
    r#"[
        struct UserOperation {address sender;uint256 nonce;bytes initCode;bytes callData;uint256 callGasLimit;uint256 verificationGasLimit;uint256 preVerificationGas;uint256 maxFeePerGas;uint256 maxPriorityFeePerGas;bytes paymasterAndData;bytes signature;}
        function getHash(UserOperation calldata userOp, uint48 validUntil, uint48 validAfter) external view returns (bytes32)
    ]"#
);

impl From<&UserOperation> for verifying_paymaster_api::UserOperation {
    fn from(op: &UserOperation) -> Self {
        Self {
            sender: op.sender,
            nonce: op.nonce,
            init_code: op.init_code.clone(),
            call_data: op.call_data.clone(),
            call_gas_limit: op.call_gas_limit,
            verification_gas_limit: op.verification_gas_limit,
            pre_verification_gas: op.pre_verification_gas,
            max_fee_per_gas: op.max_fee_per_gas,
            max_priority_fee_per_gas: op.max_priority_fee_per_gas,
            paymaster_and_data: op.paymaster_and_data.clone(),
            signature: op.signature.clone(),
        }
    }
}
