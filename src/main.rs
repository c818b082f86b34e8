// src/main.rs
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use dotenv::dotenv;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Bytes, U256};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

mod account;
mod builder;
mod bundler;
mod contracts;
mod error;
mod paymaster;
mod signer;
mod types;

use crate::account::AddressDeriver;
use crate::builder::UserOperationBuilder;
use crate::bundler::BundlerClient;
use crate::paymaster::PaymasterSigner;
use crate::signer::{sign_user_operation, SigningScheme};
use crate::types::ValidityWindow;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Chain JSON-RPC endpoint
    #[clap(long, env = "ETH_RPC_URL")]
    eth_rpc_url: String,

    /// Bundler JSON-RPC endpoint
    #[clap(long, env = "BUNDLER_URL")]
    bundler_url: String,

    /// Owner private key (hex)
    #[clap(long, env = "OWNER_KEY", hide_env_values = true)]
    owner_key: String,

    /// Signing key trusted by the verifying paymaster (hex)
    #[clap(long, env = "PAYMASTER_KEY", hide_env_values = true)]
    paymaster_key: String,

    /// EntryPoint contract address
    #[clap(long, default_value = "0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789")]
    entry_point: Address,

    /// Account factory address
    #[clap(long, default_value = "0x9406Cc6185a346906296840746125a0E44976454")]
    factory: Address,

    /// Verifying paymaster contract address
    #[clap(long)]
    paymaster: Address,

    /// Account creation index
    #[clap(long, default_value_t = 0)]
    salt: u64,

    /// Target of the account's execute call
    #[clap(long)]
    target: Address,

    /// Wei forwarded with the execute call
    #[clap(long, default_value_t = 0)]
    value: u128,

    /// Payload of the execute call (hex)
    #[clap(long, default_value = "0x")]
    payload: Bytes,

    /// Explicit nonce; queried from the chain when omitted
    #[clap(long)]
    nonce: Option<u64>,

    #[clap(long, default_value_t = builder::DEFAULT_CALL_GAS_LIMIT)]
    call_gas_limit: u64,

    #[clap(long, default_value_t = builder::DEFAULT_VERIFICATION_GAS_LIMIT)]
    verification_gas_limit: u64,

    #[clap(long, default_value_t = builder::DEFAULT_PRE_VERIFICATION_GAS)]
    pre_verification_gas: u64,

    /// Paymaster validity window length in seconds
    #[clap(long, default_value_t = 3600)]
    valid_for: u64,

    /// Owner signature convention expected by the bundler
    #[clap(long, value_enum, default_value = "canonical")]
    signature_scheme: SigningScheme,

    /// The account is already deployed; submit with empty init code
    #[clap(long)]
    deployed: bool,

    /// Delay between receipt polls in milliseconds
    #[clap(long, default_value_t = 1000)]
    poll_interval_ms: u64,

    /// Receipt polls before giving up
    #[clap(long, default_value_t = 60)]
    max_polls: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    let provider = Provider::<Http>::try_from(args.eth_rpc_url.as_str())?;
    let eth_client = Arc::new(provider);
    let chain_id = eth_client.get_chainid().await?.as_u64();

    let owner = args.owner_key.parse::<LocalWallet>()?.with_chain_id(chain_id);
    let paymaster_key = args.paymaster_key.parse::<LocalWallet>()?.with_chain_id(chain_id);

    // Derive the counterfactual sender. The full init code is always needed
    // for derivation, even when the deployed account submits without it.
    let init_code = account::build_init_code(args.factory, owner.address(), U256::from(args.salt));
    let deriver = AddressDeriver::new(eth_client.clone(), args.entry_point);
    let sender = deriver.derive_sender(init_code.clone()).await?;
    info!("derived sender address {sender:?}");

    // Assemble the unsigned operation.
    let call_data =
        account::build_execute_call(args.target, U256::from(args.value), args.payload.clone());
    let op_init_code = if args.deployed { Bytes::default() } else { init_code };

    let mut op_builder =
        UserOperationBuilder::new(eth_client.clone(), sender, op_init_code, call_data).gas_limits(
            args.call_gas_limit.into(),
            args.verification_gas_limit.into(),
            args.pre_verification_gas.into(),
        );
    if let Some(nonce) = args.nonce {
        op_builder = op_builder.nonce(nonce.into());
    }
    let mut op = op_builder.build().await?;
    info!("built unsigned operation with nonce {}", op.nonce);

    // Paymaster co-signature.
    let window = ValidityWindow::starting_now(args.valid_for)?;
    let paymaster_signer = PaymasterSigner::new(eth_client.clone(), args.paymaster, paymaster_key);
    op.paymaster_and_data = paymaster_signer.co_sign(&op, window).await?;
    info!(
        "paymaster co-signature obtained (valid {} -> {})",
        window.valid_after, window.valid_until
    );

    // Owner signature; runs after co-signing since the hash covers paymasterAndData.
    let op = sign_user_operation(&owner, op, &args.entry_point, chain_id, args.signature_scheme)
        .await?;
    info!("user operation ready:\n{}", serde_json::to_string_pretty(&op)?);

    // Submit to the bundler and poll for inclusion.
    let bundler = BundlerClient::new(
        &args.bundler_url,
        args.entry_point,
        Duration::from_millis(args.poll_interval_ms),
        args.max_polls,
    )?;
    let op_hash = bundler.submit(&op).await?;
    let receipt = bundler.wait_for_inclusion(op_hash).await?;

    info!(
        success = receipt.success,
        "user operation included in transaction {:?}", receipt.tx_receipt.transaction_hash
    );

    Ok(())
}
