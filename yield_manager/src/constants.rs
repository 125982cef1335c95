//! Yield Manager's Constants

use alloy_primitives::{address, Address, U256};

/// Chain ID
pub const CHAIN_ID: u64 = 3_441_006; // Manta Pacific testnet

/// Every handled asset uses six decimal places on the reference deployment.
pub const ASSET_DECIMALS: u32 = 6;

/// Smallest-unit scale shared by all handled assets
pub const SCALE: u64 = 1_000_000; // 10^6
pub fn scale() -> U256 {
    U256::from(SCALE)
}

/// Fixed overshoot added to every token approval, in smallest units.
/// Covers amount drift between the approval and the spending call.
pub const APPROVAL_BUFFER: u64 = 10;
pub fn approval_buffer() -> U256 {
    U256::from(APPROVAL_BUFFER)
}

/// Gas limit used for every submitted transaction
pub const GAS_LIMIT: u128 = 1_000_000;

/// Swap router contract. Also the spender for the pre-swap approval.
pub const SWAP_ROUTER: Address = address!("0b561A287588675AccE2f190FFa2AdCb30145e01");

/// Token contracts
pub const USDC_TOKEN: Address = address!("94F0Fd09f425Be15C7Bc0575Aa71780A044039e3");
pub const UNI_TOKEN: Address = address!("6c8D1fd3AA9F436CBA20E4b6A5aeDb1bf814A732");
pub const WETH_TOKEN: Address = address!("3455b6B22cBD998512286428De8844CBFBcc06C2");
pub const USDT_TOKEN: Address = address!("7598099fFC36dCC3e96F3aB33f18E86F85ae7E44");
pub const DAI_TOKEN: Address = address!("74A8Ee760959AF0B18307861e92769CfEcC42f9B");

/// Staking pool contracts
pub const UNISWAP_STAKING: Address = address!("a976c4930e253CE56Ff129404a95F0578345C113");
pub const COMPOUND_V3_STAKING: Address = address!("d39ef51d10FAeE75FE6fe66537F3D8128Ec72dA5");
pub const USDX_MONEY_STAKING: Address = address!("F50c64a2C422C6809e5BdbcF4Bb5af38D06a033a");
pub const STARGATE_V3_STAKING: Address = address!("60e78201ac487E5C382379dc8f9e39a896396728");
pub const AAVE_V3_STAKING: Address = address!("23218e77D017AD293496976A5ee9Eb3F3F5EF217");

/// Backend serving the protocol/APY snapshot
pub const DEFAULT_ORACLE_ENDPOINT: &str = "https://opti-backend.vercel.app/staking";

/// Max response bytes accepted from the oracle outcall
pub const ORACLE_MAX_RESPONSE_BYTES: u64 = 16_000;

/// Cycles attached to the oracle HTTPS outcall
pub const ORACLE_REQUEST_CYCLES: u128 = 50_000_000_000;

/// Cycles attached to `eth_sendRawTransaction` calls
pub const SEND_TX_CYCLES: u128 = 40_000_000_000;

/// Cycles attached to `eth_getTransactionReceipt` calls
pub const RECEIPT_CYCLES: u128 = 10_000_000_000;

/// Rebalance cycle interval, in seconds
pub const CYCLE_INTERVAL: u64 = 3_600;

/// Journal/reputation cleanup interval, in seconds
pub const CLEANUP_INTERVAL: u64 = 86_400;

/// Account lock timeout, in seconds
pub const ACCOUNT_LOCK_TIMEOUT: u64 = 3_600;

/// Max number of receipt polls before an inclusion wait times out
pub const MAX_INCLUSION_CHECKS: u8 = 10;

/// RPC endpoints for the fixed chain
pub const MANTA_PROVIDERS: [&str; 2] = [
    "https://pacific-rpc.sepolia-testnet.manta.network/http",
    "https://manta-sepolia.rpc.caldera.xyz/http",
];

/// Number of ranked providers attached to each RPC request
pub const PROVIDER_COUNT: usize = 2;

/// Threshold ECDSA key name
pub const ECDSA_KEY_NAME: &str = "key_1";

/// Ether sent to a freshly created wallet so it can pay for gas
const EOA_FUNDING_VALUE_RAW: u64 = 100_000_000_000_000; // 0.0001 ETH in WEI
pub fn eoa_funding_value() -> U256 {
    U256::from(EOA_FUNDING_VALUE_RAW)
}

/// Number of journal collections kept by the cleanup task
pub const JOURNAL_RETENTION: u64 = 300;
