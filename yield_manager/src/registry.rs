//! Closed asset/protocol universe and its on-chain address table.
//!
//! Identifiers arriving over candid are strings; everything past the canister
//! boundary works with these enums and checked lookups.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use alloy_primitives::Address;
use candid::CandidType;
use serde::Deserialize;

use crate::constants::{
    AAVE_V3_STAKING, COMPOUND_V3_STAKING, DAI_TOKEN, STARGATE_V3_STAKING, UNISWAP_STAKING,
    UNI_TOKEN, USDC_TOKEN, USDT_TOKEN, USDX_MONEY_STAKING, WETH_TOKEN,
};
use crate::utils::error::{ManagerError, ManagerResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, CandidType, Deserialize)]
pub enum Asset {
    Usdc,
    Uni,
    Weth,
    Usdt,
    Dai,
}

impl FromStr for Asset {
    type Err = ManagerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "usdc" => Ok(Asset::Usdc),
            "uni" => Ok(Asset::Uni),
            "weth" => Ok(Asset::Weth),
            "usdt" => Ok(Asset::Usdt),
            "dai" => Ok(Asset::Dai),
            other => Err(ManagerError::UnknownIdentifier(other.to_string())),
        }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = match self {
            Asset::Usdc => "usdc",
            Asset::Uni => "uni",
            Asset::Weth => "weth",
            Asset::Usdt => "usdt",
            Asset::Dai => "dai",
        };
        write!(f, "{}", id)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, CandidType, Deserialize)]
pub enum Protocol {
    Uniswap,
    CompoundV3,
    UsdxMoney,
    StargateV3,
    AaveV3,
}

impl FromStr for Protocol {
    type Err = ManagerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uniswap" => Ok(Protocol::Uniswap),
            "compoundv3" => Ok(Protocol::CompoundV3),
            "usdxmoney" => Ok(Protocol::UsdxMoney),
            "stargatev3" => Ok(Protocol::StargateV3),
            "aavev3" => Ok(Protocol::AaveV3),
            other => Err(ManagerError::UnknownIdentifier(other.to_string())),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = match self {
            Protocol::Uniswap => "uniswap",
            Protocol::CompoundV3 => "compoundv3",
            Protocol::UsdxMoney => "usdxmoney",
            Protocol::StargateV3 => "stargatev3",
            Protocol::AaveV3 => "aavev3",
        };
        write!(f, "{}", id)
    }
}

/// Immutable address table for one deployment. Built once at init and
/// passed by reference to the components that resolve identifiers.
#[derive(Clone, Debug)]
pub struct Registry {
    assets: HashMap<Asset, Address>,
    protocols: HashMap<Protocol, Address>,
}

impl Registry {
    /// The reference deployment's table on Manta Pacific testnet
    pub fn manta_pacific() -> Self {
        let assets = HashMap::from([
            (Asset::Usdc, USDC_TOKEN),
            (Asset::Uni, UNI_TOKEN),
            (Asset::Weth, WETH_TOKEN),
            (Asset::Usdt, USDT_TOKEN),
            (Asset::Dai, DAI_TOKEN),
        ]);

        let protocols = HashMap::from([
            (Protocol::Uniswap, UNISWAP_STAKING),
            (Protocol::CompoundV3, COMPOUND_V3_STAKING),
            (Protocol::UsdxMoney, USDX_MONEY_STAKING),
            (Protocol::StargateV3, STARGATE_V3_STAKING),
            (Protocol::AaveV3, AAVE_V3_STAKING),
        ]);

        Self { assets, protocols }
    }

    pub fn resolve_asset(&self, asset: Asset) -> ManagerResult<Address> {
        self.assets
            .get(&asset)
            .copied()
            .ok_or_else(|| ManagerError::UnknownIdentifier(asset.to_string()))
    }

    pub fn resolve_protocol(&self, protocol: Protocol) -> ManagerResult<Address> {
        self.protocols
            .get(&protocol)
            .copied()
            .ok_or_else(|| ManagerError::UnknownIdentifier(protocol.to_string()))
    }

    /// Reverse lookup used when converting oracle rows, which carry staking
    /// contract addresses rather than protocol names.
    pub fn protocol_by_staking_contract(&self, address: Address) -> Option<Protocol> {
        self.protocols
            .iter()
            .find(|(_, staking)| **staking == address)
            .map(|(protocol, _)| *protocol)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::manta_pacific()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_is_idempotent() {
        let registry = Registry::manta_pacific();
        let first = registry.resolve_protocol(Protocol::AaveV3).unwrap();
        let second = registry.resolve_protocol(Protocol::AaveV3).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, AAVE_V3_STAKING);

        let usdc = registry.resolve_asset(Asset::Usdc).unwrap();
        assert_eq!(usdc, USDC_TOKEN);
    }

    #[test]
    fn unknown_identifiers_fail_typed() {
        assert_eq!(
            "morpho".parse::<Protocol>(),
            Err(ManagerError::UnknownIdentifier("morpho".to_string()))
        );
        assert_eq!(
            "wbtc".parse::<Asset>(),
            Err(ManagerError::UnknownIdentifier("wbtc".to_string()))
        );
    }

    #[test]
    fn reverse_lookup_covers_every_protocol() {
        let registry = Registry::manta_pacific();
        for protocol in [
            Protocol::Uniswap,
            Protocol::CompoundV3,
            Protocol::UsdxMoney,
            Protocol::StargateV3,
            Protocol::AaveV3,
        ] {
            let staking = registry.resolve_protocol(protocol).unwrap();
            assert_eq!(registry.protocol_by_staking_contract(staking), Some(protocol));
        }
        assert_eq!(registry.protocol_by_staking_contract(USDC_TOKEN), None);
    }

    #[test]
    fn identifier_round_trip() {
        for id in ["uniswap", "compoundv3", "usdxmoney", "stargatev3", "aavev3"] {
            assert_eq!(id.parse::<Protocol>().unwrap().to_string(), id);
        }
        for id in ["usdc", "uni", "weth", "usdt", "dai"] {
            assert_eq!(id.parse::<Asset>().unwrap().to_string(), id);
        }
    }
}
