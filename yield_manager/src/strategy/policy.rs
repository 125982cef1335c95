//! Pure rebalancing decision logic.
//!
//! Everything here is deterministic math over one position and one
//! snapshot. No state, no chain, no clock.

use alloy_primitives::Address;

use crate::oracle::YieldQuote;
use crate::registry::{Protocol, Registry};
use crate::types::{RiskTier, UserPosition};
use crate::utils::error::{ManagerError, ManagerResult};

/// What the orchestrator is asked to do for one user
#[derive(Clone, Debug, PartialEq)]
pub enum RebalanceDecision {
    /// The current protocol is already the best eligible one
    Hold,
    Migrate(MigrationPlan),
}

/// The inputs the transaction sequence needs
#[derive(Clone, Debug, PartialEq)]
pub struct MigrationPlan {
    pub source_protocol: Protocol,
    pub target_protocol: Protocol,
    /// Token freed by the unstake, as listed in the snapshot
    pub source_asset: Address,
    /// Token the target pool stakes
    pub target_asset: Address,
    /// Whole-token amount being moved
    pub amount: u64,
}

fn tier_admits(tier: RiskTier, quote: &YieldQuote) -> bool {
    match tier {
        RiskTier::Low => quote.is_stablecoin,
        // medium currently admits everything; kept as its own arm so the
        // filter can diverge from high without touching callers
        RiskTier::Medium => true,
        RiskTier::High => true,
    }
}

/// Decides whether the position should move.
///
/// The arg-max over APY is stable: on ties the earlier snapshot row wins,
/// so the same snapshot always produces the same decision.
pub fn decide(
    position: &UserPosition,
    snapshot: &[YieldQuote],
    tier: RiskTier,
    registry: &Registry,
) -> ManagerResult<RebalanceDecision> {
    let mut best: Option<&YieldQuote> = None;
    for quote in snapshot.iter().filter(|quote| tier_admits(tier, quote)) {
        match best {
            Some(current) if quote.apy <= current.apy => {}
            _ => best = Some(quote),
        }
    }
    let best = best.ok_or(ManagerError::NoEligibleProtocol)?;

    if best.protocol == position.protocol {
        return Ok(RebalanceDecision::Hold);
    }

    // the freed asset comes from the current protocol's own snapshot row
    let current_staking = registry.resolve_protocol(position.protocol)?;
    let current = snapshot
        .iter()
        .find(|quote| quote.staking_contract == current_staking)
        .ok_or_else(|| {
            ManagerError::InconsistentSnapshot(format!(
                "protocol {} holds the position but is absent from the snapshot",
                position.protocol
            ))
        })?;

    Ok(RebalanceDecision::Migrate(MigrationPlan {
        source_protocol: position.protocol,
        target_protocol: best.protocol,
        source_asset: current.asset_contract,
        target_asset: best.asset_contract,
        amount: position.staked_amount,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{
        AAVE_V3_STAKING, COMPOUND_V3_STAKING, DAI_TOKEN, STARGATE_V3_STAKING, UNISWAP_STAKING,
        UNI_TOKEN, USDC_TOKEN, USDT_TOKEN,
    };
    use proptest::prelude::*;

    fn quote(protocol: Protocol, apy: f64, stablecoin: bool) -> YieldQuote {
        let registry = Registry::manta_pacific();
        let (staking, asset) = match protocol {
            Protocol::Uniswap => (UNISWAP_STAKING, UNI_TOKEN),
            Protocol::CompoundV3 => (COMPOUND_V3_STAKING, USDC_TOKEN),
            Protocol::UsdxMoney => (registry.resolve_protocol(protocol).unwrap(), USDT_TOKEN),
            Protocol::StargateV3 => (STARGATE_V3_STAKING, USDC_TOKEN),
            Protocol::AaveV3 => (AAVE_V3_STAKING, DAI_TOKEN),
        };
        YieldQuote {
            protocol,
            staking_contract: staking,
            asset_contract: asset,
            apy,
            is_stablecoin: stablecoin,
        }
    }

    fn position(protocol: Protocol, amount: u64) -> UserPosition {
        UserPosition {
            user_address: alloy_primitives::Address::ZERO,
            protocol,
            staked_amount: amount,
        }
    }

    #[test]
    fn low_tier_migrates_to_best_stablecoin_pool() {
        let registry = Registry::manta_pacific();
        let snapshot = vec![
            quote(Protocol::AaveV3, 3.1, true),
            quote(Protocol::Uniswap, 9.4, false),
            quote(Protocol::CompoundV3, 5.2, true),
        ];

        let decision = decide(
            &position(Protocol::AaveV3, 250),
            &snapshot,
            RiskTier::Low,
            &registry,
        )
        .unwrap();

        match decision {
            RebalanceDecision::Migrate(plan) => {
                assert_eq!(plan.source_protocol, Protocol::AaveV3);
                assert_eq!(plan.target_protocol, Protocol::CompoundV3);
                assert_eq!(plan.source_asset, DAI_TOKEN);
                assert_eq!(plan.target_asset, USDC_TOKEN);
                assert_eq!(plan.amount, 250);
            }
            other => panic!("expected a migration, got {:?}", other),
        }
    }

    #[test]
    fn holding_the_best_protocol_yields_hold() {
        let registry = Registry::manta_pacific();
        let snapshot = vec![
            quote(Protocol::AaveV3, 3.1, true),
            quote(Protocol::CompoundV3, 5.2, true),
        ];

        let decision = decide(
            &position(Protocol::CompoundV3, 100),
            &snapshot,
            RiskTier::Low,
            &registry,
        )
        .unwrap();

        assert_eq!(decision, RebalanceDecision::Hold);
    }

    #[test]
    fn empty_eligible_set_is_a_typed_failure() {
        let registry = Registry::manta_pacific();
        let snapshot = vec![
            quote(Protocol::Uniswap, 9.4, false),
            quote(Protocol::StargateV3, 7.0, false),
        ];

        let result = decide(
            &position(Protocol::Uniswap, 100),
            &snapshot,
            RiskTier::Low,
            &registry,
        );

        assert_eq!(result, Err(ManagerError::NoEligibleProtocol));
    }

    #[test]
    fn empty_snapshot_has_no_eligible_protocol() {
        let registry = Registry::manta_pacific();
        let result = decide(&position(Protocol::AaveV3, 1), &[], RiskTier::High, &registry);
        assert_eq!(result, Err(ManagerError::NoEligibleProtocol));
    }

    #[test]
    fn apy_ties_break_on_snapshot_order() {
        let registry = Registry::manta_pacific();
        let snapshot = vec![
            quote(Protocol::CompoundV3, 5.0, true),
            quote(Protocol::AaveV3, 5.0, true),
            quote(Protocol::UsdxMoney, 5.0, true),
        ];

        let decision = decide(
            &position(Protocol::UsdxMoney, 10),
            &snapshot,
            RiskTier::Medium,
            &registry,
        )
        .unwrap();

        match decision {
            RebalanceDecision::Migrate(plan) => {
                assert_eq!(plan.target_protocol, Protocol::CompoundV3)
            }
            other => panic!("expected a migration, got {:?}", other),
        }
    }

    #[test]
    fn missing_current_protocol_is_inconsistent() {
        let registry = Registry::manta_pacific();
        // the position's protocol is nowhere in the snapshot
        let snapshot = vec![quote(Protocol::CompoundV3, 5.2, true)];

        let result = decide(
            &position(Protocol::AaveV3, 100),
            &snapshot,
            RiskTier::Low,
            &registry,
        );

        assert!(matches!(
            result,
            Err(ManagerError::InconsistentSnapshot(_))
        ));
    }

    #[test]
    fn high_and_medium_admit_volatile_pools() {
        let registry = Registry::manta_pacific();
        let snapshot = vec![
            quote(Protocol::CompoundV3, 5.2, true),
            quote(Protocol::Uniswap, 9.4, false),
        ];

        for tier in [RiskTier::Medium, RiskTier::High] {
            let decision = decide(&position(Protocol::CompoundV3, 1), &snapshot, tier, &registry)
                .unwrap();
            match decision {
                RebalanceDecision::Migrate(plan) => {
                    assert_eq!(plan.target_protocol, Protocol::Uniswap)
                }
                other => panic!("expected a migration, got {:?}", other),
            }
        }
    }

    proptest! {
        // the low tier must never be routed into a non-stablecoin pool
        #[test]
        fn low_tier_never_targets_volatile_pools(
            apys in proptest::collection::vec(0.0_f64..100.0, 5),
            stables in proptest::collection::vec(any::<bool>(), 5),
        ) {
            let registry = Registry::manta_pacific();
            let protocols = [
                Protocol::Uniswap,
                Protocol::CompoundV3,
                Protocol::UsdxMoney,
                Protocol::StargateV3,
                Protocol::AaveV3,
            ];
            let snapshot: Vec<YieldQuote> = protocols
                .iter()
                .zip(apys.iter().zip(stables.iter()))
                .map(|(protocol, (apy, stable))| quote(*protocol, *apy, *stable))
                .collect();

            let result = decide(
                &position(Protocol::AaveV3, 42),
                &snapshot,
                RiskTier::Low,
                &registry,
            );

            match result {
                Ok(RebalanceDecision::Migrate(plan)) => {
                    let target = snapshot
                        .iter()
                        .find(|q| q.protocol == plan.target_protocol)
                        .unwrap();
                    prop_assert!(target.is_stablecoin);
                }
                Ok(RebalanceDecision::Hold) => {}
                Err(ManagerError::NoEligibleProtocol) => {
                    prop_assert!(snapshot.iter().all(|q| !q.is_stablecoin));
                }
                Err(err) => prop_assert!(false, "unexpected error: {:?}", err),
            }
        }
    }
}
