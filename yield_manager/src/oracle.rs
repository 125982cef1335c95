//! Yield oracle client.
//!
//! Fetches the backend's protocol/APY snapshot once per cycle through an
//! HTTPS outcall and converts it into typed quotes. Any failure here is
//! cycle-fatal: no per-user decision runs on a snapshot that could not be
//! fully interpreted.

use alloy_primitives::Address;
use candid::Nat;
use ic_exports::ic_cdk::api::management_canister::http_request::{
    http_request, CanisterHttpRequestArgument, HttpHeader, HttpMethod, HttpResponse, TransformArgs,
    TransformContext,
};
use serde::Deserialize;

use crate::constants::{ORACLE_MAX_RESPONSE_BYTES, ORACLE_REQUEST_CYCLES};
use crate::registry::{Protocol, Registry};
use crate::state::ORACLE_ENDPOINT;
use crate::utils::common::string_to_address;
use crate::utils::error::{ManagerError, ManagerResult};

/// One protocol's standing in the snapshot
#[derive(Clone, Debug, PartialEq)]
pub struct YieldQuote {
    pub protocol: Protocol,
    pub staking_contract: Address,
    pub asset_contract: Address,
    pub apy: f64,
    pub is_stablecoin: bool,
}

/// Wire shape of one snapshot row
#[derive(Debug, Deserialize)]
struct RawQuote {
    #[serde(rename = "addressStaking")]
    address_staking: String,
    apy: ApyField,
    #[serde(rename = "addressToken")]
    address_token: String,
    stablecoin: bool,
}

/// The backend serves `apy` as either a JSON number or a numeric string
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ApyField {
    Number(f64),
    Text(String),
}

impl ApyField {
    fn value(&self) -> ManagerResult<f64> {
        let apy = match self {
            ApyField::Number(value) => *value,
            ApyField::Text(text) => text.parse::<f64>().map_err(|err| {
                ManagerError::OracleUnavailable(format!("non-numeric apy {:?}: {}", text, err))
            })?,
        };
        if !apy.is_finite() || apy < 0.0 {
            return Err(ManagerError::OracleUnavailable(format!(
                "apy out of range: {}",
                apy
            )));
        }
        Ok(apy)
    }
}

/// Converts the raw response body into quotes, recovering each protocol
/// identity by reverse-resolving the staking address through the registry.
pub fn parse_snapshot(body: &[u8], registry: &Registry) -> ManagerResult<Vec<YieldQuote>> {
    let raw: Vec<RawQuote> = serde_json::from_slice(body)
        .map_err(|err| ManagerError::OracleUnavailable(format!("malformed payload: {}", err)))?;

    let mut quotes = Vec::with_capacity(raw.len());
    for row in raw {
        let staking_contract = string_to_address(row.address_staking.clone()).map_err(|_| {
            ManagerError::OracleUnavailable(format!(
                "unparseable staking address {:?}",
                row.address_staking
            ))
        })?;
        let protocol = registry
            .protocol_by_staking_contract(staking_contract)
            .ok_or_else(|| {
                ManagerError::OracleUnavailable(format!(
                    "staking contract {} is not in the registry",
                    staking_contract
                ))
            })?;
        let asset_contract = string_to_address(row.address_token.clone()).map_err(|_| {
            ManagerError::OracleUnavailable(format!(
                "unparseable token address {:?}",
                row.address_token
            ))
        })?;

        // one row per protocol; a duplicate means the snapshot is unusable
        if quotes.iter().any(|q: &YieldQuote| q.protocol == protocol) {
            return Err(ManagerError::OracleUnavailable(format!(
                "duplicate snapshot row for {}",
                protocol
            )));
        }

        quotes.push(YieldQuote {
            protocol,
            staking_contract,
            asset_contract,
            apy: row.apy.value()?,
            is_stablecoin: row.stablecoin,
        });
    }

    Ok(quotes)
}

/// Performs the snapshot outcall and parses the response
pub async fn fetch_snapshot(registry: &Registry) -> ManagerResult<Vec<YieldQuote>> {
    let endpoint = ORACLE_ENDPOINT.with(|url| url.borrow().clone());

    let request = CanisterHttpRequestArgument {
        url: endpoint.clone(),
        method: HttpMethod::GET,
        headers: vec![HttpHeader {
            name: "Accept".to_string(),
            value: "application/json".to_string(),
        }],
        body: None,
        max_response_bytes: Some(ORACLE_MAX_RESPONSE_BYTES),
        transform: Some(TransformContext::from_name(
            "transform_oracle".to_string(),
            vec![],
        )),
    };

    let call_result = http_request(request, ORACLE_REQUEST_CYCLES).await;
    let (response,) = call_result.map_err(|(code, message)| {
        ManagerError::OracleUnavailable(format!(
            "outcall to {} rejected: {:?} {}",
            endpoint, code, message
        ))
    })?;

    if response.status != Nat::from(200_u16) {
        return Err(ManagerError::OracleUnavailable(format!(
            "backend returned status {}",
            response.status
        )));
    }

    parse_snapshot(&response.body, registry)
}

/// Strips the headers so every replica sees an identical response
pub fn transform_oracle_response(args: TransformArgs) -> HttpResponse {
    HttpResponse {
        status: args.response.status,
        headers: vec![],
        body: args.response.body,
    }
}
