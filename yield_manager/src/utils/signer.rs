//! Threshold ECDSA signing for EIP-1559 transactions

use alloy::consensus::{SignableTransaction, TxEip1559, TxEnvelope};
use alloy::eips::eip2718::Encodable2718;
use alloy_primitives::{keccak256, Address, Signature};
use ic_exports::ic_cdk::api::management_canister::ecdsa::{
    ecdsa_public_key, sign_with_ecdsa, EcdsaCurve, EcdsaKeyId, EcdsaPublicKeyArgument,
    SignWithEcdsaArgument,
};
use k256::ecdsa::VerifyingKey;
use k256::elliptic_curve::sec1::ToEncodedPoint;

use crate::constants::ECDSA_KEY_NAME;
use crate::types::DerivationPath;

use super::common::extract_call_result;
use super::error::{ManagerError, ManagerResult};

fn key_id() -> EcdsaKeyId {
    EcdsaKeyId {
        curve: EcdsaCurve::Secp256k1,
        name: ECDSA_KEY_NAME.to_string(),
    }
}

/// Fetches the SEC1 public key bytes for a derivation path
pub async fn public_key_for(derivation_path: DerivationPath) -> ManagerResult<Vec<u8>> {
    let call_result = ecdsa_public_key(EcdsaPublicKeyArgument {
        canister_id: None,
        derivation_path,
        key_id: key_id(),
    })
    .await;

    let response = extract_call_result(call_result)?;
    Ok(response.public_key)
}

/// Derives the EVM address from SEC1 public key bytes (compressed or not)
pub fn pubkey_to_address(public_key: &[u8]) -> ManagerResult<Address> {
    let verifying_key = VerifyingKey::from_sec1_bytes(public_key)
        .map_err(|err| ManagerError::DecodingError(format!("{:#?}", err)))?;
    let uncompressed = verifying_key.to_encoded_point(false);
    // keccak over the 64 coordinate bytes, address is the low 20 bytes
    let hash = keccak256(&uncompressed.as_bytes()[1..]);
    Ok(Address::from_slice(&hash[12..]))
}

/// Signs an EIP-1559 transaction with the threshold signer and returns the
/// hex-encoded raw transaction ready for `eth_sendRawTransaction`.
pub async fn sign_eip1559_transaction(
    transaction: TxEip1559,
    derivation_path: DerivationPath,
) -> ManagerResult<String> {
    let public_key = public_key_for(derivation_path.clone()).await?;
    let expected_key = VerifyingKey::from_sec1_bytes(&public_key)
        .map_err(|err| ManagerError::DecodingError(format!("{:#?}", err)))?;

    let prehash = transaction.signature_hash();

    let call_result = sign_with_ecdsa(SignWithEcdsaArgument {
        message_hash: prehash.to_vec(),
        derivation_path,
        key_id: key_id(),
    })
    .await;
    let raw_signature = extract_call_result(call_result)?.signature;

    let parity = y_parity(prehash.as_slice(), &raw_signature, &expected_key)?;
    let signature = Signature::from_bytes_and_parity(&raw_signature, parity)
        .map_err(|err| ManagerError::DecodingError(format!("{:#?}", err)))?;

    let envelope: TxEnvelope = transaction.into_signed(signature).into();
    let mut encoded = Vec::new();
    envelope.encode_2718(&mut encoded);
    Ok(format!("0x{}", hex::encode(encoded)))
}

/// The IC signature carries no recovery id. Try both parity values and keep
/// the one that recovers the account's own public key.
fn y_parity(prehash: &[u8], signature: &[u8], expected_key: &VerifyingKey) -> ManagerResult<u64> {
    let parsed = k256::ecdsa::Signature::from_slice(signature)
        .map_err(|err| ManagerError::DecodingError(format!("{:#?}", err)))?;

    for parity in [0_u8, 1] {
        let recovery_id = k256::ecdsa::RecoveryId::try_from(parity)
            .map_err(|err| ManagerError::DecodingError(format!("{:#?}", err)))?;
        if let Ok(recovered) = VerifyingKey::recover_from_prehash(prehash, &parsed, recovery_id) {
            if recovered == *expected_key {
                return Ok(parity as u64);
            }
        }
    }

    Err(ManagerError::DecodingError(
        "the signature does not match the account public key under either parity".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    // secp256k1 generator point, i.e. the public key of private key 1
    const GENERATOR_UNCOMPRESSED: &str = "0479BE667EF9DCBBAC55A06295CE870B07029BFCDB2DCE28D959F2815B16F81798483ADA7726A3C4655DA4FBFC0E1108A8FD17B448A68554199C47D08FFB10D4B8";
    const GENERATOR_COMPRESSED: &str =
        "0279BE667EF9DCBBAC55A06295CE870B07029BFCDB2DCE28D959F2815B16F81798";
    const GENERATOR_EVM_ADDRESS: &str = "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf";

    #[test]
    fn known_key_derives_known_address() {
        let bytes = hex::decode(GENERATOR_UNCOMPRESSED).unwrap();
        let address = pubkey_to_address(&bytes).unwrap();
        assert_eq!(address.to_string(), GENERATOR_EVM_ADDRESS);
    }

    #[test]
    fn compressed_and_uncompressed_keys_agree() {
        let uncompressed = hex::decode(GENERATOR_UNCOMPRESSED).unwrap();
        let compressed = hex::decode(GENERATOR_COMPRESSED).unwrap();
        assert_eq!(
            pubkey_to_address(&uncompressed).unwrap(),
            pubkey_to_address(&compressed).unwrap()
        );
    }

    #[test]
    fn garbage_key_is_rejected() {
        assert!(pubkey_to_address(&[0u8; 33]).is_err());
    }
}
