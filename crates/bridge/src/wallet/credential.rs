//! Public keys of freshly created passkey credentials.

use alloy_primitives::{B256, keccak256};
use ciborium::Value;

use crate::BridgeError;

const ES256: i64 = -7;
const RS256: i64 = -257;

/// Flag set in authenticator data when attested credential data follows the counter.
const ATTESTED_CREDENTIAL_DATA: u8 = 0x40;

/// Public key of a credential, in the form the account contract verifies against.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CredentialPublicKey {
    /// P-256 key coordinates.
    P256 { x: B256, y: B256 },
    /// RSA key: hash of the modulus and the exponent left-padded to 32 bytes.
    Rsa { modulus_hash: B256, exponent: B256 },
}

impl CredentialPublicKey {
    /// COSE algorithm id of the key.
    pub const fn algorithm(&self) -> i64 {
        match self {
            Self::P256 { .. } => ES256,
            Self::Rsa { .. } => RS256,
        }
    }
}

/// Extracts the credential public key from a CBOR attestation object.
pub fn parse_attestation(attestation_object: &[u8]) -> Result<CredentialPublicKey, BridgeError> {
    let decoded: Value = ciborium::from_reader(attestation_object).map_err(invalid)?;
    let auth_data = text_entry(&decoded, "authData")
        .and_then(Value::as_bytes)
        .ok_or_else(|| BridgeError::InvalidCredential("missing authData".into()))?;
    let cose_key = credential_public_key(auth_data)?;

    let algorithm = int_entry(&cose_key, 3)
        .and_then(as_i64)
        .ok_or_else(|| BridgeError::InvalidCredential("missing algorithm".into()))?;

    match algorithm {
        ES256 => Ok(CredentialPublicKey::P256 {
            x: word(cose_bytes(&cose_key, -2)?)?,
            y: word(cose_bytes(&cose_key, -3)?)?,
        }),
        RS256 => {
            let exponent = cose_bytes(&cose_key, -2)?;
            if exponent.len() > 32 {
                return Err(BridgeError::InvalidCredential("exponent too long".into()));
            }
            Ok(CredentialPublicKey::Rsa {
                modulus_hash: keccak256(cose_bytes(&cose_key, -1)?),
                exponent: B256::left_padding_from(exponent),
            })
        }
        other => Err(BridgeError::UnsupportedAlgorithm(other)),
    }
}

/// Walks authenticator data up to the COSE-encoded credential key.
fn credential_public_key(auth_data: &[u8]) -> Result<Value, BridgeError> {
    // rpIdHash (32) | flags (1) | signCount (4)
    const HEADER: usize = 37;
    // aaguid (16) | credentialIdLength (2)
    const CREDENTIAL_HEADER: usize = 18;

    let flags = *auth_data
        .get(32)
        .ok_or_else(|| BridgeError::InvalidCredential("authData too short".into()))?;
    if flags & ATTESTED_CREDENTIAL_DATA == 0 {
        return Err(BridgeError::InvalidCredential("no attested credential data".into()));
    }

    let len_at = HEADER + 16;
    let id_len = auth_data
        .get(len_at..len_at + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]) as usize)
        .ok_or_else(|| BridgeError::InvalidCredential("authData too short".into()))?;
    let key_at = HEADER + CREDENTIAL_HEADER + id_len;
    let key = auth_data
        .get(key_at..)
        .ok_or_else(|| BridgeError::InvalidCredential("authData too short".into()))?;

    ciborium::from_reader(key).map_err(invalid)
}

fn invalid(err: impl std::fmt::Display) -> BridgeError {
    BridgeError::InvalidCredential(err.to_string())
}

fn text_entry<'a>(map: &'a Value, key: &str) -> Option<&'a Value> {
    map.as_map()?.iter().find(|(k, _)| k.as_text() == Some(key)).map(|(_, v)| v)
}

fn int_entry(map: &Value, key: i64) -> Option<&Value> {
    map.as_map()?.iter().find(|(k, _)| as_i64(k) == Some(key)).map(|(_, v)| v)
}

fn as_i64(value: &Value) -> Option<i64> {
    value.as_integer().and_then(|i| i64::try_from(i).ok())
}

fn cose_bytes(cose_key: &Value, label: i64) -> Result<&[u8], BridgeError> {
    int_entry(cose_key, label)
        .and_then(Value::as_bytes)
        .map(Vec::as_slice)
        .ok_or_else(|| BridgeError::InvalidCredential(format!("missing key parameter {label}")))
}

fn word(bytes: &[u8]) -> Result<B256, BridgeError> {
    B256::try_from(bytes).map_err(invalid)
}
