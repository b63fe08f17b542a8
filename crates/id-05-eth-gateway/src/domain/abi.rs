//! # State Contract ABI
//!
//! ```solidity
//! function transitState(
//!     uint256 id,
//!     uint256 oldState,
//!     uint256 newState,
//!     bool isOldStateGenesis,
//!     uint256[2] a,
//!     uint256[2][2] b,
//!     uint256[2] c
//! ) public
//! ```
//!
//! Every argument is static, so the calldata is the selector followed by
//! twelve 32-byte words.
//!
//! Two views tell whether a transition already landed:
//!
//! ```solidity
//! function stateExists(uint256 id, uint256 state) public view returns (bool)
//! function getStateInfoByIdAndState(uint256 id, uint256 state)
//!     public view returns (StateInfo memory)
//! ```
//!
//! `StateInfo` is a static tuple of seven words: `id`, `state`,
//! `replacedByState`, `createdAtTimestamp`, `replacedAtTimestamp`,
//! `createdAtBlock`, `replacedAtBlock`.

use super::errors::{GatewayError, GatewayResult};
use id_04_proof_generator::ZkProof;
use primitive_types::U256;
use shared_crypto::keccak256;
use shared_types::Hash;

pub const TRANSIT_STATE_SIGNATURE: &str =
    "transitState(uint256,uint256,uint256,bool,uint256[2],uint256[2][2],uint256[2])";

pub const STATE_EXISTS_SIGNATURE: &str = "stateExists(uint256,uint256)";

pub const STATE_INFO_SIGNATURE: &str = "getStateInfoByIdAndState(uint256,uint256)";

const WORDS: usize = 12;

const STATE_INFO_WORDS: usize = 7;

pub fn selector(signature: &str) -> [u8; 4] {
    let digest = keccak256(signature.as_bytes());
    [digest[0], digest[1], digest[2], digest[3]]
}

pub fn transit_state_selector() -> [u8; 4] {
    selector(TRANSIT_STATE_SIGNATURE)
}

fn push_word(data: &mut Vec<u8>, word: U256) {
    let mut out = [0u8; 32];
    word.to_big_endian(&mut out);
    data.extend_from_slice(&out);
}

fn word_at(body: &[u8], i: usize) -> U256 {
    U256::from_big_endian(&body[i * 32..(i + 1) * 32])
}

fn hash_at(body: &[u8], i: usize) -> Hash {
    let mut out = [0u8; 32];
    out.copy_from_slice(&body[i * 32..(i + 1) * 32]);
    out
}

fn block_at(body: &[u8], i: usize) -> GatewayResult<u64> {
    let word = word_at(body, i);
    if word > U256::from(u64::MAX) {
        return Err(GatewayError::MalformedTransaction(
            "block number overflows u64".into(),
        ));
    }
    Ok(word.low_u64())
}

/// Arguments of one `transitState` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitStateCall {
    pub id: U256,
    pub old_state: Hash,
    pub new_state: Hash,
    pub is_old_state_genesis: bool,
    pub a: [U256; 2],
    pub b: [[U256; 2]; 2],
    pub c: [U256; 2],
}

impl TransitStateCall {
    pub fn new(
        id: U256,
        old_state: Hash,
        new_state: Hash,
        is_old_state_genesis: bool,
        proof: &ZkProof,
    ) -> Self {
        Self {
            id,
            old_state,
            new_state,
            is_old_state_genesis,
            a: proof.a,
            b: proof.b,
            c: proof.c,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let words = [
            self.id,
            U256::from_big_endian(&self.old_state),
            U256::from_big_endian(&self.new_state),
            U256::from(self.is_old_state_genesis as u8),
            self.a[0],
            self.a[1],
            self.b[0][0],
            self.b[0][1],
            self.b[1][0],
            self.b[1][1],
            self.c[0],
            self.c[1],
        ];
        let mut data = Vec::with_capacity(4 + WORDS * 32);
        data.extend_from_slice(&transit_state_selector());
        for word in words {
            push_word(&mut data, word);
        }
        data
    }

    pub fn decode(data: &[u8]) -> GatewayResult<Self> {
        let malformed = |reason: &str| GatewayError::MalformedTransaction(reason.to_string());
        if data.len() < 4 || data[..4] != transit_state_selector() {
            return Err(malformed("not a transitState call"));
        }
        let body = &data[4..];
        if body.len() != WORDS * 32 {
            return Err(malformed("transitState calldata has wrong length"));
        }
        let word = |i: usize| word_at(body, i);
        let hash = |i: usize| hash_at(body, i);
        let genesis = word(3);
        if genesis > U256::one() {
            return Err(malformed("isOldStateGenesis is not a bool"));
        }
        Ok(Self {
            id: word(0),
            old_state: hash(1),
            new_state: hash(2),
            is_old_state_genesis: genesis == U256::one(),
            a: [word(4), word(5)],
            b: [[word(6), word(7)], [word(8), word(9)]],
            c: [word(10), word(11)],
        })
    }
}

/// Which state view a [`StateLookup`] calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateView {
    Exists,
    Info,
}

/// Arguments of `stateExists` / `getStateInfoByIdAndState`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateLookup {
    pub id: U256,
    pub state: Hash,
}

impl StateLookup {
    pub fn new(id: U256, state: Hash) -> Self {
        Self { id, state }
    }

    pub fn encode(&self, view: StateView) -> Vec<u8> {
        let signature = match view {
            StateView::Exists => STATE_EXISTS_SIGNATURE,
            StateView::Info => STATE_INFO_SIGNATURE,
        };
        let mut data = Vec::with_capacity(4 + 2 * 32);
        data.extend_from_slice(&selector(signature));
        push_word(&mut data, self.id);
        data.extend_from_slice(&self.state);
        data
    }

    pub fn decode(data: &[u8]) -> GatewayResult<(StateView, Self)> {
        let malformed = |reason: &str| GatewayError::MalformedTransaction(reason.to_string());
        if data.len() != 4 + 2 * 32 {
            return Err(malformed("state view calldata has wrong length"));
        }
        let view = if data[..4] == selector(STATE_EXISTS_SIGNATURE) {
            StateView::Exists
        } else if data[..4] == selector(STATE_INFO_SIGNATURE) {
            StateView::Info
        } else {
            return Err(malformed("not a state view call"));
        };
        let body = &data[4..];
        Ok((view, Self::new(word_at(body, 0), hash_at(body, 1))))
    }
}

pub fn encode_bool(value: bool) -> Vec<u8> {
    let mut data = Vec::with_capacity(32);
    push_word(&mut data, U256::from(value as u8));
    data
}

pub fn decode_bool(data: &[u8]) -> GatewayResult<bool> {
    if data.len() != 32 {
        return Err(GatewayError::MalformedTransaction(format!(
            "expected one bool word, got {} bytes",
            data.len()
        )));
    }
    match word_at(data, 0) {
        w if w.is_zero() => Ok(false),
        w if w == U256::one() => Ok(true),
        _ => Err(GatewayError::MalformedTransaction("word is not a bool".into())),
    }
}

/// A state as the contract recorded it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateInfo {
    pub id: U256,
    pub state: Hash,
    /// Zero while this is the identity's latest state.
    pub replaced_by_state: Hash,
    pub created_at_timestamp: u64,
    pub replaced_at_timestamp: u64,
    pub created_at_block: u64,
    pub replaced_at_block: u64,
}

impl StateInfo {
    pub fn encode(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(STATE_INFO_WORDS * 32);
        push_word(&mut data, self.id);
        data.extend_from_slice(&self.state);
        data.extend_from_slice(&self.replaced_by_state);
        push_word(&mut data, U256::from(self.created_at_timestamp));
        push_word(&mut data, U256::from(self.replaced_at_timestamp));
        push_word(&mut data, U256::from(self.created_at_block));
        push_word(&mut data, U256::from(self.replaced_at_block));
        data
    }

    pub fn decode(data: &[u8]) -> GatewayResult<Self> {
        if data.len() != STATE_INFO_WORDS * 32 {
            return Err(GatewayError::MalformedTransaction(format!(
                "StateInfo must be {} bytes, got {}",
                STATE_INFO_WORDS * 32,
                data.len()
            )));
        }
        Ok(Self {
            id: word_at(data, 0),
            state: hash_at(data, 1),
            replaced_by_state: hash_at(data, 2),
            created_at_timestamp: block_at(data, 3)?,
            replaced_at_timestamp: block_at(data, 4)?,
            created_at_block: block_at(data, 5)?,
            replaced_at_block: block_at(data, 6)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call() -> TransitStateCall {
        TransitStateCall {
            id: U256::from(99),
            old_state: [1; 32],
            new_state: [2; 32],
            is_old_state_genesis: true,
            a: [U256::from(3), U256::from(4)],
            b: [[U256::from(5), U256::from(6)], [U256::from(7), U256::from(8)]],
            c: [U256::from(9), U256::from(10)],
        }
    }

    #[test]
    fn test_layout() {
        let data = call().encode();
        assert_eq!(data.len(), 4 + 12 * 32);
        assert_eq!(&data[..4], &transit_state_selector());
        // isOldStateGenesis is the fourth word.
        assert_eq!(data[4 + 4 * 32 - 1], 1);
        assert_eq!(TransitStateCall::decode(&data).unwrap(), call());
    }

    #[test]
    fn test_rejects_other_selector() {
        let mut data = call().encode();
        data[0] ^= 0xFF;
        assert!(TransitStateCall::decode(&data).is_err());
        assert!(TransitStateCall::decode(&data[..10]).is_err());
    }

    #[test]
    fn test_state_views() {
        let lookup = StateLookup::new(U256::from(99), [4; 32]);
        let exists = lookup.encode(StateView::Exists);
        assert_eq!(&exists[..4], &selector(STATE_EXISTS_SIGNATURE));
        assert_eq!(
            StateLookup::decode(&exists).unwrap(),
            (StateView::Exists, lookup.clone())
        );
        let info = lookup.encode(StateView::Info);
        assert_eq!(StateLookup::decode(&info).unwrap().0, StateView::Info);
        assert!(StateLookup::decode(&call().encode()).is_err());

        assert!(decode_bool(&encode_bool(true)).unwrap());
        assert!(!decode_bool(&encode_bool(false)).unwrap());
        assert!(decode_bool(&[0u8; 31]).is_err());
    }

    #[test]
    fn test_state_info_created_block() {
        let info = StateInfo {
            id: U256::from(99),
            state: [4; 32],
            replaced_by_state: [0; 32],
            created_at_timestamp: 1_700_000_000,
            replaced_at_timestamp: 0,
            created_at_block: 120,
            replaced_at_block: 0,
        };
        let data = info.encode();
        assert_eq!(data.len(), 7 * 32);
        // createdAtBlock is the sixth word.
        assert_eq!(data[6 * 32 - 1], 120);
        assert_eq!(StateInfo::decode(&data).unwrap(), info);
        assert!(StateInfo::decode(&data[..6 * 32]).is_err());
    }
}
