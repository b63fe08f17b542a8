//! # Legacy Transactions
//!
//! Pre-EIP-1559 transactions with EIP-155 replay protection:
//!
//! ```text
//! signing hash = keccak(rlp([nonce, gasPrice, gas, to, value, data, chainId, 0, 0]))
//! raw          = rlp([nonce, gasPrice, gas, to, value, data, v, r, s])
//! v            = chainId * 2 + 35 + recoveryId
//! ```

use super::errors::{GatewayError, GatewayResult};
use primitive_types::U256;
use rlp::{Rlp, RlpStream};
use shared_crypto::{keccak256, recover_address, RecoverableSignature};
use shared_types::{Address, Hash};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTransaction {
    pub nonce: u64,
    pub gas_price: U256,
    pub gas_limit: u64,
    pub to: Address,
    pub value: U256,
    pub data: Vec<u8>,
    pub chain_id: u64,
}

/// A signed transaction ready for `eth_sendRawTransaction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub transaction: LegacyTransaction,
    pub raw: Vec<u8>,
    pub hash: Hash,
}

impl LegacyTransaction {
    fn append_body(&self, stream: &mut RlpStream) {
        stream.append(&self.nonce);
        stream.append(&self.gas_price);
        stream.append(&self.gas_limit);
        stream.append(&self.to.to_vec());
        stream.append(&self.value);
        stream.append(&self.data);
    }

    /// Digest signed by the sender key.
    pub fn signing_hash(&self) -> Hash {
        let mut stream = RlpStream::new_list(9);
        self.append_body(&mut stream);
        stream.append(&self.chain_id);
        stream.append(&0u8);
        stream.append(&0u8);
        keccak256(&stream.out())
    }

    /// Attach a recoverable signature over [`Self::signing_hash`].
    pub fn into_signed(self, signature: &RecoverableSignature) -> SignedTransaction {
        let v = self.chain_id * 2 + 35 + signature.recovery_id() as u64;
        let mut stream = RlpStream::new_list(9);
        self.append_body(&mut stream);
        stream.append(&v);
        stream.append(&U256::from_big_endian(&signature.r()));
        stream.append(&U256::from_big_endian(&signature.s()));
        let raw = stream.out().to_vec();
        SignedTransaction {
            hash: keccak256(&raw),
            raw,
            transaction: self,
        }
    }
}

impl SignedTransaction {
    /// Decode a raw EIP-155 transaction and recover its sender.
    pub fn decode(raw: &[u8]) -> GatewayResult<(Self, Address)> {
        let malformed = |e: rlp::DecoderError| GatewayError::MalformedTransaction(e.to_string());
        let rlp = Rlp::new(raw);
        if rlp.item_count().map_err(malformed)? != 9 {
            return Err(GatewayError::MalformedTransaction(
                "expected 9 fields".into(),
            ));
        }

        let to: Vec<u8> = rlp.val_at(3).map_err(malformed)?;
        let to: Address = to
            .as_slice()
            .try_into()
            .map_err(|_| GatewayError::MalformedTransaction("recipient is not 20 bytes".into()))?;
        let v: u64 = rlp.val_at(6).map_err(malformed)?;
        if v < 35 {
            return Err(GatewayError::MalformedTransaction(
                "missing EIP-155 chain id".into(),
            ));
        }
        let chain_id = (v - 35) / 2;
        let recovery_id = ((v - 35) % 2) as u8;

        let transaction = LegacyTransaction {
            nonce: rlp.val_at(0).map_err(malformed)?,
            gas_price: rlp.val_at(1).map_err(malformed)?,
            gas_limit: rlp.val_at(2).map_err(malformed)?,
            to,
            value: rlp.val_at(4).map_err(malformed)?,
            data: rlp.val_at(5).map_err(malformed)?,
            chain_id,
        };

        let r: U256 = rlp.val_at(7).map_err(malformed)?;
        let s: U256 = rlp.val_at(8).map_err(malformed)?;
        let mut signature = [0u8; 65];
        r.to_big_endian(&mut signature[..32]);
        s.to_big_endian(&mut signature[32..64]);
        signature[64] = recovery_id;
        let sender = recover_address(
            &transaction.signing_hash(),
            &RecoverableSignature::from_bytes(signature),
        )
        .map_err(|e| GatewayError::MalformedTransaction(format!("bad signature: {e}")))?;

        Ok((
            Self {
                hash: keccak256(raw),
                raw: raw.to_vec(),
                transaction,
            },
            sender,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_crypto::EthKeyPair;

    fn transaction() -> LegacyTransaction {
        LegacyTransaction {
            nonce: 7,
            gas_price: U256::from(30_000_000_000u64),
            gas_limit: 600_000,
            to: [0x42; 20],
            value: U256::zero(),
            data: vec![0xde, 0xad, 0xbe, 0xef],
            chain_id: 80002,
        }
    }

    #[test]
    fn test_signed_transaction_recovers_sender() {
        let key = EthKeyPair::generate();
        let tx = transaction();
        let signature = key.sign_prehash(&tx.signing_hash()).unwrap();
        let signed = tx.clone().into_signed(&signature);

        let (decoded, sender) = SignedTransaction::decode(&signed.raw).unwrap();
        assert_eq!(sender, key.address());
        assert_eq!(decoded.transaction, tx);
        assert_eq!(decoded.hash, signed.hash);
    }

    #[test]
    fn test_chain_id_is_signed() {
        let key = EthKeyPair::generate();
        let tx = transaction();
        let signature = key.sign_prehash(&tx.signing_hash()).unwrap();
        let mut other_chain = tx.clone();
        other_chain.chain_id = 1;
        // Same signature, different chain: recovers a different sender.
        let forged = other_chain.into_signed(&signature);
        match SignedTransaction::decode(&forged.raw) {
            Ok((_, sender)) => assert_ne!(sender, key.address()),
            Err(GatewayError::MalformedTransaction(_)) => {}
            Err(e) => panic!("unexpected {e}"),
        }
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(
            SignedTransaction::decode(&[0xc0]),
            Err(GatewayError::MalformedTransaction(_))
        ));
    }
}
