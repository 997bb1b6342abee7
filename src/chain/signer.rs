//! Wallet Signer
//!
//! Loads the compounding wallet and signs its transactions.
//!
//! Keys come from an encrypted JSON keystore (password in
//! `WALLET_KEYSTORE_PASSWORD`) or, failing that, a raw key in
//! `WALLET_PRIVATE_KEY`. The loaded key must belong to the configured wallet
//! address.
//!
//! ⚠️  Never log or expose private keys.

use crate::config::WalletConfig;
use crate::error::{ChainError, FatalError};
use alloy_consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy_eips::eip2718::Encodable2718;
use alloy_primitives::{Address, Bytes};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use std::str::FromStr;
use tracing::{debug, info};

pub const KEYSTORE_PASSWORD_ENV: &str = "WALLET_KEYSTORE_PASSWORD";
pub const PRIVATE_KEY_ENV: &str = "WALLET_PRIVATE_KEY";

pub struct WalletSigner {
    signer: PrivateKeySigner,
}

impl WalletSigner {
    /// Load the key described by `config` and check it matches its address.
    pub fn load(config: &WalletConfig) -> Result<Self, FatalError> {
        let signer = match config.keystore {
            Some(ref path) => {
                let password = std::env::var(KEYSTORE_PASSWORD_ENV).map_err(|_| {
                    FatalError::InvalidWalletKey(format!("{} is not set", KEYSTORE_PASSWORD_ENV))
                })?;
                PrivateKeySigner::decrypt_keystore(path, password).map_err(|e| {
                    FatalError::InvalidWalletKey(format!("cannot decrypt {}: {}", path.display(), e))
                })?
            }
            None => {
                let key = std::env::var(PRIVATE_KEY_ENV).map_err(|_| {
                    FatalError::InvalidWalletKey(format!(
                        "no keystore configured and {} is not set",
                        PRIVATE_KEY_ENV
                    ))
                })?;
                parse_key(&key)?
            }
        };

        let wallet = Self::verified(signer, config.address)?;
        info!("✓ Wallet loaded: {:?}", wallet.address());
        Ok(wallet)
    }

    /// Wrap a raw hex key, checking it belongs to `expected`.
    #[cfg(test)]
    pub fn from_key(key: &str, expected: Address) -> Result<Self, FatalError> {
        Self::verified(parse_key(key)?, expected)
    }

    fn verified(signer: PrivateKeySigner, expected: Address) -> Result<Self, FatalError> {
        if signer.address() != expected {
            return Err(FatalError::InvalidWalletKey(format!(
                "key belongs to {:?}, expected {:?}",
                signer.address(),
                expected
            )));
        }
        Ok(Self { signer })
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Sign a legacy transaction and return its EIP-2718 encoding.
    pub async fn sign_legacy(&self, tx: TxLegacy) -> Result<Bytes, ChainError> {
        let signature = self
            .signer
            .sign_hash(&tx.signature_hash())
            .await
            .map_err(|e| ChainError::Signing(e.to_string()))?;

        debug!(
            "Signed legacy transaction: to={:?}, nonce={}, gas_limit={}, gas_price={}",
            tx.to, tx.nonce, tx.gas_limit, tx.gas_price
        );

        let envelope = TxEnvelope::from(tx.into_signed(signature));
        Ok(envelope.encoded_2718().into())
    }
}

fn parse_key(key: &str) -> Result<PrivateKeySigner, FatalError> {
    PrivateKeySigner::from_str(key.trim().trim_start_matches("0x"))
        .map_err(|e| FatalError::InvalidWalletKey(format!("cannot parse private key: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{TxKind, U256};

    // Well-known development key (DO NOT USE IN PRODUCTION)
    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn test_address() -> Address {
        "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse().unwrap()
    }

    #[test]
    fn test_key_must_match_configured_address() {
        assert!(WalletSigner::from_key(TEST_KEY, test_address()).is_ok());

        let err = WalletSigner::from_key(TEST_KEY, Address::repeat_byte(1)).err().unwrap();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_garbage_key_is_fatal() {
        let err = WalletSigner::from_key("not-a-key", test_address()).err().unwrap();
        assert!(matches!(err, FatalError::InvalidWalletKey(_)));
    }

    #[tokio::test]
    async fn test_sign_legacy_produces_rlp_list() {
        let wallet = WalletSigner::from_key(TEST_KEY, test_address()).unwrap();
        let tx = TxLegacy {
            chain_id: Some(250),
            nonce: 7,
            gas_price: 1_000_000_000,
            gas_limit: 21_000,
            to: TxKind::Call(Address::repeat_byte(2)),
            value: U256::from(1),
            input: Bytes::new(),
        };

        let raw = wallet.sign_legacy(tx).await.unwrap();
        // Legacy transactions are untyped RLP lists
        assert!(raw[0] >= 0xc0);
    }
}
