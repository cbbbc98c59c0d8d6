//! Chain selection and signer configuration

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::{Result, SignerError};
use crate::types::SigningMethod;

/// UTXO chains sharing this signing engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Chain {
    #[default]
    Bitcoin,
    BitcoinCash,
    Litecoin,
    Dogecoin,
    ECash,
}

impl Chain {
    /// Chains that commit to input amounts through SIGHASH_FORKID
    pub fn uses_fork_id(self) -> bool {
        matches!(self, Chain::BitcoinCash | Chain::ECash)
    }

    pub fn default_sighash_type(self) -> u8 {
        if self.uses_fork_id() {
            SIGHASH_ALL | SIGHASH_FORKID
        } else {
            SIGHASH_ALL
        }
    }

    /// Mainnet WIF version byte
    pub fn wif_prefix(self) -> u8 {
        match self {
            Chain::Litecoin => 0xb0,
            Chain::Dogecoin => 0x9e,
            Chain::Bitcoin | Chain::BitcoinCash | Chain::ECash => 0x80,
        }
    }
}

/// Signer configuration
///
/// Every field has a default, so `{}` is a valid configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignerConfig {
    pub chain: Chain,
    /// Overrides the chain's default sighash type when set
    pub sighash_type: Option<u8>,
    /// Sort multisig public keys by serialized form
    pub sort_public_keys: bool,
    pub signing_method: SigningMethod,
}

impl Default for SignerConfig {
    fn default() -> Self {
        SignerConfig {
            chain: Chain::default(),
            sighash_type: None,
            sort_public_keys: true,
            signing_method: SigningMethod::Ecdsa,
        }
    }
}

impl SignerConfig {
    pub fn for_chain(chain: Chain) -> Self {
        SignerConfig {
            chain,
            ..SignerConfig::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: SignerConfig =
            serde_json::from_str(json).map_err(|e| SignerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject sighash types whose base mode is not ALL, NONE or SINGLE,
    /// fork-id mismatches with the selected chain and Schnorr signing on
    /// chains without the 64-byte signature format
    pub fn validate(&self) -> Result<()> {
        if self.signing_method == SigningMethod::Schnorr && !self.chain.uses_fork_id() {
            return Err(SignerError::Config(format!(
                "chain {:?} has no Schnorr signatures",
                self.chain
            )));
        }
        if let Some(sighash_type) = self.sighash_type {
            let base = sighash_type & SIGHASH_BASE_MASK;
            if !(SIGHASH_ALL..=SIGHASH_SINGLE).contains(&base) {
                return Err(SignerError::Config(format!(
                    "unknown sighash type 0x{:02x}",
                    sighash_type
                )));
            }
            let has_fork_id = sighash_type & SIGHASH_FORKID != 0;
            if has_fork_id != self.chain.uses_fork_id() {
                return Err(SignerError::Config(format!(
                    "sighash type 0x{:02x} does not match chain {:?}",
                    sighash_type, self.chain
                )));
            }
        }
        Ok(())
    }

    /// Effective sighash type for new signatures
    pub fn sighash_type(&self) -> u8 {
        self.sighash_type
            .unwrap_or_else(|| self.chain.default_sighash_type())
    }
}
