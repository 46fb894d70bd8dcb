//! Asset resource names (ARNs).
//!
//! An ARN is the keccak256 hash of the ABI-encoded asset type: contract
//! address, token standard code and token id, each as a 32 byte word.

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use std::fmt::Display;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Default)]
pub struct Address([u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl FromStr for Address {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| anyhow!("Address must start with 0x: {}", s))?;
        if digits.len() != 40 {
            bail!("Address must have 40 hex digits: {}", s);
        }
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(digits, &mut bytes)
            .with_context(|| format!("Invalid hex in address: {s}"))?;
        Ok(Address(bytes))
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenStandard {
    Ether,
    Erc20,
    Erc721,
    Erc1155,
}

impl TokenStandard {
    pub fn code(&self) -> u64 {
        match self {
            TokenStandard::Ether => 0,
            TokenStandard::Erc20 => 20,
            TokenStandard::Erc721 => 721,
            TokenStandard::Erc1155 => 1155,
        }
    }
}

impl Display for TokenStandard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                TokenStandard::Ether => "ether",
                TokenStandard::Erc20 => "erc20",
                TokenStandard::Erc721 => "erc721",
                TokenStandard::Erc1155 => "erc1155",
            }
        )
    }
}

impl FromStr for TokenStandard {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "0" | "ether" | "eth" => Ok(TokenStandard::Ether),
            "20" | "erc20" => Ok(TokenStandard::Erc20),
            "721" | "erc721" => Ok(TokenStandard::Erc721),
            "1155" | "erc1155" => Ok(TokenStandard::Erc1155),
            _ => Err(anyhow!("Invalid token standard: {}", s)),
        }
    }
}

impl Serialize for TokenStandard {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TokenStandard {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Code(u64),
            Name(String),
        }
        let parsed: Result<TokenStandard> = match Raw::deserialize(deserializer)? {
            Raw::Code(code) => code.to_string().parse(),
            Raw::Name(name) => name.parse(),
        };
        parsed.map_err(serde::de::Error::custom)
    }
}

/// The (contract, standard, id) triple an ARN is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AssetType {
    pub contract: Address,
    pub standard: TokenStandard,
    pub id: u128,
}

impl AssetType {
    pub fn ether() -> Self {
        AssetType {
            contract: Address::ZERO,
            standard: TokenStandard::Ether,
            id: 0,
        }
    }

    /// ABI encoding of the asset type: three left-padded 32 byte words.
    pub fn abi_encode(&self) -> [u8; 96] {
        let mut encoded = [0u8; 96];
        encoded[12..32].copy_from_slice(self.contract.as_bytes());
        encoded[56..64].copy_from_slice(&self.standard.code().to_be_bytes());
        encoded[80..96].copy_from_slice(&self.id.to_be_bytes());
        encoded
    }

    pub fn arn(&self) -> Arn {
        let digest = Keccak256::digest(self.abi_encode());
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Arn(bytes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct Arn([u8; 32]);

impl Arn {
    pub fn ether() -> Self {
        AssetType::ether().arn()
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// First and last bytes, for narrow table columns.
    pub fn short(&self) -> String {
        let full = hex::encode(self.0);
        format!("0x{}…{}", &full[..6], &full[full.len() - 4..])
    }
}

impl From<[u8; 32]> for Arn {
    fn from(bytes: [u8; 32]) -> Self {
        Arn(bytes)
    }
}

impl FromStr for Arn {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        if digits.len() != 64 {
            bail!("ARN must have 64 hex digits: {}", s);
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(digits, &mut bytes)
            .with_context(|| format!("Invalid hex in ARN: {s}"))?;
        Ok(Arn(bytes))
    }
}

impl Display for Arn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Serialize for Arn {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Arn {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
