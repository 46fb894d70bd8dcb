//! Query scopes for balance lookups

use anyhow::{Result, anyhow};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::Display;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextKind {
    Key,
    Trust,
    Ledger,
}

impl Display for ContextKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                ContextKind::Key => "key",
                ContextKind::Trust => "trust",
                ContextKind::Ledger => "ledger",
            }
        )
    }
}

impl FromStr for ContextKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "key" => Ok(ContextKind::Key),
            "trust" => Ok(ContextKind::Trust),
            "ledger" => Ok(ContextKind::Ledger),
            _ => Err(anyhow!("Invalid context kind: {}", s)),
        }
    }
}

/// A key, a trust, or the whole ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct Context {
    pub kind: ContextKind,
    pub id: u64,
}

impl Context {
    pub fn key(id: u64) -> Self {
        Context {
            kind: ContextKind::Key,
            id,
        }
    }

    pub fn trust(id: u64) -> Self {
        Context {
            kind: ContextKind::Trust,
            id,
        }
    }

    pub fn ledger() -> Self {
        Context {
            kind: ContextKind::Ledger,
            id: 0,
        }
    }
}

impl Display for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            ContextKind::Ledger => write!(f, "ledger"),
            kind => write!(f, "{}:{}", kind, self.id),
        }
    }
}

impl FromStr for Context {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = match s.split_once(':') {
            Some((kind, id)) => (kind.trim().parse::<ContextKind>()?, Some(id.trim())),
            None => (s.trim().parse::<ContextKind>()?, None),
        };

        match (kind, id) {
            (ContextKind::Ledger, None) => Ok(Context::ledger()),
            (ContextKind::Ledger, Some(_)) => Err(anyhow!("Ledger context takes no id: {}", s)),
            (_, None) => Err(anyhow!("Missing id for {} context: {}", kind, s)),
            (kind, Some(id)) => {
                let id = id
                    .parse::<u64>()
                    .map_err(|e| anyhow!("Invalid context id in '{}': {}", s, e))?;
                Ok(Context { kind, id })
            }
        }
    }
}

impl Serialize for Context {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Context {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_parsing() {
        assert_eq!("key:3".parse::<Context>().unwrap(), Context::key(3));
        assert_eq!("Trust:1".parse::<Context>().unwrap(), Context::trust(1));
        assert_eq!("ledger".parse::<Context>().unwrap(), Context::ledger());

        assert!("key".parse::<Context>().is_err());
        assert!("ledger:2".parse::<Context>().is_err());
        assert!("vault:2".parse::<Context>().is_err());
        assert!("key:-1".parse::<Context>().is_err());
    }

    #[test]
    fn test_context_display() {
        assert_eq!(Context::key(3).to_string(), "key:3");
        assert_eq!(Context::trust(10).to_string(), "trust:10");
        assert_eq!(Context::ledger().to_string(), "ledger");
    }
}
