use crate::core::arn::{Address, AssetType, TokenStandard};
use anyhow::{Context, Result};

/// Derives the ARN of an asset from its contract, standard and token id.
pub fn derive(contract: &str, standard: &str, id: u128) -> Result<AssetType> {
    let contract: Address = contract
        .parse()
        .with_context(|| format!("Invalid contract address: {contract}"))?;
    let standard: TokenStandard = standard.parse()?;
    Ok(AssetType {
        contract,
        standard,
        id,
    })
}

pub fn run(contract: &str, standard: &str, id: u128) -> Result<()> {
    let asset = derive(contract, standard, id)?;
    println!("{}", asset.arn());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::arn::Arn;

    #[test]
    fn test_derive_ether() {
        let asset = derive("0x0000000000000000000000000000000000000000", "ether", 0).unwrap();
        assert_eq!(asset.arn(), Arn::ether());
    }

    #[test]
    fn test_derive_rejects_bad_input() {
        assert!(derive("0x12", "erc20", 0).is_err());
        assert!(derive("0x0000000000000000000000000000000000000000", "erc777", 0).is_err());
    }
}
