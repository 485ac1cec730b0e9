//! Convert command implementation.

use anyhow::{bail, Result};

use crate::steam_id::{SteamId2, SteamId64};

/// Convert an identifier to the other encoding. The input form is auto-detected.
pub fn convert(input: &str) -> Result<String> {
    let input = input.trim();
    if input.to_ascii_uppercase().starts_with("STEAM_") {
        let id: SteamId2 = input.parse()?;
        return Ok(id.to_steam64().to_string());
    }
    if input.bytes().all(|b| b.is_ascii_digit()) && !input.is_empty() {
        let id: SteamId64 = input.parse()?;
        return Ok(id.to_steam2().to_string());
    }
    bail!("'{}' is neither a SteamID64 nor a STEAM_0:Y:Z identifier", input)
}

/// Run the convert command
pub fn run(input: &str) -> Result<()> {
    println!("{}", convert(input)?);
    Ok(())
}
