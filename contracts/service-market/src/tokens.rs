//! Conversion of human readable prices into amounts of the fee denom

use cosmwasm_std::{Coin, Storage, Uint128};

use crate::error::ContractError;
use crate::state::TOKENS;

/// Resolves a price like "1.5stake" or "1500000ustake" into min units of `fee_denom`.
///
/// The denom may either be `fee_denom` itself (integer amounts only) or the symbol of a
/// registered token whose min unit is `fee_denom`.
pub fn resolve_price(
    storage: &dyn Storage,
    price: &str,
    fee_denom: &str,
) -> Result<Coin, ContractError> {
    let split = price
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .ok_or_else(|| ContractError::InvalidPricing(format!("price has no denom: {price}")))?;
    let (amount, denom) = price.split_at(split);
    if amount.is_empty() {
        return Err(ContractError::InvalidPricing(format!(
            "price has no amount: {price}"
        )));
    }

    if denom == fee_denom {
        return Ok(Coin::new(to_min_units(amount, 0)?.u128(), fee_denom));
    }

    let token = TOKENS
        .may_load(storage, denom)?
        .ok_or_else(|| ContractError::UnknownToken {
            symbol: denom.to_string(),
        })?;
    if token.min_unit != fee_denom {
        return Err(ContractError::InvalidPricing(format!(
            "price must be denominated in {fee_denom}"
        )));
    }
    Ok(Coin::new(to_min_units(amount, token.scale)?.u128(), fee_denom))
}

/// Converts a decimal string with at most `scale` fractional digits to an integer amount
fn to_min_units(amount: &str, scale: u32) -> Result<Uint128, ContractError> {
    let invalid = || ContractError::InvalidPricing(format!("invalid price amount: {amount}"));

    let (whole, fraction) = match amount.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (amount, ""),
    };
    if whole.is_empty() || fraction.len() > scale as usize || fraction.contains('.') {
        return Err(invalid());
    }
    if amount.contains('.') && fraction.is_empty() {
        return Err(invalid());
    }

    let factor = Uint128::new(10).checked_pow(scale).map_err(|_| invalid())?;
    let whole: Uint128 = whole.parse::<u128>().map_err(|_| invalid())?.into();
    let mut total = whole.checked_mul(factor).map_err(|_| invalid())?;
    if !fraction.is_empty() {
        let fraction_factor = Uint128::new(10)
            .checked_pow(scale - fraction.len() as u32)
            .map_err(|_| invalid())?;
        let fraction: Uint128 = fraction.parse::<u128>().map_err(|_| invalid())?.into();
        total = total
            .checked_add(fraction.checked_mul(fraction_factor).map_err(|_| invalid())?)
            .map_err(|_| invalid())?;
    }
    Ok(total)
}
