use cosmwasm_std::{Addr, StdResult, Storage, Uint128};
use cw_storage_plus::{Item, Map};

use super::TopKey;

/// Internal consumer balances in the fee denom. Batches are escrowed from here.
pub const BALANCES: Map<&Addr, Uint128> = Map::new(TopKey::Balances.as_str());

/// Sum of all service fees currently held in escrow
const ESCROWED: Item<Uint128> = Item::new(TopKey::Escrowed.as_str());

/// Earned fees per provider, net of tax
pub const PROVIDER_EARNED_FEES: Map<&Addr, Uint128> =
    Map::new(TopKey::ProviderEarnedFees.as_str());

/// Earned fees per owner, the sum over all of the owner's providers
pub const OWNER_EARNED_FEES: Map<&Addr, Uint128> = Map::new(TopKey::OwnerEarnedFees.as_str());

pub fn get_balance(storage: &dyn Storage, consumer: &Addr) -> StdResult<Uint128> {
    let balance = BALANCES.may_load(storage, consumer)?.unwrap_or_default();
    Ok(balance)
}

pub fn credit_balance(storage: &mut dyn Storage, consumer: &Addr, amount: Uint128) -> StdResult<Uint128> {
    let new_balance = get_balance(storage, consumer)?.checked_add(amount)?;
    BALANCES.save(storage, consumer, &new_balance)?;
    Ok(new_balance)
}

/// Removes `amount` from the balance. Returns `None` and leaves the balance untouched
/// if it does not cover the amount.
pub fn debit_balance(
    storage: &mut dyn Storage,
    consumer: &Addr,
    amount: Uint128,
) -> StdResult<Option<Uint128>> {
    let balance = get_balance(storage, consumer)?;
    let Ok(new_balance) = balance.checked_sub(amount) else {
        return Ok(None);
    };
    if new_balance.is_zero() {
        BALANCES.remove(storage, consumer);
    } else {
        BALANCES.save(storage, consumer, &new_balance)?;
    }
    Ok(Some(new_balance))
}

pub fn escrowed(storage: &dyn Storage) -> StdResult<Uint128> {
    Ok(ESCROWED.may_load(storage)?.unwrap_or_default())
}

pub fn set_escrowed(storage: &mut dyn Storage, amount: Uint128) -> StdResult<()> {
    ESCROWED.save(storage, &amount)
}

pub fn provider_earned_fees(storage: &dyn Storage, provider: &Addr) -> StdResult<Uint128> {
    Ok(PROVIDER_EARNED_FEES
        .may_load(storage, provider)?
        .unwrap_or_default())
}

pub fn owner_earned_fees(storage: &dyn Storage, owner: &Addr) -> StdResult<Uint128> {
    Ok(OWNER_EARNED_FEES.may_load(storage, owner)?.unwrap_or_default())
}
