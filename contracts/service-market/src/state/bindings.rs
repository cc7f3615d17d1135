use cosmwasm_schema::cw_serde;
use cosmwasm_std::{Addr, Coin, Empty, Timestamp};
use cw_storage_plus::Map;

use super::TopKey;

#[cw_serde]
pub struct ServiceBinding {
    pub service_name: String,
    pub provider: Addr,
    /// The account that bound the provider and receives its earnings and deposit refunds
    pub owner: Addr,
    /// Collateral held by the market, slashed on non-response
    pub deposit: Coin,
    /// Raw pricing JSON as submitted by the owner
    pub pricing: String,
    /// Minimum number of blocks the provider needs to respond
    pub min_resp_time: u64,
    pub available: bool,
    /// Set while the binding is disabled. Starts the deposit refund cool-down.
    pub disabled_time: Option<Timestamp>,
}

/// A map from (service name, provider) to binding
pub const BINDINGS: Map<(&str, &Addr), ServiceBinding> = Map::new(TopKey::Bindings.as_str());

/// A map from provider to its owner. A provider is owned by exactly one owner.
pub const PROVIDER_OWNERS: Map<&Addr, Addr> = Map::new(TopKey::ProviderOwners.as_str());

/// Index of all providers of an owner
pub const OWNER_PROVIDERS: Map<(&Addr, &Addr), Empty> =
    Map::new(TopKey::OwnerProviders.as_str());

/// A map from owner to the address earned fees are paid to
pub const WITHDRAW_ADDRESSES: Map<&Addr, Addr> = Map::new(TopKey::WithdrawAddresses.as_str());
