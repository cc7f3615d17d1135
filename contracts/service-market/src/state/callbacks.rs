use cosmwasm_std::Addr;
use cw_storage_plus::Map;

use super::TopKey;

/// A map from module name to the contract receiving its callbacks
pub const CALLBACKS: Map<&str, Addr> = Map::new(TopKey::Callbacks.as_str());
