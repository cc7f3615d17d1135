use cosmwasm_std::{Addr, StdResult, Storage};
use cw_storage_plus::Map;

use super::TopKey;

/// Number of accepted responses per (consumer, service name, provider)
const VOLUMES: Map<(&Addr, &str, &Addr), u64> = Map::new(TopKey::Volumes.as_str());

pub fn get_volume(
    storage: &dyn Storage,
    consumer: &Addr,
    service_name: &str,
    provider: &Addr,
) -> StdResult<u64> {
    let volume = VOLUMES
        .may_load(storage, (consumer, service_name, provider))?
        .unwrap_or(0);
    Ok(volume)
}

pub fn increment_volume(
    storage: &mut dyn Storage,
    consumer: &Addr,
    service_name: &str,
    provider: &Addr,
) -> StdResult<u64> {
    let volume = get_volume(storage, consumer, service_name, provider)? + 1;
    VOLUMES.save(storage, (consumer, service_name, provider), &volume)?;
    Ok(volume)
}
