use cosmwasm_schema::cw_serde;
use cosmwasm_std::{Addr, Coin, HexBinary, Order, StdResult, Storage};
use cw_storage_plus::{Bound, Map};

use super::TopKey;

/// The storage-minimal representation of one provider's sub-request within a batch
#[cw_serde]
pub struct CompactRequest {
    pub request_context_id: HexBinary,
    pub batch_counter: u64,
    pub provider: Addr,
    /// The escrowed effective fee of this provider
    pub service_fee: Coin,
    pub request_height: u64,
    pub expiration_height: u64,
}

#[cw_serde]
pub struct Response {
    pub provider: Addr,
    pub consumer: Addr,
    /// JSON encoded `ResponseResult`
    pub result: String,
    pub output: String,
    pub request_context_id: HexBinary,
    pub batch_counter: u64,
}

/// A map from (context ID, batch counter, request ID) to request
pub const REQUESTS: Map<(&[u8], u64, &[u8]), CompactRequest> =
    Map::new(TopKey::Requests.as_str());

/// A map from (context ID, batch counter, request ID) to response
pub const RESPONSES: Map<(&[u8], u64, &[u8]), Response> = Map::new(TopKey::Responses.as_str());

/// Outstanding requests. A map from (service name, provider, request ID) to expiration height.
pub const ACTIVE_REQUESTS: Map<(&str, &Addr, &[u8]), u64> =
    Map::new(TopKey::ActiveRequests.as_str());

pub fn is_request_active(
    storage: &dyn Storage,
    service_name: &str,
    provider: &Addr,
    request_id: &[u8],
) -> bool {
    ACTIVE_REQUESTS.has(storage, (service_name, provider, request_id))
}

pub fn remove_active_request(
    storage: &mut dyn Storage,
    service_name: &str,
    provider: &Addr,
    request_id: &[u8],
) {
    ACTIVE_REQUESTS.remove(storage, (service_name, provider, request_id));
}

/// All requests of a batch in request ID order
pub fn batch_requests(
    storage: &dyn Storage,
    context_id: &[u8],
    batch_counter: u64,
) -> StdResult<Vec<(Vec<u8>, CompactRequest)>> {
    REQUESTS
        .prefix((context_id, batch_counter))
        .range(storage, None, None, Order::Ascending)
        .collect()
}

/// All responses of a batch in request ID order
pub fn batch_responses(
    storage: &dyn Storage,
    context_id: &[u8],
    batch_counter: u64,
) -> StdResult<Vec<(Vec<u8>, Response)>> {
    RESPONSES
        .prefix((context_id, batch_counter))
        .range(storage, None, None, Order::Ascending)
        .collect()
}

/// Outstanding request IDs of a provider for a service together with their expiration heights
pub fn active_requests(
    storage: &dyn Storage,
    service_name: &str,
    provider: &Addr,
    start_after: Option<&[u8]>,
    limit: usize,
) -> StdResult<Vec<(Vec<u8>, u64)>> {
    ACTIVE_REQUESTS
        .prefix((service_name, provider))
        .range(
            storage,
            start_after.map(Bound::exclusive),
            None,
            Order::Ascending,
        )
        .take(limit)
        .collect()
}

/// Deletes all requests and responses of a batch, including leftover active request entries
pub fn clean_batch(
    storage: &mut dyn Storage,
    service_name: &str,
    context_id: &[u8],
    batch_counter: u64,
) -> StdResult<()> {
    for (request_id, request) in batch_requests(storage, context_id, batch_counter)? {
        let request_id = request_id.as_slice();
        remove_active_request(storage, service_name, &request.provider, request_id);
        REQUESTS.remove(storage, (context_id, batch_counter, request_id));
        RESPONSES.remove(storage, (context_id, batch_counter, request_id));
    }
    Ok(())
}
