use cosmwasm_schema::cw_serde;
use cosmwasm_std::{Addr, Coin, StdResult, Storage};
use cw_storage_plus::{Item, Map};
use service_protocol::ContextState;

use super::TopKey;

#[cw_serde]
#[derive(Copy)]
pub enum BatchState {
    Running,
    Completed,
}

/// One logical, possibly repeating invocation of a service
#[cw_serde]
pub struct RequestContext {
    pub service_name: String,
    pub providers: Vec<Addr>,
    pub consumer: Addr,
    pub input: String,
    /// Maximum fee the consumer accepts per provider and batch
    pub service_fee_cap: Coin,
    /// The registered module receiving callbacks for this context
    pub module_name: Option<String>,
    /// Number of blocks providers have to respond to a batch
    pub timeout: u64,
    pub super_mode: bool,
    pub repeated: bool,
    /// Blocks between the start of two batches
    pub repeated_frequency: u64,
    /// Number of batches to run in total. -1 means unbounded.
    pub repeated_total: i64,
    pub batch_counter: u64,
    pub batch_request_count: u32,
    pub batch_response_count: u32,
    pub batch_response_threshold: u32,
    pub batch_state: BatchState,
    pub state: ContextState,
    pub response_threshold: u32,
}

impl RequestContext {
    /// Whether another batch may be scheduled after the current one
    pub fn has_remaining_batches(&self) -> bool {
        self.repeated && (self.repeated_total < 0 || (self.batch_counter as i64) < self.repeated_total)
    }
}

/// A map from request context ID to request context
pub const CONTEXTS: Map<&[u8], RequestContext> = Map::new(TopKey::Contexts.as_str());

const CONTEXT_SEQUENCE: Item<u64> = Item::new(TopKey::ContextSequence.as_str());

/// Returns the next value of a contract wide sequence, starting at 1
pub fn next_context_sequence(storage: &mut dyn Storage) -> StdResult<u64> {
    let next = CONTEXT_SEQUENCE.may_load(storage)?.unwrap_or_default() + 1;
    CONTEXT_SEQUENCE.save(storage, &next)?;
    Ok(next)
}
