use cosmwasm_schema::cw_serde;
use cosmwasm_std::Addr;
use cw_storage_plus::{Item, Map};
use service_protocol::StateCallback;

#[cw_serde]
pub struct Config {
    pub market: Addr,
    /// The name this contract is registered under in the market
    pub module_name: String,
}

pub const CONFIG: Item<Config> = Item::new("config");

/// The outcome of one batch
#[cw_serde]
pub struct BatchResult {
    pub batch_counter: u64,
    pub outputs: Vec<String>,
    pub error: Option<String>,
}

/// Map from (request context ID, batch counter) to result
pub const RESULTS: Map<(&[u8], u64), BatchResult> = Map::new("results");

/// Latest state change per request context
pub const STATES: Map<&[u8], StateCallback> = Map::new("states");
