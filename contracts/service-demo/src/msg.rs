use cosmwasm_schema::{cw_serde, QueryResponses};
use cosmwasm_std::{Coin, HexBinary};
use service_protocol::{ResponseCallback, StateCallback};

use crate::state::BatchResult;

#[cw_serde]
pub struct InstantiateMsg {
    /// Address of the service market contract
    pub market: String,
    pub module_name: String,
}

#[cw_serde]
pub enum ExecuteMsg {
    /// Starts a request context in the market on behalf of this module
    Request {
        service_name: String,
        providers: Vec<String>,
        input: String,
        service_fee_cap: Coin,
        timeout: u64,
        #[serde(default)]
        super_mode: bool,
        /// Makes the request repeated if set
        repeated_total: Option<i64>,
        repeated_frequency: Option<u64>,
        response_threshold: Option<u32>,
    },
    // The two callbacks of the market's receiver interface
    ServiceResponse {
        callback: ResponseCallback,
    },
    ServiceState {
        callback: StateCallback,
    },
}

#[cw_serde]
#[derive(QueryResponses)]
pub enum QueryMsg {
    /// All batch results of a request context
    #[returns(Vec<BatchResult>)]
    Results { request_context_id: HexBinary },
    #[returns(Option<StateCallback>)]
    State { request_context_id: HexBinary },
}
