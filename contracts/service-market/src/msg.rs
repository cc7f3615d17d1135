use cosmwasm_schema::{cw_serde, QueryResponses};
use cosmwasm_std::{Addr, Coin, HexBinary, Uint128};

use crate::state::{
    CompactRequest, Config, Params, RequestContext, Response, ServiceBinding, Token,
};

#[cw_serde]
pub struct InstantiateMsg {
    pub manager: String,
    /// The bank denom all fees, deposits and balances are denominated in
    pub fee_denom: String,
    /// Receives the tax of settled service fees
    pub tax_collector: String,
    /// Uses the defaults if unset
    pub params: Option<Params>,
    /// Initial token registry, used to resolve prices
    pub tokens: Vec<Token>,
    /// Initial callback registry
    pub callbacks: Vec<CallbackRegistration>,
}

#[cw_serde]
pub struct CallbackRegistration {
    pub module_name: String,
    pub address: String,
}

#[cw_serde]
pub struct CallServiceMsg {
    pub service_name: String,
    /// Candidate providers in order of preference
    pub providers: Vec<String>,
    pub input: String,
    /// Maximum fee per provider and batch
    pub service_fee_cap: Coin,
    /// Number of blocks providers have to respond
    pub timeout: u64,
    /// Skips escrow and slashing. Only available for registered modules.
    #[serde(default)]
    pub super_mode: bool,
    #[serde(default)]
    pub repeated: bool,
    /// Blocks between two batches. Defaults to the timeout.
    pub repeated_frequency: Option<u64>,
    /// Number of batches, -1 for unbounded. Required for repeated calls.
    pub repeated_total: Option<i64>,
    /// Minimum number of responses per batch. Defaults to 1.
    pub response_threshold: Option<u32>,
    /// Set by registered modules to receive callbacks
    pub module_name: Option<String>,
}

#[cw_serde]
pub enum ExecuteMsg {
    /// Binds the sender (or a provider it owns) to a service. The deposit is sent as funds.
    BindService {
        service_name: String,
        /// Defaults to the sender
        provider: Option<String>,
        /// Pricing JSON, e.g. `{"price":"1stake"}`
        pricing: String,
        /// Minimum number of blocks the provider needs to respond
        min_resp_time: u64,
    },
    /// Updates a binding. Funds sent along are added to the deposit.
    UpdateServiceBinding {
        service_name: String,
        provider: String,
        pricing: Option<String>,
        min_resp_time: Option<u64>,
    },
    DisableServiceBinding {
        service_name: String,
        provider: String,
    },
    /// Enables a disabled binding. Funds sent along are added to the deposit.
    EnableServiceBinding {
        service_name: String,
        provider: String,
    },
    /// Returns the deposit of a binding that was disabled long enough
    RefundServiceDeposit {
        service_name: String,
        provider: String,
    },
    SetWithdrawAddress {
        withdraw_address: String,
    },
    /// Withdraws the earned fees of one provider or of all providers of the sender
    WithdrawEarnedFees {
        provider: Option<String>,
    },
    /// Adds the funds sent along to the sender's balance
    FundAccount {},
    /// Withdraws from the sender's balance. Withdraws everything if unset.
    WithdrawBalance {
        amount: Option<Uint128>,
    },
    /// Creates a request context. Funds sent along are added to the sender's balance.
    CallService(CallServiceMsg),
    RespondService {
        request_id: HexBinary,
        /// JSON encoded `{"code":200,"message":""}`
        result: String,
        output: String,
    },
    PauseRequestContext {
        request_context_id: HexBinary,
    },
    StartRequestContext {
        request_context_id: HexBinary,
    },
    KillRequestContext {
        request_context_id: HexBinary,
    },
    UpdateRequestContext {
        request_context_id: HexBinary,
        providers: Option<Vec<String>>,
        service_fee_cap: Option<Coin>,
        timeout: Option<u64>,
        repeated_frequency: Option<u64>,
        repeated_total: Option<i64>,
    },
    /// Set the config
    SetConfig {
        manager: Option<String>,
        tax_collector: Option<String>,
        params: Option<Params>,
    },
    RegisterToken {
        token: Token,
    },
    RegisterCallback {
        module_name: String,
        address: String,
    },
}

#[cw_serde]
pub enum SudoMsg {
    /// Called by the chain once per block after all transactions
    EndBlock {},
}

#[cw_serde]
#[derive(QueryResponses)]
pub enum QueryMsg {
    /// Get the config state
    #[returns(ConfigResponse)]
    Config {},
    #[returns(Params)]
    Params {},
    #[returns(Token)]
    Token { symbol: String },
    #[returns(ServiceBinding)]
    Binding {
        service_name: String,
        provider: String,
    },
    #[returns(BindingsResponse)]
    Bindings {
        service_name: String,
        /// The provider after which to start
        start_after: Option<String>,
        limit: Option<u32>,
    },
    #[returns(RequestContextResponse)]
    RequestContext { request_context_id: HexBinary },
    #[returns(RequestResponse)]
    Request { request_id: HexBinary },
    /// Outstanding requests of a provider
    #[returns(ActiveRequestsResponse)]
    ActiveRequests {
        service_name: String,
        provider: String,
        /// The request ID after which to start
        start_after: Option<HexBinary>,
        limit: Option<u32>,
    },
    #[returns(BatchRequestsResponse)]
    BatchRequests {
        request_context_id: HexBinary,
        batch_counter: u64,
    },
    #[returns(Response)]
    Response { request_id: HexBinary },
    #[returns(BatchResponsesResponse)]
    BatchResponses {
        request_context_id: HexBinary,
        batch_counter: u64,
    },
    #[returns(Coin)]
    EarnedFees { provider: String },
    #[returns(Coin)]
    OwnerEarnedFees { owner: String },
    #[returns(Addr)]
    WithdrawAddress { owner: String },
    #[returns(Coin)]
    Balance { consumer: String },
    /// Number of accepted responses
    #[returns(u64)]
    Volume {
        consumer: String,
        service_name: String,
        provider: String,
    },
    #[returns(Addr)]
    Callback { module_name: String },
    /// Total amount currently held in escrow
    #[returns(Coin)]
    Escrowed {},
}

// We define a custom struct for each query response
pub type ConfigResponse = Config;

#[cw_serde]
pub struct BindingsResponse {
    pub bindings: Vec<ServiceBinding>,
}

#[cw_serde]
pub struct RequestContextResponse {
    pub request_context_id: HexBinary,
    pub context: RequestContext,
    /// Height of the next scheduled batch, if any
    pub next_batch_height: Option<u64>,
    /// Height at which the running batch expires, if any
    pub expiration_height: Option<u64>,
}

/// A request expanded with the data of its context
#[cw_serde]
pub struct RequestResponse {
    pub id: HexBinary,
    pub service_name: String,
    pub consumer: Addr,
    pub input: String,
    pub super_mode: bool,
    pub active: bool,
    pub request: CompactRequest,
}

#[cw_serde]
pub struct ActiveRequest {
    pub request_id: HexBinary,
    pub expiration_height: u64,
}

#[cw_serde]
pub struct ActiveRequestsResponse {
    pub requests: Vec<ActiveRequest>,
}

#[cw_serde]
pub struct QueriedRequest {
    pub request_id: HexBinary,
    pub request: CompactRequest,
}

#[cw_serde]
pub struct BatchRequestsResponse {
    pub requests: Vec<QueriedRequest>,
}

#[cw_serde]
pub struct QueriedResponse {
    pub request_id: HexBinary,
    pub response: Response,
}

#[cw_serde]
pub struct BatchResponsesResponse {
    pub responses: Vec<QueriedResponse>,
}
