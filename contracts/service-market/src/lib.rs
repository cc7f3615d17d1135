mod attributes;
mod bindings;
mod filter;
mod ids;
mod ledger;
mod lifecycle;
mod pricing;
mod registry;
mod scheduler;
mod tokens;

pub mod contract;
pub mod error;
pub mod msg;
pub mod state;

pub use crate::ids::{split_request_context_id, split_request_id, RequestIdParts};
pub use crate::msg::{ExecuteMsg, InstantiateMsg, QueryMsg, SudoMsg};
