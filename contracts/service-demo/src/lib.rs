pub mod contract;
mod error;
pub mod msg;
mod state;

pub use error::ContractError;
pub use state::BatchResult;
