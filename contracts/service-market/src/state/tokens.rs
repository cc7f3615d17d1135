use cosmwasm_schema::cw_serde;
use cw_storage_plus::Map;

use super::TopKey;

#[cw_serde]
pub struct Token {
    /// Display symbol, e.g. "stake"
    pub symbol: String,
    /// The bank denom of the smallest unit, e.g. "ustake"
    pub min_unit: String,
    /// Number of decimal places between `symbol` and `min_unit`
    pub scale: u32,
}

/// A map from symbol to token
pub const TOKENS: Map<&str, Token> = Map::new(TopKey::Tokens.as_str());
