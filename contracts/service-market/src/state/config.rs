use cosmwasm_schema::cw_serde;
use cosmwasm_std::{Addr, Decimal, Uint128};
use cw_storage_plus::Item;

use super::TopKey;
use crate::error::ContractError;

const DAY: u64 = 24 * 3600;

const MIN_REQUEST_TIMEOUT: u64 = 2;
const MIN_DEPOSIT_MULTIPLE: u64 = 500;
const MAX_DEPOSIT_MULTIPLE: u64 = 5000;
const MIN_COMPLAINT_RETROSPECT: u64 = 15 * DAY;
const MAX_COMPLAINT_RETROSPECT: u64 = 30 * DAY;
const MIN_ARBITRATION_TIME_LIMIT: u64 = 5 * DAY;
const MAX_ARBITRATION_TIME_LIMIT: u64 = 10 * DAY;

#[cw_serde]
pub struct Config {
    /// Manager to set params, register tokens and callback modules
    pub manager: Addr,
    /// The bank denom all fees, deposits and balances are denominated in
    pub fee_denom: String,
    /// Receives the tax of every settled service fee
    pub tax_collector: Addr,
    pub params: Params,
}

#[cw_serde]
pub struct Params {
    /// Upper bound for request timeouts and binding response times, in blocks
    pub max_request_timeout: u64,
    /// The minimum deposit of a binding is its price multiplied by this
    pub min_deposit_multiple: u64,
    /// Absolute lower bound for binding deposits in `fee_denom`
    pub min_deposit: Uint128,
    pub service_fee_tax: Decimal,
    /// Fraction of the deposit burnt for every request a provider did not respond to
    pub slash_fraction: Decimal,
    /// In seconds
    pub complaint_retrospect: u64,
    /// In seconds
    pub arbitration_time_limit: u64,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            max_request_timeout: 100,
            min_deposit_multiple: 1000,
            min_deposit: Uint128::new(10_000),
            service_fee_tax: Decimal::percent(1),
            slash_fraction: Decimal::permille(1),
            complaint_retrospect: 15 * DAY,
            arbitration_time_limit: 5 * DAY,
        }
    }
}

impl Params {
    pub fn validate(&self) -> Result<(), ContractError> {
        if self.max_request_timeout < MIN_REQUEST_TIMEOUT {
            return Err(invalid(format!(
                "max_request_timeout must be at least {MIN_REQUEST_TIMEOUT}"
            )));
        }
        if !(MIN_DEPOSIT_MULTIPLE..=MAX_DEPOSIT_MULTIPLE).contains(&self.min_deposit_multiple) {
            return Err(invalid(format!(
                "min_deposit_multiple must be between {MIN_DEPOSIT_MULTIPLE} and {MAX_DEPOSIT_MULTIPLE}"
            )));
        }
        if self.min_deposit.is_zero() {
            return Err(invalid("min_deposit must be positive".to_string()));
        }
        if self.service_fee_tax.is_zero() || self.service_fee_tax > Decimal::percent(20) {
            return Err(invalid("service_fee_tax must be in (0, 0.2]".to_string()));
        }
        if self.slash_fraction.is_zero() || self.slash_fraction > Decimal::percent(1) {
            return Err(invalid("slash_fraction must be in (0, 0.01]".to_string()));
        }
        if !(MIN_COMPLAINT_RETROSPECT..=MAX_COMPLAINT_RETROSPECT)
            .contains(&self.complaint_retrospect)
        {
            return Err(invalid("complaint_retrospect out of range".to_string()));
        }
        if !(MIN_ARBITRATION_TIME_LIMIT..=MAX_ARBITRATION_TIME_LIMIT)
            .contains(&self.arbitration_time_limit)
        {
            return Err(invalid("arbitration_time_limit out of range".to_string()));
        }
        Ok(())
    }

    /// Seconds a binding must stay disabled before its deposit can be refunded
    pub fn refund_cooldown(&self) -> u64 {
        self.arbitration_time_limit + self.complaint_retrospect
    }
}

fn invalid(msg: String) -> ContractError {
    ContractError::InvalidParams(msg)
}

pub const CONFIG: Item<Config> = Item::new(TopKey::Config.as_str());
