//! Selection of the providers serving the next batch of a request context

use cosmwasm_std::{Addr, Coin, StdError, Storage, Timestamp, Uint128};

use crate::error::ContractError;
use crate::pricing::parse_pricing;
use crate::state::{get_volume, BINDINGS};

#[derive(Debug, Clone, PartialEq)]
pub struct EligibleProvider {
    pub provider: Addr,
    /// The effective fee of this provider for this consumer
    pub service_fee: Coin,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterResult {
    /// Eligible providers in the order of the candidates
    pub providers: Vec<EligibleProvider>,
    pub total_fee: Coin,
}

pub struct FilterRequest<'a> {
    pub service_name: &'a str,
    pub consumer: &'a Addr,
    pub candidates: &'a [Addr],
    /// Maximum fee per provider
    pub service_fee_cap: &'a Coin,
    pub timeout: u64,
    pub fee_denom: &'a str,
    pub time: Timestamp,
}

/// Drops every candidate that is not bound to the service, is unavailable, needs more than
/// `timeout` blocks to respond or charges more than the fee cap.
pub fn filter_providers(
    storage: &dyn Storage,
    request: &FilterRequest,
) -> Result<FilterResult, ContractError> {
    let mut providers = Vec::with_capacity(request.candidates.len());
    let mut total = Uint128::zero();

    for candidate in request.candidates {
        let Some(binding) = BINDINGS.may_load(storage, (request.service_name, candidate))? else {
            continue;
        };
        if !binding.available || binding.min_resp_time > request.timeout {
            continue;
        }

        let pricing = parse_pricing(storage, &binding.pricing, request.fee_denom)?;
        let volume = get_volume(storage, request.consumer, request.service_name, candidate)?;
        let service_fee = pricing.effective_price(request.time, volume);
        if service_fee.denom != request.service_fee_cap.denom
            || service_fee.amount > request.service_fee_cap.amount
        {
            continue;
        }

        total = total
            .checked_add(service_fee.amount)
            .map_err(StdError::from)?;
        providers.push(EligibleProvider {
            provider: candidate.clone(),
            service_fee,
        });
    }

    Ok(FilterResult {
        providers,
        total_fee: Coin {
            denom: request.fee_denom.to_string(),
            amount: total,
        },
    })
}
