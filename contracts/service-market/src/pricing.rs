//! Provider price schedules with time and volume based promotions

use cosmwasm_schema::cw_serde;
use cosmwasm_std::{from_json, Coin, Decimal, Storage, Timestamp, Uint128};

use crate::error::ContractError;
use crate::state::Params;
use crate::tokens::resolve_price;

/// A discount applying to requests created in `[start_time, end_time)`
#[cw_serde]
pub struct PromotionByTime {
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub discount: Decimal,
}

/// A discount applying once a consumer made at least `volume` calls to a provider
#[cw_serde]
pub struct PromotionByVolume {
    pub volume: u64,
    pub discount: Decimal,
}

/// The pricing JSON as submitted with a binding
#[cw_serde]
struct RawPricing {
    price: String,
    #[serde(default)]
    promotions_by_time: Vec<PromotionByTime>,
    #[serde(default)]
    promotions_by_volume: Vec<PromotionByVolume>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pricing {
    /// Base price in min units of the fee denom
    pub price: Coin,
    pub promotions_by_time: Vec<PromotionByTime>,
    pub promotions_by_volume: Vec<PromotionByVolume>,
}

pub fn parse_pricing(
    storage: &dyn Storage,
    raw: &str,
    fee_denom: &str,
) -> Result<Pricing, ContractError> {
    let RawPricing {
        price,
        promotions_by_time,
        promotions_by_volume,
    } = from_json(raw.as_bytes()).map_err(|err| ContractError::InvalidPricing(err.to_string()))?;

    let price = resolve_price(storage, &price, fee_denom)?;
    validate_promotions_by_time(&promotions_by_time)?;
    validate_promotions_by_volume(&promotions_by_volume)?;

    Ok(Pricing {
        price,
        promotions_by_time,
        promotions_by_volume,
    })
}

fn validate_promotions_by_time(promotions: &[PromotionByTime]) -> Result<(), ContractError> {
    for (i, promotion) in promotions.iter().enumerate() {
        if promotion.end_time <= promotion.start_time {
            return Err(ContractError::InvalidPricing(
                "promotion end time must be after its start time".to_string(),
            ));
        }
        if i > 0 && promotion.start_time < promotions[i - 1].end_time {
            return Err(ContractError::InvalidPricing(
                "time promotions must not overlap and must be sorted".to_string(),
            ));
        }
        validate_discount(promotion.discount)?;
    }
    Ok(())
}

fn validate_promotions_by_volume(promotions: &[PromotionByVolume]) -> Result<(), ContractError> {
    for (i, promotion) in promotions.iter().enumerate() {
        if i > 0 && promotion.volume <= promotions[i - 1].volume {
            return Err(ContractError::InvalidPricing(
                "volume promotions must be strictly increasing".to_string(),
            ));
        }
        if i > 0 && promotion.discount > promotions[i - 1].discount {
            return Err(ContractError::InvalidPricing(
                "higher volumes must not get a smaller discount".to_string(),
            ));
        }
        validate_discount(promotion.discount)?;
    }
    Ok(())
}

fn validate_discount(discount: Decimal) -> Result<(), ContractError> {
    if discount > Decimal::one() {
        return Err(ContractError::InvalidPricing(format!(
            "discount {discount} must not exceed 1"
        )));
    }
    Ok(())
}

impl Pricing {
    fn time_discount(&self, time: Timestamp) -> Decimal {
        self.promotions_by_time
            .iter()
            .find(|p| p.start_time <= time && time < p.end_time)
            .map(|p| p.discount)
            .unwrap_or_else(Decimal::one)
    }

    fn volume_discount(&self, volume: u64) -> Decimal {
        self.promotions_by_volume
            .iter()
            .take_while(|p| p.volume <= volume)
            .last()
            .map(|p| p.discount)
            .unwrap_or_else(Decimal::one)
    }

    /// The fee a consumer with `volume` previous calls pays at `time`.
    /// Both discounts are applied one after the other, each rounding down.
    pub fn effective_price(&self, time: Timestamp, volume: u64) -> Coin {
        let amount = self.price.amount * self.time_discount(time);
        let amount = amount * self.volume_discount(volume);
        Coin {
            denom: self.price.denom.clone(),
            amount,
        }
    }

    /// The deposit a binding with this pricing must hold at least
    pub fn min_deposit(&self, params: &Params) -> Uint128 {
        let from_price = self
            .price
            .amount
            .saturating_mul(Uint128::from(params.min_deposit_multiple));
        from_price.max(params.min_deposit)
    }
}
