use serde::Serialize;
use tracing::warn;

use crate::config::Config;
use crate::geo::{GeoPoint, haversine_km};
use crate::state::AppState;

pub const BASE_FEE_SETTING: &str = "courier_base_fee";
pub const COMMISSION_RATE_SETTING: &str = "platform_commission_rate";

const DEFAULT_BASE_DISTANCE_KM: f64 = 3.0;
const DEFAULT_PER_KM_RATE: i64 = 2_000;
const DEFAULT_ROUNDING_STEP: i64 = 500;

/// Distance based delivery pricing. Amounts are currency minor units.
#[derive(Debug, Clone, Copy)]
pub struct PricingPolicy {
    pub base_distance_km: f64,
    pub per_km_rate: i64,
    pub rounding_step: i64,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            base_distance_km: DEFAULT_BASE_DISTANCE_KM,
            per_km_rate: DEFAULT_PER_KM_RATE,
            rounding_step: DEFAULT_ROUNDING_STEP,
        }
    }
}

impl PricingPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_distance_km: config.fee_base_distance_km,
            per_km_rate: config.courier_per_km_rate,
            rounding_step: config.fee_rounding_step.max(1),
        }
    }

    pub fn delivery_fee(&self, distance_km: f64, base_fee: i64) -> i64 {
        let distance_km = if distance_km.is_finite() {
            distance_km.max(0.0)
        } else {
            0.0
        };

        let raw = if distance_km <= self.base_distance_km {
            base_fee as f64
        } else {
            base_fee as f64 + (distance_km - self.base_distance_km) * self.per_km_rate as f64
        };

        round_half_up(raw, self.rounding_step)
    }
}

pub fn delivery_fee(distance_km: f64, base_fee: i64) -> i64 {
    PricingPolicy::default().delivery_fee(distance_km, base_fee)
}

fn round_half_up(amount: f64, step: i64) -> i64 {
    let step = step as f64;
    ((amount / step + 0.5).floor() * step) as i64
}

#[derive(Debug, Clone, Serialize)]
pub struct FeeEstimate {
    pub distance_km: f64,
    pub base_fee: i64,
    pub delivery_fee: i64,
}

/// Reads the base fee from platform settings, falling back to the configured default.
pub async fn resolve_base_fee(state: &AppState) -> i64 {
    match state.repo.setting(BASE_FEE_SETTING).await {
        Ok(Some(raw)) => match raw.trim().parse::<i64>() {
            Ok(fee) if fee >= 0 => fee,
            _ => {
                warn!(setting = BASE_FEE_SETTING, value = %raw, "unparseable base fee setting; using default");
                state.config.courier_base_fee
            }
        },
        Ok(None) => state.config.courier_base_fee,
        Err(err) => {
            warn!(error = %err, "failed to read base fee setting; using default");
            state.config.courier_base_fee
        }
    }
}

/// Parses a commission rate, accepting only fractions in `0..=1`.
pub fn parse_commission_rate(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|rate| (0.0..=1.0).contains(rate))
}

/// Reads the platform commission rate from settings, falling back to the configured default.
pub async fn resolve_commission_rate(state: &AppState) -> f64 {
    match state.repo.setting(COMMISSION_RATE_SETTING).await {
        Ok(Some(raw)) => parse_commission_rate(&raw).unwrap_or_else(|| {
            warn!(setting = COMMISSION_RATE_SETTING, value = %raw, "unparseable commission setting; using default");
            state.config.platform_commission_rate
        }),
        Ok(None) => state.config.platform_commission_rate,
        Err(err) => {
            warn!(error = %err, "failed to read commission setting; using default");
            state.config.platform_commission_rate
        }
    }
}

/// How the item value of an order is divided between platform and seller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommissionSplit {
    pub platform_commission: i64,
    pub seller_amount: i64,
}

/// The commission is taken from the item subtotal only; the delivery fee goes to the courier.
pub fn commission_split(subtotal: i64, rate: f64) -> CommissionSplit {
    let rate = rate.clamp(0.0, 1.0);
    let platform_commission = ((subtotal as f64) * rate).round() as i64;
    let platform_commission = platform_commission.clamp(0, subtotal.max(0));

    CommissionSplit {
        platform_commission,
        seller_amount: subtotal - platform_commission,
    }
}

pub async fn estimate(state: &AppState, from: &GeoPoint, to: &GeoPoint) -> FeeEstimate {
    let distance_km = haversine_km(from, to);
    let base_fee = resolve_base_fee(state).await;

    FeeEstimate {
        distance_km,
        base_fee,
        delivery_fee: state.pricing.delivery_fee(distance_km, base_fee),
    }
}
