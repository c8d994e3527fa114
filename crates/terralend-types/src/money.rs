//! Fixed-point money model.
//!
//! Three integer newtypes keep the units apart: [`AssetAmount`] counts raw
//! smallest units of the collateral asset, [`Price`] is USD per asset unit
//! in 18-decimal fixed point, and [`UsdValue`] is the 18-decimal reference
//! value unit the interest and penalty math is carried out in. Every
//! cross-type conversion goes through an overflow-checked `U256` multiply/
//! divide; wrapping is reported as an error, never silently truncated.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::error::LendError;

/// 18-decimal fixed-point scale shared by [`Price`] and [`UsdValue`].
pub const SCALE: u128 = 1_000_000_000_000_000_000;

/// Basis-point denominator for penalty and liquidation-bonus shares.
pub const BP_DENOMINATOR: u128 = 10_000;

/// Rescale factor from an 8-decimal feed answer to the internal 18 decimals.
pub const FEED_SCALE_FACTOR: u128 = 10_000_000_000;

/// Quantity of the collateral asset in its smallest unit.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct AssetAmount(pub u128);

impl AssetAmount {
    pub fn new(raw: u128) -> Self {
        Self(raw)
    }

    pub fn zero() -> Self {
        Self(0)
    }

    pub fn raw(self) -> u128 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Self) -> Result<Self, LendError> {
        self.0
            .checked_add(other.0)
            .map(Self)
            .ok_or(LendError::ArithmeticOverflow("asset amount addition"))
    }

    pub fn checked_sub(self, other: Self) -> Result<Self, LendError> {
        self.0
            .checked_sub(other.0)
            .map(Self)
            .ok_or(LendError::ArithmeticOverflow("asset amount subtraction"))
    }

    /// The exact 2x stake a request must post for this principal.
    pub fn required_stake(self) -> Result<Self, LendError> {
        self.0
            .checked_mul(2)
            .map(Self)
            .ok_or(LendError::ArithmeticOverflow("stake requirement"))
    }

    /// Truncating basis-point share of this amount.
    ///
    /// Truncation keeps the remainder with the counter-leg, so a split of
    /// `share_bp(bp)` and the subtracted rest always reassembles exactly.
    pub fn share_bp(self, bp: u16) -> Result<Self, LendError> {
        mul_div(self.0, bp as u128, BP_DENOMINATOR, "basis-point share").map(Self)
    }

    /// Reference value of this amount at the given price.
    pub fn value_at(self, price: Price) -> Result<UsdValue, LendError> {
        mul_div(self.0, price.0, SCALE, "amount to value conversion").map(UsdValue)
    }
}

impl std::fmt::Display for AssetAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// USD per collateral-asset unit, 18-decimal fixed point.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Price(pub u128);

impl Price {
    pub fn new(raw: u128) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u128 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Validate and rescale an 8-decimal feed answer to 18 decimals.
    pub fn from_feed_answer(answer: i128) -> Result<Self, LendError> {
        if answer <= 0 {
            return Err(LendError::InvalidPrice(answer));
        }
        (answer as u128)
            .checked_mul(FEED_SCALE_FACTOR)
            .map(Self)
            .ok_or(LendError::ArithmeticOverflow("feed answer rescale"))
    }
}

impl std::fmt::Display for Price {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference value in 18-decimal fixed-point USD.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct UsdValue(pub u128);

impl UsdValue {
    pub fn new(raw: u128) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u128 {
        self.0
    }

    pub fn checked_add(self, other: Self) -> Result<Self, LendError> {
        self.0
            .checked_add(other.0)
            .map(Self)
            .ok_or(LendError::ArithmeticOverflow("value addition"))
    }

    /// Scale this value by an arbitrary `numerator / denominator` ratio.
    pub fn mul_ratio(self, numerator: u128, denominator: u128) -> Result<Self, LendError> {
        mul_div(self.0, numerator, denominator, "value ratio").map(Self)
    }

    /// Truncating basis-point share of this value.
    pub fn share_bp(self, bp: u16) -> Result<Self, LendError> {
        mul_div(self.0, bp as u128, BP_DENOMINATOR, "basis-point share").map(Self)
    }

    /// Convert back to collateral-asset units at the given price.
    pub fn into_asset_at(self, price: Price) -> Result<AssetAmount, LendError> {
        if price.is_zero() {
            return Err(LendError::InvalidPrice(0));
        }
        mul_div(self.0, SCALE, price.0, "value to amount conversion").map(AssetAmount)
    }
}

impl std::fmt::Display for UsdValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `a * b / denominator` with a 256-bit intermediate, truncating division.
fn mul_div(a: u128, b: u128, denominator: u128, context: &'static str) -> Result<u128, LendError> {
    if denominator == 0 {
        return Err(LendError::ArithmeticOverflow(context));
    }
    let numerator = U256::from(a)
        .checked_mul(U256::from(b))
        .ok_or(LendError::ArithmeticOverflow(context))?;
    u128::try_from(numerator / U256::from(denominator))
        .map_err(|_| LendError::ArithmeticOverflow(context))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_conversions_are_exact_for_round_prices() {
        let amount = AssetAmount::new(10 * SCALE);
        let price = Price::new(2_000 * SCALE);

        let value = amount.value_at(price).unwrap();
        assert_eq!(value, UsdValue::new(20_000 * SCALE));
        assert_eq!(value.into_asset_at(price).unwrap(), amount);
    }

    #[test]
    fn wide_products_do_not_wrap() {
        // amount * price overflows u128 on its own; the U256 detour must not.
        let amount = AssetAmount::new(1_000_000 * SCALE);
        let price = Price::new(5_000 * SCALE);
        let value = amount.value_at(price).unwrap();
        assert_eq!(value, UsdValue::new(5_000_000_000 * SCALE));
    }

    #[test]
    fn overflowing_result_is_reported() {
        let value = UsdValue::new(u128::MAX);
        let err = value.mul_ratio(u128::MAX, 1).unwrap_err();
        assert!(matches!(err, LendError::ArithmeticOverflow(_)));
    }

    #[test]
    fn share_bp_truncates_toward_zero() {
        // 666 * 500 / 10000 = 33.3 -> 33; the remainder stays with the
        // counter-leg of the split.
        let stake = AssetAmount::new(666);
        let bonus = stake.share_bp(500).unwrap();
        assert_eq!(bonus, AssetAmount::new(33));
        assert_eq!(stake.checked_sub(bonus).unwrap(), AssetAmount::new(633));
    }

    #[test]
    fn required_stake_is_exactly_double() {
        assert_eq!(
            AssetAmount::new(21).required_stake().unwrap(),
            AssetAmount::new(42)
        );
        assert!(matches!(
            AssetAmount::new(u128::MAX).required_stake(),
            Err(LendError::ArithmeticOverflow(_))
        ));
    }

    #[test]
    fn feed_answers_rescale_to_18_decimals() {
        let price = Price::from_feed_answer(2_000_00000000).unwrap();
        assert_eq!(price, Price::new(2_000 * SCALE));
    }

    #[test]
    fn non_positive_feed_answers_are_rejected() {
        assert_eq!(
            Price::from_feed_answer(0).unwrap_err(),
            LendError::InvalidPrice(0)
        );
        assert_eq!(
            Price::from_feed_answer(-1).unwrap_err(),
            LendError::InvalidPrice(-1)
        );
    }

    #[test]
    fn conversion_at_zero_price_is_rejected() {
        let err = UsdValue::new(SCALE).into_asset_at(Price::new(0)).unwrap_err();
        assert_eq!(err, LendError::InvalidPrice(0));
    }
}
