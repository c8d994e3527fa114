//! Price oracle adapter.
//!
//! Wraps an optional external [`PriceSource`] behind staleness and
//! positivity checks, rescaling the feed's 8-decimal answers to the
//! internal 18-decimal representation. With no source configured the
//! adapter serves the operator-set fixed price instead; while a source is
//! configured a bad reading fails the enclosing operation, it is never
//! silently papered over with the fixed price.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use terralend_types::{FeedRound, IndexReading, LendError, Price};

/// External price feed consumed by the oracle adapter.
pub trait PriceSource: Send + Sync {
    fn latest_round(&self) -> Result<FeedRound, LendError>;
}

/// Separately administered real-estate index feed.
pub trait RealEstateIndexSource: Send + Sync {
    fn provider(&self) -> &'static str;

    fn latest(&self) -> Result<IndexReading, LendError>;
}

struct OracleConfig {
    source: Option<Arc<dyn PriceSource>>,
    fixed_price: Price,
    staleness_bound: Duration,
}

/// Oracle adapter serving 18-decimal prices to the lifecycle engine.
pub struct PriceOracle {
    inner: RwLock<OracleConfig>,
}

impl PriceOracle {
    /// Default staleness bound for feed readings, in seconds.
    pub const DEFAULT_STALENESS_SECS: u64 = 3_600;

    pub fn new(fixed_price: Price, staleness_bound_secs: u64) -> Self {
        Self {
            inner: RwLock::new(OracleConfig {
                source: None,
                fixed_price,
                staleness_bound: Duration::seconds(staleness_bound_secs as i64),
            }),
        }
    }

    /// Current 18-decimal price at `now`.
    ///
    /// Feed mode validates the latest round; fixed mode returns the
    /// operator-set price as-is.
    pub fn current_price(&self, now: DateTime<Utc>) -> Result<Price, LendError> {
        let (source, fixed_price, staleness_bound) = {
            let config = self.read()?;
            (
                config.source.clone(),
                config.fixed_price,
                config.staleness_bound,
            )
        };
        let Some(source) = source else {
            return Ok(fixed_price);
        };

        let round = source.latest_round()?;
        let price = Price::from_feed_answer(round.answer)?;

        let age = now - round.updated_at;
        if age > staleness_bound {
            warn!(
                round_id = round.round_id,
                age_secs = age.num_seconds(),
                bound_secs = staleness_bound.num_seconds(),
                "rejecting stale price round"
            );
            return Err(LendError::StalePrice {
                age_secs: age.num_seconds(),
                bound_secs: staleness_bound.num_seconds(),
            });
        }

        debug!(round_id = round.round_id, price = %price, "price round accepted");
        Ok(price)
    }

    pub fn set_source(&self, source: Arc<dyn PriceSource>) -> Result<(), LendError> {
        self.write()?.source = Some(source);
        Ok(())
    }

    pub fn clear_source(&self) -> Result<(), LendError> {
        self.write()?.source = None;
        Ok(())
    }

    pub fn has_source(&self) -> Result<bool, LendError> {
        Ok(self.read()?.source.is_some())
    }

    pub fn set_fixed_price(&self, price: Price) -> Result<(), LendError> {
        if price.is_zero() {
            return Err(LendError::InvalidPrice(0));
        }
        self.write()?.fixed_price = price;
        Ok(())
    }

    pub fn set_staleness_bound(&self, bound_secs: u64) -> Result<(), LendError> {
        self.write()?.staleness_bound = Duration::seconds(bound_secs as i64);
        Ok(())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, OracleConfig>, LendError> {
        self.inner
            .read()
            .map_err(|_| LendError::StoreUnavailable("oracle read lock poisoned".into()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, OracleConfig>, LendError> {
        self.inner
            .write()
            .map_err(|_| LendError::StoreUnavailable("oracle write lock poisoned".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use terralend_types::SCALE;

    struct ScriptedFeed {
        round: Mutex<FeedRound>,
    }

    impl ScriptedFeed {
        fn new(answer: i128, updated_at: DateTime<Utc>) -> Self {
            Self {
                round: Mutex::new(FeedRound {
                    round_id: 1,
                    answer,
                    started_at: updated_at,
                    updated_at,
                    answered_in_round: 1,
                }),
            }
        }
    }

    impl PriceSource for ScriptedFeed {
        fn latest_round(&self) -> Result<FeedRound, LendError> {
            Ok(*self.round.lock().unwrap())
        }
    }

    #[test]
    fn fixed_price_serves_without_a_source() {
        let oracle = PriceOracle::new(Price::new(2_000 * SCALE), 3_600);
        let price = oracle.current_price(Utc::now()).unwrap();
        assert_eq!(price, Price::new(2_000 * SCALE));
    }

    #[test]
    fn feed_round_is_rescaled_to_18_decimals() {
        let now = Utc::now();
        let oracle = PriceOracle::new(Price::new(SCALE), 3_600);
        oracle
            .set_source(Arc::new(ScriptedFeed::new(2_000_00000000, now)))
            .unwrap();

        assert_eq!(oracle.current_price(now).unwrap(), Price::new(2_000 * SCALE));
    }

    #[test]
    fn stale_round_is_rejected_not_substituted() {
        let now = Utc::now();
        let oracle = PriceOracle::new(Price::new(2_000 * SCALE), 3_600);
        oracle
            .set_source(Arc::new(ScriptedFeed::new(
                2_000_00000000,
                now - Duration::seconds(3_601),
            )))
            .unwrap();

        let err = oracle.current_price(now).unwrap_err();
        assert_eq!(
            err,
            LendError::StalePrice {
                age_secs: 3_601,
                bound_secs: 3_600,
            }
        );
    }

    #[test]
    fn round_exactly_at_the_bound_is_accepted() {
        let now = Utc::now();
        let oracle = PriceOracle::new(Price::new(SCALE), 3_600);
        oracle
            .set_source(Arc::new(ScriptedFeed::new(
                100_00000000,
                now - Duration::seconds(3_600),
            )))
            .unwrap();

        assert!(oracle.current_price(now).is_ok());
    }

    #[test]
    fn non_positive_answer_is_rejected() {
        let now = Utc::now();
        let oracle = PriceOracle::new(Price::new(SCALE), 3_600);
        oracle.set_source(Arc::new(ScriptedFeed::new(0, now))).unwrap();

        assert_eq!(oracle.current_price(now).unwrap_err(), LendError::InvalidPrice(0));
    }

    #[test]
    fn clearing_the_source_restores_fixed_mode() {
        let now = Utc::now();
        let oracle = PriceOracle::new(Price::new(42 * SCALE), 3_600);
        oracle
            .set_source(Arc::new(ScriptedFeed::new(-5, now)))
            .unwrap();
        assert!(oracle.current_price(now).is_err());

        oracle.clear_source().unwrap();
        assert_eq!(oracle.current_price(now).unwrap(), Price::new(42 * SCALE));
    }

    #[test]
    fn zero_fixed_price_is_rejected() {
        let oracle = PriceOracle::new(Price::new(SCALE), 3_600);
        assert_eq!(
            oracle.set_fixed_price(Price::new(0)).unwrap_err(),
            LendError::InvalidPrice(0)
        );
    }
}
