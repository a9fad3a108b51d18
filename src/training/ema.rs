//! Exponential moving averages of named training quantities

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const GENERATOR_LOSS: &str = "generator_loss";
pub const DIS_REAL: &str = "dis_real";
pub const DIS_FAKE: &str = "dis_fake";

/// EMA settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmaConfig {
    /// Value reported for keys that were never updated
    pub init: f64,
    /// Decay once `start_itr` is reached
    pub decay: f64,
    /// Before this iteration the average just tracks the latest value
    pub start_itr: usize,
}

impl Default for EmaConfig {
    fn default() -> Self {
        Self {
            init: 1000.0,
            decay: 0.9,
            start_itr: 1000,
        }
    }
}

/// Keyed exponential moving averages
///
/// `value = value * decay + current * (1 - decay)`, with decay forced to 0
/// before `start_itr`.
#[derive(Debug, Clone)]
pub struct EmaLosses {
    values: BTreeMap<String, f64>,
    config: EmaConfig,
}

impl EmaLosses {
    pub fn new(config: EmaConfig) -> Self {
        Self {
            values: BTreeMap::new(),
            config,
        }
    }

    /// Fold `current` into the average for `key`
    pub fn update(&mut self, current: f64, key: &str, itr: usize) {
        let decay = if itr < self.config.start_itr {
            0.0
        } else {
            self.config.decay
        };
        let init = self.config.init;
        let value = self.values.entry(key.to_string()).or_insert(init);
        *value = *value * decay + current * (1.0 - decay);
    }

    /// Current average for `key`, or the initial value if never updated
    pub fn get(&self, key: &str) -> f64 {
        self.values.get(key).copied().unwrap_or(self.config.init)
    }

    /// Forget every tracked key
    pub fn reset(&mut self) {
        self.values.clear();
    }

    pub fn config(&self) -> &EmaConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EmaConfig {
        EmaConfig {
            init: 1000.0,
            decay: 0.5,
            start_itr: 2,
        }
    }

    #[test]
    fn test_unseen_key_reports_init() {
        let ema = EmaLosses::new(config());
        assert_eq!(ema.get(DIS_REAL), 1000.0);
    }

    #[test]
    fn test_warmup_tracks_latest_value() {
        let mut ema = EmaLosses::new(config());
        ema.update(4.0, DIS_REAL, 0);
        assert_eq!(ema.get(DIS_REAL), 4.0);

        ema.update(8.0, DIS_REAL, 1);
        assert_eq!(ema.get(DIS_REAL), 8.0);
    }

    #[test]
    fn test_decay_after_start() {
        let mut ema = EmaLosses::new(config());
        ema.update(4.0, DIS_FAKE, 0);
        ema.update(8.0, DIS_FAKE, 2);
        assert_eq!(ema.get(DIS_FAKE), 6.0);

        ema.update(2.0, DIS_FAKE, 3);
        assert_eq!(ema.get(DIS_FAKE), 4.0);
    }

    #[test]
    fn test_keys_are_independent() {
        let mut ema = EmaLosses::new(config());
        ema.update(1.0, GENERATOR_LOSS, 0);
        assert_eq!(ema.get(GENERATOR_LOSS), 1.0);
        assert_eq!(ema.get(DIS_REAL), 1000.0);
    }

    #[test]
    fn test_reset() {
        let mut ema = EmaLosses::new(config());
        ema.update(1.0, GENERATOR_LOSS, 0);
        ema.reset();
        assert_eq!(ema.get(GENERATOR_LOSS), 1000.0);
    }
}
