//! Jitter for reconnect delays
//!
//! - [`JitterPolicy::None`]: exact backoff delay
//! - [`JitterPolicy::Full`]: random delay in [0, delay]
//! - [`JitterPolicy::Equal`]: delay/2 + random[0, delay/2]

use mwmc_common::config::JitterSetting;
use rand::Rng;
use std::time::Duration;

/// Randomization applied to a computed backoff delay
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JitterPolicy {
    /// Predictable delays; the default for a single client
    #[default]
    None,
    /// random[0, delay]
    Full,
    /// delay/2 + random[0, delay/2]
    Equal,
}

impl JitterPolicy {
    pub fn apply(&self, delay: Duration) -> Duration {
        let ms = delay.as_millis() as u64;
        if ms == 0 {
            return delay;
        }
        let mut rng = rand::thread_rng();
        match self {
            JitterPolicy::None => delay,
            JitterPolicy::Full => Duration::from_millis(rng.gen_range(0..=ms)),
            JitterPolicy::Equal => {
                let half = ms / 2;
                let jitter = if half == 0 { 0 } else { rng.gen_range(0..=half) };
                Duration::from_millis(half + jitter)
            }
        }
    }
}

impl From<JitterSetting> for JitterPolicy {
    fn from(setting: JitterSetting) -> Self {
        match setting {
            JitterSetting::None => JitterPolicy::None,
            JitterSetting::Full => JitterPolicy::Full,
            JitterSetting::Equal => JitterPolicy::Equal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_is_identity() {
        let delay = Duration::from_millis(1234);
        assert_eq!(JitterPolicy::None.apply(delay), delay);
    }

    #[test]
    fn test_full_within_bounds() {
        for _ in 0..100 {
            let delay = JitterPolicy::Full.apply(Duration::from_millis(1000));
            assert!(delay <= Duration::from_millis(1000));
        }
    }

    #[test]
    fn test_equal_within_bounds() {
        for _ in 0..100 {
            let delay = JitterPolicy::Equal.apply(Duration::from_millis(1000));
            assert!(delay >= Duration::from_millis(500));
            assert!(delay <= Duration::from_millis(1000));
        }
    }

    #[test]
    fn test_zero_delay_stays_zero() {
        assert_eq!(JitterPolicy::Full.apply(Duration::ZERO), Duration::ZERO);
        assert_eq!(JitterPolicy::Equal.apply(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn test_from_setting() {
        assert_eq!(JitterPolicy::from(JitterSetting::Equal), JitterPolicy::Equal);
        assert_eq!(JitterPolicy::from(JitterSetting::None), JitterPolicy::None);
    }
}
