use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub page_size: usize,
    pub debounce: Debounce,
    /// Delay before the single retry of a reset that returned nothing, in milliseconds.
    pub retry_delay: u64,
    /// Minimum gap between scroll-triggered continuations, in milliseconds.
    pub load_more_cooldown: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            page_size: 50,
            debounce: Debounce::default(),
            retry_delay: 800,
            load_more_cooldown: 700,
        }
    }
}

/// Search debounce delays in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Debounce {
    pub typing: u64,
    pub cleared: u64,
}

impl Default for Debounce {
    fn default() -> Self {
        Self {
            typing: 350,
            cleared: 10,
        }
    }
}

impl Debounce {
    pub fn delay(&self, text: &str) -> Duration {
        Duration::from_millis(if text.trim().is_empty() {
            self.cleared
        } else {
            self.typing
        })
    }
}
