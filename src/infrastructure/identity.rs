//! Request identity rotation
//!
//! Every fetch attempt presents a user-agent chosen by an [`IdentityStrategy`].
//! The shop throttles by client fingerprint, so retries rotate identities.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

/// Built-in desktop and mobile browser identities
pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36 Edg/123.0.2420.81",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:124.0) Gecko/20100101 Firefox/124.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36 OPR/108.0.0.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4.1 Safari/605.1.15",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14.4; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36 Edg/123.0.2420.81",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (X11; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/115.0",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4.1 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) CriOS/124.0.6367.88 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (iPad; CPU OS 17_4_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4.1 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (Linux; Android 14; SM-S918B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.6367.82 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.6367.82 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; SM-A536B) AppleWebKit/537.36 (KHTML, like Gecko) SamsungBrowser/24.0 Chrome/117.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Android 14; Mobile; rv:125.0) Gecko/125.0 Firefox/125.0",
    "Mozilla/5.0 (Windows NT 6.1; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/109.0.0.0 Safari/537.36",
];

/// Selects the user-agent presented on each attempt.
pub trait IdentityStrategy: Send + Sync + fmt::Debug {
    /// `attempt` is 1-based within one fetch.
    fn user_agent(&self, attempt: u32) -> String;
}

/// Identity strategy selection for configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityMode {
    #[default]
    Random,
    RoundRobin,
    /// Always the first configured user-agent
    Fixed,
}

impl IdentityMode {
    /// Build the strategy over `pool`; an empty pool uses [`DEFAULT_USER_AGENTS`].
    #[must_use]
    pub fn build(self, pool: Vec<String>) -> Box<dyn IdentityStrategy> {
        let pool = if pool.is_empty() { default_pool() } else { pool };
        match self {
            Self::Random => Box::new(RandomIdentity::new(pool)),
            Self::RoundRobin => Box::new(RoundRobinIdentity::new(pool)),
            Self::Fixed => Box::new(FixedIdentity::new(pool.into_iter().next().unwrap_or_default())),
        }
    }
}

#[must_use]
pub fn default_pool() -> Vec<String> {
    DEFAULT_USER_AGENTS.iter().map(|ua| (*ua).to_string()).collect()
}

/// Uniformly random pick per attempt.
#[derive(Debug, Clone)]
pub struct RandomIdentity {
    pool: Vec<String>,
}

impl RandomIdentity {
    #[must_use]
    pub fn new(pool: Vec<String>) -> Self {
        let pool = if pool.is_empty() { default_pool() } else { pool };
        Self { pool }
    }
}

impl Default for RandomIdentity {
    fn default() -> Self {
        Self::new(default_pool())
    }
}

impl IdentityStrategy for RandomIdentity {
    fn user_agent(&self, _attempt: u32) -> String {
        self.pool[fastrand::usize(..self.pool.len())].clone()
    }
}

/// Cycles through the pool, shared across all fetches.
#[derive(Debug)]
pub struct RoundRobinIdentity {
    pool: Vec<String>,
    next: AtomicUsize,
}

impl RoundRobinIdentity {
    #[must_use]
    pub fn new(pool: Vec<String>) -> Self {
        let pool = if pool.is_empty() { default_pool() } else { pool };
        Self {
            pool,
            next: AtomicUsize::new(0),
        }
    }
}

impl IdentityStrategy for RoundRobinIdentity {
    fn user_agent(&self, _attempt: u32) -> String {
        let slot = self.next.fetch_add(1, Ordering::Relaxed) % self.pool.len();
        self.pool[slot].clone()
    }
}

#[derive(Debug, Clone)]
pub struct FixedIdentity {
    user_agent: String,
}

impl FixedIdentity {
    #[must_use]
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
        }
    }
}

impl IdentityStrategy for FixedIdentity {
    fn user_agent(&self, _attempt: u32) -> String {
        self.user_agent.clone()
    }
}
