//! Per-tenant sliding-window rate limiting over calls, tokens, and cost.
//!
//! Each tenant owns a [`TenantLimiter`] holding seven windows: three
//! per-minute call counters keyed by tool category, minute/hour token
//! windows, and hour/day cost windows. A check is all-or-nothing: if any
//! applicable cap would be exceeded, nothing is consumed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::tool::ToolType;

/// Per-tenant quota configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitConfig {
    /// LLM calls allowed per minute.
    pub llm_calls_per_minute: u32,
    /// External API calls allowed per minute.
    pub external_calls_per_minute: u32,
    /// Database calls allowed per minute.
    pub database_calls_per_minute: u32,
    /// Tokens allowed per minute.
    pub tokens_per_minute: u64,
    /// Tokens allowed per hour.
    pub tokens_per_hour: u64,
    /// Spend allowed per hour in USD.
    pub cost_per_hour_usd: f64,
    /// Spend allowed per day in USD.
    pub cost_per_day_usd: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            llm_calls_per_minute: 100,
            external_calls_per_minute: 200,
            database_calls_per_minute: 300,
            tokens_per_minute: 100_000,
            tokens_per_hour: 1_000_000,
            cost_per_hour_usd: 10.0,
            cost_per_day_usd: 100.0,
        }
    }
}

/// The per-minute call counter a tool type consumes from, if any.
fn call_bucket(tool_type: ToolType) -> Option<CallBucket> {
    match tool_type {
        ToolType::Llm => Some(CallBucket::Llm),
        ToolType::Api | ToolType::Search => Some(CallBucket::External),
        ToolType::Database => Some(CallBucket::Database),
        ToolType::Function | ToolType::FileRead | ToolType::FileWrite | ToolType::FileSystem => {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallBucket {
    Llm,
    External,
    Database,
}

/// A fixed window that fully resets once its duration elapses.
#[derive(Debug)]
struct SlidingWindow {
    duration: Duration,
    started_at: Instant,
    consumed: f64,
}

impl SlidingWindow {
    fn new(duration_secs: u64) -> Self {
        Self {
            duration: Duration::from_secs(duration_secs),
            started_at: Instant::now(),
            consumed: 0.0,
        }
    }

    /// Reset the window when its start is older than its duration.
    fn roll(&mut self, now: Instant) {
        if now.duration_since(self.started_at) >= self.duration {
            self.started_at = now;
            self.consumed = 0.0;
        }
    }

    fn would_exceed(&self, amount: f64, cap: f64) -> bool {
        self.consumed + amount > cap
    }

    fn consume(&mut self, amount: f64) {
        self.consumed += amount;
    }

    #[cfg(test)]
    fn backdate(&mut self, by: Duration) {
        if let Some(earlier) = self.started_at.checked_sub(by) {
            self.started_at = earlier;
        }
    }
}

/// All quota windows for a single tenant.
#[derive(Debug)]
pub struct TenantLimiter {
    config: RateLimitConfig,
    llm_calls: SlidingWindow,
    external_calls: SlidingWindow,
    database_calls: SlidingWindow,
    tokens_minute: SlidingWindow,
    tokens_hour: SlidingWindow,
    cost_hour: SlidingWindow,
    cost_day: SlidingWindow,
}

impl TenantLimiter {
    /// Create a limiter with fresh windows.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            llm_calls: SlidingWindow::new(60),
            external_calls: SlidingWindow::new(60),
            database_calls: SlidingWindow::new(60),
            tokens_minute: SlidingWindow::new(60),
            tokens_hour: SlidingWindow::new(3_600),
            cost_hour: SlidingWindow::new(3_600),
            cost_day: SlidingWindow::new(86_400),
        }
    }

    /// The config this limiter enforces.
    #[must_use]
    pub const fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Check every applicable cap; consume all budgets only if every
    /// check passes.
    pub fn check_and_consume(
        &mut self,
        tool_type: ToolType,
        tokens: Option<u64>,
        cost_usd: Option<f64>,
    ) -> bool {
        let now = Instant::now();
        for window in [
            &mut self.llm_calls,
            &mut self.external_calls,
            &mut self.database_calls,
            &mut self.tokens_minute,
            &mut self.tokens_hour,
            &mut self.cost_hour,
            &mut self.cost_day,
        ] {
            window.roll(now);
        }

        let bucket = call_bucket(tool_type);
        let call_check = match bucket {
            Some(CallBucket::Llm) => Some((
                &self.llm_calls,
                f64::from(self.config.llm_calls_per_minute),
            )),
            Some(CallBucket::External) => Some((
                &self.external_calls,
                f64::from(self.config.external_calls_per_minute),
            )),
            Some(CallBucket::Database) => Some((
                &self.database_calls,
                f64::from(self.config.database_calls_per_minute),
            )),
            None => None,
        };

        if let Some((window, cap)) = call_check
            && window.would_exceed(1.0, cap)
        {
            return false;
        }

        if let Some(tokens) = tokens {
            let amount = tokens as f64;
            if self
                .tokens_minute
                .would_exceed(amount, self.config.tokens_per_minute as f64)
                || self
                    .tokens_hour
                    .would_exceed(amount, self.config.tokens_per_hour as f64)
            {
                return false;
            }
        }

        if let Some(cost) = cost_usd
            && (self.cost_hour.would_exceed(cost, self.config.cost_per_hour_usd)
                || self.cost_day.would_exceed(cost, self.config.cost_per_day_usd))
        {
            return false;
        }

        // Every cap passed: consume atomically.
        match bucket {
            Some(CallBucket::Llm) => self.llm_calls.consume(1.0),
            Some(CallBucket::External) => self.external_calls.consume(1.0),
            Some(CallBucket::Database) => self.database_calls.consume(1.0),
            None => {}
        }
        if let Some(tokens) = tokens {
            self.tokens_minute.consume(tokens as f64);
            self.tokens_hour.consume(tokens as f64);
        }
        if let Some(cost) = cost_usd {
            self.cost_hour.consume(cost);
            self.cost_day.consume(cost);
        }
        true
    }
}

/// Tenant-keyed rate limiter.
///
/// A top-level mutex guards the tenant map; each tenant's windows sit
/// behind their own async mutex, so one tenant's gating never blocks
/// another's.
#[derive(Debug)]
pub struct RateLimiter {
    default_config: RateLimitConfig,
    tenant_configs: std::sync::Mutex<HashMap<String, RateLimitConfig>>,
    tenant_limiters: std::sync::Mutex<HashMap<String, Arc<Mutex<TenantLimiter>>>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

impl RateLimiter {
    /// Create a limiter with the given default tenant config.
    #[must_use]
    pub fn new(default_config: RateLimitConfig) -> Self {
        Self {
            default_config,
            tenant_configs: std::sync::Mutex::new(HashMap::new()),
            tenant_limiters: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Install a tenant-specific config, resetting that tenant's live
    /// windows.
    pub fn configure_tenant(&self, tenant_id: impl Into<String>, config: RateLimitConfig) {
        let tenant_id = tenant_id.into();
        if let Ok(mut configs) = self.tenant_configs.lock() {
            configs.insert(tenant_id.clone(), config);
        }
        if let Ok(mut limiters) = self.tenant_limiters.lock() {
            limiters.remove(&tenant_id);
        }
    }

    /// The effective config for a tenant.
    #[must_use]
    pub fn tenant_config(&self, tenant_id: &str) -> RateLimitConfig {
        self.tenant_configs
            .lock()
            .ok()
            .and_then(|configs| configs.get(tenant_id).copied())
            .unwrap_or(self.default_config)
    }

    fn limiter_for(&self, tenant_id: &str) -> Arc<Mutex<TenantLimiter>> {
        let config = self.tenant_config(tenant_id);
        let mut limiters = match self.tenant_limiters.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(
            limiters
                .entry(tenant_id.to_owned())
                .or_insert_with(|| Arc::new(Mutex::new(TenantLimiter::new(config)))),
        )
    }

    /// Gate one call for a tenant. Returns `false` without consuming any
    /// budget when a cap would be exceeded.
    ///
    /// Calls for the same tenant are serialised on the tenant's own
    /// mutex; calls across tenants proceed independently.
    pub async fn check_and_consume(
        &self,
        tenant_id: &str,
        tool_type: ToolType,
        tokens: Option<u64>,
        cost_usd: Option<f64>,
    ) -> bool {
        let limiter = self.limiter_for(tenant_id);
        let mut guard = limiter.lock().await;
        guard.check_and_consume(tool_type, tokens, cost_usd)
    }
}
