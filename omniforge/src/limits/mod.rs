//! Enterprise guardrails: rate limiting, cost accounting, and model
//! governance. Consulted by the executor on every gated tool invocation.

pub mod cost;
mod governance;
mod rate_limiter;

pub use governance::{ModelGovernance, ModelPolicy};
pub use rate_limiter::{RateLimitConfig, RateLimiter, TenantLimiter};
