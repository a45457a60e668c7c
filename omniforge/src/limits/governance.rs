//! Per-tenant model governance: allow/deny lists and per-call cost caps.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{Error, Result};

/// Governance policy for one tenant.
#[derive(Debug, Clone, Default)]
pub struct ModelPolicy {
    /// Models (or glob patterns) the tenant may use. Empty means
    /// unrestricted unless `require_approval` is set.
    pub approved_models: Vec<String>,
    /// Models (or glob patterns) the tenant may never use. Wins over
    /// any approval.
    pub blocked_models: Vec<String>,
    /// When set, a model must match the approved list to be used.
    pub require_approval: bool,
    /// Per-call spend ceiling in USD.
    pub max_cost_per_call_usd: Option<f64>,
}

impl ModelPolicy {
    /// Policy approving only the given patterns.
    #[must_use]
    pub fn approving<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            approved_models: patterns.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

/// Match `model` against `pattern`, where `*` matches zero or more
/// characters. Exact names are a degenerate pattern.
fn matches_pattern(pattern: &str, model: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == model;
    }
    let escaped = regex::escape(pattern).replace("\\*", ".*");
    regex::Regex::new(&format!("^{escaped}$")).is_ok_and(|re| re.is_match(model))
}

/// Tenant-keyed governance with a default policy fallback.
#[derive(Debug, Default)]
pub struct ModelGovernance {
    default_policy: ModelPolicy,
    tenant_policies: RwLock<HashMap<String, ModelPolicy>>,
}

impl ModelGovernance {
    /// Governance with an unrestricted default policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Governance with the given default policy.
    #[must_use]
    pub fn with_default_policy(default_policy: ModelPolicy) -> Self {
        Self {
            default_policy,
            tenant_policies: RwLock::new(HashMap::new()),
        }
    }

    /// Install (or replace) a tenant-specific policy.
    pub fn configure_tenant(&self, tenant_id: impl Into<String>, policy: ModelPolicy) {
        if let Ok(mut policies) = self.tenant_policies.write() {
            policies.insert(tenant_id.into(), policy);
        }
    }

    /// The effective policy for a tenant.
    #[must_use]
    pub fn policy_for(&self, tenant_id: &str) -> ModelPolicy {
        self.tenant_policies
            .read()
            .ok()
            .and_then(|policies| policies.get(tenant_id).cloned())
            .unwrap_or_else(|| self.default_policy.clone())
    }

    /// Approved patterns for a tenant.
    #[must_use]
    pub fn approved_models(&self, tenant_id: &str) -> Vec<String> {
        self.policy_for(tenant_id).approved_models
    }

    /// Whether a model passes the tenant's allow/deny lists.
    #[must_use]
    pub fn is_model_allowed(&self, tenant_id: &str, model: &str) -> bool {
        self.validate(tenant_id, model, None).is_ok()
    }

    /// Validate a model call against the tenant policy.
    ///
    /// Fails with [`Error::ModelNotApproved`] when the model is blocked,
    /// when approval is required (or an approved list exists) and the
    /// model matches nothing on it, or when `estimated_cost` exceeds the
    /// per-call ceiling. A cost exactly at the ceiling passes.
    pub fn validate(&self, tenant_id: &str, model: &str, estimated_cost: Option<f64>) -> Result<()> {
        let policy = self.policy_for(tenant_id);

        if policy
            .blocked_models
            .iter()
            .any(|p| matches_pattern(p, model))
        {
            return Err(Error::ModelNotApproved {
                model: model.to_owned(),
                tenant_id: tenant_id.to_owned(),
                reason: "model is explicitly blocked".into(),
            });
        }

        let approved = policy
            .approved_models
            .iter()
            .any(|p| matches_pattern(p, model));

        if policy.require_approval && !approved {
            return Err(Error::ModelNotApproved {
                model: model.to_owned(),
                tenant_id: tenant_id.to_owned(),
                reason: "model requires explicit approval".into(),
            });
        }

        if !policy.require_approval && !policy.approved_models.is_empty() && !approved {
            return Err(Error::ModelNotApproved {
                model: model.to_owned(),
                tenant_id: tenant_id.to_owned(),
                reason: "model is not in approved list".into(),
            });
        }

        if let (Some(cost), Some(limit)) = (estimated_cost, policy.max_cost_per_call_usd)
            && cost > limit
        {
            return Err(Error::ModelNotApproved {
                model: model.to_owned(),
                tenant_id: tenant_id.to_owned(),
                reason: format!("estimated cost ${cost:.4} exceeds limit ${limit:.4}"),
            });
        }

        Ok(())
    }
}
