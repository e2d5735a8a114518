use crate::domain::errors::DomainResult;
use crate::domain::models::RequestContext;

/// Kind of object a permission is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionTarget {
    Application,
    Account,
}

/// Read-permission hook used by search.
pub trait PermissionEvaluator: Send + Sync {
    fn can_read(&self, ctx: &RequestContext, target: PermissionTarget, name: &str) -> DomainResult<bool>;
}

/// Evaluates account reads against the context's allowed accounts.
/// Applications carry no restrictions of their own.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextPermissionEvaluator;

impl PermissionEvaluator for ContextPermissionEvaluator {
    fn can_read(&self, ctx: &RequestContext, target: PermissionTarget, name: &str) -> DomainResult<bool> {
        Ok(match target {
            PermissionTarget::Application => true,
            PermissionTarget::Account => ctx.can_read_account(name),
        })
    }
}
