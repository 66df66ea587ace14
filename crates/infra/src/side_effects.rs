//! Post-commit side effects.
//!
//! Anything that runs after a ledger transaction has committed (commission
//! recompute, version snapshot, document rendering, calendar sync) goes
//! through [`fenced`]: a failure is logged with its context and turned into
//! `None`, so it can neither roll back the commit nor stop the next effect.

use core::fmt::Display;

use venuebook_contracts::ContractId;
use venuebook_core::TenantId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SideEffect {
    CommissionRecalculation,
    VersionSnapshot,
    DocumentGeneration,
    CalendarSync,
}

impl SideEffect {
    pub fn as_str(self) -> &'static str {
        match self {
            SideEffect::CommissionRecalculation => "commission_recalculation",
            SideEffect::VersionSnapshot => "version_snapshot",
            SideEffect::DocumentGeneration => "document_generation",
            SideEffect::CalendarSync => "calendar_sync",
        }
    }
}

/// Run `effect`, logging instead of propagating its failure.
pub fn fenced<T, E>(
    effect: SideEffect,
    tenant_id: TenantId,
    contract_id: ContractId,
    run: impl FnOnce() -> Result<T, E>,
) -> Option<T>
where
    E: Display,
{
    match run() {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(
                side_effect = effect.as_str(),
                tenant_id = %tenant_id,
                contract_id = %contract_id,
                error = %err,
                "post-commit side effect failed; primary change kept"
            );
            None
        }
    }
}
