use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use venuebook_contracts::{
    ChangeDetail, Contract, ContractId, ContractVersion, DeleteVersion, RecordVersion, VersionLog, VersionLogCommand,
    VersionLogId,
};
use venuebook_core::TenantId;
use venuebook_events::{EventBus, EventEnvelope};

use crate::collaborators::DocumentRequest;
use crate::command_dispatcher::DispatchError;
use crate::event_store::EventStore;
use crate::services::{VenueEngine, retry_on_concurrency};
use crate::side_effects::{SideEffect, fenced};

const SNAPSHOT_ATTEMPTS: u32 = 3;

/// Append-only, numbered history of each contract, plus the document rendered
/// for every version.
pub struct VersionSnapshotter<'e, S, B> {
    engine: &'e VenueEngine<S, B>,
}

impl<'e, S, B> VersionSnapshotter<'e, S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub(crate) fn new(engine: &'e VenueEngine<S, B>) -> Self {
        Self { engine }
    }

    /// Capture the contract as it stands now as the next version, then render
    /// its document.
    pub fn record(
        &self,
        tenant_id: TenantId,
        contract_id: ContractId,
        reason: &str,
        change: ChangeDetail,
        occurred_at: DateTime<Utc>,
    ) -> Result<ContractVersion, DispatchError> {
        let contract = self.engine.contract(tenant_id, contract_id)?;
        self.record_state(tenant_id, &contract, reason, change, occurred_at)
    }

    /// Record `contract` exactly as given. Only the append to the log is
    /// retried when another snapshot of the same contract wins the race.
    fn record_state(
        &self,
        tenant_id: TenantId,
        contract: &Contract,
        reason: &str,
        change: ChangeDetail,
        occurred_at: DateTime<Utc>,
    ) -> Result<ContractVersion, DispatchError> {
        let contract_id = contract.id_typed();
        let (Some(log_id), Some(snapshot)) = (contract.version_log_id(), contract.snapshot()) else {
            return Err(DispatchError::InvariantViolation(format!(
                "contract {contract_id} has no version log"
            )));
        };

        let entry = retry_on_concurrency(SNAPSHOT_ATTEMPTS, || {
            let mut tx = self.engine.dispatcher().begin(tenant_id);
            let mut log = tx.load::<VersionLog>(log_id.0)?;
            tx.execute(
                &mut log,
                &VersionLogCommand::RecordVersion(RecordVersion {
                    tenant_id,
                    log_id,
                    contract_id: contract_id.0,
                    reason: reason.to_string(),
                    change: change.clone(),
                    snapshot: snapshot.clone(),
                    occurred_at,
                }),
            )?;
            self.engine.commit(tx)?;

            log.latest()
                .cloned()
                .ok_or_else(|| DispatchError::InvariantViolation("recorded version missing from log".into()))
        })?;

        tracing::info!(
            tenant_id = %tenant_id,
            contract_id = %contract_id,
            version = entry.number,
            reason = %entry.reason,
            "contract version recorded"
        );

        self.render(tenant_id, contract, &entry);
        Ok(entry)
    }

    /// A version for an out-of-band edit, with a free-form description.
    pub fn record_manual(
        &self,
        tenant_id: TenantId,
        contract_id: ContractId,
        reason: &str,
        detail: JsonValue,
        occurred_at: DateTime<Utc>,
    ) -> Result<ContractVersion, DispatchError> {
        self.record(tenant_id, contract_id, reason, ChangeDetail::Manual { detail }, occurred_at)
    }

    /// Remove one version. Its number is never handed out again.
    pub fn delete(
        &self,
        tenant_id: TenantId,
        contract_id: ContractId,
        number: u32,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), DispatchError> {
        let log_id = self.log_id(tenant_id, contract_id)?;
        self.engine.dispatch::<VersionLog>(
            tenant_id,
            log_id.0,
            VersionLogCommand::DeleteVersion(DeleteVersion {
                tenant_id,
                log_id,
                number,
                occurred_at,
            }),
        )?;
        tracing::info!(tenant_id = %tenant_id, contract_id = %contract_id, version = number, "contract version deleted");
        Ok(())
    }

    /// Surviving versions, oldest first.
    pub fn history(&self, tenant_id: TenantId, contract_id: ContractId) -> Result<Vec<ContractVersion>, DispatchError> {
        let log_id = self.log_id(tenant_id, contract_id)?;
        let log = self.engine.version_log(tenant_id, log_id)?;
        Ok(log.versions().to_vec())
    }

    /// Post-commit variant of [`record`](Self::record) for a contract the
    /// caller just committed: failures are logged.
    pub(crate) fn after_change(
        &self,
        tenant_id: TenantId,
        contract: &Contract,
        reason: &str,
        change: ChangeDetail,
        occurred_at: DateTime<Utc>,
    ) -> Option<ContractVersion> {
        fenced(SideEffect::VersionSnapshot, tenant_id, contract.id_typed(), || {
            self.record_state(tenant_id, contract, reason, change, occurred_at)
        })
    }

    fn log_id(&self, tenant_id: TenantId, contract_id: ContractId) -> Result<VersionLogId, DispatchError> {
        self.engine
            .contract(tenant_id, contract_id)?
            .version_log_id()
            .ok_or_else(|| DispatchError::InvariantViolation(format!("contract {contract_id} has no version log")))
    }

    fn render(&self, tenant_id: TenantId, contract: &Contract, entry: &ContractVersion) {
        let rendered = fenced(SideEffect::DocumentGeneration, tenant_id, contract.id_typed(), || {
            self.engine.documents().generate(DocumentRequest {
                tenant_id,
                contract,
                version: entry,
            })
        });
        if let Some(bytes) = rendered {
            tracing::debug!(
                contract_id = %contract.id_typed(),
                version = entry.number,
                size = bytes.len(),
                "contract document rendered"
            );
        }
    }
}
