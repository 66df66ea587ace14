//! Contract version log: immutable, numbered snapshots of a contract's
//! financial state.
//!
//! Numbers are `highest ever issued + 1`. Deleting a version never frees its
//! number.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use venuebook_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId};
use venuebook_events::Event;

use crate::contract::{ContractState, PaymentPlan, PaymentStatus};
use crate::payment::{PaymentId, PaymentMethod};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionLogId(pub AggregateId);

impl VersionLogId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for VersionLogId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Contract state captured at snapshot time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractSnapshot {
    pub contract_code: String,
    pub event_date: NaiveDate,
    pub guest_count: u32,
    pub total: Decimal,
    pub total_paid: Decimal,
    pub outstanding: Decimal,
    pub payment_status: PaymentStatus,
    pub plan: PaymentPlan,
    pub commission_total: Decimal,
    pub state: ContractState,
}

/// What changed, structured so it can be read back without replaying payments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeDetail {
    Issued {
        offer_code: String,
        deposit: Decimal,
    },
    Payment {
        payment_id: PaymentId,
        amount: Decimal,
        method: PaymentMethod,
        surcharge: Decimal,
        total_charged: Decimal,
        resulting_balance: Decimal,
    },
    PaymentVoided {
        payment_id: PaymentId,
        amount_reversed: Decimal,
        reason: String,
        resulting_balance: Decimal,
    },
    Cancelled {
        reason: Option<String>,
    },
    Manual {
        detail: JsonValue,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractVersion {
    pub number: u32,
    pub reason: String,
    pub change: ChangeDetail,
    pub snapshot: ContractSnapshot,
    pub recorded_at: DateTime<Utc>,
}

/// Aggregate root: VersionLog (one per contract).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionLog {
    id: VersionLogId,
    tenant_id: Option<TenantId>,
    contract_id: Option<AggregateId>,
    versions: Vec<ContractVersion>,
    highest_issued: u32,
    version: u64,
    created: bool,
}

impl VersionLog {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: VersionLogId) -> Self {
        Self {
            id,
            tenant_id: None,
            contract_id: None,
            versions: Vec::new(),
            highest_issued: 0,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> VersionLogId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn contract_id(&self) -> Option<AggregateId> {
        self.contract_id
    }

    /// Live (non-deleted) versions, ascending by number.
    pub fn versions(&self) -> &[ContractVersion] {
        &self.versions
    }

    pub fn latest(&self) -> Option<&ContractVersion> {
        self.versions.last()
    }

    pub fn highest_issued(&self) -> u32 {
        self.highest_issued
    }

    pub fn next_number(&self) -> u32 {
        self.highest_issued + 1
    }
}

impl AggregateRoot for VersionLog {
    type Id = VersionLogId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RecordVersion. The first one opens the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordVersion {
    pub tenant_id: TenantId,
    pub log_id: VersionLogId,
    pub contract_id: AggregateId,
    pub reason: String,
    pub change: ChangeDetail,
    pub snapshot: ContractSnapshot,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteVersion {
    pub tenant_id: TenantId,
    pub log_id: VersionLogId,
    pub number: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersionLogCommand {
    RecordVersion(RecordVersion),
    DeleteVersion(DeleteVersion),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecorded {
    pub tenant_id: TenantId,
    pub log_id: VersionLogId,
    pub contract_id: AggregateId,
    pub entry: ContractVersion,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionDeleted {
    pub tenant_id: TenantId,
    pub log_id: VersionLogId,
    pub number: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersionLogEvent {
    VersionRecorded(VersionRecorded),
    VersionDeleted(VersionDeleted),
}

impl Event for VersionLogEvent {
    fn event_type(&self) -> &'static str {
        match self {
            VersionLogEvent::VersionRecorded(_) => "contracts.version_log.recorded",
            VersionLogEvent::VersionDeleted(_) => "contracts.version_log.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            VersionLogEvent::VersionRecorded(e) => e.occurred_at,
            VersionLogEvent::VersionDeleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for VersionLog {
    type Command = VersionLogCommand;
    type Event = VersionLogEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            VersionLogEvent::VersionRecorded(e) => {
                if !self.created {
                    self.id = e.log_id;
                    self.tenant_id = Some(e.tenant_id);
                    self.contract_id = Some(e.contract_id);
                    self.created = true;
                }
                self.highest_issued = self.highest_issued.max(e.entry.number);
                self.versions.push(e.entry.clone());
            }
            VersionLogEvent::VersionDeleted(e) => {
                self.versions.retain(|v| v.number != e.number);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            VersionLogCommand::RecordVersion(cmd) => self.handle_record(cmd),
            VersionLogCommand::DeleteVersion(cmd) => self.handle_delete(cmd),
        }
    }
}

impl VersionLog {
    fn ensure_scope(&self, tenant_id: TenantId, log_id: VersionLogId) -> Result<(), DomainError> {
        if self.id != log_id {
            return Err(DomainError::invariant("log_id mismatch"));
        }
        if self.created && self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn handle_record(&self, cmd: &RecordVersion) -> Result<Vec<VersionLogEvent>, DomainError> {
        self.ensure_scope(cmd.tenant_id, cmd.log_id)?;
        if self.created && self.contract_id != Some(cmd.contract_id) {
            return Err(DomainError::invariant("version log belongs to another contract"));
        }
        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation(
                "version_reason_required",
                "a version needs a reason",
            ));
        }

        Ok(vec![VersionLogEvent::VersionRecorded(VersionRecorded {
            tenant_id: cmd.tenant_id,
            log_id: cmd.log_id,
            contract_id: cmd.contract_id,
            entry: ContractVersion {
                number: self.next_number(),
                reason: cmd.reason.clone(),
                change: cmd.change.clone(),
                snapshot: cmd.snapshot.clone(),
                recorded_at: cmd.occurred_at,
            },
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteVersion) -> Result<Vec<VersionLogEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("version log {}", cmd.log_id)));
        }
        self.ensure_scope(cmd.tenant_id, cmd.log_id)?;

        if !self.versions.iter().any(|v| v.number == cmd.number) {
            return Err(DomainError::not_found(format!("contract version {}", cmd.number)));
        }

        Ok(vec![VersionLogEvent::VersionDeleted(VersionDeleted {
            tenant_id: cmd.tenant_id,
            log_id: cmd.log_id,
            number: cmd.number,
            occurred_at: cmd.occurred_at,
        })])
    }
}
