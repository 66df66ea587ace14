//! Outbound collaborators: document rendering and calendar scheduling.
//!
//! Both are best effort. Their failures are `anyhow::Error`s that the services
//! log and swallow; they never undo a committed financial change.

use std::sync::Mutex;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use venuebook_contracts::{Contract, ContractId, ContractVersion};
use venuebook_core::TenantId;
use venuebook_pricing::SalonId;

/// Everything a renderer needs: the contract as it stands and the version
/// being documented.
#[derive(Debug, Clone, Copy)]
pub struct DocumentRequest<'a> {
    pub tenant_id: TenantId,
    pub contract: &'a Contract,
    pub version: &'a ContractVersion,
}

pub trait DocumentGenerator: Send + Sync {
    /// Render an opaque artifact (a PDF in production).
    fn generate(&self, request: DocumentRequest<'_>) -> anyhow::Result<Vec<u8>>;
}

/// Event fields handed to the scheduling system at issuance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEventDetails {
    pub tenant_id: TenantId,
    pub contract_id: ContractId,
    pub contract_code: String,
    pub salon_id: Option<SalonId>,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub guest_count: u32,
}

pub trait CalendarClient: Send + Sync {
    /// Create the event; returns the calendar's id for it.
    fn create_event(&self, details: &CalendarEventDetails) -> anyhow::Result<String>;
}

/// A rendered document kept in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    pub contract_id: ContractId,
    pub version: u32,
    pub bytes: Vec<u8>,
}

/// Renders a plain-text summary and keeps every artifact.
#[derive(Debug, Default)]
pub struct InMemoryDocuments {
    rendered: Mutex<Vec<RenderedDocument>>,
}

impl InMemoryDocuments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rendered(&self) -> Vec<RenderedDocument> {
        self.rendered.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl DocumentGenerator for InMemoryDocuments {
    fn generate(&self, request: DocumentRequest<'_>) -> anyhow::Result<Vec<u8>> {
        let snapshot = &request.version.snapshot;
        let body = format!(
            "{} v{}\n{}\nevent {} for {} guests\ntotal {} paid {} outstanding {}\n",
            snapshot.contract_code,
            request.version.number,
            request.version.reason,
            snapshot.event_date,
            snapshot.guest_count,
            snapshot.total,
            snapshot.total_paid,
            snapshot.outstanding,
        )
        .into_bytes();

        let mut rendered = self
            .rendered
            .lock()
            .map_err(|_| anyhow::anyhow!("document store lock poisoned"))?;
        rendered.push(RenderedDocument {
            contract_id: request.contract.id_typed(),
            version: request.version.number,
            bytes: body.clone(),
        });
        Ok(body)
    }
}

/// Hands out sequential calendar ids and remembers what was scheduled.
#[derive(Debug, Default)]
pub struct InMemoryCalendar {
    events: Mutex<Vec<CalendarEventDetails>>,
}

impl InMemoryCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<CalendarEventDetails> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl CalendarClient for InMemoryCalendar {
    fn create_event(&self, details: &CalendarEventDetails) -> anyhow::Result<String> {
        let mut events = self
            .events
            .lock()
            .map_err(|_| anyhow::anyhow!("calendar lock poisoned"))?;
        events.push(details.clone());
        Ok(format!("cal-{}", events.len()))
    }
}
