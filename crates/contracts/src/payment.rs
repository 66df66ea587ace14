use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use venuebook_core::{
    Aggregate, AggregateId, AggregateRoot, DomainError, Percent, TenantId, UserId, Violation,
    round_money,
};
use venuebook_events::Event;

/// Payment identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(pub AggregateId);

impl PaymentId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PaymentId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Transfer,
    Card,
    Check,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardDetails {
    /// e.g. "visa", "mastercard".
    pub card_type: String,
    pub last_four: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentState {
    Completed,
    Voided,
}

/// What a payment actually moves: nominal amount plus card surcharge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Charge {
    pub amount: Decimal,
    pub surcharge: Decimal,
    pub total_charged: Decimal,
}

impl Charge {
    pub fn compute(amount: Decimal, method: PaymentMethod, card_surcharge: Percent) -> Self {
        let surcharge = match method {
            PaymentMethod::Card => card_surcharge.rounded_of(amount),
            PaymentMethod::Cash | PaymentMethod::Transfer | PaymentMethod::Check => Decimal::ZERO,
        };
        Self {
            amount,
            surcharge,
            total_charged: round_money(amount + surcharge),
        }
    }
}

/// Aggregate root: Payment.
///
/// A payment may exist before its contract (the deposit); it is linked once,
/// at issuance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payment {
    id: PaymentId,
    tenant_id: Option<TenantId>,
    contract_id: Option<AggregateId>,
    salesperson_id: Option<UserId>,
    method: PaymentMethod,
    card: Option<CardDetails>,
    charge: Charge,
    reference: Option<String>,
    notes: Option<String>,
    state: PaymentState,
    recorded_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Payment {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: PaymentId) -> Self {
        Self {
            id,
            tenant_id: None,
            contract_id: None,
            salesperson_id: None,
            method: PaymentMethod::Cash,
            card: None,
            charge: Charge {
                amount: Decimal::ZERO,
                surcharge: Decimal::ZERO,
                total_charged: Decimal::ZERO,
            },
            reference: None,
            notes: None,
            state: PaymentState::Completed,
            recorded_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PaymentId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn contract_id(&self) -> Option<AggregateId> {
        self.contract_id
    }

    pub fn salesperson_id(&self) -> Option<UserId> {
        self.salesperson_id
    }

    pub fn method(&self) -> PaymentMethod {
        self.method
    }

    pub fn card(&self) -> Option<&CardDetails> {
        self.card.as_ref()
    }

    pub fn charge(&self) -> Charge {
        self.charge
    }

    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn state(&self) -> PaymentState {
        self.state
    }

    pub fn recorded_at(&self) -> Option<DateTime<Utc>> {
        self.recorded_at
    }
}

impl AggregateRoot for Payment {
    type Id = PaymentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RecordPayment.
///
/// `contract_id` is `None` for a deposit taken before the contract exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPayment {
    pub tenant_id: TenantId,
    pub payment_id: PaymentId,
    pub contract_id: Option<AggregateId>,
    pub salesperson_id: UserId,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub card: Option<CardDetails>,
    pub card_surcharge: Percent,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: LinkToContract. Claims an unlinked deposit for a new contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkToContract {
    pub tenant_id: TenantId,
    pub payment_id: PaymentId,
    pub contract_id: AggregateId,
    /// The offer's salesperson; the deposit must be theirs.
    pub salesperson_id: UserId,
    pub minimum_amount: Decimal,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoidPayment {
    pub tenant_id: TenantId,
    pub payment_id: PaymentId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentCommand {
    RecordPayment(RecordPayment),
    LinkToContract(LinkToContract),
    VoidPayment(VoidPayment),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecorded {
    pub tenant_id: TenantId,
    pub payment_id: PaymentId,
    pub contract_id: Option<AggregateId>,
    pub salesperson_id: UserId,
    pub method: PaymentMethod,
    pub card: Option<CardDetails>,
    pub charge: Charge,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentLinked {
    pub tenant_id: TenantId,
    pub payment_id: PaymentId,
    pub contract_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentVoided {
    pub tenant_id: TenantId,
    pub payment_id: PaymentId,
    pub reason: String,
    /// Notes after the void marker was appended.
    pub notes: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentEvent {
    PaymentRecorded(PaymentRecorded),
    PaymentLinked(PaymentLinked),
    PaymentVoided(PaymentVoided),
}

impl Event for PaymentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PaymentEvent::PaymentRecorded(_) => "contracts.payment.recorded",
            PaymentEvent::PaymentLinked(_) => "contracts.payment.linked",
            PaymentEvent::PaymentVoided(_) => "contracts.payment.voided",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PaymentEvent::PaymentRecorded(e) => e.occurred_at,
            PaymentEvent::PaymentLinked(e) => e.occurred_at,
            PaymentEvent::PaymentVoided(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Payment {
    type Command = PaymentCommand;
    type Event = PaymentEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PaymentEvent::PaymentRecorded(e) => {
                self.id = e.payment_id;
                self.tenant_id = Some(e.tenant_id);
                self.contract_id = e.contract_id;
                self.salesperson_id = Some(e.salesperson_id);
                self.method = e.method;
                self.card = e.card.clone();
                self.charge = e.charge;
                self.reference = e.reference.clone();
                self.notes = e.notes.clone();
                self.state = PaymentState::Completed;
                self.recorded_at = Some(e.occurred_at);
                self.created = true;
            }
            PaymentEvent::PaymentLinked(e) => {
                self.contract_id = Some(e.contract_id);
            }
            PaymentEvent::PaymentVoided(e) => {
                self.state = PaymentState::Voided;
                self.notes = Some(e.notes.clone());
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PaymentCommand::RecordPayment(cmd) => self.handle_record(cmd),
            PaymentCommand::LinkToContract(cmd) => self.handle_link(cmd),
            PaymentCommand::VoidPayment(cmd) => self.handle_void(cmd),
        }
    }
}

fn is_last_four(s: &str) -> bool {
    s.len() == 4 && s.chars().all(|c| c.is_ascii_digit())
}

impl Payment {
    fn ensure_existing(&self, tenant_id: TenantId, payment_id: PaymentId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("payment {payment_id}")));
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != payment_id {
            return Err(DomainError::invariant("payment_id mismatch"));
        }
        Ok(())
    }

    fn handle_record(&self, cmd: &RecordPayment) -> Result<Vec<PaymentEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("payment already exists"));
        }

        let mut violations = Vec::new();
        if cmd.amount <= Decimal::ZERO {
            violations.push(Violation::new(
                "amount_must_be_positive",
                format!("payment amount must be positive (got {})", cmd.amount),
            ));
        }
        match (cmd.method, &cmd.card) {
            (PaymentMethod::Card, None) => violations.push(Violation::new(
                "card_details_required",
                "card payments require card details",
            )),
            (PaymentMethod::Card, Some(card)) => {
                if card.card_type.trim().is_empty() {
                    violations.push(Violation::new("card_details_required", "card type is required"));
                }
                if card.last_four.as_deref().is_some_and(|s| !is_last_four(s)) {
                    violations.push(Violation::new(
                        "card_last_four_invalid",
                        "last four must be exactly four digits",
                    ));
                }
            }
            _ => {}
        }
        DomainError::check(violations)?;

        // Card details are only kept for card payments.
        let card = match cmd.method {
            PaymentMethod::Card => cmd.card.clone(),
            _ => None,
        };

        Ok(vec![PaymentEvent::PaymentRecorded(PaymentRecorded {
            tenant_id: cmd.tenant_id,
            payment_id: cmd.payment_id,
            contract_id: cmd.contract_id,
            salesperson_id: cmd.salesperson_id,
            method: cmd.method,
            card,
            charge: Charge::compute(cmd.amount, cmd.method, cmd.card_surcharge),
            reference: cmd.reference.clone(),
            notes: cmd.notes.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_link(&self, cmd: &LinkToContract) -> Result<Vec<PaymentEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.payment_id)?;

        if let Some(existing) = self.contract_id {
            return Err(DomainError::conflict(format!(
                "payment {} is already linked to contract {existing}",
                self.id
            )));
        }

        let mut violations = Vec::new();
        if self.state == PaymentState::Voided {
            violations.push(Violation::new("deposit_voided", "a voided payment cannot be a deposit"));
        }
        if self.salesperson_id != Some(cmd.salesperson_id) {
            violations.push(Violation::new(
                "deposit_salesperson_mismatch",
                "deposit was recorded by a different salesperson",
            ));
        }
        if self.charge.total_charged < cmd.minimum_amount {
            violations.push(Violation::new(
                "deposit_below_minimum",
                format!(
                    "deposit {} is below the minimum of {}",
                    self.charge.total_charged, cmd.minimum_amount
                ),
            ));
        }
        DomainError::check(violations)?;

        Ok(vec![PaymentEvent::PaymentLinked(PaymentLinked {
            tenant_id: cmd.tenant_id,
            payment_id: cmd.payment_id,
            contract_id: cmd.contract_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_void(&self, cmd: &VoidPayment) -> Result<Vec<PaymentEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.payment_id)?;

        if self.state == PaymentState::Voided {
            return Err(DomainError::conflict(format!("payment {} is already voided", self.id)));
        }

        let marker = format!("[VOIDED] {}", cmd.reason);
        let notes = match self.notes.as_deref() {
            Some(existing) if !existing.is_empty() => format!("{existing}\n{marker}"),
            _ => marker,
        };

        Ok(vec![PaymentEvent::PaymentVoided(PaymentVoided {
            tenant_id: cmd.tenant_id,
            payment_id: cmd.payment_id,
            reason: cmd.reason.clone(),
            notes,
            occurred_at: cmd.occurred_at,
        })])
    }
}
