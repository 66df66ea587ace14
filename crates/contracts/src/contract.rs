use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use venuebook_core::{
    Aggregate, AggregateId, AggregateRoot, ClientId, DomainError, TenantId, UserId, Violation,
};
use venuebook_events::Event;
use venuebook_offers::{OfferId, OfferTerms, Quote};
use venuebook_pricing::{Breakdown, FinancingSchedule, PackageId, SalonId, ServiceId, even_installment};

use crate::commission::{CommissionFigures, CommissionHalf, CommissionPolicy, calculate};
use crate::payment::PaymentId;
use crate::version_log::{ContractSnapshot, VersionLogId};

/// Contract identifier (tenant-scoped via `tenant_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContractId(pub AggregateId);

impl ContractId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ContractId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentPlan {
    SinglePayment,
    Financed { months: u32 },
    Installments { months: u32 },
}

impl PaymentPlan {
    pub fn months(self) -> Option<u32> {
        match self {
            PaymentPlan::SinglePayment => None,
            PaymentPlan::Financed { months } | PaymentPlan::Installments { months } => Some(months),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Partial,
    Completed,
}

impl PaymentStatus {
    /// Completed once nothing is outstanding; partial once anything beyond the
    /// deposit has been paid; pending otherwise.
    pub fn derive(outstanding: Decimal, total_paid: Decimal, deposit_paid: Decimal) -> Self {
        if outstanding <= Decimal::ZERO {
            PaymentStatus::Completed
        } else if total_paid > deposit_paid {
            PaymentStatus::Partial
        } else {
            PaymentStatus::Pending
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractState {
    Active,
    Cancelled,
}

impl ContractState {
    pub fn transition(self, to: ContractState) -> Result<ContractState, DomainError> {
        match (self, to) {
            (ContractState::Active, ContractState::Cancelled) => Ok(to),
            (from, to) => Err(DomainError::conflict(format!(
                "contract cannot move from {from:?} to {to:?}"
            ))),
        }
    }
}

/// A service on the contract. Package-included lines carry a zero price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractServiceLine {
    pub service_id: ServiceId,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
    pub included_in_package: bool,
}

/// A payment currently counted towards the contract balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedPayment {
    pub payment_id: PaymentId,
    pub total_charged: Decimal,
    pub paid_at: DateTime<Utc>,
    pub is_deposit: bool,
}

/// Amounts fixed at issuance and reused for every later recomputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractPolicy {
    pub minimum_deposit: Decimal,
    pub financing_second_payment: Decimal,
    pub commission: CommissionPolicy,
}

impl Default for ContractPolicy {
    fn default() -> Self {
        Self {
            minimum_deposit: Decimal::from(500),
            financing_second_payment: Decimal::from(1000),
            commission: CommissionPolicy::default(),
        }
    }
}

/// Aggregate root: Contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contract {
    id: ContractId,
    tenant_id: Option<TenantId>,
    code: String,
    offer_id: Option<OfferId>,
    client_id: Option<ClientId>,
    salesperson_id: Option<UserId>,
    package_id: Option<PackageId>,
    salon_id: Option<SalonId>,
    event_date: Option<NaiveDate>,
    start_time: Option<NaiveTime>,
    end_time: Option<NaiveTime>,
    guest_count: u32,
    breakdown: Option<Breakdown>,
    service_lines: Vec<ContractServiceLine>,
    plan: PaymentPlan,
    monthly_payment: Decimal,
    policy: ContractPolicy,
    total: Decimal,
    total_paid: Decimal,
    outstanding: Decimal,
    payment_status: PaymentStatus,
    state: ContractState,
    applied: Vec<AppliedPayment>,
    access_code: String,
    access_code_expires_on: Option<NaiveDate>,
    created_on: Option<DateTime<Utc>>,
    version_log_id: Option<VersionLogId>,
    commission: CommissionFigures,
    first_half_paid: bool,
    second_half_paid: bool,
    calendar_event_id: Option<String>,
    version: u64,
    created: bool,
}

impl Contract {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ContractId) -> Self {
        Self {
            id,
            tenant_id: None,
            code: String::new(),
            offer_id: None,
            client_id: None,
            salesperson_id: None,
            package_id: None,
            salon_id: None,
            event_date: None,
            start_time: None,
            end_time: None,
            guest_count: 0,
            breakdown: None,
            service_lines: Vec::new(),
            plan: PaymentPlan::SinglePayment,
            monthly_payment: Decimal::ZERO,
            policy: ContractPolicy::default(),
            total: Decimal::ZERO,
            total_paid: Decimal::ZERO,
            outstanding: Decimal::ZERO,
            payment_status: PaymentStatus::Pending,
            state: ContractState::Active,
            applied: Vec::new(),
            access_code: String::new(),
            access_code_expires_on: None,
            created_on: None,
            version_log_id: None,
            commission: CommissionFigures::default(),
            first_half_paid: false,
            second_half_paid: false,
            calendar_event_id: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ContractId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn offer_id(&self) -> Option<OfferId> {
        self.offer_id
    }

    pub fn client_id(&self) -> Option<ClientId> {
        self.client_id
    }

    pub fn salesperson_id(&self) -> Option<UserId> {
        self.salesperson_id
    }

    pub fn package_id(&self) -> Option<PackageId> {
        self.package_id
    }

    pub fn salon_id(&self) -> Option<SalonId> {
        self.salon_id
    }

    pub fn event_date(&self) -> Option<NaiveDate> {
        self.event_date
    }

    pub fn start_time(&self) -> Option<NaiveTime> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<NaiveTime> {
        self.end_time
    }

    pub fn guest_count(&self) -> u32 {
        self.guest_count
    }

    pub fn breakdown(&self) -> Option<&Breakdown> {
        self.breakdown.as_ref()
    }

    pub fn service_lines(&self) -> &[ContractServiceLine] {
        &self.service_lines
    }

    pub fn plan(&self) -> PaymentPlan {
        self.plan
    }

    pub fn monthly_payment(&self) -> Decimal {
        self.monthly_payment
    }

    pub fn total(&self) -> Decimal {
        self.total
    }

    pub fn total_paid(&self) -> Decimal {
        self.total_paid
    }

    pub fn outstanding(&self) -> Decimal {
        self.outstanding
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn state(&self) -> ContractState {
        self.state
    }

    pub fn applied_payments(&self) -> &[AppliedPayment] {
        &self.applied
    }

    pub fn access_code(&self) -> &str {
        &self.access_code
    }

    pub fn access_code_expires_on(&self) -> Option<NaiveDate> {
        self.access_code_expires_on
    }

    /// Access codes stay usable through their expiry date.
    pub fn access_code_valid_on(&self, date: NaiveDate) -> bool {
        self.access_code_expires_on.is_some_and(|exp| date <= exp)
    }

    /// Backdated to when the deposit was recorded.
    pub fn created_on(&self) -> Option<DateTime<Utc>> {
        self.created_on
    }

    pub fn version_log_id(&self) -> Option<VersionLogId> {
        self.version_log_id
    }

    pub fn commission(&self) -> &CommissionFigures {
        &self.commission
    }

    pub fn commission_paid(&self, half: CommissionHalf) -> bool {
        match half {
            CommissionHalf::First => self.first_half_paid,
            CommissionHalf::Second => self.second_half_paid,
        }
    }

    pub fn calendar_event_id(&self) -> Option<&str> {
        self.calendar_event_id.as_deref()
    }

    pub fn snapshot(&self) -> Option<ContractSnapshot> {
        let event_date = self.event_date?;
        Some(ContractSnapshot {
            contract_code: self.code.clone(),
            event_date,
            guest_count: self.guest_count,
            total: self.total,
            total_paid: self.total_paid,
            outstanding: self.outstanding,
            payment_status: self.payment_status,
            plan: self.plan,
            commission_total: self.commission.total,
            state: self.state,
        })
    }

    fn deposit_paid(applied: &[AppliedPayment]) -> Decimal {
        applied
            .iter()
            .filter(|p| p.is_deposit)
            .map(|p| p.total_charged)
            .sum()
    }

    /// Figures the commission calculator would produce right now.
    pub fn expected_commission(&self) -> CommissionFigures {
        match self.created_on {
            Some(created_on) => calculate(&self.policy.commission, self.total, created_on, &self.applied),
            None => CommissionFigures::default(),
        }
    }
}

impl AggregateRoot for Contract {
    type Id = ContractId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// The qualifying deposit used to issue a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositRef {
    pub payment_id: PaymentId,
    pub total_charged: Decimal,
    pub recorded_at: DateTime<Utc>,
}

/// Command: IssueContract.
///
/// Carries a copy of the accepted offer's terms and quote; the issuing
/// transaction also claims the offer and the deposit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueContract {
    pub tenant_id: TenantId,
    pub contract_id: ContractId,
    pub code: String,
    pub offer_id: OfferId,
    pub terms: OfferTerms,
    pub quote: Quote,
    pub plan: PaymentPlan,
    pub deposit: DepositRef,
    pub policy: ContractPolicy,
    pub access_code: String,
    pub access_code_expires_on: NaiveDate,
    pub version_log_id: VersionLogId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyPayment {
    pub tenant_id: TenantId,
    pub contract_id: ContractId,
    pub payment_id: PaymentId,
    pub total_charged: Decimal,
    pub paid_at: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReversePayment. Undoes exactly what `ApplyPayment` added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReversePayment {
    pub tenant_id: TenantId,
    pub contract_id: ContractId,
    pub payment_id: PaymentId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecalculateCommission {
    pub tenant_id: TenantId,
    pub contract_id: ContractId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkCommissionPaid. Issued by payroll once a half is unlocked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkCommissionPaid {
    pub tenant_id: TenantId,
    pub contract_id: ContractId,
    pub half: CommissionHalf,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkCalendarEvent {
    pub tenant_id: TenantId,
    pub contract_id: ContractId,
    pub calendar_event_id: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelContract {
    pub tenant_id: TenantId,
    pub contract_id: ContractId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractCommand {
    IssueContract(IssueContract),
    ApplyPayment(ApplyPayment),
    ReversePayment(ReversePayment),
    RecalculateCommission(RecalculateCommission),
    MarkCommissionPaid(MarkCommissionPaid),
    LinkCalendarEvent(LinkCalendarEvent),
    CancelContract(CancelContract),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractIssued {
    pub tenant_id: TenantId,
    pub contract_id: ContractId,
    pub code: String,
    pub offer_id: OfferId,
    pub client_id: ClientId,
    pub salesperson_id: UserId,
    pub package_id: PackageId,
    pub salon_id: Option<SalonId>,
    pub event_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub guest_count: u32,
    pub breakdown: Breakdown,
    pub service_lines: Vec<ContractServiceLine>,
    pub plan: PaymentPlan,
    pub monthly_payment: Decimal,
    pub policy: ContractPolicy,
    pub total: Decimal,
    pub deposit: AppliedPayment,
    pub total_paid: Decimal,
    pub outstanding: Decimal,
    pub payment_status: PaymentStatus,
    pub access_code: String,
    pub access_code_expires_on: NaiveDate,
    pub created_on: DateTime<Utc>,
    pub version_log_id: VersionLogId,
    pub commission: CommissionFigures,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentApplied {
    pub tenant_id: TenantId,
    pub contract_id: ContractId,
    pub payment: AppliedPayment,
    pub total_paid: Decimal,
    pub outstanding: Decimal,
    pub payment_status: PaymentStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReversed {
    pub tenant_id: TenantId,
    pub contract_id: ContractId,
    pub payment_id: PaymentId,
    pub amount_reversed: Decimal,
    pub total_paid: Decimal,
    pub outstanding: Decimal,
    pub payment_status: PaymentStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionRecalculated {
    pub tenant_id: TenantId,
    pub contract_id: ContractId,
    pub commission: CommissionFigures,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionMarkedPaid {
    pub tenant_id: TenantId,
    pub contract_id: ContractId,
    pub half: CommissionHalf,
    pub amount: Decimal,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEventLinked {
    pub tenant_id: TenantId,
    pub contract_id: ContractId,
    pub calendar_event_id: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractCancelled {
    pub tenant_id: TenantId,
    pub contract_id: ContractId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractEvent {
    ContractIssued(Box<ContractIssued>),
    PaymentApplied(PaymentApplied),
    PaymentReversed(PaymentReversed),
    CommissionRecalculated(CommissionRecalculated),
    CommissionMarkedPaid(CommissionMarkedPaid),
    CalendarEventLinked(CalendarEventLinked),
    ContractCancelled(ContractCancelled),
}

impl Event for ContractEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ContractEvent::ContractIssued(_) => "contracts.contract.issued",
            ContractEvent::PaymentApplied(_) => "contracts.contract.payment_applied",
            ContractEvent::PaymentReversed(_) => "contracts.contract.payment_reversed",
            ContractEvent::CommissionRecalculated(_) => "contracts.contract.commission_recalculated",
            ContractEvent::CommissionMarkedPaid(_) => "contracts.contract.commission_marked_paid",
            ContractEvent::CalendarEventLinked(_) => "contracts.contract.calendar_event_linked",
            ContractEvent::ContractCancelled(_) => "contracts.contract.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ContractEvent::ContractIssued(e) => e.occurred_at,
            ContractEvent::PaymentApplied(e) => e.occurred_at,
            ContractEvent::PaymentReversed(e) => e.occurred_at,
            ContractEvent::CommissionRecalculated(e) => e.occurred_at,
            ContractEvent::CommissionMarkedPaid(e) => e.occurred_at,
            ContractEvent::CalendarEventLinked(e) => e.occurred_at,
            ContractEvent::ContractCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Contract {
    type Command = ContractCommand;
    type Event = ContractEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ContractEvent::ContractIssued(e) => {
                self.id = e.contract_id;
                self.tenant_id = Some(e.tenant_id);
                self.code = e.code.clone();
                self.offer_id = Some(e.offer_id);
                self.client_id = Some(e.client_id);
                self.salesperson_id = Some(e.salesperson_id);
                self.package_id = Some(e.package_id);
                self.salon_id = e.salon_id;
                self.event_date = Some(e.event_date);
                self.start_time = Some(e.start_time);
                self.end_time = Some(e.end_time);
                self.guest_count = e.guest_count;
                self.breakdown = Some(e.breakdown.clone());
                self.service_lines = e.service_lines.clone();
                self.plan = e.plan;
                self.monthly_payment = e.monthly_payment;
                self.policy = e.policy;
                self.total = e.total;
                self.applied = vec![e.deposit.clone()];
                self.total_paid = e.total_paid;
                self.outstanding = e.outstanding;
                self.payment_status = e.payment_status;
                self.state = ContractState::Active;
                self.access_code = e.access_code.clone();
                self.access_code_expires_on = Some(e.access_code_expires_on);
                self.created_on = Some(e.created_on);
                self.version_log_id = Some(e.version_log_id);
                self.commission = e.commission.clone();
                self.created = true;
            }
            ContractEvent::PaymentApplied(e) => {
                self.applied.push(e.payment.clone());
                self.total_paid = e.total_paid;
                self.outstanding = e.outstanding;
                self.payment_status = e.payment_status;
            }
            ContractEvent::PaymentReversed(e) => {
                self.applied.retain(|p| p.payment_id != e.payment_id);
                self.total_paid = e.total_paid;
                self.outstanding = e.outstanding;
                self.payment_status = e.payment_status;
            }
            ContractEvent::CommissionRecalculated(e) => {
                self.commission = e.commission.clone();
            }
            ContractEvent::CommissionMarkedPaid(e) => match e.half {
                CommissionHalf::First => self.first_half_paid = true,
                CommissionHalf::Second => self.second_half_paid = true,
            },
            ContractEvent::CalendarEventLinked(e) => {
                self.calendar_event_id = Some(e.calendar_event_id.clone());
            }
            ContractEvent::ContractCancelled(_) => {
                self.state = ContractState::Cancelled;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ContractCommand::IssueContract(cmd) => self.handle_issue(cmd),
            ContractCommand::ApplyPayment(cmd) => self.handle_apply_payment(cmd),
            ContractCommand::ReversePayment(cmd) => self.handle_reverse_payment(cmd),
            ContractCommand::RecalculateCommission(cmd) => self.handle_recalculate(cmd),
            ContractCommand::MarkCommissionPaid(cmd) => self.handle_mark_paid(cmd),
            ContractCommand::LinkCalendarEvent(cmd) => self.handle_link_calendar(cmd),
            ContractCommand::CancelContract(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl Contract {
    fn ensure_existing(&self, tenant_id: TenantId, contract_id: ContractId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("contract {contract_id}")));
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != contract_id {
            return Err(DomainError::invariant("contract_id mismatch"));
        }
        Ok(())
    }

    fn service_lines_from(quote: &Quote) -> Vec<ContractServiceLine> {
        let included = quote.included_services.iter().map(|s| ContractServiceLine {
            service_id: s.service_id,
            name: s.name.clone(),
            quantity: s.quantity,
            unit_price: Decimal::ZERO,
            subtotal: Decimal::ZERO,
            included_in_package: true,
        });
        let add_ons = quote.service_lines.iter().map(|s| ContractServiceLine {
            service_id: s.service_id,
            name: s.name.clone(),
            quantity: s.quantity,
            unit_price: s.unit_price,
            subtotal: s.subtotal,
            included_in_package: false,
        });
        included.chain(add_ons).collect()
    }

    fn monthly_payment_for(plan: PaymentPlan, policy: &ContractPolicy, total: Decimal, outstanding: Decimal) -> Decimal {
        match plan {
            PaymentPlan::SinglePayment => Decimal::ZERO,
            PaymentPlan::Financed { months } => {
                FinancingSchedule::compute(total, months, policy.minimum_deposit, policy.financing_second_payment)
                    .monthly_payment
            }
            PaymentPlan::Installments { months } => even_installment(outstanding, months),
        }
    }

    fn handle_issue(&self, cmd: &IssueContract) -> Result<Vec<ContractEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("contract already exists"));
        }

        let total = cmd.quote.total();
        let deposit = cmd.deposit.total_charged;

        let mut violations = Vec::new();
        if total < Decimal::ZERO {
            violations.push(Violation::new("negative_total", "offer total is negative"));
        }
        if cmd.plan.months().is_some_and(|m| m < 1) {
            violations.push(Violation::new(
                "plan_months_min",
                "financed and installment plans need at least one month",
            ));
        }
        if deposit < cmd.policy.minimum_deposit {
            violations.push(Violation::new(
                "deposit_below_minimum",
                format!("deposit {deposit} is below the minimum of {}", cmd.policy.minimum_deposit),
            ));
        }
        if deposit > total {
            violations.push(Violation::new(
                "amount_exceeds_outstanding",
                format!("deposit {deposit} exceeds the contract total {total}"),
            ));
        }
        DomainError::check(violations)?;

        let deposit_payment = AppliedPayment {
            payment_id: cmd.deposit.payment_id,
            total_charged: deposit,
            paid_at: cmd.deposit.recorded_at,
            is_deposit: true,
        };
        let created_on = cmd.deposit.recorded_at;
        let outstanding = total - deposit;
        let commission = calculate(
            &cmd.policy.commission,
            total,
            created_on,
            std::slice::from_ref(&deposit_payment),
        );

        Ok(vec![ContractEvent::ContractIssued(Box::new(ContractIssued {
            tenant_id: cmd.tenant_id,
            contract_id: cmd.contract_id,
            code: cmd.code.clone(),
            offer_id: cmd.offer_id,
            client_id: cmd.terms.client_id,
            salesperson_id: cmd.terms.salesperson_id,
            package_id: cmd.terms.package_id,
            salon_id: cmd.terms.salon_id,
            event_date: cmd.terms.event_date,
            start_time: cmd.terms.start_time,
            end_time: cmd.terms.end_time,
            guest_count: cmd.terms.guest_count,
            breakdown: cmd.quote.breakdown.clone(),
            service_lines: Self::service_lines_from(&cmd.quote),
            plan: cmd.plan,
            monthly_payment: Self::monthly_payment_for(cmd.plan, &cmd.policy, total, outstanding),
            policy: cmd.policy,
            total,
            deposit: deposit_payment,
            total_paid: deposit,
            outstanding,
            payment_status: PaymentStatus::derive(outstanding, deposit, deposit),
            access_code: cmd.access_code.clone(),
            access_code_expires_on: cmd.access_code_expires_on,
            created_on,
            version_log_id: cmd.version_log_id,
            commission,
            occurred_at: cmd.occurred_at,
        }))])
    }

    fn handle_apply_payment(&self, cmd: &ApplyPayment) -> Result<Vec<ContractEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.contract_id)?;

        if self.state == ContractState::Cancelled {
            return Err(DomainError::conflict(format!("contract {} is cancelled", self.code)));
        }
        if self.payment_status == PaymentStatus::Completed {
            return Err(DomainError::conflict(format!("contract {} is already paid in full", self.code)));
        }
        if self.applied.iter().any(|p| p.payment_id == cmd.payment_id) {
            return Err(DomainError::conflict(format!(
                "payment {} is already applied",
                cmd.payment_id
            )));
        }
        if cmd.total_charged <= Decimal::ZERO {
            return Err(DomainError::validation(
                "amount_must_be_positive",
                "applied amount must be positive",
            ));
        }
        if cmd.total_charged > self.outstanding {
            return Err(DomainError::validation(
                "amount_exceeds_outstanding",
                format!(
                    "payment of {} exceeds the outstanding balance of {}",
                    cmd.total_charged, self.outstanding
                ),
            ));
        }

        let total_paid = self.total_paid + cmd.total_charged;
        let outstanding = self.total - total_paid;

        Ok(vec![ContractEvent::PaymentApplied(PaymentApplied {
            tenant_id: cmd.tenant_id,
            contract_id: cmd.contract_id,
            payment: AppliedPayment {
                payment_id: cmd.payment_id,
                total_charged: cmd.total_charged,
                paid_at: cmd.paid_at,
                is_deposit: false,
            },
            total_paid,
            outstanding,
            payment_status: PaymentStatus::derive(outstanding, total_paid, Self::deposit_paid(&self.applied)),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reverse_payment(&self, cmd: &ReversePayment) -> Result<Vec<ContractEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.contract_id)?;

        let Some(applied) = self.applied.iter().find(|p| p.payment_id == cmd.payment_id) else {
            return Err(DomainError::not_found(format!(
                "payment {} on contract {}",
                cmd.payment_id, self.code
            )));
        };

        let remaining: Vec<AppliedPayment> = self
            .applied
            .iter()
            .filter(|p| p.payment_id != cmd.payment_id)
            .cloned()
            .collect();
        let total_paid = self.total_paid - applied.total_charged;
        let outstanding = self.total - total_paid;

        Ok(vec![ContractEvent::PaymentReversed(PaymentReversed {
            tenant_id: cmd.tenant_id,
            contract_id: cmd.contract_id,
            payment_id: cmd.payment_id,
            amount_reversed: applied.total_charged,
            total_paid,
            outstanding,
            payment_status: PaymentStatus::derive(outstanding, total_paid, Self::deposit_paid(&remaining)),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_recalculate(&self, cmd: &RecalculateCommission) -> Result<Vec<ContractEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.contract_id)?;

        let commission = self.expected_commission();
        if commission == self.commission {
            return Ok(vec![]);
        }

        Ok(vec![ContractEvent::CommissionRecalculated(CommissionRecalculated {
            tenant_id: cmd.tenant_id,
            contract_id: cmd.contract_id,
            commission,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_paid(&self, cmd: &MarkCommissionPaid) -> Result<Vec<ContractEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.contract_id)?;

        if self.commission_paid(cmd.half) {
            return Err(DomainError::conflict(format!(
                "{:?} commission half of {} is already paid",
                cmd.half, self.code
            )));
        }
        if !self.commission.is_unlocked(cmd.half) {
            return Err(DomainError::validation(
                "commission_half_locked",
                format!("{:?} commission half of {} is not unlocked", cmd.half, self.code),
            ));
        }

        Ok(vec![ContractEvent::CommissionMarkedPaid(CommissionMarkedPaid {
            tenant_id: cmd.tenant_id,
            contract_id: cmd.contract_id,
            half: cmd.half,
            amount: self.commission.amount(cmd.half),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_link_calendar(&self, cmd: &LinkCalendarEvent) -> Result<Vec<ContractEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.contract_id)?;

        match self.calendar_event_id.as_deref() {
            Some(existing) if existing == cmd.calendar_event_id => return Ok(vec![]),
            Some(existing) => {
                return Err(DomainError::conflict(format!(
                    "contract {} is already linked to calendar event {existing}",
                    self.code
                )));
            }
            None => {}
        }

        Ok(vec![ContractEvent::CalendarEventLinked(CalendarEventLinked {
            tenant_id: cmd.tenant_id,
            contract_id: cmd.contract_id,
            calendar_event_id: cmd.calendar_event_id.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelContract) -> Result<Vec<ContractEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.contract_id)?;
        self.state.transition(ContractState::Cancelled)?;

        Ok(vec![ContractEvent::ContractCancelled(ContractCancelled {
            tenant_id: cmd.tenant_id,
            contract_id: cmd.contract_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::TimeZone;
    use venuebook_events::execute;
    use venuebook_pricing::{ChargeMode, PricedServiceLine, SeasonId, SeasonTier, ServiceLine, TaxConfig};
    use venuebook_offers::{IncludedServiceLine, QuotedServiceLine};

    pub fn d(v: i64) -> Decimal {
        Decimal::from(v)
    }

    pub fn deposit_day() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2027, 1, 10, 15, 0, 0).unwrap()
    }

    pub fn quote_4500() -> Quote {
        let tax = TaxConfig::default();
        let line = ServiceLine { mode: ChargeMode::Flat, unit_price: Decimal::ZERO, quantity: 1 };
        Quote {
            package_id: PackageId(1),
            package_name: "Diamond".into(),
            duration_hours: 5,
            season_id: SeasonId(2),
            season_name: "High".into(),
            included_services: vec![IncludedServiceLine {
                service_id: ServiceId(10),
                name: "Photo booth".into(),
                quantity: 1,
            }],
            service_lines: vec![QuotedServiceLine {
                service_id: ServiceId(40),
                name: "Welcome sign".into(),
                mode: ChargeMode::Flat,
                quantity: 1,
                unit_price: Decimal::ZERO,
                catalog_price: d(40),
                subtotal: Decimal::ZERO,
            }],
            breakdown: Breakdown {
                base_price: d(1000),
                season_adjustment: d(200),
                package_total: d(1200),
                guest_count: 80,
                minimum_guests: 50,
                extra_guests: 30,
                per_guest_rate: SeasonTier::High.per_guest_rate(),
                guest_surcharge: d(2400),
                service_lines: vec![PricedServiceLine { line, subtotal: Decimal::ZERO }],
                services_subtotal: Decimal::ZERO,
                subtotal_base: d(3600),
                discount: Decimal::ZERO,
                subtotal_after_discount: d(3600),
                tax_percent: tax.tax,
                tax: d(252),
                service_fee_percent: tax.service_fee,
                service_fee: d(648),
                total: d(4500),
            },
        }
    }

    pub fn terms() -> OfferTerms {
        OfferTerms {
            client_id: ClientId::new(),
            salesperson_id: UserId::new(),
            package_id: PackageId(1),
            salon_id: None,
            event_date: NaiveDate::from_ymd_opt(2027, 6, 19).unwrap(),
            start_time: NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(23, 0, 0).unwrap(),
            guest_count: 80,
            services: Vec::new(),
            discount: Decimal::ZERO,
            season_adjustment_override: None,
            notes: None,
        }
    }

    pub fn issue_cmd(tenant_id: TenantId, contract_id: ContractId, deposit: i64, plan: PaymentPlan) -> IssueContract {
        IssueContract {
            tenant_id,
            contract_id,
            code: "CONT-2027-01-0001".into(),
            offer_id: OfferId::new(AggregateId::new()),
            terms: terms(),
            quote: quote_4500(),
            plan,
            deposit: DepositRef {
                payment_id: PaymentId::new(AggregateId::new()),
                total_charged: d(deposit),
                recorded_at: deposit_day(),
            },
            policy: ContractPolicy::default(),
            access_code: "CLI-0001-00000ZLOYW3V28".into(),
            access_code_expires_on: NaiveDate::from_ymd_opt(2027, 7, 19).unwrap(),
            version_log_id: VersionLogId::new(AggregateId::new()),
            occurred_at: Utc.with_ymd_and_hms(2027, 1, 11, 9, 0, 0).unwrap(),
        }
    }

    pub fn issued(plan: PaymentPlan) -> (Contract, TenantId, ContractId) {
        let tenant_id = TenantId::new();
        let contract_id = ContractId::new(AggregateId::new());
        let mut contract = Contract::empty(contract_id);
        execute(
            &mut contract,
            &ContractCommand::IssueContract(issue_cmd(tenant_id, contract_id, 500, plan)),
        )
        .unwrap();
        (contract, tenant_id, contract_id)
    }
}
