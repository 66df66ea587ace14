use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;

use venuebook_codes::{parse_sequential_code, payment_reference};
use venuebook_contracts::{
    ApplyPayment, CardDetails, ChangeDetail, CommissionFigures, CommissionHalf, Contract, ContractCommand, ContractId,
    ContractVersion, MarkCommissionPaid, Payment, PaymentCommand, PaymentId, PaymentMethod, RecalculateCommission,
    RecordPayment, ReversePayment, VoidPayment,
};
use venuebook_core::{AggregateId, TenantId, UserId};
use venuebook_events::{EventBus, EventEnvelope};

use crate::command_dispatcher::DispatchError;
use crate::event_store::EventStore;
use crate::services::VenueEngine;
use crate::side_effects::{SideEffect, fenced};

/// A deposit taken before its contract exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositRequest {
    pub salesperson_id: UserId,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub card: Option<CardDetails>,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    pub contract_id: ContractId,
    pub recorded_by: UserId,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub card: Option<CardDetails>,
    /// Generated (`PAG-…`) when absent.
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoidRequest {
    pub payment_id: PaymentId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Outcome of a committed payment. `commission` and `version` are `None`
/// when the corresponding post-commit step failed.
#[derive(Debug, Clone)]
pub struct PaymentReceipt {
    pub payment: Payment,
    pub contract: Contract,
    pub commission: Option<CommissionFigures>,
    pub version: Option<ContractVersion>,
}

/// Outcome of a committed void. `contract` is `None` for a deposit that was
/// never linked.
#[derive(Debug, Clone)]
pub struct VoidReceipt {
    pub payment: Payment,
    pub contract: Option<Contract>,
    pub commission: Option<CommissionFigures>,
    pub version: Option<ContractVersion>,
}

/// Money in and out of contracts.
///
/// The payment record and the contract balance always change in the same
/// transaction. Commission recompute, the version snapshot and its document
/// follow the commit as isolated side effects.
pub struct PaymentLedger<'e, S, B> {
    engine: &'e VenueEngine<S, B>,
}

impl<'e, S, B> PaymentLedger<'e, S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub(crate) fn new(engine: &'e VenueEngine<S, B>) -> Self {
        Self { engine }
    }

    pub fn record_deposit(&self, tenant_id: TenantId, request: DepositRequest) -> Result<Payment, DispatchError> {
        let payment_id = PaymentId::new(AggregateId::new());
        let reference = request
            .reference
            .unwrap_or_else(|| payment_reference(request.occurred_at.date_naive(), 0, rand::random::<u64>()));

        let mut tx = self.engine.dispatcher().begin(tenant_id);
        let mut payment = tx.load::<Payment>(payment_id.0)?;
        tx.execute(
            &mut payment,
            &PaymentCommand::RecordPayment(RecordPayment {
                tenant_id,
                payment_id,
                contract_id: None,
                salesperson_id: request.salesperson_id,
                amount: request.amount,
                method: request.method,
                card: request.card,
                card_surcharge: self.engine.config().card_surcharge,
                reference: Some(reference),
                notes: request.notes,
                occurred_at: request.occurred_at,
            }),
        )?;
        self.engine.commit(tx)?;

        tracing::info!(
            tenant_id = %tenant_id,
            payment_id = %payment_id,
            total_charged = %payment.charge().total_charged,
            "deposit recorded"
        );
        Ok(payment)
    }

    /// Record a payment against a contract and advance its balance.
    pub fn record_payment(&self, tenant_id: TenantId, request: PaymentRequest) -> Result<PaymentReceipt, DispatchError> {
        let PaymentRequest {
            contract_id,
            recorded_by,
            amount,
            method,
            card,
            reference,
            notes,
            occurred_at,
        } = request;

        let mut tx = self.engine.dispatcher().begin(tenant_id);
        let mut contract = tx.load::<Contract>(contract_id.0)?;
        if !contract.is_created() {
            return Err(DispatchError::NotFound(format!("contract {contract_id}")));
        }

        let reference = reference.unwrap_or_else(|| {
            let number = parse_sequential_code(contract.code()).map(|c| c.sequence).unwrap_or(0);
            payment_reference(occurred_at.date_naive(), number, rand::random::<u64>())
        });

        let payment_id = PaymentId::new(AggregateId::new());
        let mut payment = tx.load::<Payment>(payment_id.0)?;
        tx.execute(
            &mut payment,
            &PaymentCommand::RecordPayment(RecordPayment {
                tenant_id,
                payment_id,
                contract_id: Some(contract_id.0),
                salesperson_id: recorded_by,
                amount,
                method,
                card,
                card_surcharge: self.engine.config().card_surcharge,
                reference: Some(reference),
                notes,
                occurred_at,
            }),
        )?;

        let charge = payment.charge();
        tx.execute(
            &mut contract,
            &ContractCommand::ApplyPayment(ApplyPayment {
                tenant_id,
                contract_id,
                payment_id,
                total_charged: charge.total_charged,
                paid_at: occurred_at,
                occurred_at,
            }),
        )?;
        self.engine.commit(tx)?;

        tracing::info!(
            tenant_id = %tenant_id,
            contract_id = %contract_id,
            payment_id = %payment_id,
            total_charged = %charge.total_charged,
            outstanding = %contract.outstanding(),
            status = ?contract.payment_status(),
            "payment applied"
        );

        let commission = self.commission_after_change(tenant_id, &mut contract, occurred_at);
        let version = self.engine.versions().after_change(
            tenant_id,
            &contract,
            "Payment received",
            ChangeDetail::Payment {
                payment_id,
                amount: charge.amount,
                method,
                surcharge: charge.surcharge,
                total_charged: charge.total_charged,
                resulting_balance: contract.outstanding(),
            },
            occurred_at,
        );

        Ok(PaymentReceipt {
            payment,
            contract,
            commission,
            version,
        })
    }

    /// Void a payment. A linked payment is reversed out of its contract's
    /// balance in the same transaction.
    pub fn void_payment(&self, tenant_id: TenantId, request: VoidRequest) -> Result<VoidReceipt, DispatchError> {
        let VoidRequest {
            payment_id,
            reason,
            occurred_at,
        } = request;

        let mut tx = self.engine.dispatcher().begin(tenant_id);
        let mut payment = tx.load::<Payment>(payment_id.0)?;
        tx.execute(
            &mut payment,
            &PaymentCommand::VoidPayment(VoidPayment {
                tenant_id,
                payment_id,
                reason: reason.clone(),
                occurred_at,
            }),
        )?;

        let Some(linked) = payment.contract_id() else {
            self.engine.commit(tx)?;
            tracing::info!(tenant_id = %tenant_id, payment_id = %payment_id, "unlinked payment voided");
            return Ok(VoidReceipt {
                payment,
                contract: None,
                commission: None,
                version: None,
            });
        };

        let contract_id = ContractId::new(linked);
        let mut contract = tx.load::<Contract>(contract_id.0)?;
        let amount_reversed = contract
            .applied_payments()
            .iter()
            .find(|p| p.payment_id == payment_id)
            .map(|p| p.total_charged)
            .unwrap_or_default();
        tx.execute(
            &mut contract,
            &ContractCommand::ReversePayment(ReversePayment {
                tenant_id,
                contract_id,
                payment_id,
                occurred_at,
            }),
        )?;
        self.engine.commit(tx)?;

        tracing::info!(
            tenant_id = %tenant_id,
            contract_id = %contract_id,
            payment_id = %payment_id,
            amount_reversed = %amount_reversed,
            outstanding = %contract.outstanding(),
            "payment voided"
        );

        let commission = self.commission_after_change(tenant_id, &mut contract, occurred_at);
        let version = self.engine.versions().after_change(
            tenant_id,
            &contract,
            "Payment voided",
            ChangeDetail::PaymentVoided {
                payment_id,
                amount_reversed,
                reason,
                resulting_balance: contract.outstanding(),
            },
            occurred_at,
        );

        Ok(VoidReceipt {
            payment,
            contract: Some(contract),
            commission,
            version,
        })
    }

    /// Bring the stored commission in line with the contract's current
    /// balance. Returns the figures now in force.
    pub fn recalculate_commission(
        &self,
        tenant_id: TenantId,
        contract_id: ContractId,
        occurred_at: DateTime<Utc>,
    ) -> Result<CommissionFigures, DispatchError> {
        let mut tx = self.engine.dispatcher().begin(tenant_id);
        let mut contract = tx.load::<Contract>(contract_id.0)?;
        tx.execute(
            &mut contract,
            &ContractCommand::RecalculateCommission(RecalculateCommission {
                tenant_id,
                contract_id,
                occurred_at,
            }),
        )?;
        if tx.has_changes() {
            self.engine.commit(tx)?;
            tracing::info!(
                tenant_id = %tenant_id,
                contract_id = %contract_id,
                total = %contract.commission().total,
                "commission recalculated"
            );
        }
        Ok(contract.commission().clone())
    }

    pub fn mark_commission_paid(
        &self,
        tenant_id: TenantId,
        contract_id: ContractId,
        half: CommissionHalf,
        occurred_at: DateTime<Utc>,
    ) -> Result<Contract, DispatchError> {
        let mut tx = self.engine.dispatcher().begin(tenant_id);
        let mut contract = tx.load::<Contract>(contract_id.0)?;
        tx.execute(
            &mut contract,
            &ContractCommand::MarkCommissionPaid(MarkCommissionPaid {
                tenant_id,
                contract_id,
                half,
                occurred_at,
            }),
        )?;
        self.engine.commit(tx)?;
        tracing::info!(tenant_id = %tenant_id, contract_id = %contract_id, half = ?half, "commission half paid");
        Ok(contract)
    }

    /// Recompute the stored commission, then bring the caller's committed
    /// `contract` to the figures its own balance yields, so the receipt and the
    /// version snapshot describe that commit even if another one has landed.
    fn commission_after_change(
        &self,
        tenant_id: TenantId,
        contract: &mut Contract,
        occurred_at: DateTime<Utc>,
    ) -> Option<CommissionFigures> {
        let contract_id = contract.id_typed();
        let figures = fenced(SideEffect::CommissionRecalculation, tenant_id, contract_id, || {
            self.recalculate_commission(tenant_id, contract_id, occurred_at)
        })?;

        let settle = ContractCommand::RecalculateCommission(RecalculateCommission {
            tenant_id,
            contract_id,
            occurred_at,
        });
        if let Err(err) = venuebook_events::execute(contract, &settle) {
            tracing::warn!(contract_id = %contract_id, error = %err, "commission not folded into receipt");
        }
        Some(figures)
    }
}
