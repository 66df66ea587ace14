//! Contracts domain module (event-sourced).
//!
//! Contracts are issued from accepted offers and carry the balance ledger,
//! the payment status, commission milestones and an append-only version log.
//! Payments are their own aggregate so a deposit can exist before its
//! contract. No IO.

pub mod commission;
pub mod contract;
pub mod payment;
pub mod version_log;

pub use commission::{CommissionFigures, CommissionHalf, CommissionPolicy, calculate as calculate_commission};
pub use contract::{
    AppliedPayment, ApplyPayment, CalendarEventLinked, CancelContract, CommissionMarkedPaid,
    CommissionRecalculated, Contract, ContractCancelled, ContractCommand, ContractEvent, ContractId,
    ContractIssued, ContractPolicy, ContractServiceLine, ContractState, DepositRef, IssueContract,
    LinkCalendarEvent, MarkCommissionPaid, PaymentApplied, PaymentPlan, PaymentReversed, PaymentStatus,
    RecalculateCommission, ReversePayment,
};
pub use payment::{
    CardDetails, Charge, LinkToContract, Payment, PaymentCommand, PaymentEvent, PaymentId, PaymentLinked,
    PaymentMethod, PaymentRecorded, PaymentState, PaymentVoided, RecordPayment, VoidPayment,
};
pub use version_log::{
    ChangeDetail, ContractSnapshot, ContractVersion, DeleteVersion, RecordVersion, VersionDeleted,
    VersionLog, VersionLogCommand, VersionLogEvent, VersionLogId, VersionRecorded,
};
