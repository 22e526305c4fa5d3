pub mod customer;
pub mod invoice;
pub mod payment;
pub mod summary;

pub use customer::CustomerKey;
pub use invoice::{CreditEntry, InvoiceStatus, LedgerRecord, SaleInvoice, CREDIT_BALANCE_STATUS};
pub use payment::{EmbeddedPayment, LedgerSources, Payment, PaymentMethod, SupplierReceipt};
pub use summary::{
    BalanceType, CustomerBalanceSummary, EventSource, LedgerRow, LedgerView, TransactionType,
};
