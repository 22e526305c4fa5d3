pub mod allocation;
pub mod balance;
pub mod engine;

pub use balance::BalanceAggregator;
pub use engine::{AllocationEngine, PaymentOutcome, PaymentRequest, SaleOutcome, SaleRequest};
