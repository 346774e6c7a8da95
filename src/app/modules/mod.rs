pub mod debts;
pub mod payments;
pub mod reports;
