pub mod checkout;
pub mod progress_report;
