//! Application services shared by every interface

mod ledger;
mod records;

pub use ledger::{ClientWithAccounts, Ledger, LedgerSettings, StoreKind};
pub use records::RecordService;
