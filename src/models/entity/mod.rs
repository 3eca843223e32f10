pub mod beneficiaries;
pub mod imports;
pub mod profiles;
pub mod transactions;
