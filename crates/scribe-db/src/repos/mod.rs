//! Read-side repositories over the audit tables.

pub mod audit;
