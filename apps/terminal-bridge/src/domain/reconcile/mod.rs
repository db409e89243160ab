//! Response Reconciliation
//!
//! Turns reference-data messages into rows (applying the security-error and
//! field-exception conventions) and aligns per-group results back onto the
//! caller's input order.

mod alignment;
mod bulk_table;
mod reference;

pub use alignment::AlignedResults;
pub use bulk_table::{BulkTable, BulkTableRow};
pub use reference::{
    BulkReferenceRow, ReferenceRow, check_field_exceptions, parse_bulk_reference,
    parse_reference, security_error_count,
};
