//! Reference and bulk reference parsing.

use serde::{Deserialize, Serialize};

use crate::domain::response::{CorrelationId, FieldException, Message, MessagePayload, SecurityData};
use crate::domain::value::{FieldValue, SECURITY_NOT_FOUND};
use crate::error::{BridgeError, ErrorCode, Result};

/// One (security, field, value) row of a reference response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRow {
    /// Security as echoed by the vendor.
    pub security: String,
    /// Field name.
    pub field: String,
    /// Field value, `Null` or the unresolved-security sentinel.
    pub value: FieldValue,
    /// Correlation ids of the answering message.
    pub correlation_ids: Vec<CorrelationId>,
}

/// One element of a bulk reference response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkReferenceRow {
    /// Security as echoed by the vendor.
    pub security: String,
    /// Field name.
    pub field: String,
    /// Element name; `None` when the field had no data.
    pub name: Option<String>,
    /// Element value.
    pub value: FieldValue,
    /// Position within the bulk array; `None` when the field had no data.
    pub position: Option<usize>,
    /// Correlation ids of the answering message.
    pub correlation_ids: Vec<CorrelationId>,
}

/// Fail if any field exception reports `INVALID_FIELD`.
///
/// # Errors
///
/// Returns `InvalidField` naming the first rejected field.
pub fn check_field_exceptions(exceptions: &[FieldException]) -> Result<()> {
    match exceptions.iter().find(|e| e.is_invalid_field()) {
        Some(exception) => Err(BridgeError::invalid_field(&exception.field_id)),
        None => Ok(()),
    }
}

/// Number of unresolved securities across reference messages.
#[must_use]
pub fn security_error_count(messages: &[Message]) -> usize {
    messages
        .iter()
        .filter_map(|m| match &m.payload {
            MessagePayload::ReferenceData(rows) => Some(rows),
            _ => None,
        })
        .flatten()
        .filter(|data| data.security_error.is_some())
        .count()
}

fn reference_data(message: &Message) -> Result<&[SecurityData]> {
    match &message.payload {
        MessagePayload::ReferenceData(rows) => Ok(rows),
        other => Err(BridgeError::new(
            ErrorCode::UnexpectedEvent,
            format!("Expected a ReferenceDataResponse but received a {}", other.schema()),
        )),
    }
}

fn missing_marker(data: &SecurityData) -> FieldValue {
    if data.security_error.is_some() {
        tracing::warn!(security = %data.security, "unknown security");
        FieldValue::security_not_found()
    } else {
        FieldValue::Null
    }
}

/// Parse reference messages into one row per (security, field).
///
/// # Errors
///
/// Returns `InvalidField` for a rejected field and `UnsupportedField` when a
/// requested field carries bulk data.
pub fn parse_reference<F: AsRef<str>>(messages: &[Message], fields: &[F]) -> Result<Vec<ReferenceRow>> {
    let mut rows = Vec::new();

    for message in messages {
        for data in reference_data(message)? {
            let marker = missing_marker(data);
            check_field_exceptions(&data.field_exceptions)?;

            for field in fields {
                let field = field.as_ref();
                let value = match data.field_data.get(field) {
                    Some(value) if value.is_bulk() => {
                        return Err(BridgeError::unsupported_field(
                            field,
                            format!(
                                "Field {field} returns bulk reference data which is not supported"
                            ),
                        ));
                    }
                    Some(value) => value.clone(),
                    None => marker.clone(),
                };
                rows.push(ReferenceRow {
                    security: data.security.clone(),
                    field: field.to_string(),
                    value,
                    correlation_ids: message.correlation_ids.clone(),
                });
            }
        }
    }

    Ok(rows)
}

/// Parse bulk reference messages into one row per (security, field,
/// position, element).
///
/// # Errors
///
/// Returns `InvalidField` for a rejected field and `UnsupportedField` when a
/// requested field carries a scalar.
pub fn parse_bulk_reference<F: AsRef<str>>(
    messages: &[Message],
    fields: &[F],
) -> Result<Vec<BulkReferenceRow>> {
    let mut rows = Vec::new();

    for message in messages {
        for data in reference_data(message)? {
            let marker = missing_marker(data);
            check_field_exceptions(&data.field_exceptions)?;

            for field in fields {
                let field = field.as_ref();
                match data.field_data.get(field) {
                    Some(FieldValue::Bulk(elements)) => {
                        for (position, element) in elements.iter().enumerate() {
                            for (name, value) in &element.elements {
                                rows.push(BulkReferenceRow {
                                    security: data.security.clone(),
                                    field: field.to_string(),
                                    name: Some(name.clone()),
                                    value: value.clone(),
                                    position: Some(position),
                                    correlation_ids: message.correlation_ids.clone(),
                                });
                            }
                        }
                    }
                    Some(_) => {
                        return Err(BridgeError::unsupported_field(
                            field,
                            format!("Cannot parse field {field} which is not bulk reference data"),
                        ));
                    }
                    None => rows.push(BulkReferenceRow {
                        security: data.security.clone(),
                        field: field.to_string(),
                        name: marker.is_security_not_found().then(|| SECURITY_NOT_FOUND.to_string()),
                        value: marker.clone(),
                        position: None,
                        correlation_ids: message.correlation_ids.clone(),
                    }),
                }
            }
        }
    }

    Ok(rows)
}
