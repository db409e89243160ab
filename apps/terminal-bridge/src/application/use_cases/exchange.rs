//! Exchange Resolution Use Case
//!
//! Finds the exchange (name, time zone, trading hours) a ticker trades on.
//! Composite codes such as `US` can optionally be decomposed to the
//! security's primary exchange, which costs one reference lookup.

use std::sync::Arc;

use crate::application::ports::SessionPort;
use crate::application::services::Connection;
use crate::domain::exchange::{ExchangeDirectory, ExchangeInfo, PRIMARY_EXCHANGE_FIELD, is_composite};
use crate::domain::overrides::RequestColumns;
use crate::domain::security::exchange_code;
use crate::domain::value::FieldValue;
use crate::error::{BridgeError, ErrorCode, Result};

use super::reference::ReferenceDataUseCase;

/// Use case resolving tickers to exchange metadata.
pub struct ExchangeResolutionUseCase<S>
where
    S: SessionPort,
{
    reference: ReferenceDataUseCase<S>,
    directory: Arc<ExchangeDirectory>,
}

impl<S> Clone for ExchangeResolutionUseCase<S>
where
    S: SessionPort,
{
    fn clone(&self) -> Self {
        Self {
            reference: self.reference.clone(),
            directory: Arc::clone(&self.directory),
        }
    }
}

impl<S> ExchangeResolutionUseCase<S>
where
    S: SessionPort,
{
    /// Create a new `ExchangeResolutionUseCase`.
    pub const fn new(connection: Arc<Connection<S>>, directory: Arc<ExchangeDirectory>) -> Self {
        Self {
            reference: ReferenceDataUseCase::new(connection),
            directory,
        }
    }

    /// The directory exchanges are resolved against.
    #[must_use]
    pub fn directory(&self) -> &ExchangeDirectory {
        &self.directory
    }

    /// Exchange of one ticker, or of a bare two character code.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` when no exchange code can be derived and
    /// `ExchangeNotFound` when the code (or the primary exchange) is not in
    /// the directory.
    pub async fn resolve(&self, ticker: &str, decompose: bool) -> Result<ExchangeInfo> {
        let mut resolved = self.resolve_all(&[ticker], decompose).await?;
        resolved
            .pop()
            .ok_or_else(|| BridgeError::invalid_request(format!("Could not derive exchange from {ticker}")))
    }

    /// Exchanges of several tickers, in input order. Composite tickers are
    /// decomposed with a single reference request.
    ///
    /// # Errors
    ///
    /// See [`Self::resolve`]; the first failing ticker aborts the call.
    pub async fn resolve_all<T: AsRef<str>>(
        &self,
        tickers: &[T],
        decompose: bool,
    ) -> Result<Vec<ExchangeInfo>> {
        let mut codes = tickers
            .iter()
            .map(|ticker| {
                let ticker = ticker.as_ref();
                exchange_code(ticker).ok_or_else(|| {
                    BridgeError::invalid_request(format!("Could not derive exchange from {ticker}"))
                        .with_context("ticker", ticker)
                })
            })
            .collect::<Result<Vec<String>>>()?;

        if decompose {
            let composite: Vec<usize> = (0..codes.len()).filter(|&i| is_composite(&codes[i])).collect();
            if !composite.is_empty() {
                let lookups: Vec<&str> = composite.iter().map(|&i| tickers[i].as_ref()).collect();
                let primaries = self
                    .reference
                    .field(&lookups, PRIMARY_EXCHANGE_FIELD, &RequestColumns::new())
                    .await?;
                for (&index, primary) in composite.iter().zip(primaries) {
                    let ticker = tickers[index].as_ref();
                    let primary = primary_code(&primary).ok_or_else(|| {
                        BridgeError::new(
                            ErrorCode::ExchangeNotFound,
                            format!("No primary exchange found for {ticker}"),
                        )
                        .with_context("exchange", &codes[index])
                    })?;
                    tracing::info!(ticker, composite = %codes[index], %primary, "Composite security given, using primary exchange");
                    codes[index] = primary;
                }
            }
        }

        tickers
            .iter()
            .zip(codes)
            .map(|(ticker, code)| {
                self.directory.get(&code).cloned().ok_or_else(|| {
                    BridgeError::new(
                        ErrorCode::ExchangeNotFound,
                        format!("No exchange data found for {}", ticker.as_ref()),
                    )
                    .with_context("exchange", code)
                })
            })
            .collect()
    }
}

fn primary_code(value: &FieldValue) -> Option<String> {
    if value.is_missing() {
        return None;
    }
    value
        .as_str()
        .map(|code| code.trim().to_uppercase())
        .filter(|code| !code.is_empty())
}
