//! Search Use Case
//!
//! Instrument search ("SECF"), equity screens ("BEQS") and grid search
//! ("BSRCH").

use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;

use crate::application::ports::{ScreenType, SessionPort};
use crate::application::services::{Connection, InstrumentRow};
use crate::error::{BridgeError, Result};
use crate::infrastructure::metrics;

/// Results returned per query unless the caller asks otherwise.
pub const DEFAULT_MAX_RESULTS: u32 = 10;

const EQUITY_YELLOW_KEY: &str = "Equity";

/// Use case for instrument search and screening.
pub struct SearchUseCase<S>
where
    S: SessionPort,
{
    connection: Arc<Connection<S>>,
}

impl<S> SearchUseCase<S>
where
    S: SessionPort,
{
    /// Create a new `SearchUseCase`.
    pub const fn new(connection: Arc<Connection<S>>) -> Self {
        Self { connection }
    }

    /// Search instruments for every distinct query.
    ///
    /// Repeated queries are sent once; hits come back grouped by query in
    /// first-appearance order.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for a zero result cap; otherwise propagates
    /// session errors.
    pub async fn instruments<T: AsRef<str>>(
        &self,
        queries: &[T],
        yellow_key_filter: Option<&str>,
        max_results: u32,
    ) -> Result<Vec<InstrumentRow>> {
        if max_results == 0 {
            return Err(BridgeError::invalid_request("max_results must be positive"));
        }

        let mut seen = HashSet::new();
        let mut rows = Vec::new();
        for query in queries.iter().map(AsRef::as_ref) {
            if !seen.insert(query) {
                continue;
            }
            rows.extend(
                self.connection
                    .instrument_list(query, Some(max_results), yellow_key_filter)
                    .await?,
            );
        }
        metrics::record_round_trips("secf", seen.len());
        Ok(rows)
    }

    /// Run a saved equity screen. Returns tickers with the equity yellow
    /// key appended.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for an empty screen name; otherwise
    /// propagates session errors.
    pub async fn screen(
        &self,
        screen_name: &str,
        screen_type: ScreenType,
        as_of: Option<NaiveDate>,
    ) -> Result<Vec<String>> {
        if screen_name.trim().is_empty() {
            return Err(BridgeError::invalid_request("screen name must be non empty"));
        }
        let names = self
            .connection
            .equity_screen(screen_name, screen_type, None, None, as_of)
            .await?;
        metrics::record_round_trips("beqs", 1);
        tracing::debug!(screen_name, members = names.len(), "Screen complete");
        Ok(names
            .into_iter()
            .map(|name| format!("{name} {EQUITY_YELLOW_KEY}"))
            .collect())
    }

    /// Grid search of a domain such as `COMDTY:NGFLOW`.
    ///
    /// # Errors
    ///
    /// Propagates session errors.
    pub async fn grid(&self, domain: &str) -> Result<Vec<String>> {
        let values = self.connection.grid_search(domain).await?;
        metrics::record_round_trips("bsrch", 1);
        Ok(values)
    }
}
