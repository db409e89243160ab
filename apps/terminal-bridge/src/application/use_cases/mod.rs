//! Application Use Cases
//!
//! Use cases turn caller-shaped requests (ticker lists, per-ticker override
//! columns, date ranges) into the fewest vendor round-trips and reconcile the
//! answers back onto the caller's rows.

mod basket_spread;
mod bulk;
mod exchange;
mod historical;
mod holders;
mod intraday;
mod portfolio;
mod reference;
mod search;
mod session_stats;

pub use basket_spread::BasketSpreadUseCase;
pub use bulk::BulkDataUseCase;
pub use exchange::ExchangeResolutionUseCase;
pub use historical::{HistoricalDataUseCase, HistoryOutput};
pub use holders::{
    COST_BASIS_FIELD, DETAILED_VIEW, FILINGS_FIELD, FILINGS_VIEW_OVERRIDE, HolderRow, HoldersUseCase,
};
pub use intraday::IntradayUseCase;
pub use portfolio::{DEFAULT_MEMBER_FIELD, MemberRow, MembershipOptions, PortfolioUseCase};
pub use reference::{
    END_DATE_OVERRIDE, MARKET_DATA_OVERRIDE, PointRow, PointTable, ReferenceDataUseCase,
    START_DATE_OVERRIDE,
};
pub use search::{DEFAULT_MAX_RESULTS, SearchUseCase};
pub use session_stats::{INAV_TICKER_FIELD, SessionStatisticsUseCase, SessionStatsOptions};

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::application::ports::{NamedValue, Request};
    use crate::application::services::Connection;
    use crate::domain::response::{CorrelationId, Event, Message, MessagePayload, SecurityData};
    use crate::infrastructure::replay::ScriptedSession;

    pub type Scripted = (Arc<ScriptedSession>, Arc<Connection<ScriptedSession>>);

    /// Start a scripted connection answering with `responder`.
    pub async fn connect<F>(responder: F) -> Scripted
    where
        F: Fn(&Request, Option<&CorrelationId>) -> Vec<Event> + Send + Sync + 'static,
    {
        let session = Arc::new(ScriptedSession::new().with_responder(responder));
        let connection = Connection::start(Arc::clone(&session), Duration::from_millis(10))
            .await
            .unwrap();
        (session, Arc::new(connection))
    }

    /// Responder answering reference requests security by security.
    ///
    /// `lookup` receives the security, the requested fields and the
    /// overrides; securities it returns `None` for are left out of the
    /// response.
    pub fn reference_responder<F>(
        lookup: F,
    ) -> impl Fn(&Request, Option<&CorrelationId>) -> Vec<Event> + Send + Sync + 'static
    where
        F: Fn(&str, &[String], &[NamedValue]) -> Option<SecurityData> + Send + Sync + 'static,
    {
        move |request, _| match request {
            Request::ReferenceData {
                securities,
                fields,
                overrides,
            } => {
                let data = securities
                    .iter()
                    .filter_map(|s| lookup(s.as_str(), fields, overrides))
                    .collect();
                vec![Event::response(vec![Message::new(MessagePayload::ReferenceData(data))])]
            }
            _ => vec![Event::response(Vec::new())],
        }
    }

    /// Value of a named override, if present.
    pub fn override_value<'a>(overrides: &'a [NamedValue], name: &str) -> Option<&'a str> {
        overrides
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}
