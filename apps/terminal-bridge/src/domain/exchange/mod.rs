//! Exchange Directory
//!
//! Exchange metadata (time zone, equity session hours) keyed by the
//! two-character vendor exchange code, and the session arithmetic used to
//! request and filter a local trading day.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::domain::security::exchange_code;
use crate::error::{BridgeError, ErrorCode, Result};

/// Composite exchange codes that can be decomposed to a primary exchange.
pub const COMPOSITE_CODES: [&str; 33] = [
    "GR", "RM", "BZ", "UZ", "SW", "EY", "AR", "CB", "VC", "ED", "MM", "US", "CI", "CN", "UH",
    "VN", "PA", "IN", "KS", "CH", "JP", "IR", "AU", "EU", "GA", "RO", "DC", "SM", "RU", "CP",
    "LR", "SS", "CZ",
];

/// Field holding a security's primary exchange code.
pub const PRIMARY_EXCHANGE_FIELD: &str = "EQY_PRIM_EXCH_SHRT";

/// Whether a code is a composite exchange.
#[must_use]
pub fn is_composite(code: &str) -> bool {
    COMPOSITE_CODES.contains(&code)
}

// =============================================================================
// ExchangeInfo
// =============================================================================

/// Metadata for one exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeInfo {
    /// Vendor exchange code.
    pub code: String,
    /// Exchange name.
    pub name: String,
    /// Local time zone.
    pub timezone: Tz,
    /// Equity market open, local time.
    pub market_open: NaiveTime,
    /// Equity market close, local time.
    pub market_close: NaiveTime,
}

impl ExchangeInfo {
    /// UTC bounds of a local calendar day: 00:00:00 to 23:59:59 local.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if local midnight does not exist in the
    /// exchange time zone.
    pub fn session_window(&self, date: NaiveDate) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let start = date.and_time(NaiveTime::MIN);
        let end = start + Duration::seconds(86_399);
        let localize = |naive: chrono::NaiveDateTime| {
            self.timezone
                .from_local_datetime(&naive)
                .earliest()
                .map(|t| t.with_timezone(&Utc))
                .ok_or_else(|| {
                    BridgeError::invalid_request(format!(
                        "{naive} does not exist in {}",
                        self.timezone.name()
                    ))
                })
        };
        Ok((localize(start)?, localize(end)?))
    }

    /// Convert a UTC instant to exchange local time.
    #[must_use]
    pub fn to_local(&self, time: DateTime<Utc>) -> DateTime<Tz> {
        time.with_timezone(&self.timezone)
    }

    /// Whether a local time of day falls inside the session.
    ///
    /// The close minute is inclusive up to 59.999 seconds.
    #[must_use]
    pub fn in_session(&self, local: NaiveTime) -> bool {
        let close = self.market_close + Duration::milliseconds(59_999);
        local >= self.market_open && local <= close
    }
}

// =============================================================================
// Directory
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ExchangeRecord {
    code: String,
    name: String,
    timezone: String,
    market_open: String,
    market_close: String,
}

impl TryFrom<ExchangeRecord> for ExchangeInfo {
    type Error = BridgeError;

    fn try_from(record: ExchangeRecord) -> Result<Self> {
        let timezone: Tz = record.timezone.parse().map_err(|_| {
            BridgeError::invalid_request(format!("Unknown time zone {}", record.timezone))
                .with_context("exchange", &record.code)
        })?;
        Ok(Self {
            market_open: parse_clock(&record.market_open, &record.code)?,
            market_close: parse_clock(&record.market_close, &record.code)?,
            code: record.code.to_uppercase(),
            name: record.name,
            timezone,
        })
    }
}

fn parse_clock(value: &str, code: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| {
            BridgeError::invalid_request(format!("Invalid market time {value}"))
                .with_context("exchange", code)
        })
}

const BUILTIN: &[(&str, &str, &str, &str, &str)] = &[
    ("LN", "London Stock Exchange", "Europe/London", "08:00", "16:30"),
    ("ID", "Euronext Dublin", "Europe/Dublin", "08:00", "16:30"),
    ("NA", "Euronext Amsterdam", "Europe/Amsterdam", "09:00", "17:30"),
    ("FP", "Euronext Paris", "Europe/Paris", "09:00", "17:30"),
    ("BB", "Euronext Brussels", "Europe/Brussels", "09:00", "17:30"),
    ("IM", "Borsa Italiana", "Europe/Rome", "09:00", "17:30"),
    ("GY", "Xetra", "Europe/Berlin", "09:00", "17:30"),
    ("GR", "Germany Composite", "Europe/Berlin", "09:00", "17:30"),
    ("SW", "SIX Swiss Exchange", "Europe/Zurich", "09:00", "17:30"),
    ("SE", "SIX Swiss Exchange", "Europe/Zurich", "09:00", "17:30"),
    ("SM", "Bolsa de Madrid", "Europe/Madrid", "09:00", "17:30"),
    ("SS", "Nasdaq Stockholm", "Europe/Stockholm", "09:00", "17:30"),
    ("US", "US Composite", "America/New_York", "09:30", "16:00"),
    ("UN", "New York Stock Exchange", "America/New_York", "09:30", "16:00"),
    ("UQ", "Nasdaq Global Select", "America/New_York", "09:30", "16:00"),
    ("UP", "NYSE Arca", "America/New_York", "09:30", "16:00"),
    ("CN", "Canada Composite", "America/Toronto", "09:30", "16:00"),
    ("CT", "Toronto Stock Exchange", "America/Toronto", "09:30", "16:00"),
    ("JP", "Japan Composite", "Asia/Tokyo", "09:00", "15:30"),
    ("JT", "Tokyo Stock Exchange", "Asia/Tokyo", "09:00", "15:30"),
    ("HK", "Hong Kong Stock Exchange", "Asia/Hong_Kong", "09:30", "16:00"),
    ("AU", "Australia Composite", "Australia/Sydney", "10:00", "16:00"),
    ("AT", "ASX", "Australia/Sydney", "10:00", "16:00"),
];

/// Exchange metadata keyed by vendor code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExchangeDirectory {
    exchanges: BTreeMap<String, ExchangeInfo>,
}

impl ExchangeDirectory {
    /// Empty directory.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Directory with the built-in exchange table.
    #[must_use]
    pub fn builtin() -> Self {
        let mut directory = Self::empty();
        for (code, name, timezone, open, close) in BUILTIN {
            let record = ExchangeRecord {
                code: (*code).to_string(),
                name: (*name).to_string(),
                timezone: (*timezone).to_string(),
                market_open: (*open).to_string(),
                market_close: (*close).to_string(),
            };
            match ExchangeInfo::try_from(record) {
                Ok(info) => directory.insert(info),
                Err(error) => tracing::error!(%error, code, "invalid built-in exchange"),
            }
        }
        directory
    }

    /// Parse a JSON array of exchange records.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` on malformed JSON, time zones or times.
    pub fn from_json(json: &str) -> Result<Self> {
        let records: Vec<ExchangeRecord> = serde_json::from_str(json).map_err(|e| {
            BridgeError::invalid_request(format!("Invalid exchange table: {e}"))
        })?;
        let mut directory = Self::empty();
        for record in records {
            directory.insert(ExchangeInfo::try_from(record)?);
        }
        Ok(directory)
    }

    /// Load a JSON exchange table from disk.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if the file cannot be read or parsed.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::invalid_request(format!("Cannot read exchange table: {e}"))
                .with_context("path", path.display().to_string())
        })?;
        Self::from_json(&json)
    }

    /// Add or replace an exchange.
    pub fn insert(&mut self, info: ExchangeInfo) {
        self.exchanges.insert(info.code.clone(), info);
    }

    /// Overlay another directory on this one.
    pub fn extend(&mut self, other: Self) {
        self.exchanges.extend(other.exchanges);
    }

    /// Exchange by code.
    #[must_use]
    pub fn get(&self, code: &str) -> Option<&ExchangeInfo> {
        self.exchanges.get(&code.to_uppercase())
    }

    /// Number of exchanges.
    #[must_use]
    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    /// Whether the directory is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    /// Exchange for a ticker (or bare code), without decomposition.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if no code can be derived and
    /// `ExchangeNotFound` if the code is unknown.
    pub fn lookup(&self, ticker: &str) -> Result<&ExchangeInfo> {
        let code = exchange_code(ticker).ok_or_else(|| {
            BridgeError::invalid_request(format!("Could not derive exchange from {ticker}"))
                .with_context("ticker", ticker)
        })?;
        self.get(&code).ok_or_else(|| {
            BridgeError::new(
                ErrorCode::ExchangeNotFound,
                format!("No exchange data found for {ticker}"),
            )
            .with_context("exchange", code)
        })
    }
}
