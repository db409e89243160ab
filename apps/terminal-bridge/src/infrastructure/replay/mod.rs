//! Scripted Session Adapter
//!
//! A [`SessionPort`] that answers requests from a responder closure or a
//! recorded JSON transcript instead of a live terminal. Events are queued in
//! memory; waiting on an empty queue yields a `Timeout` event immediately.
//!
//! # Transcript format
//!
//! ```json
//! { "exchanges": [ { "request": { "request": "excel_get_grid", "domain": "COMDTY:NGFLOW" },
//!                    "events": [ { "kind": "RESPONSE", "messages": [] } ] } ] }
//! ```

use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::application::ports::{Request, Service, SessionError, SessionPort};
use crate::domain::response::{CorrelationId, Event, EventKind};
use crate::error::{BridgeError, Result};

/// Produces the events answering a request.
pub type Responder = Box<dyn Fn(&Request, Option<&CorrelationId>) -> Vec<Event> + Send + Sync>;

/// One recorded request and the events that answered it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptedExchange {
    /// Request as sent.
    pub request: Request,
    /// Correlation id the request was sent with.
    #[serde(default)]
    pub correlation_id: Option<CorrelationId>,
    /// Events answering the request.
    pub events: Vec<Event>,
}

/// Recorded session traffic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    /// Exchanges in send order.
    pub exchanges: Vec<ScriptedExchange>,
}

impl Transcript {
    /// Parse a transcript from JSON.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| BridgeError::invalid_request(format!("Invalid transcript: {e}")))
    }

    /// Load a transcript from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if the file cannot be read or parsed.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::invalid_request(format!("Cannot read transcript: {e}"))
                .with_context("path", path.display().to_string())
        })?;
        Self::from_json(&json)
    }

    /// Serialize to pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| BridgeError::invalid_request(format!("Cannot serialize transcript: {e}")))
    }

    /// Events recorded for the first exchange matching `request`.
    fn answer(&self, request: &Request, correlation_id: Option<&CorrelationId>) -> Vec<Event> {
        self.exchanges
            .iter()
            .find(|e| e.request == *request && e.correlation_id.as_ref() == correlation_id)
            .or_else(|| self.exchanges.iter().find(|e| e.request == *request))
            .map(|e| e.events.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Default)]
struct State {
    queue: VecDeque<Event>,
    opened: Vec<Service>,
    recorded: Vec<ScriptedExchange>,
    stopped: bool,
}

/// In-memory [`SessionPort`] driven by a script.
pub struct ScriptedSession {
    state: Mutex<State>,
    responder: Responder,
    refuse_start: bool,
    refused_services: Vec<Service>,
}

impl Default for ScriptedSession {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ScriptedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedSession")
            .field("state", &*self.state.lock())
            .field("refuse_start", &self.refuse_start)
            .field("refused_services", &self.refused_services)
            .finish_non_exhaustive()
    }
}

impl ScriptedSession {
    /// Session answering every request with an empty `Response`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            responder: Box::new(|_, _| vec![Event::response(Vec::new())]),
            refuse_start: false,
            refused_services: Vec::new(),
        }
    }

    /// Session replaying a transcript. Unmatched requests get no events.
    #[must_use]
    pub fn from_transcript(transcript: Transcript) -> Self {
        Self::new().with_responder(move |request, cid| transcript.answer(request, cid))
    }

    /// Answer requests with `responder`.
    #[must_use]
    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&Request, Option<&CorrelationId>) -> Vec<Event> + Send + Sync + 'static,
    {
        self.responder = Box::new(responder);
        self
    }

    /// Refuse to start.
    #[must_use]
    pub fn refuse_start(mut self) -> Self {
        self.refuse_start = true;
        self
    }

    /// Refuse to open `service`.
    #[must_use]
    pub fn refuse_service(mut self, service: Service) -> Self {
        self.refused_services.push(service);
        self
    }

    /// Mark every service open, as for a session started elsewhere.
    #[must_use]
    pub fn already_started(self) -> Self {
        self.state.lock().opened = Service::ALL.to_vec();
        self
    }

    /// Queue an event.
    pub fn push_event(&self, event: Event) {
        self.state.lock().queue.push_back(event);
    }

    /// Requests sent so far, with their correlation ids.
    #[must_use]
    pub fn sent_requests(&self) -> Vec<(Request, Option<CorrelationId>)> {
        self.state
            .lock()
            .recorded
            .iter()
            .map(|e| (e.request.clone(), e.correlation_id.clone()))
            .collect()
    }

    /// Services opened so far.
    #[must_use]
    pub fn opened_services(&self) -> Vec<Service> {
        self.state.lock().opened.clone()
    }

    /// Whether `stop` was called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.state.lock().stopped
    }

    /// Traffic recorded so far, replayable with [`Self::from_transcript`].
    #[must_use]
    pub fn transcript(&self) -> Transcript {
        Transcript {
            exchanges: self.state.lock().recorded.clone(),
        }
    }
}

#[async_trait]
impl SessionPort for ScriptedSession {
    async fn start(&self) -> std::result::Result<bool, SessionError> {
        let mut state = self.state.lock();
        if self.refuse_start {
            state
                .queue
                .push_back(Event::status(EventKind::SessionStatus, "SessionStartupFailure"));
            return Ok(false);
        }
        state
            .queue
            .push_back(Event::status(EventKind::SessionStatus, "SessionConnectionUp"));
        state
            .queue
            .push_back(Event::status(EventKind::SessionStatus, "SessionStarted"));
        Ok(true)
    }

    async fn open_service(&self, service: Service) -> std::result::Result<bool, SessionError> {
        let mut state = self.state.lock();
        if state.stopped {
            return Err(SessionError::Stopped);
        }
        let opened = !self.refused_services.contains(&service);
        let status = if opened { "ServiceOpened" } else { "ServiceOpenFailure" };
        state
            .queue
            .push_back(Event::status(EventKind::ServiceStatus, status));
        if opened && !state.opened.contains(&service) {
            state.opened.push(service);
        }
        Ok(opened)
    }

    async fn send_request(
        &self,
        request: Request,
        correlation_id: Option<CorrelationId>,
    ) -> std::result::Result<(), SessionError> {
        let mut state = self.state.lock();
        if state.stopped {
            return Err(SessionError::Stopped);
        }
        if !state.opened.contains(&request.service()) {
            return Err(SessionError::ServiceNotOpen {
                service: request.service().uri().to_string(),
            });
        }

        let mut events = (self.responder)(&request, correlation_id.as_ref());
        if let Some(cid) = &correlation_id {
            for message in events.iter_mut().flat_map(|e| e.messages.iter_mut()) {
                if message.correlation_ids.is_empty() {
                    message.correlation_ids.push(cid.clone());
                }
            }
        }

        state.queue.extend(events.iter().cloned());
        state.recorded.push(ScriptedExchange {
            request,
            correlation_id,
            events,
        });
        Ok(())
    }

    async fn next_event(&self, _timeout: Duration) -> std::result::Result<Event, SessionError> {
        Ok(self.state.lock().queue.pop_front().unwrap_or_else(Event::timeout))
    }

    fn try_next_event(&self) -> Option<Event> {
        self.state.lock().queue.pop_front()
    }

    async fn stop(&self) -> std::result::Result<(), SessionError> {
        let mut state = self.state.lock();
        state.stopped = true;
        state.queue.clear();
        Ok(())
    }
}
