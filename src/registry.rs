//! Registry client for rebuilt-artifact discovery
//!
//! Authenticated tag listing against a container registry. One client
//! instance owns one transport and one shared token slot; the token is
//! fetched once per invalidation cycle no matter how many requests race
//! for it, and a stale token is refreshed with a single bounded retry.

use crate::config::RegistryConfig;
use crate::error::{CacheError, CacheResult};
use serde::Deserialize;
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::time::Duration;
use tracing::{debug, warn};
use ureq::Agent;

/// Raw response from the registry transport
pub struct WireResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Transport seam between the auth client and the wire
///
/// The production implementation is [`UreqTransport`]; tests substitute
/// a scripted fake.
pub trait RegistryTransport: Send + Sync {
    /// Exchange a basic credential for a pull token
    fn fetch_token(&self, basic_credential: &str) -> CacheResult<WireResponse>;

    /// List repository tags, attaching the bearer token when present
    fn get_tags(&self, bearer: Option<&str>) -> CacheResult<WireResponse>;
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Deserialize)]
struct DiscoveryResponse {
    #[serde(default)]
    tags: Vec<String>,
}

/// Outcome one authentication round trip publishes to every caller that
/// joined it
type FlightOutcome = Result<Option<Arc<str>>, Arc<str>>;

/// A single in-flight authentication call
struct AuthFlight {
    outcome: Mutex<Option<FlightOutcome>>,
    done: Condvar,
}

impl AuthFlight {
    fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    fn publish(&self, outcome: FlightOutcome) {
        let mut slot = self.outcome.lock().expect("auth flight lock poisoned");
        *slot = Some(outcome);
        self.done.notify_all();
    }

    fn wait(&self) -> FlightOutcome {
        let mut slot = self.outcome.lock().expect("auth flight lock poisoned");
        while slot.is_none() {
            slot = self.done.wait(slot).expect("auth flight lock poisoned");
        }
        slot.clone().expect("outcome present after wait")
    }
}

/// Shared bearer-token slot with single-flight refresh
///
/// Reads of a present token take only the read half of the lock; the
/// absent-to-present transition funnels every caller through one
/// network round trip.
struct TokenSlot {
    token: RwLock<Option<Arc<str>>>,
    flight: Mutex<Option<Arc<AuthFlight>>>,
}

impl TokenSlot {
    fn new() -> Self {
        Self {
            token: RwLock::new(None),
            flight: Mutex::new(None),
        }
    }

    fn snapshot(&self) -> Option<Arc<str>> {
        self.token.read().expect("token lock poisoned").clone()
    }

    fn store(&self, token: Option<Arc<str>>) {
        *self.token.write().expect("token lock poisoned") = token;
    }

    /// Clear the cached token so the next caller re-authenticates
    fn invalidate(&self) {
        self.store(None);
    }

    /// Join the in-flight authentication if there is one, else lead a
    /// new flight
    fn join_or_lead(&self) -> (Arc<AuthFlight>, bool) {
        let mut flight = self.flight.lock().expect("flight lock poisoned");
        match flight.as_ref() {
            Some(existing) => (existing.clone(), false),
            None => {
                let fresh = Arc::new(AuthFlight::new());
                *flight = Some(fresh.clone());
                (fresh, true)
            }
        }
    }

    fn finish_flight(&self) {
        *self.flight.lock().expect("flight lock poisoned") = None;
    }
}

/// Registry client: token caching, single-flight auth, bounded retry
pub struct RegistryClient<T: RegistryTransport> {
    transport: T,
    basic_credential: Option<String>,
    slot: TokenSlot,
}

impl RegistryClient<UreqTransport> {
    /// Build a client over the blocking HTTP transport
    pub fn from_config(config: &RegistryConfig) -> Self {
        Self::new(UreqTransport::new(config), config.credential.clone())
    }
}

impl<T: RegistryTransport> RegistryClient<T> {
    pub fn new(transport: T, basic_credential: Option<String>) -> Self {
        Self {
            transport,
            basic_credential,
            slot: TokenSlot::new(),
        }
    }

    /// List the repository's tags
    ///
    /// A 401 on the first attempt invalidates the cached token and
    /// retries exactly once with a fresh one; a second 401 is terminal.
    pub fn list_tags(&self) -> CacheResult<Vec<String>> {
        self.list_tags_inner(false)
    }

    fn list_tags_inner(&self, retried: bool) -> CacheResult<Vec<String>> {
        let mut token = self.slot.snapshot();
        if token.is_none() {
            token = self.authenticate()?;
        }

        let response = self.transport.get_tags(token.as_deref())?;
        match response.status {
            200 => {
                let parsed: DiscoveryResponse = serde_json::from_slice(&response.body)?;
                Ok(parsed.tags)
            }
            401 if !retried && token.is_some() => {
                // token may have expired
                debug!("Registry returned 401, refreshing pull token");
                self.slot.invalidate();
                self.authenticate()?;
                self.list_tags_inner(true)
            }
            401 => Err(CacheError::AuthenticationFailed(
                String::from_utf8_lossy(&response.body).into_owned(),
            )),
            status => Err(CacheError::Protocol {
                status,
                body: String::from_utf8_lossy(&response.body).into_owned(),
            }),
        }
    }

    /// Obtain a pull token, sharing one network round trip among
    /// concurrent callers
    ///
    /// With no credential configured this is a no-op and the registry
    /// is used anonymously. A failing round trip surfaces the same
    /// failure to every caller that joined it.
    fn authenticate(&self) -> CacheResult<Option<Arc<str>>> {
        let credential = match &self.basic_credential {
            Some(credential) => credential,
            None => return Ok(None),
        };

        let (flight, leader) = self.slot.join_or_lead();
        if !leader {
            return flight
                .wait()
                .map_err(|msg| CacheError::AuthenticationFailed(msg.to_string()));
        }

        // a flight that finished between our snapshot and taking the
        // lead may already have stored a token; reuse it
        if let Some(token) = self.slot.snapshot() {
            flight.publish(Ok(Some(token.clone())));
            self.slot.finish_flight();
            return Ok(Some(token));
        }

        let outcome = self.fetch_token_outcome(credential);
        match &outcome {
            Ok(token) => self.slot.store(token.clone()),
            Err(msg) => {
                warn!("Registry authentication failed: {}", msg);
                self.slot.invalidate();
            }
        }
        flight.publish(outcome.clone());
        self.slot.finish_flight();
        outcome.map_err(|msg| CacheError::AuthenticationFailed(msg.to_string()))
    }

    fn fetch_token_outcome(&self, credential: &str) -> FlightOutcome {
        let response = match self.transport.fetch_token(credential) {
            Ok(response) => response,
            Err(e) => return Err(Arc::from(e.to_string())),
        };
        if response.status != 200 {
            return Err(Arc::from(format!(
                "Invalid response code {} {}",
                response.status,
                String::from_utf8_lossy(&response.body)
            )));
        }
        match serde_json::from_slice::<TokenResponse>(&response.body) {
            Ok(parsed) => Ok(Some(Arc::from(parsed.token))),
            Err(e) => Err(Arc::from(format!("Malformed token response: {}", e))),
        }
    }
}

/// Blocking HTTP transport over one owned agent
///
/// The agent's connection pool is released when the client is dropped.
pub struct UreqTransport {
    agent: Agent,
    host: String,
    repository: String,
    allow_insecure: bool,
}

impl UreqTransport {
    pub fn new(config: &RegistryConfig) -> Self {
        let agent_config = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(Duration::from_secs(30)))
            .build();
        Self {
            agent: Agent::new_with_config(agent_config),
            host: config.host.clone(),
            repository: config.repository.clone(),
            allow_insecure: config.insecure,
        }
    }

    fn scheme(&self) -> &'static str {
        if self.allow_insecure {
            "http"
        } else {
            "https"
        }
    }

    fn execute(&self, url: &str, authorization: Option<String>) -> CacheResult<WireResponse> {
        let mut request = self.agent.get(url);
        if let Some(value) = authorization {
            request = request.header("Authorization", &value);
        }
        let mut response = request
            .call()
            .map_err(|e| CacheError::backend(format!("registry request {}: {}", url, e)))?;
        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .read_to_vec()
            .map_err(|e| CacheError::backend(format!("reading registry response: {}", e)))?;
        Ok(WireResponse { status, body })
    }
}

impl RegistryTransport for UreqTransport {
    fn fetch_token(&self, basic_credential: &str) -> CacheResult<WireResponse> {
        let url = format!(
            "{}://{}/v2/auth?service={}&scope=repository:{}:pull",
            self.scheme(),
            self.host,
            self.host,
            self.repository
        );
        self.execute(&url, Some(format!("Basic {}", basic_credential)))
    }

    fn get_tags(&self, bearer: Option<&str>) -> CacheResult<WireResponse> {
        let url = format!(
            "{}://{}/v2/{}/tags/list",
            self.scheme(),
            self.host,
            self.repository
        );
        self.execute(&url, bearer.map(|token| format!("Bearer {}", token)))
    }
}
