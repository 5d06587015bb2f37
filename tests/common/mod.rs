//! Shared fixtures for shopbell integration tests.
//!
//! Wiremock responders that record or script endpoint behaviour, plus
//! helpers for building a service over an in-memory store.

#![allow(dead_code, clippy::expect_used, clippy::unwrap_used, missing_docs)]

use shopbell::storage::SqliteWebhookStore;
use shopbell::webhooks::{RetryPolicy, WebhookService};
use shopbell::{NewSubscription, Subscription, SubscriptionStore};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use wiremock::{Request, Respond, ResponseTemplate};

pub const TENANT_A: &str = "shop-a";
pub const TENANT_B: &str = "shop-b";
pub const SECRET: &str = "whsec_shopbell_test_secret";

/// Base delay used by tests so retry loops stay fast.
pub const TEST_BASE_DELAY: Duration = Duration::from_millis(20);

// ---------------------------------------------------------------------------
// CaptureResponder
// ---------------------------------------------------------------------------

/// A captured request body with its headers.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub body: Vec<u8>,
    pub headers: HashMap<String, String>,
}

impl CapturedRequest {
    /// Header value by name, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("request body is JSON")
    }
}

/// Records every request and answers with a fixed status.
#[derive(Clone)]
pub struct CaptureResponder {
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    status: u16,
}

impl CaptureResponder {
    pub fn with_status(status: u16) -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            status,
        }
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Respond for CaptureResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let captured = CapturedRequest {
            body: request.body.clone(),
            headers: request
                .headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
                .collect(),
        };
        self.requests.lock().unwrap().push(captured);
        ResponseTemplate::new(self.status)
    }
}

// ---------------------------------------------------------------------------
// SequenceResponder
// ---------------------------------------------------------------------------

/// Answers with the given statuses in order, repeating the last one, and
/// records when each request arrived.
#[derive(Clone)]
pub struct SequenceResponder {
    statuses: Arc<Vec<u16>>,
    calls: Arc<AtomicUsize>,
    arrivals: Arc<Mutex<Vec<Instant>>>,
}

impl SequenceResponder {
    pub fn new(statuses: &[u16]) -> Self {
        assert!(!statuses.is_empty(), "at least one status");
        Self {
            statuses: Arc::new(statuses.to_vec()),
            calls: Arc::new(AtomicUsize::new(0)),
            arrivals: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Time between consecutive requests.
    pub fn gaps(&self) -> Vec<Duration> {
        self.arrivals
            .lock()
            .unwrap()
            .windows(2)
            .map(|w| w[1].duration_since(w[0]))
            .collect()
    }
}

impl Respond for SequenceResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.arrivals.lock().unwrap().push(Instant::now());
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let status = self.statuses[n.min(self.statuses.len() - 1)];
        ResponseTemplate::new(status).set_body_string(format!("call {}", n + 1))
    }
}

// ---------------------------------------------------------------------------
// Service helpers
// ---------------------------------------------------------------------------

pub fn test_policy() -> RetryPolicy {
    RetryPolicy::default()
        .with_base_delay(TEST_BASE_DELAY)
        .with_timeout(Duration::from_secs(2))
}

/// Builds a service over a fresh in-memory store, returning both.
pub fn service() -> (WebhookService, Arc<SqliteWebhookStore>) {
    service_with_policy(test_policy())
}

pub fn service_with_policy(policy: RetryPolicy) -> (WebhookService, Arc<SqliteWebhookStore>) {
    let store = Arc::new(SqliteWebhookStore::in_memory().expect("in-memory store"));
    let service = WebhookService::new(store.clone(), store.clone(), policy).expect("service");
    (service, store)
}

pub fn subscribe(
    store: &SqliteWebhookStore,
    tenant: &str,
    url: impl Into<String>,
    events: &[&str],
) -> Subscription {
    store
        .insert_subscription(NewSubscription::new(
            tenant,
            url,
            SECRET,
            events.iter().copied(),
        ))
        .expect("insert subscription")
}
