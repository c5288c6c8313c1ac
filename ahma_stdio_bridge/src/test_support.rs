//! Scripted in-memory upstream for unit tests.

use crate::error::UpstreamError;
use crate::protocol::{JsonRpcNotification, JsonRpcRequest, ResponseEnvelope};
use crate::session::SessionContext;
use crate::upstream::Upstream;
use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Reply = Result<ResponseEnvelope, UpstreamError>;
type Queued = (Option<Duration>, Reply);

/// Records every call and answers from per-method queues, falling back to a
/// per-method default and finally to an empty result.
pub(crate) struct ScriptedUpstream {
    context: Arc<SessionContext>,
    replies: Mutex<HashMap<String, VecDeque<Queued>>>,
    defaults: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<(String, Option<String>)>>,
    session_on_initialize: Mutex<Option<String>>,
    notification_error: Mutex<Option<UpstreamError>>,
    delays: Mutex<HashMap<String, Duration>>,
}

impl ScriptedUpstream {
    pub(crate) fn new(context: Arc<SessionContext>) -> Arc<Self> {
        Arc::new(Self {
            context,
            replies: Mutex::new(HashMap::new()),
            defaults: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            session_on_initialize: Mutex::new(None),
            notification_error: Mutex::new(None),
            delays: Mutex::new(HashMap::new()),
        })
    }

    /// Simulates the upstream advertising `token` on every initialize response.
    pub(crate) fn assign_session_on_initialize(self: Arc<Self>, token: &str) -> Arc<Self> {
        *self.session_on_initialize.lock().unwrap() = Some(token.to_string());
        self
    }

    /// Delays every call of `method` that has no queued reply of its own.
    pub(crate) fn with_delay(self: Arc<Self>, method: &str, delay: Duration) -> Arc<Self> {
        self.delays
            .lock()
            .unwrap()
            .insert(method.to_string(), delay);
        self
    }

    pub(crate) fn push_reply(&self, method: &str, reply: Reply) {
        self.enqueue(method, None, reply);
    }

    /// Queues a reply that is returned `delay` after the call arrives.
    pub(crate) fn push_delayed_reply(&self, method: &str, delay: Duration, reply: Reply) {
        self.enqueue(method, Some(delay), reply);
    }

    fn enqueue(&self, method: &str, delay: Option<Duration>, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .entry(method.to_string())
            .or_default()
            .push_back((delay, reply));
    }

    pub(crate) fn set_default(&self, method: &str, reply: Reply) {
        self.defaults
            .lock()
            .unwrap()
            .insert(method.to_string(), reply);
    }

    pub(crate) fn fail_notifications(&self, err: UpstreamError) {
        *self.notification_error.lock().unwrap() = Some(err);
    }

    pub(crate) fn methods(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(m, _)| m.clone())
            .collect()
    }

    /// Session token attached to each call, in call order.
    pub(crate) fn tokens_seen(&self) -> Vec<Option<String>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, t)| t.clone())
            .collect()
    }

    pub(crate) fn calls_with_tokens(&self) -> Vec<(String, Option<String>)> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .count()
    }

    fn record(&self, method: &str) {
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), self.context.token()));
    }

    fn method_delay(&self, method: &str) -> Option<Duration> {
        self.delays.lock().unwrap().get(method).copied()
    }

    fn next_reply(&self, method: &str) -> Queued {
        let queued = self
            .replies
            .lock()
            .unwrap()
            .get_mut(method)
            .and_then(VecDeque::pop_front);
        if let Some((delay, reply)) = queued {
            return (delay.or_else(|| self.method_delay(method)), reply);
        }
        let delay = self.method_delay(method);
        if let Some(reply) = self.defaults.lock().unwrap().get(method) {
            return (delay, reply.clone());
        }
        if method == "initialize" {
            let result = json!({
                "protocolVersion": crate::protocol::PROTOCOL_VERSION,
                "capabilities": {},
                "serverInfo": {"name": "scripted", "version": "0"}
            });
            return (delay, Ok(ResponseEnvelope::Result(result)));
        }
        (delay, Ok(ResponseEnvelope::Result(json!({}))))
    }
}

#[async_trait]
impl Upstream for ScriptedUpstream {
    async fn send(&self, request: &JsonRpcRequest) -> Result<ResponseEnvelope, UpstreamError> {
        self.record(&request.method);
        let (delay, reply) = self.next_reply(&request.method);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if request.method == "initialize" {
            let token = self.session_on_initialize.lock().unwrap().clone();
            if let Some(token) = token {
                self.context.observe_token(&token).await;
            }
        }
        reply
    }

    async fn notify(&self, notification: &JsonRpcNotification) -> Result<(), UpstreamError> {
        self.record(&notification.method);
        if let Some(delay) = self.method_delay(&notification.method) {
            tokio::time::sleep(delay).await;
        }
        match self.notification_error.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
