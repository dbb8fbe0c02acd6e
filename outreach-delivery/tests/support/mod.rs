//! Recording delivery client and fixtures for dispatcher tests
#![allow(dead_code)] // Not every helper is used by every test binary

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use outreach_delivery::{
    DeliveryClient, Dispatcher, DispatcherConfig, JobQueue, OutboundEmail, SendError,
    SuppressionRegistry,
};
use outreach_store::{JobStore, NewLineItem};
use parking_lot::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct Call {
    pub to: String,
    pub at: Instant,
}

/// Delivery client that records every call and fails on demand
#[derive(Debug, Default)]
pub struct RecordingClient {
    calls: Mutex<Vec<Call>>,
    failures: Mutex<HashMap<String, SendError>>,
    limited_failures: Mutex<HashMap<String, (usize, SendError)>>,
    delay: Mutex<Option<Duration>>,
}

impl RecordingClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every send to `to` fails with `error`
    pub fn fail_for(&self, to: &str, error: SendError) {
        self.failures.lock().insert(to.to_string(), error);
    }

    /// The next `times` sends to `to` fail with `error`, later ones succeed
    pub fn fail_times(&self, to: &str, times: usize, error: SendError) {
        self.limited_failures
            .lock()
            .insert(to.to_string(), (times, error));
    }

    /// Every send takes `delay` before answering
    pub fn delay_by(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn recipients(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.to.clone()).collect()
    }
}

#[async_trait]
impl DeliveryClient for RecordingClient {
    async fn send(&self, message: &OutboundEmail) -> Result<(), SendError> {
        self.calls.lock().push(Call {
            to: message.to.clone(),
            at: Instant::now(),
        });

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some((remaining, error)) = self.limited_failures.lock().get_mut(&message.to)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(error.clone());
        }

        let failure = self.failures.lock().get(&message.to).cloned();
        failure.map_or(Ok(()), Err)
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

pub fn items(emails: &[&str]) -> Vec<NewLineItem> {
    emails
        .iter()
        .map(|email| NewLineItem {
            recipient_email: (*email).to_string(),
            rendered_subject: "Funding options tailored for your business".to_string(),
            rendered_body: format!("<p>Hello {email}</p>"),
        })
        .collect()
}

pub struct Harness {
    pub queue: JobQueue,
    pub suppression: SuppressionRegistry,
    pub client: Arc<RecordingClient>,
    pub dispatcher: Arc<Dispatcher>,
}

impl Harness {
    pub fn new(mps_limit: u32, window_secs: u64) -> Self {
        Self::with_config(DispatcherConfig {
            mps_limit,
            window_secs,
            ..DispatcherConfig::default()
        })
    }

    pub fn with_config(config: DispatcherConfig) -> Self {
        let queue = JobQueue::new(JobStore::new());
        let suppression = SuppressionRegistry::default();
        let client = RecordingClient::new();
        let dispatcher = Dispatcher::new(
            config,
            queue.clone(),
            suppression.clone(),
            client.clone(),
        )
        .expect("valid dispatcher config");

        Self {
            queue,
            suppression,
            client,
            dispatcher: Arc::new(dispatcher),
        }
    }

    pub fn store(&self) -> &JobStore {
        self.queue.store()
    }
}
