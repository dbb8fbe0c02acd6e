//! Dispatch of prepared outreach batches
//!
//! - [`JobQueue`]: prepare batches and submit or cancel jobs
//! - [`Dispatcher`]: drains queued jobs one at a time through a
//!   [`DeliveryClient`], honouring the [`SuppressionRegistry`] and the
//!   process-wide [`RateLimiter`]
//! - [`StatusProjection`]: masked, read-only views of job progress

pub mod client;
pub mod dispatcher;
pub mod error;
pub mod queue;
pub mod rate_limiter;
pub mod redact;
pub mod retry;
pub mod service;
pub mod suppression;

pub use client::{DeliveryClient, DeliveryConfig, LogClient, OutboundEmail, SendError, SendGridClient};
pub use dispatcher::{Dispatcher, DispatcherConfig, JobOutcome};
pub use error::DispatchError;
pub use queue::JobQueue;
pub use rate_limiter::{RateLimitStats, RateLimiter};
pub use redact::{MaskingRedactor, Redactor, mask_email};
pub use retry::RetryPolicy;
pub use service::{
    JobQueryService, JobStatusView, PreviewItem, Progress, RecipientView, StatusProjection,
    Visibility,
};
pub use suppression::{SuppressionConfig, SuppressionRegistry};
