//! Client decorators composing the resilient request pipeline

mod metrics;
mod redirecting;
mod retryable;
mod sessioned;
mod split;

pub use self::metrics::{MetricsCollectingClient, MetricsCollectingFactory};
pub use redirecting::{RedirectingClient, RedirectingFactory};
pub use retryable::{RetryableClient, RetryableFactory};
pub use sessioned::SessionedClient;
pub use split::SplitClient;
