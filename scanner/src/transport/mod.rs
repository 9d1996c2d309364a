//! Transport collaborator
//!
//! One request/response exchange per observation. The uplink's delivery
//! worker is the only caller.

use std::future::Future;

use crate::{error::DeliveryError, model::Observation};

mod http;
mod in_memory;

pub use http::HttpTransport;
pub use in_memory::InMemoryTransport;

pub trait Transport: Send + Sync + 'static {
    /// Deliver one observation; `Ok` only on an application-level success
    fn deliver(
        &self,
        observation: &Observation,
    ) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}
