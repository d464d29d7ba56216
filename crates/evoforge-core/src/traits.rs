use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::{ModelRequest, ModelResponse};

/// Language-model client. Transport and pricing live behind this seam.
pub trait ModelClient: Send + Sync + 'static {
    /// Send a completion request and return the provider's response,
    /// including the cost charged for it.
    fn complete(&self, request: ModelRequest) -> BoxFuture<'_, Result<ModelResponse>>;
}

impl<T: ModelClient + ?Sized> ModelClient for std::sync::Arc<T> {
    fn complete(&self, request: ModelRequest) -> BoxFuture<'_, Result<ModelResponse>> {
        (**self).complete(request)
    }
}
