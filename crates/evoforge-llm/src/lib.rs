pub mod gate;
pub mod metered;
pub mod retry;

use std::sync::Arc;

use evoforge_budget::BudgetManager;
use evoforge_core::config::ForgeConfig;
use evoforge_core::traits::ModelClient;

pub use gate::{CallGate, GatedClient};
pub use metered::MeteredClient;
pub use retry::RetryingClient;

/// Wrap a raw provider client in the standard call stack.
///
/// Outermost first: budget metering, retry with backoff, then the shared
/// admission gate, so every retry attempt is admitted and the final
/// response is billed once.
pub fn build_client(
    raw: Arc<dyn ModelClient>,
    budget: Arc<BudgetManager>,
    gate: Arc<CallGate>,
    config: &ForgeConfig,
) -> Arc<dyn ModelClient> {
    let gated: Arc<dyn ModelClient> = Arc::new(GatedClient::new(raw, gate));
    let retrying: Arc<dyn ModelClient> = Arc::new(RetryingClient::new(gated, config.retry.clone()));
    Arc::new(MeteredClient::new(retrying, budget))
}
