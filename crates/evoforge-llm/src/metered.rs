use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::debug;

use evoforge_budget::BudgetManager;
use evoforge_core::error::Result;
use evoforge_core::traits::ModelClient;
use evoforge_core::types::{ModelRequest, ModelResponse};

/// Charges every completed call to the request's budget token.
///
/// Calls on an exhausted token are refused before they start. A call that
/// pushes its token over the limit is still billed, and the budget error is
/// returned in place of the response.
pub struct MeteredClient {
    inner: Arc<dyn ModelClient>,
    budget: Arc<BudgetManager>,
}

impl MeteredClient {
    pub fn new(inner: Arc<dyn ModelClient>, budget: Arc<BudgetManager>) -> Self {
        Self { inner, budget }
    }
}

impl ModelClient for MeteredClient {
    fn complete(&self, request: ModelRequest) -> BoxFuture<'_, Result<ModelResponse>> {
        Box::pin(async move {
            let token = request.token;
            self.budget.check(token)?;
            let response = self.inner.complete(request).await?;
            debug!(token = %token, cost = response.cost, "Model call billed");
            self.budget.record_spend(token, response.cost)?;
            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use evoforge_core::error::ForgeError;
    use evoforge_core::types::BudgetScope;

    use super::*;

    struct Priced(f64);

    impl ModelClient for Priced {
        fn complete(&self, _request: ModelRequest) -> BoxFuture<'_, Result<ModelResponse>> {
            let cost = self.0;
            Box::pin(async move {
                Ok(ModelResponse {
                    cost,
                    ..ModelResponse::text("answer")
                })
            })
        }
    }

    #[tokio::test]
    async fn bills_and_then_refuses_exhausted_token() {
        let budget = Arc::new(BudgetManager::new());
        let master = budget.acquire_master(1.0).unwrap();
        let child = budget.issue_child(0.25, master).unwrap();
        let client = MeteredClient::new(Arc::new(Priced(0.1)), budget.clone());

        client.complete(ModelRequest::new(child, vec![])).await.unwrap();
        client.complete(ModelRequest::new(child, vec![])).await.unwrap();
        let err = client
            .complete(ModelRequest::new(child, vec![]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ForgeError::BudgetExceeded {
                scope: BudgetScope::Child,
                ..
            }
        ));
        assert!((budget.spend(child).unwrap() - 0.3).abs() < 1e-9);

        let refused = client
            .complete(ModelRequest::new(child, vec![]))
            .await
            .unwrap_err();
        assert!(refused.is_budget_exceeded());
        assert!((budget.master_spend() - 0.3).abs() < 1e-9);
    }
}
