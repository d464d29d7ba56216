use evoforge_core::error::Result;

/// Typed result of a generation task. Budget exhaustion is a normal stop,
/// not a failure.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome<T> {
    Ok(T),
    BudgetExhausted,
    Failed(String),
}

impl<T> TaskOutcome<T> {
    pub fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(value) => TaskOutcome::Ok(value),
            Err(e) if e.is_budget_exceeded() => TaskOutcome::BudgetExhausted,
            Err(e) => TaskOutcome::Failed(e.to_string()),
        }
    }

    pub fn ok(self) -> Option<T> {
        match self {
            TaskOutcome::Ok(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, TaskOutcome::Ok(_))
    }
}

#[cfg(test)]
mod tests {
    use evoforge_core::error::ForgeError;
    use evoforge_core::types::BudgetScope;

    use super::*;

    #[test]
    fn budget_errors_become_exhaustion() {
        let outcome: TaskOutcome<()> = TaskOutcome::from_result(Err(ForgeError::BudgetExceeded {
            scope: BudgetScope::Master,
            limit: 1.0,
            total: 1.2,
        }));
        assert_eq!(outcome, TaskOutcome::BudgetExhausted);

        let outcome: TaskOutcome<()> =
            TaskOutcome::from_result(Err(ForgeError::Evaluation("boom".into())));
        assert_eq!(
            outcome,
            TaskOutcome::Failed("Fitness evaluation failed: boom".into())
        );
        assert_eq!(TaskOutcome::from_result(Ok(3)).ok(), Some(3));
    }
}
