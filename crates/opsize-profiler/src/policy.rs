//! Failure policy: what happens after an operator fails.

use std::sync::Arc;

use opsize_common::config::FailurePolicy;

use crate::execution::OperatorExecution;

/// Continue-or-stop decision after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Run the next operator.
    Continue,
    /// Skip every remaining operator.
    Stop,
}

/// Source of decisions for the interactive `none` policy.
///
/// Called on a blocking thread; may block on user input.
pub trait DecisionPrompt: Send + Sync {
    /// Asks whether to continue after `failed`. `None` means no answer.
    fn decide(&self, failed: &OperatorExecution) -> Option<Decision>;
}

/// Applies the run's failure policy to each failed operator.
#[derive(Clone)]
pub struct FailurePolicyEngine {
    policy: FailurePolicy,
    prompt: Option<Arc<dyn DecisionPrompt>>,
}

impl std::fmt::Debug for FailurePolicyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailurePolicyEngine")
            .field("policy", &self.policy)
            .field("prompt", &self.prompt.is_some())
            .finish()
    }
}

impl FailurePolicyEngine {
    /// Creates an engine for `policy`; `prompt` is only consulted under `none`.
    #[must_use]
    pub fn new(policy: FailurePolicy, prompt: Option<Arc<dyn DecisionPrompt>>) -> Self {
        Self { policy, prompt }
    }

    /// Returns the configured policy.
    #[must_use]
    pub const fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Decides what to do after `failed`.
    pub async fn on_failure(&self, failed: &OperatorExecution) -> Decision {
        let decision = match self.policy {
            FailurePolicy::Cont => Decision::Continue,
            FailurePolicy::Stop => Decision::Stop,
            FailurePolicy::None => self.ask(failed).await,
        };
        tracing::info!(
            operator = %failed.operator,
            policy = %self.policy,
            ?decision,
            "failure policy applied"
        );
        decision
    }

    async fn ask(&self, failed: &OperatorExecution) -> Decision {
        let Some(prompt) = self.prompt.clone() else {
            tracing::warn!(operator = %failed.operator, "no decision source, stopping");
            return Decision::Stop;
        };
        let failed = failed.clone();
        match tokio::task::spawn_blocking(move || prompt.decide(&failed)).await {
            Ok(Some(decision)) => decision,
            Ok(None) => Decision::Stop,
            Err(e) => {
                tracing::warn!(error = %e, "decision prompt failed, stopping");
                Decision::Stop
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Option<Decision>);

    impl DecisionPrompt for Fixed {
        fn decide(&self, _failed: &OperatorExecution) -> Option<Decision> {
            self.0
        }
    }

    fn failed() -> OperatorExecution {
        let mut e = OperatorExecution::begin("inference");
        e.record_exit(137);
        e
    }

    #[tokio::test]
    async fn fixed_policies_ignore_prompt() {
        let prompt: Arc<dyn DecisionPrompt> = Arc::new(Fixed(Some(Decision::Stop)));
        let cont = FailurePolicyEngine::new(FailurePolicy::Cont, Some(Arc::clone(&prompt)));
        assert_eq!(cont.on_failure(&failed()).await, Decision::Continue);
        let stop = FailurePolicyEngine::new(FailurePolicy::Stop, None);
        assert_eq!(stop.on_failure(&failed()).await, Decision::Stop);
    }

    #[tokio::test]
    async fn none_policy_asks_prompt() {
        let engine = FailurePolicyEngine::new(
            FailurePolicy::None,
            Some(Arc::new(Fixed(Some(Decision::Continue)))),
        );
        assert_eq!(engine.on_failure(&failed()).await, Decision::Continue);
    }

    #[tokio::test]
    async fn missing_decision_stops() {
        let silent = FailurePolicyEngine::new(FailurePolicy::None, Some(Arc::new(Fixed(None))));
        assert_eq!(silent.on_failure(&failed()).await, Decision::Stop);
        let no_prompt = FailurePolicyEngine::new(FailurePolicy::None, None);
        assert_eq!(no_prompt.on_failure(&failed()).await, Decision::Stop);
    }
}
