use serde::Serialize;

use emoji_llm::LlmResponse;

use crate::pricing::PricingRate;

/// Accounting snapshot for one execution; immutable once finalized.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TokenUsage {
    pub model: String,
    pub total_tokens: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub embedding_tokens: u64,
    pub successful_requests: u64,
    pub total_cost: f64,
}

/// Request-scoped accumulator, alive only for the duration of the generation
/// call; `finalize` freezes it into a `TokenUsage` and consumes it.
#[derive(Debug, Default)]
pub struct UsageAccumulator {
    prompt_tokens: u64,
    completion_tokens: u64,
    successful_requests: u64,
    total_cost: f64,
}

impl UsageAccumulator {
    pub fn record(&mut self, response: &LlmResponse, rate: Option<PricingRate>) {
        self.prompt_tokens += response.prompt_tokens as u64;
        self.completion_tokens += response.completion_tokens as u64;
        self.successful_requests += 1;
        if let Some(rate) = rate {
            self.total_cost += response.prompt_tokens as f64 / 1000.0 * rate.prompt_per_1k
                + response.completion_tokens as f64 / 1000.0 * rate.completion_per_1k;
        }
    }

    /// `embedding_tokens` is the retrieval-stage running total; only
    /// `1/embedding_weight` of it counts toward the grand total.
    pub fn finalize(self, model: &str, embedding_tokens: u64, embedding_weight: u64) -> TokenUsage {
        let discounted = embedding_tokens / embedding_weight.max(1);
        TokenUsage {
            model: model.to_string(),
            total_tokens: self.prompt_tokens + self.completion_tokens + discounted,
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
            embedding_tokens,
            successful_requests: self.successful_requests,
            total_cost: self.total_cost,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(prompt_tokens: u32, completion_tokens: u32) -> LlmResponse {
        LlmResponse {
            content: "{}".to_string(),
            prompt_tokens,
            completion_tokens,
        }
    }

    #[test]
    fn total_folds_embedding_tokens_at_the_configured_weight() {
        let mut accumulator = UsageAccumulator::default();
        accumulator.record(&response(120, 30), None);
        let usage = accumulator.finalize("openai", 57, 10);
        assert_eq!(usage.prompt_tokens, 120);
        assert_eq!(usage.completion_tokens, 30);
        assert_eq!(usage.embedding_tokens, 57);
        assert_eq!(usage.total_tokens, 120 + 30 + 5);
        assert_eq!(usage.successful_requests, 1);
        assert_eq!(usage.model, "openai");
    }

    #[test]
    fn embedding_division_truncates() {
        let usage = UsageAccumulator::default().finalize("zhipuai", 9, 10);
        assert_eq!(usage.embedding_tokens, 9);
        assert_eq!(usage.total_tokens, 0);
    }

    #[test]
    fn cost_uses_per_1k_rates() {
        let mut accumulator = UsageAccumulator::default();
        accumulator.record(
            &response(2000, 1000),
            Some(PricingRate {
                prompt_per_1k: 0.5,
                completion_per_1k: 1.5,
            }),
        );
        let usage = accumulator.finalize("openai", 0, 10);
        assert!((usage.total_cost - 2.5).abs() < 1e-9);
    }

    #[test]
    fn missing_rate_accumulates_zero_cost() {
        let mut accumulator = UsageAccumulator::default();
        accumulator.record(&response(100, 100), None);
        let usage = accumulator.finalize("deepseek", 0, 10);
        assert_eq!(usage.total_cost, 0.0);
        assert_eq!(usage.successful_requests, 1);
    }
}
