use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Default, Deserialize, Clone)]
pub struct PricingConfig {
    #[serde(default)]
    pub openai: HashMap<String, PricingEntry>,
    #[serde(default)]
    pub zhipuai: HashMap<String, PricingEntry>,
    #[serde(default)]
    pub deepseek: HashMap<String, PricingEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PricingEntry {
    pub prompt_per_1k: Option<f64>,
    pub completion_per_1k: Option<f64>,
    pub prompt_per_1m: Option<f64>,
    pub completion_per_1m: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
pub struct PricingRate {
    pub prompt_per_1k: f64,
    pub completion_per_1k: f64,
}

impl PricingConfig {
    pub fn lookup(&self, provider: &str, model: &str) -> Option<PricingRate> {
        let map = match provider {
            "openai" => &self.openai,
            "zhipuai" => &self.zhipuai,
            "deepseek" => &self.deepseek,
            _ => return None,
        };
        map.get(model)
            .or_else(|| map.get(&model.to_lowercase()))
            .and_then(|entry| entry.normalized())
    }
}

impl PricingEntry {
    pub fn normalized(&self) -> Option<PricingRate> {
        let prompt = self
            .prompt_per_1k
            .or_else(|| self.prompt_per_1m.map(|value| value / 1000.0));
        let completion = self
            .completion_per_1k
            .or_else(|| self.completion_per_1m.map(|value| value / 1000.0));
        if prompt.is_none() && completion.is_none() {
            return None;
        }
        Some(PricingRate {
            prompt_per_1k: prompt.unwrap_or(0.0),
            completion_per_1k: completion.unwrap_or(0.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_normalizes_per_million_rates() {
        let mut config = PricingConfig::default();
        config.openai.insert(
            "gpt-3.5-turbo".to_string(),
            PricingEntry {
                prompt_per_1m: Some(500.0),
                completion_per_1m: Some(1500.0),
                ..Default::default()
            },
        );
        let rate = config.lookup("openai", "gpt-3.5-turbo").unwrap();
        assert_eq!(rate.prompt_per_1k, 0.5);
        assert_eq!(rate.completion_per_1k, 1.5);
    }

    #[test]
    fn lookup_misses_unknown_provider_and_empty_entry() {
        let mut config = PricingConfig::default();
        config
            .zhipuai
            .insert("glm-4".to_string(), PricingEntry::default());
        assert!(config.lookup("anthropic", "claude").is_none());
        assert!(config.lookup("zhipuai", "glm-4").is_none());
    }
}
