//! When the brain's decision ends the session.

use citycode_config::BrainConfig;

/// Case-insensitive keyword match against the brain's decision text.
#[derive(Debug, Clone)]
pub struct StopPolicy {
    keywords: Vec<String>,
}

impl StopPolicy {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &BrainConfig) -> Self {
        Self::new(&config.stop_keywords)
    }

    /// The first keyword found in `decision`, if any.
    pub fn matched(&self, decision: &str) -> Option<&str> {
        let lowered = decision.to_lowercase();
        self.keywords
            .iter()
            .find(|k| lowered.contains(k.as_str()))
            .map(String::as_str)
    }

    pub fn should_stop(&self, decision: &str) -> bool {
        self.matched(decision).is_some()
    }
}

impl Default for StopPolicy {
    fn default() -> Self {
        Self::from_config(&BrainConfig::default())
    }
}
