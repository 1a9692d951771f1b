use crate::core::config::data::Config;
use crate::core::config::io::ConfigError;

impl Config {
    /// Applies `OPENAI_*` and `NSO_*` overrides. `lookup` is the environment
    /// accessor so callers and tests can supply their own.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(key) = non_empty("OPENAI_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(base_url) = non_empty("OPENAI_BASE_URL") {
            self.llm.base_url = base_url;
        }
        if let Some(scheme) = non_empty("NSO_SCHEME") {
            self.nso.scheme = scheme;
        }
        if let Some(address) = non_empty("NSO_ADDRESS") {
            self.nso.address = address;
        }
        if let Some(port) = non_empty("NSO_PORT") {
            self.nso.port = port.trim().parse().map_err(|_| ConfigError::Env {
                name: "NSO_PORT".to_string(),
                value: port.clone(),
            })?;
        }
        if let Some(username) = non_empty("NSO_USERNAME") {
            self.nso.username = username;
        }
        if let Some(password) = non_empty("NSO_PASSWORD") {
            self.nso.password = password;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = Config::default();
        config
            .apply_env(env_of(&[
                ("OPENAI_API_KEY", "sk-test"),
                ("OPENAI_BASE_URL", "http://localhost:11434/v1"),
                ("NSO_ADDRESS", "nso.lab"),
                ("NSO_PORT", "8888"),
                ("NSO_PASSWORD", "secret"),
            ]))
            .expect("overrides apply");

        assert_eq!(config.llm.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.llm.base_url, "http://localhost:11434/v1");
        assert_eq!(config.nso.address, "nso.lab");
        assert_eq!(config.nso.port, 8888);
        assert_eq!(config.nso.password, "secret");
        assert_eq!(config.nso.username, "admin");
    }

    #[test]
    fn blank_values_are_ignored() {
        let mut config = Config::default();
        config
            .apply_env(env_of(&[("OPENAI_API_KEY", "  "), ("NSO_ADDRESS", "")]))
            .expect("overrides apply");
        assert!(config.llm.api_key.is_none());
        assert_eq!(config.nso.address, "localhost");
    }

    #[test]
    fn invalid_port_is_rejected() {
        let mut config = Config::default();
        let err = config
            .apply_env(env_of(&[("NSO_PORT", "eighty")]))
            .expect_err("port must be numeric");
        assert_eq!(err.to_string(), "Invalid value for NSO_PORT: \"eighty\"");
    }
}
