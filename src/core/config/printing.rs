use crate::core::config::data::Config;

impl Config {
    pub fn print_all(&self) {
        for line in self.describe() {
            println!("{line}");
        }
    }

    /// Effective settings, one per line, with secrets masked.
    pub fn describe(&self) -> Vec<String> {
        let mut lines = vec!["Current configuration:".to_string()];
        lines.push(format!(
            "  nso: {}://{}:{} (user {}, timeout {}s)",
            self.nso.scheme,
            self.nso.address,
            self.nso.port,
            self.nso.username,
            self.nso.timeout_secs
        ));
        lines.push(format!("  llm.base-url: {}", self.llm.base_url));
        lines.push(format!("  llm.model: {}", self.llm.model));
        lines.push(format!(
            "  llm.api-key: {}",
            if self.llm.api_key.is_some() {
                "(set)"
            } else {
                "(unset)"
            }
        ));
        lines.push(format!("  llm.max-tool-rounds: {}", self.llm.max_tool_rounds));
        match &self.mcp.command {
            Some(command) if self.mcp.args.is_empty() => {
                lines.push(format!("  mcp.command: {command}"))
            }
            Some(command) => lines.push(format!(
                "  mcp.command: {command} {}",
                self.mcp.args.join(" ")
            )),
            None => lines.push("  mcp.command: (built-in server)".to_string()),
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_masks_api_key() {
        let mut config = Config::default();
        config.llm.api_key = Some("sk-very-secret".to_string());
        let text = config.describe().join("\n");
        assert!(text.contains("llm.api-key: (set)"));
        assert!(!text.contains("sk-very-secret"));
        assert!(text.contains("mcp.command: (built-in server)"));
    }
}
