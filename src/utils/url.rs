//! Endpoint joining for user-supplied base URLs.

/// Join `endpoint` onto `base_url` with exactly one slash between them, so
/// `https://api.openai.com/v1/` and `https://api.openai.com/v1` behave alike.
///
/// ```
/// use nso_chat::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("http://localhost:11434/v1/", "/chat/completions"),
///     "http://localhost:11434/v1/chat/completions"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_without_doubling_slashes() {
        let cases = [
            ("https://api.openai.com/v1", "chat/completions"),
            ("https://api.openai.com/v1/", "chat/completions"),
            ("https://api.openai.com/v1///", "/chat/completions"),
        ];
        for (base, endpoint) in cases {
            assert_eq!(
                construct_api_url(base, endpoint),
                "https://api.openai.com/v1/chat/completions"
            );
        }
    }

    #[test]
    fn bare_host_base_gets_endpoint_path() {
        assert_eq!(
            construct_api_url("http://localhost:8000", "v1/chat/completions"),
            "http://localhost:8000/v1/chat/completions"
        );
    }
}
