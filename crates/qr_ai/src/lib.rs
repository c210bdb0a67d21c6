pub mod answer;
pub mod batch;
pub mod embeddings;
pub mod evidence;
pub mod fetch;
pub mod guardrails;
mod http;
pub mod llm;
pub mod ollama;
pub mod openai;
pub mod retrieve;

#[cfg(test)]
mod tests {
    use super::guardrails::{extract_cited_sources, is_insufficient_evidence};
    use super::ollama::OllamaClient;
    use super::openai::OpenAiClient;

    #[test]
    fn enforces_localhost_only_base_url() {
        assert!(OllamaClient::new("http://127.0.0.1:11434").is_ok());
        assert!(OllamaClient::new("http://127.0.0.1").is_ok());

        assert!(OllamaClient::new("http://localhost:11434").is_err());
        assert!(OllamaClient::new("http://0.0.0.0:11434").is_err());
        assert!(OllamaClient::new("http://[::1]:11434").is_err());
        assert!(OllamaClient::new("https://example.com").is_err());

        // Prefix tricks.
        assert!(OllamaClient::new("http://127.0.0.1.evil.com:11434").is_err());
        assert!(OllamaClient::new("http://127.0.0.1@evil.com:11434").is_err());
        assert!(OllamaClient::new("http://127.0.0.1:").is_err());
        assert!(OllamaClient::new("http://127.0.0.1:0").is_err());
        assert!(OllamaClient::new("http://127.0.0.1:99999").is_err());
        assert!(OllamaClient::new("http://127.0.0.1:11434/").is_ok());
        assert!(OllamaClient::new("http://127.0.0.1:11434/api").is_err());

        let err = OllamaClient::new("http://localhost:11434").unwrap_err();
        assert_eq!(err.code, "CONFIG_REMOTE_NOT_ALLOWED");
    }

    #[test]
    fn openai_client_requires_http_scheme_and_key() {
        assert!(OpenAiClient::new("https://api.openai.com/", "sk-test").is_ok());
        assert!(OpenAiClient::new("ftp://api.openai.com", "sk-test").is_err());
        assert!(OpenAiClient::new("https://api.openai.com", "  ").is_err());

        let client = OpenAiClient::new("https://api.openai.com/", "sk-secret").expect("client");
        assert_eq!(client.base_url(), "https://api.openai.com");
        assert!(!format!("{client:?}").contains("sk-secret"));
    }

    #[test]
    fn citation_guard_parses_source_markers() {
        let cited = extract_cited_sources("Yes [[source:2]], enforced [[source: 1 ]] and [[chunk:x]].");
        assert_eq!(cited.into_iter().collect::<Vec<_>>(), vec!["1", "2"]);
        assert!(is_insufficient_evidence(
            "Review Required - Not found in Knowledge Base"
        ));
        assert!(!is_insufficient_evidence("Yes, MFA is enforced [[source:1]]."));
    }
}
