//! Gateway configuration.
//!
//! Presence of a hybrid endpoint changes backend selection: when set, the
//! hybrid (retrieval-augmented) backend is used exclusively; otherwise the
//! primary generation backend is used and requires an API credential.

/// Default model for the primary generation backend.
pub const DEFAULT_MODEL: &str = "gemini-2.5-pro";
/// Default API version segment for the primary backend.
pub const DEFAULT_API_VERSION: &str = "v1beta";
/// Default base URL for the primary backend and the embedding model.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
/// Embedding model identifier.
pub const EMBEDDING_MODEL: &str = "text-embedding-004";

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    /// Hybrid backend endpoint. When set, it is used for every chat request
    /// and the primary backend is never consulted.
    pub hybrid_endpoint: Option<String>,
    /// Optional bearer credential for the hybrid backend.
    pub hybrid_api_key: Option<String>,
    /// Credential for the primary backend; required when no hybrid endpoint
    /// is configured.
    pub gemini_api_key: Option<String>,
    /// Model identifier for the primary backend (with or without the
    /// `models/` prefix).
    pub gemini_model: String,
    /// API version segment for the primary backend.
    pub gemini_api_version: String,
    /// Base URL for the primary backend; overridable for tests.
    pub gemini_base_url: String,
    /// SQLite database path for conversations, messages, and embeddings.
    pub db_path: String,
    /// Address the HTTP surface binds to.
    pub bind_addr: String,
    /// Static bearer token accepted by the bundled authenticator.
    pub auth_token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            hybrid_endpoint: None,
            hybrid_api_key: None,
            gemini_api_key: None,
            gemini_model: DEFAULT_MODEL.to_string(),
            gemini_api_version: DEFAULT_API_VERSION.to_string(),
            gemini_base_url: DEFAULT_BASE_URL.to_string(),
            db_path: "astrochat.db".to_string(),
            bind_addr: "127.0.0.1:3000".to_string(),
            auth_token: None,
        }
    }
}

impl GatewayConfig {
    /// Load configuration from the environment (and a `.env` file when
    /// present), falling back to defaults for unset variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();
        Self {
            hybrid_endpoint: env_opt("HYBRID_CHAT_ENDPOINT"),
            hybrid_api_key: env_opt("HYBRID_CHAT_API_KEY"),
            gemini_api_key: env_opt("GEMINI_API_KEY"),
            gemini_model: env_or("GEMINI_API_MODEL", &defaults.gemini_model),
            gemini_api_version: env_or("GEMINI_API_VERSION", &defaults.gemini_api_version),
            gemini_base_url: env_or("GEMINI_BASE_URL", &defaults.gemini_base_url),
            db_path: env_or("ASTROCHAT_DB", &defaults.db_path),
            bind_addr: env_or("BIND_ADDR", &defaults.bind_addr),
            auth_token: env_opt("ASTROCHAT_AUTH_TOKEN"),
        }
    }

    #[must_use]
    pub fn with_hybrid_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.hybrid_endpoint = Some(endpoint.into());
        self
    }

    #[must_use]
    pub fn with_hybrid_api_key(mut self, key: impl Into<String>) -> Self {
        self.hybrid_api_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_gemini_api_key(mut self, key: impl Into<String>) -> Self {
        self.gemini_api_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_gemini_model(mut self, model: impl Into<String>) -> Self {
        self.gemini_model = model.into();
        self
    }

    #[must_use]
    pub fn with_gemini_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.gemini_base_url = base_url.into();
        self
    }

    /// Model path with the `models/` prefix normalized on.
    #[must_use]
    pub fn model_path(&self) -> String {
        if self.gemini_model.starts_with("models/") {
            self.gemini_model.clone()
        } else {
            format!("models/{}", self.gemini_model)
        }
    }

    /// True when neither backend can be reached with the current settings.
    #[must_use]
    pub fn no_backend_available(&self) -> bool {
        self.hybrid_endpoint.is_none() && self.gemini_api_key.is_none()
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_path_normalizes_prefix() {
        let cfg = GatewayConfig::default().with_gemini_model("gemini-2.5-pro");
        assert_eq!(cfg.model_path(), "models/gemini-2.5-pro");

        let cfg = GatewayConfig::default().with_gemini_model("models/gemini-2.5-flash");
        assert_eq!(cfg.model_path(), "models/gemini-2.5-flash");
    }

    #[test]
    fn backend_availability() {
        assert!(GatewayConfig::default().no_backend_available());
        assert!(
            !GatewayConfig::default()
                .with_gemini_api_key("k")
                .no_backend_available()
        );
        assert!(
            !GatewayConfig::default()
                .with_hybrid_endpoint("http://localhost:9")
                .no_backend_available()
        );
    }
}
