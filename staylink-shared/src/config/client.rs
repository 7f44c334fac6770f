use std::env;

/// Configuration for the client-side messaging context.
///
/// `socket_url` is optional on purpose: when the realtime server address is
/// not configured, messaging is silently disabled rather than crashing the
/// surrounding application.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the realtime socket server, e.g. `ws://localhost:4000/ws`.
    pub socket_url: Option<String>,

    /// Base URL of the marketplace REST API.
    pub api_base_url: String,
}

impl ClientConfig {
    /// Resolves the client configuration from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            socket_url: env::var("STAYLINK_SOCKET_URL").ok(),
            api_base_url: env::var("STAYLINK_API_URL").unwrap_or_else(|_| "/api".to_string()),
        }
    }

    /// Whether the realtime transport should be brought up at all.
    #[must_use]
    pub fn messaging_enabled(&self) -> bool {
        self.socket_url.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn cleanup_env_vars() {
        unsafe {
            std::env::remove_var("STAYLINK_SOCKET_URL");
            std::env::remove_var("STAYLINK_API_URL");
        }
    }

    #[test]
    #[serial]
    fn test_missing_socket_url_disables_messaging() {
        cleanup_env_vars();

        let config = ClientConfig::from_env();
        assert!(!config.messaging_enabled());
        assert_eq!(config.api_base_url, "/api");
    }

    #[test]
    #[serial]
    fn test_socket_url_enables_messaging() {
        cleanup_env_vars();
        unsafe {
            std::env::set_var("STAYLINK_SOCKET_URL", "ws://localhost:4000/ws");
        }

        let config = ClientConfig::from_env();
        assert!(config.messaging_enabled());
        assert_eq!(config.socket_url.as_deref(), Some("ws://localhost:4000/ws"));

        cleanup_env_vars();
    }
}
