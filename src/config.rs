// Environment-driven configuration for the client and the CLI.

use std::collections::HashMap;

use crate::credentials::{AppCredentialResolverOptions, DEFAULT_USER_SCOPE};

pub const DEFAULT_BASE_URI: &str = "https://maestro.dot.net/";

/// Entra application ID of the production Maestro service.
pub const DEFAULT_APP_ID: &str = "54c17f3d-7325-4eca-9db7-f090bfc765a8";

#[derive(Debug, Clone)]
pub struct MaestroConfig {
    pub base_uri: String,
    pub credentials: AppCredentialResolverOptions,
}

impl MaestroConfig {
    /// Read `MAESTRO_*` variables, falling back to the production service.
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars().collect())
    }

    pub fn from_vars(vars: HashMap<String, String>) -> Self {
        let get = |key: &str| {
            vars.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let app_id = get("MAESTRO_APP_ID").unwrap_or_else(|| DEFAULT_APP_ID.into());
        let mut credentials = AppCredentialResolverOptions::new(app_id);
        credentials.token = get("MAESTRO_TOKEN");
        credentials.managed_identity_id = get("MAESTRO_MANAGED_IDENTITY_ID");
        credentials.disable_interactive_auth = get("MAESTRO_DISABLE_INTERACTIVE_AUTH")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        credentials.user_scope =
            get("MAESTRO_USER_SCOPE").unwrap_or_else(|| DEFAULT_USER_SCOPE.into());

        MaestroConfig {
            base_uri: get("MAESTRO_BASE_URI").unwrap_or_else(|| DEFAULT_BASE_URI.into()),
            credentials,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_to_production() {
        let config = MaestroConfig::from_vars(HashMap::new());
        assert_eq!(config.base_uri, DEFAULT_BASE_URI);
        assert_eq!(config.credentials.app_id, DEFAULT_APP_ID);
        assert_eq!(config.credentials.user_scope, ".default");
        assert!(config.credentials.token.is_none());
        assert!(!config.credentials.disable_interactive_auth);
    }

    #[test]
    fn reads_overrides() {
        let config = MaestroConfig::from_vars(vars(&[
            ("MAESTRO_BASE_URI", "https://maestro.int-dot.net/"),
            ("MAESTRO_APP_ID", "app"),
            ("MAESTRO_TOKEN", " secret "),
            ("MAESTRO_MANAGED_IDENTITY_ID", ""),
            ("MAESTRO_DISABLE_INTERACTIVE_AUTH", "TRUE"),
            ("MAESTRO_USER_SCOPE", "Maestro.Read"),
        ]));
        assert_eq!(config.base_uri, "https://maestro.int-dot.net/");
        assert_eq!(config.credentials.app_id, "app");
        assert_eq!(config.credentials.token.as_deref(), Some("secret"));
        assert!(config.credentials.managed_identity_id.is_none());
        assert!(config.credentials.disable_interactive_auth);
        assert_eq!(config.credentials.user_scope, "Maestro.Read");
    }
}
