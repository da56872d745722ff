//! Connection configuration, generalized from the teacher's fixed
//! `host`/`db_name`/`credentials` connect parameters into a struct with
//! this crate's actual knobs (spec's §6 "Configuration options").

use rand::Rng;

/// Default request timeout, per spec's §6/§4.6.
pub const DEFAULT_WAIT_FOR_RESPONSE_MS: u64 = 15_000;

/// Configuration for a [`crate::connection::MasterClientConnection`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Transport endpoint, e.g. `"wss://example.com/sync"`.
    pub url: String,
    /// Stable identifier for this peer. Generated if not supplied.
    pub user_id: String,
    /// Opaque credential transmitted as a connection-level query parameter.
    pub api_key: Option<String>,
    /// Request timeout in milliseconds.
    pub wait_for_response_ms: u64,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            user_id: generate_user_id(),
            api_key: None,
            wait_for_response_ms: DEFAULT_WAIT_FOR_RESPONSE_MS,
        }
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_wait_for_response_ms(mut self, ms: u64) -> Self {
        self.wait_for_response_ms = ms;
        self
    }
}

/// A random decimal integer in `[10_000_000_000, 999_999_999_999]`, per
/// spec's §6 fallback when no `userId` is supplied.
fn generate_user_id() -> String {
    let mut rng = rand::rng();
    rng.random_range(10_000_000_000_u64..=999_999_999_999_u64).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_user_id_is_in_range() {
        for _ in 0..100 {
            let id: u64 = generate_user_id().parse().unwrap();
            assert!((10_000_000_000..=999_999_999_999).contains(&id));
        }
    }

    #[test]
    fn builder_overrides_apply() {
        let config = ClientConfig::new("wss://example.com")
            .with_user_id("fixed-id")
            .with_api_key("secret")
            .with_wait_for_response_ms(50);
        assert_eq!(config.user_id, "fixed-id");
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.wait_for_response_ms, 50);
    }
}
