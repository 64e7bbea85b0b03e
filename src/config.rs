// Runtime configuration. Built once in `main` and handed to
// `ApiClient::new`; nothing reads the environment after that.

use url::Url;

use crate::error::SeaError;

/// Default REST endpoint when `SEA_API_URL` is unset.
pub const DEFAULT_API_URL: &str = "http://localhost:3000";

/// Endpoints and credentials for one Sea instance.
#[derive(Clone)]
pub struct Config {
    pub api_url: Url,
    pub oauth_url: Url,
    pub ws_url: Url,
    pub access_token: String,
    pub client_id: String,
    pub client_secret: String,
}

impl Config {
    /// Config for `api_url` with no credentials. The OAuth and streaming
    /// endpoints are derived from it.
    pub fn new(api_url: &str) -> Result<Self, SeaError> {
        let api_url = parse_url("SEA_API_URL", api_url)?;
        let ws_url = stream_url_for(&api_url)?;
        Ok(Self::with_endpoints(api_url, ws_url))
    }

    fn with_endpoints(api_url: Url, ws_url: Url) -> Self {
        Self {
            oauth_url: api_url.clone(),
            api_url,
            ws_url,
            access_token: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
        }
    }

    /// Load a `.env` file if present, then read the `SEA_*` variables.
    pub fn from_env() -> Result<Self, SeaError> {
        if let Err(e) = dotenvy::dotenv() {
            tracing::debug!(error = %e, "No .env file loaded");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SeaError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let api_url = get("SEA_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let api_url = parse_url("SEA_API_URL", &api_url)?;
        // Only derive the streaming URL when none is given.
        let ws_url = match get("SEA_WS_URL") {
            Some(ws) => parse_url("SEA_WS_URL", &ws)?,
            None => stream_url_for(&api_url)?,
        };
        let mut config = Self::with_endpoints(api_url, ws_url);

        if let Some(oauth) = get("SEA_OAUTH_URL") {
            config.oauth_url = parse_url("SEA_OAUTH_URL", &oauth)?;
        }
        config.access_token = get("SEA_ACCESS_TOKEN").unwrap_or_default();
        config.client_id = get("SEA_CLIENT_ID").unwrap_or_default();
        config.client_secret = get("SEA_CLIENT_SECRET").unwrap_or_default();

        tracing::debug!(
            api_url = %config.api_url,
            oauth_url = %config.oauth_url,
            ws_url = %config.ws_url,
            has_token = !config.access_token.is_empty(),
            "Configuration loaded",
        );
        Ok(config)
    }
}

fn parse_url(name: &str, value: &str) -> Result<Url, SeaError> {
    Url::parse(value).map_err(|e| SeaError::Config(format!("{name} is not a valid URL ({value}): {e}")))
}

/// `http(s)://host/base` becomes `ws(s)://host/base/api`.
fn stream_url_for(api_url: &Url) -> Result<Url, SeaError> {
    let scheme = match api_url.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => {
            return Err(SeaError::Config(format!(
                "cannot derive a streaming URL from scheme `{other}`, set SEA_WS_URL"
            )))
        }
    };
    let rest = &api_url.as_str()[api_url.scheme().len()..];
    let joined = format!("{scheme}{}/api", rest.trim_end_matches('/'));
    parse_url("SEA_WS_URL", &joined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.api_url.as_str(), "http://localhost:3000/");
        assert_eq!(config.oauth_url, config.api_url);
        assert_eq!(config.ws_url.as_str(), "ws://localhost:3000/api");
        assert!(config.access_token.is_empty());
        assert!(config.client_id.is_empty());
    }

    #[test]
    fn secure_api_url_gives_secure_stream_url() {
        let config = Config::new("https://sea.example/base/").unwrap();
        assert_eq!(config.ws_url.as_str(), "wss://sea.example/base/api");
    }

    #[test]
    fn reads_every_variable() {
        let config = Config::from_lookup(lookup(&[
            ("SEA_API_URL", "https://api.sea.example"),
            ("SEA_OAUTH_URL", "https://auth.sea.example"),
            ("SEA_WS_URL", "wss://stream.sea.example/api"),
            ("SEA_ACCESS_TOKEN", "tok"),
            ("SEA_CLIENT_ID", "cid"),
            ("SEA_CLIENT_SECRET", "secret"),
        ]))
        .unwrap();
        assert_eq!(config.oauth_url.host_str(), Some("auth.sea.example"));
        assert_eq!(config.ws_url.host_str(), Some("stream.sea.example"));
        assert_eq!(config.access_token, "tok");
        assert_eq!(config.client_id, "cid");
        assert_eq!(config.client_secret, "secret");
    }

    #[test]
    fn empty_values_fall_back_to_defaults() {
        let config = Config::from_lookup(lookup(&[("SEA_API_URL", "")])).unwrap();
        assert_eq!(config.api_url.as_str(), "http://localhost:3000/");
    }

    #[test]
    fn invalid_url_is_a_config_error() {
        let err = Config::from_lookup(lookup(&[("SEA_API_URL", "not a url")]))
            .err()
            .unwrap();
        assert!(matches!(err, SeaError::Config(_)));
    }

    #[test]
    fn unknown_scheme_needs_explicit_stream_url() {
        assert!(matches!(
            Config::new("ftp://sea.example"),
            Err(SeaError::Config(_))
        ));
    }

    #[test]
    fn explicit_stream_url_allows_any_api_scheme() {
        let config = Config::from_lookup(lookup(&[
            ("SEA_API_URL", "unix:/run/sea.sock"),
            ("SEA_WS_URL", "ws://localhost:3000/api"),
        ]))
        .unwrap();
        assert_eq!(config.api_url.scheme(), "unix");
        assert_eq!(config.ws_url.as_str(), "ws://localhost:3000/api");

        assert!(matches!(
            Config::from_lookup(lookup(&[("SEA_API_URL", "unix:/run/sea.sock")])),
            Err(SeaError::Config(_))
        ));
    }
}
