// API client module: wraps the Sea REST endpoints. Every request body is
// validated before it leaves and every response is validated before it is
// returned, so callers only ever see well-formed records.

use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::Config;
use crate::error::SeaError;
use crate::models::{self, Authorization, File, Model, Post, PostBody, User, UserSettings, ValidationError};
use crate::stream::{StreamHandle, StreamListener, StreamOptions};

/// Accepted range for the timeline `count` parameter.
pub const TIMELINE_COUNT_MIN: u32 = 1;
pub const TIMELINE_COUNT_MAX: u32 = 100;

/// What the server should do when an uploaded file name already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NameConflict {
    /// Reject the upload.
    #[default]
    Error,
    /// Keep both files, appending a date string to the new name.
    AddDateString,
}

impl NameConflict {
    pub fn as_str(self) -> &'static str {
        match self {
            NameConflict::Error => "error",
            NameConflict::AddDateString => "add-date-string",
        }
    }
}

impl From<bool> for NameConflict {
    /// `true` means "add a date on conflict".
    fn from(add_date: bool) -> Self {
        if add_date {
            NameConflict::AddDateString
        } else {
            NameConflict::Error
        }
    }
}

/// Form body of `POST /oauth/token`.
#[derive(Serialize)]
struct TokenRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    code: &'a str,
    grant_type: &'static str,
    state: &'a str,
}

/// Answer of `POST /oauth/token`.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
}

impl Model for TokenResponse {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.access_token.is_empty() {
            return Err(ValidationError::field("access_token", "must not be empty"));
        }
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TimelineQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    since_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    count: Option<u32>,
}

/// HTTP client for one Sea instance. Holds the transport, the endpoints
/// and the session's credentials.
pub struct ApiClient {
    client: Client,
    config: Config,
    auth: Authorization,
    /// Cached `Authorization` header, replaced whenever the token changes.
    auth_header: Option<HeaderValue>,
}

impl ApiClient {
    /// Create a client from an explicit configuration. A token already
    /// present in the config is used for every request.
    pub fn new(config: Config) -> Result<Self, SeaError> {
        let client = Client::builder()
            .user_agent(concat!("sea-cli/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let auth = Authorization::new(
            config.client_id.clone(),
            config.client_secret.clone(),
            config.access_token.clone(),
        );
        let mut api = ApiClient {
            client,
            config,
            auth,
            auth_header: None,
        };
        api.refresh_auth_header()?;
        Ok(api)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn authorization(&self) -> &Authorization {
        &self.auth
    }

    /// Returns whether the client holds an access token.
    pub fn has_token(&self) -> bool {
        !self.auth.access_token.is_empty()
    }

    /// Store an access token for subsequent authenticated requests.
    pub fn set_token(&mut self, token: impl Into<String>) -> Result<(), SeaError> {
        self.auth.access_token = token.into();
        self.refresh_auth_header()
    }

    fn refresh_auth_header(&mut self) -> Result<(), SeaError> {
        self.auth_header = match self.auth.header_value() {
            Some(value) => Some(HeaderValue::from_str(&value).map_err(|_| {
                SeaError::Config("access token contains characters not allowed in a header".into())
            })?),
            None => None,
        };
        Ok(())
    }

    /// URL the user opens in a browser to grant access.
    pub fn authorize_url(&self) -> Result<Url, SeaError> {
        if self.auth.client_id.is_empty() {
            return Err(SeaError::Config("client id is not set (SEA_CLIENT_ID)".into()));
        }
        let mut url = Url::parse(&endpoint(&self.config.oauth_url, "/oauth/authorize"))
            .map_err(|e| SeaError::Config(format!("invalid OAuth URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.auth.client_id)
            .append_pair("response_type", "code")
            .append_pair("state", &self.auth.state_text);
        Ok(url)
    }

    /// Exchange an authorization code for an access token. On success the
    /// token is kept and sent with every later request.
    pub async fn authorize(&mut self, code: &str) -> Result<&Authorization, SeaError> {
        if self.auth.client_id.is_empty() {
            return Err(SeaError::Config("client id is not set (SEA_CLIENT_ID)".into()));
        }
        if self.auth.client_secret.is_empty() {
            return Err(SeaError::Config(
                "client secret is not set (SEA_CLIENT_SECRET)".into(),
            ));
        }

        let url = endpoint(&self.config.oauth_url, "/oauth/token");
        tracing::debug!(url = %url, "Exchanging authorization code");
        let form = TokenRequest {
            client_id: &self.auth.client_id,
            client_secret: &self.auth.client_secret,
            code,
            grant_type: "authorization_code",
            state: &self.auth.state_text,
        };
        let res = self.client.post(&url).form(&form).send().await?;
        let token: TokenResponse = parse_response(res).await?;

        if let Some(token_type) = token.token_type.filter(|t| !t.is_empty()) {
            self.auth.token_type = token_type;
        }
        self.set_token(token.access_token)?;
        tracing::info!("Authorization succeeded");
        Ok(&self.auth)
    }

    /// Publish a post.
    pub async fn post(&self, body: &PostBody) -> Result<Post, SeaError> {
        body.validate()?;
        let res = self
            .request(Method::POST, "/api/v1/posts")
            .json(body)
            .send()
            .await?;
        parse_response(res).await
    }

    /// Fetch the public timeline in server order.
    pub async fn timeline(&self, since_id: Option<i64>, count: Option<u32>) -> Result<Vec<Post>, SeaError> {
        if let Some(count) = count {
            if !(TIMELINE_COUNT_MIN..=TIMELINE_COUNT_MAX).contains(&count) {
                return Err(SeaError::Range {
                    name: "count",
                    min: TIMELINE_COUNT_MIN,
                    max: TIMELINE_COUNT_MAX,
                    value: count,
                });
            }
        }
        let res = self
            .request(Method::GET, "/api/v1/timelines/public")
            .query(&TimelineQuery { since_id, count })
            .send()
            .await?;
        parse_response(res).await
    }

    /// Upload a file to the album. `file` may be anything reqwest can turn
    /// into a body, e.g. a `tokio::fs::File` or a byte vector.
    pub async fn post_file(
        &self,
        name: &str,
        file: impl Into<reqwest::Body>,
        if_conflict: NameConflict,
        folder_id: Option<i64>,
    ) -> Result<File, SeaError> {
        let mime = mime_guess::from_path(name).first_or_octet_stream();
        let part = Part::stream(file)
            .file_name(name.to_string())
            .mime_str(mime.as_ref())?;
        let mut form = Form::new()
            .part("file", part)
            .text("ifNameConflicted", if_conflict.as_str());
        if let Some(folder_id) = folder_id {
            form = form.text("folderId", folder_id.to_string());
        }

        tracing::debug!(name, mime = %mime, conflict = if_conflict.as_str(), "Uploading file");
        let res = self
            .request(Method::POST, "/api/v1/album/files")
            .multipart(form)
            .send()
            .await?;
        parse_response(res).await
    }

    /// Change account settings and return the updated account.
    pub async fn post_user_settings(&self, settings: &UserSettings) -> Result<User, SeaError> {
        settings.validate()?;
        let res = self
            .request(Method::PATCH, "/api/v1/account")
            .json(settings)
            .send()
            .await?;
        parse_response(res).await
    }

    /// The account the token belongs to.
    pub async fn account(&self) -> Result<User, SeaError> {
        let res = self.request(Method::GET, "/api/v1/account").send().await?;
        parse_response(res).await
    }

    /// Start listening to a named stream with the held token. Must be
    /// called from within a tokio runtime.
    pub fn stream(&self, name: &str, options: StreamOptions) -> Result<StreamHandle, SeaError> {
        if !self.has_token() {
            return Err(SeaError::Config(
                "an access token is required to stream (SEA_ACCESS_TOKEN or `sea authorize`)".into(),
            ));
        }
        let listener = StreamListener::new(
            self.config.ws_url.clone(),
            name,
            self.auth.access_token.clone(),
            options,
        );
        Ok(listener.spawn())
    }

    // ---- private helpers ----

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = endpoint(&self.config.api_url, path);
        tracing::debug!(%method, url = %url, "Sending request");
        let req = self.client.request(method, url);
        match &self.auth_header {
            Some(value) => req.header(AUTHORIZATION, value.clone()),
            None => req,
        }
    }
}

fn endpoint(base: &Url, path: &str) -> String {
    format!("{}{}", base.as_str().trim_end_matches('/'), path)
}

/// Turn a non-2xx answer into [`SeaError::Remote`] carrying the status and
/// body.
async fn ensure_success(response: Response) -> Result<Response, SeaError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        tracing::warn!(status = status.as_u16(), "Request failed");
        return Err(SeaError::Remote {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

/// Read a successful body and validate it as `T`.
async fn parse_response<T: Model>(response: Response) -> Result<T, SeaError> {
    let response = ensure_success(response).await?;
    let text = response.text().await?;
    Ok(models::parse(&text)?)
}
