// Typed records exchanged with the Sea API.
//
// Raw JSON is deserialized straight into these structs, so a missing or
// wrong-typed field, an unparseable timestamp or an unparseable URL fails
// inside serde. Constraints serde cannot express (lengths, the screen name
// pattern) are checked by `Model::validate`. `parse` and `from_value` run
// both steps and only hand out a value once everything passed.

use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use rand::distr::{Alphanumeric, SampleString};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

/// Maximum number of characters in a post.
pub const POST_TEXT_MAX: usize = 512;
/// Display names are 1 to 20 characters.
pub const USER_NAME_MIN: usize = 1;
pub const USER_NAME_MAX: usize = 20;

const STATE_TEXT_LEN: usize = 32;

static SCREEN_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-zA-Z_]{1,20}$").expect("screen name pattern is a valid regex")
});

/// Why a record was rejected.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// Missing field, wrong type, or a timestamp/URL that does not parse.
    /// serde's message names the field.
    #[error("malformed input: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A field is present and well-typed but breaks a constraint.
    #[error("invalid `{field}`: {constraint}")]
    Field { field: String, constraint: String },
}

impl ValidationError {
    pub fn field(field: impl Into<String>, constraint: impl Into<String>) -> Self {
        ValidationError::Field {
            field: field.into(),
            constraint: constraint.into(),
        }
    }

    /// Dotted path of the offending field, when known.
    pub fn field_path(&self) -> Option<&str> {
        match self {
            ValidationError::Field { field, .. } => Some(field),
            ValidationError::Malformed(_) => None,
        }
    }

    /// Prefix the field path with the name of the containing record.
    fn within(self, parent: &str) -> Self {
        match self {
            ValidationError::Field { field, constraint } => {
                let field = if field.starts_with('[') || parent.is_empty() {
                    format!("{parent}{field}")
                } else {
                    format!("{parent}.{field}")
                };
                ValidationError::Field { field, constraint }
            }
            other => other,
        }
    }
}

/// A record that can be checked after deserialization.
pub trait Model: DeserializeOwned {
    fn validate(&self) -> Result<(), ValidationError>;
}

impl<T: Model> Model for Vec<T> {
    fn validate(&self) -> Result<(), ValidationError> {
        for (i, item) in self.iter().enumerate() {
            item.validate().map_err(|e| e.within(&format!("[{i}]")))?;
        }
        Ok(())
    }
}

/// Deserialize and validate a record from JSON text.
pub fn parse<T: Model>(text: &str) -> Result<T, ValidationError> {
    let value: T = serde_json::from_str(text)?;
    value.validate()?;
    Ok(value)
}

/// Deserialize and validate a record from an already-parsed JSON value.
pub fn from_value<T: Model>(value: serde_json::Value) -> Result<T, ValidationError> {
    let value: T = serde_json::from_value(value)?;
    value.validate()?;
    Ok(value)
}

fn check_length(field: &str, value: &str, min: usize, max: usize) -> Result<(), ValidationError> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(ValidationError::field(
            field,
            format!("length must be between {min} and {max} characters, got {len}"),
        ));
    }
    Ok(())
}

/// OAuth credentials for one session.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authorization {
    #[serde(default)]
    pub access_token: String,
    pub client_id: String,
    pub client_secret: String,
    /// Anti-forgery value sent with the authorize request.
    #[serde(default = "generate_state_text")]
    pub state_text: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn generate_state_text() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), STATE_TEXT_LEN)
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl Authorization {
    /// Start a session. The state text is generated here, once.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            state_text: generate_state_text(),
            token_type: default_token_type(),
        }
    }

    /// Value of the `Authorization` header, if a token is held.
    pub fn header_value(&self) -> Option<String> {
        if self.access_token.is_empty() {
            None
        } else {
            Some(format!("{} {}", self.token_type, self.access_token))
        }
    }
}

impl fmt::Debug for Authorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authorization")
            .field("access_token", &"<redacted>")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("state_text", &self.state_text)
            .field("token_type", &self.token_type)
            .finish()
    }
}

impl Model for Authorization {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.state_text.is_empty() {
            return Err(ValidationError::field("stateText", "must not be empty"));
        }
        if self.token_type.is_empty() {
            return Err(ValidationError::field("tokenType", "must not be empty"));
        }
        Ok(())
    }
}

/// The client application a post was made from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: i64,
    pub name: String,
}

impl Model for Application {
    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub name: String,
    pub screen_name: String,
    pub posts_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model for User {
    fn validate(&self) -> Result<(), ValidationError> {
        check_length("name", &self.name, USER_NAME_MIN, USER_NAME_MAX)?;
        if !SCREEN_NAME_RE.is_match(&self.screen_name) {
            return Err(ValidationError::field(
                "screenName",
                "must be 1 to 20 of [0-9a-zA-Z_]",
            ));
        }
        Ok(())
    }
}

/// One rendition of an uploaded file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileVariant {
    pub id: i64,
    pub score: i64,
    pub extension: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub size: u64,
    pub url: Url,
    pub mime: String,
}

impl Model for FileVariant {
    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct File {
    pub id: i64,
    pub name: String,
    pub variants: Vec<FileVariant>,
}

impl Model for File {
    fn validate(&self) -> Result<(), ValidationError> {
        self.variants.validate().map_err(|e| e.within("variants"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: i64,
    pub text: String,
    pub application: Application,
    pub user: User,
    pub files: Vec<File>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    /// Ids of the attached files, in attachment order.
    pub fn file_ids(&self) -> Vec<i64> {
        self.files.iter().map(|f| f.id).collect()
    }
}

impl Model for Post {
    fn validate(&self) -> Result<(), ValidationError> {
        check_length("text", &self.text, 0, POST_TEXT_MAX)?;
        self.application
            .validate()
            .map_err(|e| e.within("application"))?;
        self.user.validate().map_err(|e| e.within("user"))?;
        self.files.validate().map_err(|e| e.within("files"))
    }
}

/// Body of a new post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostBody {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_ids: Option<Vec<i64>>,
}

impl PostBody {
    /// Build and validate a post body.
    pub fn new(text: impl Into<String>, file_ids: Option<Vec<i64>>) -> Result<Self, ValidationError> {
        let body = Self {
            text: text.into(),
            file_ids,
        };
        body.validate()?;
        Ok(body)
    }
}

impl Model for PostBody {
    fn validate(&self) -> Result<(), ValidationError> {
        check_length("text", &self.text, 0, POST_TEXT_MAX)
    }
}

/// Account fields that can be changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    pub name: String,
}

impl UserSettings {
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let settings = Self { name: name.into() };
        settings.validate()?;
        Ok(settings)
    }
}

impl Model for UserSettings {
    fn validate(&self) -> Result<(), ValidationError> {
        check_length("name", &self.name, USER_NAME_MIN, USER_NAME_MAX)
    }
}
