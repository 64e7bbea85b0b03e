#![allow(dead_code)]

use serde_json::{json, Value};

use sea_cli::{ApiClient, Config};

/// A valid user as the server sends it.
pub fn user_json() -> Value {
    json!({
        "id": 7,
        "name": "Sea Otter",
        "screenName": "sea_otter",
        "postsCount": 42,
        "createdAt": "2019-01-01T00:00:00.000Z",
        "updatedAt": "2019-02-01T12:30:00.000Z"
    })
}

/// A valid uploaded file with one variant.
pub fn file_json(id: i64, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "variants": [{
            "id": id * 10,
            "score": 100,
            "extension": "png",
            "type": "image",
            "size": 2048,
            "url": format!("https://sea.example/files/{name}"),
            "mime": "image/png"
        }]
    })
}

/// A valid post with the given id and text.
pub fn post_json(id: i64, text: &str) -> Value {
    json!({
        "id": id,
        "text": text,
        "application": { "id": 1, "name": "sea-cli" },
        "user": user_json(),
        "files": [],
        "createdAt": "2019-03-01T09:00:00.000Z",
        "updatedAt": "2019-03-01T09:00:00.000Z"
    })
}

/// Client pointed at `base_url` with the given credentials.
pub fn client(base_url: &str, client_id: &str, client_secret: &str, token: &str) -> ApiClient {
    let mut config = Config::new(base_url).expect("valid test URL");
    config.client_id = client_id.to_string();
    config.client_secret = client_secret.to_string();
    config.access_token = token.to_string();
    ApiClient::new(config).expect("client builds")
}
