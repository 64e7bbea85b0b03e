// Library root
// -----------
// Client for the Sea API. The binary (`main.rs`) parses arguments and
// hands off to `ui`; everything that talks to the server lives here.
//
// Module responsibilities:
// - `models`: typed, validated records exchanged with the API.
// - `config`: endpoints and credentials, read once at startup.
// - `api`: REST calls (OAuth, posts, timeline, album, account).
// - `stream`: the reconnecting WebSocket timeline listener.
// - `ui`: terminal flows (prompts, spinners, rendering) used by the binary.
pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod stream;
pub mod ui;

pub use api::{ApiClient, NameConflict};
pub use config::Config;
pub use error::{SeaError, StreamProtocolError};
pub use models::{Application, Authorization, File, FileVariant, Post, PostBody, User, UserSettings, ValidationError};
pub use stream::{InvalidMessagePolicy, StreamEvent, StreamHandle, StreamOptions};
