// UI layer: the terminal side of each command. Prompts use `dialoguer`,
// long requests show an `indicatif` spinner and posts are printed with
// `crossterm` styling. All server work goes through `ApiClient`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use crossterm::style::{style, Stylize};
use dialoguer::{Input, Select};
use indicatif::{ProgressBar, ProgressStyle};

use crate::api::{ApiClient, NameConflict};
use crate::config::Config;
use crate::models::{Post, PostBody, UserSettings};
use crate::stream::{InvalidMessagePolicy, StreamEvent, StreamOptions};

const TOKEN_FILE: &str = ".sea_token";

/// Read the configuration from the environment. When no access token is
/// configured, fall back to the one saved by `sea authorize`.
pub fn load_config() -> Result<Config> {
    let mut config = Config::from_env().context("Failed to read configuration")?;
    if config.access_token.is_empty() {
        if let Ok(token) = load_token() {
            tracing::debug!("Using saved access token");
            config.access_token = token.trim().to_string();
        }
    }
    Ok(config)
}

/// Interactive menu, used when no subcommand is given. Runs a select
/// loop until the user chooses "Exit". A failed action is reported and
/// the menu continues.
pub async fn main_menu(mut api: ApiClient) -> Result<()> {
    let items = vec![
        "Authorize",
        "Post",
        "Timeline",
        "Stream",
        "Change display name",
        "Exit",
    ];
    loop {
        let selection = Select::new().items(&items).default(2).interact()?;
        let outcome = match selection {
            0 => authorize(&mut api).await,
            1 => post(&api, None, &[], NameConflict::default()).await,
            2 => timeline(&api, None, None).await,
            3 => {
                let name: String = Input::new()
                    .with_prompt("Stream")
                    .default("public".to_string())
                    .interact_text()?;
                stream(&api, &name, InvalidMessagePolicy::default()).await
            }
            4 => {
                let name: String = Input::new().with_prompt("New display name").interact_text()?;
                settings(&api, &name).await
            }
            _ => break,
        };
        if let Err(e) = outcome {
            println!("{} {:#}", style("Failed:").red(), e);
        }
    }
    Ok(())
}

/// OAuth flow: show the authorize URL, read the code back, exchange it
/// and save the token for future runs.
pub async fn authorize(api: &mut ApiClient) -> Result<()> {
    let url = api.authorize_url()?;
    println!("Open this URL in your browser and approve the application:");
    println!("  {}", style(url.as_str()).underlined());
    println!("State to check on the redirect: {}", api.authorization().state_text);

    let code: String = Input::new().with_prompt("Authorization code").interact_text()?;

    let spinner = spinner("Authorizing...")?;
    let result = api.authorize(code.trim()).await;
    spinner.finish_and_clear();
    result?;

    persist_token(&api.authorization().access_token)?;
    match api.account().await {
        Ok(user) => println!("Welcome {} (@{})!", user.name, user.screen_name),
        Err(e) => {
            tracing::warn!(error = %e, "Could not fetch account after authorizing");
            println!("Authorized.");
        }
    }
    println!("Token saved to ~/{TOKEN_FILE}");
    Ok(())
}

/// Upload each file, then publish the post with their ids attached.
pub async fn post(
    api: &ApiClient,
    text: Option<String>,
    files: &[PathBuf],
    if_conflict: NameConflict,
) -> Result<()> {
    let text = match text {
        Some(text) => text,
        None => Input::new()
            .with_prompt("Text")
            .allow_empty(!files.is_empty())
            .interact_text()?,
    };

    let mut file_ids = Vec::with_capacity(files.len());
    for path in files {
        let uploaded = upload(api, path, if_conflict).await?;
        println!("Uploaded {} (id {})", uploaded.name, uploaded.id);
        file_ids.push(uploaded.id);
    }

    let body = PostBody::new(text, (!file_ids.is_empty()).then_some(file_ids))?;
    let spinner = spinner("Posting...")?;
    let result = api.post(&body).await;
    spinner.finish_and_clear();

    render_post(&result?);
    Ok(())
}

async fn upload(api: &ApiClient, path: &Path, if_conflict: NameConflict) -> Result<crate::models::File> {
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .with_context(|| format!("{} has no usable file name", path.display()))?;
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let spinner = spinner(&format!("Uploading {name}..."))?;
    let result = api.post_file(name, file, if_conflict, None).await;
    spinner.finish_and_clear();
    Ok(result?)
}

/// Print the public timeline in the order the server returned it.
pub async fn timeline(api: &ApiClient, since_id: Option<i64>, count: Option<u32>) -> Result<()> {
    let spinner = spinner("Loading timeline...")?;
    let result = api.timeline(since_id, count).await;
    spinner.finish_and_clear();

    let posts = result?;
    if posts.is_empty() {
        println!("No posts.");
    }
    for post in &posts {
        render_post(post);
    }
    Ok(())
}

/// Print stream events until Ctrl-C, then disconnect.
pub async fn stream(api: &ApiClient, name: &str, policy: InvalidMessagePolicy) -> Result<()> {
    let options = StreamOptions {
        invalid_message: policy,
        ..StreamOptions::default()
    };
    let mut handle = api.stream(name, options)?;
    let mut stopping = false;

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c(), if !stopping => {
                signal.context("Failed to listen for Ctrl-C")?;
                stopping = true;
                handle.disconnect(None, Some("client closed"));
            }
            event = handle.next_event() => match event {
                Some(StreamEvent::Connect) => {
                    println!("{}", style(format!("Connected to {name}")).green());
                }
                Some(StreamEvent::Message(post)) => render_post(&post),
                Some(StreamEvent::Close { code, reason }) => {
                    let next = if stopping { "" } else { ", reconnecting" };
                    println!("{}", style(format!("Disconnected ({code}) {reason}{next}")).yellow());
                }
                None => break,
            }
        }
    }
    handle.join().await;
    Ok(())
}

/// Change the account's display name.
pub async fn settings(api: &ApiClient, name: &str) -> Result<()> {
    let settings = UserSettings::new(name)?;
    let user = api.post_user_settings(&settings).await?;
    println!("Display name is now {} (@{})", user.name, user.screen_name);
    Ok(())
}

fn render_post(post: &Post) {
    let when = post.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M");
    println!(
        "{} {} {}",
        style(&post.user.name).bold(),
        style(format!("@{}", post.user.screen_name)).dark_grey(),
        style(when).dark_grey(),
    );
    if !post.text.is_empty() {
        println!("{}", post.text);
    }
    for file in &post.files {
        println!("  {} {}", style("[file]").cyan(), file.name);
    }
    println!();
}

fn spinner(message: &str) -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner} {msg}")?);
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    Ok(spinner)
}

/// Persist token into a file in the user's home directory.
fn persist_token(token: &str) -> Result<()> {
    let path = token_path();
    std::fs::write(&path, token).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Load token from the user's home directory file.
fn load_token() -> Result<String> {
    let data = std::fs::read_to_string(token_path())?;
    Ok(data)
}

fn token_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(TOKEN_FILE)
}
