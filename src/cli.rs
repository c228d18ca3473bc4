use crate::config::ClientConfig;
use crate::error::ClientError;
use clap::{CommandFactory, Parser};
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "chat-stream-client")]
#[command(version)]
#[command(about = "Streaming chat client with automatic reconnection")]
pub struct Args {
    /// TOML configuration file
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// WebSocket endpoint of the chat service (e.g. ws://127.0.0.1:3001)
    #[arg(long)]
    pub url: Option<String>,

    /// Use the legacy HTTP request/reply binding instead of a WebSocket
    #[arg(long)]
    pub http: bool,

    /// Endpoint for the HTTP binding
    #[arg(long)]
    pub http_endpoint: Option<String>,

    /// Fixed session identifier (generated when omitted)
    #[arg(long)]
    pub session_id: Option<String>,

    /// Automatic reconnect attempts before waiting for /reconnect
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Show message text verbatim instead of rendering markdown
    #[arg(long)]
    pub plain: bool,

    /// Print shell completions and exit
    #[arg(long, value_enum)]
    pub completions: Option<clap_complete::Shell>,
}

impl Args {
    /// Layer command-line overrides on top of `config` and validate the result.
    pub fn apply(&self, mut config: ClientConfig) -> Result<ClientConfig, ClientError> {
        if let Some(url) = &self.url {
            config.endpoint = url.clone();
        }
        if let Some(endpoint) = &self.http_endpoint {
            config.http_endpoint = Some(endpoint.clone());
        }
        if let Some(id) = &self.session_id {
            config.session_id = Some(id.clone());
        }
        if let Some(max) = self.max_attempts {
            config.reconnect.max_attempts = max;
        }
        if self.plain {
            config.render.markdown = false;
        }
        if self.http && config.http_endpoint.is_none() {
            return Err(ClientError::Config(
                "--http needs an endpoint (--http-endpoint or http_endpoint in the config file)".into(),
            ));
        }
        config.validate()?;
        Ok(config)
    }

    /// Load the config file named by `--config` (or defaults) and apply overrides.
    pub fn load_config(&self) -> Result<ClientConfig, ClientError> {
        let base = match &self.config {
            Some(path) => ClientConfig::load(path)?,
            None => ClientConfig::default(),
        };
        self.apply(base)
    }
}

/// Write completions for `shell` to `out`.
pub fn print_completions(shell: clap_complete::Shell, out: &mut dyn Write) {
    let mut cmd = Args::command();
    clap_complete::generate(shell, &mut cmd, "chat-stream-client", out);
}
