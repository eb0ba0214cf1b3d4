//! Parley terminal client
//!
//! Opens a realtime voice session through the Parley API and relays typed
//! lines over the session's control channel. Audio flows through the host's
//! default devices when built with the `device-audio` feature.

mod terminal;

use anyhow::Context;
use clap::Parser;
use parley_core::{
    ClientConfig, HttpCredentialSource, HttpSignaler, Negotiator, RealtimeClient, Renderer,
};
use parley_webrtc::{AudioDevices, WebRtcConfig, WebRtcTransport};
use reqwest::Url;
use std::sync::Arc;
use terminal::TerminalRenderer;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{Level, info, warn};

/// Talk to a realtime model from the terminal.
#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Endpoint minting ephemeral credentials (overrides PARLEY_SESSION_URL)
    #[arg(long, value_name = "URL")]
    session_url: Option<Url>,

    /// Endpoint accepting SDP offers (overrides OPENAI_REALTIME_URL)
    #[arg(long, value_name = "URL")]
    realtime_url: Option<Url>,

    /// Realtime model (overrides REALTIME_MODEL)
    #[arg(long)]
    model: Option<String>,

    /// Label of the control channel (overrides PARLEY_CHANNEL_LABEL)
    #[arg(long)]
    channel_label: Option<String>,

    /// STUN/TURN server, may be repeated
    #[arg(long = "ice-server", value_name = "URL")]
    ice_servers: Vec<String>,

    #[arg(long, default_value = "info")]
    log_level: Level,
}

impl Cli {
    /// Flags take precedence over the environment.
    fn apply(self, mut config: ClientConfig) -> (ClientConfig, WebRtcConfig) {
        if let Some(url) = self.session_url {
            config.session_url = url;
        }
        if let Some(url) = self.realtime_url {
            config.realtime_url = url;
        }
        if let Some(model) = self.model {
            config.model = model;
        }
        if let Some(label) = self.channel_label {
            config.channel_label = label;
        }

        let mut webrtc = WebRtcConfig::default();
        if !self.ice_servers.is_empty() {
            webrtc.ice_servers = self.ice_servers;
        }
        (config, webrtc)
    }
}

enum Command<'a> {
    Restart,
    Quit,
    Say(&'a str),
    Nothing,
}

fn parse_line(line: &str) -> Command<'_> {
    match line.trim() {
        "" => Command::Nothing,
        "/restart" => Command::Restart,
        "/quit" | "/exit" => Command::Quit,
        text => Command::Say(text),
    }
}

fn devices() -> Arc<dyn AudioDevices> {
    #[cfg(feature = "device-audio")]
    {
        Arc::new(parley_webrtc::CpalDevices)
    }
    #[cfg(not(feature = "device-audio"))]
    {
        Arc::new(parley_webrtc::SilentDevices)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so they never interleave with the transcript.
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();

    let env_config = ClientConfig::from_env().context("Failed to load configuration")?;
    let (config, webrtc_config) = cli.apply(env_config);
    info!(
        session_url = %config.session_url,
        realtime_url = %config.realtime_url,
        model = %config.model,
        "Client configured"
    );

    let http = reqwest::Client::builder()
        .build()
        .context("Failed to build HTTP client")?;
    let negotiator = Negotiator::new(
        WebRtcTransport::new(webrtc_config, devices()),
        Arc::new(HttpCredentialSource::new(
            http.clone(),
            config.session_url.as_str(),
        )),
        Arc::new(HttpSignaler::new(
            http,
            config.realtime_url.as_str(),
            config.model.clone(),
        )),
        config.channel_label.clone(),
    );

    let renderer = Arc::new(TerminalRenderer::new(std::io::stdout()));
    let mut client = RealtimeClient::new(negotiator, renderer.clone());

    if let Err(e) = client.start_session().await {
        warn!(error = %e, "Session did not start; type /restart to retry");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        match parse_line(&line) {
            Command::Nothing => {}
            Command::Quit => break,
            Command::Restart => {
                if let Err(e) = client.start_session().await {
                    warn!(error = %e, "Session did not start");
                }
            }
            Command::Say(text) => {
                if !client.send_text(text).await {
                    renderer.on_status("Not connected; type /restart to reconnect");
                }
            }
        }
    }

    if let Err(e) = client.close().await {
        warn!(error = %e, "Teardown was incomplete");
    }
    info!("Client has shut down.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        assert!(matches!(parse_line("   "), Command::Nothing));
        assert!(matches!(parse_line("/restart"), Command::Restart));
        assert!(matches!(parse_line(" /quit "), Command::Quit));
        assert!(matches!(parse_line("/exit"), Command::Quit));
        assert!(matches!(parse_line("  hi there "), Command::Say("hi there")));
    }

    #[test]
    fn test_flags_override_environment() {
        let cli = Cli::parse_from([
            "parley",
            "--session-url",
            "https://voice.example.com/session",
            "--model",
            "gpt-4o-mini-realtime-preview",
            "--ice-server",
            "stun:stun.example.com:3478",
            "--ice-server",
            "turn:turn.example.com:3478",
        ]);
        let (config, webrtc) = cli.apply(ClientConfig::default());

        assert_eq!(config.session_url.host_str(), Some("voice.example.com"));
        assert_eq!(config.model, "gpt-4o-mini-realtime-preview");
        assert_eq!(config.realtime_url, ClientConfig::default().realtime_url);
        assert_eq!(config.channel_label, "oai-events");
        assert_eq!(
            webrtc.ice_servers,
            vec!["stun:stun.example.com:3478", "turn:turn.example.com:3478"]
        );
    }

    #[test]
    fn test_defaults_keep_environment() {
        let cli = Cli::parse_from(["parley"]);
        assert_eq!(cli.log_level, Level::INFO);

        let (config, webrtc) = cli.apply(ClientConfig::default());
        assert_eq!(config, ClientConfig::default());
        assert_eq!(webrtc.ice_servers, WebRtcConfig::default().ice_servers);
    }
}
