use std::io::IsTerminal;

use clap::{
    Args, CommandFactory, Parser, Subcommand,
    builder::{
        Styles,
        styling::{AnsiColor, Effects},
    },
};
use clap_complete::{Shell, generate};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use spotctl::{
    Res,
    cli::{self, App, CleanupOptions, ExitError},
    config, error,
};

fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::White.on_default() | Effects::BOLD)
        .usage(AnsiColor::White.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightBlue.on_default())
        .placeholder(AnsiColor::BrightGreen.on_default())
}

#[derive(Parser, Debug, Clone)]
#[clap(
  version = env!("CARGO_PKG_VERSION"),
  name=env!("CARGO_PKG_NAME"),
  bin_name=env!("CARGO_PKG_NAME"),
  about=env!("CARGO_PKG_DESCRIPTION"),
  styles=styles(),
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Spotify Connect devices
    #[command(subcommand)]
    Device(DeviceCommand),

    /// Show current playback
    Status(JsonFlag),

    /// Move playback to another device
    Transfer(TransferOptions),

    /// Play a URI, link, id or the top search hit
    Play(PlayOptions),

    /// Pause playback
    Pause(DeviceFlag),

    /// Skip to the next track
    Next(DeviceFlag),

    /// Go back to the previous track
    #[clap(alias = "prev")]
    Previous(DeviceFlag),

    /// Set volume (0-100)
    Volume(VolumeOptions),

    /// Search the catalog
    #[command(subcommand)]
    Search(SearchCommand),

    /// Create and edit playlists
    #[command(subcommand)]
    Playlist(PlaylistCommand),

    /// Obtain a refresh token
    #[command(subcommand)]
    Auth(AuthCommand),

    /// Get shell completions
    Completions(CompletionsOption),
}

#[derive(Args, Debug, Clone)]
pub struct JsonFlag {
    /// JSON output
    #[clap(long)]
    json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct DeviceFlag {
    /// Device name or id (defaults to the active device)
    #[clap(long)]
    device: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum DeviceCommand {
    /// List available devices
    List(JsonFlag),
}

#[derive(Args, Debug, Clone)]
pub struct TransferOptions {
    /// Device name or id
    #[clap(long)]
    device: String,

    /// Start playback after transfer
    #[clap(long, default_value_t = true, action = clap::ArgAction::Set)]
    play: bool,
}

#[derive(Args, Debug, Clone)]
pub struct PlayOptions {
    /// Device name or id
    #[clap(long)]
    device: String,

    /// Spotify URI, open.spotify.com link, or a search query
    target: String,
}

#[derive(Args, Debug, Clone)]
pub struct VolumeOptions {
    /// Device name or id (defaults to the active device)
    #[clap(long)]
    device: Option<String>,

    #[clap(value_parser = clap::value_parser!(u8).range(0..=100))]
    percent: u8,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SearchCommand {
    /// Search tracks
    #[clap(alias = "track")]
    Tracks(SearchTracksOptions),
}

#[derive(Args, Debug, Clone)]
pub struct SearchTracksOptions {
    #[clap(required = true, num_args = 1..)]
    query: Vec<String>,

    /// Max results (1-50)
    #[clap(long, default_value_t = 10)]
    limit: u32,

    /// JSON output
    #[clap(long)]
    json: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum PlaylistCommand {
    /// Create a playlist
    Create {
        #[clap(long)]
        name: String,
        #[clap(long)]
        public: bool,
        #[clap(long, default_value = "")]
        description: String,
        #[clap(long)]
        json: bool,
    },

    /// Add tracks by URI or link
    Add {
        /// Playlist id, URI or URL
        #[clap(long)]
        playlist: String,
        #[clap(required = true, num_args = 1..)]
        tracks: Vec<String>,
        #[clap(long)]
        json: bool,
    },

    /// Add the top search hit for each query
    AddQuery {
        /// Playlist id, URI or URL
        #[clap(long)]
        playlist: String,
        queries: Vec<String>,
        /// Read queries from stdin, one per line
        #[clap(long)]
        stdin: bool,
        /// Parse stdin as `<artist>\t<track>`
        #[clap(long, requires = "stdin")]
        tsv: bool,
        /// Search limit per query
        #[clap(long, default_value_t = 3)]
        limit: u32,
        #[clap(long)]
        json: bool,
    },

    /// Make a playlist public or private
    Privacy {
        /// Playlist id, URI or URL
        #[clap(long)]
        playlist: String,
        #[clap(long, conflicts_with = "private", required_unless_present = "private")]
        public: bool,
        #[clap(long)]
        private: bool,
        #[clap(long)]
        json: bool,
    },

    /// Unfollow playlists matching a name prefix or regex
    Cleanup {
        #[clap(long, default_value = cli::DEFAULT_CLEANUP_PREFIX)]
        prefix: String,
        #[clap(long)]
        regex: Option<String>,
        /// Actually unfollow matched playlists
        #[clap(long)]
        apply: bool,
        /// Confirm deletion (required with --apply)
        #[clap(long)]
        yes: bool,
        #[clap(long)]
        json: bool,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ScopeOptions {
    /// Space-separated scopes
    #[clap(long)]
    scopes: Option<String>,

    /// Force the consent dialog
    #[clap(long, default_value_t = true, action = clap::ArgAction::Set)]
    show_dialog: bool,
}

impl ScopeOptions {
    fn scopes(&self) -> Vec<String> {
        match &self.scopes {
            Some(s) => s.split_whitespace().map(str::to_string).collect(),
            None => config::DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum AuthCommand {
    /// Print the authorize URL
    Url {
        #[clap(long)]
        redirect_uri: String,
        #[clap(flatten)]
        scopes: ScopeOptions,
    },

    /// Exchange an authorization code for a refresh token
    Exchange {
        #[clap(long)]
        redirect_uri: String,
        #[clap(long, required_unless_present = "redirect_url")]
        code: Option<String>,
        /// Full redirect URL pasted from the browser
        #[clap(long)]
        redirect_url: Option<String>,
    },

    /// Log in through a local HTTPS callback server
    Login {
        /// e.g. https://localhost:8899/callback
        #[clap(long)]
        redirect_uri: String,
        #[clap(flatten)]
        scopes: ScopeOptions,
        /// Print the URL instead of opening a browser
        #[clap(long)]
        no_open: bool,
    },
}

#[derive(Args, Debug, Clone)]
pub struct CompletionsOption {
    shell: Shell,
}

fn init_tracing() {
    let filter = if config::debug() || config::debug_http() {
        EnvFilter::new("spotctl=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(command: Command, app: &App) -> Res<()> {
    match command {
        Command::Device(DeviceCommand::List(o)) => cli::device_list(app, o.json).await,
        Command::Status(o) => cli::status(app, o.json).await,
        Command::Transfer(o) => cli::transfer(app, &o.device, o.play).await,
        Command::Play(o) => cli::play(app, &o.device, &o.target).await,
        Command::Pause(o) => cli::pause(app, o.device.as_deref()).await,
        Command::Next(o) => cli::next(app, o.device.as_deref()).await,
        Command::Previous(o) => cli::previous(app, o.device.as_deref()).await,
        Command::Volume(o) => cli::volume(app, o.device.as_deref(), o.percent).await,
        Command::Search(SearchCommand::Tracks(o)) => {
            cli::search_tracks(app, &o.query, o.limit, o.json).await
        }

        Command::Playlist(cmd) => match cmd {
            PlaylistCommand::Create {
                name,
                public,
                description,
                json,
            } => cli::playlist_create(app, &name, public, &description, json).await,
            PlaylistCommand::Add {
                playlist,
                tracks,
                json,
            } => cli::playlist_add(app, &playlist, &tracks, json).await,
            PlaylistCommand::AddQuery {
                playlist,
                mut queries,
                stdin,
                tsv,
                limit,
                json,
            } => {
                if stdin {
                    if std::io::stdin().is_terminal() {
                        return Err(ExitError::usage("--stdin given but stdin is a terminal").into());
                    }
                    queries.extend(cli::read_queries(std::io::stdin().lock(), tsv)?);
                }
                cli::playlist_add_query(app, &playlist, queries, tsv, limit, json).await
            }
            PlaylistCommand::Privacy {
                playlist,
                public,
                json,
                ..
            } => cli::playlist_privacy(app, &playlist, public, json).await,
            PlaylistCommand::Cleanup {
                prefix,
                regex,
                apply,
                yes,
                json,
            } => {
                let options = CleanupOptions {
                    prefix,
                    regex,
                    apply,
                    yes,
                };
                cli::playlist_cleanup(app, &options, json).await
            }
        },

        Command::Auth(cmd) => match cmd {
            AuthCommand::Url {
                redirect_uri,
                scopes,
            } => cli::auth_url(&redirect_uri, &scopes.scopes(), scopes.show_dialog).await,
            AuthCommand::Exchange {
                redirect_uri,
                code,
                redirect_url,
            } => {
                cli::auth_exchange(app, &redirect_uri, code.as_deref(), redirect_url.as_deref())
                    .await
            }
            AuthCommand::Login {
                redirect_uri,
                scopes,
                no_open,
            } => {
                cli::auth_login(
                    app,
                    &redirect_uri,
                    &scopes.scopes(),
                    scopes.show_dialog,
                    !no_open,
                )
                .await
            }
        },

        Command::Completions(opt) => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(opt.shell, &mut cmd, name, &mut std::io::stdout());
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Cli::parse();

    if let Err(e) = config::load_env() {
        error!("Cannot load environment. Err: {}", e);
    }
    init_tracing();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let result = match App::new(cancel) {
        Ok(app) => run(args.command, &app).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        error!("{}", cli::humanize(&*e));
        std::process::exit(cli::exit_code(&*e));
    }
}
