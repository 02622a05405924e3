use std::{
    net::{IpAddr, SocketAddr, TcpListener},
    sync::Arc,
};

use axum::{Extension, Router, routing::any};
use axum_server::{Handle, tls_rustls::RustlsConfig};
use tokio::{
    sync::{Mutex, oneshot},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use url::{Host, Url};

use crate::{api, spotify::SpotifyError, types::CallbackResult};

mod tls;

pub use tls::{CERT_VALIDITY, EphemeralIdentity};

/// Single-slot delivery channel shared with the callback handler.
/// The first request takes the sender; later ones find it empty.
pub type CallbackSlot = Arc<Mutex<Option<oneshot::Sender<CallbackResult>>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Listening,
    Completed,
    Errored,
    Cancelled,
    Closed,
}

/// Validated pieces of an https redirect URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectTarget {
    pub host: String,
    pub port: u16,
    pub path: String,
    /// The redirect URI without query or fragment, as registered with Spotify.
    pub redirect_url: String,
}

impl RedirectTarget {
    pub fn parse(redirect_uri: &str) -> Result<Self, SpotifyError> {
        let mut url = Url::parse(redirect_uri)
            .map_err(|e| SpotifyError::Config(format!("invalid redirect uri: {e}")))?;

        if url.scheme() != "https" {
            return Err(SpotifyError::Config(format!(
                "redirect uri must be https (Spotify requires secure redirect URIs): {redirect_uri}"
            )));
        }

        let host = match url.host() {
            Some(Host::Domain(d)) if !d.is_empty() => d.to_string(),
            Some(Host::Ipv4(ip)) => ip.to_string(),
            Some(Host::Ipv6(ip)) => ip.to_string(),
            _ => {
                return Err(SpotifyError::Config(format!(
                    "redirect uri missing host: {redirect_uri}"
                )));
            }
        };

        // Url drops an explicit default port, so look at the raw authority too.
        let port = url
            .port()
            .or_else(|| explicit_https_port(redirect_uri))
            .ok_or_else(|| {
                SpotifyError::Config(
                    "redirect uri must include an explicit port (e.g. https://localhost:8899/callback)"
                        .into(),
                )
            })?;

        if url.path().is_empty() || url.path() == "/" {
            url.set_path("/callback");
        }
        url.set_query(None);
        url.set_fragment(None);

        Ok(Self {
            host,
            port,
            path: url.path().to_string(),
            redirect_url: url.into(),
        })
    }
}

fn explicit_https_port(raw: &str) -> Option<u16> {
    let rest = raw.split_once("://")?.1;
    let authority = rest.split(['/', '?', '#']).next()?;
    authority.ends_with(":443").then_some(443)
}

/// Ephemeral HTTPS server that captures one OAuth redirect.
///
/// The server is released by [`CallbackServer::close`] or on drop, whichever
/// comes first.
pub struct CallbackServer {
    target: RedirectTarget,
    local_addr: SocketAddr,
    handle: Handle,
    task: Option<JoinHandle<()>>,
    receiver: Option<oneshot::Receiver<CallbackResult>>,
    state: ListenerState,
}

impl CallbackServer {
    /// Validates the redirect URI, generates a certificate and starts serving
    /// the redirect path.
    pub async fn start(redirect_uri: &str) -> Result<Self, SpotifyError> {
        let target = RedirectTarget::parse(redirect_uri)?;
        let identity = EphemeralIdentity::generate(&target.host)?;

        // aws-lc-rs is the provider axum-server's rustls build expects
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
        let config = RustlsConfig::from_pem(
            identity.cert_pem.into_bytes(),
            identity.key_pem.into_bytes(),
        )
        .await
        .map_err(|e| SpotifyError::Tls(e.to_string()))?;

        let listener = bind(&target)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let (sender, receiver) = oneshot::channel();
        let slot: CallbackSlot = Arc::new(Mutex::new(Some(sender)));
        let app = Router::new().route(&target.path, any(api::callback).layer(Extension(slot)));

        let handle = Handle::new();
        let server = axum_server::from_tcp_rustls(listener, config).handle(handle.clone());
        let task = tokio::spawn(async move {
            if let Err(e) = server.serve(app.into_make_service()).await {
                tracing::warn!(error = %e, "callback server stopped");
            }
        });

        tracing::debug!(addr = %local_addr, path = %target.path, "callback server listening");
        Ok(Self {
            target,
            local_addr,
            handle,
            task: Some(task),
            receiver: Some(receiver),
            state: ListenerState::Listening,
        })
    }

    /// The redirect URI to send to the authorization server.
    pub fn redirect_url(&self) -> &str {
        &self.target.redirect_url
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> ListenerState {
        self.state
    }

    /// Waits for the redirect or for `cancel` to fire.
    pub async fn wait(&mut self, cancel: &CancellationToken) -> Result<CallbackResult, SpotifyError> {
        let Some(receiver) = self.receiver.as_mut() else {
            return Err(SpotifyError::Auth("callback result already consumed".into()));
        };

        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(SpotifyError::Cancelled),
            result = receiver => result.map_err(|_| {
                SpotifyError::Auth("callback server stopped before a redirect arrived".into())
            }),
        };

        self.state = match &outcome {
            Ok(_) => {
                self.receiver = None;
                ListenerState::Completed
            }
            Err(SpotifyError::Cancelled) => ListenerState::Cancelled,
            Err(_) => {
                self.receiver = None;
                ListenerState::Errored
            }
        };
        outcome
    }

    /// Stops the server and releases the socket. Safe to call repeatedly.
    pub fn close(&mut self) {
        if let Some(task) = self.task.take() {
            self.handle.shutdown();
            task.abort();
            tracing::debug!(addr = %self.local_addr, "callback server closed");
        }
        self.state = ListenerState::Closed;
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        self.close();
    }
}

fn bind(target: &RedirectTarget) -> Result<TcpListener, SpotifyError> {
    let addr = match target.host.parse::<IpAddr>() {
        Ok(ip) => TcpListener::bind(SocketAddr::new(ip, target.port)),
        Err(_) => TcpListener::bind((target.host.as_str(), target.port)),
    };
    addr.map_err(|e| {
        SpotifyError::Config(format!("listen {}:{}: {e}", target.host, target.port))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_https_redirect() {
        let t = RedirectTarget::parse("https://localhost:8899/callback?x=1").unwrap();
        assert_eq!(t.host, "localhost");
        assert_eq!(t.port, 8899);
        assert_eq!(t.path, "/callback");
        assert_eq!(t.redirect_url, "https://localhost:8899/callback");
    }

    #[test]
    fn missing_path_defaults_to_callback() {
        let t = RedirectTarget::parse("https://127.0.0.1:9000").unwrap();
        assert_eq!(t.path, "/callback");
        assert_eq!(t.redirect_url, "https://127.0.0.1:9000/callback");
    }

    #[test]
    fn rejects_plain_http() {
        let err = RedirectTarget::parse("http://localhost:8899/callback").unwrap_err();
        assert!(matches!(err, SpotifyError::Config(_)));
    }

    #[test]
    fn rejects_implicit_port() {
        let err = RedirectTarget::parse("https://localhost/callback").unwrap_err();
        assert!(err.to_string().contains("explicit port"));
    }

    #[test]
    fn explicit_default_port_is_kept() {
        let t = RedirectTarget::parse("https://localhost:443/cb").unwrap();
        assert_eq!(t.port, 443);
        assert_eq!(t.path, "/cb");
    }

    #[test]
    fn ipv6_host_is_unbracketed() {
        let t = RedirectTarget::parse("https://[::1]:8899/callback").unwrap();
        assert_eq!(t.host, "::1");
    }
}
