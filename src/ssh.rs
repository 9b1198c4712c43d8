//! SSH tunnelling over a `direct-tcpip` channel.
//!
//! The channel forwards to the Redis host as seen from the SSH server, and is used as the
//! connection stream. Both password and public key authentication are supported, the latter with
//! an optional passphrase for encrypted key files.

use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use russh::client::{self, Handle, Msg};
use russh::ChannelStream;
use russh_keys::key::{KeyPair, PublicKey};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::{debug, info};

use crate::config::{SshAuthMethod, SshInfo};
use crate::{Error, Result};

/// Origin announced for forwarded connections.
const ORIGINATOR_ADDRESS: &str = "127.0.0.1";
const ORIGINATOR_PORT: u32 = 0;

struct Client;

#[async_trait]
impl client::Handler for Client {
    type Error = russh::Error;

    // Host keys are not pinned.
    async fn check_server_key(
        &mut self,
        _server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        Ok(true)
    }
}

enum Credentials {
    Password(String),
    Key(Arc<KeyPair>),
}

impl Credentials {
    /// Loads what the configured method needs. Nothing touches the network here.
    fn resolve(ssh: &SshInfo) -> Result<Self> {
        match ssh.auth_method {
            SshAuthMethod::Password => {
                let password = ssh.password.clone().ok_or_else(|| {
                    Error::Config("ssh password authentication needs a password".into())
                })?;
                Ok(Credentials::Password(password))
            }
            SshAuthMethod::PublicKey => {
                let path = private_key_path(ssh).ok_or_else(|| {
                    Error::Config("ssh public key authentication needs a key file".into())
                })?;
                let key = russh_keys::load_secret_key(&path, ssh.passphrase.as_deref())
                    .map_err(|e| {
                        Error::Config(format!("cannot load ssh key {}: {e}", path.display()))
                    })?;
                Ok(Credentials::Key(Arc::new(key)))
            }
        }
    }
}

/// The configured private key, or else the public key path without its `.pub` extension.
fn private_key_path(ssh: &SshInfo) -> Option<PathBuf> {
    ssh.private_key
        .clone()
        .or_else(|| ssh.public_key.as_ref().map(|public| public.with_extension("")))
}

fn ssh_error(err: russh::Error) -> Error {
    match err {
        russh::Error::IO(e) => Error::Transport(e),
        err => Error::Transport(io::Error::other(err.to_string())),
    }
}

pub struct SshTunnel {
    stream: Pin<Box<ChannelStream<Msg>>>,
    // The channel dies with the session.
    _session: Handle<Client>,
}

impl SshTunnel {
    pub async fn open(ssh: &SshInfo, host: &str, port: u16) -> Result<Self> {
        let credentials = Credentials::resolve(ssh)?;

        debug!(ssh_host = %ssh.host, target = %format!("{host}:{port}"), "Opening SSH tunnel");
        let config = Arc::new(client::Config::default());
        let mut session = client::connect(config, (ssh.host.as_str(), ssh.port), Client)
            .await
            .map_err(ssh_error)?;

        let accepted = match credentials {
            Credentials::Password(password) => {
                session.authenticate_password(&ssh.user, password).await
            }
            Credentials::Key(key) => session.authenticate_publickey(&ssh.user, key).await,
        }
        .map_err(ssh_error)?;
        if !accepted {
            return Err(Error::Authentication(format!(
                "ssh server {} rejected user {}",
                ssh.host, ssh.user
            )));
        }

        let channel = session
            .channel_open_direct_tcpip(
                host,
                u32::from(port),
                ORIGINATOR_ADDRESS,
                ORIGINATOR_PORT,
            )
            .await
            .map_err(ssh_error)?;
        info!("SSH tunnel to {}:{} through {}", host, port, ssh.host);

        Ok(Self {
            stream: Box::pin(channel.into_stream()),
            _session: session,
        })
    }
}

impl AsyncRead for SshTunnel {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.stream.as_mut().poll_read(cx, buf)
    }
}

impl AsyncWrite for SshTunnel {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.stream.as_mut().poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.stream.as_mut().poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.stream.as_mut().poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[tokio::test]
    async fn password_auth_needs_a_password() {
        let mut ssh = SshInfo::new("bastion", "admin");
        ssh.auth_method = SshAuthMethod::Password;

        let err = SshTunnel::open(&ssh, "10.0.0.5", 6379).await.err().unwrap();

        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn password_auth_goes_to_the_server() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut ssh = SshInfo::new("127.0.0.1", "admin");
        ssh.port = port;
        ssh.auth_method = SshAuthMethod::Password;
        ssh.password = Some("secret".to_string());

        let err = SshTunnel::open(&ssh, "10.0.0.5", 6379).await.err().unwrap();

        assert!(matches!(err, Error::Transport(_)), "{err:?}");
    }

    #[tokio::test]
    async fn unreadable_key_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let key = dir.path().join("id_ed25519");
        std::fs::write(&key, "not a key").unwrap();

        let mut ssh = SshInfo::new("bastion", "admin");
        ssh.private_key = Some(key);
        ssh.passphrase = Some("hunter2".to_string());

        let err = SshTunnel::open(&ssh, "10.0.0.5", 6379).await.err().unwrap();

        assert!(matches!(err, Error::Config(ref msg) if msg.contains("id_ed25519")));
    }

    #[test]
    fn private_key_defaults_to_the_public_key_stem() {
        let mut ssh = SshInfo::new("bastion", "admin");
        assert_eq!(private_key_path(&ssh), None);

        ssh.public_key = Some("/home/admin/.ssh/id_rsa.pub".into());
        assert_eq!(
            private_key_path(&ssh).as_deref(),
            Some(Path::new("/home/admin/.ssh/id_rsa"))
        );

        ssh.private_key = Some("/keys/deploy".into());
        assert_eq!(private_key_path(&ssh).as_deref(), Some(Path::new("/keys/deploy")));
    }
}
