use std::io;
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use socket2::{SockRef, TcpKeepalive};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, info, warn};

use crate::args::join_args;
use crate::codec::FrameCodec;
use crate::config::{ConnectionConfig, Endpoint};
use crate::frame::Frame;
use crate::interrupt::Interrupt;
use crate::materialize::{self, Effects};
use crate::reply::{CommandKind, NodeId, ReplyKind, ReplyTree};
use crate::ssh::SshTunnel;
use crate::{Error, Result};

const KEEPALIVE_TIME: Duration = Duration::from_secs(15);

/// Anything a connection can speak RESP over: a TCP or Unix socket, an SSH tunnel, or an
/// in-memory duplex in tests.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

/// Sticky per-session flags set by commands that switch the connection into streaming mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionFlags {
    pub monitor: bool,
    pub pubsub: bool,
    pub slave: bool,
}

pub struct Connection {
    config: ConnectionConfig,
    // `None` while disconnected. No read or write may be issued without a stream.
    stream: Option<Box<dyn AsyncStream>>,
    // Data is read from the socket into the read buffer. When a frame is parsed, the corresponding
    // data is removed from the buffer.
    buffer: BytesMut,
    codec: FrameCodec,
    authenticated: bool,
    reissue: bool,
    flags: SessionFlags,
    interrupt: Interrupt,
}

impl Connection {
    pub fn new(config: ConnectionConfig) -> Connection {
        Connection {
            config,
            stream: None,
            // Allocate the buffer with 4kb of capacity.
            buffer: BytesMut::with_capacity(4096),
            codec: FrameCodec::new(),
            authenticated: false,
            reissue: false,
            flags: SessionFlags::default(),
            interrupt: Interrupt::new(),
        }
    }

    /// Wraps an already established stream. No handshake is performed.
    pub fn with_stream<S>(config: ConnectionConfig, stream: S) -> Connection
    where
        S: AsyncStream + 'static,
    {
        let mut conn = Connection::new(config);
        conn.stream = Some(Box::new(stream));
        conn.authenticated = true;
        conn
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    /// Shares an externally owned interrupt flag with this connection.
    pub fn set_interrupt(&mut self, interrupt: Interrupt) {
        self.interrupt = interrupt;
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn flags(&self) -> SessionFlags {
        self.flags
    }

    pub(crate) fn flags_mut(&mut self) -> &mut SessionFlags {
        &mut self.flags
    }

    pub(crate) fn set_authenticated(&mut self, authenticated: bool) {
        self.authenticated = authenticated;
    }

    pub(crate) fn set_db_index(&mut self, db_index: i64) {
        self.config.db_index = db_index;
    }

    /// Secret used by the next handshake.
    pub(crate) fn set_auth(&mut self, auth: Option<String>) {
        self.config.auth = auth;
    }

    /// Points the connection at another TCP endpoint. Takes effect on the next connect.
    pub(crate) fn rebind(&mut self, host: impl Into<String>, port: u16) {
        self.config.set_host_port(host, port);
    }

    /// Returns and clears the flag asking for the last command to be sent again.
    pub(crate) fn take_reissue(&mut self) -> bool {
        std::mem::take(&mut self.reissue)
    }

    /// Opens the transport and performs AUTH and SELECT. A no-op when already connected, unless
    /// `force` is set.
    pub async fn connect(&mut self, force: bool) -> Result<()> {
        if self.is_connected() && !force {
            return Ok(());
        }

        self.disconnect();

        let stream = self.open().await?;
        self.stream = Some(stream);
        info!("Connected to {}", self.config.endpoint);

        self.handshake().await
    }

    /// Releases the socket. Idempotent.
    pub fn disconnect(&mut self) {
        if self.stream.take().is_some() {
            info!("Disconnected from {}", self.config.endpoint);
        }
        self.buffer.clear();
        self.authenticated = false;
        self.reissue = false;
        self.flags = SessionFlags::default();
    }

    async fn open(&self) -> Result<Box<dyn AsyncStream>> {
        match (&self.config.endpoint, &self.config.ssh) {
            (Endpoint::Tcp { host, port }, Some(ssh)) => {
                let tunnel = SshTunnel::open(ssh, host, *port).await?;
                Ok(Box::new(tunnel))
            }
            (Endpoint::Tcp { host, port }, None) => {
                let stream = TcpStream::connect((host.as_str(), *port)).await?;
                stream.set_nodelay(true)?;
                if let Err(e) = set_keepalive(&stream) {
                    warn!("Failed to enable TCP keep-alive: {}", e);
                }
                Ok(Box::new(stream))
            }
            #[cfg(unix)]
            (Endpoint::Unix(path), _) => {
                let stream = tokio::net::UnixStream::connect(path).await?;
                Ok(Box::new(stream))
            }
            #[cfg(not(unix))]
            (Endpoint::Unix(path), _) => Err(Error::Config(format!(
                "unix sockets are not supported on this platform: {}",
                path.display()
            ))),
        }
    }

    async fn handshake(&mut self) -> Result<()> {
        self.authenticated = false;

        if let Some(auth) = self.config.auth.clone() {
            match self.request(&["AUTH".to_string(), auth], CommandKind::Inner).await? {
                Frame::Error(msg) => return Err(Error::Authentication(msg)),
                _ => self.authenticated = true,
            }
        } else {
            self.authenticated = true;
        }

        if self.config.db_index != 0 {
            let select = ["SELECT".to_string(), self.config.db_index.to_string()];
            if let Frame::Error(msg) = self.request(&select, CommandKind::Inner).await? {
                return Err(Error::Server(msg));
            }
        }

        Ok(())
    }

    /// Sends one command and reads its reply.
    pub async fn request<A: AsRef<[u8]>>(
        &mut self,
        argv: &[A],
        kind: CommandKind,
    ) -> Result<Frame> {
        self.send_command(argv, kind).await?;
        self.read_frame().await
    }

    /// Sends one command without waiting for the reply.
    pub async fn send_command<A: AsRef<[u8]>>(
        &mut self,
        argv: &[A],
        kind: CommandKind,
    ) -> Result<()> {
        if argv.is_empty() {
            return Err(Error::Argument("empty command".to_string()));
        }

        debug!(?kind, command = %join_args(argv), "Sending command");
        self.write_frames(std::iter::once(command_frame(argv))).await
    }

    /// Sends every command back to back, then flushes once.
    pub async fn send_pipeline<A: AsRef<[u8]>>(
        &mut self,
        commands: &[(Vec<A>, CommandKind)],
    ) -> Result<()> {
        if commands.iter().any(|(argv, _)| argv.is_empty()) {
            return Err(Error::Argument("empty command in pipeline".to_string()));
        }

        for (argv, kind) in commands {
            debug!(?kind, command = %join_args(argv), "Queueing command");
        }

        let frames = commands.iter().map(|(argv, _)| command_frame(argv));
        self.write_frames(frames).await
    }

    async fn write_frames(&mut self, frames: impl Iterator<Item = Frame>) -> Result<()> {
        let mut out = BytesMut::new();
        for frame in frames {
            self.codec.encode(frame, &mut out)?;
        }
        self.write_raw(&out).await
    }

    /// Writes bytes as they are, bypassing command framing.
    pub async fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        let result = async {
            stream.write_all(bytes).await?;
            stream.flush().await
        }
        .await;

        if let Err(e) = result {
            let err = io_error(e);
            self.drop_stream();
            return Err(err);
        }
        Ok(())
    }

    /// Reads one complete reply.
    ///
    /// EOF or a reset from the peer is reported as [`Error::NeedsReconnect`]. Any transport or
    /// framing failure drops the socket.
    pub async fn read_frame(&mut self) -> Result<Frame> {
        let result = self.read_frame_inner().await;

        if let Err(ref err) = result {
            if err.is_fatal_io() || matches!(err, Error::Protocol(_)) {
                self.drop_stream();
            }
        }
        result
    }

    async fn read_frame_inner(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = self.codec.decode(&mut self.buffer)? {
                self.config.last_reply_kind = Some(ReplyKind::of(&frame));
                return Ok(frame);
            }

            let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
            let n = stream.read_buf(&mut self.buffer).await.map_err(io_error)?;
            if n == 0 {
                debug!("Connection closed by peer");
                return Err(Error::NeedsReconnect);
            }
        }
    }

    /// Like [`Self::read_frame`], but gives up with [`Error::Interrupted`] as soon as the interrupt
    /// flag is raised. Used by the streaming modes that may wait on a silent server forever.
    pub async fn read_frame_interruptible(&mut self) -> Result<Frame> {
        let interrupt = self.interrupt.clone();
        if interrupt.is_interrupted() {
            return Err(Error::Interrupted);
        }

        tokio::select! {
            frame = self.read_frame() => frame,
            _ = interrupt.interrupted() => Err(Error::Interrupted),
        }
    }

    /// Reads raw bytes into `dst`, serving buffered data first. Returns 0 on EOF.
    pub async fn read_raw(&mut self, dst: &mut [u8]) -> Result<usize> {
        if dst.is_empty() {
            return Ok(0);
        }

        if !self.buffer.is_empty() {
            let n = self.buffer.len().min(dst.len());
            dst[..n].copy_from_slice(&self.buffer[..n]);
            self.buffer.advance(n);
            return Ok(n);
        }

        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
        match stream.read(dst).await {
            Ok(n) => Ok(n),
            Err(e) => {
                let err = io_error(e);
                self.drop_stream();
                Err(err)
            }
        }
    }

    /// Materializes `frame` below `parent` and applies what it implies for this connection:
    /// a lost authentication or a cluster redirection.
    pub fn materialize(&mut self, tree: &mut ReplyTree, parent: NodeId, frame: Frame) -> Result<()> {
        let effects = materialize::materialize(tree, parent, frame, self.config.cluster_mode)?;
        self.apply(effects);
        Ok(())
    }

    fn apply(&mut self, effects: Effects) {
        if effects.auth_lost && self.authenticated {
            warn!("Server reports the session as not authenticated");
            self.authenticated = false;
        }

        if let Some(redirect) = effects.redirect {
            info!(
                slot = redirect.slot,
                "Redirected to {}:{}", redirect.host, redirect.port
            );
            self.config.set_host_port(redirect.host, redirect.port);
            self.reissue = true;
        }
    }

    fn drop_stream(&mut self) {
        self.stream = None;
        self.buffer.clear();
        self.authenticated = false;
        self.flags = SessionFlags::default();
    }
}

fn command_frame<A: AsRef<[u8]>>(argv: &[A]) -> Frame {
    Frame::command(argv.iter().map(|a| Bytes::copy_from_slice(a.as_ref())))
}

fn set_keepalive(stream: &TcpStream) -> io::Result<()> {
    let keepalive = TcpKeepalive::new().with_time(KEEPALIVE_TIME);
    #[cfg(target_os = "linux")]
    let keepalive = keepalive
        .with_interval(KEEPALIVE_TIME / 3)
        .with_retries(3);

    SockRef::from(stream).set_tcp_keepalive(&keepalive)
}

fn io_error(err: io::Error) -> Error {
    match err.kind() {
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::UnexpectedEof => Error::NeedsReconnect,
        _ => Error::Transport(err),
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::duplex;

    use super::*;

    #[tokio::test]
    async fn io_without_stream_is_a_hard_error() {
        let mut conn = Connection::new(ConnectionConfig::default());

        assert!(matches!(
            conn.read_frame().await,
            Err(Error::NotConnected)
        ));
        assert!(matches!(
            conn.write_raw(b"PING\r\n").await,
            Err(Error::NotConnected)
        ));
    }

    #[tokio::test]
    async fn eof_needs_reconnect_and_drops_stream() {
        let (client, server) = duplex(64);
        let mut conn = Connection::with_stream(ConnectionConfig::default(), client);
        drop(server);

        assert!(matches!(
            conn.read_frame().await,
            Err(Error::NeedsReconnect)
        ));
        assert!(!conn.is_connected());
        assert!(!conn.is_authenticated());
    }

    #[tokio::test]
    async fn raw_reads_drain_the_buffer_first() {
        let (client, mut server) = duplex(64);
        let mut conn = Connection::with_stream(ConnectionConfig::default(), client);

        server.write_all(b"+OK\r\nrest").await.unwrap();
        assert_eq!(conn.read_frame().await.unwrap(), Frame::Simple("OK".into()));

        let mut buf = [0u8; 4];
        let mut read = 0;
        while read < 4 {
            read += conn.read_raw(&mut buf[read..]).await.unwrap();
        }
        assert_eq!(&buf, b"rest");
    }

    #[tokio::test]
    async fn interrupt_stops_a_pending_read() {
        let (client, _server) = duplex(64);
        let mut conn = Connection::with_stream(ConnectionConfig::default(), client);
        let interrupt = conn.interrupt().clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            interrupt.interrupt();
        });

        assert!(matches!(
            conn.read_frame_interruptible().await,
            Err(Error::Interrupted)
        ));
        assert!(conn.is_connected());
    }
}
