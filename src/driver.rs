//! The driver facade: the only entry point the rest of an application talks to.
//!
//! Every operation takes a [`Request`], reports its four progress checkpoints to a
//! [`ProgressSink`] and answers with exactly one [`Response`].

use bytes::Bytes;
use std::collections::HashMap;
use std::path::PathBuf;

use strum_macros::{Display, EnumString};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::args::quote_bytes;
use crate::commands::{
    self, check_error, ClusterNodes, Command, CommandKey, ConfigGet, ConfigSet, DbSize, Info, NKey,
    Save, Scan, Select, Shutdown, Ttl, Type,
};
use crate::config::{ConnectionConfig, Endpoint, Mode};
use crate::connection::Connection;
use crate::events::{
    ContentPage, DatabaseInfo, ExecuteParams, LoadContentParams, Progress, ProgressSink, Request,
    Response, ServerProperty,
};
use crate::executor;
use crate::interrupt::Interrupt;
use crate::modes;
use crate::reply::{CommandKind, ReplyTree};
use crate::server_info::{DiscoveryInfo, ServerInfo};
use crate::{Error, Result};

/// Owns one connection to a Redis server and runs requests against it, one at a time.
pub struct RedisDriver {
    conn: Connection,
}

impl RedisDriver {
    pub fn new(config: ConnectionConfig) -> RedisDriver {
        RedisDriver {
            conn: Connection::new(config),
        }
    }

    /// Wraps an existing connection, typically one over an in-memory stream.
    pub fn with_connection(conn: Connection) -> RedisDriver {
        RedisDriver { conn }
    }

    pub fn config(&self) -> &ConnectionConfig {
        self.conn.config()
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// A handle that interrupts the running request when triggered from another task.
    pub fn interrupt_handle(&self) -> Interrupt {
        self.conn.interrupt().clone()
    }

    fn begin<'a>(&self, initiator: Uuid, progress: &'a dyn ProgressSink) -> Progress<'a> {
        self.conn.interrupt().reset();
        Progress::start(initiator, progress)
    }

    fn require_connection(&self) -> Result<()> {
        if !self.conn.is_connected() {
            return Err(Error::NotConnected);
        }
        Ok(())
    }

    fn log_failure<R>(&self, operation: &str, response: &Response<R>) {
        match &response.error {
            Some(err) if err.is_interrupted() => info!("{} interrupted", operation),
            Some(err) => error!("{} failed: {}", operation, err),
            None => debug!("{} finished in {:?}", operation, response.elapsed),
        }
    }

    #[instrument(skip_all)]
    pub async fn connect(&mut self, req: Request<()>, progress: &dyn ProgressSink) -> Response<()> {
        let progress = self.begin(req.initiator, progress);
        let result = self.conn.connect(false).await;
        progress.connected();
        progress.received();
        let response = progress.finish(result);
        self.log_failure("Connect", &response);
        response
    }

    #[instrument(skip_all)]
    pub async fn disconnect(
        &mut self,
        req: Request<()>,
        progress: &dyn ProgressSink,
    ) -> Response<()> {
        let progress = self.begin(req.initiator, progress);
        self.conn.disconnect();
        progress.finish(Ok(()))
    }

    /// Runs every line of the request text in order. The tree gathered so far is returned even
    /// when a later line fails.
    #[instrument(skip_all)]
    pub async fn execute(
        &mut self,
        req: Request<ExecuteParams>,
        progress: &dyn ProgressSink,
    ) -> Response<ReplyTree> {
        let progress = self.begin(req.initiator, progress);
        let ExecuteParams { text, kind } = req.params;
        let mut tree = ReplyTree::new(text.clone());

        let result = async {
            self.require_connection()?;
            progress.connected();

            let root = tree.root();
            for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
                if self.conn.interrupt().is_interrupted() {
                    return Err(Error::Interrupted);
                }
                executor::execute_one(&mut self.conn, &mut tree, root, line, kind).await?;
            }
            progress.received();
            Ok::<_, Error>(())
        }
        .await;

        let response = progress.finish_partial(tree, result);
        self.log_failure("Execute", &response);
        response
    }

    /// Runs a key level operation, rendered for the key's type.
    #[instrument(skip_all)]
    pub async fn execute_command(
        &mut self,
        req: Request<CommandKey>,
        progress: &dyn ProgressSink,
    ) -> Response<ReplyTree> {
        let progress = self.begin(req.initiator, progress);
        let argv = req.params.argv();
        let mut tree = ReplyTree::new(req.params.to_string());

        let result = async {
            self.require_connection()?;
            progress.connected();
            let root = tree.root();
            executor::execute_binary(&mut self.conn, &mut tree, root, argv, CommandKind::Inner)
                .await?;
            progress.received();
            Ok::<_, Error>(())
        }
        .await;

        let response = progress.finish_partial(tree, result);
        self.log_failure("Key command", &response);
        response
    }

    /// Lists the logical databases. Only the selected one has its size filled in.
    #[instrument(skip_all)]
    pub async fn load_databases(
        &mut self,
        req: Request<()>,
        progress: &dyn ProgressSink,
    ) -> Response<Vec<DatabaseInfo>> {
        let progress = self.begin(req.initiator, progress);

        let result = async {
            self.require_connection()?;
            progress.connected();

            let current = self.conn.config().db_index;
            // Servers with CONFIG disabled still have the selected database.
            let count = match commands::run(&mut self.conn, &ConfigGet::new("databases")).await {
                Ok(pairs) => pairs
                    .into_iter()
                    .find(|(name, _)| name == "databases")
                    .and_then(|(_, value)| value.parse::<i64>().ok())
                    .unwrap_or(current + 1),
                Err(Error::Server(msg)) => {
                    warn!("CONFIG GET databases failed: {}", msg);
                    current + 1
                }
                Err(err) => return Err(err),
            };
            let size = commands::run(&mut self.conn, &DbSize).await?;
            progress.received();

            Ok::<_, Error>((0..count.max(current + 1))
                .map(|index| DatabaseInfo {
                    name: index.to_string(),
                    size: if index == current { size } else { 0 },
                    is_default: index == current,
                })
                .collect())
        }
        .await;

        let response = progress.finish(result);
        self.log_failure("Load databases", &response);
        response
    }

    /// Loads one page of keys with their type and TTL.
    #[instrument(skip_all, fields(pattern = %req.params.pattern, cursor = req.params.cursor))]
    pub async fn load_database_content(
        &mut self,
        req: Request<LoadContentParams>,
        progress: &dyn ProgressSink,
    ) -> Response<ContentPage> {
        let progress = self.begin(req.initiator, progress);
        let params = req.params;

        let result = async {
            self.require_connection()?;
            progress.connected();

            let scan = Scan::new(params.cursor)
                .pattern(Some(params.pattern.as_str()))
                .count(params.count);
            let page = commands::run(&mut self.conn, &scan).await?;
            let keys = self.key_metadata(page.keys).await?;
            let db_size = commands::run(&mut self.conn, &DbSize).await?;
            progress.received();

            Ok::<_, Error>(ContentPage {
                keys,
                cursor: page.cursor,
                db_size,
            })
        }
        .await;

        let response = progress.finish(result);
        self.log_failure("Load database content", &response);
        response
    }

    /// Pipelines `TYPE` and `TTL` for every key. Reply `2i` is the type of key `i`, reply `2i + 1`
    /// its TTL. All replies are read before any of them is interpreted.
    async fn key_metadata(&mut self, names: Vec<Bytes>) -> Result<Vec<NKey>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let batch: Vec<_> = names
            .iter()
            .flat_map(|name| {
                [
                    (Type::new(name.clone()).argv(), CommandKind::Inner),
                    (Ttl::new(name.clone()).argv(), CommandKind::Inner),
                ]
            })
            .collect();
        self.conn.send_pipeline(&batch).await?;

        let mut replies = Vec::with_capacity(batch.len());
        for _ in 0..batch.len() {
            replies.push(self.conn.read_frame().await?);
        }

        let mut keys = Vec::with_capacity(names.len());
        let mut replies = replies.into_iter();
        for name in names {
            let (Some(type_reply), Some(ttl_reply)) = (replies.next(), replies.next()) else {
                return Err(Error::Protocol("missing TYPE/TTL reply".to_string()));
            };
            let type_reply = check_error(&mut self.conn, type_reply)?;
            let ttl_reply = check_error(&mut self.conn, ttl_reply)?;

            let key_type = match Type::key_type(type_reply) {
                Ok(key_type) => key_type,
                Err(err) => {
                    warn!("Skipping key {}: {}", quote_bytes(&name), err);
                    continue;
                }
            };
            let mut key = NKey::new(name, key_type);
            key.ttl = Ttl::seconds(ttl_reply)?;
            keys.push(key);
        }

        Ok(keys)
    }

    #[instrument(skip_all, fields(index = req.params))]
    pub async fn set_default_database(
        &mut self,
        req: Request<i64>,
        progress: &dyn ProgressSink,
    ) -> Response<()> {
        let progress = self.begin(req.initiator, progress);
        let index = req.params;

        let result = async {
            self.require_connection()?;
            progress.connected();
            commands::run(&mut self.conn, &Select { index }).await?;
            self.conn.set_db_index(index);
            progress.received();
            Ok::<_, Error>(())
        }
        .await;

        let response = progress.finish(result);
        self.log_failure("Select database", &response);
        response
    }

    #[instrument(skip_all)]
    pub async fn load_server_info(
        &mut self,
        req: Request<()>,
        progress: &dyn ProgressSink,
    ) -> Response<ServerInfo> {
        let progress = self.begin(req.initiator, progress);

        let result = async {
            self.require_connection()?;
            progress.connected();
            let text = commands::run(&mut self.conn, &Info::default()).await?;
            progress.received();
            Ok::<_, Error>(ServerInfo::parse(&text))
        }
        .await;

        let response = progress.finish(result);
        self.log_failure("Load server info", &response);
        response
    }

    /// Every configuration parameter of the server.
    #[instrument(skip_all)]
    pub async fn load_server_property(
        &mut self,
        req: Request<()>,
        progress: &dyn ProgressSink,
    ) -> Response<Vec<ServerProperty>> {
        let progress = self.begin(req.initiator, progress);

        let result = async {
            self.require_connection()?;
            progress.connected();
            let pairs = commands::run(&mut self.conn, &ConfigGet::new("*")).await?;
            progress.received();
            Ok::<_, Error>(pairs
                .into_iter()
                .map(|(name, value)| ServerProperty { name, value })
                .collect())
        }
        .await;

        let response = progress.finish(result);
        self.log_failure("Load server properties", &response);
        response
    }

    #[instrument(skip_all, fields(property = %req.params.name))]
    pub async fn change_server_property(
        &mut self,
        req: Request<ServerProperty>,
        progress: &dyn ProgressSink,
    ) -> Response<ServerProperty> {
        let progress = self.begin(req.initiator, progress);
        let property = req.params;

        let result = async {
            self.require_connection()?;
            progress.connected();
            let set = ConfigSet::new(property.name.as_str(), property.value.as_str());
            commands::run(&mut self.conn, &set).await?;
            progress.received();
            Ok::<_, Error>(property)
        }
        .await;

        let response = progress.finish(result);
        self.log_failure("Change server property", &response);
        response
    }

    /// Forces a `SAVE` and copies the server's dump file to `path`.
    #[instrument(skip_all, fields(path = %req.params.display()))]
    pub async fn backup(
        &mut self,
        req: Request<PathBuf>,
        progress: &dyn ProgressSink,
    ) -> Response<PathBuf> {
        let progress = self.begin(req.initiator, progress);
        let path = req.params;

        let result = async {
            self.require_connection()?;
            let dump = self.dump_path()?;
            progress.connected();
            commands::run(&mut self.conn, &Save).await?;
            progress.received();
            tokio::fs::copy(&dump, &path).await?;
            info!("Backup of {} written to {}", dump.display(), path.display());
            Ok::<_, Error>(path)
        }
        .await;

        let response = progress.finish(result);
        self.log_failure("Backup", &response);
        response
    }

    /// Copies `path` over the server's dump file. The server picks it up on its next start.
    #[instrument(skip_all, fields(path = %req.params.display()))]
    pub async fn restore(
        &mut self,
        req: Request<PathBuf>,
        progress: &dyn ProgressSink,
    ) -> Response<PathBuf> {
        let progress = self.begin(req.initiator, progress);
        let path = req.params;

        let result = async {
            let dump = self.dump_path()?;
            progress.connected();
            tokio::fs::copy(&path, &dump).await?;
            progress.received();
            info!("Restored {} from {}", dump.display(), path.display());
            Ok::<_, Error>(path)
        }
        .await;

        let response = progress.finish(result);
        self.log_failure("Restore", &response);
        response
    }

    fn dump_path(&self) -> Result<PathBuf> {
        self.conn
            .config()
            .server_dump_path
            .clone()
            .ok_or_else(|| Error::Config("server dump path is not configured".to_string()))
    }

    /// Sets `requirepass`. Later handshakes use the new password.
    #[instrument(skip_all)]
    pub async fn change_password(
        &mut self,
        req: Request<String>,
        progress: &dyn ProgressSink,
    ) -> Response<()> {
        let progress = self.begin(req.initiator, progress);
        let password = req.params;

        let result = async {
            self.require_connection()?;
            progress.connected();
            commands::run(&mut self.conn, &ConfigSet::new("requirepass", password.as_str()))
                .await?;
            progress.received();
            self.conn
                .set_auth((!password.is_empty()).then_some(password));
            Ok::<_, Error>(())
        }
        .await;

        let response = progress.finish(result);
        self.log_failure("Change password", &response);
        response
    }

    #[instrument(skip_all, fields(max = req.params))]
    pub async fn change_max_connections(
        &mut self,
        req: Request<u32>,
        progress: &dyn ProgressSink,
    ) -> Response<u32> {
        let progress = self.begin(req.initiator, progress);
        let max = req.params;

        let result = async {
            self.require_connection()?;
            progress.connected();
            commands::run(&mut self.conn, &ConfigSet::new("maxclients", max.to_string())).await?;
            progress.received();
            Ok::<_, Error>(max)
        }
        .await;

        let response = progress.finish(result);
        self.log_failure("Change max connections", &response);
        response
    }

    /// Runs one protocol mode until it finishes, fails or is interrupted. The tree holds every
    /// node produced before the mode stopped.
    #[instrument(skip_all, fields(mode = %req.params))]
    pub async fn run_mode(
        &mut self,
        req: Request<Mode>,
        progress: &dyn ProgressSink,
    ) -> Response<ReplyTree> {
        let progress = self.begin(req.initiator, progress);
        let mode = req.params;
        let mut tree = ReplyTree::new(mode.to_string());

        let result = async {
            self.require_connection()?;
            progress.connected();
            let root = tree.root();
            modes::run(&mut self.conn, &mut tree, root, mode).await?;
            progress.received();
            Ok::<_, Error>(())
        }
        .await;

        let response = progress.finish_partial(tree, result);
        self.log_failure("Mode", &response);
        response
    }

    /// Runs every mode enabled in the configuration, in order, stopping at the first failure.
    #[instrument(skip_all)]
    pub async fn process_config_modes(
        &mut self,
        req: Request<()>,
        progress: &dyn ProgressSink,
    ) -> Response<ReplyTree> {
        let progress = self.begin(req.initiator, progress);
        let enabled = self.conn.config().enabled_modes();
        let mut tree = ReplyTree::new(self.conn.config().to_args_line());

        let result = async {
            self.require_connection()?;
            progress.connected();
            let root = tree.root();
            for mode in enabled {
                modes::run(&mut self.conn, &mut tree, root, mode).await?;
            }
            progress.received();
            Ok::<_, Error>(())
        }
        .await;

        let response = progress.finish_partial(tree, result);
        self.log_failure("Config modes", &response);
        response
    }

    /// Sends `SHUTDOWN`. The server closing the connection is the success case.
    #[instrument(skip_all)]
    pub async fn shutdown_server(
        &mut self,
        req: Request<()>,
        progress: &dyn ProgressSink,
    ) -> Response<()> {
        let progress = self.begin(req.initiator, progress);

        let result = async {
            self.require_connection()?;
            progress.connected();
            match commands::run(&mut self.conn, &Shutdown).await {
                Err(Error::NeedsReconnect) => {
                    info!("Server at {} shut down", self.conn.config().endpoint);
                    self.conn.disconnect();
                    Ok(())
                }
                Err(err) => Err(err),
                Ok(()) => Ok(()),
            }
        }
        .await;

        let response = progress.finish(result);
        self.log_failure("Shutdown", &response);
        response
    }

    /// Nodes of the cluster the connected server belongs to.
    #[instrument(skip_all)]
    pub async fn discovery_info(
        &mut self,
        req: Request<()>,
        progress: &dyn ProgressSink,
    ) -> Response<Vec<DiscoveryInfo>> {
        let progress = self.begin(req.initiator, progress);

        let result = async {
            self.require_connection()?;
            progress.connected();
            let text = commands::run(&mut self.conn, &ClusterNodes).await?;
            progress.received();
            let host = match &self.conn.config().endpoint {
                Endpoint::Tcp { host, .. } => host.clone(),
                Endpoint::Unix(_) => String::new(),
            };
            Ok::<_, Error>(DiscoveryInfo::parse_nodes(&host, &text))
        }
        .await;

        let response = progress.finish(result);
        self.log_failure("Discovery", &response);
        response
    }
}

/// Database engines a [`Driver`] can be built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum EngineKind {
    Redis,
}

/// The capabilities shared by every engine driver.
pub enum Driver {
    Redis(RedisDriver),
}

impl Driver {
    pub fn new(kind: EngineKind, config: ConnectionConfig) -> Driver {
        match kind {
            EngineKind::Redis => Driver::Redis(RedisDriver::new(config)),
        }
    }

    pub fn kind(&self) -> EngineKind {
        match self {
            Driver::Redis(_) => EngineKind::Redis,
        }
    }

    pub async fn connect(&mut self) -> Result<()> {
        match self {
            Driver::Redis(driver) => driver.connect(Request::new(()), &()).await.into_result(),
        }
    }

    pub async fn execute_raw(&mut self, text: &str) -> Result<ReplyTree> {
        match self {
            Driver::Redis(driver) => driver
                .execute(Request::new(ExecuteParams::user(text)), &())
                .await
                .into_result(),
        }
    }

    pub async fn load_databases(&mut self) -> Result<Vec<DatabaseInfo>> {
        match self {
            Driver::Redis(driver) => driver
                .load_databases(Request::new(()), &())
                .await
                .into_result(),
        }
    }

    pub async fn load_content(&mut self, params: LoadContentParams) -> Result<ContentPage> {
        match self {
            Driver::Redis(driver) => driver
                .load_database_content(Request::new(params), &())
                .await
                .into_result(),
        }
    }

    pub async fn server_info(&mut self) -> Result<ServerInfo> {
        match self {
            Driver::Redis(driver) => driver
                .load_server_info(Request::new(()), &())
                .await
                .into_result(),
        }
    }

    fn disconnect(&mut self) {
        match self {
            Driver::Redis(driver) => driver.conn.disconnect(),
        }
    }
}

/// Every open driver of an application, keyed by an id handed out on open.
#[derive(Default)]
pub struct Session {
    drivers: HashMap<Uuid, Driver>,
}

impl Session {
    pub fn new() -> Session {
        Session::default()
    }

    /// Registers a driver for `config` and returns its id. Nothing is connected yet.
    pub fn open(&mut self, kind: EngineKind, config: ConnectionConfig) -> Uuid {
        let id = Uuid::new_v4();
        debug!(%id, %kind, "Opening driver for {}", config.endpoint);
        self.drivers.insert(id, Driver::new(kind, config));
        id
    }

    pub fn get_mut(&mut self, id: &Uuid) -> Option<&mut Driver> {
        self.drivers.get_mut(id)
    }

    /// Disconnects and forgets the driver.
    pub fn close(&mut self, id: &Uuid) -> Option<Driver> {
        let mut driver = self.drivers.remove(id)?;
        driver.disconnect();
        Some(driver)
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}
