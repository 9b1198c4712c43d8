//! Typed views of `INFO` and `CLUSTER NODES` output.

use std::collections::HashMap;

/// Value of `field` in raw `INFO` text, searched across all sections.
pub fn info_field<'a>(text: &'a str, field: &str) -> Option<&'a str> {
    text.lines().find_map(|line| {
        let (name, value) = line.trim_end_matches('\r').split_once(':')?;
        (name == field).then_some(value)
    })
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerSection {
    pub redis_version: String,
    pub redis_mode: String,
    pub os: String,
    pub arch_bits: u32,
    pub process_id: u32,
    pub run_id: String,
    pub tcp_port: u16,
    pub uptime_in_seconds: u64,
    pub uptime_in_days: u64,
    pub hz: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientsSection {
    pub connected_clients: u32,
    pub client_longest_output_list: u32,
    pub client_biggest_input_buf: u32,
    pub blocked_clients: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemorySection {
    pub used_memory: u64,
    pub used_memory_human: String,
    pub used_memory_rss: u64,
    pub used_memory_peak: u64,
    pub used_memory_peak_human: String,
    pub used_memory_lua: u64,
    pub mem_fragmentation_ratio: f64,
    pub mem_allocator: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistenceSection {
    pub loading: bool,
    pub rdb_changes_since_last_save: u64,
    pub rdb_bgsave_in_progress: bool,
    pub rdb_last_save_time: u64,
    pub rdb_last_bgsave_status: String,
    pub aof_enabled: bool,
    pub aof_rewrite_in_progress: bool,
    pub aof_rewrite_scheduled: bool,
    pub aof_last_bgrewrite_status: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsSection {
    pub total_connections_received: u64,
    pub total_commands_processed: u64,
    pub instantaneous_ops_per_sec: u64,
    pub rejected_connections: u64,
    pub expired_keys: u64,
    pub evicted_keys: u64,
    pub keyspace_hits: u64,
    pub keyspace_misses: u64,
    pub pubsub_channels: u64,
    pub pubsub_patterns: u64,
    pub latest_fork_usec: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplicationSection {
    pub role: String,
    pub connected_slaves: u32,
    pub master_repl_offset: u64,
    pub repl_backlog_active: bool,
    pub repl_backlog_size: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CpuSection {
    pub used_cpu_sys: f64,
    pub used_cpu_user: f64,
    pub used_cpu_sys_children: f64,
    pub used_cpu_user_children: f64,
}

/// One `dbN:keys=..,expires=..,avg_ttl=..` line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyspaceEntry {
    pub db: u32,
    pub keys: u64,
    pub expires: u64,
    pub avg_ttl: u64,
}

/// Parsed `INFO` output. Unknown fields are ignored and missing ones keep their default.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerInfo {
    pub server: ServerSection,
    pub clients: ClientsSection,
    pub memory: MemorySection,
    pub persistence: PersistenceSection,
    pub stats: StatsSection,
    pub replication: ReplicationSection,
    pub cpu: CpuSection,
    pub keyspace: Vec<KeyspaceEntry>,
}

struct Fields<'a>(HashMap<&'a str, &'a str>);

impl<'a> Fields<'a> {
    fn string(&self, name: &str) -> String {
        self.0.get(name).map(|v| v.to_string()).unwrap_or_default()
    }

    fn number<T: std::str::FromStr + Default>(&self, name: &str) -> T {
        self.0
            .get(name)
            .and_then(|v| v.parse().ok())
            .unwrap_or_default()
    }

    fn flag(&self, name: &str) -> bool {
        self.number::<u32>(name) != 0
    }
}

impl ServerInfo {
    pub fn parse(text: &str) -> Self {
        let mut fields = HashMap::new();
        let mut keyspace = Vec::new();

        for line in text.lines() {
            let line = line.trim_end_matches('\r');
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            if let Some(entry) = parse_keyspace(name, value) {
                keyspace.push(entry);
            } else {
                fields.insert(name, value);
            }
        }

        let f = Fields(fields);
        Self {
            server: ServerSection {
                redis_version: f.string("redis_version"),
                redis_mode: f.string("redis_mode"),
                os: f.string("os"),
                arch_bits: f.number("arch_bits"),
                process_id: f.number("process_id"),
                run_id: f.string("run_id"),
                tcp_port: f.number("tcp_port"),
                uptime_in_seconds: f.number("uptime_in_seconds"),
                uptime_in_days: f.number("uptime_in_days"),
                hz: f.number("hz"),
            },
            clients: ClientsSection {
                connected_clients: f.number("connected_clients"),
                client_longest_output_list: f.number("client_longest_output_list"),
                client_biggest_input_buf: f.number("client_biggest_input_buf"),
                blocked_clients: f.number("blocked_clients"),
            },
            memory: MemorySection {
                used_memory: f.number("used_memory"),
                used_memory_human: f.string("used_memory_human"),
                used_memory_rss: f.number("used_memory_rss"),
                used_memory_peak: f.number("used_memory_peak"),
                used_memory_peak_human: f.string("used_memory_peak_human"),
                used_memory_lua: f.number("used_memory_lua"),
                mem_fragmentation_ratio: f.number("mem_fragmentation_ratio"),
                mem_allocator: f.string("mem_allocator"),
            },
            persistence: PersistenceSection {
                loading: f.flag("loading"),
                rdb_changes_since_last_save: f.number("rdb_changes_since_last_save"),
                rdb_bgsave_in_progress: f.flag("rdb_bgsave_in_progress"),
                rdb_last_save_time: f.number("rdb_last_save_time"),
                rdb_last_bgsave_status: f.string("rdb_last_bgsave_status"),
                aof_enabled: f.flag("aof_enabled"),
                aof_rewrite_in_progress: f.flag("aof_rewrite_in_progress"),
                aof_rewrite_scheduled: f.flag("aof_rewrite_scheduled"),
                aof_last_bgrewrite_status: f.string("aof_last_bgrewrite_status"),
            },
            stats: StatsSection {
                total_connections_received: f.number("total_connections_received"),
                total_commands_processed: f.number("total_commands_processed"),
                instantaneous_ops_per_sec: f.number("instantaneous_ops_per_sec"),
                rejected_connections: f.number("rejected_connections"),
                expired_keys: f.number("expired_keys"),
                evicted_keys: f.number("evicted_keys"),
                keyspace_hits: f.number("keyspace_hits"),
                keyspace_misses: f.number("keyspace_misses"),
                pubsub_channels: f.number("pubsub_channels"),
                pubsub_patterns: f.number("pubsub_patterns"),
                latest_fork_usec: f.number("latest_fork_usec"),
            },
            replication: ReplicationSection {
                role: f.string("role"),
                connected_slaves: f.number("connected_slaves"),
                master_repl_offset: f.number("master_repl_offset"),
                repl_backlog_active: f.flag("repl_backlog_active"),
                repl_backlog_size: f.number("repl_backlog_size"),
            },
            cpu: CpuSection {
                used_cpu_sys: f.number("used_cpu_sys"),
                used_cpu_user: f.number("used_cpu_user"),
                used_cpu_sys_children: f.number("used_cpu_sys_children"),
                used_cpu_user_children: f.number("used_cpu_user_children"),
            },
            keyspace,
        }
    }
}

fn parse_keyspace(name: &str, value: &str) -> Option<KeyspaceEntry> {
    let db = name.strip_prefix("db")?.parse().ok()?;
    let mut entry = KeyspaceEntry {
        db,
        ..Default::default()
    };

    for pair in value.split(',') {
        let (k, v) = pair.split_once('=')?;
        let v = v.parse().unwrap_or_default();
        match k {
            "keys" => entry.keys = v,
            "expires" => entry.expires = v,
            "avg_ttl" => entry.avg_ttl = v,
            _ => {}
        }
    }

    Some(entry)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    Master,
    Slave,
}

/// One node of a cluster, as listed by `CLUSTER NODES`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryInfo {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub role: NodeRole,
    /// The node this connection talks to.
    pub is_self: bool,
}

impl DiscoveryInfo {
    /// Parses `CLUSTER NODES` output. Loopback addresses are replaced by `parent_host` so the
    /// result can be used from outside the server host.
    pub fn parse_nodes(parent_host: &str, text: &str) -> Vec<DiscoveryInfo> {
        text.lines()
            .filter_map(|line| {
                let mut words = line.split(' ');
                let id = words.next()?.to_string();
                // `ip:port@cport` on newer servers.
                let addr = words.next()?.split('@').next()?;
                let flags = words.next()?;

                let (host, port) = addr.rsplit_once(':')?;
                let port = port.parse().ok()?;
                let host = if host.is_empty() || host == "127.0.0.1" || host == "localhost" {
                    parent_host.to_string()
                } else {
                    host.to_string()
                };

                Some(DiscoveryInfo {
                    id,
                    host,
                    port,
                    role: if flags.contains("slave") {
                        NodeRole::Slave
                    } else {
                        NodeRole::Master
                    },
                    is_self: flags.contains("myself"),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INFO: &str = "# Server\r\nredis_version:7.2.4\r\nredis_mode:standalone\r\ntcp_port:6379\r\n\r\n# Clients\r\nconnected_clients:3\r\nblocked_clients:1\r\n\r\n# Memory\r\nused_memory:1048576\r\nused_memory_human:1.00M\r\nmem_fragmentation_ratio:1.25\r\n\r\n# Persistence\r\nrdb_bgsave_in_progress:1\r\naof_rewrite_in_progress:0\r\n\r\n# Stats\r\ntotal_commands_processed:120\r\n\r\n# Replication\r\nrole:master\r\n\r\n# Keyspace\r\ndb0:keys=10,expires=2,avg_ttl=300\r\ndb3:keys=1,expires=0,avg_ttl=0\r\n";

    #[test]
    fn parse_sections() {
        let info = ServerInfo::parse(INFO);

        assert_eq!(info.server.redis_version, "7.2.4");
        assert_eq!(info.server.tcp_port, 6379);
        assert_eq!(info.clients.connected_clients, 3);
        assert_eq!(info.memory.used_memory, 1048576);
        assert_eq!(info.memory.mem_fragmentation_ratio, 1.25);
        assert!(info.persistence.rdb_bgsave_in_progress);
        assert!(!info.persistence.aof_rewrite_in_progress);
        assert_eq!(info.stats.total_commands_processed, 120);
        assert_eq!(info.replication.role, "master");
        assert_eq!(info.cpu, CpuSection::default());
    }

    #[test]
    fn parse_keyspace_lines() {
        let info = ServerInfo::parse(INFO);

        assert_eq!(
            info.keyspace,
            vec![
                KeyspaceEntry {
                    db: 0,
                    keys: 10,
                    expires: 2,
                    avg_ttl: 300
                },
                KeyspaceEntry {
                    db: 3,
                    keys: 1,
                    expires: 0,
                    avg_ttl: 0
                },
            ]
        );
    }

    #[test]
    fn raw_field_lookup() {
        assert_eq!(info_field(INFO, "used_memory"), Some("1048576"));
        assert_eq!(info_field(INFO, "db3"), Some("keys=1,expires=0,avg_ttl=0"));
        assert_eq!(info_field(INFO, "missing"), None);
    }

    #[test]
    fn parse_cluster_nodes() {
        let text = "07c37dfe 127.0.0.1:30004@31004 slave e7d1eecc 0 1426238317239 4 connected\n\
                    e7d1eecc 10.0.0.2:30001@31001 myself,master - 0 0 1 connected 0-5460\n";

        let nodes = DiscoveryInfo::parse_nodes("10.0.0.9", text);

        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].host, "10.0.0.9");
        assert_eq!(nodes[0].port, 30004);
        assert_eq!(nodes[0].role, NodeRole::Slave);
        assert!(!nodes[0].is_self);
        assert_eq!(nodes[1].host, "10.0.0.2");
        assert_eq!(nodes[1].role, NodeRole::Master);
        assert!(nodes[1].is_self);
    }
}
