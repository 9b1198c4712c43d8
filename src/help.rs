//! Static command help rendered locally for `help` and `?`.

use std::str::FromStr;

use strum_macros::{Display, EnumIter, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum CommandGroup {
    Generic,
    String,
    List,
    Set,
    SortedSet,
    Hash,
    Pubsub,
    Transactions,
    Connection,
    Server,
    Scripting,
}

pub struct CommandHelp {
    pub name: &'static str,
    pub params: &'static str,
    pub summary: &'static str,
    pub since: &'static str,
    pub group: CommandGroup,
}

macro_rules! help {
    ($name:expr, $params:expr, $summary:expr, $since:expr, $group:ident) => {
        CommandHelp {
            name: $name,
            params: $params,
            summary: $summary,
            since: $since,
            group: CommandGroup::$group,
        }
    };
}

pub static COMMANDS: &[CommandHelp] = &[
    help!("DEL", "key [key ...]", "Delete a key", "1.0.0", Generic),
    help!("EXISTS", "key [key ...]", "Determine if a key exists", "1.0.0", Generic),
    help!("EXPIRE", "key seconds", "Set a key's time to live in seconds", "1.0.0", Generic),
    help!("KEYS", "pattern", "Find all keys matching the given pattern", "1.0.0", Generic),
    help!("PERSIST", "key", "Remove the expiration from a key", "2.2.0", Generic),
    help!("RENAME", "key newkey", "Rename a key", "1.0.0", Generic),
    help!("SCAN", "cursor [MATCH pattern] [COUNT count]", "Incrementally iterate the keys space", "2.8.0", Generic),
    help!("TTL", "key", "Get the time to live for a key", "1.0.0", Generic),
    help!("TYPE", "key", "Determine the type stored at key", "1.0.0", Generic),
    help!("APPEND", "key value", "Append a value to a key", "2.0.0", String),
    help!("DECR", "key", "Decrement the integer value of a key by one", "1.0.0", String),
    help!("GET", "key", "Get the value of a key", "1.0.0", String),
    help!("INCR", "key", "Increment the integer value of a key by one", "1.0.0", String),
    help!("MGET", "key [key ...]", "Get the values of all the given keys", "1.0.0", String),
    help!("MSET", "key value [key value ...]", "Set multiple keys to multiple values", "1.0.1", String),
    help!("SET", "key value [EX seconds] [PX milliseconds] [NX|XX]", "Set the string value of a key", "1.0.0", String),
    help!("STRLEN", "key", "Get the length of the value stored in a key", "2.2.0", String),
    help!("LINDEX", "key index", "Get an element from a list by its index", "1.0.0", List),
    help!("LLEN", "key", "Get the length of a list", "1.0.0", List),
    help!("LPOP", "key", "Remove and get the first element in a list", "1.0.0", List),
    help!("LPUSH", "key value [value ...]", "Prepend one or multiple values to a list", "1.0.0", List),
    help!("LRANGE", "key start stop", "Get a range of elements from a list", "1.0.0", List),
    help!("RPUSH", "key value [value ...]", "Append one or multiple values to a list", "1.0.0", List),
    help!("SADD", "key member [member ...]", "Add one or more members to a set", "1.0.0", Set),
    help!("SCARD", "key", "Get the number of members in a set", "1.0.0", Set),
    help!("SISMEMBER", "key member", "Determine if a given value is a member of a set", "1.0.0", Set),
    help!("SMEMBERS", "key", "Get all the members in a set", "1.0.0", Set),
    help!("SREM", "key member [member ...]", "Remove one or more members from a set", "1.0.0", Set),
    help!("ZADD", "key score member [score member ...]", "Add one or more members to a sorted set", "1.2.0", SortedSet),
    help!("ZCARD", "key", "Get the number of members in a sorted set", "1.2.0", SortedSet),
    help!("ZRANGE", "key start stop [WITHSCORES]", "Return a range of members in a sorted set, by index", "1.2.0", SortedSet),
    help!("ZREM", "key member [member ...]", "Remove one or more members from a sorted set", "1.2.0", SortedSet),
    help!("ZSCORE", "key member", "Get the score associated with the given member", "1.2.0", SortedSet),
    help!("HDEL", "key field [field ...]", "Delete one or more hash fields", "2.0.0", Hash),
    help!("HGET", "key field", "Get the value of a hash field", "2.0.0", Hash),
    help!("HGETALL", "key", "Get all the fields and values in a hash", "2.0.0", Hash),
    help!("HLEN", "key", "Get the number of fields in a hash", "2.0.0", Hash),
    help!("HMSET", "key field value [field value ...]", "Set multiple hash fields to multiple values", "2.0.0", Hash),
    help!("HSET", "key field value", "Set the string value of a hash field", "2.0.0", Hash),
    help!("PSUBSCRIBE", "pattern [pattern ...]", "Listen for messages published to channels matching the given patterns", "2.0.0", Pubsub),
    help!("PUBLISH", "channel message", "Post a message to a channel", "2.0.0", Pubsub),
    help!("SUBSCRIBE", "channel [channel ...]", "Listen for messages published to the given channels", "2.0.0", Pubsub),
    help!("UNSUBSCRIBE", "[channel [channel ...]]", "Stop listening for messages posted to the given channels", "2.0.0", Pubsub),
    help!("DISCARD", "-", "Discard all commands issued after MULTI", "2.0.0", Transactions),
    help!("EXEC", "-", "Execute all commands issued after MULTI", "1.2.0", Transactions),
    help!("MULTI", "-", "Mark the start of a transaction block", "1.2.0", Transactions),
    help!("WATCH", "key [key ...]", "Watch the given keys to determine execution of the MULTI/EXEC block", "2.2.0", Transactions),
    help!("AUTH", "password", "Authenticate to the server", "1.0.0", Connection),
    help!("ECHO", "message", "Echo the given string", "1.0.0", Connection),
    help!("PING", "[message]", "Ping the server", "1.0.0", Connection),
    help!("QUIT", "-", "Close the connection", "1.0.0", Connection),
    help!("SELECT", "index", "Change the selected database for the current connection", "1.0.0", Connection),
    help!("BGSAVE", "-", "Asynchronously save the dataset to disk", "1.0.0", Server),
    help!("CLUSTER NODES", "-", "Get Cluster config for the node", "3.0.0", Server),
    help!("CONFIG GET", "parameter", "Get the value of a configuration parameter", "2.0.0", Server),
    help!("CONFIG SET", "parameter value", "Set a configuration parameter to the given value", "2.0.0", Server),
    help!("DBSIZE", "-", "Return the number of keys in the selected database", "1.0.0", Server),
    help!("FLUSHDB", "-", "Remove all keys from the current database", "1.0.0", Server),
    help!("INFO", "[section]", "Get information and statistics about the server", "1.0.0", Server),
    help!("MONITOR", "-", "Listen for all requests received by the server in real time", "1.0.0", Server),
    help!("SAVE", "-", "Synchronously save the dataset to disk", "1.0.0", Server),
    help!("SHUTDOWN", "[NOSAVE|SAVE]", "Synchronously save the dataset to disk and then shut down the server", "1.0.0", Server),
    help!("SYNC", "-", "Internal command used for replication", "1.0.0", Server),
    help!("EVAL", "script numkeys key [key ...] arg [arg ...]", "Execute a Lua script server side", "2.6.0", Scripting),
    help!("EVALSHA", "sha1 numkeys key [key ...] arg [arg ...]", "Execute a Lua script server side", "2.6.0", Scripting),
    help!("SCRIPT LOAD", "script", "Load the specified Lua script into the script cache", "2.6.0", Scripting),
];

const BANNER: &str = "To get help about Redis commands type:\n      \
\"help @<group>\" to get a list of commands in <group>\n      \
\"help <command>\" for help on <command>\n      \
\"quit\" to exit";

/// Renders the help for the words following `help` (or `?`).
pub fn render(topic: &[String]) -> String {
    if topic.is_empty() {
        return BANNER.to_string();
    }

    if let Some(group) = topic[0].strip_prefix('@') {
        return match CommandGroup::from_str(group) {
            Ok(group) => COMMANDS
                .iter()
                .filter(|c| c.group == group)
                .map(render_entry)
                .collect::<Vec<_>>()
                .join("\n\n"),
            Err(_) => format!("Unknown group '{}'", group),
        };
    }

    let name = topic.join(" ");
    match COMMANDS.iter().find(|c| c.name.eq_ignore_ascii_case(&name)) {
        Some(command) => render_entry(command),
        None => format!("No help found for '{}'", name),
    }
}

fn render_entry(command: &CommandHelp) -> String {
    format!(
        "  {} {}\n  summary: {}\n  since: {}\n  group: {}",
        command.name, command.params, command.summary, command.since, command.group
    )
}
