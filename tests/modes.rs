mod common;

use std::time::Duration;

use redis_admin::commands::KeyType;
use redis_admin::config::ConnectionConfig;
use redis_admin::connection::Connection;
use redis_admin::frame::Frame;
use redis_admin::modes::{self, Mode};
use redis_admin::reply::{CommandKind, ReplyTree, ReplyValue};
use redis_admin::Error;

use common::{spawn_raw_server, spawn_server, Keyspace, Value};

async fn rdb_connection(reply: &[u8], path: &str) -> Connection {
    let addr = spawn_raw_server(reply.to_vec()).await;
    let mut config = ConnectionConfig::tcp(addr.ip().to_string(), addr.port());
    config.rdb_path = Some(path.to_string());
    let mut conn = Connection::new(config);
    conn.connect(false).await.unwrap();
    conn
}

fn sample_keyspace() -> Keyspace {
    Keyspace::new()
        .insert("h1", Value::Hash(vec![("f".into(), "v".into()), ("g".into(), "w".into())]))
        .insert("l1", Value::List(vec!["a".into(), "b".into(), "c".into()]))
        .insert("l2", Value::List(vec!["a".into()]))
        .insert("s1", Value::String("hello".into()))
        .insert("s2", Value::String("a".repeat(12)))
        .insert("s3", Value::String("1234567".into()))
}

#[tokio::test]
async fn rdb_transfer_writes_the_whole_payload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dump.rdb");
    let mut conn = rdb_connection(b"\n\n$5\r\nREDIS", path.to_str().unwrap()).await;
    let mut tree = ReplyTree::new("rdb");
    let root = tree.root();

    modes::rdb(&mut conn, &mut tree, root).await.unwrap();

    assert_eq!(std::fs::read(&path).unwrap(), b"REDIS");
}

#[tokio::test]
async fn rdb_transfer_fails_on_a_short_payload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dump.rdb");
    let mut conn = rdb_connection(b"$5\r\nRED", path.to_str().unwrap()).await;
    let mut tree = ReplyTree::new("rdb");
    let root = tree.root();

    let err = modes::rdb(&mut conn, &mut tree, root).await.unwrap_err();

    match err {
        Error::Transport(e) => assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof),
        other => panic!("unexpected error {other:?}"),
    }
    assert!(!conn.is_connected());
}

#[tokio::test]
async fn sync_header_cut_short_drops_the_connection() {
    let mut conn = rdb_connection(b"\n$12", "-").await;
    let mut tree = ReplyTree::new("rdb");
    let root = tree.root();

    let err = modes::rdb(&mut conn, &mut tree, root).await.unwrap_err();

    assert!(matches!(err, Error::Transport(ref e) if e.kind() == std::io::ErrorKind::UnexpectedEof));
    assert!(!conn.is_connected());
    assert!(!conn.is_authenticated());
}

#[tokio::test]
async fn rdb_transfer_to_memory() {
    let mut conn = rdb_connection(b"$5\r\nREDIS", "-").await;
    let mut tree = ReplyTree::new("rdb");
    let root = tree.root();

    modes::rdb(&mut conn, &mut tree, root).await.unwrap();

    let cmd = tree.first_child(root).unwrap();
    let payload = tree.first_child(cmd).unwrap();
    assert_eq!(
        tree.value(payload),
        &ReplyValue::Bulk(bytes::Bytes::from_static(b"REDIS"))
    );
}

#[tokio::test]
async fn refused_sync_surfaces_the_server_error() {
    let mut conn = rdb_connection(b"-ERR not allowed\r\n", "-").await;
    let mut tree = ReplyTree::new("rdb");
    let root = tree.root();

    let err = modes::rdb(&mut conn, &mut tree, root).await.unwrap_err();

    assert!(matches!(err, Error::Server(ref msg) if msg.contains("ERR not allowed")));
}

#[tokio::test]
async fn big_keys_reports_per_type_totals() {
    let keyspace = sample_keyspace();
    let addr = spawn_server(move |argv| Some(keyspace.handle(argv))).await;
    let mut conn = common::connect(addr).await;
    let mut tree = ReplyTree::new("bigkeys");
    let root = tree.root();

    let report = modes::big_keys(&mut conn, &mut tree, root).await.unwrap();

    assert_eq!(report.sampled, 6);
    let strings = report.summary(KeyType::String).unwrap();
    assert_eq!(strings.count, 3);
    assert_eq!(strings.biggest, Some(("s2".to_string(), 12)));
    assert_eq!(report.summary(KeyType::List).unwrap().count, 2);
    assert_eq!(report.summary(KeyType::Hash).unwrap().count, 1);
    assert_eq!(report.summary(KeyType::Set).unwrap().count, 0);

    let cmd = tree.first_child(root).unwrap();
    let text = tree.render(cmd, "\n");
    assert!(text.starts_with("Biggest string found 's2' has 12 bytes"), "{text}");
    assert!(text.contains("3 strings with 24 bytes"), "{text}");
}

#[tokio::test]
async fn big_keys_tolerates_keys_changing_type() {
    let keyspace = sample_keyspace()
        .insert("ghost", Value::List(vec!["x".into()]))
        .insert("events", Value::List(vec!["x".into()]));
    let addr = spawn_server(move |argv| match (argv[0].as_str(), argv.get(1).map(String::as_str)) {
        // Reported as a string, gone by the time STRLEN runs.
        ("TYPE", Some("ghost")) => Some(Frame::Simple("string".to_string())),
        ("TYPE", Some("events")) => Some(Frame::Simple("stream".to_string())),
        _ => Some(keyspace.handle(argv.clone())),
    })
    .await;
    let mut conn = common::connect(addr).await;
    let mut tree = ReplyTree::new("bigkeys");
    let root = tree.root();

    let report = modes::big_keys(&mut conn, &mut tree, root).await.unwrap();

    let strings = report.summary(KeyType::String).unwrap();
    assert_eq!(strings.count, 4);
    assert_eq!(strings.total_size, 24);
    assert_eq!(report.sampled, 7);
}

#[tokio::test]
async fn scan_mode_visits_every_matching_key() {
    let keyspace = sample_keyspace();
    let addr = spawn_server(move |argv| Some(keyspace.handle(argv))).await;
    let mut config = ConnectionConfig::tcp(addr.ip().to_string(), addr.port());
    config.pattern = Some("s*".to_string());
    let mut conn = Connection::new(config);
    conn.connect(false).await.unwrap();
    let mut tree = ReplyTree::new("scan");
    let root = tree.root();

    modes::run(&mut conn, &mut tree, root, Mode::Scan)
        .await
        .unwrap();

    let cmd = tree.first_child(root).unwrap();
    assert_eq!(tree.render(cmd, ","), "s1,s2,s3");
}

#[tokio::test]
async fn scan_mode_rejects_a_non_array_reply() {
    let addr = spawn_server(|_| Some(Frame::Simple("OK".to_string()))).await;
    let mut conn = common::connect(addr).await;
    let mut tree = ReplyTree::new("scan");
    let root = tree.root();

    let err = modes::scan(&mut conn, &mut tree, root).await.unwrap_err();

    assert!(matches!(err, Error::Protocol(_)));
}

#[tokio::test]
async fn interrupted_latency_leaves_the_connection_usable() {
    let addr = spawn_server(|_| Some(Frame::Simple("PONG".to_string()))).await;
    let mut conn = common::connect(addr).await;
    let interrupt = conn.interrupt().clone();
    let mut tree = ReplyTree::new("latency");
    let root = tree.root();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        interrupt.interrupt();
    });

    let err = modes::latency(&mut conn, &mut tree, root).await.unwrap_err();
    assert!(err.is_interrupted());

    let cmd = tree.first_child(root).unwrap();
    let summary = tree.render(cmd, "\n");
    assert!(summary.starts_with("min: "), "{summary}");

    // No reply was left unread: the next request gets its own answer.
    conn.interrupt().reset();
    let reply = conn
        .request(&["PING".to_string()], CommandKind::Inner)
        .await
        .unwrap();
    assert_eq!(reply, Frame::Simple("PONG".to_string()));
}

#[tokio::test]
async fn stat_mode_appends_one_line_per_sample() {
    let addr = spawn_server(|_| {
        Some(common::bulk(
            "# Clients\r\nconnected_clients:1\r\n# Keyspace\r\ndb0:keys=4,expires=0,avg_ttl=0\r\n",
        ))
    })
    .await;
    let mut config = ConnectionConfig::tcp(addr.ip().to_string(), addr.port());
    config.interval = Some(Duration::from_millis(10));
    let mut conn = Connection::new(config);
    conn.connect(false).await.unwrap();
    let interrupt = conn.interrupt().clone();
    let mut tree = ReplyTree::new("stat");
    let root = tree.root();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(60)).await;
        interrupt.interrupt();
    });

    let err = modes::stat(&mut conn, &mut tree, root).await.unwrap_err();
    assert!(err.is_interrupted());

    let cmd = tree.first_child(root).unwrap();
    let lines = tree.children(cmd);
    assert!(!lines.is_empty());
    let first = tree.render(lines[0], "");
    assert!(first.starts_with("keys 4 used_memory: not found connected_clients: 1"), "{first}");
}
