mod common;

use ::common::constants::{MAX_KEY_LEN, MAX_LINE_LEN};
use self::common::*;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unknown_command() -> anyhow::Result<()> {
    let coord = TestCoordinator::new().await?;

    assert_eq!(
        raw_text(&coord.addr(), b"FROB /a\n").await?,
        "ERROR: unknown command\n"
    );
    assert_eq!(
        raw_text(&coord.addr(), b"\n").await?,
        "ERROR: unknown command\n"
    );
    // Commands are case sensitive.
    assert_eq!(
        raw_text(&coord.addr(), b"list\n").await?,
        "ERROR: unknown command\n"
    );

    coord.shutdown().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_wrong_arity() -> anyhow::Result<()> {
    let coord = TestCoordinator::new().await?;

    for request in [&b"UPLOAD\n"[..], b"DOWNLOAD a b\n", b"LIST extra\n"] {
        let reply = raw_text(&coord.addr(), request).await?;
        assert!(reply.starts_with("ERROR: bad request: "), "{:?}", reply);
        assert!(reply.ends_with('\n'));
    }

    coord.shutdown().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_overlong_lines_are_rejected() -> anyhow::Result<()> {
    let coord = TestCoordinator::new().await?;

    let mut request = b"DOWNLOAD /".to_vec();
    request.extend(std::iter::repeat_n(b'a', MAX_LINE_LEN + 100));
    request.push(b'\n');
    assert_eq!(
        raw_text(&coord.addr(), &request).await?,
        "ERROR: bad request: command line too long\n"
    );

    let request = format!("DOWNLOAD /{}\n", "a".repeat(MAX_KEY_LEN));
    assert_eq!(
        raw_text(&coord.addr(), request.as_bytes()).await?,
        "ERROR: bad request: path length out of bounds\n"
    );

    coord.shutdown().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_register_and_nodes_over_the_wire() -> anyhow::Result<()> {
    let coord = TestCoordinator::new().await?;

    assert_eq!(
        raw_text(&coord.addr(), b"NODES\n").await?,
        "No nodes registered\n"
    );

    assert_eq!(
        raw_text(&coord.addr(), b"REGISTER 7 1234 10.0.0.7:7000\n").await?,
        "REGISTERED 7\n"
    );
    // Without an address the conventional port is assumed.
    assert_eq!(
        raw_text(&coord.addr(), b"REGISTER 2 99\n").await?,
        "REGISTERED 2\n"
    );

    assert_eq!(
        raw_text(&coord.addr(), b"NODES\n").await?,
        "2 127.0.0.1:9003 alive\n7 10.0.0.7:7000 alive\n"
    );

    coord.kill_liveness(7);
    assert_eq!(
        raw_text(&coord.addr(), b"NODES\n").await?,
        "2 127.0.0.1:9003 alive\n7 10.0.0.7:7000 down\n"
    );

    let reply = raw_text(&coord.addr(), b"REGISTER 0 1\n").await?;
    assert!(reply.starts_with("ERROR: bad request: "));

    let reply = raw_text(&coord.addr(), b"REGISTER 3 1 nohost\n").await?;
    assert!(reply.starts_with("ERROR: bad request: "));

    coord.shutdown().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_truncated_upload_stores_nothing() -> anyhow::Result<()> {
    let (coord, volumes) = cluster(&[], 2).await?;

    let reply = raw_text(&coord.addr(), b"UPLOAD /k\n10\nabc").await?;
    assert!(reply.starts_with("ERROR: "), "{:?}", reply);

    assert!(coord.client().list().await?.is_empty());
    assert!(volumes.iter().all(|v| !v.has_blob("/k")));

    shutdown_all(coord, volumes).await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_silent_connection_is_ignored() -> anyhow::Result<()> {
    let coord = TestCoordinator::new().await?;

    assert!(raw_exchange(&coord.addr(), b"").await?.is_empty());
    assert!(coord.client().list().await?.is_empty());

    coord.shutdown().await
}
