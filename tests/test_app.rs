mod common;
use common::*;

use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .and_then(|l| l.local_addr())
        .map(|a| a.port())
        .unwrap()
}

fn config(registry_file: &std::path::Path, log_path: &std::path::Path, port: u16) -> Result<Config> {
    Config::from_yaml(&format!(
        r#"
server:
  host: 127.0.0.1
  port: {}
registry_file: {}
log_path: {}
power:
  interval_ms: 50
plot:
  enabled: true
  interval_ms: 50
  snapshot_file: {}
loglevel: debug
"#,
        port,
        registry_file.display(),
        log_path.display(),
        log_path.join("plot.json").display()
    ))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_app_derives_and_persists_power() -> Result<()> {
    common_setup();

    let registry = Factory::registry_file("10.0.0.1\t0\t110\tВ\n10.0.0.2\t0\t1\tА\n")?;
    let logs = tempfile::tempdir()?;
    let port = free_port();
    let config = config(registry.path(), logs.path(), port)?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let app = tokio::spawn(meterlink::app(shutdown_rx, config, None));

    let mut stream = None;
    for _ in 0..50 {
        if let Ok(s) = tokio::net::TcpStream::connect(("127.0.0.1", port)).await {
            stream = Some(s);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let mut stream = stream.expect("server never came up");
    stream
        .write_all(
            b"10.0.0.1\t2024.03.05 10:00:00.000000\t100.0\n10.0.0.2\t2024.03.05 10:00:00.200000\t0.5\n",
        )
        .await?;

    tokio::time::sleep(Duration::from_millis(300)).await;
    shutdown_tx.send(())?;
    let stats = app.await??;

    let stats = stats.lock().unwrap();
    assert_eq!(stats.readings_stored, 2);
    assert_eq!(stats.samples_derived, 1);
    assert!(stats.derivation_passes >= 1);

    let logs_written: Vec<_> = std::fs::read_dir(logs.path())?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().map_or(false, |ext| ext == "txt"))
        .collect();
    assert_eq!(logs_written.len(), 1);
    assert_eq!(
        std::fs::read_to_string(&logs_written[0])?,
        "50.0|2024-03-05 10:00:00.000000\n"
    );

    let frame: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(logs.path().join("plot.json"))?)?;
    assert_eq!(frame["samples"].as_array().map(|s| s.len()), Some(1));

    Ok(())
}

#[tokio::test]
async fn test_app_runtime_limit_stops_server() -> Result<()> {
    let registry = Factory::registry_file("10.0.0.1\t0\t110\tВ\n")?;
    let logs = tempfile::tempdir()?;
    let config = config(registry.path(), logs.path(), free_port())?;

    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let stats = meterlink::app(shutdown_rx, config, Some(Duration::from_millis(200))).await?;

    assert_eq!(stats.lock().unwrap().connections_accepted, 0);

    Ok(())
}

#[tokio::test]
async fn test_app_fails_without_registry() -> Result<()> {
    let logs = tempfile::tempdir()?;
    let config = config(&logs.path().join("missing.txt"), logs.path(), free_port())?;

    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let result = meterlink::app(shutdown_rx, config, Some(Duration::from_millis(100))).await;

    assert!(result.is_err());

    Ok(())
}

#[tokio::test]
async fn test_app_fails_when_port_is_taken() -> Result<()> {
    let registry = Factory::registry_file("10.0.0.1\t0\t110\tВ\n")?;
    let logs = tempfile::tempdir()?;
    let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let config = config(registry.path(), logs.path(), taken.local_addr()?.port())?;

    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let result = meterlink::app(shutdown_rx, config, Some(Duration::from_millis(100))).await;

    assert!(result.is_err());

    Ok(())
}
