//! Browser orchestration against stand-in `dns-sd` and `avahi-browse` scripts.
#![cfg(unix)]

use dnssd_browser::{
    AvahiBrowser, DiscoveryBrowser, DiscoveryError, DiscoveryQuery, DnsSdBrowser,
    HAP_SERVICE_TYPE, LOCAL_DOMAIN,
};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Scripts are written then executed; a fork in a parallel test that
/// inherits the open write handle makes exec fail with ETXTBSY.
static SERIAL: Mutex<()> = Mutex::const_new(());

const BROWSE_WINDOW: Duration = Duration::from_millis(300);
const RESOLVE_WINDOW: Duration = Duration::from_millis(300);

/// `dns-sd -B` header plus one `Add` line per instance.
const BROWSE_HEADER: &str = r#"printf '%s\n' "Browsing for _hap._tcp.local." \
  "Timestamp     A/R    Flags  if Domain               Service Type         Instance Name""#;

fn add_line(instance: &str) -> String {
    format!(
        r#"printf '%s\n' "12:00:00.100  Add        3   4 local.               _hap._tcp.           {}""#,
        instance
    )
}

/// Write an executable shell script that appends its arguments to `calls.log`
/// before running `body`.
fn write_stub(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    let log = dir.path().join("calls.log");
    let script = format!("#!/bin/sh\necho \"$*\" >> '{}'\n{}\n", log.display(), body);
    std::fs::write(&path, script).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

fn calls(dir: &TempDir) -> String {
    std::fs::read_to_string(dir.path().join("calls.log")).unwrap_or_default()
}

fn bridge_query() -> DiscoveryQuery {
    DiscoveryQuery::new(HAP_SERVICE_TYPE, LOCAL_DOMAIN, r"SmartThings Bridge( \w+)?")
        .unwrap()
        .with_expected_port(51826)
}

fn dns_sd(path: &Path) -> DnsSdBrowser {
    DnsSdBrowser::new(RESOLVE_WINDOW).with_program(path.to_string_lossy())
}

/// A `dns-sd` whose browse step lists `instances`, and whose `-L` and `-q`
/// steps run `lookup` and `srv` before streaming forever.
fn dns_sd_script(instances: &[&str], lookup: &str, srv: &str) -> String {
    let adds: Vec<String> = instances.iter().map(|i| add_line(i)).collect();
    format!(
        "case \"$1\" in\n  -B)\n{}\n{}\n    exec sleep 30 ;;\n  -L)\n{}\n    exec sleep 30 ;;\n  -q)\n{}\n    exec sleep 30 ;;\nesac",
        BROWSE_HEADER,
        adds.join("\n"),
        lookup,
        srv
    )
}

#[tokio::test]
async fn test_dns_sd_lookup_resolves_instance() {
    let _serial = SERIAL.lock().await;
    let dir = tempfile::tempdir().unwrap();
    let body = dns_sd_script(
        &["SmartThings Bridge 1A2B"],
        r#"printf '%s\n' "12:00:01.050  SmartThings Bridge 1A2B._hap._tcp.local. can be reached at bridge.local.:51826 (interface 4)""#,
        ":",
    );
    let stub = write_stub(&dir, "dns-sd", &body);
    let deadline = Instant::now() + Duration::from_secs(10);

    let obs = dns_sd(&stub)
        .observe(&bridge_query(), BROWSE_WINDOW, deadline)
        .await
        .expect("observe failed");

    assert_eq!(obs.instances.len(), 1);
    assert_eq!(obs.instances[0].port, Some(51826));
    assert_eq!(obs.instances[0].host.as_deref(), Some("bridge.local."));
    let log = calls(&dir);
    assert!(log.contains("-B _hap._tcp local."), "{}", log);
    assert!(log.contains("-L SmartThings Bridge 1A2B _hap._tcp local."), "{}", log);
    assert!(!log.contains("-q"), "no SRV query needed: {}", log);
}

#[tokio::test]
async fn test_dns_sd_falls_back_to_srv_query() {
    let _serial = SERIAL.lock().await;
    let dir = tempfile::tempdir().unwrap();
    let body = dns_sd_script(
        &["SmartThings Bridge 1A2B"],
        ":",
        r#"printf '%s\n' "12:00:02.010  Add     2  4 SmartThings-Bridge._hap._tcp.local. SRV   IN      0 0 51826 bridge-host.local.""#,
    );
    let stub = write_stub(&dir, "dns-sd", &body);
    let deadline = Instant::now() + Duration::from_secs(10);

    let obs = dns_sd(&stub)
        .observe(&bridge_query(), BROWSE_WINDOW, deadline)
        .await
        .expect("observe failed");

    assert_eq!(obs.instances[0].port, Some(51826));
    assert_eq!(obs.instances[0].host.as_deref(), Some("bridge-host.local."));
    assert!(calls(&dir).contains("-q SmartThings Bridge 1A2B._hap._tcp.local SRV"));
}

#[tokio::test]
async fn test_dns_sd_stops_resolving_once_expected_port_found() {
    let _serial = SERIAL.lock().await;
    let dir = tempfile::tempdir().unwrap();
    let body = dns_sd_script(
        &[
            "SmartThings Bridge BBBB",
            "SmartThings Bridge AAAA",
            "SmartThings Bridge CCCC",
        ],
        r#"if [ "$2" = "SmartThings Bridge AAAA" ]; then
      printf '%s\n' "12:00:01.050  SmartThings Bridge AAAA._hap._tcp.local. can be reached at bridge.local.:51826 (interface 4)"
    fi"#,
        ":",
    );
    let stub = write_stub(&dir, "dns-sd", &body);
    let deadline = Instant::now() + Duration::from_secs(10);

    let obs = dns_sd(&stub)
        .observe(&bridge_query(), BROWSE_WINDOW, deadline)
        .await
        .expect("observe failed");

    let aaaa = obs
        .instances
        .iter()
        .find(|i| i.name == "SmartThings Bridge AAAA")
        .expect("instance browsed");
    assert_eq!(aaaa.port, Some(51826));
    let log = calls(&dir);
    assert!(log.contains("-L SmartThings Bridge BBBB"), "{}", log);
    assert!(!log.contains("CCCC"), "resolution should stop at the expected port: {}", log);
}

#[tokio::test]
async fn test_dns_sd_stale_instances_stay_within_deadline() {
    let _serial = SERIAL.lock().await;
    let dir = tempfile::tempdir().unwrap();
    let body = dns_sd_script(
        &[
            "SmartThings Bridge 0001",
            "SmartThings Bridge 0002",
            "SmartThings Bridge 0003",
        ],
        ":",
        ":",
    );
    let stub = write_stub(&dir, "dns-sd", &body);
    let start = Instant::now();
    let deadline = start + Duration::from_millis(1000);

    let obs = DnsSdBrowser::new(Duration::from_millis(400))
        .with_program(stub.to_string_lossy())
        .observe(&bridge_query(), Duration::from_millis(200), deadline)
        .await
        .expect("deadline is not an error");

    assert!(start.elapsed() < Duration::from_secs(2), "took {:?}", start.elapsed());
    assert_eq!(obs.instances.len(), 3);
    assert!(obs.instances.iter().all(|i| !i.is_resolved()));
    assert!(!calls(&dir).contains("-L SmartThings Bridge 0003"));
}

#[tokio::test]
async fn test_dns_sd_passed_deadline_spawns_nothing() {
    let _serial = SERIAL.lock().await;
    let dir = tempfile::tempdir().unwrap();
    let stub = write_stub(&dir, "dns-sd", "exec sleep 30");

    let obs = dns_sd(&stub)
        .observe(&bridge_query(), BROWSE_WINDOW, Instant::now())
        .await
        .expect("observe failed");

    assert!(!obs.service_type_seen());
    assert!(obs.window_elapsed);
    assert!(calls(&dir).is_empty());
}

#[tokio::test]
async fn test_avahi_reports_resolved_port() {
    let _serial = SERIAL.lock().await;
    let dir = tempfile::tempdir().unwrap();
    let stub = write_stub(
        &dir,
        "avahi-browse",
        r##"printf '%s\n' '+;eth0;IPv4;SmartThings\032Bridge\0321A2B;_hap._tcp;local' \
  '=;eth0;IPv4;SmartThings\032Bridge\0321A2B;_hap._tcp;local;bridge.local;192.168.1.20;40000;"c#=2"'"##,
    );
    let deadline = Instant::now() + Duration::from_secs(10);

    let obs = AvahiBrowser::new()
        .with_program(stub.to_string_lossy())
        .observe(&bridge_query(), Duration::from_secs(2), deadline)
        .await
        .expect("observe failed");

    assert_eq!(obs.instances.len(), 1);
    assert_eq!(obs.instances[0].name, "SmartThings Bridge 1A2B");
    assert_eq!(obs.instances[0].port, Some(40000));
    assert!(!obs.window_elapsed);
    assert!(calls(&dir).contains("-p -t -r -d local _hap._tcp"));
}

#[tokio::test]
async fn test_avahi_missing_program_is_unavailable() {
    let _serial = SERIAL.lock().await;
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("avahi-browse");
    let deadline = Instant::now() + Duration::from_secs(10);

    let err = AvahiBrowser::new()
        .with_program(missing.to_string_lossy())
        .observe(&bridge_query(), Duration::from_secs(1), deadline)
        .await
        .unwrap_err();

    assert!(matches!(err, DiscoveryError::BrowserUnavailable { .. }));
}
