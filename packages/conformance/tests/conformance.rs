//! End-to-end conformance tests for the Net-Insight-Monitor ingestion API.
//!
//! Each test spawns an ephemeral in-process server (real TCP, real HTTP) via
//! [`netinsight_conformance`] and exercises the API with a `reqwest` client.
//!
//! Keys are issued directly in storage, the way an operator would with
//! `netinsight issue-key`, before any agent request is made.
//!
//! # Coverage
//!
//! | Test | Behaviour |
//! |------|-----------|
//! | `first_submission_creates_profile_agent_and_sample` | concrete scenario, first POST |
//! | `verbatim_repeat_is_acknowledged_and_ignored` | idempotent re-delivery |
//! | `missing_key_is_401_and_writes_nothing` | AuthGate |
//! | `unknown_key_is_403_and_writes_nothing` | AuthGate |
//! | `missing_timestamp_is_400_and_writes_nothing` | payload validation |
//! | `missing_hostname_is_400` | payload validation |
//! | `sentinels_become_null` | extraction |
//! | `markup_is_stored_escaped` | extraction |
//! | `sla_flag_set_only_for_met` | sample assembly |
//! | `shared_key_registers_many_hostnames` | permissive key binding |
//! | `strict_binding_rejects_foreign_hostname` | strict key binding |
//! | `concurrent_first_submissions_create_one_profile` | immediate-lock registry |
//! | `concurrent_identical_submissions_store_one_sample` | immediate-lock writer |
//! | `second_agent_gets_own_profile` | registry per hostname |
//! | `profile_config_by_key_and_hostname` | config endpoint |
//! | `csv_export_is_ordered_and_drops_empty_jitter` | CSV export |
//! | `csv_export_of_empty_profile` | CSV export |
//! | `errors_never_leak_internals` | error envelope |

use std::sync::Arc;

use netinsight_api::{messages, API_KEY_HEADER};
use netinsight_conformance::{spawn_memory_server, spawn_sqlite_server};
use netinsight_server::{storage::Cell, ServerConfig, Storage};
use serde_json::{json, Value};

const KEY: &str = "conformance-fleet-key";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn make_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()
        .unwrap()
}

async fn seed_key(storage: &Arc<dyn Storage>) {
    storage.issue_key("operator-seed", KEY).await.unwrap();
}

async fn post_metrics(
    client: &reqwest::Client,
    base: &str,
    key: Option<&str>,
    body: String,
) -> (u16, Value) {
    let mut req = client
        .post(format!("{base}/v1/metrics"))
        .header("content-type", "application/json")
        .body(body);
    if let Some(k) = key {
        req = req.header(API_KEY_HEADER, k);
    }
    let resp = req.send().await.unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

fn scenario_body() -> String {
    json!({
        "timestamp": "2024-01-01T00:00:00Z",
        "agent_hostname": "agent-1",
        "ping_summary": { "status": "OK", "average_rtt_ms": 45.2 }
    })
    .to_string()
}

fn col(table: &netinsight_server::storage::SampleTable, name: &str) -> usize {
    table.columns.iter().position(|c| c == name).unwrap()
}

async fn total_samples(storage: &Arc<dyn Storage>) -> usize {
    let mut n = 0;
    for p in storage.list_profiles().await.unwrap() {
        n += storage.export_samples(p.id).await.unwrap().rows.len();
    }
    n
}

// ---------------------------------------------------------------------------
// Ingestion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn first_submission_creates_profile_agent_and_sample() {
    let (base, storage, _dir) = spawn_sqlite_server(ServerConfig::default()).await;
    seed_key(&storage).await;
    let client = make_client();

    let (status, body) = post_metrics(&client, &base, Some(KEY), scenario_body()).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "success");

    let profile = storage
        .find_profile_by_hostname("agent-1")
        .await
        .unwrap()
        .expect("profile for agent-1");
    assert_eq!(profile.agent_name, "agent-1");
    assert_eq!(profile.agent_identifier, "agent-1");
    assert_eq!(profile.agent_type, "Client");
    assert!(profile.is_active);
    assert!(profile.last_heard_from.is_some());

    let agents = storage.list_agents(profile.id).await.unwrap();
    assert_eq!(agents.len(), 1);
    assert_eq!(agents[0].agent_source_ip, "invalid");

    let table = storage.export_samples(profile.id).await.unwrap();
    assert_eq!(table.rows.len(), 1);
    let row = &table.rows[0];
    assert_eq!(row[col(&table, "avg_rtt_ms")], Cell::Real(45.2));
    assert_eq!(row[col(&table, "overall_connectivity")], Cell::Text("OK".into()));
    for measurement in netinsight::SAMPLE_FIELDS
        .iter()
        .map(|f| f.column)
        .filter(|c| *c != "avg_rtt_ms" && *c != "overall_connectivity")
    {
        assert!(row[col(&table, measurement)].is_null(), "{measurement}");
    }
}

#[tokio::test]
async fn verbatim_repeat_is_acknowledged_and_ignored() {
    let (base, storage, _dir) = spawn_sqlite_server(ServerConfig::default()).await;
    seed_key(&storage).await;
    let client = make_client();

    for _ in 0..2 {
        let (status, body) = post_metrics(&client, &base, Some(KEY), scenario_body()).await;
        assert_eq!(status, 200);
        assert_eq!(body["message"], messages::METRICS_RECEIVED);
    }
    assert_eq!(total_samples(&storage).await, 1);
}

#[tokio::test]
async fn missing_key_is_401_and_writes_nothing() {
    let (base, storage) = spawn_memory_server().await;
    seed_key(&storage).await;

    let (status, body) = post_metrics(&make_client(), &base, None, scenario_body()).await;
    assert_eq!(status, 401);
    assert_eq!(body["status"], "error");
    assert_eq!(body["message"], messages::API_KEY_MISSING);
    assert!(storage.find_profile_by_hostname("agent-1").await.unwrap().is_none());
}

#[tokio::test]
async fn unknown_key_is_403_and_writes_nothing() {
    let (base, storage) = spawn_memory_server().await;
    seed_key(&storage).await;

    let (status, body) = post_metrics(&make_client(), &base, Some("bogus"), scenario_body()).await;
    assert_eq!(status, 403);
    assert_eq!(body["message"], messages::INVALID_API_KEY);
    assert!(storage.find_profile_by_hostname("agent-1").await.unwrap().is_none());
}

#[tokio::test]
async fn missing_timestamp_is_400_and_writes_nothing() {
    let (base, storage) = spawn_memory_server().await;
    seed_key(&storage).await;

    let body = json!({ "agent_hostname": "agent-1" }).to_string();
    let (status, resp) = post_metrics(&make_client(), &base, Some(KEY), body).await;
    assert_eq!(status, 400);
    assert_eq!(resp["message"], messages::INVALID_PAYLOAD);
    assert_eq!(storage.list_profiles().await.unwrap().len(), 1);

    let (status, _) = post_metrics(&make_client(), &base, Some(KEY), "{oops".into()).await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn missing_hostname_is_400() {
    let (base, storage) = spawn_memory_server().await;
    seed_key(&storage).await;

    let body = json!({ "timestamp": "t1", "agent_hostname": "  " }).to_string();
    let (status, resp) = post_metrics(&make_client(), &base, Some(KEY), body).await;
    assert_eq!(status, 400);
    assert_eq!(resp["message"], messages::MISSING_HOSTNAME);
}

#[tokio::test]
async fn sentinels_become_null() {
    let (base, storage, _dir) = spawn_sqlite_server(ServerConfig::default()).await;
    seed_key(&storage).await;

    let body = json!({
        "timestamp": "t1",
        "agent_hostname": "agent-n",
        "dns_resolution": { "status": "N/A", "resolve_time_ms": "" },
        "http_check": { "status": null },
        "wifi_summary": "not-an-object"
    })
    .to_string();
    let (status, _) = post_metrics(&make_client(), &base, Some(KEY), body).await;
    assert_eq!(status, 200);

    let p = storage.find_profile_by_hostname("agent-n").await.unwrap().unwrap();
    let table = storage.export_samples(p.id).await.unwrap();
    let row = &table.rows[0];
    for c in ["dns_status", "dns_resolve_time_ms", "http_status", "wifi_ssid"] {
        assert!(row[col(&table, c)].is_null(), "{c}");
    }
    assert_eq!(
        row[col(&table, "detailed_health_summary")],
        Cell::Text("UNKNOWN".into())
    );
}

#[tokio::test]
async fn markup_is_stored_escaped() {
    let (base, storage, _dir) = spawn_sqlite_server(ServerConfig::default()).await;
    seed_key(&storage).await;

    let body = json!({
        "timestamp": "t1",
        "agent_hostname": "agent-x",
        "wifi_summary": { "ssid": "<script>alert('x')</script>" }
    })
    .to_string();
    post_metrics(&make_client(), &base, Some(KEY), body).await;

    let p = storage.find_profile_by_hostname("agent-x").await.unwrap().unwrap();
    let table = storage.export_samples(p.id).await.unwrap();
    let ssid = &table.rows[0][col(&table, "wifi_ssid")];
    assert_eq!(
        *ssid,
        Cell::Text("&lt;script&gt;alert(&#039;x&#039;)&lt;/script&gt;".into())
    );
}

#[tokio::test]
async fn sla_flag_set_only_for_met() {
    let (base, storage) = spawn_memory_server().await;
    seed_key(&storage).await;
    let client = make_client();

    for (ts, flag) in [("t1", Some("MET")), ("t2", Some("NOT_MET")), ("t3", None)] {
        let mut body = json!({ "timestamp": ts, "agent_hostname": "agent-s" });
        if let Some(f) = flag {
            body["current_sla_met_status"] = json!(f);
        }
        let (status, _) = post_metrics(&client, &base, Some(KEY), body.to_string()).await;
        assert_eq!(status, 200);
    }

    let p = storage.find_profile_by_hostname("agent-s").await.unwrap().unwrap();
    let table = storage.export_samples(p.id).await.unwrap();
    let flags: Vec<&Cell> = table
        .rows
        .iter()
        .map(|r| &r[col(&table, "sla_met_interval")])
        .collect();
    assert_eq!(
        flags,
        vec![&Cell::Integer(1), &Cell::Integer(0), &Cell::Integer(0)]
    );
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shared_key_registers_many_hostnames() {
    let (base, storage) = spawn_memory_server().await;
    seed_key(&storage).await;
    let client = make_client();

    for host in ["site-a", "site-b", "site-c"] {
        let body = json!({ "timestamp": "t1", "agent_hostname": host }).to_string();
        let (status, _) = post_metrics(&client, &base, Some(KEY), body).await;
        assert_eq!(status, 200);
    }
    for host in ["site-a", "site-b", "site-c"] {
        let p = storage.find_profile_by_hostname(host).await.unwrap().unwrap();
        assert_eq!(p.api_key, KEY);
    }
}

#[tokio::test]
async fn strict_binding_rejects_foreign_hostname() {
    let config = ServerConfig {
        strict_key_binding: true,
        ..ServerConfig::default()
    };
    let (base, storage, _dir) = spawn_sqlite_server(config).await;
    storage.issue_key("site-a", "key-a").await.unwrap();
    storage.issue_key("site-b", "key-b").await.unwrap();
    let client = make_client();

    let body = json!({ "timestamp": "t1", "agent_hostname": "site-b" }).to_string();
    let (status, resp) = post_metrics(&client, &base, Some("key-a"), body.clone()).await;
    assert_eq!(status, 403);
    assert_eq!(resp["message"], messages::HOSTNAME_NOT_BOUND);
    assert_eq!(total_samples(&storage).await, 0);

    let (status, _) = post_metrics(&client, &base, Some("key-b"), body).await;
    assert_eq!(status, 200);
    assert_eq!(total_samples(&storage).await, 1);
}

#[tokio::test]
async fn concurrent_first_submissions_create_one_profile() {
    let (base, storage, _dir) = spawn_sqlite_server(ServerConfig::default()).await;
    seed_key(&storage).await;
    let client = make_client();

    let mut tasks = Vec::new();
    for i in 0..16 {
        let client = client.clone();
        let base = base.clone();
        tasks.push(tokio::spawn(async move {
            let body = json!({
                "timestamp": format!("2024-01-01T00:00:{i:02}Z"),
                "agent_hostname": "burst-host",
                "ping_summary": { "average_rtt_ms": i }
            })
            .to_string();
            post_metrics(&client, &base, Some(KEY), body).await.0
        }));
    }
    for t in tasks {
        assert_eq!(t.await.unwrap(), 200);
    }

    let burst: Vec<_> = storage
        .list_profiles()
        .await
        .unwrap()
        .into_iter()
        .filter(|p| p.agent_name == "burst-host")
        .collect();
    assert_eq!(burst.len(), 1);
    assert_eq!(storage.list_agents(burst[0].id).await.unwrap().len(), 1);
    assert_eq!(storage.export_samples(burst[0].id).await.unwrap().rows.len(), 16);
}

#[tokio::test]
async fn concurrent_identical_submissions_store_one_sample() {
    let (base, storage, _dir) = spawn_sqlite_server(ServerConfig::default()).await;
    seed_key(&storage).await;
    let client = make_client();

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let client = client.clone();
        let base = base.clone();
        tasks.push(tokio::spawn(async move {
            post_metrics(&client, &base, Some(KEY), scenario_body()).await.0
        }));
    }
    for t in tasks {
        assert_eq!(t.await.unwrap(), 200);
    }
    assert_eq!(total_samples(&storage).await, 1);
}

#[tokio::test]
async fn second_agent_gets_own_profile() {
    let (base, storage) = spawn_memory_server().await;
    seed_key(&storage).await;
    let client = make_client();

    for host in ["agent-1", "agent-2"] {
        let body = json!({
            "timestamp": "t1",
            "agent_hostname": host,
            "agent_source_ip": "10.0.0.7",
            "agent_type": "ISP"
        })
        .to_string();
        post_metrics(&client, &base, Some(KEY), body).await;
    }
    let a = storage.find_profile_by_hostname("agent-1").await.unwrap().unwrap();
    let b = storage.find_profile_by_hostname("agent-2").await.unwrap().unwrap();
    assert_ne!(a.id, b.id);
    assert_eq!(b.agent_type, "ISP");
    assert_eq!(b.last_reported_source_ip.as_deref(), Some("10.0.0.7"));
    let agents = storage.list_agents(b.id).await.unwrap();
    assert_eq!(agents[0].agent_source_ip, "10.0.0.7");
}

// ---------------------------------------------------------------------------
// Config and export
// ---------------------------------------------------------------------------

#[tokio::test]
async fn profile_config_by_key_and_hostname() {
    let (base, storage) = spawn_memory_server().await;
    storage.issue_key("branch-7", "key-7").await.unwrap();
    let client = make_client();

    let resp = client
        .get(format!("{base}/v1/profile/config"))
        .header(API_KEY_HEADER, "key-7")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let cfg: netinsight_api::ProfileConfig = resp.json().await.unwrap();
    assert_eq!(cfg, netinsight_api::ProfileConfig::standard("branch-7"));

    let resp = client
        .get(format!("{base}/v1/profile/config?hostname=branch-7"))
        .header(API_KEY_HEADER, "key-7")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    let resp = client
        .get(format!("{base}/v1/profile/config"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 401);
}

#[tokio::test]
async fn csv_export_is_ordered_and_drops_empty_jitter() {
    let (base, storage, _dir) = spawn_sqlite_server(ServerConfig::default()).await;
    seed_key(&storage).await;
    let client = make_client();

    for ts in ["2024-01-02T00:00:00Z", "2024-01-01T00:00:00Z"] {
        let body = json!({
            "timestamp": ts,
            "agent_hostname": "csv-host",
            "speed_test": { "download_mbps": 90.5 }
        })
        .to_string();
        post_metrics(&client, &base, Some(KEY), body).await;
    }
    let p = storage.find_profile_by_hostname("csv-host").await.unwrap().unwrap();

    let resp = client
        .get(format!("{base}/v1/profiles/{}/metrics.csv", p.id))
        .header(API_KEY_HEADER, KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert!(resp.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/csv"));
    assert!(resp.headers()["content-disposition"]
        .to_str()
        .unwrap()
        .contains("sla_history_csv_host.csv"));

    let text = resp.text().await.unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("id,isp_profile_id,agent_id,timestamp,"));
    assert!(!lines[0].contains("speedtest_jitter_ms"));
    assert!(lines[1].contains("2024-01-01T00:00:00Z"));
    assert!(lines[2].contains("2024-01-02T00:00:00Z"));
    assert!(lines[1].contains(",90.5,"));
}

#[tokio::test]
async fn csv_export_of_empty_profile() {
    let (base, storage) = spawn_memory_server().await;
    let p = storage.issue_key("quiet-host", KEY).await.unwrap();

    let text = make_client()
        .get(format!("{base}/v1/profiles/{}/metrics.csv", p.id))
        .header(API_KEY_HEADER, KEY)
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(text.trim(), "\"No data available for this agent.\"");
}

#[tokio::test]
async fn errors_never_leak_internals() {
    let (base, storage) = spawn_memory_server().await;
    seed_key(&storage).await;

    let (status, body) = post_metrics(&make_client(), &base, Some(KEY), "[]".into()).await;
    assert_eq!(status, 400);
    let message = body["message"].as_str().unwrap();
    assert!(!message.contains("expected"), "{message}");
    assert_eq!(body.as_object().unwrap().len(), 2);
}
