//! NIC module against the in-memory cloud.

mod common;

use common::FakeCloud;
use profitbricks_modules::{ModuleKind, ProfitbricksError, run_with_api};
use serde_json::{Value, json};

async fn nic(cloud: &FakeCloud, args: Value) -> Value {
    run_with_api(cloud, ModuleKind::Nic, args).await.unwrap()
}

async fn nic_err(cloud: &FakeCloud, args: Value) -> ProfitbricksError {
    run_with_api(cloud, ModuleKind::Nic, args).await.unwrap_err()
}

fn seeded() -> (FakeCloud, String, String) {
    let cloud = FakeCloud::new();
    let dc = cloud.add_datacenter("D");
    cloud.add_lan(&dc, "frontend", true);
    cloud.add_lan(&dc, "backend", false);
    let server = cloud.add_server(&dc, "app");
    (cloud, dc, server)
}

#[tokio::test(start_paused = true)]
async fn creates_a_named_nic_once() {
    let (cloud, dc, server) = seeded();
    let args = json!({
        "datacenter": "D",
        "server": "app",
        "name": "eth1",
        "lan": "backend",
        "dhcp": true,
        "firewall_active": "no",
    });

    let out = nic(&cloud, args.clone()).await;
    assert_eq!(out["changed"], true);
    assert_eq!(out["action"], "create");
    let nics = cloud.nics(&dc, &server);
    assert_eq!(nics.len(), 1);
    assert_eq!(nics[0].properties.name.as_deref(), Some("eth1"));
    assert_eq!(nics[0].properties.lan, Some(2));
    assert_eq!(nics[0].properties.firewall_active, Some(false));
    assert_eq!(out["instance_ids"]["instances"], json!([nics[0].id]));

    let again = nic(&cloud, args).await;
    assert_eq!(again["changed"], false);
    assert_eq!(cloud.nics(&dc, &server).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn unnamed_nics_get_generated_names() {
    let (cloud, dc, server) = seeded();
    let args = json!({ "datacenter": "D", "server": server, "lan": 1 });

    nic(&cloud, args.clone()).await;
    nic(&cloud, args).await;
    let nics = cloud.nics(&dc, &server);
    assert_eq!(nics.len(), 2);
    assert_ne!(nics[0].properties.name, nics[1].properties.name);
    assert!(nics.iter().all(|n| n.properties.lan == Some(1)));
}

#[tokio::test(start_paused = true)]
async fn present_requires_a_lan() {
    let (cloud, _, _) = seeded();
    let err = nic_err(
        &cloud,
        json!({ "datacenter": "D", "server": "app", "name": "eth1" }),
    )
    .await;
    assert_eq!(err.kind_tag(), "validation");
    assert!(err.to_string().contains("lan"));
    assert!(cloud.mutations().is_empty());
}

#[tokio::test(start_paused = true)]
async fn unknown_lan_name_is_not_found() {
    let (cloud, _, _) = seeded();
    let err = nic_err(
        &cloud,
        json!({ "datacenter": "D", "server": "app", "name": "eth1", "lan": "storage" }),
    )
    .await;
    assert_eq!(err.kind_tag(), "not_found");
}

#[tokio::test(start_paused = true)]
async fn update_merges_over_live_values() {
    let (cloud, dc, server) = seeded();
    let id = cloud.add_nic(&dc, &server, "eth0", 1);

    let out = nic(
        &cloud,
        json!({
            "datacenter": "D",
            "server": "app",
            "name": "eth0",
            "ips": ["198.51.100.7"],
            "state": "update",
        }),
    )
    .await;
    assert_eq!(out["changed"], true);
    let live = cloud.nics(&dc, &server).into_iter().find(|n| n.id == id).unwrap();
    assert_eq!(live.properties.lan, Some(1));
    assert_eq!(live.properties.dhcp, Some(true));
    assert_eq!(live.properties.ips, Some(vec!["198.51.100.7".to_string()]));

    let again = nic(
        &cloud,
        json!({ "datacenter": "D", "server": "app", "name": id, "lan": 1, "state": "update" }),
    )
    .await;
    assert_eq!(again["changed"], false);
    assert_eq!(cloud.mutations(), vec![format!("update_nic {id}")]);
}

#[tokio::test(start_paused = true)]
async fn update_requires_a_name() {
    let (cloud, _, _) = seeded();
    let err = nic_err(
        &cloud,
        json!({ "datacenter": "D", "server": "app", "dhcp": false, "state": "update" }),
    )
    .await;
    assert_eq!(err.kind_tag(), "validation");
}

#[tokio::test(start_paused = true)]
async fn absent_is_a_noop_for_missing_parents() {
    let (cloud, dc, server) = seeded();
    let id = cloud.add_nic(&dc, &server, "eth0", 1);

    let out = nic(
        &cloud,
        json!({ "datacenter": "D", "server": "app", "name": "eth0", "state": "absent" }),
    )
    .await;
    assert_eq!(out["changed"], true);
    assert!(cloud.nics(&dc, &server).is_empty());

    for args in [
        json!({ "datacenter": "D", "server": "app", "name": "eth0", "state": "absent" }),
        json!({ "datacenter": "D", "server": "gone", "name": "eth0", "state": "absent" }),
        json!({ "datacenter": "gone", "server": "app", "name": "eth0", "state": "absent" }),
    ] {
        let out = nic(&cloud, args).await;
        assert_eq!(out["changed"], false);
    }
    assert_eq!(cloud.mutations(), vec![format!("delete_nic {id}")]);
}

#[tokio::test(start_paused = true)]
async fn present_on_an_unknown_server_fails() {
    let (cloud, _, _) = seeded();
    let err = nic_err(
        &cloud,
        json!({ "datacenter": "D", "server": "ghost", "lan": 1 }),
    )
    .await;
    assert_eq!(err.kind_tag(), "not_found");
}
