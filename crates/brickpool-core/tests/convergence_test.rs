// End-to-end convergence scenarios driven through the public API

use std::collections::BTreeMap;

use serde_json::json;

use brickpool_common::{BRICKS_KEY, PRIVATE_ADDRESS_KEY};
use brickpool_core::{
    Configuration, ConvergenceEngine, FileUnitStore, Flag, MemoryUnitStore, PeerChangeType,
    UnitStore,
};

fn pool_engine() -> ConvergenceEngine<MemoryUnitStore> {
    ConvergenceEngine::with_identity("brickpool/0", "10.0.0.10", MemoryUnitStore::new()).unwrap()
}

/// Drive the full lifecycle of a two-peer pool and check every aggregate
/// view reflects it.
#[test]
fn two_peer_pool_converges() {
    let mut engine = pool_engine();
    let mut events = engine.subscribe_events();

    // Relation establishment, transport-driven
    engine.registry_mut().open("peer:1", Some("brickpool/1"));
    engine.registry_mut().open("peer:2", Some("brickpool/2"));
    engine.on_joined("peer:1");
    engine.on_joined("peer:2");

    assert_eq!(engine.summary().connected, 2);
    assert_eq!(engine.summary().available, 0);

    // Peer 1 advertises everything at once
    engine
        .registry_mut()
        .observe_remote("peer:1", PRIVATE_ADDRESS_KEY, json!("10.0.0.11"))
        .unwrap();
    engine
        .registry_mut()
        .observe_remote("peer:1", BRICKS_KEY, json!(["/dev/sdb"]))
        .unwrap();
    engine.on_changed("peer:1").unwrap();

    // Peer 2 advertises in two steps
    engine
        .registry_mut()
        .observe_remote("peer:2", PRIVATE_ADDRESS_KEY, json!("10.0.0.12"))
        .unwrap();
    engine.on_changed("peer:2").unwrap();
    assert!(!engine.is_complete("peer:2"));

    engine
        .registry_mut()
        .observe_remote("peer:2", BRICKS_KEY, json!(["/dev/sdb", "/dev/sdc"]))
        .unwrap();
    engine.on_changed("peer:2").unwrap();

    assert!(engine.is_complete("peer:1"));
    assert!(engine.is_complete("peer:2"));
    assert!(engine.summary().all_available());

    // This node contributes its own bricks
    engine.advertise_bricks(&["/dev/sdd".to_string()]).unwrap();
    engine.advertise_address("private", "10.0.0.10");

    let bricks = engine.brick_map();
    assert_eq!(bricks.len(), 3);
    assert_eq!(bricks["brickpool-0"], vec!["/dev/sdd".to_string()]);
    assert_eq!(bricks["brickpool-1"], vec!["/dev/sdb".to_string()]);
    assert_eq!(
        bricks["brickpool-2"],
        vec!["/dev/sdb".to_string(), "/dev/sdc".to_string()]
    );

    let addresses = engine.address_map(PRIVATE_ADDRESS_KEY);
    assert_eq!(
        addresses,
        vec![
            ("brickpool-1".to_string(), Some("10.0.0.11".to_string())),
            ("brickpool-2".to_string(), Some("10.0.0.12".to_string())),
        ]
    );

    let info = engine.peer_info(PRIVATE_ADDRESS_KEY);
    assert_eq!(info.len(), 3);
    assert_eq!(info["brickpool-0"].address.as_deref(), Some("10.0.0.10"));
    assert_eq!(info["brickpool-2"].bricks.len(), 2);

    // Observed transitions were reported in order per peer
    let mut kinds = Vec::new();
    while let Ok(event) = events.try_recv() {
        kinds.push((event.peer.clone(), event.change_type.clone()));
    }
    assert!(kinds.contains(&("brickpool-1".to_string(), PeerChangeType::PeerAvailable)));
    assert!(kinds.contains(&("brickpool-2".to_string(), PeerChangeType::PeerAvailable)));

    // Peer 1 leaves; its relation data is withdrawn first
    engine
        .registry_mut()
        .observe_remote("peer:1", BRICKS_KEY, json!([]))
        .unwrap();
    engine.on_departed("peer:1");
    let conversation = engine.registry().get("peer:1").unwrap();
    assert!(!conversation.has_flag(Flag::Connected));
    assert!(!conversation.has_flag(Flag::Available));

    engine.registry_mut().remove("peer:1");
    assert_eq!(engine.brick_map().len(), 2);
}

/// Brick-set churn across repeated change events raises the right one-shot
/// delta flags and keeps the durable cache in lockstep.
#[test]
fn brick_churn_tracks_deltas() {
    let mut engine = pool_engine();

    engine.registry_mut().open("peer:1", Some("brickpool/1"));
    engine.on_joined("peer:1");
    engine
        .registry_mut()
        .observe_remote("peer:1", PRIVATE_ADDRESS_KEY, json!("10.0.0.11"))
        .unwrap();
    engine
        .registry_mut()
        .observe_remote("peer:1", BRICKS_KEY, json!(["/dev/sdb", "/dev/sdc"]))
        .unwrap();
    engine.on_changed("peer:1").unwrap();

    {
        let conversation = engine.registry_mut().get_mut("peer:1").unwrap();
        conversation.clear_flag(Flag::BricksAvailable);
        conversation.clear_flag(Flag::BricksRemoved);
    }

    // One brick swapped for another
    engine
        .registry_mut()
        .observe_remote("peer:1", BRICKS_KEY, json!(["/dev/sdc", "/dev/sdd"]))
        .unwrap();
    engine.on_changed("peer:1").unwrap();

    let conversation = engine.registry().get("peer:1").unwrap();
    assert!(conversation.has_flag(Flag::BricksAvailable));
    assert!(conversation.has_flag(Flag::BricksRemoved));
    assert_eq!(
        engine.store().get("brickpool-1.bricks").unwrap(),
        Some(json!(["/dev/sdc", "/dev/sdd"]))
    );

    // The delta is one-shot: a repeat observation raises nothing new
    {
        let conversation = engine.registry_mut().get_mut("peer:1").unwrap();
        conversation.clear_flag(Flag::BricksAvailable);
        conversation.clear_flag(Flag::BricksRemoved);
    }
    engine.on_changed("peer:1").unwrap();

    let conversation = engine.registry().get("peer:1").unwrap();
    assert!(!conversation.has_flag(Flag::BricksAvailable));
    assert!(!conversation.has_flag(Flag::BricksRemoved));
}

/// A file-backed engine keeps its cached inventory across restarts, so a
/// rejoining peer produces no spurious delta.
#[test]
fn file_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("peer-cache.json");

    {
        let store = FileUnitStore::open(&path).unwrap();
        let mut engine =
            ConvergenceEngine::with_identity("brickpool/0", "10.0.0.10", store).unwrap();

        engine.registry_mut().open("peer:1", Some("brickpool/1"));
        engine.on_joined("peer:1");
        engine
            .registry_mut()
            .observe_remote("peer:1", PRIVATE_ADDRESS_KEY, json!("10.0.0.11"))
            .unwrap();
        engine
            .registry_mut()
            .observe_remote("peer:1", BRICKS_KEY, json!(["/dev/sdb"]))
            .unwrap();
        engine.on_changed("peer:1").unwrap();
        engine.advertise_bricks(&["/dev/sdd".to_string()]).unwrap();
    }

    // Restart: same store path, fresh registry
    let store = FileUnitStore::open(&path).unwrap();
    let mut engine = ConvergenceEngine::with_identity("brickpool/0", "10.0.0.10", store).unwrap();

    assert_eq!(
        engine.brick_map()["brickpool-0"],
        vec!["/dev/sdd".to_string()]
    );

    engine.registry_mut().open("peer:1", Some("brickpool/1"));
    engine.on_joined("peer:1");
    engine
        .registry_mut()
        .observe_remote("peer:1", PRIVATE_ADDRESS_KEY, json!("10.0.0.11"))
        .unwrap();
    engine
        .registry_mut()
        .observe_remote("peer:1", BRICKS_KEY, json!(["/dev/sdb"]))
        .unwrap();
    engine.on_changed("peer:1").unwrap();

    // The cache already knew this peer's bricks
    let conversation = engine.registry().get("peer:1").unwrap();
    assert!(!conversation.has_flag(Flag::BricksAvailable));
    assert!(!conversation.has_flag(Flag::BricksRemoved));
    assert!(conversation.has_flag(Flag::Available));
}

/// Engine construction through the configuration layer.
#[test]
fn engine_from_configuration() {
    let config = config::Config::builder()
        .set_default("brickpool.unit.name", "brickpool/5")
        .unwrap()
        .set_default("brickpool.advertise.address", "10.30.0.5")
        .unwrap()
        .build()
        .unwrap();
    let configuration = Configuration::from_config(config);

    let engine = ConvergenceEngine::new(&configuration, MemoryUnitStore::new()).unwrap();
    assert_eq!(engine.local_unit(), "brickpool-5");
    assert_eq!(engine.local_address(), "10.30.0.5");
}

/// Broadcast with local storage duplicates the mapping per conversation.
#[test]
fn broadcast_settings_to_all_peers() {
    let mut engine = pool_engine();
    engine.registry_mut().open("peer:1", Some("brickpool/1"));
    engine.registry_mut().open("peer:2", Some("brickpool/2"));

    let mut settings = BTreeMap::new();
    settings.insert("cluster-uuid".to_string(), json!("c0ffee"));
    settings.insert("op-version".to_string(), json!(70200));
    engine.broadcast(&settings, true).unwrap();

    assert_eq!(
        engine.local_values("cluster-uuid"),
        vec![json!("c0ffee"), json!("c0ffee")]
    );
    assert_eq!(
        engine.local_values("op-version"),
        vec![json!(70200), json!(70200)]
    );
}
