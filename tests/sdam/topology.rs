use mongodb_core::Error;
use mongodb_core::apm::Listener;
use mongodb_core::connstring;
use mongodb_core::stream::StreamConnector;
use mongodb_core::topology::{IsMasterResult, ServerDescription, Topology, TopologyType};
use std::sync::Arc;
use super::*;

fn topology(uri: &str) -> Topology {
    let config = connstring::parse(uri).unwrap();
    Topology::new(config, None, StreamConnector::default(), Arc::new(Listener::new())).unwrap()
}

#[test]
fn single_seed_uri_starts_single() {
    let top = topology("mongodb://a.example.com");
    let description = top.description().unwrap();
    assert_eq!(description.topology_type(), TopologyType::Single);
}

#[test]
fn replica_set_option_sets_name_and_type() {
    let top = topology("mongodb://a.example.com,b.example.com/?replicaSet=shire");
    let description = top.description().unwrap();
    assert_eq!(description.topology_type(), TopologyType::ReplicaSetNoPrimary);
    assert_eq!(description.set_name(), "shire");
}

#[test]
fn empty_seed_list_is_rejected() {
    let mut config = connstring::parse("mongodb://a.example.com").unwrap();
    config.hosts.clear();
    match Topology::new(config,
                        None,
                        StreamConnector::default(),
                        Arc::new(Listener::new())) {
        Err(Error::ArgumentError(_)) => {}
        other => panic!("expected ArgumentError, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn update_swaps_in_a_new_snapshot() {
    let top = topology("mongodb://a:27017,b:27017/?replicaSet=shire");
    let before = top.description().unwrap();

    let reply = primary_reply("shire", "a:27017", &["a:27017", "b:27017"], 1, oid(1));
    let mut server = ServerDescription::new(host("a:27017"));
    server.update(IsMasterResult::new(reply).unwrap(), 5);
    top.update(server).unwrap();

    let after = top.description().unwrap();
    assert_eq!(before.topology_type(), TopologyType::ReplicaSetNoPrimary);
    assert_eq!(after.topology_type(), TopologyType::ReplicaSetWithPrimary);
}

#[test]
fn update_error_marks_the_server_unknown() {
    let top = topology("mongodb://a:27017,b:27017/?replicaSet=shire");
    let reply = primary_reply("shire", "a:27017", &["a:27017", "b:27017"], 1, oid(1));
    let mut server = ServerDescription::new(host("a:27017"));
    server.update(IsMasterResult::new(reply).unwrap(), 5);
    top.update(server).unwrap();

    top.update_error(host("b:27017"), Error::from("connection reset")).unwrap();

    let description = top.description().unwrap();
    assert_eq!(description.topology_type(), TopologyType::ReplicaSetWithPrimary);
    assert!(description.server(&host("b:27017")).unwrap().err.is_some());
}

#[test]
fn update_error_drops_the_member_while_no_primary_is_known() {
    let top = topology("mongodb://a:27017,b:27017/?replicaSet=shire");
    top.update_error(host("a:27017"), Error::from("connection reset")).unwrap();

    let description = top.description().unwrap();
    assert!(!description.has_server(&host("a:27017")));
    assert!(description.has_server(&host("b:27017")));
}

#[test]
fn pool_requires_membership() {
    let top = topology("mongodb://a:27017,b:27017/?replicaSet=shire");
    match top.pool(&host("outsider:27017")) {
        Err(Error::OperationError(msg)) => assert!(msg.contains("outsider:27017")),
        other => panic!("expected OperationError, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn pool_for_removed_member_is_closed() {
    let top = topology("mongodb://a:27017,b:27017/?replicaSet=shire");
    let pool = top.pool(&host("b:27017")).unwrap();
    assert!(!pool.is_closed().unwrap());

    // The primary's host list no longer includes b.
    let reply = primary_reply("shire", "a:27017", &["a:27017"], 1, oid(1));
    let mut server = ServerDescription::new(host("a:27017"));
    server.update(IsMasterResult::new(reply).unwrap(), 5);
    top.update(server).unwrap();

    assert!(pool.is_closed().unwrap());
    assert!(top.pool(&host("b:27017")).is_err());
}

#[test]
fn check_out_refuses_incompatible_topology() {
    let top = topology("mongodb://a:27017,b:27017/?replicaSet=shire");
    let reply = doc! {
        "ok": 1,
        "ismaster": false,
        "secondary": true,
        "setName": "shire",
        "me": "a:27017",
        "hosts": hosts_array(&["a:27017", "b:27017"]),
        "minWireVersion": 0,
        "maxWireVersion": 1
    };
    let mut server = ServerDescription::new(host("a:27017"));
    server.update(IsMasterResult::new(reply).unwrap(), 5);
    top.update(server).unwrap();

    match top.check_out(&host("b:27017")) {
        Err(Error::IncompatibleError(msg)) => assert!(msg.contains("wire version")),
        other => panic!("expected IncompatibleError, got {:?}", other.map(|_| ())),
    }
}
