use mongodb_core::Error;
use mongodb_core::topology::{ServerDescription, ServerType, TopologyType};
use super::*;

#[test]
fn primary_discovered_from_unknown_seeds() {
    let reply = primary_reply("shire", "a:27017", &["a:27017", "b:27017", "c:27017"], 1, oid(1));
    let description = apply(&seeds(&["a:27017", "b:27017"]), "a:27017", reply);

    assert_eq!(description.topology_type(), TopologyType::ReplicaSetWithPrimary);
    assert_eq!(description.set_name(), "shire");
    assert_eq!(description.servers().len(), 3);
    assert_eq!(description.server(&host("a:27017")).unwrap().server_type,
               ServerType::RSPrimary);
    assert_eq!(description.server(&host("c:27017")).unwrap().server_type,
               ServerType::Unknown);
    assert_eq!(description.max_set_version(), Some(1));
    assert_eq!(description.max_election_id(), Some(&oid(1)));
}

#[test]
fn secondary_discovers_members_without_primary() {
    let reply = secondary_reply("shire",
                                "a:27017",
                                &["a:27017", "b:27017", "c:27017"],
                                Some("b:27017"));
    let description = apply(&rs_seeds(&["a:27017"], "shire"), "a:27017", reply);

    assert_eq!(description.topology_type(), TopologyType::ReplicaSetNoPrimary);
    assert_eq!(description.servers().len(), 3);
    assert_eq!(description.server(&host("a:27017")).unwrap().server_type,
               ServerType::RSSecondary);
    // The hinted primary is flagged so a monitor can check it first.
    assert_eq!(description.server(&host("b:27017")).unwrap().server_type,
               ServerType::PossiblePrimary);
}

#[test]
fn set_name_mismatch_removes_member() {
    let reply = secondary_reply("mordor", "a:27017", &["a:27017"], None);
    let description = apply(&rs_seeds(&["a:27017", "b:27017"], "shire"), "a:27017", reply);

    assert_eq!(description.topology_type(), TopologyType::ReplicaSetNoPrimary);
    assert_eq!(description.set_name(), "shire");
    assert!(!description.has_server(&host("a:27017")));
}

#[test]
fn primary_set_name_mismatch_removes_claimant() {
    let reply = primary_reply("mordor", "a:27017", &["a:27017"], 1, oid(1));
    let description = apply(&rs_seeds(&["a:27017", "b:27017"], "shire"), "a:27017", reply);

    assert_eq!(description.topology_type(), TopologyType::ReplicaSetNoPrimary);
    assert!(!description.has_server(&host("a:27017")));
}

#[test]
fn me_mismatch_removes_member_but_keeps_its_hosts() {
    // Reached through an alias; its config hosts are still worth tracking.
    let reply = secondary_reply("shire", "b:27017", &["b:27017", "c:27017"], None);
    let description = apply(&rs_seeds(&["a:27017"], "shire"), "a:27017", reply);

    assert!(!description.has_server(&host("a:27017")));
    assert!(description.has_server(&host("b:27017")));
    assert!(description.has_server(&host("c:27017")));
}

#[test]
fn primary_host_list_is_authoritative() {
    let seeded = rs_seeds(&["a:27017", "b:27017", "c:27017"], "shire");
    let reply = primary_reply("shire", "a:27017", &["a:27017", "b:27017"], 1, oid(1));
    let description = apply(&seeded, "a:27017", reply);

    assert_eq!(description.topology_type(), TopologyType::ReplicaSetWithPrimary);
    assert!(!description.has_server(&host("c:27017")));
    assert_eq!(description.servers().len(), 2);
}

#[test]
fn stale_primary_claim_is_rejected() {
    let hosts = ["a:27017", "b:27017"];
    let description = apply(&rs_seeds(&hosts, "shire"),
                            "a:27017",
                            primary_reply("shire", "a:27017", &hosts, 2, oid(2)));

    // A lower setVersion lost an intervening reconfig.
    let description = apply(&description,
                            "b:27017",
                            primary_reply("shire", "b:27017", &hosts, 1, oid(5)));

    assert_eq!(description.topology_type(), TopologyType::ReplicaSetWithPrimary);
    assert_eq!(description.server(&host("a:27017")).unwrap().server_type,
               ServerType::RSPrimary);
    assert_eq!(description.server(&host("b:27017")).unwrap().server_type,
               ServerType::Unknown);
    assert_eq!(description.max_set_version(), Some(2));
    assert_eq!(description.max_election_id(), Some(&oid(2)));
}

#[test]
fn stale_election_id_is_rejected() {
    let hosts = ["a:27017", "b:27017"];
    let description = apply(&rs_seeds(&hosts, "shire"),
                            "a:27017",
                            primary_reply("shire", "a:27017", &hosts, 1, oid(2)));

    let description = apply(&description,
                            "b:27017",
                            primary_reply("shire", "b:27017", &hosts, 1, oid(1)));

    assert_eq!(description.server(&host("a:27017")).unwrap().server_type,
               ServerType::RSPrimary);
    assert_eq!(description.server(&host("b:27017")).unwrap().server_type,
               ServerType::Unknown);
}

#[test]
fn newer_election_demotes_old_primary() {
    let hosts = ["a:27017", "b:27017"];
    let description = apply(&rs_seeds(&hosts, "shire"),
                            "a:27017",
                            primary_reply("shire", "a:27017", &hosts, 1, oid(1)));

    let description = apply(&description,
                            "b:27017",
                            primary_reply("shire", "b:27017", &hosts, 1, oid(2)));

    assert_eq!(description.topology_type(), TopologyType::ReplicaSetWithPrimary);
    assert_eq!(description.server(&host("a:27017")).unwrap().server_type,
               ServerType::Unknown);
    assert_eq!(description.server(&host("b:27017")).unwrap().server_type,
               ServerType::RSPrimary);
    assert_eq!(description.max_election_id(), Some(&oid(2)));
}

#[test]
fn primary_error_leaves_set_without_primary() {
    let hosts = ["a:27017", "b:27017"];
    let description = apply(&rs_seeds(&hosts, "shire"),
                            "a:27017",
                            primary_reply("shire", "a:27017", &hosts, 1, oid(1)));
    assert_eq!(description.topology_type(), TopologyType::ReplicaSetWithPrimary);

    let failed = ServerDescription::with_error(host("a:27017"),
                                               Error::OperationError("no route to host"
                                                   .to_owned()));
    let description = description.update(failed);

    assert_eq!(description.topology_type(), TopologyType::ReplicaSetNoPrimary);
    let server = description.server(&host("a:27017")).unwrap();
    assert_eq!(server.server_type, ServerType::Unknown);
    assert!(server.err.is_some());
}

#[test]
fn unknown_and_mongos_reports_dropped_without_primary() {
    let seeded = rs_seeds(&["a:27017", "b:27017"], "shire");

    // A member that could not be checked is dropped from the snapshot; a
    // reseed or another member's host list brings it back.
    let failed = ServerDescription::with_error(host("a:27017"),
                                               Error::from("connection reset"));
    let description = seeded.update(failed);
    assert_eq!(description.topology_type(), TopologyType::ReplicaSetNoPrimary);
    assert!(!description.has_server(&host("a:27017")));
    assert!(description.has_server(&host("b:27017")));

    let description = apply(&seeded, "a:27017", mongos_reply());
    assert!(!description.has_server(&host("a:27017")));
}

#[test]
fn standalone_report_kept_without_primary() {
    let description = apply(&rs_seeds(&["a:27017", "b:27017"], "shire"),
                            "a:27017",
                            standalone_reply());
    assert_eq!(description.topology_type(), TopologyType::ReplicaSetNoPrimary);
    let server = description.server(&host("a:27017")).unwrap();
    assert_eq!(server.server_type, ServerType::Standalone);
}

#[test]
fn ghost_member_is_kept_but_inert() {
    let reply = doc! {
        "ok": 1,
        "ismaster": false,
        "isreplicaset": true,
        "minWireVersion": 2,
        "maxWireVersion": 5
    };
    let description = apply(&rs_seeds(&["a:27017"], "shire"), "a:27017", reply);

    assert_eq!(description.topology_type(), TopologyType::ReplicaSetNoPrimary);
    let server = description.server(&host("a:27017")).unwrap();
    assert_eq!(server.server_type, ServerType::RSGhost);
    assert!(!server.is_data_bearing());
}

#[test]
fn update_does_not_mutate_the_receiver() {
    let before = rs_seeds(&["a:27017"], "shire");
    let reply = primary_reply("shire", "a:27017", &["a:27017", "b:27017"], 1, oid(1));
    let after = apply(&before, "a:27017", reply);

    assert_eq!(before.topology_type(), TopologyType::ReplicaSetNoPrimary);
    assert_eq!(before.servers().len(), 1);
    assert_eq!(after.topology_type(), TopologyType::ReplicaSetWithPrimary);
    assert_eq!(after.servers().len(), 2);
}
