//! State machine tests driven by hand-built isMaster replies.
mod rs;
mod topology;

use bson::{self, Bson};
use bson::oid::ObjectId;
use mongodb_core::connstring::{self, Host};
use mongodb_core::topology::{IsMasterResult, ServerDescription, TopologyDescription};

pub fn host(address: &str) -> Host {
    connstring::parse_host(address).unwrap()
}

// Object ids whose ordering follows the argument.
pub fn oid(n: u8) -> ObjectId {
    ObjectId::with_bytes([0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, n])
}

pub fn hosts_array(hosts: &[&str]) -> Bson {
    Bson::Array(hosts.iter().map(|h| Bson::String(h.to_string())).collect())
}

pub fn seeds(addresses: &[&str]) -> TopologyDescription {
    TopologyDescription::with_seed_list(addresses.iter().map(|a| host(a)).collect(), None)
}

pub fn rs_seeds(addresses: &[&str], set_name: &str) -> TopologyDescription {
    TopologyDescription::with_seed_list(addresses.iter().map(|a| host(a)).collect(),
                                        Some(set_name))
}

// Feeds a reply from the given address through the state machine.
pub fn apply(description: &TopologyDescription,
             address: &str,
             reply: bson::Document)
             -> TopologyDescription {
    let mut server = ServerDescription::new(host(address));
    server.update(IsMasterResult::new(reply).unwrap(), 5);
    description.update(server)
}

pub fn standalone_reply() -> bson::Document {
    doc! {
        "ok": 1,
        "ismaster": true,
        "minWireVersion": 2,
        "maxWireVersion": 5
    }
}

pub fn mongos_reply() -> bson::Document {
    doc! {
        "ok": 1,
        "ismaster": true,
        "msg": "isdbgrid",
        "minWireVersion": 2,
        "maxWireVersion": 5
    }
}

pub fn primary_reply(set_name: &str,
                     me: &str,
                     hosts: &[&str],
                     set_version: i64,
                     election_id: ObjectId)
                     -> bson::Document {
    doc! {
        "ok": 1,
        "ismaster": true,
        "setName": set_name,
        "me": me,
        "hosts": hosts_array(hosts),
        "setVersion": set_version,
        "electionId": Bson::ObjectId(election_id),
        "minWireVersion": 2,
        "maxWireVersion": 5
    }
}

pub fn secondary_reply(set_name: &str,
                       me: &str,
                       hosts: &[&str],
                       primary: Option<&str>)
                       -> bson::Document {
    let mut reply = doc! {
        "ok": 1,
        "ismaster": false,
        "secondary": true,
        "setName": set_name,
        "me": me,
        "hosts": hosts_array(hosts),
        "minWireVersion": 2,
        "maxWireVersion": 5
    };
    if let Some(primary) = primary {
        reply.insert("primary", primary);
    }
    reply
}
