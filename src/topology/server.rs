//! Immutable description of a single server's last known state.
use bson::{self, oid};
use chrono::{DateTime, Utc};
use connstring::Host;
use error::Error;
use topology::ismaster::IsMasterResult;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// The possible types for a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerType {
    /// Standalone server.
    Standalone,
    /// Shard router.
    Mongos,
    /// Replica set primary.
    RSPrimary,
    /// Replica set secondary.
    RSSecondary,
    /// Replica set arbiter.
    RSArbiter,
    /// Replica set member of some other type.
    RSOther,
    /// Replica set ghost member.
    RSGhost,
    /// Hinted at by a secondary's view, but not yet confirmed.
    PossiblePrimary,
    /// Server type is currently unknown.
    Unknown,
}

impl FromStr for ServerType {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "Standalone" => ServerType::Standalone,
            "Mongos" => ServerType::Mongos,
            "RSPrimary" => ServerType::RSPrimary,
            "RSSecondary" => ServerType::RSSecondary,
            "RSArbiter" => ServerType::RSArbiter,
            "RSOther" => ServerType::RSOther,
            "RSGhost" => ServerType::RSGhost,
            "PossiblePrimary" => ServerType::PossiblePrimary,
            "Unknown" => ServerType::Unknown,
            _ => return Err(Error::ArgumentError(format!("Unknown server type '{}'.", s))),
        })
    }
}

impl fmt::Display for ServerType {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, fmt)
    }
}

/// Server information gathered from monitoring or seeding.
#[derive(Clone, Debug)]
pub struct ServerDescription {
    /// The address of this server.
    pub address: Host,
    /// The server type known at the last relevant monitoring check.
    pub server_type: ServerType,
    /// Any error that occurred while checking the server.
    pub err: Arc<Option<Error>>,
    /// The duration of the latest isMaster call, if one completed.
    pub round_trip_time: Option<i64>,
    /// The last write date reported by the server.
    pub last_write_date: Option<DateTime<Utc>>,
    /// The location of the most recent op in the server's oplog.
    pub op_time: Option<bson::Document>,
    /// The time of the latest update to this description.
    pub last_update_time: Option<DateTime<Utc>>,
    /// The minimum wire version supported by the server.
    pub min_wire_version: i64,
    /// The maximum wire version supported by the server.
    pub max_wire_version: i64,
    /// The address the server believes it has, from its own configuration.
    pub me: Option<Host>,
    /// Voting members of the set, if the server is a replica set member.
    pub hosts: Vec<Host>,
    /// Non-voting members of the set.
    pub passives: Vec<Host>,
    /// Arbiters of the set.
    pub arbiters: Vec<Host>,
    /// The server's opinion of who the primary is.
    pub primary: Option<Host>,
    /// User-defined tags on the server.
    pub tags: BTreeMap<String, String>,
    /// The replica set name, if the server belongs to one.
    pub set_name: String,
    /// The replica set config version, if reported.
    pub set_version: Option<i64>,
    /// The id of the election that chose the current primary, if reported.
    pub election_id: Option<oid::ObjectId>,
    /// The session timeout the server advertises, in minutes.
    pub logical_session_timeout_minutes: Option<i64>,
}

impl PartialEq for ServerDescription {
    fn eq(&self, other: &ServerDescription) -> bool {
        self.address == other.address && self.server_type == other.server_type &&
        self.set_name == other.set_name && self.set_version == other.set_version &&
        self.election_id == other.election_id &&
        self.hosts == other.hosts && self.passives == other.passives &&
        self.arbiters == other.arbiters && self.primary == other.primary &&
        self.me == other.me && self.tags == other.tags
    }
}

impl ServerDescription {
    /// Returns a fresh, completely unknown server description.
    pub fn new(address: Host) -> ServerDescription {
        ServerDescription {
            address: address,
            server_type: ServerType::Unknown,
            err: Arc::new(None),
            round_trip_time: None,
            last_write_date: None,
            op_time: None,
            last_update_time: None,
            min_wire_version: 0,
            max_wire_version: 0,
            me: None,
            hosts: Vec::new(),
            passives: Vec::new(),
            arbiters: Vec::new(),
            primary: None,
            tags: BTreeMap::new(),
            set_name: String::new(),
            set_version: None,
            election_id: None,
            logical_session_timeout_minutes: None,
        }
    }

    /// Returns an unknown description carrying the given monitoring error.
    pub fn with_error(address: Host, err: Error) -> ServerDescription {
        let mut description = ServerDescription::new(address);
        description.set_err(err);
        description
    }

    /// Whether this server can service reads or writes.
    pub fn is_data_bearing(&self) -> bool {
        match self.server_type {
            ServerType::Standalone |
            ServerType::Mongos |
            ServerType::RSPrimary |
            ServerType::RSSecondary => true,
            _ => false,
        }
    }

    // Updates the server description's type from a successful reply.
    fn update_server_type(&mut self, ismaster: &IsMasterResult) {
        self.server_type = if !ismaster.ok {
            ServerType::Unknown
        } else if !ismaster.msg.is_empty() && ismaster.msg == "isdbgrid" {
            ServerType::Mongos
        } else if ismaster.is_master && !ismaster.set_name.is_empty() {
            ServerType::RSPrimary
        } else if ismaster.secondary && !ismaster.set_name.is_empty() {
            ServerType::RSSecondary
        } else if ismaster.arbiter_only && !ismaster.set_name.is_empty() {
            ServerType::RSArbiter
        } else if !ismaster.set_name.is_empty() || ismaster.hidden {
            ServerType::RSOther
        } else if ismaster.is_replica_set {
            ServerType::RSGhost
        } else {
            ServerType::Standalone
        };
    }

    /// Updates the description from a successful isMaster reply.
    pub fn update(&mut self, ismaster: IsMasterResult, round_trip_time: i64) {
        self.update_server_type(&ismaster);
        self.err = Arc::new(None);
        self.round_trip_time = Some(round_trip_time);
        self.last_update_time = Some(Utc::now());
        self.min_wire_version = ismaster.min_wire_version;
        self.max_wire_version = ismaster.max_wire_version;
        self.me = ismaster.me;
        self.hosts = ismaster.hosts;
        self.passives = ismaster.passives;
        self.arbiters = ismaster.arbiters;
        self.primary = ismaster.primary;
        self.tags = ismaster.tags;
        self.set_name = ismaster.set_name;
        self.set_version = ismaster.set_version;
        self.election_id = ismaster.election_id;
        self.logical_session_timeout_minutes = ismaster.logical_session_timeout_minutes;
        self.last_write_date = ismaster.last_write_date;
        self.op_time = ismaster.op_time;
    }

    /// Records a monitoring error, resetting the fields a failed check
    /// can no longer vouch for.
    pub fn set_err(&mut self, err: Error) {
        self.err = Arc::new(Some(err));
        self.server_type = ServerType::Unknown;
        self.round_trip_time = None;
        self.set_name = String::new();
        self.set_version = None;
        self.election_id = None;
        self.last_update_time = Some(Utc::now());
    }
}
