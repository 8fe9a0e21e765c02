//! Typed view of an isMaster command reply.
use bson::{self, Bson, oid};
use chrono::{DateTime, Utc};
use connstring::{self, Host};
use error::Error::ArgumentError;
use error::Result;

use std::collections::BTreeMap;

/// The server state reported by an isMaster reply.
#[derive(Debug, Clone, PartialEq)]
pub struct IsMasterResult {
    pub ok: bool,
    pub is_master: bool,
    pub secondary: bool,
    pub arbiter_only: bool,
    pub is_replica_set: bool,
    pub msg: String,
    pub hidden: bool,
    pub me: Option<Host>,
    pub hosts: Vec<Host>,
    pub passives: Vec<Host>,
    pub arbiters: Vec<Host>,
    pub set_name: String,
    pub set_version: Option<i64>,
    pub election_id: Option<oid::ObjectId>,
    pub primary: Option<Host>,
    pub tags: BTreeMap<String, String>,
    pub min_wire_version: i64,
    pub max_wire_version: i64,
    pub logical_session_timeout_minutes: Option<i64>,
    pub last_write_date: Option<DateTime<Utc>>,
    pub op_time: Option<bson::Document>,
}

fn get_number(doc: &bson::Document, key: &str) -> Option<i64> {
    match doc.get(key) {
        Some(&Bson::I32(v)) => Some(v as i64),
        Some(&Bson::I64(v)) => Some(v),
        Some(&Bson::FloatingPoint(v)) => Some(v as i64),
        _ => None,
    }
}

fn get_hosts(doc: &bson::Document, key: &str) -> Result<Vec<Host>> {
    let mut hosts = Vec::new();
    if let Some(&Bson::Array(ref arr)) = doc.get(key) {
        for bson in arr {
            if let Bson::String(ref s) = *bson {
                hosts.push(connstring::parse_host(s)?);
            }
        }
    }
    Ok(hosts)
}

impl IsMasterResult {
    /// Parses an isMaster reply document.
    ///
    /// A reply that does not carry `ok` is rejected; a reply with `ok: 0`
    /// is kept but marked not ok, matching the server's error convention.
    pub fn new(doc: bson::Document) -> Result<IsMasterResult> {
        let ok = match get_number(&doc, "ok") {
            Some(v) => v == 1,
            None => {
                return Err(ArgumentError("result does not contain `ok`.".to_owned()));
            }
        };

        let mut result = IsMasterResult {
            ok: ok,
            is_master: doc.get_bool("ismaster").unwrap_or(false),
            secondary: doc.get_bool("secondary").unwrap_or(false),
            arbiter_only: doc.get_bool("arbiterOnly").unwrap_or(false),
            is_replica_set: doc.get_bool("isreplicaset").unwrap_or(false),
            msg: doc.get_str("msg").unwrap_or("").to_owned(),
            hidden: doc.get_bool("hidden").unwrap_or(false),
            me: None,
            hosts: get_hosts(&doc, "hosts")?,
            passives: get_hosts(&doc, "passives")?,
            arbiters: get_hosts(&doc, "arbiters")?,
            set_name: doc.get_str("setName").unwrap_or("").to_owned(),
            set_version: get_number(&doc, "setVersion"),
            election_id: None,
            primary: None,
            tags: BTreeMap::new(),
            min_wire_version: get_number(&doc, "minWireVersion").unwrap_or(0),
            max_wire_version: get_number(&doc, "maxWireVersion").unwrap_or(0),
            logical_session_timeout_minutes: get_number(&doc, "logicalSessionTimeoutMinutes"),
            last_write_date: None,
            op_time: None,
        };

        if let Some(&Bson::String(ref me)) = doc.get("me") {
            result.me = Some(connstring::parse_host(me)?);
        }

        if let Some(&Bson::String(ref primary)) = doc.get("primary") {
            result.primary = Some(connstring::parse_host(primary)?);
        }

        if let Some(&Bson::ObjectId(ref id)) = doc.get("electionId") {
            result.election_id = Some(id.clone());
        }

        if let Some(&Bson::Document(ref tags)) = doc.get("tags") {
            for (key, val) in tags.iter() {
                if let Bson::String(ref value) = *val {
                    result.tags.insert(key.to_owned(), value.to_owned());
                }
            }
        }

        if let Some(&Bson::Document(ref last_write)) = doc.get("lastWrite") {
            if let Some(&Bson::UtcDatetime(ref date)) = last_write.get("lastWriteDate") {
                result.last_write_date = Some(*date);
            }
            if let Some(&Bson::Document(ref op_time)) = last_write.get("opTime") {
                result.op_time = Some(op_time.clone());
            }
        }

        Ok(result)
    }
}
