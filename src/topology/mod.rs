//! MongoDB server discovery and monitoring.
pub mod ismaster;
pub mod server;

pub use self::ismaster::IsMasterResult;
pub use self::server::{ServerDescription, ServerType};

use apm::Listener;
use connstring::{ConnectionString, Host};
use error::Error::{self, ArgumentError, IncompatibleError, OperationError};
use error::Result;
use pool::{Connection, ConnectionPool, PoolOptions};
use stream::StreamConnector;

use bson::oid;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, RwLock};
use std::sync::mpsc::Sender;

/// The minimum wire version the driver can speak.
pub const MIN_SUPPORTED_WIRE_VERSION: i64 = 2;
/// The maximum wire version the driver can speak.
pub const MAX_SUPPORTED_WIRE_VERSION: i64 = 5;

/// Describes the deployment topology as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyType {
    Single,
    ReplicaSetNoPrimary,
    ReplicaSetWithPrimary,
    Sharded,
    Unknown,
}

impl FromStr for TopologyType {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "Single" => TopologyType::Single,
            "ReplicaSetNoPrimary" => TopologyType::ReplicaSetNoPrimary,
            "ReplicaSetWithPrimary" => TopologyType::ReplicaSetWithPrimary,
            "Sharded" => TopologyType::Sharded,
            "Unknown" => TopologyType::Unknown,
            _ => return Err(ArgumentError(format!("Unknown topology type '{}'.", s))),
        })
    }
}

impl fmt::Display for TopologyType {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, fmt)
    }
}

/// An immutable snapshot of the deployment's state.
///
/// Every monitoring update produces a fresh description; readers hold an
/// `Arc` to whichever snapshot was current when they looked.
#[derive(Debug, Clone)]
pub struct TopologyDescription {
    topology_type: TopologyType,
    set_name: String,
    servers: HashMap<Host, ServerDescription>,
    max_set_version: Option<i64>,
    max_election_id: Option<oid::ObjectId>,
    compatible: bool,
    compat_error: String,
    logical_session_timeout_minutes: Option<i64>,
    stale: bool,
}

impl TopologyDescription {
    /// Returns a default, unknown topology description.
    pub fn new() -> TopologyDescription {
        TopologyDescription::from_parts(TopologyType::Unknown,
                                        String::new(),
                                        HashMap::new(),
                                        None,
                                        None)
    }

    /// Builds the initial description for a seed list.
    ///
    /// A configured replica set name forces `ReplicaSetNoPrimary`; a single
    /// seed without one means a direct connection, so `Single`.
    pub fn with_seed_list(seeds: Vec<Host>, set_name: Option<&str>) -> TopologyDescription {
        let topology_type = match set_name {
            Some(_) => TopologyType::ReplicaSetNoPrimary,
            None if seeds.len() == 1 => TopologyType::Single,
            None => TopologyType::Unknown,
        };

        let mut servers = HashMap::new();
        for seed in seeds {
            servers.insert(seed.clone(), ServerDescription::new(seed));
        }

        TopologyDescription::from_parts(topology_type,
                                        set_name.unwrap_or("").to_owned(),
                                        servers,
                                        None,
                                        None)
    }

    fn from_parts(topology_type: TopologyType,
                  set_name: String,
                  servers: HashMap<Host, ServerDescription>,
                  max_set_version: Option<i64>,
                  max_election_id: Option<oid::ObjectId>)
                  -> TopologyDescription {
        let mut compatible = true;
        let mut compat_error = String::new();
        for server in servers.values() {
            match server.server_type {
                ServerType::Unknown | ServerType::PossiblePrimary => continue,
                _ => {}
            }
            if server.min_wire_version > MAX_SUPPORTED_WIRE_VERSION {
                compatible = false;
                compat_error = format!("Server at {} requires wire version {}, but this version \
                                        of the driver only supports up to {}.",
                                       server.address,
                                       server.min_wire_version,
                                       MAX_SUPPORTED_WIRE_VERSION);
                break;
            }
            if server.max_wire_version < MIN_SUPPORTED_WIRE_VERSION {
                compatible = false;
                compat_error = format!("Server at {} reports wire version {}, but this version \
                                        of the driver requires at least {}.",
                                       server.address,
                                       server.max_wire_version,
                                       MIN_SUPPORTED_WIRE_VERSION);
                break;
            }
        }

        // The deployment-wide session timeout is the most restrictive one
        // advertised; any data-bearing server without one disables sessions.
        let mut session_timeout: Option<i64> = None;
        for server in servers.values().filter(|server| server.is_data_bearing()) {
            match server.logical_session_timeout_minutes {
                None => {
                    session_timeout = None;
                    break;
                }
                Some(timeout) => {
                    session_timeout = Some(match session_timeout {
                        Some(current) if current < timeout => current,
                        _ => timeout,
                    });
                }
            }
        }

        TopologyDescription {
            topology_type: topology_type,
            set_name: set_name,
            servers: servers,
            max_set_version: max_set_version,
            max_election_id: max_election_id,
            compatible: compatible,
            compat_error: compat_error,
            logical_session_timeout_minutes: session_timeout,
            stale: false,
        }
    }

    pub fn topology_type(&self) -> TopologyType {
        self.topology_type
    }

    pub fn set_name(&self) -> &str {
        &self.set_name
    }

    pub fn servers(&self) -> &HashMap<Host, ServerDescription> {
        &self.servers
    }

    pub fn server(&self, host: &Host) -> Option<&ServerDescription> {
        self.servers.get(host)
    }

    pub fn has_server(&self, host: &Host) -> bool {
        self.servers.contains_key(host)
    }

    pub fn max_set_version(&self) -> Option<i64> {
        self.max_set_version
    }

    pub fn max_election_id(&self) -> Option<&oid::ObjectId> {
        self.max_election_id.as_ref()
    }

    /// Whether every checked server speaks a wire version the driver does.
    pub fn is_compatible(&self) -> bool {
        self.compatible
    }

    /// A message describing the incompatibility, if any.
    pub fn compatibility_error(&self) -> &str {
        &self.compat_error
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn logical_session_timeout_minutes(&self) -> Option<i64> {
        self.logical_session_timeout_minutes
    }

    /// Folds a new server description into the topology, returning the
    /// description that results. The receiver is not modified.
    pub fn update(&self, server: ServerDescription) -> TopologyDescription {
        let mut servers = self.servers.clone();
        let mut topology_type = self.topology_type;
        let mut set_name = self.set_name.clone();
        let mut max_set_version = self.max_set_version;
        let mut max_election_id = self.max_election_id.clone();

        let address = server.address.clone();
        let server_type = server.server_type;
        servers.insert(address.clone(), server.clone());

        // The stages cascade: classifying an undetermined topology falls
        // through into that type's own rules within the same update.
        if topology_type == TopologyType::Unknown {
            match server_type {
                // A stray standalone in an undetermined deployment is
                // ignored; the topology stays undetermined.
                ServerType::Standalone => {
                    servers.remove(&address);
                }
                ServerType::Mongos => topology_type = TopologyType::Sharded,
                ServerType::RSPrimary => topology_type = TopologyType::ReplicaSetWithPrimary,
                _ => topology_type = TopologyType::ReplicaSetNoPrimary,
            }
        }

        if topology_type == TopologyType::Sharded {
            match server_type {
                ServerType::Unknown | ServerType::Mongos => {}
                _ => {
                    servers.remove(&address);
                }
            }
        }

        if topology_type == TopologyType::ReplicaSetNoPrimary {
            match server_type {
                ServerType::Unknown | ServerType::Mongos => {
                    servers.remove(&address);
                }
                ServerType::RSPrimary => {
                    topology_type = update_rs_from_primary(&mut servers,
                                                           &mut set_name,
                                                           &server,
                                                           &mut max_set_version,
                                                           &mut max_election_id);
                }
                ServerType::RSSecondary |
                ServerType::RSArbiter |
                ServerType::RSOther => {
                    update_rs_without_primary(&mut servers, &mut set_name, &server);
                }
                ServerType::Standalone |
                ServerType::RSGhost |
                ServerType::PossiblePrimary => {}
            }
        } else if topology_type == TopologyType::ReplicaSetWithPrimary {
            match server_type {
                ServerType::Standalone | ServerType::Mongos => {
                    servers.remove(&address);
                    topology_type = check_has_primary(&servers);
                }
                ServerType::RSPrimary => {
                    topology_type = update_rs_from_primary(&mut servers,
                                                           &mut set_name,
                                                           &server,
                                                           &mut max_set_version,
                                                           &mut max_election_id);
                }
                ServerType::RSSecondary |
                ServerType::RSArbiter |
                ServerType::RSOther => {
                    topology_type = update_rs_with_primary_from_member(&mut servers,
                                                                       &set_name,
                                                                       &server);
                }
                ServerType::Unknown |
                ServerType::RSGhost |
                ServerType::PossiblePrimary => {
                    topology_type = check_has_primary(&servers);
                }
            }
        }

        TopologyDescription::from_parts(topology_type,
                                        set_name,
                                        servers,
                                        max_set_version,
                                        max_election_id)
    }
}

impl Default for TopologyDescription {
    fn default() -> Self {
        TopologyDescription::new()
    }
}

// Updates the topology from a server that claims to be primary.
fn update_rs_from_primary(servers: &mut HashMap<Host, ServerDescription>,
                          set_name: &mut String,
                          server: &ServerDescription,
                          max_set_version: &mut Option<i64>,
                          max_election_id: &mut Option<oid::ObjectId>)
                          -> TopologyType {
    if set_name.is_empty() {
        *set_name = server.set_name.clone();
    } else if *set_name != server.set_name {
        servers.remove(&server.address);
        return check_has_primary(servers);
    }

    if let (Some(set_version), Some(ref election_id)) =
        (server.set_version, server.election_id.clone()) {
        if let (Some(max_sv), Some(ref max_eid)) = (*max_set_version, max_election_id.clone()) {
            // A primary whose (setVersion, electionId) is behind the maximum
            // ever seen lost a more recent election; disbelieve it.
            if max_sv > set_version || (max_sv == set_version && max_eid > election_id) {
                servers.insert(server.address.clone(),
                               ServerDescription::new(server.address.clone()));
                return check_has_primary(servers);
            }
        }
        *max_election_id = Some(election_id.clone());
    }

    if let Some(set_version) = server.set_version {
        if max_set_version.map_or(true, |max_sv| set_version > max_sv) {
            *max_set_version = Some(set_version);
        }
    }

    // There can be at most one primary; any other server that still claims
    // the title is reset until its next check says otherwise.
    let demoted: Vec<Host> = servers.iter()
        .filter(|&(address, description)| {
            *address != server.address && description.server_type == ServerType::RSPrimary
        })
        .map(|(address, _)| address.clone())
        .collect();
    for address in demoted {
        servers.insert(address.clone(), ServerDescription::new(address));
    }

    add_missing_hosts(servers, server);

    // The primary's host lists are authoritative for membership.
    let absent: Vec<Host> = servers.keys()
        .filter(|address| {
            !server.hosts.contains(address) && !server.passives.contains(address) &&
            !server.arbiters.contains(address)
        })
        .cloned()
        .collect();
    for address in absent {
        servers.remove(&address);
    }

    check_has_primary(servers)
}

// Updates the topology from a non-primary replica set member while no
// primary is known.
fn update_rs_without_primary(servers: &mut HashMap<Host, ServerDescription>,
                             set_name: &mut String,
                             server: &ServerDescription) {
    if set_name.is_empty() {
        *set_name = server.set_name.clone();
    } else if *set_name != server.set_name {
        servers.remove(&server.address);
        return;
    }

    add_missing_hosts(servers, server);
    mark_possible_primary(servers, &server.primary);

    // A member that reports a different `me` than the address it was
    // reached on was found through a stale config entry.
    if let Some(ref me) = server.me {
        if *me != server.address {
            servers.remove(&server.address);
        }
    }
}

// Updates the topology from a non-primary member while a primary is known.
fn update_rs_with_primary_from_member(servers: &mut HashMap<Host, ServerDescription>,
                                      set_name: &str,
                                      server: &ServerDescription)
                                      -> TopologyType {
    if set_name != server.set_name {
        servers.remove(&server.address);
        return check_has_primary(servers);
    }

    if let Some(ref me) = server.me {
        if *me != server.address {
            servers.remove(&server.address);
            return check_has_primary(servers);
        }
    }

    let topology_type = check_has_primary(servers);
    if topology_type == TopologyType::ReplicaSetNoPrimary {
        mark_possible_primary(servers, &server.primary);
    }
    topology_type
}

// Reports whether any known server is currently primary.
fn check_has_primary(servers: &HashMap<Host, ServerDescription>) -> TopologyType {
    let has_primary = servers.values()
        .any(|description| description.server_type == ServerType::RSPrimary);
    if has_primary {
        TopologyType::ReplicaSetWithPrimary
    } else {
        TopologyType::ReplicaSetNoPrimary
    }
}

// Adds any hosts from the member's config that are not yet being tracked.
fn add_missing_hosts(servers: &mut HashMap<Host, ServerDescription>,
                     server: &ServerDescription) {
    for address in server.hosts.iter().chain(&server.passives).chain(&server.arbiters) {
        if !servers.contains_key(address) {
            servers.insert(address.clone(), ServerDescription::new(address.clone()));
        }
    }
}

// Flags the member another server believes to be primary, so a monitor can
// check it ahead of the rest.
fn mark_possible_primary(servers: &mut HashMap<Host, ServerDescription>,
                         primary: &Option<Host>) {
    if let Some(ref address) = *primary {
        if let Some(description) = servers.get_mut(address) {
            if description.server_type == ServerType::Unknown {
                description.server_type = ServerType::PossiblePrimary;
            }
        }
    }
}

/// Tracks the deployment's state and owns the per-server connection pools.
pub struct Topology {
    config: ConnectionString,
    description: RwLock<Arc<TopologyDescription>>,
    pools: RwLock<HashMap<Host, Arc<ConnectionPool>>>,
    pool_options: PoolOptions,
    stream_connector: StreamConnector,
    listener: Arc<Listener>,
    error_tx: Mutex<Option<Sender<Error>>>,
}

impl Topology {
    /// Returns a new topology for the given configuration.
    pub fn new(config: ConnectionString,
               pool_options: Option<PoolOptions>,
               stream_connector: StreamConnector,
               listener: Arc<Listener>)
               -> Result<Topology> {
        if config.hosts.is_empty() {
            return Err(ArgumentError("Topology requires at least one seed host.".to_owned()));
        }

        let set_name = config.get_option("replicaSet").map(|name| name.to_owned());
        let description = TopologyDescription::with_seed_list(config.hosts.clone(),
                                                              set_name.as_ref()
                                                                  .map(|name| name.as_str()));

        Ok(Topology {
            config: config,
            description: RwLock::new(Arc::new(description)),
            pools: RwLock::new(HashMap::new()),
            pool_options: pool_options.unwrap_or_default(),
            stream_connector: stream_connector,
            listener: listener,
            error_tx: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &ConnectionString {
        &self.config
    }

    /// Returns the current topology snapshot.
    pub fn description(&self) -> Result<Arc<TopologyDescription>> {
        let guard = self.description.read()?;
        Ok(guard.clone())
    }

    /// Registers a channel that pools report connection errors over.
    pub fn set_error_sender(&self, sender: Sender<Error>) -> Result<()> {
        *self.error_tx.lock()? = Some(sender.clone());
        let pools = self.pools.read()?;
        for pool in pools.values() {
            pool.set_error_sender(sender.clone())?;
        }
        Ok(())
    }

    /// Folds a server description into the topology and swaps in the
    /// resulting snapshot. Pools for servers no longer in the topology
    /// are closed.
    pub fn update(&self, server: ServerDescription) -> Result<Arc<TopologyDescription>> {
        let new_description = {
            let mut guard = self.description.write()?;
            let updated = Arc::new(guard.update(server));
            *guard = updated.clone();
            updated
        };

        let removed: Vec<Arc<ConnectionPool>> = {
            let mut pools = self.pools.write()?;
            let absent: Vec<Host> = pools.keys()
                .filter(|host| !new_description.has_server(host))
                .cloned()
                .collect();
            absent.iter().filter_map(|host| pools.remove(host)).collect()
        };
        for pool in removed {
            pool.close()?;
        }

        Ok(new_description)
    }

    /// Records a monitoring error against a server.
    pub fn update_error(&self, host: Host, err: Error) -> Result<Arc<TopologyDescription>> {
        self.update(ServerDescription::with_error(host, err))
    }

    /// Returns the connection pool to a member, creating it on first use.
    pub fn pool(&self, host: &Host) -> Result<Arc<ConnectionPool>> {
        if !self.description()?.has_server(host) {
            return Err(OperationError(format!("{} is not a member of the topology.", host)));
        }

        {
            let pools = self.pools.read()?;
            if let Some(pool) = pools.get(host) {
                return Ok(pool.clone());
            }
        }

        let mut pools = self.pools.write()?;
        if let Some(pool) = pools.get(host) {
            return Ok(pool.clone());
        }

        let pool = Arc::new(ConnectionPool::with_options(host.clone(),
                                                         self.pool_options.clone(),
                                                         self.stream_connector.clone(),
                                                         self.listener.clone())?);
        if let Some(ref sender) = *self.error_tx.lock()? {
            pool.set_error_sender(sender.clone())?;
        }
        pools.insert(host.clone(), pool.clone());
        Ok(pool)
    }

    /// Checks a connection out of the pool for a member.
    ///
    /// Fails before touching the pool if the topology contains a server the
    /// driver cannot speak to.
    pub fn check_out(&self, host: &Host) -> Result<Connection> {
        let description = self.description()?;
        if !description.is_compatible() {
            return Err(IncompatibleError(description.compatibility_error().to_owned()));
        }
        self.pool(host)?.check_out()
    }

    /// Closes every pool owned by the topology.
    pub fn close(&self) -> Result<()> {
        let pools: Vec<Arc<ConnectionPool>> = {
            let mut guard = self.pools.write()?;
            guard.drain().map(|(_, pool)| pool).collect()
        };
        for pool in pools {
            pool.close()?;
        }
        Ok(())
    }
}

impl Drop for Topology {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
