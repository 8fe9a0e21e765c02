//! Connection string and host parsing.
use error::Error::ArgumentError;
use error::Result;

use std::collections::BTreeMap;
use std::fmt;

pub const DEFAULT_PORT: u16 = 27017;
pub const URI_SCHEME: &'static str = "mongodb://";

/// Encapsulates the hostname and port of a server address.
///
/// Host names are lowercased during parsing so that addresses reported by
/// different servers for the same member compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Host {
    pub host_name: String,
    pub port: u16,
}

impl Host {
    pub fn new(host_name: String, port: u16) -> Host {
        Host {
            host_name: host_name,
            port: port,
        }
    }
}

impl fmt::Display for Host {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}:{}", self.host_name, self.port)
    }
}

/// The seed list and options parsed from a MongoDB connection string.
///
/// Credentials and database/collection path segments are accepted by the
/// parser but not modeled; only the pieces the topology consumes are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionString {
    pub hosts: Vec<Host>,
    pub string: Option<String>,
    pub options: BTreeMap<String, String>,
}

impl ConnectionString {
    /// Creates a new ConnectionString for a single host.
    pub fn new(host_name: &str, port: u16) -> ConnectionString {
        ConnectionString {
            hosts: vec![Host::new(host_name.to_ascii_lowercase(), port)],
            string: None,
            options: BTreeMap::new(),
        }
    }

    /// Returns the value of a connection string option, if present.
    pub fn get_option(&self, key: &str) -> Option<&String> {
        self.options.get(key)
    }
}

/// Parses a MongoDB connection string URI as defined by
/// [the manual](http://docs.mongodb.org/manual/reference/connection-string/).
pub fn parse(address: &str) -> Result<ConnectionString> {
    if !address.starts_with(URI_SCHEME) {
        return Err(ArgumentError("MongoDB connection string must start with 'mongodb://'."
            .to_owned()));
    }

    let addr = &address[URI_SCHEME.len()..];
    let (host_str, path_str) = partition(addr, "/");

    if path_str.is_empty() && host_str.contains('?') {
        return Err(ArgumentError("A '/' is required between the host list and any options."
            .to_owned()));
    }

    // Credentials, if present, precede the host list.
    let (_, host_str) = rpartition(host_str, "@");
    let hosts = split_hosts(host_str)?;

    // Any database/collection path segment is skipped; only options are kept.
    let (_, opts) = partition(path_str, "?");
    let options = if opts.is_empty() {
        BTreeMap::new()
    } else {
        split_options(opts)?
    };

    Ok(ConnectionString {
        hosts: hosts,
        string: Some(address.to_owned()),
        options: options,
    })
}

/// Parses a host entity of the form host or host:port, lowercasing the name.
pub fn parse_host(entity: &str) -> Result<Host> {
    if entity.starts_with('[') {
        return parse_ipv6_literal_host(entity);
    }

    if entity.contains(':') {
        let (host, port) = partition(entity, ":");
        if port.contains(':') {
            return Err(ArgumentError("An IPv6 address literal must be enclosed in '[' and ']' \
                                      according to RFC 2732."
                .to_owned()));
        }
        match port.parse::<u16>() {
            Ok(val) => Ok(Host::new(host.to_ascii_lowercase(), val)),
            Err(_) => Err(ArgumentError("Port must be an unsigned integer.".to_owned())),
        }
    } else {
        Ok(Host::new(entity.to_ascii_lowercase(), DEFAULT_PORT))
    }
}

// Parses a literal IPv6 host entity of the form [host] or [host]:port.
fn parse_ipv6_literal_host(entity: &str) -> Result<Host> {
    match entity.find(']') {
        Some(_) => {
            match entity.find("]:") {
                Some(idx) => {
                    match entity[idx + 2..].parse::<u16>() {
                        Ok(val) => Ok(Host::new(entity[1..idx].to_ascii_lowercase(), val)),
                        Err(_) => Err(ArgumentError("Port must be an integer.".to_owned())),
                    }
                }
                None => Ok(Host::new(entity[1..entity.len() - 1].to_ascii_lowercase(),
                                     DEFAULT_PORT)),
            }
        }
        None => Err(ArgumentError("An IPv6 address must be enclosed in '[' and ']' according \
                                   to RFC 2732."
            .to_owned())),
    }
}

// Splits and parses comma-separated hosts.
fn split_hosts(host_str: &str) -> Result<Vec<Host>> {
    let mut hosts = Vec::new();
    for entity in host_str.split(',') {
        if entity.is_empty() {
            return Err(ArgumentError("Empty host, or extra comma in host list.".to_owned()));
        }
        hosts.push(parse_host(entity)?);
    }
    Ok(hosts)
}

// Parses the option segment into key=value pairs.
fn split_options(opts: &str) -> Result<BTreeMap<String, String>> {
    if opts.contains('&') && opts.contains(';') {
        return Err(ArgumentError("Cannot mix '&' and ';' for option separators.".to_owned()));
    }

    let delim = if opts.contains(';') { ';' } else { '&' };
    let mut options = BTreeMap::new();

    for opt in opts.split(delim) {
        let (key, val) = partition(opt, "=");
        if val.is_empty() {
            return Err(ArgumentError("MongoDB URI options are key=value pairs.".to_owned()));
        }
        options.insert(key.to_owned(), val.to_owned());
    }

    Ok(options)
}

// Partitions a string around the left-most occurrence of the separator, if it exists.
fn partition<'a>(string: &'a str, sep: &str) -> (&'a str, &'a str) {
    match string.find(sep) {
        Some(idx) => (&string[..idx], &string[idx + sep.len()..]),
        None => (string, ""),
    }
}

// Partitions a string around the right-most occurrence of the separator, if it exists.
fn rpartition<'a>(string: &'a str, sep: &str) -> (&'a str, &'a str) {
    match string.rfind(sep) {
        Some(idx) => (&string[..idx], &string[idx + sep.len()..]),
        None => ("", string),
    }
}
