use super::error::{BusError, BusResult};
use gethostname::gethostname;
use std::collections::HashMap;
use std::fs;
use std::str::FromStr;
use std::sync::Arc;
use yaml_rust::{Yaml, YamlLoader};

pub const DEFAULT_BUS_PORT: u16 = 6379;

#[derive(Debug, Clone, PartialEq)]
pub enum LogFile {
    Syslog,
    Filename(String),
}

#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    log_level: Option<log::LevelFilter>,
    log_file: Option<LogFile>,
    syslog_facility: Option<syslog::Facility>,
    activity_log_facility: Option<syslog::Facility>,
    log_tag: Option<String>,
}

impl LogOptions {
    pub fn log_level(&self) -> Option<log::LevelFilter> {
        self.log_level
    }
    pub fn log_file(&self) -> Option<&LogFile> {
        self.log_file.as_ref()
    }
    pub fn syslog_facility(&self) -> Option<syslog::Facility> {
        self.syslog_facility
    }
    pub fn activity_log_facility(&self) -> Option<syslog::Facility> {
        self.activity_log_facility
    }
    pub fn log_tag(&self) -> Option<&str> {
        self.log_tag.as_deref()
    }
    pub fn set_log_level(&mut self, level: &str) {
        self.log_level = Some(LogOptions::log_level_from_str(level));
    }

    /// Defaults to Info.
    pub fn log_level_from_str(level: &str) -> log::LevelFilter {
        match level {
            "1" => log::LevelFilter::Error,
            "2" => log::LevelFilter::Warn,
            "3" => log::LevelFilter::Info,
            "4" => log::LevelFilter::Debug,
            "5" => log::LevelFilter::Trace,
            _ => log::LevelFilter::Info,
        }
    }

    /// Fills in any field left unset here from `defaults`.
    fn inherit(&mut self, defaults: &LogOptions) {
        if self.log_level.is_none() {
            self.log_level = defaults.log_level;
        }
        if self.log_file.is_none() {
            self.log_file = defaults.log_file.clone();
        }
        if self.syslog_facility.is_none() {
            self.syslog_facility = defaults.syslog_facility;
        }
        if self.activity_log_facility.is_none() {
            self.activity_log_facility = defaults.activity_log_facility;
        }
        if self.log_tag.is_none() {
            self.log_tag = defaults.log_tag.clone();
        }
    }

    fn from_yaml(y: &Yaml) -> Self {
        let mut ops = LogOptions::default();

        match y["log_file"].as_str() {
            Some("syslog") => ops.log_file = Some(LogFile::Syslog),
            Some(f) => ops.log_file = Some(LogFile::Filename(f.to_string())),
            None => {}
        }

        if let Some(l) = y["log_level"].as_str() {
            ops.log_level = Some(LogOptions::log_level_from_str(l));
        } else if let Some(i) = y["log_level"].as_i64() {
            ops.log_level = Some(LogOptions::log_level_from_str(&i.to_string()));
        }

        if let Some(f) = y["syslog_facility"].as_str() {
            ops.syslog_facility = syslog::Facility::from_str(f).ok();
        }

        if let Some(f) = y["activity_log_facility"].as_str() {
            ops.activity_log_facility = syslog::Facility::from_str(f).ok();
        }

        if let Some(t) = y["log_tag"].as_str() {
            ops.log_tag = Some(t.to_string());
        }

        ops
    }
}

/// A set of bus login credentials, named in the `credentials` map and
/// referenced by name from a connection profile.
#[derive(Debug, Clone)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn username(&self) -> &str {
        &self.username
    }
    pub fn password(&self) -> &str {
        &self.password
    }
}

/// One broker endpoint: a host/port pair plus the services it is
/// willing to carry traffic for.
#[derive(Debug, Clone)]
pub struct BusNode {
    name: String,
    port: u16,
    allowed_services: Option<Vec<String>>,
}

impl BusNode {
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn port(&self) -> u16 {
        self.port
    }
    pub fn allowed_services(&self) -> Option<&Vec<String>> {
        self.allowed_services.as_ref()
    }
}

/// A domain may expose a private node (for intra-domain traffic) and a
/// public node (for cross-domain traffic); either or both may be set.
#[derive(Debug, Clone)]
pub struct BusDomain {
    name: String,
    private_node: Option<BusNode>,
    public_node: Option<BusNode>,
}

impl BusDomain {
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn private_node(&self) -> Option<&BusNode> {
        self.private_node.as_ref()
    }
    pub fn public_node(&self) -> Option<&BusNode> {
        self.public_node.as_ref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Private,
    Public,
}

/// A named connection profile: which node type to use, which
/// credentials to authenticate with, and its log options.
#[derive(Debug, Clone)]
pub struct ConnectionProfile {
    node_type: NodeType,
    credentials: String,
    log_options: LogOptions,
}

impl ConnectionProfile {
    pub fn node_type(&self) -> NodeType {
        self.node_type
    }
    pub fn credentials(&self) -> &str {
        &self.credentials
    }
    pub fn log_options(&self) -> &LogOptions {
        &self.log_options
    }
}

/// The concrete bundle Bootstrap needs to open a connection: a
/// resolved (domain, node, credentials, log options) tuple.
#[derive(Debug, Clone)]
pub struct PrimaryConnection {
    domain: BusDomain,
    node: BusNode,
    credentials: Credentials,
    log_options: LogOptions,
}

impl PrimaryConnection {
    pub fn domain(&self) -> &BusDomain {
        &self.domain
    }
    pub fn node(&self) -> &BusNode {
        &self.node
    }
    pub fn port(&self) -> u16 {
        self.node.port()
    }
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }
    pub fn log_options(&self) -> &LogOptions {
        &self.log_options
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    hostname: String,
    domain: String,
    credentials: HashMap<String, Credentials>,
    service_groups: HashMap<String, Vec<String>>,
    domains: Vec<BusDomain>,
    connections: HashMap<String, ConnectionProfile>,
    log_protect: Vec<String>,
    log_defaults: LogOptions,
    primary_connection: Option<PrimaryConnection>,
    username_override: Option<String>,
    password_override: Option<String>,
}

impl Config {
    /// Parses a YAML document from a file path.
    pub fn from_file(filename: &str) -> BusResult<Self> {
        let text = fs::read_to_string(filename).map_err(|e| {
            BusError::ConfigInvalid(format!("error reading configuration file {filename}: {e}"))
        })?;

        Config::from_yaml_string(&text)
    }

    pub fn from_yaml_string(yaml: &str) -> BusResult<Self> {
        let docs = YamlLoader::load_from_str(yaml)
            .map_err(|e| BusError::ConfigInvalid(format!("error parsing YAML: {e}")))?;

        let doc = docs
            .first()
            .ok_or_else(|| BusError::ConfigInvalid("configuration document is empty".to_string()))?;

        Config::from_yaml_doc(doc)
    }

    fn from_yaml_doc(doc: &Yaml) -> BusResult<Self> {
        let hostname = match doc["hostname"].as_str() {
            Some(h) => h.to_string(),
            None => Config::get_os_hostname()?,
        };

        let domain = match doc["domain"].as_str() {
            Some(d) => d.to_string(),
            None => Config::get_os_domain(&hostname),
        };

        let credentials = Config::unpack_credentials(doc)?;
        let service_groups = Config::unpack_service_groups(doc)?;
        let domains = Config::unpack_domains(doc, &service_groups)?;
        let log_defaults = LogOptions::from_yaml(&doc["log_defaults"]);
        let connections = Config::unpack_connections(doc, &credentials, &log_defaults)?;

        let mut log_protect = Vec::new();
        if let Some(arr) = doc["log_protect"].as_vec() {
            for v in arr {
                if let Some(s) = v.as_str() {
                    log_protect.push(s.to_string());
                }
            }
        }

        Ok(Config {
            hostname,
            domain,
            credentials,
            service_groups,
            domains,
            connections,
            log_protect,
            log_defaults,
            primary_connection: None,
            username_override: None,
            password_override: None,
        })
    }

    fn unpack_credentials(doc: &Yaml) -> BusResult<HashMap<String, Credentials>> {
        let mut map = HashMap::new();

        if let Some(hash) = doc["credentials"].as_hash() {
            for (k, v) in hash {
                let name = k
                    .as_str()
                    .ok_or_else(|| BusError::ConfigInvalid("credentials key is not a string".to_string()))?;

                let username = v["username"].as_str().ok_or_else(|| {
                    BusError::ConfigInvalid(format!("credentials '{name}' missing username"))
                })?;

                let password = v["password"].as_str().ok_or_else(|| {
                    BusError::ConfigInvalid(format!("credentials '{name}' missing password"))
                })?;

                map.insert(
                    name.to_string(),
                    Credentials {
                        username: username.to_string(),
                        password: password.to_string(),
                    },
                );
            }
        }

        Ok(map)
    }

    fn unpack_service_groups(doc: &Yaml) -> BusResult<HashMap<String, Vec<String>>> {
        let mut map = HashMap::new();

        if let Some(hash) = doc["service_groups"].as_hash() {
            for (k, v) in hash {
                let name = k.as_str().ok_or_else(|| {
                    BusError::ConfigInvalid("service_groups key is not a string".to_string())
                })?;

                let mut services = Vec::new();
                if let Some(arr) = v.as_vec() {
                    for s in arr {
                        if let Some(s) = s.as_str() {
                            services.push(s.to_string());
                        }
                    }
                }

                map.insert(name.to_string(), services);
            }
        }

        Ok(map)
    }

    fn unpack_node(
        node: &Yaml,
        service_groups: &HashMap<String, Vec<String>>,
    ) -> BusResult<Option<BusNode>> {
        if node.is_badvalue() || node.as_hash().is_none() {
            return Ok(None);
        }

        let name = node["name"]
            .as_str()
            .ok_or_else(|| BusError::ConfigInvalid("bus node missing 'name'".to_string()))?
            .to_string();

        let port = match node["port"].as_i64() {
            Some(p) => p as u16,
            None => DEFAULT_BUS_PORT,
        };

        let allowed_services = match node["allowed_services"].as_str() {
            Some(group_name) => {
                let group = service_groups.get(group_name).ok_or_else(|| {
                    BusError::ConfigInvalid(format!("unknown service group '{group_name}'"))
                })?;
                Some(group.clone())
            }
            None => node["allowed_services"].as_vec().map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            }),
        };

        Ok(Some(BusNode {
            name,
            port,
            allowed_services,
        }))
    }

    fn unpack_domains(
        doc: &Yaml,
        service_groups: &HashMap<String, Vec<String>>,
    ) -> BusResult<Vec<BusDomain>> {
        let mut domains = Vec::new();

        if let Some(arr) = doc["domains"].as_vec() {
            for d in arr {
                let name = d["name"]
                    .as_str()
                    .ok_or_else(|| BusError::ConfigInvalid("domain missing 'name'".to_string()))?
                    .to_string();

                let private_node = Config::unpack_node(&d["private_node"], service_groups)?;
                let public_node = Config::unpack_node(&d["public_node"], service_groups)?;

                domains.push(BusDomain {
                    name,
                    private_node,
                    public_node,
                });
            }
        }

        Ok(domains)
    }

    fn unpack_connections(
        doc: &Yaml,
        credentials: &HashMap<String, Credentials>,
        log_defaults: &LogOptions,
    ) -> BusResult<HashMap<String, ConnectionProfile>> {
        let mut map = HashMap::new();

        if let Some(hash) = doc["connections"].as_hash() {
            for (k, v) in hash {
                let name = k
                    .as_str()
                    .ok_or_else(|| BusError::ConfigInvalid("connections key is not a string".to_string()))?;

                let node_type = match v["node_type"].as_str() {
                    Some("public") => NodeType::Public,
                    Some("private") | None => NodeType::Private,
                    Some(other) => {
                        return Err(BusError::ConfigInvalid(format!(
                            "connection '{name}' has unknown node_type '{other}'"
                        )))
                    }
                };

                let cred_name = v["credentials"].as_str().ok_or_else(|| {
                    BusError::ConfigInvalid(format!("connection '{name}' missing credentials"))
                })?;

                if !credentials.contains_key(cred_name) {
                    return Err(BusError::ConfigInvalid(format!(
                        "connection '{name}' references unknown credentials '{cred_name}'"
                    )));
                }

                let mut log_options = LogOptions::from_yaml(v);
                log_options.inherit(log_defaults);

                map.insert(
                    name.to_string(),
                    ConnectionProfile {
                        node_type,
                        credentials: cred_name.to_string(),
                        log_options,
                    },
                );
            }
        }

        Ok(map)
    }

    pub fn into_shared(self) -> Arc<Config> {
        Arc::new(self)
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn log_protect(&self) -> &[String] {
        &self.log_protect
    }

    pub fn log_defaults(&self) -> &LogOptions {
        &self.log_defaults
    }

    pub fn credentials(&self, name: &str) -> Option<&Credentials> {
        self.credentials.get(name)
    }

    pub fn connection(&self, profile: &str) -> Option<&ConnectionProfile> {
        self.connections.get(profile)
    }

    pub fn get_domain(&self, name: &str) -> Option<&BusDomain> {
        self.domains.iter().find(|d| d.name() == name)
    }

    pub fn service_group(&self, name: &str) -> Option<&Vec<String>> {
        self.service_groups.get(name)
    }

    pub fn primary_connection(&self) -> Option<&PrimaryConnection> {
        self.primary_connection.as_ref()
    }

    /// Resolves a (domain, profile) pair into a concrete connection
    /// bundle and stores it as the primary connection.
    pub fn set_primary_connection(&mut self, domain: &str, profile: &str) -> BusResult<()> {
        let bus_domain = self
            .get_domain(domain)
            .ok_or_else(|| BusError::ConfigInvalid(format!("unknown domain '{domain}'")))?
            .clone();

        let conn_profile = self
            .connection(profile)
            .ok_or_else(|| BusError::ConfigInvalid(format!("unknown connection profile '{profile}'")))?
            .clone();

        let node = match conn_profile.node_type() {
            NodeType::Private => bus_domain.private_node(),
            NodeType::Public => bus_domain.public_node(),
        }
        .ok_or_else(|| {
            BusError::ConfigInvalid(format!(
                "domain '{domain}' has no {:?} node for profile '{profile}'",
                conn_profile.node_type()
            ))
        })?
        .clone();

        let mut credentials = self
            .credentials(conn_profile.credentials())
            .ok_or_else(|| {
                BusError::ConfigInvalid(format!(
                    "unknown credentials '{}'",
                    conn_profile.credentials()
                ))
            })?
            .clone();

        if let Some(username) = &self.username_override {
            credentials.username = username.clone();
        }
        if let Some(password) = &self.password_override {
            credentials.password = password.clone();
        }

        self.primary_connection = Some(PrimaryConnection {
            domain: bus_domain,
            node,
            credentials,
            log_options: conn_profile.log_options().clone(),
        });

        Ok(())
    }

    /// Manually override the OS hostname, e.g. with "localhost".
    pub fn set_hostname(&mut self, hostname: &str) {
        self.hostname = hostname.to_string();
    }

    /// Overrides the username on whichever credentials the primary
    /// connection resolves to, regardless of what the named profile
    /// points at. Takes effect on the next [`Config::set_primary_connection`]
    /// call.
    pub fn set_bus_username(&mut self, username: &str) {
        self.username_override = Some(username.to_string());
    }

    /// Overrides the password on whichever credentials the primary
    /// connection resolves to. See [`Config::set_bus_username`].
    pub fn set_bus_password(&mut self, password: &str) {
        self.password_override = Some(password.to_string());
    }

    /// Manually override the OS domain.
    pub fn set_domain(&mut self, domain: &str) {
        self.domain = domain.to_string();
    }

    fn get_os_hostname() -> BusResult<String> {
        gethostname()
            .into_string()
            .map_err(|e| BusError::ConfigInvalid(format!("cannot read OS host name: {e:?}")))
    }

    fn get_os_domain(hostname: &str) -> String {
        match hostname.split_once('.') {
            Some((_, domain)) => domain.to_string(),
            None => hostname.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
hostname: host1
domain: private.localhost
credentials:
  router:
    username: router
    password: routerpass
service_groups:
  core:
    - opensrf.math
domains:
  - name: private.localhost
    private_node:
      name: private.localhost
      port: 6379
      allowed_services: core
    public_node:
      name: public.localhost
      port: 6380
connections:
  service:
    node_type: private
    credentials: router
    log_level: "4"
log_defaults:
  log_level: "3"
log_protect:
  - opensrf.auth.authenticate
"#;

    #[test]
    fn parses_full_document() {
        let conf = Config::from_yaml_string(SAMPLE).unwrap();
        assert_eq!(conf.hostname(), "host1");
        assert_eq!(conf.domain(), "private.localhost");
        assert_eq!(conf.credentials("router").unwrap().username(), "router");
        assert_eq!(conf.log_protect(), &["opensrf.auth.authenticate".to_string()]);
    }

    #[test]
    fn log_options_inherit_from_defaults() {
        let conf = Config::from_yaml_string(SAMPLE).unwrap();
        let profile = conf.connection("service").unwrap();
        // log_level is set explicitly on the profile (overrides the default).
        assert_eq!(profile.log_options().log_level(), Some(log::LevelFilter::Debug));
    }

    #[test]
    fn unknown_credentials_reference_is_rejected() {
        let bad = SAMPLE.replace("credentials: router", "credentials: nonexistent");
        assert!(Config::from_yaml_string(&bad).is_err());
    }

    #[test]
    fn unknown_service_group_reference_is_rejected() {
        let bad = SAMPLE.replace("allowed_services: core", "allowed_services: nonexistent");
        assert!(Config::from_yaml_string(&bad).is_err());
    }

    #[test]
    fn set_primary_connection_resolves_bundle() {
        let mut conf = Config::from_yaml_string(SAMPLE).unwrap();
        conf.set_primary_connection("private.localhost", "service").unwrap();

        let primary = conf.primary_connection().unwrap();
        assert_eq!(primary.port(), 6379);
        assert_eq!(primary.credentials().username(), "router");
    }

    #[test]
    fn bus_credential_overrides_win_over_the_profile() {
        let mut conf = Config::from_yaml_string(SAMPLE).unwrap();
        conf.set_bus_username("override-user");
        conf.set_bus_password("override-pass");
        conf.set_primary_connection("private.localhost", "service").unwrap();

        let primary = conf.primary_connection().unwrap();
        assert_eq!(primary.credentials().username(), "override-user");
        assert_eq!(primary.credentials().password(), "override-pass");
    }
}
