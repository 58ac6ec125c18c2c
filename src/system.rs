//! Wires Configuration to a TransportClient: resolves credentials and
//! port, opens the primary connection, switches log sinks, and records
//! the process-global TC.
use super::client::TransportClient;
use super::conf::Config;
use super::error::{BusError, BusResult};
use super::logging::Logger;
use std::sync::OnceLock;

/// Process-global transport client and default configuration, handed
/// in explicitly at bootstrap rather than living as hidden module
/// statics, so tests can construct a `SystemContext` directly instead
/// of only through the globals.
pub struct SystemContext {
    config: Config,
    client: TransportClient,
}

impl SystemContext {
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn client(&self) -> &TransportClient {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut TransportClient {
        &mut self.client
    }
}

static GLOBAL_CONTEXT: OnceLock<std::sync::Mutex<Option<SystemContext>>> = OnceLock::new();

fn global_slot() -> &'static std::sync::Mutex<Option<SystemContext>> {
    GLOBAL_CONTEXT.get_or_init(|| std::sync::Mutex::new(None))
}

/// Returns true if the process already has a live transport client.
pub fn has_global_client() -> bool {
    global_slot().lock().unwrap().is_some()
}

/// Bootstraps the process-global transport client, per the ordered
/// steps:
///
/// 1. If the process already has a live TC, return success.
/// 2. Resolve the primary connection for (domain, profile). Failure
///    aborts.
/// 3. Install the log sink per the resolved log options.
/// 4. Build a TC with (node_name, port, username, password) and
///    connect (as service, if given, or anonymous).
/// 5. Publish the TC as the process-global transport client.
pub fn bootstrap(
    mut config: Config,
    domain: &str,
    profile: &str,
    hostname: &str,
    service: Option<&str>,
) -> BusResult<()> {
    if has_global_client() {
        return Ok(());
    }

    config.set_primary_connection(domain, profile)?;

    let primary = config
        .primary_connection()
        .expect("just resolved")
        .clone();

    Logger::new(primary.log_options())
        .map_err(BusError::ConfigInvalid)?
        .init()
        .map_err(|e| BusError::ConfigInvalid(format!("error initializing logger: {e}")))?;

    let mut client = TransportClient::init(
        primary.domain().name(),
        hostname,
        primary.port(),
        primary.credentials().username(),
        primary.credentials().password(),
    );

    match service {
        Some(s) => client.connect_as_service(s)?,
        None => client.connect()?,
    }

    *global_slot().lock().unwrap() = Some(SystemContext { config, client });

    Ok(())
}

/// Returns the process-global transport client, or `None` if the
/// process has not bootstrapped (or has torn down).
pub fn with_global_client<F, R>(f: F) -> Option<R>
where
    F: FnOnce(&mut TransportClient) -> R,
{
    let mut guard = global_slot().lock().unwrap();
    guard.as_mut().map(|ctx| f(ctx.client_mut()))
}

/// Disconnects the global transport client and frees the global
/// configuration.
pub fn teardown() -> BusResult<()> {
    let mut guard = global_slot().lock().unwrap();

    if let Some(mut ctx) = guard.take() {
        ctx.client.close()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_exposes_config_and_client() {
        let config = Config::from_yaml_string(
            r#"
hostname: host1
domain: private.localhost
credentials:
  service:
    username: u
    password: p
domains:
  - name: private.localhost
    private_node:
      name: private.localhost
      port: 6379
connections:
  service:
    node_type: private
    credentials: service
"#,
        )
        .unwrap();

        let client = TransportClient::init("private.localhost", "host1", 6379, "u", "p");
        let ctx = SystemContext { config, client };

        assert_eq!(ctx.config().domain(), "private.localhost");
        assert!(!ctx.client().connected());
    }
}
