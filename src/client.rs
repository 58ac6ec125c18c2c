use super::addr::{BusAddress, ServiceAddress};
use super::bus::Bus;
use super::error::{BusError, BusResult};
use super::message::TransportMessage;
use std::collections::HashMap;

/// A per-process facade owning a map of bus connections keyed by
/// domain. Picks the right connection for each outgoing message and
/// exposes send/recv to callers.
///
/// Every connection in `connections` is exclusively owned by the TC;
/// the primary connection is never a second, separately-owned `Bus` --
/// it is simply the map entry keyed by `primary_domain`.
pub struct TransportClient {
    primary_domain: String,
    hostname: String,
    port: u16,
    username: String,
    password: String,
    service: Option<String>,
    service_address: Option<ServiceAddress>,
    connections: HashMap<String, Bus>,
}

impl TransportClient {
    /// Allocates a TC bound to `primary_domain` with an empty
    /// connection map and no primary connection yet.
    pub fn init(primary_domain: &str, hostname: &str, port: u16, username: &str, password: &str) -> Self {
        TransportClient {
            primary_domain: primary_domain.to_string(),
            hostname: hostname.to_string(),
            port,
            username: username.to_string(),
            password: password.to_string(),
            service: None,
            service_address: None,
            connections: HashMap::new(),
        }
    }

    /// Opens a connection to the primary domain with an anonymous
    /// client address and marks it primary.
    pub fn connect(&mut self) -> BusResult<()> {
        let domain = self.primary_domain.clone();
        self.open_domain(&domain, None)?;
        Ok(())
    }

    /// Opens a connection to the primary domain addressed with
    /// `service`, joins the consumer group shared by every worker of
    /// `service` on its well-known inbox stream, records the service
    /// name and that inbox address, and marks the connection primary.
    pub fn connect_as_service(&mut self, service: &str) -> BusResult<()> {
        let domain = self.primary_domain.clone();
        let service_address = ServiceAddress::new(service);

        let bus = self.open_domain(&domain, Some(service))?;
        bus.ensure_group(service_address.as_str())?;

        self.service = Some(service.to_string());
        self.service_address = Some(service_address);
        Ok(())
    }

    fn open_domain(&mut self, domain: &str, service: Option<&str>) -> BusResult<&mut Bus> {
        let mut bus = Bus::new(domain);
        bus.set_address(&self.hostname, service)?;
        bus.connect(self.port, &self.username, &self.password)?;
        self.connections.insert(domain.to_string(), bus);
        Ok(self.connections.get_mut(domain).unwrap())
    }

    /// Gets or lazily opens a connection to `domain`, authenticating
    /// with this TC's credentials.
    fn get_domain_bus(&mut self, domain: &str) -> BusResult<&mut Bus> {
        if self.connections.contains_key(domain) {
            return Ok(self.connections.get_mut(domain).unwrap());
        }

        self.open_domain(domain, None)
    }

    fn primary(&mut self) -> BusResult<&mut Bus> {
        let domain = self.primary_domain.clone();
        self.connections
            .get_mut(&domain)
            .ok_or_else(|| BusError::NotReady("transport client has no primary connection".to_string()))
    }

    pub fn connected(&self) -> bool {
        self.connections.contains_key(&self.primary_domain)
    }

    pub fn service(&self) -> Option<&str> {
        self.service.as_deref()
    }

    pub fn service_address(&self) -> Option<&str> {
        self.service_address.as_ref().map(|a| a.as_str())
    }

    /// Returns the domains this TC currently holds a connection to.
    pub fn connected_domains(&self) -> Vec<&str> {
        self.connections.keys().map(String::as_str).collect()
    }

    /// Resolves the recipient's domain, gets-or-creates a connection
    /// to it, stamps the sender address, and sends.
    pub fn send(&mut self, mut msg: TransportMessage) -> BusResult<()> {
        let recipient = msg.recipient().to_string();

        let addr = BusAddress::from_str(&recipient).map_err(BusError::BadAddress)?;

        let domain = addr
            .domain()
            .ok_or_else(|| BusError::BadAddress(format!("cannot route to domain-less address '{recipient}'")))?
            .to_string();

        let bus = self.get_domain_bus(&domain)?;
        bus.send_message(&mut msg)
    }

    /// Reads from the primary connection's own address.
    pub fn recv(&mut self, timeout: i32) -> BusResult<Option<TransportMessage>> {
        self.primary()?.recv(timeout, None)
    }

    /// Reads from an arbitrary stream on the primary connection (used
    /// by services to read their shared inbox alongside per-session
    /// streams).
    pub fn recv_stream(&mut self, timeout: i32, stream: &str) -> BusResult<Option<TransportMessage>> {
        self.primary()?.recv(timeout, Some(stream))
    }

    /// Releases local heap only. A forked child that inherited this TC
    /// from its parent must call this, never [`TransportClient::close`]
    /// -- the broker-side streams are still in use by the parent.
    pub fn close_local(&mut self) {
        self.connections.clear();
    }

    /// Iterates every owned connection, disconnects each (tearing down
    /// its broker-side stream), and clears the map. Only the process
    /// that created those streams may call this.
    pub fn close(&mut self) -> BusResult<()> {
        for bus in self.connections.values_mut() {
            bus.disconnect()?;
        }

        self.connections.clear();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recv_before_connect_is_not_ready() {
        let mut tc = TransportClient::init("d1", "host1", 6379, "u", "p");
        assert!(tc.recv(0).is_err());
    }

    #[test]
    fn send_to_unparseable_address_is_bad_address() {
        let mut tc = TransportClient::init("d1", "host1", 6379, "u", "p");
        let msg = TransportMessage::new("no-colons-here", "t1", json::JsonValue::Null);
        match tc.send(msg) {
            Err(BusError::BadAddress(_)) => {}
            other => panic!("expected BadAddress, got {:?}", other),
        }
    }
}
