use super::util;
use std::fmt;
use std::process;

const BUS_ADDR_NAMESPACE: &str = "opensrf";

/// Models a bus-level address providing access to individual components
/// of each address.
///
/// Examples:
///
/// opensrf:client:private.localhost:hostname:12345:abc12345
/// opensrf:client:private.localhost:hostname:math:12345:abc12345
/// opensrf:service:math
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusAddress {
    /// Full raw address string
    full: String,

    /// Present on client addresses; absent on the well-known service
    /// inbox form, which carries no domain of its own.
    domain: Option<String>,

    /// Only service addresses and service-bound client addresses have
    /// a service name.
    service: Option<String>,

    is_client: bool,
    is_service: bool,
}

impl fmt::Display for BusAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Address={}", &self.full)
    }
}

impl BusAddress {
    /// Creates a new BusAddress from a bus address string.
    ///
    /// ```
    /// let addr =
    ///   opensrf::addr::BusAddress::from_str("opensrf:client:localhost:hostname:12345:abc12345")
    ///   .expect("Error creating address from string");
    ///
    /// assert!(addr.is_client());
    /// assert_eq!(addr.domain(), Some("localhost"));
    /// ```
    pub fn from_str(full: &str) -> Result<Self, String> {
        let parts: Vec<&str> = full.split(':').collect();

        if parts.len() < 3 || parts[0] != BUS_ADDR_NAMESPACE {
            return Err(format!("BusAddress bad format: {full}"));
        }

        let role = parts[1];

        if role == "service" {
            if parts.len() != 3 {
                return Err(format!("Invalid service address: {full}"));
            }

            return Ok(BusAddress {
                full: full.to_string(),
                domain: None,
                service: Some(parts[2].to_string()),
                is_client: false,
                is_service: true,
            });
        }

        if role != "client" {
            return Err(format!("Invalid bus address: {full}"));
        }

        // opensrf:client:<domain>:<host>:<pid>:<rand8>            (anonymous)
        // opensrf:client:<domain>:<host>:<service>:<pid>:<rand8>  (service-bound)
        let domain = parts
            .get(2)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| format!("Invalid client address: {full}"))?
            .to_string();

        let service = match parts.len() {
            6 => None,
            7 => Some(parts[4].to_string()),
            _ => return Err(format!("Invalid client address: {full}")),
        };

        Ok(BusAddress {
            full: full.to_string(),
            domain: Some(domain),
            service,
            is_client: true,
            is_service: false,
        })
    }

    /// Full address string
    pub fn as_str(&self) -> &str {
        &self.full
    }

    /// The broker domain this address's inbound stream lives on.
    ///
    /// `None` for the well-known service inbox form, which names no
    /// domain of its own; recovering a domain from such an address is
    /// a caller error, per the address scheme.
    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    pub fn service(&self) -> Option<&str> {
        self.service.as_deref()
    }

    pub fn is_client(&self) -> bool {
        self.is_client
    }

    pub fn is_service(&self) -> bool {
        self.is_service
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddress {
    addr: BusAddress,
}

impl ClientAddress {
    pub fn from_addr(addr: BusAddress) -> Result<Self, String> {
        if addr.is_client() {
            Ok(ClientAddress { addr })
        } else {
            Err("Cannot create a ClientAddress from a non-client BusAddress".to_string())
        }
    }

    pub fn from_string(full: &str) -> Result<Self, String> {
        let addr = BusAddress::from_str(full)?;
        ClientAddress::from_addr(addr)
    }

    pub fn as_str(&self) -> &str {
        self.addr.as_str()
    }

    /// Creates a new anonymous client address for a domain.
    ///
    /// ```
    /// let domain = "private.localhost";
    /// let addr = opensrf::addr::ClientAddress::new(domain, "hostname");
    /// assert_eq!(addr.addr().domain(), Some(domain));
    /// assert!(addr.addr().is_client());
    /// ```
    pub fn new(domain: &str, hostname: &str) -> Self {
        let full = format!(
            "{BUS_ADDR_NAMESPACE}:client:{domain}:{hostname}:{}:{}",
            process::id(),
            util::random_suffix(8)
        );

        ClientAddress {
            addr: BusAddress::from_str(&full).unwrap(),
        }
    }

    /// Creates a new service-bound client address: the address a
    /// service worker presents to the bus while connected, distinct
    /// from the shared service inbox address.
    ///
    /// ```
    /// let addr = opensrf::addr::ClientAddress::for_service(
    ///     "private.localhost", "hostname", "opensrf.math");
    /// assert_eq!(addr.addr().service(), Some("opensrf.math"));
    /// ```
    pub fn for_service(domain: &str, hostname: &str, service: &str) -> Self {
        let full = format!(
            "{BUS_ADDR_NAMESPACE}:client:{domain}:{hostname}:{service}:{}:{}",
            process::id(),
            util::random_suffix(8)
        );

        ClientAddress {
            addr: BusAddress::from_str(&full).unwrap(),
        }
    }

    pub fn addr(&self) -> &BusAddress {
        &self.addr
    }
}

impl fmt::Display for ClientAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ClientAddress={}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceAddress {
    addr: BusAddress,
}

impl ServiceAddress {
    pub fn from_addr(addr: BusAddress) -> Result<Self, String> {
        if addr.is_service() {
            Ok(ServiceAddress { addr })
        } else {
            Err("Cannot create a ServiceAddress from a non-service BusAddress".to_string())
        }
    }

    pub fn from_string(full: &str) -> Result<Self, String> {
        let addr = BusAddress::from_str(full)?;
        ServiceAddress::from_addr(addr)
    }

    pub fn as_str(&self) -> &str {
        self.addr.as_str()
    }

    /// Creates the well-known, domain-agnostic inbox address shared by
    /// every worker of a service.
    ///
    /// ```
    /// let service = "opensrf.settings";
    /// let addr = opensrf::addr::ServiceAddress::new(service);
    /// assert_eq!(addr.service(), service);
    /// assert!(addr.addr().is_service());
    /// ```
    pub fn new(service: &str) -> Self {
        let full = format!("{BUS_ADDR_NAMESPACE}:service:{service}");

        ServiceAddress {
            addr: BusAddress::from_str(&full).unwrap(),
        }
    }

    pub fn addr(&self) -> &BusAddress {
        &self.addr
    }

    pub fn service(&self) -> &str {
        self.addr().service().unwrap()
    }
}

impl fmt::Display for ServiceAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ServiceAddress={}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_round_trip() {
        let addr = ClientAddress::new("private.localhost", "host1");
        let reparsed = BusAddress::from_str(addr.as_str()).unwrap();
        assert_eq!(reparsed.domain(), Some("private.localhost"));
        assert!(reparsed.is_client());
    }

    #[test]
    fn service_bound_client_round_trip() {
        let addr = ClientAddress::for_service("private.localhost", "host1", "opensrf.math");
        let reparsed = BusAddress::from_str(addr.as_str()).unwrap();
        assert_eq!(reparsed.domain(), Some("private.localhost"));
        assert_eq!(reparsed.service(), Some("opensrf.math"));
    }

    #[test]
    fn well_known_service_address_has_no_domain() {
        let addr = ServiceAddress::new("opensrf.math");
        assert_eq!(addr.addr().domain(), None);
        assert_eq!(addr.service(), "opensrf.math");
    }

    #[test]
    fn malformed_address_is_rejected() {
        assert!(BusAddress::from_str("no-colons-here").is_err());
        assert!(BusAddress::from_str("opensrf:bogus:foo").is_err());
    }
}
