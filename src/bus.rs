use super::addr::{BusAddress, ClientAddress};
use super::error::{BusError, BusResult};
use super::message::TransportMessage;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::{Commands, ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use std::fmt;
use std::time;

/// Soft cap on a stream's length, enforced by the broker via `MAXLEN ~`.
pub const DEFAULT_MAX_QUEUE: u64 = 1000;

/// `C`'s lifecycle: `new` leaves a connection unaddressed and
/// unconnected; `set_address` must precede `connect`; once connected
/// a connection oscillates between sending and receiving until
/// `disconnect` retires it for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BusState {
    New,
    Addressed,
    Connected,
    Closed,
}

/// One authenticated session to one broker endpoint.
///
/// Owns the inbound stream named by its own address and the consumer
/// group of the same name declared over it at connect time.
pub struct Bus {
    connection: Option<redis::Connection>,
    domain: String,
    address: Option<BusAddress>,
    max_queue: u64,
    state: BusState,
}

impl Bus {
    /// Allocates a connection bound to `domain`. Does not touch the
    /// wire; `set_address` and `connect` are still required.
    pub fn new(domain: &str) -> Self {
        Bus {
            connection: None,
            domain: domain.to_string(),
            address: None,
            max_queue: DEFAULT_MAX_QUEUE,
            state: BusState::New,
        }
    }

    pub fn set_max_queue(&mut self, max_queue: u64) {
        self.max_queue = max_queue;
    }

    /// Composes this connection's inbound address -- an anonymous
    /// client address, or a service-bound one if `service` is given --
    /// and stores it. Must precede `connect`.
    pub fn set_address(&mut self, hostname: &str, service: Option<&str>) -> BusResult<()> {
        if self.state != BusState::New {
            return Err(BusError::NotReady(
                "set_address() requires a freshly allocated connection".to_string(),
            ));
        }

        let addr = match service {
            Some(s) => ClientAddress::for_service(&self.domain, hostname, s).addr().clone(),
            None => ClientAddress::new(&self.domain, hostname).addr().clone(),
        };

        self.address = Some(addr);
        self.state = BusState::Addressed;

        Ok(())
    }

    pub fn address(&self) -> Option<&BusAddress> {
        self.address.as_ref()
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn connected(&self) -> bool {
        self.state == BusState::Connected
    }

    fn connection_info(&self, port: u16, username: &str, password: &str) -> ConnectionInfo {
        ConnectionInfo {
            addr: ConnectionAddr::Tcp(self.domain.clone(), port),
            redis: RedisConnectionInfo {
                db: 0,
                username: Some(username.to_string()),
                password: Some(password.to_string()),
            },
        }
    }

    /// Opens the broker session, authenticates, and declares the
    /// consumer group -- named after this connection's own address --
    /// over its inbound stream, creating the stream if it does not yet
    /// exist. Re-declaring a pre-existing group is a non-fatal no-op.
    pub fn connect(&mut self, port: u16, username: &str, password: &str) -> BusResult<()> {
        if self.state != BusState::Addressed {
            return Err(BusError::NotReady(
                "connect() requires an addressed connection".to_string(),
            ));
        }

        let info = self.connection_info(port, username, password);

        log::trace!("Bus::connect() connecting to {info:?}");

        let client = redis::Client::open(info)
            .map_err(|e| BusError::BrokerUnreachable(format!("error opening connection: {e}")))?;

        let mut connection = client
            .get_connection()
            .map_err(|e| BusError::BrokerUnreachable(format!("connect failed: {e}")))?;

        let stream = self.address().unwrap().as_str().to_string();

        Bus::declare_group(&mut connection, &stream)?;

        self.connection = Some(connection);
        self.state = BusState::Connected;

        Ok(())
    }

    /// Declares a consumer group named after `stream` on `stream`
    /// itself, creating the stream if it does not yet exist.
    /// Re-declaring a pre-existing group is a non-fatal no-op.
    fn declare_group(conn: &mut redis::Connection, stream: &str) -> BusResult<()> {
        let create: redis::RedisResult<()> = conn.xgroup_create_mkstream(stream, stream, "$");

        if let Err(e) = create {
            let is_busygroup =
                e.kind() == redis::ErrorKind::ExtensionError && e.code() == Some("BUSYGROUP");

            if !is_busygroup {
                return Err(BusError::BrokerUnreachable(format!(
                    "could not declare consumer group on {stream}: {e}"
                )));
            }
        }

        Ok(())
    }

    /// Joins a shared stream this connection does not own -- a
    /// service's well-known inbox -- by declaring (or confirming) a
    /// consumer group named after it. Must be called once per
    /// connection before reading that stream via [`Bus::recv`].
    pub fn ensure_group(&mut self, stream: &str) -> BusResult<()> {
        let conn = self.connection_mut()?;
        Bus::declare_group(conn, stream)
    }

    fn connection_mut(&mut self) -> BusResult<&mut redis::Connection> {
        self.connection
            .as_mut()
            .ok_or_else(|| BusError::NotReady("connection is not connected".to_string()))
    }

    /// Appends one `message` entry carrying `body_json` to
    /// `recipient_stream`, capped at this connection's `max_queue`.
    /// `NOMKSTREAM` means a send to a stream that no longer exists
    /// (its owner is gone) fails fast rather than resurrecting it.
    pub fn send(&mut self, body_json: &json::JsonValue, recipient_stream: &str) -> BusResult<()> {
        let max_queue = self.max_queue;
        let json_str = body_json.dump();

        log::trace!("send() writing to {recipient_stream}: {json_str}");

        let conn = self.connection_mut()?;

        let result: redis::RedisResult<String> = redis::cmd("XADD")
            .arg(recipient_stream)
            .arg("NOMKSTREAM")
            .arg("MAXLEN")
            .arg("~")
            .arg(max_queue)
            .arg("*")
            .arg("message")
            .arg(json_str)
            .query(conn);

        match result {
            Ok(_) => Ok(()),
            Err(e) => Err(BusError::BrokerReplyError(format!(
                "XADD to {recipient_stream} failed: {e}"
            ))),
        }
    }

    /// Reads at most one entry from `stream` (defaults to this
    /// connection's own address) via its consumer group.
    ///
    /// `timeout == 0` is non-blocking; `timeout < 0` blocks
    /// indefinitely; `timeout > 0` blocks up to that many seconds.
    /// On delivery the entry is acknowledged before the message is
    /// returned to the caller.
    pub fn recv_once(
        &mut self,
        timeout: i32,
        stream: Option<&str>,
    ) -> BusResult<Option<TransportMessage>> {
        if self.state != BusState::Connected {
            return Err(BusError::NotReady(
                "recv_once() requires a connected connection".to_string(),
            ));
        }

        let own_address = self.address().unwrap().as_str().to_string();
        let stream = stream.unwrap_or(&own_address).to_string();

        // Group is the stream's own name -- not necessarily this
        // connection's address, when reading a shared stream this
        // connection doesn't own (a service's well-known inbox).
        // Consumer is always this connection's own address, so two
        // workers sharing a group each get distinct entries.
        let mut options = StreamReadOptions::default().group(&stream, &own_address).count(1);

        if timeout != 0 {
            let block_ms = if timeout < 0 { 0 } else { (timeout as usize) * 1000 };
            options = options.block(block_ms);
        }

        let conn = self.connection_mut()?;

        // The broker's reply is a nested structure that is empty or
        // oddly-shaped on every kind of "nothing happened" -- timeout,
        // signal interruption, a group race. None of those are errors;
        // they all collapse to "no message."
        let reply: redis::RedisResult<StreamReadReply> =
            conn.xread_options(&[&stream], &[">"], &options);

        let reply = match reply {
            Ok(r) => r,
            Err(_) => return Ok(None),
        };

        let entry = reply
            .keys
            .into_iter()
            .next()
            .and_then(|k| k.ids.into_iter().next());

        let (id, body_str) = match entry {
            Some(id) => match id.map.get("message") {
                Some(redis::Value::Data(bytes)) => {
                    (id.id, String::from_utf8_lossy(bytes).into_owned())
                }
                _ => return Ok(None),
            },
            None => return Ok(None),
        };

        // Acknowledgement is mandatory and immediate; a failure to ack
        // is logged but not propagated, since dropping the message
        // outright is worse than the at-most-once duplicate it risks.
        let ack: redis::RedisResult<i32> = self.connection_mut()?.xack(&stream, &stream, &[&id]);
        if let Err(e) = ack {
            log::error!("failed to ack message {id} on {stream}: {e}");
        }

        let json_val = match json::parse(&body_str) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("discarding malformed envelope on {stream}: {e:?}");
                return Ok(None);
            }
        };

        match TransportMessage::decode(&json_val) {
            Ok(tm) => Ok(Some(tm)),
            Err(e) => {
                log::warn!("discarding malformed envelope on {stream}: {e}");
                Ok(None)
            }
        }
    }

    /// Retry-loop wrapper around [`Bus::recv_once`] honoring an
    /// absolute deadline: keeps retrying on spurious empty returns
    /// until either a message arrives or the per-call seconds budget
    /// is exhausted. A negative timeout loops until a message arrives.
    pub fn recv(
        &mut self,
        timeout: i32,
        stream: Option<&str>,
    ) -> BusResult<Option<TransportMessage>> {
        if timeout == 0 {
            return self.recv_once(timeout, stream);
        }

        if timeout < 0 {
            loop {
                if let Some(tm) = self.recv_once(timeout, stream)? {
                    return Ok(Some(tm));
                }
            }
        }

        let mut remaining = timeout;

        while remaining > 0 {
            let started = time::SystemTime::now();

            if let Some(tm) = self.recv_once(remaining, stream)? {
                return Ok(Some(tm));
            }

            let elapsed = started.elapsed().unwrap_or_default().as_secs() as i32;
            remaining -= elapsed.max(1);
        }

        Ok(None)
    }

    /// Stamps `msg.sender` to this connection's own address, serializes
    /// it, and appends it to its recipient's stream.
    pub fn send_message(&mut self, msg: &mut TransportMessage) -> BusResult<()> {
        let recipient = msg.recipient().to_string();
        let sender = self.address().unwrap().as_str().to_string();
        msg.set_sender(&sender)?;
        self.send(&msg.encode(), &recipient)
    }

    /// Deletes this connection's own inbound stream (and the consumer
    /// group declared over it) and closes the handle. This is the sole
    /// durable-resource-release path; abandoning a connection without
    /// disconnecting leaks a broker-side stream.
    pub fn disconnect(&mut self) -> BusResult<()> {
        if self.state == BusState::Closed {
            return Ok(());
        }

        if let Some(addr) = self.address.clone() {
            if let Some(conn) = self.connection.as_mut() {
                let res: redis::RedisResult<i32> = conn.del(addr.as_str());
                if let Err(e) = res {
                    log::error!("error deleting stream {}: {e}", addr.as_str());
                }
            }
        }

        self.connection = None;
        self.state = BusState::Closed;

        Ok(())
    }
}

impl fmt::Display for Bus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.address {
            Some(a) => write!(f, "Bus {}", a.as_str()),
            None => write!(f, "Bus (unaddressed, domain={})", self.domain),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operations_outside_state_machine_fail() {
        let mut bus = Bus::new("private.localhost");
        assert!(bus.connect(6379, "u", "p").is_err());

        bus.set_address("host1", None).unwrap();
        assert!(bus.set_address("host1", None).is_err());
    }

    #[test]
    fn unconnected_send_is_not_ready() {
        let mut bus = Bus::new("private.localhost");
        bus.set_address("host1", None).unwrap();
        assert!(bus.send(&json::JsonValue::Null, "some-stream").is_err());
    }

    #[test]
    fn unconnected_ensure_group_is_not_ready() {
        let mut bus = Bus::new("private.localhost");
        bus.set_address("host1", None).unwrap();
        assert!(bus.ensure_group("opensrf:service:math").is_err());
    }
}
