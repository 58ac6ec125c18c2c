use super::error::{BusError, BusResult};

/// The framed unit of transfer between two bus peers.
///
/// `body` is an opaque JSON payload; this crate does not interpret it.
/// Application dispatch (method calls, results, connect/disconnect
/// handshakes) is a consumer of this envelope, not part of it.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportMessage {
    recipient: String,
    sender: Option<String>,
    thread: String,
    body: json::JsonValue,
    router_command: Option<String>,
    router_class: Option<String>,
    router_reply: Option<String>,
    osrf_xid: Option<String>,
}

impl TransportMessage {
    pub fn new(recipient: &str, thread: &str, body: json::JsonValue) -> Self {
        TransportMessage {
            recipient: recipient.to_string(),
            sender: None,
            thread: thread.to_string(),
            body,
            router_command: None,
            router_class: None,
            router_reply: None,
            osrf_xid: None,
        }
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    pub fn set_recipient(&mut self, recipient: &str) {
        self.recipient = recipient.to_string();
    }

    pub fn sender(&self) -> Option<&str> {
        self.sender.as_deref()
    }

    /// Stamps the sending address. The owning bus connection calls this
    /// immediately before serialization; callable at most once per
    /// envelope.
    pub fn set_sender(&mut self, sender: &str) -> BusResult<()> {
        if self.sender.is_some() {
            return Err(BusError::NotReady(
                "sender already stamped on this envelope".to_string(),
            ));
        }

        self.sender = Some(sender.to_string());
        Ok(())
    }

    pub fn thread(&self) -> &str {
        &self.thread
    }

    pub fn body(&self) -> &json::JsonValue {
        &self.body
    }

    pub fn osrf_xid(&self) -> Option<&str> {
        self.osrf_xid.as_deref()
    }

    pub fn set_osrf_xid(&mut self, xid: &str) {
        self.osrf_xid = Some(xid.to_string());
    }

    pub fn router_command(&self) -> Option<&str> {
        self.router_command.as_deref()
    }

    pub fn set_router_command(&mut self, command: &str) {
        self.router_command = Some(command.to_string());
    }

    pub fn router_class(&self) -> Option<&str> {
        self.router_class.as_deref()
    }

    pub fn set_router_class(&mut self, class: &str) {
        self.router_class = Some(class.to_string());
    }

    pub fn router_reply(&self) -> Option<&str> {
        self.router_reply.as_deref()
    }

    pub fn set_router_reply(&mut self, reply: &str) {
        self.router_reply = Some(reply.to_string());
    }

    /// Serializes this envelope to its wire form. Unset optional fields
    /// are emitted as JSON null.
    pub fn encode(&self) -> json::JsonValue {
        json::object! {
            to: self.recipient.clone(),
            from: self.sender.clone(),
            thread: self.thread.clone(),
            osrf_xid: self.osrf_xid.clone(),
            router_command: self.router_command.clone(),
            router_class: self.router_class.clone(),
            router_reply: self.router_reply.clone(),
            body: self.body.clone(),
        }
    }

    /// Parses a wire-form JSON object back into an envelope.
    ///
    /// Extra keys are tolerated. A message missing `to` or `thread` is
    /// rejected -- it cannot be routed or correlated.
    pub fn decode(json_obj: &json::JsonValue) -> BusResult<Self> {
        let to = json_obj["to"]
            .as_str()
            .ok_or_else(|| BusError::MalformedEnvelope("envelope missing 'to'".to_string()))?;

        let thread = json_obj["thread"]
            .as_str()
            .ok_or_else(|| BusError::MalformedEnvelope("envelope missing 'thread'".to_string()))?;

        let mut tm = TransportMessage::new(to, thread, json_obj["body"].clone());

        if let Some(from) = json_obj["from"].as_str() {
            tm.sender = Some(from.to_string());
        }

        if let Some(xid) = json_obj["osrf_xid"].as_str() {
            tm.set_osrf_xid(xid);
        }

        if let Some(rc) = json_obj["router_command"].as_str() {
            tm.set_router_command(rc);
        }

        if let Some(rc) = json_obj["router_class"].as_str() {
            tm.set_router_class(rc);
        }

        if let Some(rc) = json_obj["router_reply"].as_str() {
            tm.set_router_reply(rc);
        }

        Ok(tm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trip() {
        let mut tm = TransportMessage::new(
            "opensrf:client:d:h:8:def67890",
            "t1",
            json::from("ping"),
        );
        tm.set_sender("opensrf:client:d:h:7:abc12345").unwrap();
        tm.set_osrf_xid("xid-1");

        let decoded = TransportMessage::decode(&tm.encode()).unwrap();

        assert_eq!(decoded.recipient(), tm.recipient());
        assert_eq!(decoded.sender(), tm.sender());
        assert_eq!(decoded.thread(), tm.thread());
        assert_eq!(decoded.body(), tm.body());
        assert_eq!(decoded.osrf_xid(), tm.osrf_xid());
    }

    #[test]
    fn sender_stamped_at_most_once() {
        let mut tm = TransportMessage::new("opensrf:service:math", "t1", json::JsonValue::Null);
        assert!(tm.set_sender("opensrf:client:d:h:1:aaaaaaaa").is_ok());
        assert!(tm.set_sender("opensrf:client:d:h:2:bbbbbbbb").is_err());
    }

    #[test]
    fn decode_rejects_missing_recipient_or_thread() {
        let missing_to = json::object! { thread: "t1", body: json::JsonValue::Null };
        assert!(TransportMessage::decode(&missing_to).is_err());

        let missing_thread = json::object! { to: "opensrf:service:math", body: json::JsonValue::Null };
        assert!(TransportMessage::decode(&missing_thread).is_err());
    }

    #[test]
    fn decode_tolerates_extra_keys() {
        let raw = json::object! {
            to: "opensrf:service:math",
            thread: "t1",
            body: json::JsonValue::Null,
            something_unknown: "ignored",
        };
        assert!(TransportMessage::decode(&raw).is_ok());
    }
}
