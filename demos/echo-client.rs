//! Minimal two-connection echo demonstrating the bus connection
//! contract directly: `alice` addresses `bob` and sends one message;
//! `bob` reads it back off its own inbound stream.
//!
//! Requires a reachable broker; connection parameters come from the
//! environment so this can be pointed at any test instance:
//!
//! ```text
//! OSRF_DOMAIN=localhost OSRF_PORT=6379 cargo run --example echo-client
//! ```
use opensrf::bus::Bus;
use opensrf::message::TransportMessage;
use std::env;

fn main() {
    let domain = env::var("OSRF_DOMAIN").unwrap_or_else(|_| "localhost".to_string());
    let port: u16 = env::var("OSRF_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(6379);
    let username = env::var("OSRF_BUS_USERNAME").unwrap_or_else(|_| "opensrf".to_string());
    let password = env::var("OSRF_BUS_PASSWORD").unwrap_or_else(|_| "opensrf".to_string());

    let mut alice = Bus::new(&domain);
    alice.set_address("demo-host", None).expect("set_address");
    alice
        .connect(port, &username, &password)
        .expect("alice connect");

    let mut bob = Bus::new(&domain);
    bob.set_address("demo-host", None).expect("set_address");
    bob.connect(port, &username, &password)
        .expect("bob connect");

    let recipient = bob.address().unwrap().as_str().to_string();

    let mut msg = TransportMessage::new(&recipient, "demo-thread", json::from("ping"));
    alice.send_message(&mut msg).expect("send");

    match bob.recv(5, None).expect("recv") {
        Some(reply) => println!(
            "bob received '{}' from {}",
            reply.body(),
            reply.sender().unwrap_or("<unknown>")
        ),
        None => println!("no message arrived within the timeout"),
    }

    alice.disconnect().ok();
    bob.disconnect().ok();
}
