pub use client::TransportClient;
pub use conf::Config;
pub use error::BusError;
pub use logging::Logger;
pub use message::TransportMessage;

pub mod addr;
pub mod bus;
pub mod client;
pub mod conf;
pub mod error;
pub mod init;
pub mod logging;
pub mod message;
pub mod system;
pub mod util;
