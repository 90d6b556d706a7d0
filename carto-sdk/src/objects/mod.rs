//! JSON objects exchanged with the Cartographer server.

pub mod coordinate;
pub mod info;

pub use coordinate::CoordinateEvent;
pub use info::ServerInfo;
