#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Client protocol, PyON decoding and records for the FAH exporter.

pub mod field;
pub mod model;
pub mod protocol;
pub mod pyon;

pub use field::{parse_decimal, parse_percent, FieldParseError};
pub use model::{ClientOptions, Donor, DonorTeam, Slot, SlotOptions, Snapshot, Task};
pub use protocol::{Connection, ProtocolError};
