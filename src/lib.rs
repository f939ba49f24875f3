#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![deny(
    missing_debug_implementations,
    rust_2018_idioms,
    single_use_lifetimes,
    unreachable_pub
)]

/*!
This crate provides a client for the Siemens S7 communication protocol,
speaking ISO-on-TCP (RFC 1006) to PLC devices of the SIMATIC S7 family
(S7-200/300/400/1200/1500).

A session reads and writes controller memory through symbolic addresses
(`DB2.DBX4.0`, `M0.4`, `C0`, ...), drives the controller lifecycle
(stop, cold/hot start, clock sync) and queries the diagnostic system
state lists (CPU status, catalog codes, LEDs, protection, the diagnostic
buffer).

On newer controllers (S7-1200/1500) the
[PUT/GET communication](https://cache.industry.siemens.com/dl/files/115/82212115/att_108330/v2/82212115_s7_communication_s7-1500_en.pdf)
method must be activated and accessed data blocks must not be optimized.

# Examples

## Reading and writing tags

```no_run
# tokio_test::block_on(async {
use step7::{ConnectionConfig, DataType, S7Client, S7Value, Tag};

let mut client = S7Client::connect(ConnectionConfig::new("192.168.10.72")).await?;

let tags = client
    .read_area(vec![
        Tag::read("valve_open", "DB2.DBX0.0", DataType::Bit)?,
        Tag::read("flow", "DB2.DBX24.0", DataType::Real)?,
    ])
    .await?;

client
    .write_area(vec![Tag::write("setpoint", "DB2.DBX24.0", S7Value::Real(6.6))?])
    .await?;
# Ok::<(), step7::errors::Error>(())
# });
```

## Pooled connections

```no_run
# tokio_test::block_on(async {
use step7::{ConnectionConfig, DataType, S7Pool, Tag};

let pool = S7Pool::new(ConnectionConfig::new("192.168.10.72"), 3);
let tags = pool
    .read_area(vec![Tag::read("counter", "C0", DataType::Counter)?])
    .await?;
# Ok::<(), step7::errors::Error>(())
# });
```
*/

mod address;
mod client;
mod codec;
mod connection;
pub mod errors;
mod s7_protocol;
mod tag;
mod values;

pub use address::{Area, S7Address};
pub use client::create::{ConnectionConfig, S7Client};
pub use client::info::BlockType;
pub use client::pooled::S7Pool;
pub use connection::ConnectionType;
pub use tag::{
    BlockInfo, CatalogCode, CommProc, CpuDiagnostic, CpuInfo, CpuLed, CpuStatus, Protection, Tag,
};
pub use values::{DataType, IecCounter, IecTimer, S7Value};
