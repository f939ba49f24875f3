//! Tags and the record types returned by diagnostic operations.

use chrono::NaiveDateTime;

use crate::address::S7Address;
use crate::errors::Error;
use crate::values::{DataType, S7Value};

/// The unit of user-visible I/O.
///
/// A tag names one addressed value. On reads the session fills `value`, on
/// writes it consumes it; either way `error` is empty on success and carries
/// the per-item failure otherwise, without aborting the rest of the batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    /// Caller-chosen identifier, opaque to the protocol
    pub name: String,
    /// Parsed memory address
    pub address: S7Address,
    /// Data type read or written at the address
    pub datatype: DataType,
    /// Value to write, or the value read back
    pub value: Option<S7Value>,
    /// Empty on success, descriptive otherwise
    pub error: String,
}

impl Tag {
    /// Tag for a read operation. The address may be any form accepted by
    /// [`S7Address`](crate::S7Address) parsing.
    pub fn read(name: impl Into<String>, address: &str, datatype: DataType) -> Result<Self, Error> {
        Ok(Self {
            name: name.into(),
            address: address.parse()?,
            datatype,
            value: None,
            error: String::new(),
        })
    }

    /// Tag for a write operation; the data type is taken from the value.
    pub fn write(name: impl Into<String>, address: &str, value: S7Value) -> Result<Self, Error> {
        Ok(Self {
            name: name.into(),
            address: address.parse()?,
            datatype: value.datatype(),
            value: Some(value),
            error: String::new(),
        })
    }

    /// Wire size of this tag in bytes. Strings take their size from the
    /// value when present, and the full read envelope otherwise.
    pub fn size(&self) -> usize {
        match (&self.datatype, &self.value) {
            (DataType::String, Some(S7Value::String(s))) => 2 + s.len(),
            _ => self.datatype.size_bytes(),
        }
    }

    /// Whether the operation succeeded for this tag.
    pub fn is_ok(&self) -> bool {
        self.error.is_empty()
    }

    pub(crate) fn with_error(mut self, error: impl ToString) -> Self {
        self.error = error.to_string();
        self
    }

    pub(crate) fn with_value(mut self, value: S7Value) -> Self {
        self.value = Some(value);
        self.error.clear();
        self
    }
}

/// Operating mode of the CPU, from SZL 0x0424.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CpuStatus {
    /// Mode the CPU is requested to be in
    pub requested_mode: String,
    /// Mode the CPU was in before
    pub previous_mode: String,
    /// Empty on success
    pub error: String,
}

/// Module identification from SZL 0x0011.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogCode {
    /// Order number of the module (MLFB)
    pub module_order_number: String,
    /// Module version
    pub module_version: String,
    /// Order number of the basic hardware
    pub basic_hardware_id: String,
    /// Hardware version
    pub hardware_version: String,
    /// Order number of the basic firmware
    pub basic_firmware_id: String,
    /// Firmware version
    pub firmware_version: String,
    /// Order number of the firmware extension
    pub firmware_extension_id: String,
    /// Firmware extension version
    pub firmware_ext_version: String,
    /// Empty on success
    pub error: String,
}

/// Component identification from SZL 0x001C.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CpuInfo {
    /// Name of the automation system
    pub system_name: String,
    /// Name of the module
    pub module_name: String,
    /// Plant designation of the module
    pub plant_id: String,
    /// Copyright entry
    pub copyright: String,
    /// Serial number of the module
    pub serial_number: String,
    /// Module type name
    pub cpu_type: String,
    /// Serial number of the memory card
    pub mem_serial_number: String,
    /// Manufacturer id
    pub manufacturer_id: String,
    /// PROFIBUS/PROFINET profile id
    pub profile_id: String,
    /// Profile specification
    pub profile_spec: String,
    /// OEM copyright entry
    pub oem_copyright: String,
    /// OEM id
    pub oem_id: String,
    /// Additional OEM id
    pub oem_add_id: String,
    /// Location designation
    pub location_id: String,
    /// Empty on success
    pub error: String,
}

/// Communication processor capabilities, one record per SZL 0x0131 entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommProc {
    /// Largest supported PDU size in bytes
    pub max_pdu: u16,
    /// Maximum number of connections
    pub max_connections: u16,
    /// MPI transmission rate in bit/s
    pub mpi_rate: u32,
    /// Communication bus rate in bit/s
    pub mkbus_rate: u32,
    /// Empty on success
    pub error: String,
}

/// Protection state, one record per SZL 0x0232 index 0x0004 entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Protection {
    /// Configured protection level 1..=3
    pub protection_level: u16,
    /// Password protection level
    pub password_level: u16,
    /// Protection level currently valid
    pub valid_protection_level: u16,
    /// Mode selector position
    pub mode_selector: String,
    /// Startup switch position
    pub startup_switch: String,
    /// Empty on success
    pub error: String,
}

/// One diagnostic buffer entry from SZL 0x00A0.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CpuDiagnostic {
    /// Event id, formatted as 0x....
    pub event_id: String,
    /// Human readable event description
    pub description: String,
    /// Priority class of the event
    pub priority: u8,
    /// Organisation block number
    pub ob_number: u8,
    /// Data id, formatted as 0x....
    pub dat_id: String,
    /// Additional info word 1
    pub info1: String,
    /// Additional info double word 2
    pub info2: String,
    /// Time the event was entered
    pub timestamp: Option<NaiveDateTime>,
    /// Empty on success
    pub error: String,
}

/// State of one CPU LED from SZL 0x0074.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CpuLed {
    /// Rack number the LED belongs to
    pub rack: u8,
    /// 0 for CPU, 1 for redundant partner
    pub led_type: u8,
    /// LED designation
    pub id: String,
    /// Whether the LED is lit
    pub on: bool,
    /// Whether the LED is flashing
    pub flashing: bool,
    /// Empty on success
    pub error: String,
}

/// Block header information returned by the block info userdata service.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockInfo {
    /// Block flags, formatted as 0x..
    pub flags: String,
    /// Programming language the block was written in
    pub language: String,
    /// Block kind (OB, DB, FC, ...)
    pub block_type: String,
    /// Block number
    pub number: u16,
    /// Length in load memory in bytes
    pub load_memory: u32,
    /// Block security flags
    pub security: u32,
    /// Timestamp of the code
    pub code_timestamp: Option<NaiveDateTime>,
    /// Timestamp of the interface
    pub interface_timestamp: Option<NaiveDateTime>,
    /// Length of the SSB segment
    pub ssb_length: u16,
    /// Length of the ADD segment
    pub add_length: u16,
    /// Local data size in bytes
    pub local_data_length: u16,
    /// MC7 code size in bytes
    pub mc7_length: u16,
    /// Author entry
    pub author: String,
    /// Block family entry
    pub family: String,
    /// Block name entry
    pub name: String,
    /// Version as major.minor
    pub version: String,
    /// Block checksum, formatted as 0x....
    pub checksum: String,
    /// Empty on success
    pub error: String,
}
