use chrono::{Duration, NaiveDate, NaiveDateTime};
use tracing::debug;

use super::create::S7Client;
use crate::codec::{read_ascii, read_u16, read_u32, read_u8};
use crate::errors::Error;
use crate::s7_protocol::userdata::{
    build_block_info, build_szl_next_request, build_szl_request, parse_userdata_response,
};
use crate::tag::{
    BlockInfo, CatalogCode, CommProc, CpuDiagnostic, CpuInfo, CpuLed, CpuStatus, Protection,
};
use crate::values::decode_datetime;

// System state list ids used by the diagnostic operations
const SZL_CATALOG_CODE: u16 = 0x0011;
const SZL_CPU_ID: u16 = 0x001C;
const SZL_CPU_DIAGNOSTICS: u16 = 0x00A0;
const SZL_CPU_LEDS: u16 = 0x0074;
const SZL_COMM_PROC: u16 = 0x0131;
const SZL_PROTECTION: u16 = 0x0232;
const SZL_CPU_STATUS: u16 = 0x0424;

/// Block kinds addressable by [`S7Client::read_block_info`].
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    /// Organisation block
    Ob = 0x38,
    /// Data block
    Db = 0x41,
    /// System data block
    Sdb = 0x42,
    /// Function
    Fc = 0x43,
    /// System function
    Sfc = 0x44,
    /// Function block
    Fb = 0x45,
    /// System function block
    Sfb = 0x46,
}

/// *Methods for diagnostics and hardware identity*
impl S7Client {
    /// Read one system state list, reassembling fragmented answers.
    ///
    /// The returned bytes are the raw SZL record: id, index, section length
    /// and count, followed by `count` records of `section length` bytes.
    ///
    /// # Errors
    ///
    /// Will return `Error` if the session is not connected or the device
    /// rejected the query.
    pub async fn read_szl(&mut self, id: u16, index: u16) -> Result<Vec<u8>, Error> {
        let request = build_szl_request(self.pdu_reference(), id, index)?;
        let response = self.exchange(request).await?;
        let mut part = parse_userdata_response(response, *self.pdu_reference())?;

        let mut data = part.payload.to_vec();
        // follow-up fragments are requested by data unit reference until
        // the device flags the last one
        while !part.last_data_unit {
            let request =
                build_szl_next_request(self.pdu_reference(), part.data_unit_reference)?;
            let response = self.exchange(request).await?;
            part = parse_userdata_response(response, *self.pdu_reference())?;
            data.extend_from_slice(&part.payload);
        }
        debug!(id, index, len = data.len(), "SZL read");
        Ok(data)
    }

    /// Read the operating mode of the CPU.
    ///
    /// # Errors
    ///
    /// Will return `Error` if the session is not connected or the device
    /// rejected the query.
    pub async fn read_cpu_status(&mut self) -> Result<CpuStatus, Error> {
        let data = self.read_szl(SZL_CPU_STATUS, 0x0000).await?;
        let (section_length, count) = szl_table_shape(&data)?;
        let mut status = CpuStatus::default();
        if count > 0 && section_length >= 4 {
            let value = read_u8(&data, 8 + 3)?;
            status.requested_mode = cpu_status_text(value & 0x0F).to_string();
            status.previous_mode = cpu_status_text(value >> 4).to_string();
        } else {
            status.error = "empty CPU status record".to_string();
        }
        Ok(status)
    }

    /// Read order numbers and versions of the module.
    ///
    /// # Errors
    ///
    /// Will return `Error` if the session is not connected or the device
    /// rejected the query.
    pub async fn read_catalog_code(&mut self) -> Result<CatalogCode, Error> {
        let data = self.read_szl(SZL_CATALOG_CODE, 0x0000).await?;
        let (section_length, count) = szl_table_shape(&data)?;

        let mut catalog = CatalogCode::default();
        for record in 0..count {
            let offset = 8 + record * section_length;
            if offset + 28 > data.len() {
                break;
            }
            let index = read_u16(&data, offset)?;
            let mlfb = read_ascii(&data, offset + 2, 20, true)?;
            let ausbg = read_u16(&data, offset + 24)?;
            let ausbe = read_u16(&data, offset + 26)?;
            let version = format!("{ausbg}.{ausbe}");
            match index {
                0x0001 => {
                    catalog.module_order_number = mlfb;
                    catalog.module_version = version;
                }
                0x0006 => {
                    catalog.basic_hardware_id = mlfb;
                    catalog.hardware_version = version;
                }
                0x0007 => {
                    catalog.basic_firmware_id = mlfb;
                    catalog.firmware_version = version;
                }
                0x0081 => {
                    catalog.firmware_extension_id = mlfb;
                    catalog.firmware_ext_version = version;
                }
                _ => {}
            }
        }
        Ok(catalog)
    }

    /// Read the component identification strings.
    ///
    /// # Errors
    ///
    /// Will return `Error` if the session is not connected or the device
    /// rejected the query.
    pub async fn read_cpu_info(&mut self) -> Result<CpuInfo, Error> {
        let data = self.read_szl(SZL_CPU_ID, 0x0000).await?;
        let (section_length, count) = szl_table_shape(&data)?;

        let mut info = CpuInfo::default();
        for record in 0..count {
            let offset = 8 + record * section_length;
            if offset + 34 > data.len() {
                break;
            }
            let index = read_u16(&data, offset)?;
            let name = offset + 2;
            match index {
                0x0001 => info.system_name = read_ascii(&data, name, 32, true)?,
                0x0002 => info.module_name = read_ascii(&data, name, 32, true)?,
                0x0003 => info.plant_id = read_ascii(&data, name, 32, true)?,
                0x0004 => info.copyright = read_ascii(&data, name, 32, true)?,
                0x0005 => info.serial_number = read_ascii(&data, name, 32, true)?,
                0x0007 => info.cpu_type = read_ascii(&data, name, 32, true)?,
                0x0008 => info.mem_serial_number = read_ascii(&data, name, 32, true)?,
                0x0009 => {
                    info.manufacturer_id = format!("0x{:04x}", read_u16(&data, name)?);
                    info.profile_id = format!("0x{:04x}", read_u16(&data, name + 2)?);
                    info.profile_spec = format!("0x{:04x}", read_u16(&data, name + 4)?);
                }
                0x000A => {
                    info.oem_copyright = read_ascii(&data, name, 26, true)?;
                    info.oem_id = format!("0x{:04x}", read_u16(&data, name + 26)?);
                    info.oem_add_id = format!("0x{:08x}", read_u32(&data, name + 28)?);
                }
                0x000B => info.location_id = read_ascii(&data, name, 32, true)?,
                _ => {}
            }
        }
        Ok(info)
    }

    /// Read the capabilities of the communication processor(s).
    ///
    /// # Errors
    ///
    /// Will return `Error` if the session is not connected or the device
    /// rejected the query.
    pub async fn read_comm_proc(&mut self) -> Result<Vec<CommProc>, Error> {
        let data = self.read_szl(SZL_COMM_PROC, 0x0001).await?;
        let (section_length, count) = szl_table_shape(&data)?;

        let mut result = Vec::with_capacity(count);
        for record in 0..count {
            let offset = 8 + record * section_length;
            if offset + 14 > data.len() {
                break;
            }
            result.push(CommProc {
                max_pdu: read_u16(&data, offset + 2)?,
                max_connections: read_u16(&data, offset + 4)?,
                mpi_rate: read_u32(&data, offset + 6)?,
                mkbus_rate: read_u32(&data, offset + 10)?,
                error: String::new(),
            });
        }
        Ok(result)
    }

    /// Read the protection and mode-selector state.
    ///
    /// # Errors
    ///
    /// Will return `Error` if the session is not connected or the device
    /// rejected the query.
    pub async fn read_protection(&mut self) -> Result<Vec<Protection>, Error> {
        let data = self.read_szl(SZL_PROTECTION, 0x0004).await?;
        let (section_length, count) = szl_table_shape(&data)?;

        let mut result = Vec::with_capacity(count);
        for record in 0..count {
            let offset = 8 + record * section_length;
            if offset + 12 > data.len() {
                break;
            }
            result.push(Protection {
                protection_level: read_u16(&data, offset + 2)?,
                password_level: read_u16(&data, offset + 4)?,
                valid_protection_level: read_u16(&data, offset + 6)?,
                mode_selector: mode_selector_text(read_u16(&data, offset + 8)?).to_string(),
                startup_switch: startup_switch_text(read_u16(&data, offset + 10)?).to_string(),
                error: String::new(),
            });
        }
        Ok(result)
    }

    /// Read the diagnostic buffer.
    ///
    /// # Errors
    ///
    /// Will return `Error` if the session is not connected or the device
    /// rejected the query.
    pub async fn read_cpu_diagnostics(&mut self) -> Result<Vec<CpuDiagnostic>, Error> {
        let data = self.read_szl(SZL_CPU_DIAGNOSTICS, 0x0000).await?;
        let (section_length, count) = szl_table_shape(&data)?;

        let mut result = Vec::with_capacity(count);
        for record in 0..count {
            let offset = 8 + record * section_length;
            if offset + 20 > data.len() {
                break;
            }
            let event_id = read_u16(&data, offset)?;
            result.push(CpuDiagnostic {
                event_id: format!("0x{event_id:04x}"),
                description: diagnostic_text(event_id).to_string(),
                priority: read_u8(&data, offset + 2)?,
                ob_number: read_u8(&data, offset + 3)?,
                dat_id: format!("0x{:04x}", read_u16(&data, offset + 4)?),
                info1: format!("0x{:04x}", read_u16(&data, offset + 6)?),
                info2: format!("0x{:08x}", read_u32(&data, offset + 8)?),
                timestamp: decode_datetime(&data[offset + 12..offset + 20]).ok(),
                error: String::new(),
            });
        }
        Ok(result)
    }

    /// Read the LED states.
    ///
    /// # Errors
    ///
    /// Will return `Error` if the session is not connected or the device
    /// rejected the query.
    pub async fn read_cpu_leds(&mut self) -> Result<Vec<CpuLed>, Error> {
        let data = self.read_szl(SZL_CPU_LEDS, 0x0000).await?;
        let (section_length, count) = szl_table_shape(&data)?;

        let mut result = Vec::with_capacity(count);
        for record in 0..count {
            let offset = 8 + record * section_length;
            if offset + 4 > data.len() {
                break;
            }
            let id = read_u16(&data, offset)?;
            result.push(CpuLed {
                rack: ((id >> 8) & 0x07) as u8,
                led_type: ((id >> 11) & 0x01) as u8,
                id: led_text((id & 0xFF) as u8).to_string(),
                on: read_u8(&data, offset + 2)? != 0,
                flashing: read_u8(&data, offset + 3)? != 0,
                error: String::new(),
            });
        }
        Ok(result)
    }

    /// Read the header information of one block.
    ///
    /// # Errors
    ///
    /// Will return `Error` if the session is not connected, the block does
    /// not exist or the device rejected the query.
    pub async fn read_block_info(
        &mut self,
        block_type: BlockType,
        block_number: u16,
    ) -> Result<BlockInfo, Error> {
        let request = build_block_info(self.pdu_reference(), block_type as u8, block_number)?;
        let response = self.exchange(request).await?;
        let response = parse_userdata_response(response, *self.pdu_reference())?;
        let data = response.payload;

        // 9 bytes of service prefix precede the 61-byte block header
        if data.len() < 70 {
            return Err(Error::Protocol(format!(
                "block info payload of {} bytes too short",
                data.len()
            )));
        }
        let info = &data[9..];
        let version = read_u8(info, 57)?;
        Ok(BlockInfo {
            flags: format!("0x{:02x}", read_u8(info, 0)?),
            language: block_language_text(read_u8(info, 1)?).to_string(),
            block_type: subblock_type_text(read_u8(info, 2)?).to_string(),
            number: read_u16(info, 3)?,
            load_memory: read_u32(info, 5)?,
            security: read_u32(info, 9)?,
            code_timestamp: block_timestamp(read_u32(info, 13)?, read_u16(info, 17)?),
            interface_timestamp: block_timestamp(read_u32(info, 19)?, read_u16(info, 23)?),
            ssb_length: read_u16(info, 25)?,
            add_length: read_u16(info, 27)?,
            local_data_length: read_u16(info, 29)?,
            mc7_length: read_u16(info, 31)?,
            author: read_ascii(info, 33, 8, true)?,
            family: read_ascii(info, 41, 8, true)?,
            name: read_ascii(info, 49, 8, true)?,
            version: format!("{}.{}", version >> 4, version & 0x0F),
            checksum: format!("0x{:04x}", read_u16(info, 59)?),
            error: String::new(),
        })
    }
}

/// Section length and record count of an SZL answer.
fn szl_table_shape(data: &[u8]) -> Result<(usize, usize), Error> {
    // the payload leads with the echoed SZL id and index
    let section_length = usize::from(read_u16(data, 4)?);
    let count = usize::from(read_u16(data, 6)?);
    Ok((section_length, count))
}

/// Timestamps in block headers count milliseconds and days from 1984-01-01.
fn block_timestamp(milliseconds: u32, days_since: u16) -> Option<NaiveDateTime> {
    let base = NaiveDate::from_ymd_opt(1984, 1, 1)?.and_hms_opt(0, 0, 0)?;
    Some(base + Duration::days(i64::from(days_since)) + Duration::milliseconds(i64::from(milliseconds)))
}

fn cpu_status_text(status: u8) -> &'static str {
    match status {
        0x00 => "Unknown",
        0x08 => "Run",
        _ => "Stop",
    }
}

fn mode_selector_text(value: u16) -> &'static str {
    match value {
        0x01 => "Run",
        0x02 => "Run Program",
        0x03 => "Stop",
        0x04 => "Memory Reset",
        _ => "Undefined",
    }
}

fn startup_switch_text(value: u16) -> &'static str {
    match value {
        0x01 => "Cold Restart",
        0x02 => "Warm Restart",
        _ => "Undefined",
    }
}

fn block_language_text(value: u8) -> &'static str {
    match value {
        0x01 => "AWL",
        0x02 => "KOP",
        0x03 => "FUP",
        0x04 => "SCL",
        0x05 => "DB",
        0x06 => "GRAPH",
        0x07 => "SDB",
        0x08 => "CPU-DB",
        0x11 => "SDB (after overall reset)",
        0x12 => "SDB (Routing)",
        0x29 => "Encrypt",
        _ => "Undefined",
    }
}

fn subblock_type_text(value: u8) -> &'static str {
    match value {
        0x08 => "OB",
        0x0A => "DB",
        0x0B => "SDB",
        0x0C => "FC",
        0x0D => "SFC",
        0x0E => "FB",
        0x0F => "SFB",
        _ => "Undefined",
    }
}

fn led_text(value: u8) -> &'static str {
    match value {
        0x01 => "SF (group error)",
        0x02 => "INTF (internal error)",
        0x03 => "EXTF (external error)",
        0x04 => "RUN",
        0x05 => "STOP",
        0x06 => "FRCE (force)",
        0x07 => "CRST (cold restart)",
        0x08 => "BAF (battery fault)",
        0x09 => "USR (user-defined)",
        0x0A => "USR1 (user-defined)",
        0x0B => "BUS1F (bus error interface 1)",
        0x0C => "BUS2F (bus error interface 2)",
        0x0D => "REDF (redundancy error)",
        0x0E => "MSTR (master)",
        0x0F => "RACK0 (rack number 0)",
        0x10 => "RACK1 (rack number 1)",
        0x11 => "RACK2 (rack number 2)",
        0x12 => "IFM1F (interface error interface module 1)",
        0x13 => "IFM2F (interface error interface module 2)",
        0x14 => "BUS3F (bus error interface 3)",
        0x15 => "MAINT (maintenance demand)",
        0x16 => "DC24V",
        0x80 => "IF (init failure)",
        0x81 => "UF (user failure)",
        0x82 => "MF (monitoring failure)",
        0x83 => "CF (communication failure)",
        0x84 => "TF (task failure)",
        0xEC => "APPL_STATE_RED",
        0xED => "APPL_STATE_GREEN",
        _ => "Undefined",
    }
}

/// Descriptions for the most common diagnostic event ids. The full Siemens
/// table runs to several hundred entries; unknown ids read "Undefined".
fn diagnostic_text(event_id: u16) -> &'static str {
    match event_id {
        0x113A => "Start request for cyclic interrupt OB with special handling",
        0x1155 => "Status alarm for PROFIBUS DP",
        0x1158 => "Status interrupt for PROFINET IO",
        0x1381 => "Request for manual warm restart",
        0x1382 => "Request for automatic warm restart",
        0x1383 => "Request for manual hot restart",
        0x1384 => "Request for automatic hot restart",
        0x1385 => "Request for manual cold restart",
        0x1386 => "Request for automatic cold restart",
        0x2521 => "BCD conversion error",
        0x2522 => "Area length error when reading",
        0x2523 => "Area length error when writing",
        0x2524 => "Area error when reading",
        0x2525 => "Area error when writing",
        0x2526 => "Timer number error",
        0x2527 => "Counter number error",
        0x2528 => "Alignment error when reading",
        0x2529 => "Alignment error when writing",
        0x2530 => "Write error when accessing the DB",
        0x2531 => "Write error when accessing the DI",
        0x2532 => "Block number error when opening a DB",
        0x2533 => "Block number error when opening a DI",
        0x2534 => "Block number error when calling an FC",
        0x2535 => "Block number error when calling an FB",
        0x253A => "DB not loaded",
        0x253C => "FC not loaded",
        0x253D => "SFC not loaded",
        0x253E => "FB not loaded",
        0x253F => "SFB not loaded",
        0x2942 => "I/O access error, reading",
        0x2943 => "I/O access error, writing",
        0x3501 => "Cycle time exceeded",
        0x3502 => "User interface (OB or FRB) request error",
        0x3503 => "Delay too long processing a priority class",
        0x3505 => "Time-of-day interrupt(s) skipped due to new clock setting",
        0x3507 => "Multiple OB request errors caused internal buffer overflow",
        0x3509 => "Interrupt loss due to excess interrupt load",
        0x3571 => "Nesting depth too high in nesting levels",
        0x3572 => "Nesting depth for Master Control Relays too high",
        0x3573 => "Nesting depth too high after synchronous errors",
        0x3574 => "Nesting depth for block calls (U stack) too high",
        0x3575 => "Nesting depth for block calls (B stack) too high",
        0x3576 => "Local data allocation error",
        0x3578 => "Unknown instruction",
        0x357A => "Jump instruction to target outside of the block",
        0x35A1 => "User interface (OB or FRB) not found",
        0x35A2 => "OB not loaded (started by SFC or operating system due to configuration)",
        0x4300 => "Backed-up power on",
        0x4301 => "Mode transition from STOP to STARTUP",
        0x4302 => "Mode transition from STARTUP to RUN",
        0x4303 => "STOP caused by stop switch being activated",
        0x4304 => "STOP caused by PG STOP operation or by SFB 20 STOP",
        0x4307 => "Memory reset started by PG operation",
        0x4308 => "Memory reset started by switch setting",
        0x430A => "HOLD exited, transition to STOP",
        0x430E => "Memory reset executed",
        0x4318 => "Start of CiR",
        0x4319 => "CiR completed",
        0x4357 => "Module watchdog started",
        0x4358 => "All modules are ready for operation",
        0x43B0 => "Firmware update was successful",
        0x4510 => "STOP violation of the CPU's data range",
        0x4520 => "DEFECTIVE: STOP not possible",
        0x4521 => "DEFECTIVE: failure of instruction processing processor",
        0x4522 => "DEFECTIVE: failure of clock chip",
        0x4541 => "STOP caused by priority class system",
        0x4542 => "STOP caused by object management system",
        0x4543 => "STOP caused by test functions",
        0x4544 => "STOP caused by diagnostic system",
        0x4545 => "STOP caused by communication system",
        0x4546 => "STOP caused by CPU memory management",
        0x4547 => "STOP caused by process image management",
        0x4548 => "STOP caused by I/O management",
        0x4550 => "DEFECTIVE: internal system error",
        0x4555 => "No restart possible, monitoring time elapsed",
        0x4562 => "STOP caused by programming error (OB not loaded or not possible)",
        0x4563 => "STOP caused by I/O access error (OB not loaded or not possible)",
        0x4567 => "STOP caused by H event",
        0x4568 => "STOP caused by time error (OB not loaded or not possible)",
        0x457F => "STOP caused by STOP command",
        0x4580 => "STOP: back-up buffer contents inconsistent (no transition to RUN)",
        0x4933 => "Checksum error",
        0x494D => "STOP caused by I/O error",
        0x494E => "STOP caused by power failure",
        0x494F => "STOP caused by configuration error",
        0x530D => "New startup information in the STOP mode",
        0x5311 => "Startup despite Not Ready message from module(s)",
        0x5380 => "Diagnostic buffer entries of interrupt and asynchronous errors disabled",
        0x53FF => "Reset to factory setting",
        0x6500 => "Connection ID exists twice on module",
        0x6501 => "Connection resources inadequate",
        0x6502 => "Error in the connection description",
        0x6521 => "No memory submodule and no internal memory available",
        0x6522 => "Illegal memory submodule: replace submodule and reset memory",
        0x6805 => "Resource problem on configured connections, eliminated",
        0x6905 => "Resource problem on configured connections",
        0x72A2 => "Failure of a DP master or a DP master system",
        0x7301 => "Loss of redundancy (1 of 2) due to failure of a CPU",
        0x7331 => "Standby-master switchover due to master failure",
        0x73E0 => "Loss of redundancy in communication",
        _ => "Undefined",
    }
}
