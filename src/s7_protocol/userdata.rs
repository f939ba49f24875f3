use bytes::{Buf, BufMut, BytesMut};
use chrono::{Datelike, NaiveDateTime, Timelike};
use std::convert::TryFrom;

use super::header::S7ProtocolHeader;
use crate::codec::byte_to_bcd;
use crate::errors::Error;

// Function groups, request variant (response sets the high nibble to 8)
pub(crate) const GROUP_BLOCK_REQUEST: u8 = 0x43;
pub(crate) const GROUP_CPU_REQUEST: u8 = 0x44;
pub(crate) const GROUP_TIME_REQUEST: u8 = 0x47;

// Subfunctions
pub(crate) const SUBFUNCTION_READ_SZL: u8 = 0x01;
pub(crate) const SUBFUNCTION_BLOCK_INFO: u8 = 0x03;
pub(crate) const SUBFUNCTION_READ_CLOCK: u8 = 0x01;
pub(crate) const SUBFUNCTION_SET_CLOCK: u8 = 0x02;

const PARAMETER_HEAD: [u8; 3] = [0x00, 0x01, 0x12];
const METHOD_REQUEST: u8 = 0x11;
const METHOD_RESPONSE: u8 = 0x12;

const TRANSPORT_NULL: u8 = 0x00;
const TRANSPORT_OCTET_STRING: u8 = 0x09;
const RETURN_CODE_SUCCESS: u8 = 0xFF;
const RETURN_CODE_NO_OBJECT: u8 = 0x0A;

/// The device signals the final SZL fragment with a zero flag.
const LAST_DATA_UNIT_YES: u8 = 0x00;

/// Build a userdata request PDU: header, 8-byte parameter block and the
/// function-specific data block.
fn build_userdata(
    pdu_reference: &mut u16,
    function_group: u8,
    subfunction: u8,
    data: BytesMut,
) -> Result<BytesMut, Error> {
    let header = S7ProtocolHeader::build_userdata(pdu_reference, 8, data.len())?;

    let mut bytes = BytesMut::with_capacity(18 + data.len());
    bytes.put(BytesMut::from(header));
    bytes.extend_from_slice(&PARAMETER_HEAD);
    bytes.put_u8(4); // parameter length
    bytes.put_u8(METHOD_REQUEST);
    bytes.put_u8(function_group);
    bytes.put_u8(subfunction);
    bytes.put_u8(0); // sequence number
    bytes.put(data);
    Ok(bytes)
}

/// First SZL request for the given id and index.
pub(crate) fn build_szl_request(
    pdu_reference: &mut u16,
    szl_id: u16,
    szl_index: u16,
) -> Result<BytesMut, Error> {
    let mut data = BytesMut::with_capacity(8);
    data.put_u8(RETURN_CODE_SUCCESS);
    data.put_u8(TRANSPORT_OCTET_STRING);
    data.put_u16(4);
    data.put_u16(szl_id);
    data.put_u16(szl_index);
    build_userdata(pdu_reference, GROUP_CPU_REQUEST, SUBFUNCTION_READ_SZL, data)
}

/// Follow-up request for the next fragment of a multi-PDU SZL answer.
pub(crate) fn build_szl_next_request(
    pdu_reference: &mut u16,
    data_unit_reference: u8,
) -> Result<BytesMut, Error> {
    let mut data = BytesMut::with_capacity(4);
    data.put_u8(RETURN_CODE_NO_OBJECT);
    data.put_u8(TRANSPORT_NULL);
    data.put_u16(0);

    let header = S7ProtocolHeader::build_userdata(pdu_reference, 12, data.len())?;
    let mut bytes = BytesMut::with_capacity(26);
    bytes.put(BytesMut::from(header));
    bytes.extend_from_slice(&PARAMETER_HEAD);
    bytes.put_u8(8); // parameter length
    bytes.put_u8(METHOD_RESPONSE);
    bytes.put_u8(GROUP_CPU_REQUEST);
    bytes.put_u8(SUBFUNCTION_READ_SZL);
    bytes.put_u8(1); // sequence number
    bytes.put_u8(data_unit_reference);
    bytes.put_u8(0); // last data unit
    bytes.put_u16(0); // error code
    bytes.put(data);
    Ok(bytes)
}

/// Request the device clock.
pub(crate) fn build_clock_read(pdu_reference: &mut u16) -> Result<BytesMut, Error> {
    let mut data = BytesMut::with_capacity(4);
    data.put_u8(RETURN_CODE_NO_OBJECT);
    data.put_u8(TRANSPORT_NULL);
    data.put_u16(0);
    build_userdata(pdu_reference, GROUP_TIME_REQUEST, SUBFUNCTION_READ_CLOCK, data)
}

/// Set the device clock. The 10-byte payload is a reserved byte, the BCD
/// century and the 8-byte DATE_AND_TIME image.
pub(crate) fn build_clock_set(
    pdu_reference: &mut u16,
    timestamp: NaiveDateTime,
) -> Result<BytesMut, Error> {
    let year = timestamp.year();
    if !(1990..=2089).contains(&year) {
        return Err(Error::Range(format!(
            "PLC clock year {year} is outside 1990..=2089"
        )));
    }
    let millis = timestamp.and_utc().timestamp_subsec_millis();
    let weekday = timestamp.weekday().num_days_from_sunday() as u8 + 1;

    let mut data = BytesMut::with_capacity(14);
    data.put_u8(RETURN_CODE_SUCCESS);
    data.put_u8(TRANSPORT_OCTET_STRING);
    data.put_u16(10);
    data.put_u8(0); // reserved
    data.put_u8(if year >= 2000 { 0x20 } else { 0x19 });
    data.put_u8(byte_to_bcd((year % 100) as u8));
    data.put_u8(byte_to_bcd(timestamp.month() as u8));
    data.put_u8(byte_to_bcd(timestamp.day() as u8));
    data.put_u8(byte_to_bcd(timestamp.hour() as u8));
    data.put_u8(byte_to_bcd(timestamp.minute() as u8));
    data.put_u8(byte_to_bcd(timestamp.second() as u8));
    data.put_u8(byte_to_bcd((millis / 10) as u8));
    data.put_u8(byte_to_bcd(((millis % 10) * 10) as u8 + weekday));
    build_userdata(pdu_reference, GROUP_TIME_REQUEST, SUBFUNCTION_SET_CLOCK, data)
}

/// Request the block header of one block. The block number travels as five
/// ASCII digits.
pub(crate) fn build_block_info(
    pdu_reference: &mut u16,
    block_type: u8,
    block_number: u16,
) -> Result<BytesMut, Error> {
    let mut data = BytesMut::with_capacity(12);
    data.put_u8(RETURN_CODE_SUCCESS);
    data.put_u8(TRANSPORT_OCTET_STRING);
    data.put_u16(8);
    data.put_u8(0x30); // block type, high digit
    data.put_u8(block_type);
    for digit in [10_000, 1_000, 100, 10, 1] {
        data.put_u8(0x30 + ((block_number / digit) % 10) as u8);
    }
    data.put_u8(b'A'); // filesystem
    build_userdata(pdu_reference, GROUP_BLOCK_REQUEST, SUBFUNCTION_BLOCK_INFO, data)
}

/// Decoded userdata acknowledgement.
#[derive(Debug)]
pub(crate) struct UserDataResponse {
    pub(crate) data_unit_reference: u8,
    pub(crate) last_data_unit: bool,
    pub(crate) payload: BytesMut,
}

/// Validate a userdata response and strip its parameter and data headers.
pub(crate) fn parse_userdata_response(
    mut response: BytesMut,
    pdu_reference: u16,
) -> Result<UserDataResponse, Error> {
    let header = S7ProtocolHeader::try_from(&mut response)?;
    header
        .is_userdata()?
        .is_current_pdu_response(pdu_reference)?;

    if response.len() < 12 {
        return Err(Error::Protocol("userdata parameter block truncated".to_string()));
    }
    let head = [response.get_u8(), response.get_u8(), response.get_u8()];
    if head != PARAMETER_HEAD {
        return Err(Error::Protocol(format!(
            "bad userdata parameter head {head:02X?}"
        )));
    }
    let parameter_length = response.get_u8();
    let _method = response.get_u8();
    let _function = response.get_u8();
    let _subfunction = response.get_u8();
    let _sequence = response.get_u8();
    let (data_unit_reference, last_data_unit) = if parameter_length == 8 {
        let data_unit_reference = response.get_u8();
        let last_data_unit = response.get_u8() == LAST_DATA_UNIT_YES;
        let error_code = response.get_u16();
        if error_code != 0 {
            return Err(Error::S7 {
                class: (error_code >> 8) as u8,
                code: error_code as u8,
            });
        }
        (data_unit_reference, last_data_unit)
    } else {
        (0, true)
    };

    if response.len() < 4 {
        return Err(Error::Protocol("userdata data block truncated".to_string()));
    }
    let return_code = response.get_u8();
    let _transport_size = response.get_u8();
    let length = usize::from(response.get_u16());
    if return_code != RETURN_CODE_SUCCESS {
        return Err(Error::Item(crate::errors::ItemStatus::from(return_code)));
    }
    if response.len() < length {
        return Err(Error::Protocol(format!(
            "userdata payload truncated: {} of {length} bytes",
            response.len()
        )));
    }
    let payload = response.split_to(length);

    Ok(UserDataResponse {
        data_unit_reference,
        last_data_unit,
        payload,
    })
}
