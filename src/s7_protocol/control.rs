use bytes::{BufMut, BytesMut};
use std::convert::TryFrom;

use super::header::S7ProtocolHeader;
use super::types::{PLC_START_OPERATION, PLC_STOP_OPERATION};
use crate::errors::Error;

/// Routine name carried by every PLC lifecycle request.
const P_PROGRAM: &[u8] = b"P_PROGRAM";

/// Start argument selecting a cold restart.
const COLD_START_ARGUMENT: &[u8] = b"C ";

fn put_program_name(bytes: &mut BytesMut) {
    bytes.put_u8(P_PROGRAM.len() as u8);
    bytes.extend_from_slice(P_PROGRAM);
}

/// PlcStop job: function code, five reserved bytes and the routine name.
pub(crate) fn build_stop(pdu_reference: &mut u16) -> Result<BytesMut, Error> {
    let mut params = BytesMut::with_capacity(16);
    params.put_u8(PLC_STOP_OPERATION);
    params.extend_from_slice(&[0; 5]);
    put_program_name(&mut params);

    let mut bytes = BytesMut::new();
    let header = S7ProtocolHeader::build_request(pdu_reference, params.len(), 0)?;
    bytes.put(BytesMut::from(header));
    bytes.put(params);
    Ok(bytes)
}

/// PlcStart job. A cold restart carries the `"C "` argument block, a hot
/// restart an empty one.
pub(crate) fn build_start(pdu_reference: &mut u16, cold: bool) -> Result<BytesMut, Error> {
    let mut params = BytesMut::with_capacity(22);
    params.put_u8(PLC_START_OPERATION);
    params.extend_from_slice(&[0; 6]);
    params.put_u8(0xFD);
    if cold {
        params.put_u16(COLD_START_ARGUMENT.len() as u16);
        params.extend_from_slice(COLD_START_ARGUMENT);
    } else {
        params.put_u16(0);
    }
    put_program_name(&mut params);

    let mut bytes = BytesMut::new();
    let header = S7ProtocolHeader::build_request(pdu_reference, params.len(), 0)?;
    bytes.put(BytesMut::from(header));
    bytes.put(params);
    Ok(bytes)
}

/// Check the acknowledgement of a lifecycle job. Success is an Ack with
/// error class and code both zero.
pub(crate) fn parse_control_ack(mut response: BytesMut, pdu_reference: u16) -> Result<(), Error> {
    let header = S7ProtocolHeader::try_from(&mut response)?;
    header.is_ack()?.is_current_pdu_response(pdu_reference)?;
    match header.to_error() {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_parameters() {
        let mut reference = 0;
        let bytes = build_stop(&mut reference).unwrap();
        // header (10) + parameters (16)
        assert_eq!(bytes.len(), 26);
        assert_eq!(bytes[10], 0x29);
        assert_eq!(&bytes[16..17], [0x09]);
        assert_eq!(&bytes[17..26], P_PROGRAM);
    }

    #[test]
    fn cold_start_carries_argument() {
        let mut reference = 0;
        let bytes = build_start(&mut reference, true).unwrap();
        // header (10) + parameters (22)
        assert_eq!(bytes.len(), 32);
        assert_eq!(bytes[10], 0x28);
        assert_eq!(bytes[17], 0xFD);
        assert_eq!(&bytes[18..20], [0x00, 0x02]);
        assert_eq!(&bytes[20..22], b"C ");
        assert_eq!(bytes[22], 0x09);
    }

    #[test]
    fn hot_start_has_empty_argument() {
        let mut reference = 0;
        let bytes = build_start(&mut reference, false).unwrap();
        assert_eq!(bytes.len(), 30);
        assert_eq!(&bytes[18..20], [0x00, 0x00]);
        assert_eq!(bytes[20], 0x09);
    }
}
