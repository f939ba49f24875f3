use std::convert::TryFrom;

use bytes::{Buf, BufMut, BytesMut};

use crate::errors::Error;

use super::header::S7ProtocolHeader;

pub(crate) const NEGOTIATE_FUNCTION_CODE: u8 = 0xF0;

/// PDU size proposed to the device.
const REQUESTED_PDU_LENGTH: u16 = 0x03C0;
/// Smallest PDU size any S7 device is expected to support.
const MIN_PDU_LENGTH: u16 = 240;

#[derive(Debug)]
pub(crate) struct S7Negotiation {
    s7_header: S7ProtocolHeader,
    params: NegotiatePDUParameters,
}

impl S7Negotiation {
    pub(crate) fn build(pdu_reference: &mut u16) -> Result<S7Negotiation, Error> {
        Ok(Self {
            s7_header: S7ProtocolHeader::build_request(
                pdu_reference,
                NegotiatePDUParameters::len(),
                0,
            )?,
            params: NegotiatePDUParameters::build(),
        })
    }
}

impl From<S7Negotiation> for BytesMut {
    fn from(data: S7Negotiation) -> BytesMut {
        let mut bytes = BytesMut::with_capacity(20);
        bytes.put(BytesMut::from(data.s7_header));
        bytes.put(BytesMut::from(data.params));

        bytes
    }
}

#[derive(Debug)]
pub(crate) struct NegotiatePDUParameters {
    function_code: u8,
    reserved: u8,
    pub(crate) max_amq_caller: u16,
    pub(crate) max_amq_callee: u16,
    pub(crate) pdu_length: u16,
}

impl NegotiatePDUParameters {
    pub(crate) fn len() -> usize {
        8
    }

    pub(crate) fn build() -> Self {
        Self {
            function_code: NEGOTIATE_FUNCTION_CODE,
            reserved: 0,
            max_amq_caller: 0x0001,
            max_amq_callee: 0x0001,
            pdu_length: REQUESTED_PDU_LENGTH,
        }
    }

    /// Validate the size echoed by the device.
    pub(crate) fn negotiated_pdu_length(&self) -> Result<u16, Error> {
        if self.function_code != NEGOTIATE_FUNCTION_CODE {
            return Err(Error::Negotiation(format!(
                "unexpected function code 0x{:02X} in setup response",
                self.function_code
            )));
        }
        if self.pdu_length < MIN_PDU_LENGTH {
            return Err(Error::Negotiation(format!(
                "device offered PDU length {}, below the minimum of {MIN_PDU_LENGTH}",
                self.pdu_length
            )));
        }
        Ok(self.pdu_length)
    }
}

impl From<NegotiatePDUParameters> for BytesMut {
    fn from(params: NegotiatePDUParameters) -> BytesMut {
        let mut bytes = BytesMut::with_capacity(8);
        bytes.put_u8(params.function_code);
        bytes.put_u8(params.reserved);
        bytes.put_u16(params.max_amq_caller);
        bytes.put_u16(params.max_amq_callee);
        bytes.put_u16(params.pdu_length);

        bytes
    }
}

impl TryFrom<&mut BytesMut> for NegotiatePDUParameters {
    type Error = Error;

    fn try_from(bytes: &mut BytesMut) -> Result<Self, Self::Error> {
        if bytes.len() < Self::len() {
            return Err(Error::Negotiation(
                "received short packet while negotiating PDU size".to_string(),
            ));
        }
        Ok(Self {
            function_code: bytes.get_u8(),
            reserved: bytes.get_u8(),
            max_amq_caller: bytes.get_u16(),
            max_amq_callee: bytes.get_u16(),
            pdu_length: bytes.get_u16(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proposal_asks_for_960_bytes() {
        let mut reference = 0;
        let bytes = BytesMut::from(S7Negotiation::build(&mut reference).unwrap());
        // header (10) + parameters (8)
        assert_eq!(bytes.len(), 18);
        assert_eq!(&bytes[10..], [0xF0, 0x00, 0x00, 0x01, 0x00, 0x01, 0x03, 0xC0]);
    }

    #[test]
    fn undersized_offer_is_rejected() {
        let mut bytes = BytesMut::from(&[0xF0, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x80][..]);
        let params = NegotiatePDUParameters::try_from(&mut bytes).unwrap();
        assert!(matches!(
            params.negotiated_pdu_length(),
            Err(Error::Negotiation(_))
        ));
    }

    #[test]
    fn accepted_offer_is_returned() {
        let mut bytes = BytesMut::from(&[0xF0, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0xF0][..]);
        let params = NegotiatePDUParameters::try_from(&mut bytes).unwrap();
        assert_eq!(params.negotiated_pdu_length().unwrap(), 240);
    }
}
