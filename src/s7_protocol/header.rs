use std::convert::TryFrom;

use bytes::{Buf, BufMut, BytesMut};

use crate::errors::Error;

pub(crate) const PROTOCOL_ID: u8 = 0x32;

/// Remote operating service control, the PDU kind discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rosctr {
    Job = 0x01,
    Ack = 0x02,
    AckData = 0x03,
    UserData = 0x07,
}

impl TryFrom<u8> for Rosctr {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Rosctr::Job),
            0x02 => Ok(Rosctr::Ack),
            0x03 => Ok(Rosctr::AckData),
            0x07 => Ok(Rosctr::UserData),
            other => Err(Error::Protocol(format!("unknown ROSCTR 0x{other:02X}"))),
        }
    }
}

/// S7 PDU header: 10 bytes for Job/UserData, 12 for the Ack variants which
/// append an error class and code.
#[derive(Debug)]
pub(crate) struct S7ProtocolHeader {
    pub(crate) rosctr: Rosctr,
    redundancy_identification: u16,
    pub(crate) pdu_reference: u16,
    pub(crate) parameter_length: u16,
    pub(crate) data_length: u16,
    pub(crate) error: Option<(u8, u8)>,
}

impl S7ProtocolHeader {
    /// Length of the acknowledgement header preceding response parameters.
    pub(crate) fn len_response() -> usize {
        12
    }

    /// Build a Job header, advancing the session's rotating PDU reference.
    pub(crate) fn build_request(
        pdu_reference: &mut u16,
        parameter_length: usize,
        data_length: usize,
    ) -> Result<Self, Error> {
        Self::build(Rosctr::Job, pdu_reference, parameter_length, data_length)
    }

    /// Build a UserData header, advancing the session's rotating PDU
    /// reference.
    pub(crate) fn build_userdata(
        pdu_reference: &mut u16,
        parameter_length: usize,
        data_length: usize,
    ) -> Result<Self, Error> {
        Self::build(Rosctr::UserData, pdu_reference, parameter_length, data_length)
    }

    fn build(
        rosctr: Rosctr,
        pdu_reference: &mut u16,
        parameter_length: usize,
        data_length: usize,
    ) -> Result<Self, Error> {
        *pdu_reference = pdu_reference.wrapping_add(1);
        Ok(Self {
            rosctr,
            redundancy_identification: 0,
            pdu_reference: *pdu_reference,
            parameter_length: u16::try_from(parameter_length).map_err(|_| {
                Error::Protocol(format!("parameter block of {parameter_length} bytes too large"))
            })?,
            data_length: u16::try_from(data_length).map_err(|_| {
                Error::Protocol(format!("data block of {data_length} bytes too large"))
            })?,
            error: None,
        })
    }

    /// Error-checks an acknowledgement carrying data.
    pub(crate) fn is_ack_with_data(&self) -> Result<&Self, Error> {
        if self.rosctr == Rosctr::AckData {
            Ok(self)
        } else {
            Err(Error::Protocol(format!(
                "expected AckData response, received {:?}",
                self.rosctr
            )))
        }
    }

    /// Error-checks a plain acknowledgement (AckData also qualifies).
    pub(crate) fn is_ack(&self) -> Result<&Self, Error> {
        if matches!(self.rosctr, Rosctr::Ack | Rosctr::AckData) {
            Ok(self)
        } else {
            Err(Error::Protocol(format!(
                "expected Ack response, received {:?}",
                self.rosctr
            )))
        }
    }

    /// Error-checks a userdata response.
    pub(crate) fn is_userdata(&self) -> Result<&Self, Error> {
        if self.rosctr == Rosctr::UserData {
            Ok(self)
        } else {
            Err(Error::Protocol(format!(
                "expected UserData response, received {:?}",
                self.rosctr
            )))
        }
    }

    /// A response must echo the reference of the request it answers;
    /// anything else means request/response correlation is lost.
    pub(crate) fn is_current_pdu_response(&self, pdu_reference: u16) -> Result<&Self, Error> {
        if self.pdu_reference == pdu_reference {
            Ok(self)
        } else {
            Err(Error::Desync {
                expected: pdu_reference,
                received: self.pdu_reference,
            })
        }
    }

    pub(crate) fn has_error(&self) -> bool {
        !matches!(self.error, None | Some((0, 0)))
    }

    /// Device error as an [`Error::S7`], if the header carries one.
    pub(crate) fn to_error(&self) -> Option<Error> {
        match self.error {
            Some((class, code)) if self.has_error() => Some(Error::S7 { class, code }),
            _ => None,
        }
    }
}

impl TryFrom<&mut BytesMut> for S7ProtocolHeader {
    type Error = Error;

    fn try_from(bytes: &mut BytesMut) -> Result<Self, Self::Error> {
        if bytes.len() < 10 {
            return Err(Error::Protocol("short S7 header".to_string()));
        }
        let protocol_id = bytes.get_u8();
        if protocol_id != PROTOCOL_ID {
            return Err(Error::Protocol(format!(
                "bad S7 protocol id 0x{protocol_id:02X}"
            )));
        }
        let rosctr = Rosctr::try_from(bytes.get_u8())?;
        let redundancy_identification = bytes.get_u16();
        let pdu_reference = bytes.get_u16();
        let parameter_length = bytes.get_u16();
        let data_length = bytes.get_u16();
        let error = if matches!(rosctr, Rosctr::Ack | Rosctr::AckData) {
            if bytes.len() < 2 {
                return Err(Error::Protocol("S7 Ack header truncated".to_string()));
            }
            Some((bytes.get_u8(), bytes.get_u8()))
        } else {
            None
        };

        Ok(Self {
            rosctr,
            redundancy_identification,
            pdu_reference,
            parameter_length,
            data_length,
            error,
        })
    }
}

impl From<S7ProtocolHeader> for BytesMut {
    fn from(header: S7ProtocolHeader) -> BytesMut {
        let mut bytes = BytesMut::with_capacity(12);
        bytes.put_u8(PROTOCOL_ID);
        bytes.put_u8(header.rosctr as u8);
        bytes.put_u16(header.redundancy_identification);
        bytes.put_u16(header.pdu_reference);
        bytes.put_u16(header.parameter_length);
        bytes.put_u16(header.data_length);
        if let Some((class, code)) = header.error {
            bytes.put_u8(class);
            bytes.put_u8(code);
        }

        bytes
    }
}
