use bytes::{Buf, BufMut, BytesMut};

use crate::{
    errors::{Error, ItemStatus},
    s7_protocol::types::DataItemTransportSize,
};

pub(crate) const RETURN_CODE_SUCCESS: u8 = 0xFF;

/// One data item in a ReadVar acknowledgement or WriteVar request.
///
/// Items inside a PDU are padded to even length; the final item is not.
#[derive(Debug)]
pub(crate) struct DataItem {
    pub(crate) return_code: u8, // 0xFF signals success; always 0 in write requests
    pub(crate) transport_size: u8,
    pub(crate) data: Vec<u8>,
}

impl DataItem {
    pub(crate) fn header_len() -> usize {
        4
    }

    /// Wire footprint of a write item inside a chunk (header + payload +
    /// pad to even length).
    pub(crate) fn padded_len(payload: usize) -> usize {
        Self::header_len() + payload + payload % 2
    }

    pub(crate) fn build_write(
        transport_size: DataItemTransportSize,
        data: Vec<u8>,
    ) -> Result<Self, Error> {
        u16::try_from(data.len())
            .map_err(|_| Error::Protocol(format!("data item of {} bytes too large", data.len())))?;
        Ok(Self {
            return_code: 0,
            transport_size: transport_size as u8,
            data,
        })
    }

    /// Parse the next data item off a response buffer. `last` controls
    /// whether a trailing pad byte is consumed.
    pub(crate) fn parse(bytes: &mut BytesMut, last: bool) -> Result<Result<Self, ItemStatus>, Error> {
        if bytes.len() < Self::header_len() {
            return Err(Error::Protocol("data item header truncated".to_string()));
        }
        let return_code = bytes.get_u8();
        let transport_size = bytes.get_u8();
        let length = bytes.get_u16();

        if return_code != RETURN_CODE_SUCCESS {
            // a failed item carries no payload
            return Ok(Err(ItemStatus::from(return_code)));
        }

        let byte_count =
            usize::from(DataItemTransportSize::from(transport_size).length_to_bytes(length));
        if bytes.len() < byte_count {
            return Err(Error::Protocol(format!(
                "data item payload truncated: {} of {byte_count} bytes",
                bytes.len()
            )));
        }
        let data = bytes.split_to(byte_count).to_vec();
        if !last && byte_count % 2 == 1 && !bytes.is_empty() {
            bytes.advance(1);
        }

        Ok(Ok(Self {
            return_code,
            transport_size,
            data,
        }))
    }

    /// Serialize a write item, padding to even length unless it is the last
    /// of its PDU.
    pub(crate) fn put(&self, bytes: &mut BytesMut, last: bool) {
        let transport = DataItemTransportSize::from(self.transport_size);
        bytes.put_u8(self.return_code);
        bytes.put_u8(self.transport_size);
        bytes.put_u16(transport.length_from_bytes(self.data.len() as u16));
        bytes.extend_from_slice(&self.data);
        if !last && self.data.len() % 2 == 1 {
            bytes.put_u8(0);
        }
    }
}
