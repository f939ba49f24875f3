use bytes::{Buf, BufMut, BytesMut};

use crate::errors::Error;

use super::request_item::RequestItem;

/// Parameter block of a ReadVar/WriteVar Job: function code, item count and
/// the request item descriptors. Acknowledgements echo only the first two
/// bytes.
#[derive(Debug)]
pub(crate) struct ReadWriteParams {
    pub(crate) function_code: u8, // 0x04 read, 0x05 write
    pub(crate) item_count: u8,
    pub(crate) request_items: Option<Vec<RequestItem>>,
}

impl ReadWriteParams {
    pub(crate) fn len() -> usize {
        2
    }

    pub(crate) fn build(function_code: u8, items: Vec<RequestItem>) -> Self {
        Self {
            function_code,
            item_count: items.len() as u8,
            request_items: Some(items),
        }
    }
}

impl TryFrom<&mut BytesMut> for ReadWriteParams {
    type Error = Error;

    fn try_from(bytes: &mut BytesMut) -> Result<Self, Self::Error> {
        if bytes.len() < Self::len() {
            return Err(Error::Protocol("short read/write parameter block".to_string()));
        }
        Ok(Self {
            function_code: bytes.get_u8(),
            item_count: bytes.get_u8(),
            request_items: None,
        })
    }
}

impl From<ReadWriteParams> for BytesMut {
    fn from(params: ReadWriteParams) -> BytesMut {
        let mut bytes = BytesMut::new();
        bytes.put_u8(params.function_code);
        bytes.put_u8(params.item_count);
        if let Some(items) = params.request_items {
            for item in items {
                bytes.put(BytesMut::from(item));
            }
        };

        bytes
    }
}
