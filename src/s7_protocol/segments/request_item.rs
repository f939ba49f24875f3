use bytes::{BufMut, BytesMut};

use crate::{
    address::S7Address,
    s7_protocol::types::{SPEC_TYPE_READ_WRITE, SYNTAX_ID_ANY_TYPE},
    values::DataType,
};

/// One 12-byte "any" variable descriptor in a ReadVar/WriteVar parameter
/// block.
#[derive(Debug, Copy, Clone)]
pub(crate) struct RequestItem {
    pub(crate) specification_type: u8, // always 0x12 for read/write: variable specification
    pub(crate) item_length: u8,        // length of the rest of this item
    pub(crate) syntax_id: u8,          // 0x10 for any-type addressing
    pub(crate) transport_size: u8,     // data type tag of the addressed variable
    pub(crate) count: u16,             // number of consecutive elements of that type
    pub(crate) db_number: u16,         // ignored unless the area is DB/DI
    pub(crate) area: u8,
    pub(crate) address: u32, // bit-granular offset, encoded on 3 bytes big-endian.
                             // DBX40.3 becomes 0x000143, which is 40 * 8 + 3.
}

impl RequestItem {
    pub(crate) fn len() -> usize {
        // the address field takes only 3 of its 4 bytes on the wire
        12
    }

    pub(crate) fn build(address: S7Address, datatype: DataType, count: u16) -> Self {
        Self {
            specification_type: SPEC_TYPE_READ_WRITE,
            item_length: 10,
            syntax_id: SYNTAX_ID_ANY_TYPE,
            transport_size: datatype.transport_size(),
            count,
            db_number: address.db_number,
            area: address.area as u8,
            address: address.wire_offset(),
        }
    }

    fn address_to_bytes(&self) -> [u8; 3] {
        [
            (self.address >> 16) as u8,
            (self.address >> 8) as u8,
            self.address as u8,
        ]
    }
}

impl From<RequestItem> for BytesMut {
    fn from(req_item: RequestItem) -> BytesMut {
        let mut bytes = BytesMut::with_capacity(12);
        bytes.put_u8(req_item.specification_type);
        bytes.put_u8(req_item.item_length);
        bytes.put_u8(req_item.syntax_id);
        bytes.put_u8(req_item.transport_size);
        bytes.put_u16(req_item.count);
        bytes.put_u16(req_item.db_number);
        bytes.put_u8(req_item.area);
        bytes.extend_from_slice(&req_item.address_to_bytes());

        bytes
    }
}
