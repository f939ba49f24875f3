use bytes::{Buf, BufMut, BytesMut};
use std::convert::TryFrom;

use super::header::S7ProtocolHeader;
use super::segments::{
    data_item::{DataItem, RETURN_CODE_SUCCESS},
    parameters::ReadWriteParams,
    request_item::RequestItem,
};
use super::types::{DataItemTransportSize, WRITE_OPERATION};
use crate::client::create::S7Client;
use crate::errors::{Error, ItemStatus};
use crate::tag::Tag;

// Job overhead: 10 bytes of header, 2 bytes of parameters.
const REQUEST_OVERHEAD: usize = 12;

struct WriteItem {
    tag: Tag,
    payload: Vec<u8>,
}

/// Split encoded write items into chunks whose request fits the negotiated
/// PDU size, preserving order.
fn plan_chunks(items: Vec<WriteItem>, max_pdu_size: usize) -> Vec<Vec<WriteItem>> {
    let capacity = max_pdu_size.saturating_sub(REQUEST_OVERHEAD);
    let mut chunks: Vec<Vec<WriteItem>> = Vec::new();
    let mut current: Vec<WriteItem> = Vec::new();
    let mut used = 0_usize;

    for item in items {
        let footprint = RequestItem::len() + DataItem::padded_len(item.payload.len());
        if !current.is_empty() && used + footprint > capacity {
            chunks.push(std::mem::take(&mut current));
            used = 0;
        }
        used += footprint;
        current.push(item);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Issue WriteVar jobs for the tags and return them annotated with per-item
/// errors, in input order.
pub(crate) async fn write_area(client: &mut S7Client, tags: Vec<Tag>) -> Result<Vec<Tag>, Error> {
    let max_pdu_size = usize::from(client.pdu_length());

    // encode host values up front; tags without a value or with one outside
    // its legal range never reach the wire
    let mut staged: Vec<Result<WriteItem, Tag>> = Vec::with_capacity(tags.len());
    for tag in tags {
        match &tag.value {
            None => staged.push(Err(tag.with_error("no value to write"))),
            Some(value) => match value.encode() {
                Ok(payload) => staged.push(Ok(WriteItem {
                    tag,
                    payload: payload.to_vec(),
                })),
                Err(error) => staged.push(Err(tag.with_error(error))),
            },
        }
    }

    // writable items keep their position; rejected tags are re-inserted at
    // the end by index
    let mut placements = Vec::with_capacity(staged.len());
    let mut writable = Vec::new();
    let mut rejected = Vec::new();
    for entry in staged {
        match entry {
            Ok(item) => {
                placements.push(true);
                writable.push(item);
            }
            Err(tag) => {
                placements.push(false);
                rejected.push(tag);
            }
        }
    }

    let mut written = Vec::with_capacity(writable.len());
    for chunk in plan_chunks(writable, max_pdu_size) {
        written.extend(write_chunk(client, chunk).await?);
    }

    // stitch results back into input order
    let mut written = written.into_iter();
    let mut rejected = rejected.into_iter();
    let mut result = Vec::with_capacity(placements.len());
    for was_written in placements {
        let next = if was_written {
            written.next()
        } else {
            rejected.next()
        };
        if let Some(tag) = next {
            result.push(tag);
        }
    }
    Ok(result)
}

async fn write_chunk(client: &mut S7Client, chunk: Vec<WriteItem>) -> Result<Vec<Tag>, Error> {
    let request_items = chunk
        .iter()
        .map(|item| RequestItem::build(item.tag.address, item.tag.datatype, 1))
        .collect::<Vec<RequestItem>>();
    let request_params = BytesMut::from(ReadWriteParams::build(WRITE_OPERATION, request_items));

    let item_count = chunk.len();
    let mut data_items = BytesMut::new();
    for (index, item) in chunk.iter().enumerate() {
        let last = index + 1 == item_count;
        DataItem::build_write(
            DataItemTransportSize::from(item.tag.datatype),
            item.payload.clone(),
        )?
        .put(&mut data_items, last);
    }

    let mut bytes = BytesMut::new();
    let req_header = S7ProtocolHeader::build_request(
        client.pdu_reference(),
        request_params.len(),
        data_items.len(),
    )?;
    bytes.put(BytesMut::from(req_header));
    bytes.put(request_params);
    bytes.put(data_items);

    let mut response = client.exchange(bytes).await?;

    let resp_header = S7ProtocolHeader::try_from(&mut response)?;
    resp_header
        .is_ack()?
        .is_current_pdu_response(*client.pdu_reference())?;

    // a whole-PDU device error marks every tag of this chunk instead of
    // aborting the batch
    if let Some(error) = resp_header.to_error() {
        return Ok(chunk
            .into_iter()
            .map(|item| item.tag.with_error(&error))
            .collect());
    }

    let write_params = ReadWriteParams::try_from(&mut response)?;
    if usize::from(write_params.item_count) != item_count {
        return Err(Error::Protocol(format!(
            "WriteVar answered {} items for {item_count} requested",
            write_params.item_count
        )));
    }

    let mut result = Vec::with_capacity(item_count);
    for item in chunk {
        if response.is_empty() {
            return Err(Error::Protocol("WriteVar acknowledgement truncated".to_string()));
        }
        let return_code = response.get_u8();
        if return_code == RETURN_CODE_SUCCESS {
            let mut tag = item.tag;
            tag.error.clear();
            result.push(tag);
        } else {
            result.push(item.tag.with_error(ItemStatus::from(return_code)));
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::values::S7Value;

    fn real_item(index: usize) -> WriteItem {
        let tag = Tag::write(
            format!("r{index}"),
            &format!("DB1.DBX{}.0", index * 4),
            S7Value::Real(1.0),
        )
        .unwrap();
        let payload = tag.value.as_ref().map(|v| v.encode().unwrap().to_vec());
        WriteItem {
            tag,
            payload: payload.unwrap_or_default(),
        }
    }

    #[test]
    fn chunking_respects_request_size() {
        // per item: 12 descriptor + 4 data header + 4 payload = 20 bytes;
        // capacity 240 - 12 = 228 -> 11 items per chunk
        let items: Vec<WriteItem> = (0..25).map(real_item).collect();
        let chunks = plan_chunks(items, 240);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 11);
        assert_eq!(chunks[1].len(), 11);
        assert_eq!(chunks[2].len(), 3);
        assert_eq!(chunks[2][2].tag.name, "r24");
    }
}
