use bytes::{BufMut, BytesMut};
use std::convert::TryFrom;

use super::segments::{
    data_item::DataItem, parameters::ReadWriteParams, request_item::RequestItem,
};
use super::header::S7ProtocolHeader;
use super::types::READ_OPERATION;
use crate::client::create::S7Client;
use crate::errors::Error;
use crate::tag::Tag;
use crate::values::S7Value;

/// Split tags into chunks whose acknowledgement fits the negotiated PDU
/// size. Greedy: append items until the next item would overflow, then start
/// a new chunk. An oversized single item still gets its own chunk, the
/// device reports on it.
fn plan_chunks(tags: Vec<Tag>, max_pdu_size: usize) -> Vec<Vec<Tag>> {
    // acknowledgement overhead: 12 bytes of header, 2 bytes of parameters
    let capacity =
        max_pdu_size.saturating_sub(S7ProtocolHeader::len_response() + ReadWriteParams::len());
    let mut chunks: Vec<Vec<Tag>> = Vec::new();
    let mut current: Vec<Tag> = Vec::new();
    let mut used = 0_usize;

    for tag in tags {
        let footprint = DataItem::header_len() + tag.size();
        if !current.is_empty() && used + footprint > capacity {
            chunks.push(std::mem::take(&mut current));
            used = 0;
        }
        used += footprint;
        current.push(tag);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Issue ReadVar jobs for the tags and return them annotated with values
/// and per-item errors, in input order.
///
/// Each PDU (S7 header + parameters + data) must stay within the PDU length
/// negotiated with the PLC, so oversized batches are split across
/// subsequent PDUs.
pub(crate) async fn read_area(client: &mut S7Client, tags: Vec<Tag>) -> Result<Vec<Tag>, Error> {
    let max_pdu_size = usize::from(client.pdu_length());
    let mut result = Vec::with_capacity(tags.len());

    for chunk in plan_chunks(tags, max_pdu_size) {
        let request_items = chunk
            .iter()
            .map(|tag| RequestItem::build(tag.address, tag.datatype, 1))
            .collect::<Vec<RequestItem>>();
        let request_params = BytesMut::from(ReadWriteParams::build(READ_OPERATION, request_items));

        let mut bytes = BytesMut::new();
        let req_header =
            S7ProtocolHeader::build_request(client.pdu_reference(), request_params.len(), 0)?;
        bytes.put(BytesMut::from(req_header));
        bytes.put(request_params);

        let mut response = client.exchange(bytes).await?;

        let resp_header = S7ProtocolHeader::try_from(&mut response)?;
        resp_header
            .is_ack_with_data()?
            .is_current_pdu_response(*client.pdu_reference())?;

        // a whole-PDU device error marks every tag of this chunk instead of
        // aborting the batch
        if let Some(error) = resp_header.to_error() {
            result.extend(chunk.into_iter().map(|tag| tag.with_error(&error)));
            continue;
        }

        let read_params = ReadWriteParams::try_from(&mut response)?;
        if usize::from(read_params.item_count) != chunk.len() {
            return Err(Error::Protocol(format!(
                "ReadVar answered {} items for {} requested",
                read_params.item_count,
                chunk.len()
            )));
        }

        let item_count = chunk.len();
        for (index, tag) in chunk.into_iter().enumerate() {
            let last = index + 1 == item_count;
            match DataItem::parse(&mut response, last)? {
                Ok(item) => match S7Value::decode(tag.datatype, &item.data) {
                    Ok(value) => result.push(tag.with_value(value)),
                    Err(error) => result.push(tag.with_error(error)),
                },
                Err(status) => result.push(tag.with_error(status)),
            }
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::values::DataType;

    fn dword_tags(count: usize) -> Vec<Tag> {
        (0..count)
            .map(|i| {
                Tag::read(
                    format!("dw{i}"),
                    &format!("DB1.DBX{}.0", i * 4),
                    DataType::DWord,
                )
                .unwrap()
            })
            .collect()
    }

    #[test]
    fn small_batch_stays_in_one_chunk() {
        // 14 + 10 * (4 + 4) = 94 bytes of acknowledgement, well within 240
        let chunks = plan_chunks(dword_tags(10), 240);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn fifty_dwords_split_into_two_chunks_at_240() {
        let chunks = plan_chunks(dword_tags(50), 240);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 28);
        assert_eq!(chunks[1].len(), 22);
        // input order is preserved across the split
        assert_eq!(chunks[0][0].name, "dw0");
        assert_eq!(chunks[1][0].name, "dw28");
        assert_eq!(chunks[1][21].name, "dw49");
    }

    #[test]
    fn oversized_item_still_gets_a_chunk() {
        let tags = vec![Tag::read("s", "DB1.DBX0.0", DataType::String).unwrap()];
        let chunks = plan_chunks(tags, 240);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 1);
    }
}
