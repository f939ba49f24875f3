use bytes::{BufMut, BytesMut};
use std::convert::TryFrom;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::trace;

use super::iso::{
    CoTp, COTPData, ConnectionType, CotpConnection, CotpDisconnect, IsoControlPDU, IsoDisconnect,
    TpktHeader,
};
use crate::errors::Error;

/// Perform the COTP connect-request/confirm exchange on a fresh TCP stream.
pub(crate) async fn connect(
    tcp_client: &mut TcpStream,
    connection_type: ConnectionType,
    rack: u8,
    slot: u8,
    deadline: Duration,
) -> Result<(), Error> {
    let iso: Vec<u8> = IsoControlPDU::build(1024, connection_type, rack, slot).into();
    timeout(deadline, tcp_client.write_all(&iso))
        .await
        .map_err(|_| Error::Timeout)??;

    let mut tpkt_data = timeout(deadline, read_tpkt_payload(tcp_client))
        .await
        .map_err(|_| Error::Timeout)??;

    let cotp_connection = CotpConnection::try_from(&mut tpkt_data)?;
    cotp_connection.req_ok()?;
    trace!("COTP connection confirmed");
    Ok(())
}

/// Best-effort graceful COTP disconnect.
pub(crate) async fn disconnect(tcp_client: &mut TcpStream, deadline: Duration) -> Result<(), Error> {
    let iso: Vec<u8> = IsoDisconnect::build().into();
    timeout(deadline, tcp_client.write_all(&iso))
        .await
        .map_err(|_| Error::Timeout)??;

    let mut tpkt_data = timeout(deadline, read_tpkt_payload(tcp_client))
        .await
        .map_err(|_| Error::Timeout)??;

    let cotp_disconnect = CotpDisconnect::try_from(&mut tpkt_data)?;
    cotp_disconnect.req_ok()?;
    Ok(())
}

/// Wrap an S7 PDU in TPKT + COTP data headers and send it.
pub(crate) async fn send_buffer(conn: &mut TcpStream, data: BytesMut) -> Result<(), Error> {
    let iso_len = TpktHeader::len()  // TPKT header
                + COTPData::len()    // COTP header
                + data.len(); // S7 PDU
    let iso_len = u16::try_from(iso_len)
        .map_err(|_| Error::Protocol(format!("telegram of {iso_len} bytes overflows TPKT")))?;
    let tpkt_header = TpktHeader::build(iso_len);
    let cotp = COTPData::build();

    let mut bytes = BytesMut::with_capacity(usize::from(iso_len));
    bytes.put(BytesMut::from(tpkt_header));
    bytes.put(BytesMut::from(cotp));
    bytes.put(data);

    trace!(len = bytes.len(), "sending telegram");
    conn.write_all(&bytes).await?;

    Ok(())
}

/// Receive one S7 PDU, reassembling COTP fragments until the end-of-
/// transmission marker.
pub(crate) async fn recv_buffer(conn: &mut TcpStream) -> Result<BytesMut, Error> {
    let mut bytes = BytesMut::new();

    loop {
        let mut iso_cotp_data = read_tpkt_payload(conn).await?;
        let cotp = COTPData::try_from(&mut iso_cotp_data)?;
        cotp.req_ok()?;
        bytes.put(iso_cotp_data);
        if cotp.is_last() {
            break;
        }
    }

    trace!(len = bytes.len(), "received telegram");
    Ok(bytes)
}

/// Send one request PDU and await its response under the session deadline.
pub(crate) async fn exchange_buffer(
    conn: &mut TcpStream,
    data: BytesMut,
    deadline: Duration,
) -> Result<BytesMut, Error> {
    match timeout(deadline, send_buffer(conn, data)).await {
        Ok(sent) => sent?,
        Err(_) => return Err(Error::Timeout),
    };

    match timeout(deadline, recv_buffer(conn)).await {
        Ok(data) => data,
        Err(_) => Err(Error::Timeout),
    }
}

/// Read one TPKT frame: block until the 4-byte header is in hand, then until
/// the advertised remainder arrived.
async fn read_tpkt_payload(conn: &mut TcpStream) -> Result<BytesMut, Error> {
    let mut header_bytes = [0_u8; 4];
    conn.read_exact(&mut header_bytes).await?;
    let mut header_buf = BytesMut::from(&header_bytes[..]);
    let header = TpktHeader::try_from(&mut header_buf)?;

    let mut data = vec![0_u8; usize::from(header.length) - TpktHeader::len()];
    conn.read_exact(&mut data).await?;
    Ok(BytesMut::from(&data[..]))
}
