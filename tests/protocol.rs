//! Protocol-level tests against a scripted mock PLC.
//!
//! The mock accepts one TCP connection, reads one TPKT-framed request per
//! scripted response and answers with the literal bytes of that response.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, NaiveDateTime};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use step7::{
    errors::Error, ConnectionConfig, DataType, S7Client, S7Pool, S7Value, Tag,
};

struct MockPlc {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl MockPlc {
    async fn start(responses: Vec<Vec<u8>>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock");
        let addr = listener.local_addr().expect("mock address");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            for response in responses {
                let mut header = [0_u8; 4];
                if socket.read_exact(&mut header).await.is_err() {
                    return;
                }
                let length = usize::from(u16::from_be_bytes([header[2], header[3]]));
                let mut body = vec![0_u8; length - 4];
                if socket.read_exact(&mut body).await.is_err() {
                    return;
                }
                let mut request = header.to_vec();
                request.extend_from_slice(&body);
                seen.lock().expect("requests lock").push(request);

                if socket.write_all(&response).await.is_err() {
                    return;
                }
            }
        });

        Self { addr, requests }
    }

    fn request(&self, index: usize) -> Vec<u8> {
        self.requests.lock().expect("requests lock")[index].clone()
    }

    fn request_count(&self) -> usize {
        self.requests.lock().expect("requests lock").len()
    }
}

async fn connect(mock: &MockPlc) -> S7Client {
    let mut config = ConnectionConfig::new("127.0.0.1");
    config.port = mock.addr.port();
    S7Client::connect(config).await.expect("connect to mock")
}

// ---- byte builders -------------------------------------------------------

/// COTP connect confirm, 22 bytes total.
fn cc_frame() -> Vec<u8> {
    vec![
        0x03, 0x00, 0x00, 0x16, // TPKT
        0x11, 0xD0, 0x00, 0x01, 0x00, 0x01, 0x00, // COTP CC
        0xC0, 0x01, 0x0A, // TPDU size
        0xC1, 0x02, 0x01, 0x00, // src TSAP
        0xC2, 0x02, 0x01, 0x00, // dst TSAP
    ]
}

/// COTP disconnect confirm.
fn dc_frame() -> Vec<u8> {
    vec![
        0x03, 0x00, 0x00, 0x0B, // TPKT
        0x06, 0xC0, 0x00, 0x01, 0x00, 0x01, 0x80, // COTP DC
    ]
}

/// TPKT + COTP data envelope around an S7 PDU.
fn data_frame(s7: &[u8]) -> Vec<u8> {
    let length = (s7.len() + 7) as u16;
    let mut frame = vec![0x03, 0x00];
    frame.extend_from_slice(&length.to_be_bytes());
    frame.extend_from_slice(&[0x02, 0xF0, 0x80]);
    frame.extend_from_slice(s7);
    frame
}

/// AckData PDU with the given parameter and data sections.
fn ack_data(pdu_ref: u16, params: &[u8], data: &[u8]) -> Vec<u8> {
    let mut pdu = vec![0x32, 0x03, 0x00, 0x00];
    pdu.extend_from_slice(&pdu_ref.to_be_bytes());
    pdu.extend_from_slice(&(params.len() as u16).to_be_bytes());
    pdu.extend_from_slice(&(data.len() as u16).to_be_bytes());
    pdu.extend_from_slice(&[0x00, 0x00]); // error class + code
    pdu.extend_from_slice(params);
    pdu.extend_from_slice(data);
    pdu
}

/// Plain Ack PDU without data, as answered to lifecycle jobs.
fn plain_ack(pdu_ref: u16, params: &[u8]) -> Vec<u8> {
    let mut pdu = vec![0x32, 0x02, 0x00, 0x00];
    pdu.extend_from_slice(&pdu_ref.to_be_bytes());
    pdu.extend_from_slice(&(params.len() as u16).to_be_bytes());
    pdu.extend_from_slice(&[0x00, 0x00]); // data length
    pdu.extend_from_slice(&[0x00, 0x00]); // error class + code
    pdu.extend_from_slice(params);
    pdu
}

/// UserData response carrying one (possibly non-final) payload fragment.
fn userdata_fragment(
    pdu_ref: u16,
    function_group: u8,
    subfunction: u8,
    payload: &[u8],
    data_unit_ref: u8,
    last: bool,
) -> Vec<u8> {
    let data_length = (payload.len() + 4) as u16;
    let mut pdu = vec![0x32, 0x07, 0x00, 0x00];
    pdu.extend_from_slice(&pdu_ref.to_be_bytes());
    pdu.extend_from_slice(&12_u16.to_be_bytes());
    pdu.extend_from_slice(&data_length.to_be_bytes());
    pdu.extend_from_slice(&[0x00, 0x01, 0x12, 0x08, 0x12]);
    pdu.push(function_group);
    pdu.push(subfunction);
    pdu.push(0x01); // sequence
    pdu.push(data_unit_ref);
    pdu.push(u8::from(!last)); // 0x00 flags the final fragment
    pdu.extend_from_slice(&[0x00, 0x00]); // error code
    pdu.extend_from_slice(&[0xFF, 0x09]);
    pdu.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    pdu.extend_from_slice(payload);
    pdu
}

fn userdata_response(pdu_ref: u16, function_group: u8, subfunction: u8, payload: &[u8]) -> Vec<u8> {
    userdata_fragment(pdu_ref, function_group, subfunction, payload, 0, true)
}

fn setup_ack(pdu_ref: u16, pdu_length: u16) -> Vec<u8> {
    let mut params = vec![0xF0, 0x00, 0x00, 0x01, 0x00, 0x01];
    params.extend_from_slice(&pdu_length.to_be_bytes());
    ack_data(pdu_ref, &params, &[])
}

fn handshake(pdu_length: u16) -> Vec<Vec<u8>> {
    vec![cc_frame(), data_frame(&setup_ack(1, pdu_length))]
}

/// SZL answer for CPU status (0x0424) reporting the given mode nibbles.
fn cpu_status_szl(pdu_ref: u16, status: u8) -> Vec<u8> {
    let payload = [
        0x04, 0x24, 0x00, 0x00, // SZL id + index
        0x00, 0x04, 0x00, 0x01, // section length + count
        0x00, 0x00, 0x00, status,
    ];
    userdata_response(pdu_ref, 0x84, 0x01, &payload)
}

// ---- scenarios -----------------------------------------------------------

#[tokio::test]
async fn handshake_negotiates_pdu_size() {
    let mock = MockPlc::start(handshake(240)).await;
    let client = connect(&mock).await;

    assert_eq!(client.pdu_length(), 240);
    assert!(client.is_connected());

    // COTP connect request
    let cr = mock.request(0);
    assert_eq!(&cr[..4], [0x03, 0x00, 0x00, 0x16]);
    assert_eq!(cr[5], 0xE0);
    // setup communication proposes 960 bytes
    let setup = mock.request(1);
    assert_eq!(&setup[setup.len() - 2..], [0x03, 0xC0]);
}

#[tokio::test]
async fn undersized_pdu_offer_fails_the_connect() {
    let mut frames = vec![cc_frame()];
    frames.push(data_frame(&setup_ack(1, 128)));
    let mock = MockPlc::start(frames).await;

    let mut config = ConnectionConfig::new("127.0.0.1");
    config.port = mock.addr.port();
    assert!(matches!(
        S7Client::connect(config).await,
        Err(Error::Negotiation(_))
    ));
}

#[tokio::test]
async fn read_single_bool() {
    let mut frames = handshake(240);
    frames.push(data_frame(&ack_data(
        2,
        &[0x04, 0x01],
        &[0xFF, 0x03, 0x00, 0x01, 0x01],
    )));
    let mock = MockPlc::start(frames).await;
    let mut client = connect(&mock).await;

    let tags = client
        .read_area(vec![Tag::read("flag", "DB2.DBX0.0", DataType::Bit).unwrap()])
        .await
        .unwrap();

    assert_eq!(tags.len(), 1);
    assert!(tags[0].is_ok());
    assert_eq!(tags[0].value, Some(S7Value::Bit(true)));

    // the request carries exactly one any-pointer item descriptor
    let request = mock.request(2);
    assert!(request.ends_with(&[
        0x12, 0x0A, 0x10, 0x01, 0x00, 0x01, 0x00, 0x02, 0x84, 0x00, 0x00, 0x00
    ]));
}

#[tokio::test]
async fn write_single_real() {
    let mut frames = handshake(240);
    frames.push(data_frame(&ack_data(2, &[0x05, 0x01], &[0xFF])));
    let mock = MockPlc::start(frames).await;
    let mut client = connect(&mock).await;

    let tags = client
        .write_area(vec![
            Tag::write("setpoint", "DB2.DBX24.0", S7Value::Real(6.6)).unwrap()
        ])
        .await
        .unwrap();

    assert_eq!(tags.len(), 1);
    assert!(tags[0].is_ok(), "unexpected error: {}", tags[0].error);

    // data item: byte transport, 32 bits, IEEE-754 image of 6.6
    let request = mock.request(2);
    assert!(request.ends_with(&[0x00, 0x04, 0x00, 0x20, 0x40, 0xD3, 0x33, 0x33]));
}

#[tokio::test]
async fn fifty_dwords_chunk_into_two_requests() {
    // 28 items fit a 240-byte acknowledgement, the remaining 22 follow
    let first_chunk: Vec<u8> = (0_u32..28)
        .flat_map(|i| {
            let mut item = vec![0xFF, 0x04, 0x00, 0x20];
            item.extend_from_slice(&i.to_be_bytes());
            item
        })
        .collect();
    let second_chunk: Vec<u8> = (28_u32..50)
        .flat_map(|i| {
            let mut item = vec![0xFF, 0x04, 0x00, 0x20];
            item.extend_from_slice(&i.to_be_bytes());
            item
        })
        .collect();

    let mut frames = handshake(240);
    frames.push(data_frame(&ack_data(2, &[0x04, 28], &first_chunk)));
    frames.push(data_frame(&ack_data(3, &[0x04, 22], &second_chunk)));
    let mock = MockPlc::start(frames).await;
    let mut client = connect(&mock).await;

    let tags = (0..50)
        .map(|i| Tag::read(format!("dw{i}"), &format!("DB1.DBX{}.0", i * 4), DataType::DWord))
        .collect::<Result<Vec<Tag>, Error>>()
        .unwrap();
    let tags = client.read_area(tags).await.unwrap();

    // two ReadVar jobs after CR and setup
    assert_eq!(mock.request_count(), 4);
    assert_eq!(tags.len(), 50);
    for (i, tag) in tags.iter().enumerate() {
        assert_eq!(tag.value, Some(S7Value::DWord(i as u32)), "item {i}");
        assert!(tag.is_ok());
    }
}

#[tokio::test]
async fn per_item_error_leaves_siblings_intact() {
    let mut frames = handshake(240);
    frames.push(data_frame(&ack_data(
        2,
        &[0x04, 0x02],
        &[
            0xFF, 0x03, 0x00, 0x01, 0x01, 0x00, // bit item + pad
            0x05, 0x00, 0x00, 0x00, // invalid address
        ],
    )));
    let mock = MockPlc::start(frames).await;
    let mut client = connect(&mock).await;

    let tags = client
        .read_area(vec![
            Tag::read("good", "DB2.DBX0.0", DataType::Bit).unwrap(),
            Tag::read("bad", "DB2.DBX9000.0", DataType::Bit).unwrap(),
        ])
        .await
        .unwrap();

    assert_eq!(tags[0].value, Some(S7Value::Bit(true)));
    assert!(tags[0].is_ok());
    assert_eq!(tags[1].error, "Invalid address");
    assert_eq!(tags[1].value, None);
}

#[tokio::test]
async fn read_plc_time_decodes_bcd() {
    let mut frames = handshake(240);
    frames.push(data_frame(&userdata_response(
        2,
        0x87,
        0x01,
        &[0x00, 0x20, 0x22, 0x09, 0x08, 0x17, 0x07, 0x25, 0x38, 0x04],
    )));
    let mock = MockPlc::start(frames).await;
    let mut client = connect(&mock).await;

    let timestamp = client.read_plc_time().await.unwrap();
    let expected: NaiveDateTime = NaiveDate::from_ymd_opt(2022, 9, 8)
        .unwrap()
        .and_hms_milli_opt(17, 7, 25, 380)
        .unwrap();
    assert_eq!(timestamp, expected);
}

#[tokio::test]
async fn set_plc_time_echoes_timestamp() {
    let mut frames = handshake(240);
    frames.push(data_frame(&userdata_response(2, 0x87, 0x02, &[])));
    let mock = MockPlc::start(frames).await;
    let mut client = connect(&mock).await;

    let timestamp = NaiveDate::from_ymd_opt(2022, 9, 8)
        .unwrap()
        .and_hms_milli_opt(17, 7, 25, 380)
        .unwrap();
    assert_eq!(client.set_plc_time(timestamp).await.unwrap(), timestamp);

    // clock image travels BCD coded with century and weekday
    let request = mock.request(2);
    assert!(request.ends_with(&[0x00, 0x20, 0x22, 0x09, 0x08, 0x17, 0x07, 0x25, 0x38, 0x05]));
}

#[tokio::test]
async fn read_cpu_status_splits_nibbles() {
    let mut frames = handshake(240);
    frames.push(data_frame(&cpu_status_szl(2, 0x48)));
    let mock = MockPlc::start(frames).await;
    let mut client = connect(&mock).await;

    let status = client.read_cpu_status().await.unwrap();
    assert_eq!(status.requested_mode, "Run");
    assert_eq!(status.previous_mode, "Stop");
    assert!(status.error.is_empty());
}

#[tokio::test]
async fn szl_fragments_are_reassembled() {
    let mut frames = handshake(240);
    frames.push(data_frame(&userdata_fragment(
        2,
        0x84,
        0x01,
        &[0x00, 0x11, 0x00, 0x00, 0x00, 0x02, 0x00, 0x02, 0xAA, 0xBB],
        0x07,
        false,
    )));
    frames.push(data_frame(&userdata_fragment(
        3,
        0x84,
        0x01,
        &[0xCC, 0xDD],
        0x07,
        true,
    )));
    let mock = MockPlc::start(frames).await;
    let mut client = connect(&mock).await;

    let data = client.read_szl(0x0011, 0x0000).await.unwrap();
    assert_eq!(
        data,
        [0x00, 0x11, 0x00, 0x00, 0x00, 0x02, 0x00, 0x02, 0xAA, 0xBB, 0xCC, 0xDD]
    );
    // the follow-up request echoes the data unit reference
    assert_eq!(mock.request_count(), 4);
}

#[tokio::test]
async fn stop_issues_lifecycle_job_when_running() {
    let mut frames = handshake(240);
    frames.push(data_frame(&cpu_status_szl(2, 0x08))); // requested mode Run
    frames.push(data_frame(&plain_ack(3, &[0x29])));
    let mock = MockPlc::start(frames).await;
    let mut client = connect(&mock).await;

    assert!(client.stop().await.unwrap());

    // stop job: function code 0x29 and the P_PROGRAM routine name
    let request = mock.request(3);
    assert!(request.ends_with(b"P_PROGRAM"));
    assert_eq!(request[17], 0x29);
}

#[tokio::test]
async fn stop_skips_job_when_already_stopped() {
    let mut frames = handshake(240);
    frames.push(data_frame(&cpu_status_szl(2, 0x04))); // requested mode Stop
    let mock = MockPlc::start(frames).await;
    let mut client = connect(&mock).await;

    assert!(client.stop().await.unwrap());
    assert_eq!(mock.request_count(), 3);
}

#[tokio::test]
async fn start_cold_issues_lifecycle_job() {
    let mut frames = handshake(240);
    frames.push(data_frame(&cpu_status_szl(2, 0x04))); // requested mode Stop
    frames.push(data_frame(&plain_ack(3, &[0x28])));
    let mock = MockPlc::start(frames).await;
    let mut client = connect(&mock).await;

    assert!(client.start_plc_cold().await.unwrap());
    let request = mock.request(3);
    assert_eq!(request[17], 0x28);
    assert!(request.ends_with(b"P_PROGRAM"));
}

#[tokio::test]
async fn mismatched_reference_faults_the_session() {
    let mut frames = handshake(240);
    frames.push(data_frame(&ack_data(
        99,
        &[0x04, 0x01],
        &[0xFF, 0x03, 0x00, 0x01, 0x01],
    )));
    let mock = MockPlc::start(frames).await;
    let mut client = connect(&mock).await;

    let result = client
        .read_area(vec![Tag::read("flag", "DB2.DBX0.0", DataType::Bit).unwrap()])
        .await;
    assert_eq!(
        result,
        Err(Error::Desync {
            expected: 2,
            received: 99
        })
    );

    // the session no longer accepts operations
    let result = client
        .read_area(vec![Tag::read("flag", "DB2.DBX0.0", DataType::Bit).unwrap()])
        .await;
    assert_eq!(result, Err(Error::NotConnected));
}

#[tokio::test]
async fn closed_session_rejects_operations() {
    let mut frames = handshake(240);
    frames.push(dc_frame());
    let mock = MockPlc::start(frames).await;
    let mut client = connect(&mock).await;

    client.close().await.unwrap();
    let result = client
        .read_area(vec![Tag::read("flag", "DB2.DBX0.0", DataType::Bit).unwrap()])
        .await;
    assert_eq!(result, Err(Error::NotConnected));
}

#[tokio::test]
async fn pool_checks_out_a_session_per_operation() {
    let mut frames = handshake(240);
    frames.push(data_frame(&ack_data(
        2,
        &[0x04, 0x01],
        &[0xFF, 0x03, 0x00, 0x01, 0x00],
    )));
    let mock = MockPlc::start(frames).await;

    let mut config = ConnectionConfig::new("127.0.0.1");
    config.port = mock.addr.port();
    let pool = S7Pool::new(config, 1);

    let tags = pool
        .read_area(vec![Tag::read("flag", "DB2.DBX0.0", DataType::Bit).unwrap()])
        .await
        .unwrap();
    assert_eq!(tags[0].value, Some(S7Value::Bit(false)));
}
