use std::convert::TryFrom;

use bytes::{Buf, BufMut, BytesMut};

use crate::errors::Error;

// PDU Type constants (Code + Credit)
const PDU_TYPE_CR: u8 = 0xE0; // Connection request
pub(crate) const PDU_TYPE_CC: u8 = 0xD0; // Connection confirm
const PDU_TYPE_DR: u8 = 0x80; // Disconnect request
pub(crate) const PDU_TYPE_DC: u8 = 0xC0; // Disconnect confirm
pub(crate) const PDU_TYPE_DT: u8 = 0xF0; // Data transfer

const PDU_EOT: u8 = 0x80; // End of Transmission (this packet is complete)

const SRC_REF: u16 = 0x0100; // RFC0983 states that SrcRef and DstRef should be 0
                             // and, in any case, they are ignored.
                             // S7 instead requires a number != 0.
const DST_REF: u16 = 0x0000;
const SRC_TSAP: u16 = 0x0100;

pub(crate) const ISO_TCP_VERSION: u8 = 3; // RFC 1006

/// How the connection registers with the CPU, encoded into the destination
/// TSAP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionType {
    /// Programming-console connection (Programmiergeräte)
    #[default]
    PG = 0x01,
    /// HMI panel connection
    OP = 0x02,
    /// Generic data transfer connection
    S7Basic = 0x03,
}

struct Tsap {}
impl Tsap {
    fn build(connection_type: ConnectionType, rack: u8, slot: u8) -> Vec<u8> {
        let dst_tsap =
            ((connection_type as u16) << 8) + (u16::from(rack) * 0x20) + u16::from(slot);
        vec![
            0xC1,                  // code that identifies source TSAP
            2,                     // source TSAP len
            (SRC_TSAP >> 8) as u8, // HI part
            SRC_TSAP as u8,        // LO part
            0xC2,                  // code that identifies dest TSAP
            2,                     // dest TSAP len
            (dst_tsap >> 8) as u8, // HI part
            dst_tsap as u8,        // LO part
        ]
    }
}

/// TPKT Header - ISO on TCP - RFC 1006 (4 bytes)
#[derive(Debug, Copy, Clone)]
pub(crate) struct TpktHeader {
    version: u8,            // Always 3 for RFC 1006
    reserved: u8,           // 0
    pub(crate) length: u16, // Packet length including this header
}

impl TpktHeader {
    pub(crate) fn build(length: u16) -> Self {
        Self {
            version: ISO_TCP_VERSION,
            reserved: 0,
            length,
        }
    }

    pub(crate) fn len() -> usize {
        4
    }
}

impl TryFrom<&mut BytesMut> for TpktHeader {
    type Error = Error;

    fn try_from(bytes: &mut BytesMut) -> Result<Self, Self::Error> {
        if bytes.len() < Self::len() {
            return Err(Error::Protocol("short TPKT header".to_string()));
        }
        let header = Self {
            version: bytes.get_u8(),
            reserved: bytes.get_u8(),
            length: bytes.get_u16(),
        };
        if header.version != ISO_TCP_VERSION {
            return Err(Error::Protocol(format!(
                "unexpected TPKT version {}",
                header.version
            )));
        }
        if usize::from(header.length) < Self::len() + COTPData::len() {
            return Err(Error::Protocol(format!(
                "TPKT length {} too small to carry a COTP payload",
                header.length
            )));
        }
        Ok(header)
    }
}

impl From<TpktHeader> for BytesMut {
    fn from(header: TpktHeader) -> BytesMut {
        let mut bytes = BytesMut::with_capacity(4);
        bytes.put_u8(header.version);
        bytes.put_u8(header.reserved);
        bytes.put_u16(header.length);

        bytes
    }
}

#[derive(Debug)]
struct CotpParams {
    pdu_size_code: u8,
    pdu_size_len: u8,
    pdu_size_val: u8,
    tsap: Vec<u8>,
}

impl TryFrom<&mut BytesMut> for CotpParams {
    type Error = Error;

    fn try_from(bytes: &mut BytesMut) -> Result<Self, Self::Error> {
        if bytes.len() < 3 {
            return Err(Error::Protocol("short COTP parameter block".to_string()));
        }
        Ok(Self {
            pdu_size_code: bytes.get_u8(),
            pdu_size_len: bytes.get_u8(),
            pdu_size_val: bytes.get_u8(),
            tsap: bytes.to_vec(),
        })
    }
}

impl From<CotpParams> for Vec<u8> {
    fn from(params: CotpParams) -> Vec<u8> {
        let mut vec = vec![
            params.pdu_size_code,
            params.pdu_size_len,
            params.pdu_size_val,
        ];
        let mut tsap = params.tsap;
        vec.append(&mut tsap);
        vec
    }
}

// COTP header for CONNECTION REQUEST/CONFIRM
#[derive(Debug)]
pub(crate) struct CotpConnection {
    header_length: u8, // length without params - 1
    pdu_type: u8,
    dst_ref: u16, // always 0x0000
    src_ref: u16,
    co_r: u8, // class (high 4 bits) + option (low 4 bits), both ignored on input
    cotp_params: CotpParams,
}

#[derive(Debug)]
pub(crate) struct CotpDisconnect {
    header_length: u8,
    pdu_type: u8,
    dst_ref: u16,
    src_ref: u16,
    reason: u8, // 128 + 0 = normal disconnect by the session entity
}

impl CotpDisconnect {
    pub(crate) fn len() -> usize {
        7
    }
}

impl CoTp for CotpConnection {
    fn get_pdu_type(&self) -> u8 {
        self.pdu_type
    }

    fn req_ok(&self) -> Result<(), Error> {
        if self.validate_expected_pdu_type(PDU_TYPE_CC) {
            Ok(())
        } else {
            Err(Error::Protocol(format!(
                "expected COTP connect confirm, received PDU type 0x{:02X}",
                self.pdu_type
            )))
        }
    }
}

impl TryFrom<&mut BytesMut> for CotpConnection {
    type Error = Error;

    fn try_from(bytes: &mut BytesMut) -> Result<Self, Self::Error> {
        if bytes.len() < 7 {
            return Err(Error::Protocol("short COTP connection header".to_string()));
        }
        Ok(Self {
            header_length: bytes.get_u8(),
            pdu_type: bytes.get_u8(),
            dst_ref: bytes.get_u16(),
            src_ref: bytes.get_u16(),
            co_r: bytes.get_u8(),
            cotp_params: CotpParams::try_from(bytes)?,
        })
    }
}

impl From<CotpConnection> for Vec<u8> {
    fn from(cotp: CotpConnection) -> Vec<u8> {
        let mut vec = vec![cotp.header_length, cotp.pdu_type];
        vec.append(&mut cotp.dst_ref.to_be_bytes().to_vec());
        vec.append(&mut cotp.src_ref.to_be_bytes().to_vec());
        vec.push(cotp.co_r);
        vec.append(&mut cotp.cotp_params.into());
        vec
    }
}

impl TryFrom<&mut BytesMut> for CotpDisconnect {
    type Error = Error;

    fn try_from(bytes: &mut BytesMut) -> Result<Self, Self::Error> {
        if bytes.len() < Self::len() {
            return Err(Error::Protocol("short COTP disconnect header".to_string()));
        }
        Ok(Self {
            header_length: bytes.get_u8(),
            pdu_type: bytes.get_u8(),
            dst_ref: bytes.get_u16(),
            src_ref: bytes.get_u16(),
            reason: bytes.get_u8(),
        })
    }
}

impl From<CotpDisconnect> for Vec<u8> {
    fn from(cotp: CotpDisconnect) -> Vec<u8> {
        let mut vec = vec![cotp.header_length, cotp.pdu_type];
        vec.append(&mut cotp.dst_ref.to_be_bytes().to_vec());
        vec.append(&mut cotp.src_ref.to_be_bytes().to_vec());
        vec.push(cotp.reason);
        vec
    }
}

impl CoTp for CotpDisconnect {
    fn get_pdu_type(&self) -> u8 {
        self.pdu_type
    }

    fn req_ok(&self) -> Result<(), Error> {
        if self.validate_expected_pdu_type(PDU_TYPE_DC) {
            Ok(())
        } else {
            Err(Error::Protocol(format!(
                "expected COTP disconnect confirm, received PDU type 0x{:02X}",
                self.pdu_type
            )))
        }
    }
}

// COTP header for DATA EXCHANGE
#[derive(Debug)]
pub(crate) struct COTPData {
    header_length: u8, // 3 for this header - 1
    pdu_type: u8,      // 0xF0 for this header
    eot_num: u8,       // EOT (bit 7) + TPDU number (bits 0..6)
}

impl COTPData {
    pub(crate) fn len() -> usize {
        3
    }

    pub(crate) fn build() -> Self {
        COTPData {
            header_length: 2,
            pdu_type: PDU_TYPE_DT,
            eot_num: PDU_EOT,
        }
    }

    pub(crate) fn is_last(&self) -> bool {
        self.eot_num & PDU_EOT == PDU_EOT
    }
}

impl CoTp for COTPData {
    fn get_pdu_type(&self) -> u8 {
        self.pdu_type
    }

    fn req_ok(&self) -> Result<(), Error> {
        if self.validate_expected_pdu_type(PDU_TYPE_DT) {
            Ok(())
        } else {
            Err(Error::Protocol(format!(
                "expected COTP data transfer, received PDU type 0x{:02X}",
                self.pdu_type
            )))
        }
    }
}

impl TryFrom<&mut BytesMut> for COTPData {
    type Error = Error;

    fn try_from(bytes: &mut BytesMut) -> Result<Self, Self::Error> {
        if bytes.len() < Self::len() {
            return Err(Error::Protocol("short COTP data header".to_string()));
        }
        Ok(Self {
            header_length: bytes.get_u8(),
            pdu_type: bytes.get_u8(),
            eot_num: bytes.get_u8(),
        })
    }
}

impl From<COTPData> for BytesMut {
    fn from(cotp: COTPData) -> BytesMut {
        let mut bytes = BytesMut::with_capacity(3);
        bytes.put_u8(cotp.header_length);
        bytes.put_u8(cotp.pdu_type);
        bytes.put_u8(cotp.eot_num);

        bytes
    }
}

pub(super) trait CoTp {
    fn validate_expected_pdu_type(&self, expected_type: u8) -> bool {
        expected_type == self.get_pdu_type()
    }

    fn req_ok(&self) -> Result<(), Error>;
    fn get_pdu_type(&self) -> u8;
}

#[derive(Debug)]
pub(super) struct IsoControlPDU {
    tpkt_header: TpktHeader,
    cotp_co_header: CotpConnection,
}

impl IsoControlPDU {
    pub(crate) fn build(
        pdu_size: u32,
        connection_type: ConnectionType,
        rack: u8,
        slot: u8,
    ) -> Self {
        // Params length
        let par_len = 11_u8; // 2 src TSAP (code + field len)     +
                             // 2 src TSAP value                  +
                             // 2 dst TSAP (code + field len)     +
                             // 2 dst TSAP value                  +
                             // 3 PDU size (code + field len + val) = 11
        let iso_len = TpktHeader::len() as u8 // TPKT header
                    + 7                       // COTP header size without params
                    + par_len;

        let cotp = CotpConnection {
            cotp_params: CotpParams {
                pdu_size_code: 0xC0, // code that identifies TPDU size
                pdu_size_len: 0x01,  // 1 byte for this field
                pdu_size_val: match pdu_size {
                    128 => 0x07,
                    256 => 0x08,
                    512 => 0x09,
                    1024 => 0x0A,
                    4096 => 0x0C,
                    8192 => 0x0D,
                    _ => 0x0B,
                },
                tsap: Tsap::build(connection_type, rack, slot),
            },
            header_length: par_len + 6, // COTP header size - 1
            pdu_type: PDU_TYPE_CR,
            dst_ref: DST_REF,
            src_ref: SRC_REF,
            co_r: 0x00, // RFC0983 wants 0x40 here, S7 equipment wants 0
        };

        let header = TpktHeader::build(u16::from(iso_len));

        IsoControlPDU {
            tpkt_header: header,
            cotp_co_header: cotp,
        }
    }
}

impl From<IsoControlPDU> for Vec<u8> {
    fn from(control_pdu: IsoControlPDU) -> Vec<u8> {
        let mut vec = Vec::new();
        vec.append(&mut BytesMut::from(control_pdu.tpkt_header).to_vec());
        vec.append(&mut control_pdu.cotp_co_header.into());
        vec
    }
}

pub(super) struct IsoDisconnect {
    tpkt_header: TpktHeader,
    cotp_co_header: CotpDisconnect,
}

impl IsoDisconnect {
    pub(crate) fn build() -> Self {
        let iso_len = TpktHeader::len() + CotpDisconnect::len();

        let cotp = CotpDisconnect {
            header_length: 6,
            pdu_type: PDU_TYPE_DR,
            dst_ref: DST_REF,
            src_ref: SRC_REF,
            reason: 128, // normal disconnect
        };

        Self {
            tpkt_header: TpktHeader::build(iso_len as u16),
            cotp_co_header: cotp,
        }
    }
}

impl From<IsoDisconnect> for Vec<u8> {
    fn from(control_pdu: IsoDisconnect) -> Vec<u8> {
        let mut vec = Vec::new();
        vec.append(&mut BytesMut::from(control_pdu.tpkt_header).to_vec());
        vec.append(&mut control_pdu.cotp_co_header.into());
        vec
    }
}
