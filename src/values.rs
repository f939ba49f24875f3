//! Encoding and decoding of the user-visible S7 data types.
//!
//! Each variant of [`S7Value`] owns the mapping between a host value and its
//! wire bytes. Calendar types map onto `chrono`; the Siemens-specific time
//! formats (S5TIME, DATE_AND_TIME) are BCD coded on the wire.

use bytes::{BufMut, BytesMut};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::codec::{bcd_to_byte, byte_to_bcd, read_f32, read_i16, read_i32, read_u16, read_u32, read_u8};
use crate::errors::Error;

/// Days are counted from this date in the S7 DATE format.
const DATE_EPOCH: (i32, u32, u32) = (1990, 1, 1);

/// S7 data type tags as used in the request item descriptor.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Single bit
    Bit = 1,
    /// Unsigned 8 bit
    Byte = 2,
    /// One ASCII character
    Char = 3,
    /// Unsigned 16 bit
    Word = 4,
    /// Signed 16 bit
    Int = 5,
    /// Unsigned 32 bit
    DWord = 6,
    /// Signed 32 bit
    DInt = 7,
    /// IEEE-754 32 bit float
    Real = 8,
    /// Days since 1990-01-01
    Date = 9,
    /// Milliseconds since midnight
    TimeOfDay = 10,
    /// Signed milliseconds
    Time = 11,
    /// BCD time base and count
    S5Time = 12,
    /// 8-byte BCD date and time
    DateTime = 13,
    /// Length-prefixed ASCII string
    String = 14,
    /// S7 counter (3 BCD digits)
    Counter = 28,
    /// S7 timer (S5TIME raw word)
    Timer = 29,
    /// IEC counter instance record
    IecCounter = 30,
    /// IEC timer instance record
    IecTimer = 31,
}

impl DataType {
    /// Wire size in bytes. Strings report their full read envelope
    /// (2-byte header plus 254 payload bytes); the encoded form of a
    /// concrete value is `2 + len`.
    pub fn size_bytes(self) -> usize {
        match self {
            DataType::Bit | DataType::Byte | DataType::Char => 1,
            DataType::Word
            | DataType::Int
            | DataType::Date
            | DataType::S5Time
            | DataType::Counter
            | DataType::Timer => 2,
            DataType::DWord
            | DataType::DInt
            | DataType::Real
            | DataType::TimeOfDay
            | DataType::Time => 4,
            DataType::DateTime => 8,
            DataType::String => 256,
            DataType::IecCounter => 8,
            DataType::IecTimer => 19,
        }
    }

    /// Tag used in the transport-size field of a request item descriptor.
    pub(crate) fn transport_size(self) -> u8 {
        self as u8
    }
}

/// IEC counter instance record.
///
/// Fixed 8-byte layout: each flag occupies one byte, integers are
/// big-endian.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IecCounter {
    /// Count direction, down/up
    pub c_du: bool,
    /// Load/reset request
    pub load_r: bool,
    /// Preset value
    pub pv: i16,
    /// Done flag
    pub q: bool,
    /// Current value
    pub cv: i16,
    /// Count direction output
    pub c_du_o: bool,
}

/// IEC timer instance record.
///
/// Fixed 19-byte layout; durations are signed milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IecTimer {
    /// Enable input
    pub input: bool,
    /// Preset time in milliseconds
    pub pt: i32,
    /// Done flag
    pub q: bool,
    /// Elapsed time in milliseconds
    pub et: i32,
    /// Internal state byte
    pub state: u8,
    /// Start time in milliseconds
    pub stime: i32,
    /// Accumulated time in milliseconds
    pub atime: i32,
}

/// A decoded PLC value.
#[derive(Debug, Clone, PartialEq)]
pub enum S7Value {
    /// Single bit
    Bit(bool),
    /// Unsigned 8 bit
    Byte(u8),
    /// One ASCII character
    Char(char),
    /// Unsigned 16 bit
    Word(u16),
    /// Signed 16 bit
    Int(i16),
    /// Unsigned 32 bit
    DWord(u32),
    /// Signed 32 bit
    DInt(i32),
    /// 32-bit float
    Real(f32),
    /// Calendar date
    Date(NaiveDate),
    /// Time of day
    TimeOfDay(NaiveTime),
    /// Signed duration with millisecond resolution
    Time(Duration),
    /// S5 timer duration
    S5Time(Duration),
    /// Date and time of day
    DateTime(NaiveDateTime),
    /// ASCII string, at most 254 bytes
    String(String),
    /// Counter value 0..=999
    Counter(u16),
    /// Timer duration (S5TIME raw word)
    Timer(Duration),
    /// IEC counter record
    IecCounter(IecCounter),
    /// IEC timer record
    IecTimer(IecTimer),
}

impl S7Value {
    /// The data type tag this value encodes as.
    pub fn datatype(&self) -> DataType {
        match self {
            S7Value::Bit(_) => DataType::Bit,
            S7Value::Byte(_) => DataType::Byte,
            S7Value::Char(_) => DataType::Char,
            S7Value::Word(_) => DataType::Word,
            S7Value::Int(_) => DataType::Int,
            S7Value::DWord(_) => DataType::DWord,
            S7Value::DInt(_) => DataType::DInt,
            S7Value::Real(_) => DataType::Real,
            S7Value::Date(_) => DataType::Date,
            S7Value::TimeOfDay(_) => DataType::TimeOfDay,
            S7Value::Time(_) => DataType::Time,
            S7Value::S5Time(_) => DataType::S5Time,
            S7Value::DateTime(_) => DataType::DateTime,
            S7Value::String(_) => DataType::String,
            S7Value::Counter(_) => DataType::Counter,
            S7Value::Timer(_) => DataType::Timer,
            S7Value::IecCounter(_) => DataType::IecCounter,
            S7Value::IecTimer(_) => DataType::IecTimer,
        }
    }

    /// Encode the value into its wire representation.
    pub fn encode(&self) -> Result<BytesMut, Error> {
        let mut bytes = BytesMut::with_capacity(self.datatype().size_bytes().min(32));
        match self {
            S7Value::Bit(v) => bytes.put_u8(u8::from(*v)),
            S7Value::Byte(v) => bytes.put_u8(*v),
            S7Value::Char(c) => {
                let code = u32::from(*c);
                if code > 0xFF {
                    return Err(Error::Range(format!("'{c}' is not an 8-bit character")));
                }
                bytes.put_u8(code as u8);
            }
            S7Value::Word(v) => bytes.put_u16(*v),
            S7Value::Int(v) => bytes.put_i16(*v),
            S7Value::DWord(v) => bytes.put_u32(*v),
            S7Value::DInt(v) => bytes.put_i32(*v),
            S7Value::Real(v) => bytes.put_u32(v.to_bits()),
            S7Value::Date(d) => bytes.put_u16(encode_date(*d)?),
            S7Value::TimeOfDay(t) => bytes.put_u32(encode_time_of_day(*t)),
            S7Value::Time(dur) => {
                let ms = dur.num_milliseconds();
                let ms = i32::try_from(ms)
                    .map_err(|_| Error::Range(format!("TIME of {ms} ms overflows 32 bit")))?;
                bytes.put_i32(ms);
            }
            S7Value::S5Time(dur) => bytes.put_u16(encode_s5time(*dur)?),
            S7Value::DateTime(dt) => bytes.extend_from_slice(&encode_datetime(*dt)?),
            S7Value::String(s) => {
                if s.len() > 254 {
                    return Err(Error::Range(format!(
                        "string of {} bytes exceeds the 254 byte maximum",
                        s.len()
                    )));
                }
                if !s.is_ascii() {
                    return Err(Error::Range("string contains non-ASCII characters".to_string()));
                }
                bytes.put_u8(254);
                bytes.put_u8(s.len() as u8);
                bytes.extend_from_slice(s.as_bytes());
            }
            S7Value::Counter(v) => bytes.put_u16(encode_counter(*v)?),
            S7Value::Timer(dur) => bytes.put_u16(encode_s5time(*dur)?),
            S7Value::IecCounter(c) => {
                bytes.put_u8(u8::from(c.c_du));
                bytes.put_u8(u8::from(c.load_r));
                bytes.put_i16(c.pv);
                bytes.put_u8(u8::from(c.q));
                bytes.put_i16(c.cv);
                bytes.put_u8(u8::from(c.c_du_o));
            }
            S7Value::IecTimer(t) => {
                bytes.put_u8(u8::from(t.input));
                bytes.put_i32(t.pt);
                bytes.put_u8(u8::from(t.q));
                bytes.put_i32(t.et);
                bytes.put_u8(t.state);
                bytes.put_i32(t.stime);
                bytes.put_i32(t.atime);
            }
        }
        Ok(bytes)
    }

    /// Decode a value of the given type from the start of `buf`.
    pub fn decode(datatype: DataType, buf: &[u8]) -> Result<S7Value, Error> {
        Ok(match datatype {
            DataType::Bit => S7Value::Bit(read_u8(buf, 0)? != 0),
            DataType::Byte => S7Value::Byte(read_u8(buf, 0)?),
            DataType::Char => S7Value::Char(read_u8(buf, 0)? as char),
            DataType::Word => S7Value::Word(read_u16(buf, 0)?),
            DataType::Int => S7Value::Int(read_i16(buf, 0)?),
            DataType::DWord => S7Value::DWord(read_u32(buf, 0)?),
            DataType::DInt => S7Value::DInt(read_i32(buf, 0)?),
            DataType::Real => S7Value::Real(read_f32(buf, 0)?),
            DataType::Date => S7Value::Date(decode_date(read_u16(buf, 0)?)),
            DataType::TimeOfDay => S7Value::TimeOfDay(decode_time_of_day(read_u32(buf, 0)?)?),
            DataType::Time => S7Value::Time(Duration::milliseconds(i64::from(read_i32(buf, 0)?))),
            DataType::S5Time => S7Value::S5Time(decode_s5time(read_u16(buf, 0)?)),
            DataType::DateTime => S7Value::DateTime(decode_datetime(buf)?),
            DataType::String => {
                let len = usize::from(read_u8(buf, 1)?);
                let text = (0..len)
                    .map(|i| read_u8(buf, 2 + i).map(|b| b as char))
                    .collect::<Result<String, Error>>()?;
                S7Value::String(text)
            }
            DataType::Counter => S7Value::Counter(decode_counter(read_u16(buf, 0)?)?),
            DataType::Timer => S7Value::Timer(decode_s5time(read_u16(buf, 0)?)),
            DataType::IecCounter => S7Value::IecCounter(IecCounter {
                c_du: read_u8(buf, 0)? != 0,
                load_r: read_u8(buf, 1)? != 0,
                pv: read_i16(buf, 2)?,
                q: read_u8(buf, 4)? != 0,
                cv: read_i16(buf, 5)?,
                c_du_o: read_u8(buf, 7)? != 0,
            }),
            DataType::IecTimer => S7Value::IecTimer(IecTimer {
                input: read_u8(buf, 0)? != 0,
                pt: read_i32(buf, 1)?,
                q: read_u8(buf, 5)? != 0,
                et: read_i32(buf, 6)?,
                state: read_u8(buf, 10)?,
                stime: read_i32(buf, 11)?,
                atime: read_i32(buf, 15)?,
            }),
        })
    }
}

fn date_epoch() -> NaiveDate {
    let (y, m, d) = DATE_EPOCH;
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn encode_date(date: NaiveDate) -> Result<u16, Error> {
    let days = (date - date_epoch()).num_days();
    u16::try_from(days)
        .map_err(|_| Error::Range(format!("{date} is outside the DATE range from 1990-01-01")))
}

fn decode_date(days: u16) -> NaiveDate {
    date_epoch() + Duration::days(i64::from(days))
}

fn encode_time_of_day(time: NaiveTime) -> u32 {
    time.num_seconds_from_midnight() * 1000 + time.nanosecond() / 1_000_000
}

fn decode_time_of_day(millis: u32) -> Result<NaiveTime, Error> {
    if millis > 86_399_999 {
        return Err(Error::Range(format!(
            "TIME_OF_DAY of {millis} ms exceeds one day"
        )));
    }
    NaiveTime::from_num_seconds_from_midnight_opt(millis / 1000, (millis % 1000) * 1_000_000)
        .ok_or_else(|| Error::Range(format!("TIME_OF_DAY of {millis} ms is invalid")))
}

/// S5TIME time bases in milliseconds, indexed by the base code.
const S5TIME_BASES: [u32; 4] = [10, 100, 1_000, 10_000];

fn encode_s5time(dur: Duration) -> Result<u16, Error> {
    let ms = dur.num_milliseconds();
    if !(10..=9_990_000).contains(&ms) {
        return Err(Error::Range(format!(
            "S5TIME of {ms} ms is outside 10..=9990000"
        )));
    }
    let ms = ms as u32;
    // the range check guarantees ms / 10s < 1000, so the search cannot miss
    let (code, base) = S5TIME_BASES
        .iter()
        .enumerate()
        .find(|(_, &base)| ms / base < 1000)
        .map_or((3, 10_000), |(code, &base)| (code as u16, base));
    let units = ms / base;
    let bcd = u16::from(byte_to_bcd((units / 100) as u8)) << 8
        | u16::from(byte_to_bcd((units % 100) as u8));
    Ok(code << 12 | bcd)
}

fn decode_s5time(raw: u16) -> Duration {
    let base = S5TIME_BASES[usize::from(raw >> 12) & 0x03];
    let units = u32::from(bcd_to_byte(((raw >> 8) & 0x0F) as u8)) * 100
        + u32::from(bcd_to_byte((raw & 0xFF) as u8));
    Duration::milliseconds(i64::from(units * base))
}

fn encode_datetime(dt: NaiveDateTime) -> Result<[u8; 8], Error> {
    let year = dt.year();
    if !(1990..=2089).contains(&year) {
        return Err(Error::Range(format!(
            "DATE_AND_TIME year {year} is outside 1990..=2089"
        )));
    }
    let millis = dt.and_utc().timestamp_subsec_millis();
    // weekday byte: 1 = Sunday .. 7 = Saturday, packed with the last
    // millisecond digit
    let weekday = dt.weekday().num_days_from_sunday() as u8 + 1;
    Ok([
        byte_to_bcd((year % 100) as u8),
        byte_to_bcd(dt.month() as u8),
        byte_to_bcd(dt.day() as u8),
        byte_to_bcd(dt.hour() as u8),
        byte_to_bcd(dt.minute() as u8),
        byte_to_bcd(dt.second() as u8),
        byte_to_bcd((millis / 10) as u8),
        byte_to_bcd(((millis % 10) * 10) as u8 + weekday),
    ])
}

pub(crate) fn decode_datetime(buf: &[u8]) -> Result<NaiveDateTime, Error> {
    if buf.len() < 8 {
        return Err(Error::ShortBuffer {
            needed: 8,
            available: buf.len(),
        });
    }
    let yy = i32::from(bcd_to_byte(buf[0]));
    let year = if yy < 90 { 2000 + yy } else { 1900 + yy };
    let millis = u32::from(bcd_to_byte(buf[6])) * 10 + u32::from(bcd_to_byte(buf[7])) / 10;
    NaiveDate::from_ymd_opt(year, u32::from(bcd_to_byte(buf[1])), u32::from(bcd_to_byte(buf[2])))
        .and_then(|date| {
            date.and_hms_milli_opt(
                u32::from(bcd_to_byte(buf[3])),
                u32::from(bcd_to_byte(buf[4])),
                u32::from(bcd_to_byte(buf[5])),
                millis,
            )
        })
        .ok_or_else(|| Error::Range("DATE_AND_TIME bytes do not form a valid date".to_string()))
}

fn encode_counter(value: u16) -> Result<u16, Error> {
    if value > 999 {
        return Err(Error::Range(format!("counter value {value} exceeds 999")));
    }
    Ok(u16::from(byte_to_bcd((value / 100) as u8)) << 8
        | u16::from(byte_to_bcd((value % 100) as u8)))
}

fn decode_counter(raw: u16) -> Result<u16, Error> {
    let hundreds = (raw >> 8) & 0x0F;
    let tens = (raw >> 4) & 0x0F;
    let units = raw & 0x0F;
    if hundreds > 9 || tens > 9 || units > 9 {
        return Err(Error::Range(format!("0x{raw:04X} is not a BCD counter value")));
    }
    Ok(hundreds * 100 + tens * 10 + units)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: S7Value) {
        let encoded = value.encode().unwrap();
        let decoded = S7Value::decode(value.datatype(), &encoded).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn scalar_roundtrips() {
        roundtrip(S7Value::Bit(true));
        roundtrip(S7Value::Bit(false));
        roundtrip(S7Value::Byte(0xAB));
        roundtrip(S7Value::Char('T'));
        roundtrip(S7Value::Word(0xBEEF));
        roundtrip(S7Value::Int(-12345));
        roundtrip(S7Value::DWord(0xDEAD_BEEF));
        roundtrip(S7Value::DInt(-7_654_321));
        roundtrip(S7Value::Real(6.6));
        roundtrip(S7Value::Time(Duration::milliseconds(-86_400_000)));
        roundtrip(S7Value::Counter(999));
        roundtrip(S7Value::String("Hello World".to_string()));
    }

    #[test]
    fn calendar_roundtrips() {
        roundtrip(S7Value::Date(NaiveDate::from_ymd_opt(2022, 9, 8).unwrap()));
        roundtrip(S7Value::TimeOfDay(
            NaiveTime::from_hms_milli_opt(17, 7, 25, 380).unwrap(),
        ));
        roundtrip(S7Value::DateTime(
            NaiveDate::from_ymd_opt(2022, 9, 8)
                .unwrap()
                .and_hms_milli_opt(17, 7, 25, 380)
                .unwrap(),
        ));
        roundtrip(S7Value::S5Time(Duration::milliseconds(1_230)));
    }

    #[test]
    fn record_roundtrips() {
        roundtrip(S7Value::IecCounter(IecCounter {
            c_du: true,
            load_r: false,
            pv: 100,
            q: true,
            cv: 42,
            c_du_o: false,
        }));
        roundtrip(S7Value::IecTimer(IecTimer {
            input: true,
            pt: 5_000,
            q: false,
            et: 1_250,
            state: 3,
            stime: 0,
            atime: 7_500,
        }));
    }

    #[test]
    fn encoded_sizes_match_declared_sizes() {
        for value in [
            S7Value::Bit(true),
            S7Value::Byte(1),
            S7Value::Char('A'),
            S7Value::Word(1),
            S7Value::Int(1),
            S7Value::DWord(1),
            S7Value::DInt(1),
            S7Value::Real(1.0),
            S7Value::Date(NaiveDate::from_ymd_opt(1995, 6, 1).unwrap()),
            S7Value::TimeOfDay(NaiveTime::from_hms_opt(1, 2, 3).unwrap()),
            S7Value::Time(Duration::milliseconds(1)),
            S7Value::S5Time(Duration::milliseconds(500)),
            S7Value::DateTime(
                NaiveDate::from_ymd_opt(2001, 2, 3)
                    .unwrap()
                    .and_hms_opt(4, 5, 6)
                    .unwrap(),
            ),
            S7Value::Counter(1),
            S7Value::Timer(Duration::milliseconds(100)),
            S7Value::IecCounter(IecCounter::default()),
            S7Value::IecTimer(IecTimer::default()),
        ] {
            assert_eq!(
                value.encode().unwrap().len(),
                value.datatype().size_bytes(),
                "size of {:?}",
                value.datatype()
            );
        }
        // variable: 2-byte header plus content
        assert_eq!(
            S7Value::String("Hello World".to_string())
                .encode()
                .unwrap()
                .len(),
            2 + 11
        );
    }

    #[test]
    fn char_and_string_wire_bytes() {
        assert_eq!(S7Value::Char('T').encode().unwrap().as_ref(), [0x54]);
        let encoded = S7Value::String("Hello World".to_string()).encode().unwrap();
        assert_eq!(&encoded[..4], [0xFE, 0x0B, 0x48, 0x65]);
    }

    #[test]
    fn s5time_boundaries() {
        // 10 ms is the smallest legal value: base 0, one unit
        assert_eq!(
            encode_s5time(Duration::milliseconds(10)).unwrap(),
            0x0001
        );
        // 9_990_000 ms is the largest: base 3 (10 s), 999 units in BCD
        assert_eq!(
            encode_s5time(Duration::milliseconds(9_990_000)).unwrap(),
            0x3999
        );
        assert_eq!(decode_s5time(0x3999), Duration::milliseconds(9_990_000));
        // out of range on both sides, including the sub-10 ms gap
        assert!(encode_s5time(Duration::milliseconds(9)).is_err());
        assert!(encode_s5time(Duration::milliseconds(0)).is_err());
        assert!(encode_s5time(Duration::milliseconds(9_990_001)).is_err());
    }

    #[test]
    fn date_epoch_boundaries() {
        assert_eq!(
            encode_date(NaiveDate::from_ymd_opt(1990, 1, 1).unwrap()).unwrap(),
            0
        );
        // 1990 is not a leap year
        assert_eq!(
            encode_date(NaiveDate::from_ymd_opt(1991, 1, 1).unwrap()).unwrap(),
            365
        );
        assert!(encode_date(NaiveDate::from_ymd_opt(1989, 12, 31).unwrap()).is_err());
    }

    #[test]
    fn datetime_century_split() {
        // year byte < 90 decodes into the 2000s, >= 90 into the 1900s
        let buf = [0x22, 0x09, 0x08, 0x17, 0x07, 0x25, 0x38, 0x04];
        let dt = decode_datetime(&buf).unwrap();
        assert_eq!(
            dt,
            NaiveDate::from_ymd_opt(2022, 9, 8)
                .unwrap()
                .and_hms_milli_opt(17, 7, 25, 380)
                .unwrap()
        );

        let buf = [0x95, 0x01, 0x02, 0x00, 0x00, 0x00, 0x00, 0x01];
        assert_eq!(
            decode_datetime(&buf).unwrap(),
            NaiveDate::from_ymd_opt(1995, 1, 2)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        );
    }

    #[test]
    fn time_of_day_range() {
        assert!(decode_time_of_day(86_399_999).is_ok());
        assert!(decode_time_of_day(86_400_000).is_err());
    }

    #[test]
    fn counter_is_bcd() {
        assert_eq!(encode_counter(123).unwrap(), 0x0123);
        assert_eq!(decode_counter(0x0999).unwrap(), 999);
        assert!(encode_counter(1000).is_err());
        assert!(decode_counter(0x0A00).is_err());
    }
}
