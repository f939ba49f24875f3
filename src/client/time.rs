use chrono::{Local, NaiveDateTime, Utc};

use super::create::S7Client;
use crate::errors::Error;
use crate::s7_protocol::userdata::{build_clock_read, build_clock_set, parse_userdata_response};
use crate::values::decode_datetime;

/// *Methods for the PLC realtime clock*
impl S7Client {
    /// Read the device clock.
    ///
    /// # Errors
    ///
    /// Will return `Error` if the session is not connected, the device
    /// rejected the request or the clock payload is malformed.
    pub async fn read_plc_time(&mut self) -> Result<NaiveDateTime, Error> {
        let request = build_clock_read(self.pdu_reference())?;
        let response = self.exchange(request).await?;
        let response = parse_userdata_response(response, *self.pdu_reference())?;

        // payload: reserved byte, BCD century, then the 8-byte image
        if response.payload.len() < 10 {
            return Err(Error::Protocol(format!(
                "clock payload of {} bytes too short",
                response.payload.len()
            )));
        }
        decode_datetime(&response.payload[2..10])
    }

    /// Set the device clock to the given timestamp, which is echoed back on
    /// success.
    ///
    /// # Errors
    ///
    /// Will return `Error` if the session is not connected or the device
    /// rejected the request.
    pub async fn set_plc_time(&mut self, timestamp: NaiveDateTime) -> Result<NaiveDateTime, Error> {
        let request = build_clock_set(self.pdu_reference(), timestamp)?;
        let response = self.exchange(request).await?;
        parse_userdata_response(response, *self.pdu_reference())?;
        Ok(timestamp)
    }

    /// Set the device clock from the host clock, in UTC or local time.
    ///
    /// # Errors
    ///
    /// Will return `Error` if the session is not connected or the device
    /// rejected the request.
    pub async fn sync_plc_time(&mut self, utc: bool) -> Result<NaiveDateTime, Error> {
        let now = if utc {
            Utc::now().naive_utc()
        } else {
            Local::now().naive_local()
        };
        self.set_plc_time(now).await
    }
}
