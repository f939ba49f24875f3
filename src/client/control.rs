use tracing::debug;

use super::create::S7Client;
use crate::errors::Error;
use crate::s7_protocol::control::{build_start, build_stop, parse_control_ack};

/// *Methods for the PLC lifecycle*
impl S7Client {
    /// Request a transition to STOP mode. Returns `true` once the device is
    /// stopped; a device already in STOP is left untouched.
    ///
    /// # Errors
    ///
    /// Will return `Error` if the session is not connected or the device
    /// rejected the request.
    pub async fn stop(&mut self) -> Result<bool, Error> {
        let status = self.read_cpu_status().await?;
        if status.requested_mode == "Stop" {
            return Ok(true);
        }

        debug!("requesting PLC stop");
        let request = build_stop(self.pdu_reference())?;
        let response = self.exchange(request).await?;
        match parse_control_ack(response, *self.pdu_reference()) {
            Ok(()) => Ok(true),
            Err(Error::S7 { .. }) => Ok(false),
            Err(error) => Err(error),
        }
    }

    /// Request a cold restart. Returns `true` once the device is running; a
    /// device already in RUN is left untouched.
    ///
    /// # Errors
    ///
    /// Will return `Error` if the session is not connected or the device
    /// rejected the request.
    pub async fn start_plc_cold(&mut self) -> Result<bool, Error> {
        self.start(true).await
    }

    /// Request a hot restart. Returns `true` once the device is running; a
    /// device already in RUN is left untouched.
    ///
    /// # Errors
    ///
    /// Will return `Error` if the session is not connected or the device
    /// rejected the request.
    pub async fn start_plc_hot(&mut self) -> Result<bool, Error> {
        self.start(false).await
    }

    async fn start(&mut self, cold: bool) -> Result<bool, Error> {
        let status = self.read_cpu_status().await?;
        if status.requested_mode == "Run" {
            return Ok(true);
        }

        debug!(cold, "requesting PLC start");
        let request = build_start(self.pdu_reference(), cold)?;
        let response = self.exchange(request).await?;
        match parse_control_ack(response, *self.pdu_reference()) {
            Ok(()) => Ok(true),
            Err(Error::S7 { .. }) => Ok(false),
            Err(error) => Err(error),
        }
    }
}
