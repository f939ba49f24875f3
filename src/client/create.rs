use std::convert::TryFrom;
use std::time::Duration;

use bytes::BytesMut;
use tokio::{net::TcpStream, time::timeout};
use tracing::{debug, warn};

use crate::connection::iso::ConnectionType;
use crate::connection::tcp::{connect, disconnect, exchange_buffer};
use crate::errors::Error;
use crate::s7_protocol::header::S7ProtocolHeader;
use crate::s7_protocol::negotiate::{NegotiatePDUParameters, S7Negotiation};

// Default ISO-on-TCP port
pub(crate) const TCP_PORT: u16 = 102;
// Default deadline for connecting and for each data exchange
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Connection parameters of a session.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Host name or IP literal of the PLC
    pub host: String,
    /// ISO-on-TCP port, 102 unless the device is port-forwarded
    pub port: u16,
    /// Rack of the CPU module, 0..=15
    pub rack: u8,
    /// Slot of the CPU module, 0..=31
    pub slot: u8,
    /// How the connection registers with the CPU
    pub connection_type: ConnectionType,
    /// Deadline applied to connecting and to every request/response pair
    pub timeout: Duration,
}

impl ConnectionConfig {
    /// Configuration with the defaults of the S7 world: port 102, rack 0,
    /// slot 0, a PG connection and a five second deadline.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: TCP_PORT,
            rack: 0,
            slot: 0,
            connection_type: ConnectionType::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    fn validate(&self) -> Result<(), Error> {
        if self.rack > 15 {
            return Err(Error::Range(format!("rack {} is outside 0..=15", self.rack)));
        }
        if self.slot > 31 {
            return Err(Error::Range(format!("slot {} is outside 0..=31", self.slot)));
        }
        Ok(())
    }
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionState {
    /// Handshake complete, operations may be issued
    Ready,
    /// A fatal transport or protocol error occurred; the stream is dead
    Faulted,
    /// Closed by the caller
    Closed,
}

/// Session with an S7 PLC.
///
/// One session owns one TCP connection and is driven by a single caller at
/// a time; callers needing concurrency open multiple sessions or use an
/// [`S7Pool`](crate::S7Pool).
#[derive(Debug)]
pub struct S7Client {
    pub(crate) connection: TcpStream,
    config: ConnectionConfig,
    pdu_length: u16,
    pdu_reference: u16,
    // How many unacknowledged requests the peer accepts from us and
    // expects us to accept; informational for this single-request client.
    pub(crate) max_amq_caller: u16,
    pub(crate) max_amq_callee: u16,
    state: SessionState,
}

impl S7Client {
    /// Open a session: TCP connect, COTP connect-request/confirm, then S7
    /// PDU-size negotiation.
    ///
    /// ```no_run
    /// # tokio_test::block_on(async {
    /// use step7::{ConnectionConfig, S7Client};
    ///
    /// let mut client = S7Client::connect(ConnectionConfig::new("192.168.10.72")).await?;
    /// # Ok::<(), step7::errors::Error>(())
    /// # });
    /// ```
    /// # Errors
    ///
    /// Will return `Error` if the TCP connection, the COTP handshake or the
    /// PDU negotiation fails; no session is left half-open.
    pub async fn connect(config: ConnectionConfig) -> Result<Self, Error> {
        config.validate()?;

        let address = format!("{}:{}", config.host, config.port);
        let tcp_client = match timeout(config.timeout, TcpStream::connect(&address)).await {
            Ok(connection) => connection?,
            Err(_) => return Err(Error::Timeout),
        };

        let mut client = Self {
            connection: tcp_client,
            config,
            pdu_length: 0,
            pdu_reference: 0,
            max_amq_caller: 0,
            max_amq_callee: 0,
            state: SessionState::Faulted,
        };

        connect(
            &mut client.connection,
            client.config.connection_type,
            client.config.rack,
            client.config.slot,
            client.config.timeout,
        )
        .await?;
        client.negotiate().await?;
        client.state = SessionState::Ready;
        debug!(
            host = %client.config.host,
            pdu_length = client.pdu_length,
            "session ready"
        );

        Ok(client)
    }

    /// Negotiate the PDU size used for every subsequent request.
    async fn negotiate(&mut self) -> Result<(), Error> {
        let request = BytesMut::from(S7Negotiation::build(&mut self.pdu_reference)?);
        let mut response =
            exchange_buffer(&mut self.connection, request, self.config.timeout).await?;

        let header = S7ProtocolHeader::try_from(&mut response)?;
        header
            .is_ack_with_data()?
            .is_current_pdu_response(self.pdu_reference)?;
        if let Some(Error::S7 { class, code }) = header.to_error() {
            return Err(Error::Negotiation(format!(
                "setup communication rejected with class 0x{class:02X}, code 0x{code:02X}"
            )));
        }

        let params = NegotiatePDUParameters::try_from(&mut response)?;
        self.pdu_length = params.negotiated_pdu_length()?;
        self.max_amq_caller = params.max_amq_caller;
        self.max_amq_callee = params.max_amq_callee;
        Ok(())
    }

    /// Gracefully disconnect from the PLC.
    ///
    /// # Errors
    ///
    /// Will return `Error` if the COTP disconnect was not confirmed; the
    /// session counts as closed regardless.
    pub async fn close(&mut self) -> Result<(), Error> {
        let result = match self.state {
            SessionState::Ready => {
                disconnect(&mut self.connection, self.config.timeout).await
            }
            _ => Ok(()),
        };
        self.state = SessionState::Closed;
        result
    }

    /// Negotiated PDU size in bytes.
    pub fn pdu_length(&self) -> u16 {
        self.pdu_length
    }

    /// Whether the session is ready for operations.
    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Ready
    }

    pub(crate) fn pdu_reference(&mut self) -> &mut u16 {
        &mut self.pdu_reference
    }

    /// Send one request PDU and await its response, faulting the session on
    /// fatal errors so no further operation reuses a broken stream.
    pub(crate) async fn exchange(&mut self, request: BytesMut) -> Result<BytesMut, Error> {
        if self.state != SessionState::Ready {
            return Err(Error::NotConnected);
        }
        let response =
            match exchange_buffer(&mut self.connection, request, self.config.timeout).await {
                Ok(response) => response,
                Err(error) => {
                    if error.is_fatal() {
                        warn!(%error, "session faulted");
                        self.state = SessionState::Faulted;
                    }
                    return Err(error);
                }
            };

        // correlate before handing out: a response to a different reference
        // means the stream can no longer be trusted
        if response.len() >= 6 {
            let reference = u16::from_be_bytes([response[4], response[5]]);
            if reference != self.pdu_reference {
                warn!(
                    expected = self.pdu_reference,
                    received = reference,
                    "PDU reference mismatch, session faulted"
                );
                self.state = SessionState::Faulted;
                return Err(Error::Desync {
                    expected: self.pdu_reference,
                    received: reference,
                });
            }
        }
        Ok(response)
    }
}
