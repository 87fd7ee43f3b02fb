//! Request/response correlation and the inbound run loop.
//!
//! Both roles of the link share one rule: while a request is outstanding,
//! every packet that is not its response is dispatched immediately, in
//! arrival order, before the next byte is read. Dispatching may itself issue
//! a nested request (the peer asked for something that needs a round trip
//! of its own); the nested wait runs the same loop, so the single duplex
//! stream never deadlocks.

use std::io::{Read, Write};

use tracing::{debug, warn};

use crate::link::channel::Channel;
use crate::link::error::LinkError;
use crate::protocol::messages::{Packet, Request, Response, ResponseKind, ERROR_OK};

/// One end of a bus link.
///
/// Implementors provide their [`Channel`] and a dispatcher for inbound
/// events and requests; the correlator and run loop are provided.
///
/// `dispatch` must handle recoverable conditions itself (for example by
/// answering `Error{1}`) and return `Err` only for failures that end the
/// session.
pub trait Peer {
    type Stream: Read + Write;

    fn channel(&mut self) -> &mut Channel<Self::Stream>;

    /// Routes one inbound event or request. Never receives a response.
    fn dispatch(&mut self, packet: Packet) -> Result<(), LinkError>;

    /// Sends `request` and blocks until its response arrives.
    ///
    /// Events and requests that arrive first are dispatched, in order,
    /// before this returns. A response carrying any other request id is a
    /// protocol violation: the session is closed and
    /// [`LinkError::UnexpectedResponse`] returned.
    fn send_request_and_wait(&mut self, request: Request) -> Result<Response, LinkError> {
        let kind = request.kind();
        let id = self.channel().send_request(request)?;
        debug!(?kind, request_id = id, "awaiting response");

        loop {
            match self.channel().recv()? {
                Packet::Response {
                    request_id,
                    response,
                } if request_id == id => {
                    debug!(request_id, kind = ?response.kind(), "response matched");
                    return Ok(response);
                }
                Packet::Response { request_id, .. } => {
                    warn!(expected = id, received = request_id, "mismatched response id");
                    self.channel().close();
                    return Err(LinkError::UnexpectedResponse {
                        expected: id,
                        received: request_id,
                    });
                }
                packet => self.dispatch(packet)?,
            }
        }
    }

    /// Sends `request` and expects an `Error` response.
    ///
    /// `Error{0}` is success, any other code is [`LinkError::Remote`].
    fn call_status(&mut self, request: Request) -> Result<(), LinkError> {
        match self.send_request_and_wait(request)? {
            Response::Error { code: ERROR_OK } => Ok(()),
            Response::Error { code } => Err(LinkError::Remote { code }),
            other => Err(self.unexpected_kind(ResponseKind::Error, other.kind())),
        }
    }

    /// Closes the session and builds the error for a response of the wrong kind.
    fn unexpected_kind(&mut self, expected: ResponseKind, received: ResponseKind) -> LinkError {
        warn!(?expected, ?received, "unexpected response kind");
        self.channel().close();
        LinkError::Protocol(format!("expected {expected:?} response, received {received:?}"))
    }

    /// Reads and dispatches exactly one inbound packet.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::ConnectionClosed`] when the peer has gone, a
    /// protocol error for an unsolicited response, or whatever the read or
    /// the dispatcher reported.
    fn serve_one(&mut self) -> Result<(), LinkError> {
        match self.channel().recv()? {
            Packet::Response { request_id, .. } => {
                warn!(request_id, "unsolicited response");
                self.channel().close();
                Err(LinkError::Protocol(format!(
                    "unsolicited response for request {request_id}"
                )))
            }
            packet => self.dispatch(packet),
        }
    }

    /// Serves inbound packets until the peer disconnects.
    ///
    /// Returns `Ok(())` on an orderly close; any other failure is returned
    /// as an error with the session closed.
    ///
    /// # Errors
    ///
    /// Fails with [`LinkError::NotReady`] without reading anything when the
    /// session is not `Ready`.
    fn run_loop(&mut self) -> Result<(), LinkError> {
        self.channel().ensure_ready()?;
        loop {
            match self.serve_one() {
                Ok(()) => {}
                Err(LinkError::ConnectionClosed) => {
                    debug!("peer disconnected, run loop finished");
                    self.channel().close();
                    return Ok(());
                }
                Err(e) => {
                    self.channel().close();
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::error::LinkState;
    use crate::link::mock::ScriptedStream;
    use crate::protocol::messages::{Event, IrqLevel};

    /// Records every dispatched packet and answers requests with `Error{0}`.
    struct Recorder {
        channel: Channel<ScriptedStream>,
        seen: Vec<Packet>,
    }

    impl Recorder {
        fn new(stream: ScriptedStream) -> Self {
            let mut channel = Channel::new(stream);
            channel.mark_ready();
            Self { channel, seen: Vec::new() }
        }

        fn connecting(stream: ScriptedStream) -> Self {
            Self { channel: Channel::new(stream), seen: Vec::new() }
        }
    }

    impl Peer for Recorder {
        type Stream = ScriptedStream;

        fn channel(&mut self) -> &mut Channel<ScriptedStream> {
            &mut self.channel
        }

        fn dispatch(&mut self, packet: Packet) -> Result<(), LinkError> {
            if let Packet::Request { request_id, .. } = &packet {
                self.channel.send_response(*request_id, Response::ok())?;
            }
            self.seen.push(packet);
            Ok(())
        }
    }

    fn irq(line: u8) -> Packet {
        Packet::Event(Event::SetIrq { line, level: IrqLevel::High })
    }

    #[test]
    fn test_wait_returns_matching_response_after_dispatching_interleaved_packets() {
        // Arrange
        let mut stream = ScriptedStream::new();
        stream.push_packet(&irq(1));
        stream.push_packet(&Packet::Request { request_id: 40, request: Request::Init });
        stream.push_packet(&irq(2));
        stream.push_packet(&Packet::Response { request_id: 0, response: Response::Time(77) });
        let mut peer = Recorder::new(stream);

        // Act
        let response = peer.send_request_and_wait(Request::GetTime).unwrap();

        // Assert
        assert_eq!(response, Response::Time(77));
        assert_eq!(
            peer.seen,
            vec![irq(1), Packet::Request { request_id: 40, request: Request::Init }, irq(2)]
        );
        let sent = peer.channel.get_ref().sent_packets();
        assert_eq!(
            sent,
            vec![
                Packet::Request { request_id: 0, request: Request::GetTime },
                Packet::Response { request_id: 40, response: Response::ok() },
            ]
        );
    }

    #[test]
    fn test_mismatched_response_id_is_protocol_error() {
        let mut stream = ScriptedStream::new();
        stream.push_packet(&Packet::Response { request_id: 5, response: Response::ok() });
        stream.push_packet(&Packet::Response { request_id: 0, response: Response::ok() });
        let mut peer = Recorder::new(stream);

        let result = peer.send_request_and_wait(Request::Init);

        assert!(matches!(
            result,
            Err(LinkError::UnexpectedResponse { expected: 0, received: 5 })
        ));
        assert_eq!(peer.channel.state(), LinkState::Closed);
    }

    #[test]
    fn test_connection_loss_while_waiting_propagates() {
        let mut peer = Recorder::new(ScriptedStream::new());

        let result = peer.send_request_and_wait(Request::GetTime);

        assert!(matches!(result, Err(LinkError::ConnectionClosed)));
        assert_eq!(peer.channel.state(), LinkState::Closed);
    }

    #[test]
    fn test_call_status_maps_codes() {
        let mut stream = ScriptedStream::new();
        stream.push_packet(&Packet::Response { request_id: 0, response: Response::ok() });
        stream.push_packet(&Packet::Response { request_id: 1, response: Response::Error { code: 3 } });
        let mut peer = Recorder::new(stream);

        assert!(peer.call_status(Request::Init).is_ok());
        assert!(matches!(peer.call_status(Request::Reset), Err(LinkError::Remote { code: 3 })));
        assert_eq!(peer.channel.state(), LinkState::Ready, "remote errors keep the session");
    }

    #[test]
    fn test_call_status_rejects_wrong_response_kind() {
        let mut stream = ScriptedStream::new();
        stream.push_packet(&Packet::Response { request_id: 0, response: Response::Time(1) });
        let mut peer = Recorder::new(stream);

        let result = peer.call_status(Request::Init);

        assert!(matches!(result, Err(LinkError::Protocol(_))));
        assert_eq!(peer.channel.state(), LinkState::Closed);
    }

    #[test]
    fn test_run_loop_returns_ok_on_clean_disconnect() {
        let mut stream = ScriptedStream::new();
        stream.push_packet(&irq(4));
        stream.push_packet(&Packet::Event(Event::Exit));
        let mut peer = Recorder::new(stream);

        peer.run_loop().unwrap();

        assert_eq!(peer.seen, vec![irq(4), Packet::Event(Event::Exit)]);
        assert_eq!(peer.channel.state(), LinkState::Closed);
    }

    #[test]
    fn test_run_loop_requires_ready_session() {
        // Arrange – a request is waiting but the session never became ready
        let mut stream = ScriptedStream::new();
        stream.push_packet(&Packet::Request { request_id: 7, request: Request::Init });
        let mut peer = Recorder::connecting(stream);

        // Act
        let result = peer.run_loop();

        // Assert
        assert!(matches!(result, Err(LinkError::NotReady(LinkState::Connecting))));
        assert!(peer.seen.is_empty());
        assert!(peer.channel.get_ref().sent_bytes().is_empty());
    }

    #[test]
    fn test_run_loop_reports_malformed_input() {
        let mut stream = ScriptedStream::new();
        stream.push_raw(&[6, 0, 0, 0, 0, 0x55]);
        let mut peer = Recorder::new(stream);

        assert!(matches!(peer.run_loop(), Err(LinkError::Malformed(_))));
    }

    #[test]
    fn test_run_loop_rejects_unsolicited_response() {
        let mut stream = ScriptedStream::new();
        stream.push_packet(&Packet::Response { request_id: 9, response: Response::ok() });
        let mut peer = Recorder::new(stream);

        assert!(matches!(peer.run_loop(), Err(LinkError::Protocol(_))));
    }
}
