//! The transport half of a session: one byte stream, its request-id counter
//! and its lifecycle state.

use std::io::{Read, Write};

use tracing::debug;

use crate::link::error::{LinkError, LinkState};
use crate::protocol::frame::{read_packet, write_packet};
use crate::protocol::messages::{Event, Packet, Request, Response};
use crate::protocol::sequence::RequestIdCounter;

/// Exclusive owner of a session's byte stream.
///
/// Any transport or decoding failure moves the channel to
/// [`LinkState::Closed`]; every later send or receive then fails with
/// [`LinkError::ConnectionClosed`] without touching the stream.
#[derive(Debug)]
pub struct Channel<S> {
    stream: S,
    request_ids: RequestIdCounter,
    state: LinkState,
}

impl<S: Read + Write> Channel<S> {
    /// Wraps a connected stream. The channel starts in `Connecting`.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            request_ids: RequestIdCounter::new(),
            state: LinkState::Connecting,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Moves a `Connecting` channel to `Ready`. Has no effect once closed.
    pub fn mark_ready(&mut self) {
        if self.state == LinkState::Connecting {
            self.state = LinkState::Ready;
        }
    }

    pub fn close(&mut self) {
        if self.state != LinkState::Closed {
            debug!(from = %self.state, "channel closed");
            self.state = LinkState::Closed;
        }
    }

    /// Fails with [`LinkError::NotReady`] unless the channel is `Ready`.
    pub fn ensure_ready(&self) -> Result<(), LinkError> {
        match self.state {
            LinkState::Ready => Ok(()),
            state => Err(LinkError::NotReady(state)),
        }
    }

    /// Id the next request will carry.
    pub fn next_request_id(&self) -> u32 {
        self.request_ids.peek()
    }

    /// Reads the next packet, closing the channel on any failure.
    pub fn recv(&mut self) -> Result<Packet, LinkError> {
        if self.state == LinkState::Closed {
            return Err(LinkError::ConnectionClosed);
        }
        match read_packet(&mut self.stream) {
            Ok(packet) => {
                debug!(kind = ?packet.outer_kind(), "received packet");
                Ok(packet)
            }
            Err(e) => {
                self.close();
                Err(e)
            }
        }
    }

    /// Writes one packet.
    ///
    /// Encoding errors leave the channel open because nothing reached the
    /// stream; transport errors close it.
    pub fn send(&mut self, packet: &Packet) -> Result<(), LinkError> {
        if self.state == LinkState::Closed {
            return Err(LinkError::ConnectionClosed);
        }
        match write_packet(&mut self.stream, packet) {
            Ok(()) => {
                debug!(kind = ?packet.outer_kind(), "sent packet");
                Ok(())
            }
            Err(e @ LinkError::Malformed(_)) => Err(e),
            Err(e) => {
                self.close();
                Err(e)
            }
        }
    }

    pub fn send_event(&mut self, event: Event) -> Result<(), LinkError> {
        self.send(&Packet::Event(event))
    }

    /// Allocates a fresh request id, sends the request and returns the id.
    pub fn send_request(&mut self, request: Request) -> Result<u32, LinkError> {
        let request_id = self.request_ids.next();
        self.send(&Packet::Request {
            request_id,
            request,
        })?;
        Ok(request_id)
    }

    pub fn send_response(&mut self, request_id: u32, response: Response) -> Result<(), LinkError> {
        self.send(&Packet::Response {
            request_id,
            response,
        })
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::mock::ScriptedStream;
    use crate::protocol::messages::Response;

    #[test]
    fn test_new_channel_is_connecting() {
        let channel = Channel::new(ScriptedStream::new());
        assert_eq!(channel.state(), LinkState::Connecting);
        assert!(matches!(channel.ensure_ready(), Err(LinkError::NotReady(LinkState::Connecting))));
    }

    #[test]
    fn test_send_request_allocates_sequential_ids() {
        // Arrange
        let mut channel = Channel::new(ScriptedStream::new());

        // Act
        let first = channel.send_request(Request::GetTime).unwrap();
        let second = channel.send_request(Request::Init).unwrap();

        // Assert
        assert_eq!((first, second), (0, 1));
        let sent = channel.get_ref().sent_packets();
        assert_eq!(
            sent,
            vec![
                Packet::Request { request_id: 0, request: Request::GetTime },
                Packet::Request { request_id: 1, request: Request::Init },
            ]
        );
    }

    #[test]
    fn test_recv_failure_closes_channel() {
        // Arrange – a truncated packet
        let mut stream = ScriptedStream::new();
        stream.push_raw(&[20, 0, 0, 0, 2, 0]);
        let mut channel = Channel::new(stream);
        channel.mark_ready();

        // Act
        let result = channel.recv();

        // Assert
        assert!(matches!(result, Err(LinkError::Truncated { .. })));
        assert_eq!(channel.state(), LinkState::Closed);
        assert!(matches!(channel.send_event(Event::Exit), Err(LinkError::ConnectionClosed)));
    }

    #[test]
    fn test_recv_on_closed_channel_does_not_read() {
        let mut stream = ScriptedStream::new();
        stream.push_packet(&Packet::Response { request_id: 0, response: Response::ok() });
        let mut channel = Channel::new(stream);

        channel.close();

        assert!(matches!(channel.recv(), Err(LinkError::ConnectionClosed)));
        assert_eq!(channel.get_ref().unread(), channel.get_ref().inbound_len());
    }

    #[test]
    fn test_mark_ready_does_not_reopen_closed_channel() {
        let mut channel = Channel::new(ScriptedStream::new());
        channel.close();
        channel.mark_ready();
        assert_eq!(channel.state(), LinkState::Closed);
    }
}
