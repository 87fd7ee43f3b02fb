//! Inbound dispatcher: routes the master's requests and events to the
//! peripheral and turns callback outcomes into protocol responses.
//!
//! Callback-level failures (missing handler, oversized access, rejected
//! access) become `Error{1}` and leave the session open. Only a fatal link
//! error raised by a nested bus call escapes as `Err`.

use buslink_core::protocol::messages::{Request, Response, TimerEvent, MAX_ACCESS_SIZE};
use buslink_core::LinkError;
use tracing::{debug, warn};

use crate::application::peripheral::{CallbackError, DeviceBus, ExitReason, Peripheral, TimerCallback};

/// Handles one inbound request and returns the response to send.
pub fn dispatch_request(
    peripheral: &dyn Peripheral,
    bus: &mut dyn DeviceBus,
    request: Request,
) -> Result<Response, LinkError> {
    match request {
        Request::Read { address, length } => {
            if length as usize > MAX_ACCESS_SIZE {
                warn!(address, length, "read wider than 4 bytes rejected");
                return Ok(Response::failed());
            }
            let outcome = peripheral.read(bus, address, length).map(|value| {
                let bytes = value.to_le_bytes();
                Response::Data(bytes[..length as usize].to_vec())
            });
            reply("read", outcome)
        }
        Request::Write { address, data } => {
            if data.len() > MAX_ACCESS_SIZE {
                warn!(address, length = data.len(), "write wider than 4 bytes rejected");
                return Ok(Response::failed());
            }
            let outcome = peripheral.write(bus, address, &data).map(|()| Response::ok());
            reply("write", outcome)
        }
        Request::Init => reply("init", peripheral.init(bus).map(|()| Response::ok())),
        Request::Reset => reply("reset", peripheral.reset(bus).map(|()| Response::ok())),
        other @ (Request::Register(_) | Request::GetTime) => {
            warn!(kind = ?other.kind(), "master sent a device-to-master request");
            Ok(Response::failed())
        }
    }
}

/// Handles `Exit` and `Shutdown`. A peripheral without an exit handler
/// ignores them.
pub fn dispatch_exit(
    peripheral: &dyn Peripheral,
    bus: &mut dyn DeviceBus,
    reason: ExitReason,
) -> Result<(), LinkError> {
    match peripheral.exit(bus, reason) {
        Ok(()) => Ok(()),
        Err(CallbackError::Missing) => {
            debug!(?reason, "no exit handler, ignoring");
            Ok(())
        }
        Err(e) => settle("exit", e),
    }
}

/// Runs the callback that was registered for `event`.
///
/// # Errors
///
/// Returns [`LinkError::InvalidCallback`] when the token matched nothing in
/// the session's table (the caller passes `None`). The error is not fatal.
pub fn fire_timer(
    callback: Option<TimerCallback>,
    bus: &mut dyn DeviceBus,
    event: TimerEvent,
) -> Result<(), LinkError> {
    let Some(callback) = callback else {
        return Err(LinkError::InvalidCallback(event.callback_token.0));
    };
    debug!(token = event.callback_token.0, event_id = event.event_id, "timer fired");
    match callback(bus, event) {
        Ok(()) => Ok(()),
        Err(e) => settle("timer", e),
    }
}

fn reply(op: &'static str, outcome: Result<Response, CallbackError>) -> Result<Response, LinkError> {
    match outcome {
        Ok(response) => Ok(response),
        Err(e) => settle(op, e).map(|()| Response::failed()),
    }
}

/// Swallows recoverable callback failures after logging them.
fn settle(op: &'static str, error: CallbackError) -> Result<(), LinkError> {
    match error {
        CallbackError::Missing => {
            warn!(op, "{}", LinkError::CallbackMissing(op));
            Ok(())
        }
        CallbackError::Rejected(reason) => {
            debug!(op, %reason, "peripheral rejected access");
            Ok(())
        }
        CallbackError::Link(e) if e.is_fatal() => Err(e),
        CallbackError::Link(e) => {
            warn!(op, error = %e, "nested bus call failed");
            Ok(())
        }
    }
}
