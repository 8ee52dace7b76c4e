// Copyright (C) 2026 Brian Johnson
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Transfer session facade
//!
//! One [`Session`] owns one protocol machine and the host's event sink,
//! and forwards the whole host surface: start, byte pump, cancel and the
//! received-data queries. A session runs exactly one transfer; create a
//! new one to retry.

use crate::error::TransferError;
use crate::event::{Direction, EventSink, TransferState};
use crate::xmodem::{Xmodem, XmodemVariant};
use crate::ymodem::Ymodem;
use crate::zmodem::{self, Zmodem};

/// The five protocol variants a session can speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferProtocol {
    Xmodem,
    XmodemCrc,
    Xmodem1k,
    Ymodem,
    Zmodem,
}

enum Machine {
    Xmodem(Xmodem),
    Ymodem(Ymodem),
    Zmodem(Zmodem),
}

pub struct Session<'cb> {
    protocol: TransferProtocol,
    direction: Option<Direction>,
    machine: Machine,
    sink: Box<dyn EventSink + 'cb>,
}

impl<'cb> Session<'cb> {
    pub fn new(protocol: TransferProtocol, sink: impl EventSink + 'cb) -> Self {
        let machine = match protocol {
            TransferProtocol::Xmodem => Machine::Xmodem(Xmodem::new(XmodemVariant::Checksum)),
            TransferProtocol::XmodemCrc => Machine::Xmodem(Xmodem::new(XmodemVariant::Crc)),
            TransferProtocol::Xmodem1k => Machine::Xmodem(Xmodem::new(XmodemVariant::OneK)),
            TransferProtocol::Ymodem => Machine::Ymodem(Ymodem::new()),
            TransferProtocol::Zmodem => Machine::Zmodem(Zmodem::new()),
        };
        Session {
            protocol,
            direction: None,
            machine,
            sink: Box::new(sink),
        }
    }

    pub fn protocol(&self) -> TransferProtocol {
        self.protocol
    }

    /// Direction of the running transfer; `None` before a start call.
    pub fn direction(&self) -> Option<Direction> {
        self.direction
    }

    pub fn start_send(
        &mut self,
        file_name: Option<&str>,
        data: &[u8],
    ) -> Result<(), TransferError> {
        match &mut self.machine {
            Machine::Xmodem(m) => m.start_send(file_name, data, self.sink.as_mut())?,
            Machine::Ymodem(m) => m.start_send(file_name, data, self.sink.as_mut())?,
            Machine::Zmodem(m) => m.start_send(file_name, data, self.sink.as_mut())?,
        }
        self.direction = Some(Direction::Send);
        Ok(())
    }

    pub fn start_receive(&mut self) -> Result<(), TransferError> {
        match &mut self.machine {
            Machine::Xmodem(m) => m.start_receive(self.sink.as_mut())?,
            Machine::Ymodem(m) => m.start_receive(self.sink.as_mut())?,
            Machine::Zmodem(m) => m.start_receive(self.sink.as_mut())?,
        }
        self.direction = Some(Direction::Receive);
        Ok(())
    }

    /// Feeds bytes read from the serial line into the machine. Accepts
    /// any amount, including none; every byte is consumed before the
    /// call returns.
    pub fn process_data(&mut self, data: &[u8]) {
        match &mut self.machine {
            Machine::Xmodem(m) => m.process_data(data, self.sink.as_mut()),
            Machine::Ymodem(m) => m.process_data(data, self.sink.as_mut()),
            Machine::Zmodem(m) => m.process_data(data, self.sink.as_mut()),
        }
    }

    /// Cancels a running transfer. Idempotent; a no-op when idle or
    /// already terminal.
    pub fn cancel(&mut self) {
        match &mut self.machine {
            Machine::Xmodem(m) => m.cancel(self.sink.as_mut()),
            Machine::Ymodem(m) => m.cancel(self.sink.as_mut()),
            Machine::Zmodem(m) => m.cancel(self.sink.as_mut()),
        }
    }

    /// True while the machine is neither idle nor in a terminal state.
    pub fn is_active(&self) -> bool {
        match &self.machine {
            Machine::Xmodem(m) => m.is_active(),
            Machine::Ymodem(m) => m.is_active(),
            Machine::Zmodem(m) => m.is_active(),
        }
    }

    pub fn state(&self) -> TransferState {
        match &self.machine {
            Machine::Xmodem(m) => m.transfer_state(),
            Machine::Ymodem(m) => m.transfer_state(),
            Machine::Zmodem(m) => m.transfer_state(),
        }
    }

    /// The payload accumulated by a receive transfer so far.
    pub fn received_data(&self) -> &[u8] {
        match &self.machine {
            Machine::Xmodem(m) => m.received_data(),
            Machine::Ymodem(m) => m.received_data(),
            Machine::Zmodem(m) => m.received_data(),
        }
    }

    /// File name sent by the peer (YMODEM/ZMODEM) or given to
    /// `start_send`.
    pub fn file_name(&self) -> Option<&str> {
        match &self.machine {
            Machine::Xmodem(m) => m.file_name(),
            Machine::Ymodem(m) => m.file_name(),
            Machine::Zmodem(m) => m.file_name(),
        }
    }
}

/// True iff the bytes contain a ZMODEM sender's auto-start signature.
/// On a hit, the host creates a ZMODEM receive session and replays the
/// triggering buffer into it.
pub fn detect_zmodem_autostart(data: &[u8]) -> bool {
    zmodem::detect_autostart(data)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::testing::{EventLog, LoggedEvent};
    use crate::event::{Event, SinkAction};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn pump(sender: &mut Session<'_>, send_log: &EventLog, receiver: &mut Session<'_>, recv_log: &EventLog) {
        for _ in 0..200 {
            let to_sender = recv_log.drain_output();
            let to_receiver = send_log.drain_output();
            if to_sender.is_empty() && to_receiver.is_empty() {
                break;
            }
            sender.process_data(&to_sender);
            receiver.process_data(&to_receiver);
        }
    }

    #[test]
    fn test_roundtrip_each_protocol() {
        let data: Vec<u8> = (0u32..4000).map(|i| (i * 11 % 256) as u8).collect();
        for protocol in [
            TransferProtocol::Xmodem,
            TransferProtocol::XmodemCrc,
            TransferProtocol::Xmodem1k,
            TransferProtocol::Ymodem,
            TransferProtocol::Zmodem,
        ] {
            let send_log = EventLog::new();
            let recv_log = EventLog::new();
            let mut sender = Session::new(protocol, send_log.clone());
            let mut receiver = Session::new(protocol, recv_log.clone());
            sender.start_send(Some("t.bin"), &data).unwrap();
            receiver.start_receive().unwrap();
            assert!(sender.is_active());
            assert!(receiver.is_active());

            pump(&mut sender, &send_log, &mut receiver, &recv_log);

            assert!(!sender.is_active(), "{:?} sender still active", protocol);
            assert!(!receiver.is_active(), "{:?} receiver still active", protocol);
            assert_eq!(sender.state(), TransferState::Completed);
            assert_eq!(receiver.state(), TransferState::Completed);
            // XMODEM keeps its SUB padding; the size-aware protocols are
            // byte exact
            assert_eq!(&receiver.received_data()[..data.len()], data.as_slice());
            match protocol {
                TransferProtocol::Ymodem | TransferProtocol::Zmodem => {
                    assert_eq!(receiver.received_data().len(), data.len());
                    assert_eq!(receiver.file_name(), Some("t.bin"));
                }
                _ => assert!(receiver.received_data()[data.len()..]
                    .iter()
                    .all(|&b| b == crate::protocol::SUB)),
            }
        }
    }

    #[test]
    fn test_direction_and_protocol_accessors() {
        let log = EventLog::new();
        let mut session = Session::new(TransferProtocol::XmodemCrc, log);
        assert_eq!(session.protocol(), TransferProtocol::XmodemCrc);
        assert_eq!(session.direction(), None);
        session.start_receive().unwrap();
        assert_eq!(session.direction(), Some(Direction::Receive));
    }

    #[test]
    fn test_closure_sink() {
        let wire = Rc::new(RefCell::new(Vec::new()));
        let wire_clone = Rc::clone(&wire);
        let mut session = Session::new(
            TransferProtocol::XmodemCrc,
            move |event: Event<'_>| {
                if let Event::SendData(bytes) = event {
                    wire_clone.borrow_mut().extend_from_slice(bytes);
                }
                SinkAction::Continue
            },
        );
        session.start_receive().unwrap();
        assert_eq!(wire.borrow().as_slice(), &[crate::protocol::CRC_REQ]);
    }

    #[test]
    fn test_cancel_is_idempotent_through_facade() {
        let log = EventLog::new();
        let mut session = Session::new(TransferProtocol::Zmodem, log.clone());
        session.start_receive().unwrap();
        session.cancel();
        session.cancel();
        assert_eq!(session.state(), TransferState::Cancelled);
        assert_eq!(log.count(|e| matches!(e, LoggedEvent::Cancelled)), 1);
    }

    #[test]
    fn test_cancel_before_start_is_noop() {
        let log = EventLog::new();
        let mut session = Session::new(TransferProtocol::Ymodem, log.clone());
        session.cancel();
        assert_eq!(session.state(), TransferState::Idle);
        assert!(log.events().is_empty());
    }

    #[test]
    fn test_start_twice_rejected() {
        let log = EventLog::new();
        let mut session = Session::new(TransferProtocol::Ymodem, log);
        session.start_send(Some("f"), b"x").unwrap();
        assert_eq!(
            session.start_send(Some("f"), b"x"),
            Err(TransferError::AlreadyStarted)
        );
    }

    #[test]
    fn test_autostart_reexport() {
        assert!(detect_zmodem_autostart(b"rz\r"));
        assert!(!detect_zmodem_autostart(b"sz\r"));
    }

    #[test]
    fn test_process_data_accepts_empty_input() {
        let log = EventLog::new();
        let mut session = Session::new(TransferProtocol::XmodemCrc, log);
        session.start_receive().unwrap();
        session.process_data(&[]);
        assert!(session.is_active());
    }
}
