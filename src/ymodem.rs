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

//! YMODEM protocol state machine
//!
//! XMODEM-1K-CRC extended with a metadata block 0 (file name and decimal
//! size), a second `C` handshake before data, a strict double-EOT exchange
//! and an empty block 0 as the batch terminator. The declared size lets
//! the receiver strip the SUB padding from the final block.

use log::{debug, trace};

use crate::crc::crc16;
use crate::error::TransferError;
use crate::event::{emit, Direction, Event, EventSink, Progress, TransferState};
use crate::protocol::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    // Sender
    SendWaitInit,
    SendWaitBlock0Ack,
    SendWaitDataInit,
    SendWaitAck,
    SendWaitEotAck,
    SendWaitFinalInit,
    SendWaitFinalAck,
    // Receiver
    RecvWaitBlock,
    RecvBlock,
    Completed,
    Failed,
    Cancelled,
}

// ============================================================================
// Machine
// ============================================================================

pub struct Ymodem {
    direction: Direction,
    state: State,
    file_name: Option<String>,
    file_size: u64,

    // Send side
    data: Vec<u8>,
    send_offset: usize,

    // Receive side
    block: [u8; BLOCK_BUFFER_SIZE],
    block_pos: usize,
    expected_block_size: usize,
    received: Vec<u8>,
    bytes_remaining: u64,
    expecting_block0: bool,
    eot_nak_sent: bool,

    block_num: u8,
    blocks_done: u32,
    retries: u32,
    error_count: u32,
    cancel_requested: bool,
}

impl Ymodem {
    pub fn new() -> Self {
        Ymodem {
            direction: Direction::Send,
            state: State::Idle,
            file_name: None,
            file_size: 0,
            data: Vec::new(),
            send_offset: 0,
            block: [0; BLOCK_BUFFER_SIZE],
            block_pos: 0,
            expected_block_size: BLOCK_SIZE_1K,
            received: Vec::new(),
            bytes_remaining: 0,
            expecting_block0: true,
            eot_nak_sent: false,
            block_num: 0,
            blocks_done: 0,
            retries: 0,
            error_count: 0,
            cancel_requested: false,
        }
    }

    // ------------------------------------------------------------------
    // Host surface
    // ------------------------------------------------------------------

    pub fn start_send(
        &mut self,
        file_name: Option<&str>,
        data: &[u8],
        sink: &mut dyn EventSink,
    ) -> Result<(), TransferError> {
        if self.state != State::Idle {
            return Err(TransferError::AlreadyStarted);
        }
        let name = file_name.unwrap_or("data.bin");
        validate_file_name(name)?;
        self.file_name = Some(name.to_owned());
        self.file_size = data.len() as u64;
        self.data = data.to_vec();
        self.direction = Direction::Send;
        self.state = State::SendWaitInit;
        debug!("ymodem: sending '{}' ({} bytes)", name, data.len());
        emit(
            &mut self.cancel_requested,
            sink,
            Event::Started {
                file_name: Some(name),
                file_size: data.len() as u64,
            },
        );
        Ok(())
    }

    pub fn start_receive(&mut self, sink: &mut dyn EventSink) -> Result<(), TransferError> {
        if self.state != State::Idle {
            return Err(TransferError::AlreadyStarted);
        }
        self.direction = Direction::Receive;
        self.state = State::RecvWaitBlock;
        self.expecting_block0 = true;
        debug!("ymodem: receive started, requesting CRC mode");
        emit(
            &mut self.cancel_requested,
            sink,
            Event::SendData(&[CRC_REQ]),
        );
        Ok(())
    }

    pub fn process_data(&mut self, data: &[u8], sink: &mut dyn EventSink) {
        for &byte in data {
            if !self.is_active() {
                return;
            }
            self.handle_byte(byte, sink);
            if self.cancel_requested {
                self.cancel_requested = false;
                self.terminate_cancelled(sink);
                return;
            }
        }
    }

    pub fn cancel(&mut self, sink: &mut dyn EventSink) {
        if self.is_active() {
            self.terminate_cancelled(sink);
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(
            self.state,
            State::Idle | State::Completed | State::Failed | State::Cancelled
        )
    }

    pub fn transfer_state(&self) -> TransferState {
        match self.state {
            State::Idle => TransferState::Idle,
            State::SendWaitInit | State::SendWaitBlock0Ack | State::SendWaitDataInit => {
                TransferState::Starting
            }
            State::SendWaitEotAck | State::SendWaitFinalInit | State::SendWaitFinalAck => {
                TransferState::Completing
            }
            State::SendWaitAck | State::RecvWaitBlock | State::RecvBlock => {
                TransferState::Transferring
            }
            State::Completed => TransferState::Completed,
            State::Failed => TransferState::Failed,
            State::Cancelled => TransferState::Cancelled,
        }
    }

    pub fn received_data(&self) -> &[u8] {
        &self.received
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    // ------------------------------------------------------------------
    // Byte dispatch
    // ------------------------------------------------------------------

    fn handle_byte(&mut self, byte: u8, sink: &mut dyn EventSink) {
        match self.state {
            State::SendWaitInit => match byte {
                CRC_REQ => {
                    self.state = State::SendWaitBlock0Ack;
                    self.send_block0(sink);
                }
                CAN => self.terminate_cancelled(sink),
                _ => trace!("ymodem: ignoring 0x{:02X} while waiting for init", byte),
            },
            State::SendWaitBlock0Ack => match byte {
                ACK => {
                    self.retries = 0;
                    self.state = State::SendWaitDataInit;
                }
                NAK => {
                    if self.count_retry("Too many retries", sink) {
                        self.send_block0(sink);
                    }
                }
                CAN => self.terminate_cancelled(sink),
                _ => {}
            },
            State::SendWaitDataInit => match byte {
                CRC_REQ => {
                    if self.data.is_empty() {
                        self.state = State::SendWaitEotAck;
                        emit(&mut self.cancel_requested, sink, Event::SendData(&[EOT]));
                    } else {
                        self.block_num = 1;
                        self.state = State::SendWaitAck;
                        self.send_data_block(sink);
                    }
                }
                CAN => self.terminate_cancelled(sink),
                _ => {}
            },
            State::SendWaitAck => match byte {
                ACK => self.advance_after_ack(sink),
                NAK => {
                    if self.count_retry("Too many retries", sink) {
                        self.send_data_block(sink);
                    }
                }
                CAN => self.terminate_cancelled(sink),
                _ => {}
            },
            State::SendWaitEotAck => match byte {
                // Strict receivers NAK the first EOT and expect a second
                NAK => {
                    if self.count_retry("Too many retries", sink) {
                        emit(&mut self.cancel_requested, sink, Event::SendData(&[EOT]));
                    }
                }
                ACK => {
                    self.retries = 0;
                    self.state = State::SendWaitFinalInit;
                }
                CAN => self.terminate_cancelled(sink),
                _ => {}
            },
            State::SendWaitFinalInit => match byte {
                CRC_REQ => {
                    self.state = State::SendWaitFinalAck;
                    self.send_null_block0(sink);
                }
                CAN => self.terminate_cancelled(sink),
                _ => {}
            },
            State::SendWaitFinalAck => match byte {
                ACK => self.terminate_completed(sink),
                NAK => {
                    if self.count_retry("Too many retries", sink) {
                        self.send_null_block0(sink);
                    }
                }
                CAN => self.terminate_cancelled(sink),
                _ => {}
            },
            State::RecvWaitBlock => match byte {
                SOH => self.begin_block_assembly(byte, BLOCK_SIZE_128),
                STX => self.begin_block_assembly(byte, BLOCK_SIZE_1K),
                EOT => self.handle_eot(sink),
                CAN => self.terminate_cancelled(sink),
                _ => trace!("ymodem: ignoring 0x{:02X} between blocks", byte),
            },
            State::RecvBlock => {
                self.block[self.block_pos] = byte;
                self.block_pos += 1;
                if self.block_pos == 3 {
                    if self.block[1] != !self.block[2] {
                        debug!(
                            "ymodem: bad block header {:02X}/{:02X}",
                            self.block[1], self.block[2]
                        );
                        self.state = State::RecvWaitBlock;
                        self.send_nak(sink);
                    }
                } else if self.block_pos == 3 + self.expected_block_size + 2 {
                    self.complete_block(sink);
                }
            }
            State::Idle | State::Completed | State::Failed | State::Cancelled => {}
        }
    }

    // ------------------------------------------------------------------
    // Send side
    // ------------------------------------------------------------------

    /// Block 0: `name NUL decimal-size NUL`, zero padded, in a 1K block.
    fn send_block0(&mut self, sink: &mut dyn EventSink) {
        self.block[0] = STX;
        self.block[1] = 0;
        self.block[2] = 0xFF;
        let payload = &mut self.block[3..3 + BLOCK_SIZE_1K];
        payload.fill(0);
        let name = self.file_name.as_deref().unwrap_or("");
        let size = format!("{}", self.data.len());
        payload[..name.len()].copy_from_slice(name.as_bytes());
        payload[name.len() + 1..name.len() + 1 + size.len()].copy_from_slice(size.as_bytes());
        let crc = crc16(&self.block[3..3 + BLOCK_SIZE_1K]);
        self.block[3 + BLOCK_SIZE_1K] = (crc >> 8) as u8;
        self.block[3 + BLOCK_SIZE_1K + 1] = (crc & 0xFF) as u8;
        trace!("ymodem: sending block 0");
        emit(
            &mut self.cancel_requested,
            sink,
            Event::SendData(&self.block[..3 + BLOCK_SIZE_1K + 2]),
        );
    }

    /// Empty 128-byte block 0: the batch terminator.
    fn send_null_block0(&mut self, sink: &mut dyn EventSink) {
        self.block[0] = SOH;
        self.block[1] = 0;
        self.block[2] = 0xFF;
        self.block[3..3 + BLOCK_SIZE_128].fill(0);
        let crc = crc16(&self.block[3..3 + BLOCK_SIZE_128]);
        self.block[3 + BLOCK_SIZE_128] = (crc >> 8) as u8;
        self.block[3 + BLOCK_SIZE_128 + 1] = (crc & 0xFF) as u8;
        trace!("ymodem: sending batch terminator");
        emit(
            &mut self.cancel_requested,
            sink,
            Event::SendData(&self.block[..3 + BLOCK_SIZE_128 + 2]),
        );
    }

    fn send_data_block(&mut self, sink: &mut dyn EventSink) {
        let start = self.send_offset.min(self.data.len());
        let end = (start + BLOCK_SIZE_1K).min(self.data.len());

        self.block[0] = STX;
        self.block[1] = self.block_num;
        self.block[2] = !self.block_num;
        self.block[3..3 + (end - start)].copy_from_slice(&self.data[start..end]);
        for pad in self.block[3 + (end - start)..3 + BLOCK_SIZE_1K].iter_mut() {
            *pad = SUB;
        }
        let crc = crc16(&self.block[3..3 + BLOCK_SIZE_1K]);
        self.block[3 + BLOCK_SIZE_1K] = (crc >> 8) as u8;
        self.block[3 + BLOCK_SIZE_1K + 1] = (crc & 0xFF) as u8;

        trace!(
            "ymodem: sending block {} ({} data bytes)",
            self.block_num,
            end - start
        );
        emit(
            &mut self.cancel_requested,
            sink,
            Event::SendData(&self.block[..3 + BLOCK_SIZE_1K + 2]),
        );
    }

    fn advance_after_ack(&mut self, sink: &mut dyn EventSink) {
        self.retries = 0;
        self.blocks_done += 1;
        self.send_offset = (self.send_offset + BLOCK_SIZE_1K).min(self.data.len());
        self.emit_progress(sink);
        if self.send_offset >= self.data.len() {
            debug!("ymodem: all data sent, sending EOT");
            self.state = State::SendWaitEotAck;
            emit(&mut self.cancel_requested, sink, Event::SendData(&[EOT]));
        } else {
            self.block_num = self.block_num.wrapping_add(1);
            self.send_data_block(sink);
        }
    }

    // ------------------------------------------------------------------
    // Receive side
    // ------------------------------------------------------------------

    fn begin_block_assembly(&mut self, header: u8, size: usize) {
        self.expected_block_size = size;
        self.block[0] = header;
        self.block_pos = 1;
        self.state = State::RecvBlock;
    }

    /// Strict EOT exchange: NAK the first EOT, ACK the second, then
    /// request the next file's block 0 with `C`.
    fn handle_eot(&mut self, sink: &mut dyn EventSink) {
        if self.expecting_block0 {
            trace!("ymodem: EOT while expecting block 0, ignoring");
            return;
        }
        if !self.eot_nak_sent {
            self.eot_nak_sent = true;
            emit(&mut self.cancel_requested, sink, Event::SendData(&[NAK]));
        } else {
            self.eot_nak_sent = false;
            self.expecting_block0 = true;
            debug!("ymodem: end of file, requesting next block 0");
            emit(
                &mut self.cancel_requested,
                sink,
                Event::SendData(&[ACK, CRC_REQ]),
            );
        }
    }

    fn complete_block(&mut self, sink: &mut dyn EventSink) {
        self.state = State::RecvWaitBlock;
        let size = self.expected_block_size;
        let wire = u16::from_be_bytes([self.block[3 + size], self.block[3 + size + 1]]);
        if wire != crc16(&self.block[3..3 + size]) {
            debug!("ymodem: block {} failed CRC check", self.block[1]);
            self.send_nak(sink);
            return;
        }

        if self.expecting_block0 {
            if self.block[1] == 0 {
                self.accept_block0(sink);
            } else {
                debug!("ymodem: expected block 0, got {}", self.block[1]);
                self.send_nak(sink);
            }
        } else if self.block[1] == self.block_num {
            self.accept_data_block(sink);
        } else if self.block[1] == self.block_num.wrapping_sub(1) {
            debug!("ymodem: duplicate block {}, re-acking", self.block[1]);
            emit(&mut self.cancel_requested, sink, Event::SendData(&[ACK]));
        } else {
            debug!(
                "ymodem: out-of-sequence block {} (expected {})",
                self.block[1], self.block_num
            );
            self.send_nak(sink);
        }
    }

    fn accept_block0(&mut self, sink: &mut dyn EventSink) {
        let size = self.expected_block_size;
        let payload = &self.block[3..3 + size];

        // An empty file name terminates the batch
        if payload[0] == 0 {
            debug!("ymodem: batch terminator received");
            emit(&mut self.cancel_requested, sink, Event::SendData(&[ACK]));
            self.terminate_completed(sink);
            return;
        }

        let name_end = payload.iter().position(|&b| b == 0).unwrap_or(size);
        if name_end > MAX_FILENAME_LEN {
            self.fail("File name too long", sink);
            return;
        }
        let name = String::from_utf8_lossy(&payload[..name_end]).into_owned();
        let size_start = (name_end + 1).min(size);
        let size_end = (size_start + 20).min(size);
        let mut file_size = 0u64;
        for &b in &payload[size_start..size_end] {
            if b.is_ascii_digit() {
                file_size = file_size * 10 + (b - b'0') as u64;
            } else {
                break;
            }
        }

        debug!("ymodem: receiving '{}' ({} bytes)", name, file_size);
        self.file_name = Some(name);
        self.file_size = file_size;
        self.bytes_remaining = file_size;
        self.block_num = 1;
        self.expecting_block0 = false;
        self.retries = 0;
        emit(
            &mut self.cancel_requested,
            sink,
            Event::SendData(&[ACK, CRC_REQ]),
        );
        emit(
            &mut self.cancel_requested,
            sink,
            Event::Started {
                file_name: self.file_name.as_deref(),
                file_size: self.file_size,
            },
        );
    }

    fn accept_data_block(&mut self, sink: &mut dyn EventSink) {
        let size = self.expected_block_size;
        // The declared size strips SUB padding off the final block; a
        // declared size of 0 means unknown and keeps everything.
        let take = if self.file_size > 0 {
            (self.bytes_remaining as usize).min(size)
        } else {
            size
        };
        self.received.extend_from_slice(&self.block[3..3 + take]);
        self.bytes_remaining = self.bytes_remaining.saturating_sub(take as u64);
        self.block_num = self.block_num.wrapping_add(1);
        self.blocks_done += 1;
        self.retries = 0;
        trace!("ymodem: accepted block {} ({} bytes kept)", self.block[1], take);
        emit(&mut self.cancel_requested, sink, Event::SendData(&[ACK]));
        self.emit_progress(sink);
    }

    fn send_nak(&mut self, sink: &mut dyn EventSink) {
        if self.count_retry("Too many errors", sink) {
            emit(&mut self.cancel_requested, sink, Event::SendData(&[NAK]));
        }
    }

    // ------------------------------------------------------------------
    // Common
    // ------------------------------------------------------------------

    fn count_retry(&mut self, message: &'static str, sink: &mut dyn EventSink) -> bool {
        self.retries += 1;
        self.error_count += 1;
        if self.retries > MAX_RETRIES {
            self.fail(message, sink);
            false
        } else {
            true
        }
    }

    fn fail(&mut self, message: &str, sink: &mut dyn EventSink) {
        debug!("ymodem: failing: {}", message);
        emit(
            &mut self.cancel_requested,
            sink,
            Event::SendData(&[CAN, CAN, CAN]),
        );
        self.state = State::Failed;
        self.cancel_requested = false;
        emit(&mut self.cancel_requested, sink, Event::Failed(message));
    }

    fn terminate_completed(&mut self, sink: &mut dyn EventSink) {
        self.state = State::Completed;
        self.cancel_requested = false;
        emit(&mut self.cancel_requested, sink, Event::Completed);
    }

    fn terminate_cancelled(&mut self, sink: &mut dyn EventSink) {
        emit(
            &mut self.cancel_requested,
            sink,
            Event::SendData(&[CAN, CAN, CAN]),
        );
        self.state = State::Cancelled;
        self.cancel_requested = false;
        emit(&mut self.cancel_requested, sink, Event::Cancelled);
    }

    fn emit_progress(&mut self, sink: &mut dyn EventSink) {
        let (transferred, total) = match self.direction {
            Direction::Send => (self.send_offset as u64, self.data.len() as u64),
            Direction::Receive => (self.received.len() as u64, self.file_size),
        };
        let state = self.transfer_state();
        emit(
            &mut self.cancel_requested,
            sink,
            Event::Progress(Progress {
                state,
                bytes_transferred: transferred,
                total_bytes: total,
                current_block: self.blocks_done,
                error_count: self.error_count,
                file_name: self.file_name.as_deref(),
            }),
        );
    }
}

impl Default for Ymodem {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::testing::{EventLog, LoggedEvent};

    fn data_block(num: u8, payload: &[u8]) -> Vec<u8> {
        let mut data = payload.to_vec();
        data.resize(BLOCK_SIZE_1K, SUB);
        let crc = crc16(&data);
        let mut block = vec![STX, num, !num];
        block.extend_from_slice(&data);
        block.push((crc >> 8) as u8);
        block.push((crc & 0xFF) as u8);
        block
    }

    fn block0(name: &str, size: &str) -> Vec<u8> {
        let mut payload = vec![0u8; BLOCK_SIZE_1K];
        payload[..name.len()].copy_from_slice(name.as_bytes());
        payload[name.len() + 1..name.len() + 1 + size.len()].copy_from_slice(size.as_bytes());
        let crc = crc16(&payload);
        let mut block = vec![STX, 0, 0xFF];
        block.extend_from_slice(&payload);
        block.push((crc >> 8) as u8);
        block.push((crc & 0xFF) as u8);
        block
    }

    fn null_block0() -> Vec<u8> {
        let payload = [0u8; BLOCK_SIZE_128];
        let crc = crc16(&payload);
        let mut block = vec![SOH, 0, 0xFF];
        block.extend_from_slice(&payload);
        block.push((crc >> 8) as u8);
        block.push((crc & 0xFF) as u8);
        block
    }

    #[test]
    fn test_receive_batch() {
        let mut log = EventLog::new();
        let mut ym = Ymodem::new();
        ym.start_receive(&mut log).unwrap();
        assert_eq!(log.drain_output(), vec![CRC_REQ]);

        // Block 0: "a.bin", 3 bytes
        ym.process_data(&block0("a.bin", "3"), &mut log);
        assert_eq!(log.drain_output(), vec![ACK, CRC_REQ]);
        assert_eq!(ym.file_name(), Some("a.bin"));

        // Data block: "ABC" plus SUB padding
        ym.process_data(&data_block(1, b"ABC"), &mut log);
        assert_eq!(log.drain_output(), vec![ACK]);

        // Strict double EOT: NAK the first, ACK + C the second
        ym.process_data(&[EOT], &mut log);
        assert_eq!(log.drain_output(), vec![NAK]);
        ym.process_data(&[EOT], &mut log);
        assert_eq!(log.drain_output(), vec![ACK, CRC_REQ]);

        // Batch terminator
        ym.process_data(&null_block0(), &mut log);
        assert_eq!(log.drain_output(), vec![ACK]);
        assert!(log.completed());

        // Declared size limits the accumulator: padding is stripped
        assert_eq!(ym.received_data(), b"ABC");
    }

    #[test]
    fn test_receive_started_event_carries_metadata() {
        let mut log = EventLog::new();
        let mut ym = Ymodem::new();
        ym.start_receive(&mut log).unwrap();
        ym.process_data(&block0("firmware.img", "70000"), &mut log);

        let started = log
            .events()
            .into_iter()
            .find(|e| matches!(e, LoggedEvent::Started { .. }))
            .unwrap();
        assert_eq!(
            started,
            LoggedEvent::Started {
                file_name: Some("firmware.img".to_owned()),
                file_size: 70000,
            }
        );
    }

    #[test]
    fn test_receive_immediate_batch_terminator() {
        let mut log = EventLog::new();
        let mut ym = Ymodem::new();
        ym.start_receive(&mut log).unwrap();
        log.drain_output();

        ym.process_data(&null_block0(), &mut log);
        assert_eq!(log.drain_output(), vec![ACK]);
        assert!(log.completed());
        assert_eq!(log.count(|e| matches!(e, LoggedEvent::Started { .. })), 0);
        assert!(ym.received_data().is_empty());
    }

    #[test]
    fn test_send_full_exchange() {
        let mut log = EventLog::new();
        let mut ym = Ymodem::new();
        ym.start_send(Some("a.bin"), b"ABC", &mut log).unwrap();
        assert!(log.drain_output().is_empty());

        // First C: block 0 with name and size
        ym.process_data(&[CRC_REQ], &mut log);
        assert_eq!(log.drain_output(), block0("a.bin", "3"));

        // ACK then second C: first data block
        ym.process_data(&[ACK], &mut log);
        assert!(log.drain_output().is_empty());
        ym.process_data(&[CRC_REQ], &mut log);
        assert_eq!(log.drain_output(), data_block(1, b"ABC"));

        // ACK: EOT; strict receiver NAKs, we resend, it ACKs
        ym.process_data(&[ACK], &mut log);
        assert_eq!(log.drain_output(), vec![EOT]);
        ym.process_data(&[NAK], &mut log);
        assert_eq!(log.drain_output(), vec![EOT]);
        ym.process_data(&[ACK], &mut log);

        // Third C: batch terminator, then final ACK completes
        ym.process_data(&[CRC_REQ], &mut log);
        assert_eq!(log.drain_output(), null_block0());
        ym.process_data(&[ACK], &mut log);
        assert!(log.completed());
        assert!(!ym.is_active());
    }

    #[test]
    fn test_send_block0_resent_on_nak() {
        let mut log = EventLog::new();
        let mut ym = Ymodem::new();
        ym.start_send(Some("x"), b"1234", &mut log).unwrap();
        ym.process_data(&[CRC_REQ], &mut log);
        let first = log.drain_output();
        ym.process_data(&[NAK], &mut log);
        assert_eq!(log.drain_output(), first);
    }

    #[test]
    fn test_send_rejects_long_filename() {
        let mut log = EventLog::new();
        let mut ym = Ymodem::new();
        let name = "n".repeat(256);
        assert_eq!(
            ym.start_send(Some(&name), b"x", &mut log),
            Err(TransferError::FilenameTooLong)
        );
        assert!(!ym.is_active());
    }

    #[test]
    fn test_roundtrip_lossless_pipe() {
        let data: Vec<u8> = (0u32..5000).map(|i| (i * 13 % 256) as u8).collect();
        let mut send_log = EventLog::new();
        let mut recv_log = EventLog::new();
        let mut sender = Ymodem::new();
        let mut receiver = Ymodem::new();
        sender
            .start_send(Some("blob.dat"), &data, &mut send_log)
            .unwrap();
        receiver.start_receive(&mut recv_log).unwrap();

        for _ in 0..200 {
            let to_sender = recv_log.drain_output();
            let to_receiver = send_log.drain_output();
            if to_sender.is_empty() && to_receiver.is_empty() {
                break;
            }
            sender.process_data(&to_sender, &mut send_log);
            receiver.process_data(&to_receiver, &mut recv_log);
        }

        assert!(send_log.completed());
        assert!(recv_log.completed());
        // YMODEM's declared size makes the round trip exact
        assert_eq!(receiver.received_data(), data.as_slice());
        assert_eq!(receiver.file_name(), Some("blob.dat"));
    }

    #[test]
    fn test_roundtrip_empty_file() {
        let mut send_log = EventLog::new();
        let mut recv_log = EventLog::new();
        let mut sender = Ymodem::new();
        let mut receiver = Ymodem::new();
        sender.start_send(Some("empty"), &[], &mut send_log).unwrap();
        receiver.start_receive(&mut recv_log).unwrap();

        for _ in 0..50 {
            let to_sender = recv_log.drain_output();
            let to_receiver = send_log.drain_output();
            if to_sender.is_empty() && to_receiver.is_empty() {
                break;
            }
            sender.process_data(&to_sender, &mut send_log);
            receiver.process_data(&to_receiver, &mut recv_log);
        }

        assert!(send_log.completed());
        assert!(recv_log.completed());
        assert!(receiver.received_data().is_empty());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let mut log = EventLog::new();
        let mut ym = Ymodem::new();
        ym.start_receive(&mut log).unwrap();
        ym.cancel(&mut log);
        ym.cancel(&mut log);
        assert_eq!(log.count(|e| matches!(e, LoggedEvent::Cancelled)), 1);
    }
}
