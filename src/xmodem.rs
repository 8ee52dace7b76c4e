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

//! XMODEM protocol state machine
//!
//! Covers the three classic variants: checksum (128-byte blocks, 8-bit
//! sum), CRC (128-byte blocks, CRC-16) and 1K (1024-byte blocks, CRC-16).
//! The machine is push-driven: bytes in through `process_data`, bytes out
//! through `Event::SendData`.

use log::{debug, trace};

use crate::crc::{checksum, crc16};
use crate::error::TransferError;
use crate::event::{emit, Direction, Event, EventSink, Progress, TransferState};
use crate::protocol::*;

// ============================================================================
// Variants and states
// ============================================================================

/// Which flavor of XMODEM the session speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmodemVariant {
    /// Original XMODEM: 128-byte blocks, 8-bit checksum
    Checksum,
    /// XMODEM-CRC: 128-byte blocks, CRC-16
    Crc,
    /// XMODEM-1K: 1024-byte blocks, CRC-16
    OneK,
}

/// Block trailer negotiated with the peer's init byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CheckMode {
    Checksum,
    Crc16,
}

impl CheckMode {
    fn size(self) -> usize {
        match self {
            CheckMode::Checksum => 1,
            CheckMode::Crc16 => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    SendWaitInit,
    SendWaitAck,
    SendWaitEotAck,
    RecvWaitBlock,
    RecvBlock,
    Completed,
    Failed,
    Cancelled,
}

// ============================================================================
// Machine
// ============================================================================

pub struct Xmodem {
    variant: XmodemVariant,
    direction: Direction,
    state: State,
    check: CheckMode,
    file_name: Option<String>,

    // Send side
    data: Vec<u8>,
    send_offset: usize,

    // Receive side: one in-flight block under assembly
    block: [u8; BLOCK_BUFFER_SIZE],
    block_pos: usize,
    expected_block_size: usize,
    received: Vec<u8>,

    block_num: u8,
    blocks_done: u32,
    retries: u32,
    error_count: u32,
    cancel_requested: bool,
}

impl Xmodem {
    pub fn new(variant: XmodemVariant) -> Self {
        Xmodem {
            variant,
            direction: Direction::Send,
            state: State::Idle,
            check: match variant {
                XmodemVariant::Checksum => CheckMode::Checksum,
                _ => CheckMode::Crc16,
            },
            file_name: None,
            data: Vec::new(),
            send_offset: 0,
            block: [0; BLOCK_BUFFER_SIZE],
            block_pos: 0,
            expected_block_size: BLOCK_SIZE_128,
            received: Vec::new(),
            block_num: 1,
            blocks_done: 0,
            retries: 0,
            error_count: 0,
            cancel_requested: false,
        }
    }

    fn block_size(&self) -> usize {
        match self.variant {
            XmodemVariant::OneK => BLOCK_SIZE_1K,
            _ => BLOCK_SIZE_128,
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
        if let Some(name) = file_name {
            validate_file_name(name)?;
        }
        self.file_name = file_name.map(str::to_owned);
        self.data = data.to_vec();
        self.direction = Direction::Send;
        self.state = State::SendWaitInit;
        debug!("xmodem: sending {} bytes, waiting for init", data.len());
        emit(
            &mut self.cancel_requested,
            sink,
            Event::Started {
                file_name,
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
        self.block_num = 1;
        emit(
            &mut self.cancel_requested,
            sink,
            Event::Started {
                file_name: None,
                file_size: 0,
            },
        );
        // The init byte doubles as mode negotiation: NAK asks for checksum
        // blocks, 'C' for CRC-16 blocks.
        let init = match self.check {
            CheckMode::Checksum => NAK,
            CheckMode::Crc16 => CRC_REQ,
        };
        debug!("xmodem: receive started, requesting {:?} mode", self.check);
        emit(&mut self.cancel_requested, sink, Event::SendData(&[init]));
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
            State::SendWaitInit => TransferState::Starting,
            State::SendWaitEotAck => TransferState::Completing,
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
                NAK => {
                    self.check = CheckMode::Checksum;
                    debug!("xmodem: peer requested checksum mode");
                    self.begin_blocks(sink);
                }
                CRC_REQ => {
                    self.check = CheckMode::Crc16;
                    debug!("xmodem: peer requested CRC mode");
                    self.begin_blocks(sink);
                }
                CAN => self.terminate_cancelled(sink),
                _ => trace!("xmodem: ignoring 0x{:02X} while waiting for init", byte),
            },
            State::SendWaitAck => match byte {
                ACK => self.advance_after_ack(sink),
                NAK => {
                    if self.count_retry("Too many retries", sink) {
                        self.send_block(sink);
                    }
                }
                CAN => self.terminate_cancelled(sink),
                _ => trace!("xmodem: ignoring 0x{:02X} while waiting for ack", byte),
            },
            State::SendWaitEotAck => match byte {
                ACK => self.terminate_completed(sink),
                NAK => {
                    if self.count_retry("Too many retries", sink) {
                        emit(&mut self.cancel_requested, sink, Event::SendData(&[EOT]));
                    }
                }
                CAN => self.terminate_cancelled(sink),
                _ => {}
            },
            State::RecvWaitBlock => match byte {
                SOH => self.begin_block_assembly(byte, BLOCK_SIZE_128),
                STX => self.begin_block_assembly(byte, BLOCK_SIZE_1K),
                EOT => {
                    emit(&mut self.cancel_requested, sink, Event::SendData(&[ACK]));
                    self.terminate_completed(sink);
                }
                CAN => self.terminate_cancelled(sink),
                _ => trace!("xmodem: ignoring 0x{:02X} between blocks", byte),
            },
            State::RecvBlock => {
                self.block[self.block_pos] = byte;
                self.block_pos += 1;
                if self.block_pos == 3 {
                    // Header sanity: second byte must be the complement
                    if self.block[1] != !self.block[2] {
                        debug!(
                            "xmodem: bad block header {:02X}/{:02X}",
                            self.block[1], self.block[2]
                        );
                        self.state = State::RecvWaitBlock;
                        self.send_nak(sink);
                    }
                } else if self.block_pos == 3 + self.expected_block_size + self.check.size() {
                    self.complete_block(sink);
                }
            }
            State::Idle | State::Completed | State::Failed | State::Cancelled => {}
        }
    }

    // ------------------------------------------------------------------
    // Send side
    // ------------------------------------------------------------------

    fn begin_blocks(&mut self, sink: &mut dyn EventSink) {
        self.block_num = 1;
        self.state = State::SendWaitAck;
        self.send_block(sink);
    }

    fn send_block(&mut self, sink: &mut dyn EventSink) {
        let size = self.block_size();
        let start = self.send_offset.min(self.data.len());
        let end = (start + size).min(self.data.len());

        self.block[0] = if size == BLOCK_SIZE_1K { STX } else { SOH };
        self.block[1] = self.block_num;
        self.block[2] = !self.block_num;
        self.block[3..3 + (end - start)].copy_from_slice(&self.data[start..end]);
        for pad in self.block[3 + (end - start)..3 + size].iter_mut() {
            *pad = SUB;
        }

        let total = match self.check {
            CheckMode::Checksum => {
                self.block[3 + size] = checksum(&self.block[3..3 + size]);
                3 + size + 1
            }
            CheckMode::Crc16 => {
                let crc = crc16(&self.block[3..3 + size]);
                self.block[3 + size] = (crc >> 8) as u8;
                self.block[3 + size + 1] = (crc & 0xFF) as u8;
                3 + size + 2
            }
        };

        trace!(
            "xmodem: sending block {} ({} data bytes)",
            self.block_num,
            end - start
        );
        emit(
            &mut self.cancel_requested,
            sink,
            Event::SendData(&self.block[..total]),
        );
    }

    fn advance_after_ack(&mut self, sink: &mut dyn EventSink) {
        self.retries = 0;
        self.blocks_done += 1;
        self.send_offset = (self.send_offset + self.block_size()).min(self.data.len());
        self.emit_progress(sink);
        if self.send_offset >= self.data.len() {
            debug!("xmodem: all data sent, sending EOT");
            self.state = State::SendWaitEotAck;
            emit(&mut self.cancel_requested, sink, Event::SendData(&[EOT]));
        } else {
            self.block_num = self.block_num.wrapping_add(1);
            self.send_block(sink);
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

    fn complete_block(&mut self, sink: &mut dyn EventSink) {
        self.state = State::RecvWaitBlock;
        let size = self.expected_block_size;
        let valid = match self.check {
            CheckMode::Checksum => self.block[3 + size] == checksum(&self.block[3..3 + size]),
            CheckMode::Crc16 => {
                let wire = u16::from_be_bytes([self.block[3 + size], self.block[3 + size + 1]]);
                wire == crc16(&self.block[3..3 + size])
            }
        };

        if !valid {
            debug!("xmodem: block {} failed {:?} check", self.block[1], self.check);
            self.send_nak(sink);
            return;
        }

        if self.block[1] == self.block_num {
            self.received.extend_from_slice(&self.block[3..3 + size]);
            self.block_num = self.block_num.wrapping_add(1);
            self.blocks_done += 1;
            self.retries = 0;
            trace!("xmodem: accepted block {}", self.block[1]);
            emit(&mut self.cancel_requested, sink, Event::SendData(&[ACK]));
            self.emit_progress(sink);
        } else if self.block[1] == self.block_num.wrapping_sub(1) {
            // Retransmission of the last accepted block: our ACK was lost.
            // Re-ACK without appending.
            debug!("xmodem: duplicate block {}, re-acking", self.block[1]);
            emit(&mut self.cancel_requested, sink, Event::SendData(&[ACK]));
        } else {
            debug!(
                "xmodem: out-of-sequence block {} (expected {})",
                self.block[1], self.block_num
            );
            self.send_nak(sink);
        }
    }

    fn send_nak(&mut self, sink: &mut dyn EventSink) {
        if self.count_retry("Too many errors", sink) {
            emit(&mut self.cancel_requested, sink, Event::SendData(&[NAK]));
        }
    }

    // ------------------------------------------------------------------
    // Common
    // ------------------------------------------------------------------

    /// Counts a transient error. Returns false (after failing the
    /// transfer) once the retry budget is exhausted.
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
        debug!("xmodem: failing: {}", message);
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
            Direction::Receive => (self.received.len() as u64, 0),
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

// ============================================================================
// Tests
// ============================================================================
