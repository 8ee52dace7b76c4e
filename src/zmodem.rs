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

//! ZMODEM protocol state machine
//!
//! Two layers share this file. The wire scanner assembles hex frames,
//! binary frames and ZDLE-escaped data subpackets out of the raw byte
//! stream; the session layer above it runs the
//! ZRQINIT/ZRINIT/ZFILE/ZRPOS/ZDATA/ZEOF/ZFIN exchange, including
//! offset-based resume. The engine itself only ever emits hex frames;
//! binary frames are accepted from peers and select the subpacket CRC
//! width (ZBIN: 16-bit, ZBIN32: 32-bit).
//!
//! Hex frame CRCs are big-endian on the wire, as are 16-bit subpacket
//! trailers; 32-bit trailers are little-endian.

use log::{debug, trace};

use crate::crc::{crc16, crc16_with_trailer, crc32, crc32_with_trailer};
use crate::error::TransferError;
use crate::event::{emit, Direction, Event, EventSink, Progress, TransferState};
use crate::protocol::*;

const CR: u8 = 0x0D;
const LF: u8 = 0x0A;

/// Wire form of an aborted session: eight CANs, then enough backspaces
/// to scrub a command line that swallowed them.
const CANCEL_SEQUENCE: [u8; 18] = [
    ZDLE, ZDLE, ZDLE, ZDLE, ZDLE, ZDLE, ZDLE, ZDLE, 0x08, 0x08, 0x08, 0x08, 0x08, 0x08, 0x08,
    0x08, 0x08, 0x08,
];

/// Raw CANs in a row that abort the session.
const CAN_RUN_ABORT: u8 = 5;

// ============================================================================
// Auto-start detection
// ============================================================================

/// True iff the bytes contain a ZMODEM sender's opening signature:
/// the `rz\r` command trigraph or the `* * ZDLE B` hex frame lead.
/// The host uses this to spin up a receive session from terminal input.
pub fn detect_autostart(data: &[u8]) -> bool {
    let rz = b"rz\r";
    let lead = [ZPAD, ZPAD, ZDLE, ZHEX];
    data.windows(rz.len()).any(|w| w == rz) || data.windows(lead.len()).any(|w| w == lead)
}

// ============================================================================
// States
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    // Sender
    SendWaitZrinit,
    SendWaitZrpos,
    SendWaitEofAck,
    SendWaitZfin,
    // Receiver
    RecvWaitFile,
    RecvFileInfo,
    RecvWaitZdata,
    RecvData,
    Completed,
    Failed,
    Cancelled,
}

/// Wire-scanner state, below the session states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    /// Hunting for ZPAD
    Hunt,
    /// One or more ZPADs seen, expecting ZDLE
    HuntZdle,
    /// ZPAD ZDLE seen, next byte picks the frame encoding
    FrameKind,
    /// Collecting the 14 hex digits of a hex header
    HexHeader,
    /// Swallowing the CR LF after a valid hex header
    HexTrailer,
    /// Collecting the unescaped bytes of a binary header
    BinHeader { crc32: bool },
    /// Collecting unescaped subpacket payload
    Subpacket,
    /// Collecting the subpacket CRC trailer
    SubpacketCrc { terminator: u8 },
}

/// One step of inbound ZDLE decoding.
enum Unescaped {
    /// A decoded data byte
    Byte(u8),
    /// ZDLE seen, decision deferred to the next byte
    Pending,
    /// ZDLE + ZCRCE/G/Q/W: subpacket terminator
    Terminator(u8),
}

// ============================================================================
// Escaping
// ============================================================================

/// Outbound ZDLE escaping: ZDLE itself, control bytes, DEL and 0xFF
/// travel as ZDLE + (byte XOR 0x40).
fn escape_into(out: &mut Vec<u8>, byte: u8) {
    if byte == ZDLE || byte < 0x20 || byte == 0x7F || byte == 0xFF {
        out.push(ZDLE);
        out.push(byte ^ 0x40);
    } else {
        out.push(byte);
    }
}

/// Inbound ZDLE decoding. The four terminator values after a ZDLE mark a
/// subpacket boundary; ZDLEE decodes to a literal ZDLE; everything else
/// is XOR 0x40.
fn unescape_step(zdle_seen: &mut bool, byte: u8) -> Unescaped {
    if *zdle_seen {
        *zdle_seen = false;
        match byte {
            ZDLEE => Unescaped::Byte(ZDLE),
            ZCRCE | ZCRCG | ZCRCQ | ZCRCW => Unescaped::Terminator(byte),
            _ => Unescaped::Byte(byte ^ 0x40),
        }
    } else if byte == ZDLE {
        *zdle_seen = true;
        Unescaped::Pending
    } else {
        Unescaped::Byte(byte)
    }
}

fn hex_digit(nibble: u8) -> u8 {
    b"0123456789abcdef"[nibble as usize]
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

fn push_hex(out: &mut Vec<u8>, byte: u8) {
    out.push(hex_digit(byte >> 4));
    out.push(hex_digit(byte & 0x0F));
}

// ============================================================================
// Machine
// ============================================================================

pub struct Zmodem {
    direction: Direction,
    state: State,
    scan: Scan,

    // Wire scanner
    frame_buf: Vec<u8>,
    pending_frame: Option<(u8, [u8; 4])>,
    zdle_seen: bool,
    can_count: u8,
    crc_buf: [u8; 4],
    crc_pos: usize,
    subpacket_crc32: bool,

    // Session
    use_crc32: bool,
    out: Vec<u8>,
    last_frame: Option<(u8, [u8; 4])>,
    last_was_file_info: bool,
    file_name: Option<String>,
    file_size: u64,
    file_pos: u64,

    // Send side
    data: Vec<u8>,
    send_offset: usize,

    // Receive side
    received: Vec<u8>,
    file_base: usize,

    blocks_done: u32,
    retries: u32,
    error_count: u32,
    cancel_requested: bool,
}

impl Zmodem {
    pub fn new() -> Self {
        Zmodem {
            direction: Direction::Send,
            state: State::Idle,
            scan: Scan::Hunt,
            frame_buf: Vec::with_capacity(FRAME_BUFFER_SIZE),
            pending_frame: None,
            zdle_seen: false,
            can_count: 0,
            crc_buf: [0; 4],
            crc_pos: 0,
            subpacket_crc32: true,
            use_crc32: true,
            out: Vec::new(),
            last_frame: None,
            last_was_file_info: false,
            file_name: None,
            file_size: 0,
            file_pos: 0,
            data: Vec::new(),
            send_offset: 0,
            received: Vec::new(),
            file_base: 0,
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
        self.state = State::SendWaitZrinit;
        debug!("zmodem: sending '{}' ({} bytes)", name, data.len());
        emit(
            &mut self.cancel_requested,
            sink,
            Event::Started {
                file_name: Some(name),
                file_size: data.len() as u64,
            },
        );
        self.send_hex_frame(ZRQINIT, [0; 4], sink);
        Ok(())
    }

    pub fn start_receive(&mut self, sink: &mut dyn EventSink) -> Result<(), TransferError> {
        if self.state != State::Idle {
            return Err(TransferError::AlreadyStarted);
        }
        self.direction = Direction::Receive;
        self.state = State::RecvWaitFile;
        debug!("zmodem: receive started");
        self.send_zrinit(sink);
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
            State::SendWaitZrinit | State::SendWaitZrpos | State::RecvWaitFile
            | State::RecvFileInfo => TransferState::Starting,
            State::RecvWaitZdata | State::RecvData => TransferState::Transferring,
            State::SendWaitEofAck | State::SendWaitZfin => TransferState::Completing,
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
    // Wire scanner
    // ------------------------------------------------------------------

    fn handle_byte(&mut self, byte: u8, sink: &mut dyn EventSink) {
        // A run of raw CANs aborts the session regardless of scanner state
        if byte == CAN {
            self.can_count += 1;
            if self.can_count >= CAN_RUN_ABORT {
                debug!("zmodem: CAN run from peer, session cancelled");
                self.peer_cancelled(sink);
                return;
            }
        } else {
            self.can_count = 0;
        }

        // Software flow control bytes never reach the protocol layers:
        // a literal XON/XOFF in payload travels escaped
        if byte == XON || byte == XOFF {
            return;
        }

        self.scan_byte(byte, sink);
    }

    fn scan_byte(&mut self, byte: u8, sink: &mut dyn EventSink) {
        match self.scan {
            Scan::Hunt => {
                if byte == ZPAD {
                    self.scan = Scan::HuntZdle;
                }
            }
            Scan::HuntZdle => match byte {
                ZPAD => {}
                ZDLE => self.scan = Scan::FrameKind,
                _ => self.scan = Scan::Hunt,
            },
            Scan::FrameKind => match byte {
                ZHEX => {
                    self.frame_buf.clear();
                    self.scan = Scan::HexHeader;
                }
                ZBIN => {
                    self.frame_buf.clear();
                    self.zdle_seen = false;
                    self.scan = Scan::BinHeader { crc32: false };
                }
                ZBIN32 => {
                    self.frame_buf.clear();
                    self.zdle_seen = false;
                    self.scan = Scan::BinHeader { crc32: true };
                }
                _ => {
                    trace!("zmodem: unknown frame encoding 0x{:02X}", byte);
                    self.scan = Scan::Hunt;
                }
            },
            Scan::HexHeader => match hex_value(byte) {
                Some(nibble) => {
                    self.frame_buf.push(nibble);
                    if self.frame_buf.len() == 14 {
                        self.finish_hex_header(sink);
                    }
                }
                None => {
                    debug!("zmodem: non-hex digit 0x{:02X} in hex header", byte);
                    self.error_count += 1;
                    self.scan = Scan::Hunt;
                }
            },
            Scan::HexTrailer => match byte {
                CR => {}
                LF => self.deliver_pending(sink),
                _ => {
                    // Peer skipped the line ending; reprocess under the
                    // scanner state the frame selects
                    self.deliver_pending(sink);
                    if self.is_active() {
                        self.scan_byte(byte, sink);
                    }
                }
            },
            Scan::BinHeader { crc32: wide } => match unescape_step(&mut self.zdle_seen, byte) {
                Unescaped::Pending => {}
                Unescaped::Terminator(_) => {
                    debug!("zmodem: subpacket terminator inside binary header");
                    self.error_count += 1;
                    self.scan = Scan::Hunt;
                }
                Unescaped::Byte(value) => {
                    self.frame_buf.push(value);
                    if self.frame_buf.len() == 5 + if wide { 4 } else { 2 } {
                        self.finish_bin_header(wide, sink);
                    }
                }
            },
            Scan::Subpacket => match unescape_step(&mut self.zdle_seen, byte) {
                Unescaped::Pending => {}
                Unescaped::Byte(value) => {
                    if self.frame_buf.len() >= FRAME_BUFFER_SIZE {
                        self.fail("Subpacket too long", sink);
                        return;
                    }
                    self.frame_buf.push(value);
                }
                Unescaped::Terminator(terminator) => {
                    self.crc_pos = 0;
                    self.scan = Scan::SubpacketCrc { terminator };
                }
            },
            Scan::SubpacketCrc { terminator } => match unescape_step(&mut self.zdle_seen, byte) {
                Unescaped::Pending => {}
                Unescaped::Terminator(_) => {
                    debug!("zmodem: terminator inside subpacket CRC");
                    self.bad_subpacket(sink);
                }
                Unescaped::Byte(value) => {
                    self.crc_buf[self.crc_pos] = value;
                    self.crc_pos += 1;
                    let need = if self.subpacket_crc32 { 4 } else { 2 };
                    if self.crc_pos == need {
                        self.finish_subpacket(terminator, sink);
                    }
                }
            },
        }
    }

    fn finish_hex_header(&mut self, sink: &mut dyn EventSink) {
        let mut bytes = [0u8; 7];
        for (i, chunk) in self.frame_buf.chunks_exact(2).enumerate() {
            bytes[i] = (chunk[0] << 4) | chunk[1];
        }
        let frame_type = bytes[0];
        let data = [bytes[1], bytes[2], bytes[3], bytes[4]];
        let wire_crc = u16::from_be_bytes([bytes[5], bytes[6]]);
        if wire_crc != crc16(&bytes[..5]) {
            debug!("zmodem: hex frame type {} failed CRC", frame_type);
            if self.count_retry("Too many errors", sink) {
                self.send_znak(sink);
            }
            self.scan = Scan::Hunt;
            return;
        }
        self.pending_frame = Some((frame_type, data));
        self.scan = Scan::HexTrailer;
    }

    fn finish_bin_header(&mut self, wide: bool, sink: &mut dyn EventSink) {
        let frame_type = self.frame_buf[0];
        let data = [
            self.frame_buf[1],
            self.frame_buf[2],
            self.frame_buf[3],
            self.frame_buf[4],
        ];
        let valid = if wide {
            let wire = u32::from_le_bytes([
                self.frame_buf[5],
                self.frame_buf[6],
                self.frame_buf[7],
                self.frame_buf[8],
            ]);
            wire == crc32(&self.frame_buf[..5])
        } else {
            let wire = u16::from_be_bytes([self.frame_buf[5], self.frame_buf[6]]);
            wire == crc16(&self.frame_buf[..5])
        };
        self.scan = Scan::Hunt;
        if !valid {
            debug!("zmodem: binary frame type {} failed CRC", frame_type);
            if self.count_retry("Too many errors", sink) {
                self.send_znak(sink);
            }
            return;
        }
        // The binary encoding picks the subpacket CRC width for the data
        // that follows
        if self.direction == Direction::Receive {
            self.use_crc32 = wide;
        }
        self.on_frame(frame_type, data, sink);
    }

    fn deliver_pending(&mut self, sink: &mut dyn EventSink) {
        self.scan = Scan::Hunt;
        if let Some((frame_type, data)) = self.pending_frame.take() {
            self.on_frame(frame_type, data, sink);
        }
    }

    fn finish_subpacket(&mut self, terminator: u8, sink: &mut dyn EventSink) {
        let valid = if self.subpacket_crc32 {
            let wire = u32::from_le_bytes(self.crc_buf);
            wire == crc32_with_trailer(&self.frame_buf, terminator)
        } else {
            let wire = u16::from_be_bytes([self.crc_buf[0], self.crc_buf[1]]);
            wire == crc16_with_trailer(&self.frame_buf, terminator)
        };
        if !valid {
            debug!("zmodem: subpacket failed CRC check");
            self.bad_subpacket(sink);
            return;
        }
        let payload = std::mem::take(&mut self.frame_buf);
        self.on_subpacket(&payload, terminator, sink);
        self.frame_buf = payload;
        self.frame_buf.clear();
    }

    /// Transient subpacket damage. The file-info subpacket is asked for
    /// again with ZNAK; data subpackets restart the stream with ZRPOS.
    fn bad_subpacket(&mut self, sink: &mut dyn EventSink) {
        self.frame_buf.clear();
        self.zdle_seen = false;
        self.scan = Scan::Hunt;
        if !self.count_retry("Too many errors", sink) {
            return;
        }
        match self.state {
            State::RecvFileInfo => {
                self.state = State::RecvWaitFile;
                self.send_znak(sink);
            }
            State::RecvData => {
                self.state = State::RecvWaitZdata;
                let offset = (self.received.len() - self.file_base) as u32;
                self.send_hex_frame(ZRPOS, offset.to_le_bytes(), sink);
            }
            _ => {}
        }
    }

    // ------------------------------------------------------------------
    // Frame dispatch
    // ------------------------------------------------------------------

    fn on_frame(&mut self, frame_type: u8, data: [u8; 4], sink: &mut dyn EventSink) {
        trace!("zmodem: frame type {} data {:02X?}", frame_type, data);
        match frame_type {
            ZABORT | ZCAN => {
                debug!("zmodem: peer aborted");
                self.peer_cancelled(sink);
                return;
            }
            ZFERR => {
                self.fail("Peer reported fatal error", sink);
                return;
            }
            ZNAK => {
                if self.count_retry("Too many retries", sink) {
                    self.resend_last(sink);
                }
                return;
            }
            _ => {}
        }

        match self.state {
            State::SendWaitZrinit => match frame_type {
                ZRINIT => {
                    // Capability flags ride in the last data byte
                    self.use_crc32 = data[3] & CANFC32 != 0;
                    debug!(
                        "zmodem: peer ready, caps 0x{:02X}, crc32={}",
                        data[3], self.use_crc32
                    );
                    self.send_file_info(sink);
                    self.state = State::SendWaitZrpos;
                }
                _ => trace!("zmodem: ignoring frame {} awaiting ZRINIT", frame_type),
            },
            State::SendWaitZrpos => match frame_type {
                ZRPOS => {
                    let offset = u32::from_le_bytes(data) as usize;
                    self.send_offset = offset.min(self.data.len());
                    self.stream_data(sink);
                }
                ZSKIP => {
                    debug!("zmodem: receiver skipped the file");
                    self.terminate_completed(sink);
                }
                // A duplicate ZRINIT is the ZRQINIT/ZRINIT startup
                // crossing; the ZFILE already on the wire answers it
                ZRINIT => {}
                _ => trace!("zmodem: ignoring frame {} awaiting ZRPOS", frame_type),
            },
            State::SendWaitEofAck => match frame_type {
                ZRINIT => {
                    self.send_hex_frame(ZFIN, [0; 4], sink);
                    self.state = State::SendWaitZfin;
                }
                ZRPOS => {
                    // Receiver lost data: rewind and stream again
                    let offset = u32::from_le_bytes(data) as usize;
                    debug!("zmodem: resume requested at offset {}", offset);
                    self.send_offset = offset.min(self.data.len());
                    self.stream_data(sink);
                }
                ZACK => {}
                ZSKIP => self.terminate_completed(sink),
                _ => trace!("zmodem: ignoring frame {} awaiting EOF ack", frame_type),
            },
            State::SendWaitZfin => match frame_type {
                ZFIN => self.terminate_completed(sink),
                _ => {}
            },
            State::RecvWaitFile => match frame_type {
                ZRQINIT => self.send_zrinit(sink),
                ZFILE => {
                    self.begin_subpacket();
                    self.state = State::RecvFileInfo;
                }
                ZSINIT => self.send_hex_frame(ZACK, [0; 4], sink),
                ZFIN => {
                    self.send_hex_frame(ZFIN, [0; 4], sink);
                    self.terminate_completed(sink);
                }
                _ => trace!("zmodem: ignoring frame {} awaiting file", frame_type),
            },
            State::RecvWaitZdata => match frame_type {
                ZDATA => {
                    let offset = u32::from_le_bytes(data) as usize;
                    let absolute = self.file_base + offset;
                    if absolute > self.received.len() {
                        // A gap we cannot fill: tell the sender where we are
                        let have = (self.received.len() - self.file_base) as u32;
                        self.send_hex_frame(ZRPOS, have.to_le_bytes(), sink);
                    } else {
                        self.received.truncate(absolute);
                        self.file_pos = offset as u64;
                        self.begin_subpacket();
                        self.state = State::RecvData;
                    }
                }
                ZEOF => {
                    let offset = u32::from_le_bytes(data) as usize;
                    if self.file_base + offset == self.received.len() {
                        debug!("zmodem: end of file at offset {}", offset);
                        self.state = State::RecvWaitFile;
                        self.send_zrinit(sink);
                    } else {
                        let have = (self.received.len() - self.file_base) as u32;
                        self.send_hex_frame(ZRPOS, have.to_le_bytes(), sink);
                    }
                }
                ZFILE => {
                    self.begin_subpacket();
                    self.state = State::RecvFileInfo;
                }
                ZFIN => {
                    self.send_hex_frame(ZFIN, [0; 4], sink);
                    self.terminate_completed(sink);
                }
                _ => trace!("zmodem: ignoring frame {} awaiting ZDATA", frame_type),
            },
            State::RecvFileInfo | State::RecvData => {
                // The scanner is collecting a subpacket; a parsable frame
                // here means the peer restarted
                if frame_type == ZFILE {
                    self.begin_subpacket();
                    self.state = State::RecvFileInfo;
                }
            }
            State::Idle | State::Completed | State::Failed | State::Cancelled => {}
        }
    }

    fn begin_subpacket(&mut self) {
        self.frame_buf.clear();
        self.zdle_seen = false;
        self.subpacket_crc32 = self.use_crc32;
        self.scan = Scan::Subpacket;
    }

    // ------------------------------------------------------------------
    // Subpacket dispatch
    // ------------------------------------------------------------------

    fn on_subpacket(&mut self, payload: &[u8], terminator: u8, sink: &mut dyn EventSink) {
        match self.state {
            State::RecvFileInfo => self.accept_file_info(payload, sink),
            State::RecvData => {
                self.received.extend_from_slice(payload);
                self.file_pos += payload.len() as u64;
                self.blocks_done += 1;
                self.retries = 0;
                trace!(
                    "zmodem: subpacket {} bytes, terminator '{}'",
                    payload.len(),
                    terminator as char
                );
                self.emit_progress(sink);
                match terminator {
                    ZCRCG => self.begin_subpacket(),
                    ZCRCQ => {
                        let pos = self.file_pos as u32;
                        self.send_hex_frame(ZACK, pos.to_le_bytes(), sink);
                        self.begin_subpacket();
                    }
                    ZCRCW => {
                        let pos = self.file_pos as u32;
                        self.send_hex_frame(ZACK, pos.to_le_bytes(), sink);
                        self.state = State::RecvWaitZdata;
                        self.scan = Scan::Hunt;
                    }
                    // ZCRCE: the frame is over, a new header follows
                    _ => {
                        self.state = State::RecvWaitZdata;
                        self.scan = Scan::Hunt;
                    }
                }
            }
            _ => {}
        }
    }

    /// ZFILE info subpacket: `name NUL decimal-size NUL`.
    fn accept_file_info(&mut self, payload: &[u8], sink: &mut dyn EventSink) {
        let name_end = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
        if name_end > MAX_FILENAME_LEN {
            self.fail("File name too long", sink);
            return;
        }
        let name = String::from_utf8_lossy(&payload[..name_end]).into_owned();
        let mut size = 0u64;
        for &b in payload.iter().skip(name_end + 1) {
            if b.is_ascii_digit() {
                size = size * 10 + (b - b'0') as u64;
            } else {
                break;
            }
        }

        debug!("zmodem: receiving '{}' ({} bytes)", name, size);
        self.file_name = Some(name);
        self.file_size = size;
        self.file_base = self.received.len();
        self.file_pos = 0;
        self.retries = 0;
        self.state = State::RecvWaitZdata;
        self.scan = Scan::Hunt;
        emit(
            &mut self.cancel_requested,
            sink,
            Event::Started {
                file_name: self.file_name.as_deref(),
                file_size: self.file_size,
            },
        );
        self.send_hex_frame(ZRPOS, [0; 4], sink);
    }

    // ------------------------------------------------------------------
    // Frame and subpacket emission
    // ------------------------------------------------------------------

    /// Hex frame: `ZPAD ZPAD ZDLE ZHEX` + type + four data bytes + CRC-16
    /// over the five, all as lowercase hex digits, then CR LF XON.
    fn send_hex_frame(&mut self, frame_type: u8, data: [u8; 4], sink: &mut dyn EventSink) {
        let mut out = std::mem::take(&mut self.out);
        out.clear();
        out.extend_from_slice(&[ZPAD, ZPAD, ZDLE, ZHEX]);
        push_hex(&mut out, frame_type);
        for byte in data {
            push_hex(&mut out, byte);
        }
        let header = [frame_type, data[0], data[1], data[2], data[3]];
        let crc = crc16(&header);
        push_hex(&mut out, (crc >> 8) as u8);
        push_hex(&mut out, (crc & 0xFF) as u8);
        out.extend_from_slice(&[CR, LF, XON]);
        self.out = out;
        if frame_type != ZNAK {
            self.last_frame = Some((frame_type, data));
            self.last_was_file_info = false;
        }
        trace!("zmodem: sending hex frame type {}", frame_type);
        emit(
            &mut self.cancel_requested,
            sink,
            Event::SendData(&self.out),
        );
    }

    fn send_znak(&mut self, sink: &mut dyn EventSink) {
        self.send_hex_frame(ZNAK, [0; 4], sink);
    }

    fn send_zrinit(&mut self, sink: &mut dyn EventSink) {
        self.send_hex_frame(ZRINIT, [0, 0, 0, CANFDX | CANOVIO | CANFC32], sink);
    }

    /// ZFILE frame plus the ZCRCW info subpacket carrying
    /// `name NUL decimal-size NUL`.
    fn send_file_info(&mut self, sink: &mut dyn EventSink) {
        self.send_hex_frame(ZFILE, [0; 4], sink);
        let mut info = Vec::new();
        if let Some(name) = &self.file_name {
            info.extend_from_slice(name.as_bytes());
        }
        info.push(0);
        info.extend_from_slice(format!("{}", self.data.len()).as_bytes());
        info.push(0);
        self.send_subpacket(&info, ZCRCW, sink);
        self.last_was_file_info = true;
    }

    /// Escaped payload, ZDLE + terminator, then the escaped CRC trailer
    /// computed over payload + terminator.
    fn send_subpacket(&mut self, payload: &[u8], terminator: u8, sink: &mut dyn EventSink) {
        let mut out = std::mem::take(&mut self.out);
        out.clear();
        for &byte in payload {
            escape_into(&mut out, byte);
        }
        out.push(ZDLE);
        out.push(terminator);
        if self.use_crc32 {
            let crc = crc32_with_trailer(payload, terminator);
            for byte in crc.to_le_bytes() {
                escape_into(&mut out, byte);
            }
        } else {
            let crc = crc16_with_trailer(payload, terminator);
            escape_into(&mut out, (crc >> 8) as u8);
            escape_into(&mut out, (crc & 0xFF) as u8);
        }
        self.out = out;
        emit(
            &mut self.cancel_requested,
            sink,
            Event::SendData(&self.out),
        );
    }

    fn resend_last(&mut self, sink: &mut dyn EventSink) {
        if self.last_was_file_info {
            self.send_file_info(sink);
        } else if let Some((frame_type, data)) = self.last_frame {
            debug!("zmodem: resending frame type {}", frame_type);
            self.send_hex_frame(frame_type, data, sink);
        }
    }

    /// Streams the remainder of the file from `send_offset`: a ZDATA
    /// header carrying the offset, ZCRCG subpackets, a final ZCRCE, then
    /// ZEOF with the end-of-file offset.
    fn stream_data(&mut self, sink: &mut dyn EventSink) {
        let data = std::mem::take(&mut self.data);
        self.file_pos = self.send_offset as u64;
        debug!(
            "zmodem: streaming {} bytes from offset {}",
            data.len() - self.send_offset,
            self.send_offset
        );
        self.send_hex_frame(ZDATA, (self.send_offset as u32).to_le_bytes(), sink);
        loop {
            let start = self.send_offset;
            let end = (start + SUBPACKET_SIZE).min(data.len());
            let terminator = if end == data.len() { ZCRCE } else { ZCRCG };
            self.send_subpacket(&data[start..end], terminator, sink);
            self.send_offset = end;
            self.file_pos = end as u64;
            self.blocks_done += 1;
            self.emit_progress(sink);
            if end == data.len() || self.cancel_requested {
                break;
            }
        }
        self.send_hex_frame(ZEOF, (data.len() as u32).to_le_bytes(), sink);
        self.data = data;
        self.state = State::SendWaitEofAck;
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
        debug!("zmodem: failing: {}", message);
        emit(
            &mut self.cancel_requested,
            sink,
            Event::SendData(&CANCEL_SEQUENCE),
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
            Event::SendData(&CANCEL_SEQUENCE),
        );
        self.state = State::Cancelled;
        self.cancel_requested = false;
        emit(&mut self.cancel_requested, sink, Event::Cancelled);
    }

    fn peer_cancelled(&mut self, sink: &mut dyn EventSink) {
        self.state = State::Cancelled;
        self.cancel_requested = false;
        emit(&mut self.cancel_requested, sink, Event::Cancelled);
    }

    fn emit_progress(&mut self, sink: &mut dyn EventSink) {
        let transferred = match self.direction {
            Direction::Send => self.file_pos,
            Direction::Receive => self.received.len() as u64,
        };
        let state = self.transfer_state();
        emit(
            &mut self.cancel_requested,
            sink,
            Event::Progress(Progress {
                state,
                bytes_transferred: transferred,
                total_bytes: self.file_size,
                current_block: self.blocks_done,
                error_count: self.error_count,
                file_name: self.file_name.as_deref(),
            }),
        );
    }
}

impl Default for Zmodem {
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

    /// Builds the exact wire bytes of a hex frame, for feeding and for
    /// comparing against engine output.
    fn hex_frame(frame_type: u8, data: [u8; 4]) -> Vec<u8> {
        let mut out = vec![ZPAD, ZPAD, ZDLE, ZHEX];
        push_hex(&mut out, frame_type);
        for byte in data {
            push_hex(&mut out, byte);
        }
        let crc = crc16(&[frame_type, data[0], data[1], data[2], data[3]]);
        push_hex(&mut out, (crc >> 8) as u8);
        push_hex(&mut out, (crc & 0xFF) as u8);
        out.extend_from_slice(&[CR, LF, XON]);
        out
    }

    fn subpacket(payload: &[u8], terminator: u8, wide: bool) -> Vec<u8> {
        let mut out = Vec::new();
        for &byte in payload {
            escape_into(&mut out, byte);
        }
        out.push(ZDLE);
        out.push(terminator);
        if wide {
            for byte in crc32_with_trailer(payload, terminator).to_le_bytes() {
                escape_into(&mut out, byte);
            }
        } else {
            let crc = crc16_with_trailer(payload, terminator);
            escape_into(&mut out, (crc >> 8) as u8);
            escape_into(&mut out, (crc & 0xFF) as u8);
        }
        out
    }

    fn bin_frame(frame_type: u8, data: [u8; 4]) -> Vec<u8> {
        let mut out = vec![ZPAD, ZDLE, ZBIN];
        let header = [frame_type, data[0], data[1], data[2], data[3]];
        for byte in header {
            escape_into(&mut out, byte);
        }
        let crc = crc16(&header);
        escape_into(&mut out, (crc >> 8) as u8);
        escape_into(&mut out, (crc & 0xFF) as u8);
        out
    }

    const RECV_CAPS: [u8; 4] = [0, 0, 0, CANFDX | CANOVIO | CANFC32];

    #[test]
    fn test_detect_autostart() {
        assert!(detect_autostart(b"rz\r"));
        assert!(detect_autostart(b"**\x18B00"));
        assert!(detect_autostart(b"noise before rz\r and after"));
        assert!(!detect_autostart(b"hello"));
        assert!(!detect_autostart(b""));
        assert!(!detect_autostart(b"rz"));
    }

    #[test]
    fn test_escape_unescape_roundtrip() {
        let mut bytes: Vec<u8> = (0u16..=255).map(|b| b as u8).collect();
        bytes.extend_from_slice(&[ZDLE, ZDLE, 0x00, 0xFF, 0x7F, b'h', b'k', ZDLEE]);

        let mut wire = Vec::new();
        for &byte in &bytes {
            escape_into(&mut wire, byte);
        }

        let mut decoded = Vec::new();
        let mut zdle_seen = false;
        for &byte in &wire {
            match unescape_step(&mut zdle_seen, byte) {
                Unescaped::Byte(value) => decoded.push(value),
                Unescaped::Pending => {}
                Unescaped::Terminator(t) => panic!("spurious terminator {}", t),
            }
        }
        assert_eq!(decoded, bytes);
    }

    #[test]
    fn test_escaped_bytes_avoid_bare_controls() {
        let mut wire = Vec::new();
        for byte in 0u16..=255 {
            escape_into(&mut wire, byte as u8);
        }
        // Nothing below 0x20 appears outside a ZDLE pair
        let mut iter = wire.iter().peekable();
        while let Some(&byte) = iter.next() {
            if byte == ZDLE {
                iter.next();
            } else {
                assert!(byte >= 0x20 && byte != 0x7F && byte != 0xFF);
            }
        }
    }

    #[test]
    fn test_receiver_announces_capabilities() {
        let mut log = EventLog::new();
        let mut zm = Zmodem::new();
        zm.start_receive(&mut log).unwrap();
        assert_eq!(log.drain_output(), hex_frame(ZRINIT, RECV_CAPS));
    }

    #[test]
    fn test_sender_full_exchange() {
        let data: Vec<u8> = (0u32..2500).map(|i| (i % 251) as u8).collect();
        let mut log = EventLog::new();
        let mut zm = Zmodem::new();
        zm.start_send(Some("fw.bin"), &data, &mut log).unwrap();
        assert_eq!(log.drain_output(), hex_frame(ZRQINIT, [0; 4]));

        // ZRINIT with CRC-32 capability selects 32-bit subpackets
        zm.process_data(&hex_frame(ZRINIT, RECV_CAPS), &mut log);
        let mut expected = hex_frame(ZFILE, [0; 4]);
        expected.extend_from_slice(&subpacket(b"fw.bin\x002500\x00", ZCRCW, true));
        assert_eq!(log.drain_output(), expected);

        // ZRPOS(0): full stream, three subpackets, then ZEOF
        zm.process_data(&hex_frame(ZRPOS, [0; 4]), &mut log);
        let mut stream = hex_frame(ZDATA, [0; 4]);
        stream.extend_from_slice(&subpacket(&data[..1024], ZCRCG, true));
        stream.extend_from_slice(&subpacket(&data[1024..2048], ZCRCG, true));
        stream.extend_from_slice(&subpacket(&data[2048..], ZCRCE, true));
        stream.extend_from_slice(&hex_frame(ZEOF, 2500u32.to_le_bytes()));
        assert_eq!(log.drain_output(), stream);

        // ZRINIT acknowledges the EOF; ZFIN closes
        zm.process_data(&hex_frame(ZRINIT, RECV_CAPS), &mut log);
        assert_eq!(log.drain_output(), hex_frame(ZFIN, [0; 4]));
        zm.process_data(&hex_frame(ZFIN, [0; 4]), &mut log);
        assert!(log.completed());
        assert!(!zm.is_active());
    }

    #[test]
    fn test_sender_crc16_when_peer_lacks_canfc32() {
        let mut log = EventLog::new();
        let mut zm = Zmodem::new();
        zm.start_send(Some("a"), b"payload", &mut log).unwrap();
        log.drain_output();

        zm.process_data(&hex_frame(ZRINIT, [0, 0, 0, CANFDX]), &mut log);
        let mut expected = hex_frame(ZFILE, [0; 4]);
        expected.extend_from_slice(&subpacket(b"a\x007\x00", ZCRCW, false));
        assert_eq!(log.drain_output(), expected);
    }

    #[test]
    fn test_sender_resume_from_zrpos() {
        let data: Vec<u8> = (0u32..10_000).map(|i| (i % 251) as u8).collect();
        let mut log = EventLog::new();
        let mut zm = Zmodem::new();
        zm.start_send(Some("big.bin"), &data, &mut log).unwrap();
        zm.process_data(&hex_frame(ZRINIT, RECV_CAPS), &mut log);
        zm.process_data(&hex_frame(ZRPOS, [0; 4]), &mut log);
        log.drain_output();

        // The receiver lost data and asks to resume at 2048
        zm.process_data(&hex_frame(ZRPOS, 2048u32.to_le_bytes()), &mut log);
        let out = log.drain_output();
        let header = hex_frame(ZDATA, 2048u32.to_le_bytes());
        assert_eq!(&out[..header.len()], header.as_slice());
        // First subpacket byte is data[2048] (0x28: travels unescaped)
        assert_eq!(data[2048], 0x28);
        assert_eq!(out[header.len()], data[2048]);

        // The rewound stream still finishes at the file size
        let eof = hex_frame(ZEOF, 10_000u32.to_le_bytes());
        assert_eq!(&out[out.len() - eof.len()..], eof.as_slice());
    }

    #[test]
    fn test_sender_completes_on_zskip() {
        let mut log = EventLog::new();
        let mut zm = Zmodem::new();
        zm.start_send(Some("s"), b"abc", &mut log).unwrap();
        zm.process_data(&hex_frame(ZRINIT, RECV_CAPS), &mut log);
        zm.process_data(&hex_frame(ZSKIP, [0; 4]), &mut log);
        assert!(log.completed());
    }

    #[test]
    fn test_receiver_full_exchange() {
        let payload: Vec<u8> = (0u32..1500).map(|i| (i * 3 % 256) as u8).collect();
        let mut log = EventLog::new();
        let mut zm = Zmodem::new();
        zm.start_receive(&mut log).unwrap();
        log.drain_output();

        // ZFILE + info subpacket: engine answers ZRPOS(0)
        zm.process_data(&hex_frame(ZFILE, [0; 4]), &mut log);
        zm.process_data(&subpacket(b"notes.txt\x001500\x00", ZCRCW, true), &mut log);
        assert_eq!(log.drain_output(), hex_frame(ZRPOS, [0; 4]));
        assert_eq!(zm.file_name(), Some("notes.txt"));

        // ZDATA + two subpackets
        zm.process_data(&hex_frame(ZDATA, [0; 4]), &mut log);
        zm.process_data(&subpacket(&payload[..1024], ZCRCG, true), &mut log);
        zm.process_data(&subpacket(&payload[1024..], ZCRCE, true), &mut log);
        assert!(log.drain_output().is_empty());
        assert_eq!(zm.received_data(), payload.as_slice());

        // ZEOF at the right offset: ready for the next file
        zm.process_data(&hex_frame(ZEOF, 1500u32.to_le_bytes()), &mut log);
        assert_eq!(log.drain_output(), hex_frame(ZRINIT, RECV_CAPS));

        // ZFIN: answered and completed
        zm.process_data(&hex_frame(ZFIN, [0; 4]), &mut log);
        assert_eq!(log.drain_output(), hex_frame(ZFIN, [0; 4]));
        assert!(log.completed());
    }

    #[test]
    fn test_receiver_zcrcw_gets_zack() {
        let mut log = EventLog::new();
        let mut zm = Zmodem::new();
        zm.start_receive(&mut log).unwrap();
        zm.process_data(&hex_frame(ZFILE, [0; 4]), &mut log);
        zm.process_data(&subpacket(b"f\x00100\x00", ZCRCW, true), &mut log);
        log.drain_output();

        zm.process_data(&hex_frame(ZDATA, [0; 4]), &mut log);
        zm.process_data(&subpacket(&[0x41; 100], ZCRCW, true), &mut log);
        assert_eq!(log.drain_output(), hex_frame(ZACK, 100u32.to_le_bytes()));
    }

    #[test]
    fn test_receiver_bad_subpacket_requests_rewind() {
        let mut log = EventLog::new();
        let mut zm = Zmodem::new();
        zm.start_receive(&mut log).unwrap();
        zm.process_data(&hex_frame(ZFILE, [0; 4]), &mut log);
        zm.process_data(&subpacket(b"f\x00200\x00", ZCRCW, true), &mut log);
        log.drain_output();

        // First 100 bytes land
        zm.process_data(&hex_frame(ZDATA, [0; 4]), &mut log);
        zm.process_data(&subpacket(&[1u8; 100], ZCRCE, true), &mut log);
        log.drain_output();

        // Continuation arrives corrupted
        let mut bad = subpacket(&[2u8; 100], ZCRCE, true);
        let len = bad.len();
        bad[len - 1] ^= 0xFF; // clobber the CRC trailer
        zm.process_data(&hex_frame(ZDATA, 100u32.to_le_bytes()), &mut log);
        zm.process_data(&bad, &mut log);
        assert_eq!(log.drain_output(), hex_frame(ZRPOS, 100u32.to_le_bytes()));
        assert_eq!(zm.received_data().len(), 100);

        // Retransmission from offset 100 is accepted
        zm.process_data(&hex_frame(ZDATA, 100u32.to_le_bytes()), &mut log);
        zm.process_data(&subpacket(&[2u8; 100], ZCRCE, true), &mut log);
        assert_eq!(zm.received_data().len(), 200);
    }

    #[test]
    fn test_receiver_accepts_binary_crc16_frames() {
        let mut log = EventLog::new();
        let mut zm = Zmodem::new();
        zm.start_receive(&mut log).unwrap();
        zm.process_data(&hex_frame(ZFILE, [0; 4]), &mut log);
        zm.process_data(&subpacket(b"f\x0050\x00", ZCRCW, true), &mut log);
        log.drain_output();

        // A ZBIN ZDATA frame flips the subpacket CRC width to 16 bits
        zm.process_data(&bin_frame(ZDATA, [0; 4]), &mut log);
        zm.process_data(&subpacket(&[9u8; 50], ZCRCE, false), &mut log);
        assert_eq!(zm.received_data(), &[9u8; 50][..]);
    }

    #[test]
    fn test_receiver_renegotiates_on_zrqinit() {
        let mut log = EventLog::new();
        let mut zm = Zmodem::new();
        zm.start_receive(&mut log).unwrap();
        log.drain_output();
        zm.process_data(&hex_frame(ZRQINIT, [0; 4]), &mut log);
        assert_eq!(log.drain_output(), hex_frame(ZRINIT, RECV_CAPS));
    }

    #[test]
    fn test_garbled_hex_frame_draws_znak() {
        let mut log = EventLog::new();
        let mut zm = Zmodem::new();
        zm.start_receive(&mut log).unwrap();
        log.drain_output();

        let mut bad = hex_frame(ZFILE, [0; 4]);
        bad[6] = b'f'; // corrupt a type digit
        zm.process_data(&bad, &mut log);
        assert_eq!(log.drain_output(), hex_frame(ZNAK, [0; 4]));
    }

    #[test]
    fn test_znak_triggers_resend() {
        let mut log = EventLog::new();
        let mut zm = Zmodem::new();
        zm.start_send(Some("r"), b"xy", &mut log).unwrap();
        log.drain_output();

        zm.process_data(&hex_frame(ZNAK, [0; 4]), &mut log);
        assert_eq!(log.drain_output(), hex_frame(ZRQINIT, [0; 4]));

        // After ZFILE, a ZNAK re-sends the frame and its info subpacket
        zm.process_data(&hex_frame(ZRINIT, RECV_CAPS), &mut log);
        let file_info = log.drain_output();
        zm.process_data(&hex_frame(ZNAK, [0; 4]), &mut log);
        assert_eq!(log.drain_output(), file_info);
    }

    #[test]
    fn test_cancel_emits_wire_sequence_once() {
        let mut log = EventLog::new();
        let mut zm = Zmodem::new();
        zm.start_receive(&mut log).unwrap();
        log.drain_output();

        zm.cancel(&mut log);
        let out = log.drain_output();
        assert_eq!(out.len(), 18);
        assert!(out[..8].iter().all(|&b| b == ZDLE));
        assert!(out[8..].iter().all(|&b| b == 0x08));

        zm.cancel(&mut log);
        assert!(log.drain_output().is_empty());
        assert_eq!(log.count(|e| matches!(e, LoggedEvent::Cancelled)), 1);
    }

    #[test]
    fn test_peer_can_run_cancels_quietly() {
        let mut log = EventLog::new();
        let mut zm = Zmodem::new();
        zm.start_receive(&mut log).unwrap();
        log.drain_output();

        zm.process_data(&[CAN, CAN, CAN, CAN, CAN], &mut log);
        assert!(!zm.is_active());
        assert_eq!(log.count(|e| matches!(e, LoggedEvent::Cancelled)), 1);
        assert!(log.drain_output().is_empty());
    }

    #[test]
    fn test_zabort_frame_cancels() {
        let mut log = EventLog::new();
        let mut zm = Zmodem::new();
        zm.start_send(Some("x"), b"d", &mut log).unwrap();
        zm.process_data(&hex_frame(ZABORT, [0; 4]), &mut log);
        assert!(!zm.is_active());
        assert_eq!(log.count(|e| matches!(e, LoggedEvent::Cancelled)), 1);
    }

    #[test]
    fn test_roundtrip_lossless_pipe() {
        let data: Vec<u8> = (0u32..20_000).map(|i| (i.wrapping_mul(37) >> 3) as u8).collect();
        let mut send_log = EventLog::new();
        let mut recv_log = EventLog::new();
        let mut sender = Zmodem::new();
        let mut receiver = Zmodem::new();
        sender
            .start_send(Some("image.dat"), &data, &mut send_log)
            .unwrap();
        receiver.start_receive(&mut recv_log).unwrap();

        for _ in 0..100 {
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
        assert_eq!(receiver.received_data(), data.as_slice());
        assert_eq!(receiver.file_name(), Some("image.dat"));

        let started = recv_log
            .events()
            .into_iter()
            .find(|e| matches!(e, LoggedEvent::Started { .. }))
            .unwrap();
        assert_eq!(
            started,
            LoggedEvent::Started {
                file_name: Some("image.dat".to_owned()),
                file_size: 20_000,
            }
        );
    }

    #[test]
    fn test_roundtrip_empty_file() {
        let mut send_log = EventLog::new();
        let mut recv_log = EventLog::new();
        let mut sender = Zmodem::new();
        let mut receiver = Zmodem::new();
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
    fn test_terminal_state_ignores_input() {
        let mut log = EventLog::new();
        let mut zm = Zmodem::new();
        zm.start_receive(&mut log).unwrap();
        zm.cancel(&mut log);
        log.drain_output();

        zm.process_data(&hex_frame(ZFILE, [0; 4]), &mut log);
        assert!(log.drain_output().is_empty());
    }
}
