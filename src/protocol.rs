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

//! Wire constants for the XMODEM, YMODEM and ZMODEM protocols
//!
//! The full frame-type and capability tables are listed even where the
//! engine only speaks a subset.

#![allow(dead_code)]

use crate::error::TransferError;

// ============================================================================
// XMODEM / YMODEM control bytes
// ============================================================================

/// Start of header - begins a 128-byte data block
pub const SOH: u8 = 0x01;

/// Start of text - begins a 1024-byte data block
pub const STX: u8 = 0x02;

/// End of transmission - sender signals end of file data
pub const EOT: u8 = 0x04;

/// Acknowledge - block accepted
pub const ACK: u8 = 0x06;

/// Negative acknowledge - block rejected, retransmit
pub const NAK: u8 = 0x15;

/// Cancel - either side aborts the transfer
pub const CAN: u8 = 0x18;

/// Substitute (Ctrl-Z) - pads the final block out to full size
pub const SUB: u8 = 0x1A;

/// 'C' - receiver requests CRC-16 mode instead of checksum
pub const CRC_REQ: u8 = 0x43;

// ============================================================================
// ZMODEM byte-level vocabulary
// ============================================================================

/// Frame lead padding character
pub const ZPAD: u8 = b'*';

/// Byte-level escape lead (same value as CAN)
pub const ZDLE: u8 = 0x18;

/// Escaped encoding of a literal ZDLE data byte
pub const ZDLEE: u8 = 0x58;

/// Binary frame with 16-bit CRC
pub const ZBIN: u8 = b'A';

/// Hex-encoded frame
pub const ZHEX: u8 = b'B';

/// Binary frame with 32-bit CRC
pub const ZBIN32: u8 = b'C';

/// Software flow control resume, trails every hex frame
pub const XON: u8 = 0x11;

/// Software flow control pause, stripped from the inbound stream
pub const XOFF: u8 = 0x13;

// ============================================================================
// ZMODEM subpacket terminators (sent as ZDLE + terminator)
// ============================================================================

/// Subpacket ends, no more data follows
pub const ZCRCE: u8 = b'h';

/// Subpacket ends, more data follows immediately
pub const ZCRCG: u8 = b'i';

/// Subpacket ends, receiver should respond with ZACK
pub const ZCRCQ: u8 = b'j';

/// Subpacket ends, sender waits for ZACK
pub const ZCRCW: u8 = b'k';

// ============================================================================
// ZMODEM frame types
// ============================================================================

/// Request receive init
pub const ZRQINIT: u8 = 0;

/// Receive init (capability flags)
pub const ZRINIT: u8 = 1;

/// Send init sequence
pub const ZSINIT: u8 = 2;

/// Acknowledge a frame or subpacket
pub const ZACK: u8 = 3;

/// File name and size from sender
pub const ZFILE: u8 = 4;

/// Receiver skips the offered file
pub const ZSKIP: u8 = 5;

/// Last frame was garbled, resend
pub const ZNAK: u8 = 6;

/// Abort the batch transfer
pub const ZABORT: u8 = 7;

/// Finish the session
pub const ZFIN: u8 = 8;

/// Resume data transfer at this position
pub const ZRPOS: u8 = 9;

/// Data subpackets follow
pub const ZDATA: u8 = 10;

/// End of file at this offset
pub const ZEOF: u8 = 11;

/// Fatal read or write error detected
pub const ZFERR: u8 = 12;

/// Request for file CRC and response
pub const ZCRC: u8 = 13;

/// Receiver's challenge
pub const ZCHALLENGE: u8 = 14;

/// Request is complete
pub const ZCOMPL: u8 = 15;

/// Other end cancelled the session with a CAN run
pub const ZCAN: u8 = 16;

/// Request for free bytes on filesystem
pub const ZFREECNT: u8 = 17;

/// Command from sending program
pub const ZCOMMAND: u8 = 18;

/// Output to standard error, data follows
pub const ZSTDERR: u8 = 19;

// ============================================================================
// ZMODEM receiver capability flags (ZRINIT data byte 3)
// ============================================================================

/// Receiver can handle full duplex
pub const CANFDX: u8 = 0x01;

/// Receiver can overlap disk I/O with reception
pub const CANOVIO: u8 = 0x02;

/// Receiver can send a break signal
pub const CANBRK: u8 = 0x04;

/// Receiver can verify 32-bit CRCs
pub const CANFC32: u8 = 0x20;

/// Receiver wants all control characters escaped
pub const ESCCTL: u8 = 0x40;

/// Receiver wants the eighth bit escaped
pub const ESC8: u8 = 0x80;

// ============================================================================
// Limits
// ============================================================================

/// Transient errors tolerated before a transfer fails
pub const MAX_RETRIES: u32 = 10;

/// XMODEM data payload per SOH block
pub const BLOCK_SIZE_128: usize = 128;

/// XMODEM-1K / YMODEM data payload per STX block
pub const BLOCK_SIZE_1K: usize = 1024;

/// One in-flight XMODEM/YMODEM block: header + 1K data + CRC-16
pub const BLOCK_BUFFER_SIZE: usize = 3 + BLOCK_SIZE_1K + 2;

/// Largest ZMODEM subpacket accepted from a peer
pub const MAX_BLOCK_SIZE: usize = 8192;

/// ZMODEM frame assembly bound (subpacket plus framing slack)
pub const FRAME_BUFFER_SIZE: usize = MAX_BLOCK_SIZE + 64;

/// ZMODEM data subpacket payload emitted per chunk
pub const SUBPACKET_SIZE: usize = 1024;

/// Longest file name carried by YMODEM block 0 or a ZFILE subpacket
pub const MAX_FILENAME_LEN: usize = 255;

// ============================================================================
// Filename validation
// ============================================================================

/// Checks that a file name fits on the wire: at most [`MAX_FILENAME_LEN`]
/// bytes of printable 7-bit ASCII.
pub fn validate_file_name(name: &str) -> Result<(), TransferError> {
    if name.len() > MAX_FILENAME_LEN {
        return Err(TransferError::FilenameTooLong);
    }
    if name.bytes().any(|b| b < 0x20 || b > 0x7E) {
        return Err(TransferError::InvalidFilename);
    }
    Ok(())
}
