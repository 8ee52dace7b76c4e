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

//! Host-facing errors
//!
//! Protocol failures mid-transfer are not Rust errors; they reach the host
//! as `Event::Failed` or `Event::Cancelled`. These errors cover the calls
//! that can be rejected up front.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransferError {
    #[error("file name exceeds 255 bytes")]
    FilenameTooLong,

    #[error("file name is not printable 7-bit ASCII")]
    InvalidFilename,

    #[error("session was already started")]
    AlreadyStarted,

    #[error("unsupported baud rate {0}")]
    UnsupportedBaudRate(u32),
}
