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

//! Engine events and the host sink contract
//!
//! The engine is push-driven: the host feeds received bytes in and the
//! engine pushes everything else out through a single [`EventSink`],
//! including the bytes it wants written to the serial line
//! ([`Event::SendData`]).

// ============================================================================
// Lifecycle
// ============================================================================

/// Transfer lifecycle state, reported inside progress events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Idle,
    Starting,
    Transferring,
    Completing,
    Completed,
    Cancelled,
    Failed,
}

/// Transfer direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Send,
    Receive,
}

// ============================================================================
// Events
// ============================================================================

/// Counters reported with every [`Event::Progress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress<'a> {
    pub state: TransferState,
    pub bytes_transferred: u64,
    /// Declared file size; 0 when unknown (XMODEM has no size field).
    pub total_bytes: u64,
    pub current_block: u32,
    pub error_count: u32,
    pub file_name: Option<&'a str>,
}

/// An event pushed to the host from inside an engine call.
///
/// Borrowed slices are only valid for the duration of the sink call; the
/// bytes behind [`Event::SendData`] come from the engine's scratch buffers
/// and must be written (or copied) before the sink returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event<'a> {
    /// A transfer began. The name and size are known for YMODEM/ZMODEM;
    /// XMODEM carries neither on the wire.
    Started {
        file_name: Option<&'a str>,
        file_size: u64,
    },
    /// Periodic counters, at least once per accepted block.
    Progress(Progress<'a>),
    /// Bytes the host must write to the serial line now.
    SendData(&'a [u8]),
    /// Terminal: the transfer finished cleanly.
    Completed,
    /// Terminal: the transfer died; the message is short ASCII.
    Failed(&'a str),
    /// Terminal: cancelled locally or by the peer.
    Cancelled,
}

// ============================================================================
// Sink
// ============================================================================

/// What the host wants the engine to do after an event.
///
/// Returning [`SinkAction::Cancel`] from inside a callback requests
/// cancellation; the engine performs it as a normal terminal transition
/// before consuming any further input. This is the borrow-checked shape of
/// a host calling `cancel` re-entrantly from an event callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SinkAction {
    #[default]
    Continue,
    Cancel,
}

/// Receives every event a session produces, synchronously.
pub trait EventSink {
    fn on_event(&mut self, event: Event<'_>) -> SinkAction;
}

impl<F> EventSink for F
where
    F: FnMut(Event<'_>) -> SinkAction,
{
    fn on_event(&mut self, event: Event<'_>) -> SinkAction {
        self(event)
    }
}

/// Forwards an event and records a re-entrant cancel request.
///
/// Free function so callers can split-borrow: the flag and the buffers an
/// event borrows usually live in the same machine struct.
pub(crate) fn emit(cancel_requested: &mut bool, sink: &mut dyn EventSink, event: Event<'_>) {
    if sink.on_event(event) == SinkAction::Cancel {
        *cancel_requested = true;
    }
}

// ============================================================================
// Test recorder
// ============================================================================
