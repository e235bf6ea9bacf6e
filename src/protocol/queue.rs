//! Irrigation queue paging (`BB`).
//!
//! Each page carries its page number followed by 3-byte slots
//! `{program, station, remaining minutes}`. A slot with station 0 (or a page
//! with no slots at all) ends the queue.

use serde::Serialize;

use crate::core::{Error, MAX_QUEUE_PAGES, Result};

use super::ProtocolFrame;

const SLOT_DIGITS: usize = 6;

/// One queued station run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueEntry {
    /// Program the run belongs to.
    pub program: u8,
    /// 1-based station number.
    pub station: u8,
    /// Minutes left for this run.
    pub remaining_minutes: u8,
}

/// One decoded queue page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuePage {
    /// Page number echoed by the controller.
    pub page: u8,
    /// Entries before the end marker.
    pub entries: Vec<QueueEntry>,
    /// Whether this page ends the queue.
    pub terminal: bool,
}

impl QueuePage {
    /// Parse a `BB` frame.
    pub fn parse(frame: &ProtocolFrame) -> Result<QueuePage> {
        let page = frame.read_uint(2, 2)? as u8;
        let mut entries = Vec::new();
        let mut terminal = true;
        let mut position = 4;
        while position + SLOT_DIGITS <= frame.len_nibbles() {
            let station = frame.read_uint(position + 2, 2)? as u8;
            if station == 0 {
                terminal = true;
                break;
            }
            entries.push(QueueEntry {
                program: frame.read_uint(position, 2)? as u8,
                station,
                remaining_minutes: frame.read_uint(position + 4, 2)? as u8,
            });
            terminal = false;
            position += SLOT_DIGITS;
        }
        Ok(QueuePage {
            page,
            entries,
            terminal,
        })
    }
}

/// Station runs waiting on the controller, in queue order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Queue {
    /// Queued runs.
    pub entries: Vec<QueueEntry>,
}

impl Queue {
    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Drives queue paging from page 0 until a terminal page.
#[derive(Debug, Default)]
pub struct QueueAssembler {
    next: u8,
    entries: Vec<QueueEntry>,
    done: bool,
}

impl QueueAssembler {
    /// Start at page 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Page to request next, or `None` when done or out of pages.
    pub fn next_page(&self) -> Option<u8> {
        (!self.done && self.next < MAX_QUEUE_PAGES).then_some(self.next)
    }

    /// Accept the reply to [`Self::next_page`]. Returns true on the
    /// terminal page.
    pub fn accept(&mut self, frame: &ProtocolFrame) -> Result<bool> {
        let page = QueuePage::parse(frame)?;
        if page.page != self.next {
            return Err(Error::UnexpectedResponse {
                command: "CurrentQueueRequest",
                expected: format!("page {:02X}", self.next),
                actual: format!("page {:02X}", page.page),
            });
        }
        self.entries.extend(page.entries);
        self.done = page.terminal;
        self.next += 1;
        Ok(self.done)
    }

    /// The assembled queue.
    pub fn finish(self) -> Result<Queue> {
        if !self.done {
            return Err(Error::QueueOverflow(MAX_QUEUE_PAGES));
        }
        Ok(Queue {
            entries: self.entries,
        })
    }
}
