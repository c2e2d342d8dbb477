//! Firmware transfer state and page planning.

use std::fmt;

use crate::protocol::{DFU_PAGE_SIZE, DFU_SUB_WRITE_SIZE};

/// State of a firmware update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DfuState {
    #[default]
    Idle,
    /// Length header sent, waiting for the bootloader to accept it.
    AwaitingLengthAck,
    /// Sending full pages, one ack per page.
    TransferringPages,
    /// Remainder sent, waiting for the final ack.
    AwaitingFinalAck,
    Done,
    Failed,
}

impl fmt::Display for DfuState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DfuState::Idle => write!(f, "IDLE"),
            DfuState::AwaitingLengthAck => write!(f, "AWAITING_LENGTH_ACK"),
            DfuState::TransferringPages => write!(f, "TRANSFERRING_PAGES"),
            DfuState::AwaitingFinalAck => write!(f, "AWAITING_FINAL_ACK"),
            DfuState::Done => write!(f, "DONE"),
            DfuState::Failed => write!(f, "FAILED"),
        }
    }
}

/// How an image is cut into bootloader pages.
///
/// Every full page is acknowledged, then the remainder (possibly empty) is
/// sent and acknowledged once more.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagePlan {
    pub total_bytes: usize,
    pub full_pages: usize,
    pub remainder: usize,
}

impl PagePlan {
    pub fn new(total_bytes: usize) -> Self {
        Self {
            total_bytes,
            full_pages: total_bytes / DFU_PAGE_SIZE,
            remainder: total_bytes % DFU_PAGE_SIZE,
        }
    }

    /// Acknowledgment waits for the whole transfer, length header included.
    pub fn ack_waits(&self) -> usize {
        1 + self.full_pages + 1
    }

    /// Iterator over the full pages of `image`.
    pub fn pages<'a>(&self, image: &'a [u8]) -> impl Iterator<Item = &'a [u8]> + 'a {
        image[..self.full_pages * DFU_PAGE_SIZE].chunks_exact(DFU_PAGE_SIZE)
    }

    /// Trailing partial page of `image`.
    pub fn remainder<'a>(&self, image: &'a [u8]) -> &'a [u8] {
        &image[self.full_pages * DFU_PAGE_SIZE..self.total_bytes]
    }
}

/// Split a page (or remainder) into the bus writes the bootloader accepts.
///
/// Anything longer than one sub-write goes out as two; an empty remainder
/// is still sent as a single zero-length write.
pub fn sub_writes(page: &[u8]) -> Vec<&[u8]> {
    if page.len() > DFU_SUB_WRITE_SIZE {
        let (first, second) = page.split_at(DFU_SUB_WRITE_SIZE);
        vec![first, second]
    } else {
        vec![page]
    }
}

/// Transfer bookkeeping for one update.
#[derive(Debug, Default)]
pub struct DfuContext {
    pub state: DfuState,
    /// Full pages acknowledged so far.
    pub pages_done: usize,
    /// Image bytes acknowledged so far.
    pub bytes_done: usize,
    /// Acknowledgment waits completed.
    pub acks: usize,
}

impl DfuContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transition to a new state.
    pub fn goto_state(&mut self, new_state: DfuState) {
        tracing::debug!(from = %self.state, to = %new_state, "DFU state transition");
        self.state = new_state;
    }
}
