use crate::error::{GranaryError, GranaryResult};
use bytes::Bytes;
use std::fmt::{Display, Formatter};

pub type PageId = u32;
pub type SlotId = u16;

pub const INVALID_PAGE_ID: PageId = 0;
pub const PAGE_SIZE: usize = 8192;

pub const PAGE_HEADER_SIZE: usize = 2;
pub const SLOT_ENTRY_SIZE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot_id: SlotId,
}

impl RecordId {
    pub fn new(page_id: PageId, slot_id: SlotId) -> Self {
        Self { page_id, slot_id }
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.page_id, self.slot_id)
    }
}

/// Slot directory entry. `len == 0` marks a dead slot; its `offset` is kept
/// so the free-space floor stays correct (record bytes are not compacted).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotInfo {
    pub offset: u16,
    pub len: u16,
}

/**
 * Slotted page format:
 * ```text
 *  ---------------------------------------------------------
 *  | HEADER | ... FREE SPACE ... | ... INSERTED RECORDS ... |
 *  ---------------------------------------------------------
 * ```
 *
 * Header format (big-endian):
 * ```text
 *  ---------------------------------------------
 *  | NumSlots (2) | Slot_1 offset (2) + len (2) | ... |
 *  ---------------------------------------------
 * ```
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapPage {
    pub page_id: PageId,
    pub slots: Vec<SlotInfo>,
    pub data: [u8; PAGE_SIZE],
}

impl HeapPage {
    pub fn new(page_id: PageId) -> Self {
        Self {
            page_id,
            slots: Vec::new(),
            data: [0; PAGE_SIZE],
        }
    }

    pub fn num_slots(&self) -> usize {
        self.slots.len()
    }

    fn header_size(num_slots: usize) -> usize {
        PAGE_HEADER_SIZE + num_slots * SLOT_ENTRY_SIZE
    }

    /// Lowest byte offset occupied by record data. Dead slots still count:
    /// their bytes are not reclaimed.
    fn record_floor(&self) -> usize {
        self.slots
            .iter()
            .map(|slot| slot.offset as usize)
            .min()
            .unwrap_or(PAGE_SIZE)
    }

    pub fn has_space_for_record(&self, record_len: usize) -> bool {
        Self::header_size(self.num_slots() + 1) + record_len <= self.record_floor()
    }

    pub fn insert_record(&mut self, record: &[u8]) -> GranaryResult<RecordId> {
        if record.is_empty() || record.len() > u16::MAX as usize {
            return Err(GranaryError::Storage(format!(
                "record of {} bytes cannot be stored",
                record.len()
            )));
        }
        if !self.has_space_for_record(record.len()) {
            return Err(GranaryError::Storage(format!(
                "no space for a {}-byte record on page {}",
                record.len(),
                self.page_id
            )));
        }
        let offset = self.record_floor() - record.len();
        self.data[offset..offset + record.len()].copy_from_slice(record);
        self.slots.push(SlotInfo {
            offset: offset as u16,
            len: record.len() as u16,
        });
        Ok(RecordId::new(self.page_id, (self.num_slots() - 1) as SlotId))
    }

    pub fn record(&self, slot_id: SlotId) -> GranaryResult<Bytes> {
        let slot = self.live_slot(slot_id)?;
        let start = slot.offset as usize;
        Ok(Bytes::copy_from_slice(
            &self.data[start..start + slot.len as usize],
        ))
    }

    pub fn delete_record(&mut self, slot_id: SlotId) -> GranaryResult<()> {
        self.live_slot(slot_id)?;
        self.slots[slot_id as usize].len = 0;
        Ok(())
    }

    /// First live slot after `prev`, if any.
    pub fn next_used_slot(&self, prev: SlotId) -> Option<SlotId> {
        self.slots
            .iter()
            .enumerate()
            .skip(prev as usize + 1)
            .find(|(_, slot)| slot.len > 0)
            .map(|(idx, _)| idx as SlotId)
    }

    pub fn first_used_slot(&self) -> Option<SlotId> {
        self.slots
            .iter()
            .position(|slot| slot.len > 0)
            .map(|idx| idx as SlotId)
    }

    /// Iterates live records in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (SlotId, &[u8])> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.len > 0)
            .map(|(idx, slot)| {
                let start = slot.offset as usize;
                (
                    idx as SlotId,
                    &self.data[start..start + slot.len as usize],
                )
            })
    }

    fn live_slot(&self, slot_id: SlotId) -> GranaryResult<SlotInfo> {
        let slot = self.slots.get(slot_id as usize).copied().ok_or_else(|| {
            GranaryError::Storage(format!(
                "slot {} out of range on page {}",
                slot_id, self.page_id
            ))
        })?;
        if slot.len == 0 {
            return Err(GranaryError::Storage(format!(
                "slot {} on page {} is deleted",
                slot_id, self.page_id
            )));
        }
        Ok(slot)
    }
}
