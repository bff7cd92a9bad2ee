//! Slot layout of a heap page.
//!
//! A page starts with a bitmap header holding one bit per slot, least significant bit first,
//! followed by fixed-width tuple slots. The number of slots is the largest n such that n tuples
//! plus n header bits fit in the page.

use bytes::BufMut;

use crate::common::{PageId, RecordId};
use crate::error::{Error, Result};
use crate::storage::tuple::{Tuple, TupleDesc};
use super::Page;

/// Number of tuple slots on a page.
pub fn slots_per_page(page_size: usize, tuple_size: usize) -> usize {
    if tuple_size == 0 {
        return 0;
    }
    (page_size * 8) / (tuple_size * 8 + 1)
}

/// Number of header bytes for the given number of slots.
pub fn header_size(num_slots: usize) -> usize {
    (num_slots + 7) / 8
}

/// A typed view over a page's bytes.
pub struct HeapPage<'a, B> {
    pid: PageId,
    data: B,
    desc: &'a TupleDesc,
    num_slots: usize,
}

impl<'a> HeapPage<'a, &'a [u8]> {
    pub fn open(page: &'a Page, desc: &'a TupleDesc) -> Self {
        Self::with(page.id(), page.data(), desc)
    }
}

impl<'a> HeapPage<'a, &'a mut [u8]> {
    /// Opens a page for modification. The caller is responsible for marking it dirty.
    pub fn open_mut(page: &'a mut Page, desc: &'a TupleDesc) -> Self {
        let pid = page.id();
        Self::with(pid, page.data_mut(), desc)
    }
}

impl<'a, B: AsRef<[u8]>> HeapPage<'a, B> {
    fn with(pid: PageId, data: B, desc: &'a TupleDesc) -> Self {
        let num_slots = slots_per_page(data.as_ref().len(), desc.size());
        Self { pid, data, desc, num_slots }
    }

    pub fn id(&self) -> PageId {
        self.pid
    }

    pub fn num_slots(&self) -> usize {
        self.num_slots
    }

    pub fn is_slot_used(&self, slot: usize) -> bool {
        slot < self.num_slots && self.data.as_ref()[slot / 8] & (1 << (slot % 8)) != 0
    }

    pub fn num_empty_slots(&self) -> usize {
        (0..self.num_slots).filter(|s| !self.is_slot_used(*s)).count()
    }

    /// Reads the tuple in slot, if the slot is in use.
    pub fn tuple(&self, slot: usize) -> Result<Option<Tuple>> {
        if !self.is_slot_used(slot) {
            return Ok(None);
        }
        let start = self.slot_offset(slot);
        let mut tuple = Tuple::deserialize(self.desc, &self.data.as_ref()[start..start + self.desc.size()])?;
        tuple.set_record_id(Some(RecordId::new(self.pid, slot as u32)));
        Ok(Some(tuple))
    }

    /// All tuples on the page in slot order.
    pub fn tuples(&self) -> Result<Vec<Tuple>> {
        let mut tuples = Vec::new();
        for slot in 0..self.num_slots {
            if let Some(tuple) = self.tuple(slot)? {
                tuples.push(tuple);
            }
        }
        Ok(tuples)
    }

    fn slot_offset(&self, slot: usize) -> usize {
        header_size(self.num_slots) + slot * self.desc.size()
    }
}

impl<'a, B: AsRef<[u8]> + AsMut<[u8]>> HeapPage<'a, B> {
    /// Writes tuple into the first free slot and returns its new record id.
    pub fn insert_tuple(&mut self, tuple: &Tuple) -> Result<RecordId> {
        if !tuple.matches(self.desc) {
            return Err(Error::SchemaMismatch(format!("Tuple {} does not match ({})", tuple, self.desc)));
        }
        let slot = (0..self.num_slots)
            .find(|s| !self.is_slot_used(*s))
            .ok_or_else(|| Error::Value(format!("Page {} is full", self.pid)))?;

        let start = self.slot_offset(slot);
        let size = self.desc.size();
        let mut buf = &mut self.data.as_mut()[start..start + size];
        tuple.serialize(self.desc, &mut buf)?;
        buf.put_bytes(0, buf.remaining_mut());
        self.set_slot(slot, true);
        Ok(RecordId::new(self.pid, slot as u32))
    }

    /// Frees the slot rid points to.
    pub fn delete_tuple(&mut self, rid: RecordId) -> Result<()> {
        if rid.page_id != self.pid {
            return Err(Error::Value(format!("Record {:?} is not on page {}", rid, self.pid)));
        }
        let slot = rid.slot as usize;
        if !self.is_slot_used(slot) {
            return Err(Error::Value(format!("Slot {} of page {} is already empty", slot, self.pid)));
        }
        self.set_slot(slot, false);
        Ok(())
    }

    fn set_slot(&mut self, slot: usize, used: bool) {
        let byte = &mut self.data.as_mut()[slot / 8];
        match used {
            true => *byte |= 1 << (slot % 8),
            false => *byte &= !(1 << (slot % 8)),
        }
    }
}
