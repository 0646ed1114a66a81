use super::{PageId, Rid, PAGE_SIZE};

/// Byte size of the slotted-page header
pub const PAGE_HEADER_SIZE: usize = 16;

/// Byte size of one slot directory entry: offset, size, generation
pub const SLOT_SIZE: usize = 12;

// Header field offsets
const NUM_SLOTS: usize = 0;
const NUM_RECORDS: usize = 4;
const FREE_SPACE_POINTER: usize = 8;
const PAGE_ID: usize = 12;

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap())
}

fn write_u32(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn read_i32(data: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes(data[offset..offset + 4].try_into().unwrap())
}

fn slot_offset(slot: u32) -> usize {
    PAGE_HEADER_SIZE + slot as usize * SLOT_SIZE
}

/// Read-only view over a slotted page.
///
/// Layout: header at offset 0, slot directory growing forward from the
/// header, record data growing backward from the end of the page. A slot
/// with `size == 0` is a tombstone; its generation counts how many times the
/// slot has been reused, so stale Rids miss instead of reading a stranger's
/// record.
pub struct PageRef<'a> {
    data: &'a [u8],
}

impl<'a> PageRef<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        debug_assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn page_id(&self) -> PageId {
        read_i32(self.data, PAGE_ID)
    }

    pub fn num_slots(&self) -> u32 {
        read_u32(self.data, NUM_SLOTS)
    }

    pub fn num_records(&self) -> u32 {
        read_u32(self.data, NUM_RECORDS)
    }

    pub fn free_space_pointer(&self) -> u32 {
        read_u32(self.data, FREE_SPACE_POINTER)
    }

    /// Bytes available between the end of the slot directory and the start
    /// of record data.
    pub fn free_space(&self) -> usize {
        let dir_end = PAGE_HEADER_SIZE + self.num_slots() as usize * SLOT_SIZE;
        (self.free_space_pointer() as usize).saturating_sub(dir_end)
    }

    pub fn slot(&self, slot: u32) -> Option<(u32, u32, u32)> {
        if slot >= self.num_slots() {
            return None;
        }
        let base = slot_offset(slot);
        Some((
            read_u32(self.data, base),
            read_u32(self.data, base + 4),
            read_u32(self.data, base + 8),
        ))
    }

    /// Whether `slot` currently holds a live record.
    pub fn is_slot_live(&self, slot: u32) -> bool {
        matches!(self.slot(slot), Some((_, size, _)) if size > 0)
    }

    /// Generation of `slot` as currently stored.
    pub fn slot_generation(&self, slot: u32) -> Option<u32> {
        self.slot(slot).map(|(_, _, generation)| generation)
    }

    /// Record bytes for `rid`, or `None` if the slot is out of range,
    /// tombstoned, or reused since the Rid was minted.
    pub fn get_record(&self, rid: Rid) -> Option<&'a [u8]> {
        let (offset, size, generation) = self.slot(rid.slot)?;
        if size == 0 || generation != rid.generation {
            return None;
        }
        Some(&self.data[offset as usize..(offset + size) as usize])
    }
}

/// Mutable view over a slotted page.
pub struct PageMut<'a> {
    data: &'a mut [u8],
}

impl<'a> PageMut<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        debug_assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    /// Zero-fill the buffer and write a fresh header.
    pub fn init(data: &mut [u8], page_id: PageId) {
        debug_assert_eq!(data.len(), PAGE_SIZE);
        data.fill(0);
        write_u32(data, FREE_SPACE_POINTER, PAGE_SIZE as u32);
        data[PAGE_ID..PAGE_ID + 4].copy_from_slice(&page_id.to_le_bytes());
    }

    pub fn as_ref(&self) -> PageRef<'_> {
        PageRef::new(self.data)
    }

    /// Largest record this page layout can ever hold.
    pub fn max_record_size() -> usize {
        PAGE_SIZE - PAGE_HEADER_SIZE - SLOT_SIZE
    }

    fn set_slot(&mut self, slot: u32, offset: u32, size: u32, generation: u32) {
        let base = slot_offset(slot);
        write_u32(self.data, base, offset);
        write_u32(self.data, base + 4, size);
        write_u32(self.data, base + 8, generation);
    }

    /// Insert a record, preferring a tombstoned slot over growing the slot
    /// directory. Returns `None` if the page has no room. Reusing a
    /// tombstone bumps the slot's generation.
    pub fn insert_record(&mut self, record: &[u8]) -> Option<Rid> {
        if record.is_empty() || record.len() > Self::max_record_size() {
            return None;
        }

        let view = self.as_ref();
        let num_slots = view.num_slots();
        let free_space = view.free_space();
        let page_id = view.page_id();

        let reused = (0..num_slots).find(|&s| !view.is_slot_live(s));

        let needed = match reused {
            Some(_) => record.len(),
            None => record.len() + SLOT_SIZE,
        };
        if needed > free_space {
            return None;
        }

        let (slot, generation) = match reused {
            Some(slot) => {
                let (_, _, old_gen) = view.slot(slot).unwrap();
                (slot, old_gen.wrapping_add(1))
            }
            None => (num_slots, 0),
        };

        let fsp = view.free_space_pointer();
        let record_offset = fsp - record.len() as u32;
        self.data[record_offset as usize..fsp as usize].copy_from_slice(record);

        self.set_slot(slot, record_offset, record.len() as u32, generation);
        if reused.is_none() {
            write_u32(self.data, NUM_SLOTS, num_slots + 1);
        }
        write_u32(self.data, NUM_RECORDS, self.as_ref().num_records() + 1);
        write_u32(self.data, FREE_SPACE_POINTER, record_offset);

        Some(Rid::new(page_id, slot, generation))
    }

    /// Tombstone the record at `rid`. Returns false if already deleted,
    /// out of range, or the Rid is stale.
    pub fn delete_record(&mut self, rid: Rid) -> bool {
        let Some((offset, size, generation)) = self.as_ref().slot(rid.slot) else {
            return false;
        };
        if size == 0 || generation != rid.generation {
            return false;
        }

        // Tombstone: keep the generation so the next reuse bumps past it.
        // The payload bytes are left in place; space is reclaimed only by
        // slot reuse, not compaction.
        self.set_slot(rid.slot, offset, 0, generation);
        write_u32(self.data, NUM_RECORDS, self.as_ref().num_records() - 1);
        true
    }

    /// Overwrite the record at `rid`. Shrinking updates in place; growing
    /// relocates within the page while keeping the slot (the Rid stays
    /// valid). Returns false on a stale Rid or when the page cannot hold
    /// the new payload.
    pub fn update_record(&mut self, rid: Rid, record: &[u8]) -> bool {
        let Some((offset, size, generation)) = self.as_ref().slot(rid.slot) else {
            return false;
        };
        if size == 0 || generation != rid.generation {
            return false;
        }
        if record.is_empty() || record.len() > Self::max_record_size() {
            return false;
        }

        if record.len() as u32 <= size {
            let start = offset as usize;
            self.data[start..start + record.len()].copy_from_slice(record);
            self.set_slot(rid.slot, offset, record.len() as u32, generation);
            return true;
        }

        // Grow: relocate to fresh space at the free-space frontier.
        if record.len() > self.as_ref().free_space() {
            return false;
        }
        let fsp = self.as_ref().free_space_pointer();
        let new_offset = fsp - record.len() as u32;
        self.data[new_offset as usize..fsp as usize].copy_from_slice(record);
        self.set_slot(rid.slot, new_offset, record.len() as u32, generation);
        write_u32(self.data, FREE_SPACE_POINTER, new_offset);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_page() -> Vec<u8> {
        let mut data = vec![0u8; PAGE_SIZE];
        PageMut::init(&mut data, 5);
        data
    }

    #[test]
    fn test_init_header() {
        let data = fresh_page();
        let page = PageRef::new(&data);
        assert_eq!(page.page_id(), 5);
        assert_eq!(page.num_slots(), 0);
        assert_eq!(page.num_records(), 0);
        assert_eq!(page.free_space_pointer(), PAGE_SIZE as u32);
        assert_eq!(page.free_space(), PAGE_SIZE - PAGE_HEADER_SIZE);
    }

    #[test]
    fn test_insert_and_get() {
        let mut data = fresh_page();
        let rid = PageMut::new(&mut data).insert_record(b"hello").unwrap();
        assert_eq!(rid.page_id, 5);
        assert_eq!(rid.slot, 0);
        assert_eq!(rid.generation, 0);

        let page = PageRef::new(&data);
        assert_eq!(page.num_records(), 1);
        assert_eq!(page.get_record(rid), Some(&b"hello"[..]));
    }

    #[test]
    fn test_records_grow_backward() {
        let mut data = fresh_page();
        let mut page = PageMut::new(&mut data);
        let a = page.insert_record(b"aaaa").unwrap();
        let b = page.insert_record(b"bb").unwrap();

        let view = PageRef::new(&data);
        let (off_a, _, _) = view.slot(a.slot).unwrap();
        let (off_b, _, _) = view.slot(b.slot).unwrap();
        assert_eq!(off_a as usize, PAGE_SIZE - 4);
        assert_eq!(off_b as usize, PAGE_SIZE - 6);
    }

    #[test]
    fn test_delete_and_stale_rid() {
        let mut data = fresh_page();
        let rid = PageMut::new(&mut data).insert_record(b"gone").unwrap();

        assert!(PageMut::new(&mut data).delete_record(rid));
        assert_eq!(PageRef::new(&data).get_record(rid), None);
        // Double delete is a no-op
        assert!(!PageMut::new(&mut data).delete_record(rid));

        // Reuse bumps the generation, so the old Rid stays dead
        let rid2 = PageMut::new(&mut data).insert_record(b"new!").unwrap();
        assert_eq!(rid2.slot, rid.slot);
        assert_eq!(rid2.generation, rid.generation + 1);
        assert_eq!(PageRef::new(&data).get_record(rid), None);
        assert_eq!(PageRef::new(&data).get_record(rid2), Some(&b"new!"[..]));
    }

    #[test]
    fn test_tombstone_preferred_over_new_slot() {
        let mut data = fresh_page();
        let a = PageMut::new(&mut data).insert_record(b"one").unwrap();
        let _b = PageMut::new(&mut data).insert_record(b"two").unwrap();
        PageMut::new(&mut data).delete_record(a);

        let c = PageMut::new(&mut data).insert_record(b"three").unwrap();
        assert_eq!(c.slot, a.slot);
        assert_eq!(PageRef::new(&data).num_slots(), 2);
    }

    #[test]
    fn test_update_in_place_and_relocating() {
        let mut data = fresh_page();
        let rid = PageMut::new(&mut data).insert_record(b"abcdef").unwrap();

        // Shrink in place
        assert!(PageMut::new(&mut data).update_record(rid, b"xyz"));
        assert_eq!(PageRef::new(&data).get_record(rid), Some(&b"xyz"[..]));

        // Grow relocates but keeps the Rid
        assert!(PageMut::new(&mut data).update_record(rid, b"0123456789"));
        assert_eq!(PageRef::new(&data).get_record(rid), Some(&b"0123456789"[..]));
    }

    #[test]
    fn test_page_fills_up() {
        let mut data = fresh_page();
        let record = [9u8; 100];
        let mut count = 0;
        while PageMut::new(&mut data).insert_record(&record).is_some() {
            count += 1;
        }
        // 100 data bytes + 12 slot bytes per record in 4080 usable bytes
        assert_eq!(count, (PAGE_SIZE - PAGE_HEADER_SIZE) / (100 + SLOT_SIZE));

        // 48 bytes remain: not enough for a 40-byte record plus a new slot,
        // but enough once a tombstone donates its slot. Payload space is
        // never compacted, so the reused record must fit the remainder.
        let small = [1u8; 40];
        assert!(PageMut::new(&mut data).insert_record(&small).is_none());

        let gen = PageRef::new(&data).slot_generation(3).unwrap();
        assert!(PageMut::new(&mut data).delete_record(Rid::new(5, 3, gen)));
        assert!(PageMut::new(&mut data).insert_record(&small).is_some());
        assert!(PageMut::new(&mut data).insert_record(&small).is_none());
    }

    #[test]
    fn test_oversized_record_rejected() {
        let mut data = fresh_page();
        let record = vec![1u8; PageMut::max_record_size() + 1];
        assert!(PageMut::new(&mut data).insert_record(&record).is_none());
        let exact = vec![1u8; PageMut::max_record_size()];
        assert!(PageMut::new(&mut data).insert_record(&exact).is_some());
    }
}
