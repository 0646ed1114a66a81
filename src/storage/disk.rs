use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::error::{StorageError, StorageResult};
use super::{PageId, PAGE_SIZE};

/// Owns the database file and performs page-granular I/O.
///
/// The file is a flat sequence of `PAGE_SIZE`-byte pages; page `n` begins at
/// byte offset `n * PAGE_SIZE`. Allocation is monotonic unless the free-list
/// has an entry, which is reused LIFO. The free-list lives in memory only and
/// does not survive a restart.
pub struct DiskManager {
    file: File,
    path: PathBuf,
    /// High-water mark: number of pages ever allocated in this file
    num_pages: PageId,
    /// Deallocated page ids available for reuse (LIFO)
    free_list: Vec<PageId>,
}

impl DiskManager {
    /// Open the database file at `path`, creating it if absent.
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        // Truncated tail bytes are treated as non-existent pages.
        let file_size = file.metadata()?.len();
        let num_pages = (file_size / PAGE_SIZE as u64) as PageId;

        Ok(Self {
            file,
            path,
            num_pages,
            free_list: Vec::new(),
        })
    }

    /// Read page `page_id` into `buf`, which must be exactly `PAGE_SIZE` bytes.
    pub fn read_page(&mut self, page_id: PageId, buf: &mut [u8]) -> StorageResult<()> {
        if buf.len() != PAGE_SIZE {
            return Err(StorageError::InvalidBufferSize {
                expected: PAGE_SIZE,
                actual: buf.len(),
            });
        }
        if page_id < 0 || page_id >= self.num_pages {
            return Err(StorageError::PageOutOfRange {
                page_id,
                num_pages: self.num_pages,
            });
        }

        let offset = page_id as u64 * PAGE_SIZE as u64;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    /// Write `data` (exactly `PAGE_SIZE` bytes) to page `page_id`, extending
    /// the file if this page has never been written.
    pub fn write_page(&mut self, page_id: PageId, data: &[u8]) -> StorageResult<()> {
        if data.len() != PAGE_SIZE {
            return Err(StorageError::InvalidBufferSize {
                expected: PAGE_SIZE,
                actual: data.len(),
            });
        }
        if page_id < 0 {
            return Err(StorageError::InvalidPageId(page_id));
        }

        let offset = page_id as u64 * PAGE_SIZE as u64;
        let required = offset + PAGE_SIZE as u64;
        if self.file.metadata()?.len() < required {
            self.file.set_len(required)?;
        }

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        self.file.flush()?;
        Ok(())
    }

    /// Hand out a page id. Reuses the most recently deallocated id if any,
    /// otherwise extends the high-water mark. Does not touch the file; the
    /// caller must overwrite the page before any subsequent read.
    pub fn allocate_page(&mut self) -> PageId {
        if let Some(page_id) = self.free_list.pop() {
            return page_id;
        }
        let page_id = self.num_pages;
        self.num_pages += 1;
        page_id
    }

    /// Return a page id to the free-list. Ids outside `[0, num_pages)` are
    /// silently ignored.
    pub fn deallocate_page(&mut self, page_id: PageId) {
        if page_id >= 0 && page_id < self.num_pages {
            self.free_list.push(page_id);
        }
    }

    /// Current high-water mark.
    pub fn num_pages(&self) -> PageId {
        self.num_pages
    }

    /// Flush file buffers to the OS and disk.
    pub fn sync(&mut self) -> StorageResult<()> {
        self.file.sync_data()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, DiskManager) {
        let dir = tempfile::tempdir().unwrap();
        let dm = DiskManager::open(dir.path().join("test.db")).unwrap();
        (dir, dm)
    }

    #[test]
    fn test_fresh_file_has_no_pages() {
        let (_dir, dm) = setup();
        assert_eq!(dm.num_pages(), 0);
    }

    #[test]
    fn test_write_read_round_trip_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");

        {
            let mut dm = DiskManager::open(&path).unwrap();
            assert_eq!(dm.allocate_page(), 0);
            dm.write_page(0, &[0xAA; PAGE_SIZE]).unwrap();
        }

        let mut dm = DiskManager::open(&path).unwrap();
        assert_eq!(dm.num_pages(), 1);
        let mut buf = vec![0u8; PAGE_SIZE];
        dm.read_page(0, &mut buf).unwrap();
        assert_eq!(buf, vec![0xAA; PAGE_SIZE]);
    }

    #[test]
    fn test_read_out_of_range() {
        let (_dir, mut dm) = setup();
        let mut buf = vec![0u8; PAGE_SIZE];
        assert!(matches!(
            dm.read_page(0, &mut buf),
            Err(StorageError::PageOutOfRange { .. })
        ));
        assert!(matches!(
            dm.read_page(-1, &mut buf),
            Err(StorageError::PageOutOfRange { .. })
        ));
    }

    #[test]
    fn test_monotonic_allocation() {
        let (_dir, mut dm) = setup();
        assert_eq!(dm.allocate_page(), 0);
        assert_eq!(dm.allocate_page(), 1);
        assert_eq!(dm.allocate_page(), 2);
        assert_eq!(dm.num_pages(), 3);
    }

    #[test]
    fn test_free_list_reuse_is_lifo() {
        let (_dir, mut dm) = setup();
        for _ in 0..4 {
            dm.allocate_page();
        }
        dm.deallocate_page(1);
        dm.deallocate_page(3);

        assert_eq!(dm.allocate_page(), 3);
        assert_eq!(dm.allocate_page(), 1);
        // Free-list exhausted, back to the high-water mark
        assert_eq!(dm.allocate_page(), 4);
    }

    #[test]
    fn test_deallocate_out_of_range_is_ignored() {
        let (_dir, mut dm) = setup();
        dm.allocate_page();
        dm.deallocate_page(-1);
        dm.deallocate_page(17);
        assert_eq!(dm.allocate_page(), 1);
    }

    #[test]
    fn test_write_extends_file() {
        let (_dir, mut dm) = setup();
        for _ in 0..3 {
            dm.allocate_page();
        }
        // Write the last allocated page without writing the earlier ones
        dm.write_page(2, &[7u8; PAGE_SIZE]).unwrap();

        let mut buf = vec![0u8; PAGE_SIZE];
        dm.read_page(2, &mut buf).unwrap();
        assert_eq!(buf[0], 7);
        // The hole reads back as zeros
        dm.read_page(0, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_invalid_buffer_size() {
        let (_dir, mut dm) = setup();
        dm.allocate_page();
        let mut small = vec![0u8; PAGE_SIZE - 1];
        assert!(matches!(
            dm.read_page(0, &mut small),
            Err(StorageError::InvalidBufferSize { .. })
        ));
        let large = vec![0u8; PAGE_SIZE + 1];
        assert!(matches!(
            dm.write_page(0, &large),
            Err(StorageError::InvalidBufferSize { .. })
        ));
    }
}
