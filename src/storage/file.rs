//! # Memory-Mapped Storage File
//!
//! `BlockFile` is the low-level building block under the block store: one
//! storage file mapped into memory and addressed in `block_size` slots.
//! It knows the physical layout (header area, slot region, metadata
//! trailer) but nothing about block ids or the index.
//!
//! ## Safety Considerations
//!
//! Memory-mapped regions become invalid when remapped. As in the rest of
//! the storage layer, the borrow checker enforces this:
//!
//! ```text
//! slot(&self) -> &[u8]                 // Immutable borrow of self
//! slot_mut(&mut self) -> &mut [u8]     // Mutable borrow of self
//! resize(&mut self)                    // Mutable borrow (exclusive)
//! ```
//!
//! Since `resize()` requires `&mut self`, no slot reference can survive a
//! remap.
//!
//! ## Sizing
//!
//! The file is `block_size * (1 + slot_count)` bytes of header and slots,
//! followed by the trailer area. The trailer area may hold more than one
//! trailer while the block store switches between them; only the one the
//! header points at is live. Growing the slot region zeroes whatever lies in
//! the space it claims, so callers move the live trailer out of the way
//! first.

use std::fs::{File, OpenOptions};
use std::io::Read;
use std::path::{Path, PathBuf};

use eyre::{ensure, Result, WrapErr};
use memmap2::MmapMut;
use zerocopy::IntoBytes;

use super::headers::FileHeader;
use crate::config::FILE_HEADER_SIZE;
use crate::error::StorageError;

#[derive(Debug)]
pub struct BlockFile {
    path: PathBuf,
    file: File,
    mmap: MmapMut,
    block_size: usize,
    slot_count: u32,
}

impl BlockFile {
    pub fn create<P: AsRef<Path>>(path: P, header: &FileHeader) -> Result<Self> {
        let path = path.as_ref();
        let block_size = header.block_size() as usize;

        ensure!(
            block_size >= FILE_HEADER_SIZE,
            "block size {} smaller than file header",
            block_size
        );

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .wrap_err_with(|| format!("failed to create storage file '{}'", path.display()))?;

        file.set_len(block_size as u64)
            .wrap_err_with(|| format!("failed to set file size to {} bytes", block_size))?;

        // SAFETY: MmapMut::map_mut is unsafe because memory-mapped files can be
        // modified externally. This is safe because:
        // 1. We just created this file with exclusive access (truncate=true)
        // 2. The mmap lifetime is tied to BlockFile, preventing use-after-unmap
        // 3. All access goes through bounds-checked slot accessors
        let mmap = unsafe {
            MmapMut::map_mut(&file)
                .wrap_err_with(|| format!("failed to memory-map '{}'", path.display()))?
        };

        let mut storage = Self {
            path: path.to_path_buf(),
            file,
            mmap,
            block_size,
            slot_count: 0,
        };
        storage.write_header(header);
        storage.sync()?;

        Ok(storage)
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<(Self, FileHeader)> {
        let path = path.as_ref();

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .wrap_err_with(|| format!("failed to open storage file '{}'", path.display()))?;

        let mut header_bytes = [0u8; FILE_HEADER_SIZE];
        file.read_exact(&mut header_bytes).map_err(|e| {
            eyre::Report::new(StorageError::corrupt_index(format!(
                "cannot read file header of '{}': {}",
                path.display(),
                e
            )))
        })?;
        let header = FileHeader::read_from(&header_bytes)?;

        let block_size = header.block_size() as usize;
        let file_size = file
            .metadata()
            .wrap_err_with(|| format!("failed to get metadata for '{}'", path.display()))?
            .len();
        let region_end = block_size as u64 * (1 + header.slot_count() as u64);

        if file_size < region_end {
            eyre::bail!(StorageError::corrupt_index(format!(
                "file '{}' is {} bytes but header declares {} slots of {} bytes",
                path.display(),
                file_size,
                header.slot_count(),
                block_size
            )));
        }

        // SAFETY: MmapMut::map_mut is unsafe because memory-mapped files can be
        // modified externally. This is safe because:
        // 1. The file is opened read+write and storage files are owned by one engine
        // 2. The mmap lifetime is tied to BlockFile, preventing use-after-unmap
        // 3. All access goes through bounds-checked slot accessors
        let mmap = unsafe {
            MmapMut::map_mut(&file)
                .wrap_err_with(|| format!("failed to memory-map '{}'", path.display()))?
        };

        Ok((
            Self {
                path: path.to_path_buf(),
                file,
                mmap,
                block_size,
                slot_count: header.slot_count(),
            },
            header,
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn slot_count(&self) -> u32 {
        self.slot_count
    }

    pub fn region_end(&self) -> u64 {
        self.block_size as u64 * (1 + self.slot_count as u64)
    }

    pub fn file_size(&self) -> u64 {
        self.mmap.len() as u64
    }

    pub fn write_header(&mut self, header: &FileHeader) {
        self.mmap[..FILE_HEADER_SIZE].copy_from_slice(header.as_bytes());
    }

    pub fn slot(&self, slot: u32) -> Result<&[u8]> {
        ensure!(
            slot < self.slot_count,
            "slot {} out of bounds (slot_count={})",
            slot,
            self.slot_count
        );

        let offset = (1 + slot as usize) * self.block_size;
        Ok(&self.mmap[offset..offset + self.block_size])
    }

    pub fn slot_mut(&mut self, slot: u32) -> Result<&mut [u8]> {
        ensure!(
            slot < self.slot_count,
            "slot {} out of bounds (slot_count={})",
            slot,
            self.slot_count
        );

        let offset = (1 + slot as usize) * self.block_size;
        Ok(&mut self.mmap[offset..offset + self.block_size])
    }

    /// Extends the slot region. New slots are zero-filled, which marks them free.
    pub fn grow_slots(&mut self, new_slot_count: u32) -> Result<()> {
        if new_slot_count <= self.slot_count {
            return Ok(());
        }

        let old_end = self.region_end() as usize;
        let new_end = self.block_size as u64 * (1 + new_slot_count as u64);
        if new_end > self.file_size() {
            self.resize(new_end)?;
        }

        // Bytes past the old region may still hold a stale trailer.
        let new_end = new_end as usize;
        self.mmap[old_end..new_end].fill(0);
        self.slot_count = new_slot_count;

        Ok(())
    }

    pub fn read_trailer(&self, offset: u64, len: u64) -> Result<&[u8]> {
        let end = offset.checked_add(len);
        match end {
            Some(end) if offset >= self.region_end() && end <= self.file_size() => {
                Ok(&self.mmap[offset as usize..end as usize])
            }
            _ => eyre::bail!(StorageError::corrupt_index(format!(
                "metadata trailer at {}+{} lies outside '{}' (region end {}, file size {})",
                offset,
                len,
                self.path.display(),
                self.region_end(),
                self.file_size()
            ))),
        }
    }

    /// Writes `bytes` at `offset` in the trailer area, extending the file if
    /// needed. Nothing else in the trailer area is touched.
    pub fn write_trailer_at(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        ensure!(
            offset >= self.region_end(),
            "trailer offset {} inside slot region (region end {})",
            offset,
            self.region_end()
        );

        let end = offset + bytes.len() as u64;
        if end > self.file_size() {
            self.resize(end)?;
        }
        let start = offset as usize;
        self.mmap[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Cuts the file down to `len` bytes. Never cuts into the slot region.
    pub fn truncate(&mut self, len: u64) -> Result<()> {
        ensure!(
            len >= self.region_end(),
            "cannot truncate '{}' to {} bytes inside the slot region",
            self.path.display(),
            len
        );
        if len < self.file_size() {
            self.resize(len)?;
        }
        Ok(())
    }

    pub fn sync(&self) -> Result<()> {
        self.mmap
            .flush()
            .wrap_err_with(|| format!("failed to sync '{}' to disk", self.path.display()))
    }

    fn resize(&mut self, new_len: u64) -> Result<()> {
        if new_len == self.file_size() {
            return Ok(());
        }

        self.mmap
            .flush()
            .wrap_err("failed to flush mmap before resize")?;

        self.file
            .set_len(new_len)
            .wrap_err_with(|| format!("failed to resize file to {} bytes", new_len))?;

        // SAFETY: MmapMut::map_mut is unsafe because the old mmap becomes invalid.
        // This is safe because:
        // 1. resize() requires &mut self, so no slot references can exist (borrow checker)
        // 2. We flushed the old mmap above, ensuring data is written to disk
        // 3. The file was resized before remapping
        // 4. The old mmap is dropped when we assign the new one
        self.mmap = unsafe {
            MmapMut::map_mut(&self.file).wrap_err("failed to remap file after resize")?
        };

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn header(block_size: u32) -> FileHeader {
        FileHeader::new(block_size, 1)
    }

    #[test]
    fn create_writes_header_slot_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.edb");

        let storage = BlockFile::create(&path, &header(512)).unwrap();

        assert_eq!(storage.slot_count(), 0);
        assert_eq!(storage.file_size(), 512);
        assert!(storage.slot(0).is_err());
    }

    #[test]
    fn grown_slots_are_zeroed_and_persist() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.edb");

        {
            let mut storage = BlockFile::create(&path, &header(512)).unwrap();
            storage.grow_slots(3).unwrap();
            assert!(storage.slot(2).unwrap().iter().all(|&b| b == 0));

            storage.slot_mut(1).unwrap()[0] = 0xAB;

            let mut h = header(512);
            h.set_slot_count(3);
            storage.write_header(&h);
            storage.sync().unwrap();
        }

        let (storage, parsed) = BlockFile::open(&path).unwrap();
        assert_eq!(parsed.slot_count(), 3);
        assert_eq!(storage.slot(1).unwrap()[0], 0xAB);
    }

    #[test]
    fn trailer_follows_slot_region() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.edb");

        let mut storage = BlockFile::create(&path, &header(512)).unwrap();
        storage.grow_slots(2).unwrap();

        let offset = storage.region_end();
        assert_eq!(offset, 512 * 3);
        storage.write_trailer_at(offset, b"metadata").unwrap();
        assert_eq!(storage.read_trailer(offset, 8).unwrap(), b"metadata");
        assert!(storage.write_trailer_at(512 * 2, b"x").is_err());

        storage.write_trailer_at(offset + 8, b"next").unwrap();
        assert_eq!(storage.read_trailer(offset, 8).unwrap(), b"metadata");
        assert_eq!(storage.file_size(), offset + 12);

        storage.truncate(offset + 8).unwrap();
        assert_eq!(storage.file_size(), offset + 8);
        assert!(storage.truncate(offset - 1).is_err());

        storage.grow_slots(3).unwrap();
        assert!(storage.read_trailer(offset, 8).is_err());
    }

    #[test]
    fn growth_keeps_bytes_past_new_region() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.edb");

        let mut storage = BlockFile::create(&path, &header(512)).unwrap();
        storage.grow_slots(1).unwrap();
        storage.write_trailer_at(512 * 4, b"parked").unwrap();

        storage.grow_slots(3).unwrap();

        assert_eq!(storage.read_trailer(512 * 4, 6).unwrap(), b"parked");
        assert!(storage.slot(2).unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn open_rejects_short_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("short.edb");
        std::fs::write(&path, b"tiny").unwrap();

        let err = BlockFile::open(&path).unwrap_err();
        assert!(matches!(
            StorageError::of(&err),
            Some(StorageError::CorruptIndex(_))
        ));
    }

    #[test]
    fn open_missing_file_is_io_error() {
        let dir = tempdir().unwrap();

        let err = BlockFile::open(dir.path().join("missing.edb")).unwrap_err();
        assert!(StorageError::of(&err).is_none());
    }
}
