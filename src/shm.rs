// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Safe wrapper around a named shared memory segment.
// Creation and opening are deliberately asymmetric: the creator sizes the
// object and is the only side allowed to remove it by name later; an opener
// maps what already exists and releases nothing but its own mapping.

use std::io;

use crate::platform::PlatformShm;

/// A named, inter-process shared memory segment mapped read/write.
pub struct ShmSegment {
    inner: PlatformShm,
}

impl ShmSegment {
    /// Create a new named segment of `size` bytes. Fails if it already exists.
    pub fn create(name: &str, size: usize) -> io::Result<Self> {
        Ok(Self {
            inner: PlatformShm::create(name, size)?,
        })
    }

    /// Open an existing named segment, mapping `size` bytes.
    /// Fails if no segment with this name exists.
    pub fn open(name: &str, size: usize) -> io::Result<Self> {
        Ok(Self {
            inner: PlatformShm::open(name, size)?,
        })
    }

    /// Mutable pointer to the start of the mapped region.
    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.inner.as_mut_ptr()
    }

    /// Mapped length in bytes.
    pub fn mapped_len(&self) -> usize {
        self.inner.mapped_len()
    }

    /// The platform name used to open the segment.
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// Remove the named object from the system. The mapping stays valid
    /// until drop; other processes can no longer open the segment.
    pub fn unlink(&self) {
        self.inner.unlink();
    }

    /// Remove a named segment by name without an open handle.
    pub fn unlink_by_name(name: &str) {
        PlatformShm::unlink_by_name(name);
    }
}
