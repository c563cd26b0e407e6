// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// POSIX backend: named shared memory segments plus the process-shared
// pthread mutex and condition variable that live inside the mapped region.

use std::cell::UnsafeCell;
use std::ffi::CString;
use std::io;
use std::ptr;

use crate::names;

// ---------------------------------------------------------------------------
// Robust mutex symbols — not exposed by `libc` crate on all platforms.
// On macOS robust mutexes are not available.
// ---------------------------------------------------------------------------

#[cfg(not(target_os = "macos"))]
const EOWNERDEAD: i32 = libc::EOWNERDEAD;

#[cfg(not(target_os = "macos"))]
extern "C" {
    fn pthread_mutexattr_setrobust(
        attr: *mut libc::pthread_mutexattr_t,
        robustness: libc::c_int,
    ) -> libc::c_int;
    fn pthread_mutex_consistent(mutex: *mut libc::pthread_mutex_t) -> libc::c_int;
}

#[cfg(not(target_os = "macos"))]
const PTHREAD_MUTEX_ROBUST: libc::c_int = 1;

/// Shared memory mapping granularity, queried from the OS.
pub fn page_size() -> usize {
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}

// ---------------------------------------------------------------------------
// PlatformShm — POSIX shared memory
// ---------------------------------------------------------------------------

pub struct PlatformShm {
    mem: *mut u8,
    size: usize,
    name: String, // POSIX name (with leading '/')
}

// Safety: the shared memory region is process-shared by design.
unsafe impl Send for PlatformShm {}
unsafe impl Sync for PlatformShm {}

impl PlatformShm {
    /// Create a named shared memory object of `size` bytes and map it.
    /// Fails if an object with this name already exists.
    pub fn create(name: &str, size: usize) -> io::Result<Self> {
        let (c_name, posix_name) = Self::check_name(name, size)?;
        let perms: libc::mode_t = 0o666;

        let fd = unsafe {
            libc::shm_open(
                c_name.as_ptr(),
                libc::O_RDWR | libc::O_CREAT | libc::O_EXCL,
                perms as libc::c_uint,
            )
        };
        if fd == -1 {
            return Err(io::Error::last_os_error());
        }

        unsafe { libc::fchmod(fd, perms) };

        // The creator sizes the object; openers map it as-is.
        let ret = unsafe { libc::ftruncate(fd, size as libc::off_t) };
        if ret != 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(err);
        }

        Self::mmap_and_finish(fd, size, posix_name)
    }

    /// Open an existing named shared memory object of `size` bytes and map it.
    /// Fails if no object with this name exists. Never resizes.
    pub fn open(name: &str, size: usize) -> io::Result<Self> {
        let (c_name, posix_name) = Self::check_name(name, size)?;
        let perms: libc::mode_t = 0o666;

        let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, perms as libc::c_uint) };
        if fd == -1 {
            return Err(io::Error::last_os_error());
        }

        Self::mmap_and_finish(fd, size, posix_name)
    }

    fn check_name(name: &str, size: usize) -> io::Result<(CString, String)> {
        if name.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "name is empty"));
        }
        if size == 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "size is 0"));
        }
        let posix_name = names::posix_shm_name(name);
        let c_name = CString::new(posix_name.as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        Ok((c_name, posix_name))
    }

    fn mmap_and_finish(fd: i32, size: usize, posix_name: String) -> io::Result<Self> {
        let mem = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        unsafe { libc::close(fd) };

        if mem == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            mem: mem as *mut u8,
            size,
            name: posix_name,
        })
    }

    /// Pointer to the start of the mapped region.
    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.mem
    }

    /// Mapped length in bytes.
    pub fn mapped_len(&self) -> usize {
        self.size
    }

    /// POSIX name (with leading '/').
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Remove the backing object (shm_unlink). Does NOT release the mapping.
    pub fn unlink(&self) {
        if let Ok(c_name) = CString::new(self.name.as_bytes()) {
            unsafe { libc::shm_unlink(c_name.as_ptr()) };
        }
    }

    /// Unlink a named shm object by name (static helper).
    pub fn unlink_by_name(name: &str) {
        let posix_name = names::posix_shm_name(name);
        if let Ok(c_name) = CString::new(posix_name.as_bytes()) {
            unsafe { libc::shm_unlink(c_name.as_ptr()) };
        }
    }
}

impl Drop for PlatformShm {
    fn drop(&mut self) {
        if self.mem.is_null() {
            return;
        }
        // Only the mapping is released here. Whether the named object is
        // unlinked is an ownership decision made by the endpoint.
        unsafe { libc::munmap(self.mem as *mut libc::c_void, self.size) };
    }
}

// ---------------------------------------------------------------------------
// RawMutex / RawCondvar — process-shared pthread primitives stored in place
// inside a mapped region. The creator of the region calls `init` exactly
// once before any other process maps it; openers must never re-init.
// ---------------------------------------------------------------------------

#[repr(C)]
pub struct RawMutex {
    inner: UnsafeCell<libc::pthread_mutex_t>,
}

unsafe impl Send for RawMutex {}
unsafe impl Sync for RawMutex {}

impl RawMutex {
    /// Initialise the mutex in place with `PTHREAD_PROCESS_SHARED` (and the
    /// robust attribute where the platform has it).
    ///
    /// # Safety
    /// Must be called exactly once per mapped object, by its creator, before
    /// any `lock`. The memory must stay mapped for as long as any process
    /// uses the mutex.
    pub unsafe fn init(&self) -> io::Result<()> {
        let mtx_ptr = self.inner.get();
        ptr::write_bytes(mtx_ptr, 0, 1);

        let mut attr: libc::pthread_mutexattr_t = std::mem::zeroed();
        let mut eno = libc::pthread_mutexattr_init(&mut attr);
        if eno != 0 {
            return Err(io::Error::from_raw_os_error(eno));
        }

        eno = libc::pthread_mutexattr_setpshared(&mut attr, libc::PTHREAD_PROCESS_SHARED);
        if eno != 0 {
            libc::pthread_mutexattr_destroy(&mut attr);
            return Err(io::Error::from_raw_os_error(eno));
        }

        #[cfg(not(target_os = "macos"))]
        {
            eno = pthread_mutexattr_setrobust(&mut attr, PTHREAD_MUTEX_ROBUST);
            if eno != 0 {
                libc::pthread_mutexattr_destroy(&mut attr);
                return Err(io::Error::from_raw_os_error(eno));
            }
        }

        eno = libc::pthread_mutex_init(mtx_ptr, &attr);
        libc::pthread_mutexattr_destroy(&mut attr);
        if eno != 0 {
            return Err(io::Error::from_raw_os_error(eno));
        }
        Ok(())
    }

    fn mtx_ptr(&self) -> *mut libc::pthread_mutex_t {
        self.inner.get()
    }

    /// Lock the mutex (blocking).
    /// Handles `EOWNERDEAD` from robust mutexes by calling `pthread_mutex_consistent`.
    pub fn lock(&self) -> io::Result<()> {
        let eno = unsafe { libc::pthread_mutex_lock(self.mtx_ptr()) };
        match eno {
            0 => Ok(()),
            #[cfg(not(target_os = "macos"))]
            EOWNERDEAD => {
                let eno2 = unsafe { pthread_mutex_consistent(self.mtx_ptr()) };
                if eno2 != 0 {
                    return Err(io::Error::from_raw_os_error(eno2));
                }
                Ok(())
            }
            _ => Err(io::Error::from_raw_os_error(eno)),
        }
    }

    /// Unlock the mutex.
    pub fn unlock(&self) -> io::Result<()> {
        let eno = unsafe { libc::pthread_mutex_unlock(self.mtx_ptr()) };
        if eno != 0 {
            return Err(io::Error::from_raw_os_error(eno));
        }
        Ok(())
    }
}

// No pthread_mutex_destroy / pthread_cond_destroy on drop: the primitives
// live inside the mapped segment and the peer process may still hold the
// mapping. Unlinking the segment reclaims the memory.

#[repr(C)]
pub struct RawCondvar {
    inner: UnsafeCell<libc::pthread_cond_t>,
}

unsafe impl Send for RawCondvar {}
unsafe impl Sync for RawCondvar {}

impl RawCondvar {
    /// Initialise the condition variable in place with `PTHREAD_PROCESS_SHARED`.
    ///
    /// # Safety
    /// Same contract as [`RawMutex::init`].
    pub unsafe fn init(&self) -> io::Result<()> {
        let cond_ptr = self.inner.get();
        ptr::write_bytes(cond_ptr, 0, 1);

        let mut attr: libc::pthread_condattr_t = std::mem::zeroed();
        let mut eno = libc::pthread_condattr_init(&mut attr);
        if eno != 0 {
            return Err(io::Error::from_raw_os_error(eno));
        }

        eno = libc::pthread_condattr_setpshared(&mut attr, libc::PTHREAD_PROCESS_SHARED);
        if eno != 0 {
            libc::pthread_condattr_destroy(&mut attr);
            return Err(io::Error::from_raw_os_error(eno));
        }

        eno = libc::pthread_cond_init(cond_ptr, &attr);
        libc::pthread_condattr_destroy(&mut attr);
        if eno != 0 {
            return Err(io::Error::from_raw_os_error(eno));
        }
        Ok(())
    }

    fn cond_ptr(&self) -> *mut libc::pthread_cond_t {
        self.inner.get()
    }

    /// Wait on the condition variable. The caller must hold `mutex` locked;
    /// it is atomically released and re-acquired around the wait.
    pub fn wait(&self, mutex: &RawMutex) -> io::Result<()> {
        let eno = unsafe { libc::pthread_cond_wait(self.cond_ptr(), mutex.mtx_ptr()) };
        if eno != 0 {
            return Err(io::Error::from_raw_os_error(eno));
        }
        Ok(())
    }

    /// Wait with an absolute wall-clock deadline.
    /// Returns `Ok(true)` if signalled, `Ok(false)` on timeout.
    pub fn wait_until(&self, mutex: &RawMutex, abstime: &libc::timespec) -> io::Result<bool> {
        let eno =
            unsafe { libc::pthread_cond_timedwait(self.cond_ptr(), mutex.mtx_ptr(), abstime) };
        match eno {
            0 => Ok(true),
            libc::ETIMEDOUT => Ok(false),
            _ => Err(io::Error::from_raw_os_error(eno)),
        }
    }

    /// Wake one waiter.
    pub fn notify_one(&self) -> io::Result<()> {
        let eno = unsafe { libc::pthread_cond_signal(self.cond_ptr()) };
        if eno != 0 {
            return Err(io::Error::from_raw_os_error(eno));
        }
        Ok(())
    }

    /// Wake all waiters.
    pub fn broadcast(&self) -> io::Result<()> {
        let eno = unsafe { libc::pthread_cond_broadcast(self.cond_ptr()) };
        if eno != 0 {
            return Err(io::Error::from_raw_os_error(eno));
        }
        Ok(())
    }
}
