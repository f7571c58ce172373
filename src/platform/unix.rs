//! Unix virtual memory implementation using mmap/munmap/madvise.

use crate::config::PAGE_SIZE;
use core::ffi::c_void;

const PROT_READ: i32 = 0x1;
const PROT_WRITE: i32 = 0x2;
const MAP_PRIVATE: i32 = 0x02;
const MAP_ANONYMOUS: i32 = 0x20;
const MAP_FAILED: *mut c_void = !0usize as *mut c_void;
const MADV_DONTNEED: i32 = 4;

unsafe extern "C" {
    fn mmap(
        addr: *mut c_void,
        length: usize,
        prot: i32,
        flags: i32,
        fd: i32,
        offset: i64,
    ) -> *mut c_void;

    fn munmap(addr: *mut c_void, length: usize) -> i32;

    fn madvise(addr: *mut c_void, length: usize, advice: i32) -> i32;
}

pub unsafe fn page_alloc(size: usize) -> *mut u8 {
    // The Linux system page is 4 KiB; PAGE_SIZE may be configured larger, in
    // which case mmap's 4 KiB alignment guarantee isn't enough on its own.
    // Over-allocate by one PAGE_SIZE and trim the leading/trailing waste.
    let align = PAGE_SIZE;

    let raw = unsafe {
        mmap(
            core::ptr::null_mut(),
            size + align,
            PROT_READ | PROT_WRITE,
            MAP_PRIVATE | MAP_ANONYMOUS,
            -1,
            0,
        )
    };
    if raw == MAP_FAILED {
        return core::ptr::null_mut();
    }

    let raw_addr = raw as usize;
    let aligned_addr = (raw_addr + align - 1) & !(align - 1);

    let lead = aligned_addr - raw_addr;
    if lead > 0 {
        unsafe { munmap(raw_addr as *mut c_void, lead) };
    }

    let trail = (raw_addr + size + align) - (aligned_addr + size);
    if trail > 0 {
        unsafe { munmap((aligned_addr + size) as *mut c_void, trail) };
    }

    aligned_addr as *mut u8
}

pub unsafe fn page_dealloc(ptr: *mut u8, size: usize) {
    unsafe { munmap(ptr as *mut c_void, size) };
}

pub unsafe fn page_decommit(ptr: *mut u8, size: usize) {
    unsafe { madvise(ptr as *mut c_void, size, MADV_DONTNEED) };
}

/// Parses the resident-set size (second field, in pages) out of
/// `/proc/self/statm`. Returns `None` on any read/parse failure rather than
/// propagating an error — RSS is telemetry, not a correctness dependency.
pub fn current_rss_bytes() -> Option<u64> {
    let contents = std::fs::read_to_string("/proc/self/statm").ok()?;
    let rss_pages: u64 = contents.split_whitespace().nth(1)?.parse().ok()?;
    let page_size = unsafe { sysconf_page_size() };
    Some(rss_pages * page_size as u64)
}

unsafe extern "C" {
    fn sysconf(name: i32) -> i64;
}

const SC_PAGESIZE: i32 = 30;

unsafe fn sysconf_page_size() -> i64 {
    let v = unsafe { sysconf(SC_PAGESIZE) };
    if v > 0 { v } else { 4096 }
}
