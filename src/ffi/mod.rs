use std::io::Result;
use std::time::Duration;

#[cfg(any(target_os = "linux", target_os = "android"))]
mod syscall;

macro_rules! syscall {
    ($syscall:ident, $($arg:expr),* $(,)?) => {{
        #[cfg(any(target_os = "linux", target_os = "android"))]
        let val = $crate::ffi::syscall::$syscall($($arg),*);
        #[cfg(not(any(target_os = "linux", target_os = "android")))]
        let val = {
            $(let _ = $arg;)*
            Err(std::io::Error::from(std::io::ErrorKind::Unsupported))
        };
        val
    }};
}

/// CPU time consumed by the calling thread.
pub fn thread_cputime() -> Result<Duration> {
    syscall!(clock_gettime, libc::CLOCK_THREAD_CPUTIME_ID)
}

// Addresses at or above 2^48 belong to the kernel half (or are non-canonical)
// on a 4-level page table.
const USER_ADDR_BITS: u32 = 48;

/// Returns true if `addr` is a non-null user-space virtual address.
pub fn user_space_addr(addr: u64) -> bool {
    addr != 0 && addr >> USER_ADDR_BITS == 0
}
