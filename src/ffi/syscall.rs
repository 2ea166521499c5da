use std::io::{Error, Result};
use std::mem::MaybeUninit;
use std::time::Duration;

pub fn clock_gettime(clock: libc::clockid_t) -> Result<Duration> {
    let mut ts = MaybeUninit::<libc::timespec>::uninit();
    let result = unsafe { libc::clock_gettime(clock, ts.as_mut_ptr()) };
    if result != -1 {
        let ts = unsafe { ts.assume_init() };
        Ok(Duration::new(ts.tv_sec as _, ts.tv_nsec as _))
    } else {
        Err(Error::last_os_error())
    }
}
