//! CPU affinity pinning: keeps the process off the
//! upper half of the machine's cores, leaving them for network interrupt
//! handling and other system load, matching the reference's
//! `sched_setaffinity` call in `main()`.

#[cfg(target_os = "linux")]
pub fn pin_to_lower_half(num_cores: usize) {
    use std::mem::MaybeUninit;

    // SAFETY: `cpu_set_t` is a fixed-size bitmask type; zeroing it is
    // the documented way to initialize one before calling `CPU_SET`.
    unsafe {
        let mut set: MaybeUninit<libc::cpu_set_t> = MaybeUninit::zeroed();
        let set_ptr = set.as_mut_ptr();
        for core in 0..num_cores / 2 {
            libc::CPU_SET(core, &mut *set_ptr);
        }
        let rc = libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), set_ptr);
        if rc != 0 {
            log::warn!("sched_setaffinity failed: {}", std::io::Error::last_os_error());
        }
    }
}

#[cfg(not(target_os = "linux"))]
pub fn pin_to_lower_half(_num_cores: usize) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pinning_does_not_panic_on_this_host() {
        pin_to_lower_half(num_cpus_for_test());
    }

    fn num_cpus_for_test() -> usize {
        std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
    }
}
