use core::result::Result::Ok;
use axaddrspace::{device::AccessWidth, HostPhysAddr};
use axerrno::AxResult;

/// Access to the physical bus the PLIC registers live on.
///
/// Every register access of the driver goes through this trait, so the whole
/// driver can run against an in-memory bus on the host.
pub trait MmioBus {
    fn read(&self, addr: HostPhysAddr, width: AccessWidth) -> AxResult<usize>;
    fn write(&self, addr: HostPhysAddr, width: AccessWidth, val: usize) -> AxResult;
}

/// Volatile accesses to identity-mapped physical memory.
///
/// The firmware runs in M-mode without translation, so physical addresses are
/// dereferenced directly.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mmio;

impl MmioBus for Mmio {
    fn read(&self, addr: HostPhysAddr, width: AccessWidth) -> AxResult<usize> {
        perform_mmio_read(addr, width)
    }

    fn write(&self, addr: HostPhysAddr, width: AccessWidth, val: usize) -> AxResult {
        perform_mmio_write(addr, width, val)
    }
}

pub(crate) fn perform_mmio_read(addr: HostPhysAddr, width: AccessWidth) -> AxResult<usize> {
    let addr = addr.as_usize() as *const u8;

    match width {
        AccessWidth::Byte => Ok(unsafe { addr.read_volatile() as _ }),
        AccessWidth::Word => Ok(unsafe { (addr as *const u16).read_volatile() as _ }),
        AccessWidth::Dword => Ok(unsafe { (addr as *const u32).read_volatile() as _ }),
        AccessWidth::Qword => Ok(unsafe { (addr as *const u64).read_volatile() as _ }),
    }
}

pub(crate) fn perform_mmio_write(
    addr: HostPhysAddr,
    width: AccessWidth,
    val: usize,
) -> AxResult<()> {
    let addr = addr.as_usize() as *mut u8;

    match width {
        AccessWidth::Byte => unsafe {
            addr.write_volatile(val as _);
        },
        AccessWidth::Word => unsafe {
            (addr as *mut u16).write_volatile(val as _);
        },
        AccessWidth::Dword => unsafe {
            (addr as *mut u32).write_volatile(val as _);
        },
        AccessWidth::Qword => unsafe {
            (addr as *mut u64).write_volatile(val as _);
        },
    }

    Ok(())
}

/// Floor of log2, `x` must be non-zero.
#[inline]
pub(crate) const fn log2_floor(x: u32) -> u32 {
    u32::BITS - 1 - x.leading_zeros()
}

/// Ceiling of log2, `x` must be non-zero.
#[inline]
pub(crate) const fn log2_ceil(x: u32) -> u32 {
    if x <= 1 {
        0
    } else {
        log2_floor(x - 1) + 1
    }
}

/// Round up to the next 4-byte boundary. Zero-length regions still take one word.
#[inline]
pub(crate) const fn round_up_4(x: usize) -> usize {
    if x == 0 {
        4
    } else {
        (x + 3) & !3
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log2_helpers() {
        assert_eq!(log2_floor(1), 0);
        assert_eq!(log2_floor(16), 4);
        assert_eq!(log2_floor(12), 3);
        assert_eq!(log2_ceil(1), 0);
        assert_eq!(log2_ceil(41), 6);
        assert_eq!(log2_ceil(64), 6);
        assert_eq!(log2_ceil(65), 7);
    }

    #[test]
    fn round_up() {
        assert_eq!(round_up_4(0), 4);
        assert_eq!(round_up_4(1), 4);
        assert_eq!(round_up_4(4), 4);
        assert_eq!(round_up_4(5), 8);
    }
}
