//! # PC Parallel Port
//!
//! Direct register access to a legacy parallel port at a fixed I/O base.
//!
//! ## Backends
//!
//! | Backend | Mechanism | Platforms |
//! |---------|-----------|-----------|
//! | [`PortBackend::DevPort`] | positioned reads/writes on `/dev/port` | any Linux |
//! | [`PortBackend::IoPerm`] | `ioperm(2)` then `in`/`out` instructions | Linux on x86 |
//!
//! Both need root. The kernel `parport`/`lp` drivers should not be bound to
//! the port while printing, since they drive the same registers.
//!
//! ## Example
//!
//! ```no_run
//! use lbp660::transport::{HardwarePort, ParallelPort, PortBackend};
//!
//! let mut port = ParallelPort::open(0x378, PortBackend::DevPort)?;
//! let status = port.read_status()?;
//! println!("status {:#04x}", status);
//! # Ok::<(), lbp660::error::LbpError>(())
//! ```

use std::fmt;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::str::FromStr;
use std::thread;
use std::time::Duration;

use crate::error::LbpError;
use crate::transport::HardwarePort;

/// Kernel device exposing the I/O port space
pub const DEV_PORT: &str = "/dev/port";

const STATUS_OFFSET: u16 = 1;
const CONTROL_OFFSET: u16 = 2;

/// How the port registers are reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PortBackend {
    #[default]
    DevPort,
    IoPerm,
}

impl FromStr for PortBackend {
    type Err = LbpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "devport" | "dev-port" | "/dev/port" => Ok(Self::DevPort),
            "ioperm" | "direct" => Ok(Self::IoPerm),
            other => Err(LbpError::Transport(format!(
                "Unknown port backend '{}'. Use 'devport' or 'ioperm'",
                other
            ))),
        }
    }
}

impl fmt::Display for PortBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DevPort => write!(f, "devport"),
            Self::IoPerm => write!(f, "ioperm"),
        }
    }
}

enum Access {
    DevPort(File),
    #[cfg(all(target_os = "linux", any(target_arch = "x86", target_arch = "x86_64")))]
    IoPerm,
}

/// # Parallel Port
///
/// Owns exclusive access to the data, status and control registers at
/// `base`, `base + 1` and `base + 2`.
pub struct ParallelPort {
    base: u16,
    access: Access,
}

impl ParallelPort {
    /// Gain access to the port registers.
    ///
    /// ## Errors
    ///
    /// [`LbpError::Transport`] when the register block does not fit below
    /// the top of the I/O space, the process lacks the privilege, the device
    /// node is missing, or the backend is unsupported on this architecture.
    pub fn open(base: u16, backend: PortBackend) -> Result<Self, LbpError> {
        if base.checked_add(CONTROL_OFFSET).is_none() {
            return Err(LbpError::Transport(format!(
                "Port base {:#x} leaves no room for the status and control registers",
                base
            )));
        }

        let access = match backend {
            PortBackend::DevPort => {
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .open(DEV_PORT)
                    .map_err(|e| {
                        LbpError::Transport(format!(
                            "Failed to open {}: {} (are you root?)",
                            DEV_PORT, e
                        ))
                    })?;
                Access::DevPort(file)
            }
            PortBackend::IoPerm => open_ioperm(base)?,
        };

        log::debug!("parallel port {:#x} opened via {}", base, backend);
        Ok(Self { base, access })
    }

    pub fn base(&self) -> u16 {
        self.base
    }

    fn outb(&mut self, offset: u16, value: u8) -> Result<(), LbpError> {
        let port = self.base + offset;
        match &self.access {
            Access::DevPort(file) => {
                file.write_at(&[value], port as u64).map_err(|e| {
                    LbpError::Transport(format!("Write to port {:#x} failed: {}", port, e))
                })?;
            }
            #[cfg(all(target_os = "linux", any(target_arch = "x86", target_arch = "x86_64")))]
            Access::IoPerm => direct::outb(port, value),
        }
        Ok(())
    }

    fn inb(&mut self, offset: u16) -> Result<u8, LbpError> {
        let port = self.base + offset;
        match &self.access {
            Access::DevPort(file) => {
                let mut buf = [0u8; 1];
                file.read_at(&mut buf, port as u64).map_err(|e| {
                    LbpError::Transport(format!("Read from port {:#x} failed: {}", port, e))
                })?;
                Ok(buf[0])
            }
            #[cfg(all(target_os = "linux", any(target_arch = "x86", target_arch = "x86_64")))]
            Access::IoPerm => Ok(direct::inb(port)),
        }
    }
}

impl HardwarePort for ParallelPort {
    fn write_data(&mut self, value: u8) -> Result<(), LbpError> {
        self.outb(0, value)
    }

    fn write_control(&mut self, value: u8) -> Result<(), LbpError> {
        self.outb(CONTROL_OFFSET, value)
    }

    fn read_control(&mut self) -> Result<u8, LbpError> {
        self.inb(CONTROL_OFFSET)
    }

    fn read_status(&mut self) -> Result<u8, LbpError> {
        self.inb(STATUS_OFFSET)
    }

    fn sleep_us(&mut self, micros: u64) {
        thread::sleep(Duration::from_micros(micros));
    }
}

impl Drop for ParallelPort {
    fn drop(&mut self) {
        #[cfg(all(target_os = "linux", any(target_arch = "x86", target_arch = "x86_64")))]
        if let Access::IoPerm = self.access {
            direct::release(self.base);
        }
    }
}

#[cfg(all(target_os = "linux", any(target_arch = "x86", target_arch = "x86_64")))]
fn open_ioperm(base: u16) -> Result<Access, LbpError> {
    direct::acquire(base)?;
    Ok(Access::IoPerm)
}

#[cfg(not(all(target_os = "linux", any(target_arch = "x86", target_arch = "x86_64"))))]
fn open_ioperm(_base: u16) -> Result<Access, LbpError> {
    Err(LbpError::Transport(
        "ioperm backend is only available on x86 Linux, use devport".into(),
    ))
}

#[cfg(all(target_os = "linux", any(target_arch = "x86", target_arch = "x86_64")))]
mod direct {
    use std::arch::asm;
    use std::io;

    use crate::error::LbpError;

    /// Number of registers claimed from `base`
    const SPAN: libc::c_ulong = 3;

    pub(super) fn acquire(base: u16) -> Result<(), LbpError> {
        // SAFETY: ioperm only changes this process's I/O permission bitmap.
        let rc = unsafe { libc::ioperm(base as libc::c_ulong, SPAN, 1) };
        if rc != 0 {
            return Err(LbpError::Transport(format!(
                "ioperm({:#x}) failed: {} (are you root?)",
                base,
                io::Error::last_os_error()
            )));
        }
        Ok(())
    }

    pub(super) fn release(base: u16) {
        // SAFETY: see acquire.
        unsafe {
            libc::ioperm(base as libc::c_ulong, SPAN, 0);
        }
    }

    pub(super) fn outb(port: u16, value: u8) {
        // SAFETY: permission for `port` was granted by `acquire`.
        unsafe {
            asm!("out dx, al", in("dx") port, in("al") value, options(nomem, nostack, preserves_flags));
        }
    }

    pub(super) fn inb(port: u16) -> u8 {
        let value: u8;
        // SAFETY: permission for `port` was granted by `acquire`.
        unsafe {
            asm!("in al, dx", out("al") value, in("dx") port, options(nomem, nostack, preserves_flags));
        }
        value
    }
}
