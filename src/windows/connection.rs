//! Read-only mapping of a named shared-memory segment

use crate::segment::Segment;
use crate::{Result, TelemetryError};
use std::ptr::NonNull;
use tracing::{debug, trace};
use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::System::Memory::{
    FILE_MAP_READ, MEMORY_BASIC_INFORMATION, MEMORY_MAPPED_VIEW_ADDRESS, MapViewOfFile,
    OpenFileMappingW, UnmapViewOfFile, VirtualQuery,
};
use windows::core::PCWSTR;

/// Mapped view of the producer's segment
pub struct MappedSegment {
    mapping: HANDLE,
    base: NonNull<u8>,
    len: usize,
}

impl MappedSegment {
    /// Open and map the named segment for reading.
    pub fn open(name: &str) -> Result<Self> {
        trace!(name, "Opening shared memory segment");

        let mapping = unsafe {
            let wide_name = wide_string(name);
            OpenFileMappingW(FILE_MAP_READ.0, false, PCWSTR::from_raw(wide_name.as_ptr()))
                .map_err(|e| {
                    TelemetryError::connection_failed_with_source(
                        format!("Shared memory segment {} is not available", name),
                        Box::new(e),
                    )
                })?
        };

        let base = unsafe {
            let view = MapViewOfFile(mapping, FILE_MAP_READ, 0, 0, 0);
            match NonNull::new(view.Value as *mut u8) {
                Some(ptr) => ptr,
                None => {
                    let win_err = windows::core::Error::from_thread();
                    let _ = CloseHandle(mapping);
                    return Err(TelemetryError::windows_api_error("MapViewOfFile", win_err));
                }
            }
        };

        // The view covers the whole section; its region size is the readable length
        let len = unsafe {
            let mut info = MEMORY_BASIC_INFORMATION::default();
            let written = VirtualQuery(
                Some(base.as_ptr() as *const _),
                &mut info,
                std::mem::size_of::<MEMORY_BASIC_INFORMATION>(),
            );
            if written == 0 { 0 } else { info.RegionSize }
        };

        debug!(name, len, "Mapped shared memory segment");
        Ok(Self { mapping, base, len })
    }
}

impl Segment for MappedSegment {
    fn len(&self) -> usize {
        self.len
    }

    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
        match offset.checked_add(buf.len()) {
            Some(end) if end <= self.len => {}
            _ => {
                return Err(TelemetryError::layout(
                    offset,
                    format!("Read of {} bytes exceeds mapping of {} bytes", buf.len(), self.len),
                ));
            }
        }

        // SAFETY: bounds checked against the mapped region above; the view stays
        // mapped until drop
        unsafe {
            std::ptr::copy_nonoverlapping(
                self.base.as_ptr().add(offset),
                buf.as_mut_ptr(),
                buf.len(),
            );
        }
        Ok(())
    }
}

impl Drop for MappedSegment {
    fn drop(&mut self) {
        unsafe {
            let addr = MEMORY_MAPPED_VIEW_ADDRESS { Value: self.base.as_ptr() as *mut _ };
            let _ = UnmapViewOfFile(addr);
            let _ = CloseHandle(self.mapping);
        }
        debug!("Released shared memory mapping");
    }
}

// SAFETY: the struct only holds a mapping handle and a pointer to a read-only
// view; neither is tied to the creating thread
unsafe impl Send for MappedSegment {}

/// Convert string to null-terminated wide string for Windows APIs
fn wide_string(s: &str) -> Vec<u16> {
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;
    OsStr::new(s).encode_wide().chain(std::iter::once(0)).collect()
}
