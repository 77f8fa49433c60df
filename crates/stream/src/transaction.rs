//! Frame buffers and the client callback set.

/// A DMA-visible frame buffer.
///
/// A plain address/length pair: ownership is tracked by where the value
/// currently is (client, queue, in flight), not by the type system. The
/// engine writes or reads it behind the compiler's back, so borrowing
/// the bytes is `unsafe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DmaBuf {
    addr: usize,
    len: usize,
}

impl DmaBuf {
    /// Wrap a buffer that lives for the rest of the program.
    pub fn from_static(buf: &'static mut [u8]) -> Self {
        Self {
            addr: buf.as_mut_ptr() as usize,
            len: buf.len(),
        }
    }

    /// Wrap raw parts.
    ///
    /// # Safety
    ///
    /// `ptr..ptr+len` must be valid for reads and writes for as long as
    /// the buffer can be handed to a controller, and nothing else may
    /// access it while the engine owns it.
    pub unsafe fn from_raw(ptr: *mut u8, len: usize) -> Self {
        Self {
            addr: ptr as usize,
            len,
        }
    }

    pub(crate) fn from_slice(buf: &mut [u8]) -> Self {
        Self {
            addr: buf.as_mut_ptr() as usize,
            len: buf.len(),
        }
    }

    /// Start address.
    pub fn addr(&self) -> usize {
        self.addr
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Zero-length buffer.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Borrow the bytes.
    ///
    /// # Safety
    ///
    /// The buffer must have been returned by the controller (finished
    /// callback, or the internal buffer while no frame lands in it) and
    /// must not be in flight.
    pub unsafe fn as_slice(&self) -> &[u8] {
        // SAFETY: constructors guarantee a valid region; the caller
        // guarantees the engine is not using it.
        unsafe { core::slice::from_raw_parts(self.addr as *const u8, self.len) }
    }

    /// Mutably borrow the bytes.
    ///
    /// # Safety
    ///
    /// As [`Self::as_slice`], and no other borrow of the region may exist.
    pub unsafe fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: see above.
        unsafe { core::slice::from_raw_parts_mut(self.addr as *mut u8, self.len) }
    }
}

/// One frame's worth of work handed between client and controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Transaction {
    /// Target (capture) or source (refresh) buffer. `None` means the
    /// client had nothing to offer.
    pub buffer: Option<DmaBuf>,
    /// Bytes moved; set by the controller on completion.
    pub received_size: usize,
}

impl Transaction {
    /// No buffer.
    pub const EMPTY: Self = Self {
        buffer: None,
        received_size: 0,
    };

    /// A transaction around `buffer`.
    pub const fn new(buffer: DmaBuf) -> Self {
        Self {
            buffer: Some(buffer),
            received_size: 0,
        }
    }
}

/// Client callbacks, run from the completion interrupt.
///
/// Each returns `true` if it woke a task of higher priority than the
/// interrupted one. With `isr_cache_safe` the handler object must live in
/// ISR-safe memory.
pub trait StreamHandler {
    /// Pull mode: fill `trans.buffer` with the next frame buffer, or
    /// leave it `None` to let the controller fall back to its internal
    /// buffer. Ignored in queue mode.
    fn on_get_new_trans(&self, _trans: &mut Transaction) -> bool {
        false
    }

    /// A frame finished landing in (capture) or leaving (refresh)
    /// `trans.buffer`. The buffer is back in the client's hands.
    fn on_trans_finished(&self, trans: &Transaction) -> bool;
}
