//! Shared rig for the controller tests: leaked frame buffers and a
//! recording handler.

#![allow(dead_code)]
#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::Mutex;

use platform::mocks::MockPlatform;
use platform::{AddressMap, ClockId, PeripheralId};
use stream::{DmaBuf, StreamConfig, StreamHandler, Transaction};

/// 8 × 4 pixels at 16 bpp.
pub const FRAME: usize = 64;
pub const BRIDGE_PERIPHERAL: PeripheralId = PeripheralId(3);
pub const BRIDGE_CLOCK: ClockId = ClockId(1);

pub fn config() -> StreamConfig {
    StreamConfig::new(8, 4, 16)
}

/// Cache-line aligned frame storage.
#[repr(C, align(64))]
pub struct Frame(pub [u8; 2 * FRAME]);

impl Frame {
    pub const fn new() -> Self {
        Self([0; 2 * FRAME])
    }
}

/// A client buffer of `len` bytes that lives for the rest of the test run.
pub fn user_buffer(len: usize) -> DmaBuf {
    let frame: &'static mut Frame = Box::leak(Box::new(Frame::new()));
    DmaBuf::from_static(&mut frame.0[..len])
}

/// Cacheable alias of `buf`, as the engine sees it in a descriptor.
pub fn engine_addr(platform: &MockPlatform, buf: DmaBuf) -> u64 {
    platform.cached(buf.addr()).get() as u64
}

/// Pull-mode handler: hands out queued buffers, records completions and
/// logs a `"finished"` marker into the platform log.
pub struct Recorder<'a> {
    platform: &'a MockPlatform,
    ready: Mutex<VecDeque<DmaBuf>>,
    finished: Mutex<Vec<Transaction>>,
    yield_on_finish: bool,
}

impl<'a> Recorder<'a> {
    pub fn new(platform: &'a MockPlatform) -> Self {
        Self {
            platform,
            ready: Mutex::new(VecDeque::new()),
            finished: Mutex::new(Vec::new()),
            yield_on_finish: true,
        }
    }

    pub fn offer(&self, buf: DmaBuf) {
        self.ready.lock().unwrap().push_back(buf);
    }

    pub fn finished(&self) -> Vec<Transaction> {
        self.finished.lock().unwrap().clone()
    }

    pub fn finished_addrs(&self) -> Vec<usize> {
        self.finished()
            .iter()
            .filter_map(|t| t.buffer.map(|b| b.addr()))
            .collect()
    }
}

impl StreamHandler for Recorder<'_> {
    fn on_get_new_trans(&self, trans: &mut Transaction) -> bool {
        if let Some(buf) = self.ready.lock().unwrap().pop_front() {
            trans.buffer = Some(buf);
        }
        false
    }

    fn on_trans_finished(&self, trans: &Transaction) -> bool {
        self.platform.note("finished");
        self.finished.lock().unwrap().push(*trans);
        self.yield_on_finish
    }
}
