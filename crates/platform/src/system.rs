//! Clock, memory-region and interrupt collaborators.

use crate::ids::{ClockId, GroupId};

/// Clock and reset control.
///
/// Called exactly at group bring-up/teardown and at streaming controller
/// enable/disable.
pub trait ClockControl {
    /// Gate the bus clock of a DMA group.
    fn enable_bus_clock(&self, group: GroupId, on: bool);

    /// Pulse the reset line of a DMA group.
    fn reset(&self, group: GroupId);

    /// Gate a peripheral source clock (bridge pixel clock, ...).
    fn enable_source_clock(&self, clock: ClockId, on: bool);
}

/// Memory map queries.
pub trait MemoryRegions {
    /// `true` if `addr` stays readable while the flash cache is disabled
    /// (internal SRAM). Required for data touched from interrupt context
    /// on cache-safe configurations.
    fn is_isr_safe(&self, addr: usize) -> bool;

    /// `true` if the DMA engine can reach `addr`.
    fn is_dma_capable(&self, addr: usize) -> bool;
}

/// Interrupt installation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InterruptError {
    /// No CPU interrupt line is free.
    NoFreeVector,
    /// The requested priority level cannot be satisfied.
    PriorityUnavailable,
}

/// Installs the per-group shared interrupt vector.
pub trait InterruptController {
    /// Install the handler for `group` at `priority` (0 = platform default).
    ///
    /// Returns the effective priority level actually granted.
    fn install(&self, group: GroupId, priority: u8) -> Result<u8, InterruptError>;

    /// Remove the handler for `group`.
    fn uninstall(&self, group: GroupId);
}
