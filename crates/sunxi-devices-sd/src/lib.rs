//! Allwinner H3 SD/MMC host controller emulation.
//!
//! The controller sits between a guest CPU and an abstract SD/eMMC card: it
//! decodes MMIO register accesses, dispatches commands over the [`sdbus::SdBus`]
//! seam, moves data either through the PIO FIFO register or through an
//! internal DMA engine that walks descriptor chains in guest memory, and
//! aggregates the result into a single level-triggered IRQ line.
//!
//! The crate is self-contained: the only external inputs are guest physical
//! memory (for DMA, via [`bus::GuestMemory`]), an interrupt line
//! ([`bus::IrqLine`]), and the card itself ([`sdbus::SdBus`]). Everything runs
//! synchronously; an MMIO write returns only after any command dispatch, DMA
//! walk, and IRQ update it triggered have completed.

pub mod bus;
pub mod sdbus;
pub mod sdhost;

pub use sdhost::SdHostController;
