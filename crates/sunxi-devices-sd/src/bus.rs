use std::fmt;

/// Guest physical memory view used by the internal DMA engine.
///
/// The H3 is a 32-bit SoC: descriptor words and data buffer pointers are
/// 32-bit guest-physical addresses. The walker only ever needs raw byte
/// copies plus word access for descriptor fields, so the interface stays
/// deliberately narrow.
pub trait GuestMemory {
    fn read(&self, paddr: u32, buf: &mut [u8]);
    fn write(&mut self, paddr: u32, buf: &[u8]);
}

pub trait GuestMemoryExt: GuestMemory {
    /// Descriptor fields are little-endian words in guest memory.
    fn read_u32(&self, paddr: u32) -> u32 {
        let mut b = [0u8; 4];
        self.read(paddr, &mut b);
        u32::from_le_bytes(b)
    }

    fn write_u32(&mut self, paddr: u32, val: u32) {
        self.write(paddr, &val.to_le_bytes());
    }
}

impl<T: GuestMemory + ?Sized> GuestMemoryExt for T {}

/// Level-triggered interrupt output of the controller.
pub trait IrqLine {
    fn set_level(&self, high: bool);
}

#[derive(Default)]
struct TestIrqLineState {
    level: bool,
    transitions: Vec<bool>,
}

/// A simple, shareable IRQ line for unit tests.
#[derive(Clone, Default)]
pub struct TestIrqLine(std::sync::Arc<std::sync::Mutex<TestIrqLineState>>);

impl TestIrqLine {
    pub fn level(&self) -> bool {
        self.0.lock().unwrap().level
    }

    pub fn transitions(&self) -> Vec<bool> {
        self.0.lock().unwrap().transitions.clone()
    }
}

impl fmt::Debug for TestIrqLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.0.lock().unwrap();
        f.debug_struct("TestIrqLine")
            .field("level", &state.level)
            .field("transitions", &state.transitions)
            .finish()
    }
}

impl IrqLine for TestIrqLine {
    fn set_level(&self, high: bool) {
        let mut state = self.0.lock().unwrap();
        if state.level != high {
            state.level = high;
            state.transitions.push(high);
        }
    }
}

/// Flat guest RAM for unit tests. Out-of-bounds DMA in a test is a test bug,
/// so accesses are bounds-asserted rather than wrapped.
#[derive(Clone)]
pub struct TestMemory {
    data: Vec<u8>,
}

impl TestMemory {
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0; size],
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    fn check_range(&self, paddr: u32, len: usize) {
        let start = paddr as usize;
        let end = start
            .checked_add(len)
            .expect("guest memory address overflow");
        assert!(end <= self.data.len(), "guest memory OOB access");
    }
}

impl GuestMemory for TestMemory {
    fn read(&self, paddr: u32, buf: &mut [u8]) {
        self.check_range(paddr, buf.len());
        let start = paddr as usize;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
    }

    fn write(&mut self, paddr: u32, buf: &[u8]) {
        self.check_range(paddr, buf.len());
        let start = paddr as usize;
        self.data[start..start + buf.len()].copy_from_slice(buf);
    }
}
