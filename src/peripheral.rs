use std::{cell::RefCell, fmt, rc::Rc};

use derivative::Derivative;

/// The register-level face of a chip, as seen through its I/O window.
///
/// `offset` is relative to the first address of the window the chip is
/// mapped at. Reads take `&mut self` because reading a chip register often
/// has side effects (clearing a status flag, popping a FIFO).
pub trait Peripheral {
    fn read(&mut self, offset: u32) -> u8;
    fn write(&mut self, offset: u32, value: u8);
}

pub type SharedPeripheral = Rc<RefCell<dyn Peripheral>>;

/// Wrap a chip so it can be bound into an address map while the caller keeps
/// a typed handle to it.
pub fn shared<P: Peripheral + 'static>(peripheral: P) -> Rc<RefCell<P>> {
    Rc::new(RefCell::new(peripheral))
}

/// Binding target for a peripheral register window.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct HandlerPair {
    #[derivative(Debug = "ignore")]
    device: SharedPeripheral,
    writable: bool,
}

impl HandlerPair {
    pub fn new(device: SharedPeripheral) -> Self {
        Self {
            device,
            writable: true,
        }
    }

    /// A window that only decodes reads; writes never reach the chip.
    pub fn read_only(device: SharedPeripheral) -> Self {
        Self {
            device,
            writable: false,
        }
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn read(&self, offset: u32) -> u8 {
        self.device.borrow_mut().read(offset)
    }

    /// Returns false when the window dropped the write.
    pub fn write(&self, offset: u32, value: u8) -> bool {
        if !self.writable {
            return false;
        }
        self.device.borrow_mut().write(offset, value);
        true
    }
}

/// A peripheral built from a pair of closures.
pub struct FnPeripheral<R, W>
where
    R: FnMut(u32) -> u8,
    W: FnMut(u32, u8),
{
    read: R,
    write: W,
}

impl<R, W> FnPeripheral<R, W>
where
    R: FnMut(u32) -> u8,
    W: FnMut(u32, u8),
{
    pub fn new(read: R, write: W) -> Self {
        Self { read, write }
    }
}

impl<R, W> Peripheral for FnPeripheral<R, W>
where
    R: FnMut(u32) -> u8,
    W: FnMut(u32, u8),
{
    fn read(&mut self, offset: u32) -> u8 {
        (self.read)(offset)
    }

    fn write(&mut self, offset: u32, value: u8) {
        (self.write)(offset, value)
    }
}

/// Plain register file standing in for a chip whose behavior is not
/// emulated. Writes are stored, reads return the last value written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterLatch {
    name: &'static str,
    registers: Vec<u8>,
}

impl RegisterLatch {
    pub fn new(name: &'static str, size: usize) -> Self {
        Self {
            name,
            registers: vec![0xFF; size],
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn registers(&self) -> &[u8] {
        &self.registers
    }
}

impl Peripheral for RegisterLatch {
    fn read(&mut self, offset: u32) -> u8 {
        let value = self.registers.get(offset as usize).copied().unwrap_or(0xFF);
        tracing::trace!("[{}] [RD] [{:02X}] = {:02X}", self.name, offset, value);
        value
    }

    fn write(&mut self, offset: u32, value: u8) {
        tracing::trace!("[{}] [WR] [{:02X}] = {:02X}", self.name, offset, value);
        if let Some(register) = self.registers.get_mut(offset as usize) {
            *register = value;
        }
    }
}

impl fmt::Display for RegisterLatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} latch ({} registers)", self.name, self.registers.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_only_window_drops_writes() {
        let latch = shared(RegisterLatch::new("DACK", 1));
        let pair = HandlerPair::read_only(latch.clone());

        assert!(!pair.write(0, 0x12));
        assert_eq!(latch.borrow().registers(), &[0xFF]);
        assert_eq!(pair.read(0), 0xFF);
    }

    #[test]
    fn test_fn_peripheral_forwards_offsets() {
        let writes = Rc::new(RefCell::new(Vec::new()));
        let sink = writes.clone();
        let device = shared(FnPeripheral::new(
            |offset| offset as u8 + 1,
            move |offset, value| sink.borrow_mut().push((offset, value)),
        ));
        let pair = HandlerPair::new(device);

        assert_eq!(pair.read(4), 5);
        assert!(pair.write(2, 0x99));
        assert_eq!(*writes.borrow(), vec![(2, 0x99)]);
    }
}
