use crate::{
    bus::{AddressMapBuilder, AddressSpace, Bus, BusSnapshot, CpuIo},
    config::MachineConfig,
    device::{
        CapabilityKind, CapabilityValue, DeviceCategory, DeviceHandle, DeviceRegistry,
        DeviceRegistryBuilder,
    },
    error::{ConfigError, SnapshotError},
    floppy::COMPIS_FORMATS,
    keyboard::Keyboard,
    peripheral::{shared, RegisterLatch, SharedPeripheral},
    rom::{RomImage, COMPIS_ROM},
};

// +-----------------+------+------------------------------------------+
// | Program space   |      |                                          |
// +-----------------+------+------------------------------------------+
// | 00000-3FFFF     | RAM  | LMCS, low memory chip select             |
// | 40000-7FFFF     | RAM  | MMCS 0-3, midrange chip selects (64K ea) |
// | 80000-EFFFF     | NOP  | nothing decodes here                     |
// | F0000-FFFFF     | ROM  | UMCS, upper memory chip select (BIOS)    |
// +-----------------+------+------------------------------------------+
// | I/O space       |      |                                          |
// +-----------------+------+------------------------------------------+
// | 0001-0008       | PPI  | 8255                                     |
// | 0080-0087       | PIT  | 8253                                     |
// | 0100-011A       | RTC  | 58174                                    |
// | 0280-0282       | PIC  | 8259 inside the 80130 OSP                |
// | 0311-031F       | USART| 8251, keyboard link                      |
// | 0330-033E       | GDC  | 82720                                    |
// | 0340-0342       | FDC  | 8272 on the iSBX-218A (J8)               |
// | 0351            | DACK | FDC DMA acknowledge, read only           |
// | FF00-FFFF       | CPU  | 80186 peripheral control block           |
// +-----------------+------+------------------------------------------+

/// Register windows of the chips the Compis decodes in I/O space.
#[derive(Clone)]
pub struct CompisPeripherals {
    pub ppi: SharedPeripheral,
    pub pit: SharedPeripheral,
    pub rtc: SharedPeripheral,
    pub osp_pic: SharedPeripheral,
    pub usart: SharedPeripheral,
    pub gdc: SharedPeripheral,
    pub fdc: SharedPeripheral,
    pub fdc_dack: SharedPeripheral,
    pub cpu_internal: SharedPeripheral,
}

impl CompisPeripherals {
    /// Every window backed by a plain register latch, for hosts that do not
    /// model the chips yet.
    pub fn latches() -> Self {
        Self {
            ppi: shared(RegisterLatch::new("PPI", 8)),
            pit: shared(RegisterLatch::new("PIT", 8)),
            rtc: shared(RegisterLatch::new("RTC", 0x1B)),
            osp_pic: shared(RegisterLatch::new("PIC", 3)),
            usart: shared(RegisterLatch::new("USART", 0x0F)),
            gdc: shared(RegisterLatch::new("GDC", 0x0F)),
            fdc: shared(RegisterLatch::new("FDC", 3)),
            fdc_dack: shared(RegisterLatch::new("DACK", 1)),
            cpu_internal: shared(RegisterLatch::new("I186", 0x100)),
        }
    }
}

impl Default for CompisPeripherals {
    fn default() -> Self {
        Self::latches()
    }
}

pub fn compis_memory_map(builder: &mut AddressMapBuilder, rom: &RomImage) {
    use AddressSpace::Program;

    builder
        .ram(Program, 0x00000, 0x3FFFF, "LMCS")
        .ram(Program, 0x40000, 0x4FFFF, "MMCS0")
        .ram(Program, 0x50000, 0x5FFFF, "MMCS1")
        .ram(Program, 0x60000, 0x6FFFF, "MMCS2")
        .ram(Program, 0x70000, 0x7FFFF, "MMCS3")
        .unmapped(Program, 0x80000, 0xEFFFF, "NOP")
        .rom(Program, COMPIS_ROM.offset, COMPIS_ROM.end(), "UMCS", &rom.data);
}

pub fn compis_io_map(builder: &mut AddressMapBuilder, peripherals: &CompisPeripherals) {
    use AddressSpace::Io;

    let p = peripherals.clone();
    builder
        .handler(Io, 0x0001, 0x0008, "PPI 8255", p.ppi)
        .handler(Io, 0x0080, 0x0087, "PIT 8253", p.pit)
        .handler(Io, 0x0100, 0x011A, "RTC 58174", p.rtc)
        .handler(Io, 0x0280, 0x0282, "PIC 8259", p.osp_pic)
        .handler(Io, 0x0311, 0x031F, "USART 8251", p.usart)
        .handler(Io, 0x0330, 0x033E, "GDC 82720", p.gdc)
        .handler(Io, 0x0340, 0x0342, "FDC 8272", p.fdc)
        .read_handler(Io, 0x0351, 0x0351, "FDC DACK", p.fdc_dack)
        .handler(Io, 0xFF00, 0xFFFF, "80186", p.cpu_internal);
}

pub struct Machine {
    config: MachineConfig,
    bus: Bus,
    devices: DeviceRegistry,
    printer: DeviceHandle,
    floppy: DeviceHandle,
    keyboard: Keyboard,
}

impl Machine {
    pub fn new(
        config: MachineConfig,
        rom: &RomImage,
        peripherals: &CompisPeripherals,
    ) -> Result<Self, ConfigError> {
        tracing::info!(
            "[MACHINE] Initializing Compis: {} Hz, mask {:#010X}, ROM {} bytes",
            config.cpu_clock_hz,
            config.address_mask,
            rom.data.len()
        );

        let mut map = AddressMapBuilder::new();
        map.address_mask(AddressSpace::Program, config.address_mask)
            .unmapped_fill(config.unmapped_fill);
        compis_memory_map(&mut map, rom);
        compis_io_map(&mut map, peripherals);
        let bus = map.build()?;

        let mut registry = DeviceRegistryBuilder::new();
        let printer = registry.add_device("compis_printer", DeviceCategory::Printer);
        registry.register_value(
            printer,
            CapabilityKind::Count,
            CapabilityValue::Int(config.printer_count as i64),
        )?;
        let floppy = registry.add_device("compis_floppy", DeviceCategory::Floppy);
        registry
            .register_value(
                floppy,
                CapabilityKind::Count,
                CapabilityValue::Int(config.floppy_count as i64),
            )?
            .register_value(
                floppy,
                CapabilityKind::FloppyOptions,
                CapabilityValue::Formats(COMPIS_FORMATS),
            )?;

        Ok(Self {
            config,
            bus,
            devices: registry.build(),
            printer,
            floppy,
            keyboard: Keyboard::new(),
        })
    }

    pub fn from_json(
        json: &str,
        rom: &RomImage,
        peripherals: &CompisPeripherals,
    ) -> anyhow::Result<Self> {
        let config = MachineConfig::from_json(json)?;
        Ok(Self::new(config, rom, peripherals)?)
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut Bus {
        &mut self.bus
    }

    pub fn devices(&self) -> &DeviceRegistry {
        &self.devices
    }

    pub fn printer(&self) -> DeviceHandle {
        self.printer
    }

    pub fn floppy(&self) -> DeviceHandle {
        self.floppy
    }

    pub fn keyboard(&self) -> &Keyboard {
        &self.keyboard
    }

    pub fn keyboard_mut(&mut self) -> &mut Keyboard {
        &mut self.keyboard
    }

    pub fn key_down(&mut self, code: &str) -> bool {
        self.keyboard.key_down(code)
    }

    pub fn key_up(&mut self, code: &str) -> bool {
        self.keyboard.key_up(code)
    }

    pub fn keyboard_row(&self, row: u8) -> u16 {
        self.keyboard.row(row)
    }

    /// Full re-initialisation of the backing stores; ROM stays loaded.
    pub fn reset(&mut self) {
        tracing::info!("[MACHINE] Reset");
        self.bus.reset();
        self.keyboard.release_all();
    }

    pub fn snapshot(&self) -> BusSnapshot {
        self.bus.snapshot()
    }

    pub fn restore(&mut self, snapshot: &BusSnapshot) -> Result<(), SnapshotError> {
        self.bus.restore(snapshot)
    }

    pub fn print_memory_map(&self) {
        for space in [AddressSpace::Program, AddressSpace::Io] {
            println!("{} space:", space);
            for range in self.bus.ranges(space) {
                println!("  {}", range);
            }
        }
    }
}

impl CpuIo for Machine {
    fn read_byte(&mut self, address: u32) -> u8 {
        self.bus.read_byte(address)
    }

    fn write_byte(&mut self, address: u32, value: u8) {
        self.bus.write_byte(address, value)
    }

    fn port_in(&mut self, port: u16) -> u8 {
        self.bus.port_in(port)
    }

    fn port_out(&mut self, port: u16, value: u8) {
        self.bus.port_out(port, value)
    }
}

#[derive(Default)]
pub struct MachineBuilder {
    config: MachineConfig,
    rom: Option<RomImage>,
    peripherals: Option<CompisPeripherals>,
}

impl MachineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(&mut self, config: MachineConfig) -> &mut Self {
        self.config = config;
        self
    }

    pub fn rom(&mut self, data: &[u8]) -> &mut Self {
        self.rom = Some(RomImage::new(data));
        self
    }

    pub fn rom_image(&mut self, image: RomImage) -> &mut Self {
        self.rom = Some(image);
        self
    }

    pub fn peripherals(&mut self, peripherals: CompisPeripherals) -> &mut Self {
        self.peripherals = Some(peripherals);
        self
    }

    /// Missing pieces default to an erased ROM and register latches.
    pub fn build(&self) -> Result<Machine, ConfigError> {
        let rom = self.rom.clone().unwrap_or_else(|| RomImage::new(&[]));
        let peripherals = self.peripherals.clone().unwrap_or_default();
        Machine::new(self.config.clone(), &rom, &peripherals)
    }
}
