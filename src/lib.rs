pub mod bus;
pub mod config;
pub mod device;
pub mod error;
pub mod floppy;
pub mod keyboard;
pub mod machine;
pub mod memory;
pub mod peripheral;
pub mod rom;

pub use bus::{AddressMapBuilder, AddressSpace, Binding, Bus, BusSnapshot, CpuIo};
pub use config::MachineConfig;
pub use device::{CapabilityKind, CapabilityValue, DeviceCategory, DeviceRegistry};
pub use error::{ConfigError, SnapshotError};
pub use keyboard::{KeyMatrix, Keyboard};
pub use machine::{CompisPeripherals, Machine, MachineBuilder};
use wasm_bindgen::prelude::*;

pub fn get_machine(rom_data: &[u8]) -> Result<Machine, ConfigError> {
    MachineBuilder::new()
        .rom(rom_data)
        .peripherals(CompisPeripherals::latches())
        .build()
}

fn js_error(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

#[wasm_bindgen(js_name = Machine)]
pub struct JsMachine(Machine);

#[wasm_bindgen(js_class = Machine)]
impl JsMachine {
    #[wasm_bindgen(constructor)]
    pub fn new(rom_data: &[u8]) -> Result<JsMachine, JsValue> {
        console_error_panic_hook::set_once();
        // A second Machine finds the subscriber already installed.
        let _ = tracing_wasm::try_set_as_global_default();

        get_machine(rom_data).map(Self).map_err(js_error)
    }

    #[wasm_bindgen(js_name = readByte)]
    pub fn read_byte(&mut self, address: u32) -> u8 {
        self.0.read_byte(address)
    }

    #[wasm_bindgen(js_name = writeByte)]
    pub fn write_byte(&mut self, address: u32, value: u8) {
        self.0.write_byte(address, value);
    }

    #[wasm_bindgen(js_name = portIn)]
    pub fn port_in(&mut self, port: u16) -> u8 {
        self.0.port_in(port)
    }

    #[wasm_bindgen(js_name = portOut)]
    pub fn port_out(&mut self, port: u16, value: u8) {
        self.0.port_out(port, value);
    }

    #[wasm_bindgen(js_name = keyDown)]
    pub fn key_down(&mut self, code: &str) -> bool {
        self.0.key_down(code)
    }

    #[wasm_bindgen(js_name = keyUp)]
    pub fn key_up(&mut self, code: &str) -> bool {
        self.0.key_up(code)
    }

    #[wasm_bindgen(js_name = keyboardRow)]
    pub fn keyboard_row(&self, row: u8) -> u16 {
        self.0.keyboard_row(row)
    }

    pub fn reset(&mut self) {
        self.0.reset();
    }

    pub fn snapshot(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.0.snapshot()).map_err(js_error)
    }

    pub fn restore(&mut self, json: &str) -> Result<(), JsValue> {
        let snapshot: BusSnapshot = serde_json::from_str(json).map_err(js_error)?;
        self.0.restore(&snapshot).map_err(js_error)
    }

    #[wasm_bindgen(getter = floppyCount)]
    pub fn floppy_count(&self) -> i64 {
        let machine = &self.0;
        machine
            .devices()
            .query(machine.floppy(), CapabilityKind::Count)
            .as_int()
            .unwrap_or(0)
    }

    #[wasm_bindgen(getter = printerCount)]
    pub fn printer_count(&self) -> i64 {
        let machine = &self.0;
        machine
            .devices()
            .query(machine.printer(), CapabilityKind::Count)
            .as_int()
            .unwrap_or(0)
    }
}
