use std::collections::HashSet;

use once_cell::sync::Lazy;

use crate::error::ConfigError;

pub const MATRIX_ROWS: u8 = 8;
pub const MATRIX_BITS: u8 = 16;

/// Row word with no key held down. Keys are active low.
pub const ROW_IDLE: u16 = 0xFFFF;

static COMPIS_MATRIX: Lazy<KeyMatrix> = Lazy::new(|| {
    KeyMatrix::new(compis_mapping().to_vec()).expect("Compis key table has a consistent layout")
});

#[derive(Debug, Clone)]
pub struct Keyboard {
    pressed: HashSet<Key>,
    matrix: KeyMatrix,
}

impl Keyboard {
    pub fn new() -> Self {
        Keyboard::default()
    }

    pub fn with_matrix(matrix: KeyMatrix) -> Self {
        Keyboard {
            pressed: HashSet::new(),
            matrix,
        }
    }

    pub fn matrix(&self) -> &KeyMatrix {
        &self.matrix
    }

    /// Press the key bound to the host key `code`. Returns false when the
    /// code has no place in the matrix.
    pub fn key_down(&mut self, code: &str) -> bool {
        match self.matrix.find(code) {
            Some(cell) => {
                tracing::trace!(
                    "[KEYBOARD] Down {} -> row {} bit {}",
                    cell.name,
                    cell.row,
                    cell.bit
                );
                self.pressed.insert(cell.key);
                true
            }
            None => {
                tracing::trace!("[KEYBOARD] Unmapped key {}", code);
                false
            }
        }
    }

    pub fn key_up(&mut self, code: &str) -> bool {
        match self.matrix.find(code) {
            Some(cell) => {
                self.pressed.remove(&cell.key);
                true
            }
            None => false,
        }
    }

    pub fn release_all(&mut self) {
        self.pressed.clear();
    }

    pub fn is_pressed(&self, key: Key) -> bool {
        self.pressed.contains(&key)
    }

    /// The 16-bit word the keyboard interface sees for `row`: one bit per
    /// key, cleared while the key is held.
    pub fn row(&self, row: u8) -> u16 {
        let mut ret = ROW_IDLE;

        for cell in self.matrix.row_cells(row) {
            if self.pressed.contains(&cell.key) {
                ret &= !(1 << cell.bit);
            }
        }

        ret
    }
}

impl Default for Keyboard {
    fn default() -> Self {
        Keyboard::with_matrix(KeyMatrix::compis().clone())
    }
}

/// Immutable (row, bit) table of the keyboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMatrix {
    cells: Vec<KeyCell>,
    grid: [[Option<usize>; MATRIX_BITS as usize]; MATRIX_ROWS as usize],
}

impl KeyMatrix {
    /// Lay `cells` out into the matrix. Every key and every host code gets
    /// exactly one cell, and no cell holds two keys.
    pub fn new(cells: Vec<KeyCell>) -> Result<Self, ConfigError> {
        let mut grid = [[None; MATRIX_BITS as usize]; MATRIX_ROWS as usize];
        let mut keys = HashSet::new();
        let mut codes = HashSet::new();

        for (index, cell) in cells.iter().enumerate() {
            if cell.row >= MATRIX_ROWS || cell.bit >= MATRIX_BITS {
                return Err(ConfigError::KeyOutOfMatrix {
                    key: cell.name.to_string(),
                    row: cell.row,
                    bit: cell.bit,
                });
            }

            let slot = &mut grid[cell.row as usize][cell.bit as usize];
            if let Some(existing) = *slot {
                let existing: &KeyCell = &cells[existing];
                return Err(ConfigError::KeyCellTaken {
                    row: cell.row,
                    bit: cell.bit,
                    existing: existing.name.to_string(),
                    key: cell.name.to_string(),
                });
            }

            if !keys.insert(cell.key) || !codes.insert(cell.code) {
                return Err(ConfigError::DuplicateKey(cell.name.to_string()));
            }

            *slot = Some(index);
        }

        Ok(KeyMatrix { cells, grid })
    }

    pub fn compis() -> &'static KeyMatrix {
        &COMPIS_MATRIX
    }

    pub fn cell(&self, row: u8, bit: u8) -> Option<&KeyCell> {
        let index = (*self.grid.get(row as usize)?.get(bit as usize)?)?;
        self.cells.get(index)
    }

    pub fn find(&self, code: &str) -> Option<&KeyCell> {
        self.cells.iter().find(|cell| cell.code == code)
    }

    pub fn locate(&self, code: &str) -> Option<(u8, u8)> {
        self.find(code).map(|cell| (cell.row, cell.bit))
    }

    pub fn key(&self, key: Key) -> Option<&KeyCell> {
        self.cells.iter().find(|cell| cell.key == key)
    }

    pub fn row_cells(&self, row: u8) -> impl Iterator<Item = &KeyCell> {
        self.cells.iter().filter(move |cell| cell.row == row)
    }

    pub fn cells(&self) -> &[KeyCell] {
        &self.cells
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Escape,
    D1,
    D2,
    D3,
    D4,
    D5,
    D6,
    D7,
    D8,
    D9,
    D0,
    Plus,
    Acute,
    Backspace,
    Tab,
    Q,
    W,
    E,
    R,
    T,
    Y,
    U,
    I,
    O,
    P,
    ARing,
    Diaeresis,
    Enter,
    CapsLock,
    A,
    S,
    D,
    F,
    G,
    H,
    J,
    K,
    L,
    ODiaeresis,
    ADiaeresis,
    Apostrophe,
    LeftShift,
    LessThan,
    Z,
    X,
    C,
    V,
    B,
    N,
    M,
    Comma,
    Period,
    Minus,
    RightShift,
    LeftSuperShift,
    LeftControl,
    Space,
    RightControl,
    RightSuperShift,
    Insert,
    Search,
    Erase,
    StartStop,
    Up,
    Abort,
    Left,
    Home,
    Right,
    TabLeft,
    Down,
    TabRight,
    CompisExclaim,
    CompisQuestion,
    CompisBar,
    F1,
    F2,
    CompisS,
    Num7,
    Num8,
    Num9,
    Num4,
    Num5,
    Num6,
    Num1,
    Num2,
    Num3,
    Num0,
    Num00,
    Num000,
    NumEnter,
    NumComma,
    NumMinus,
    NumPlus,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct KeyCell {
    pub key: Key,
    /// Legend printed on the keycap.
    pub name: &'static str,
    /// Host key code (`KeyboardEvent.code`) bound to the key.
    pub code: &'static str,
    pub row: u8,
    pub bit: u8,
}

impl KeyCell {
    pub const fn new(code: &'static str, name: &'static str, row: u8, bit: u8, key: Key) -> Self {
        KeyCell {
            key,
            name,
            code,
            row,
            bit,
        }
    }
}

// Rows 6 and 7 of the input ports are DIP switches, not keys.
fn compis_mapping() -> [KeyCell; 93] {
    [
        KeyCell::new("Escape", "Esc", 0, 0, Key::Escape),
        KeyCell::new("Digit1", "1 !", 0, 1, Key::D1),
        KeyCell::new("Digit2", "2 \"", 0, 2, Key::D2),
        KeyCell::new("Digit3", "3 #", 0, 3, Key::D3),
        KeyCell::new("Digit4", "4 $", 0, 4, Key::D4),
        KeyCell::new("Digit5", "5 %", 0, 5, Key::D5),
        KeyCell::new("Digit6", "6 &", 0, 6, Key::D6),
        KeyCell::new("Digit7", "7 /", 0, 7, Key::D7),
        KeyCell::new("Digit8", "8 (", 0, 8, Key::D8),
        KeyCell::new("Digit9", "9 )", 0, 9, Key::D9),
        KeyCell::new("Digit0", "0 =", 0, 10, Key::D0),
        KeyCell::new("Minus", "+ ?", 0, 11, Key::Plus),
        KeyCell::new("Equal", "\u{b4} `", 0, 12, Key::Acute),
        KeyCell::new("Backspace", "BACKSPACE", 0, 13, Key::Backspace),
        KeyCell::new("Tab", "TAB", 0, 14, Key::Tab),
        KeyCell::new("KeyQ", "q Q", 0, 15, Key::Q),
        KeyCell::new("KeyW", "w W", 1, 0, Key::W),
        KeyCell::new("KeyE", "e E", 1, 1, Key::E),
        KeyCell::new("KeyR", "r R", 1, 2, Key::R),
        KeyCell::new("KeyT", "t T", 1, 3, Key::T),
        KeyCell::new("KeyY", "y Y", 1, 4, Key::Y),
        KeyCell::new("KeyU", "u U", 1, 5, Key::U),
        KeyCell::new("KeyI", "i I", 1, 6, Key::I),
        KeyCell::new("KeyO", "o O", 1, 7, Key::O),
        KeyCell::new("KeyP", "p P", 1, 8, Key::P),
        KeyCell::new("BracketLeft", "\u{e5} \u{c5}", 1, 9, Key::ARing),
        KeyCell::new("BracketRight", "\u{a8} ^", 1, 10, Key::Diaeresis),
        KeyCell::new("Enter", "ENTER", 1, 11, Key::Enter),
        KeyCell::new("CapsLock", "CAPS", 1, 12, Key::CapsLock),
        KeyCell::new("KeyA", "a A", 1, 13, Key::A),
        KeyCell::new("KeyS", "s S", 1, 14, Key::S),
        KeyCell::new("KeyD", "d D", 1, 15, Key::D),
        KeyCell::new("KeyF", "f F", 2, 0, Key::F),
        KeyCell::new("KeyG", "g G", 2, 1, Key::G),
        KeyCell::new("KeyH", "h H", 2, 2, Key::H),
        KeyCell::new("KeyJ", "j J", 2, 3, Key::J),
        KeyCell::new("KeyK", "k K", 2, 4, Key::K),
        KeyCell::new("KeyL", "l L", 2, 5, Key::L),
        KeyCell::new("Semicolon", "\u{f6} \u{d6}", 2, 6, Key::ODiaeresis),
        KeyCell::new("Quote", "\u{e4} \u{c4}", 2, 7, Key::ADiaeresis),
        KeyCell::new("Backquote", "' *", 2, 8, Key::Apostrophe),
        KeyCell::new("ShiftLeft", "LSHIFT", 2, 9, Key::LeftShift),
        KeyCell::new("Backslash", "< >", 2, 10, Key::LessThan),
        KeyCell::new("KeyZ", "z Z", 2, 11, Key::Z),
        KeyCell::new("KeyX", "x X", 2, 12, Key::X),
        KeyCell::new("KeyC", "c C", 2, 13, Key::C),
        KeyCell::new("KeyV", "v V", 2, 14, Key::V),
        KeyCell::new("KeyB", "b B", 2, 15, Key::B),
        KeyCell::new("KeyN", "n N", 3, 0, Key::N),
        KeyCell::new("KeyM", "m M", 3, 1, Key::M),
        KeyCell::new("Comma", ", ;", 3, 2, Key::Comma),
        KeyCell::new("Period", ". :", 3, 3, Key::Period),
        KeyCell::new("Slash", "- _", 3, 4, Key::Minus),
        KeyCell::new("ShiftRight", "RSHIFT", 3, 5, Key::RightShift),
        KeyCell::new("AltLeft", "LSSHIFT", 3, 6, Key::LeftSuperShift),
        KeyCell::new("ControlLeft", "LCTRL", 3, 7, Key::LeftControl),
        KeyCell::new("Space", "SPACE", 3, 8, Key::Space),
        KeyCell::new("ControlRight", "RCTRL", 3, 9, Key::RightControl),
        KeyCell::new("AltRight", "RSSHIFT", 3, 10, Key::RightSuperShift),
        KeyCell::new("Insert", "INPASSA", 3, 11, Key::Insert),
        KeyCell::new("PrintScreen", "S\u{d6}K", 3, 12, Key::Search),
        KeyCell::new("Delete", "UTPL\u{c5}NA", 3, 13, Key::Erase),
        KeyCell::new("Pause", "START-STOP", 3, 14, Key::StartStop),
        KeyCell::new("ArrowUp", "UP", 3, 15, Key::Up),
        KeyCell::new("ScrollLock", "AVBRYT", 4, 0, Key::Abort),
        KeyCell::new("ArrowLeft", "LEFT", 4, 1, Key::Left),
        KeyCell::new("Home", "HOME", 4, 2, Key::Home),
        KeyCell::new("ArrowRight", "RIGHT", 4, 3, Key::Right),
        KeyCell::new("PageUp", "TABL", 4, 4, Key::TabLeft),
        KeyCell::new("ArrowDown", "DOWN", 4, 5, Key::Down),
        KeyCell::new("PageDown", "TABR", 4, 6, Key::TabRight),
        KeyCell::new("F3", "COMPIS !", 4, 7, Key::CompisExclaim),
        KeyCell::new("F4", "COMPIS ?", 4, 8, Key::CompisQuestion),
        KeyCell::new("F5", "COMPIS |", 4, 9, Key::CompisBar),
        KeyCell::new("F1", "F1", 4, 10, Key::F1),
        KeyCell::new("F2", "F2", 4, 11, Key::F2),
        KeyCell::new("NumLock", "COMPIS S", 4, 12, Key::CompisS),
        KeyCell::new("Numpad7", "KP 7", 4, 13, Key::Num7),
        KeyCell::new("Numpad8", "KP 8", 4, 14, Key::Num8),
        KeyCell::new("Numpad9", "KP 9", 4, 15, Key::Num9),
        KeyCell::new("Numpad4", "KP 4", 5, 0, Key::Num4),
        KeyCell::new("Numpad5", "KP 5", 5, 1, Key::Num5),
        KeyCell::new("Numpad6", "KP 6", 5, 2, Key::Num6),
        KeyCell::new("Numpad1", "KP 1", 5, 3, Key::Num1),
        KeyCell::new("Numpad2", "KP 2", 5, 4, Key::Num2),
        KeyCell::new("Numpad3", "KP 3", 5, 5, Key::Num3),
        KeyCell::new("Numpad0", "KP 0", 5, 6, Key::Num0),
        KeyCell::new("NumpadDivide", "KP 00", 5, 7, Key::Num00),
        KeyCell::new("NumpadMultiply", "KP 000", 5, 8, Key::Num000),
        KeyCell::new("NumpadEnter", "KP ENTER", 5, 9, Key::NumEnter),
        KeyCell::new("NumpadDecimal", "KP ,", 5, 10, Key::NumComma),
        KeyCell::new("NumpadSubtract", "KP -", 5, 11, Key::NumMinus),
        KeyCell::new("NumpadAdd", "KP +", 5, 12, Key::NumPlus),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compis_matrix_is_consistent() {
        let matrix = KeyMatrix::compis();
        assert_eq!(matrix.cells().len(), 93);
        assert_eq!(matrix.row_cells(0).count(), 16);
        assert_eq!(matrix.row_cells(5).count(), 13);
        assert_eq!(matrix.row_cells(6).count(), 0);
        assert_eq!(matrix.row_cells(7).count(), 0);
    }

    #[test]
    fn test_lookup_by_cell_and_code() {
        let matrix = KeyMatrix::compis();
        assert_eq!(matrix.cell(0, 0).unwrap().key, Key::Escape);
        assert_eq!(matrix.cell(3, 8).unwrap().key, Key::Space);
        assert_eq!(matrix.locate("Space"), Some((3, 8)));
        assert_eq!(matrix.locate("KeyQ"), Some((0, 15)));
        assert!(matrix.cell(5, 13).is_none());
        assert!(matrix.cell(8, 0).is_none());
        assert!(matrix.cell(0, 16).is_none());
    }

    #[test]
    fn test_rows_are_active_low() {
        let mut keyboard = Keyboard::new();
        assert_eq!(keyboard.row(0), ROW_IDLE);

        assert!(keyboard.key_down("Escape"));
        assert!(keyboard.key_down("KeyQ"));
        assert_eq!(keyboard.row(0), 0x7FFE);
        assert_eq!(keyboard.row(1), ROW_IDLE);

        keyboard.key_up("Escape");
        assert_eq!(keyboard.row(0), 0x7FFF);

        keyboard.release_all();
        assert_eq!(keyboard.row(0), ROW_IDLE);
    }

    #[test]
    fn test_unknown_code_is_ignored() {
        let mut keyboard = Keyboard::new();
        assert!(!keyboard.key_down("MediaPlayPause"));
        for row in 0..MATRIX_ROWS {
            assert_eq!(keyboard.row(row), ROW_IDLE);
        }
    }

    #[test]
    fn test_shared_cell_rejected() {
        let err = KeyMatrix::new(vec![
            KeyCell::new("KeyA", "a", 0, 3, Key::A),
            KeyCell::new("KeyB", "b", 0, 3, Key::B),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::KeyCellTaken { row: 0, bit: 3, .. }));
    }

    #[test]
    fn test_key_in_two_cells_rejected() {
        let err = KeyMatrix::new(vec![
            KeyCell::new("KeyA", "a", 0, 0, Key::A),
            KeyCell::new("KeyB", "a again", 0, 1, Key::A),
        ])
        .unwrap_err();
        assert_eq!(err, ConfigError::DuplicateKey("a again".to_string()));
    }

    #[test]
    fn test_cell_outside_matrix_rejected() {
        let err = KeyMatrix::new(vec![KeyCell::new("KeyA", "a", 8, 0, Key::A)]).unwrap_err();
        assert!(matches!(err, ConfigError::KeyOutOfMatrix { row: 8, .. }));
    }
}
