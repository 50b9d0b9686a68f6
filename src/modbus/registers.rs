use super::protocol::{MAX_COILS, MAX_DISCRETE_INPUTS, MAX_HOLDING_REGISTERS, MAX_INPUT_REGISTERS};

/// Bit table packed eight to a byte, least significant bit first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitTable<const N: usize> {
    bits: Vec<u8>,
}

impl<const N: usize> BitTable<N> {
    pub fn new() -> Self {
        Self {
            bits: vec![0u8; N.div_ceil(8)],
        }
    }

    pub const fn len(&self) -> usize {
        N
    }

    pub const fn is_empty(&self) -> bool {
        N == 0
    }

    pub fn get(&self, index: usize) -> Option<bool> {
        if index >= N {
            return None;
        }
        Some(self.bits[index / 8] & (1 << (index % 8)) != 0)
    }

    pub fn set(&mut self, index: usize, value: bool) -> bool {
        if index >= N {
            return false;
        }
        let mask = 1u8 << (index % 8);
        if value {
            self.bits[index / 8] |= mask;
        } else {
            self.bits[index / 8] &= !mask;
        }
        true
    }
}

impl<const N: usize> Default for BitTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

fn range(start: u16, quantity: u16, len: usize) -> Option<std::ops::Range<usize>> {
    let start = start as usize;
    let end = start + quantity as usize;
    (end <= len).then_some(start..end)
}

/// Register and bit tables of one slave device, zeroed on creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterStore {
    holding_registers: [u16; MAX_HOLDING_REGISTERS],
    input_registers: [u16; MAX_INPUT_REGISTERS],
    coils: BitTable<MAX_COILS>,
    discrete_inputs: BitTable<MAX_DISCRETE_INPUTS>,
}

impl RegisterStore {
    pub fn new() -> Self {
        Self {
            holding_registers: [0; MAX_HOLDING_REGISTERS],
            input_registers: [0; MAX_INPUT_REGISTERS],
            coils: BitTable::new(),
            discrete_inputs: BitTable::new(),
        }
    }

    pub fn holding_register(&self, index: u16) -> Option<u16> {
        self.holding_registers.get(index as usize).copied()
    }

    pub fn set_holding_register(&mut self, index: u16, value: u16) -> bool {
        match self.holding_registers.get_mut(index as usize) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// `None` when `start + quantity` runs past the table.
    pub fn holding_registers(&self, start: u16, quantity: u16) -> Option<&[u16]> {
        range(start, quantity, MAX_HOLDING_REGISTERS).map(|r| &self.holding_registers[r])
    }

    pub fn holding_registers_mut(&mut self, start: u16, quantity: u16) -> Option<&mut [u16]> {
        range(start, quantity, MAX_HOLDING_REGISTERS).map(move |r| &mut self.holding_registers[r])
    }

    pub fn input_register(&self, index: u16) -> Option<u16> {
        self.input_registers.get(index as usize).copied()
    }

    pub fn set_input_register(&mut self, index: u16, value: u16) -> bool {
        match self.input_registers.get_mut(index as usize) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn input_registers(&self, start: u16, quantity: u16) -> Option<&[u16]> {
        range(start, quantity, MAX_INPUT_REGISTERS).map(|r| &self.input_registers[r])
    }

    pub fn coil(&self, index: u16) -> Option<bool> {
        self.coils.get(index as usize)
    }

    pub fn set_coil(&mut self, index: u16, value: bool) -> bool {
        self.coils.set(index as usize, value)
    }

    pub fn discrete_input(&self, index: u16) -> Option<bool> {
        self.discrete_inputs.get(index as usize)
    }

    pub fn set_discrete_input(&mut self, index: u16, value: bool) -> bool {
        self.discrete_inputs.set(index as usize, value)
    }
}

impl Default for RegisterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_zeroed() {
        let store = RegisterStore::new();
        assert_eq!(store.holding_registers(0, 125).unwrap(), &[0u16; 125][..]);
        assert_eq!(store.coil(1999), Some(false));
    }

    #[test]
    fn holding_range_is_bounds_checked() {
        let mut store = RegisterStore::new();
        assert!(store.holding_registers(120, 5).is_some());
        assert!(store.holding_registers(120, 6).is_none());
        assert!(store.holding_registers(u16::MAX, u16::MAX).is_none());
        assert!(store.holding_registers_mut(125, 1).is_none());
        assert!(!store.set_holding_register(125, 1));
        assert_eq!(store.holding_register(125), None);
    }

    #[test]
    fn range_writes_land_in_place() {
        let mut store = RegisterStore::new();
        store
            .holding_registers_mut(10, 3)
            .unwrap()
            .copy_from_slice(&[7, 8, 9]);
        assert_eq!(store.holding_register(11), Some(8));
        assert_eq!(store.holding_registers(9, 5).unwrap(), &[0, 7, 8, 9, 0]);
    }

    #[test]
    fn input_registers_are_separate_from_holding() {
        let mut store = RegisterStore::new();
        assert!(store.set_input_register(4, 0xBEEF));
        assert_eq!(store.input_register(4), Some(0xBEEF));
        assert_eq!(store.holding_register(4), Some(0));
        assert_eq!(store.input_registers(0, 126), None);
    }

    #[test]
    fn bits_pack_lsb_first() {
        let mut table: BitTable<16> = BitTable::new();
        assert!(table.set(9, true));
        assert_eq!(table.bits, vec![0x00, 0x02]);
        assert!(!table.set(16, true));
        assert_eq!(table.get(16), None);
    }

    #[test]
    fn coils_and_discrete_inputs_toggle() {
        let mut store = RegisterStore::new();
        assert!(store.set_coil(1999, true));
        assert!(!store.set_coil(2000, true));
        assert_eq!(store.coil(1999), Some(true));
        assert!(store.set_discrete_input(7, true));
        assert!(store.set_discrete_input(7, false));
        assert_eq!(store.discrete_input(7), Some(false));
    }
}
