use crate::TesterError;
use crate::metrics::IoMetrics;
use crate::uart::Uart;
use cishield_hal::config::{BoardPins, TesterConstants};
use cishield_hal::pins::{
    IoExpanderReg, LOGICAL_PINS, LogicalPin, PHYSICAL_PINS, Peripheral, PhysicalPin, Pull,
    UNMAPPED,
};
use cishield_hal::regs::{
    GPIO_DRIVE, GPIO_LEVEL, REMAP_BASE, REMAP_SLOTS, RESET_ALL, RESET_PERIPHERALS, Register,
    SysReg,
};
use cishield_hal::traits::Transport;

/// Driver for one tester.
///
/// Keeps a shadow of which physical pin each logical slot is bound to, so that
/// rebinding can unmap stale entries without reading the table back.
pub struct Tester<T: Transport = Box<dyn Transport>> {
    transport: T,
    bitbang: Option<Box<dyn Transport>>,
    board: BoardPins,
    constants: TesterConstants,
    bindings: [Option<PhysicalPin>; LOGICAL_PINS],
}

impl<T: Transport> Tester<T> {
    pub fn new(transport: T, board: BoardPins, constants: TesterConstants) -> Self {
        Self {
            transport,
            bitbang: None,
            board,
            constants,
            bindings: [None; LOGICAL_PINS],
        }
    }

    /// Attach the bit-banged channel used by the `_bb` operations.
    pub fn with_bitbang(mut self, transport: impl Transport + 'static) -> Self {
        self.bitbang = Some(Box::new(transport));
        self
    }

    pub fn board(&self) -> &BoardPins {
        &self.board
    }

    pub fn constants(&self) -> TesterConstants {
        self.constants
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    /// Physical pin by form-factor name.
    pub fn pin(&self, name: &str) -> Result<PhysicalPin, TesterError> {
        self.board
            .physical(name)
            .ok_or_else(|| TesterError::UnknownPin(name.to_string()))
    }

    /// Physical pin by tester index.
    pub fn pin_at(&self, index: usize) -> Result<PhysicalPin, TesterError> {
        PhysicalPin::new(index).ok_or(TesterError::PhysicalPinOutOfRange(index))
    }

    pub fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), TesterError> {
        self.transport.read(address, buf)?;
        Ok(())
    }

    pub fn write(&mut self, address: u32, data: &[u8]) -> Result<(), TesterError> {
        self.transport.write(address, data)?;
        Ok(())
    }

    pub(crate) fn read_reg(&mut self, reg: Register) -> Result<u32, TesterError> {
        let mut bytes = [0u8; 4];
        self.transport.read(reg.address(), &mut bytes[..reg.width()])?;
        Ok(u32::from_le_bytes(bytes))
    }

    pub(crate) fn write_reg(&mut self, reg: Register, value: u32) -> Result<(), TesterError> {
        self.transport
            .write(reg.address(), &value.to_le_bytes()[..reg.width()])?;
        Ok(())
    }

    fn bitbang(&mut self) -> Result<&mut Box<dyn Transport>, TesterError> {
        self.bitbang.as_mut().ok_or(TesterError::NoBitBangChannel)
    }

    /// Whole-device reset: remap table, IO expander, metrics and peripherals.
    pub fn reset(&mut self) -> Result<(), TesterError> {
        log::info!("resetting tester over {}", self.transport.name());
        self.write_reg(Register::Sys(SysReg::Reset), RESET_ALL as u32)?;
        self.bindings = [None; LOGICAL_PINS];
        Ok(())
    }

    /// Peripheral registers back to power-on defaults; nothing is selected.
    pub fn peripherals_reset(&mut self) -> Result<(), TesterError> {
        log::debug!("resetting peripherals");
        self.write_reg(Register::Sys(SysReg::Reset), RESET_PERIPHERALS as u32)
    }

    pub fn select_peripheral(&mut self, peripheral: Peripheral) -> Result<(), TesterError> {
        log::debug!("selecting {peripheral:?}");
        self.write_reg(Register::PeripheralSelect, peripheral.id() as u32)
    }

    pub fn selected_peripheral(&mut self) -> Result<Peripheral, TesterError> {
        let id = self.read_reg(Register::PeripheralSelect)? as u8;
        Peripheral::from_id(id).ok_or(TesterError::UnknownPeripheral(id))
    }

    pub fn pin_map_reset(&mut self) -> Result<(), TesterError> {
        self.write(REMAP_BASE, &[UNMAPPED; REMAP_SLOTS])?;
        self.bindings = [None; LOGICAL_PINS];
        Ok(())
    }

    /// Bind `physical` to the slot of `logical`, in both directions.
    ///
    /// Whatever pin held the slot before, and whatever slot held the pin
    /// before, are unmapped first.
    pub fn pin_map_set(
        &mut self,
        physical: PhysicalPin,
        logical: LogicalPin,
    ) -> Result<(), TesterError> {
        let slot = logical.slot() as usize;
        if let Some(old) = self.bindings[slot].filter(|&old| old != physical) {
            self.write_reg(Register::Remap(old.index()), UNMAPPED as u32)?;
            self.bindings[slot] = None;
        }
        for other in 0..LOGICAL_PINS {
            if other != slot && self.bindings[other] == Some(physical) {
                self.write_reg(Register::Remap(logical_slot(other)), UNMAPPED as u32)?;
                self.bindings[other] = None;
            }
        }
        self.write_reg(Register::Remap(physical.index()), slot as u32)?;
        self.write_reg(Register::Remap(logical_slot(slot)), physical.index() as u32)?;
        self.bindings[slot] = Some(physical);
        log::debug!("mapped {physical} to {logical:?} (slot {slot})");
        Ok(())
    }

    /// Logical slot the physical pin is bound to, as the tester reports it.
    pub fn pin_map_get(&mut self, physical: PhysicalPin) -> Result<Option<u8>, TesterError> {
        let value = self.read_reg(Register::Remap(physical.index()))? as u8;
        Ok((value != UNMAPPED).then_some(value))
    }

    pub fn pin_map_is_mapped(&mut self, physical: PhysicalPin) -> Result<bool, TesterError> {
        Ok(self.pin_map_get(physical)?.is_some())
    }

    /// Physical pin bound to the slot of `logical`, as the tester reports it.
    pub fn pin_map_logical(
        &mut self,
        logical: LogicalPin,
    ) -> Result<Option<PhysicalPin>, TesterError> {
        let value = self.read_reg(Register::Remap(logical_slot(logical.slot() as usize)))?;
        Ok(PhysicalPin::new(value as usize))
    }

    /// Drive a GPIO channel to `level`, or release it when `drive` is false.
    pub fn gpio_write(
        &mut self,
        logical: LogicalPin,
        level: bool,
        drive: bool,
    ) -> Result<(), TesterError> {
        let mut value = 0;
        if drive {
            value |= GPIO_DRIVE;
            if level {
                value |= GPIO_LEVEL;
            }
        }
        self.write_reg(Register::Gpio(logical.slot()), value as u32)
    }

    pub fn gpio_read(&mut self, logical: LogicalPin) -> Result<bool, TesterError> {
        Ok(self.read_reg(Register::Gpio(logical.slot()))? & GPIO_LEVEL as u32 != 0)
    }

    pub fn pin_set_pull(&mut self, physical: PhysicalPin, pull: Pull) -> Result<(), TesterError> {
        set_pull(&mut self.transport, physical, pull)
    }

    pub fn pin_set_pull_bb(
        &mut self,
        physical: PhysicalPin,
        pull: Pull,
    ) -> Result<(), TesterError> {
        set_pull(self.bitbang()?, physical, pull)
    }

    /// Every physical pin back to tri-state with no pull.
    pub fn pin_pull_reset_all(&mut self) -> Result<(), TesterError> {
        let config = Register::IoExpander {
            reg: IoExpanderReg::Config,
            pin: 0,
        };
        self.write(config.address(), &[1; PHYSICAL_PINS])
    }

    pub fn io_expander_read(
        &mut self,
        physical: PhysicalPin,
        reg: IoExpanderReg,
    ) -> Result<u8, TesterError> {
        io_expander_read(&mut self.transport, physical, reg)
    }

    pub fn io_expander_read_bb(
        &mut self,
        physical: PhysicalPin,
        reg: IoExpanderReg,
    ) -> Result<u8, TesterError> {
        io_expander_read(self.bitbang()?, physical, reg)
    }

    pub fn uart(&mut self) -> Uart<'_, T> {
        Uart::new(self)
    }

    pub fn io_metrics(&mut self) -> IoMetrics<'_, T> {
        IoMetrics::new(self)
    }
}

fn logical_slot(slot: usize) -> u8 {
    (PHYSICAL_PINS + slot) as u8
}

fn set_pull<X: Transport + ?Sized>(
    transport: &mut X,
    physical: PhysicalPin,
    pull: Pull,
) -> Result<(), TesterError> {
    let pin = physical.index();
    let addr = |reg| Register::IoExpander { reg, pin }.address();
    // Output first so the pin never drives the opposite level.
    match pull {
        Pull::PullDown => {
            transport.write(addr(IoExpanderReg::Output), &[0])?;
            transport.write(addr(IoExpanderReg::Config), &[0])?;
        }
        Pull::PullUp => {
            transport.write(addr(IoExpanderReg::Output), &[1])?;
            transport.write(addr(IoExpanderReg::Config), &[0])?;
        }
        Pull::PullNone => transport.write(addr(IoExpanderReg::Config), &[1])?,
    }
    log::debug!("{physical} pull {pull:?} via {}", transport.name());
    Ok(())
}

fn io_expander_read<X: Transport + ?Sized>(
    transport: &mut X,
    physical: PhysicalPin,
    reg: IoExpanderReg,
) -> Result<u8, TesterError> {
    let mut value = [0u8];
    let address = Register::IoExpander {
        reg,
        pin: physical.index(),
    }
    .address();
    transport.read(address, &mut value)?;
    Ok(value[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use cishield_fpga::SystemBusTransport;
    use cishield_hal::sim::SimTester;

    type SimBus = SystemBusTransport<SimTester>;

    fn tester() -> (Tester<SimBus>, SimTester) {
        let sim = SimTester::new();
        let board = BoardPins::new(["D0", "D1", "D2", "D3"], ["D0"]).unwrap();
        (
            Tester::new(SystemBusTransport::new(sim.clone()), board, TesterConstants::default()),
            sim,
        )
    }

    fn pin(n: usize) -> PhysicalPin {
        PhysicalPin::new(n).unwrap()
    }

    #[test]
    fn rebinding_a_slot_unmaps_the_old_pin() {
        let (mut t, sim) = tester();
        t.pin_map_set(pin(3), LogicalPin::Gpio0).unwrap();
        t.pin_map_set(pin(7), LogicalPin::Gpio0).unwrap();
        assert_eq!(t.pin_map_get(pin(3)).unwrap(), None);
        assert_eq!(t.pin_map_get(pin(7)).unwrap(), Some(0));
        assert_eq!(t.pin_map_logical(LogicalPin::Gpio0).unwrap(), Some(pin(7)));
        assert_eq!(sim.peek(REMAP_BASE + 128), 7);
    }

    #[test]
    fn moving_a_pin_unmaps_its_old_slot() {
        let (mut t, _sim) = tester();
        t.pin_map_set(pin(5), LogicalPin::Gpio1).unwrap();
        t.pin_map_set(pin(5), LogicalPin::UartTx).unwrap();
        assert_eq!(t.pin_map_logical(LogicalPin::Gpio1).unwrap(), None);
        assert_eq!(t.pin_map_logical(LogicalPin::UartTx).unwrap(), Some(pin(5)));
        assert_eq!(t.pin_map_get(pin(5)).unwrap(), Some(0));
    }

    #[test]
    fn roles_sharing_a_slot_replace_each_other() {
        let (mut t, _sim) = tester();
        t.pin_map_set(pin(2), LogicalPin::Gpio1).unwrap();
        t.pin_map_set(pin(4), LogicalPin::UartRx).unwrap();
        assert!(!t.pin_map_is_mapped(pin(2)).unwrap());
        assert!(t.pin_map_is_mapped(pin(4)).unwrap());
    }

    #[test]
    fn bb_without_channel_is_refused() {
        let (mut t, sim) = tester();
        let before = sim.transactions();
        let err = t.pin_set_pull_bb(pin(1), Pull::PullUp).unwrap_err();
        assert!(matches!(err, TesterError::NoBitBangChannel));
        assert_eq!(sim.transactions(), before);
    }

    #[test]
    fn pin_lookup() {
        let (t, _sim) = tester();
        assert_eq!(t.pin("D2").unwrap(), pin(2));
        assert!(matches!(t.pin("A5"), Err(TesterError::UnknownPin(_))));
        assert!(matches!(t.pin_at(200), Err(TesterError::PhysicalPinOutOfRange(200))));
    }

    #[test]
    fn selection_reads_back() {
        let (mut t, _sim) = tester();
        t.select_peripheral(Peripheral::Uart).unwrap();
        assert_eq!(t.selected_peripheral().unwrap(), Peripheral::Uart);
        t.peripherals_reset().unwrap();
        assert_eq!(t.selected_peripheral().unwrap(), Peripheral::None);
    }

    #[test]
    fn peripheral_reset_keeps_the_remap_table() {
        let (mut t, _sim) = tester();
        t.pin_map_set(pin(9), LogicalPin::Gpio3).unwrap();
        t.select_peripheral(Peripheral::Gpio).unwrap();
        t.peripherals_reset().unwrap();
        assert_eq!(t.pin_map_get(pin(9)).unwrap(), Some(3));
        t.reset().unwrap();
        assert_eq!(t.pin_map_get(pin(9)).unwrap(), None);
    }
}
