//! Byte-wide register transport.
//!
//! The charger block is addressed with 16-bit register offsets. [`RegisterBus`] abstracts the
//! transport so the engine can sit on the PMIC's native SSBI link, an I2C bridge, or a test double.

use crate::registers::DEFAULT_I2C_ADDRESS;

/// Single-register read/write transport.
pub trait RegisterBus {
    type Error: core::fmt::Debug;

    fn read_byte(&mut self, addr: u16) -> Result<u8, Self::Error>;

    fn write_byte(&mut self, addr: u16, value: u8) -> Result<(), Self::Error>;
}

impl<T: RegisterBus + ?Sized> RegisterBus for &mut T {
    type Error = T::Error;

    fn read_byte(&mut self, addr: u16) -> Result<u8, Self::Error> {
        (**self).read_byte(addr)
    }

    fn write_byte(&mut self, addr: u16, value: u8) -> Result<(), Self::Error> {
        (**self).write_byte(addr, value)
    }
}

/// [`RegisterBus`] over an `embedded-hal` I2C bus. The register offset is sent big-endian.
pub struct I2cBus<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C> I2cBus<I2C> {
    /// Create a bus with the default 7-bit address (0x48).
    pub fn new(i2c: I2C) -> Self {
        Self {
            i2c,
            address: DEFAULT_I2C_ADDRESS,
        }
    }

    /// Create a bus with a custom 7-bit address.
    pub fn with_address(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Release the underlying I2C peripheral.
    pub fn free(self) -> I2C {
        self.i2c
    }
}

impl<I2C> RegisterBus for I2cBus<I2C>
where
    I2C: embedded_hal::i2c::I2c,
{
    type Error = I2C::Error;

    fn read_byte(&mut self, addr: u16) -> Result<u8, Self::Error> {
        let mut buf = [0u8; 1];
        self.i2c.write_read(self.address, &addr.to_be_bytes(), &mut buf)?;
        Ok(buf[0])
    }

    fn write_byte(&mut self, addr: u16, value: u8) -> Result<(), Self::Error> {
        let [hi, lo] = addr.to_be_bytes();
        self.i2c.write(self.address, &[hi, lo, value])
    }
}
