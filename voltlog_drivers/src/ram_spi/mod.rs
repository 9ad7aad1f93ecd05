use hal::{
    self,
    gpio::Pin,
    pac::SPI3,
    spi::{BaudRate, Spi, SpiConfig, SpiMode},
};

use voltlog_algo::ring_buffer::BufferMemory;

use crate::pinout;

const CMD_WRITE: u8 = 0x02;
const CMD_READ: u8 = 0x03;

/// 23LC1024-class serial RAM backing the raw sample ring. Each store or
/// load is one addressed bus transaction inside a critical section, so a
/// producer writing from the sampling interrupt and a consumer reading
/// from the background loop never interleave on the bus.
pub struct SpiRam {
    spi: Spi<SPI3>,
    cs_pin: Pin,
}

impl SpiRam {
    pub fn new(spi_reg: SPI3) -> Self {
        let spi_cfg = SpiConfig {
            mode: SpiMode::mode0(),
            ..Default::default()
        };

        pinout::ram::SPI3_SCK.init();
        pinout::ram::SPI3_MISO.init();
        pinout::ram::SPI3_MOSI.init();
        let mut cs_pin = pinout::ram::SPI3_CS.init();
        cs_pin.set_high();

        let spi = Spi::new(spi_reg, spi_cfg, BaudRate::Div8);

        SpiRam { spi, cs_pin }
    }

    /// Sends a command byte and a 24-bit address with the chip selected.
    fn command(&mut self, cmd: u8, addr: usize) {
        let header = [cmd, (addr >> 16) as u8, (addr >> 8) as u8, addr as u8];
        let _ = self.spi.write(&header);
    }
}

impl BufferMemory for SpiRam {
    const CAPACITY: usize = 0x2_0000;

    fn store(&mut self, offset: usize, data: &[u8]) {
        critical_section::with(|_| {
            self.cs_pin.set_low();
            self.command(CMD_WRITE, offset);
            let _ = self.spi.write(data);
            self.cs_pin.set_high();
        });
    }

    fn load(&mut self, offset: usize, dest: &mut [u8]) {
        critical_section::with(|_| {
            self.cs_pin.set_low();
            self.command(CMD_READ, offset);
            dest.fill(0);
            let _ = self.spi.transfer(dest);
            self.cs_pin.set_high();
        });
    }
}
