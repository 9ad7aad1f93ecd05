use cortex_m::peripheral::DWT;
use hal::{
    self,
    gpio::Pin,
    pac::SPI1,
    spi::{BaudRate, Spi, SpiConfig, SpiMode},
};

use voltlog_algo::frontend::AdcExchange;

use crate::pinout;

/// Minimum spacing between conversions required by the converter.
const CONVERSION_GAP_US: u32 = 5;

/// SPI front-end for the AD7682-class converter. One exchange moves one
/// full-width word; pacing between conversions is enforced here against
/// the DWT cycle counter so the engine never has to busy-wait explicitly.
pub struct AdcSpi {
    spi: Spi<SPI1>,
    cs_pin: Pin,
    last_conv: u32,
    gap_cycles: u32,
}

impl AdcSpi {
    pub fn new(spi_reg: SPI1, sysclk_hz: u32) -> Self {
        let spi_cfg = SpiConfig {
            mode: SpiMode::mode0(),
            ..Default::default()
        };

        pinout::adc::SPI1_SCK.init();
        pinout::adc::SPI1_MISO.init();
        pinout::adc::SPI1_MOSI.init();
        let mut cs_pin = pinout::adc::SPI1_CS.init();
        cs_pin.set_high();

        let spi = Spi::new(spi_reg, spi_cfg, BaudRate::Div16);

        AdcSpi {
            spi,
            cs_pin,
            last_conv: 0,
            gap_cycles: sysclk_hz / 1_000_000 * CONVERSION_GAP_US,
        }
    }

    pub fn get_spi(&mut self) -> &mut Spi<SPI1> {
        &mut self.spi
    }
}

impl AdcExchange for AdcSpi {
    fn exchange(&mut self, cfg: u16) -> u16 {
        // Pace consecutive conversions
        while DWT::cycle_count().wrapping_sub(self.last_conv) < self.gap_cycles {}
        self.last_conv = DWT::cycle_count();

        let mut buf = cfg.to_be_bytes();
        self.cs_pin.set_low();
        let _ = self.spi.transfer(&mut buf);
        self.cs_pin.set_high();
        u16::from_be_bytes(buf)
    }
}
