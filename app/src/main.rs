#![no_main]
#![no_std]

mod storage;

use defmt_rtt as _;
use panic_probe as _;

use core::sync::atomic::{AtomicU8, Ordering};

use cortex_m::peripheral::DWT;
use hal::{
    self,
    clocks::Clocks,
    gpio::Pin,
    pac,
    timer::{
        Alignment, CaptureCompareDma, CountDir, Timer, TimerConfig, TimerInterrupt, UpdateReqSrc,
    },
};

use voltlog_algo::{
    acquisition::Acquisition,
    config::{SessionConfig, MAX_CONVERSION_RATE_HZ},
    pipeline::WritePipeline,
    regulator::OutputRegulator,
    ring_buffer::{Consumer, Producer, RingBuffer},
    DaqError,
};
use voltlog_drivers::{adc_spi::AdcSpi, pwm::OutputPwm, ram_spi::SpiRam};

use storage::DebugStorage;

/// First fatal error of the session, latched by the interrupt contexts
/// and consumed by the background loop. 0 means no fault.
static FAULT: AtomicU8 = AtomicU8::new(0);

const FAULT_TIMING: u8 = 1;
const FAULT_OVERFLOW: u8 = 2;
const FAULT_STORAGE: u8 = 3;

/// Latches the first fatal error. Interrupt contexts call this and return;
/// reporting and shutdown happen in the background loop.
fn raise(err: DaqError) {
    let code = match err {
        DaqError::SampleTiming => FAULT_TIMING,
        DaqError::BufferOverflow => FAULT_OVERFLOW,
        DaqError::StorageWrite | DaqError::Config(_) => FAULT_STORAGE,
    };
    let _ = FAULT.compare_exchange(0, code, Ordering::AcqRel, Ordering::Relaxed);
}

fn fault_pending() -> bool {
    FAULT.load(Ordering::Relaxed) != 0
}

fn fault() -> Option<DaqError> {
    match FAULT.load(Ordering::Acquire) {
        FAULT_TIMING => Some(DaqError::SampleTiming),
        FAULT_OVERFLOW => Some(DaqError::BufferOverflow),
        FAULT_STORAGE => Some(DaqError::StorageWrite),
        _ => None,
    }
}

#[rtic::app(device = pac, peripherals = true, dispatchers = [TIM7])]
mod app {
    use super::*;

    #[shared]
    struct Shared {
        adc: AdcSpi,
    }

    #[local]
    struct Local {
        // regulator tick
        regulator: OutputRegulator,
        pwm: OutputPwm,
        // sample tick
        sample_timer: Timer<pac::TIM2>,
        daq: Acquisition,
        raw_prod: Producer<'static, SpiRam>,
        // background drain
        raw_cons: Consumer<'static, SpiRam>,
        pipeline: WritePipeline<DebugStorage>,
        config: SessionConfig,
        led_red: Pin,
        led_blu: Pin,
    }

    #[init]
    fn init(cx: init::Context) -> (Shared, Local) {
        let dp = cx.device;
        let mut core = cx.core;

        let clock_cfg = Clocks::default();
        clock_cfg.setup().unwrap();
        let sysclk = clock_cfg.sysclk();
        defmt::info!("SYSTEM: clock frequency is {} MHz", sysclk / 1_000_000);

        // Free-running cycle counter for the timing-integrity check
        core.DCB.enable_trace();
        core.DWT.enable_cycle_counter();

        // The configuration source hands in a validated table at session
        // start; bring-up runs on the defaults.
        let mut config = SessionConfig::default();
        config.apply_limits();

        // Range-select lines follow the channel table
        for (rsel, ch) in [
            voltlog_drivers::pinout::adc::RSEL1,
            voltlog_drivers::pinout::adc::RSEL2,
            voltlog_drivers::pinout::adc::RSEL3,
        ]
        .iter()
        .zip(config.channels.iter())
        {
            let mut pin = rsel.init();
            if ch.range == voltlog_algo::InputRange::High {
                pin.set_high();
            } else {
                pin.set_low();
            }
        }

        let adc = AdcSpi::new(dp.SPI1, sysclk);

        // Raw samples ride in the external serial RAM
        let raw_buff = cortex_m::singleton!(
            : RingBuffer<SpiRam> = RingBuffer::new(SpiRam::new(dp.SPI3))
        )
        .expect("raw buffer is claimed once");
        let raw_buff: &'static RingBuffer<SpiRam> = raw_buff;
        let (raw_prod, raw_cons) = raw_buff.try_split().expect("raw buffer is split once");

        // Output regulation comes up before sampling so the sensor supply
        // is stable by the first frame
        let mut pwm = OutputPwm::new(dp.TIM3, &clock_cfg);
        let mut regulator = OutputRegulator::new(config.output_mv);
        regulator.reset();
        pwm.enable();

        let mut pipeline = WritePipeline::new(DebugStorage::new());
        if pipeline.start(&config, "data.txt").is_err() {
            raise(DaqError::StorageWrite);
        }

        // Sample timer runs at the base conversion rate; requested rates
        // below it are reached by oversample averaging
        let mut sample_timer = Timer::new_tim2(
            dp.TIM2,
            MAX_CONVERSION_RATE_HZ as f32,
            TimerConfig {
                one_pulse_mode: false,
                update_request_source: UpdateReqSrc::Any,
                auto_reload_preload: true,
                alignment: Alignment::Edge,
                capture_compare_dma: CaptureCompareDma::Update,
                direction: CountDir::Up,
            },
            &clock_cfg,
        );
        sample_timer.enable_interrupt(TimerInterrupt::Update);

        // Red while recording, blue on a fatal error
        let mut led_red = voltlog_drivers::pinout::led::RED.init();
        let led_blu = voltlog_drivers::pinout::led::BLU.init();

        let mut daq = Acquisition::new();
        match daq.start(&config, sysclk, DWT::cycle_count()) {
            Ok(()) => {
                sample_timer.enable();
                led_red.set_high();
            }
            Err(err) => defmt::error!("DAQ: configuration rejected: {}", err),
        }

        (
            Shared { adc },
            Local {
                regulator,
                pwm,
                sample_timer,
                daq,
                raw_prod,
                raw_cons,
                pipeline,
                config,
                led_red,
                led_blu,
            },
        )
    }

    /// Output regulation tick. Highest priority; its one sense conversion
    /// preempts everything, so its lock on the bus is free.
    #[task(binds = TIM3, priority = 3, shared = [adc], local = [regulator, pwm])]
    fn output_tick(mut cx: output_tick::Context) {
        cx.local
            .pwm
            .get_timer()
            .clear_interrupt(TimerInterrupt::Update);

        if fault_pending() {
            // Fatal session error: output off via the shutdown line
            cx.local.pwm.disable();
            return;
        }

        let regulator = cx.local.regulator;
        let duty = cx.shared.adc.lock(|adc| regulator.on_pwm_tick(adc));
        cx.local.pwm.apply_duty(duty);
    }

    /// Sample-timing tick. Locking the bus masks the regulator tick for
    /// the bounded duration of one channel sweep.
    #[task(binds = TIM2, priority = 2, shared = [adc], local = [sample_timer, daq, raw_prod])]
    fn sample_tick(mut cx: sample_tick::Context) {
        cx.local
            .sample_timer
            .clear_interrupt(TimerInterrupt::Update);

        if fault_pending() {
            cx.local.daq.stop();
            cx.local.sample_timer.disable();
            return;
        }

        let daq = cx.local.daq;
        let raw_prod = cx.local.raw_prod;
        let cycle_now = DWT::cycle_count();
        let result = cx
            .shared
            .adc
            .lock(|adc| daq.on_tick(adc, cycle_now, raw_prod));

        if let Err(err) = result {
            // Disarm synchronously, then escalate; no I/O from here
            daq.stop();
            cx.local.sample_timer.disable();
            raise(err);
        }
    }

    /// Background context: the only place storage I/O happens.
    #[idle(local = [raw_cons, pipeline, config, led_red, led_blu])]
    fn idle(cx: idle::Context) -> ! {
        let idle::LocalResources {
            raw_cons,
            pipeline,
            config,
            led_red,
            led_blu,
            ..
        } = cx.local;

        loop {
            if let Some(err) = fault() {
                defmt::error!("DAQ: session halted: {}", err);
                led_red.set_low();
                led_blu.set_high();
                // Data already durable stays valid; flush the partial block
                if pipeline.flush(raw_cons, config).is_err() {
                    defmt::error!("DAQ: final flush failed");
                }
                loop {
                    cortex_m::asm::wfi();
                }
            }

            if let Err(err) = pipeline.drain(raw_cons, config) {
                raise(err);
            }
        }
    }
}

#[defmt::panic_handler]
fn panic() -> ! {
    cortex_m::asm::udf()
}
