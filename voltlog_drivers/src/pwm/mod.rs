use hal::{
    clocks::Clocks,
    gpio::Pin,
    pac::TIM3,
    timer::{
        Alignment, CaptureCompareDma, CountDir, OutputCompare, TimChannel, Timer, TimerConfig,
        TimerInterrupt, UpdateReqSrc,
    },
};

use voltlog_algo::regulator::OutputRegulator;

use crate::pinout;

/// PWM stage of the auxiliary sensor supply: TIM3 channel 1 at the
/// regulator rate, gated by the hardware shutdown line so a disabled
/// output is off, not merely unregulated.
pub struct OutputPwm {
    tim: Timer<TIM3>,
    shdn_pin: Pin,
}

impl OutputPwm {
    pub fn new(tim3: TIM3, clock_cfg: &Clocks) -> Self {
        let mut timer = Timer::new_tim3(
            tim3,
            OutputRegulator::PWM_RATE_HZ as f32,
            TimerConfig {
                one_pulse_mode: false,
                update_request_source: UpdateReqSrc::Any,
                auto_reload_preload: true,
                alignment: Alignment::Edge,
                capture_compare_dma: CaptureCompareDma::Update,
                direction: CountDir::Up,
            },
            clock_cfg,
        );
        timer.enable_interrupt(TimerInterrupt::Update);

        pinout::vout::PWM.init();
        let mut shdn_pin = pinout::vout::SHDN.init();
        shdn_pin.set_low();

        OutputPwm {
            tim: timer,
            shdn_pin,
        }
    }

    pub fn get_timer(&mut self) -> &mut Timer<TIM3> {
        &mut self.tim
    }

    /// Releases the shutdown line and starts the PWM stage and its tick
    /// interrupt at duty 0.
    pub fn enable(&mut self) {
        self.shdn_pin.set_high();
        self.tim
            .enable_pwm_output(TimChannel::C1, OutputCompare::Pwm1, 0.0);
        self.tim.enable();
    }

    /// Stops the timer and asserts the shutdown line.
    pub fn disable(&mut self) {
        self.tim.disable();
        self.shdn_pin.set_low();
    }

    /// Commits a regulator duty value (0..=[`OutputRegulator::DUTY_MAX`])
    /// to the capture/compare register.
    pub fn apply_duty(&mut self, duty: u16) {
        let period = self.tim.get_max_duty();
        self.tim.set_duty(
            TimChannel::C1,
            duty as u32 * period / (OutputRegulator::DUTY_MAX as u32 + 1),
        );
    }
}
