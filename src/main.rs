//! Handheld RPM meter firmware for the Raspberry Pi Pico 2 (RP2350).
//!
//! Wires the core library to the hardware:
//! - A 1 ms ticker drives the button debouncing; every 10th tick one menu
//!   poll pass runs (held off ~3 s after power-up for the boot splash).
//! - A capture task timestamps tachometer edges with the 1 MHz time base and
//!   appends them to the shared buffer.
//! - The menu's two-line payload is pushed to a 20x2 character LCD only when
//!   the refresh flag is set.
//!
//! # Button Controls
//!
//! - **SELECT**: move the cursor / cycle a value on the current screen
//! - **OK**: confirm the highlighted item

#![cfg_attr(target_arch = "arm", no_std)]
#![cfg_attr(target_arch = "arm", no_main)]

// Modules only used on the embedded target
#[cfg(target_arch = "arm")]
mod lcd;

#[cfg(target_arch = "arm")]
mod app {
    use defmt::{info, warn};
    use embassy_executor::Spawner;
    use embassy_rp::flash::{Blocking, Flash};
    use embassy_rp::gpio::{Input, Level, Output, Pull};
    use embassy_rp::peripherals::FLASH;
    use embassy_rp::spi::{self, Spi};
    use embassy_time::{Duration, Instant, Ticker};
    use rpm_meter::buttons::ButtonPad;
    use rpm_meter::config::{
        BOOT_HOLDOFF_TICKS,
        CAPTURE_CLOCK_HZ,
        MENU_POLL_DIVIDER,
        TICK_PERIOD_MS,
    };
    use rpm_meter::context::AppContext;
    use rpm_meter::drivers::{Accelerometer, CapturePeripheral, GainPots, PowerControl};
    use rpm_meter::menu::{Menu, Screen};
    use rpm_meter::profiles::ProfileStore;
    use rpm_meter::rpm::{CaptureBuffer, RpmMonitor};
    use {defmt_rtt as _, panic_probe as _};

    use crate::lcd::Lcd;

    /// Total on-board flash.
    const FLASH_SIZE: usize = 4 * 1024 * 1024;

    /// The profile table lives in the last flash sector.
    const PROFILE_TABLE_OFFSET: u32 = (FLASH_SIZE - 4096) as u32;

    /// Gain-pot boot programming: (wiper, value). U5 wiper 0 sets the IR LED
    /// current, U3 wipers 0/1 set the analog front-end gains.
    const WIPER_BOOT_VALUES: [(usize, u8); 3] = [(2, 70), (0, 30), (1, 250)];

    /// Capture timestamps shared between the edge task and the menu poll.
    static CAPTURE: CaptureBuffer = CaptureBuffer::new();

    // Program metadata for `picotool info`
    #[unsafe(link_section = ".bi_entries")]
    #[used]
    pub static PICOTOOL_ENTRIES: [embassy_rp::binary_info::EntryAddr; 4] = [
        embassy_rp::binary_info::rp_program_name!(c"rpm-meter"),
        embassy_rp::binary_info::rp_program_description!(c"Handheld RPM measurement instrument"),
        embassy_rp::binary_info::rp_cargo_version!(),
        embassy_rp::binary_info::rp_program_build_attribute!(),
    ];

    /// Timestamps one tachometer edge per blade pass.
    #[embassy_executor::task]
    async fn capture_task(mut pin: Input<'static>) {
        info!("Capture task started");
        loop {
            pin.wait_for_falling_edge().await;
            CAPTURE.record(Instant::now().as_ticks() as u32);
        }
    }

    // =========================================================================
    // Collaborator implementations
    // =========================================================================

    type SpiBus = Spi<'static, embassy_rp::peripherals::SPI1, spi::Blocking>;

    /// The capture input is armed through the buffer's active flag; the
    /// peripheral itself only needs its edge task running.
    struct TachCapture;

    impl CapturePeripheral for TachCapture {
        fn start(&mut self) {
            info!("Capture armed");
        }

        fn stop(&mut self) {
            info!("Capture stopped");
        }
    }

    /// Power rails and the status LED.
    struct Rails {
        backlight: Output<'static>,
        regulator: Output<'static>,
        status_led: Output<'static>,
    }

    impl PowerControl for Rails {
        fn backlight(
            &mut self,
            on: bool,
        ) {
            self.backlight.set_level(if on { Level::High } else { Level::Low });
        }

        fn regulator(
            &mut self,
            on: bool,
        ) {
            self.regulator.set_level(if on { Level::High } else { Level::Low });
        }

        fn status_led_toggle(&mut self) {
            self.status_led.toggle();
        }
    }

    /// LIS2HH12 over SPI, register access only.
    struct Lis2hh12 {
        spi: SpiBus,
        cs: Output<'static>,
    }

    impl Lis2hh12 {
        const WHO_AM_I: u8 = 0x0F;
        const CTRL1: u8 = 0x20;
        const OUT_X_L: u8 = 0x28;
        const READ: u8 = 0x80;

        fn write_reg(
            &mut self,
            reg: u8,
            value: u8,
        ) {
            self.cs.set_low();
            let _ = self.spi.blocking_write(&[reg, value]);
            self.cs.set_high();
        }

        fn read_reg(
            &mut self,
            reg: u8,
        ) -> u8 {
            let mut buf = [reg | Self::READ, 0];
            self.cs.set_low();
            let _ = self.spi.blocking_transfer_in_place(&mut buf);
            self.cs.set_high();
            buf[1]
        }
    }

    impl Accelerometer for Lis2hh12 {
        fn init(&mut self) {
            // 100 Hz output data rate, all axes enabled
            self.write_reg(Self::CTRL1, 0x37);
        }

        fn read_id(&mut self) -> u8 {
            self.read_reg(Self::WHO_AM_I)
        }

        fn read_xyz(&mut self) -> (i16, i16, i16) {
            let mut buf = [0u8; 7];
            buf[0] = Self::OUT_X_L | Self::READ;
            self.cs.set_low();
            let _ = self.spi.blocking_transfer_in_place(&mut buf);
            self.cs.set_high();
            (
                i16::from_le_bytes([buf[1], buf[2]]),
                i16::from_le_bytes([buf[3], buf[4]]),
                i16::from_le_bytes([buf[5], buf[6]]),
            )
        }
    }

    /// MCP4231 (U3, two wipers) and MCP4131 (U5, one wiper) digital pots on
    /// the shared SPI bus. Only used during the boot sequence.
    struct Mcp4xxxPots<'a> {
        spi: &'a mut SpiBus,
        cs_u3: &'a mut Output<'static>,
        cs_u5: &'a mut Output<'static>,
    }

    impl GainPots for Mcp4xxxPots<'_> {
        fn write(
            &mut self,
            wiper: usize,
            value: u8,
        ) {
            let (cs, addr): (&mut Output, u8) = match wiper {
                0 => (self.cs_u3, 0x00),
                1 => (self.cs_u3, 0x01),
                2 => (self.cs_u5, 0x00),
                _ => return,
            };
            cs.set_low();
            let _ = self.spi.blocking_write(&[addr << 4, value]);
            cs.set_high();
        }

        fn read(
            &mut self,
            wiper: usize,
        ) -> Option<u8> {
            let (cs, addr): (&mut Output, u8) = match wiper {
                0 => (self.cs_u3, 0x00),
                1 => (self.cs_u3, 0x01),
                2 => (self.cs_u5, 0x00),
                _ => return None,
            };
            // Read command: 0b11 in the command bits
            let mut buf = [(addr << 4) | 0x0C, 0];
            cs.set_low();
            let result = self.spi.blocking_transfer_in_place(&mut buf);
            cs.set_high();
            result.ok().map(|()| buf[1])
        }
    }

    fn screen_name(screen: Screen) -> &'static str {
        match screen {
            Screen::Welcome => "Welcome",
            Screen::Battery => "Battery",
            Screen::Parameters => "Parameters",
            Screen::ChooseProfile => "ChooseProfile",
            Screen::ConfigureBladeCount => "ConfigureBladeCount",
            Screen::ConfigureCylinderCount => "ConfigureCylinderCount",
            Screen::SaveAs => "SaveAs",
            Screen::MeasureVisual => "MeasureVisual",
            Screen::MeasureAudio => "MeasureAudio",
            Screen::MeasureVibration => "MeasureVibration",
        }
    }

    #[embassy_executor::main]
    async fn main(spawner: Spawner) {
        info!("RPM meter starting...");

        let p = embassy_rp::init(Default::default());

        // Power rails and indicators
        let mut power = Rails {
            backlight: Output::new(p.PIN_8, Level::High),
            regulator: Output::new(p.PIN_9, Level::Low),
            status_led: Output::new(p.PIN_25, Level::High),
        };
        let mut ir_emitter = Output::new(p.PIN_10, Level::Low);

        // Profile table in the last flash sector
        let flash = Flash::<FLASH, Blocking, FLASH_SIZE>::new_blocking(p.FLASH);
        let mut store = ProfileStore::new(flash, PROFILE_TABLE_OFFSET);
        if store.load_all().is_err() {
            warn!("Profile table read failed; running on factory defaults");
        } else {
            info!("Profiles loaded");
        }

        #[cfg(feature = "storage-selftest")]
        {
            use rpm_meter::profiles::SelfTest;
            match store.self_test() {
                Ok(SelfTest::Ok) => info!("Storage self-test: ok"),
                Ok(SelfTest::EraseFailed) => warn!("Storage self-test: erase failed"),
                Ok(SelfTest::WriteMismatch) => warn!("Storage self-test: write mismatch"),
                Err(_) => warn!("Storage self-test: flash fault"),
            }
        }

        // Character LCD, 4-bit bus
        let mut lcd = Lcd::new(
            Output::new(p.PIN_2, Level::Low),
            Output::new(p.PIN_3, Level::Low),
            [
                Output::new(p.PIN_4, Level::Low),
                Output::new(p.PIN_5, Level::Low),
                Output::new(p.PIN_6, Level::Low),
                Output::new(p.PIN_7, Level::Low),
            ],
        );
        lcd.init();
        lcd.write_line(1, "RPM Meter");
        lcd.write_line(2, "starting");

        // Accelerometer and gain pots share SPI1
        let mut spi_config = spi::Config::default();
        spi_config.frequency = 1_000_000;
        let mut spi = Spi::new_blocking(p.SPI1, p.PIN_14, p.PIN_15, p.PIN_24, spi_config);
        let mut cs_pot_u3 = Output::new(p.PIN_18, Level::High);
        let mut cs_pot_u5 = Output::new(p.PIN_19, Level::High);

        // Boot programming of the analog front-end gains, with a diagnostic
        // read-back on the splash
        {
            let mut pots = Mcp4xxxPots {
                spi: &mut spi,
                cs_u3: &mut cs_pot_u3,
                cs_u5: &mut cs_pot_u5,
            };
            for (wiper, value) in WIPER_BOOT_VALUES {
                pots.write(wiper, value);
            }
            match pots.read(0) {
                Some(value) => {
                    info!("U3 W0 = {}", value);
                    lcd.write_fmt_line(1, "U3 W0:", value);
                }
                None => lcd.write_line(1, "U3 W0: ERR"),
            }
            match pots.read(1) {
                Some(value) => {
                    info!("U3 W1 = {}", value);
                    lcd.write_fmt_line(2, "U3 W1:", value);
                }
                None => lcd.write_line(2, "U3 W1: ERR"),
            }
        }

        let mut accel = Lis2hh12 {
            spi,
            cs: Output::new(p.PIN_17, Level::High),
        };

        power.regulator(true);
        // The emitter stays dark until a later hardware revision wires it to
        // the measurement path
        ir_emitter.set_low();

        // Buttons (active-low with internal pull-up)
        let btn_ok = Input::new(p.PIN_12, Pull::Up);
        let btn_select = Input::new(p.PIN_13, Pull::Up);
        info!("Buttons initialized");

        spawner
            .spawn(capture_task(Input::new(p.PIN_11, Pull::Up)))
            .unwrap();

        let mut pad = ButtonPad::new();
        let mut ctx = AppContext::new();
        let mut menu = Menu::new();
        let mut monitor = RpmMonitor::new(CAPTURE_CLOCK_HZ);
        let mut tach = TachCapture;
        let mut last_screen = menu.screen();

        info!("Main loop starting");

        let mut ticker = Ticker::every(Duration::from_millis(TICK_PERIOD_MS));
        let mut holdoff: u32 = 0;
        let mut divider: u32 = 0;

        loop {
            ticker.next().await;
            pad.tick(btn_ok.is_high(), btn_select.is_high());

            // Boot splash stays up ~3 s before the menu takes over
            if holdoff <= BOOT_HOLDOFF_TICKS {
                holdoff += 1;
                continue;
            }

            divider += 1;
            if divider < MENU_POLL_DIVIDER {
                continue;
            }
            divider = 0;

            let mask = pad.scan();
            menu.poll(
                &mut ctx,
                mask,
                &CAPTURE,
                &mut monitor,
                &mut store,
                &mut tach,
                &mut accel,
                &mut power,
            );

            if menu.screen() != last_screen {
                last_screen = menu.screen();
                info!("Screen: {}", screen_name(last_screen));
            }

            if ctx.refresh_needed {
                let frame = menu.render(&ctx, &store);
                lcd.draw(&frame);
                ctx.refresh_needed = false;
            }
        }
    }
}

/// The instrument firmware only exists for the ARM target; the host gets an
/// empty stub so `cargo build` and `cargo test` work without a cross
/// toolchain.
#[cfg(not(target_arch = "arm"))]
fn main() {}
