//! Minimal HD44780-class character LCD driver, 4-bit GPIO bus.
//!
//! Only what the instrument needs: init, cursor positioning, and writing the
//! two 20-character lines of a [`DisplayFrame`]. Timing follows the datasheet
//! worst-case figures with busy-wait delays; at a few refreshes per second
//! that costs nothing.

use embassy_rp::gpio::Output;
use embassy_time::{Duration, block_for};
use rpm_meter::config::{LCD_COLS, LCD_ROWS};
use rpm_meter::menu::DisplayFrame;

/// DDRAM base address of each display line.
const LINE_ADDR: [u8; LCD_ROWS] = [0x00, 0x40];

pub struct Lcd {
    rs: Output<'static>,
    en: Output<'static>,
    data: [Output<'static>; 4],
}

impl Lcd {
    pub fn new(
        rs: Output<'static>,
        en: Output<'static>,
        data: [Output<'static>; 4],
    ) -> Self {
        Self { rs, en, data }
    }

    /// Datasheet power-up sequence into 4-bit, 2-line mode.
    pub fn init(&mut self) {
        block_for(Duration::from_millis(40));
        self.rs.set_low();
        // Three times 8-bit function set, then the switch to 4-bit
        for _ in 0..3 {
            self.write_nibble(0x03);
            block_for(Duration::from_millis(5));
        }
        self.write_nibble(0x02);

        self.command(0x28); // 4-bit, 2 lines, 5x8 font
        self.command(0x08); // display off
        self.command(0x01); // clear
        block_for(Duration::from_millis(2));
        self.command(0x06); // entry mode: increment, no shift
        self.command(0x0C); // display on, cursor off
    }

    /// Move the write position. Columns and rows are 1-based.
    pub fn set_cursor(
        &mut self,
        col: u8,
        row: u8,
    ) {
        if col as usize > LCD_COLS || !(1..=LCD_ROWS as u8).contains(&row) {
            return;
        }
        let addr = LINE_ADDR[(row - 1) as usize] + (col - 1);
        self.command(0x80 | addr);
    }

    /// Write text at the current position, clipped to the line width.
    pub fn write_str(
        &mut self,
        text: &str,
    ) {
        for byte in text.bytes().take(LCD_COLS) {
            self.write_data(byte);
        }
    }

    /// Blank one full line, then write `text` at its start.
    pub fn write_line(
        &mut self,
        row: u8,
        text: &str,
    ) {
        self.set_cursor(1, row);
        for _ in 0..LCD_COLS {
            self.write_data(b' ');
        }
        self.set_cursor(1, row);
        self.write_str(text);
    }

    /// `label` followed by a right-aligned three-digit value.
    pub fn write_fmt_line(
        &mut self,
        row: u8,
        label: &str,
        value: u8,
    ) {
        self.write_line(row, label);
        let digits = [
            if value >= 100 { b'0' + value / 100 } else { b' ' },
            if value >= 10 { b'0' + (value / 10) % 10 } else { b' ' },
            b'0' + value % 10,
        ];
        self.write_str(" ");
        for digit in digits {
            self.write_data(digit);
        }
    }

    /// Push a rendered frame: clear both lines, then write them.
    pub fn draw(
        &mut self,
        frame: &DisplayFrame,
    ) {
        self.write_line(1, frame.line1.as_str());
        self.write_line(2, frame.line2.as_str());
    }

    fn command(
        &mut self,
        byte: u8,
    ) {
        self.rs.set_low();
        self.write_byte(byte);
    }

    fn write_data(
        &mut self,
        byte: u8,
    ) {
        self.rs.set_high();
        self.write_byte(byte);
    }

    fn write_byte(
        &mut self,
        byte: u8,
    ) {
        self.write_nibble(byte >> 4);
        self.write_nibble(byte & 0x0F);
        block_for(Duration::from_micros(50));
    }

    fn write_nibble(
        &mut self,
        nibble: u8,
    ) {
        for (bit, pin) in self.data.iter_mut().enumerate() {
            if nibble & (1 << bit) != 0 {
                pin.set_high();
            } else {
                pin.set_low();
            }
        }
        self.en.set_high();
        block_for(Duration::from_micros(1));
        self.en.set_low();
    }
}
