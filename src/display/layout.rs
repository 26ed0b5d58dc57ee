use crate::constants::{LCD_16X2_COLUMNS, LCD_16X2_ROWS, LCD_20X4_COLUMNS, LCD_20X4_ROWS};
use crate::meter::Reading;
use serde::{Deserialize, Serialize};

/// Supported character displays and what each shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DisplayLayout {
    /// 16x2: voltage/current, power/power factor
    #[serde(rename = "lcd16x2")]
    Lcd16x2,
    /// 20x4: current/voltage, power factor, power/frequency, energy
    #[default]
    #[serde(rename = "lcd20x4")]
    Lcd20x4,
}

impl DisplayLayout {
    pub fn rows(self) -> u8 {
        match self {
            DisplayLayout::Lcd16x2 => LCD_16X2_ROWS,
            DisplayLayout::Lcd20x4 => LCD_20X4_ROWS,
        }
    }

    pub fn columns(self) -> usize {
        match self {
            DisplayLayout::Lcd16x2 => LCD_16X2_COLUMNS,
            DisplayLayout::Lcd20x4 => LCD_20X4_COLUMNS,
        }
    }

    /// Lines for `reading`, dashes in place of values when it is invalid.
    pub fn render(self, reading: &Reading) -> Vec<String> {
        let lines = match (self, reading.valid) {
            (DisplayLayout::Lcd16x2, true) => vec![
                format!("{:.1}V  {:.2}A", reading.voltage, reading.current),
                format!("{:.0}W  PF:{:.2}", reading.active_power, reading.power_factor),
            ],
            (DisplayLayout::Lcd16x2, false) => {
                vec!["---V  ---A".to_string(), "---W  PF:---".to_string()]
            }
            (DisplayLayout::Lcd20x4, true) => vec![
                format!("{:.2}A  {:.1}V", reading.current, reading.voltage),
                format!("PF:{:.2}", reading.power_factor),
                format!("{:.1}W  {:.1}Hz", reading.active_power, reading.frequency),
                format!("E:{:.3}Wh", reading.energy),
            ],
            (DisplayLayout::Lcd20x4, false) => vec![
                "---A  ---V".to_string(),
                "PF:---".to_string(),
                "---W  ---Hz".to_string(),
                "E:---Wh".to_string(),
            ],
        };
        lines.into_iter().map(|line| self.fit(&line)).collect()
    }

    /// Cuts `text` to the display width.
    pub fn fit(self, text: &str) -> String {
        text.chars().take(self.columns()).collect()
    }
}
