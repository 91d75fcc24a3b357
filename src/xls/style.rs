//! FONT, XF and PALETTE records

use super::format::{FormatKind, NumberFormat};
use super::records::Record;
use super::strings::{read_byte_string, read_unicode_string, CountWidth};
use super::BiffVersion;
use crate::error::Result;
use indexmap::IndexMap;
use std::collections::BTreeMap;

/// Border line styles by code
pub const LINE_STYLES: [&str; 14] = [
    "",
    "Thin",
    "Medium",
    "Dashed",
    "Dotted",
    "Thick",
    "Double",
    "Hair",
    "Medium dashed",
    "Thin dash-dotted",
    "Medium dash-dotted",
    "Thin dash-dot-dotted",
    "Medium dash-dot-dotted",
    "Slanted medium dash-dotted",
];

/// Name of a border line style, empty for unknown codes
pub fn line_style_name(code: u8) -> &'static str {
    LINE_STYLES.get(code as usize).copied().unwrap_or("")
}

/// Colors before any PALETTE record
const DEFAULT_PALETTE: &[(u16, &str)] = &[
    (0x00, "#000000"),
    (0x01, "#FFFFFF"),
    (0x02, "#FF0000"),
    (0x03, "#00FF00"),
    (0x04, "#0000FF"),
    (0x05, "#FFFF00"),
    (0x06, "#FF00FF"),
    (0x07, "#00FFFF"),
    (0x08, "#000000"),
    (0x09, "#FFFFFF"),
    (0x0A, "#FF0000"),
    (0x0B, "#00FF00"),
    (0x0C, "#0000FF"),
    (0x0D, "#FFFF00"),
    (0x0E, "#FF00FF"),
    (0x0F, "#00FFFF"),
    (0x10, "#800000"),
    (0x11, "#008000"),
    (0x12, "#000080"),
    (0x13, "#808000"),
    (0x14, "#800080"),
    (0x15, "#008080"),
    (0x16, "#C0C0C0"),
    (0x17, "#808080"),
    (0x18, "#9999FF"),
    (0x19, "#993366"),
    (0x1A, "#FFFFCC"),
    (0x1B, "#CCFFFF"),
    (0x1C, "#660066"),
    (0x1D, "#FF8080"),
    (0x1E, "#0066CC"),
    (0x1F, "#CCCCFF"),
    (0x20, "#000080"),
    (0x21, "#FF00FF"),
    (0x22, "#FFFF00"),
    (0x23, "#00FFFF"),
    (0x24, "#800080"),
    (0x25, "#800000"),
    (0x26, "#008080"),
    (0x27, "#0000FF"),
    (0x28, "#00CCFF"),
    (0x29, "#CCFFFF"),
    (0x2A, "#CCFFCC"),
    (0x2B, "#FFFF99"),
    (0x2C, "#99CCFF"),
    (0x2D, "#FF99CC"),
    (0x2E, "#CC99FF"),
    (0x2F, "#FFCC99"),
    (0x30, "#3366FF"),
    (0x31, "#33CCCC"),
    (0x32, "#99CC00"),
    (0x33, "#FFCC00"),
    (0x34, "#FF9900"),
    (0x35, "#FF6600"),
    (0x36, "#666699"),
    (0x37, "#969696"),
    (0x38, "#003366"),
    (0x39, "#339966"),
    (0x3A, "#003300"),
    (0x3B, "#333300"),
    (0x3C, "#993300"),
    (0x3D, "#993366"),
    (0x3E, "#333399"),
    (0x3F, "#333333"),
    (0x40, "#000000"),
    (0x41, "#FFFFFF"),
    (0x43, "#000000"),
    (0x4D, "#000000"),
    (0x4E, "#FFFFFF"),
    (0x4F, "#000000"),
    (0x50, "#FFFFFF"),
    (0x51, "#000000"),
    (0x7FFF, "#000000"),
];

/// First color index replaced by a PALETTE record
const PALETTE_OVERRIDE_START: u16 = 0x07;

/// Color table of one workbook
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    colors: BTreeMap<u16, String>,
}

impl Default for Palette {
    fn default() -> Self {
        Palette {
            colors: DEFAULT_PALETTE
                .iter()
                .map(|(i, c)| (*i, c.to_string()))
                .collect(),
        }
    }
}

impl Palette {
    pub fn get(&self, index: u16) -> Option<&str> {
        self.colors.get(&index).map(String::as_str)
    }

    /// Apply a PALETTE record: a count, then RGB + padding per entry
    pub fn apply_record(&mut self, record: &Record<'_>) -> Result<()> {
        let count = record.u16(0)?;
        for i in 0..count {
            let rgb = record.bytes(2 + i as usize * 4, 3)?;
            self.colors.insert(
                PALETTE_OVERRIDE_START + i,
                format!("#{:02X}{:02X}{:02X}", rgb[0], rgb[1], rgb[2]),
            );
        }
        Ok(())
    }
}

/// Decoded FONT record
#[derive(Debug, Clone, PartialEq)]
pub struct Font {
    /// Height in points
    pub height: f64,
    pub italic: bool,
    pub bold: bool,
    pub underline: bool,
    pub color_index: u16,
    pub name: String,
}

impl Font {
    pub fn parse(record: &Record<'_>, version: BiffVersion) -> Result<Self> {
        let height = record.u16(0)? as f64 / 20.0;
        let options = record.u16(2)?;
        let color_index = record.u16(4)?;
        let weight = record.u16(6)?;
        let underline = record.u8(10)?;

        let (name, _) = match version {
            BiffVersion::Biff8 => read_unicode_string(record, 14, CountWidth::U8)?,
            BiffVersion::Biff7 => read_byte_string(record, 14, CountWidth::U8)?,
        };

        Ok(Font {
            height,
            italic: options & 0x02 != 0,
            bold: weight == 700,
            underline: underline != 0,
            color_index,
            name,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HorizontalAlign {
    General,
    Left,
    Center,
    Right,
    Fill,
    Justify,
    CenterAcrossSelection,
    Distributed,
}

impl HorizontalAlign {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            1 => HorizontalAlign::Left,
            2 => HorizontalAlign::Center,
            3 => HorizontalAlign::Right,
            4 => HorizontalAlign::Fill,
            5 => HorizontalAlign::Justify,
            6 => HorizontalAlign::CenterAcrossSelection,
            7 => HorizontalAlign::Distributed,
            _ => HorizontalAlign::General,
        }
    }
}

/// Line style codes and color indices of the four cell borders
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Borders {
    pub left: u8,
    pub right: u8,
    pub top: u8,
    pub bottom: u8,
    pub left_color: u16,
    pub right_color: u16,
    pub top_color: u16,
    pub bottom_color: u16,
}

/// Decoded XF record
#[derive(Debug, Clone, PartialEq)]
pub struct ExtendedFormat {
    /// Position in the FONT list
    pub font_index: usize,
    pub format: NumberFormat,
    pub align: HorizontalAlign,
    pub borders: Borders,
    pub fill_pattern: u8,
    /// Pattern color, absent without a fill
    pub background_color: Option<u16>,
}

impl ExtendedFormat {
    /// Decode an XF record, resolving its number format
    ///
    /// BIFF7 packs borders and fills differently; only the font and format
    /// indices are taken from those.
    pub fn parse(
        record: &Record<'_>,
        version: BiffVersion,
        custom_formats: &IndexMap<u16, String>,
    ) -> Result<Self> {
        // font index 4 does not exist, later fonts shift down by one
        let font_index = match record.u16(0)? as usize {
            i if i >= 4 => i - 1,
            i => i,
        };
        let format = NumberFormat::classify(record.u16(2)?, custom_formats);

        if version == BiffVersion::Biff7 {
            return Ok(ExtendedFormat {
                font_index,
                format,
                align: HorizontalAlign::General,
                borders: Borders::default(),
                fill_pattern: 0,
                background_color: None,
            });
        }

        let align = HorizontalAlign::from_bits(record.u8(6)?);

        let border = record.u32(10)?;
        let colors = record.u16(14)?;
        let borders = Borders {
            left: (border & 0xF) as u8,
            right: ((border >> 4) & 0xF) as u8,
            top: ((border >> 8) & 0xF) as u8,
            bottom: ((border >> 12) & 0xF) as u8,
            left_color: ((border & 0x7F_0000) >> 16) as u16,
            right_color: ((border & 0x3F80_0000) >> 23) as u16,
            top_color: colors & 0x7F,
            bottom_color: (colors & 0x3F80) >> 7,
        };

        let fill_pattern = (record.u8(17)? & 0xFC) >> 2;
        let background_color = if fill_pattern == 0 {
            None
        } else {
            Some(record.u16(18)? & 0x7F)
        };

        Ok(ExtendedFormat {
            font_index,
            format,
            align,
            borders,
            fill_pattern,
            background_color,
        })
    }

    /// Alignment as displayed: general numbers and dates sit on the right
    pub fn effective_align(&self) -> HorizontalAlign {
        match (self.align, self.format.kind) {
            (HorizontalAlign::General, FormatKind::Date | FormatKind::Number) => {
                HorizontalAlign::Right
            }
            (align, _) => align,
        }
    }
}
