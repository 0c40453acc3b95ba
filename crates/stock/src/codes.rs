//! Label codes printed on batches and units.

use serde::{Deserialize, Serialize};

/// Length of the short display barcode.
pub const BARCODE_LEN: usize = 6;

/// Alphabet the short barcode is drawn from.
pub const BARCODE_ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Product line a purchase order belongs to; selects the batch code prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductLine {
    #[default]
    Monuments,
    Granite,
    Quartz,
}

impl ProductLine {
    pub fn prefix(self) -> &'static str {
        match self {
            ProductLine::Monuments => "MN",
            ProductLine::Granite => "GR",
            ProductLine::Quartz => "QR",
        }
    }

    /// Unknown keys fall back to monuments.
    pub fn from_key(key: &str) -> Self {
        match key.trim().to_ascii_lowercase().as_str() {
            "granite" => ProductLine::Granite,
            "quartz" => ProductLine::Quartz,
            _ => ProductLine::Monuments,
        }
    }
}

/// `<PREFIX>-<INVOICE>-I<line>`, with the invoice number upper-cased.
pub fn batch_code(line: ProductLine, invoice_no: &str, line_index: u32) -> String {
    format!(
        "{}-{}-I{}",
        line.prefix(),
        invoice_no.trim().to_uppercase(),
        line_index
    )
}

/// `<batch code>/<n>`, `n` counting from 1.
pub fn item_code(batch_code: &str, piece: i64) -> String {
    format!("{batch_code}/{piece}")
}

/// Piece number of an item code, `None` if it has no `/<n>` suffix.
pub fn piece_number(item_code: &str) -> Option<i64> {
    item_code.rsplit_once('/')?.1.parse().ok()
}

/// `"<width>x<thickness>x<height>"`, with `-` for any missing dimension.
pub fn size_label(width: Option<&str>, thickness: Option<&str>, height: Option<&str>) -> String {
    let part = |d: Option<&str>| match d.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => "-".to_string(),
    };
    format!("{}x{}x{}", part(width), part(thickness), part(height))
}

pub fn is_valid_barcode(code: &str) -> bool {
    code.len() == BARCODE_LEN && code.bytes().all(|b| BARCODE_ALPHABET.contains(&b))
}

/// Scanner input as it is matched against stored codes.
pub fn normalize_scan(raw: &str) -> String {
    raw.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_code_uses_line_prefix_and_upper_invoice() {
        assert_eq!(batch_code(ProductLine::Granite, "inv42", 1), "GR-INV42-I1");
        assert_eq!(batch_code(ProductLine::Quartz, " po-7b ", 3), "QR-PO-7B-I3");
        assert_eq!(batch_code(ProductLine::default(), "A1", 2), "MN-A1-I2");
    }

    #[test]
    fn unknown_product_line_defaults_to_monuments() {
        assert_eq!(ProductLine::from_key(" Granite "), ProductLine::Granite);
        assert_eq!(ProductLine::from_key("quartz"), ProductLine::Quartz);
        assert_eq!(ProductLine::from_key("marble"), ProductLine::Monuments);
    }

    #[test]
    fn item_code_appends_piece_number() {
        assert_eq!(item_code("GR-INV42-I1", 3), "GR-INV42-I1/3");
        assert_eq!(piece_number("GR-INV/42-I1/12"), Some(12));
        assert_eq!(piece_number("GR-INV42-I1"), None);
    }

    #[test]
    fn size_label_fills_missing_dimensions() {
        assert_eq!(size_label(Some("60"), Some("2"), Some("120")), "60x2x120");
        assert_eq!(size_label(None, Some("3"), Some(" ")), "-x3x-");
    }

    #[test]
    fn barcode_validation() {
        assert!(is_valid_barcode("A1B2C3"));
        assert!(!is_valid_barcode("a1b2c3"));
        assert!(!is_valid_barcode("A1B2C"));
        assert!(!is_valid_barcode("A1B2C3D"));
    }

    #[test]
    fn scan_input_is_trimmed_and_upper_cased() {
        assert_eq!(normalize_scan("  gr-inv42-i1/3\n"), "GR-INV42-I1/3");
    }
}
