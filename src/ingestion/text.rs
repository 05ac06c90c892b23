//! Delimited-text decoding.
//!
//! Bytes are decoded strictly (malformed input fails the attempt instead of producing
//! replacement characters), then split into a ragged grid with the `csv` reader. Header
//! placement is decided by the loader, not here.

use std::borrow::Cow;

use encoding_rs::{Encoding, EUC_KR, UTF_16BE, UTF_16LE, UTF_8};

/// Encodings tried by the generic sweep, after any BOM-detected encoding.
pub fn sweep_encodings() -> [&'static Encoding; 4] {
    [UTF_8, EUC_KR, UTF_16LE, UTF_16BE]
}

/// Separators tried by the generic sweep.
pub const SWEEP_SEPARATORS: [u8; 2] = [b',', b'\t'];

/// Resolve an encoding label: WHATWG labels (`"euc-kr"`, `"utf-16le"`, ...) plus the Windows
/// code-page names exports tend to declare (`"cp949"`, `"uhc"`).
pub fn encoding_for_label(label: &str) -> Option<&'static Encoding> {
    let label = label.trim();
    match label.to_ascii_lowercase().as_str() {
        "cp949" | "uhc" | "ms949" => Some(EUC_KR),
        _ => Encoding::for_label(label.as_bytes()),
    }
}

/// Decode `bytes` as `encoding`, returning `None` on any malformed sequence.
///
/// A leading BOM matching `encoding` is stripped.
pub fn decode_strict<'a>(bytes: &'a [u8], encoding: &'static Encoding) -> Option<Cow<'a, str>> {
    let body = match Encoding::for_bom(bytes) {
        Some((bom_enc, bom_len)) if bom_enc == encoding => &bytes[bom_len..],
        _ => bytes,
    };
    encoding.decode_without_bom_handling_and_without_replacement(body)
}

/// Sweep order for `bytes`: a BOM-declared encoding first, then [`sweep_encodings`].
pub fn sweep_order(bytes: &[u8]) -> Vec<&'static Encoding> {
    let mut order: Vec<&'static Encoding> = Vec::with_capacity(5);
    if let Some((enc, _)) = Encoding::for_bom(bytes) {
        order.push(enc);
    }
    for enc in sweep_encodings() {
        if !order.contains(&enc) {
            order.push(enc);
        }
    }
    order
}

/// Split decoded text into rows of trimmed cells.
///
/// Quoted fields are honoured; malformed records are skipped.
pub fn parse_delimited(text: &str, separator: u8) -> Vec<Vec<String>> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(separator)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    rdr.records()
        .filter_map(Result::ok)
        .map(|record| record.iter().map(|f| f.trim().to_string()).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_decode_rejects_wrong_encoding() {
        let (korean, _, _) = EUC_KR.encode("캠페인,비용");
        assert!(decode_strict(&korean, UTF_8).is_none());
        assert_eq!(decode_strict(&korean, EUC_KR).as_deref(), Some("캠페인,비용"));
    }

    #[test]
    fn decode_strips_matching_bom() {
        let bytes = b"\xEF\xBB\xBFa,b";
        assert_eq!(decode_strict(bytes, UTF_8).as_deref(), Some("a,b"));
        assert_eq!(sweep_order(bytes)[0], UTF_8);
    }

    #[test]
    fn sweep_order_puts_bom_encoding_first() {
        let bytes = [0xFF, 0xFE, b'a', 0];
        let order = sweep_order(&bytes);
        assert_eq!(order[0], UTF_16LE);
        assert_eq!(order.len(), sweep_encodings().len());
    }

    #[test]
    fn labels_resolve_legacy_korean_aliases() {
        assert_eq!(encoding_for_label("cp949"), Some(EUC_KR));
        assert_eq!(encoding_for_label(" euc-kr "), Some(EUC_KR));
        assert_eq!(encoding_for_label("windows-949"), Some(EUC_KR));
        assert_eq!(encoding_for_label("UTF-16LE"), Some(UTF_16LE));
        assert_eq!(encoding_for_label("nope"), None);
    }

    #[test]
    fn parse_delimited_handles_quotes_and_ragged_rows() {
        let rows = parse_delimited("a,\"1,000\"\nb\n", b',');
        assert_eq!(rows, vec![vec!["a".to_string(), "1,000".to_string()], vec!["b".to_string()]]);
    }
}
