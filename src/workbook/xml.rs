use anyhow::Context;
use quick_xml::events::BytesStart;

/// Element or attribute name without its namespace prefix.
pub fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().rposition(|b| *b == b':') {
        Some(i) => &name[i + 1..],
        None => name,
    }
}

/// Unescaped value of the attribute whose local name is `key`.
pub fn attr_value(s: &BytesStart<'_>, key: &[u8]) -> anyhow::Result<Option<String>> {
    for a in s.attributes() {
        let a = a.context("attr")?;
        if local_name(a.key.as_ref()) == key {
            let v = a.unescape_value().context("unescape attr")?;
            return Ok(Some(v.into_owned()));
        }
    }
    Ok(None)
}

/// Excel's sheet limits (column XFD, row 1048576).
pub const MAX_COLUMNS: usize = 16_384;
pub const MAX_ROWS: usize = 1_048_576;

/// Zero-based column index of a cell reference such as `AB12`; `None` without letters
/// or past column XFD.
pub fn column_index(cell_ref: &str) -> Option<usize> {
    let mut idx = 0usize;
    let mut seen = false;
    for ch in cell_ref.chars() {
        if !ch.is_ascii_alphabetic() {
            break;
        }
        seen = true;
        let digit = ch.to_ascii_uppercase() as usize - 'A' as usize + 1;
        idx = idx
            .checked_mul(26)
            .and_then(|v| v.checked_add(digit))
            .filter(|v| *v <= MAX_COLUMNS)?;
    }
    seen.then(|| idx - 1)
}

/// Zero-based row index of a cell reference such as `AB12`; `None` past row 1048576.
pub fn row_index(cell_ref: &str) -> Option<usize> {
    let digits: String = cell_ref.chars().skip_while(|c| c.is_ascii_alphabetic()).collect();
    row_number(&digits)
}

/// Zero-based index of a 1-based row number as written in `<row r="..">`.
pub fn row_number(text: &str) -> Option<usize> {
    text.trim()
        .parse::<usize>()
        .ok()
        .filter(|n| (1..=MAX_ROWS).contains(n))
        .map(|n| n - 1)
}

/// Column letters for a zero-based index: 0 -> A, 26 -> AA.
pub fn column_letters(mut idx: usize) -> String {
    let mut out = Vec::new();
    loop {
        out.push(b'A' + (idx % 26) as u8);
        if idx < 26 {
            break;
        }
        idx = idx / 26 - 1;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\t' | '\n' | '\r' => out.push(ch),
            // Not representable in XML 1.0.
            c if (c as u32) < 0x20 => {}
            _ => out.push(ch),
        }
    }
    out
}

pub fn escape_attr(text: &str) -> String {
    escape_text(text).replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_references_round_trip() {
        for (r, col, row) in [("A1", 0, 0), ("Z9", 25, 8), ("AA10", 26, 9), ("AZ3", 51, 2)] {
            assert_eq!(column_index(r), Some(col), "{r}");
            assert_eq!(row_index(r), Some(row), "{r}");
            assert_eq!(format!("{}{}", column_letters(col), row + 1), r);
        }
        assert_eq!(column_index("12"), None);
        assert_eq!(row_index("A"), None);
    }

    #[test]
    fn oversized_cell_references_are_rejected() {
        assert_eq!(column_index("XFD1"), Some(MAX_COLUMNS - 1));
        assert_eq!(column_index("XFE1"), None);
        assert_eq!(column_index("AAAAAAAAAAAAAAAA1"), None);
        assert_eq!(row_index("A1048576"), Some(MAX_ROWS - 1));
        assert_eq!(row_index("A1048577"), None);
        assert_eq!(row_index("A99999999999999999999999"), None);
    }

    #[test]
    fn escaping_drops_control_characters() {
        assert_eq!(escape_text("a<b & c>\u{1}"), "a&lt;b &amp; c&gt;");
        assert_eq!(escape_attr("say \"hi\""), "say &quot;hi&quot;");
    }

    #[test]
    fn prefixes_are_ignored() {
        assert_eq!(local_name(b"r:id"), b"id");
        assert_eq!(local_name(b"sheet"), b"sheet");
    }
}
