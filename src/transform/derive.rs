use crate::dataset::{Cell, Sheet};
use crate::error::StructuralError;

pub const STATUS_COLUMN: &str = "Status";
pub const PRICE_COLUMN: &str = "Price";
pub const CAVEAT_COLUMN: &str = "Caveat";
pub const CAVEAT_SUFFIX: &str = "Subject to availability. Selected lines only.";

/// Rewrites a raw offer into one of the canonical forms
/// (`save £X on RRP`, `save N%`, `save £X`, `RRP £X`) where the inputs allow it.
#[must_use]
pub fn derive_offer(offer: &str, saving: &str, rrp: &str) -> String {
    let offer = offer.trim();
    let upper = offer.to_uppercase();
    let lower = offer.to_lowercase();

    if upper.contains("SAVE VS RRP") || upper.contains("SAVE V RRP") {
        if saving.is_empty() {
            return offer.to_string();
        }
        return format!("save £{saving} on RRP");
    }
    if lower.starts_with("save ") && offer.ends_with('%') {
        return format!("save {}", offer.get(5..).unwrap_or_default());
    }
    if upper == "SAVE" {
        if saving.is_empty() {
            return offer.to_string();
        }
        return format!("save £{saving}");
    }
    if offer.is_empty() || upper == "NA" || upper == "N/A" {
        if rrp.is_empty() {
            return String::new();
        }
        return format!("RRP £{rrp}");
    }

    let canonical = lower.starts_with("save £") || upper.starts_with("RRP £");
    if canonical {
        offer.to_string()
    } else {
        lower
    }
}

#[must_use]
pub fn derive_status(offer: &str) -> &'static str {
    let lower = offer.to_lowercase();
    if lower.starts_with("save £") && lower.contains("on rrp") {
        "only"
    } else if lower.starts_with("save ") && offer.ends_with('%') {
        "now"
    } else if lower.starts_with("save £") {
        "now"
    } else if lower.contains("only") {
        "only"
    } else if offer.to_uppercase().starts_with("RRP") {
        "RRP"
    } else {
        ""
    }
}

#[must_use]
pub fn derive_price(status: &str, now: &str, rrp: &str) -> String {
    let value = match status {
        "now" | "only" => now,
        "RRP" => rrp,
        _ => "",
    };
    if value.is_empty() {
        String::new()
    } else {
        format!("£{value}")
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CaveatInputs<'a> {
    pub brand: &'a str,
    pub description: &'a str,
    pub kind: &'a str,
    pub size: &'a str,
    pub uom: &'a str,
}

#[must_use]
pub fn derive_caveat(i: &CaveatInputs<'_>) -> String {
    let mut parts: Vec<String> = Vec::new();
    let name = join_present(&[i.brand, i.description]);
    if !name.is_empty() {
        parts.push(name);
    }
    let kind_size = join_present(&[i.kind, i.size]);
    if !kind_size.is_empty() {
        parts.push(kind_size);
    }
    if !i.uom.is_empty() {
        parts.push(format!("£{} per 100ml", i.uom));
    }

    let mut out = parts.join(", ");
    if !out.is_empty() {
        out.push_str(". ");
    }
    out.push_str(CAVEAT_SUFFIX);
    out
}

fn join_present(items: &[&str]) -> String {
    items
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}

struct DerivedRow {
    offer: Option<String>,
    status: &'static str,
    price: String,
    caveat: String,
}

/// Rewrites `Offer` (when present) and fills the `Status`, `Price` and `Caveat` columns.
pub fn apply_derived_columns(sheet: &mut Sheet) -> Result<(), StructuralError> {
    let offer_col = sheet.find_column("Offer");
    let saving_col = sheet.find_column("Saving");
    let now_col = sheet.find_column("Now");
    let rrp_col = sheet.find_column("RRP");
    let brand_col = sheet.find_column("Brand");
    let desc_col = sheet.find_column("Description");
    let type_col = sheet.find_column("Type");
    let size_col = sheet.find_column("Size");
    let uom_col = sheet.find_column("UOM");

    let derived: Vec<DerivedRow> = (0..sheet.row_count())
        .map(|r| {
            let rrp = sheet.text_at(r, rrp_col);
            let offer = offer_col.map(|c| {
                derive_offer(
                    &sheet.text_at(r, Some(c)),
                    &sheet.text_at(r, saving_col),
                    &rrp,
                )
            });
            let status = offer.as_deref().map(derive_status).unwrap_or("");
            let price = derive_price(status, &sheet.text_at(r, now_col), &rrp);
            let caveat = derive_caveat(&CaveatInputs {
                brand: &sheet.text_at(r, brand_col),
                description: &sheet.text_at(r, desc_col),
                kind: &sheet.text_at(r, type_col),
                size: &sheet.text_at(r, size_col),
                uom: &sheet.text_at(r, uom_col),
            });
            DerivedRow {
                offer,
                status,
                price,
                caveat,
            }
        })
        .collect();

    let status_col = sheet.ensure_column(STATUS_COLUMN);
    let price_col = sheet.ensure_column(PRICE_COLUMN);
    let caveat_col = sheet.ensure_column(CAVEAT_COLUMN);
    for (r, d) in derived.into_iter().enumerate() {
        if let (Some(c), Some(offer)) = (offer_col, d.offer) {
            sheet.set(r, c, Cell::from_text(offer))?;
        }
        sheet.set(r, status_col, Cell::from_text(d.status.to_string()))?;
        sheet.set(r, price_col, Cell::from_text(d.price))?;
        sheet.set(r, caveat_col, Cell::Text(d.caveat))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offer_rules() {
        assert_eq!(derive_offer("Save vs RRP", "10", "50"), "save £10 on RRP");
        assert_eq!(derive_offer("SAVE V RRP", "", "50"), "SAVE V RRP");
        assert_eq!(derive_offer("Save 20%", "", ""), "save 20%");
        assert_eq!(derive_offer("SAVE", "5.50", ""), "save £5.50");
        assert_eq!(derive_offer("SAVE", "", ""), "SAVE");
        assert_eq!(derive_offer("", "", "45"), "RRP £45");
        assert_eq!(derive_offer("n/a", "", ""), "");
        assert_eq!(derive_offer("ONLY £20", "", ""), "only £20");
        assert_eq!(derive_offer("RRP £30", "", ""), "RRP £30");
        assert_eq!(derive_offer("save £3", "", ""), "save £3");
    }

    #[test]
    fn status_rules() {
        assert_eq!(derive_status("save £10 on RRP"), "only");
        assert_eq!(derive_status("save 20%"), "now");
        assert_eq!(derive_status("save £5"), "now");
        assert_eq!(derive_status("only £20"), "only");
        assert_eq!(derive_status("RRP £45"), "RRP");
        assert_eq!(derive_status("half price"), "");
    }

    #[test]
    fn price_follows_status() {
        assert_eq!(derive_price("now", "19.99", "30"), "£19.99");
        assert_eq!(derive_price("only", "", "30"), "");
        assert_eq!(derive_price("RRP", "19.99", "30"), "£30");
        assert_eq!(derive_price("", "19.99", "30"), "");
    }

    #[test]
    fn caveat_joins_present_parts() {
        let full = CaveatInputs {
            brand: "Giorgio Armani",
            description: "Acqua di Gio",
            kind: "EDT",
            size: "50ml",
            uom: "90",
        };
        assert_eq!(
            derive_caveat(&full),
            "Giorgio Armani Acqua di Gio, EDT 50ml, £90 per 100ml. Subject to availability. Selected lines only."
        );
        assert_eq!(derive_caveat(&CaveatInputs::default()), CAVEAT_SUFFIX);
        let desc_only = CaveatInputs {
            description: "Libre",
            ..CaveatInputs::default()
        };
        assert_eq!(
            derive_caveat(&desc_only),
            "Libre. Subject to availability. Selected lines only."
        );
    }

    #[test]
    fn derived_columns_are_appended() {
        let mut s = Sheet::new(
            "S",
            vec!["Brand".into(), "Offer".into(), "Now".into(), "RRP".into(), "Saving".into()],
        );
        s.push_row(vec![
            Cell::text("Dior"),
            Cell::text("SAVE"),
            Cell::text("40"),
            Cell::text("50"),
            Cell::text("10"),
        ]);
        s.push_row(vec![Cell::Empty, Cell::Empty, Cell::Empty, Cell::text("25"), Cell::Empty]);
        apply_derived_columns(&mut s).expect("derive");

        assert_eq!(&s.columns[5..], ["Status", "Price", "Caveat"]);
        assert_eq!(s.text_at(0, Some(1)), "save £10");
        assert_eq!(s.text_at(0, Some(5)), "now");
        assert_eq!(s.text_at(0, Some(6)), "£40");
        assert_eq!(
            s.text_at(0, Some(7)),
            "Dior. Subject to availability. Selected lines only."
        );
        assert_eq!(s.text_at(1, Some(1)), "RRP £25");
        assert_eq!(s.text_at(1, Some(5)), "RRP");
        assert_eq!(s.text_at(1, Some(6)), "£25");
    }

    #[test]
    fn sheet_without_offer_still_gets_caveat() {
        let mut s = Sheet::new("S", vec!["Description".into()]);
        s.push_row(vec![Cell::text("Sauvage")]);
        apply_derived_columns(&mut s).expect("derive");
        assert_eq!(s.text_at(0, s.find_column("Status")), "");
        assert!(s.text_at(0, s.find_column("Caveat")).starts_with("Sauvage. "));
    }
}
