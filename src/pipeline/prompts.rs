use std::path::Path;

use anyhow::{anyhow, Context};

use crate::config::{resolve_relative, PromptsSection};
use crate::textutil::flatten_line_breaks;
use crate::vocabulary::ReferenceVocabulary;

use super::jobs::ColumnKind;

pub const DEFAULT_PROMPTS_DIR: &str = "prompts";

pub const DEFAULT_BRAND: &str = "brand.txt";
pub const DEFAULT_DESCRIPTION: &str = "description.txt";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptSet {
    pub brand: String,
    pub description: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            brand: DEFAULT_BRAND_TEXT.to_string(),
            description: DEFAULT_DESCRIPTION_TEXT.to_string(),
        }
    }
}

impl PromptSet {
    /// Built-in templates, replaced by any file configured under `[prompts]`.
    pub fn load(config_dir: &Path, p: &PromptsSection) -> anyhow::Result<Self> {
        let mut set = Self::default();
        if let Some(path) = p.brand.as_deref() {
            set.brand = read_prompt(config_dir, "brand", path)?;
        }
        if let Some(path) = p.description.as_deref() {
            set.description = read_prompt(config_dir, "description", path)?;
        }
        Ok(set)
    }

    #[must_use]
    pub fn template(&self, kind: ColumnKind) -> &str {
        match kind {
            ColumnKind::Brand => &self.brand,
            ColumnKind::Description => &self.description,
        }
    }

    /// Renders the full request for one batch.
    #[must_use]
    pub fn build(&self, kind: ColumnKind, vocab: &ReferenceVocabulary, values: &[String]) -> String {
        let brands = vocab.render_brands();
        let acronyms = vocab.render_acronyms();
        let rows = render_rows(values);
        render_template(
            self.template(kind),
            &[
                ("brands", &brands),
                ("acronyms", &acronyms),
                ("header", kind.token()),
                ("rows", &rows),
            ],
        )
    }
}

fn read_prompt(config_dir: &Path, key: &str, path: &str) -> anyhow::Result<String> {
    let p = resolve_relative(config_dir, path);
    if !p.exists() {
        return Err(anyhow!(
            "prompt file not found for {key}: {} (run: fragrance-corrector --init-config)",
            p.display()
        ));
    }
    std::fs::read_to_string(&p).with_context(|| format!("read prompt: {}", p.display()))
}

/// One value per line, embedded line breaks flattened.
#[must_use]
pub fn render_rows(values: &[String]) -> String {
    values
        .iter()
        .map(|v| flatten_line_breaks(v))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (k, v) in vars {
        let pat = format!("{{{{{k}}}}}");
        out = out.replace(&pat, v);
    }
    out
}

pub fn default_prompt_files() -> Vec<(&'static str, &'static str)> {
    vec![
        (DEFAULT_BRAND, DEFAULT_BRAND_TEXT),
        (DEFAULT_DESCRIPTION, DEFAULT_DESCRIPTION_TEXT),
    ]
}

pub const DEFAULT_BRAND_TEXT: &str = r#"You correct and format brand names. The values below come from the Brand column of a retail fragrance spreadsheet. Apply these steps, in order, to EVERY row:

1. Brand identification and correction
   - Find the primary brand and correct misspellings or abbreviations using the known brands list.
   - Expand these brand abbreviations: "CK" -> "Calvin Klein", "JPG" -> "Jean Paul Gaultier", "SJP" -> "Sarah Jessica Parker", "YSL" -> "Yves Saint Laurent", "ZV" -> "Zadig & Voltaire", "GA" -> "Giorgio Armani".
   - When the value already is a known brand (e.g. "Kylie Jenner", "Mar e Sol"), use the exact casing from the list. Never swap one known brand for another known brand (e.g. keep "Kylie Jenner", do not turn it into "Kylie Cosmetics").

2. When the cell holds more than the brand (product name, size, fragrance type, e.g. "GA PROFONDO EDT 50ml"):
   - Expand product-line abbreviations for the identified brand from your own knowledge (e.g. "ADG" -> "Acqua di Gio", "ADGH" -> "Acqua di Gio Homme", "SWY" -> "Stronger With You"). The known brands list holds main brands only, not product lines.
   - Convert "Eau de Toilette" / "Eau du Toilette" to "EDT" and "Eau de Parfum" / "Eau du Parfum" to "EDP". A bare "Parfum" stays "Parfum".
   - Use Proper Case (Title Case) for the non-brand text.
   - Any acronym from the uppercase list stays in ALL CAPS.
   - Example: "GA ADGH PROFONDO EDT 50ml" becomes "Giorgio Armani Acqua di Gio Homme Profondo EDT 50ml".

3. When the cell holds only the brand, return just the corrected brand.

4. Leave values that are clearly not brands (product codes, free text without a brand) unchanged unless the formatting rules above apply.

Rules:
- Do not rephrase or add words beyond the expansions and corrections above.
- Keep the row order. Every input row produces exactly one output row.
- The output must have exactly the same number of rows as the input.

Known brands (use the exact casing shown):
{{brands}}

Acronyms to keep uppercase (applied after Proper Case):
{{acronyms}}

Return ONLY the corrected data as a single-column CSV whose header is `{{header}}`. No explanations, no commentary, no ``` fences around the output.

Input CSV:
```csv
{{header}}
{{rows}}
```
"#;

pub const DEFAULT_DESCRIPTION_TEXT: &str = r#"You extract clean product names for artwork. The values below come from the Description column of a retail fragrance spreadsheet. Apply ALL of the following steps, in this exact order, to EVERY row. Each step works on the output of the previous one.

1. Correct and expand brand and product line
   - Identify the primary brand with the known brands list, fix its spelling and casing, and expand brand abbreviations ("GA" -> "Giorgio Armani", "YSL" -> "Yves Saint Laurent", "CK" -> "Calvin Klein", "JPG" -> "Jean Paul Gaultier", "SJP" -> "Sarah Jessica Parker", "ZV" -> "Zadig & Voltaire").
   - Once the brand is known you MUST expand its product-line abbreviations to their full names, e.g. "GA ADGH PROFONDO" -> "Giorgio Armani Acqua di Gio Homme Profondo", "YSL L'HOMME" -> "Yves Saint Laurent L'Homme", "CK ONE SHOCK" -> "Calvin Klein One Shock".

2. Remove the primary brand only
   - Delete the full corrected brand name found in step 1. The expanded product line MUST stay.
   - "Giorgio Armani Acqua di Gio Homme Profondo EDT 50ML" -> "Acqua di Gio Homme Profondo EDT 50ML".
   - "Calvin Klein One Shock for Her EDT 100ml" -> "One Shock for Her EDT 100ml".
   - Without an identified brand the text passes through unchanged.

3. Remove fragrance and product type terms
   - Remove "EDT", "Eau de Toilette", "Eau du Toilette", "EDP", "Eau de Parfum", "Eau du Parfum".
   - Remove "Parfum" when it is only a type indicator ("XYZ Parfum 50ml" -> "XYZ 50ml"), but keep it when it is part of the product's name ("Le Parfum").
   - Remove "Body Mist", "Body Spray", "Face Mist", "Setting Mist", "Hair Mist", "Mist", "Spray" when they describe the product form, usually near the size. Keep them when they belong to a unique product name.

4. Remove sizes
   - Volumes: "50ml", "50 ml", "50ML", "50 ML".
   - Fluid ounces: "3.4fl oz", "3.4 fl oz", "3.4FLOZ", "1.7 FL. OZ.", "3oz", "3 oz".
   - Weights: "15g", "200 g", "15GRAMS".

5. Clean up
   - Trim whitespace and apply Proper Case (Title Case) to what remains.
   - If nothing remains, output an empty line for that row.

6. Acronyms
   - Any acronym from the uppercase list that is part of the final name stays in ALL CAPS (e.g. "UV Plus Day Screen SPF50").

Apply every step with the same care to every row, including the last rows of the batch. The result per row is ONLY the cleaned product name.

Known brands (step 1):
{{brands}}

Acronyms to keep uppercase (step 6):
{{acronyms}}

Return ONLY the product names as a single-column CSV whose header is `{{header}}`, one output row per input row, in the same order and with the same row count. No explanations, no commentary, no ``` fences around the output.

Input CSV:
```csv
{{header}}
{{rows}}
```
"#;
