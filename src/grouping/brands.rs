use crate::grouping::TextFragment;

/// A brand and the spellings that identify it in recognised text.
#[derive(Debug, Clone)]
pub struct BrandEntry {
    pub name: String,
    pub variants: Vec<String>,
}

impl BrandEntry {
    pub fn new(name: &str, variants: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            variants: variants.iter().map(|v| v.to_string()).collect(),
        }
    }
}

/// Brand that won for one detection.
#[derive(Debug, Clone, PartialEq)]
pub struct BrandMatch {
    pub brand: String,
    pub confidence: f32,
}

/// Ordered brand lookup table; earlier entries win ties.
#[derive(Debug, Clone)]
pub struct BrandTable {
    entries: Vec<BrandEntry>,
}

impl Default for BrandTable {
    fn default() -> Self {
        Self::new(vec![
            // feminine hygiene
            BrandEntry::new("Kotex", &["Kotex", "Kotex®", "Kotex Ultra"]),
            BrandEntry::new("Seni", &["Seni", "Seni®", "Seni Gentle"]),
            BrandEntry::new("Always", &["Always", "Always®", "Always Ultra"]),
            BrandEntry::new("Tampax", &["Tampax", "Tampax®", "Tampax Pearl"]),
            BrandEntry::new("Carefree", &["Carefree", "Carefree®"]),
            BrandEntry::new("Playtex", &["Playtex", "Playtex®"]),
            // laundry
            BrandEntry::new("Molto", &["Molto", "Molto®", "Molto Ultra"]),
            BrandEntry::new("Downy", &["Downy", "Downy®", "Downy Ultra"]),
            BrandEntry::new("Tide", &["Tide", "Tide®", "Tide Ultra"]),
            BrandEntry::new("Ariel", &["Ariel", "Ariel®"]),
            BrandEntry::new("Surf", &["Surf", "Surf®"]),
            // baby
            BrandEntry::new("Huggies", &["Huggies", "Huggies®"]),
            BrandEntry::new("Pampers", &["Pampers", "Pampers®"]),
            BrandEntry::new("MamyPoko", &["MamyPoko", "MamyPoko®"]),
            // personal care
            BrandEntry::new(
                "Head & Shoulders",
                &["Head & Shoulders", "Head Shoulders"],
            ),
            BrandEntry::new("Pantene", &["Pantene", "Pantene®"]),
            BrandEntry::new("Dove", &["Dove", "Dove®"]),
            BrandEntry::new("Lux", &["Lux", "Lux®"]),
            BrandEntry::new("Sunsilk", &["Sunsilk", "Sunsilk®"]),
            // generic product lines
            BrandEntry::new("Ultra", &["Ultra"]),
            BrandEntry::new("Gentle", &["Gentle"]),
            BrandEntry::new("Slimguard", &["Slimguard"]),
            BrandEntry::new("Regular", &["Regular"]),
            BrandEntry::new("Super", &["Super"]),
        ])
    }
}

impl BrandTable {
    pub fn new(entries: Vec<BrandEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[BrandEntry] {
        &self.entries
    }

    /// First brand (in table order) with a variant contained in `text`.
    pub fn exact_match(&self, text: &str) -> Option<&BrandEntry> {
        let text = text.to_uppercase();
        self.entries.iter().find(|entry| {
            entry
                .variants
                .iter()
                .any(|v| text.contains(&v.to_uppercase()))
        })
    }

    /// First brand with a variant word longer than three characters that
    /// appears as a whole word of `text`.
    pub fn partial_match(&self, text: &str) -> Option<&BrandEntry> {
        let text = text.to_uppercase();
        let words: Vec<&str> = text.split_whitespace().collect();
        self.entries.iter().find(|entry| {
            entry.variants.iter().any(|v| {
                v.to_uppercase()
                    .split_whitespace()
                    .filter(|w| w.chars().count() > 3)
                    .any(|w| words.iter().any(|t| *t == w))
            })
        })
    }

    /// Pick the brand for one detection from its recognised text fragments.
    ///
    /// Fragments at or below `min_confidence` are ignored. Each fragment is
    /// tried for an exact match and, while nothing has matched yet, a partial
    /// one. A later match replaces the current one only with a strictly higher
    /// recognition confidence.
    pub fn match_fragments(
        &self,
        fragments: &[TextFragment],
        min_confidence: f32,
    ) -> Option<BrandMatch> {
        let mut best: Option<BrandMatch> = None;

        let consider = |best: &mut Option<BrandMatch>, entry: &BrandEntry, confidence: f32| {
            let best_confidence = best.as_ref().map_or(0.0, |b| b.confidence);
            if confidence > best_confidence {
                *best = Some(BrandMatch {
                    brand: entry.name.clone(),
                    confidence,
                });
            }
        };

        for fragment in fragments.iter().filter(|f| f.confidence > min_confidence) {
            let text = fragment.text.trim();
            if let Some(entry) = self.exact_match(text) {
                consider(&mut best, entry, fragment.confidence);
            }
            if best.is_none() {
                if let Some(entry) = self.partial_match(text) {
                    consider(&mut best, entry, fragment.confidence);
                }
            }
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frag(text: &str, confidence: f32) -> TextFragment {
        TextFragment {
            text: text.to_string(),
            confidence,
        }
    }

    #[test]
    fn exact_match_is_case_insensitive_substring() {
        let table = BrandTable::default();
        assert_eq!(table.exact_match("new tide pods").unwrap().name, "Tide");
        assert_eq!(table.exact_match("ARIEL®").unwrap().name, "Ariel");
        assert!(table.exact_match("generic soap").is_none());
    }

    #[test]
    fn table_order_breaks_ties_within_a_fragment() {
        // "Kotex Ultra" also contains the generic "Ultra" line
        let table = BrandTable::default();
        let found = table.match_fragments(&[frag("KOTEX ULTRA THIN", 0.8)], 0.3).unwrap();
        assert_eq!(found.brand, "Kotex");
    }

    #[test]
    fn partial_match_needs_a_whole_long_word() {
        let table = BrandTable::new(vec![BrandEntry::new("Head & Shoulders", &["Head Shoulders"])]);
        assert!(table.exact_match("classic shoulders care").is_none());
        assert_eq!(
            table.partial_match("classic shoulders care").unwrap().name,
            "Head & Shoulders"
        );
        assert!(table.partial_match("shoulderstrap").is_none());
    }

    #[test]
    fn highest_confidence_fragment_wins() {
        let table = BrandTable::default();
        let found = table
            .match_fragments(&[frag("Dove", 0.5), frag("Pantene", 0.9), frag("Lux", 0.9)], 0.3)
            .unwrap();
        assert_eq!(found.brand, "Pantene");
        assert_eq!(found.confidence, 0.9);
    }

    #[test]
    fn low_confidence_fragments_are_ignored() {
        let table = BrandTable::default();
        assert!(table.match_fragments(&[frag("Tide", 0.3)], 0.3).is_none());
    }
}
