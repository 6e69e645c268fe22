//! Structured field parsing of certificate text.
//!
//! Every field has an ordered list of patterns; the first match that passes
//! the field's validation wins. Parsing is a pure function of the text.

use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Element symbols recognised in chemical composition tables.
pub const CHEMICAL_ELEMENTS: [&str; 17] = [
    "C", "Si", "Mn", "P", "S", "Cr", "Ni", "Mo", "Cu", "Al", "Ti", "V", "Nb", "W", "Co", "B", "N",
];

const GRADE_PATTERNS: &[&str] = &[
    r"(?i)марка(?:[ \t]+стали)?[ \t]*[:№]?[ \t]*([A-ZА-ЯЁ0-9][A-ZА-ЯЁ0-9\-\.]*)",
    r"(?i)сталь[ \t]*:?[ \t]*([A-ZА-ЯЁ0-9][A-ZА-ЯЁ0-9\-\.]*)",
    r"(?i)(?:steel[ \t]+)?grade[ \t]*:?[ \t]*([A-Z0-9][A-Z0-9\-\.]*)",
    r"(?i)материал[ \t]*:?[ \t]*([A-ZА-ЯЁ0-9][A-ZА-ЯЁ0-9\-\.]*)",
];

const HEAT_NUMBER_PATTERNS: &[&str] = &[
    r"(?i)№[ \t]*плавки[ \t]*:?[ \t]*([A-ZА-ЯЁ0-9][A-ZА-ЯЁ0-9\-/]*)",
    r"(?i)плавк[аи][ \t]*[:№]*[ \t]*№?[ \t]*([A-ZА-ЯЁ0-9][A-ZА-ЯЁ0-9\-/]*)",
    r"(?i)heat[ \t]*(?:no\.?|number|#)?[ \t]*:?[ \t]*([A-Z0-9][A-Z0-9\-/]*)",
];

const CERTIFICATE_NUMBER_PATTERNS: &[&str] = &[
    r"(?i)№[ \t]*сертификата[ \t]*:?[ \t]*([A-ZА-ЯЁ0-9][A-ZА-ЯЁ0-9\-/]*)",
    r"(?i)сертификат(?:[ \t]+качества)?[ \t]*[:№]*[ \t]*№?[ \t]*([A-ZА-ЯЁ0-9][A-ZА-ЯЁ0-9\-/]*)",
    r"(?i)certificate[ \t]*(?:no\.?|number|#)?[ \t]*:?[ \t]*([A-Z0-9][A-Z0-9\-/]*)",
];

const SUPPLIER_PATTERNS: &[&str] = &[
    r"(?i)(?:поставщик|изготовитель|производитель|предприятие)[ \t]*[:\-]?[ \t]*([^\n]+)",
    r"(?i)(?:supplier|manufacturer)[ \t]*[:\-]?[ \t]*([^\n]+)",
];

const MECHANICAL_PATTERNS: &[(&str, &[&str])] = &[
    (
        "yield_strength",
        &[
            r"(?i)предел[ \t]+текучести",
            r"(?i)σ[ \t_]*т",
            r"(?i)yield(?:[ \t]+strength)?",
        ],
    ),
    (
        "tensile_strength",
        &[
            r"(?i)временное[ \t]+сопротивление",
            r"(?i)предел[ \t]+прочности",
            r"(?i)σ[ \t_]*в",
            r"(?i)tensile(?:[ \t]+strength)?",
        ],
    ),
    (
        "elongation",
        &[
            r"(?i)относительное[ \t]+удлинение",
            r"(?i)δ(?:5|10)?",
            r"(?i)elongation",
        ],
    ),
    (
        "hardness",
        &[
            r"(?i)тв[её]рдость",
            r"(?i)\b(?:hbw?|нв)\b",
            r"(?i)hardness",
        ],
    ),
];

/// Gap between a property label and its value: no digits, same line.
const MECHANICAL_VALUE: &str = r"[^\d\n]{0,40}?(\d+(?:[.,]\d+)?)";

const TEST_KEYWORDS: &[(&str, &[&str])] = &[
    ("impact", &["ударная вязкость", "ударный изгиб", "kcu", "kcv", "кcu", "кcv", "impact"]),
    ("bending", &["на изгиб", "испытание на загиб", "bend"]),
    ("ultrasonic", &["узк", "ультразвук", "ultrasonic"]),
    ("magnetic_particle", &["магнитопорошков", "magnetic particle"]),
];

const TEMPERATURE_PATTERNS: &[&str] = &[
    r"(?i)при[ \t]+температуре[ \t]*:?[ \t]*([+\-]?\d+)",
    r"(?i)([+\-]?\d+)[ \t]*°[ \t]*[CС]",
];

/// Fields recovered from a certificate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CertificateFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heat_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplier: Option<String>,
    /// Element symbol to mass percent.
    #[serde(default)]
    pub chemical_composition: BTreeMap<String, f64>,
    /// Property name (`yield_strength`, `tensile_strength`, `elongation`,
    /// `hardness`) to value.
    #[serde(default)]
    pub mechanical_properties: BTreeMap<String, f64>,
    #[serde(default)]
    pub test_results: TestResults,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResults {
    /// Test kinds mentioned in the document, e.g. `impact`, `ultrasonic`.
    #[serde(default)]
    pub performed: BTreeSet<String>,
    /// Distinct test temperatures in °C, ascending.
    #[serde(default)]
    pub temperatures: BTreeSet<i32>,
}

impl TestResults {
    pub fn is_empty(&self) -> bool {
        self.performed.is_empty() && self.temperatures.is_empty()
    }
}

struct FieldRule {
    patterns: Vec<Regex>,
    min_len: usize,
    max_len: usize,
    needs_digit: bool,
}

impl FieldRule {
    fn new(patterns: &[&str], min_len: usize, max_len: usize, needs_digit: bool) -> Self {
        Self {
            patterns: compile(patterns),
            min_len,
            max_len,
            needs_digit,
        }
    }

    fn find(&self, text: &str, clean: fn(&str) -> String) -> Option<String> {
        self.patterns.iter().find_map(|re| {
            re.captures_iter(text)
                .filter_map(|caps| caps.get(1).map(|m| clean(m.as_str())))
                .find(|value| self.accepts(value))
        })
    }

    fn accepts(&self, value: &str) -> bool {
        let len = value.chars().count();
        len >= self.min_len
            && len <= self.max_len
            && (!self.needs_digit || value.chars().any(|c| c.is_ascii_digit()))
    }
}

/// Compiled pattern set for certificate fields.
pub struct FieldParser {
    grade: FieldRule,
    heat_number: FieldRule,
    certificate_number: FieldRule,
    supplier: FieldRule,
    elements: Vec<(&'static str, Regex)>,
    mechanical: Vec<(&'static str, Vec<Regex>)>,
    temperatures: Vec<Regex>,
}

impl Default for FieldParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldParser {
    pub fn new() -> Self {
        let elements = CHEMICAL_ELEMENTS
            .iter()
            .filter_map(|symbol| {
                let pattern = format!(
                    r"(?m)(?:^|[^\p{{L}}]){}[ \t]*[:=\-]?[ \t]*(\d+[.,]\d+)",
                    symbol
                );
                Regex::new(&pattern).ok().map(|re| (*symbol, re))
            })
            .collect();

        let mechanical = MECHANICAL_PATTERNS
            .iter()
            .map(|(name, labels)| {
                let patterns = labels
                    .iter()
                    .filter_map(|label| Regex::new(&format!("{}{}", label, MECHANICAL_VALUE)).ok())
                    .collect();
                (*name, patterns)
            })
            .collect();

        Self {
            grade: FieldRule::new(GRADE_PATTERNS, 2, 20, true),
            heat_number: FieldRule::new(HEAT_NUMBER_PATTERNS, 3, 30, true),
            certificate_number: FieldRule::new(CERTIFICATE_NUMBER_PATTERNS, 3, 50, true),
            supplier: FieldRule::new(SUPPLIER_PATTERNS, 3, 200, false),
            elements,
            mechanical,
            temperatures: compile(TEMPERATURE_PATTERNS),
        }
    }

    /// Parses all fields from raw extracted text.
    pub fn parse(&self, raw: &str) -> CertificateFields {
        let text = normalize(raw);

        CertificateFields {
            grade: self.grade.find(&text, clean_code),
            heat_number: self.heat_number.find(&text, clean_code),
            certificate_number: self.certificate_number.find(&text, clean_code),
            supplier: self.supplier.find(&text, clean_supplier),
            chemical_composition: self.chemical_composition(&text),
            mechanical_properties: self.mechanical_properties(&text),
            test_results: self.test_results(&text),
        }
    }

    fn chemical_composition(&self, text: &str) -> BTreeMap<String, f64> {
        self.elements
            .iter()
            .filter_map(|(symbol, re)| {
                re.captures_iter(text)
                    .filter_map(|caps| caps.get(1).and_then(|m| parse_number(m.as_str())))
                    .find(|v| (0.0..=100.0).contains(v))
                    .map(|v| (symbol.to_string(), v))
            })
            .collect()
    }

    fn mechanical_properties(&self, text: &str) -> BTreeMap<String, f64> {
        let text = strip_area_units(text);
        self.mechanical
            .iter()
            .filter_map(|(name, patterns)| {
                patterns
                    .iter()
                    .find_map(|re| {
                        re.captures(&text)
                            .and_then(|caps| caps.get(1))
                            .and_then(|m| parse_number(m.as_str()))
                    })
                    .map(|v| (name.to_string(), v))
            })
            .collect()
    }

    fn test_results(&self, text: &str) -> TestResults {
        let lower = text.to_lowercase();
        let performed = TEST_KEYWORDS
            .iter()
            .filter(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
            .map(|(name, _)| name.to_string())
            .collect();

        let temperatures = self
            .temperatures
            .iter()
            .flat_map(|re| re.captures_iter(text))
            .filter_map(|caps| caps.get(1).and_then(|m| m.as_str().parse::<i32>().ok()))
            .filter(|t| (-200..=1000).contains(t))
            .collect();

        TestResults {
            performed,
            temperatures,
        }
    }
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().filter_map(|p| Regex::new(p).ok()).collect()
}

/// Collapses whitespace inside each line, drops blank lines and unifies
/// the typographic minus sign.
pub fn normalize(raw: &str) -> String {
    raw.lines()
        .map(|line| {
            line.split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .replace('\u{2212}', "-")
        })
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Removes the digit of area units (`Н/мм2`, `mm²`) so it is not taken
/// for a property value.
fn strip_area_units(text: &str) -> String {
    text.replace("мм2", "мм")
        .replace("мм²", "мм")
        .replace("mm2", "mm")
        .replace("mm²", "mm")
}

fn clean_code(value: &str) -> String {
    value
        .trim_end_matches(['.', '-', '/'])
        .to_uppercase()
}

fn clean_supplier(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, '"' | '\'' | '«' | '»' | '“' | '”'))
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.replace(',', ".").parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> CertificateFields {
        FieldParser::new().parse(text)
    }

    #[test]
    fn test_all_patterns_compile() {
        let parser = FieldParser::new();
        assert_eq!(parser.grade.patterns.len(), GRADE_PATTERNS.len());
        assert_eq!(parser.heat_number.patterns.len(), HEAT_NUMBER_PATTERNS.len());
        assert_eq!(
            parser.certificate_number.patterns.len(),
            CERTIFICATE_NUMBER_PATTERNS.len()
        );
        assert_eq!(parser.supplier.patterns.len(), SUPPLIER_PATTERNS.len());
        assert_eq!(parser.elements.len(), CHEMICAL_ELEMENTS.len());
        let mechanical: usize = parser.mechanical.iter().map(|(_, p)| p.len()).sum();
        let expected: usize = MECHANICAL_PATTERNS.iter().map(|(_, p)| p.len()).sum();
        assert_eq!(mechanical, expected);
        assert_eq!(parser.temperatures.len(), TEMPERATURE_PATTERNS.len());
    }

    #[test]
    fn test_grade_and_heat_number() {
        let fields = parse("Марка стали: 40X\nПлавка № 12345");
        assert_eq!(fields.grade.as_deref(), Some("40X"));
        assert_eq!(fields.heat_number.as_deref(), Some("12345"));
        assert_eq!(fields.certificate_number, None);
        assert_eq!(fields.supplier, None);
    }

    #[test]
    fn test_grade_is_upper_cased_and_requires_digit() {
        assert_eq!(parse("марка: 09г2с").grade.as_deref(), Some("09Г2С"));
        assert_eq!(parse("Сталь 20").grade.as_deref(), Some("20"));
        assert_eq!(parse("Марка материала: отсутствует").grade, None);
        assert_eq!(parse("Steel grade: s355j2").grade.as_deref(), Some("S355J2"));
    }

    #[test]
    fn test_grade_skips_invalid_match_for_later_one() {
        let fields = parse("Марка изделия: лист\nМарка: 12Х18Н10Т.");
        assert_eq!(fields.grade.as_deref(), Some("12Х18Н10Т"));
    }

    #[test]
    fn test_heat_number_variants() {
        assert_eq!(parse("№ плавки: 7-5521").heat_number.as_deref(), Some("7-5521"));
        assert_eq!(parse("Heat No. a1234").heat_number.as_deref(), Some("A1234"));
        assert_eq!(parse("Плавка № 12").heat_number, None);
    }

    #[test]
    fn test_certificate_number_and_supplier() {
        let text = "Сертификат качества № 2024/117\nПоставщик: ООО \"Уральский   металл\"";
        let fields = parse(text);
        assert_eq!(fields.certificate_number.as_deref(), Some("2024/117"));
        assert_eq!(fields.supplier.as_deref(), Some("ООО Уральский металл"));

        let english = parse("Certificate No: mc-88\nSupplier: «Acme Steel»");
        assert_eq!(english.certificate_number.as_deref(), Some("MC-88"));
        assert_eq!(english.supplier.as_deref(), Some("Acme Steel"));
    }

    #[test]
    fn test_supplier_too_short_is_rejected() {
        assert_eq!(parse("Поставщик: АО").supplier, None);
    }

    #[test]
    fn test_chemical_composition() {
        let fields = parse("Химический состав, %: C 0,42 Si 0.25 Mn 0.65 Cr 0.95 S 0.020 P 0.018");
        let chem = &fields.chemical_composition;
        assert_eq!(chem.get("C"), Some(&0.42));
        assert_eq!(chem.get("Si"), Some(&0.25));
        assert_eq!(chem.get("Mn"), Some(&0.65));
        assert_eq!(chem.get("Cr"), Some(&0.95));
        assert_eq!(chem.get("S"), Some(&0.020));
        assert_eq!(chem.get("P"), Some(&0.018));
        assert!(!chem.contains_key("Ni"));
        assert!(!chem.contains_key("N"));
    }

    #[test]
    fn test_chemistry_rejects_out_of_range_values() {
        let fields = parse("Ni 150.5\nNi 1.25");
        assert_eq!(fields.chemical_composition.get("Ni"), Some(&1.25));
    }

    #[test]
    fn test_mechanical_properties() {
        let text = "Предел текучести, Н/мм2: 345\nВременное сопротивление 590,5 МПа\n\
                    Относительное удлинение, %: 21\nТвердость HB 229";
        let props = parse(text).mechanical_properties;
        assert_eq!(props.get("yield_strength"), Some(&345.0));
        assert_eq!(props.get("tensile_strength"), Some(&590.5));
        assert_eq!(props.get("elongation"), Some(&21.0));
        assert_eq!(props.get("hardness"), Some(&229.0));
    }

    #[test]
    fn test_test_results() {
        let text = "Ударная вязкость KCU при температуре -40\nУЗК выполнен\nИспытание при +20 °C";
        let results = parse(text).test_results;
        assert!(results.performed.contains("impact"));
        assert!(results.performed.contains("ultrasonic"));
        assert!(!results.performed.contains("magnetic_particle"));
        assert_eq!(results.temperatures.iter().copied().collect::<Vec<_>>(), vec![-40, 20]);
    }

    #[test]
    fn test_temperatures_out_of_range_are_ignored() {
        let results = parse("отпуск 1200 °C, испытание при температуре -60").test_results;
        assert_eq!(results.temperatures.iter().copied().collect::<Vec<_>>(), vec![-60]);
    }

    #[test]
    fn test_parsing_is_deterministic() {
        let text = "Марка: 40X\nПлавка: 555\nC 0.4 Mn 0.6\nПоставщик: ООО Сталь";
        let parser = FieldParser::new();
        let a = serde_json::to_string(&parser.parse(text)).unwrap();
        let b = serde_json::to_string(&parser.parse(text)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_normalize_keeps_lines() {
        assert_eq!(normalize("  a   b \n\n\t c\u{a0}d  \n"), "a b\nc d");
        assert_eq!(normalize("t = \u{2212}40"), "t = -40");
    }

    #[test]
    fn test_empty_text() {
        let fields = parse("");
        assert_eq!(fields, CertificateFields::default());
    }
}
