//! Critical clinical red-flag detection.
//!
//! Matching is presence-only substring containment against a lower-cased
//! copy of the text. There is no stemming, tokenization or negation
//! handling: "niega dolor de pecho" still counts "dolor de pecho".

use crate::Result;

/// Red-flag phrase category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlagCategory {
    /// Acute coronary and cardiac signs.
    Cardiac,
    /// Stroke, seizure and intracranial signs.
    Neurologic,
    /// Constitutional signs suggesting malignancy.
    Oncologic,
    /// Thrombosis, hemorrhage and aortic signs.
    Vascular,
    /// Sepsis and meningitis signs.
    Infectious,
}

impl FlagCategory {
    /// Returns the category as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cardiac => "cardiac",
            Self::Neurologic => "neurologic",
            Self::Oncologic => "oncologic",
            Self::Vascular => "vascular",
            Self::Infectious => "infectious",
        }
    }
}

/// Lower-case red-flag phrases, grouped by category.
pub const RED_FLAG_LEXICON: &[(FlagCategory, &[&str])] = &[
    (
        FlagCategory::Cardiac,
        &[
            "dolor pecho",
            "dolor de pecho",
            "dolor torácico",
            "dolor toracico",
            "opresión en el pecho",
            "irradiado a brazo",
            "irradiado al brazo",
            "irradiado a mandíbula",
            "sudoración",
            "diaforesis",
            "palpitaciones",
            "síncope",
            "sincope",
            "disnea súbita",
        ],
    ),
    (
        FlagCategory::Neurologic,
        &[
            "pérdida de conciencia",
            "perdida de conciencia",
            "cefalea intensa",
            "peor dolor de cabeza",
            "convulsión",
            "convulsiones",
            "debilidad súbita",
            "parálisis",
            "hemiparesia",
            "desviación de la comisura",
            "dificultad para hablar",
            "visión doble",
            "confusión aguda",
            "pérdida de fuerza",
            "incontinencia",
            "anestesia en silla de montar",
        ],
    ),
    (
        FlagCategory::Oncologic,
        &[
            "pérdida de peso",
            "perdida de peso",
            "sudores nocturnos",
            "masa palpable",
            "antecedente de cáncer",
            "dolor nocturno",
        ],
    ),
    (
        FlagCategory::Vascular,
        &[
            "hemorragia",
            "sangrado abundante",
            "hemoptisis",
            "hematemesis",
            "melena",
            "pierna hinchada",
            "trombosis",
            "dolor abdominal súbito",
        ],
    ),
    (
        FlagCategory::Infectious,
        &[
            "fiebre alta",
            "rigidez de nuca",
            "rigidez nucal",
            "petequias",
            "escalofríos",
            "sepsis",
        ],
    ),
];

/// Counts red flags in free text.
///
/// Implementations must be pure and safe to share across threads.
pub trait FlagDetector: Send + Sync {
    /// Counts distinct red-flag phrases present in the text.
    ///
    /// # Errors
    ///
    /// Returns an error if detection fails internally.
    fn count(&self, transcription: &str) -> Result<usize>;
}

/// A matched red-flag phrase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagMatch {
    /// Category of the phrase.
    pub category: FlagCategory,
    /// The lexicon phrase.
    pub phrase: &'static str,
}

/// Lexicon-based red-flag detector.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedFlagDetector;

impl RedFlagDetector {
    /// Creates a detector over the built-in lexicon.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Counts distinct lexicon phrases present in the text.
    ///
    /// Never fails; empty text yields zero.
    #[must_use]
    pub fn count_critical_flags(&self, transcription: &str) -> usize {
        self.matched_flags(transcription).len()
    }

    /// Lists the lexicon phrases present in the text, in lexicon order.
    #[must_use]
    pub fn matched_flags(&self, transcription: &str) -> Vec<FlagMatch> {
        if transcription.is_empty() {
            return Vec::new();
        }
        let text = transcription.to_lowercase();

        RED_FLAG_LEXICON
            .iter()
            .flat_map(|(category, phrases)| {
                phrases.iter().map(move |phrase| FlagMatch {
                    category: *category,
                    phrase,
                })
            })
            .filter(|flag| text.contains(flag.phrase))
            .collect()
    }
}

impl FlagDetector for RedFlagDetector {
    fn count(&self, transcription: &str) -> Result<usize> {
        Ok(self.count_critical_flags(transcription))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_lexicon_is_lowercase_and_unique() {
        let mut seen = std::collections::HashSet::new();
        for (_, phrases) in RED_FLAG_LEXICON {
            for phrase in *phrases {
                assert_eq!(*phrase, phrase.to_lowercase());
                assert!(seen.insert(*phrase), "duplicate phrase: {phrase}");
            }
        }
    }

    #[test]
    fn test_empty_text() {
        assert_eq!(RedFlagDetector::new().count_critical_flags(""), 0);
    }

    #[test]
    fn test_cardiac_example() {
        let detector = RedFlagDetector::new();
        let text = "Paciente refiere dolor pecho irradiado a brazo izquierdo con sudoración";
        let matches = detector.matched_flags(text);

        let phrases: Vec<_> = matches.iter().map(|m| m.phrase).collect();
        assert_eq!(phrases, vec!["dolor pecho", "irradiado a brazo", "sudoración"]);
        assert!(matches.iter().all(|m| m.category == FlagCategory::Cardiac));
        assert_eq!(detector.count_critical_flags(text), 3);
    }

    #[test]
    fn test_presence_not_frequency() {
        let detector = RedFlagDetector::new();
        assert_eq!(
            detector.count_critical_flags("fiebre alta, fiebre alta y fiebre alta"),
            1
        );
    }

    #[test_case("FIEBRE ALTA" ; "upper case")]
    #[test_case("Fiebre Alta desde ayer" ; "title case")]
    #[test_case("refiere fiebre alta." ; "inside sentence")]
    fn test_case_insensitive(text: &str) {
        assert_eq!(RedFlagDetector::new().count_critical_flags(text), 1);
    }

    #[test]
    fn test_accented_uppercase_matches() {
        assert_eq!(
            RedFlagDetector::new().count_critical_flags("PÉRDIDA DE PESO y SÍNCOPE"),
            2
        );
    }

    #[test]
    fn test_negation_is_not_handled() {
        assert_eq!(
            RedFlagDetector::new().count_critical_flags("niega dolor de pecho"),
            1
        );
    }

    #[test]
    fn test_benign_text() {
        assert_eq!(
            RedFlagDetector::new().count_critical_flags("Control de rutina, paciente asintomático"),
            0
        );
    }

    #[test]
    fn test_trait_count_matches_inherent() {
        let detector = RedFlagDetector::new();
        let text = "convulsión y rigidez de nuca";
        assert_eq!(detector.count(text).unwrap(), 2);
    }
}
