//! Clinical context enums: specialty and session type.
//!
//! Both enums parse leniently. Unknown or missing values never fail; they
//! degrade to [`Specialty::General`] and [`SessionType::Initial`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Clinical specialty of the consultation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Specialty {
    /// General medicine. Fallback for unrecognized specialties.
    #[default]
    General,
    /// Physiotherapy and rehabilitation.
    Physiotherapy,
    /// Psychology and mental health.
    Psychology,
    /// Cardiology.
    Cardiology,
    /// Neurology.
    Neurology,
    /// Pediatrics.
    Pediatrics,
}

impl Specialty {
    /// Returns all specialty variants.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::General,
            Self::Physiotherapy,
            Self::Psychology,
            Self::Cardiology,
            Self::Neurology,
            Self::Pediatrics,
        ]
    }

    /// Canonical key, also used to index knowledge-base sections.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::General => "medicina_general",
            Self::Physiotherapy => "fisioterapia",
            Self::Psychology => "psicologia",
            Self::Cardiology => "cardiologia",
            Self::Neurology => "neurologia",
            Self::Pediatrics => "pediatria",
        }
    }

    /// Human-readable Spanish label used inside prompts.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::General => "Medicina General",
            Self::Physiotherapy => "Fisioterapia",
            Self::Psychology => "Psicología",
            Self::Cardiology => "Cardiología",
            Self::Neurology => "Neurología",
            Self::Pediatrics => "Pediatría",
        }
    }

    /// Matches a specialty alias (Spanish or English, accents and case ignored).
    ///
    /// Returns `None` for unrecognized values.
    #[must_use]
    pub fn from_alias(s: &str) -> Option<Self> {
        match fold_key(s).as_str() {
            "medicina_general" | "general" | "general_medicine" | "medicina" | "mg" => {
                Some(Self::General)
            },
            "fisioterapia" | "physiotherapy" | "physical_therapy" | "kinesiologia" | "fisio" => {
                Some(Self::Physiotherapy)
            },
            "psicologia" | "psychology" | "psiquiatria" | "psychiatry" | "salud_mental"
            | "mental_health" => Some(Self::Psychology),
            "cardiologia" | "cardiology" => Some(Self::Cardiology),
            "neurologia" | "neurology" => Some(Self::Neurology),
            "pediatria" | "pediatrics" | "paediatrics" => Some(Self::Pediatrics),
            _ => None,
        }
    }

    /// Parses a specialty, falling back to general medicine.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        Self::from_alias(s).unwrap_or_default()
    }

    /// Parses an optional specialty, falling back to general medicine.
    #[must_use]
    pub fn parse_opt(s: Option<&str>) -> Self {
        s.map(Self::parse).unwrap_or_default()
    }
}

impl fmt::Display for Specialty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of clinical session being analyzed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    /// First consultation. Fallback for unrecognized session types.
    #[default]
    Initial,
    /// Follow-up consultation.
    Followup,
}

impl SessionType {
    /// Returns the session type as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Followup => "followup",
        }
    }

    /// Parses a session type, falling back to [`SessionType::Initial`].
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match fold_key(s).as_str() {
            "followup" | "follow_up" | "seguimiento" | "control" | "subsecuente" => {
                Self::Followup
            },
            _ => Self::Initial,
        }
    }

    /// Parses an optional session type, falling back to [`SessionType::Initial`].
    #[must_use]
    pub fn parse_opt(s: Option<&str>) -> Self {
        s.map(Self::parse).unwrap_or_default()
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Normalizes an alias: lowercase, trimmed, accents folded, separators as `_`.
fn fold_key(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'ä' => 'a',
            'é' | 'è' | 'ë' => 'e',
            'í' | 'ì' | 'ï' => 'i',
            'ó' | 'ò' | 'ö' => 'o',
            'ú' | 'ù' | 'ü' => 'u',
            ' ' | '-' => '_',
            other => other,
        })
        .collect()
}
