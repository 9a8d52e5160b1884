//! Interviewer voice presets and their selection from job metadata.
//!
//! A profile is provider-agnostic: `voice_id` is the voice-cloning provider's id and
//! `settings` carry the stability/similarity style parameters; neural providers map
//! the profile onto their own voice names.

use crate::model::ContextRecord;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoiceSettings {
    pub stability: f32,
    pub similarity_boost: f32,
    #[serde(default)]
    pub style: Option<f32>,
    #[serde(default)]
    pub speaker_boost: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceGender {
    Female,
    Male,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceProfile {
    pub voice_id: String,
    pub name: String,
    pub language: String,
    pub gender: VoiceGender,
    pub settings: VoiceSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoicePreset {
    ProfessionalFemale,
    ProfessionalMale,
    FriendlyFemale,
    TechnicalMale,
    IndianFriendlyFemale,
    IndianFriendlyMale,
    IndianTechnicalMale,
    SupportFriendly,
}

const RACHEL: &str = "21m00Tcm4TlvDq8ikWAM";
const ADAM: &str = "pNInz6obpgDQGcFmaJgB";
const SIA: &str = "ryIIztHPLYSJ74ueXxnO";

impl VoicePreset {
    pub const ALL: [VoicePreset; 8] = [
        VoicePreset::ProfessionalFemale,
        VoicePreset::ProfessionalMale,
        VoicePreset::FriendlyFemale,
        VoicePreset::TechnicalMale,
        VoicePreset::IndianFriendlyFemale,
        VoicePreset::IndianFriendlyMale,
        VoicePreset::IndianTechnicalMale,
        VoicePreset::SupportFriendly,
    ];

    pub fn profile(self) -> VoiceProfile {
        use VoiceGender::*;
        let (voice_id, name, gender, stability, similarity_boost) = match self {
            VoicePreset::ProfessionalFemale => (RACHEL, "Rachel", Female, 0.7, 0.8),
            VoicePreset::ProfessionalMale => (ADAM, "Adam", Male, 0.8, 0.7),
            VoicePreset::FriendlyFemale => (RACHEL, "Rachel (Friendly)", Female, 0.5, 0.6),
            VoicePreset::TechnicalMale => (ADAM, "Adam (Technical)", Male, 0.9, 0.8),
            VoicePreset::IndianFriendlyFemale => (RACHEL, "Rachel (Indian-Friendly)", Female, 0.6, 0.7),
            VoicePreset::IndianFriendlyMale => (ADAM, "Adam (Indian-Friendly)", Male, 0.7, 0.6),
            VoicePreset::IndianTechnicalMale => (ADAM, "Adam (Indian Technical)", Male, 0.8, 0.5),
            VoicePreset::SupportFriendly => (SIA, "Sia", Female, 0.6, 0.7),
        };
        let language = match self {
            VoicePreset::IndianFriendlyFemale
            | VoicePreset::IndianFriendlyMale
            | VoicePreset::IndianTechnicalMale => "en-IN",
            _ => "en-US",
        };
        VoiceProfile {
            voice_id: voice_id.to_string(),
            name: name.to_string(),
            language: language.to_string(),
            gender,
            settings: VoiceSettings {
                stability,
                similarity_boost,
                style: None,
                speaker_boost: true,
            },
        }
    }
}

impl Default for VoiceProfile {
    fn default() -> Self {
        VoicePreset::ProfessionalFemale.profile()
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Preset for a job title ("Senior Backend Engineer", "Customer Care Executive", ...).
pub fn preset_for_job_title(title: &str, prefer_indian_accent: bool) -> VoicePreset {
    let t = title.to_lowercase();
    let technical = contains_any(&t, &["technical", "engineer", "developer"]);
    let creative = contains_any(&t, &["creative", "design", "marketing"]);
    let leadership = contains_any(&t, &["manager", "lead", "director"]);

    if prefer_indian_accent {
        return if technical {
            VoicePreset::IndianTechnicalMale
        } else if leadership && !creative {
            VoicePreset::IndianFriendlyMale
        } else {
            VoicePreset::IndianFriendlyFemale
        };
    }

    if technical {
        VoicePreset::ProfessionalFemale
    } else if creative {
        VoicePreset::FriendlyFemale
    } else if leadership {
        VoicePreset::ProfessionalMale
    } else if contains_any(&t, &["customer", "care", "support", "service"]) {
        VoicePreset::SupportFriendly
    } else {
        VoicePreset::ProfessionalFemale
    }
}

/// Preset for a department name. Unknown departments get the default voice.
pub fn preset_for_department(department: &str, prefer_indian_accent: bool) -> VoicePreset {
    let d = department.trim().to_lowercase();
    if prefer_indian_accent {
        return match d.as_str() {
            "engineering" | "technology" | "it" => VoicePreset::IndianTechnicalMale,
            "management" | "executive" => VoicePreset::IndianFriendlyMale,
            _ => VoicePreset::IndianFriendlyFemale,
        };
    }
    match d.as_str() {
        "engineering" | "technology" | "it" | "development" => VoicePreset::ProfessionalFemale,
        "hr" | "human resources" | "marketing" | "creative" | "design" => VoicePreset::FriendlyFemale,
        "management" | "executive" => VoicePreset::ProfessionalMale,
        "customer service" | "customer care" | "support" | "service" => VoicePreset::SupportFriendly,
        _ => VoicePreset::ProfessionalFemale,
    }
}

/// Resolve the interviewer voice for a job: department wins when present, else the title.
pub fn resolve_voice_profile(context: &ContextRecord) -> VoiceProfile {
    let preset = match context.department.as_deref().filter(|d| !d.trim().is_empty()) {
        Some(dept) => preset_for_department(dept, context.prefer_indian_accent),
        None => preset_for_job_title(&context.title, context.prefer_indian_accent),
    };
    preset.profile()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(title: &str, department: Option<&str>, indian: bool) -> ContextRecord {
        ContextRecord {
            id: "job".into(),
            title: title.into(),
            department: department.map(str::to_string),
            agent_endpoint: None,
            prefer_indian_accent: indian,
        }
    }

    #[test]
    fn job_titles_map_to_presets() {
        assert_eq!(preset_for_job_title("Web Developer Trainee", false), VoicePreset::ProfessionalFemale);
        assert_eq!(preset_for_job_title("Marketing Associate", false), VoicePreset::FriendlyFemale);
        assert_eq!(preset_for_job_title("Engineering Manager", false), VoicePreset::ProfessionalFemale);
        assert_eq!(preset_for_job_title("Sales Director", false), VoicePreset::ProfessionalMale);
        assert_eq!(preset_for_job_title("Customer Care Executive", false), VoicePreset::SupportFriendly);
        assert_eq!(preset_for_job_title("Accountant", false), VoicePreset::ProfessionalFemale);
        assert_eq!(preset_for_job_title("Data Engineer", true), VoicePreset::IndianTechnicalMale);
    }

    #[test]
    fn department_takes_precedence() {
        let profile = resolve_voice_profile(&context("Sales Director", Some("Customer Care"), false));
        assert_eq!(profile.name, "Sia");
        let profile = resolve_voice_profile(&context("Sales Director", None, false));
        assert_eq!(profile.name, "Adam");
    }

    #[test]
    fn indian_presets_use_indian_english() {
        let profile = resolve_voice_profile(&context("Analyst", Some("HR"), true));
        assert_eq!(profile.language, "en-IN");
        assert_eq!(profile.gender, VoiceGender::Female);
    }

    #[test]
    fn every_preset_has_sane_settings() {
        for preset in VoicePreset::ALL {
            let p = preset.profile();
            assert!((0.0..=1.0).contains(&p.settings.stability), "{:?}", preset);
            assert!((0.0..=1.0).contains(&p.settings.similarity_boost), "{:?}", preset);
        }
    }
}
