use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::domain::{Case, CaseId, CaseProfile, CaseStatus};

/// Identity key two cases can share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKey {
    NationalId,
    Passport,
    Phone,
    TaxId,
}

impl MatchKey {
    pub const ALL: [MatchKey; 4] = [
        MatchKey::NationalId,
        MatchKey::Passport,
        MatchKey::Phone,
        MatchKey::TaxId,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            MatchKey::NationalId => "national_id",
            MatchKey::Passport => "passport",
            MatchKey::Phone => "phone",
            MatchKey::TaxId => "tax_id",
        }
    }
}

/// Normalized identity keys of one case. Keys that fail their format guard are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityKeys {
    pub national_id: Option<String>,
    pub passport: Option<String>,
    pub phone: Option<String>,
    pub tax_id: Option<String>,
}

impl IdentityKeys {
    pub fn of(case: &Case) -> Self {
        match &case.input.profile {
            CaseProfile::Individual(profile) => Self {
                national_id: profile
                    .pinfl
                    .as_deref()
                    .map(str::trim)
                    .filter(|pinfl| pinfl.chars().count() == 14)
                    .map(str::to_string),
                passport: trimmed(profile.passport_series.as_deref()),
                phone: normalize_phone(profile.phone_numbers.as_deref()),
                tax_id: None,
            },
            CaseProfile::LegalEntity(profile) => Self {
                national_id: None,
                passport: None,
                phone: normalize_phone(profile.company.phone.as_deref()),
                tax_id: trimmed(profile.company.tax_id.as_deref()),
            },
        }
    }

    pub fn get(&self, key: MatchKey) -> Option<&str> {
        match key {
            MatchKey::NationalId => self.national_id.as_deref(),
            MatchKey::Passport => self.passport.as_deref(),
            MatchKey::Phone => self.phone.as_deref(),
            MatchKey::TaxId => self.tax_id.as_deref(),
        }
    }
}

/// Digits only; numbers shorter than nine digits are too ambiguous to compare.
pub fn normalize_phone(raw: Option<&str>) -> Option<String> {
    let digits: String = raw?.chars().filter(char::is_ascii_digit).collect();
    (digits.len() >= 9).then_some(digits)
}

fn trimmed(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Another case sharing at least one identity key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateMatch {
    pub case_id: CaseId,
    pub display_name: String,
    pub status: CaseStatus,
    pub matched_fields: String,
    pub created_at: NaiveDateTime,
}

/// Cases sharing a key with `case`, in repository order. Self and deleted cases are skipped.
pub fn find_duplicates(case: &Case, repository: &[Case]) -> Vec<DuplicateMatch> {
    let keys = IdentityKeys::of(case);
    if MatchKey::ALL.iter().all(|key| keys.get(*key).is_none()) {
        return Vec::new();
    }

    repository
        .iter()
        .filter(|candidate| candidate.id != case.id && !candidate.is_deleted())
        .filter_map(|candidate| {
            let theirs = IdentityKeys::of(candidate);
            let matched: Vec<&str> = MatchKey::ALL
                .iter()
                .filter(|key| {
                    matches!((keys.get(**key), theirs.get(**key)), (Some(a), Some(b)) if a == b)
                })
                .map(|key| key.label())
                .collect();

            (!matched.is_empty()).then(|| DuplicateMatch {
                case_id: candidate.id,
                display_name: candidate.display_name(),
                status: candidate.status,
                matched_fields: matched.join(", "),
                created_at: candidate.created_at,
            })
        })
        .collect()
}
