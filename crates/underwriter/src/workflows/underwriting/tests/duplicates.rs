use super::common::*;

use crate::workflows::underwriting::domain::{CaseInput, CaseStatus, Deletion, UserId};
use crate::workflows::underwriting::duplicates::{
    find_duplicates, normalize_phone, IdentityKeys, MatchKey,
};

fn stranger() -> CaseInput {
    let mut input = individual_input();
    let profile = individual(&mut input);
    profile.full_name = Some("Malika Yusupova".to_string());
    profile.passport_series = Some("AB7654321".to_string());
    profile.pinfl = Some("42201950020011".to_string());
    profile.phone_numbers = Some("+998 97 000-11-22".to_string());
    input
}

#[test]
fn phone_formatting_does_not_hide_a_match() {
    let mut first = stranger();
    individual(&mut first).phone_numbers = Some("+998 (90) 123-45-67".to_string());
    let mut second = stranger();
    let profile = individual(&mut second);
    profile.passport_series = Some("AC1112223".to_string());
    profile.pinfl = None;
    profile.phone_numbers = Some("998901234567".to_string());

    let a = case_from(1, first);
    let b = case_from(2, second);
    let repository = vec![a.clone(), b.clone()];

    let from_a = find_duplicates(&a, &repository);
    let from_b = find_duplicates(&b, &repository);

    assert_eq!(from_a.len(), 1);
    assert_eq!(from_a[0].case_id, b.id);
    assert_eq!(from_a[0].matched_fields, "phone");
    assert_eq!(from_b.len(), 1);
    assert_eq!(from_b[0].case_id, a.id);
}

#[test]
fn shared_national_id_is_reported_from_both_sides() {
    let first = stranger();
    let mut second = stranger();
    let profile = individual(&mut second);
    profile.full_name = Some("Malika Yusupova-Rahimova".to_string());
    profile.passport_series = Some("AC1112223".to_string());
    profile.phone_numbers = Some("+998 93 555-66-77".to_string());

    let a = case_from(1, first);
    let b = case_from(2, second);
    let repository = vec![a.clone(), b.clone()];

    let from_a = find_duplicates(&a, &repository);
    let from_b = find_duplicates(&b, &repository);

    assert_eq!(from_a.len(), 1);
    assert_eq!(from_a[0].case_id, b.id);
    assert_eq!(from_a[0].matched_fields, "national_id");
    assert_eq!(from_b.len(), 1);
    assert_eq!(from_b[0].case_id, a.id);
    assert_eq!(from_b[0].matched_fields, "national_id");
}

#[test]
fn every_shared_key_is_listed() {
    let a = case_from(1, individual_input());
    let b = case_from(2, individual_input());

    let matches = find_duplicates(&a, &[a.clone(), b]);

    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].matched_fields, "national_id, passport, phone");
    assert_eq!(matches[0].display_name, "Aziz Karimov");
    assert_eq!(matches[0].status, CaseStatus::Draft);
}

#[test]
fn self_and_deleted_cases_are_skipped() {
    let a = case_from(1, individual_input());
    let mut deleted = case_from(2, individual_input());
    deleted.status = CaseStatus::Deleted;
    deleted.deletion = Some(Deletion {
        reason: "entered twice".to_string(),
        deleted_by: UserId(1),
        deleted_at: timestamp(),
    });
    let unrelated = case_from(3, stranger());

    let matches = find_duplicates(&a, &[a.clone(), deleted, unrelated]);

    assert!(matches.is_empty(), "{matches:?}");
}

#[test]
fn short_or_malformed_keys_never_match() {
    let mut first = stranger();
    let profile = individual(&mut first);
    profile.pinfl = Some("1234".to_string());
    profile.phone_numbers = Some("12-34".to_string());
    profile.passport_series = None;
    let second = first.clone();

    let a = case_from(1, first);
    let b = case_from(2, second);

    assert_eq!(IdentityKeys::of(&a), IdentityKeys::default());
    assert!(find_duplicates(&a, &[a.clone(), b]).is_empty());
}

#[test]
fn tax_id_matches_only_between_legal_entities() {
    let a = case_from(1, legal_entity_input());
    let mut other_input = legal_entity_input();
    let profile = legal_entity(&mut other_input);
    profile.company.name = Some("Silk Road Trading".to_string());
    profile.company.phone = None;
    let b = case_from(2, other_input);
    let person = case_from(3, stranger());

    let matches = find_duplicates(&a, &[a.clone(), b.clone(), person.clone()]);

    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].case_id, b.id);
    assert_eq!(matches[0].matched_fields, "tax_id");
    assert_eq!(IdentityKeys::of(&person).get(MatchKey::TaxId), None);
}

#[test]
fn results_follow_repository_order() {
    let a = case_from(5, individual_input());
    let repository = vec![
        case_from(9, individual_input()),
        a.clone(),
        case_from(2, individual_input()),
    ];

    let ids: Vec<u64> = find_duplicates(&a, &repository)
        .into_iter()
        .map(|m| m.case_id.0)
        .collect();

    assert_eq!(ids, vec![9, 2]);
}

#[test]
fn phone_normalization_keeps_digits_only() {
    assert_eq!(
        normalize_phone(Some("+998 90 123-45-67")),
        Some("998901234567".to_string())
    );
    assert_eq!(normalize_phone(Some("90-12-34")), None);
    assert_eq!(normalize_phone(None), None);
}
