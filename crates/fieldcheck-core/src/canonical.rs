//! Canonical upstream payloads.
//!
//! Before a submission is pushed, free-form answer values are normalized
//! to a tri-state outcome and folded into an inspection score. The
//! resulting payload is what the gateway stores and what the remote cache
//! mirrors back.

use serde_json::json;

use crate::models::{Answer, FieldKind, Photo, Submission, Template};

/// Tri-state outcome of one scorable answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    NotOk,
    NotApplicable,
}

/// Aggregated inspection score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Score {
    pub ok_count: u32,
    pub not_ok_count: u32,
    /// `round(100 * ok / (ok + not_ok))`; 0 when nothing was scorable
    pub percentage: u32,
}

/// Normalize a raw answer value against the fixed vocabulary.
///
/// Matching is case-insensitive and diacritic-insensitive; anything
/// outside the vocabulary counts as not-applicable.
#[must_use]
pub fn normalize_outcome(raw: &str) -> Outcome {
    let folded: String = raw
        .trim()
        .chars()
        .map(fold_diacritic)
        .collect::<String>()
        .to_lowercase();

    match folded.as_str() {
        "ok" | "approved" | "true" => Outcome::Ok,
        "not ok" | "rejected" | "false" => Outcome::NotOk,
        _ => Outcome::NotApplicable,
    }
}

/// Score the scorable answers of a submission against its template.
///
/// Boolean and choice fields participate; number, text, photo, and
/// signature fields are excluded. Answers for unknown fields are skipped.
#[must_use]
pub fn score_answers(template: &Template, answers: &[Answer]) -> Score {
    let mut ok_count = 0u32;
    let mut not_ok_count = 0u32;

    for answer in answers {
        let Some(field) = template.field(&answer.field_id) else {
            continue;
        };
        if !field.kind.is_scorable() {
            continue;
        }
        match normalize_outcome(&answer.value.as_text()) {
            Outcome::Ok => ok_count += 1,
            Outcome::NotOk => not_ok_count += 1,
            Outcome::NotApplicable => {}
        }
    }

    Score {
        ok_count,
        not_ok_count,
        percentage: percentage(ok_count, not_ok_count),
    }
}

fn percentage(ok_count: u32, not_ok_count: u32) -> u32 {
    let total = ok_count + not_ok_count;
    if total == 0 {
        return 0;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    {
        (100.0 * f64::from(ok_count) / f64::from(total)).round() as u32
    }
}

/// Build the canonical upsert body for a submission, keyed by its client
/// id so retried pushes stay idempotent.
#[must_use]
pub fn canonical_payload(
    submission: &Submission,
    template: &Template,
    photos: &[Photo],
) -> serde_json::Value {
    let score = score_answers(template, &submission.answers);
    let photo_locators: Vec<&str> = photos
        .iter()
        .filter(|photo| photo.submission_id == submission.id)
        .map(|photo| photo.locator.as_str())
        .collect();

    json!({
        "id": submission.id.as_str(),
        "template_id": submission.template_id.as_str(),
        "equipment_code": submission.equipment_code,
        "category": submission.category,
        "submitted_by": submission.submitted_by,
        "answers": submission.answers,
        "notes": submission.notes,
        "signature": submission.signature,
        "executed_at": submission.executed_at,
        "ok_count": score.ok_count,
        "not_ok_count": score.not_ok_count,
        "percentage": score.percentage,
        "photos": photo_locators,
        "created_at": submission.created_at,
    })
}

/// Fold common Latin diacritics so accented variants typed on mobile
/// keyboards still match the vocabulary.
const fn fold_diacritic(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' | 'å' | 'Á' | 'À' | 'Â' | 'Ã' | 'Ä' | 'Å' => 'a',
        'é' | 'è' | 'ê' | 'ë' | 'É' | 'È' | 'Ê' | 'Ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' | 'Í' | 'Ì' | 'Î' | 'Ï' => 'i',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' | 'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' | 'Ú' | 'Ù' | 'Û' | 'Ü' => 'u',
        'ç' | 'Ç' => 'c',
        'ñ' | 'Ñ' => 'n',
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnswerValue, Field, SubmissionId};
    use pretty_assertions::assert_eq;

    fn field(id: &str, kind: FieldKind) -> Field {
        Field {
            id: id.to_string(),
            label: id.to_string(),
            kind,
            required: false,
            choices: Vec::new(),
            order: 0,
        }
    }

    fn answer(field_id: &str, value: &str) -> Answer {
        Answer {
            field_id: field_id.to_string(),
            value: AnswerValue::Text(value.to_string()),
            note: None,
        }
    }

    #[test]
    fn test_vocabulary() {
        assert_eq!(normalize_outcome("ok"), Outcome::Ok);
        assert_eq!(normalize_outcome("Approved"), Outcome::Ok);
        assert_eq!(normalize_outcome("true"), Outcome::Ok);
        assert_eq!(normalize_outcome("not ok"), Outcome::NotOk);
        assert_eq!(normalize_outcome("REJECTED"), Outcome::NotOk);
        assert_eq!(normalize_outcome("false"), Outcome::NotOk);
        assert_eq!(normalize_outcome("n/a"), Outcome::NotApplicable);
        assert_eq!(normalize_outcome("not applicable"), Outcome::NotApplicable);
        assert_eq!(normalize_outcome("whatever"), Outcome::NotApplicable);
    }

    #[test]
    fn test_diacritic_and_case_insensitive() {
        assert_eq!(normalize_outcome("  ÓK "), Outcome::Ok);
        assert_eq!(normalize_outcome("Rejécted"), Outcome::NotOk);
    }

    #[test]
    fn test_percentage_rounding() {
        // [ok, ok, not-ok, n/a] -> 2 ok, 1 not-ok, round(200/3) = 67
        let template = Template::new(
            "eq-1",
            "hydraulic",
            vec![
                field("a", FieldKind::Boolean),
                field("b", FieldKind::Choice),
                field("c", FieldKind::Boolean),
                field("d", FieldKind::Choice),
            ],
        );
        let answers = vec![
            answer("a", "ok"),
            answer("b", "ok"),
            answer("c", "not ok"),
            answer("d", "n/a"),
        ];
        let score = score_answers(&template, &answers);
        assert_eq!(score.ok_count, 2);
        assert_eq!(score.not_ok_count, 1);
        assert_eq!(score.percentage, 67);
    }

    #[test]
    fn test_percentage_zero_when_nothing_scorable() {
        let template = Template::new(
            "eq-1",
            "hydraulic",
            vec![field("n", FieldKind::Number), field("t", FieldKind::Text)],
        );
        let answers = vec![answer("n", "12.5"), answer("t", "ok")];
        let score = score_answers(&template, &answers);
        assert_eq!(score, Score::default());
    }

    #[test]
    fn test_non_scorable_fields_excluded() {
        let template = Template::new(
            "eq-1",
            "hydraulic",
            vec![
                field("bool", FieldKind::Boolean),
                field("num", FieldKind::Number),
            ],
        );
        // "true" on a number field must not count as ok.
        let answers = vec![answer("bool", "true"), answer("num", "true")];
        let score = score_answers(&template, &answers);
        assert_eq!(score.ok_count, 1);
        assert_eq!(score.percentage, 100);
    }

    #[test]
    fn test_canonical_payload_shape() {
        let template = Template::new("eq-1", "hydraulic", vec![field("a", FieldKind::Boolean)]);
        let mut submission = Submission::new(
            template.id,
            "PUMP-1",
            "hydraulic",
            "tech-7",
            vec![answer("a", "ok")],
        );
        submission.notes = Some("left valve weeps".to_string());

        let other_submission = SubmissionId::new();
        let photos = vec![
            Photo::new(submission.id, "photos/one.jpg"),
            Photo::new(other_submission, "photos/other.jpg"),
        ];

        let payload = canonical_payload(&submission, &template, &photos);
        assert_eq!(payload["id"], submission.id.as_str());
        assert_eq!(payload["percentage"], 100);
        assert_eq!(payload["photos"], serde_json::json!(["photos/one.jpg"]));
        assert_eq!(payload["created_at"], submission.created_at);
    }
}
