use chrono::{DateTime, NaiveDate, Utc};

use super::domain::{
    ApplicationSubmission, GuardianDetails, NewApplication, ParentDetails, StudentDetails,
};
use crate::identity::ApplicantId;

/// Why a submitted form was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntakeViolation {
    #[error("please fill in all required fields: {}", .0.join(", "))]
    MissingRequired(Vec<&'static str>),
    #[error("date of birth '{0}' is not a valid YYYY-MM-DD date")]
    InvalidDateOfBirth(String),
}

fn required(value: &str) -> String {
    value.trim().to_string()
}

fn optional(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Checks the required fields and builds the row to insert. Photos are attached later.
pub fn validate(
    applicant: ApplicantId,
    form: &ApplicationSubmission,
    submitted_at: DateTime<Utc>,
) -> Result<NewApplication, IntakeViolation> {
    let checks: [(&'static str, &str); 16] = [
        ("first_name", form.first_name.as_str()),
        ("surname", form.surname.as_str()),
        ("nationality", form.nationality.as_str()),
        ("gender", form.gender.as_str()),
        ("date_of_birth", form.date_of_birth.as_str()),
        ("place_of_birth", form.place_of_birth.as_str()),
        ("father_first_name", form.father_first_name.as_str()),
        ("father_last_name", form.father_last_name.as_str()),
        ("father_occupation", form.father_occupation.as_str()),
        ("father_telephone", form.father_telephone.as_str()),
        ("father_address", form.father_address.as_str()),
        ("mother_first_name", form.mother_first_name.as_str()),
        ("mother_last_name", form.mother_last_name.as_str()),
        ("mother_occupation", form.mother_occupation.as_str()),
        ("mother_telephone", form.mother_telephone.as_str()),
        ("mother_address", form.mother_address.as_str()),
    ];
    let missing: Vec<&'static str> = checks
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
        .collect();
    if !missing.is_empty() {
        return Err(IntakeViolation::MissingRequired(missing));
    }

    let raw_dob = form.date_of_birth.trim();
    let date_of_birth = NaiveDate::parse_from_str(raw_dob, "%Y-%m-%d")
        .map_err(|_| IntakeViolation::InvalidDateOfBirth(raw_dob.to_string()))?;

    let student = StudentDetails {
        first_name: required(&form.first_name),
        second_name: optional(&form.second_name),
        surname: required(&form.surname),
        nationality: required(&form.nationality),
        gender: required(&form.gender),
        religion: optional(&form.religion),
        date_of_birth,
        place_of_birth: required(&form.place_of_birth),
    };

    let father = ParentDetails {
        first_name: required(&form.father_first_name),
        second_name: optional(&form.father_second_name),
        last_name: required(&form.father_last_name),
        occupation: required(&form.father_occupation),
        national_id: optional(&form.father_nida),
        telephone: required(&form.father_telephone),
        address: required(&form.father_address),
        street: optional(&form.father_street),
        photo: None,
    };

    let mother = ParentDetails {
        first_name: required(&form.mother_first_name),
        second_name: optional(&form.mother_second_name),
        last_name: required(&form.mother_last_name),
        occupation: required(&form.mother_occupation),
        national_id: optional(&form.mother_nida),
        telephone: required(&form.mother_telephone),
        address: required(&form.mother_address),
        street: optional(&form.mother_street),
        photo: None,
    };

    let guardian = GuardianDetails {
        first_name: optional(&form.guardian_first_name),
        last_name: optional(&form.guardian_last_name),
        occupation: optional(&form.guardian_occupation),
        telephone: optional(&form.guardian_telephone),
        address: optional(&form.guardian_address),
        photo: None,
    };

    Ok(NewApplication {
        applicant_id: applicant,
        student,
        father,
        mother,
        guardian: (!guardian.is_empty()).then_some(guardian),
        submitted_at,
    })
}
