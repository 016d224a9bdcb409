use serde::{Deserialize, Serialize};

use crate::store::Patient;

pub mod import;

/// query string accepted by the patient list page
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub filter: Option<String>,
    pub search: Option<String>,
}

/// raw form fields from the add and edit pages. everything is a string
/// until [`PatientForm::build`] validates it. serialized back into the
/// template so a failed submission keeps what the user typed
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PatientForm {
    pub patient_id: Option<String>,
    pub gender: Option<String>,
    pub age: Option<String>,
    pub hypertension: Option<String>,
    pub heart_disease: Option<String>,
    pub ever_married: Option<String>,
    pub work_type: Option<String>,
    pub residence_type: Option<String>,
    pub avg_glucose_level: Option<String>,
    pub bmi: Option<String>,
    pub smoking_status: Option<String>,
    pub stroke: Option<String>,
}

fn opt_text(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_owned()).filter(|v| !v.is_empty())
}

fn checkbox(value: &Option<String>) -> bool {
    match value.as_deref().map(str::trim) {
        Some("on") | Some("1") | Some("true") => true,
        _ => false,
    }
}

impl PatientForm {
    /// validates the raw fields into a patient record. the error string
    /// is shown to the user above the re-rendered form
    pub fn build(self, patient_id: i64) -> Result<Patient, String> {
        let age = match opt_text(self.age) {
            Some(given) => match given.parse::<f64>() {
                Ok(parsed) if parsed >= 0.0 => parsed,
                _ => return Err(String::from("age must be a non-negative number")),
            }
            None => return Err(String::from("age is required")),
        };

        let avg_glucose_level = match opt_text(self.avg_glucose_level) {
            Some(given) => match given.parse::<f64>() {
                Ok(parsed) if parsed >= 0.0 => parsed,
                _ => return Err(String::from("average glucose level must be a non-negative number")),
            }
            None => return Err(String::from("average glucose level is required")),
        };

        let bmi = match opt_text(self.bmi) {
            Some(given) => match given.parse::<f64>() {
                Ok(parsed) if parsed > 0.0 => Some(parsed),
                _ => return Err(String::from("bmi must be a positive number or left blank")),
            }
            None => None,
        };

        let smoking_status = opt_text(self.smoking_status)
            .unwrap_or_else(|| String::from("Unknown"));

        Ok(Patient {
            patient_id,
            gender: opt_text(self.gender),
            age,
            hypertension: checkbox(&self.hypertension),
            heart_disease: checkbox(&self.heart_disease),
            ever_married: opt_text(self.ever_married),
            work_type: opt_text(self.work_type),
            residence_type: opt_text(self.residence_type),
            avg_glucose_level,
            bmi,
            smoking_status,
            stroke: checkbox(&self.stroke),
        })
    }
}

impl From<&Patient> for PatientForm {
    fn from(patient: &Patient) -> Self {
        fn flag(value: bool) -> Option<String> {
            value.then(|| String::from("on"))
        }

        PatientForm {
            patient_id: Some(patient.patient_id.to_string()),
            gender: patient.gender.clone(),
            age: Some(patient.age.to_string()),
            hypertension: flag(patient.hypertension),
            heart_disease: flag(patient.heart_disease),
            ever_married: patient.ever_married.clone(),
            work_type: patient.work_type.clone(),
            residence_type: patient.residence_type.clone(),
            avg_glucose_level: Some(patient.avg_glucose_level.to_string()),
            bmi: patient.bmi.map(|v| v.to_string()),
            smoking_status: Some(patient.smoking_status.clone()),
            stroke: flag(patient.stroke),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn filled_form() -> PatientForm {
        PatientForm {
            patient_id: None,
            gender: Some(String::from("Female")),
            age: Some(String::from("61")),
            hypertension: Some(String::from("on")),
            heart_disease: None,
            ever_married: Some(String::from("Yes")),
            work_type: Some(String::from("Private")),
            residence_type: Some(String::from("Urban")),
            avg_glucose_level: Some(String::from("202.21")),
            bmi: Some(String::from("27.3")),
            smoking_status: Some(String::from("never smoked")),
            stroke: Some(String::from("on")),
        }
    }

    #[test]
    fn build_accepts_a_complete_form() {
        let patient = filled_form().build(42).expect("form should validate");

        assert_eq!(patient.patient_id, 42);
        assert_eq!(patient.gender.as_deref(), Some("Female"));
        assert_eq!(patient.age, 61.0);
        assert!(patient.hypertension);
        assert!(!patient.heart_disease);
        assert_eq!(patient.bmi, Some(27.3));
        assert!(patient.stroke);
    }

    #[test]
    fn build_rejects_bad_numbers() {
        let mut form = filled_form();
        form.age = Some(String::from("sixty"));

        assert!(form.build(1).is_err());

        let mut form = filled_form();
        form.avg_glucose_level = Some(String::from("-3"));

        assert!(form.build(1).is_err());
    }

    #[test]
    fn blank_optional_fields_become_defaults() {
        let mut form = filled_form();
        form.bmi = Some(String::from("  "));
        form.smoking_status = None;
        form.gender = Some(String::new());

        let patient = form.build(7).expect("form should validate");

        assert_eq!(patient.bmi, None);
        assert_eq!(patient.smoking_status, "Unknown");
        assert_eq!(patient.gender, None);
    }
}
