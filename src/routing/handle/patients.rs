use std::str::FromStr;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use serde::Serialize;

use crate::net::{self, error};
use crate::patients::{ListQuery, PatientForm};
use crate::sec::authn::initiator::Protected;
use crate::state::ArcShared;
use crate::store::{Patient, PatientFilter, PatientStore, StoreError, Summary};

#[derive(Serialize)]
struct ListContext {
    patients: Vec<Patient>,
    filter: Option<&'static str>,
    search: Option<String>,
    warning: Option<String>,
}

#[derive(Serialize)]
struct DetailContext {
    patient: Patient,
}

#[derive(Serialize)]
struct FormContext {
    action: String,
    editing: bool,
    form: PatientForm,
    error: Option<String>,
}

#[derive(Serialize)]
struct DashboardContext {
    summary: Summary,
    heart_yes: i64,
    heart_no: i64,

    /// json blobs handed straight to the chart scripts
    gender_labels: String,
    gender_counts: String,
}

fn not_found() -> error::Error {
    error::Error::new()
        .status(StatusCode::NOT_FOUND)
        .message("no patient record with that id")
}

fn parse_search(given: Option<&str>) -> (Option<i64>, Option<String>) {
    match given {
        Some(given) => match given.parse::<i64>() {
            Ok(id) => (Some(id), None),
            Err(_) => (None, Some(String::from("search needs a numeric patient id"))),
        }
        None => (None, None),
    }
}

pub async fn list(
    State(state): State<ArcShared>,
    Protected(_initiator): Protected,
    Query(query): Query<ListQuery>,
) -> error::Result<Response> {
    let filter = query.filter
        .as_deref()
        .and_then(|given| PatientFilter::from_str(given).ok());

    let trimmed_search = query.search
        .as_deref()
        .map(str::trim)
        .filter(|given| !given.is_empty());

    // a bad search is only worth a warning. the listing still runs
    // with whatever filter was given
    let (search, warning) = parse_search(trimmed_search);

    let patients = state.store().list_patients(filter, search).await?;

    let context = ListContext {
        patients,
        filter: filter.map(|f| f.as_str()),
        search: trimmed_search.map(str::to_owned),
        warning,
    };

    Ok(net::html::render_page(state.templates(), "pages/patients/list", &context)?
        .into_response())
}

pub async fn detail(
    State(state): State<ArcShared>,
    Protected(_initiator): Protected,
    Path(patient_id): Path<i64>,
) -> error::Result<Response> {
    let Some(patient) = state.store().get_patient(patient_id).await? else {
        return Err(not_found());
    };

    let context = DetailContext { patient };

    Ok(net::html::render_page(state.templates(), "pages/patients/detail", &context)?
        .into_response())
}

fn render_form(
    state: &ArcShared,
    context: &FormContext,
) -> error::Result<Response> {
    Ok(net::html::render_page(state.templates(), "pages/patients/form", context)?
        .into_response())
}

pub async fn add(
    State(state): State<ArcShared>,
    Protected(_initiator): Protected,
) -> error::Result<Response> {
    let context = FormContext {
        action: String::from("/patients/add"),
        editing: false,
        form: PatientForm::default(),
        error: None,
    };

    render_form(&state, &context)
}

pub async fn submit_add(
    State(state): State<ArcShared>,
    Protected(_initiator): Protected,
    axum::Form(form): axum::Form<PatientForm>,
) -> error::Result<Response> {
    let context_base = |form: PatientForm, error: String| FormContext {
        action: String::from("/patients/add"),
        editing: false,
        form,
        error: Some(error),
    };

    let patient_id = match form.patient_id
        .as_deref()
        .map(str::trim)
        .filter(|given| !given.is_empty())
        .map(str::parse::<i64>)
    {
        Some(Ok(id)) if id > 0 => id,
        _ => {
            let context = context_base(form, String::from("patient id must be a positive number"));

            return render_form(&state, &context);
        }
    };

    let echo = form.clone();

    let patient = match form.build(patient_id) {
        Ok(patient) => patient,
        Err(message) => {
            let context = context_base(echo, message);

            return render_form(&state, &context);
        }
    };

    match state.store().insert_patient(patient.clone()).await {
        Ok(()) => Ok(Redirect::to(&format!("/patients/{}", patient.patient_id)).into_response()),
        Err(StoreError::DuplicatePatient) => {
            let context = context_base(
                PatientForm::from(&patient),
                String::from("a patient record with that id already exists"),
            );

            render_form(&state, &context)
        }
        Err(err) => Err(err.into()),
    }
}

pub async fn edit(
    State(state): State<ArcShared>,
    Protected(_initiator): Protected,
    Path(patient_id): Path<i64>,
) -> error::Result<Response> {
    let Some(patient) = state.store().get_patient(patient_id).await? else {
        return Err(not_found());
    };

    let context = FormContext {
        action: format!("/patients/{patient_id}/edit"),
        editing: true,
        form: PatientForm::from(&patient),
        error: None,
    };

    render_form(&state, &context)
}

pub async fn submit_edit(
    State(state): State<ArcShared>,
    Protected(_initiator): Protected,
    Path(patient_id): Path<i64>,
    axum::Form(form): axum::Form<PatientForm>,
) -> error::Result<Response> {
    let echo = form.clone();

    let patient = match form.build(patient_id) {
        Ok(patient) => patient,
        Err(message) => {
            let context = FormContext {
                action: format!("/patients/{patient_id}/edit"),
                editing: true,
                form: echo,
                error: Some(message),
            };

            return render_form(&state, &context);
        }
    };

    match state.store().update_patient(patient).await {
        Ok(()) => Ok(Redirect::to(&format!("/patients/{patient_id}")).into_response()),
        Err(StoreError::PatientNotFound) => Err(not_found()),
        Err(err) => Err(err.into()),
    }
}

pub async fn delete(
    State(state): State<ArcShared>,
    Protected(_initiator): Protected,
    Path(patient_id): Path<i64>,
) -> error::Result<Response> {
    if !state.store().delete_patient(patient_id).await? {
        return Err(not_found());
    }

    Ok(Redirect::to("/patients").into_response())
}

pub async fn dashboard(
    State(state): State<ArcShared>,
    Protected(_initiator): Protected,
) -> error::Result<Response> {
    let summary = state.store().patient_summary().await?;

    let gender_labels: Vec<&str> = summary.stroke_by_gender
        .iter()
        .map(|row| row.gender.as_str())
        .collect();
    let gender_counts: Vec<i64> = summary.stroke_by_gender
        .iter()
        .map(|row| row.count)
        .collect();

    let context = DashboardContext {
        heart_yes: summary.heart_yes(),
        heart_no: summary.heart_no(),
        gender_labels: serde_json::to_string(&gender_labels)?,
        gender_counts: serde_json::to_string(&gender_counts)?,
        summary,
    };

    Ok(net::html::render_page(state.templates(), "pages/patients/dashboard", &context)?
        .into_response())
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::store::mem::MemStore;

    fn sample(patient_id: i64, stroke: bool) -> Patient {
        Patient {
            patient_id,
            gender: Some(String::from("Female")),
            age: 61.0,
            hypertension: false,
            heart_disease: false,
            ever_married: Some(String::from("Yes")),
            work_type: Some(String::from("Private")),
            residence_type: Some(String::from("Urban")),
            avg_glucose_level: 120.5,
            bmi: Some(28.1),
            smoking_status: String::from("never smoked"),
            stroke,
        }
    }

    #[test]
    fn search_parsing() {
        assert_eq!(parse_search(None), (None, None));
        assert_eq!(parse_search(Some("31112")), (Some(31112), None));

        let (search, warning) = parse_search(Some("abc"));

        assert_eq!(search, None);
        assert!(warning.is_some());
    }

    #[tokio::test]
    async fn bad_search_still_lists_filtered_patients() {
        let store = MemStore::new();

        store.insert_patient(sample(1, true)).await.unwrap();
        store.insert_patient(sample(2, false)).await.unwrap();
        store.insert_patient(sample(3, true)).await.unwrap();

        let (search, warning) = parse_search(Some("abc"));

        assert!(warning.is_some());

        let found = store.list_patients(Some(PatientFilter::Stroke), search)
            .await
            .unwrap();

        let ids: Vec<i64> = found.iter().map(|p| p.patient_id).collect();

        assert_eq!(ids, vec![1, 3]);
    }
}
