use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use crate::error::{self, Context};
use crate::store::{Patient, PatientStore};

/// one row of the stroke dataset as it appears on disk. the numeric
/// flags and the free-form bmi column are cleaned up in [`clean`]
#[derive(Debug, Deserialize)]
struct CsvRow {
    id: i64,
    gender: String,
    age: f64,
    hypertension: u8,
    heart_disease: u8,
    ever_married: String,
    work_type: String,
    #[serde(rename = "Residence_type")]
    residence_type: String,
    avg_glucose_level: f64,
    bmi: String,
    smoking_status: String,
    stroke: u8,
}

fn opt_text(value: String) -> Option<String> {
    let trimmed = value.trim();

    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_owned())
    }
}

fn clean(row: CsvRow) -> Patient {
    // the dataset writes "N/A" or "Unknown" for a missing bmi
    let bmi = row.bmi.trim().parse::<f64>().ok();

    let smoking_status = opt_text(row.smoking_status)
        .unwrap_or_else(|| String::from("Unknown"));

    Patient {
        patient_id: row.id,
        gender: opt_text(row.gender),
        age: row.age,
        hypertension: row.hypertension != 0,
        heart_disease: row.heart_disease != 0,
        ever_married: opt_text(row.ever_married),
        work_type: opt_text(row.work_type),
        residence_type: opt_text(row.residence_type),
        avg_glucose_level: row.avg_glucose_level,
        bmi,
        smoking_status,
        stroke: row.stroke != 0,
    }
}

#[derive(Debug)]
pub struct ImportReport {
    pub imported: u64,
    pub rejected: usize,
}

/// reads every parseable row out of the dataset, dropping malformed
/// records and repeated patient ids rather than failing the import
pub fn parse_csv<R>(reader: R) -> Result<(Vec<Patient>, usize), csv::Error>
where
    R: Read
{
    let mut rdr = csv::Reader::from_reader(reader);
    let mut seen = HashSet::new();
    let mut patients = Vec::new();
    let mut rejected = 0;

    for result in rdr.deserialize::<CsvRow>() {
        match result {
            Ok(row) => {
                if !seen.insert(row.id) {
                    tracing::warn!("skipping duplicate patient id {}", row.id);

                    rejected += 1;
                    continue;
                }

                patients.push(clean(row));
            }
            Err(err) => {
                tracing::warn!("skipping malformed dataset row: {}", err);

                rejected += 1;
            }
        }
    }

    Ok((patients, rejected))
}

/// loads the dataset into the patient store. a store that already has
/// patients is left untouched so restarting the server never doubles
/// the data
pub async fn import_csv(
    store: &dyn PatientStore,
    path: &Path,
) -> error::Result<Option<ImportReport>> {
    let existing = store.count_patients().await?;

    if existing > 0 {
        tracing::debug!("patient records already present, skipping dataset import");

        return Ok(None);
    }

    let file = std::fs::File::open(path)
        .context(format!("failed to open patient dataset \"{}\"", path.display()))?;

    let (patients, rejected) = parse_csv(file)?;

    let imported = store.insert_patients(patients).await?;

    tracing::info!(
        "imported {} patient records from \"{}\" ({} rejected)",
        imported,
        path.display(),
        rejected
    );

    Ok(Some(ImportReport {
        imported,
        rejected,
    }))
}
