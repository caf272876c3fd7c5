//! Demo cohort used by the operator CLI and integration tests.
//!
//! Every student is written through [`SizingService`], so the seed exercises the same
//! validation and metric derivation as live submissions. Loading twice is harmless:
//! profiles upsert by roll number and manual values upsert by key.

use chrono::NaiveDate;

use tailor_core::domain::student::{Sex, StudentId, StudentInput};
use tailor_core::errors::{SizingError, ValidationError, Violation};
use tailor_core::service::ManualMeasurement;
use tailor_core::store::{SizingStore, SizingTransaction};
use tailor_core::SizingService;

pub struct DemoStudent {
    pub external_id: &'static str,
    pub full_name: &'static str,
    pub class_division: &'static str,
    pub date_of_birth: (i32, u32, u32),
    pub sex: Sex,
    pub height_cm: f64,
    pub weight_kg: f64,
    /// `(garment_type, measurement_name, value_cm)` taken by hand.
    pub manual: &'static [(&'static str, &'static str, f64)],
}

impl DemoStudent {
    pub fn input(&self) -> Result<StudentInput, SizingError> {
        let (year, month, day) = self.date_of_birth;
        let date_of_birth = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
            SizingError::Validation(ValidationError {
                violations: vec![Violation::new(
                    "date_of_birth",
                    format!("{year}-{month}-{day} is not a calendar date"),
                )],
            })
        })?;

        Ok(StudentInput {
            external_id: self.external_id.to_string(),
            full_name: self.full_name.to_string(),
            class_division: self.class_division.to_string(),
            date_of_birth,
            sex: self.sex,
            height_cm: self.height_cm,
            weight_kg: self.weight_kg,
        })
    }
}

pub struct DemoCohort;

impl DemoCohort {
    pub const STUDENTS: &'static [DemoStudent] = &[
        DemoStudent {
            external_id: "DEMO-001",
            full_name: "Arjun Menon",
            class_division: "5-A",
            date_of_birth: (2016, 3, 14),
            sex: Sex::Male,
            height_cm: 140.0,
            weight_kg: 35.0,
            manual: &[("shirt", "chest", 72.0), ("shirt", "sleeve", 44.5), ("pant", "waist", 62.0)],
        },
        DemoStudent {
            external_id: "DEMO-002",
            full_name: "Kabir Shah",
            class_division: "5-B",
            date_of_birth: (2016, 9, 2),
            sex: Sex::Male,
            height_cm: 131.0,
            weight_kg: 28.0,
            manual: &[("shirt", "chest", 66.0), ("pant", "waist", 56.5)],
        },
        DemoStudent {
            external_id: "DEMO-003",
            full_name: "Ira Kulkarni",
            class_division: "6-A",
            date_of_birth: (2015, 1, 20),
            sex: Sex::Female,
            height_cm: 146.0,
            weight_kg: 38.0,
            manual: &[("tunic", "bust", 74.0), ("tunic", "length", 78.0), ("skirt", "waist", 60.0)],
        },
        DemoStudent {
            external_id: "DEMO-004",
            full_name: "Sara Thomas",
            class_division: "3-C",
            date_of_birth: (2018, 7, 11),
            sex: Sex::Female,
            height_cm: 122.0,
            weight_kg: 22.5,
            manual: &[("tunic", "bust", 60.0), ("skirt", "waist", 52.0)],
        },
        DemoStudent {
            external_id: "DEMO-005",
            full_name: "Dev Rao",
            class_division: "5-A",
            date_of_birth: (2016, 5, 30),
            sex: Sex::Male,
            height_cm: 142.0,
            weight_kg: 36.0,
            manual: &[],
        },
    ];

    pub async fn load<S: SizingStore>(
        service: &SizingService<S>,
    ) -> Result<SeedResult, SizingError> {
        let mut seeded = Vec::with_capacity(Self::STUDENTS.len());

        for student in Self::STUDENTS {
            let profile = service.register_student(student.input()?).await?;
            for (garment_type, measurement_name, value_cm) in student.manual {
                service
                    .record_manual_measurement(ManualMeasurement {
                        student_id: profile.id,
                        garment_type: (*garment_type).to_string(),
                        measurement_name: (*measurement_name).to_string(),
                        value_cm: *value_cm,
                        recorded_by: Some("demo-seed".to_string()),
                    })
                    .await?;
            }
            seeded.push(SeededStudent {
                external_id: student.external_id,
                student_id: profile.id,
                manual_measurements: student.manual.len(),
            });
        }

        Ok(SeedResult { students: seeded })
    }

    pub async fn verify<S: SizingStore>(store: &S) -> Result<VerificationResult, SizingError> {
        let mut tx = store.begin().await?;
        let mut checks = Vec::with_capacity(Self::STUDENTS.len());

        for student in Self::STUDENTS {
            let present = match tx.get_profile_by_external_id(student.external_id).await? {
                Some(profile) => {
                    let manual = tx.get_manual_measurements(profile.id).await?;
                    manual.len() == student.manual.len()
                }
                None => false,
            };
            checks.push((student.external_id, present));
        }

        Ok(VerificationResult { all_present: checks.iter().all(|(_, ok)| *ok), checks })
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct SeedResult {
    pub students: Vec<SeededStudent>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct SeededStudent {
    pub external_id: &'static str,
    pub student_id: StudentId,
    pub manual_measurements: usize,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
