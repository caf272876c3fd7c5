use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::types::Json;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, Transaction};

use tailor_core::autofill::CandidateFilter;
use tailor_core::domain::accuracy::{AccuracyLogEntry, BiasAdjustment, ErrorDirection};
use tailor_core::domain::feedback::{FeedbackSource, FitFeedback, FitIssue, FitRating};
use tailor_core::domain::measurement::{
    AutofillRecord, MeasurementKey, MeasurementMethod, MeasurementRecord,
};
use tailor_core::domain::sizing::{
    CmRange, FitPreference, RecommendationMethod, SizeAlternative, SizeChartEntry, SizeCode,
    SizeRecommendation, SizeRecommendationRecord,
};
use tailor_core::domain::student::{
    BodyMetrics, NewStudentProfile, ProfileSummary, Sex, StudentId, StudentProfile,
};
use tailor_core::errors::StoreError;
use tailor_core::store::{SizingStore, SizingTransaction};

use super::RepositoryError;
use crate::DbPool;

const PROFILE_COLUMNS: &str = "id, external_id, full_name, class_division, date_of_birth, gender,
    height_cm, weight_kg, age, bmi, ponderal_index, height_percentile, weight_percentile, gpi,
    bpc, recommended_size, created_at, updated_at";

const MEASUREMENT_COLUMNS: &str = "student_id, garment_type, measurement_name, value_cm, method,
    confidence, source_student_id, recorded_by, updated_at";

const AUTOFILL_COLUMNS: &str = "student_id, garment_type, measurement_name, value_cm,
    raw_value_cm, bias_applied_cm, confidence, source_student_id, similarity_score, created_at";

const FEEDBACK_COLUMNS: &str = "id, student_id, garment_type, size_code, fit_rating,
    specific_issues, satisfaction_score, comment, source, responded_by, recorded_at";

const ACCURACY_COLUMNS: &str = "id, student_id, garment_type, measurement_name, manual_value_cm,
    autofill_value_cm, signed_difference, percentage_difference, direction, recorded_at";

#[derive(Clone)]
pub struct SqlSizingStore {
    pool: DbPool,
}

impl SqlSizingStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SizingStore for SqlSizingStore {
    type Tx = SqlSizingTransaction;

    /// Takes the write lock up front. A deferred transaction that reads first cannot upgrade
    /// to a writer while another writer is active, and SQLite fails it without waiting out
    /// the busy timeout.
    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let tx = self.pool.begin_with("BEGIN IMMEDIATE").await.map_err(RepositoryError::from)?;
        Ok(SqlSizingTransaction { tx })
    }
}

/// Wraps a pooled SQLite transaction. sqlx rolls it back when dropped uncommitted.
pub struct SqlSizingTransaction {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl SizingTransaction for SqlSizingTransaction {
    async fn upsert_profile(
        &mut self,
        profile: &NewStudentProfile,
    ) -> Result<StudentProfile, StoreError> {
        Ok(upsert_profile(&mut self.tx, profile).await?)
    }

    async fn get_profile(&mut self, id: StudentId) -> Result<Option<StudentProfile>, StoreError> {
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM student_profile WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id.0)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(RepositoryError::from)?;
        Ok(row.map(profile_from_row).transpose()?)
    }

    async fn get_profile_by_external_id(
        &mut self,
        external_id: &str,
    ) -> Result<Option<StudentProfile>, StoreError> {
        Ok(select_profile_by_external_id(&mut self.tx, external_id).await?)
    }

    async fn set_recommended_size(
        &mut self,
        id: StudentId,
        size_code: SizeCode,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE student_profile SET recommended_size = ?, updated_at = ? WHERE id = ?",
        )
        .bind(size_code.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(id.0)
        .execute(&mut *self.tx)
        .await
        .map_err(RepositoryError::from)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("student profile {id}")).into());
        }
        Ok(())
    }

    async fn delete_profile(&mut self, id: StudentId) -> Result<bool, StoreError> {
        let rows = sqlx::query(
            "SELECT DISTINCT garment_type, measurement_name
             FROM accuracy_log
             WHERE student_id = ?",
        )
        .bind(id.0)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(RepositoryError::from)?;
        let logged_keys = rows.iter().map(key_from_row).collect::<Result<Vec<_>, _>>()?;

        let result = sqlx::query("DELETE FROM student_profile WHERE id = ?")
            .bind(id.0)
            .execute(&mut *self.tx)
            .await
            .map_err(RepositoryError::from)?;

        // The cascade removed this student's log rows; the aggregates must follow.
        let now = Utc::now();
        for key in &logged_keys {
            recompute_bias(&mut self.tx, key, now).await?;
        }
        Ok(result.rows_affected() > 0)
    }

    async fn find_candidate_profiles(
        &mut self,
        filter: &CandidateFilter,
    ) -> Result<Vec<ProfileSummary>, StoreError> {
        Ok(find_candidates(&mut self.tx, filter).await?)
    }

    async fn get_manual_measurements(
        &mut self,
        student_id: StudentId,
    ) -> Result<Vec<(MeasurementKey, f64)>, StoreError> {
        let rows = sqlx::query(
            "SELECT garment_type, measurement_name, value_cm
             FROM measurement
             WHERE student_id = ? AND method = 'manual'
             ORDER BY garment_type, measurement_name",
        )
        .bind(student_id.0)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(RepositoryError::from)?;

        let values = rows
            .into_iter()
            .map(|row| -> Result<(MeasurementKey, f64), RepositoryError> {
                Ok((key_from_row(&row)?, row.try_get("value_cm")?))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(values)
    }

    async fn list_measurements(
        &mut self,
        student_id: StudentId,
    ) -> Result<Vec<MeasurementRecord>, StoreError> {
        let sql = format!(
            "SELECT {MEASUREMENT_COLUMNS} FROM measurement
             WHERE student_id = ?
             ORDER BY garment_type, measurement_name"
        );
        let rows = sqlx::query(&sql)
            .bind(student_id.0)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(RepositoryError::from)?;
        Ok(rows.into_iter().map(measurement_from_row).collect::<Result<Vec<_>, _>>()?)
    }

    async fn get_measurement(
        &mut self,
        student_id: StudentId,
        key: &MeasurementKey,
    ) -> Result<Option<MeasurementRecord>, StoreError> {
        let sql = format!(
            "SELECT {MEASUREMENT_COLUMNS} FROM measurement
             WHERE student_id = ? AND garment_type = ? AND measurement_name = ?"
        );
        let row = sqlx::query(&sql)
            .bind(student_id.0)
            .bind(&key.garment_type)
            .bind(&key.measurement_name)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(RepositoryError::from)?;
        Ok(row.map(measurement_from_row).transpose()?)
    }

    async fn upsert_measurement(&mut self, record: &MeasurementRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO measurement (
                student_id, garment_type, measurement_name, value_cm, method,
                confidence, source_student_id, recorded_by, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(student_id, garment_type, measurement_name) DO UPDATE SET
                value_cm = excluded.value_cm,
                method = excluded.method,
                confidence = excluded.confidence,
                source_student_id = excluded.source_student_id,
                recorded_by = excluded.recorded_by,
                updated_at = excluded.updated_at",
        )
        .bind(record.student_id.0)
        .bind(&record.key.garment_type)
        .bind(&record.key.measurement_name)
        .bind(record.value_cm)
        .bind(record.method.as_str())
        .bind(record.confidence)
        .bind(record.source_student_id.map(|id| id.0))
        .bind(&record.recorded_by)
        .bind(record.updated_at.to_rfc3339())
        .execute(&mut *self.tx)
        .await
        .map_err(RepositoryError::from)?;

        Ok(())
    }

    async fn get_autofill_record(
        &mut self,
        student_id: StudentId,
        key: &MeasurementKey,
    ) -> Result<Option<AutofillRecord>, StoreError> {
        let sql = format!(
            "SELECT {AUTOFILL_COLUMNS} FROM autofill_record
             WHERE student_id = ? AND garment_type = ? AND measurement_name = ?"
        );
        let row = sqlx::query(&sql)
            .bind(student_id.0)
            .bind(&key.garment_type)
            .bind(&key.measurement_name)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(RepositoryError::from)?;
        Ok(row.map(autofill_from_row).transpose()?)
    }

    async fn upsert_autofill(&mut self, record: &AutofillRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO autofill_record (
                student_id, garment_type, measurement_name, value_cm, raw_value_cm,
                bias_applied_cm, confidence, source_student_id, similarity_score, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(student_id, garment_type, measurement_name) DO UPDATE SET
                value_cm = excluded.value_cm,
                raw_value_cm = excluded.raw_value_cm,
                bias_applied_cm = excluded.bias_applied_cm,
                confidence = excluded.confidence,
                source_student_id = excluded.source_student_id,
                similarity_score = excluded.similarity_score,
                created_at = excluded.created_at",
        )
        .bind(record.student_id.0)
        .bind(&record.key.garment_type)
        .bind(&record.key.measurement_name)
        .bind(record.value_cm)
        .bind(record.raw_value_cm)
        .bind(record.bias_applied_cm)
        .bind(record.confidence)
        .bind(record.source_student_id.0)
        .bind(record.similarity_score)
        .bind(record.created_at.to_rfc3339())
        .execute(&mut *self.tx)
        .await
        .map_err(RepositoryError::from)?;

        Ok(())
    }

    async fn get_bias_adjustment(
        &mut self,
        key: &MeasurementKey,
    ) -> Result<Option<BiasAdjustment>, StoreError> {
        Ok(select_bias(&mut self.tx, key).await?)
    }

    async fn list_bias_adjustments(&mut self) -> Result<Vec<BiasAdjustment>, StoreError> {
        let rows = sqlx::query(
            "SELECT garment_type, measurement_name, avg_error, sample_count, updated_at
             FROM bias_adjustment
             ORDER BY garment_type, measurement_name",
        )
        .fetch_all(&mut *self.tx)
        .await
        .map_err(RepositoryError::from)?;
        Ok(rows.into_iter().map(bias_from_row).collect::<Result<Vec<_>, _>>()?)
    }

    async fn append_accuracy_log(&mut self, entry: &AccuracyLogEntry) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO accuracy_log (
                id, student_id, garment_type, measurement_name, manual_value_cm,
                autofill_value_cm, signed_difference, percentage_difference, direction, recorded_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.id)
        .bind(entry.student_id.0)
        .bind(&entry.key.garment_type)
        .bind(&entry.key.measurement_name)
        .bind(entry.manual_value_cm)
        .bind(entry.autofill_value_cm)
        .bind(entry.signed_difference)
        .bind(entry.percentage_difference)
        .bind(entry.direction.as_str())
        .bind(entry.recorded_at.to_rfc3339())
        .execute(&mut *self.tx)
        .await
        .map_err(RepositoryError::from)?;

        Ok(())
    }

    async fn list_accuracy_log(
        &mut self,
        key: &MeasurementKey,
    ) -> Result<Vec<AccuracyLogEntry>, StoreError> {
        let sql = format!(
            "SELECT {ACCURACY_COLUMNS} FROM accuracy_log
             WHERE garment_type = ? AND measurement_name = ?
             ORDER BY recorded_at, rowid"
        );
        let rows = sqlx::query(&sql)
            .bind(&key.garment_type)
            .bind(&key.measurement_name)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(RepositoryError::from)?;
        Ok(rows.into_iter().map(accuracy_from_row).collect::<Result<Vec<_>, _>>()?)
    }

    async fn recompute_bias_adjustment(
        &mut self,
        key: &MeasurementKey,
        updated_at: DateTime<Utc>,
    ) -> Result<BiasAdjustment, StoreError> {
        recompute_bias(&mut self.tx, key, updated_at).await?;
        select_bias(&mut self.tx, key)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("bias adjustment for {key}")))
    }

    async fn get_size_chart_entry(
        &mut self,
        gender: Sex,
        size_code: SizeCode,
    ) -> Result<Option<SizeChartEntry>, StoreError> {
        let row = sqlx::query(
            "SELECT gender, size_code, size_name,
                    height_min_cm, height_max_cm, weight_min_kg, weight_max_kg,
                    chest_min_cm, chest_max_cm, bust_min_cm, bust_max_cm,
                    waist_min_cm, waist_max_cm, hip_min_cm, hip_max_cm
             FROM size_chart
             WHERE gender = ? AND size_code = ?
             LIMIT 1",
        )
        .bind(gender.as_str())
        .bind(size_code.as_str())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(RepositoryError::from)?;
        Ok(row.map(chart_entry_from_row).transpose()?)
    }

    async fn append_size_recommendation(
        &mut self,
        record: &SizeRecommendationRecord,
    ) -> Result<(), StoreError> {
        let recommendation = &record.recommendation;
        sqlx::query(
            "INSERT INTO size_recommendation_history (
                student_id, size_code, size_name, confidence, method_used, reasoning,
                defaulted, fit_preference, alternatives, recorded_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.student_id.0)
        .bind(recommendation.size_code.as_str())
        .bind(&recommendation.size_name)
        .bind(recommendation.confidence)
        .bind(recommendation.method_used.as_str())
        .bind(&recommendation.reasoning)
        .bind(i64::from(recommendation.defaulted))
        .bind(recommendation.fit_preference.as_str())
        .bind(Json(&recommendation.alternatives))
        .bind(record.recorded_at.to_rfc3339())
        .execute(&mut *self.tx)
        .await
        .map_err(RepositoryError::from)?;

        Ok(())
    }

    async fn list_size_recommendations(
        &mut self,
        student_id: StudentId,
    ) -> Result<Vec<SizeRecommendationRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT student_id, size_code, size_name, confidence, method_used, reasoning,
                    defaulted, fit_preference, alternatives, recorded_at
             FROM size_recommendation_history
             WHERE student_id = ?
             ORDER BY recorded_at, id",
        )
        .bind(student_id.0)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(RepositoryError::from)?;
        Ok(rows.into_iter().map(recommendation_from_row).collect::<Result<Vec<_>, _>>()?)
    }

    async fn append_fit_feedback(&mut self, feedback: &FitFeedback) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO fit_feedback (
                id, student_id, garment_type, size_code, fit_rating, specific_issues,
                satisfaction_score, comment, source, responded_by, recorded_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&feedback.id)
        .bind(feedback.student_id.0)
        .bind(&feedback.garment_type)
        .bind(feedback.size_code.map(|code| code.as_str()))
        .bind(feedback.fit_rating.as_str())
        .bind(Json(&feedback.specific_issues))
        .bind(i64::from(feedback.satisfaction_score))
        .bind(&feedback.comment)
        .bind(feedback.source.as_str())
        .bind(&feedback.responded_by)
        .bind(feedback.recorded_at.to_rfc3339())
        .execute(&mut *self.tx)
        .await
        .map_err(RepositoryError::from)?;

        Ok(())
    }

    async fn list_fit_feedback(
        &mut self,
        student_id: StudentId,
    ) -> Result<Vec<FitFeedback>, StoreError> {
        let sql = format!(
            "SELECT {FEEDBACK_COLUMNS} FROM fit_feedback
             WHERE student_id = ?
             ORDER BY recorded_at, rowid"
        );
        let rows = sqlx::query(&sql)
            .bind(student_id.0)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(RepositoryError::from)?;
        Ok(rows.into_iter().map(feedback_from_row).collect::<Result<Vec<_>, _>>()?)
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(RepositoryError::from)?;
        Ok(())
    }
}

async fn upsert_profile(
    conn: &mut SqliteConnection,
    profile: &NewStudentProfile,
) -> Result<StudentProfile, RepositoryError> {
    let input = &profile.input;
    let metrics = &profile.metrics;
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        "INSERT INTO student_profile (
            external_id, full_name, class_division, date_of_birth, gender, height_cm, weight_kg,
            age, bmi, ponderal_index, height_percentile, weight_percentile, gpi, bpc,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(external_id) DO UPDATE SET
            full_name = excluded.full_name,
            class_division = excluded.class_division,
            date_of_birth = excluded.date_of_birth,
            gender = excluded.gender,
            height_cm = excluded.height_cm,
            weight_kg = excluded.weight_kg,
            age = excluded.age,
            bmi = excluded.bmi,
            ponderal_index = excluded.ponderal_index,
            height_percentile = excluded.height_percentile,
            weight_percentile = excluded.weight_percentile,
            gpi = excluded.gpi,
            bpc = excluded.bpc,
            updated_at = excluded.updated_at",
    )
    .bind(&input.external_id)
    .bind(&input.full_name)
    .bind(&input.class_division)
    .bind(input.date_of_birth.to_string())
    .bind(input.sex.as_str())
    .bind(input.height_cm)
    .bind(input.weight_kg)
    .bind(i64::from(metrics.age))
    .bind(metrics.bmi)
    .bind(metrics.ponderal_index)
    .bind(metrics.height_percentile.map(i64::from))
    .bind(metrics.weight_percentile.map(i64::from))
    .bind(metrics.gpi)
    .bind(metrics.bpc)
    .bind(&now)
    .bind(&now)
    .execute(&mut *conn)
    .await?;

    select_profile_by_external_id(conn, &input.external_id)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("student `{}`", input.external_id)))
}

async fn select_profile_by_external_id(
    conn: &mut SqliteConnection,
    external_id: &str,
) -> Result<Option<StudentProfile>, RepositoryError> {
    let sql = format!("SELECT {PROFILE_COLUMNS} FROM student_profile WHERE external_id = ?");
    let row = sqlx::query(&sql).bind(external_id).fetch_optional(&mut *conn).await?;
    row.map(profile_from_row).transpose()
}

async fn find_candidates(
    conn: &mut SqliteConnection,
    filter: &CandidateFilter,
) -> Result<Vec<ProfileSummary>, RepositoryError> {
    let mut query = QueryBuilder::<Sqlite>::new(
        "SELECT sp.id, sp.gender, sp.height_cm, sp.weight_kg, sp.bmi, sp.age, sp.bpc
         FROM student_profile sp
         WHERE sp.gender = ",
    );
    query.push_bind(filter.sex.as_str());
    query.push(" AND sp.id <> ").push_bind(filter.exclude_student_id.0);
    query
        .push(" AND sp.height_cm BETWEEN ")
        .push_bind(filter.height_cm.min)
        .push(" AND ")
        .push_bind(filter.height_cm.max);
    query
        .push(" AND sp.weight_kg BETWEEN ")
        .push_bind(filter.weight_kg.min)
        .push(" AND ")
        .push_bind(filter.weight_kg.max);
    query
        .push(" AND sp.bmi BETWEEN ")
        .push_bind(filter.bmi.min)
        .push(" AND ")
        .push_bind(filter.bmi.max);
    query
        .push(" AND sp.age BETWEEN ")
        .push_bind(i64::from(filter.min_age))
        .push(" AND ")
        .push_bind(i64::from(filter.max_age));
    if let Some(bpc) = filter.bpc {
        query.push(" AND sp.bpc BETWEEN ").push_bind(bpc.min).push(" AND ").push_bind(bpc.max);
    }
    query.push(
        " AND EXISTS (
            SELECT 1 FROM measurement m
            WHERE m.student_id = sp.id AND m.method = 'manual'
        )
        ORDER BY sp.id",
    );

    let rows = query.build().fetch_all(&mut *conn).await?;
    rows.into_iter().map(summary_from_row).collect()
}

/// Rebuilds one aggregate from the log. A key with no log rows left loses its row.
async fn recompute_bias(
    conn: &mut SqliteConnection,
    key: &MeasurementKey,
    updated_at: DateTime<Utc>,
) -> Result<(), RepositoryError> {
    // One statement, so the aggregate is computed under the write lock the log insert took.
    sqlx::query(
        "INSERT INTO bias_adjustment (
            garment_type, measurement_name, avg_error, sample_count, updated_at
        )
        SELECT ?, ?, AVG(signed_difference), COUNT(*), ?
        FROM accuracy_log
        WHERE garment_type = ? AND measurement_name = ?
        GROUP BY garment_type, measurement_name
        ON CONFLICT(garment_type, measurement_name) DO UPDATE SET
            avg_error = excluded.avg_error,
            sample_count = excluded.sample_count,
            updated_at = excluded.updated_at",
    )
    .bind(&key.garment_type)
    .bind(&key.measurement_name)
    .bind(updated_at.to_rfc3339())
    .bind(&key.garment_type)
    .bind(&key.measurement_name)
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        "DELETE FROM bias_adjustment
         WHERE garment_type = ? AND measurement_name = ?
           AND NOT EXISTS (
               SELECT 1 FROM accuracy_log
               WHERE garment_type = ? AND measurement_name = ?
           )",
    )
    .bind(&key.garment_type)
    .bind(&key.measurement_name)
    .bind(&key.garment_type)
    .bind(&key.measurement_name)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn select_bias(
    conn: &mut SqliteConnection,
    key: &MeasurementKey,
) -> Result<Option<BiasAdjustment>, RepositoryError> {
    let row = sqlx::query(
        "SELECT garment_type, measurement_name, avg_error, sample_count, updated_at
         FROM bias_adjustment
         WHERE garment_type = ? AND measurement_name = ?",
    )
    .bind(&key.garment_type)
    .bind(&key.measurement_name)
    .fetch_optional(&mut *conn)
    .await?;
    row.map(bias_from_row).transpose()
}

fn profile_from_row(row: SqliteRow) -> Result<StudentProfile, RepositoryError> {
    let recommended_size = row
        .try_get::<Option<String>, _>("recommended_size")?
        .map(|value| parse_size_code("recommended_size", &value))
        .transpose()?;

    Ok(StudentProfile {
        id: StudentId(row.try_get("id")?),
        external_id: row.try_get("external_id")?,
        full_name: row.try_get("full_name")?,
        class_division: row.try_get("class_division")?,
        date_of_birth: parse_date("date_of_birth", row.try_get("date_of_birth")?)?,
        sex: parse_sex(&row.try_get::<String, _>("gender")?)?,
        height_cm: row.try_get("height_cm")?,
        weight_kg: row.try_get("weight_kg")?,
        metrics: BodyMetrics {
            age: parse_u32("age", row.try_get("age")?)?,
            bmi: row.try_get("bmi")?,
            ponderal_index: row.try_get("ponderal_index")?,
            height_percentile: parse_percentile(
                "height_percentile",
                row.try_get("height_percentile")?,
            )?,
            weight_percentile: parse_percentile(
                "weight_percentile",
                row.try_get("weight_percentile")?,
            )?,
            gpi: row.try_get("gpi")?,
            bpc: row.try_get("bpc")?,
        },
        recommended_size,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn summary_from_row(row: SqliteRow) -> Result<ProfileSummary, RepositoryError> {
    Ok(ProfileSummary {
        id: StudentId(row.try_get("id")?),
        sex: parse_sex(&row.try_get::<String, _>("gender")?)?,
        height_cm: row.try_get("height_cm")?,
        weight_kg: row.try_get("weight_kg")?,
        bmi: row.try_get("bmi")?,
        age: parse_u32("age", row.try_get("age")?)?,
        bpc: row.try_get("bpc")?,
    })
}

fn key_from_row(row: &SqliteRow) -> Result<MeasurementKey, RepositoryError> {
    Ok(MeasurementKey {
        garment_type: row.try_get("garment_type")?,
        measurement_name: row.try_get("measurement_name")?,
    })
}

fn measurement_from_row(row: SqliteRow) -> Result<MeasurementRecord, RepositoryError> {
    let method_raw = row.try_get::<String, _>("method")?;
    let method = MeasurementMethod::parse(&method_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown measurement method `{method_raw}`"))
    })?;

    Ok(MeasurementRecord {
        student_id: StudentId(row.try_get("student_id")?),
        key: key_from_row(&row)?,
        value_cm: row.try_get("value_cm")?,
        method,
        confidence: row.try_get("confidence")?,
        source_student_id: row.try_get::<Option<i64>, _>("source_student_id")?.map(StudentId),
        recorded_by: row.try_get("recorded_by")?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn autofill_from_row(row: SqliteRow) -> Result<AutofillRecord, RepositoryError> {
    Ok(AutofillRecord {
        student_id: StudentId(row.try_get("student_id")?),
        key: key_from_row(&row)?,
        value_cm: row.try_get("value_cm")?,
        raw_value_cm: row.try_get("raw_value_cm")?,
        bias_applied_cm: row.try_get("bias_applied_cm")?,
        confidence: row.try_get("confidence")?,
        source_student_id: StudentId(row.try_get("source_student_id")?),
        similarity_score: row.try_get("similarity_score")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn accuracy_from_row(row: SqliteRow) -> Result<AccuracyLogEntry, RepositoryError> {
    let direction_raw = row.try_get::<String, _>("direction")?;
    let direction = ErrorDirection::parse(&direction_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown error direction `{direction_raw}`"))
    })?;

    Ok(AccuracyLogEntry {
        id: row.try_get("id")?,
        student_id: StudentId(row.try_get("student_id")?),
        key: key_from_row(&row)?,
        manual_value_cm: row.try_get("manual_value_cm")?,
        autofill_value_cm: row.try_get("autofill_value_cm")?,
        signed_difference: row.try_get("signed_difference")?,
        percentage_difference: row.try_get("percentage_difference")?,
        direction,
        recorded_at: parse_timestamp("recorded_at", row.try_get("recorded_at")?)?,
    })
}

fn bias_from_row(row: SqliteRow) -> Result<BiasAdjustment, RepositoryError> {
    Ok(BiasAdjustment {
        key: key_from_row(&row)?,
        avg_error: row.try_get("avg_error")?,
        sample_count: parse_u32("sample_count", row.try_get("sample_count")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn chart_entry_from_row(row: SqliteRow) -> Result<SizeChartEntry, RepositoryError> {
    Ok(SizeChartEntry {
        gender: parse_sex(&row.try_get::<String, _>("gender")?)?,
        size_code: parse_size_code("size_code", &row.try_get::<String, _>("size_code")?)?,
        size_name: row.try_get("size_name")?,
        height_cm: CmRange {
            min: row.try_get("height_min_cm")?,
            max: row.try_get("height_max_cm")?,
        },
        weight_kg: CmRange {
            min: row.try_get("weight_min_kg")?,
            max: row.try_get("weight_max_kg")?,
        },
        chest_cm: optional_range(&row, "chest_min_cm", "chest_max_cm")?,
        bust_cm: optional_range(&row, "bust_min_cm", "bust_max_cm")?,
        waist_cm: optional_range(&row, "waist_min_cm", "waist_max_cm")?,
        hip_cm: optional_range(&row, "hip_min_cm", "hip_max_cm")?,
    })
}

fn recommendation_from_row(row: SqliteRow) -> Result<SizeRecommendationRecord, RepositoryError> {
    let method_raw = row.try_get::<String, _>("method_used")?;
    let method_used = RecommendationMethod::parse(&method_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown recommendation method `{method_raw}`"))
    })?;
    let fit_raw = row.try_get::<String, _>("fit_preference")?;
    let fit_preference = FitPreference::parse(&fit_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown fit preference `{fit_raw}`")))?;

    Ok(SizeRecommendationRecord {
        student_id: StudentId(row.try_get("student_id")?),
        recommendation: SizeRecommendation {
            size_code: parse_size_code("size_code", &row.try_get::<String, _>("size_code")?)?,
            size_name: row.try_get("size_name")?,
            confidence: row.try_get("confidence")?,
            method_used,
            reasoning: row.try_get("reasoning")?,
            defaulted: row.try_get::<i64, _>("defaulted")? != 0,
            fit_preference,
            alternatives: row.try_get::<Json<Vec<SizeAlternative>>, _>("alternatives")?.0,
        },
        recorded_at: parse_timestamp("recorded_at", row.try_get("recorded_at")?)?,
    })
}

fn feedback_from_row(row: SqliteRow) -> Result<FitFeedback, RepositoryError> {
    let rating_raw = row.try_get::<String, _>("fit_rating")?;
    let fit_rating = FitRating::parse(&rating_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown fit rating `{rating_raw}`")))?;
    let source_raw = row.try_get::<String, _>("source")?;
    let source = FeedbackSource::parse(&source_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown feedback source `{source_raw}`")))?;
    let score = row.try_get::<i64, _>("satisfaction_score")?;
    let satisfaction_score = u8::try_from(score).map_err(|_| {
        RepositoryError::Decode(format!("satisfaction_score out of range: {score}"))
    })?;

    Ok(FitFeedback {
        id: row.try_get("id")?,
        student_id: StudentId(row.try_get("student_id")?),
        garment_type: row.try_get("garment_type")?,
        size_code: row
            .try_get::<Option<String>, _>("size_code")?
            .map(|value| parse_size_code("size_code", &value))
            .transpose()?,
        fit_rating,
        specific_issues: row.try_get::<Json<Vec<FitIssue>>, _>("specific_issues")?.0,
        satisfaction_score,
        comment: row.try_get("comment")?,
        source,
        responded_by: row.try_get("responded_by")?,
        recorded_at: parse_timestamp("recorded_at", row.try_get("recorded_at")?)?,
    })
}

fn optional_range(
    row: &SqliteRow,
    min_column: &str,
    max_column: &str,
) -> Result<Option<CmRange>, RepositoryError> {
    let min = row.try_get::<Option<f64>, _>(min_column)?;
    let max = row.try_get::<Option<f64>, _>(max_column)?;
    Ok(min.zip(max).map(|(min, max)| CmRange { min, max }))
}

fn parse_sex(value: &str) -> Result<Sex, RepositoryError> {
    Sex::parse(value).ok_or_else(|| RepositoryError::Decode(format!("unknown gender `{value}`")))
}

fn parse_size_code(column: &str, value: &str) -> Result<SizeCode, RepositoryError> {
    SizeCode::parse(value)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown size code in `{column}`: `{value}`")))
}

fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

fn parse_percentile(column: &str, value: Option<i64>) -> Result<Option<u8>, RepositoryError> {
    value
        .map(|percentile| {
            u8::try_from(percentile).map_err(|_| {
                RepositoryError::Decode(format!("invalid percentile in `{column}`: {percentile}"))
            })
        })
        .transpose()
}

fn parse_date(column: &str, value: String) -> Result<NaiveDate, RepositoryError> {
    NaiveDate::parse_from_str(&value, "%Y-%m-%d").map_err(|error| {
        RepositoryError::Decode(format!("invalid date in `{column}`: `{value}` ({error})"))
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}
