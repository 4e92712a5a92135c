use tracing::{info, warn};

use crate::error::{LedgerError, ModelError, Result};
use crate::models::{FeatureVector, Record, Submission};
use crate::scoring::ScoringModel;
use crate::store::RecordStore;

fn score_all<M: ScoringModel>(model: &M, features: &[FeatureVector]) -> Result<Vec<f64>> {
    let scores = model.predict(features)?;
    if scores.len() != features.len() {
        return Err(ModelError::ShapeMismatch {
            expected: features.len(),
            actual: scores.len(),
        }
        .into());
    }
    Ok(scores)
}

/// Scores one validated form entry and appends it under the next free id.
pub async fn submit_manual<S, M>(store: &S, model: &M, submission: Submission) -> Result<Record>
where
    S: RecordStore,
    M: ScoringModel,
{
    let scores = score_all(model, &[submission.features()])?;
    let score = scores[0];
    info!(name = %submission.name, score, "scored submission");

    let row_source = submission.clone();
    let id = store
        .append_with_generated_id(|id| row_source.into_record(id, score).to_row())
        .await
        .map_err(|source| {
            warn!(score, error = %source, "failed to persist submission");
            LedgerError::NotPersisted { score, source }
        })?;

    info!(id, "submission saved");
    Ok(submission.into_record(id, score))
}

/// Scores a parsed upload in one model call, then appends each row in
/// upload order, each under the next free id at the time of its append.
pub async fn submit_batch<S, M>(
    store: &S,
    model: &M,
    submissions: Vec<Submission>,
) -> Result<Vec<Record>>
where
    S: RecordStore,
    M: ScoringModel,
{
    let features: Vec<FeatureVector> = submissions.iter().map(Submission::features).collect();
    let scores = score_all(model, &features)?;
    let total = submissions.len();
    info!(total, "scored upload");

    let mut records = Vec::with_capacity(total);
    for (submission, score) in submissions.into_iter().zip(scores) {
        let row_source = submission.clone();
        let id = store
            .append_with_generated_id(|id| row_source.into_record(id, score).to_row())
            .await
            .map_err(|source| {
                warn!(saved = records.len(), total, error = %source, "upload interrupted");
                LedgerError::BatchInterrupted {
                    saved: records.len(),
                    total,
                    source,
                }
            })?;
        records.push(submission.into_record(id, score));
    }

    info!(saved = records.len(), "upload saved");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::intake::{self, ManualEntry, RECORD_COLUMNS};
    use crate::models::{header_row, LedgerRow};
    use crate::store::MemoryStore;

    /// Score is the sum of the features, easy to check by hand.
    struct SumModel;

    impl ScoringModel for SumModel {
        fn predict(&self, features: &[FeatureVector]) -> std::result::Result<Vec<f64>, ModelError> {
            Ok(features.iter().map(|FeatureVector(v)| v.iter().sum()).collect())
        }
    }

    struct ShortModel;

    impl ScoringModel for ShortModel {
        fn predict(&self, _: &[FeatureVector]) -> std::result::Result<Vec<f64>, ModelError> {
            Ok(Vec::new())
        }
    }

    /// Reads fine, refuses every write.
    struct ReadOnlyStore(MemoryStore);

    impl RecordStore for ReadOnlyStore {
        async fn ensure_header(&self) -> std::result::Result<(), StoreError> {
            self.0.ensure_header().await
        }

        async fn read_all(&self) -> std::result::Result<Vec<LedgerRow>, StoreError> {
            self.0.read_all().await
        }

        async fn append(&self, _: LedgerRow) -> std::result::Result<(), StoreError> {
            Err(denied())
        }

        async fn clear(&self) -> std::result::Result<(), StoreError> {
            Err(denied())
        }

        async fn append_with_generated_id<F>(&self, _: F) -> std::result::Result<u64, StoreError>
        where
            F: FnOnce(u64) -> LedgerRow,
        {
            Err(denied())
        }
    }

    fn denied() -> StoreError {
        StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "sheet is read-only",
        ))
    }

    fn existing(id: u64) -> LedgerRow {
        let submission = sample_entry().validate().expect("valid");
        submission.into_record(id, 10.0).to_row()
    }

    fn sample_entry() -> ManualEntry {
        ManualEntry {
            name: "Rizky".to_string(),
            gender: Some("l".to_string()),
            age: 11,
            grade_level: 5,
            bullying_severity: 4,
            social_support: 6,
            mental_health: 8,
            bullying_category: "Verbal".to_string(),
        }
    }

    fn ids(rows: &[LedgerRow]) -> Vec<String> {
        rows.iter().skip(1).map(|row| row[0].clone()).collect()
    }

    #[tokio::test]
    async fn manual_submission_takes_first_gap() {
        let store = MemoryStore::with_rows(vec![header_row(), existing(1), existing(2), existing(4)]);
        let submission = sample_entry().validate().expect("valid");

        let record = submit_manual(&store, &SumModel, submission).await.expect("submit");
        assert_eq!(record.id, 3);
        assert_eq!(record.predicted_score, 18.0);

        let rows = store.read_all().await.expect("read");
        assert_eq!(ids(&rows), vec!["1", "2", "4", "3"]);
        assert_eq!(rows.last().and_then(|row| crate::models::Record::from_row(row)), Some(record));
    }

    #[tokio::test]
    async fn batch_on_empty_ledger_numbers_in_upload_order() {
        let store = MemoryStore::new();
        store.ensure_header().await.expect("header");
        let csv = "\
Name,Gender,Age,Grade,Bullying Severity,Social Support,Mental Health,Bullying Type
Andi,L,12,6,7,3,4,Fisik
Bella,P,13,7,2,9,8,Verbal
Citra,P,14,8,5,5,5,Cyber
";
        let columns: Vec<String> = RECORD_COLUMNS.iter().map(|c| c.to_string()).collect();
        let submissions = intake::parse_batch(csv.as_bytes(), &columns).expect("parse");

        let records = submit_batch(&store, &SumModel, submissions).await.expect("batch");
        let names: Vec<(u64, &str)> = records.iter().map(|r| (r.id, r.name.as_str())).collect();
        assert_eq!(names, vec![(1, "Andi"), (2, "Bella"), (3, "Citra")]);
        assert_eq!(records[0].predicted_score, 14.0);

        let rows = store.read_all().await.expect("read");
        assert_eq!(ids(&rows), vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn failed_append_keeps_the_score() {
        let store = ReadOnlyStore(MemoryStore::with_rows(vec![header_row()]));
        let submission = sample_entry().validate().expect("valid");

        let err = submit_manual(&store, &SumModel, submission)
            .await
            .expect_err("write must fail");
        match err {
            LedgerError::NotPersisted { score, .. } => assert_eq!(score, 18.0),
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(store.read_all().await.expect("read"), vec![header_row()]);
    }

    #[tokio::test]
    async fn model_shape_mismatch_writes_nothing() {
        let store = MemoryStore::with_rows(vec![header_row()]);
        let submission = sample_entry().validate().expect("valid");

        let err = submit_batch(&store, &ShortModel, vec![submission])
            .await
            .expect_err("no scores");
        assert!(matches!(
            err,
            LedgerError::Model(ModelError::ShapeMismatch { expected: 1, actual: 0 })
        ));
        assert_eq!(store.read_all().await.expect("read").len(), 1);
    }
}
