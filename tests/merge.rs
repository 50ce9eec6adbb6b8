use seer_ingest::sink::MANIFEST_FILE;
use seer_ingest::testing::{line, spill_files};
use seer_ingest::{
    BatchHandle, BatchSink, FinalDataset, PipelineError, ResultMerger, SCHEMA, Stage, TypedBatch,
    YearFilter, decode,
};
use std::fs;

fn batch(populations: &[i32]) -> anyhow::Result<TypedBatch> {
    let records = populations
        .iter()
        .map(|&p| decode(&line(2011, 40, p), &YearFilter::None))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(TypedBatch::cast(&records))
}

#[test]
fn zero_handles_give_empty_dataset() -> anyhow::Result<()> {
    let dataset = ResultMerger::new().merge(Vec::new())?;
    assert!(dataset.is_empty());
    assert_eq!(dataset.schema().names(), SCHEMA.names());
    assert_eq!(dataset, FinalDataset::empty());
    Ok(())
}

#[test]
fn retained_handles_merge_in_sequence_order() -> anyhow::Result<()> {
    let handles = vec![
        BatchHandle::Retained { seq: 2, batch: batch(&[5, 6])? },
        BatchHandle::Retained { seq: 0, batch: batch(&[1, 2])? },
        BatchHandle::Retained { seq: 1, batch: batch(&[3, 4])? },
    ];
    let dataset = ResultMerger::new().merge(handles)?;
    assert_eq!(dataset.batch().populations(), &[1, 2, 3, 4, 5, 6]);
    assert_eq!(dataset.records().len(), 6);
    Ok(())
}

#[test]
fn mixed_handles_are_a_configuration_error() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let mut sink = BatchSink::spill(tmp.path())?;
    let spilled = sink.accept(1, batch(&[2])?)?.clone();
    let handles = vec![BatchHandle::Retained { seq: 0, batch: batch(&[1])? }, spilled];

    let err = ResultMerger::new().merge(handles).unwrap_err();
    assert!(matches!(err, PipelineError::Configuration(_)), "{err}");
    // Nothing was consumed.
    assert!(spill_files(tmp.path())?.contains(&"chunk_000001.parquet".to_string()));
    Ok(())
}

#[test]
fn finalize_cleans_up_owned_directory() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let dir = tmp.path().join("spill");
    let mut sink = BatchSink::spill(&dir)?;
    sink.accept(0, batch(&[1, 2])?)?;
    sink.accept(1, batch(&[3])?)?;

    let dataset = ResultMerger::new().finalize(sink.finish())?;
    assert_eq!(dataset.batch().populations(), &[1, 2, 3]);
    assert!(!dir.exists());
    Ok(())
}

#[test]
fn finalize_keeps_preexisting_directory() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let mut sink = BatchSink::spill(tmp.path())?;
    sink.accept(0, batch(&[1])?)?;

    ResultMerger::new().finalize(sink.finish())?;
    assert!(tmp.path().exists());
    assert!(spill_files(tmp.path())?.is_empty());
    Ok(())
}

#[test]
fn missing_artifact_at_cleanup_is_not_an_error() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let mut sink = BatchSink::spill(tmp.path())?;
    let handle = sink.accept(0, batch(&[7])?)?.clone();

    // The second handle's file is already gone when cleanup reaches it.
    let dataset = ResultMerger::new().merge(vec![handle.clone(), handle])?;
    assert_eq!(dataset.batch().populations(), &[7, 7]);
    assert_eq!(spill_files(tmp.path())?, [MANIFEST_FILE]);
    Ok(())
}

#[test]
fn corrupted_artifact_fails_merge_and_is_kept() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let mut sink = BatchSink::spill(tmp.path())?;
    sink.accept(0, batch(&[1])?)?;
    let BatchHandle::Spilled(artifact) = sink.accept(1, batch(&[2])?)?.clone() else {
        anyhow::bail!("expected a spilled handle");
    };
    fs::write(&artifact.path, b"not parquet")?;

    let err = ResultMerger::new().finalize(sink.finish()).unwrap_err();
    assert_eq!(err.stage(), Some(Stage::Merge));
    assert_eq!(err.path(), Some(artifact.path.as_path()));
    assert_eq!(
        spill_files(tmp.path())?,
        ["chunk_000000.parquet", "chunk_000001.parquet", MANIFEST_FILE]
    );
    let manifest = fs::read_to_string(tmp.path().join(MANIFEST_FILE))?;
    assert!(manifest.contains("finalizing"));
    Ok(())
}

#[test]
fn unverified_merge_still_rejects_unreadable_artifact() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let mut sink = BatchSink::spill(tmp.path())?;
    let handle = sink.accept(0, batch(&[1])?)?.clone();
    if let BatchHandle::Spilled(artifact) = &handle {
        fs::write(&artifact.path, b"garbage")?;
    }
    let err = ResultMerger::new()
        .without_checksums()
        .merge(vec![handle])
        .unwrap_err();
    assert_eq!(err.stage(), Some(Stage::Merge));
    Ok(())
}
