use seer_ingest::metrics::names;
use seer_ingest::testing::{FailingLines, LineBuilder, line, ok_lines, sample_lines, spill_files, write_lines};
use seer_ingest::{
    Column, MetricsCollector, Pipeline, PipelineConfig, PipelineError, Record, SCHEMA, Stage,
    YearFilter, col,
};
use std::collections::BTreeSet;
use std::fs;

fn run(config: PipelineConfig, lines: Vec<String>) -> anyhow::Result<Vec<Record>> {
    Ok(Pipeline::new(config).run_lines(ok_lines(lines))?.dataset.records())
}

fn many_lines(n: i32) -> Vec<String> {
    (0..n)
        .map(|i| {
            LineBuilder::new()
                .year(2009 + (i % 3) as i16)
                .age((i % 90) as u8)
                .population(i)
                .build()
        })
        .collect()
}

#[test]
fn reference_scenario() -> anyhow::Result<()> {
    let config = PipelineConfig::default()
        .with_year_filter(2011)
        .with_predicate(col(Column::Age).between(50, 75));
    let output = Pipeline::new(config).run_lines(ok_lines([
        "2011US01001 102500000123",
        "1985US01001 1XX5000005",
        "2011US01001 102800000999",
    ]))?;
    assert_eq!(output.dataset.len(), 1);
    assert_eq!(output.dataset.records()[0].population, 123);
    assert_eq!(output.stats.processed(), 2);
    assert_eq!(output.stats.skipped(), 1);
    assert_eq!(output.stats.lines.filtered_out, 1);
    Ok(())
}

#[test]
fn chunk_size_does_not_change_result() -> anyhow::Result<()> {
    let lines = many_lines(250);
    let predicate = col(Column::Age).ge(30);
    let small = run(
        PipelineConfig::default().with_chunk_size(1).with_predicate(predicate.clone()),
        lines.clone(),
    )?;
    let medium = run(
        PipelineConfig::default().with_chunk_size(7).with_predicate(predicate.clone()),
        lines.clone(),
    )?;
    let large = run(PipelineConfig::default().with_predicate(predicate), lines)?;
    assert_eq!(small, large);
    assert_eq!(medium, large);
    Ok(())
}

#[test]
fn input_order_is_preserved_across_spilled_chunks() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let config = PipelineConfig::default()
        .with_chunk_size(16)
        .with_spill_dir(tmp.path().join("spill"));
    let records = run(config, many_lines(100))?;
    let populations: Vec<i32> = records.iter().map(|r| r.population).collect();
    assert_eq!(populations, (0..100).collect::<Vec<_>>());
    Ok(())
}

#[test]
fn spilled_and_in_memory_runs_agree() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let predicate = col(Column::Year).eq(2010);
    let in_memory = run(
        PipelineConfig::default().with_chunk_size(10).with_predicate(predicate.clone()),
        many_lines(90),
    )?;
    let spilled = run(
        PipelineConfig::default()
            .with_chunk_size(10)
            .with_predicate(predicate)
            .with_spill_dir(tmp.path()),
        many_lines(90),
    )?;
    assert_eq!(in_memory.len(), 30);
    assert_eq!(in_memory, spilled);
    Ok(())
}

#[test]
fn successful_spill_run_leaves_nothing_behind() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let owned = tmp.path().join("owned");
    let output = Pipeline::new(
        PipelineConfig::default()
            .with_chunk_size(3)
            .with_spill_dir(&owned),
    )
    .run_lines(ok_lines(sample_lines()))?;
    assert_eq!(output.stats.artifacts_spilled, 2);
    assert!(!owned.exists());

    Pipeline::new(PipelineConfig::default().with_chunk_size(3).with_spill_dir(tmp.path()))
        .run_lines(ok_lines(sample_lines()))?;
    assert!(spill_files(tmp.path())?.is_empty());
    Ok(())
}

#[test]
fn idempotent_runs() -> anyhow::Result<()> {
    let config = PipelineConfig::default().with_chunk_size(2);
    let first = run(config.clone(), sample_lines())?;
    let second = run(config, sample_lines())?;
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn scalar_and_set_year_filters_agree() -> anyhow::Result<()> {
    let scalar = run(PipelineConfig::default().with_year_filter(2011), sample_lines())?;
    let set = run(
        PipelineConfig::default().with_year_filter(BTreeSet::from([2011])),
        sample_lines(),
    )?;
    let many = run(
        PipelineConfig::default().with_year_filter(YearFilter::from(vec![2010, 2011])),
        sample_lines(),
    )?;
    assert_eq!(scalar, set);
    assert_eq!(scalar.len(), 3);
    assert_eq!(many.len(), 4);
    Ok(())
}

#[test]
fn empty_result_is_success_with_schema() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let config = PipelineConfig::default()
        .with_predicate(col(Column::State).eq("ZZ"))
        .with_spill_dir(tmp.path().join("spill"));
    let output = Pipeline::new(config).run_lines(ok_lines(sample_lines()))?;
    assert!(output.dataset.is_empty());
    assert_eq!(output.dataset.schema().names(), SCHEMA.names());
    assert_eq!(output.stats.chunks_emitted, 1);
    assert_eq!(output.stats.chunks_dropped, 1);
    assert_eq!(output.stats.artifacts_spilled, 0);
    assert!(!tmp.path().join("spill").exists());
    Ok(())
}

#[test]
fn compressed_input_matches_plain_input() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let plain = tmp.path().join("seer.txt");
    let gzip = tmp.path().join("seer.txt.gz");
    write_lines(&plain, sample_lines())?;
    write_lines(&gzip, sample_lines())?;
    assert_ne!(fs::read(&plain)?, fs::read(&gzip)?);

    let pipeline = Pipeline::default();
    let a = pipeline.run_file(&plain)?;
    let b = pipeline.run_file(&gzip)?;
    assert_eq!(a.dataset.records(), b.dataset.records());
    assert_eq!(a.stats, b.stats);
    Ok(())
}

#[test]
fn badly_encoded_line_does_not_abort_file_run() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("seer.txt");
    let mut bytes = format!("{}\n", line(2011, 50, 123)).into_bytes();
    bytes.extend_from_slice(b"2011US01001 1025\xff0000123\r\n");
    bytes.extend_from_slice(format!("{}\r\n", line(2011, 60, 456)).as_bytes());
    fs::write(&path, bytes)?;

    let output = Pipeline::default().run_file(&path)?;
    assert_eq!(output.stats.processed(), 2);
    assert_eq!(output.stats.skipped(), 1);
    assert_eq!(output.stats.lines.parse_errors, 1);
    let populations: Vec<i32> = output.dataset.records().iter().map(|r| r.population).collect();
    assert_eq!(populations, [123, 456]);
    Ok(())
}

#[test]
fn csv_export_has_schema_header() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let output = Pipeline::default().run_lines(ok_lines([line(2011, 50, 123)]))?;
    let path = tmp.path().join("out/seer.csv");
    assert_eq!(output.dataset.write_csv(&path)?, 1);

    let text = fs::read_to_string(&path)?;
    let mut rows = text.lines();
    assert_eq!(rows.next(), Some(SCHEMA.names().join(",").as_str()));
    assert_eq!(
        rows.next(),
        Some("2011,US,01,001,1,White,0,Non-Hispanic,2,Female,50,123")
    );
    assert_eq!(rows.next(), None);

    let back: Vec<Record> = seer_ingest::io::csv::read_csv_vec(&path)?;
    assert_eq!(back, output.dataset.records());
    Ok(())
}

#[test]
fn empty_csv_export_still_has_header() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("empty.csv");
    let output = Pipeline::default().run_lines(ok_lines(Vec::<String>::new()))?;
    assert_eq!(output.dataset.write_csv(&path)?, 0);
    assert_eq!(fs::read_to_string(&path)?.trim_end(), SCHEMA.names().join(","));
    Ok(())
}

#[test]
fn parquet_export_reads_back() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("seer.parquet");
    let output = Pipeline::default().run_lines(ok_lines(sample_lines()))?;
    assert_eq!(output.dataset.write_parquet(&path)?, 5);

    let back = seer_ingest::io::parquet::read_parquet_batch(&path)?;
    assert_eq!(back.rows().collect::<Vec<_>>(), output.dataset.records());
    Ok(())
}

#[test]
fn metrics_are_recorded() -> anyhow::Result<()> {
    let metrics = MetricsCollector::new();
    let config = PipelineConfig::default()
        .with_chunk_size(2)
        .with_year_filter(2011)
        .with_metrics(metrics.clone());
    Pipeline::new(config).run_lines(ok_lines(sample_lines()))?;

    assert_eq!(metrics.counter(names::LINES_PROCESSED), Some(3));
    assert_eq!(metrics.counter(names::LINES_SKIPPED), Some(4));
    assert_eq!(metrics.counter(names::LINES_FILTERED_OUT), Some(3));
    assert_eq!(metrics.counter(names::LINES_MALFORMED), Some(1));
    assert_eq!(metrics.counter(names::CHUNKS_EMITTED), Some(2));
    assert_eq!(metrics.counter(names::ROWS_OUTPUT), Some(3));
    assert_eq!(metrics.gauge(names::PEAK_CHUNK_ROWS), Some(2.0));
    assert!(metrics.elapsed().is_some());
    assert!(metrics.to_json().get("execution_time_ms").is_some());
    Ok(())
}

#[test]
fn missing_input_reports_read_stage() {
    let failure = Pipeline::default()
        .run_file("/definitely/not/here.txt")
        .unwrap_err();
    assert_eq!(failure.error.stage(), Some(Stage::Read));
    assert_eq!(failure.stats.processed(), 0);
}

#[test]
fn read_failure_keeps_partial_counts() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let dir = tmp.path().join("spill");
    let lines = FailingLines::new([line(2011, 1, 1), line(2011, 2, 2), "garbage".to_string()]);
    let failure = Pipeline::new(PipelineConfig::default().with_chunk_size(1).with_spill_dir(&dir))
        .run_lines(lines)
        .unwrap_err();

    assert_eq!(failure.error.stage(), Some(Stage::Read));
    assert_eq!(failure.stats.processed(), 2);
    assert_eq!(failure.stats.skipped(), 1);
    // Staged chunks stay for diagnosis.
    assert!(spill_files(&dir)?.contains(&"manifest.json".to_string()));
    Ok(())
}

#[test]
fn invalid_chunk_size_is_configuration_error() {
    let failure = Pipeline::new(PipelineConfig::default().with_chunk_size(0))
        .run_lines(ok_lines(sample_lines()))
        .unwrap_err();
    assert!(matches!(failure.error, PipelineError::Configuration(_)));
}
