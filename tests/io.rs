use arrow::array::{ArrayRef, Int16Array, Int32Array, StringArray, UInt8Array};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use seer_ingest::io::compression::{
    auto_detect_reader, auto_detect_writer, decompressed_file_name, detect_from_extension,
    open_lines,
};
use seer_ingest::io::parquet::{
    arrow_schema, from_record_batch, read_parquet_batch, sha256_file, to_record_batch,
    write_parquet_batch,
};
use seer_ingest::testing::{sample_lines, write_lines};
use seer_ingest::{Column, TypedBatch, YearFilter, decode};
use std::fs::File;
use std::io::{Read, Write};
use std::sync::Arc;

fn sample_batch() -> TypedBatch {
    let records: Vec<_> = sample_lines()
        .iter()
        .filter_map(|l| decode(l, &YearFilter::None).ok())
        .collect();
    TypedBatch::cast(&records)
}

#[test]
fn codecs_are_detected_by_extension() {
    assert_eq!(detect_from_extension("a.txt.gz").map(|c| c.name()), Some("gzip"));
    assert_eq!(detect_from_extension("A.TXT.ZST").map(|c| c.name()), Some("zstd"));
    assert!(detect_from_extension("a.txt").is_none());
    assert_eq!(
        decompressed_file_name("dl/us.1990_2023.txt.gz").as_deref(),
        Some("us.1990_2023.txt")
    );
    assert_eq!(decompressed_file_name("us.txt"), None);
}

#[test]
fn gzip_content_is_detected_without_extension() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("lines.gz");
    write_lines(&path, ["hello", "world"])?;
    let renamed = tmp.path().join("lines.bin");
    std::fs::rename(&path, &renamed)?;

    let mut text = String::new();
    auto_detect_reader(File::open(&renamed)?, &renamed)?.read_to_string(&mut text)?;
    assert_eq!(text, "hello\nworld\n");
    Ok(())
}

#[test]
fn zstd_lines_round_trip() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("seer.txt.zst");
    {
        let mut out = auto_detect_writer(File::create(&path)?, &path)?;
        out.write_all(b"2011US01001 102500000123\n\n")?;
    }
    let lines = open_lines(&path)?.collect::<Result<Vec<_>, _>>()?;
    assert_eq!(lines, [b"2011US01001 102500000123".to_vec(), Vec::new()]);
    Ok(())
}

#[test]
fn arrow_schema_uses_dictionary_strings() {
    let schema = arrow_schema();
    assert_eq!(schema.fields().len(), 12);
    let state = schema.field_with_name("State").map(|f| f.data_type().clone());
    assert_eq!(
        state.ok(),
        Some(DataType::Dictionary(Box::new(DataType::UInt32), Box::new(DataType::Utf8)))
    );
    assert_eq!(schema.field(0).data_type(), &DataType::Int16);
    assert!(schema.fields().iter().all(|f| !f.is_nullable()));
}

#[test]
fn record_batch_conversion_keeps_rows() -> anyhow::Result<()> {
    let batch = sample_batch();
    let arrow = to_record_batch(&batch)?;
    assert_eq!(arrow.num_rows(), 5);
    let back = from_record_batch(&arrow)?;
    assert_eq!(back.rows().collect::<Vec<_>>(), batch.rows().collect::<Vec<_>>());
    Ok(())
}

#[test]
fn plain_string_columns_are_accepted() -> anyhow::Result<()> {
    let strings = |v: &str| Arc::new(StringArray::from(vec![v])) as ArrayRef;
    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int16Array::from(vec![2011])),
        strings("US"),
        strings("01"),
        strings("001"),
        Arc::new(UInt8Array::from(vec![1])),
        strings("White"),
        Arc::new(UInt8Array::from(vec![0])),
        strings("Non-Hispanic"),
        Arc::new(UInt8Array::from(vec![2])),
        strings("Female"),
        Arc::new(UInt8Array::from(vec![50])),
        Arc::new(Int32Array::from(vec![123])),
    ];
    let names = seer_ingest::SCHEMA.names();
    let arrow = RecordBatch::try_from_iter(names.into_iter().zip(columns))?;

    let batch = from_record_batch(&arrow)?;
    let expected = decode("2011US01001 102500000123", &YearFilter::None)?;
    assert_eq!(batch.rows().collect::<Vec<_>>(), [expected]);
    assert_eq!(batch.format_cell(Column::Origin, 0), "Non-Hispanic");
    Ok(())
}

#[test]
fn parquet_files_round_trip_with_digest() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("batch.parquet");
    let batch = sample_batch();
    assert_eq!(write_parquet_batch(&path, &batch)?, 5);

    let digest = sha256_file(&path)?;
    assert_eq!(digest.len(), 64);
    assert!(digest.bytes().all(|b| b.is_ascii_hexdigit()));
    assert_eq!(digest, sha256_file(&path)?);

    let back = read_parquet_batch(&path)?;
    assert_eq!(back.rows().collect::<Vec<_>>(), batch.rows().collect::<Vec<_>>());
    Ok(())
}

#[test]
fn empty_batch_writes_schema_only_file() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("empty.parquet");
    assert_eq!(write_parquet_batch(&path, &TypedBatch::empty())?, 0);
    assert!(read_parquet_batch(&path)?.is_empty());
    Ok(())
}

#[test]
fn raw_lines_keep_invalid_bytes() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("seer.txt");
    std::fs::write(&path, b"ok\r\nbad\xff\nlast")?;
    let lines = open_lines(&path)?.collect::<Result<Vec<_>, _>>()?;
    assert_eq!(lines, [b"ok\r".to_vec(), b"bad\xff".to_vec(), b"last".to_vec()]);
    Ok(())
}
