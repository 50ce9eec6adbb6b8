//! Parquet encoding of [`TypedBatch`]es.
//!
//! This module provides:
//! - **Arrow conversion**: [`arrow_schema`], [`to_record_batch`], [`from_record_batch`]
//! - **Typed batch I/O**: [`write_parquet_batch`], [`write_parquet_to`], [`read_parquet_batch`]
//! - **Integrity digests**: [`sha256_file`]
//!
//! Categorical columns are written as `Dictionary(UInt32, Utf8)`, so artifacts carry
//! the same dictionary encoding as the in-memory batch and the Arrow schema is
//! embedded in the file metadata. Readers accept plain `Utf8` columns as well and
//! re-encode them.

use crate::batch::{Column, ColumnType, DictColumn, SCHEMA, TypedBatch};
use anyhow::{Context, Result, anyhow, bail};
use arrow::array::{
    Array, ArrayRef, AsArray, DictionaryArray, Int16Array, Int32Array, StringArray, UInt8Array,
    UInt32Array,
};
use arrow::compute::cast;
use arrow::datatypes::{
    DataType, Field, Int16Type, Int32Type, Schema, SchemaRef, UInt8Type, UInt32Type,
};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::arrow_writer::ArrowWriter;
use parquet::file::properties::WriterProperties;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

/// Arrow data type of a schema column.
#[must_use]
pub fn arrow_type(data_type: ColumnType) -> DataType {
    match data_type {
        ColumnType::Int16 => DataType::Int16,
        ColumnType::UInt8 => DataType::UInt8,
        ColumnType::Int32 => DataType::Int32,
        ColumnType::Dictionary => {
            DataType::Dictionary(Box::new(DataType::UInt32), Box::new(DataType::Utf8))
        }
    }
}

/// Arrow schema of the dataset. No column is nullable.
#[must_use]
pub fn arrow_schema() -> SchemaRef {
    let fields: Vec<Field> = SCHEMA
        .fields()
        .iter()
        .map(|f| Field::new(f.name(), arrow_type(f.data_type), false))
        .collect();
    Arc::new(Schema::new(fields))
}

fn dictionary_array(column: &DictColumn) -> Result<ArrayRef> {
    let keys = UInt32Array::from(column.codes().to_vec());
    let values: ArrayRef = Arc::new(StringArray::from_iter_values(column.values()));
    let array = DictionaryArray::<UInt32Type>::try_new(keys, values)
        .context("build dictionary array")?;
    Ok(Arc::new(array))
}

/// Convert a typed batch into an Arrow `RecordBatch`.
///
/// # Errors
/// Returns an error if Arrow rejects a column.
pub fn to_record_batch(batch: &TypedBatch) -> Result<RecordBatch> {
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(SCHEMA.len());
    for field in SCHEMA.fields() {
        let array: ArrayRef = match field.column {
            Column::Year => Arc::new(Int16Array::from(batch.years().to_vec())),
            Column::RaceCode => Arc::new(UInt8Array::from(batch.race_codes().to_vec())),
            Column::OriginCode => Arc::new(UInt8Array::from(batch.origin_codes().to_vec())),
            Column::SexCode => Arc::new(UInt8Array::from(batch.sex_codes().to_vec())),
            Column::Age => Arc::new(UInt8Array::from(batch.ages().to_vec())),
            Column::Population => Arc::new(Int32Array::from(batch.populations().to_vec())),
            categorical => {
                let dict = batch
                    .dictionary(categorical)
                    .ok_or_else(|| anyhow!("column {categorical} is not categorical"))?;
                dictionary_array(dict).with_context(|| format!("encode column {categorical}"))?
            }
        };
        columns.push(array);
    }
    RecordBatch::try_new(arrow_schema(), columns).context("assemble RecordBatch")
}

fn column<'a>(batch: &'a RecordBatch, column: Column) -> Result<&'a ArrayRef> {
    let array = batch
        .column_by_name(column.name())
        .ok_or_else(|| anyhow!("missing column {column}"))?;
    if array.null_count() > 0 {
        bail!("column {column} contains {} nulls", array.null_count());
    }
    Ok(array)
}

fn numeric<T>(batch: &RecordBatch, name: Column, target: &DataType) -> Result<Vec<T::Native>>
where
    T: arrow::datatypes::ArrowPrimitiveType,
{
    let casted = cast(column(batch, name)?, target).with_context(|| format!("cast column {name}"))?;
    let values = casted
        .as_primitive_opt::<T>()
        .ok_or_else(|| anyhow!("column {name} is not {target}"))?;
    Ok(values.values().to_vec())
}

fn dictionary(batch: &RecordBatch, name: Column) -> Result<DictColumn> {
    let array = column(batch, name)?;
    if let Some(dict) = array.as_dictionary_opt::<UInt32Type>()
        && let Some(values) = dict.values().as_string_opt::<i32>()
        && values.null_count() == 0
    {
        let values: Vec<String> = values.iter().flatten().map(str::to_string).collect();
        return DictColumn::from_parts(dict.keys().values().to_vec(), values)
            .map_err(|e| anyhow!("column {name}: {e}"));
    }
    let casted = cast(array, &DataType::Utf8).with_context(|| format!("cast column {name}"))?;
    let strings = casted
        .as_string_opt::<i32>()
        .ok_or_else(|| anyhow!("column {name} is not a string column"))?;
    Ok(DictColumn::encode(strings.iter().flatten()))
}

/// Convert an Arrow `RecordBatch` with the dataset schema back into a typed batch.
///
/// Columns are matched by name; numeric columns are cast to their declared width.
///
/// # Errors
/// Returns an error if a column is missing, nullable data is present, or a cast fails.
pub fn from_record_batch(batch: &RecordBatch) -> Result<TypedBatch> {
    let typed = TypedBatch {
        year: numeric::<Int16Type>(batch, Column::Year, &DataType::Int16)?,
        state: dictionary(batch, Column::State)?,
        state_fips: dictionary(batch, Column::StateFips)?,
        county_fips: dictionary(batch, Column::CountyFips)?,
        race_code: numeric::<UInt8Type>(batch, Column::RaceCode, &DataType::UInt8)?,
        race: dictionary(batch, Column::Race)?,
        origin_code: numeric::<UInt8Type>(batch, Column::OriginCode, &DataType::UInt8)?,
        origin: dictionary(batch, Column::Origin)?,
        sex_code: numeric::<UInt8Type>(batch, Column::SexCode, &DataType::UInt8)?,
        sex: dictionary(batch, Column::Sex)?,
        age: numeric::<UInt8Type>(batch, Column::Age, &DataType::UInt8)?,
        population: numeric::<Int32Type>(batch, Column::Population, &DataType::Int32)?,
    };
    typed.check_lengths().map_err(|e| anyhow!(e))?;
    Ok(typed)
}

/// Write a typed batch as Parquet into any writer and return the writer.
///
/// A zero-row batch still produces a valid file carrying the schema.
///
/// # Errors
/// Returns an error if conversion or writing fails.
pub fn write_parquet_to<W: Write + Send>(writer: W, batch: &TypedBatch) -> Result<W> {
    let record_batch = to_record_batch(batch)?;
    let props = WriterProperties::builder().build();
    let mut writer = ArrowWriter::try_new(writer, record_batch.schema(), Some(props))
        .context("create ArrowWriter")?;
    writer
        .write(&record_batch)
        .context("write batch to parquet")?;
    writer.into_inner().context("close ArrowWriter")
}

/// Write a typed batch to a Parquet file.
///
/// # Returns
/// Number of rows written.
///
/// # Errors
/// Returns an error if the file cannot be created or writing fails.
pub fn write_parquet_batch(path: impl AsRef<Path>, batch: &TypedBatch) -> Result<usize> {
    let path = path.as_ref();
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let file = write_parquet_to(file, batch)?;
    file.sync_all()
        .with_context(|| format!("sync {}", path.display()))?;
    Ok(batch.len())
}

/// Read a whole Parquet file into one typed batch.
///
/// # Errors
/// Returns an error if the file cannot be opened, a batch cannot be read, or the
/// schema does not match the dataset.
pub fn read_parquet_batch(path: impl AsRef<Path>) -> Result<TypedBatch> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;

    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("open ParquetRecordBatchReader")?;
    let reader = builder
        .with_batch_size(64 * 1024)
        .build()
        .context("build ParquetRecordBatchReader")?;

    let mut parts = Vec::new();
    for batch in reader {
        let batch = batch.context("read next batch")?;
        parts.push(from_record_batch(&batch).context("decode RecordBatch")?);
    }
    Ok(TypedBatch::concat(&parts))
}

/// Hex SHA-256 digest of a file's contents.
///
/// # Errors
/// Returns an error if the file cannot be read.
pub fn sha256_file(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let mut file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buf)
            .with_context(|| format!("read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect())
}
