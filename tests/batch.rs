use seer_ingest::testing::LineBuilder;
use seer_ingest::{Column, ColumnType, DictColumn, Record, SCHEMA, TypedBatch, YearFilter, decode};

fn records(lines: &[String]) -> anyhow::Result<Vec<Record>> {
    Ok(lines
        .iter()
        .map(|l| decode(l, &YearFilter::None))
        .collect::<Result<Vec<_>, _>>()?)
}

#[test]
fn schema_declares_twelve_columns_in_order() {
    assert_eq!(
        SCHEMA.names(),
        [
            "Year",
            "State",
            "StateFIPS",
            "CountyFIPS",
            "RaceCode",
            "Race",
            "OriginCode",
            "Origin",
            "SexCode",
            "Sex",
            "Age",
            "Population",
        ]
    );
    assert_eq!(Column::Year.data_type(), ColumnType::Int16);
    assert_eq!(Column::Population.data_type(), ColumnType::Int32);
    assert_eq!(Column::Age.data_type(), ColumnType::UInt8);
    assert!(Column::CountyFips.is_categorical());
    assert_eq!(Column::from_name("statefips"), Some(Column::StateFips));
    assert_eq!(Column::from_name("Height"), None);
}

#[test]
fn cast_preserves_rows() -> anyhow::Result<()> {
    let input = records(&[
        LineBuilder::new().build(),
        LineBuilder::new().state("CA", "06").county("037").age(7).build(),
        LineBuilder::new().year(1985).race(3).build(),
    ])?;
    let batch = TypedBatch::cast(&input);
    assert_eq!(batch.len(), 3);
    assert_eq!(batch.rows().collect::<Vec<_>>(), input);
    assert_eq!(batch.years(), &[2011, 2011, 1985]);
    assert_eq!(batch.format_cell(Column::State, 1), "CA");
    assert_eq!(batch.format_cell(Column::Race, 2), "Other");
    assert_eq!(batch.integer(Column::Age, 1), Some(7));
    assert_eq!(batch.integer(Column::State, 1), None);

    // Two distinct states across three rows.
    let states = batch.dictionary(Column::State).map(DictColumn::values);
    assert_eq!(states.map(<[String]>::len), Some(2));
    Ok(())
}

#[test]
fn empty_batch_has_schema_and_no_rows() {
    let batch = TypedBatch::empty();
    assert!(batch.is_empty());
    assert_eq!(batch.schema().len(), SCHEMA.len());
    assert_eq!(batch.rows().count(), 0);
    assert_eq!(TypedBatch::cast(&[]), batch);
}

#[test]
fn select_keeps_masked_rows_in_order() -> anyhow::Result<()> {
    let batch = TypedBatch::cast(&records(&[
        LineBuilder::new().population(1).build(),
        LineBuilder::new().population(2).build(),
        LineBuilder::new().population(3).build(),
    ])?);
    let kept = batch.select(&[true, false, true]);
    assert_eq!(kept.populations(), &[1, 3]);
    assert_eq!(kept.len(), 2);
    Ok(())
}

#[test]
fn concat_unifies_dictionaries() -> anyhow::Result<()> {
    let first = records(&[
        LineBuilder::new().state("AL", "01").build(),
        LineBuilder::new().state("CA", "06").build(),
    ])?;
    let second = records(&[
        LineBuilder::new().state("CA", "06").build(),
        LineBuilder::new().state("WY", "56").build(),
    ])?;
    let merged = TypedBatch::concat(&[TypedBatch::cast(&first), TypedBatch::cast(&second)]);

    let expected: Vec<Record> = first.into_iter().chain(second).collect();
    assert_eq!(merged.rows().collect::<Vec<_>>(), expected);

    let states = merged.dictionary(Column::State).map(|d| d.values().to_vec());
    assert_eq!(
        states,
        Some(vec!["AL".to_string(), "CA".to_string(), "WY".to_string()])
    );
    assert!(TypedBatch::concat(&[]).is_empty());
    Ok(())
}

#[test]
fn dictionary_parts_are_validated() {
    assert!(DictColumn::from_parts(vec![0, 1], vec!["a".into()]).is_err());
    let column = DictColumn::from_parts(vec![1, 0, 1], vec!["a".into(), "b".into()]);
    assert_eq!(
        column.map(|c| c.iter().map(str::to_string).collect::<Vec<_>>()),
        Ok(vec!["b".to_string(), "a".to_string(), "b".to_string()])
    );
}
