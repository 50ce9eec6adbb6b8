use seer_ingest::filter::apply;
use seer_ingest::testing::LineBuilder;
use seer_ingest::{
    CmpOp, Column, Predicate, PredicateParseError, Race, TypedBatch, Value, YearFilter, col,
    decode,
};
use std::collections::BTreeSet;

fn batch() -> anyhow::Result<TypedBatch> {
    let lines = [
        LineBuilder::new().age(10).population(1).build(),
        LineBuilder::new().race(2).age(50).population(2).build(),
        LineBuilder::new().state("CA", "06").age(65).population(3).build(),
        LineBuilder::new().race(2).state("CA", "06").age(75).population(4).build(),
        LineBuilder::new().age(80).population(5).build(),
    ];
    let records = lines
        .iter()
        .map(|l| decode(l, &YearFilter::None))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(TypedBatch::cast(&records))
}

#[test]
fn builder_predicates_select_rows_in_order() -> anyhow::Result<()> {
    let batch = batch()?;
    let predicate = col(Column::Age)
        .between(50, 75)
        .and(col(Column::Race).eq(Race::Black));
    assert_eq!(predicate.evaluate(&batch), [false, true, false, true, false]);

    let kept = apply(batch, Some(&predicate));
    assert_eq!(kept.populations(), &[2, 4]);
    Ok(())
}

#[test]
fn no_predicate_returns_batch_unchanged() -> anyhow::Result<()> {
    let batch = batch()?;
    assert_eq!(apply(batch.clone(), None), batch);
    assert_eq!(apply(batch.clone(), Some(&Predicate::True)), batch);
    Ok(())
}

#[test]
fn nothing_matches_gives_empty_batch() -> anyhow::Result<()> {
    let kept = apply(batch()?, Some(&col(Column::State).eq("TX")));
    assert!(kept.is_empty());
    assert_eq!(kept.schema().len(), 12);
    Ok(())
}

#[test]
fn or_not_and_membership() -> anyhow::Result<()> {
    let batch = batch()?;
    let young_or_old = col(Column::Age).lt(18).or(col(Column::Age).ge(80));
    assert_eq!(young_or_old.evaluate(&batch), [true, false, false, false, true]);
    assert_eq!(
        (!young_or_old).evaluate(&batch),
        [false, true, true, true, false]
    );
    assert_eq!(
        col(Column::Population).is_in([1, 3, 5]).evaluate(&batch),
        [true, false, true, false, true]
    );
    assert_eq!(
        col(Column::State).ne("US").evaluate(&batch),
        [false, false, true, true, false]
    );
    Ok(())
}

#[test]
fn mismatched_literal_kind_matches_nothing() -> anyhow::Result<()> {
    let batch = batch()?;
    assert_eq!(col(Column::Age).eq("50").evaluate(&batch), [false; 5]);
    assert_eq!(col(Column::State).eq(6).evaluate(&batch), [false; 5]);
    Ok(())
}

#[test]
fn parses_textual_clauses() -> anyhow::Result<()> {
    assert_eq!(
        "Age>=65".parse::<Predicate>()?,
        Predicate::Compare {
            column: Column::Age,
            op: CmpOp::Ge,
            value: Value::Int(65),
        }
    );
    assert_eq!(
        "age = 50..75".parse::<Predicate>()?,
        col(Column::Age).between(50, 75)
    );
    assert_eq!(
        "Race=White|Black".parse::<Predicate>()?,
        col(Column::Race).is_in(["White", "Black"])
    );
    assert_eq!(
        "State!=CA".parse::<Predicate>()?,
        col(Column::State).ne("CA")
    );

    let both = Predicate::parse_clauses(["Age>=65", "State=CA"])?;
    assert_eq!(both.evaluate(&batch()?), [false, false, true, true, false]);
    assert_eq!(
        Predicate::parse_clauses(Vec::<String>::new())?,
        Predicate::True
    );
    Ok(())
}

#[test]
fn rejects_bad_clauses() {
    assert!(matches!(
        "Age".parse::<Predicate>(),
        Err(PredicateParseError::MissingOperator(_))
    ));
    assert!(matches!(
        "Height>3".parse::<Predicate>(),
        Err(PredicateParseError::UnknownColumn(_))
    ));
    assert!(matches!(
        "Age=old".parse::<Predicate>(),
        Err(PredicateParseError::InvalidValue { column: Column::Age, .. })
    ));
    assert!(matches!(
        "Age<1..5".parse::<Predicate>(),
        Err(PredicateParseError::UnsupportedForm(_))
    ));
}

#[test]
fn display_round_trips_through_parser() -> anyhow::Result<()> {
    for clause in ["Age>=65", "State=CA|TX", "Year=1990..2000"] {
        let predicate: Predicate = clause.parse()?;
        assert_eq!(predicate.to_string(), clause);
    }
    Ok(())
}

#[test]
fn year_filter_variants() {
    assert!(YearFilter::None.admits(1969));
    assert!(YearFilter::Single(2011).admits(2011));
    assert!(!YearFilter::Single(2011).admits(2010));

    let many = YearFilter::from(vec![2010, 2011]);
    assert!(many.admits(2010) && many.admits(2011) && !many.admits(2012));

    assert_eq!(YearFilter::from_years(Vec::new()), YearFilter::None);
    assert_eq!(YearFilter::from_years([2011, 2011]), YearFilter::Single(2011));
    assert_eq!(
        YearFilter::from_years([2011, 1990]),
        YearFilter::Many(BTreeSet::from([1990, 2011]))
    );
    assert_eq!(YearFilter::from(Some(2011)), YearFilter::Single(2011));
    assert_eq!(YearFilter::from(None), YearFilter::None);
}
