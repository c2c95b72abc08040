//! Integration tests for read → coerce → consolidate → pivot → write on
//! files in a temp directory.

use chrono::NaiveDate;
use std::fs;
use std::path::Path;
use tidypanel_core::data::{
    pivot, read_long_parquet, read_wide_parquet, Coerce, CoercionEngine, Consolidator,
    DuplicatePolicy, FileFormat, FragmentReader, OutputFormats, OutputWriter, ReaderOptions,
    TableKind,
};
use tidypanel_core::domain::{FlowSelection, TypedFragment};
use tidypanel_core::PipelineError;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn write_flow(root: &Path, flow: &str, body: &str) {
    let dir = root.join("data");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(format!("{flow}.csv")), body).unwrap();
}

fn read_and_coerce(root: &Path, selection: &FlowSelection) -> Vec<TypedFragment> {
    let reader = FragmentReader::new(root, ReaderOptions::default());
    let engine = CoercionEngine::default();
    reader
        .fragments(selection)
        .unwrap()
        .map(|raw| raw.unwrap().coerce(&engine).unwrap())
        .collect()
}

#[test]
fn two_flow_scenario_outer_joins_on_date() {
    let dir = tempfile::tempdir().unwrap();
    write_flow(dir.path(), "X", "date,value\n2020-01-01,1.0\n2020-01-02,\n");
    write_flow(dir.path(), "Y", "date,value\n2020-01-01,2.0\n");

    let typed = read_and_coerce(dir.path(), &FlowSelection::All);
    let long = Consolidator::default().consolidate(typed).unwrap().table;
    let wide = pivot(&long).unwrap();

    assert_eq!(long.len(), 3);
    assert_eq!(wide.dates(), vec![d(2020, 1, 1), d(2020, 1, 2)]);
    assert_eq!(wide.value(d(2020, 1, 1), "X"), Some(1.0));
    assert_eq!(wide.value(d(2020, 1, 1), "Y"), Some(2.0));
    assert_eq!(wide.value(d(2020, 1, 2), "X"), None);
    assert_eq!(wide.value(d(2020, 1, 2), "Y"), None);
}

#[test]
fn unparsable_value_is_null_not_dropped() {
    let dir = tempfile::tempdir().unwrap();
    write_flow(
        dir.path(),
        "A",
        "TIME_PERIOD,OBS_VALUE\n2020-01,1.5\n2020-02,n/d\n2020-03,2.5\n",
    );

    let typed = read_and_coerce(dir.path(), &FlowSelection::All);
    assert_eq!(typed[0].diagnostics.null_values, 1);

    let long = Consolidator::default().consolidate(typed).unwrap().table;
    let wide = pivot(&long).unwrap();
    assert_eq!(long.value_at("A", d(2020, 2, 1)), Some(None));
    assert_eq!(wide.len(), 3);
    assert_eq!(wide.value(d(2020, 2, 1), "A"), None);
    assert_eq!(wide.value(d(2020, 3, 1), "A"), Some(2.5));
}

#[test]
fn duplicate_keys_follow_policy() {
    let engine = CoercionEngine::default();
    let first = tidypanel_core::data::coerce_records(
        &engine,
        "A",
        &["date", "value"],
        &[&["2020-01-01", "1"]],
    )
    .unwrap();
    let second = tidypanel_core::data::coerce_records(
        &engine,
        "A",
        &["date", "value"],
        &[&["2020-01-01", "9"]],
    )
    .unwrap();

    let err = Consolidator::default()
        .consolidate(vec![first.clone(), second.clone()])
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::DuplicateKey { ref flow_id, date } if flow_id.as_str() == "A" && date == d(2020, 1, 1)
    ));

    let merged = Consolidator::new(DuplicatePolicy::KeepLast)
        .consolidate(vec![first, second])
        .unwrap();
    assert_eq!(merged.replaced, 1);
    assert_eq!(merged.table.value_at("A", d(2020, 1, 1)), Some(Some(9.0)));
}

#[test]
fn heterogeneous_metadata_is_unioned() {
    let dir = tempfile::tempdir().unwrap();
    write_flow(dir.path(), "A", "date,value,OBS_STATUS\n2020-01-01,1,E\n");
    write_flow(dir.path(), "B", "date,value,Source\n2020-01-01,2,bank\n");

    let long = Consolidator::default()
        .consolidate(read_and_coerce(dir.path(), &FlowSelection::All))
        .unwrap()
        .table;
    assert_eq!(long.metadata_columns, vec!["obs_status", "source"]);
    assert_eq!(long.rows[0].metadata, vec![Some("E".to_string()), None]);
    assert_eq!(long.rows[1].metadata, vec![None, Some("bank".to_string())]);
}

#[test]
fn catalog_round_trips_through_parquet() {
    let dir = tempfile::tempdir().unwrap();
    write_flow(
        dir.path(),
        "IPC",
        "TIME_PERIOD,OBS_VALUE,UNIT_MEASURE,OBS_STATUS\n2020Q1,101.5,IDX,A\n2020Q2,,IDX,\n",
    );
    write_flow(dir.path(), "TRM", "fecha,valor\n2020-04-01,3800.25\n");

    let long = Consolidator::default()
        .consolidate(read_and_coerce(dir.path(), &FlowSelection::All))
        .unwrap()
        .table;
    let wide = pivot(&long).unwrap();

    let writer = OutputWriter::new(dir.path().join("catalog"), OutputFormats::all());
    let written = writer.write(&long, &wide).unwrap();
    assert_eq!(written.len(), 5);

    let long_back = read_long_parquet(&writer.path(TableKind::Long, FileFormat::Parquet)).unwrap();
    assert_eq!(long_back, long);
    let wide_back = read_wide_parquet(&writer.path(TableKind::Wide, FileFormat::Parquet)).unwrap();
    assert_eq!(wide_back, wide);

    let wide_csv = fs::read_to_string(writer.path(TableKind::Wide, FileFormat::Csv)).unwrap();
    assert_eq!(
        wide_csv,
        "date,IPC,TRM\n2020-01-01,101.5,\n2020-04-01,,3800.25\n"
    );

    let leftovers: Vec<_> = fs::read_dir(dir.path().join("catalog"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");
}

#[test]
fn writing_twice_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    write_flow(dir.path(), "X", "date,value\n2020-01-01,1.0\n2020-01-02,0.1\n");

    let long = Consolidator::default()
        .consolidate(read_and_coerce(dir.path(), &FlowSelection::All))
        .unwrap()
        .table;
    let wide = pivot(&long).unwrap();

    let first = OutputWriter::new(dir.path().join("a"), OutputFormats::all());
    let second = OutputWriter::new(dir.path().join("b"), OutputFormats::all());
    let a = first.write(&long, &wide).unwrap();
    let b = second.write(&long, &wide).unwrap();

    for (pa, pb) in a.iter().zip(&b) {
        assert_eq!(fs::read(pa).unwrap(), fs::read(pb).unwrap(), "{}", pa.display());
    }
}
