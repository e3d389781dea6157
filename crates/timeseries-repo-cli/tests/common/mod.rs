use std::{path::PathBuf, sync::Arc};

use arrow::array::{ArrayRef, Float64Array, TimestampNanosecondArray};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{TimeZone, Utc};
use tempfile::TempDir;
use timeseries_repo_core::{
    BackendKind, Config, Dataset, RepositoryConfig, SeriesType, tags::tag_dict,
};

type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

fn rows(series: &[&str]) -> TestResult<RecordBatch> {
    let jan = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().ok_or("bad date")?;
    let feb = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).single().ok_or("bad date")?;
    let nanos: Vec<i64> = [jan, feb]
        .iter()
        .filter_map(|t| t.timestamp_nanos_opt())
        .collect();

    let mut fields = vec![Field::new(
        "valid_at",
        DataType::Timestamp(TimeUnit::Nanosecond, Some("UTC".into())),
        false,
    )];
    let mut columns: Vec<ArrayRef> =
        vec![Arc::new(TimestampNanosecondArray::from(nanos).with_timezone("UTC"))];
    for name in series {
        fields.push(Field::new(*name, DataType::Float64, true));
        columns.push(Arc::new(Float64Array::from(vec![1.0, 2.0])));
    }
    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}

/// Two repositories, `main` (default, flat) and `side` (partitioned), each
/// holding datasets `prices` (series a, b) and `prices_q` (series c); `main`
/// also holds an estimate `forecast` with two versions. Returns the path of
/// the configuration file describing them.
pub fn seed(tmp: &TempDir) -> TestResult<PathBuf> {
    let mut main = RepositoryConfig::new(
        "main",
        tmp.path().join("main/data"),
        tmp.path().join("main/meta"),
        BackendKind::Flat,
    );
    main.default = true;
    let side = RepositoryConfig::new(
        "side",
        tmp.path().join("side/data"),
        tmp.path().join("side/meta"),
        BackendKind::Partitioned,
    );

    for entry in [&main, &side] {
        let repo = entry.repository();
        let mut prices = Dataset::for_type("prices", SeriesType::simple(), None, rows(&["a", "b"])?)?;
        prices.tag_series(Some(&["a"][..]), &tag_dict([("unit", "NOK")]));
        prices.tag_series(Some(&["b"][..]), &tag_dict([("unit", "EUR")]));
        repo.save(&prices)?;

        let mut quarterly =
            Dataset::for_type("prices_q", SeriesType::simple(), None, rows(&["c"])?)?;
        quarterly.tag_series(None::<&[&str]>, &tag_dict([("unit", "USD")]));
        repo.save(&quarterly)?;
    }

    let estimates = main.repository();
    for month in [3, 4] {
        let as_of = Utc
            .with_ymd_and_hms(2024, month, 1, 12, 0, 0)
            .single()
            .ok_or("bad date")?;
        let ds = Dataset::for_type("forecast", SeriesType::estimate(), Some(as_of), rows(&["f"])?)?;
        estimates.save(&ds)?;
    }

    let config = Config {
        repositories: vec![main, side],
    };
    let path = tmp.path().join("timeseries_config.json");
    config.save(&path)?;
    Ok(path)
}
