use approx::assert_relative_eq;
use camino::Utf8Path;
use overlap_probe::config::OverlapParams;
use overlap_probe::overlap_errors::{OverlapError, RunStatus};
use overlap_probe::temperature_model::{build_temperature_models, models_status};
use overlap_probe::temperature_model::model_file::ModelArtifact;
use overlap_probe::time::CalendarDate;

mod common;
use common::*;

fn date(month: u8, day: u8) -> CalendarDate {
    CalendarDate::new(2023, month, day).unwrap()
}

/// 30 daily results from 2023-01-01, temperatures spread over -10..30 °C.
fn write_linear_days(dir: &Utf8Path) {
    for i in 0..30u8 {
        let temperature = -10.0 + 40.0 * f64::from(i) / 29.0;
        linear_daily_result(date(1, i + 1), temperature, 2)
            .write_to_dir(dir)
            .unwrap();
    }
}

#[test]
fn test_linear_relationship_is_recovered() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = utf8_dir(&tmp);
    write_linear_days(&dir);

    let models = build_temperature_models(
        &dir,
        date(1, 1),
        date(1, 31),
        &reference(),
        &OverlapParams::default(),
    )
    .unwrap();
    assert_eq!(models.len(), 1);
    assert_eq!(models_status(&models), RunStatus::Produced);
    let model = models["TUB120011"].as_ref().unwrap();

    assert_eq!(model.available.first, date(1, 1));
    assert_eq!(model.available.last, date(1, 30));
    assert_eq!(model.selected.first, date(1, 1));
    assert!((3..=30).contains(&model.n_days));
    assert_eq!(model.n_samples, 2 * model.n_days);

    for (i, r) in range_axis().iter().enumerate() {
        if *r < 900.0 {
            assert_relative_eq!(model.slope[i].unwrap(), slope(*r), epsilon = 1e-6);
            assert_relative_eq!(model.intercept[i].unwrap(), intercept(*r), epsilon = 1e-6);
            assert_relative_eq!(model.r2[i].unwrap(), 1.0, epsilon = 1e-6);
        } else {
            assert_relative_eq!(model.slope[i].unwrap(), 0.0, epsilon = 1e-9);
            assert_eq!(model.r2[i], None);
        }
    }

    // the model reproduces the overlap of a day
    let predicted = model.corrected_overlap(10.0);
    let expected = linear_daily_result(date(1, 1), 10.0, 1).samples[0].overlap.clone();
    for (p, e) in predicted.iter().zip(&expected) {
        assert_relative_eq!(*p, *e, max_relative = 1e-6);
    }

    let created = hifitime::Epoch::from_gregorian_utc_at_midnight(2023, 2, 1);
    let artifact = ModelArtifact::new(created, date(1, 1), date(1, 31), models);
    let path = artifact.write_to_dir(&dir.join("models")).unwrap();
    assert!(path.ends_with("temperature_model_Payerne_2023-01-01_2023-01-31.json"));
    assert_eq!(ModelArtifact::read_file(&path).unwrap(), artifact);
}

#[test]
fn test_date_range_limits_the_days() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = utf8_dir(&tmp);
    write_linear_days(&dir);

    let models = build_temperature_models(
        &dir,
        date(1, 11),
        date(1, 20),
        &reference(),
        &OverlapParams::default(),
    )
    .unwrap();
    let model = models["TUB120011"].as_ref().unwrap();
    assert_eq!(model.available.first, date(1, 11));
    assert_eq!(model.available.last, date(1, 20));
}

#[test]
fn test_too_few_temperatures() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = utf8_dir(&tmp);
    for day in 1..=10u8 {
        let temperature = if day % 2 == 0 { 5.0 } else { 15.0 };
        linear_daily_result(date(3, day), temperature, 1)
            .write_to_dir(&dir)
            .unwrap();
    }

    let models = build_temperature_models(
        &dir,
        date(3, 1),
        date(3, 31),
        &reference(),
        &OverlapParams::default(),
    )
    .unwrap();
    assert!(matches!(
        models["TUB120011"],
        Err(OverlapError::InsufficientData(_))
    ));
    assert_eq!(models_status(&models), RunStatus::Nothing);
}

#[test]
fn test_single_temperature_is_degenerate() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = utf8_dir(&tmp);
    for day in 1..=20u8 {
        linear_daily_result(date(4, day), 12.0, 1)
            .write_to_dir(&dir)
            .unwrap();
    }

    let models = build_temperature_models(
        &dir,
        date(4, 1),
        date(4, 30),
        &reference(),
        &OverlapParams::default(),
    )
    .unwrap();
    assert!(matches!(
        models["TUB120011"],
        Err(OverlapError::DegenerateFit(_))
    ));
    assert_eq!(models_status(&models), RunStatus::Nothing);
}

#[test]
fn test_module_without_spread_does_not_fail_the_run() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = utf8_dir(&tmp);
    write_linear_days(&dir);
    for day in 1..=10u8 {
        let mut result = linear_daily_result(date(1, day), 12.0, 1);
        result.meta.optical_module_id = "TUB140005".into();
        result.write_to_dir(&dir).unwrap();
    }

    let models = build_temperature_models(
        &dir,
        date(1, 1),
        date(1, 31),
        &reference(),
        &OverlapParams::default(),
    )
    .unwrap();
    assert_eq!(models.len(), 2);
    assert!(models["TUB120011"].is_ok());
    assert!(models["TUB140005"]
        .as_ref()
        .is_err_and(|e| e.is_expected_empty()));
    assert_eq!(models_status(&models), RunStatus::Produced);
}

#[test]
fn test_no_daily_result_in_range() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = utf8_dir(&tmp);
    write_linear_days(&dir);

    let err = build_temperature_models(
        &dir,
        date(6, 1),
        date(6, 30),
        &reference(),
        &OverlapParams::default(),
    )
    .unwrap_err();
    assert!(err.is_no_data());

    assert!(matches!(
        build_temperature_models(
            &dir,
            date(6, 30),
            date(6, 1),
            &reference(),
            &OverlapParams::default()
        ),
        Err(OverlapError::InvalidDate(_))
    ));
}

#[test]
fn test_resolution_change_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = utf8_dir(&tmp);
    write_linear_days(&dir);

    let mut coarse = linear_daily_result(date(1, 31), 20.0, 1);
    coarse.range_resolution = 30.0;
    coarse.write_to_dir(&dir).unwrap();

    let models = build_temperature_models(
        &dir,
        date(1, 1),
        date(1, 31),
        &reference(),
        &OverlapParams::default(),
    )
    .unwrap();
    assert!(matches!(
        models["TUB120011"],
        Err(OverlapError::FormatMismatch(_))
    ));
    assert_eq!(models_status(&models), RunStatus::Failed);
}
