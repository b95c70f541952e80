use approx::assert_relative_eq;
use overlap_probe::daily_processing::{
    collect_day_files, process_day, run_daily_batch, BatchOptions, DayStatus,
};
use overlap_probe::daily_result::DailyResult;
use overlap_probe::overlap_errors::{OverlapError, RunStatus};
use overlap_probe::profiles::ProfileSet;
use overlap_probe::time::CalendarDate;

mod common;
use common::*;

#[test]
fn test_clear_day_gives_one_sample() {
    let set = ProfileSet::from_raw(synthetic_day(180, 60.0, 0)).unwrap();
    let result = process_day(&set, &reference(), &test_params())
        .unwrap()
        .expect("a clear day yields a sample");

    assert_eq!(result.date, CalendarDate::new(2023, 2, 14).unwrap());
    assert_eq!(result.samples.len(), 1);
    let sample = &result.samples[0];
    assert_relative_eq!(sample.internal_temperature, 300.0);
    assert!(sample.rng_lower >= 510.0);
    assert!(sample.rng_upper <= 1500.0);

    // the correction undoes the injected overlap error
    for ((r, ov_ref), ov) in range_axis()
        .iter()
        .zip(&reference().values)
        .zip(&sample.overlap)
    {
        assert_relative_eq!(*ov, ov_ref * (1.0 + perturbation(*r)), max_relative = 1e-6);
    }
}

#[test]
fn test_cloudy_day_gives_nothing() {
    let set = ProfileSet::from_raw(synthetic_day(180, 60.0, 1)).unwrap();
    assert_eq!(process_day(&set, &reference(), &test_params()).unwrap(), None);

    let dir = tempfile::tempdir().unwrap();
    let root = utf8_dir(&dir);
    let input = root.join("L1");
    std::fs::create_dir_all(&input).unwrap();
    write_day_file(&synthetic_day(180, 60.0, 1), &input.join("day.csv"));

    let output = root.join("out");
    let files = collect_day_files(&input).unwrap();
    let report = run_daily_batch(&files, &reference(), &test_params(), &BatchOptions::new(&output));
    assert_eq!(report.produced(), 0);
    assert_eq!(report.failed(), 0);
    assert_eq!(report.status(), RunStatus::Nothing);
    let day = CalendarDate::new(2023, 2, 14).unwrap();
    assert_eq!(report.days["TUB120011"][&day], Ok(DayStatus::NoSample));
    assert!(!output.exists());
}

#[test]
fn test_missing_profile_is_filled() {
    let mut day = synthetic_day(180, 60.0, 0);
    day.profiles.remove(50);
    let set = ProfileSet::from_raw(day).unwrap();
    assert_eq!(set.len(), 180);
    assert_eq!(set.measured_count(), 179);
    assert!(set.is_missing(50));
    assert!(process_day(&set, &reference(), &test_params())
        .unwrap()
        .is_some());
}

#[test]
fn test_batch_writes_identical_results() {
    let dir = tempfile::tempdir().unwrap();
    let root = utf8_dir(&dir);
    let input = root.join("L1");
    std::fs::create_dir_all(input.join("nested")).unwrap();
    write_day_file(&synthetic_day(180, 60.0, 0), &input.join("nested").join("day.csv"));
    std::fs::write(input.join("broken.csv"), "not an L1 file\n").unwrap();

    let files = collect_day_files(&input).unwrap();
    assert_eq!(files.len(), 2);

    let first = root.join("first");
    let second = root.join("second");
    let mut paths = Vec::new();
    for output in [&first, &second] {
        let report =
            run_daily_batch(&files, &reference(), &test_params(), &BatchOptions::new(output));
        assert_eq!(report.produced(), 1);
        assert_eq!(report.unreadable.len(), 1);
        // one unreadable file does not fail a run that wrote a day
        assert_eq!(report.status(), RunStatus::Produced);
        assert!(matches!(
            report.unreadable[0].1,
            OverlapError::ReadDayFile { .. }
        ));
        let day = CalendarDate::new(2023, 2, 14).unwrap();
        let Ok(DayStatus::Written(path)) = &report.days["TUB120011"][&day] else {
            panic!("day not written: {:?}", report.days);
        };
        assert!(path.ends_with("Payerne/ov_results_Payerne_TUB120011_2023-02-14.csv"));
        paths.push(path.clone());
    }

    let a = std::fs::read(&paths[0]).unwrap();
    let b = std::fs::read(&paths[1]).unwrap();
    assert_eq!(a, b);

    let result = DailyResult::read_file(&paths[0]).unwrap();
    assert_eq!(result.meta, meta());
    assert_eq!(result.samples.len(), 1);
    assert_eq!(result.range, range_axis());

    // daily results are not picked up as input
    let again = collect_day_files(&root).unwrap();
    assert!(again.iter().all(|p| !p.as_str().contains("ov_results")));
}

#[test]
fn test_skip_existing_and_no_write() {
    let dir = tempfile::tempdir().unwrap();
    let root = utf8_dir(&dir);
    let input = root.join("day.csv");
    write_day_file(&synthetic_day(180, 60.0, 0), &input);
    let files = collect_day_files(&input).unwrap();
    assert_eq!(files, vec![input.clone()]);

    let output = root.join("out");
    let day = CalendarDate::new(2023, 2, 14).unwrap();

    let mut dry = BatchOptions::new(&output);
    dry.write = false;
    let report = run_daily_batch(&files, &reference(), &test_params(), &dry);
    assert!(matches!(
        report.days["TUB120011"][&day],
        Ok(DayStatus::Computed(_))
    ));
    assert!(!output.exists());

    let report = run_daily_batch(&files, &reference(), &test_params(), &BatchOptions::new(&output));
    let Ok(DayStatus::Written(path)) = &report.days["TUB120011"][&day] else {
        panic!("day not written");
    };

    let mut options = BatchOptions::new(&output);
    options.skip_existing = true;
    let report = run_daily_batch(&files, &reference(), &test_params(), &options);
    assert_eq!(
        report.days["TUB120011"][&day],
        Ok(DayStatus::Skipped(path.clone()))
    );
    assert_eq!(report.produced(), 1);
}

#[test]
fn test_missing_input_is_no_data() {
    let dir = tempfile::tempdir().unwrap();
    let missing = utf8_dir(&dir).join("nothing_here");
    assert!(collect_day_files(&missing).unwrap_err().is_no_data());
}

#[test]
fn test_only_unreadable_files_fail_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let root = utf8_dir(&dir);
    std::fs::write(root.join("broken.csv"), "not an L1 file\n").unwrap();

    let files = collect_day_files(&root).unwrap();
    let report = run_daily_batch(
        &files,
        &reference(),
        &test_params(),
        &BatchOptions::new(&root.join("out")),
    );
    assert_eq!(report.produced(), 0);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.status(), RunStatus::Failed);
}
