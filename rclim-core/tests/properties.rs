//! End-to-end properties of the reductions.
//!
//! These tests check the reductions against results that are known in closed
//! form for synthetic fields:
//! - climatologies against naive means
//! - area-weighted means of uniform and partially missing fields
//! - trends of exactly linear fields

use approx::assert_relative_eq;
use rclim_core::averaging::weighted_mean;
use rclim_core::axis::TimeAxis;
use rclim_core::calendar::{GroupKey, Season, TimeGrouping};
use rclim_core::climatology::{annual_mean, climatology};
use rclim_core::field::GridField;
use rclim_core::spatial::LatLonGrid;
use rclim_core::timeseries::FloatValue;
use rclim_core::trend::{trend, trend_by_year};
use chrono::Datelike;

/// A coarse global grid, north to south
fn global_grid() -> LatLonGrid {
    LatLonGrid::regular(80.0, -20.0, 9, 0.0, 30.0, 12).unwrap()
}

/// Deterministic but irregular values
fn wiggle(t: usize, i: usize, j: usize) -> FloatValue {
    250.0 + 30.0 * ((t * 7 + i * 3 + j) as FloatValue).sin() + i as FloatValue
}

mod climatology_reducer {
    use super::*;

    #[test]
    fn test_overall_mean_equals_naive_mean() {
        let field = GridField::from_fn(
            "t2m",
            "K",
            TimeAxis::monthly(1990, 1, 60).unwrap(),
            global_grid(),
            wiggle,
        );
        let clim = climatology(&field, TimeGrouping::All);
        let overall = clim.get(&GroupKey::All).unwrap();

        for i in 0..9 {
            for j in 0..12 {
                let naive: FloatValue = (0..60).map(|t| wiggle(t, i, j)).sum::<FloatValue>() / 60.0;
                assert_relative_eq!(overall.get(i, j).unwrap(), naive, epsilon = 1e-9);
                assert_eq!(overall.counts()[[i, j]], 60);
            }
        }
    }

    #[test]
    fn test_four_years_grouped_by_season() {
        // Each sample holds its calendar month
        let time = TimeAxis::monthly(2001, 1, 48).unwrap();
        let months: Vec<u32> = time.values().iter().map(|t| t.month()).collect();
        let field = GridField::from_fn("month", "1", time, global_grid(), |t, _, _| {
            months[t] as FloatValue
        });

        let seasons = climatology(&field, TimeGrouping::Season);
        assert_eq!(
            seasons.keys(),
            Season::ALL.iter().map(|s| GroupKey::Season(*s)).collect::<Vec<_>>()
        );
        for season in Season::ALL {
            let group = seasons.get(&GroupKey::Season(season)).unwrap();
            assert!(group.counts().iter().all(|c| *c == 12));
            let expected = season.months().iter().sum::<u32>() as FloatValue / 3.0;
            assert!(group
                .values()
                .iter()
                .all(|v| (v - expected).abs() < 1e-12));
        }
        // December joins January and February
        let djf = seasons.get(&GroupKey::Season(Season::DJF)).unwrap();
        assert_relative_eq!(djf.get(0, 0).unwrap(), 5.0);
    }

    #[test]
    fn test_missing_sample_stays_in_its_cell() {
        let mut values = GridField::from_fn(
            "t2m",
            "K",
            TimeAxis::monthly(1990, 1, 24).unwrap(),
            global_grid(),
            wiggle,
        )
        .into_values();
        values[[5, 4, 4]] = FloatValue::NAN;
        let field = GridField::new(
            "t2m",
            "K",
            TimeAxis::monthly(1990, 1, 24).unwrap(),
            global_grid(),
            values,
        )
        .unwrap();

        let clim = climatology(&field, TimeGrouping::All);
        let overall = &clim.fields()[0];
        assert!(overall.values().iter().all(|v| !v.is_nan()));
        assert_eq!(overall.counts()[[4, 4]], 23);
        assert_eq!(overall.counts()[[4, 5]], 24);
    }
}

mod spatial_averager {
    use super::*;

    #[test]
    fn test_uniform_field_averages_to_its_value() {
        for c in [-40.0, 0.0, 14.7, 288.15] {
            let field = GridField::filled(
                "t2m",
                "K",
                TimeAxis::monthly(2000, 1, 12).unwrap(),
                global_grid(),
                c,
            );
            let series = weighted_mean(&field).unwrap();
            for v in series.values() {
                assert_relative_eq!(*v, c, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_missing_cell_keeps_weights_normalised() {
        let mut field = GridField::filled(
            "t2m",
            "K",
            TimeAxis::monthly(2000, 1, 3).unwrap(),
            global_grid(),
            10.0,
        )
        .into_values();
        field[[1, 0, 0]] = FloatValue::NAN;
        let field = GridField::new(
            "t2m",
            "K",
            TimeAxis::monthly(2000, 1, 3).unwrap(),
            global_grid(),
            field,
        )
        .unwrap();

        let series = weighted_mean(&field).unwrap();
        // Dropping a cell of a uniform field must not bias the mean
        for v in series.values() {
            assert_relative_eq!(*v, 10.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_time_series_export() {
        let field = GridField::filled(
            "t2m",
            "degC",
            TimeAxis::yearly(2000, 2).unwrap(),
            global_grid(),
            1.5,
        );
        let mut buf = Vec::new();
        weighted_mean(&field).unwrap().write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "time,value");
        assert!(lines[1].starts_with("2000-01-01T00:00:00,1."));
        assert_eq!(lines.len(), 3);
    }
}

mod trend_estimator {
    use super::*;

    #[test]
    fn test_linear_field_recovers_coefficients() {
        let a = |i: usize, j: usize| 5.0 + i as FloatValue - 0.5 * j as FloatValue;
        let b = |i: usize, j: usize| 0.01 * (i as FloatValue - 4.0) + 0.002 * j as FloatValue;
        let field = GridField::from_fn(
            "t2m",
            "degC",
            TimeAxis::yearly(1980, 40).unwrap(),
            global_grid(),
            |t, i, j| a(i, j) + b(i, j) * (1980 + t) as FloatValue,
        );

        let trends = trend_by_year(&field).unwrap();
        for i in 0..9 {
            for j in 0..12 {
                let cell = trends.get(i, j).unwrap();
                assert_relative_eq!(cell.slope, b(i, j), epsilon = 1e-10);
                assert_relative_eq!(cell.intercept, a(i, j), epsilon = 1e-6);
                if b(i, j).abs() > 1e-6 {
                    assert_relative_eq!(cell.rvalue.abs(), 1.0, epsilon = 1e-9);
                    assert!(cell.pvalue < 1e-10);
                }
            }
        }
    }

    #[test]
    fn test_cooling_of_three_tenths_per_decade() {
        // Monthly Kelvin data 1979-2020 cooling by 0.3 degrees per decade, no noise
        let time = TimeAxis::monthly(1979, 1, 42 * 12).unwrap();
        let years = time.years();
        let field = GridField::from_fn("t2m", "K", time, global_grid(), |t, i, _| {
            288.0 - 0.03 * (years[t] - 1979) as FloatValue - i as FloatValue
        });

        let annual = annual_mean(&field.to_celsius().unwrap()).unwrap();
        assert_eq!(annual.time().len(), 42);
        let trends = trend_by_year(&annual).unwrap();
        for (slope, pvalue) in trends.slope().iter().zip(trends.pvalue().iter()) {
            assert_relative_eq!(*slope, -0.03, epsilon = 1e-9);
            assert!(*pvalue < 0.01);
        }
        let decadal = trends.per_decade();
        assert_relative_eq!(decadal.slope()[[0, 0]], -0.3, epsilon = 1e-8);
        assert!(trends.significant(0.01).iter().all(|s| *s));
    }

    #[test]
    fn test_cell_with_one_valid_point_is_undefined() {
        let field = GridField::from_fn(
            "t2m",
            "K",
            TimeAxis::yearly(2000, 5).unwrap(),
            global_grid(),
            |t, i, j| {
                if i == 0 && j == 0 && t > 0 {
                    FloatValue::NAN
                } else {
                    t as FloatValue
                }
            },
        );
        let covariate: Vec<FloatValue> = (0..5).map(FloatValue::from).collect();
        let trends = trend(&field, &covariate).unwrap();
        let cell = trends.get(0, 0).unwrap();
        assert!(!cell.is_defined());
        assert_eq!(cell.n, 1);
        assert_relative_eq!(trends.slope()[[0, 1]], 1.0, epsilon = 1e-12);
    }
}
