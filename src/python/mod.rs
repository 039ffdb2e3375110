use numpy::{IntoPyArray, PyArray1, PyArray2, PyArray3, PyReadonlyArray3, ToPyArray};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyDict;
use rclim_core::averaging;
use rclim_core::axis::TimeAxis;
use rclim_core::calendar::TimeGrouping;
use rclim_core::climatology;
use rclim_core::errors::RClimError;
use rclim_core::field::GridField;
use rclim_core::spatial::LatLonGrid;
use rclim_core::timeseries::FloatValue;
use rclim_core::trend::{self, TrendField};
use rclim_regrid::RegridMethod;

fn to_py_err(e: RClimError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

fn grid(lat: Vec<FloatValue>, lon: Vec<FloatValue>) -> PyResult<LatLonGrid> {
    LatLonGrid::from_coordinates(lat, lon).map_err(to_py_err)
}

/// A (time, lat, lon) field with missing values stored as NaN
#[pyclass]
#[pyo3(name = "GridField")]
#[derive(Debug, Clone)]
pub struct PyGridField(pub GridField);

#[pymethods]
impl PyGridField {
    /// Times are seconds since 1970-01-01 UTC
    #[new]
    #[pyo3(signature = (values, times, lat, lon, units, name="field"))]
    fn new(
        values: PyReadonlyArray3<FloatValue>,
        times: Vec<i64>,
        lat: Vec<FloatValue>,
        lon: Vec<FloatValue>,
        units: &str,
        name: &str,
    ) -> PyResult<Self> {
        let time = TimeAxis::from_unix_seconds(&times).map_err(to_py_err)?;
        GridField::new(name, units, time, grid(lat, lon)?, values.as_array().to_owned())
            .map(Self)
            .map_err(to_py_err)
    }

    #[getter]
    fn name(&self) -> String {
        self.0.name().to_string()
    }

    #[getter]
    fn units(&self) -> String {
        self.0.units().to_string()
    }

    #[getter]
    fn times(&self) -> Vec<i64> {
        self.0.time().unix_seconds()
    }

    #[getter]
    fn lat(&self) -> Vec<FloatValue> {
        self.0.lat().values().to_vec()
    }

    #[getter]
    fn lon(&self) -> Vec<FloatValue> {
        self.0.lon().values().to_vec()
    }

    #[getter]
    fn values<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray3<FloatValue>> {
        self.0.values().to_pyarray_bound(py)
    }

    fn to_celsius(&self) -> PyResult<Self> {
        self.0.to_celsius().map(Self).map_err(to_py_err)
    }

    /// Keep the time steps of the years `start..=end`
    fn select_years(&self, start: i32, end: i32) -> PyResult<Self> {
        self.0.select_years(start, end).map(Self).map_err(to_py_err)
    }

    fn annual_mean(&self) -> PyResult<Self> {
        climatology::annual_mean(&self.0).map(Self).map_err(to_py_err)
    }

    fn seasonal_means(&self) -> PyResult<Self> {
        climatology::seasonal_means(&self.0).map(Self).map_err(to_py_err)
    }

    /// Mean of every group as a dict of (lat, lon) arrays keyed by group label
    #[pyo3(signature = (grouping="all"))]
    fn climatology<'py>(&self, py: Python<'py>, grouping: &str) -> PyResult<Bound<'py, PyDict>> {
        let grouping: TimeGrouping = grouping.parse().map_err(to_py_err)?;
        let out = PyDict::new_bound(py);
        for field in climatology::climatology(&self.0, grouping).iter() {
            out.set_item(field.key().to_string(), field.values().to_pyarray_bound(py))?;
        }
        Ok(out)
    }

    /// Departures from the climatology of the years `start..=end`
    #[pyo3(signature = (start, end, grouping="month"))]
    fn anomalies(&self, start: i32, end: i32, grouping: &str) -> PyResult<Self> {
        let grouping: TimeGrouping = grouping.parse().map_err(to_py_err)?;
        let baseline = self.0.select_years(start, end).map_err(to_py_err)?;
        let clim = climatology::climatology(&baseline, grouping);
        climatology::anomalies(&self.0, &clim)
            .map(Self)
            .map_err(to_py_err)
    }

    /// Area-weighted mean of every time step
    fn weighted_mean<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyArray1<FloatValue>>> {
        let series = averaging::weighted_mean(&self.0).map_err(to_py_err)?;
        Ok(series.values().to_pyarray_bound(py))
    }

    /// Per-cell linear trend against `covariate`, or against the year when omitted
    #[pyo3(signature = (covariate=None, min_samples=2))]
    fn trend(&self, covariate: Option<Vec<FloatValue>>, min_samples: usize) -> PyResult<PyTrendField> {
        let covariate = covariate.unwrap_or_else(|| {
            self.0
                .time()
                .years()
                .into_iter()
                .map(FloatValue::from)
                .collect()
        });
        trend::trend_with_min_samples(&self.0, &covariate, min_samples)
            .map(PyTrendField)
            .map_err(to_py_err)
    }

    fn __repr__(&self) -> String {
        let (nt, nlat, nlon) = self.0.shape();
        format!(
            "<GridField {} [{}] time={} lat={} lon={}>",
            self.0.name(),
            self.0.units(),
            nt,
            nlat,
            nlon
        )
    }
}

/// Per-cell regression statistics
#[pyclass]
#[pyo3(name = "TrendField")]
#[derive(Debug, Clone)]
pub struct PyTrendField(pub TrendField);

#[pymethods]
impl PyTrendField {
    #[getter]
    fn slope<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray2<FloatValue>> {
        self.0.slope().to_pyarray_bound(py)
    }

    #[getter]
    fn intercept<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray2<FloatValue>> {
        self.0.intercept().to_pyarray_bound(py)
    }

    #[getter]
    fn rvalue<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray2<FloatValue>> {
        self.0.rvalue().to_pyarray_bound(py)
    }

    #[getter]
    fn pvalue<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray2<FloatValue>> {
        self.0.pvalue().to_pyarray_bound(py)
    }

    #[getter]
    fn stderr<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray2<FloatValue>> {
        self.0.stderr().to_pyarray_bound(py)
    }

    #[getter]
    fn counts<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray2<usize>> {
        self.0.counts().to_pyarray_bound(py)
    }

    fn per_decade(&self) -> Self {
        Self(self.0.per_decade())
    }

    #[pyo3(signature = (alpha=0.05))]
    fn significant<'py>(&self, py: Python<'py>, alpha: FloatValue) -> Bound<'py, PyArray2<bool>> {
        self.0.significant(alpha).into_pyarray_bound(py)
    }
}

/// Regrid a field onto the grid spanned by `lat` and `lon`
#[pyfunction]
#[pyo3(signature = (field, lat, lon, method="bilinear"))]
fn regrid(
    field: &PyGridField,
    lat: Vec<FloatValue>,
    lon: Vec<FloatValue>,
    method: &str,
) -> PyResult<PyGridField> {
    let method: RegridMethod = method.parse().map_err(to_py_err)?;
    rclim_regrid::regrid(&field.0, &grid(lat, lon)?, method)
        .map(PyGridField)
        .map_err(to_py_err)
}

#[pymodule]
#[pyo3(name = "_lib")]
fn rclim(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    m.add_class::<PyGridField>()?;
    m.add_class::<PyTrendField>()?;
    m.add_function(wrap_pyfunction!(regrid, m)?)?;
    Ok(())
}
