//! A deterministic analytic stand-in for the sour-water stripping flowsheet.
//!
//! Two columns in series: the first strips H2S with reboiler duty `QN1`, the
//! second strips NH3 with reboiler duty `QN2` and condenser duty `QC`. A
//! split fraction `SF` routes part of the feed around the first column.
//! Concentrations fall off exponentially with duty. The flowsheet fails to
//! converge when the combined reboiler duty exceeds [`MAX_TOTAL_DUTY`].

use std::{collections::HashMap, path::Path};

use thiserror::Error;

use super::{RunStatus, Session};

pub const QN1: &str = r"\Data\Blocks\T1\Input\QN";
pub const QN2: &str = r"\Data\Blocks\T2\Input\QN";
pub const QC: &str = r"\Data\Blocks\T2\Input\Q1";
pub const SF: &str = r"\Data\Blocks\SPLIT1\Input\FRAC\AGUAPR5A";

pub const H2S: &str = r"\Data\Streams\AGUAR1\Output\MOLEFRAC\MIXED\H2S";
pub const NH3: &str = r"\Data\Streams\AGUAR1\Output\MOLEFRAC\MIXED\NH3";

pub const T1_BOTTOM: &str = r"\Data\Blocks\T1\Output\B_TEMP\5";
pub const T2_BOTTOM: &str = r"\Data\Blocks\T2\Output\B_TEMP\6";
pub const T2_TOP: &str = r"\Data\Blocks\T2\Output\B_TEMP\2";

/// Combined reboiler duty above which a run does not converge.
pub const MAX_TOTAL_DUTY: f64 = 1.7e6;

const DEFAULTS: [(&str, f64); 4] = [(QN1, 560_000.0), (QN2, 950_000.0), (QC, 3.0), (SF, 0.5)];

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SurrogateError {
    #[error("unknown node path {0}")]
    UnknownPath(String),

    #[error("no results: the last run did not converge or nothing has run yet")]
    NoResults,

    #[error("no case loaded")]
    NoCase,

    #[error("session is closed")]
    Closed,
}

/// An in-process [`Session`] backed by closed-form correlations.
#[derive(Debug, Clone, Default)]
pub struct SurrogateSession {
    inputs: HashMap<&'static str, f64>,
    results: Option<HashMap<&'static str, f64>>,
    closed: bool,
}

impl SurrogateSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> Result<(), SurrogateError> {
        if self.closed {
            return Err(SurrogateError::Closed);
        }
        if self.inputs.is_empty() {
            return Err(SurrogateError::NoCase);
        }
        Ok(())
    }

    fn input(&self, path: &str) -> f64 {
        self.inputs.get(path).copied().unwrap_or_default()
    }
}

fn known_input(path: &str) -> Option<&'static str> {
    DEFAULTS.iter().map(|(p, _)| *p).find(|p| *p == path)
}

fn known_output(path: &str) -> Option<&'static str> {
    [H2S, NH3, T1_BOTTOM, T2_BOTTOM, T2_TOP]
        .into_iter()
        .find(|p| *p == path)
}

/// Stripped-water H2S in ppm.
#[must_use]
pub fn h2s_ppm(qn1: f64, sf: f64) -> f64 {
    0.02 + 2.0 * (-(qn1 - 450_000.0) / 40_000.0).exp() * (1.2 - 0.4 * sf)
}

/// Stripped-water NH3 in ppm.
#[must_use]
pub fn nh3_ppm(qn2: f64, qc: f64) -> f64 {
    2.0 + 60.0 * (-(qn2 - 700_000.0) / 100_000.0).exp() * (1.0 + 0.1 * (qc - 1.0))
}

impl Session for SurrogateSession {
    type Error = SurrogateError;

    fn load_case(&mut self, _path: &Path) -> Result<(), SurrogateError> {
        if self.closed {
            return Err(SurrogateError::Closed);
        }
        self.inputs = DEFAULTS.into_iter().collect();
        self.results = None;
        Ok(())
    }

    fn set_input(&mut self, path: &str, value: f64) -> Result<(), SurrogateError> {
        self.ensure_open()?;
        let key = known_input(path).ok_or_else(|| SurrogateError::UnknownPath(path.to_owned()))?;
        self.inputs.insert(key, value);
        Ok(())
    }

    fn run(&mut self) -> Result<RunStatus, SurrogateError> {
        self.ensure_open()?;
        let (qn1, qn2, qc, sf) = (
            self.input(QN1),
            self.input(QN2),
            self.input(QC),
            self.input(SF),
        );

        if qn1 + qn2 > MAX_TOTAL_DUTY || !(0.0..=1.0).contains(&sf) {
            self.results = None;
            return Ok(RunStatus::NotConverged);
        }

        self.results = Some(HashMap::from([
            (H2S, h2s_ppm(qn1, sf) * 1e-6),
            (NH3, nh3_ppm(qn2, qc) * 1e-6),
            (T1_BOTTOM, 100.0 + qn1 / 20_000.0),
            (T2_BOTTOM, 95.0 + qn2 / 25_000.0),
            (T2_TOP, 40.0 + 5.0 * qc),
        ]));
        Ok(RunStatus::Converged)
    }

    fn get_output(&mut self, path: &str) -> Result<f64, SurrogateError> {
        self.ensure_open()?;
        let key = known_output(path).ok_or_else(|| SurrogateError::UnknownPath(path.to_owned()))?;
        self.results
            .as_ref()
            .and_then(|results| results.get(key).copied())
            .ok_or(SurrogateError::NoResults)
    }

    fn close(&mut self) -> Result<(), SurrogateError> {
        if self.closed {
            return Err(SurrogateError::Closed);
        }
        self.closed = true;
        self.results = None;
        Ok(())
    }
}
