//! Run configuration.
//!
//! Field names are snake_case; the camel-case option names of Badlands XML
//! inputs (`tStart`, `minDT`, `Hillslope`, ...) are accepted as aliases.
use serde::{Deserialize, Deserializer, Serialize};

use crate::boundary::BoundaryCondition;
use crate::erodibility::Layer;
use crate::error::ConfigError;
use crate::flow::fill::FillParams;
use crate::flow::sediment::{SedimentParams, StreamPower};
use crate::forcing::{RiverSource, TabulatedForcing};
use crate::hillslope::Hillslope;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Simulation start time (yr).
    #[serde(alias = "tStart")]
    pub t_start: f64,
    /// Simulation end time (yr).
    #[serde(alias = "tEnd")]
    pub t_end: f64,
    /// Remove every depression from the initial surface.
    #[serde(deserialize_with = "flag")]
    pub nopit: bool,
    #[serde(alias = "minDT")]
    pub min_dt: f64,
    #[serde(alias = "maxDT")]
    pub max_dt: f64,
    /// Enable linear hillslope diffusion.
    #[serde(alias = "Hillslope", deserialize_with = "flag")]
    pub hillslope: bool,
    /// Number of erosion layers; negative disables the erodibility map.
    pub erolays: i32,
    /// Initial stratigraphy, top layer first. Used when `erolays >= 0`.
    pub erosion_layers: Vec<Layer>,
    /// Fraction of incoming sediment deposited on flat land.
    pub perc_dep: f64,
    /// Slope under which land is flat.
    pub slp_cr: f64,
    /// Marine deposit smoothing width (m).
    pub diffsigma: f64,
    #[serde(alias = "fillmax")]
    pub fill_max: f64,
    pub fill_epsilon: f64,
    pub spl_m: f64,
    pub spl_n: f64,
    /// Bedrock stream-power erodibility.
    pub erodibility: f64,
    /// Erodibility of freshly deposited sediment.
    pub sed_erodibility: f64,
    pub cdiff_aerial: f64,
    pub cdiff_marine: f64,
    /// Uniform background rainfall (m/yr).
    pub rain: f64,
    /// `"wall"`, `"flat"` or `"slope"`.
    pub boundary: String,
    /// Constant sea level (m), used when `sea_curve` is empty.
    pub sea_level: f64,
    /// `(time, sea level)` samples.
    pub sea_curve: Vec<(f64, f64)>,
    pub rivers: Vec<RiverSource>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            t_start: 0.0,
            t_end: 1.0e4,
            nopit: false,
            min_dt: 1.0,
            max_dt: 1.0e3,
            hillslope: true,
            erolays: -1,
            erosion_layers: Vec::new(),
            perc_dep: 0.0,
            slp_cr: 0.0,
            diffsigma: 0.0,
            fill_max: 1.0,
            fill_epsilon: 0.01,
            spl_m: 0.5,
            spl_n: 1.0,
            erodibility: 5.0e-6,
            sed_erodibility: 1.0e-5,
            cdiff_aerial: 0.01,
            cdiff_marine: 0.005,
            rain: 1.0,
            boundary: "slope".to_string(),
            sea_level: 0.0,
            sea_curve: Vec::new(),
            rivers: Vec::new(),
        }
    }
}

/// Accept `true`/`false` as well as the integer flags of Badlands inputs.
fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }
    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Int(v) => v != 0,
    })
}

impl SimulationConfig {
    /// Parse and validate a JSON configuration. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.min_dt > 0.0 && self.min_dt <= self.max_dt) {
            return Err(ConfigError::TimestepClamp {
                min_dt: self.min_dt,
                max_dt: self.max_dt,
            });
        }
        let checks: [(&'static str, &'static str, f64, bool); 11] = [
            ("t_end", "at least t_start", self.t_end, self.t_end >= self.t_start),
            ("perc_dep", "within [0, 1]", self.perc_dep, (0.0..=1.0).contains(&self.perc_dep)),
            ("slp_cr", "non-negative", self.slp_cr, self.slp_cr >= 0.0),
            ("diffsigma", "non-negative", self.diffsigma, self.diffsigma >= 0.0),
            ("fill_max", "non-negative", self.fill_max, self.fill_max >= 0.0),
            ("fill_epsilon", "non-negative", self.fill_epsilon, self.fill_epsilon >= 0.0),
            ("spl_n", "positive", self.spl_n, self.spl_n > 0.0),
            ("erodibility", "non-negative", self.erodibility, self.erodibility >= 0.0),
            ("sed_erodibility", "non-negative", self.sed_erodibility, self.sed_erodibility >= 0.0),
            ("cdiff_aerial", "non-negative", self.cdiff_aerial, self.cdiff_aerial >= 0.0),
            ("cdiff_marine", "non-negative", self.cdiff_marine, self.cdiff_marine >= 0.0),
        ];
        for (name, expected, value, ok) in checks {
            if !ok {
                return Err(ConfigError::Parameter { name, expected, value });
            }
        }
        self.boundary_condition()?;
        Ok(())
    }

    pub fn boundary_condition(&self) -> Result<BoundaryCondition, ConfigError> {
        Ok(self.boundary.parse::<BoundaryCondition>()?)
    }

    pub fn fill_params(&self) -> FillParams {
        FillParams { fill_max: self.fill_max, epsilon: self.fill_epsilon }
    }

    pub fn stream_power(&self) -> StreamPower {
        StreamPower { m: self.spl_m, n: self.spl_n }
    }

    pub fn sediment_params(&self) -> SedimentParams {
        SedimentParams {
            spl: self.stream_power(),
            perc_dep: self.perc_dep,
            slp_cr: self.slp_cr,
            diffsigma: self.diffsigma,
        }
    }

    pub fn hillslope_params(&self) -> Hillslope {
        Hillslope { cdiff_aerial: self.cdiff_aerial, cdiff_marine: self.cdiff_marine }
    }

    /// Sea-level and river forcing described by this configuration.
    pub fn forcing(&self, control_volumes: &[f64]) -> TabulatedForcing {
        TabulatedForcing::new(control_volumes, self.sea_level)
            .with_sea_curve(self.sea_curve.clone())
            .with_rivers(self.rivers.iter().copied())
    }
}
