//! Constant table: parameter groups, literal constants and the typed constant set
//!
//! Four parameter groups (`yoecldp`, `yoethf`, `yomcst`, `yrecldp`) and a set of literal
//! constants are merged once per engine into a [`ConstantTable`]; later sources override
//! earlier ones and literals always win. The table is then lowered into [`Constants`], an
//! immutable typed structure that every kernel receives by reference, so no string
//! lookup happens during a sweep.
//!
//! # References
//!
//! - ECMWF IFS documentation, Part IV: Physical processes, Chapter 7 (clouds and
//!   large-scale precipitation)
//! - Tompkins, Gierens & Rädel (2007), QJRMS 133, ice supersaturation
//! - Khairoutdinov & Kogan (2000), MWR 128, warm-rain autoconversion

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::debug;

use super::species::{Phase, PerSpecies, Species, SpeciesTable};
use crate::error::{CloudscError, CloudscResult};

/// Flat name → value parameter group
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterGroup(FxHashMap<String, f64>);

impl ParameterGroup {
    /// Empty group
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    #[must_use]
    pub fn with(mut self, key: &str, value: f64) -> Self {
        self.0.insert(key.to_owned(), value);
        self
    }

    /// Insert or replace a parameter, returning the previous value
    pub fn insert(&mut self, key: &str, value: f64) -> Option<f64> {
        self.0.insert(key.to_owned(), value)
    }

    /// Remove a parameter
    pub fn remove(&mut self, key: &str) -> Option<f64> {
        self.0.remove(key)
    }

    /// Look up a parameter
    #[must_use]
    pub fn get(&self, key: &str) -> Option<f64> {
        self.0.get(key).copied()
    }

    /// Number of parameters
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the group is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `(name, value)` pairs in arbitrary order
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, &v)| (k.as_str(), v))
    }
}

/// The four physical parameter groups
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterGroups {
    /// Cloud-scheme species indices
    pub yoecldp: ParameterGroup,
    /// Thermodynamic saturation coefficients
    pub yoethf: ParameterGroup,
    /// Universal physical constants
    pub yomcst: ParameterGroup,
    /// Tunable cloud-scheme parameters
    pub yrecldp: ParameterGroup,
}

impl ParameterGroups {
    /// Operational IFS values
    #[must_use]
    pub fn ifs_defaults() -> Self {
        let rg = 9.80665;
        let rd = 287.0597;
        let rv = 461.5250;
        let rcpd = 3.5 * rd;
        let rlvtt = 2.5008e6;
        let rlstt = 2.8345e6;
        let rlmlt = rlstt - rlvtt;
        let rtt = 273.16;

        let yomcst = ParameterGroup::new()
            .with("RG", rg)
            .with("RD", rd)
            .with("RV", rv)
            .with("RCPD", rcpd)
            .with("RETV", rv / rd - 1.0)
            .with("RLVTT", rlvtt)
            .with("RLSTT", rlstt)
            .with("RLMLT", rlmlt)
            .with("RTT", rtt);

        let r3les = 17.502;
        let r3ies = 22.587;
        let r4les = 32.19;
        let r4ies = -0.7;
        let r5les = r3les * (rtt - r4les);
        let r5ies = r3ies * (rtt - r4ies);
        let rtwat = rtt;
        let rtice = rtt - 23.0;
        let rticecu = rtt - 23.0;
        let yoethf = ParameterGroup::new()
            .with("R2ES", 611.21 * rd / rv)
            .with("R3LES", r3les)
            .with("R3IES", r3ies)
            .with("R4LES", r4les)
            .with("R4IES", r4ies)
            .with("R5LES", r5les)
            .with("R5IES", r5ies)
            .with("R5ALVCP", r5les * rlvtt / rcpd)
            .with("R5ALSCP", r5ies * rlstt / rcpd)
            .with("RALVDCP", rlvtt / rcpd)
            .with("RALSDCP", rlstt / rcpd)
            .with("RALFDCP", rlmlt / rcpd)
            .with("RTWAT", rtwat)
            .with("RTBER", rtt - 5.0)
            .with("RTBERCU", rtt - 5.0)
            .with("RTICE", rtice)
            .with("RTICECU", rticecu)
            .with("RTWAT_RTICE_R", 1.0 / (rtwat - rtice))
            .with("RTWAT_RTICECU_R", 1.0 / (rtwat - rticecu))
            .with("RKOOP1", 2.583)
            .with("RKOOP2", 0.48116e-2);

        let yoecldp = ParameterGroup::new()
            .with("NCLV", 5.0)
            .with("NCLDQL", 1.0)
            .with("NCLDQI", 2.0)
            .with("NCLDQR", 3.0)
            .with("NCLDQS", 4.0)
            .with("NCLDQV", 5.0);

        // Rain size distribution: m = a D^b, v = c D^d, N0 = x1 lambda^x2
        let rdenswat = 1000.0;
        let rcl_ar = PI * rdenswat / 6.0;
        let rcl_br = 3.0;
        let rcl_cr: f64 = 386.8;
        let rcl_dr = 0.67;
        let rcl_x1r = 0.22;
        let rcl_x2r = 2.2;
        let schmidt: f64 = 0.6;
        let kinematic_viscosity: f64 = 1.5e-5;
        let bigg_b = 100.0;
        // Gamma(b + 1), Gamma(b + 4), Gamma((d + 5) / 2)
        let gamma_b1 = 6.0;
        let gamma_b4 = 720.0;
        let gamma_vent = 1.726_995_177_081_834_4;

        let yrecldp = ParameterGroup::new()
            .with("RAMID", 0.8)
            .with("RAMIN", 1.0e-8)
            .with("RLMIN", 1.0e-8)
            .with("RCLDIFF", 3.0e-6)
            .with("RCLDIFF_CONVI", 7.0)
            .with("RCLCRIT", 0.3e-3)
            .with("RCLCRIT_SEA", 0.25e-3)
            .with("RCLCRIT_LAND", 0.55e-3)
            .with("RKCONV", 1.0 / 6000.0)
            .with("RPRC1", 100.0)
            .with("RPECONS", 5.547e-5)
            .with("RVRFACTOR", 0.00509)
            .with("RPRECRHMAX", 0.7)
            .with("RTAUMEL", 7200.0)
            .with("RKOOPTAU", 10800.0)
            .with("RLCRITSNOW", 3.0e-5)
            .with("RSNOWLIN1", 0.001)
            .with("RSNOWLIN2", 0.03)
            .with("RICEINIT", 1.0e-12)
            .with("RVICE", 0.13)
            .with("RVRAIN", 4.0)
            .with("RVSNOW", 1.0)
            .with("RTHOMO", rtt - 38.0)
            .with("RCOVPMIN", 0.1)
            .with("RNICE", 0.027)
            .with("RCCN", 125.0)
            .with("RCLDTOPCF", 0.01)
            .with("RDEPLIQREFRATE", 0.1)
            .with("RDEPLIQREFDEPTH", 500.0)
            .with("RCL_KKAAC", 67.0)
            .with("RCL_KKBAC", 1.15)
            .with("RCL_KKAAU", 1350.0)
            .with("RCL_KKBAUQ", 2.47)
            .with("RCL_KKBAUN", -1.79)
            .with("RCL_KK_CLOUD_NUM_SEA", 50.0)
            .with("RCL_KK_CLOUD_NUM_LAND", 300.0)
            .with("RDENSWAT", rdenswat)
            .with("RDENSREF", 1.0)
            .with("RCL_FAC1", rcl_ar * rcl_x1r * gamma_b1)
            .with("RCL_FAC2", 1.0 / (rcl_br + 1.0 - rcl_x2r))
            .with("RCL_CONST1R", 2.0 * PI * rcl_x1r)
            .with(
                "RCL_CONST2R",
                0.31 * schmidt.cbrt() * (rcl_cr / kinematic_viscosity).sqrt() * gamma_vent,
            )
            .with("RCL_CONST3R", rcl_x2r - 0.5 * (rcl_dr + 5.0))
            .with("RCL_CONST4R", rcl_x2r - 2.0)
            .with("RCL_CONST5R", rcl_ar * bigg_b * PI / 6.0 * rcl_x1r * gamma_b4)
            .with("RCL_CONST6R", rcl_x2r - rcl_br - 4.0)
            .with("RCL_FZRAB", -0.66)
            .with("RCL_KA273", 2.4e-2)
            .with("RCL_DV273", 2.21e-5)
            .with("LAERLIQAUTOLSP", 0.0)
            .with("LAERLIQCOLL", 0.0)
            .with("LAERICESED", 0.0)
            .with("LAERICEAUTO", 0.0)
            .with("NSSOPT", 1.0);

        Self {
            yoecldp,
            yoethf,
            yomcst,
            yrecldp,
        }
    }

    fn get(&self, key: &str) -> Option<f64> {
        self.yrecldp
            .get(key)
            .or_else(|| self.yomcst.get(key))
            .or_else(|| self.yoethf.get(key))
            .or_else(|| self.yoecldp.get(key))
    }
}

/// Value of a literal constant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LiteralValue {
    /// Plain number
    Number(f64),
    /// Boolean switch, stored as 0 or 1
    Flag(bool),
    /// Integer index or mode selector
    Index(i64),
    /// Copy of a parameter-group value
    Param(String),
    /// `numerator / denominator`, both parameter-group keys
    Ratio(String, String),
    /// `1 / (minuend - subtrahend)`, both parameter-group keys
    InverseDifference(String, String),
}

impl LiteralValue {
    /// Copy of parameter `key`
    #[must_use]
    pub fn param(key: &str) -> Self {
        Self::Param(key.to_owned())
    }

    /// Whether the value is computed from parameter groups
    #[must_use]
    pub fn is_derived(&self) -> bool {
        matches!(
            self,
            Self::Param(_) | Self::Ratio(..) | Self::InverseDifference(..)
        )
    }

    fn evaluate(&self, literal: &str, groups: &ParameterGroups) -> CloudscResult<f64> {
        let source = |key: &str| {
            groups.get(key).ok_or_else(|| CloudscError::MissingSourceKey {
                literal: literal.to_owned(),
                key: key.to_owned(),
            })
        };
        Ok(match self {
            Self::Number(v) => *v,
            Self::Flag(b) => f64::from(u8::from(*b)),
            Self::Index(i) => *i as f64,
            Self::Param(key) => source(key)?,
            Self::Ratio(num, den) => source(num)? / source(den)?,
            Self::InverseDifference(a, b) => 1.0 / (source(a)? - source(b)?),
        })
    }
}

/// Ordered literal constants
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiteralSet {
    entries: Vec<(String, LiteralValue)>,
}

impl LiteralSet {
    /// Standard literal set for a grid with `nlev` full levels
    #[must_use]
    pub fn standard(nlev: usize) -> Self {
        use LiteralValue::{Flag, Index, InverseDifference, Number, Ratio};
        let param = LiteralValue::param;
        let entries = vec![
            ("DEPICE", Index(1)),
            ("EPSEC", Number(1.0e-14)),
            ("EPSILON", Number(100.0 * f64::EPSILON)),
            ("EVAPRAIN", Index(2)),
            ("EVAPSNOW", Index(1)),
            ("FALLQV", Flag(false)),
            ("FALLQL", Flag(false)),
            ("FALLQI", Flag(false)),
            ("FALLQR", Flag(true)),
            ("FALLQS", Flag(true)),
            ("MELTQV", Index(super::species::NO_MELT_TARGET)),
            ("MELTQL", param("NCLDQI")),
            ("MELTQI", param("NCLDQR")),
            ("MELTQR", param("NCLDQS")),
            ("MELTQS", param("NCLDQR")),
            ("NLEV", Index(nlev as i64)),
            ("PHASEQV", Index(0)),
            ("PHASEQL", Index(1)),
            ("PHASEQI", Index(2)),
            ("PHASEQR", Index(1)),
            ("PHASEQS", Index(2)),
            ("RDCP", Ratio("RD".into(), "RCPD".into())),
            (
                "RLDCP",
                InverseDifference("RALSDCP".into(), "RALVDCP".into()),
            ),
            ("TW1", Number(1329.31)),
            ("TW2", Number(0.0074615)),
            ("TW3", Number(0.85e5)),
            ("TW4", Number(40.637)),
            ("TW5", Number(275.0)),
            ("VQV", Number(0.0)),
            ("VQL", Number(0.0)),
            ("VQI", param("RVICE")),
            ("VQR", param("RVRAIN")),
            ("VQS", param("RVSNOW")),
            ("WARMRAIN", Index(2)),
        ];
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.to_owned(), v))
                .collect(),
        }
    }

    /// Insert or override a literal
    pub fn insert(&mut self, key: &str, value: LiteralValue) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_owned(), value)),
        }
    }

    /// Remove a literal, returning its value
    pub fn remove(&mut self, key: &str) -> Option<LiteralValue> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    /// Look up a literal
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&LiteralValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Number of literals
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Merged name → value mapping
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantTable {
    values: FxHashMap<String, f64>,
}

impl ConstantTable {
    /// Merge the parameter groups and literals
    ///
    /// Groups are applied in the order `yoecldp`, `yoethf`, `yomcst`, `yrecldp`, then
    /// the literals; a later source overrides an earlier one on key collision. Literal
    /// formulas are evaluated once here against the parameter groups.
    ///
    /// # Errors
    ///
    /// Returns [`CloudscError::MissingSourceKey`] if a literal formula references a key
    /// that no group provides.
    pub fn resolve(groups: &ParameterGroups, literals: &LiteralSet) -> CloudscResult<Self> {
        let mut values = FxHashMap::default();
        for group in [
            &groups.yoecldp,
            &groups.yoethf,
            &groups.yomcst,
            &groups.yrecldp,
        ] {
            for (key, value) in group.iter() {
                values.insert(key.to_owned(), value);
            }
        }

        let mut derived = 0;
        for (key, literal) in &literals.entries {
            let value = literal.evaluate(key, groups)?;
            if literal.is_derived() {
                derived += 1;
            }
            values.insert(key.clone(), value);
        }

        debug!(
            "Resolved constant table: {} entries ({} literals, {} derived)",
            values.len(),
            literals.len(),
            derived
        );
        Ok(Self { values })
    }

    /// Look up a constant
    #[must_use]
    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    /// Look up a required constant
    ///
    /// # Errors
    ///
    /// Returns [`CloudscError::MissingConstant`] if `key` is absent.
    pub fn require(&self, key: &str) -> CloudscResult<f64> {
        self.get(key).ok_or_else(|| CloudscError::missing(key))
    }

    /// Look up a required integral constant
    ///
    /// # Errors
    ///
    /// Returns [`CloudscError::MissingConstant`] if absent, or
    /// [`CloudscError::InvalidConstant`] if the value is not an integer.
    pub fn require_index(&self, key: &str) -> CloudscResult<i64> {
        let value = self.require(key)?;
        if value.fract() != 0.0 || !value.is_finite() {
            return Err(CloudscError::invalid(key, format!("{value} is not an integer")));
        }
        Ok(value as i64)
    }

    /// Look up a required boolean switch (any non-zero value is true)
    ///
    /// # Errors
    ///
    /// Returns [`CloudscError::MissingConstant`] if `key` is absent.
    pub fn require_flag(&self, key: &str) -> CloudscResult<bool> {
        Ok(self.require(key)? != 0.0)
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the table is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Thermodynamic constants (`yomcst`, `yoethf`)
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Thermodynamics {
    pub rg: f64,
    pub rd: f64,
    pub rv: f64,
    pub rcpd: f64,
    pub retv: f64,
    pub rlvtt: f64,
    pub rlstt: f64,
    pub rlmlt: f64,
    pub rtt: f64,
    pub r2es: f64,
    pub r3les: f64,
    pub r3ies: f64,
    pub r4les: f64,
    pub r4ies: f64,
    pub r5les: f64,
    pub r5ies: f64,
    pub r5alvcp: f64,
    pub r5alscp: f64,
    pub ralvdcp: f64,
    pub ralsdcp: f64,
    pub ralfdcp: f64,
    pub rtwat: f64,
    pub rtice: f64,
    pub rtwat_rtice_r: f64,
    pub rkoop1: f64,
    pub rkoop2: f64,
}

/// Tunable cloud-scheme parameters (`yrecldp`)
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CloudParameters {
    pub ramid: f64,
    pub ramin: f64,
    pub rlmin: f64,
    pub rcldiff: f64,
    pub rcldiff_convi: f64,
    pub rclcrit_sea: f64,
    pub rclcrit_land: f64,
    pub rkconv: f64,
    pub rprc1: f64,
    pub rpecons: f64,
    pub rvrfactor: f64,
    pub rprecrhmax: f64,
    pub rtaumel: f64,
    pub rkooptau: f64,
    pub rlcritsnow: f64,
    pub rsnowlin1: f64,
    pub rsnowlin2: f64,
    pub riceinit: f64,
    pub rthomo: f64,
    pub rcovpmin: f64,
    pub rnice: f64,
    pub rccn: f64,
    pub rcldtopcf: f64,
    pub rdepliqrefrate: f64,
    pub rdepliqrefdepth: f64,
    pub rcl_kkaac: f64,
    pub rcl_kkbac: f64,
    pub rcl_kkaau: f64,
    pub rcl_kkbauq: f64,
    pub rcl_kkbaun: f64,
    pub rcl_kk_cloud_num_sea: f64,
    pub rcl_kk_cloud_num_land: f64,
    pub rcl_fac1: f64,
    pub rcl_fac2: f64,
    pub rcl_const1r: f64,
    pub rcl_const2r: f64,
    pub rcl_const3r: f64,
    pub rcl_const4r: f64,
    pub rcl_const5r: f64,
    pub rcl_const6r: f64,
    pub rcl_fzrab: f64,
    pub rcl_ka273: f64,
    pub rcl_dv273: f64,
    pub rdensref: f64,
    pub laerliqautolsp: bool,
    pub laerliqcoll: bool,
    pub laericesed: bool,
    pub laericeauto: bool,
    pub supersaturation: SupersaturationScheme,
}

/// Precipitation evaporation scheme (`EVAPRAIN`, `EVAPSNOW`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EvaporationScheme {
    /// No evaporation
    Off,
    /// Sundqvist-type bulk formula
    Sundqvist,
    /// Diffusional growth integrated over the particle size spectrum
    Diffusional,
}

impl EvaporationScheme {
    fn from_code(key: &str, code: i64) -> CloudscResult<Self> {
        match code {
            0 => Ok(Self::Off),
            1 => Ok(Self::Sundqvist),
            2 => Ok(Self::Diffusional),
            other => Err(CloudscError::invalid(
                key,
                format!("unknown evaporation scheme {other}"),
            )),
        }
    }
}

/// Warm-rain autoconversion scheme (`WARMRAIN`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WarmRainScheme {
    /// Sundqvist (1989)
    Sundqvist,
    /// Khairoutdinov and Kogan (2000)
    KhairoutdinovKogan,
}

impl WarmRainScheme {
    fn from_code(key: &str, code: i64) -> CloudscResult<Self> {
        match code {
            1 => Ok(Self::Sundqvist),
            2 => Ok(Self::KhairoutdinovKogan),
            other => Err(CloudscError::invalid(
                key,
                format!("unknown warm-rain scheme {other}"),
            )),
        }
    }
}

/// Ice supersaturation treatment (`NSSOPT`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SupersaturationScheme {
    /// No ice supersaturation
    None,
    /// Tompkins et al. (2007)
    Tompkins,
    /// Lohmann and Kärcher (2002)
    LohmannKarcher,
    /// Gierens (2003)
    Gierens,
}

impl SupersaturationScheme {
    fn from_code(key: &str, code: i64) -> CloudscResult<Self> {
        match code {
            0 => Ok(Self::None),
            1 => Ok(Self::Tompkins),
            2 => Ok(Self::LohmannKarcher),
            3 => Ok(Self::Gierens),
            other => Err(CloudscError::invalid(
                key,
                format!("unknown supersaturation scheme {other}"),
            )),
        }
    }
}

/// Immutable typed constant set shared by every stage of an engine
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Constants {
    pub thermo: Thermodynamics,
    pub cloud: CloudParameters,
    pub species: SpeciesTable,
    /// Small-number guard
    pub epsec: f64,
    /// Machine-epsilon derived guard
    pub epsilon: f64,
    /// Ice deposition enabled
    pub depice: bool,
    pub rain_evaporation: EvaporationScheme,
    pub snow_evaporation: EvaporationScheme,
    pub warm_rain: WarmRainScheme,
    /// Number of full levels the table was resolved for
    pub nlev: usize,
    /// `RD / RCPD`
    pub rdcp: f64,
    /// `1 / (RALSDCP - RALVDCP)`
    pub rldcp: f64,
    /// Wet-bulb melting coefficients `TW1..TW5`
    pub tw: [f64; 5],
}

impl Constants {
    /// Lower a resolved table into the typed constant set
    ///
    /// # Errors
    ///
    /// Returns [`CloudscError::MissingConstant`] for any absent key and
    /// [`CloudscError::InvalidConstant`] for unusable indices or mode selectors.
    pub fn from_table(table: &ConstantTable) -> CloudscResult<Self> {
        let f = |key: &str| table.require(key);

        let thermo = Thermodynamics {
            rg: f("RG")?,
            rd: f("RD")?,
            rv: f("RV")?,
            rcpd: f("RCPD")?,
            retv: f("RETV")?,
            rlvtt: f("RLVTT")?,
            rlstt: f("RLSTT")?,
            rlmlt: f("RLMLT")?,
            rtt: f("RTT")?,
            r2es: f("R2ES")?,
            r3les: f("R3LES")?,
            r3ies: f("R3IES")?,
            r4les: f("R4LES")?,
            r4ies: f("R4IES")?,
            r5les: f("R5LES")?,
            r5ies: f("R5IES")?,
            r5alvcp: f("R5ALVCP")?,
            r5alscp: f("R5ALSCP")?,
            ralvdcp: f("RALVDCP")?,
            ralsdcp: f("RALSDCP")?,
            ralfdcp: f("RALFDCP")?,
            rtwat: f("RTWAT")?,
            rtice: f("RTICE")?,
            rtwat_rtice_r: f("RTWAT_RTICE_R")?,
            rkoop1: f("RKOOP1")?,
            rkoop2: f("RKOOP2")?,
        };

        let cloud = CloudParameters {
            ramid: f("RAMID")?,
            ramin: f("RAMIN")?,
            rlmin: f("RLMIN")?,
            rcldiff: f("RCLDIFF")?,
            rcldiff_convi: f("RCLDIFF_CONVI")?,
            rclcrit_sea: f("RCLCRIT_SEA")?,
            rclcrit_land: f("RCLCRIT_LAND")?,
            rkconv: f("RKCONV")?,
            rprc1: f("RPRC1")?,
            rpecons: f("RPECONS")?,
            rvrfactor: f("RVRFACTOR")?,
            rprecrhmax: f("RPRECRHMAX")?,
            rtaumel: f("RTAUMEL")?,
            rkooptau: f("RKOOPTAU")?,
            rlcritsnow: f("RLCRITSNOW")?,
            rsnowlin1: f("RSNOWLIN1")?,
            rsnowlin2: f("RSNOWLIN2")?,
            riceinit: f("RICEINIT")?,
            rthomo: f("RTHOMO")?,
            rcovpmin: f("RCOVPMIN")?,
            rnice: f("RNICE")?,
            rccn: f("RCCN")?,
            rcldtopcf: f("RCLDTOPCF")?,
            rdepliqrefrate: f("RDEPLIQREFRATE")?,
            rdepliqrefdepth: f("RDEPLIQREFDEPTH")?,
            rcl_kkaac: f("RCL_KKAAC")?,
            rcl_kkbac: f("RCL_KKBAC")?,
            rcl_kkaau: f("RCL_KKAAU")?,
            rcl_kkbauq: f("RCL_KKBAUQ")?,
            rcl_kkbaun: f("RCL_KKBAUN")?,
            rcl_kk_cloud_num_sea: f("RCL_KK_CLOUD_NUM_SEA")?,
            rcl_kk_cloud_num_land: f("RCL_KK_CLOUD_NUM_LAND")?,
            rcl_fac1: f("RCL_FAC1")?,
            rcl_fac2: f("RCL_FAC2")?,
            rcl_const1r: f("RCL_CONST1R")?,
            rcl_const2r: f("RCL_CONST2R")?,
            rcl_const3r: f("RCL_CONST3R")?,
            rcl_const4r: f("RCL_CONST4R")?,
            rcl_const5r: f("RCL_CONST5R")?,
            rcl_const6r: f("RCL_CONST6R")?,
            rcl_fzrab: f("RCL_FZRAB")?,
            rcl_ka273: f("RCL_KA273")?,
            rcl_dv273: f("RCL_DV273")?,
            rdensref: f("RDENSREF")?,
            laerliqautolsp: table.require_flag("LAERLIQAUTOLSP")?,
            laerliqcoll: table.require_flag("LAERLIQCOLL")?,
            laericesed: table.require_flag("LAERICESED")?,
            laericeauto: table.require_flag("LAERICEAUTO")?,
            supersaturation: SupersaturationScheme::from_code(
                "NSSOPT",
                table.require_index("NSSOPT")?,
            )?,
        };

        let nclv = table.require_index("NCLV")?;
        if nclv != 5 {
            return Err(CloudscError::invalid(
                "NCLV",
                format!("{nclv} moisture species, expected 5"),
            ));
        }

        let mut indices = PerSpecies::splat(0);
        let mut fall = PerSpecies::splat(false);
        let mut vq = PerSpecies::splat(0.0);
        let mut phase = PerSpecies::splat(Phase::Vapour);
        let mut melt = PerSpecies::splat(0);
        for species in Species::ALL {
            let suffix = species.key_suffix();
            indices[species] = table.require_index(&format!("NCLDQ{suffix}"))?;
            fall[species] = table.require_flag(&format!("FALLQ{suffix}"))?;
            vq[species] = table.require(&format!("VQ{suffix}"))?;
            let phase_key = format!("PHASEQ{suffix}");
            phase[species] = Phase::from_code(&phase_key, table.require_index(&phase_key)?)?;
            melt[species] = table.require_index(&format!("MELTQ{suffix}"))?;
        }
        let species = SpeciesTable::new(indices, fall, vq, phase, melt)?;

        let snow_evaporation =
            EvaporationScheme::from_code("EVAPSNOW", table.require_index("EVAPSNOW")?)?;
        if snow_evaporation == EvaporationScheme::Diffusional {
            return Err(CloudscError::invalid(
                "EVAPSNOW",
                "diffusional evaporation is only defined for the rain size spectrum",
            ));
        }

        let nlev = table.require_index("NLEV")?;
        if nlev <= 0 {
            return Err(CloudscError::invalid("NLEV", format!("{nlev} levels")));
        }

        Ok(Self {
            thermo,
            cloud,
            species,
            epsec: f("EPSEC")?,
            epsilon: f("EPSILON")?,
            depice: table.require_index("DEPICE")? == 1,
            rain_evaporation: EvaporationScheme::from_code(
                "EVAPRAIN",
                table.require_index("EVAPRAIN")?,
            )?,
            snow_evaporation,
            warm_rain: WarmRainScheme::from_code("WARMRAIN", table.require_index("WARMRAIN")?)?,
            nlev: nlev as usize,
            rdcp: f("RDCP")?,
            rldcp: f("RLDCP")?,
            tw: [f("TW1")?, f("TW2")?, f("TW3")?, f("TW4")?, f("TW5")?],
        })
    }

    /// Resolve groups and literals and lower them in one step
    ///
    /// # Errors
    ///
    /// Propagates the errors of [`ConstantTable::resolve`] and [`Self::from_table`].
    pub fn resolve(groups: &ParameterGroups, literals: &LiteralSet) -> CloudscResult<Self> {
        Self::from_table(&ConstantTable::resolve(groups, literals)?)
    }

    /// Latent heat over heat capacity for a species' phase (0 for vapour)
    #[inline]
    #[must_use]
    pub fn latent_heat_factor(&self, species: Species) -> f64 {
        match self.species.phase[species] {
            Phase::Vapour => 0.0,
            Phase::Liquid => self.thermo.ralvdcp,
            Phase::Ice => self.thermo.ralsdcp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_table_resolves() {
        let c = Constants::resolve(&ParameterGroups::ifs_defaults(), &LiteralSet::standard(10))
            .unwrap();
        assert_eq!(c.nlev, 10);
        assert_eq!(c.species.vq[Species::Snow], 1.0);
        assert_eq!(c.species.vq[Species::Ice], 0.13);
        assert_eq!(c.rain_evaporation, EvaporationScheme::Diffusional);
        assert_eq!(c.snow_evaporation, EvaporationScheme::Sundqvist);
        assert_eq!(c.warm_rain, WarmRainScheme::KhairoutdinovKogan);
        assert!(c.depice);
        assert_relative_eq!(c.rdcp, c.thermo.rd / c.thermo.rcpd);
        assert_relative_eq!(c.rldcp, 1.0 / (c.thermo.ralsdcp - c.thermo.ralvdcp));
    }

    #[test]
    fn test_literals_override_groups() {
        let mut groups = ParameterGroups::ifs_defaults();
        groups.yrecldp.insert("EPSEC", 0.5);
        let table = ConstantTable::resolve(&groups, &LiteralSet::standard(4)).unwrap();
        assert_eq!(table.get("EPSEC"), Some(1.0e-14));
    }

    #[test]
    fn test_later_group_overrides_earlier() {
        let mut groups = ParameterGroups::ifs_defaults();
        groups.yoecldp.insert("RTT", 1.0);
        let table = ConstantTable::resolve(&groups, &LiteralSet::standard(4)).unwrap();
        assert_eq!(table.get("RTT"), Some(273.16));
    }

    #[test]
    fn test_missing_source_key_fails_resolution() {
        let mut groups = ParameterGroups::ifs_defaults();
        groups.yrecldp.remove("RVSNOW");
        let err = ConstantTable::resolve(&groups, &LiteralSet::standard(4)).unwrap_err();
        assert_eq!(
            err,
            CloudscError::MissingSourceKey {
                literal: "VQS".into(),
                key: "RVSNOW".into()
            }
        );
    }

    #[test]
    fn test_missing_literal_fails_lowering() {
        let mut literals = LiteralSet::standard(4);
        assert!(literals.remove("VQS").is_some());
        let err = Constants::resolve(&ParameterGroups::ifs_defaults(), &literals).unwrap_err();
        assert_eq!(err, CloudscError::missing("VQS"));
    }

    #[test]
    fn test_unknown_mode_rejected() {
        let mut literals = LiteralSet::standard(4);
        literals.insert("EVAPRAIN", LiteralValue::Index(7));
        let err = Constants::resolve(&ParameterGroups::ifs_defaults(), &literals).unwrap_err();
        assert!(matches!(err, CloudscError::InvalidConstant { ref key, .. } if key == "EVAPRAIN"));
    }

    #[test]
    fn test_diffusional_snow_evaporation_rejected() {
        let mut literals = LiteralSet::standard(4);
        literals.insert("EVAPSNOW", LiteralValue::Index(2));
        let err = Constants::resolve(&ParameterGroups::ifs_defaults(), &literals).unwrap_err();
        assert!(matches!(err, CloudscError::InvalidConstant { ref key, .. } if key == "EVAPSNOW"));
    }

    #[test]
    fn test_non_integral_index_rejected() {
        let mut groups = ParameterGroups::ifs_defaults();
        groups.yoecldp.insert("NCLDQR", 2.5);
        assert!(matches!(
            Constants::resolve(&groups, &LiteralSet::standard(4)),
            Err(CloudscError::InvalidConstant { .. })
        ));
    }

    #[test]
    fn test_melt_targets_follow_species_indices() {
        let c = Constants::resolve(&ParameterGroups::ifs_defaults(), &LiteralSet::standard(4))
            .unwrap();
        assert_eq!(c.species.melt[Species::Ice], Some(Species::Rain));
        assert_eq!(c.species.melt[Species::Snow], Some(Species::Rain));
        assert_eq!(c.species.melt[Species::Liquid], Some(Species::Ice));
        assert_eq!(c.species.melt[Species::Rain], Some(Species::Snow));
        assert_eq!(c.species.melt[Species::Vapour], None);
    }

    #[test]
    fn test_parameter_group_serde_is_transparent() {
        let group = ParameterGroup::new().with("RTT", 273.16);
        let json = serde_json::to_string(&group).unwrap();
        assert_eq!(json, r#"{"RTT":273.16}"#);
        let back: ParameterGroup = serde_json::from_str(&json).unwrap();
        assert_eq!(back, group);
    }

    #[test]
    fn test_parameter_groups_json_roundtrip() {
        let groups = ParameterGroups::ifs_defaults();
        let json = serde_json::to_string(&groups).unwrap();
        let back: ParameterGroups = serde_json::from_str(&json).unwrap();
        assert_eq!(back, groups);
        assert_eq!(back.yomcst.get("RTT"), Some(273.16));
    }
}
