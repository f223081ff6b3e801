use crate::{
    error::{RavenError, Result},
    wps::params::{Model, ParamSet},
};
use std::collections::BTreeMap;

/// file header shared by every `.rv*` file
pub const HEADER: &str = "\
#########################################################################
:FileType          {extension} ASCII Raven 3.0
:WrittenBy         raven emulator
:CreationDate      {creation_date}
#------------------------------------------------------------------------
";

pub const RVI: &str = "\
:Calendar              PROLEPTIC_GREGORIAN
:RunName               {run_name}
:StartDate             {start_date}
:EndDate               {end_date}
:TimeStep              1.0
:Method                ORDERED_SERIES

{processes}
:EvaluationMetrics     NASH_SUTCLIFFE RMSE
";

pub const RVH: &str = "\
:SubBasins
  :Attributes,   NAME, DOWNSTREAM_ID, PROFILE, REACH_LENGTH, GAUGED
  :Units,        none,          none,    none,           km,   none
  1,           {name},            -1,    NONE,        _AUTO,      1
:EndSubBasins

:HRUs
  :Attributes, AREA, ELEVATION, LATITUDE, LONGITUDE, BASIN_ID, LAND_USE_CLASS, VEG_CLASS, SOIL_PROFILE, AQUIFER_PROFILE, TERRAIN_CLASS, SLOPE, ASPECT
  :Units,       km2,         m,      deg,       deg,     none,           none,      none,         none,            none,          none,   deg,    deg
{hru_rows}
:EndHRUs
{subbasin_properties}";

pub const HRU_ROW: &str =
    "  {hru_id}, {area}, {elevation}, {latitude}, {longitude}, 1, LU_ALL, VEG_ALL, DEFAULT_P, [NONE], [NONE], 0.0, 0";

pub const RVT: &str = "\
:Gauge {name}
  :Latitude  {latitude}
  :Longitude {longitude}
  :Elevation {elevation}
{forcings}:EndGauge

{observations}";

pub const RVT_DATA: &str = "\
  :Data {forcing} {units}
    :ReadFromNetCDF
      :FileNameNC      {file}
      :VarNameNC       {var}
      :DimNamesNC      time
      :StationIdx      {nc_index}
      :LinearTransform {scale} {offset}
    :EndReadFromNetCDF
  :EndData
";

pub const RVT_OBSERVATION: &str = "\
:ObservationData HYDROGRAPH 1 {units}
  :ReadFromNetCDF
    :FileNameNC      {file}
    :VarNameNC       {var}
    :DimNamesNC      time
    :StationIdx      {nc_index}
    :LinearTransform {scale} {offset}
  :EndReadFromNetCDF
:EndObservationData
";

pub const RVC: &str = "\
:HRUStateVariableTable
  :Attributes, {state_names}
  :Units,      {state_units}
{state_rows}
:EndHRUStateVariableTable
";

/* # models */

/// the parts of the configuration that depend on the model
pub struct Templates {
    pub processes: &'static str,
    pub rvp: &'static str,
    pub subbasin_properties: &'static str,
    pub state_names: &'static str,
    pub state_units: &'static str,
    /// initial storages of one HRU, may refer to parameters
    pub state_values: &'static str,
}

const GR4JCN: Templates = Templates {
    processes: "\
:SoilModel             SOIL_MULTILAYER  4
:Routing               ROUTE_NONE
:CatchmentRoute        ROUTE_DUMP
:Evaporation           {evaporation}
:OW_Evaporation        {evaporation}
:SWCanopyCorrection    SW_CANOPY_CORR_NONE
:SWCloudCorrection     SW_CLOUD_CORR_NONE
:RainSnowFraction      {rain_snow_fraction}
:PotentialMeltMethod   POTMELT_DEGREE_DAY
:OroTempCorrect        OROCORR_SIMPLELAPSE
:OroPrecipCorrect      OROCORR_SIMPLELAPSE

:Alias PRODUCT_STORE   SOIL[0]
:Alias ROUTING_STORE   SOIL[1]
:Alias TEMP_STORE      SOIL[2]
:Alias GW_STORE        SOIL[3]

:HydrologicProcesses
  :Precipitation         PRECIP_RAVEN       ATMOS_PRECIP    MULTIPLE
  :SnowTempEvolve        SNOTEMP_NEWTONS    SNOW_TEMP
  :SnowBalance           SNOBAL_CEMA_NIEGE  SNOW            PONDED_WATER
  :OpenWaterEvaporation  OPEN_WATER_EVAP    PONDED_WATER    ATMOSPHERE
  :Infiltration          INF_GR4J           PONDED_WATER    MULTIPLE
  :SoilEvaporation       SOILEVAP_GR4J      PRODUCT_STORE   ATMOSPHERE
  :Percolation           PERC_GR4J          PRODUCT_STORE   TEMP_STORE
  :Flush                 RAVEN_DEFAULT      SURFACE_WATER   TEMP_STORE
  :Split                 RAVEN_DEFAULT      TEMP_STORE      CONVOLUTION[0] CONVOLUTION[1] 0.9
  :Convolve              CONVOL_GR4J_1      CONVOLUTION[0]  ROUTING_STORE
  :Convolve              CONVOL_GR4J_2      CONVOLUTION[1]  TEMP_STORE
  :Percolation           PERC_GR4JEXCH      ROUTING_STORE   GW_STORE
  :Percolation           PERC_GR4JEXCH2     TEMP_STORE      GW_STORE
  :Flush                 RAVEN_DEFAULT      TEMP_STORE      SURFACE_WATER
  :Baseflow              BASE_GR4J          ROUTING_STORE   SURFACE_WATER
:EndHydrologicProcesses
",
    rvp: "\
:SoilClasses
  :Attributes,
  :Units,
  SOIL_PROD
  SOIL_ROUT
  SOIL_TEMP
  SOIL_GW
:EndSoilClasses

:LandUseClasses
  :Attributes, IMPERM, FOREST_COV
  :Units,        frac,       frac
  LU_ALL,         0.0,        0.0
:EndLandUseClasses

:VegetationClasses
  :Attributes, MAX_HT, MAX_LAI, MAX_LEAF_COND
  :Units,           m,    none,      mm_per_s
  VEG_ALL,        0.0,     0.0,           0.0
:EndVegetationClasses

:SoilProfiles
  LAKE, 0
  ROCK, 0
  DEFAULT_P, 4, SOIL_PROD, {GR4J_X1}, SOIL_ROUT, 0.300, SOIL_TEMP, 1.000, SOIL_GW, 1.000,
:EndSoilProfiles

:GlobalParameter GR4J_X4 {GR4J_X4}
:GlobalParameter AVG_ANNUAL_SNOW 123.3

:SoilParameterList
  :Parameters, POROSITY, GR4J_X3, GR4J_X2
  :Units,          none,      mm,    mm/d
  [DEFAULT],        1.0, {GR4J_X3}, {GR4J_X2}
:EndSoilParameterList

:LandUseParameterList
  :Parameters, MELT_FACTOR, AIRSNOW_COEFF, AVG_ANNUAL_SNOW
  :Units,           mm/d/C,           1/d,              mm
  [DEFAULT], {CEMANEIGE_X1}, {one_minus_CEMANEIGE_X2}, 123.3
:EndLandUseParameterList
",
    subbasin_properties: "",
    state_names: "SOIL[0], SOIL[1]",
    state_units: "mm, mm",
    state_values: "{GR4J_X1_hlf}, 15.0",
};

const HMETS: Templates = Templates {
    processes: "\
:PotentialMeltMethod   POTMELT_HMETS
:RainSnowFraction      {rain_snow_fraction}
:Evaporation           {evaporation}
:CatchmentRoute        ROUTE_DUMP
:Routing               ROUTE_NONE
:SoilModel             SOIL_TWO_LAYER

:Alias DELAYED_RUNOFF  CONVOLUTION[1]

:HydrologicProcesses
  :SnowBalance      SNOBAL_HMETS    MULTIPLE        MULTIPLE
  :Precipitation    RAVEN_DEFAULT   ATMOS_PRECIP    MULTIPLE
  :Infiltration     INF_HMETS       PONDED_WATER    MULTIPLE
    :Overflow       OVERFLOW_RAVEN  SOIL[0]         DELAYED_RUNOFF
  :Baseflow         BASE_LINEAR     SOIL[0]         SURFACE_WATER
  :Percolation      PERC_LINEAR     SOIL[0]         SOIL[1]
  :Baseflow         BASE_LINEAR     SOIL[1]         SURFACE_WATER
  :SoilEvaporation  SOILEVAP_ALL    SOIL[0]         ATMOSPHERE
  :Convolve         CONVOL_GAMMA    CONVOLUTION[0]  SURFACE_WATER
  :Convolve         CONVOL_GAMMA_2  DELAYED_RUNOFF  SURFACE_WATER
:EndHydrologicProcesses
",
    rvp: "\
:GlobalParameter SNOW_SWI_MIN {SNOW_SWI_MIN}
:GlobalParameter SNOW_SWI_MAX {SNOW_SWI_MAX}
:GlobalParameter SWI_REDUCT_COEFF {SWI_REDUCT_COEFF}
:GlobalParameter SNOW_SWI 0.05

:SoilClasses
  :Attributes,
  :Units,
  TOPSOIL
  PHREATIC
:EndSoilClasses

:LandUseClasses
  :Attributes, IMPERM, FOREST_COV
  :Units,        frac,       frac
  LU_ALL,         0.0,        0.0
:EndLandUseClasses

:VegetationClasses
  :Attributes, MAX_HT, MAX_LAI, MAX_LEAF_COND
  :Units,           m,    none,      mm_per_s
  VEG_ALL,        0.0,     0.0,           0.0
:EndVegetationClasses

:SoilProfiles
  LAKE, 0
  ROCK, 0
  DEFAULT_P, 2, TOPSOIL, {TOPSOIL_m}, PHREATIC, {PHREATIC_m},
:EndSoilProfiles

:LandUseParameterList
  :Parameters, MIN_MELT_FACTOR, MAX_MELT_FACTOR, DD_MELT_TEMP, DD_AGGRADATION, REFREEZE_FACTOR, REFREEZE_EXP, DD_REFREEZE_TEMP, HMETS_RUNOFF_COEFF
  :Units,             mm/d/C,          mm/d/C,            C,           1/mm,          mm/d/C,            -,                C,                  -
  [DEFAULT], {MIN_MELT_FACTOR}, {SUM_MELT_FACTOR}, {DD_MELT_TEMP}, {DD_AGGRADATION}, {REFREEZE_FACTOR}, {REFREEZE_EXP}, {DD_REFREEZE_TEMP}, {HMETS_RUNOFF_COEFF}
:EndLandUseParameterList

:SoilParameterList
  :Parameters, POROSITY, PERC_COEFF, PET_CORRECTION, BASEFLOW_COEFF
  :Units,             -,        1/d,              -,            1/d
  TOPSOIL,          1.0, {PERC_COEFF}, {PET_CORRECTION}, {BASEFLOW_COEFF_1}
  PHREATIC,         1.0,          0.0,              0.0, {BASEFLOW_COEFF_2}
:EndSoilParameterList
",
    subbasin_properties: "
:SubBasinProperties
  :Parameters, GAMMA_SHAPE, GAMMA_SCALE, GAMMA_SHAPE2, GAMMA_SCALE2
  :Units,             none,         1/d,         none,          1/d
  1, {GAMMA_SHAPE}, {GAMMA_SCALE}, {GAMMA_SHAPE2}, {GAMMA_SCALE2}
:EndSubBasinProperties
",
    state_names: "SOIL[0], SOIL[1]",
    state_units: "mm, mm",
    state_values: "{TOPSOIL_hlf}, {PHREATIC_hlf}",
};

pub fn templates(model: Model) -> &'static Templates {
    match model {
        Model::Gr4jCn => &GR4JCN,
        Model::Hmets => &HMETS,
    }
}

/// a value computed from parameters as `constant + Σ coefficient * parameter`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Derived {
    pub name: &'static str,
    pub terms: &'static [(&'static str, f64)],
    pub constant: f64,
}

impl Derived {
    pub fn value(&self, params: &ParamSet) -> Result<f64> {
        self.terms.iter().try_fold(self.constant, |sum, (name, coefficient)| {
            params
                .get(name)
                .map(|value| sum + coefficient * value)
                .ok_or_else(|| RavenError::validation("params", format!("no parameter {}", name)))
        })
    }
}

const GR4JCN_DERIVED: [Derived; 2] = [
    // production store half full, the parameter is in meters
    Derived {
        name: "GR4J_X1_hlf",
        terms: &[("GR4J_X1", 500.)],
        constant: 0.,
    },
    Derived {
        name: "one_minus_CEMANEIGE_X2",
        terms: &[("CEMANEIGE_X2", -1.)],
        constant: 1.,
    },
];

const HMETS_DERIVED: [Derived; 5] = [
    Derived {
        name: "TOPSOIL_m",
        terms: &[("TOPSOIL", 0.001)],
        constant: 0.,
    },
    Derived {
        name: "PHREATIC_m",
        terms: &[("PHREATIC", 0.001)],
        constant: 0.,
    },
    Derived {
        name: "SUM_MELT_FACTOR",
        terms: &[("MIN_MELT_FACTOR", 1.), ("MAX_MELT_FACTOR", 1.)],
        constant: 0.,
    },
    Derived {
        name: "TOPSOIL_hlf",
        terms: &[("TOPSOIL", 0.5)],
        constant: 0.,
    },
    Derived {
        name: "PHREATIC_hlf",
        terms: &[("PHREATIC", 0.5)],
        constant: 0.,
    },
];

pub fn derived(model: Model) -> &'static [Derived] {
    match model {
        Model::Gr4jCn => &GR4JCN_DERIVED,
        Model::Hmets => &HMETS_DERIVED,
    }
}

/// parameter and derived values keyed by placeholder
pub fn param_values(params: &ParamSet) -> Result<BTreeMap<String, String>> {
    let mut values = params
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect::<BTreeMap<String, String>>();
    for d in derived(params.model()) {
        values.insert(d.name.to_string(), d.value(params)?.to_string());
    }
    Ok(values)
}

/// the same placeholders pointing at Ostrich parameter names
pub fn param_names(model: Model) -> BTreeMap<String, String> {
    model
        .names()
        .iter()
        .copied()
        .chain(derived(model).iter().map(|d| d.name))
        .map(|name| (name.to_string(), format!("par_{}", name)))
        .collect()
}

/* # ostrich */

pub const OST_IN: &str = "\
ProgramType         {algorithm}
ObjectiveFunction   GCOP
ModelExecutable     ./ostrich-runs-raven.sh
PreserveBestModel   ./save_best.sh
OstrichWarmStart    no

BeginExtraDirs
model
EndExtraDirs

BeginFilePairs
  {model}.rvp.tpl; {model}.rvp
EndFilePairs

BeginParams
  #parameter  init  low  high  tx_in  tx_ost  tx_out
{params}
EndParams

BeginTiedParams
{tied}
EndTiedParams

BeginResponseVars
  #name  filename                                   keyword   line  col  token
  NS     ./model/output/{run_name}_Diagnostics.csv;  OST_NULL  1     3    ','
EndResponseVars

BeginTiedRespVars
  NegNS 1 NS wsum -1.00
EndTiedRespVars

BeginGCOP
  CostFunction NegNS
  PenaltyFunction APM
EndGCOP

BeginConstraints
EndConstraints

{random_seed}
BeginDDSAlg
  PerturbationValue 0.20
  MaxIterations {max_iterations}
  UseRandomParamValues
EndDDSAlg

BeginSCEUA
  Budget {max_iterations}
  LoopStride 5
  NumComplexes 3
  NumPointsPerComplex 2
  NumPointsPerSubComplex 2
  NumEvolutionSteps 5
  UseInitialPoint no
EndSCEUA
";

pub const OST_PARAM: &str = "  par_{name}  {init}  {low}  {high}  none  none  none";

pub const OST_RUNS_RAVEN: &str = "\
#!/bin/sh
set -e
cp ./{model}.rvp model/{model}.rvp
cd model
{raven} ./{model} -o ./output/
";

pub const OST_SAVE_BEST: &str = "\
#!/bin/sh
set -e
mkdir -p best
cp model/output/* best/
";

/// Ostrich tied parameter line for a derived value, two terms are
/// `y = c3 * x1 * x2 + c2 * x2 + c1 * x1 + c0`
pub fn tied(derived: &Derived) -> String {
    match derived.terms {
        [(a, ca)] => format!(
            "  par_{} 1 par_{} linear {} {} free",
            derived.name, a, ca, derived.constant
        ),
        [(a, ca), (b, cb)] => format!(
            "  par_{} 2 par_{} par_{} linear 0.00 {} {} {} free",
            derived.name, a, b, cb, ca, derived.constant
        ),
        _ => format!("  # {} cannot be tied", derived.name),
    }
}

/* # filling */

/// replace every `{name}` tag, failing on tags without a value
pub fn fill(template: &str, values: &BTreeMap<String, String>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let tag = after
            .find('}')
            .map(|close| &after[..close])
            .filter(|tag| {
                !tag.is_empty() && tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            });
        match tag {
            Some(tag) => {
                let value = values
                    .get(tag)
                    .ok_or_else(|| RavenError::Missing(tag.to_string()))?;
                out.push_str(value);
                rest = &after[tag.len() + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;
    use float_eq::assert_float_eq;

    fn values(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn fill_tags() {
        let filled = fill(
            ":RunName {run_name}\n:Gauge {name}",
            &values(&[("run_name", "test"), ("name", "Salmon")]),
        )
        .unwrap();
        assert_eq!(filled, ":RunName test\n:Gauge Salmon");
    }

    #[test]
    fn unfilled_tag() {
        assert!(matches!(
            fill("{area}", &values(&[])),
            Err(RavenError::Missing(tag)) if tag == "area"
        ));
    }

    #[test]
    fn braces_that_are_not_tags() {
        let text = "{\"TEMP_MAX\": 1} and { } and {";
        assert_eq!(fill(text, &values(&[])).unwrap(), text);
    }

    #[test]
    fn derived_values() {
        let params = ParamSet::defaults(Model::Gr4jCn);
        let values = param_values(&params).unwrap();
        assert_float_eq!(
            values["GR4J_X1_hlf"].parse::<f64>().unwrap(),
            264.5,
            abs <= 1e-9
        );
        assert_float_eq!(
            values["one_minus_CEMANEIGE_X2"].parse::<f64>().unwrap(),
            0.053,
            abs <= 1e-9
        );
    }

    #[test]
    fn model_templates_are_complete() {
        for model in [Model::Gr4jCn, Model::Hmets] {
            let mut all = param_values(&ParamSet::defaults(model)).unwrap();
            all.insert("evaporation".into(), "PET_OUDIN".into());
            all.insert("rain_snow_fraction".into(), "RAINSNOW_DINGMAN".into());
            let t = templates(model);
            assert!(fill(t.processes, &all).is_ok());
            assert!(fill(t.rvp, &all).is_ok());
            assert!(fill(t.subbasin_properties, &all).is_ok());
            assert!(fill(t.state_values, &all).is_ok());
            // ostrich templates use names, not values
            assert!(fill(t.rvp, &param_names(model)).unwrap().contains("par_"));
        }
    }

    #[test]
    fn tied_lines() {
        assert_eq!(
            tied(&GR4JCN_DERIVED[1]),
            "  par_one_minus_CEMANEIGE_X2 1 par_CEMANEIGE_X2 linear -1 1 free"
        );
        assert_eq!(
            tied(&HMETS_DERIVED[2]),
            "  par_SUM_MELT_FACTOR 2 par_MIN_MELT_FACTOR par_MAX_MELT_FACTOR linear 0.00 1 1 0 free"
        );
        let weighted = Derived {
            name: "WEIGHTED",
            terms: &[("A", 2.), ("B", 3.)],
            constant: 4.,
        };
        assert_eq!(
            tied(&weighted),
            "  par_WEIGHTED 2 par_A par_B linear 0.00 3 2 4 free"
        );
    }
}
