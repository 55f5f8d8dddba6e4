use serde::{Deserialize, Serialize};

/// mg/dL of cholesterol per mmol/L.
pub const CHOLESTEROL_MG_PER_MMOL: f64 = 38.67;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Gender {
    Male,
    Female,
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Race {
    White,
    AfricanAmerican,
    Other,
}

/// User-supplied risk factors. Every field is optional; scores that need
/// an absent factor come out as `None`.
///
/// Cholesterol values are in mg/dL, blood pressure in mmHg, height in
/// centimetres and weight in kilograms.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RisksFactors {
    pub age: Option<f64>,
    pub cholesterol: Option<f64>,
    pub cholesterol_hdl: Option<f64>,
    pub sbp: Option<f64>,
    pub is_smoker: Option<bool>,
    pub hypertension_treatment: Option<bool>,
    pub has_diabetes: Option<bool>,
    pub body_height: Option<f64>,
    pub body_weight: Option<f64>,
    pub gender: Option<Gender>,
    /// ISO 3166-1 alpha-2 code.
    pub country: Option<String>,
    pub race: Option<Race>,
}

impl RisksFactors {
    /// Copy with every unset field taken from `reference`.
    pub fn filled_from(&self, reference: &RisksFactors) -> RisksFactors {
        RisksFactors {
            age: self.age.or(reference.age),
            cholesterol: self.cholesterol.or(reference.cholesterol),
            cholesterol_hdl: self.cholesterol_hdl.or(reference.cholesterol_hdl),
            sbp: self.sbp.or(reference.sbp),
            is_smoker: self.is_smoker.or(reference.is_smoker),
            hypertension_treatment: self
                .hypertension_treatment
                .or(reference.hypertension_treatment),
            has_diabetes: self.has_diabetes.or(reference.has_diabetes),
            body_height: self.body_height.or(reference.body_height),
            body_weight: self.body_weight.or(reference.body_weight),
            gender: self.gender.or(reference.gender),
            country: self.country.clone().or_else(|| reference.country.clone()),
            race: self.race.or(reference.race),
        }
    }

    /// Body-mass index in kg/m².
    pub fn bmi(&self) -> Option<f64> {
        let height_m = positive(self.body_height)? / 100.0;
        let weight = positive(self.body_weight)?;
        Some(weight / (height_m * height_m))
    }

    pub fn cholesterol_mmol(&self) -> Option<f64> {
        positive(self.cholesterol).map(|mg| mg / CHOLESTEROL_MG_PER_MMOL)
    }
}

/// The value when it is a finite positive number.
pub fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}
