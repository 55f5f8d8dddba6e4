use super::risk_factors::{Gender, Race, RisksFactors};

/// Framingham general CVD model (D'Agostino 2008). `ln_lipid` holds the
/// `(ln TC, ln HDL)` coefficients of the lipid model; the office model
/// uses `ln_bmi` instead.
#[derive(Clone, Copy, Debug)]
pub struct FraminghamModel {
    pub ln_age: f64,
    pub ln_lipid: Option<(f64, f64)>,
    pub ln_bmi: Option<f64>,
    pub ln_sbp_untreated: f64,
    pub ln_sbp_treated: f64,
    pub smoker: f64,
    pub diabetes: f64,
    pub baseline_survival: f64,
    pub mean_sum: f64,
}

pub const FRAMINGHAM_LIPID_MEN: FraminghamModel = FraminghamModel {
    ln_age: 3.06117,
    ln_lipid: Some((1.12370, -0.93263)),
    ln_bmi: None,
    ln_sbp_untreated: 1.93303,
    ln_sbp_treated: 1.99881,
    smoker: 0.65451,
    diabetes: 0.57367,
    baseline_survival: 0.88936,
    mean_sum: 23.9802,
};

pub const FRAMINGHAM_LIPID_WOMEN: FraminghamModel = FraminghamModel {
    ln_age: 2.32888,
    ln_lipid: Some((1.20904, -0.70833)),
    ln_bmi: None,
    ln_sbp_untreated: 2.76157,
    ln_sbp_treated: 2.82263,
    smoker: 0.52873,
    diabetes: 0.69154,
    baseline_survival: 0.95012,
    mean_sum: 26.1931,
};

pub const FRAMINGHAM_BMI_MEN: FraminghamModel = FraminghamModel {
    ln_age: 3.11296,
    ln_lipid: None,
    ln_bmi: Some(0.79277),
    ln_sbp_untreated: 1.85508,
    ln_sbp_treated: 1.92672,
    smoker: 0.70953,
    diabetes: 0.53160,
    baseline_survival: 0.88431,
    mean_sum: 23.9388,
};

pub const FRAMINGHAM_BMI_WOMEN: FraminghamModel = FraminghamModel {
    ln_age: 2.72107,
    ln_lipid: None,
    ln_bmi: Some(0.51125),
    ln_sbp_untreated: 2.81291,
    ln_sbp_treated: 2.88267,
    smoker: 0.61868,
    diabetes: 0.77763,
    baseline_survival: 0.94833,
    mean_sum: 26.0145,
};

pub const FRAMINGHAM_AGE_RANGE: (f64, f64) = (30.0, 74.0);

/// Factor values of a person with normal risk, for vascular age.
pub const NORMAL_CHOLESTEROL: f64 = 180.0;
pub const NORMAL_HDL: f64 = 45.0;
pub const NORMAL_SBP: f64 = 125.0;
pub const NORMAL_BMI: f64 = 22.5;

/// Share of overall CVD events by type: (CHD, stroke, heart failure, PVD).
pub fn event_composition(gender: Gender) -> (f64, f64, f64, f64) {
    match gender {
        Gender::Female => (0.52, 0.22, 0.14, 0.12),
        _ => (0.63, 0.15, 0.12, 0.10),
    }
}

/// Points for values at or above each lower bound, scanning bands in
/// ascending order.
fn band_points(value: f64, bands: &[(f64, f64)]) -> Option<f64> {
    bands
        .iter()
        .rev()
        .find(|(lower, _)| value >= *lower)
        .map(|&(_, points)| points)
}

pub fn age_points(gender: Gender, age: f64) -> Option<f64> {
    const MEN: [(f64, f64); 10] = [
        (30.0, 0.0), (35.0, 2.0), (40.0, 5.0), (45.0, 6.0), (50.0, 8.0),
        (55.0, 10.0), (60.0, 11.0), (65.0, 12.0), (70.0, 14.0), (75.0, 15.0),
    ];
    const WOMEN: [(f64, f64); 10] = [
        (30.0, 0.0), (35.0, 2.0), (40.0, 4.0), (45.0, 5.0), (50.0, 7.0),
        (55.0, 8.0), (60.0, 9.0), (65.0, 10.0), (70.0, 11.0), (75.0, 12.0),
    ];
    match gender {
        Gender::Female => band_points(age, &WOMEN),
        _ => band_points(age, &MEN),
    }
}

pub fn hdl_points(hdl: f64) -> Option<f64> {
    band_points(
        hdl,
        &[(f64::MIN, 2.0), (35.0, 1.0), (45.0, 0.0), (50.0, -1.0), (60.0, -2.0)],
    )
}

pub fn cholesterol_points(gender: Gender, total: f64) -> Option<f64> {
    let points = match gender {
        Gender::Female => [0.0, 1.0, 3.0, 4.0, 5.0],
        _ => [0.0, 1.0, 2.0, 3.0, 4.0],
    };
    band_points(
        total,
        &[
            (f64::MIN, points[0]),
            (160.0, points[1]),
            (200.0, points[2]),
            (240.0, points[3]),
            (280.0, points[4]),
        ],
    )
}

pub fn sbp_points(gender: Gender, sbp: f64, treated: bool) -> Option<f64> {
    match (gender, treated) {
        (Gender::Female, false) => band_points(
            sbp,
            &[
                (f64::MIN, -3.0),
                (120.0, 0.0),
                (130.0, 1.0),
                (140.0, 2.0),
                (150.0, 4.0),
                (160.0, 5.0),
            ],
        ),
        (Gender::Female, true) => band_points(
            sbp,
            &[
                (f64::MIN, -1.0),
                (120.0, 2.0),
                (130.0, 3.0),
                (140.0, 5.0),
                (150.0, 6.0),
                (160.0, 7.0),
            ],
        ),
        (_, false) => band_points(
            sbp,
            &[(f64::MIN, -2.0), (120.0, 0.0), (130.0, 1.0), (140.0, 2.0), (160.0, 3.0)],
        ),
        (_, true) => band_points(
            sbp,
            &[(f64::MIN, 0.0), (120.0, 2.0), (130.0, 3.0), (140.0, 4.0), (160.0, 5.0)],
        ),
    }
}

pub fn smoking_points(gender: Gender, smoker: bool) -> f64 {
    match (gender, smoker) {
        (_, false) => 0.0,
        (Gender::Female, true) => 3.0,
        (_, true) => 4.0,
    }
}

pub fn diabetes_points(gender: Gender, diabetic: bool) -> f64 {
    match (gender, diabetic) {
        (_, false) => 0.0,
        (Gender::Female, true) => 4.0,
        (_, true) => 3.0,
    }
}

pub fn bmi_points(bmi: f64) -> Option<f64> {
    band_points(bmi, &[(f64::MIN, 0.0), (25.0, 1.0), (30.0, 2.0)])
}

/// Pooled Cohort Equation terms (ACC/AHA 2013); interaction terms multiply by `ln age`.
#[derive(Clone, Copy, Debug)]
pub struct PooledCohortModel {
    pub ln_age: f64,
    pub ln_age_sq: f64,
    pub ln_tc: f64,
    pub ln_age_ln_tc: f64,
    pub ln_hdl: f64,
    pub ln_age_ln_hdl: f64,
    pub ln_sbp_treated: f64,
    pub ln_age_ln_sbp_treated: f64,
    pub ln_sbp_untreated: f64,
    pub ln_age_ln_sbp_untreated: f64,
    pub smoker: f64,
    pub ln_age_smoker: f64,
    pub diabetes: f64,
    pub baseline_survival: f64,
    pub mean_sum: f64,
}

const PCE_ZERO: PooledCohortModel = PooledCohortModel {
    ln_age: 0.0,
    ln_age_sq: 0.0,
    ln_tc: 0.0,
    ln_age_ln_tc: 0.0,
    ln_hdl: 0.0,
    ln_age_ln_hdl: 0.0,
    ln_sbp_treated: 0.0,
    ln_age_ln_sbp_treated: 0.0,
    ln_sbp_untreated: 0.0,
    ln_age_ln_sbp_untreated: 0.0,
    smoker: 0.0,
    ln_age_smoker: 0.0,
    diabetes: 0.0,
    baseline_survival: 1.0,
    mean_sum: 0.0,
};

pub const PCE_WHITE_WOMEN: PooledCohortModel = PooledCohortModel {
    ln_age: -29.799,
    ln_age_sq: 4.884,
    ln_tc: 13.540,
    ln_age_ln_tc: -3.114,
    ln_hdl: -13.578,
    ln_age_ln_hdl: 3.149,
    ln_sbp_treated: 2.019,
    ln_sbp_untreated: 1.957,
    smoker: 7.574,
    ln_age_smoker: -1.665,
    diabetes: 0.661,
    baseline_survival: 0.9665,
    mean_sum: -29.18,
    ..PCE_ZERO
};

pub const PCE_AFRICAN_AMERICAN_WOMEN: PooledCohortModel = PooledCohortModel {
    ln_age: 17.114,
    ln_tc: 0.940,
    ln_hdl: -18.920,
    ln_age_ln_hdl: 4.475,
    ln_sbp_treated: 29.291,
    ln_age_ln_sbp_treated: -6.432,
    ln_sbp_untreated: 27.820,
    ln_age_ln_sbp_untreated: -6.087,
    smoker: 0.691,
    diabetes: 0.874,
    baseline_survival: 0.9533,
    mean_sum: 86.61,
    ..PCE_ZERO
};

pub const PCE_WHITE_MEN: PooledCohortModel = PooledCohortModel {
    ln_age: 12.344,
    ln_tc: 11.853,
    ln_age_ln_tc: -2.664,
    ln_hdl: -7.990,
    ln_age_ln_hdl: 1.769,
    ln_sbp_treated: 1.797,
    ln_sbp_untreated: 1.764,
    smoker: 7.837,
    ln_age_smoker: -1.795,
    diabetes: 0.658,
    baseline_survival: 0.9144,
    mean_sum: 61.18,
    ..PCE_ZERO
};

pub const PCE_AFRICAN_AMERICAN_MEN: PooledCohortModel = PooledCohortModel {
    ln_age: 2.469,
    ln_tc: 0.302,
    ln_hdl: -0.307,
    ln_sbp_treated: 1.916,
    ln_sbp_untreated: 1.809,
    smoker: 0.549,
    diabetes: 0.645,
    baseline_survival: 0.8954,
    mean_sum: 19.54,
    ..PCE_ZERO
};

pub const PCE_AGE_RANGE: (f64, f64) = (40.0, 79.0);

/// Races without their own equations use the white ones.
pub fn pooled_cohort_model(gender: Gender, race: Race) -> PooledCohortModel {
    match (gender, race) {
        (Gender::Female, Race::AfricanAmerican) => PCE_AFRICAN_AMERICAN_WOMEN,
        (Gender::Female, _) => PCE_WHITE_WOMEN,
        (_, Race::AfricanAmerican) => PCE_AFRICAN_AMERICAN_MEN,
        (_, _) => PCE_WHITE_MEN,
    }
}

/// SCORE (Conroy 2003) Weibull baseline `(alpha, p)` and `(smoker, cholesterol mmol/L,
/// SBP)` coefficients for one endpoint.
#[derive(Clone, Copy, Debug)]
pub struct ScoreEndpoint {
    pub alpha: f64,
    pub shape: f64,
    pub betas: (f64, f64, f64),
}

const CHD_BETAS: (f64, f64, f64) = (0.71, 0.24, 0.018);
const NON_CHD_BETAS: (f64, f64, f64) = (0.63, 0.02, 0.022);

pub const SCORE_AGE_RANGE: (f64, f64) = (40.0, 65.0);

/// Countries covered by the low-risk SCORE chart.
pub const LOW_RISK_COUNTRIES: [&str; 8] = ["BE", "FR", "GR", "IT", "LU", "ES", "CH", "PT"];

pub fn is_low_risk_country(code: &str) -> bool {
    LOW_RISK_COUNTRIES
        .iter()
        .any(|c| c.eq_ignore_ascii_case(code.trim()))
}

/// `(CHD, non-CHD CVD)` endpoints for a sex and region.
pub fn score_endpoints(gender: Gender, low_risk_region: bool) -> (ScoreEndpoint, ScoreEndpoint) {
    let female = gender == Gender::Female;
    let ((chd_a, chd_p), (other_a, other_p)) = match (low_risk_region, female) {
        (true, false) => ((-22.1, 4.71), (-26.7, 5.64)),
        (true, true) => ((-29.8, 6.36), (-31.0, 6.62)),
        (false, false) => ((-21.0, 4.62), (-25.7, 5.47)),
        (false, true) => ((-28.7, 6.23), (-30.0, 6.42)),
    };
    (
        ScoreEndpoint {
            alpha: chd_a,
            shape: chd_p,
            betas: CHD_BETAS,
        },
        ScoreEndpoint {
            alpha: other_a,
            shape: other_p,
            betas: NON_CHD_BETAS,
        },
    )
}

/// Substitutes for unknown factors when bounding risk from below.
pub fn low_risk_reference() -> RisksFactors {
    RisksFactors {
        age: Some(40.0),
        cholesterol: Some(150.0),
        cholesterol_hdl: Some(70.0),
        sbp: Some(110.0),
        is_smoker: Some(false),
        hypertension_treatment: Some(false),
        has_diabetes: Some(false),
        body_height: Some(175.0),
        body_weight: Some(60.0),
        gender: Some(Gender::Female),
        country: Some("ES".into()),
        race: Some(Race::White),
    }
}

/// Substitutes for unknown factors when bounding risk from above.
pub fn high_risk_reference() -> RisksFactors {
    RisksFactors {
        age: Some(65.0),
        cholesterol: Some(280.0),
        cholesterol_hdl: Some(30.0),
        sbp: Some(180.0),
        is_smoker: Some(true),
        hypertension_treatment: Some(true),
        has_diabetes: Some(true),
        body_height: Some(165.0),
        body_weight: Some(100.0),
        gender: Some(Gender::Male),
        country: Some("PL".into()),
        race: Some(Race::AfricanAmerican),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Gender::Male, 29.0, None)]
    #[case(Gender::Male, 30.0, Some(0.0))]
    #[case(Gender::Male, 47.0, Some(6.0))]
    #[case(Gender::Female, 47.0, Some(5.0))]
    #[case(Gender::Female, 80.0, Some(12.0))]
    fn test_age_points(#[case] gender: Gender, #[case] age: f64, #[case] expected: Option<f64>) {
        assert_eq!(age_points(gender, age), expected);
    }

    #[rstest]
    #[case(Gender::Male, 119.0, false, -2.0)]
    #[case(Gender::Male, 150.0, true, 4.0)]
    #[case(Gender::Female, 155.0, false, 4.0)]
    #[case(Gender::Female, 165.0, true, 7.0)]
    fn test_sbp_points(
        #[case] gender: Gender,
        #[case] sbp: f64,
        #[case] treated: bool,
        #[case] expected: f64,
    ) {
        assert_eq!(sbp_points(gender, sbp, treated), Some(expected));
    }

    #[test]
    fn test_lipid_points() {
        assert_eq!(hdl_points(62.0), Some(-2.0));
        assert_eq!(hdl_points(30.0), Some(2.0));
        assert_eq!(cholesterol_points(Gender::Female, 210.0), Some(3.0));
        assert_eq!(cholesterol_points(Gender::Male, 210.0), Some(2.0));
        assert_eq!(bmi_points(27.0), Some(1.0));
    }

    #[test]
    fn test_low_risk_country_lookup() {
        assert!(is_low_risk_country("es"));
        assert!(is_low_risk_country(" FR "));
        assert!(!is_low_risk_country("PL"));
    }

    #[test]
    fn test_other_race_uses_white_equations() {
        let other = pooled_cohort_model(Gender::Male, Race::Other);
        assert_eq!(other.mean_sum, PCE_WHITE_MEN.mean_sum);
        let aa = pooled_cohort_model(Gender::Female, Race::AfricanAmerican);
        assert_eq!(aa.mean_sum, PCE_AFRICAN_AMERICAN_WOMEN.mean_sum);
    }

    #[test]
    fn test_composition_sums_to_one() {
        for gender in [Gender::Male, Gender::Female] {
            let (a, b, c, d) = event_composition(gender);
            assert!((a + b + c + d - 1.0).abs() < 1e-9);
        }
    }
}
