use super::health_risks::{
    CvDiseasesRisks, HardAndFatalEventsRisks, HealthRisks, RisksFactorsScores,
};
use super::risk_factors::{positive, Gender, Race, RisksFactors};
use super::score_tables::{
    self, FraminghamModel, FRAMINGHAM_AGE_RANGE, FRAMINGHAM_BMI_MEN, FRAMINGHAM_BMI_WOMEN,
    FRAMINGHAM_LIPID_MEN, FRAMINGHAM_LIPID_WOMEN, PCE_AGE_RANGE, SCORE_AGE_RANGE,
};

/// Risks for the given factors. Gender `Other` averages the male and
/// female evaluations. A factor that is missing or outside a formula's
/// validated range only turns the outputs depending on it into `None`.
pub fn compute_health_risks(factors: &RisksFactors) -> HealthRisks {
    match factors.gender {
        Some(Gender::Other) => {
            let male = evaluate(factors, Some(Gender::Male));
            let female = evaluate(factors, Some(Gender::Female));
            male.zip_with(&female, |a, b| (a + b) / 2.0)
        }
        gender => evaluate(factors, gender),
    }
}

/// Lower bound over all values the unset factors could take.
pub fn minimal_risks(factors: &RisksFactors) -> HealthRisks {
    bounds(factors).0
}

/// Upper bound over all values the unset factors could take.
pub fn maximal_risks(factors: &RisksFactors) -> HealthRisks {
    bounds(factors).1
}

/// Evaluates the low- and high-risk substitution corners and orders them
/// field by field.
fn bounds(factors: &RisksFactors) -> (HealthRisks, HealthRisks) {
    let low = compute_health_risks(&factors.filled_from(&score_tables::low_risk_reference()));
    let high = compute_health_risks(&factors.filled_from(&score_tables::high_risk_reference()));
    (low.zip_with(&high, f64::min), low.zip_with(&high, f64::max))
}

fn evaluate(factors: &RisksFactors, gender: Option<Gender>) -> HealthRisks {
    let framingham = gender.and_then(|g| framingham(factors, g));
    let overall = framingham.map(|(risk, _)| risk * 100.0);
    let composition = gender.map(score_tables::event_composition);
    let component = |share: fn((f64, f64, f64, f64)) -> f64| {
        overall.zip(composition).map(|(risk, c)| risk * share(c))
    };

    let fatal = gender.and_then(|g| score_fatal_risks(factors, g));

    HealthRisks {
        hard_and_fatal_events: HardAndFatalEventsRisks {
            coronary_death_event_risk: fatal.map(|(chd, _)| chd * 100.0),
            fatal_stroke_event_risk: fatal.map(|(_, other)| other * 100.0),
            total_cv_mortality_risk: fatal.map(|(chd, other)| (chd + other) * 100.0),
            hard_cv_event_risk: gender
                .and_then(|g| pooled_cohort_risk(factors, g))
                .map(|r| r * 100.0),
        },
        cv_diseases: CvDiseasesRisks {
            overall_risk: overall,
            coronary_heart_disease_risk: component(|c| c.0),
            stroke_risk: component(|c| c.1),
            heart_failure_risk: component(|c| c.2),
            peripheral_vascular_disease_risk: component(|c| c.3),
        },
        vascular_age: framingham.map(|(_, age)| age),
        scores: factor_scores(factors, gender),
    }
}

fn in_range(value: Option<f64>, (lo, hi): (f64, f64)) -> Option<f64> {
    positive(value).filter(|v| (lo..=hi).contains(v))
}

/// Ten-year general CVD risk as a fraction, and vascular age. Uses the
/// lipid model when both cholesterol values are known, the BMI model
/// otherwise.
fn framingham(factors: &RisksFactors, gender: Gender) -> Option<(f64, f64)> {
    let age = in_range(factors.age, FRAMINGHAM_AGE_RANGE)?;
    let sbp = positive(factors.sbp)?;
    let treated = factors.hypertension_treatment?;
    let smoker = factors.is_smoker?;
    let diabetic = factors.has_diabetes?;
    let female = gender == Gender::Female;

    let lipids = positive(factors.cholesterol).zip(positive(factors.cholesterol_hdl));
    let (model, factor_terms, normal_terms): (FraminghamModel, f64, f64) = match lipids {
        Some((tc, hdl)) => {
            let model = if female { FRAMINGHAM_LIPID_WOMEN } else { FRAMINGHAM_LIPID_MEN };
            let (b_tc, b_hdl) = model.ln_lipid?;
            (
                model,
                b_tc * tc.ln() + b_hdl * hdl.ln(),
                b_tc * score_tables::NORMAL_CHOLESTEROL.ln()
                    + b_hdl * score_tables::NORMAL_HDL.ln(),
            )
        }
        None => {
            let bmi = factors.bmi()?;
            let model = if female { FRAMINGHAM_BMI_WOMEN } else { FRAMINGHAM_BMI_MEN };
            let b_bmi = model.ln_bmi?;
            (model, b_bmi * bmi.ln(), b_bmi * score_tables::NORMAL_BMI.ln())
        }
    };

    let sbp_coef = if treated {
        model.ln_sbp_treated
    } else {
        model.ln_sbp_untreated
    };
    let sum = model.ln_age * age.ln()
        + factor_terms
        + sbp_coef * sbp.ln()
        + if smoker { model.smoker } else { 0.0 }
        + if diabetic { model.diabetes } else { 0.0 };
    let risk = 1.0 - model.baseline_survival.powf((sum - model.mean_sum).exp());

    // Age at which normal factors give the same hazard.
    let normal = normal_terms + model.ln_sbp_untreated * score_tables::NORMAL_SBP.ln();
    let vascular_age = ((sum - normal) / model.ln_age).exp();
    Some((risk, vascular_age))
}

/// Ten-year hard ASCVD risk as a fraction.
fn pooled_cohort_risk(factors: &RisksFactors, gender: Gender) -> Option<f64> {
    let age = in_range(factors.age, PCE_AGE_RANGE)?;
    let tc = positive(factors.cholesterol)?;
    let hdl = positive(factors.cholesterol_hdl)?;
    let sbp = positive(factors.sbp)?;
    let treated = factors.hypertension_treatment?;
    let smoker = f64::from(u8::from(factors.is_smoker?));
    let diabetic = f64::from(u8::from(factors.has_diabetes?));
    let race = factors.race?;

    let m = score_tables::pooled_cohort_model(gender, race);
    let (la, lt, lh, ls) = (age.ln(), tc.ln(), hdl.ln(), sbp.ln());
    let sbp_terms = if treated {
        m.ln_sbp_treated * ls + m.ln_age_ln_sbp_treated * la * ls
    } else {
        m.ln_sbp_untreated * ls + m.ln_age_ln_sbp_untreated * la * ls
    };
    let sum = m.ln_age * la
        + m.ln_age_sq * la * la
        + m.ln_tc * lt
        + m.ln_age_ln_tc * la * lt
        + m.ln_hdl * lh
        + m.ln_age_ln_hdl * la * lh
        + sbp_terms
        + m.smoker * smoker
        + m.ln_age_smoker * la * smoker
        + m.diabetes * diabetic;
    Some(1.0 - m.baseline_survival.powf((sum - m.mean_sum).exp()))
}

/// Ten-year fatal `(CHD, non-CHD CVD)` risks as fractions.
fn score_fatal_risks(factors: &RisksFactors, gender: Gender) -> Option<(f64, f64)> {
    let age = in_range(factors.age, SCORE_AGE_RANGE)?;
    let cholesterol = factors.cholesterol_mmol()?;
    let sbp = positive(factors.sbp)?;
    let smoker = f64::from(u8::from(factors.is_smoker?));
    let low_risk = score_tables::is_low_risk_country(factors.country.as_deref()?);

    let (chd, other) = score_tables::score_endpoints(gender, low_risk);
    let risk = |e: score_tables::ScoreEndpoint| {
        let baseline = |t: f64| (-(e.alpha.exp()) * (t - 20.0).powf(e.shape)).exp();
        let (b_smoker, b_chol, b_sbp) = e.betas;
        let w = b_smoker * smoker + b_chol * (cholesterol - 6.0) + b_sbp * (sbp - 120.0);
        let now = baseline(age).powf(w.exp());
        let later = baseline(age + 10.0).powf(w.exp());
        1.0 - later / now
    };
    Some((risk(chd), risk(other)))
}

fn factor_scores(factors: &RisksFactors, gender: Option<Gender>) -> RisksFactorsScores {
    let age = gender
        .zip(positive(factors.age))
        .and_then(|(g, age)| score_tables::age_points(g, age));
    let sbp = match (gender, positive(factors.sbp), factors.hypertension_treatment) {
        (Some(g), Some(sbp), Some(treated)) => score_tables::sbp_points(g, sbp, treated),
        _ => None,
    };
    let smoking = gender
        .zip(factors.is_smoker)
        .map(|(g, s)| score_tables::smoking_points(g, s));
    let diabetes = gender
        .zip(factors.has_diabetes)
        .map(|(g, d)| score_tables::diabetes_points(g, d));
    let bmi = factors.bmi().and_then(score_tables::bmi_points);
    let cholesterol = gender
        .zip(positive(factors.cholesterol))
        .and_then(|(g, tc)| score_tables::cholesterol_points(g, tc));
    let cholesterol_hdl = positive(factors.cholesterol_hdl).and_then(score_tables::hdl_points);

    // Lipid points when both are known, BMI points otherwise.
    let model_terms = match (cholesterol, cholesterol_hdl) {
        (Some(tc), Some(hdl)) => Some(tc + hdl),
        _ => bmi,
    };
    let total = match (age, sbp, smoking, diabetes, model_terms) {
        (Some(a), Some(s), Some(sm), Some(d), Some(m)) => Some(a + s + sm + d + m),
        _ => None,
    };

    RisksFactorsScores {
        age,
        sbp,
        smoking,
        diabetes,
        bmi,
        cholesterol,
        cholesterol_hdl,
        total,
    }
}
