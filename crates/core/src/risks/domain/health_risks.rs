use serde::{Deserialize, Serialize};

/// Ten-year risks of hard and fatal events, in percent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HardAndFatalEventsRisks {
    pub coronary_death_event_risk: Option<f64>,
    pub fatal_stroke_event_risk: Option<f64>,
    pub total_cv_mortality_risk: Option<f64>,
    pub hard_cv_event_risk: Option<f64>,
}

/// Ten-year cardiovascular disease risks, in percent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CvDiseasesRisks {
    pub overall_risk: Option<f64>,
    pub coronary_heart_disease_risk: Option<f64>,
    pub stroke_risk: Option<f64>,
    pub heart_failure_risk: Option<f64>,
    pub peripheral_vascular_disease_risk: Option<f64>,
}

/// Framingham points per factor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RisksFactorsScores {
    pub age: Option<f64>,
    pub sbp: Option<f64>,
    pub smoking: Option<f64>,
    pub diabetes: Option<f64>,
    pub bmi: Option<f64>,
    pub cholesterol: Option<f64>,
    pub cholesterol_hdl: Option<f64>,
    pub total: Option<f64>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthRisks {
    pub hard_and_fatal_events: HardAndFatalEventsRisks,
    pub cv_diseases: CvDiseasesRisks,
    pub vascular_age: Option<f64>,
    pub scores: RisksFactorsScores,
}

impl HealthRisks {
    /// Every numeric field, in declaration order.
    pub fn fields(&self) -> [Option<f64>; 18] {
        let h = &self.hard_and_fatal_events;
        let c = &self.cv_diseases;
        let s = &self.scores;
        [
            h.coronary_death_event_risk,
            h.fatal_stroke_event_risk,
            h.total_cv_mortality_risk,
            h.hard_cv_event_risk,
            c.overall_risk,
            c.coronary_heart_disease_risk,
            c.stroke_risk,
            c.heart_failure_risk,
            c.peripheral_vascular_disease_risk,
            self.vascular_age,
            s.age,
            s.sbp,
            s.smoking,
            s.diabetes,
            s.bmi,
            s.cholesterol,
            s.cholesterol_hdl,
            s.total,
        ]
    }

    /// Field-wise combination; a field present on only one side is kept.
    pub fn zip_with(&self, other: &HealthRisks, f: impl Fn(f64, f64) -> f64) -> HealthRisks {
        let pick = |a: Option<f64>, b: Option<f64>| match (a, b) {
            (Some(a), Some(b)) => Some(f(a, b)),
            (a, b) => a.or(b),
        };
        let (h, oh) = (&self.hard_and_fatal_events, &other.hard_and_fatal_events);
        let (c, oc) = (&self.cv_diseases, &other.cv_diseases);
        let (s, os) = (&self.scores, &other.scores);
        HealthRisks {
            hard_and_fatal_events: HardAndFatalEventsRisks {
                coronary_death_event_risk: pick(
                    h.coronary_death_event_risk,
                    oh.coronary_death_event_risk,
                ),
                fatal_stroke_event_risk: pick(
                    h.fatal_stroke_event_risk,
                    oh.fatal_stroke_event_risk,
                ),
                total_cv_mortality_risk: pick(
                    h.total_cv_mortality_risk,
                    oh.total_cv_mortality_risk,
                ),
                hard_cv_event_risk: pick(h.hard_cv_event_risk, oh.hard_cv_event_risk),
            },
            cv_diseases: CvDiseasesRisks {
                overall_risk: pick(c.overall_risk, oc.overall_risk),
                coronary_heart_disease_risk: pick(
                    c.coronary_heart_disease_risk,
                    oc.coronary_heart_disease_risk,
                ),
                stroke_risk: pick(c.stroke_risk, oc.stroke_risk),
                heart_failure_risk: pick(c.heart_failure_risk, oc.heart_failure_risk),
                peripheral_vascular_disease_risk: pick(
                    c.peripheral_vascular_disease_risk,
                    oc.peripheral_vascular_disease_risk,
                ),
            },
            vascular_age: pick(self.vascular_age, other.vascular_age),
            scores: RisksFactorsScores {
                age: pick(s.age, os.age),
                sbp: pick(s.sbp, os.sbp),
                smoking: pick(s.smoking, os.smoking),
                diabetes: pick(s.diabetes, os.diabetes),
                bmi: pick(s.bmi, os.bmi),
                cholesterol: pick(s.cholesterol, os.cholesterol),
                cholesterol_hdl: pick(s.cholesterol_hdl, os.cholesterol_hdl),
                total: pick(s.total, os.total),
            },
        }
    }
}
