// 📊 Margin waterfall - Revenue down to EBITDA
//
//   Revenue (absolute) → CoGS → Fulfilment → Overheads (relative) → EBITDA (total)

use crate::model::Month;
use crate::pl::{lines, PlCategory, PlStatement};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepKind {
    Absolute,
    Relative,
    Total,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterfallStep {
    pub label: String,
    pub kind: StepKind,
    pub amount: f64,
    /// Running level before the step
    pub start: f64,
    /// Running level after the step
    pub end: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waterfall {
    /// Month shown, or `None` for the full period
    pub month: Option<Month>,
    pub steps: Vec<WaterfallStep>,
}

impl Waterfall {
    pub fn from_statement(statement: &PlStatement, month: Option<Month>) -> Self {
        let pick = |category: PlCategory, line: &str| match month {
            Some(m) => statement.value(category, line, m),
            None => statement.annual_total(category, line),
        };

        let revenue = pick(PlCategory::Revenue, lines::TOTAL_REVENUE);
        let movements = [
            ("CoGS", pick(PlCategory::CoGS, lines::TOTAL_COGS)),
            ("Fulfilment", pick(PlCategory::Fulfilment, lines::TOTAL_FULFILMENT)),
            ("Overheads", pick(PlCategory::Overheads, lines::OVERHEADS)),
        ];
        let ebitda = pick(PlCategory::EBITDA, lines::EBITDA);

        let mut steps = vec![WaterfallStep {
            label: "Revenue".to_string(),
            kind: StepKind::Absolute,
            amount: revenue,
            start: 0.0,
            end: revenue,
        }];

        let mut level = revenue;
        for (label, amount) in movements {
            steps.push(WaterfallStep {
                label: label.to_string(),
                kind: StepKind::Relative,
                amount,
                start: level,
                end: level + amount,
            });
            level += amount;
        }

        steps.push(WaterfallStep {
            label: "EBITDA".to_string(),
            kind: StepKind::Total,
            amount: ebitda,
            start: 0.0,
            end: ebitda,
        });

        Waterfall { month, steps }
    }

    pub fn step(&self, label: &str) -> Option<&WaterfallStep> {
        self.steps.iter().find(|s| s.label == label)
    }
}

/// Headline margins, percentages as fractions of revenue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyMetrics {
    pub revenue: f64,
    pub cm1: f64,
    pub cm1_pct: f64,
    pub cm2: f64,
    pub cm2_pct: f64,
    pub ebitda: f64,
    pub ebitda_pct: f64,
    pub cogs_pct: f64,
}

impl KeyMetrics {
    pub fn from_statement(statement: &PlStatement, month: Option<Month>) -> Self {
        let pick = |category: PlCategory, line: &str| match month {
            Some(m) => statement.value(category, line, m),
            None => statement.annual_total(category, line),
        };

        let revenue = pick(PlCategory::Revenue, lines::TOTAL_REVENUE);
        let cogs = pick(PlCategory::CoGS, lines::TOTAL_COGS);
        let cm1 = pick(PlCategory::CM1, lines::TOTAL_CM1);
        let cm2 = pick(PlCategory::CM2, lines::TOTAL_CM2);
        let ebitda = pick(PlCategory::EBITDA, lines::EBITDA);

        // Shares are undefined without positive revenue
        let share = |v: f64| if revenue > 0.0 { v / revenue } else { 0.0 };

        KeyMetrics {
            revenue,
            cm1,
            cm1_pct: share(cm1),
            cm2,
            cm2_pct: share(cm2),
            ebitda,
            ebitda_pct: share(ebitda),
            cogs_pct: share(cogs).abs(),
        }
    }
}
