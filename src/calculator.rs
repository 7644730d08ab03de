//! Recipe cost and pricing calculator
//!
//! Pure functions: given a recipe's composition, jar cost, batch size,
//! fixed-cost schedule and margin, derive grams per component, material
//! cost per unit, total cost and suggested sale price.

use std::fmt;

use thiserror::Error;

use crate::models::{ComponentBreakdown, CostBreakdown, CostInput, Slot};

/// Allowed distance of the composition total from 100%
pub const COMPOSITION_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CostingError {
    #[error("composition percentages must add up to 100%, they add up to {actual:.2}%")]
    CompositionImbalance { actual: f64 },

    #[error("gramage per unit must be greater than 0, got {0}")]
    InvalidGramage(f64),

    #[error("units to produce must be at least 1, got {0}")]
    InvalidBatchSize(u32),

    #[error("recipe has no {0} material selected")]
    MissingComponent(Slot),

    #[error("{slot} percentage must be between 0 and 100, got {percentage}")]
    PercentageOutOfRange { slot: Slot, percentage: f64 },

    #[error("{field} cannot be negative, got {value}")]
    NegativeAmount { field: String, value: f64 },
}

/// Grams of a component in one unit, always rounded up
pub fn grams_per_unit(gramage_total: f64, percentage: f64) -> f64 {
    (gramage_total * percentage / 100.0).ceil()
}

/// Grams of a component for the whole batch.
///
/// Built from the already rounded per-unit mass and ceiled again.
pub fn grams_for_batch(gramage_total: f64, percentage: f64, units: u32) -> f64 {
    (grams_per_unit(gramage_total, percentage) * units as f64).ceil()
}

/// Sum of the percentages of every present slot
pub fn composition_total(input: &CostInput) -> f64 {
    Slot::ALL
        .iter()
        .filter_map(|slot| input.component(*slot))
        .map(|c| c.percentage)
        .sum()
}

/// Full check of a recipe about to be saved. The first failure is returned.
pub fn validate(input: &CostInput) -> Result<(), CostingError> {
    validate_inputs(input)?;

    let total = composition_total(input);
    if !((total - 100.0).abs() <= COMPOSITION_TOLERANCE) {
        return Err(CostingError::CompositionImbalance { actual: total });
    }

    Ok(())
}

/// Every check except the composition balance, which a draft may still miss
pub fn validate_inputs(input: &CostInput) -> Result<(), CostingError> {
    if input.wax.is_none() {
        return Err(CostingError::MissingComponent(Slot::Wax));
    }
    if input.fragrance.is_none() {
        return Err(CostingError::MissingComponent(Slot::Fragrance));
    }

    // Written negated so NaN fails too
    if !(input.gramage_total > 0.0) {
        return Err(CostingError::InvalidGramage(input.gramage_total));
    }
    if input.units < 1 {
        return Err(CostingError::InvalidBatchSize(input.units));
    }

    for slot in Slot::ALL {
        if let Some(component) = input.component(slot) {
            if !(0.0..=100.0).contains(&component.percentage) {
                return Err(CostingError::PercentageOutOfRange {
                    slot,
                    percentage: component.percentage,
                });
            }
            non_negative(&format!("{} unit cost", slot), component.unit_cost)?;
        }
    }

    non_negative("jar unit cost", input.jar_unit_cost)?;
    for (name, amount) in input.fixed_costs.resolved() {
        non_negative(name, amount)?;
    }
    non_negative("profit margin", input.margin_percent)
}

fn non_negative(field: &str, value: f64) -> Result<(), CostingError> {
    if value >= 0.0 {
        Ok(())
    } else {
        Err(CostingError::NegativeAmount {
            field: field.to_string(),
            value,
        })
    }
}

/// Validate and cost a recipe that is being finalized
pub fn calculate(input: &CostInput) -> Result<CostBreakdown, CostingError> {
    validate(input)?;
    Ok(compute(input))
}

/// Cost a draft whose percentages may not add up to 100% yet
pub fn preview(input: &CostInput) -> Result<CostBreakdown, CostingError> {
    validate_inputs(input)?;
    Ok(compute(input))
}

/// Cost already validated input
pub fn compute(input: &CostInput) -> CostBreakdown {
    let mut components = Vec::new();

    for slot in Slot::ALL {
        let Some(component) = input.component(slot) else {
            continue;
        };
        // An additive at 0% counts toward the composition total but is not costed
        if slot == Slot::Additive && component.percentage <= 0.0 {
            continue;
        }

        let grams = grams_per_unit(input.gramage_total, component.percentage);
        components.push(ComponentBreakdown {
            slot,
            material_id: component.material_id,
            percentage: component.percentage,
            grams_per_unit: grams,
            grams_for_batch: grams_for_batch(input.gramage_total, component.percentage, input.units),
            cost_per_unit: grams * component.unit_cost,
        });
    }

    let material_cost: f64 = components.iter().map(|c| c.cost_per_unit).sum();
    let cost_per_unit = material_cost + input.jar_unit_cost;
    let fixed_cost_total = input.fixed_costs.total();
    let cost_total = cost_per_unit + fixed_cost_total;
    let profit = cost_total * (input.margin_percent / 100.0);

    CostBreakdown {
        components,
        cost_per_unit,
        fixed_cost_total,
        cost_total,
        profit,
        suggested_price: cost_total + profit,
        batch_cost: cost_total * input.units as f64,
        units: input.units,
        gramage_total: input.gramage_total,
        margin_percent: input.margin_percent,
    }
}

impl fmt::Display for CostBreakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Cost Sheet ===")?;
        writeln!(f, "{}g per unit, {} units", self.gramage_total, self.units)?;
        writeln!(f)?;

        writeln!(
            f,
            "{:<12} {:>7} {:>10} {:>12} {:>12}",
            "Component", "%", "g/unit", "g/batch", "cost/unit"
        )?;
        for c in &self.components {
            writeln!(
                f,
                "{:<12} {:>7.2} {:>10.0} {:>12.0} {:>12.2}",
                c.slot.to_string(),
                c.percentage,
                c.grams_per_unit,
                c.grams_for_batch,
                c.cost_per_unit
            )?;
        }
        writeln!(f)?;

        writeln!(f, "Materials + jar:  {:>12.2}", self.cost_per_unit)?;
        writeln!(f, "Fixed costs:      {:>12.2}", self.fixed_cost_total)?;
        writeln!(f, "Total cost:       {:>12.2}", self.cost_total)?;
        writeln!(f, "Profit ({:>5.1}%): {:>12.2}", self.margin_percent, self.profit)?;
        writeln!(f, "Suggested price:  {:>12.2}", self.suggested_price)?;
        writeln!(f, "Batch cost:       {:>12.2}", self.batch_cost)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ComponentInput, FixedCostSchedule};

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn component(material_id: i64, percentage: f64, unit_cost: f64) -> ComponentInput {
        ComponentInput {
            material_id,
            percentage,
            unit_cost,
        }
    }

    /// 200g candle, 85% wax, 10% fragrance, no additive (95% in total)
    fn draft_input() -> CostInput {
        CostInput {
            gramage_total: 200.0,
            units: 10,
            wax: Some(component(1, 85.0, 0.02)),
            additive: None,
            fragrance: Some(component(2, 10.0, 0.05)),
            jar_unit_cost: 1.50,
            fixed_costs: FixedCostSchedule::default(),
            margin_percent: 20.0,
        }
    }

    /// 80% wax, 5% additive, 15% fragrance
    fn balanced_input() -> CostInput {
        CostInput {
            wax: Some(component(1, 80.0, 0.02)),
            additive: Some(component(3, 5.0, 0.10)),
            fragrance: Some(component(2, 15.0, 0.05)),
            ..draft_input()
        }
    }

    #[test]
    fn rounds_grams_up() {
        assert_eq!(grams_per_unit(150.0, 33.33), 50.0);
        assert_eq!(grams_per_unit(200.0, 85.0), 170.0);
        assert_eq!(grams_per_unit(200.0, 0.0), 0.0);
    }

    #[test]
    fn batch_grams_use_rounded_per_unit_mass() {
        assert_eq!(grams_for_batch(150.0, 33.33, 10), 500.0);
        // 10.5 -> 11 per unit, so 3 units need 33 rather than 31.5
        assert_eq!(grams_for_batch(70.0, 15.0, 3), 33.0);
    }

    #[test]
    fn grams_per_unit_is_monotonic() {
        let mut previous = 0.0;
        for step in 0..=1000 {
            let grams = grams_per_unit(237.0, step as f64 / 10.0);
            assert!(grams >= previous);
            previous = grams;
        }
    }

    #[test]
    fn previews_draft_recipe() {
        let breakdown = preview(&draft_input()).unwrap();

        assert_eq!(breakdown.components.len(), 2);
        assert_eq!(breakdown.components[0].slot, Slot::Wax);
        assert_eq!(breakdown.components[0].grams_per_unit, 170.0);
        assert_eq!(breakdown.components[0].grams_for_batch, 1700.0);
        assert_eq!(breakdown.components[1].slot, Slot::Fragrance);
        assert_eq!(breakdown.components[1].grams_per_unit, 20.0);

        assert!(close(breakdown.cost_per_unit, 5.9));
        assert!(close(breakdown.fixed_cost_total, 4750.0));
        assert!(close(breakdown.cost_total, 4755.9));
        assert!(close(breakdown.profit, 951.18));
        assert!(close(breakdown.suggested_price, 5707.08));
        assert!(close(breakdown.batch_cost, 47559.0));
    }

    #[test]
    fn draft_cannot_be_finalized() {
        match calculate(&draft_input()) {
            Err(CostingError::CompositionImbalance { actual }) => assert!(close(actual, 95.0)),
            other => panic!("expected CompositionImbalance, got {:?}", other),
        }
    }

    #[test]
    fn calculates_balanced_recipe() {
        let b = calculate(&balanced_input()).unwrap();
        assert_eq!(b.components.len(), 3);
        assert_eq!(b.components[1].slot, Slot::Additive);
        assert_eq!(b.components[1].grams_per_unit, 10.0);
        // 160*0.02 + 10*0.10 + 30*0.05 + 1.50
        assert!(close(b.cost_per_unit, 3.2 + 1.0 + 1.5 + 1.5));
    }

    #[test]
    fn totals_are_consistent() {
        let mut input = balanced_input();
        input.margin_percent = 35.0;

        let b = calculate(&input).unwrap();
        assert_eq!(b.cost_total, b.cost_per_unit + b.fixed_cost_total);
        assert!(close(b.suggested_price, b.cost_total * (1.0 + 35.0 / 100.0)));
    }

    #[test]
    fn zero_percent_additive_is_not_costed() {
        let mut input = balanced_input();
        input.additive = Some(component(3, 0.0, 0.10));
        input.wax = Some(component(1, 85.0, 0.02));

        let b = calculate(&input).unwrap();
        assert!(b.components.iter().all(|c| c.slot != Slot::Additive));
    }

    #[test]
    fn unbalanced_composition_with_additive_is_rejected() {
        let mut input = draft_input();
        input.wax = Some(component(1, 80.0, 0.02));
        input.additive = Some(component(3, 5.0, 0.10));

        match calculate(&input) {
            Err(CostingError::CompositionImbalance { actual }) => assert!(close(actual, 95.0)),
            other => panic!("expected CompositionImbalance, got {:?}", other),
        }
    }

    #[test]
    fn composition_within_tolerance_passes() {
        let mut input = balanced_input();
        input.wax = Some(component(1, 80.005, 0.02));
        assert!(validate(&input).is_ok());

        input.wax = Some(component(1, 80.02, 0.02));
        assert!(matches!(
            validate(&input),
            Err(CostingError::CompositionImbalance { .. })
        ));
    }

    #[test]
    fn zero_units_is_rejected() {
        let mut input = balanced_input();
        input.units = 0;
        assert_eq!(calculate(&input), Err(CostingError::InvalidBatchSize(0)));
        assert_eq!(preview(&input), Err(CostingError::InvalidBatchSize(0)));
    }

    #[test]
    fn non_positive_gramage_is_rejected() {
        let mut input = balanced_input();
        input.gramage_total = 0.0;
        assert_eq!(validate(&input), Err(CostingError::InvalidGramage(0.0)));

        input.gramage_total = f64::NAN;
        assert!(matches!(validate(&input), Err(CostingError::InvalidGramage(_))));
    }

    #[test]
    fn missing_required_components_are_rejected() {
        let mut input = balanced_input();
        input.wax = None;
        assert_eq!(validate(&input), Err(CostingError::MissingComponent(Slot::Wax)));

        let mut input = balanced_input();
        input.fragrance = None;
        assert_eq!(
            validate(&input),
            Err(CostingError::MissingComponent(Slot::Fragrance))
        );
    }

    #[test]
    fn negative_amounts_are_rejected() {
        let mut input = balanced_input();
        input.jar_unit_cost = -1.0;
        assert!(matches!(
            validate(&input),
            Err(CostingError::NegativeAmount { .. })
        ));

        let mut input = balanced_input();
        input.fixed_costs.labor = Some(-5.0);
        assert_eq!(
            validate(&input),
            Err(CostingError::NegativeAmount {
                field: "labor".to_string(),
                value: -5.0
            })
        );
    }

    #[test]
    fn percentage_above_100_is_rejected() {
        let mut input = balanced_input();
        input.wax = Some(component(1, 120.0, 0.02));
        assert_eq!(
            validate(&input),
            Err(CostingError::PercentageOutOfRange {
                slot: Slot::Wax,
                percentage: 120.0
            })
        );
    }

    #[test]
    fn same_input_same_output() {
        let input = balanced_input();
        assert_eq!(calculate(&input), calculate(&input));
    }

    #[test]
    fn error_messages_carry_values() {
        let err = CostingError::CompositionImbalance { actual: 95.0 };
        assert_eq!(
            err.to_string(),
            "composition percentages must add up to 100%, they add up to 95.00%"
        );
        assert_eq!(
            CostingError::MissingComponent(Slot::Fragrance).to_string(),
            "recipe has no fragrance material selected"
        );
    }

    #[test]
    fn cost_sheet_lists_components() {
        let sheet = calculate(&balanced_input()).unwrap().to_string();
        assert!(sheet.contains("additive"));
        assert!(sheet.contains("Suggested price:"));
    }
}
