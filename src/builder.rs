//! Assemble calculator input from catalog references

use anyhow::{Result, bail};
use rusqlite::Connection;

use crate::calculator;
use crate::config::CostingConfig;
use crate::db;
use crate::models::{
    ComponentInput, CostBreakdown, CostInput, FixedCostSchedule, Jar, Recipe, Slot,
};

/// A material picked for a slot, by catalog id
#[derive(Debug, Clone, Copy)]
pub struct SlotChoice {
    pub material_id: i64,
    pub percentage: f64,
}

/// Recipe as entered, before prices are looked up
#[derive(Debug, Clone)]
pub struct RecipeDraft {
    pub jar_id: i64,
    pub gramage_total: Option<f64>, // defaults to the jar capacity
    pub units: u32,
    pub wax: Option<SlotChoice>,
    pub additive: Option<SlotChoice>,
    pub fragrance: Option<SlotChoice>,
    pub margin_percent: Option<f64>,
    pub fixed_costs: FixedCostSchedule,
}

fn resolve_slot(
    conn: &Connection,
    slot: Slot,
    choice: Option<SlotChoice>,
) -> Result<Option<ComponentInput>> {
    let Some(choice) = choice else {
        return Ok(None);
    };

    let Some(material) = db::get_material(conn, choice.material_id)? else {
        bail!("{} material {} not found", slot, choice.material_id);
    };
    if material.material_type != slot.material_type() {
        bail!(
            "material '{}' is {}, it cannot fill the {} slot",
            material.name,
            material.material_type,
            slot
        );
    }

    Ok(Some(ComponentInput {
        material_id: material.id,
        percentage: choice.percentage,
        unit_cost: material.unit_cost,
    }))
}

/// Look up current prices for a draft. Returns the input and the chosen jar.
pub fn build_input(
    conn: &Connection,
    draft: &RecipeDraft,
    defaults: &CostingConfig,
) -> Result<(CostInput, Jar)> {
    let Some(jar) = db::get_jar(conn, draft.jar_id)? else {
        bail!("jar {} not found", draft.jar_id);
    };

    let input = CostInput {
        gramage_total: draft.gramage_total.unwrap_or(jar.capacity_ml),
        units: draft.units,
        wax: resolve_slot(conn, Slot::Wax, draft.wax)?,
        additive: resolve_slot(conn, Slot::Additive, draft.additive)?,
        fragrance: resolve_slot(conn, Slot::Fragrance, draft.fragrance)?,
        jar_unit_cost: jar.unit_price,
        fixed_costs: draft.fixed_costs.or(&defaults.fixed_costs),
        margin_percent: draft.margin_percent.unwrap_or(defaults.margin_percent),
    };
    tracing::debug!(jar = %jar.name, gramage = input.gramage_total, "built cost input");

    Ok((input, jar))
}

/// Copy of a stored recipe's input with today's material and jar prices
pub fn refresh_prices(conn: &Connection, recipe: &Recipe) -> Result<CostInput> {
    let mut input = recipe.input.clone();

    for slot in Slot::ALL {
        let current = match slot {
            Slot::Wax => input.wax.as_mut(),
            Slot::Additive => input.additive.as_mut(),
            Slot::Fragrance => input.fragrance.as_mut(),
        };
        if let Some(component) = current {
            let Some(material) = db::get_material(conn, component.material_id)? else {
                bail!(
                    "{} material {} of recipe '{}' no longer exists",
                    slot,
                    component.material_id,
                    recipe.name
                );
            };
            component.unit_cost = material.unit_cost;
        }
    }

    let Some(jar) = db::get_jar(conn, recipe.jar_id)? else {
        bail!("jar {} of recipe '{}' no longer exists", recipe.jar_id, recipe.name);
    };
    input.jar_unit_cost = jar.unit_price;

    Ok(input)
}

/// Re-cost a stored recipe at today's prices and save the new figures.
///
/// Returns the recipe as it was before the update together with the new costs.
pub fn recalculate_recipe(conn: &Connection, id: i64) -> Result<(Recipe, CostBreakdown)> {
    let Some(recipe) = db::get_recipe(conn, id)? else {
        bail!("recipe {} not found", id);
    };

    let input = refresh_prices(conn, &recipe)?;
    let costs = calculator::calculate(&input)?;
    db::update_recipe(conn, id, &input, &costs)?;
    tracing::info!(
        recipe = %recipe.name,
        old = recipe.suggested_price,
        new = costs.suggested_price,
        "recipe recalculated"
    );

    Ok((recipe, costs))
}
