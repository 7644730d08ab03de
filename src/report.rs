//! Reports over the catalog and saved recipes

use std::fmt;

use anyhow::{Result, bail};
use rusqlite::Connection;

use crate::calculator;
use crate::config::AlertThresholds;
use crate::db::{self, StockChange};
use crate::models::{FinishedGood, Jar, Material, Recipe, Slot};

#[derive(Debug, Clone)]
pub struct RecipeCostRow {
    pub recipe_id: i64,
    pub name: String,
    pub jar_name: String,
    pub gramage_total: f64,
    pub units: u32,
    pub cost_per_unit: f64,
    pub fixed_cost_total: f64,
    pub cost_total: f64,
    pub cost_per_gram: f64,
    pub suggested_price: f64,
}

#[derive(Debug, Default)]
pub struct CostReport {
    pub rows: Vec<RecipeCostRow>,
}

/// Costs of every saved recipe, from the figures stored with it
pub fn cost_report(conn: &Connection) -> Result<CostReport> {
    let jars = db::list_jars(conn)?;
    let mut rows = Vec::new();

    for recipe in db::list_recipes(conn)? {
        let jar_name = jars
            .iter()
            .find(|j| j.id == recipe.jar_id)
            .map(|j| j.name.clone())
            .unwrap_or_else(|| "N/A".to_string());
        let cost_total = recipe.cost_per_unit + recipe.fixed_cost_total;

        rows.push(RecipeCostRow {
            recipe_id: recipe.id,
            name: recipe.name,
            jar_name,
            gramage_total: recipe.input.gramage_total,
            units: recipe.input.units,
            cost_per_unit: recipe.cost_per_unit,
            fixed_cost_total: recipe.fixed_cost_total,
            cost_total,
            cost_per_gram: cost_total / recipe.input.gramage_total,
            suggested_price: recipe.suggested_price,
        });
    }

    Ok(CostReport { rows })
}

impl fmt::Display for CostReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Recipe Costs ===")?;
        if self.rows.is_empty() {
            return writeln!(f, "No recipes saved.");
        }

        writeln!(
            f,
            "{:>4} {:<24} {:<16} {:>8} {:>6} {:>10} {:>10} {:>10} {:>8} {:>10}",
            "ID", "Recipe", "Jar", "Grams", "Units", "Materials", "Fixed", "Total", "Per g", "Price"
        )?;
        for r in &self.rows {
            writeln!(
                f,
                "{:>4} {:<24} {:<16} {:>8.0} {:>6} {:>10.2} {:>10.2} {:>10.2} {:>8.2} {:>10.2}",
                r.recipe_id,
                r.name,
                r.jar_name,
                r.gramage_total,
                r.units,
                r.cost_per_unit,
                r.fixed_cost_total,
                r.cost_total,
                r.cost_per_gram,
                r.suggested_price
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct MaterialNeed {
    pub slot: Slot,
    pub material_id: i64,
    pub material_name: String,
    pub needed_grams: f64,
    pub stock_grams: f64,
}

impl MaterialNeed {
    pub fn is_short(&self) -> bool {
        self.stock_grams < self.needed_grams
    }
}

#[derive(Debug, Clone)]
pub struct BatchRequirements {
    pub recipe_id: i64,
    pub recipe_name: String,
    pub units: u32,
    pub materials: Vec<MaterialNeed>,
    pub jar_id: i64,
    pub jar_name: String,
    pub jar_stock: i64,
}

impl BatchRequirements {
    pub fn jars_short(&self) -> bool {
        self.jar_stock < self.units as i64
    }

    pub fn has_shortage(&self) -> bool {
        self.jars_short() || self.materials.iter().any(MaterialNeed::is_short)
    }

    /// Materials and jars taken out, finished candles put in
    pub fn stock_changes(&self) -> Vec<StockChange> {
        let mut out: Vec<StockChange> = self
            .materials
            .iter()
            .map(|m| StockChange::TakeMaterial {
                id: m.material_id,
                grams: m.needed_grams,
            })
            .collect();
        out.push(StockChange::TakeJars {
            id: self.jar_id,
            units: self.units as i64,
        });
        out.push(StockChange::AddCandles {
            recipe_id: self.recipe_id,
            units: self.units as i64,
        });
        out
    }
}

/// Grams and jars a saved recipe's batch needs, against current stock
pub fn batch_requirements(conn: &Connection, recipe: &Recipe) -> Result<BatchRequirements> {
    let breakdown = calculator::preview(&recipe.input)?;

    let mut materials = Vec::new();
    for component in &breakdown.components {
        let Some(material) = db::get_material(conn, component.material_id)? else {
            bail!("material {} not found", component.material_id);
        };
        materials.push(MaterialNeed {
            slot: component.slot,
            material_id: material.id,
            material_name: material.name,
            needed_grams: component.grams_for_batch,
            stock_grams: material.stock_grams,
        });
    }

    let Some(jar) = db::get_jar(conn, recipe.jar_id)? else {
        bail!("jar {} not found", recipe.jar_id);
    };

    Ok(BatchRequirements {
        recipe_id: recipe.id,
        recipe_name: recipe.name.clone(),
        units: recipe.input.units,
        materials,
        jar_id: jar.id,
        jar_name: jar.name,
        jar_stock: jar.stock_units,
    })
}

/// Take a batch's materials and jars out of stock and shelve the candles
pub fn produce_batch(conn: &Connection, recipe: &Recipe) -> Result<BatchRequirements> {
    let needs = batch_requirements(conn, recipe)?;
    if needs.has_shortage() {
        bail!("not enough stock to produce '{}':\n{}", recipe.name, needs);
    }
    db::apply_stock_changes(conn, &needs.stock_changes())?;
    tracing::info!(recipe = %recipe.name, units = needs.units, "batch produced");
    Ok(needs)
}

impl fmt::Display for BatchRequirements {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Batch: {} x {} ===", self.units, self.recipe_name)?;
        for m in &self.materials {
            writeln!(
                f,
                "  {:<10} {:<24} need {:>8.0}g, have {:>8.0}g{}",
                m.slot.to_string(),
                m.material_name,
                m.needed_grams,
                m.stock_grams,
                if m.is_short() { "  SHORT" } else { "" }
            )?;
        }
        writeln!(
            f,
            "  {:<10} {:<24} need {:>8} u, have {:>8} u{}",
            "jar",
            self.jar_name,
            self.units,
            self.jar_stock,
            if self.jars_short() { "  SHORT" } else { "" }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for StockLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StockLevel::Low => "LOW",
            StockLevel::Medium => "MEDIUM",
            StockLevel::High => "HIGH",
        })
    }
}

pub fn material_level(material: &Material, thresholds: &AlertThresholds) -> StockLevel {
    if material.stock_grams < thresholds.material_low_grams {
        StockLevel::Low
    } else if material.stock_grams < thresholds.material_medium_grams {
        StockLevel::Medium
    } else {
        StockLevel::High
    }
}

pub fn jar_level(jar: &Jar, thresholds: &AlertThresholds) -> StockLevel {
    if jar.stock_units < thresholds.jar_low_units {
        StockLevel::Low
    } else if jar.stock_units < thresholds.jar_medium_units {
        StockLevel::Medium
    } else {
        StockLevel::High
    }
}

pub fn candle_is_low(good: &FinishedGood) -> bool {
    good.stock_units <= good.min_units
}

#[derive(Debug, Default)]
pub struct StockReport {
    pub materials: Vec<(Material, StockLevel)>,
    pub jars: Vec<(Jar, StockLevel)>,
    pub candles: Vec<FinishedGood>,
    pub thresholds: AlertThresholds,
}

impl StockReport {
    pub fn low_materials(&self) -> impl Iterator<Item = &Material> {
        self.materials
            .iter()
            .filter(|(_, level)| *level == StockLevel::Low)
            .map(|(m, _)| m)
    }

    pub fn low_jars(&self) -> impl Iterator<Item = &Jar> {
        self.jars
            .iter()
            .filter(|(_, level)| *level == StockLevel::Low)
            .map(|(j, _)| j)
    }

    pub fn low_candles(&self) -> impl Iterator<Item = &FinishedGood> {
        self.candles.iter().filter(|g| candle_is_low(g))
    }

    pub fn alert_count(&self) -> usize {
        self.low_materials().count() + self.low_jars().count() + self.low_candles().count()
    }

    /// Grams to buy to bring a material back up to the medium threshold
    pub fn material_purchase(&self, material: &Material) -> f64 {
        (self.thresholds.material_medium_grams - material.stock_grams).max(0.0)
    }

    pub fn jar_purchase(&self, jar: &Jar) -> i64 {
        (self.thresholds.jar_medium_units - jar.stock_units).max(0)
    }

    /// Candles to make so stock sits at twice the minimum, at least one
    pub fn candle_production(&self, good: &FinishedGood) -> i64 {
        (2 * good.min_units - good.stock_units).max(1)
    }
}

pub fn stock_report(conn: &Connection, thresholds: &AlertThresholds) -> Result<StockReport> {
    let materials = db::list_materials(conn)?
        .into_iter()
        .map(|m| {
            let level = material_level(&m, thresholds);
            (m, level)
        })
        .collect();
    let jars = db::list_jars(conn)?
        .into_iter()
        .map(|j| {
            let level = jar_level(&j, thresholds);
            (j, level)
        })
        .collect();
    Ok(StockReport {
        materials,
        jars,
        candles: db::list_finished_goods(conn)?,
        thresholds: thresholds.clone(),
    })
}

impl fmt::Display for StockReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Stock ===")?;
        writeln!(f, "Materials:")?;
        for (m, level) in &self.materials {
            writeln!(
                f,
                "  {:<24} {:<10} {:>10.1} {:<6} {}",
                m.name,
                m.material_type.to_string(),
                m.stock_grams,
                m.unit_label,
                level
            )?;
        }
        writeln!(f, "Jars:")?;
        for (j, level) in &self.jars {
            writeln!(f, "  {:<24} {:>10} units {}", j.name, j.stock_units, level)?;
        }
        writeln!(f, "Candles:")?;
        for g in &self.candles {
            writeln!(
                f,
                "  {:<24} {:>10} units (min {}){}",
                g.recipe_name,
                g.stock_units,
                g.min_units,
                if candle_is_low(g) { " LOW" } else { "" }
            )?;
        }
        writeln!(f)?;

        let alerts = self.alert_count();
        if alerts == 0 {
            writeln!(f, "No low stock alerts.")
        } else {
            writeln!(f, "Low stock alerts ({}):", alerts)?;
            for m in self.low_materials() {
                writeln!(
                    f,
                    "  ! {} ({:.1} {}), buy {:.0} {}",
                    m.name,
                    m.stock_grams,
                    m.unit_label,
                    self.material_purchase(m),
                    m.unit_label
                )?;
            }
            for j in self.low_jars() {
                writeln!(
                    f,
                    "  ! {} ({} units), buy {}",
                    j.name,
                    j.stock_units,
                    self.jar_purchase(j)
                )?;
            }
            for g in self.low_candles() {
                writeln!(
                    f,
                    "  ! {} candles ({} of min {}), make {}",
                    g.recipe_name,
                    g.stock_units,
                    g.min_units,
                    self.candle_production(g)
                )?;
            }
            Ok(())
        }
    }
}

#[derive(Debug, Default)]
pub struct Valuation {
    pub materials: Vec<(String, f64)>,
    pub jars: Vec<(String, f64)>,
    pub candles: Vec<(String, f64)>, // at suggested sale price
    pub materials_total: f64,
    pub jars_total: f64,
    pub candles_total: f64,
}

/// Value of stock on hand at current catalog prices
pub fn valuation(conn: &Connection) -> Result<Valuation> {
    let mut report = Valuation::default();

    for m in db::list_materials(conn)? {
        let value = m.stock_grams * m.unit_cost;
        report.materials_total += value;
        report.materials.push((m.name, value));
    }
    for j in db::list_jars(conn)? {
        let value = j.stock_units as f64 * j.unit_price;
        report.jars_total += value;
        report.jars.push((j.name, value));
    }
    for g in db::list_finished_goods(conn)? {
        let value = g.stock_units as f64 * g.unit_price;
        report.candles_total += value;
        report.candles.push((g.recipe_name, value));
    }

    Ok(report)
}

impl fmt::Display for Valuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Inventory Value ===")?;
        for (name, value) in &self.materials {
            writeln!(f, "  {:<24} {:>12.2}", name, value)?;
        }
        writeln!(f, "  {:<24} {:>12.2}", "Materials total", self.materials_total)?;
        writeln!(f)?;
        for (name, value) in &self.jars {
            writeln!(f, "  {:<24} {:>12.2}", name, value)?;
        }
        writeln!(f, "  {:<24} {:>12.2}", "Jars total", self.jars_total)?;
        writeln!(f)?;
        for (name, value) in &self.candles {
            writeln!(f, "  {:<24} {:>12.2}", name, value)?;
        }
        writeln!(f, "  {:<24} {:>12.2}", "Candles total", self.candles_total)?;
        writeln!(f)?;
        writeln!(
            f,
            "  {:<24} {:>12.2}",
            "Total",
            self.materials_total + self.jars_total + self.candles_total
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ComponentInput, CostInput, FixedCostSchedule, MaterialType};

    fn setup(wax_stock: f64, jar_stock: i64) -> (Connection, Recipe) {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();

        let mut ids = Vec::new();
        for (name, material_type, cost) in [
            ("Soy", MaterialType::Wax, 0.02),
            ("Cedar", MaterialType::Fragrance, 0.05),
        ] {
            let stock = if material_type == MaterialType::Wax { wax_stock } else { 5000.0 };
            ids.push(
                db::upsert_material(
                    &conn,
                    &Material {
                        id: 0,
                        name: name.to_string(),
                        material_type,
                        unit_cost: cost,
                        stock_grams: stock,
                        unit_label: "g".to_string(),
                    },
                )
                .unwrap(),
            );
        }
        let jar_id = db::upsert_jar(
            &conn,
            &Jar {
                id: 0,
                name: "Tin 200".to_string(),
                capacity_ml: 200.0,
                unit_price: 1.5,
                stock_units: jar_stock,
            },
        )
        .unwrap();

        let input = CostInput {
            gramage_total: 200.0,
            units: 10,
            wax: Some(ComponentInput {
                material_id: ids[0],
                percentage: 90.0,
                unit_cost: 0.02,
            }),
            additive: None,
            fragrance: Some(ComponentInput {
                material_id: ids[1],
                percentage: 10.0,
                unit_cost: 0.05,
            }),
            jar_unit_cost: 1.5,
            fixed_costs: FixedCostSchedule::default(),
            margin_percent: 20.0,
        };
        let costs = calculator::calculate(&input).unwrap();
        let id = db::insert_recipe(&conn, "Cedar Tin", jar_id, &input, &costs).unwrap();
        let recipe = db::get_recipe(&conn, id).unwrap().unwrap();
        (conn, recipe)
    }

    #[test]
    fn requirements_flag_short_wax() {
        let (conn, recipe) = setup(1000.0, 20);
        let needs = batch_requirements(&conn, &recipe).unwrap();

        assert_eq!(needs.materials[0].needed_grams, 1800.0);
        assert!(needs.materials[0].is_short());
        assert!(!needs.materials[1].is_short());
        assert!(!needs.jars_short());
        assert!(needs.has_shortage());
    }

    #[test]
    fn produce_refuses_on_shortage_and_keeps_stock() {
        let (conn, recipe) = setup(5000.0, 4);
        assert!(produce_batch(&conn, &recipe).is_err());
        assert_eq!(db::list_jars(&conn).unwrap()[0].stock_units, 4);
    }

    #[test]
    fn produce_deducts_batch() {
        let (conn, recipe) = setup(5000.0, 20);
        produce_batch(&conn, &recipe).unwrap();

        let soy = db::list_materials(&conn)
            .unwrap()
            .into_iter()
            .find(|m| m.name == "Soy")
            .unwrap();
        assert_eq!(soy.stock_grams, 3200.0);
        assert_eq!(db::list_jars(&conn).unwrap()[0].stock_units, 10);
    }

    #[test]
    fn produce_raises_finished_stock_by_units() {
        let (conn, recipe) = setup(10000.0, 30);
        db::set_minimum_stock(&conn, recipe.id, 15).unwrap();

        produce_batch(&conn, &recipe).unwrap();
        let good = db::get_finished_good(&conn, recipe.id).unwrap().unwrap();
        assert_eq!(good.stock_units, 10);
        let report = stock_report(&conn, &AlertThresholds::default()).unwrap();
        assert_eq!(report.low_candles().count(), 1);

        produce_batch(&conn, &recipe).unwrap();
        let good = db::get_finished_good(&conn, recipe.id).unwrap().unwrap();
        assert_eq!(good.stock_units, 20);
        let report = stock_report(&conn, &AlertThresholds::default()).unwrap();
        assert_eq!(report.low_candles().count(), 0);
    }

    #[test]
    fn failed_production_shelves_nothing() {
        let (conn, recipe) = setup(5000.0, 4);
        assert!(produce_batch(&conn, &recipe).is_err());
        let good = db::get_finished_good(&conn, recipe.id).unwrap().unwrap();
        assert_eq!(good.stock_units, 0);
    }

    #[test]
    fn cost_report_uses_stored_figures() {
        let (conn, recipe) = setup(5000.0, 20);
        let report = cost_report(&conn).unwrap();

        assert_eq!(report.rows.len(), 1);
        let row = &report.rows[0];
        assert_eq!(row.jar_name, "Tin 200");
        assert_eq!(row.cost_total, recipe.cost_per_unit + recipe.fixed_cost_total);
        assert!((row.cost_per_gram - row.cost_total / 200.0).abs() < 1e-12);
        assert!(report.to_string().contains("Cedar Tin"));
    }

    #[test]
    fn stock_levels_follow_thresholds() {
        let (conn, _) = setup(500.0, 20);
        let report = stock_report(&conn, &AlertThresholds::default()).unwrap();

        let low: Vec<_> = report.low_materials().map(|m| m.name.as_str()).collect();
        assert_eq!(low, vec!["Soy"]);
        assert_eq!(report.low_jars().count(), 0);
        // never produced: 0 on hand against a minimum of 0
        assert_eq!(report.low_candles().count(), 1);
        assert_eq!(report.alert_count(), 2);

        let jar = &report.jars[0];
        assert_eq!(jar.1, StockLevel::Medium);
    }

    #[test]
    fn low_alerts_suggest_quantities() {
        let (conn, recipe) = setup(500.0, 4);
        db::set_minimum_stock(&conn, recipe.id, 6).unwrap();
        let report = stock_report(&conn, &AlertThresholds::default()).unwrap();

        let soy = report.low_materials().next().unwrap();
        assert_eq!(report.material_purchase(soy), 4500.0);
        let tin = report.low_jars().next().unwrap();
        assert_eq!(report.jar_purchase(tin), 46);
        let candles = report.low_candles().next().unwrap();
        assert_eq!(report.candle_production(candles), 12);

        let text = report.to_string();
        assert!(text.contains("! Soy (500.0 g), buy 4500 g"));
        assert!(text.contains("! Tin 200 (4 units), buy 46"));
        assert!(text.contains("! Cedar Tin candles (0 of min 6), make 12"));
    }

    #[test]
    fn valuation_sums_stock_at_catalog_prices() {
        let (conn, _) = setup(1000.0, 10);
        let v = valuation(&conn).unwrap();
        // 1000g * 0.02 + 5000g * 0.05
        assert!((v.materials_total - 270.0).abs() < 1e-9);
        assert!((v.jars_total - 15.0).abs() < 1e-9);
        assert_eq!(v.candles_total, 0.0);
    }

    #[test]
    fn valuation_prices_candles_at_suggested_price() {
        let (conn, recipe) = setup(5000.0, 20);
        produce_batch(&conn, &recipe).unwrap();
        let v = valuation(&conn).unwrap();
        assert!((v.candles_total - 10.0 * recipe.suggested_price).abs() < 1e-9);
        assert!(v.to_string().contains("Candles total"));
    }
}
