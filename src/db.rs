//! Database schema and operations

use anyhow::{Result, anyhow, bail};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::models::{
    ComponentInput, CostBreakdown, CostInput, FinishedGood, FixedCostSchedule, Jar, Material,
    MaterialType, Recipe,
};

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Raw materials priced per gram
        CREATE TABLE IF NOT EXISTS materials (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            material_type TEXT NOT NULL,
            unit_cost REAL NOT NULL CHECK (unit_cost >= 0),
            stock_grams REAL NOT NULL CHECK (stock_grams >= 0),
            unit_label TEXT NOT NULL DEFAULT 'g'
        );

        -- Containers, filled 1 ml : 1 g
        CREATE TABLE IF NOT EXISTS jars (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            capacity_ml REAL NOT NULL CHECK (capacity_ml > 0),
            unit_price REAL NOT NULL CHECK (unit_price >= 0),
            stock_units INTEGER NOT NULL CHECK (stock_units >= 0)
        );

        -- Recipes keep a copy of every costing input as it was when saved
        CREATE TABLE IF NOT EXISTS recipes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            jar_id INTEGER NOT NULL REFERENCES jars(id),
            gramage_total REAL NOT NULL,
            units INTEGER NOT NULL,
            wax_material_id INTEGER NOT NULL,
            wax_percentage REAL NOT NULL,
            wax_unit_cost REAL NOT NULL,
            additive_material_id INTEGER,
            additive_percentage REAL,
            additive_unit_cost REAL,
            fragrance_material_id INTEGER NOT NULL,
            fragrance_percentage REAL NOT NULL,
            fragrance_unit_cost REAL NOT NULL,
            jar_unit_cost REAL NOT NULL,
            fc_wick_and_tab REAL,
            fc_labor REAL,
            fc_utilities REAL,
            fc_napkins REAL,
            fc_dye REAL,
            fc_stickers REAL,
            fc_packaging REAL,
            margin_percent REAL NOT NULL,
            cost_per_unit REAL NOT NULL,
            fixed_cost_total REAL NOT NULL,
            suggested_price REAL NOT NULL
        );

        -- Finished candles on hand, one row per recipe
        CREATE TABLE IF NOT EXISTS finished_goods (
            recipe_id INTEGER PRIMARY KEY REFERENCES recipes(id),
            stock_units INTEGER NOT NULL DEFAULT 0 CHECK (stock_units >= 0),
            min_units INTEGER NOT NULL DEFAULT 0 CHECK (min_units >= 0)
        );

        CREATE INDEX IF NOT EXISTS idx_recipes_jar ON recipes(jar_id);
        "#,
    )?;
    Ok(())
}

/// Insert a material or update the one with the same name. Returns its id.
pub fn upsert_material(conn: &Connection, material: &Material) -> Result<i64> {
    conn.execute(
        "INSERT INTO materials (name, material_type, unit_cost, stock_grams, unit_label)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(name) DO UPDATE SET
            material_type = excluded.material_type,
            unit_cost = excluded.unit_cost,
            stock_grams = excluded.stock_grams,
            unit_label = excluded.unit_label",
        (
            &material.name,
            material.material_type.as_str(),
            material.unit_cost,
            material.stock_grams,
            &material.unit_label,
        ),
    )?;
    let id = conn.query_row(
        "SELECT id FROM materials WHERE name = ?1",
        [&material.name],
        |row| row.get(0),
    )?;
    Ok(id)
}

/// Insert a jar or update the one with the same name. Returns its id.
pub fn upsert_jar(conn: &Connection, jar: &Jar) -> Result<i64> {
    conn.execute(
        "INSERT INTO jars (name, capacity_ml, unit_price, stock_units)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(name) DO UPDATE SET
            capacity_ml = excluded.capacity_ml,
            unit_price = excluded.unit_price,
            stock_units = excluded.stock_units",
        (&jar.name, jar.capacity_ml, jar.unit_price, jar.stock_units),
    )?;
    let id = conn.query_row("SELECT id FROM jars WHERE name = ?1", [&jar.name], |row| {
        row.get(0)
    })?;
    Ok(id)
}

fn material_from_row(row: &Row) -> rusqlite::Result<Material> {
    let type_label: String = row.get(2)?;
    let material_type = type_label
        .parse::<MaterialType>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, e.into()))?;
    Ok(Material {
        id: row.get(0)?,
        name: row.get(1)?,
        material_type,
        unit_cost: row.get(3)?,
        stock_grams: row.get(4)?,
        unit_label: row.get(5)?,
    })
}

fn jar_from_row(row: &Row) -> rusqlite::Result<Jar> {
    Ok(Jar {
        id: row.get(0)?,
        name: row.get(1)?,
        capacity_ml: row.get(2)?,
        unit_price: row.get(3)?,
        stock_units: row.get(4)?,
    })
}

const MATERIAL_COLUMNS: &str = "id, name, material_type, unit_cost, stock_grams, unit_label";
const JAR_COLUMNS: &str = "id, name, capacity_ml, unit_price, stock_units";

pub fn get_material(conn: &Connection, id: i64) -> Result<Option<Material>> {
    let material = conn
        .query_row(
            &format!("SELECT {} FROM materials WHERE id = ?1", MATERIAL_COLUMNS),
            [id],
            material_from_row,
        )
        .optional()?;
    Ok(material)
}

/// List all materials, ordered by type then name
pub fn list_materials(conn: &Connection) -> Result<Vec<Material>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM materials ORDER BY material_type, name",
        MATERIAL_COLUMNS
    ))?;

    let rows = stmt.query_map([], material_from_row)?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

pub fn get_jar(conn: &Connection, id: i64) -> Result<Option<Jar>> {
    let jar = conn
        .query_row(
            &format!("SELECT {} FROM jars WHERE id = ?1", JAR_COLUMNS),
            [id],
            jar_from_row,
        )
        .optional()?;
    Ok(jar)
}

pub fn list_jars(conn: &Connection) -> Result<Vec<Jar>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM jars ORDER BY name", JAR_COLUMNS))?;

    let rows = stmt.query_map([], jar_from_row)?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

const RECIPE_COLUMNS: &str = "id, name, jar_id, gramage_total, units,
    wax_material_id, wax_percentage, wax_unit_cost,
    additive_material_id, additive_percentage, additive_unit_cost,
    fragrance_material_id, fragrance_percentage, fragrance_unit_cost,
    jar_unit_cost,
    fc_wick_and_tab, fc_labor, fc_utilities, fc_napkins, fc_dye, fc_stickers, fc_packaging,
    margin_percent, cost_per_unit, fixed_cost_total, suggested_price";

fn recipe_from_row(row: &Row) -> rusqlite::Result<Recipe> {
    let additive = match row.get::<_, Option<i64>>(8)? {
        Some(material_id) => Some(ComponentInput {
            material_id,
            percentage: row.get::<_, Option<f64>>(9)?.unwrap_or(0.0),
            unit_cost: row.get::<_, Option<f64>>(10)?.unwrap_or(0.0),
        }),
        None => None,
    };

    let input = CostInput {
        gramage_total: row.get(3)?,
        units: row.get(4)?,
        wax: Some(ComponentInput {
            material_id: row.get(5)?,
            percentage: row.get(6)?,
            unit_cost: row.get(7)?,
        }),
        additive,
        fragrance: Some(ComponentInput {
            material_id: row.get(11)?,
            percentage: row.get(12)?,
            unit_cost: row.get(13)?,
        }),
        jar_unit_cost: row.get(14)?,
        fixed_costs: FixedCostSchedule {
            wick_and_tab: row.get(15)?,
            labor: row.get(16)?,
            utilities: row.get(17)?,
            napkins: row.get(18)?,
            dye: row.get(19)?,
            stickers: row.get(20)?,
            packaging: row.get(21)?,
        },
        margin_percent: row.get(22)?,
    };

    Ok(Recipe {
        id: row.get(0)?,
        name: row.get(1)?,
        jar_id: row.get(2)?,
        input,
        cost_per_unit: row.get(23)?,
        fixed_cost_total: row.get(24)?,
        suggested_price: row.get(25)?,
    })
}

/// Split a stored slot into nullable columns
fn slot_columns(component: Option<&ComponentInput>) -> (Option<i64>, Option<f64>, Option<f64>) {
    match component {
        Some(c) => (Some(c.material_id), Some(c.percentage), Some(c.unit_cost)),
        None => (None, None, None),
    }
}

fn required_slot(component: Option<&ComponentInput>, slot: &str) -> Result<ComponentInput> {
    component
        .cloned()
        .ok_or_else(|| anyhow!("recipe cannot be stored without a {} material", slot))
}

/// Save a costed recipe. Returns the new recipe id.
pub fn insert_recipe(
    conn: &Connection,
    name: &str,
    jar_id: i64,
    input: &CostInput,
    costs: &CostBreakdown,
) -> Result<i64> {
    let wax = required_slot(input.wax.as_ref(), "wax")?;
    let fragrance = required_slot(input.fragrance.as_ref(), "fragrance")?;
    let (additive_id, additive_pct, additive_cost) = slot_columns(input.additive.as_ref());
    let fc = &input.fixed_costs;

    conn.execute(
        &format!(
            "INSERT INTO recipes ({})
             VALUES (NULL, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                     ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25)",
            RECIPE_COLUMNS
        ),
        params![
            name,
            jar_id,
            input.gramage_total,
            input.units,
            wax.material_id,
            wax.percentage,
            wax.unit_cost,
            additive_id,
            additive_pct,
            additive_cost,
            fragrance.material_id,
            fragrance.percentage,
            fragrance.unit_cost,
            input.jar_unit_cost,
            fc.wick_and_tab,
            fc.labor,
            fc.utilities,
            fc.napkins,
            fc.dye,
            fc.stickers,
            fc.packaging,
            input.margin_percent,
            costs.cost_per_unit,
            costs.fixed_cost_total,
            costs.suggested_price,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Overwrite a recipe's input snapshot and computed figures
pub fn update_recipe(
    conn: &Connection,
    id: i64,
    input: &CostInput,
    costs: &CostBreakdown,
) -> Result<()> {
    let wax = required_slot(input.wax.as_ref(), "wax")?;
    let fragrance = required_slot(input.fragrance.as_ref(), "fragrance")?;
    let (_, _, additive_cost) = slot_columns(input.additive.as_ref());

    let changed = conn.execute(
        "UPDATE recipes SET
            wax_unit_cost = ?2,
            additive_unit_cost = ?3,
            fragrance_unit_cost = ?4,
            jar_unit_cost = ?5,
            cost_per_unit = ?6,
            fixed_cost_total = ?7,
            suggested_price = ?8
         WHERE id = ?1",
        params![
            id,
            wax.unit_cost,
            additive_cost,
            fragrance.unit_cost,
            input.jar_unit_cost,
            costs.cost_per_unit,
            costs.fixed_cost_total,
            costs.suggested_price,
        ],
    )?;
    if changed == 0 {
        bail!("recipe {} not found", id);
    }
    Ok(())
}

pub fn get_recipe(conn: &Connection, id: i64) -> Result<Option<Recipe>> {
    let recipe = conn
        .query_row(
            &format!("SELECT {} FROM recipes WHERE id = ?1", RECIPE_COLUMNS),
            [id],
            recipe_from_row,
        )
        .optional()?;
    Ok(recipe)
}

pub fn list_recipes(conn: &Connection) -> Result<Vec<Recipe>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM recipes ORDER BY name", RECIPE_COLUMNS))?;

    let rows = stmt.query_map([], recipe_from_row)?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

/// Delete a recipe and its finished stock. Returns false when it did not exist.
pub fn delete_recipe(conn: &Connection, id: i64) -> Result<bool> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM finished_goods WHERE recipe_id = ?1", [id])?;
    let changed = tx.execute("DELETE FROM recipes WHERE id = ?1", [id])?;
    tx.commit()?;
    Ok(changed > 0)
}

fn finished_good_from_row(row: &Row) -> rusqlite::Result<FinishedGood> {
    Ok(FinishedGood {
        recipe_id: row.get(0)?,
        recipe_name: row.get(1)?,
        stock_units: row.get(2)?,
        min_units: row.get(3)?,
        unit_price: row.get(4)?,
    })
}

const FINISHED_GOOD_QUERY: &str = "SELECT r.id, r.name, COALESCE(fg.stock_units, 0),
        COALESCE(fg.min_units, 0), r.suggested_price
     FROM recipes r
     LEFT JOIN finished_goods fg ON fg.recipe_id = r.id";

/// Finished stock of every recipe; recipes never produced show 0 units
pub fn list_finished_goods(conn: &Connection) -> Result<Vec<FinishedGood>> {
    let mut stmt = conn.prepare(&format!("{} ORDER BY r.name", FINISHED_GOOD_QUERY))?;

    let rows = stmt.query_map([], finished_good_from_row)?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }
    Ok(results)
}

pub fn get_finished_good(conn: &Connection, recipe_id: i64) -> Result<Option<FinishedGood>> {
    let good = conn
        .query_row(
            &format!("{} WHERE r.id = ?1", FINISHED_GOOD_QUERY),
            [recipe_id],
            finished_good_from_row,
        )
        .optional()?;
    Ok(good)
}

/// Set the stock level at or below which a recipe's candles are alerted
pub fn set_minimum_stock(conn: &Connection, recipe_id: i64, min_units: i64) -> Result<()> {
    if get_recipe(conn, recipe_id)?.is_none() {
        bail!("recipe {} not found", recipe_id);
    }
    conn.execute(
        "INSERT INTO finished_goods (recipe_id, stock_units, min_units) VALUES (?1, 0, ?2)
         ON CONFLICT(recipe_id) DO UPDATE SET min_units = excluded.min_units",
        params![recipe_id, min_units],
    )?;
    Ok(())
}

/// One stock movement of a production run
#[derive(Debug, Clone, PartialEq)]
pub enum StockChange {
    TakeMaterial { id: i64, grams: f64 },
    TakeJars { id: i64, units: i64 },
    AddCandles { recipe_id: i64, units: i64 },
}

/// Apply all changes or none of them
pub fn apply_stock_changes(conn: &Connection, changes: &[StockChange]) -> Result<()> {
    let tx = conn.unchecked_transaction()?;

    for change in changes {
        match change {
            StockChange::TakeMaterial { id, grams } => {
                let changed = tx.execute(
                    "UPDATE materials SET stock_grams = stock_grams - ?2
                     WHERE id = ?1 AND stock_grams >= ?2",
                    params![id, grams],
                )?;
                if changed == 0 {
                    bail!("material {} is missing or has less than {}g in stock", id, grams);
                }
            }
            StockChange::TakeJars { id, units } => {
                let changed = tx.execute(
                    "UPDATE jars SET stock_units = stock_units - ?2
                     WHERE id = ?1 AND stock_units >= ?2",
                    params![id, units],
                )?;
                if changed == 0 {
                    bail!("jar {} is missing or has less than {} units in stock", id, units);
                }
            }
            StockChange::AddCandles { recipe_id, units } => {
                tx.execute(
                    "INSERT INTO finished_goods (recipe_id, stock_units, min_units)
                     VALUES (?1, ?2, 0)
                     ON CONFLICT(recipe_id) DO UPDATE
                        SET stock_units = stock_units + excluded.stock_units",
                    params![recipe_id, units],
                )?;
            }
        }
    }

    tx.commit()?;
    Ok(())
}

/// Clear all catalog and recipe data
pub fn clear_all(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        DELETE FROM finished_goods;
        DELETE FROM recipes;
        DELETE FROM jars;
        DELETE FROM materials;
        "#,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculator;

    fn open() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn material(name: &str, material_type: MaterialType, unit_cost: f64, stock: f64) -> Material {
        Material {
            id: 0,
            name: name.to_string(),
            material_type,
            unit_cost,
            stock_grams: stock,
            unit_label: "g".to_string(),
        }
    }

    fn jar(name: &str, price: f64, stock: i64) -> Jar {
        Jar {
            id: 0,
            name: name.to_string(),
            capacity_ml: 200.0,
            unit_price: price,
            stock_units: stock,
        }
    }

    fn sample_input(wax_id: i64, fragrance_id: i64) -> CostInput {
        CostInput {
            gramage_total: 200.0,
            units: 10,
            wax: Some(ComponentInput {
                material_id: wax_id,
                percentage: 90.0,
                unit_cost: 0.02,
            }),
            additive: None,
            fragrance: Some(ComponentInput {
                material_id: fragrance_id,
                percentage: 10.0,
                unit_cost: 0.05,
            }),
            jar_unit_cost: 1.5,
            fixed_costs: FixedCostSchedule {
                labor: Some(0.0),
                ..Default::default()
            },
            margin_percent: 25.0,
        }
    }

    #[test]
    fn upsert_material_updates_by_name() {
        let conn = open();
        let id = upsert_material(&conn, &material("Soy", MaterialType::Wax, 0.02, 100.0)).unwrap();
        let again =
            upsert_material(&conn, &material("Soy", MaterialType::Wax, 0.03, 50.0)).unwrap();
        assert_eq!(id, again);

        let stored = get_material(&conn, id).unwrap().unwrap();
        assert_eq!(stored.unit_cost, 0.03);
        assert_eq!(stored.stock_grams, 50.0);
        assert_eq!(list_materials(&conn).unwrap().len(), 1);
    }

    #[test]
    fn negative_stock_is_refused() {
        let conn = open();
        assert!(upsert_material(&conn, &material("Bad", MaterialType::Wax, 0.02, -1.0)).is_err());
    }

    #[test]
    fn recipe_round_trips_with_optional_additive() {
        let conn = open();
        let wax = upsert_material(&conn, &material("Soy", MaterialType::Wax, 0.02, 5000.0)).unwrap();
        let frag =
            upsert_material(&conn, &material("Lavender", MaterialType::Fragrance, 0.05, 800.0))
                .unwrap();
        let jar_id = upsert_jar(&conn, &jar("Amber 200", 1.5, 20)).unwrap();

        let input = sample_input(wax, frag);
        let costs = calculator::calculate(&input).unwrap();
        let id = insert_recipe(&conn, "Lavender 200", jar_id, &input, &costs).unwrap();

        let stored = get_recipe(&conn, id).unwrap().unwrap();
        assert_eq!(stored.name, "Lavender 200");
        assert_eq!(stored.jar_id, jar_id);
        assert_eq!(stored.input, input);
        assert_eq!(stored.suggested_price, costs.suggested_price);
        assert!(stored.input.additive.is_none());
    }

    #[test]
    fn material_price_change_does_not_touch_saved_recipe() {
        let conn = open();
        let wax = upsert_material(&conn, &material("Soy", MaterialType::Wax, 0.02, 5000.0)).unwrap();
        let frag =
            upsert_material(&conn, &material("Rose", MaterialType::Fragrance, 0.05, 800.0)).unwrap();
        let jar_id = upsert_jar(&conn, &jar("Clear 200", 1.5, 20)).unwrap();

        let input = sample_input(wax, frag);
        let costs = calculator::calculate(&input).unwrap();
        let id = insert_recipe(&conn, "Rose", jar_id, &input, &costs).unwrap();

        upsert_material(&conn, &material("Soy", MaterialType::Wax, 0.50, 5000.0)).unwrap();

        let stored = get_recipe(&conn, id).unwrap().unwrap();
        assert_eq!(stored.input.wax.unwrap().unit_cost, 0.02);
        assert_eq!(stored.cost_per_unit, costs.cost_per_unit);
    }

    #[test]
    fn stock_changes_are_all_or_nothing() {
        let conn = open();
        let wax = upsert_material(&conn, &material("Soy", MaterialType::Wax, 0.02, 1000.0)).unwrap();
        let frag =
            upsert_material(&conn, &material("Fig", MaterialType::Fragrance, 0.05, 800.0)).unwrap();
        let jar_id = upsert_jar(&conn, &jar("Tin", 1.0, 3)).unwrap();
        let input = sample_input(wax, frag);
        let costs = calculator::calculate(&input).unwrap();
        let recipe_id = insert_recipe(&conn, "Fig Tin", jar_id, &input, &costs).unwrap();

        let result = apply_stock_changes(
            &conn,
            &[
                StockChange::TakeMaterial { id: wax, grams: 400.0 },
                StockChange::AddCandles { recipe_id, units: 5 },
                StockChange::TakeJars { id: jar_id, units: 5 },
            ],
        );
        assert!(result.is_err());
        assert_eq!(get_material(&conn, wax).unwrap().unwrap().stock_grams, 1000.0);
        assert_eq!(get_finished_good(&conn, recipe_id).unwrap().unwrap().stock_units, 0);

        apply_stock_changes(
            &conn,
            &[
                StockChange::TakeMaterial { id: wax, grams: 400.0 },
                StockChange::TakeJars { id: jar_id, units: 3 },
                StockChange::AddCandles { recipe_id, units: 3 },
            ],
        )
        .unwrap();
        assert_eq!(get_material(&conn, wax).unwrap().unwrap().stock_grams, 600.0);
        assert_eq!(get_jar(&conn, jar_id).unwrap().unwrap().stock_units, 0);
        assert_eq!(get_finished_good(&conn, recipe_id).unwrap().unwrap().stock_units, 3);
    }

    #[test]
    fn minimum_stock_survives_production() {
        let conn = open();
        let wax = upsert_material(&conn, &material("Soy", MaterialType::Wax, 0.02, 1000.0)).unwrap();
        let frag =
            upsert_material(&conn, &material("Oud", MaterialType::Fragrance, 0.05, 800.0)).unwrap();
        let jar_id = upsert_jar(&conn, &jar("Glass", 1.0, 30)).unwrap();
        let input = sample_input(wax, frag);
        let costs = calculator::calculate(&input).unwrap();
        let recipe_id = insert_recipe(&conn, "Oud", jar_id, &input, &costs).unwrap();

        set_minimum_stock(&conn, recipe_id, 6).unwrap();
        apply_stock_changes(&conn, &[StockChange::AddCandles { recipe_id, units: 4 }]).unwrap();
        apply_stock_changes(&conn, &[StockChange::AddCandles { recipe_id, units: 4 }]).unwrap();

        let good = get_finished_good(&conn, recipe_id).unwrap().unwrap();
        assert_eq!(good.stock_units, 8);
        assert_eq!(good.min_units, 6);
        assert_eq!(good.recipe_name, "Oud");
        assert!(set_minimum_stock(&conn, 999, 1).is_err());

        assert!(delete_recipe(&conn, recipe_id).unwrap());
        assert!(list_finished_goods(&conn).unwrap().is_empty());
    }

    #[test]
    fn delete_recipe_reports_missing() {
        let conn = open();
        assert!(!delete_recipe(&conn, 42).unwrap());
    }
}
